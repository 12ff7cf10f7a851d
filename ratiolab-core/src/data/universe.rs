//! Universe configuration: a named list of tickers.
//!
//! The built-in universe is the Merval panel of Buenos Aires listings. Custom
//! universes are stored as TOML:
//!
//! ```toml
//! name = "banks"
//! tickers = ["GGAL.BA", "BMA.BA", "SUPV.BA", "BBAR.BA"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

const MERVAL_TICKERS: [&str; 63] = [
    "GGAL.BA", "YPFD.BA", "PAMP.BA", "TXAR.BA", "ALUA.BA", "CRES.BA", "SUPV.BA", "CEPU.BA",
    "BMA.BA", "TGSU2.BA", "TRAN.BA", "EDN.BA", "LOMA.BA", "MIRG.BA", "DGCU2.BA", "BBAR.BA",
    "MOLI.BA", "TGNO4.BA", "CGPA2.BA", "COME.BA", "IRSA.BA", "BYMA.BA", "TECO2.BA", "METR.BA",
    "CECO2.BA", "BHIP.BA", "AGRO.BA", "LEDE.BA", "CVH.BA", "HAVA.BA", "AUSO.BA", "VALO.BA",
    "SEMI.BA", "INVJ.BA", "CTIO.BA", "MORI.BA", "HARG.BA", "GCLA.BA", "SAMI.BA", "BOLT.BA",
    "MOLA.BA", "CAPX.BA", "OEST.BA", "LONG.BA", "GCDI.BA", "GBAN.BA", "CELU.BA", "FERR.BA",
    "CADO.BA", "GAMI.BA", "PATA.BA", "CARC.BA", "BPAT.BA", "RICH.BA", "INTR.BA", "GARO.BA",
    "FIPL.BA", "GRIM.BA", "DYCA.BA", "POLL.BA", "DOME.BA", "ROSE.BA", "MTR.BA",
];

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("read universe file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse universe TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize universe: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("universe '{name}' has no tickers")]
    Empty { name: String },

    #[error("universe '{name}' lists '{symbol}' more than once")]
    DuplicateTicker { name: String, symbol: String },
}

/// A named ticker list, in listing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Universe {
    pub name: String,
    pub tickers: Vec<String>,
}

impl Universe {
    pub fn new(name: impl Into<String>, tickers: Vec<String>) -> Result<Self, UniverseError> {
        let universe = Self {
            name: name.into(),
            tickers,
        };
        universe.validate()?;
        Ok(universe)
    }

    /// The 63-listing Merval universe.
    pub fn default_merval() -> Self {
        Self {
            name: "merval".into(),
            tickers: MERVAL_TICKERS.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, UniverseError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, UniverseError> {
        let universe: Self = toml::from_str(content)?;
        universe.validate()?;
        Ok(universe)
    }

    pub fn to_toml(&self) -> Result<String, UniverseError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), UniverseError> {
        if self.tickers.is_empty() {
            return Err(UniverseError::Empty {
                name: self.name.clone(),
            });
        }
        let mut seen = BTreeSet::new();
        for symbol in &self.tickers {
            if !seen.insert(symbol.as_str()) {
                return Err(UniverseError::DuplicateTicker {
                    name: self.name.clone(),
                    symbol: symbol.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn all_tickers(&self) -> Vec<&str> {
        self.tickers.iter().map(String::as_str).collect()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.tickers.iter().any(|t| t == symbol)
    }

    pub fn ticker_count(&self) -> usize {
        self.tickers.len()
    }
}

impl Default for Universe {
    fn default() -> Self {
        Self::default_merval()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merval_universe_is_complete_and_unique() {
        let u = Universe::default_merval();
        assert_eq!(u.ticker_count(), 63);
        assert!(u.validate().is_ok());
        assert!(u.contains("GGAL.BA"));
        assert!(u.contains("MTR.BA"));
        assert!(!u.contains("AAPL"));
        assert!(u.all_tickers().iter().all(|t| t.ends_with(".BA")));
    }

    #[test]
    fn toml_roundtrip() {
        let u = Universe::default_merval();
        let parsed = Universe::from_toml(&u.to_toml().unwrap()).unwrap();
        assert_eq!(u, parsed);
    }

    #[test]
    fn custom_universe_from_toml() {
        let u = Universe::from_toml(
            r#"
            name = "banks"
            tickers = ["GGAL.BA", "BMA.BA"]
            "#,
        )
        .unwrap();
        assert_eq!(u.name, "banks");
        assert_eq!(u.all_tickers(), vec!["GGAL.BA", "BMA.BA"]);
    }

    #[test]
    fn rejects_empty_and_duplicates() {
        assert!(matches!(
            Universe::new("none", vec![]),
            Err(UniverseError::Empty { .. })
        ));
        assert!(matches!(
            Universe::new("dup", vec!["GGAL.BA".into(), "GGAL.BA".into()]),
            Err(UniverseError::DuplicateTicker { .. })
        ));
    }
}
