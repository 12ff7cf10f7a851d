//! RatioLab Runner: ranking orchestration over real or synthetic panels.
//!
//! This crate builds on `ratiolab-core` to provide:
//! - TOML ranking configuration with calendar validation
//! - Panel loading with cache/download/synthetic fallback
//! - The request pipeline (adjust → resolve → rank) and its failure taxonomy
//! - Parallel multi-reference sweeps
//! - JSON / CSV / Markdown export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod pipeline;
pub mod sweep;

pub use config::{min_start_date, ConfigError, RankingConfig, RankingSection};
pub use data_loader::{load_panel, LoadError, LoadOptions, LoadedPanel, LOOKBACK_DAYS};
pub use export::{
    export_json, export_ranking_csv, export_sweep_csv, generate_report, import_json,
    load_artifacts, save_artifacts,
};
pub use pipeline::{
    run_config, run_ranking, FailureKind, PipelineError, RankingReport, RankingRequest,
    SCHEMA_VERSION,
};
pub use sweep::{sweep_references, SweepEntry, SweepResults, SweepSummaryRow};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<RankingConfig>();
        assert_sync::<RankingConfig>();
        assert_send::<LoadOptions>();
        assert_sync::<LoadOptions>();
    }

    #[test]
    fn request_and_report_are_send_sync() {
        assert_send::<RankingRequest>();
        assert_sync::<RankingRequest>();
        assert_send::<RankingReport>();
        assert_sync::<RankingReport>();
    }

    #[test]
    fn loaded_panel_is_send_sync() {
        assert_send::<LoadedPanel>();
        assert_sync::<LoadedPanel>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<PipelineError>();
        assert_sync::<PipelineError>();
        assert_send::<LoadError>();
        assert_sync::<LoadError>();
        assert_send::<ConfigError>();
        assert_sync::<ConfigError>();
    }

    #[test]
    fn sweep_results_are_send_sync() {
        assert_send::<SweepResults>();
        assert_sync::<SweepResults>();
    }
}
