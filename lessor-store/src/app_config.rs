use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub jobs: JobsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Defaults for the scheduled reconciliation sweeps. The scheduler binary
/// reads these; interactive cron handlers may override per call.
#[derive(Debug, Deserialize, Clone)]
pub struct JobsConfig {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub min_overdue_days: i64,
    /// Whether the non-return sweep marks rental records lost, or only reports.
    #[serde(default)]
    pub auto_mark_lost: bool,
}

fn default_batch_size() -> usize {
    500
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Environment-specific overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // LESSOR_DATABASE__URL=... style environment overrides
            .add_source(config::Environment::with_prefix("LESSOR").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
