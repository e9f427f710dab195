//! Application-level configuration

use serde::Deserialize;

/// Table selection and retention settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Table archived when the CLI gives none
    /// Default: "log_scores"
    pub default_table: String,

    /// Allow-list of table names; the only sanitation applied to
    /// dynamically composed SQL
    pub valid_tables: Vec<String>,

    /// Days of source data kept before cleanup; floored at 3 at use-time
    /// Default: 15
    pub retention_days: u32,

    /// Fallback when a caller passes a retention of zero
    /// Default: 14
    pub retention_days_default: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_table: "log_scores".into(),
            valid_tables: vec![
                "log_scores".into(),
                "log_scores_archive".into(),
                "log_scores_test".into(),
            ],
            retention_days: 15,
            retention_days_default: 14,
        }
    }
}

impl AppConfig {
    /// Check a table name against the allow-list
    pub fn is_valid_table(&self, table: &str) -> bool {
        self.valid_tables.iter().any(|t| t == table)
    }
}
