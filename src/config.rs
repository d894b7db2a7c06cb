use std::env;
use std::fmt;
use std::path::PathBuf;

pub const LOG_LEVEL_VAR: &str = "TERMREPORTD_LOG_LEVEL";
pub const WORKSPACE_VAR: &str = "TERMREPORTD_WORKSPACE";

/// Process-level settings for the sidecar. Per-school grading settings live
/// in the workspace database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub telemetry: TelemetryConfig,
    /// Workspace opened at startup, before any `workspace.select` request.
    pub workspace: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_level = lookup(LOG_LEVEL_VAR)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "info".to_string());

        let workspace = match lookup(WORKSPACE_VAR) {
            None => None,
            Some(v) if v.trim().is_empty() => return Err(ConfigError::EmptyWorkspace),
            Some(v) => Some(PathBuf::from(v.trim())),
        };

        Ok(Self {
            telemetry: TelemetryConfig { log_level },
            workspace,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    EmptyWorkspace,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyWorkspace => {
                write!(f, "{} must not be empty when set", WORKSPACE_VAR)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
