use serde::Deserialize;

use reqmetrics_core::error::{ReqMetricsError, Result};
use reqmetrics_core::event::PROCESS_ACTION_EVENT;
use reqmetrics_core::labels::{DEFAULT_APPLICATION_KEY, DEFAULT_ENVIRONMENT, DEFAULT_ENVIRONMENT_KEY};
use reqmetrics_core::metric::DEFAULT_GROUP;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstrumentConfig {
    pub version: u32,

    #[serde(default = "default_group")]
    pub group: String,

    #[serde(default = "default_application_key")]
    pub application_key: String,

    #[serde(default = "default_environment_key")]
    pub environment_key: String,

    #[serde(default = "default_environment")]
    pub default_environment: String,

    #[serde(default = "default_event_name")]
    pub event_name: String,

    /// Check the application key at install time instead of on first event.
    #[serde(default)]
    pub validate_on_install: bool,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            version: 1,
            group: default_group(),
            application_key: default_application_key(),
            environment_key: default_environment_key(),
            default_environment: default_environment(),
            event_name: default_event_name(),
            validate_on_install: false,
        }
    }
}

impl InstrumentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(ReqMetricsError::BadConfig(format!(
                "unsupported config version: {}",
                self.version
            )));
        }
        if self.group.is_empty()
            || !self
                .group
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(ReqMetricsError::BadConfig(
                "group must be non-empty [a-z0-9_]".into(),
            ));
        }
        for (field, v) in [
            ("application_key", &self.application_key),
            ("environment_key", &self.environment_key),
            ("default_environment", &self.default_environment),
            ("event_name", &self.event_name),
        ] {
            if v.trim().is_empty() {
                return Err(ReqMetricsError::BadConfig(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }
}

fn default_group() -> String {
    DEFAULT_GROUP.into()
}
fn default_application_key() -> String {
    DEFAULT_APPLICATION_KEY.into()
}
fn default_environment_key() -> String {
    DEFAULT_ENVIRONMENT_KEY.into()
}
fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.into()
}
fn default_event_name() -> String {
    PROCESS_ACTION_EVENT.into()
}
