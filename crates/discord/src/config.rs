use std::time::Duration;

use relay_core::config::{env_or, env_secs, ConfigError};

/// Backend client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// REST API root, without a trailing slash.
    pub api_base: String,
    /// Bot application whose messages carry results.
    pub application_id: String,
    /// Slash command that starts a generation.
    pub imagine_command_id: String,
    pub imagine_command_version: String,
    /// Delay between generation status polls.
    pub poll_interval: Duration,
    /// Maximum generation status polls before giving up.
    pub max_polls: u32,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// How many recent messages each generation poll scans.
    pub message_window: u8,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base: "https://discord.com/api/v9".into(),
            application_id: "936929561302675456".into(),
            imagine_command_id: "938956540159881230".into(),
            imagine_command_version: "1237876415471554623".into(),
            poll_interval: Duration::from_secs(3),
            max_polls: 200,
            request_timeout: Duration::from_secs(30),
            message_window: 50,
        }
    }
}

impl BackendConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default                      |
    /// |---------------------------------|------------------------------|
    /// | `DISCORD_API_BASE`              | `https://discord.com/api/v9` |
    /// | `MJ_APPLICATION_ID`             | `936929561302675456`         |
    /// | `MJ_IMAGINE_COMMAND_ID`         | `938956540159881230`         |
    /// | `MJ_IMAGINE_COMMAND_VERSION`    | `1237876415471554623`        |
    /// | `GENERATION_POLL_INTERVAL_SECS` | `3`                          |
    /// | `GENERATION_MAX_POLLS`          | `200`                        |
    /// | `BACKEND_REQUEST_TIMEOUT_SECS`  | `30`                         |
    /// | `GENERATION_MESSAGE_WINDOW`     | `50`                         |
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            api_base: env_or("DISCORD_API_BASE", defaults.api_base)?
                .trim_end_matches('/')
                .to_string(),
            application_id: env_or("MJ_APPLICATION_ID", defaults.application_id)?,
            imagine_command_id: env_or("MJ_IMAGINE_COMMAND_ID", defaults.imagine_command_id)?,
            imagine_command_version: env_or(
                "MJ_IMAGINE_COMMAND_VERSION",
                defaults.imagine_command_version,
            )?,
            poll_interval: env_secs("GENERATION_POLL_INTERVAL_SECS", 3)?,
            max_polls: env_or("GENERATION_MAX_POLLS", defaults.max_polls)?,
            request_timeout: env_secs("BACKEND_REQUEST_TIMEOUT_SECS", 30)?,
            message_window: env_or("GENERATION_MESSAGE_WINDOW", defaults.message_window)?,
        })
    }
}
