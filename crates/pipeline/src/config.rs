use std::time::Duration;

use relay_core::config::{env_millis, env_opt, env_or, env_secs, ConfigError};
use relay_core::retry::RetryPolicy;
use relay_discord::tokens::{default_upscale_templates, parse_template_list, TokenTemplate};

/// Timing and negotiation settings for the orchestration pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Polls allotted to promote an ephemeral attachment.
    pub resolver_attempts: u32,
    pub resolver_interval: Duration,
    /// Wall-clock cap on resolution before a task is finalized anyway.
    pub resolution_budget: Duration,
    /// Polls allotted to find an accepted upscale's result.
    pub result_attempts: u32,
    pub result_interval: Duration,
    /// Recent messages scanned per result poll.
    pub message_window: u8,
    /// Rate-limit retries of a single candidate token before moving on.
    pub rate_limit_retries: u32,
    /// Wait between generation and the first upscale.
    pub settle_delay: Duration,
    /// Settle wait used when the original is still ephemeral.
    pub ephemeral_settle_delay: Duration,
    /// Gap between upscales in sequential mode.
    pub sequential_delay: Duration,
    /// Start offset between variants in concurrent mode.
    pub concurrent_stagger: Duration,
    /// How long terminal tasks stay in the registry.
    pub task_ttl: Duration,
    pub sweep_interval: Duration,
    /// Upper bound for a synchronous full generation wait.
    pub wait_cap: Duration,
    /// Candidate upscale custom ids, tried in order.
    pub upscale_templates: Vec<TokenTemplate>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resolver_attempts: 15,
            resolver_interval: Duration::from_secs(2),
            resolution_budget: Duration::from_secs(45),
            result_attempts: 30,
            result_interval: Duration::from_secs(2),
            message_window: 50,
            rate_limit_retries: 5,
            settle_delay: Duration::from_secs(5),
            ephemeral_settle_delay: Duration::from_secs(12),
            sequential_delay: Duration::from_secs(3),
            concurrent_stagger: Duration::from_millis(750),
            task_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(30),
            wait_cap: Duration::from_secs(300),
            upscale_templates: default_upscale_templates(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                 |
    /// |--------------------------------|-------------------------|
    /// | `RESOLVER_MAX_ATTEMPTS`        | `15`                    |
    /// | `RESOLVER_INTERVAL_SECS`       | `2`                     |
    /// | `RESOLUTION_BUDGET_SECS`       | `45`                    |
    /// | `UPSCALE_RESULT_ATTEMPTS`      | `30`                    |
    /// | `UPSCALE_RESULT_INTERVAL_SECS` | `2`                     |
    /// | `UPSCALE_MESSAGE_WINDOW`       | `50`                    |
    /// | `RATE_LIMIT_RETRIES`           | `5`                     |
    /// | `SETTLE_DELAY_SECS`            | `5`                     |
    /// | `EPHEMERAL_SETTLE_DELAY_SECS`  | `12`                    |
    /// | `SEQUENTIAL_DELAY_SECS`        | `3`                     |
    /// | `CONCURRENT_STAGGER_MS`        | `750`                   |
    /// | `TASK_TTL_SECS`                | `300`                   |
    /// | `SWEEP_INTERVAL_SECS`          | `30`                    |
    /// | `FULL_WAIT_CAP_SECS`           | `300`                   |
    /// | `UPSCALE_TOKEN_TEMPLATES`      | built-in list, `\|`-separated |
    pub fn from_env() -> Result<Self, ConfigError> {
        let upscale_templates = match env_opt("UPSCALE_TOKEN_TEMPLATES") {
            Some(raw) => parse_template_list(&raw).map_err(|e| ConfigError::Invalid {
                key: "UPSCALE_TOKEN_TEMPLATES",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => default_upscale_templates(),
        };

        Ok(Self {
            resolver_attempts: env_or("RESOLVER_MAX_ATTEMPTS", 15)?,
            resolver_interval: env_secs("RESOLVER_INTERVAL_SECS", 2)?,
            resolution_budget: env_secs("RESOLUTION_BUDGET_SECS", 45)?,
            result_attempts: env_or("UPSCALE_RESULT_ATTEMPTS", 30)?,
            result_interval: env_secs("UPSCALE_RESULT_INTERVAL_SECS", 2)?,
            message_window: env_or("UPSCALE_MESSAGE_WINDOW", 50)?,
            rate_limit_retries: env_or("RATE_LIMIT_RETRIES", 5)?,
            settle_delay: env_secs("SETTLE_DELAY_SECS", 5)?,
            ephemeral_settle_delay: env_secs("EPHEMERAL_SETTLE_DELAY_SECS", 12)?,
            sequential_delay: env_secs("SEQUENTIAL_DELAY_SECS", 3)?,
            concurrent_stagger: env_millis("CONCURRENT_STAGGER_MS", 750)?,
            task_ttl: env_secs("TASK_TTL_SECS", 300)?,
            sweep_interval: env_secs("SWEEP_INTERVAL_SECS", 30)?,
            wait_cap: env_secs("FULL_WAIT_CAP_SECS", 300)?,
            upscale_templates,
        })
    }

    pub fn resolver_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.resolver_attempts, self.resolver_interval)
    }

    pub fn result_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.result_attempts, self.result_interval)
    }
}
