use crate::error::{Result, WalletError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Runtime settings. Every field has a default so a partial JSON file works.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WalletConfig {
    pub base_url: String,
    pub push_url: Option<String>,
    pub account_ref: String,
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Time the user is given in the external application before polling starts.
    pub handoff_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub poll_interval_cap_ms: u64,
    pub max_poll_attempts: u32,
    pub reconnect_base_ms: u64,
    pub reconnect_cap_ms: u64,
    pub handled_uri_schemes: Vec<String>,
    pub log_level: String,
    pub offline_opening_balance: Decimal,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            push_url: None,
            account_ref: "primary".to_string(),
            request_timeout_ms: 5_000,
            connect_timeout_ms: 2_000,
            handoff_delay_ms: 5_000,
            poll_interval_ms: 2_000,
            poll_interval_cap_ms: 15_000,
            max_poll_attempts: 10,
            reconnect_base_ms: 1_000,
            reconnect_cap_ms: 30_000,
            handled_uri_schemes: vec!["upi".to_string(), "https".to_string()],
            log_level: "info".to_string(),
            offline_opening_balance: Decimal::ZERO,
        }
    }
}

/// Timers driving one payment flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentTiming {
    pub handoff_delay: Duration,
    pub poll_interval: Duration,
    pub poll_interval_cap: Duration,
    pub max_poll_attempts: u32,
}

impl PaymentTiming {
    /// Wait before poll number `attempt` (1-based) is retried: doubles from
    /// `poll_interval` and never exceeds `poll_interval_cap`.
    pub fn poll_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.poll_interval
            .saturating_mul(factor)
            .min(self.poll_interval_cap)
    }
}

/// Exponential reconnect schedule of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl ReconnectPolicy {
    /// Delay before reconnect number `attempt` (0-based): base, 2x, 4x, ... capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        WalletConfig::default().reconnect_policy()
    }
}

impl WalletConfig {
    /// Reads a JSON config file and validates it.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| WalletError::Config(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| WalletError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_poll_attempts == 0 {
            return Err(WalletError::Config(
                "max_poll_attempts must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(WalletError::Config(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.poll_interval_cap_ms < self.poll_interval_ms {
            return Err(WalletError::Config(
                "poll_interval_cap_ms is below poll_interval_ms".to_string(),
            ));
        }
        if self.reconnect_cap_ms < self.reconnect_base_ms {
            return Err(WalletError::Config(
                "reconnect_cap_ms is below reconnect_base_ms".to_string(),
            ));
        }
        if self.offline_opening_balance.is_sign_negative() && !self.offline_opening_balance.is_zero() {
            return Err(WalletError::Config(
                "offline_opening_balance cannot be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn payment_timing(&self) -> PaymentTiming {
        PaymentTiming {
            handoff_delay: Duration::from_millis(self.handoff_delay_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            poll_interval_cap: Duration::from_millis(self.poll_interval_cap_ms),
            max_poll_attempts: self.max_poll_attempts,
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base: Duration::from_millis(self.reconnect_base_ms),
            cap: Duration::from_millis(self.reconnect_cap_ms),
        }
    }
}
