//! Masking of sensitive values in log output
//!
//! Owner ids keep their first and last three characters, amounts and
//! balances are hidden entirely. Masking is disabled only through
//! `mask_sensitive_logs: false` in development configs.

use rust_decimal::Decimal;

use crate::core_types::OwnerId;

const HIDDEN: &str = "***";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogMask {
    enabled: bool,
}

impl Default for LogMask {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl LogMask {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Pass values through unchanged
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn owner(&self, owner_id: &OwnerId) -> String {
        self.id_str(&owner_id.to_string())
    }

    pub fn amount(&self, amount: &Decimal) -> String {
        if self.enabled {
            HIDDEN.to_string()
        } else {
            amount.to_string()
        }
    }

    fn id_str(&self, id: &str) -> String {
        if !self.enabled {
            return id.to_string();
        }
        let chars: Vec<char> = id.chars().collect();
        if chars.len() <= 6 {
            return HIDDEN.to_string();
        }
        let head: String = chars[..3].iter().collect();
        let tail: String = chars[chars.len() - 3..].iter().collect();
        format!("{head}{HIDDEN}{tail}")
    }
}
