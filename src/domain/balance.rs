use crate::error::{Result, WalletError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a positive monetary amount for a payment or transfer.
///
/// Ensures that amounts handed to the backend are always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(WalletError::InvalidAmount(format!(
                "{value} is not a positive amount"
            )))
        }
    }

    /// Like [`Amount::new`], additionally rejecting values above `limit`.
    pub fn within(value: Decimal, limit: Option<Decimal>) -> Result<Self> {
        let amount = Self::new(value)?;
        match limit {
            Some(limit) if value > limit => Err(WalletError::InvalidAmount(format!(
                "{value} exceeds the limit of {limit}"
            ))),
            _ => Ok(amount),
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = WalletError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which input channel produced a balance value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BalanceSource {
    InitialFetch,
    Push,
    Poll,
    /// An explicit refresh, including the catch-up fetch after a push reconnect.
    Refresh,
    /// The response of a bank transfer.
    Transfer,
}

/// A server-declared wallet total.
///
/// The client never does arithmetic on it: a newer value replaces an older
/// one wholesale, and "newer" is decided by `as_of_sequence` alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalance {
    pub amount: Decimal,
    pub as_of_sequence: u64,
    pub source: BalanceSource,
}

impl WalletBalance {
    pub fn new(amount: Decimal, as_of_sequence: u64, source: BalanceSource) -> Result<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(WalletError::InvalidAmount(format!(
                "balance {amount} is negative"
            )));
        }
        Ok(Self {
            amount,
            as_of_sequence,
            source,
        })
    }

    pub fn with_source(mut self, source: BalanceSource) -> Self {
        self.source = source;
        self
    }
}

/// Result of offering a balance to a [`BalanceCell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The offered value was not fresher than the held one and was dropped.
    Stale { current_sequence: u64 },
}

/// Holds the single authoritative balance and enforces highest-sequence-wins.
///
/// Offering the same set of values in any order, any number of times, always
/// leaves the cell at the value with the largest sequence.
#[derive(Debug, Clone, Default)]
pub struct BalanceCell {
    current: Option<WalletBalance>,
}

impl BalanceCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&WalletBalance> {
        self.current.as_ref()
    }

    pub fn offer(&mut self, update: WalletBalance) -> ApplyOutcome {
        match &self.current {
            Some(current) if update.as_of_sequence <= current.as_of_sequence => {
                ApplyOutcome::Stale {
                    current_sequence: current.as_of_sequence,
                }
            }
            _ => {
                self.current = Some(update);
                ApplyOutcome::Applied
            }
        }
    }
}
