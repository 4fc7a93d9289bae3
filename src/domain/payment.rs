use super::balance::{Amount, WalletBalance};
use super::bank_account::BankAccountId;
use crate::error::WalletError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque, server-issued payment identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether money moves into (`Credit`) or out of (`Debit`) the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "credit" => Ok(Direction::Credit),
            "debit" => Ok(Direction::Debit),
            other => Err(format!("unknown direction '{other}', expected credit or debit")),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Credit => f.write_str("credit"),
            Direction::Debit => f.write_str("debit"),
        }
    }
}

/// How the external application should settle the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PaymentMethod {
    Upi,
    #[serde(rename_all = "camelCase")]
    BankAccount { account_id: BankAccountId },
}

impl FromStr for PaymentMethod {
    type Err = String;

    /// Accepts `upi` or `bank:<account id>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("upi") {
            return Ok(PaymentMethod::Upi);
        }
        match s.split_once(':') {
            Some(("bank", id)) if !id.is_empty() => Ok(PaymentMethod::BankAccount {
                account_id: BankAccountId::new(id),
            }),
            _ => Err(format!(
                "unknown payment method '{s}', expected upi or bank:<account id>"
            )),
        }
    }
}

/// Status of a transaction as declared by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[serde(alias = "Success")]
    Success,
    #[serde(alias = "Pending")]
    Pending,
    #[serde(alias = "Failed")]
    Failed,
}

/// States of the payment flow state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentState {
    #[default]
    Idle,
    AmountSelected,
    Initiating,
    AwaitingExternalConfirmation,
    Polling,
    Succeeded,
    Failed,
    /// Polling gave up; the server may still settle the transaction later.
    Expired,
}

impl PaymentState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PaymentState::Succeeded | PaymentState::Failed | PaymentState::Expired
        )
    }

    pub fn can_transition_to(self, next: PaymentState) -> bool {
        use PaymentState::*;
        match (self, next) {
            (Idle, AmountSelected) => true,
            (AmountSelected, AmountSelected | Initiating) => true,
            (Initiating, AwaitingExternalConfirmation | Failed) => true,
            (AwaitingExternalConfirmation, Polling | Failed) => true,
            (Polling, Polling | Succeeded | Failed | Expired) => true,
            // A fresh attempt after a terminal outcome.
            (Succeeded | Failed | Expired, AmountSelected) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentState::Idle => "idle",
            PaymentState::AmountSelected => "amount-selected",
            PaymentState::Initiating => "initiating",
            PaymentState::AwaitingExternalConfirmation => "awaiting-external-confirmation",
            PaymentState::Polling => "polling",
            PaymentState::Succeeded => "succeeded",
            PaymentState::Failed => "failed",
            PaymentState::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// The amount a user confirmed, before the server has issued a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaymentSelection {
    pub amount: Amount,
    pub direction: Direction,
}

/// What the backend hands back when a payment is initiated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentHandoff {
    pub transaction_id: TransactionId,
    pub handoff_uri: String,
}

/// One poll result. `balance` is present when the server reports the
/// resulting wallet total alongside the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: TransactionStatus,
    pub balance: Option<WalletBalance>,
}

impl StatusReport {
    pub fn bare(status: TransactionStatus) -> Self {
        Self {
            status,
            balance: None,
        }
    }
}

/// One in-flight attempt to move money through an external handoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub transaction_id: TransactionId,
    pub amount: Amount,
    pub direction: Direction,
    pub state: PaymentState,
    pub created_at: DateTime<Utc>,
    pub poll_attempts: u32,
    #[serde(skip)]
    pub handoff_uri: String,
}

impl PaymentIntent {
    pub fn new(selection: PaymentSelection, handoff: PaymentHandoff) -> Self {
        Self {
            transaction_id: handoff.transaction_id,
            amount: selection.amount,
            direction: selection.direction,
            state: PaymentState::Initiating,
            created_at: Utc::now(),
            poll_attempts: 0,
            handoff_uri: handoff.handoff_uri,
        }
    }

    /// Moves the intent along one legal edge of the state machine.
    pub fn advance(&mut self, next: PaymentState) -> Result<(), WalletError> {
        if !self.state.can_transition_to(next) {
            return Err(WalletError::InvalidState(format!(
                "payment {} cannot move from {} to {}",
                self.transaction_id, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }
}

/// Terminal result of one payment flow, reported exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub state: PaymentState,
    pub selection: PaymentSelection,
    /// Absent when initiation itself failed.
    pub intent: Option<PaymentIntent>,
    pub error: Option<WalletError>,
    /// Balance the server reported together with a final status.
    pub reported_balance: Option<WalletBalance>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn intent() -> PaymentIntent {
        PaymentIntent::new(
            PaymentSelection {
                amount: Amount::new(dec!(25)).unwrap(),
                direction: Direction::Credit,
            },
            PaymentHandoff {
                transaction_id: TransactionId::new("TXN1"),
                handoff_uri: "upi://pay?tr=TXN1".to_string(),
            },
        )
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut intent = intent();
        intent
            .advance(PaymentState::AwaitingExternalConfirmation)
            .unwrap();
        intent.advance(PaymentState::Polling).unwrap();
        intent.advance(PaymentState::Polling).unwrap();
        intent.advance(PaymentState::Succeeded).unwrap();
        assert!(intent.state.is_terminal());
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let mut intent = intent();
        let result = intent.advance(PaymentState::Succeeded);
        assert!(matches!(result, Err(WalletError::InvalidState(_))));
        assert_eq!(intent.state, PaymentState::Initiating);
    }

    #[test]
    fn test_terminal_states_only_restart_via_selection() {
        for terminal in [
            PaymentState::Succeeded,
            PaymentState::Failed,
            PaymentState::Expired,
        ] {
            assert!(terminal.can_transition_to(PaymentState::AmountSelected));
            assert!(!terminal.can_transition_to(PaymentState::Polling));
            assert!(!terminal.can_transition_to(PaymentState::Initiating));
        }
    }

    #[test]
    fn test_polling_exits_only_to_terminal_states() {
        let exits: Vec<_> = [
            PaymentState::Idle,
            PaymentState::AmountSelected,
            PaymentState::Initiating,
            PaymentState::AwaitingExternalConfirmation,
            PaymentState::Succeeded,
            PaymentState::Failed,
            PaymentState::Expired,
        ]
        .into_iter()
        .filter(|next| PaymentState::Polling.can_transition_to(*next))
        .collect();
        assert!(exits.iter().all(|s| s.is_terminal()));
        assert_eq!(exits.len(), 3);
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("UPI".parse::<PaymentMethod>().unwrap(), PaymentMethod::Upi);
        assert_eq!(
            "bank:abc123".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::BankAccount {
                account_id: BankAccountId::new("abc123")
            }
        );
        assert!("bank:".parse::<PaymentMethod>().is_err());
        assert!("card".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_status_accepts_capitalised_values() {
        let status: TransactionStatus = serde_json::from_str("\"Pending\"").unwrap();
        assert_eq!(status, TransactionStatus::Pending);
        let status: TransactionStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(status, TransactionStatus::Failed);
    }
}
