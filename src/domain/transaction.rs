use super::payment::{Direction, TransactionId, TransactionStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Immutable entry of the transaction ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub transaction_id: TransactionId,
    pub r#type: Direction,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
}

/// Which ledger entries a history view shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryFilter {
    #[default]
    All,
    Credit,
    Debit,
    /// Entries that are either credits or debits.
    CreditDebit,
}

impl HistoryFilter {
    pub fn matches(&self, record: &TransactionRecord) -> bool {
        match self {
            HistoryFilter::All => true,
            HistoryFilter::Credit => record.r#type == Direction::Credit,
            HistoryFilter::Debit => record.r#type == Direction::Debit,
            HistoryFilter::CreditDebit => {
                matches!(record.r#type, Direction::Credit | Direction::Debit)
            }
        }
    }

    pub fn apply(&self, records: &[TransactionRecord]) -> Vec<TransactionRecord> {
        records
            .iter()
            .filter(|record| self.matches(record))
            .cloned()
            .collect()
    }
}

impl FromStr for HistoryFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(HistoryFilter::All),
            "credit" => Ok(HistoryFilter::Credit),
            "debit" => Ok(HistoryFilter::Debit),
            "credit-debit" => Ok(HistoryFilter::CreditDebit),
            other => Err(format!(
                "unknown filter '{other}', expected all, credit, debit or credit-debit"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(id: &str, r#type: Direction) -> TransactionRecord {
        TransactionRecord {
            transaction_id: TransactionId::new(id),
            r#type,
            amount: dec!(10),
            status: TransactionStatus::Success,
            timestamp: Utc::now(),
            description: String::new(),
        }
    }

    #[test]
    fn test_filters() {
        let records = vec![
            record("1", Direction::Credit),
            record("2", Direction::Debit),
            record("3", Direction::Credit),
        ];
        assert_eq!(HistoryFilter::All.apply(&records).len(), 3);
        assert_eq!(HistoryFilter::Credit.apply(&records).len(), 2);
        assert_eq!(HistoryFilter::Debit.apply(&records).len(), 1);
        assert_eq!(HistoryFilter::CreditDebit.apply(&records).len(), 3);
    }

    #[test]
    fn test_filter_parsing() {
        assert_eq!(
            "credit-debit".parse::<HistoryFilter>().unwrap(),
            HistoryFilter::CreditDebit
        );
        assert!("refund".parse::<HistoryFilter>().is_err());
    }

    #[test]
    fn test_record_deserialization() {
        let json = r#"{
            "transactionId": "TXN9",
            "type": "debit",
            "amount": "500",
            "status": "Pending",
            "timestamp": "2025-03-01T10:00:00Z"
        }"#;
        let record: TransactionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.r#type, Direction::Debit);
        assert_eq!(record.status, TransactionStatus::Pending);
        assert_eq!(record.description, "");
    }
}
