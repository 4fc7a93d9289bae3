use crate::domain::payment::{Direction, TransactionStatus};
use crate::domain::transaction::TransactionRecord;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct HistoryRow<'a> {
    transaction_id: &'a str,
    r#type: Direction,
    amount: Decimal,
    status: TransactionStatus,
    timestamp: String,
    description: &'a str,
}

/// Writes ledger entries as CSV, one row per transaction.
pub struct HistoryWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> HistoryWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes the header and every record, then flushes. Amounts keep
    /// their scale as the server declared it.
    pub fn write_records(&mut self, records: &[TransactionRecord]) -> Result<()> {
        if records.is_empty() {
            self.writer.write_record([
                "transaction_id",
                "type",
                "amount",
                "status",
                "timestamp",
                "description",
            ])?;
        }
        for record in records {
            self.writer.serialize(HistoryRow {
                transaction_id: record.transaction_id.as_str(),
                r#type: record.r#type,
                amount: record.amount,
                status: record.status,
                timestamp: record.timestamp.to_rfc3339(),
                description: &record.description,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::TransactionId;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    #[test]
    fn test_history_csv() {
        let records = vec![TransactionRecord {
            transaction_id: TransactionId::new("TXN000001"),
            r#type: Direction::Credit,
            amount: dec!(50.00),
            status: TransactionStatus::Success,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            description: "Payment".to_string(),
        }];
        let mut out = Vec::new();
        HistoryWriter::new(&mut out).write_records(&records).unwrap();

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("transaction_id,type,amount,status,timestamp,description")
        );
        assert_eq!(
            lines.next(),
            Some("TXN000001,credit,50.00,success,2026-03-01T12:00:00+00:00,Payment")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_empty_history_still_has_header() {
        let mut out = Vec::new();
        HistoryWriter::new(&mut out).write_records(&[]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "transaction_id,type,amount,status,timestamp,description\n"
        );
    }
}
