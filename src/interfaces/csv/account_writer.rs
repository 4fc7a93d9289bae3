use crate::domain::bank_account::BankAccount;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct AccountRow<'a> {
    id: &'a str,
    account_holder: &'a str,
    account_number: String,
    ifsc_code: &'a str,
}

/// Keeps the last four digits visible.
fn mask(number: &str) -> String {
    let visible = number.len().saturating_sub(4);
    number
        .char_indices()
        .map(|(i, c)| if i < visible { '*' } else { c })
        .collect()
}

/// Writes linked bank accounts as CSV with masked account numbers.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_accounts(&mut self, accounts: &[BankAccount]) -> Result<()> {
        if accounts.is_empty() {
            self.writer
                .write_record(["id", "account_holder", "account_number", "ifsc_code"])?;
        }
        for account in accounts {
            self.writer.serialize(AccountRow {
                id: account.id.as_str(),
                account_holder: &account.account_holder,
                account_number: mask(&account.account_number),
                ifsc_code: &account.ifsc_code,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bank_account::BankAccountId;

    #[test]
    fn test_mask() {
        assert_eq!(mask("123456789012"), "********9012");
        assert_eq!(mask("12"), "12");
    }

    #[test]
    fn test_accounts_csv() {
        let accounts = vec![BankAccount {
            id: BankAccountId::new("acc-1"),
            account_holder: "A. Sharma".to_string(),
            account_number: "001122334455".to_string(),
            ifsc_code: "HDFC0001234".to_string(),
        }];
        let mut out = Vec::new();
        AccountWriter::new(&mut out).write_accounts(&accounts).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "id,account_holder,account_number,ifsc_code\nacc-1,A. Sharma,********4455,HDFC0001234\n"
        );
    }
}
