use crate::config::WalletConfig;
use crate::domain::balance::{Amount, BalanceSource, WalletBalance};
use crate::domain::bank_account::{BankAccount, BankAccountId};
use crate::domain::payment::{
    Direction, PaymentHandoff, PaymentMethod, StatusReport, TransactionId, TransactionStatus,
};
use crate::domain::ports::LedgerClient;
use crate::domain::transaction::{HistoryFilter, TransactionRecord};
use crate::error::{RemoteFault, WalletError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Every backend response is wrapped in `{success, message?, ...}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(flatten)]
    body: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceBody {
    balance: Option<Decimal>,
    as_of_sequence: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitiateBody {
    transaction_id: Option<String>,
    payment_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    status: Option<TransactionStatus>,
    balance: Option<Decimal>,
    as_of_sequence: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct HistoryBody {
    #[serde(default)]
    transactions: Vec<TransactionRecord>,
}

#[derive(Debug, Deserialize)]
struct AccountsBody {
    #[serde(default)]
    accounts: Vec<BankAccount>,
}

#[derive(Debug, Serialize)]
struct InitiateRequest<'a> {
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    direction: Direction,
    method: &'a PaymentMethod,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferRequest<'a> {
    account_id: &'a BankAccountId,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
}

/// Turns an HTTP status and body into the envelope payload, classifying
/// failures by who is at fault.
fn decode<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, RemoteFault> {
    let envelope = serde_json::from_str::<Envelope<T>>(body);
    let message = |fallback: &str| match &envelope {
        Ok(Envelope {
            message: Some(message),
            ..
        }) => message.clone(),
        _ => fallback.to_string(),
    };

    match status {
        400..=499 => return Err(RemoteFault::client(status, message("request rejected"))),
        500..=599 => return Err(RemoteFault::server(status, message("server error"))),
        _ => {}
    }

    let envelope = envelope
        .map_err(|e| RemoteFault::server(status, format!("malformed response: {e}")))?;
    if !envelope.success {
        let reason = envelope
            .message
            .unwrap_or_else(|| "request was not successful".to_string());
        return Err(RemoteFault::client(status, reason));
    }
    Ok(envelope.body)
}

fn missing(status: u16, field: &str) -> RemoteFault {
    RemoteFault::server(status, format!("response is missing `{field}`"))
}

fn balance_from(
    status: u16,
    amount: Option<Decimal>,
    sequence: Option<u64>,
    source: BalanceSource,
) -> Result<WalletBalance, RemoteFault> {
    let amount = amount.ok_or_else(|| missing(status, "balance"))?;
    let sequence = sequence.ok_or_else(|| missing(status, "asOfSequence"))?;
    WalletBalance::new(amount, sequence, source).map_err(|e| RemoteFault::server(status, e.to_string()))
}

/// Ledger client speaking JSON over HTTP to the wallet backend.
pub struct HttpLedgerClient {
    client: Client,
    base_url: Url,
}

impl HttpLedgerClient {
    pub fn new(config: &WalletConfig) -> Result<Self, WalletError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| WalletError::Config(format!("base_url {}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(WalletError::Config(format!(
                "base_url {} cannot hold a path",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| WalletError::Config(format!("http client: {e}")))?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<(u16, T), RemoteFault> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteFault::unreachable(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteFault::unreachable(e.to_string()))?;
        tracing::trace!(status, body = %body, "ledger response");
        decode(status, &body).map(|payload| (status, payload))
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn fetch_balance(&self, account_ref: &str) -> Result<WalletBalance, RemoteFault> {
        let request = self
            .client
            .get(self.endpoint(&["api", "wallet", "balance"]))
            .query(&[("account", account_ref)]);
        let (status, body): (u16, BalanceBody) = self.call(request).await?;
        balance_from(status, body.balance, body.as_of_sequence, BalanceSource::Refresh)
    }

    async fn initiate_payment(
        &self,
        amount: Amount,
        direction: Direction,
        method: &PaymentMethod,
    ) -> Result<PaymentHandoff, RemoteFault> {
        let request = self
            .client
            .post(self.endpoint(&["payment", "initiate"]))
            .json(&InitiateRequest {
                amount: amount.value(),
                direction,
                method,
            });
        let (status, body): (u16, InitiateBody) = self.call(request).await?;
        Ok(PaymentHandoff {
            transaction_id: TransactionId::new(
                body.transaction_id
                    .ok_or_else(|| missing(status, "transactionId"))?,
            ),
            handoff_uri: body.payment_url.ok_or_else(|| missing(status, "paymentUrl"))?,
        })
    }

    async fn poll_status(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<StatusReport, RemoteFault> {
        let request = self
            .client
            .get(self.endpoint(&["payment", "status", transaction_id.as_str()]));
        let (status, body): (u16, StatusBody) = self.call(request).await?;
        let tx_status = body.status.ok_or_else(|| missing(status, "status"))?;
        let balance = match (body.balance, body.as_of_sequence) {
            (Some(amount), Some(sequence)) => Some(balance_from(
                status,
                Some(amount),
                Some(sequence),
                BalanceSource::Poll,
            )?),
            // A balance without a sequence cannot be ordered; ignore it.
            _ => None,
        };
        Ok(StatusReport {
            status: tx_status,
            balance,
        })
    }

    async fn fetch_history(
        &self,
        filter: HistoryFilter,
    ) -> Result<Vec<TransactionRecord>, RemoteFault> {
        let request = self.client.get(self.endpoint(&["transaction", "history"]));
        let (_, body): (u16, HistoryBody) = self.call(request).await?;
        Ok(filter.apply(&body.transactions))
    }

    async fn apply_bank_transfer(
        &self,
        bank_account: &BankAccountId,
        amount: Amount,
        direction: Direction,
    ) -> Result<WalletBalance, RemoteFault> {
        let action = match direction {
            Direction::Credit => "add",
            Direction::Debit => "deduct",
        };
        let request = self
            .client
            .post(self.endpoint(&["api", "wallet", action]))
            .json(&TransferRequest {
                account_id: bank_account,
                amount: amount.value(),
            });
        let (status, body): (u16, BalanceBody) = self.call(request).await?;
        balance_from(status, body.balance, body.as_of_sequence, BalanceSource::Transfer)
    }

    async fn fetch_bank_accounts(&self) -> Result<Vec<BankAccount>, RemoteFault> {
        let request = self.client.get(self.endpoint(&["bank", "accounts"]));
        let (_, body): (u16, AccountsBody) = self.call(request).await?;
        Ok(body.accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FaultKind;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decode_balance() {
        let body: BalanceBody =
            decode(200, r#"{"success": true, "balance": 250.75, "asOfSequence": 12}"#).unwrap();
        let balance = balance_from(200, body.balance, body.as_of_sequence, BalanceSource::Refresh).unwrap();
        assert_eq!(balance.amount, dec!(250.75));
        assert_eq!(balance.as_of_sequence, 12);
    }

    #[test]
    fn test_unsuccessful_body_is_client_fault() {
        let fault = decode::<InitiateBody>(
            200,
            r#"{"success": false, "message": "Amount too large"}"#,
        )
        .unwrap_err();
        assert_eq!(fault.kind, FaultKind::Client { status: 200 });
        assert_eq!(fault.message, "Amount too large");
        assert!(!fault.is_retryable());
    }

    #[test]
    fn test_status_classification() {
        let fault = decode::<BalanceBody>(404, r#"{"success": false, "message": "no wallet"}"#)
            .unwrap_err();
        assert_eq!(fault.kind, FaultKind::Client { status: 404 });
        assert_eq!(fault.message, "no wallet");

        let fault = decode::<BalanceBody>(503, "<html>busy</html>").unwrap_err();
        assert_eq!(fault.kind, FaultKind::Server { status: 503 });
        assert!(fault.is_retryable());
    }

    #[test]
    fn test_malformed_success_body_is_server_fault() {
        let fault = decode::<BalanceBody>(200, "not json").unwrap_err();
        assert!(matches!(fault.kind, FaultKind::Server { status: 200 }));
    }

    #[test]
    fn test_missing_sequence_is_server_fault() {
        let body: BalanceBody = decode(200, r#"{"success": true, "balance": 5}"#).unwrap();
        let fault = balance_from(200, body.balance, body.as_of_sequence, BalanceSource::Refresh)
            .unwrap_err();
        assert!(fault.message.contains("asOfSequence"));
    }

    #[test]
    fn test_status_body_with_balance() {
        let body: StatusBody = decode(
            200,
            r#"{"success": true, "status": "success", "balance": "90", "asOfSequence": 7}"#,
        )
        .unwrap();
        assert_eq!(body.status, Some(TransactionStatus::Success));
        assert_eq!(body.balance, Some(dec!(90)));
    }

    #[test]
    fn test_endpoint_building() {
        let config = WalletConfig {
            base_url: "http://wallet.test/v1/".to_string(),
            ..WalletConfig::default()
        };
        let client = HttpLedgerClient::new(&config).unwrap();
        let url = client.endpoint(&["payment", "status", "TXN 1"]);
        assert_eq!(url.as_str(), "http://wallet.test/v1/payment/status/TXN%201");
    }

    #[test]
    fn test_invalid_base_url() {
        let config = WalletConfig {
            base_url: "mailto:wallet@test".to_string(),
            ..WalletConfig::default()
        };
        assert!(matches!(
            HttpLedgerClient::new(&config),
            Err(WalletError::Config(_))
        ));
    }

    #[test]
    fn test_initiate_request_shape() {
        let method = PaymentMethod::Upi;
        let request = InitiateRequest {
            amount: dec!(120.5),
            direction: Direction::Credit,
            method: &method,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["amount"], serde_json::json!(120.5));
        assert_eq!(json["direction"], "credit");
        assert_eq!(json["method"]["kind"], "upi");
    }
}
