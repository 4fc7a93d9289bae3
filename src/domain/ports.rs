use super::balance::{Amount, WalletBalance};
use super::bank_account::{BankAccount, BankAccountId};
use super::payment::{Direction, PaymentHandoff, PaymentMethod, StatusReport, TransactionId};
use super::transaction::{HistoryFilter, TransactionRecord};
use crate::error::{RemoteFault, StorageFault};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Durable key/value cache surviving process restarts. No logic lives here.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageFault>;
    async fn set(&self, key: &str, value: String) -> Result<(), StorageFault>;
    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageFault>;
}

/// Request/response façade over the backend.
///
/// Every call may be retried safely except [`LedgerClient::initiate_payment`]:
/// a second call creates a second transaction on the server.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn fetch_balance(&self, account_ref: &str) -> Result<WalletBalance, RemoteFault>;

    async fn initiate_payment(
        &self,
        amount: Amount,
        direction: Direction,
        method: &PaymentMethod,
    ) -> Result<PaymentHandoff, RemoteFault>;

    async fn poll_status(&self, transaction_id: &TransactionId)
    -> Result<StatusReport, RemoteFault>;

    async fn fetch_history(
        &self,
        filter: HistoryFilter,
    ) -> Result<Vec<TransactionRecord>, RemoteFault>;

    async fn apply_bank_transfer(
        &self,
        bank_account: &BankAccountId,
        amount: Amount,
        direction: Direction,
    ) -> Result<WalletBalance, RemoteFault>;

    async fn fetch_bank_accounts(&self) -> Result<Vec<BankAccount>, RemoteFault>;
}

/// One server push connection.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Opens a connection. The receiver yields every balance the server
    /// emits and ends when the connection drops.
    async fn connect(&self) -> Result<mpsc::Receiver<WalletBalance>, RemoteFault>;
}

/// The platform's capability to open a URI in another application.
pub trait Platform: Send + Sync {
    fn can_open(&self, uri: &str) -> bool;
    /// Fire and forget; nothing about the other application is observable.
    fn open(&self, uri: &str);
}

pub type StateStoreBox = Box<dyn StateStore>;
pub type LedgerClientRef = Arc<dyn LedgerClient>;
pub type PushTransportRef = Arc<dyn PushTransport>;
pub type PlatformRef = Arc<dyn Platform>;
