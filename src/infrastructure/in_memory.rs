use crate::domain::balance::{Amount, BalanceSource, WalletBalance};
use crate::domain::bank_account::{BankAccount, BankAccountId};
use crate::domain::payment::{
    Direction, PaymentHandoff, PaymentMethod, StatusReport, TransactionId, TransactionStatus,
};
use crate::domain::ports::{LedgerClient, PushTransport, StateStore};
use crate::domain::transaction::{HistoryFilter, TransactionRecord};
use crate::error::{RemoteFault, StorageFault};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{RwLock, mpsc};

/// A thread-safe in-memory key/value store.
///
/// Clones share the same map, so a test can keep a handle on a store it
/// has boxed into the engine. Faults can be injected to exercise the
/// degraded path.
#[derive(Default, Clone)]
pub struct InMemoryStateStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `set` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageFault> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageFault::new("injected read fault"));
        }
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageFault> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageFault::new("injected write fault"));
        }
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageFault> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageFault::new("injected write fault"));
        }
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Push transport whose connections are driven by hand.
#[derive(Default, Clone)]
pub struct InMemoryPushTransport {
    sender: Arc<Mutex<Option<mpsc::Sender<WalletBalance>>>>,
    connects: Arc<AtomicUsize>,
    failures_pending: Arc<AtomicU32>,
}

impl InMemoryPushTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers a balance on the live connection. Returns false when there
    /// is none; nothing is queued for later connections.
    pub fn emit(&self, balance: WalletBalance) -> bool {
        let sender = lock(&self.sender);
        match sender.as_ref() {
            Some(tx) => tx.try_send(balance.with_source(BalanceSource::Push)).is_ok(),
            None => false,
        }
    }

    /// Simulates the transport dropping under the client.
    pub fn drop_connection(&self) {
        lock(&self.sender).take();
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.sender).as_ref().is_some_and(|tx| !tx.is_closed())
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Makes the next `n` connection attempts fail as unreachable.
    pub fn fail_next_connects(&self, n: u32) {
        self.failures_pending.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl PushTransport for InMemoryPushTransport {
    async fn connect(&self) -> Result<mpsc::Receiver<WalletBalance>, RemoteFault> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RemoteFault::unreachable("injected connect failure"));
        }
        let (tx, rx) = mpsc::channel(64);
        *lock(&self.sender) = Some(tx);
        Ok(rx)
    }
}

/// How the simulated backend resolves initiated payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    /// Polls answered with `pending` before the outcome is revealed.
    pub pending_polls: u32,
    pub outcome: TransactionStatus,
    /// Whether the final status carries the resulting balance.
    pub report_balance: bool,
}

impl Default for Settlement {
    fn default() -> Self {
        Self {
            pending_polls: 1,
            outcome: TransactionStatus::Success,
            report_balance: false,
        }
    }
}

#[derive(Debug)]
struct SimulatedPayment {
    amount: Decimal,
    direction: Direction,
    pending_polls: u32,
    settled: Option<StatusReport>,
}

#[derive(Debug, Default)]
struct LedgerState {
    balance: Decimal,
    sequence: u64,
    next_tx: u64,
    settlement: Settlement,
    payments: HashMap<TransactionId, SimulatedPayment>,
    history: Vec<TransactionRecord>,
    bank_accounts: Vec<BankAccount>,
    unreachable: bool,
    initiate_fault: Option<RemoteFault>,
}

impl LedgerState {
    fn snapshot(&self, source: BalanceSource) -> WalletBalance {
        WalletBalance {
            amount: self.balance,
            as_of_sequence: self.sequence,
            source,
        }
    }

    fn record(&mut self, id: TransactionId, direction: Direction, amount: Decimal, status: TransactionStatus, description: &str) {
        self.history.push(TransactionRecord {
            transaction_id: id,
            r#type: direction,
            amount,
            status,
            timestamp: Utc::now(),
            description: description.to_string(),
        });
    }
}

#[derive(Default)]
struct CallCounters {
    fetch_balance: AtomicUsize,
    initiate: AtomicUsize,
    poll: AtomicUsize,
    history: AtomicUsize,
    transfer: AtomicUsize,
}

/// A self-contained stand-in for the wallet backend.
///
/// Holds the authoritative balance and sequence, settles payments after a
/// configurable number of polls and, when a push transport is attached,
/// pushes every balance change to it.
#[derive(Clone)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    calls: Arc<CallCounters>,
    push: Option<InMemoryPushTransport>,
}

impl InMemoryLedger {
    pub fn new(opening_balance: Decimal) -> Self {
        let state = LedgerState {
            balance: opening_balance,
            sequence: 1,
            next_tx: 1,
            ..LedgerState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            calls: Arc::new(CallCounters::default()),
            push: None,
        }
    }

    pub fn with_settlement(self, settlement: Settlement) -> Self {
        self.state().settlement = settlement;
        self
    }

    pub fn with_push(mut self, push: InMemoryPushTransport) -> Self {
        self.push = Some(push);
        self
    }

    pub fn with_bank_account(self, account: BankAccount) -> Self {
        self.state().bank_accounts.push(account);
        self
    }

    /// Every call fails as unreachable while set.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    pub fn fail_next_initiate(&self, fault: RemoteFault) {
        self.state().initiate_fault = Some(fault);
    }

    /// A server-side balance change outside of any client request.
    pub fn set_balance(&self, amount: Decimal) -> WalletBalance {
        let mut state = self.state();
        state.balance = amount;
        state.sequence += 1;
        let balance = state.snapshot(BalanceSource::Push);
        drop(state);
        self.push_balance(balance.clone());
        balance
    }

    pub fn current_balance(&self) -> WalletBalance {
        self.state().snapshot(BalanceSource::Refresh)
    }

    pub fn fetch_balance_calls(&self) -> usize {
        self.calls.fetch_balance.load(Ordering::SeqCst)
    }

    pub fn initiate_calls(&self) -> usize {
        self.calls.initiate.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.calls.poll.load(Ordering::SeqCst)
    }

    pub fn history_calls(&self) -> usize {
        self.calls.history.load(Ordering::SeqCst)
    }

    pub fn transfer_calls(&self) -> usize {
        self.calls.transfer.load(Ordering::SeqCst)
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        lock(&self.state)
    }

    fn reachable(&self) -> Result<MutexGuard<'_, LedgerState>, RemoteFault> {
        let state = self.state();
        if state.unreachable {
            return Err(RemoteFault::unreachable("in-memory ledger is offline"));
        }
        Ok(state)
    }

    fn push_balance(&self, balance: WalletBalance) {
        if let Some(push) = &self.push {
            push.emit(balance);
        }
    }

    /// Moves funds server-side; debits beyond the balance are refused.
    fn settle_funds(state: &mut LedgerState, amount: Decimal, direction: Direction) -> bool {
        match direction {
            Direction::Credit => state.balance += amount,
            Direction::Debit if state.balance >= amount => state.balance -= amount,
            Direction::Debit => return false,
        }
        state.sequence += 1;
        true
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn fetch_balance(&self, _account_ref: &str) -> Result<WalletBalance, RemoteFault> {
        self.calls.fetch_balance.fetch_add(1, Ordering::SeqCst);
        let state = self.reachable()?;
        Ok(state.snapshot(BalanceSource::Refresh))
    }

    async fn initiate_payment(
        &self,
        amount: Amount,
        direction: Direction,
        _method: &PaymentMethod,
    ) -> Result<PaymentHandoff, RemoteFault> {
        self.calls.initiate.fetch_add(1, Ordering::SeqCst);
        let mut state = self.reachable()?;
        if let Some(fault) = state.initiate_fault.take() {
            return Err(fault);
        }

        let transaction_id = TransactionId::new(format!("TXN{:06}", state.next_tx));
        state.next_tx += 1;
        let pending_polls = state.settlement.pending_polls;
        state.payments.insert(
            transaction_id.clone(),
            SimulatedPayment {
                amount: amount.value(),
                direction,
                pending_polls,
                settled: None,
            },
        );
        let handoff_uri = format!("upi://pay?tr={transaction_id}&am={amount}&cu=INR");
        Ok(PaymentHandoff {
            transaction_id,
            handoff_uri,
        })
    }

    async fn poll_status(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<StatusReport, RemoteFault> {
        self.calls.poll.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.reachable()?;
        let state = &mut *guard;
        let settlement = state.settlement;

        let Some(payment) = state.payments.get_mut(transaction_id) else {
            return Err(RemoteFault::client(404, format!("unknown transaction {transaction_id}")));
        };
        if let Some(report) = &payment.settled {
            return Ok(report.clone());
        }
        if payment.pending_polls > 0 {
            payment.pending_polls -= 1;
            return Ok(StatusReport::bare(TransactionStatus::Pending));
        }
        if settlement.outcome == TransactionStatus::Pending {
            return Ok(StatusReport::bare(TransactionStatus::Pending));
        }

        let (amount, direction) = (payment.amount, payment.direction);
        let status = match settlement.outcome {
            TransactionStatus::Success if Self::settle_funds(state, amount, direction) => {
                TransactionStatus::Success
            }
            _ => TransactionStatus::Failed,
        };
        let balance = state.snapshot(BalanceSource::Poll);
        let report = StatusReport {
            status,
            balance: settlement.report_balance.then(|| balance.clone()),
        };
        if let Some(payment) = state.payments.get_mut(transaction_id) {
            payment.settled = Some(report.clone());
        }
        state.record(transaction_id.clone(), direction, amount, status, "Payment");
        drop(guard);

        if status == TransactionStatus::Success {
            self.push_balance(balance);
        }
        Ok(report)
    }

    async fn fetch_history(
        &self,
        filter: HistoryFilter,
    ) -> Result<Vec<TransactionRecord>, RemoteFault> {
        self.calls.history.fetch_add(1, Ordering::SeqCst);
        let state = self.reachable()?;
        Ok(filter.apply(&state.history))
    }

    async fn apply_bank_transfer(
        &self,
        bank_account: &BankAccountId,
        amount: Amount,
        direction: Direction,
    ) -> Result<WalletBalance, RemoteFault> {
        self.calls.transfer.fetch_add(1, Ordering::SeqCst);
        let mut state = self.reachable()?;
        if !state.bank_accounts.is_empty()
            && !state.bank_accounts.iter().any(|a| &a.id == bank_account)
        {
            return Err(RemoteFault::client(404, format!("unknown bank account {bank_account}")));
        }
        if !Self::settle_funds(&mut state, amount.value(), direction) {
            return Err(RemoteFault::client(422, "Insufficient balance"));
        }

        let id = TransactionId::new(format!("BT{:06}", state.next_tx));
        state.next_tx += 1;
        state.record(id, direction, amount.value(), TransactionStatus::Success, "Bank transfer");
        let balance = state.snapshot(BalanceSource::Transfer);
        drop(state);

        self.push_balance(balance.clone());
        Ok(balance)
    }

    async fn fetch_bank_accounts(&self) -> Result<Vec<BankAccount>, RemoteFault> {
        let state = self.reachable()?;
        Ok(state.bank_accounts.clone())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn amount(value: Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_state_store() {
        let store = InMemoryStateStore::new();
        store.set("walletBalance", "{}".to_string()).await.unwrap();
        assert_eq!(
            store.get("walletBalance").await.unwrap().as_deref(),
            Some("{}")
        );
        assert!(store.get("missing").await.unwrap().is_none());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_state_store_faults() {
        let store = InMemoryStateStore::new();
        store.set_fail_writes(true);
        assert!(store.set("k", "v".to_string()).await.is_err());
        store.set_fail_reads(true);
        assert!(store.get("k").await.is_err());
    }

    #[tokio::test]
    async fn test_payment_settles_after_pending_polls() {
        let ledger = InMemoryLedger::new(dec!(100)).with_settlement(Settlement {
            pending_polls: 2,
            ..Settlement::default()
        });
        let handoff = ledger
            .initiate_payment(amount(dec!(40)), Direction::Credit, &PaymentMethod::Upi)
            .await
            .unwrap();
        assert!(handoff.handoff_uri.starts_with("upi://"));

        let id = &handoff.transaction_id;
        for _ in 0..2 {
            let report = ledger.poll_status(id).await.unwrap();
            assert_eq!(report.status, TransactionStatus::Pending);
        }
        let report = ledger.poll_status(id).await.unwrap();
        assert_eq!(report.status, TransactionStatus::Success);
        assert!(report.balance.is_none());

        let balance = ledger.current_balance();
        assert_eq!(balance.amount, dec!(140));
        assert_eq!(balance.as_of_sequence, 2);

        // Settled payments answer the same status again without moving funds.
        ledger.poll_status(id).await.unwrap();
        assert_eq!(ledger.current_balance().amount, dec!(140));
    }

    #[tokio::test]
    async fn test_debit_beyond_balance_fails() {
        let ledger = InMemoryLedger::new(dec!(10)).with_settlement(Settlement {
            pending_polls: 0,
            ..Settlement::default()
        });
        let handoff = ledger
            .initiate_payment(amount(dec!(40)), Direction::Debit, &PaymentMethod::Upi)
            .await
            .unwrap();
        let report = ledger.poll_status(&handoff.transaction_id).await.unwrap();
        assert_eq!(report.status, TransactionStatus::Failed);
        assert_eq!(ledger.current_balance().amount, dec!(10));
    }

    #[tokio::test]
    async fn test_bank_transfer_and_history() {
        let ledger = InMemoryLedger::new(dec!(50));
        let account = BankAccountId::new("acc-1");

        let balance = ledger
            .apply_bank_transfer(&account, amount(dec!(20)), Direction::Debit)
            .await
            .unwrap();
        assert_eq!(balance.amount, dec!(30));
        assert_eq!(balance.source, BalanceSource::Transfer);

        let refused = ledger
            .apply_bank_transfer(&account, amount(dec!(31)), Direction::Debit)
            .await
            .unwrap_err();
        assert_eq!(refused.kind, crate::error::FaultKind::Client { status: 422 });

        let history = ledger.fetch_history(HistoryFilter::Debit).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(ledger.fetch_history(HistoryFilter::Credit).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_push_emitted_on_server_change() {
        let push = InMemoryPushTransport::new();
        let ledger = InMemoryLedger::new(dec!(5)).with_push(push.clone());
        let mut rx = push.connect().await.unwrap();

        let pushed = ledger.set_balance(dec!(75));
        let received = rx.recv().await.unwrap();
        assert_eq!(received, pushed);
        assert_eq!(received.source, BalanceSource::Push);
    }

    #[tokio::test]
    async fn test_push_transport_drop_and_failures() {
        let push = InMemoryPushTransport::new();
        push.fail_next_connects(1);
        assert!(push.connect().await.is_err());

        let mut rx = push.connect().await.unwrap();
        assert!(push.is_connected());
        push.drop_connection();
        assert!(rx.recv().await.is_none());
        assert!(!push.emit(WalletBalance::new(dec!(1), 9, BalanceSource::Push).unwrap()));
        assert_eq!(push.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_ledger() {
        let ledger = InMemoryLedger::new(dec!(5));
        ledger.set_unreachable(true);
        let fault = ledger.fetch_balance("primary").await.unwrap_err();
        assert!(fault.is_retryable());
        assert_eq!(ledger.fetch_balance_calls(), 1);
    }
}
