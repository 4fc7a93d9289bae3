use super::payment_flow::{FlowEvent, PaymentFlowController};
use super::push_channel::{PushEvent, PushUpdateChannel};
use crate::config::{ReconnectPolicy, WalletConfig};
use crate::domain::balance::{Amount, ApplyOutcome, BalanceCell, BalanceSource, WalletBalance};
use crate::domain::bank_account::{BankAccount, BankAccountId};
use crate::domain::payment::{
    Direction, PaymentIntent, PaymentMethod, PaymentOutcome, PaymentSelection, PaymentState,
    TransactionId, TransactionStatus,
};
use crate::domain::ports::{LedgerClientRef, PlatformRef, PushTransportRef, StateStoreBox};
use crate::domain::transaction::{HistoryFilter, TransactionRecord};
use crate::error::{RemoteFault, Result, WalletError};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Store key of the last applied balance.
pub const KEY_BALANCE: &str = "walletBalance";
/// Store key of the account the cached state belongs to.
pub const KEY_ACCOUNT_REF: &str = "session.accountRef";
/// Store key of the cached transaction ledger.
pub const KEY_HISTORY: &str = "transactionHistory";

/// Where the current payment attempt stands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentFlowView {
    pub state: PaymentState,
    pub selection: Option<PaymentSelection>,
    pub intent: Option<PaymentIntent>,
    /// A flow task is driving this payment.
    pub running: bool,
}

/// Read-only snapshot published to observers after every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletView {
    /// Absent until a cached or fetched balance exists.
    pub balance: Option<WalletBalance>,
    pub payment: PaymentFlowView,
    pub last_error: Option<WalletError>,
    pub push_connected: bool,
    /// Set after the first failed write; the cache is no longer updated.
    pub storage_degraded: bool,
}

enum Command {
    SelectAmount {
        amount: Decimal,
        direction: Direction,
        limit: Option<Decimal>,
        reply: oneshot::Sender<Result<PaymentSelection>>,
    },
    ConfirmPayment {
        method: PaymentMethod,
        reply: oneshot::Sender<Result<TransactionId>>,
    },
    CancelPayment {
        reply: oneshot::Sender<PaymentState>,
    },
    RefreshBalance {
        reply: oneshot::Sender<Result<WalletBalance>>,
    },
    Transfer {
        bank_account: BankAccountId,
        amount: Decimal,
        direction: Direction,
        reply: oneshot::Sender<Result<WalletBalance>>,
    },
    History {
        filter: HistoryFilter,
        reply: oneshot::Sender<Result<Vec<TransactionRecord>>>,
    },
    BankAccounts {
        reply: oneshot::Sender<Result<Vec<BankAccount>>>,
    },
    Shutdown {
        reply: oneshot::Sender<WalletView>,
    },
}

/// Results of work the actor handed off to spawned tasks.
enum Internal {
    Fetched {
        result: std::result::Result<WalletBalance, RemoteFault>,
        source: BalanceSource,
        reply: Option<oneshot::Sender<Result<WalletBalance>>>,
    },
    History {
        result: std::result::Result<Vec<TransactionRecord>, RemoteFault>,
        filter: HistoryFilter,
        reply: oneshot::Sender<Result<Vec<TransactionRecord>>>,
    },
    Flow {
        flow_id: u64,
        event: FlowEvent,
    },
}

/// Cloneable front door to a running engine.
///
/// Every mutating call is a message to the engine task, so calls from any
/// number of clones are applied one at a time in arrival order.
#[derive(Clone)]
pub struct WalletHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<WalletView>,
}

impl WalletHandle {
    pub fn view(&self) -> WalletView {
        self.view.borrow().clone()
    }

    /// A receiver that is notified after every published change.
    pub fn subscribe(&self) -> watch::Receiver<WalletView> {
        self.view.clone()
    }

    pub fn current_balance(&self) -> Option<WalletBalance> {
        self.view.borrow().balance.clone()
    }

    /// Validates and records the amount for the next payment. `limit`
    /// caps the amount, typically the current balance for debits.
    pub async fn select_amount(
        &self,
        amount: Decimal,
        direction: Direction,
        limit: Option<Decimal>,
    ) -> Result<PaymentSelection> {
        self.request(|reply| Command::SelectAmount {
            amount,
            direction,
            limit,
            reply,
        })
        .await?
    }

    /// Starts the payment flow for the selected amount. Resolves once the
    /// payment is handed off to another application, or with the error
    /// that stopped it before that.
    pub async fn confirm_payment(&self, method: PaymentMethod) -> Result<TransactionId> {
        self.request(|reply| Command::ConfirmPayment { method, reply })
            .await?
    }

    /// Stops the running flow, leaving its intent in the last state it
    /// reached. Returns that state.
    pub async fn cancel_payment(&self) -> Result<PaymentState> {
        self.request(|reply| Command::CancelPayment { reply }).await
    }

    pub async fn refresh_balance(&self) -> Result<WalletBalance> {
        self.request(|reply| Command::RefreshBalance { reply })
            .await?
    }

    pub async fn transfer(
        &self,
        bank_account: BankAccountId,
        amount: Decimal,
        direction: Direction,
    ) -> Result<WalletBalance> {
        self.request(|reply| Command::Transfer {
            bank_account,
            amount,
            direction,
            reply,
        })
        .await?
    }

    /// Ledger entries, fetched from the backend and cached; the cache
    /// answers when the backend cannot.
    pub async fn history(&self, filter: HistoryFilter) -> Result<Vec<TransactionRecord>> {
        self.request(|reply| Command::History { filter, reply })
            .await?
    }

    pub async fn bank_accounts(&self) -> Result<Vec<BankAccount>> {
        self.request(|reply| Command::BankAccounts { reply })
            .await?
    }

    /// Waits until the current payment reaches a terminal state.
    ///
    /// Fails with `InvalidState` when no flow is running and none has
    /// finished, e.g. after a cancellation.
    pub async fn payment_settled(&self) -> Result<PaymentFlowView> {
        let mut view = self.view.clone();
        let payment = view
            .wait_for(|v| v.payment.state.is_terminal() || !v.payment.running)
            .await
            .map_err(|_| WalletError::EngineStopped)?
            .payment
            .clone();
        if payment.state.is_terminal() {
            Ok(payment)
        } else {
            Err(WalletError::InvalidState(format!(
                "no payment in progress (last state {})",
                payment.state
            )))
        }
    }

    /// Stops the engine and returns its final view.
    pub async fn shutdown(self) -> Result<WalletView> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| WalletError::EngineStopped)?;
        response.await.map_err(|_| WalletError::EngineStopped)
    }
}

/// Reconciles the balance from every input channel and runs payment flows.
///
/// One task owns all mutable state. Commands from [`WalletHandle`]s,
/// results of spawned network calls and push events are all messages to
/// that task, so no two updates ever interleave. Balances are merged by
/// `as_of_sequence` alone: whichever channel delivers a value, only a
/// strictly fresher one replaces the current one.
pub struct ReconciliationEngine {
    store: StateStoreBox,
    ledger: LedgerClientRef,
    platform: PlatformRef,
    push: Option<PushTransportRef>,
    account_ref: String,
    config: WalletConfig,
}

impl ReconciliationEngine {
    pub fn new(
        store: StateStoreBox,
        ledger: LedgerClientRef,
        platform: PlatformRef,
        config: &WalletConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            platform,
            push: None,
            account_ref: config.account_ref.clone(),
            config: config.clone(),
        }
    }

    pub fn with_push(mut self, transport: PushTransportRef) -> Self {
        self.push = Some(transport);
        self
    }

    /// Restores cached state, spawns the engine task and starts the initial
    /// balance fetch. Push updates are handled from the start.
    pub async fn start(self) -> WalletHandle {
        let mut cell = BalanceCell::new();
        let mut history = None;

        let cached_account = read_cached::<String>(&self.store, KEY_ACCOUNT_REF).await;
        let foreign_cache = cached_account
            .as_deref()
            .is_some_and(|a| a != self.account_ref);
        if foreign_cache {
            tracing::info!(
                cached = cached_account.as_deref().unwrap_or_default(),
                account = %self.account_ref,
                "cached state belongs to another account, ignoring it"
            );
        } else {
            if let Some(balance) = read_cached::<WalletBalance>(&self.store, KEY_BALANCE).await {
                tracing::info!(amount = %balance.amount, sequence = balance.as_of_sequence, "restored cached balance");
                cell.offer(balance);
            }
            history = read_cached::<Vec<TransactionRecord>>(&self.store, KEY_HISTORY).await;
        }

        let (view_tx, view_rx) = watch::channel(WalletView {
            balance: cell.current().cloned(),
            ..WalletView::default()
        });
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let (push, push_events) = match self.push {
            Some(transport) => {
                let policy: ReconnectPolicy = self.config.reconnect_policy();
                let (channel, events) = PushUpdateChannel::spawn(transport, policy);
                (Some(channel), Some(events))
            }
            None => (None, None),
        };

        let controller = PaymentFlowController::new(
            self.ledger.clone(),
            self.platform,
            self.config.payment_timing(),
        );

        let mut actor = EngineActor {
            account_ref: self.account_ref,
            store: self.store,
            storage_degraded: false,
            ledger: self.ledger,
            controller: Arc::new(controller),
            cell,
            history,
            view: view_tx,
            flow: None,
            next_flow_id: 0,
            commands: commands_rx,
            internal_tx,
            internal_rx,
            push,
            push_events,
        };
        if foreign_cache {
            // Must be gone before the account ref claims the cache.
            actor.forget(KEY_BALANCE).await;
            actor.forget(KEY_HISTORY).await;
        }
        let account_ref = actor.account_ref.clone();
        actor.persist(KEY_ACCOUNT_REF, &account_ref).await;
        tokio::spawn(actor.run());

        WalletHandle {
            commands: commands_tx,
            view: view_rx,
        }
    }
}

/// A missing, unreadable or undecodable entry all read as absent.
async fn read_cached<T: DeserializeOwned>(store: &StateStoreBox, key: &str) -> Option<T> {
    match store.get(key).await {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding undecodable cache entry");
                None
            }
        },
        Ok(None) => None,
        Err(fault) => {
            tracing::warn!(key, error = %fault, "cache read failed, treating entry as absent");
            None
        }
    }
}

struct ActiveFlow {
    id: u64,
    task: JoinHandle<()>,
    /// Pending `confirm_payment` reply, answered at handoff or resolution.
    confirm: Option<oneshot::Sender<Result<TransactionId>>>,
}

struct EngineActor {
    account_ref: String,
    store: StateStoreBox,
    storage_degraded: bool,
    ledger: LedgerClientRef,
    controller: Arc<PaymentFlowController>,
    cell: BalanceCell,
    /// `None` until history was fetched or restored once.
    history: Option<Vec<TransactionRecord>>,
    view: watch::Sender<WalletView>,
    flow: Option<ActiveFlow>,
    next_flow_id: u64,
    commands: mpsc::Receiver<Command>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    push: Option<PushUpdateChannel>,
    push_events: Option<mpsc::Receiver<PushEvent>>,
}

impl EngineActor {
    async fn run(mut self) {
        self.spawn_fetch(BalanceSource::InitialFetch, None);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.stop().await;
                        let _ = reply.send(self.view.borrow().clone());
                        return;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        // Every handle is gone.
                        self.stop().await;
                        return;
                    }
                },
                Some(event) = self.internal_rx.recv() => self.handle_internal(event).await,
                event = next_push(&mut self.push_events) => match event {
                    Some(event) => self.handle_push(event).await,
                    None => self.push_events = None,
                },
            }
        }
    }

    async fn stop(&mut self) {
        self.abort_flow();
        // Dropping the receiver first unblocks a supervisor stuck on a full channel.
        self.push_events = None;
        if let Some(push) = self.push.take() {
            push.disconnect().await;
        }
        tracing::info!("reconciliation engine stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SelectAmount {
                amount,
                direction,
                limit,
                reply,
            } => {
                let _ = reply.send(self.select_amount(amount, direction, limit));
            }
            Command::ConfirmPayment { method, reply } => self.confirm_payment(method, reply),
            Command::CancelPayment { reply } => {
                let _ = reply.send(self.cancel_payment());
            }
            Command::RefreshBalance { reply } => {
                self.spawn_fetch(BalanceSource::Refresh, Some(reply));
            }
            Command::Transfer {
                bank_account,
                amount,
                direction,
                reply,
            } => self.transfer(bank_account, amount, direction, reply),
            Command::History { filter, reply } => {
                let ledger = self.ledger.clone();
                let internal = self.internal_tx.clone();
                tokio::spawn(async move {
                    let result = ledger.fetch_history(HistoryFilter::All).await;
                    let _ = internal.send(Internal::History {
                        result,
                        filter,
                        reply,
                    });
                });
            }
            Command::BankAccounts { reply } => {
                let ledger = self.ledger.clone();
                tokio::spawn(async move {
                    let result = ledger.fetch_bank_accounts().await.map_err(WalletError::from);
                    let _ = reply.send(result);
                });
            }
            Command::Shutdown { .. } => {}
        }
    }

    fn select_amount(
        &mut self,
        amount: Decimal,
        direction: Direction,
        limit: Option<Decimal>,
    ) -> Result<PaymentSelection> {
        // A cancelled flow may have left its intent mid-way; only a live
        // flow blocks a new selection.
        if self.flow.is_some() {
            let state = self.view.borrow().payment.state;
            return Err(WalletError::InvalidState(format!(
                "a payment is already {state}"
            )));
        }
        let amount = match Amount::within(amount, limit) {
            Ok(amount) => amount,
            Err(e) => {
                self.view.send_modify(|v| v.last_error = Some(e.clone()));
                return Err(e);
            }
        };

        let selection = PaymentSelection { amount, direction };
        self.view.send_modify(|v| {
            v.payment = PaymentFlowView {
                state: PaymentState::AmountSelected,
                selection: Some(selection),
                intent: None,
                running: false,
            };
            v.last_error = None;
        });
        tracing::debug!(amount = %amount, direction = %direction, "amount selected");
        Ok(selection)
    }

    fn confirm_payment(
        &mut self,
        method: PaymentMethod,
        reply: oneshot::Sender<Result<TransactionId>>,
    ) {
        let payment = self.view.borrow().payment.clone();
        let selection = match (payment.state, payment.selection) {
            (PaymentState::AmountSelected, Some(selection)) => selection,
            (state, _) => {
                let _ = reply.send(Err(WalletError::InvalidState(format!(
                    "cannot confirm a payment while {state}"
                ))));
                return;
            }
        };

        self.next_flow_id += 1;
        let flow_id = self.next_flow_id;
        self.view.send_modify(|v| {
            v.payment.state = PaymentState::Initiating;
            v.payment.running = true;
            v.last_error = None;
        });

        let controller = self.controller.clone();
        let internal = self.internal_tx.clone();
        let task = tokio::spawn(async move {
            let progress = internal.clone();
            let outcome = controller
                .run(selection, method, move |intent| {
                    let _ = progress.send(Internal::Flow {
                        flow_id,
                        event: FlowEvent::Progress(intent.clone()),
                    });
                })
                .await;
            let _ = internal.send(Internal::Flow {
                flow_id,
                event: FlowEvent::Resolved(outcome),
            });
        });

        self.flow = Some(ActiveFlow {
            id: flow_id,
            task,
            confirm: Some(reply),
        });
    }

    fn cancel_payment(&mut self) -> PaymentState {
        if self.flow.is_some() {
            self.abort_flow();
        } else if self.view.borrow().payment.state == PaymentState::AmountSelected {
            self.view.send_modify(|v| v.payment = PaymentFlowView::default());
        }
        self.view.borrow().payment.state
    }

    fn abort_flow(&mut self) {
        if let Some(flow) = self.flow.take() {
            flow.task.abort();
            self.view.send_modify(|v| v.payment.running = false);
            if let Some(confirm) = flow.confirm {
                let _ = confirm.send(Err(WalletError::InvalidState(
                    "payment was cancelled".to_string(),
                )));
            }
            tracing::info!(flow_id = flow.id, "payment flow cancelled");
        }
    }

    fn transfer(
        &mut self,
        bank_account: BankAccountId,
        amount: Decimal,
        direction: Direction,
        reply: oneshot::Sender<Result<WalletBalance>>,
    ) {
        let amount = match Amount::new(amount) {
            Ok(amount) => amount,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };
        let ledger = self.ledger.clone();
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = ledger
                .apply_bank_transfer(&bank_account, amount, direction)
                .await;
            let _ = internal.send(Internal::Fetched {
                result,
                source: BalanceSource::Transfer,
                reply: Some(reply),
            });
        });
    }

    fn spawn_fetch(&self, source: BalanceSource, reply: Option<oneshot::Sender<Result<WalletBalance>>>) {
        let ledger = self.ledger.clone();
        let account_ref = self.account_ref.clone();
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = ledger.fetch_balance(&account_ref).await;
            let _ = internal.send(Internal::Fetched {
                result,
                source,
                reply,
            });
        });
    }

    async fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::Fetched {
                result,
                source,
                reply,
            } => match result {
                Ok(balance) => {
                    self.offer(balance.with_source(source)).await;
                    if let Some(reply) = reply {
                        let current = self.cell.current().cloned().ok_or_else(|| {
                            WalletError::InvalidState("no balance after fetch".to_string())
                        });
                        let _ = reply.send(current);
                    }
                }
                Err(fault) => {
                    tracing::warn!(?source, error = %fault, "balance request failed");
                    let error = WalletError::from(fault);
                    self.view.send_modify(|v| v.last_error = Some(error.clone()));
                    if let Some(reply) = reply {
                        let _ = reply.send(Err(error));
                    }
                }
            },
            Internal::History {
                result,
                filter,
                reply,
            } => {
                let answer = match result {
                    Ok(records) => {
                        self.persist(KEY_HISTORY, &records).await;
                        let filtered = filter.apply(&records);
                        self.history = Some(records);
                        Ok(filtered)
                    }
                    Err(fault) => match &self.history {
                        Some(cached) => {
                            tracing::warn!(error = %fault, "history fetch failed, serving cached ledger");
                            Ok(filter.apply(cached))
                        }
                        None => Err(WalletError::from(fault)),
                    },
                };
                let _ = reply.send(answer);
            }
            Internal::Flow { flow_id, event } => {
                if self.flow.as_ref().map(|f| f.id) != Some(flow_id) {
                    tracing::debug!(flow_id, "ignoring event of a finished flow");
                    return;
                }
                match event {
                    FlowEvent::Progress(intent) => self.flow_progress(intent),
                    FlowEvent::Resolved(outcome) => self.flow_resolved(outcome).await,
                }
            }
        }
    }

    fn flow_progress(&mut self, intent: PaymentIntent) {
        let transaction_id = intent.transaction_id.clone();
        self.view.send_modify(|v| {
            v.payment.state = intent.state;
            v.payment.intent = Some(intent);
        });
        if let Some(flow) = self.flow.as_mut()
            && let Some(confirm) = flow.confirm.take()
        {
            let _ = confirm.send(Ok(transaction_id));
        }
    }

    async fn flow_resolved(&mut self, outcome: PaymentOutcome) {
        tracing::info!(state = %outcome.state, "payment flow resolved");
        self.view.send_modify(|v| {
            v.payment.state = outcome.state;
            v.payment.intent = outcome.intent.clone();
            v.payment.running = false;
            v.last_error = outcome.error.clone();
        });

        if let Some(confirm) = self.flow.take().and_then(|flow| flow.confirm) {
            let answer = match (&outcome.error, &outcome.intent) {
                (Some(error), _) => Err(error.clone()),
                (None, Some(intent)) => Ok(intent.transaction_id.clone()),
                (None, None) => Err(WalletError::InvalidState(
                    "payment ended without a transaction".to_string(),
                )),
            };
            let _ = confirm.send(answer);
        }

        if outcome.state == PaymentState::Succeeded {
            match outcome.reported_balance.clone() {
                Some(balance) => {
                    self.offer(balance.with_source(BalanceSource::Poll)).await;
                }
                // A bare success says nothing about the new total.
                None => self.spawn_fetch(BalanceSource::Poll, None),
            }
        }

        if let Some(intent) = &outcome.intent {
            // Neither an unopened handoff nor an expired poll closes the
            // transaction on the server.
            let status = match (outcome.state, &outcome.error) {
                (PaymentState::Succeeded, _) => TransactionStatus::Success,
                (PaymentState::Failed, Some(WalletError::NoHandlerAvailable { .. })) => {
                    TransactionStatus::Pending
                }
                (PaymentState::Failed, _) => TransactionStatus::Failed,
                _ => TransactionStatus::Pending,
            };
            let record = TransactionRecord {
                transaction_id: intent.transaction_id.clone(),
                r#type: intent.direction,
                amount: intent.amount.value(),
                status,
                timestamp: Utc::now(),
                description: "Payment".to_string(),
            };
            let history = self.history.get_or_insert_with(Vec::new);
            history.retain(|r| r.transaction_id != record.transaction_id);
            history.push(record);
            let snapshot = history.clone();
            self.persist(KEY_HISTORY, &snapshot).await;
        }
    }

    async fn handle_push(&mut self, event: PushEvent) {
        match event {
            PushEvent::Connected { resumed } => {
                self.view.send_modify(|v| v.push_connected = true);
                if resumed {
                    // Whatever was pushed while disconnected is lost.
                    self.spawn_fetch(BalanceSource::Refresh, None);
                }
            }
            PushEvent::BalanceChanged(balance) => {
                self.offer(balance.with_source(BalanceSource::Push)).await;
            }
            PushEvent::Disconnected => {
                self.view.send_modify(|v| v.push_connected = false);
            }
        }
    }

    /// The single entry point for balance updates from every channel.
    async fn offer(&mut self, update: WalletBalance) -> ApplyOutcome {
        let sequence = update.as_of_sequence;
        let source = update.source;
        let outcome = self.cell.offer(update);
        match outcome {
            ApplyOutcome::Applied => {
                let current = self.cell.current().cloned();
                if let Some(balance) = &current {
                    tracing::info!(amount = %balance.amount, sequence, ?source, "balance updated");
                    self.persist(KEY_BALANCE, balance).await;
                }
                self.view.send_modify(|v| v.balance = current);
            }
            ApplyOutcome::Stale { current_sequence } => {
                tracing::debug!(sequence, current_sequence, ?source, "stale balance discarded");
            }
        }
        outcome
    }

    async fn persist<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) {
        if self.storage_degraded {
            return;
        }
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(key, error = %e, "cannot encode cache entry");
                return;
            }
        };
        if let Err(fault) = self.store.set(key, raw).await {
            tracing::warn!(key, error = %fault, "cache write failed, continuing without persistence");
            self.storage_degraded = true;
            self.view.send_modify(|v| v.storage_degraded = true);
        }
    }

    async fn forget(&mut self, key: &str) {
        if self.storage_degraded {
            return;
        }
        if let Err(fault) = self.store.remove(key).await {
            tracing::warn!(key, error = %fault, "cache removal failed, continuing without persistence");
            self.storage_degraded = true;
            self.view.send_modify(|v| v.storage_degraded = true);
        }
    }
}

async fn next_push(events: &mut Option<mpsc::Receiver<PushEvent>>) -> Option<PushEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}
