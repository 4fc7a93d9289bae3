#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use wallet_reconciler::application::{ReconciliationEngine, WalletHandle, WalletView};
use wallet_reconciler::config::WalletConfig;
use wallet_reconciler::domain::ports::StateStoreBox;
use wallet_reconciler::infrastructure::in_memory::{
    InMemoryLedger, InMemoryPushTransport, InMemoryStateStore,
};
use wallet_reconciler::infrastructure::platform::RecordingPlatform;

/// Everything a test needs to drive and inspect one engine.
pub struct Harness {
    pub handle: WalletHandle,
    pub ledger: InMemoryLedger,
    pub store: InMemoryStateStore,
    pub platform: RecordingPlatform,
}

pub struct HarnessBuilder {
    ledger: InMemoryLedger,
    store: InMemoryStateStore,
    platform: RecordingPlatform,
    push: Option<InMemoryPushTransport>,
    config: WalletConfig,
}

impl HarnessBuilder {
    pub fn new(ledger: InMemoryLedger) -> Self {
        Self {
            ledger,
            store: InMemoryStateStore::new(),
            platform: RecordingPlatform::new(),
            push: None,
            config: WalletConfig::default(),
        }
    }

    pub fn store(mut self, store: InMemoryStateStore) -> Self {
        self.store = store;
        self
    }

    pub fn platform(mut self, platform: RecordingPlatform) -> Self {
        self.platform = platform;
        self
    }

    pub fn push(mut self, push: InMemoryPushTransport) -> Self {
        self.push = Some(push);
        self
    }

    pub fn config(mut self, config: WalletConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn start(self) -> Harness {
        let store: StateStoreBox = Box::new(self.store.clone());
        let mut engine = ReconciliationEngine::new(
            store,
            Arc::new(self.ledger.clone()),
            Arc::new(self.platform.clone()),
            &self.config,
        );
        if let Some(push) = self.push {
            engine = engine.with_push(Arc::new(push));
        }
        Harness {
            handle: engine.start().await,
            ledger: self.ledger,
            store: self.store,
            platform: self.platform,
        }
    }
}

/// Waits (in paused time) until the published view satisfies `condition`.
pub async fn wait_until(
    handle: &WalletHandle,
    mut condition: impl FnMut(&WalletView) -> bool,
) -> WalletView {
    let mut views = handle.subscribe();
    let view = tokio::time::timeout(Duration::from_secs(3600), views.wait_for(|v| condition(v)))
        .await
        .expect("condition not reached")
        .expect("engine stopped");
    view.clone()
}

pub async fn balance_loaded(handle: &WalletHandle) -> WalletView {
    wait_until(handle, |v| v.balance.is_some()).await
}
