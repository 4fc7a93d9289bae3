use rust_decimal_macros::dec;
use std::sync::Arc;
use wallet_reconciler::domain::payment::Direction;
use wallet_reconciler::domain::balance::Amount;
use wallet_reconciler::domain::bank_account::BankAccountId;
use wallet_reconciler::domain::ports::{
    LedgerClient, LedgerClientRef, Platform, PlatformRef, PushTransport, PushTransportRef,
    StateStore, StateStoreBox,
};
use wallet_reconciler::infrastructure::in_memory::{
    InMemoryLedger, InMemoryPushTransport, InMemoryStateStore,
};
use wallet_reconciler::infrastructure::platform::RecordingPlatform;

#[tokio::test]
async fn test_ports_as_trait_objects() {
    let store: StateStoreBox = Box::new(InMemoryStateStore::new());
    let ledger: LedgerClientRef = Arc::new(InMemoryLedger::new(dec!(10)));
    let push: PushTransportRef = Arc::new(InMemoryPushTransport::new());
    let platform: PlatformRef = Arc::new(RecordingPlatform::new());

    // Verify Send + Sync by spawning tasks
    let store_handle = tokio::spawn(async move {
        store.set("walletBalance", "{}".to_string()).await.unwrap();
        store.get("walletBalance").await.unwrap()
    });

    let ledger_task = ledger.clone();
    let ledger_handle = tokio::spawn(async move {
        ledger_task
            .apply_bank_transfer(
                &BankAccountId::new("acc-1"),
                Amount::new(dec!(5)).unwrap(),
                Direction::Credit,
            )
            .await
            .unwrap()
    });

    let push_handle = tokio::spawn(async move { push.connect().await.is_ok() });
    let platform_handle = tokio::spawn(async move { platform.can_open("upi://pay") });

    assert_eq!(store_handle.await.unwrap().as_deref(), Some("{}"));
    assert_eq!(ledger_handle.await.unwrap().amount, dec!(15));
    assert!(push_handle.await.unwrap());
    assert!(platform_handle.await.unwrap());
    assert_eq!(ledger.fetch_balance("primary").await.unwrap().as_of_sequence, 2);
}
