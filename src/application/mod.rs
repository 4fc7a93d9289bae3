//! Application layer: the reconciliation engine and the workflows it runs.
//!
//! The engine follows an actor pattern built on `tokio` channels. One task
//! owns the wallet state; handles talk to it through messages and observe
//! it through a `watch` channel, so balance merges and payment transitions
//! are never interleaved.

pub mod engine;
pub mod payment_flow;
pub mod push_channel;

pub use engine::{PaymentFlowView, ReconciliationEngine, WalletHandle, WalletView};
