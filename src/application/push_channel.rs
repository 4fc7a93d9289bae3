use crate::config::ReconnectPolicy;
use crate::domain::balance::WalletBalance;
use crate::domain::ports::PushTransportRef;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// What the push supervisor reports to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// A connection is up. `resumed` is false only when the very first
    /// attempt succeeded; any later connection may have missed updates.
    Connected { resumed: bool },
    BalanceChanged(WalletBalance),
    Disconnected,
}

/// Keeps one push connection alive for the session.
///
/// Connection drops are followed by reconnects on an exponential schedule.
/// Nothing is buffered across connections: whatever the server emitted
/// while disconnected is lost, which is why consumers fetch on `resumed`.
pub struct PushUpdateChannel {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PushUpdateChannel {
    pub fn spawn(
        transport: PushTransportRef,
        policy: ReconnectPolicy,
    ) -> (Self, mpsc::Receiver<PushEvent>) {
        let (events_tx, events_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(supervise(transport, policy, events_tx, shutdown_rx));
        (
            Self {
                shutdown: Some(shutdown_tx),
                task: Some(task),
            },
            events_rx,
        )
    }

    /// Tears the connection down and waits until the supervisor has exited.
    pub async fn disconnect(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        tracing::debug!("push channel disconnected");
    }
}

async fn supervise(
    transport: PushTransportRef,
    policy: ReconnectPolicy,
    events: mpsc::Sender<PushEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut first_attempt = true;
    let mut failures: u32 = 0;

    loop {
        let connection = tokio::select! {
            _ = &mut shutdown => return,
            connection = transport.connect() => connection,
        };
        let resumed = !first_attempt;
        first_attempt = false;

        match connection {
            Ok(mut balances) => {
                failures = 0;
                tracing::info!(resumed, "push channel connected");
                if events.send(PushEvent::Connected { resumed }).await.is_err() {
                    return;
                }
                loop {
                    let next = tokio::select! {
                        _ = &mut shutdown => return,
                        next = balances.recv() => next,
                    };
                    let Some(balance) = next else { break };
                    if events.send(PushEvent::BalanceChanged(balance)).await.is_err() {
                        return;
                    }
                }
                tracing::warn!("push connection dropped");
                if events.send(PushEvent::Disconnected).await.is_err() {
                    return;
                }
            }
            Err(fault) => {
                tracing::warn!(error = %fault, attempt = failures + 1, "push connection failed");
            }
        }

        let delay = policy.delay(failures);
        failures = failures.saturating_add(1);
        tracing::debug!(delay_ms = delay.as_millis() as u64, "push reconnect scheduled");
        tokio::select! {
            _ = &mut shutdown => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::balance::BalanceSource;
    use crate::infrastructure::in_memory::InMemoryPushTransport;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwards_balances_and_reconnects() {
        let transport = InMemoryPushTransport::new();
        let (channel, mut events) = PushUpdateChannel::spawn(Arc::new(transport.clone()), policy());

        assert_eq!(
            events.recv().await,
            Some(PushEvent::Connected { resumed: false })
        );
        let balance = WalletBalance::new(dec!(42), 3, BalanceSource::Push).unwrap();
        assert!(transport.emit(balance.clone()));
        assert_eq!(events.recv().await, Some(PushEvent::BalanceChanged(balance)));

        let dropped_at = Instant::now();
        transport.drop_connection();
        assert_eq!(events.recv().await, Some(PushEvent::Disconnected));
        assert_eq!(
            events.recv().await,
            Some(PushEvent::Connected { resumed: true })
        );
        assert!(dropped_at.elapsed() >= Duration::from_secs(1));
        assert_eq!(transport.connect_count(), 2);

        channel.disconnect().await;
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles_between_failed_attempts() {
        let transport = InMemoryPushTransport::new();
        transport.fail_next_connects(3);
        let started = Instant::now();
        let (channel, mut events) = PushUpdateChannel::spawn(Arc::new(transport.clone()), policy());

        // Failures wait 1s, 2s and 4s before the fourth attempt succeeds.
        assert_eq!(
            events.recv().await,
            Some(PushEvent::Connected { resumed: true })
        );
        assert_eq!(started.elapsed(), Duration::from_secs(7));
        assert_eq!(transport.connect_count(), 4);

        channel.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_is_replayed_after_reconnect() {
        let transport = InMemoryPushTransport::new();
        let (channel, mut events) = PushUpdateChannel::spawn(Arc::new(transport.clone()), policy());
        assert!(matches!(events.recv().await, Some(PushEvent::Connected { .. })));

        transport.drop_connection();
        let missed = WalletBalance::new(dec!(1), 9, BalanceSource::Push).unwrap();
        assert!(!transport.emit(missed));

        assert_eq!(events.recv().await, Some(PushEvent::Disconnected));
        assert_eq!(
            events.recv().await,
            Some(PushEvent::Connected { resumed: true })
        );
        channel.disconnect().await;
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stops_reconnecting() {
        let transport = InMemoryPushTransport::new();
        transport.fail_next_connects(u32::MAX);
        let (channel, _events) = PushUpdateChannel::spawn(Arc::new(transport.clone()), policy());

        tokio::time::sleep(Duration::from_secs(10)).await;
        channel.disconnect().await;
        let attempts = transport.connect_count();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(transport.connect_count(), attempts);
    }
}
