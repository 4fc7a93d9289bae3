use crate::config::PaymentTiming;
use crate::domain::balance::WalletBalance;
use crate::domain::payment::{
    PaymentIntent, PaymentMethod, PaymentOutcome, PaymentSelection, PaymentState,
    TransactionStatus,
};
use crate::domain::ports::{LedgerClientRef, PlatformRef};
use crate::error::WalletError;

/// What a running flow reports back to whoever owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    /// The intent moved along a non-terminal edge.
    Progress(PaymentIntent),
    /// The flow is over. Sent once, as the last event of a flow.
    Resolved(PaymentOutcome),
}

/// Drives one payment from confirmation to a terminal state.
///
/// The sequence is: initiate on the backend, hand the URI to another
/// application, give the user `handoff_delay` there, then poll with
/// exponential backoff until the server declares an outcome or
/// `max_poll_attempts` is used up.
///
/// Initiation is never retried. A second call would create a second
/// transaction on the server, so a failed initiation ends the flow.
/// Cancellation is the caller aborting the task running [`Self::run`];
/// every wait is an await point, so an aborted flow schedules nothing more.
pub struct PaymentFlowController {
    ledger: LedgerClientRef,
    platform: PlatformRef,
    timing: PaymentTiming,
}

impl PaymentFlowController {
    pub fn new(ledger: LedgerClientRef, platform: PlatformRef, timing: PaymentTiming) -> Self {
        Self {
            ledger,
            platform,
            timing,
        }
    }

    /// Runs the flow. `on_progress` sees the intent after every non-terminal
    /// transition; the terminal result is the return value.
    pub async fn run<F>(
        &self,
        selection: PaymentSelection,
        method: PaymentMethod,
        mut on_progress: F,
    ) -> PaymentOutcome
    where
        F: FnMut(&PaymentIntent) + Send,
    {
        let handoff = match self
            .ledger
            .initiate_payment(selection.amount, selection.direction, &method)
            .await
        {
            Ok(handoff) => handoff,
            Err(fault) => {
                tracing::warn!(error = %fault, amount = %selection.amount, "payment initiation failed");
                return PaymentOutcome {
                    state: PaymentState::Failed,
                    selection,
                    intent: None,
                    error: Some(fault.into()),
                    reported_balance: None,
                };
            }
        };

        let mut intent = PaymentIntent::new(selection, handoff);
        tracing::info!(
            transaction_id = %intent.transaction_id,
            amount = %intent.amount,
            direction = %intent.direction,
            "payment initiated"
        );

        if !self.platform.can_open(&intent.handoff_uri) {
            tracing::warn!(transaction_id = %intent.transaction_id, "no application can handle the payment uri");
            transition(&mut intent, PaymentState::Failed);
            let error = WalletError::NoHandlerAvailable {
                transaction_id: intent.transaction_id.clone(),
            };
            return resolved(selection, intent, Some(error), None);
        }
        self.platform.open(&intent.handoff_uri);
        transition(&mut intent, PaymentState::AwaitingExternalConfirmation);
        on_progress(&intent);

        tokio::time::sleep(self.timing.handoff_delay).await;
        transition(&mut intent, PaymentState::Polling);
        on_progress(&intent);

        loop {
            intent.poll_attempts += 1;
            let attempt = intent.poll_attempts;

            match self.ledger.poll_status(&intent.transaction_id).await {
                Ok(report) => match report.status {
                    TransactionStatus::Success => {
                        tracing::info!(transaction_id = %intent.transaction_id, attempt, "payment succeeded");
                        transition(&mut intent, PaymentState::Succeeded);
                        return resolved(selection, intent, None, report.balance);
                    }
                    TransactionStatus::Failed => {
                        tracing::info!(transaction_id = %intent.transaction_id, attempt, "payment declined");
                        transition(&mut intent, PaymentState::Failed);
                        return resolved(selection, intent, None, report.balance);
                    }
                    TransactionStatus::Pending => {
                        tracing::debug!(transaction_id = %intent.transaction_id, attempt, "payment pending");
                    }
                },
                Err(fault) if !fault.is_retryable() => {
                    tracing::warn!(transaction_id = %intent.transaction_id, error = %fault, "status poll rejected");
                    transition(&mut intent, PaymentState::Failed);
                    return resolved(selection, intent, Some(fault.into()), None);
                }
                Err(fault) => {
                    tracing::warn!(transaction_id = %intent.transaction_id, attempt, error = %fault, "status poll failed");
                }
            }

            if attempt >= self.timing.max_poll_attempts {
                tracing::warn!(transaction_id = %intent.transaction_id, attempt, "payment still unresolved, polling stopped");
                transition(&mut intent, PaymentState::Expired);
                return resolved(selection, intent, None, None);
            }

            transition(&mut intent, PaymentState::Polling);
            on_progress(&intent);
            tokio::time::sleep(self.timing.poll_backoff(attempt)).await;
        }
    }
}

// Edges taken here are legal by construction; a refusal means a bug.
fn transition(intent: &mut PaymentIntent, next: PaymentState) {
    if let Err(e) = intent.advance(next) {
        tracing::error!(error = %e, "payment flow took an illegal transition");
    }
}

fn resolved(
    selection: PaymentSelection,
    intent: PaymentIntent,
    error: Option<WalletError>,
    reported_balance: Option<WalletBalance>,
) -> PaymentOutcome {
    PaymentOutcome {
        state: intent.state,
        selection,
        intent: Some(intent),
        error,
        reported_balance,
    }
}
