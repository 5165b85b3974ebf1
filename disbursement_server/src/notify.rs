//! Hook wiring for the notification and alerting boundaries.
//!
//! Message delivery itself is another service's job; this module is the fire-and-forget seam
//! where payment events turn into message-enqueue calls. The default hooks log the enqueue so
//! that demo and test deployments work without a delivery service attached.
use futures::FutureExt;
use log::*;

use disbursement_engine::events::{EventHooks, MessageRequestEvent};

/// The enqueue call handed to the (external) message service.
fn enqueue_message(event: MessageRequestEvent) {
    info!(
        "📨️ Message enqueued for [{}]: template '{}' params {:?} (ref {})",
        event.reference_id,
        event.template_key,
        event.dynamic_params,
        event.message_ref.as_deref().unwrap_or("-")
    );
}

/// Hooks for a standard deployment: payment completions at debug level, message requests handed
/// to the notification boundary, failed compensations alerted loudly.
pub fn default_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_payment_completed(|event| {
        async move {
            debug!(
                "🪝️ Payment completed for [{}]: payment {} status {}",
                event.reference_id, event.transaction.payment_nr, event.transaction.status
            );
        }
        .boxed()
    });
    hooks.on_message_request(|event| {
        async move {
            enqueue_message(event);
        }
        .boxed()
    });
    hooks.on_compensation_failed(|alert| {
        async move {
            error!(
                "🚨️ OPERATOR ACTION REQUIRED for [{}] wallet {}: {}",
                alert.reference_id, alert.token_code, alert.message
            );
        }
        .boxed()
    });
    hooks
}
