use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    CompensationFailedAlert,
    EventHandler,
    EventProducer,
    Handler,
    MessageRequestEvent,
    PaymentCompletedEvent,
};

/// The producer side of the hook system. Cloned into every orchestrator; publishing to an event
/// with no registered hook is a no-op.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub payment_completed_producer: Vec<EventProducer<PaymentCompletedEvent>>,
    pub message_request_producer: Vec<EventProducer<MessageRequestEvent>>,
    pub compensation_failed_producer: Vec<EventProducer<CompensationFailedAlert>>,
}

pub struct EventHandlers {
    pub on_payment_completed: Option<EventHandler<PaymentCompletedEvent>>,
    pub on_message_request: Option<EventHandler<MessageRequestEvent>>,
    pub on_compensation_failed: Option<EventHandler<CompensationFailedAlert>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_payment_completed = hooks.on_payment_completed.map(|f| EventHandler::new(buffer_size, f));
        let on_message_request = hooks.on_message_request.map(|f| EventHandler::new(buffer_size, f));
        let on_compensation_failed = hooks.on_compensation_failed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_payment_completed, on_message_request, on_compensation_failed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_payment_completed {
            result.payment_completed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_message_request {
            result.message_request_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_compensation_failed {
            result.compensation_failed_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_payment_completed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_message_request {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_compensation_failed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_payment_completed: Option<Handler<PaymentCompletedEvent>>,
    pub on_message_request: Option<Handler<MessageRequestEvent>>,
    pub on_compensation_failed: Option<Handler<CompensationFailedAlert>>,
}

impl EventHooks {
    pub fn on_payment_completed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentCompletedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payment_completed = Some(Arc::new(f));
        self
    }

    pub fn on_message_request<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(MessageRequestEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_message_request = Some(Arc::new(f));
        self
    }

    pub fn on_compensation_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(CompensationFailedAlert) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_compensation_failed = Some(Arc::new(f));
        self
    }
}
