//! Listeners - コールバックとイベントストリームへの配信
//!
//! コールバックはビルド時に登録し、実行中は変更しません。
//! 同じ内容を `QueueEvent` として broadcast チャネルにも流します。

use tokio::sync::broadcast;

use crate::domain::{DeliveryError, PassSummary, QueueEvent, QueuedRequest};

pub type RequestCallback = Box<dyn Fn(&QueuedRequest) + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(&QueuedRequest, &DeliveryError) + Send + Sync>;

const EVENT_CAPACITY: usize = 256;

pub(crate) struct Listeners {
    on_sync: Vec<RequestCallback>,
    on_success: Vec<RequestCallback>,
    on_error: Vec<ErrorCallback>,
    events: broadcast::Sender<QueueEvent>,
}

impl Listeners {
    pub(crate) fn new(
        on_sync: Vec<RequestCallback>,
        on_success: Vec<RequestCallback>,
        on_error: Vec<ErrorCallback>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            on_sync,
            on_success,
            on_error,
            events,
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    pub(crate) fn sync(&self, request: &QueuedRequest) {
        for cb in &self.on_sync {
            cb(request);
        }
        self.publish(|| QueueEvent::Sync {
            request: request.clone(),
        });
    }

    pub(crate) fn success(&self, request: &QueuedRequest) {
        for cb in &self.on_success {
            cb(request);
        }
        self.publish(|| QueueEvent::Success {
            request: request.clone(),
        });
    }

    pub(crate) fn error(&self, request: &QueuedRequest, error: &DeliveryError) {
        for cb in &self.on_error {
            cb(request, error);
        }
        self.publish(|| QueueEvent::Error {
            request: request.clone(),
            error: error.clone(),
        });
    }

    pub(crate) fn pass_completed(&self, summary: &PassSummary) {
        self.publish(|| QueueEvent::PassCompleted {
            summary: summary.clone(),
        });
    }

    fn publish(&self, event: impl FnOnce() -> QueueEvent) {
        if self.events.receiver_count() > 0 {
            // lagging or dropped receivers are their problem
            let _ = self.events.send(event());
        }
    }
}
