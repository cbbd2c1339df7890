use async_trait::async_trait;
use uuid::Uuid;

/// Fire-and-forget participant notifications. Delivery is best-effort and
/// never affects the outcome of the mutation that triggered it.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, user_id: Uuid, title: &str, body: &str);
}

/// Default sink: structured log lines. A push/websocket implementation
/// plugs in behind the same trait.
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, user_id: Uuid, title: &str, body: &str) {
        tracing::info!(user = %user_id, title, body, "notification");
    }
}

pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every notification for assertions.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<(Uuid, String, String)>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingNotifier {
        async fn notify(&self, user_id: Uuid, title: &str, body: &str) {
            self.sent
                .lock()
                .unwrap()
                .push((user_id, title.to_string(), body.to_string()));
        }
    }
}
