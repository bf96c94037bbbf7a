//! Test double for `Notifier` that records every send for assertions.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::infrastructure::notifier::client::{InlineButton, Notifier, NotifierError};

#[derive(Debug, Clone)]
pub struct RecordedMessage {
    pub text: String,
    pub buttons: Option<Vec<InlineButton>>,
    pub symbol: Option<String>,
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<RecordedMessage>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent_messages(&self) -> Vec<RecordedMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_message(
        &self,
        text: &str,
        buttons: Option<Vec<InlineButton>>,
        symbol: Option<&str>,
    ) -> Result<(), NotifierError> {
        self.sent.lock().await.push(RecordedMessage {
            text: text.to_string(),
            buttons,
            symbol: symbol.map(str::to_string),
        });
        Ok(())
    }
}
