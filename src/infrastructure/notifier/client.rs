//! `Notifier`: outbound alert dispatch (`spec.md` §6). Implemented by
//! `TelegramNotifier` against the Telegram Bot API and by `RecordingNotifier`
//! for tests.

use async_trait::async_trait;

/// A single inline keyboard button: `(label, callback_data)`. `callback_data`
/// round-trips through Telegram's callback-query webhook so the bot can tell
/// which watchlist action the operator picked (`spec.md` §6, "don't ask
/// again" / manual-confirm flows referenced in Open Question (c)).
pub type InlineButton = (String, String);

#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("notifier transport failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(
        &self,
        text: &str,
        buttons: Option<Vec<InlineButton>>,
        symbol: Option<&str>,
    ) -> Result<(), NotifierError>;
}
