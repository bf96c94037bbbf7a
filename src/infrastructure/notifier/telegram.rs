//! Telegram Bot API implementation of `Notifier`, reusing the donor's
//! HTTP client factory (retry/backoff) rather than a bare `reqwest::Client`.

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::infrastructure::core::http_client_factory::HttpClientFactory;
use crate::infrastructure::notifier::client::{InlineButton, Notifier, NotifierError};

pub struct TelegramNotifier {
    http: reqwest_middleware::ClientWithMiddleware,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            http: HttpClientFactory::create_client(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    fn inline_keyboard(buttons: &[InlineButton]) -> Value {
        let row: Vec<Value> = buttons
            .iter()
            .map(|(label, callback_data)| {
                serde_json::json!({ "text": label, "callback_data": callback_data })
            })
            .collect();
        serde_json::json!({ "inline_keyboard": [row] })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_message(
        &self,
        text: &str,
        buttons: Option<Vec<InlineButton>>,
        symbol: Option<&str>,
    ) -> Result<(), NotifierError> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let mut body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(buttons) = buttons.filter(|b| !b.is_empty()) {
            body["reply_markup"] = Self::inline_keyboard(&buttons);
        }

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifierError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            warn!(
                symbol = symbol.unwrap_or("-"),
                status = %response.status(),
                "telegram send_message failed"
            );
            return Err(NotifierError::Transport(format!(
                "telegram returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
