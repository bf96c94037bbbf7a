pub mod client;
pub mod recording;
pub mod telegram;

pub use client::{InlineButton, Notifier, NotifierError};
pub use recording::RecordingNotifier;
pub use telegram::TelegramNotifier;
