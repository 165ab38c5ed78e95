//! # Rocketry Notifications
//!
//! Consumes domain events (`order.*`, `payment.*`, `assembly.*`), selects a
//! template per event type, resolves the recipient's chat id through IAM and
//! delivers via a channel adapter. Messages that exhaust the consumer retry
//! ladder land on `notification-dead-letter`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod dispatcher;
pub mod resolver;
pub mod templates;

pub use channel::{ConsoleChannel, NotificationChannel, TelegramChannel};
pub use dispatcher::NotificationDispatcher;
pub use resolver::{IamRecipientResolver, RecipientResolver};
