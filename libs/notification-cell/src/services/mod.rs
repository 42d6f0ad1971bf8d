pub mod channels;
pub mod dispatcher;

pub use channels::{EmailChannel, NotificationChannel, WhatsAppChannel};
pub use dispatcher::NotificationDispatcher;
