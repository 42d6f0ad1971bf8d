pub mod models;
pub mod services;

pub use models::{DispatcherSettings, NotificationError, NotificationEvent};
pub use services::{NotificationChannel, NotificationDispatcher};
