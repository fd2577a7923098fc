pub mod handler;
pub mod inference_channel;
pub mod notification;
pub mod notification_content;

pub use handler::NotificationHandler;
pub use inference_channel::NotificationOutputChannel;
pub use notification::Notification;
pub use notification_content::NotificationContent;
