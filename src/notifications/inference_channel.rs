use tokio::sync::mpsc::Sender;

use crate::{Notification, NotificationHandler};

/// Per-exchange sink named after the chat it reports on.
pub struct NotificationOutputChannel {
    sender: Option<Sender<Notification>>,
    name: String,
}

impl NotificationOutputChannel {
    pub fn new(sender: Option<Sender<Notification>>, name: String) -> Self {
        Self { sender, name }
    }
}

impl NotificationHandler for NotificationOutputChannel {
    fn get_outgoing_channel(&self) -> &Option<Sender<Notification>> {
        &self.sender
    }

    fn get_channel_name(&self) -> &String {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::{Message, NotificationContent};

    #[tokio::test]
    async fn delivers_named_notifications_in_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let channel = NotificationOutputChannel::new(Some(tx), "chat-1".into());

        assert!(channel.notify_token("Hi".into()).await);
        assert!(channel.notify_done(Message::assistant("Hi")).await);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.chat_id, "chat-1");
        assert_eq!(first.content, NotificationContent::Token("Hi".into()));
        assert!(!first.is_terminal());
        assert!(rx.recv().await.unwrap().is_terminal());
    }

    #[tokio::test]
    async fn missing_or_closed_channel_reports_false() {
        let silent = NotificationOutputChannel::new(None, "c".into());
        assert!(!silent.notify_error("x".into()).await);

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let closed = NotificationOutputChannel::new(Some(tx), "c".into());
        assert!(!closed.notify_token("x".into()).await);
    }
}
