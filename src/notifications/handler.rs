use std::future::Future;

use tokio::sync::mpsc::Sender;

use crate::{Message, Notification, NotificationContent};

pub trait NotificationHandler: Sync {
    fn get_outgoing_channel(&self) -> &Option<Sender<Notification>>;
    fn get_channel_name(&self) -> &String;

    /// Send a notification with the given content.
    ///
    /// Returns `true` if successfully delivered, `false` otherwise.
    fn notify(&self, content: NotificationContent) -> impl Future<Output = bool> + Send {
        async move {
            let Some(channel) = self.get_outgoing_channel() else {
                return false;
            };

            match channel
                .send(Notification::new(self.get_channel_name().clone(), content))
                .await
            {
                Ok(_) => true,
                Err(e) => {
                    tracing::debug!(error = %e, "notification receiver dropped");
                    false
                }
            }
        }
    }

    /// `true` once a channel was attached and its receiver is gone.
    fn receiver_dropped(&self) -> bool {
        self.get_outgoing_channel()
            .as_ref()
            .is_some_and(|channel| channel.is_closed())
    }

    fn notify_token(&self, value: String) -> impl Future<Output = bool> + Send {
        self.notify(NotificationContent::Token(value))
    }
    fn notify_done(&self, reply: Message) -> impl Future<Output = bool> + Send {
        self.notify(NotificationContent::Done(reply))
    }
    fn notify_error(&self, error_message: String) -> impl Future<Output = bool> + Send {
        self.notify(NotificationContent::Error(error_message))
    }
}
