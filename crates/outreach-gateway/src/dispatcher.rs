use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use outreach_types::events::GatewayEvent;

/// Tracks live client connections and delivers events to a user's sessions.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// user_id -> (conn_id -> sender). A user may have several tabs open.
    user_channels: RwLock<HashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for `user_id`. Returns (conn_id, receiver).
    pub async fn register_user_channel(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Drop one connection; other connections of the same user stay.
    pub async fn unregister_user_channel(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some(conns) = channels.get_mut(&user_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                channels.remove(&user_id);
            }
        }
    }

    /// Send an event to every live connection of `user_id`. Returns how many
    /// connections accepted it; zero is not an error.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> usize {
        let channels = self.inner.user_channels.read().await;
        let Some(conns) = channels.get(&user_id) else {
            return 0;
        };
        conns.values().filter(|tx| tx.send(event.clone()).is_ok()).count()
    }

    /// Fire-and-forget reply notification for the owner of an application.
    pub async fn notify_reply(
        &self,
        user_id: Uuid,
        application_id: Uuid,
        thread_id: &str,
        counterparty_name: &str,
    ) {
        let delivered = self
            .send_to_user(
                user_id,
                GatewayEvent::ReplyReceived {
                    application_id,
                    thread_id: thread_id.to_string(),
                    counterparty_name: counterparty_name.to_string(),
                },
            )
            .await;
        debug!(
            "Reply on thread {} fanned out to {} connection(s) of {}",
            thread_id, delivered, user_id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_session_of_the_user_is_notified() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        let (_, mut rx1) = dispatcher.register_user_channel(user).await;
        let (_, mut rx2) = dispatcher.register_user_channel(user).await;
        let (_, mut rx_other) = dispatcher.register_user_channel(other).await;

        let app = Uuid::new_v4();
        dispatcher.notify_reply(user, app, "t-1", "Dana").await;

        let expected = GatewayEvent::ReplyReceived {
            application_id: app,
            thread_id: "t-1".into(),
            counterparty_name: "Dana".into(),
        };
        assert_eq!(rx1.recv().await.unwrap(), expected);
        assert_eq!(rx2.recv().await.unwrap(), expected);
        assert!(rx_other.try_recv().is_err());
    }

    #[tokio::test]
    async fn no_connection_is_fine() {
        let dispatcher = Dispatcher::new();
        let delivered = dispatcher
            .send_to_user(
                Uuid::new_v4(),
                GatewayEvent::Ready { user_id: Uuid::nil(), email: String::new() },
            )
            .await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn unregister_only_drops_that_connection() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let (c1, _rx1) = dispatcher.register_user_channel(user).await;
        let (_c2, mut rx2) = dispatcher.register_user_channel(user).await;

        dispatcher.unregister_user_channel(user, c1).await;
        let delivered = dispatcher
            .send_to_user(user, GatewayEvent::Ready { user_id: user, email: String::new() })
            .await;
        assert_eq!(delivered, 1);
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn closed_receivers_are_not_counted() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let (_, rx) = dispatcher.register_user_channel(user).await;
        drop(rx);

        let delivered = dispatcher
            .send_to_user(user, GatewayEvent::Ready { user_id: user, email: String::new() })
            .await;
        assert_eq!(delivered, 0);
    }
}
