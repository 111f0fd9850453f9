use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection is authenticated
    Ready { user_id: Uuid, email: String },

    /// The counterparty of an application replied. Self-contained so clients
    /// can reconcile regardless of delivery order.
    ReplyReceived {
        application_id: Uuid,
        thread_id: String,
        counterparty_name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_event_is_tagged() {
        let event = GatewayEvent::ReplyReceived {
            application_id: Uuid::nil(),
            thread_id: "t-1".into(),
            counterparty_name: "Dana".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "ReplyReceived");
        assert_eq!(value["data"]["thread_id"], "t-1");
        assert_eq!(value["data"]["counterparty_name"], "Dana");
    }
}
