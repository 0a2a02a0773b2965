//! Transport boundary DTOs: inbound gateway events and outbound render
//! payloads (serde ready). Keep this small and stable so the chat gateway
//! and the backend can evolve independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ChannelId, DenialReason, NavCommand, TestSummary, UserId};

/// Events the chat gateway delivers to the core. Every event is tagged with
/// the conversation it came from, which is where replies go.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    StartTest {
        user_id: UserId,
        chat_id: ChannelId,
    },
    AnswerSelected {
        user_id: UserId,
        chat_id: ChannelId,
        question_index: usize,
        option_label: String,
    },
    Navigation {
        user_id: UserId,
        chat_id: ChannelId,
        command: NavCommand,
    },
    Subscribe {
        user_id: UserId,
        chat_id: ChannelId,
    },
}

/// Where a rendered message should be delivered. Session output goes to the
/// originating conversation; payment confirmations go straight to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum DeliveryTarget {
    Chat(ChannelId),
    User(UserId),
}

/// One question as presented to the user, with the navigation affordances
/// the gateway should render as buttons.
#[derive(Clone, Debug, Serialize)]
pub struct QuestionCard {
    pub index: usize,
    pub total: usize,
    pub prompt: String,
    pub options: Vec<String>,
    pub minutes_remaining: i64,
    pub has_previous: bool,
    pub has_next: bool,
}

/// Render payloads the core asks the gateway to deliver. The `text` fields
/// are ready-to-send fallbacks; richer gateways build their own markup from
/// the structured parts.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Question { question: QuestionCard },
    Summary { summary: TestSummary, text: String },
    Denial { reason: DenialReason, text: String },
    PaymentLink { url: String, text: String },
    SubscriptionActivated { expires_at: DateTime<Utc>, text: String },
    Notice { text: String },
}

/// One delivery on the outbound channel.
#[derive(Clone, Debug, Serialize)]
pub struct Delivery {
    pub target: DeliveryTarget,
    pub message: ServerMessage,
}

/// Immediate reply to the gateway for an inbound HTTP event. The rendered
/// output itself travels through the delivery channel.
#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventAck {
    Ack,
    Error { message: String },
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_events_parse_from_tagged_json() {
        let ev: InboundEvent = serde_json::from_str(
            r#"{"type":"answer_selected","user_id":42,"chat_id":-100,"question_index":3,"option_label":"Paris"}"#,
        )
        .expect("event parses");
        match ev {
            InboundEvent::AnswerSelected { user_id, chat_id, question_index, option_label } => {
                assert_eq!(user_id, 42);
                assert_eq!(chat_id, -100);
                assert_eq!(question_index, 3);
                assert_eq!(option_label, "Paris");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let ev: InboundEvent =
            serde_json::from_str(r#"{"type":"navigation","user_id":1,"chat_id":1,"command":"skip"}"#)
                .expect("event parses");
        assert!(matches!(ev, InboundEvent::Navigation { command: NavCommand::Skip, .. }));
    }

    #[test]
    fn deliveries_serialize_with_stable_tags() {
        let delivery = Delivery {
            target: DeliveryTarget::User(42),
            message: ServerMessage::Notice { text: "hi".into() },
        };
        let json = serde_json::to_value(&delivery).expect("delivery serializes");
        assert_eq!(json["target"]["kind"], "user");
        assert_eq!(json["target"]["id"], 42);
        assert_eq!(json["message"]["type"], "notice");
    }
}
