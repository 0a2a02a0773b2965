//! Notification dispatcher: renders session state into user-facing message
//! payloads and fans them out to connected gateways.
//!
//! Delivery rides a tokio broadcast channel. Gateways subscribe when their
//! WebSocket connects; a send with no subscriber just drops the payload,
//! which is the normal state while no gateway is attached.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::{DenialReason, QuizSession, TestSummary};
use crate::protocol::{Delivery, DeliveryTarget, QuestionCard, ServerMessage};

#[derive(Clone)]
pub struct Dispatcher {
    tx: broadcast::Sender<Delivery>,
}

impl Dispatcher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Delivery> {
        self.tx.subscribe()
    }

    pub fn deliver(&self, target: DeliveryTarget, message: ServerMessage) {
        if self.tx.send(Delivery { target, message }).is_err() {
            debug!(target: "quizpass_backend", recipient = ?target, "No gateway subscribed; delivery dropped");
        }
    }
}

/// Snapshot of the session's current question, ready to render.
pub fn question_card(session: &QuizSession, now: DateTime<Utc>) -> QuestionCard {
    let q = &session.questions[session.current];
    QuestionCard {
        index: session.current,
        total: session.questions.len(),
        prompt: q.prompt.clone(),
        options: q.options.clone(),
        minutes_remaining: session.minutes_remaining(now),
        has_previous: session.current > 0,
        has_next: session.current + 1 < session.questions.len(),
    }
}

pub fn question_message(session: &QuizSession, now: DateTime<Utc>) -> ServerMessage {
    ServerMessage::Question { question: question_card(session, now) }
}

pub fn summary_message(summary: &TestSummary) -> ServerMessage {
    let text = format!(
        "Test finished. Score: {:.2} ({} correct, {} wrong, {} unanswered out of {}).",
        summary.final_score, summary.correct, summary.wrong, summary.unanswered, summary.total_questions,
    );
    ServerMessage::Summary { summary: *summary, text }
}

pub fn denial_message(reason: DenialReason) -> ServerMessage {
    let text = match reason {
        DenialReason::NotSubscribed => "You need an active subscription to take tests. Send /subscribe to get access.",
        DenialReason::NoQuestionsAvailable => "No questions are available right now. Please try again later.",
        DenialReason::NoActiveSession => "You have no test in progress. Send /start_test to begin one.",
    };
    ServerMessage::Denial { reason, text: text.into() }
}
