//! Domain models: questions, subscriptions, quiz sessions, summaries, and
//! the outcome enums produced by the session engine.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messaging-platform user identifier.
pub type UserId = i64;
/// Conversation the renders travel through. Not necessarily the user id
/// (group chats).
pub type ChannelId = i64;

/// One multiple-choice question. Immutable once loaded into the bank.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
  pub id: String,
  pub prompt: String,
  pub options: Vec<String>,
  pub correct: String,
}

/// Paid access window. Renewal overwrites the expiry outright; there is no
/// carry-over of unused days.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Subscription {
  pub expires_at: DateTime<Utc>,
}

impl Subscription {
  pub fn is_active(&self, now: DateTime<Utc>) -> bool {
    now < self.expires_at
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavCommand {
  Previous,
  Next,
  Skip,
  Finish,
}

/// One user's in-progress test attempt. At most one per user; starting a
/// new test silently replaces any unfinished one.
#[derive(Clone, Debug)]
pub struct QuizSession {
  /// Distinguishes this attempt from a later one for the same user. The
  /// deadline watcher only acts while the stored id still matches.
  pub id: Uuid,
  pub chat: ChannelId,
  pub questions: Vec<Question>,
  pub current: usize,
  /// question index -> submitted option label. First answer is final.
  pub answers: HashMap<usize, String>,
  /// Incremental accumulator: adjusted exactly once per answered index.
  pub score: f64,
  pub deadline: DateTime<Utc>,
}

impl QuizSession {
  pub fn new(chat: ChannelId, questions: Vec<Question>, now: DateTime<Utc>, duration: Duration) -> Self {
    Self {
      id: Uuid::new_v4(),
      chat,
      questions,
      current: 0,
      answers: HashMap::new(),
      score: 0.0,
      deadline: now + duration,
    }
  }

  pub fn expired(&self, now: DateTime<Utc>) -> bool {
    now >= self.deadline
  }

  pub fn minutes_remaining(&self, now: DateTime<Utc>) -> i64 {
    crate::util::ceil_minutes((self.deadline - now).num_seconds())
  }

  /// Final accounting. Correct/wrong are recounted against the stored
  /// answers; the score itself is the incrementally maintained one. The two
  /// must agree, which the engine tests cross-check.
  pub fn summary(&self) -> TestSummary {
    let correct = self
      .answers
      .iter()
      .filter(|(i, label)| self.questions.get(**i).map(|q| q.correct == **label).unwrap_or(false))
      .count();
    TestSummary {
      final_score: self.score,
      total_questions: self.questions.len(),
      correct,
      wrong: self.answers.len() - correct,
      unanswered: self.questions.len() - self.answers.len(),
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TestSummary {
  pub final_score: f64,
  pub total_questions: usize,
  pub correct: usize,
  pub wrong: usize,
  pub unanswered: usize,
}

/// Why a request was turned down without touching any state. All of these
/// render as informational messages, never as faults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
  NotSubscribed,
  NoQuestionsAvailable,
  NoActiveSession,
}

#[derive(Debug, PartialEq)]
pub enum StartOutcome {
  Started,
  NotSubscribed,
  NoQuestionsAvailable,
}

#[derive(Debug, PartialEq)]
pub enum SubmitOutcome {
  Accepted { correct: bool },
  /// The index already has a recorded answer; nothing changed.
  AlreadyAnswered,
  /// The transport sent an index outside the sampled set; nothing changed.
  UnknownQuestion,
  NoActiveSession,
  TimedOut(TestSummary),
}

#[derive(Debug, PartialEq)]
pub enum NavigateOutcome {
  Moved,
  Finished(TestSummary),
  NoActiveSession,
  TimedOut(TestSummary),
}
