//! Quiz session engine: the per-user test state machine.
//!
//! This includes:
//!   - starting a session behind the subscription gate
//!   - recording answers with first-answer-wins scoring
//!   - manual navigation (previous/next/skip/finish)
//!   - the single termination path shared by the finish command, the
//!     deadline re-checks in every mutating call, and the deadline watcher
//!
//! Every mutating operation re-checks the deadline itself; the spawned
//! watcher is only a liveness backstop for users who stop interacting.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::one::RefMut;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::dispatch;
use crate::domain::{
  ChannelId, DenialReason, NavCommand, NavigateOutcome, QuizSession, StartOutcome, SubmitOutcome,
  TestSummary, UserId,
};
use crate::protocol::DeliveryTarget;
use crate::state::AppState;

/// Start a new test for `user`, replacing any unfinished one. The gate is
/// checked first; a refused start mutates nothing.
#[instrument(level = "info", skip(state))]
pub fn start_session(state: &Arc<AppState>, user: UserId, chat: ChannelId, now: DateTime<Utc>) -> StartOutcome {
  if !state.is_active(user, now) {
    info!(target: "quiz", user, "Start refused: no active subscription");
    state.dispatcher.deliver(DeliveryTarget::Chat(chat), dispatch::denial_message(DenialReason::NotSubscribed));
    return StartOutcome::NotSubscribed;
  }

  let questions = state.bank.sample(state.engine.total_questions);
  if questions.is_empty() {
    warn!(target: "quiz", user, "Start refused: question bank is empty");
    state.dispatcher.deliver(DeliveryTarget::Chat(chat), dispatch::denial_message(DenialReason::NoQuestionsAvailable));
    return StartOutcome::NoQuestionsAvailable;
  }

  let session = QuizSession::new(chat, questions, now, state.engine.test_duration());
  let session_id = session.id;
  let total = session.questions.len();
  let first = dispatch::question_message(&session, now);

  if let Some(previous) = state.sessions.insert(user, session) {
    // The replaced attempt is gone for good; its watcher will see a
    // different session id and stand down.
    debug!(target: "quiz", user, replaced = %previous.id, "Discarded unfinished session");
  }
  spawn_deadline_watcher(Arc::clone(state), user, session_id, state.engine.test_duration_secs);

  info!(target: "quiz", user, session = %session_id, total, "Session started");
  state.dispatcher.deliver(DeliveryTarget::Chat(chat), first);
  StartOutcome::Started
}

/// Record an answer. The duplicate check and the write happen under the
/// session's entry guard, so at most one scoring adjustment per index can
/// ever happen, whatever races against us.
#[instrument(level = "debug", skip(state, label), fields(label_len = label.len()))]
pub fn submit_answer(
  state: &AppState,
  user: UserId,
  chat: ChannelId,
  index: usize,
  label: &str,
  now: DateTime<Utc>,
) -> SubmitOutcome {
  let Some(mut session) = state.sessions.get_mut(&user) else {
    state.dispatcher.deliver(DeliveryTarget::Chat(chat), dispatch::denial_message(DenialReason::NoActiveSession));
    return SubmitOutcome::NoActiveSession;
  };

  if session.expired(now) {
    let summary = session.summary();
    drop(session);
    terminate(state, user, None);
    return SubmitOutcome::TimedOut(summary);
  }

  let correct = match session.questions.get(index) {
    Some(question) => question.correct == label,
    None => {
      warn!(target: "quiz", user, index, "Ignoring answer for an out-of-range question index");
      return SubmitOutcome::UnknownQuestion;
    }
  };

  if session.answers.contains_key(&index) {
    debug!(target: "quiz", user, index, "Duplicate answer ignored");
    redraw(state, session, now);
    return SubmitOutcome::AlreadyAnswered;
  }

  if correct {
    session.score += state.engine.correct_reward;
  } else {
    // Unrecognized labels land here too: wrong, not an error.
    session.score -= state.engine.wrong_penalty;
  }
  session.answers.insert(index, label.to_string());
  debug!(target: "quiz", user, index, correct, score = session.score, "Answer recorded");

  redraw(state, session, now);
  SubmitOutcome::Accepted { correct }
}

/// Move the cursor, or finish the test. Movement past either end is a
/// no-op; `Skip` is just `Next` and never clears a recorded answer.
#[instrument(level = "debug", skip(state))]
pub fn navigate(
  state: &AppState,
  user: UserId,
  chat: ChannelId,
  command: NavCommand,
  now: DateTime<Utc>,
) -> NavigateOutcome {
  let Some(mut session) = state.sessions.get_mut(&user) else {
    state.dispatcher.deliver(DeliveryTarget::Chat(chat), dispatch::denial_message(DenialReason::NoActiveSession));
    return NavigateOutcome::NoActiveSession;
  };

  if session.expired(now) {
    let summary = session.summary();
    drop(session);
    terminate(state, user, None);
    return NavigateOutcome::TimedOut(summary);
  }

  match command {
    NavCommand::Finish => {
      let summary = session.summary();
      drop(session);
      match terminate(state, user, None) {
        Some(_) => NavigateOutcome::Finished(summary),
        // Lost the race to the deadline watcher between the check above
        // and the removal; the watcher already emitted the summary.
        None => NavigateOutcome::NoActiveSession,
      }
    }
    NavCommand::Previous => {
      if session.current > 0 {
        session.current -= 1;
      }
      redraw(state, session, now);
      NavigateOutcome::Moved
    }
    NavCommand::Next | NavCommand::Skip => {
      if session.current + 1 < session.questions.len() {
        session.current += 1;
      }
      redraw(state, session, now);
      NavigateOutcome::Moved
    }
  }
}

/// The single finalization path. Atomically removes the session (optionally
/// only while its id still matches), then emits the summary to the
/// session's channel. A second call for the same session finds nothing and
/// does nothing.
pub fn terminate(state: &AppState, user: UserId, only_session: Option<Uuid>) -> Option<TestSummary> {
  let removed = match only_session {
    Some(id) => state.sessions.remove_if(&user, |_, s| s.id == id),
    None => state.sessions.remove(&user),
  };
  let (_, session) = removed?;

  let summary = session.summary();
  info!(
    target: "quiz",
    user,
    session = %session.id,
    score = summary.final_score,
    answered = summary.correct + summary.wrong,
    "Session terminated"
  );
  state.dispatcher.deliver(DeliveryTarget::Chat(session.chat), dispatch::summary_message(&summary));
  Some(summary)
}

/// Re-render the current question to the session's channel and release the
/// entry guard before touching the delivery channel.
fn redraw(state: &AppState, session: RefMut<'_, UserId, QuizSession>, now: DateTime<Utc>) {
  let message = dispatch::question_message(&session, now);
  let chat = session.chat;
  drop(session);
  state.dispatcher.deliver(DeliveryTarget::Chat(chat), message);
}

/// One-shot watcher per session. Wakes at the deadline and terminates the
/// session only if it is still the same attempt; a session that finished
/// or was replaced in the meantime makes this a no-op.
fn spawn_deadline_watcher(state: Arc<AppState>, user: UserId, session_id: Uuid, duration_secs: u64) {
  tokio::spawn(async move {
    tokio::time::sleep(std::time::Duration::from_secs(duration_secs)).await;
    match terminate(&state, user, Some(session_id)) {
      Some(_) => info!(target: "quiz", user, session = %session_id, "Deadline watcher closed an expired session"),
      None => debug!(target: "quiz", user, session = %session_id, "Deadline watcher had nothing to do"),
    }
  });
}

#[cfg(test)]
mod tests {
  use super::*;

  use chrono::Duration;
  use tokio::sync::broadcast;

  use crate::bank::{seed_questions, QuestionBank};
  use crate::config::AppConfig;
  use crate::dispatch::Dispatcher;
  use crate::domain::Question;
  use crate::protocol::{Delivery, ServerMessage};

  const USER: UserId = 42;
  const CHAT: ChannelId = -1001;

  fn fixed_questions(n: usize) -> Vec<Question> {
    (0..n)
      .map(|i| Question {
        id: format!("q{i}"),
        prompt: format!("prompt {i}"),
        options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
        correct: "a".into(),
      })
      .collect()
  }

  fn test_state(questions: Vec<Question>) -> (Arc<AppState>, broadcast::Receiver<Delivery>) {
    let dispatcher = Dispatcher::new(64);
    let rx = dispatcher.subscribe();
    let mut state = AppState::new(AppConfig::default(), dispatcher, None, None);
    state.bank = QuestionBank::new(questions);
    (Arc::new(state), rx)
  }

  fn subscribed_state(questions: Vec<Question>) -> (Arc<AppState>, broadcast::Receiver<Delivery>, DateTime<Utc>) {
    let (state, rx) = test_state(questions);
    let now = Utc::now();
    state.grant(USER, now);
    (state, rx, now)
  }

  fn drain(rx: &mut broadcast::Receiver<Delivery>) -> Vec<Delivery> {
    let mut out = Vec::new();
    while let Ok(d) = rx.try_recv() {
      out.push(d);
    }
    out
  }

  fn summary_count(deliveries: &[Delivery]) -> usize {
    deliveries.iter().filter(|d| matches!(d.message, ServerMessage::Summary { .. })).count()
  }

  #[tokio::test]
  async fn start_is_refused_without_a_subscription() {
    let (state, mut rx) = test_state(fixed_questions(3));
    let outcome = start_session(&state, USER, CHAT, Utc::now());
    assert_eq!(outcome, StartOutcome::NotSubscribed);
    assert!(state.sessions.get(&USER).is_none());

    let deliveries = drain(&mut rx);
    assert_eq!(deliveries.len(), 1);
    assert!(matches!(
      deliveries[0].message,
      ServerMessage::Denial { reason: DenialReason::NotSubscribed, .. }
    ));
  }

  #[tokio::test]
  async fn start_is_refused_on_an_empty_bank() {
    let (state, _rx, now) = subscribed_state(Vec::new());
    let outcome = start_session(&state, USER, CHAT, now);
    assert_eq!(outcome, StartOutcome::NoQuestionsAvailable);
    assert!(state.sessions.get(&USER).is_none());
  }

  #[tokio::test]
  async fn small_bank_caps_the_session_at_bank_size() {
    // Bank of 3 against the default target of 20.
    let (state, mut rx, now) = subscribed_state(fixed_questions(3));
    assert_eq!(start_session(&state, USER, CHAT, now), StartOutcome::Started);

    let session = state.sessions.get(&USER).expect("session stored");
    assert_eq!(session.questions.len(), 3);
    assert_eq!(session.current, 0);
    assert!(session.answers.is_empty());
    assert_eq!(session.deadline, now + Duration::seconds(900));
    drop(session);

    let deliveries = drain(&mut rx);
    assert_eq!(deliveries.len(), 1);
    match &deliveries[0].message {
      ServerMessage::Question { question } => {
        assert_eq!(question.index, 0);
        assert_eq!(question.total, 3);
        assert_eq!(question.minutes_remaining, 15);
      }
      other => panic!("expected first question, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn first_answer_wins_and_later_ones_change_nothing() {
    let (state, _rx, now) = subscribed_state(fixed_questions(3));
    start_session(&state, USER, CHAT, now);

    let outcome = submit_answer(&state, USER, CHAT, 0, "a", now);
    assert_eq!(outcome, SubmitOutcome::Accepted { correct: true });

    // A different label for the same index is ignored outright.
    let outcome = submit_answer(&state, USER, CHAT, 0, "b", now);
    assert_eq!(outcome, SubmitOutcome::AlreadyAnswered);

    let session = state.sessions.get(&USER).expect("session stored");
    assert_eq!(session.answers.len(), 1);
    assert_eq!(session.answers[&0], "a");
    assert!((session.score - 1.0).abs() < 1e-9);
  }

  #[tokio::test]
  async fn wrong_and_unrecognized_labels_both_cost_a_third() {
    let (state, _rx, now) = subscribed_state(fixed_questions(3));
    start_session(&state, USER, CHAT, now);

    assert_eq!(submit_answer(&state, USER, CHAT, 0, "b", now), SubmitOutcome::Accepted { correct: false });
    // A label that is not an option at all scores as wrong, not as an error.
    assert_eq!(
      submit_answer(&state, USER, CHAT, 1, "definitely not an option", now),
      SubmitOutcome::Accepted { correct: false }
    );

    let session = state.sessions.get(&USER).expect("session stored");
    assert!((session.score + 2.0 / 3.0).abs() < 1e-9);

    // The incremental score agrees with a recount of the ledger.
    let summary = session.summary();
    assert_eq!(summary.correct, 0);
    assert_eq!(summary.wrong, 2);
    let recounted = summary.correct as f64 * state.engine.correct_reward
      - summary.wrong as f64 * state.engine.wrong_penalty;
    assert!((session.score - recounted).abs() < 1e-9);
  }

  #[tokio::test]
  async fn out_of_range_index_is_ignored() {
    let (state, _rx, now) = subscribed_state(fixed_questions(3));
    start_session(&state, USER, CHAT, now);

    assert_eq!(submit_answer(&state, USER, CHAT, 17, "a", now), SubmitOutcome::UnknownQuestion);
    let session = state.sessions.get(&USER).expect("session stored");
    assert!(session.answers.is_empty());
    assert!(session.score.abs() < 1e-9);
  }

  #[tokio::test]
  async fn one_correct_one_wrong_one_skipped_scores_two_thirds() {
    let (state, mut rx, now) = subscribed_state(fixed_questions(3));
    start_session(&state, USER, CHAT, now);

    submit_answer(&state, USER, CHAT, 0, "a", now); // correct
    navigate(&state, USER, CHAT, NavCommand::Next, now);
    submit_answer(&state, USER, CHAT, 1, "c", now); // wrong
    navigate(&state, USER, CHAT, NavCommand::Skip, now); // question 2 left unanswered

    let outcome = navigate(&state, USER, CHAT, NavCommand::Finish, now);
    let NavigateOutcome::Finished(summary) = outcome else {
      panic!("expected a summary, got {outcome:?}");
    };
    assert_eq!(summary.total_questions, 3);
    assert_eq!(summary.correct, 1);
    assert_eq!(summary.wrong, 1);
    assert_eq!(summary.unanswered, 1);
    assert!((summary.final_score - 2.0 / 3.0).abs() < 1e-9);

    assert!(state.sessions.get(&USER).is_none());
    assert_eq!(summary_count(&drain(&mut rx)), 1);
  }

  #[tokio::test]
  async fn navigation_stops_at_both_ends() {
    let (state, mut rx, now) = subscribed_state(fixed_questions(3));
    start_session(&state, USER, CHAT, now);
    drain(&mut rx);

    // Previous at the first question re-renders the same question.
    assert_eq!(navigate(&state, USER, CHAT, NavCommand::Previous, now), NavigateOutcome::Moved);
    let deliveries = drain(&mut rx);
    match &deliveries[0].message {
      ServerMessage::Question { question } => assert_eq!(question.index, 0),
      other => panic!("expected a question, got {other:?}"),
    }

    navigate(&state, USER, CHAT, NavCommand::Next, now);
    navigate(&state, USER, CHAT, NavCommand::Next, now);
    // Next and Skip at the last question stay put.
    navigate(&state, USER, CHAT, NavCommand::Next, now);
    navigate(&state, USER, CHAT, NavCommand::Skip, now);

    let session = state.sessions.get(&USER).expect("session stored");
    assert_eq!(session.current, 2);
  }

  #[tokio::test]
  async fn skip_never_clears_a_recorded_answer() {
    let (state, _rx, now) = subscribed_state(fixed_questions(3));
    start_session(&state, USER, CHAT, now);

    submit_answer(&state, USER, CHAT, 0, "a", now);
    navigate(&state, USER, CHAT, NavCommand::Next, now);
    navigate(&state, USER, CHAT, NavCommand::Previous, now);
    navigate(&state, USER, CHAT, NavCommand::Skip, now);

    let session = state.sessions.get(&USER).expect("session stored");
    assert_eq!(session.answers[&0], "a");
    assert_eq!(session.answers.len(), 1);
  }

  #[tokio::test]
  async fn past_deadline_every_action_terminates_instead_of_mutating() {
    let (state, mut rx, now) = subscribed_state(fixed_questions(3));
    start_session(&state, USER, CHAT, now);
    submit_answer(&state, USER, CHAT, 0, "a", now);
    drain(&mut rx);

    let late = now + Duration::seconds(901);
    let outcome = submit_answer(&state, USER, CHAT, 1, "a", late);
    let SubmitOutcome::TimedOut(summary) = outcome else {
      panic!("expected a timeout, got {outcome:?}");
    };
    // The late answer was not recorded.
    assert_eq!(summary.correct, 1);
    assert_eq!(summary.unanswered, 2);
    assert!(state.sessions.get(&USER).is_none());
    assert_eq!(summary_count(&drain(&mut rx)), 1);

    // With the session gone, further actions are plain rejections.
    assert_eq!(navigate(&state, USER, CHAT, NavCommand::Next, late), NavigateOutcome::NoActiveSession);
    assert_eq!(submit_answer(&state, USER, CHAT, 1, "a", late), SubmitOutcome::NoActiveSession);
  }

  #[tokio::test]
  async fn navigate_past_deadline_also_times_out() {
    let (state, mut rx, now) = subscribed_state(fixed_questions(3));
    start_session(&state, USER, CHAT, now);
    drain(&mut rx);

    let late = now + Duration::seconds(1200);
    assert!(matches!(
      navigate(&state, USER, CHAT, NavCommand::Next, late),
      NavigateOutcome::TimedOut(_)
    ));
    assert!(state.sessions.get(&USER).is_none());
    assert_eq!(summary_count(&drain(&mut rx)), 1);
  }

  #[tokio::test]
  async fn terminate_is_idempotent() {
    let (state, mut rx, now) = subscribed_state(fixed_questions(3));
    start_session(&state, USER, CHAT, now);
    drain(&mut rx);

    assert!(terminate(&state, USER, None).is_some());
    assert!(terminate(&state, USER, None).is_none());
    assert_eq!(summary_count(&drain(&mut rx)), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn watcher_closes_an_idle_session() {
    let (state, mut rx, now) = subscribed_state(fixed_questions(3));
    start_session(&state, USER, CHAT, now);

    // Nobody touches the session again; the watcher must end it on its own.
    loop {
      let delivery = rx.recv().await.expect("delivery channel open");
      if matches!(delivery.message, ServerMessage::Summary { .. }) {
        break;
      }
    }
    assert!(state.sessions.get(&USER).is_none());
    assert_eq!(summary_count(&drain(&mut rx)), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn watcher_is_inert_after_an_explicit_finish() {
    let (state, mut rx, now) = subscribed_state(fixed_questions(3));
    start_session(&state, USER, CHAT, now);

    assert!(matches!(navigate(&state, USER, CHAT, NavCommand::Finish, now), NavigateOutcome::Finished(_)));

    // Let the watcher wake long past the deadline; it must not produce a
    // second summary for the already-removed session.
    tokio::time::sleep(std::time::Duration::from_secs(1000)).await;
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    assert_eq!(summary_count(&drain(&mut rx)), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn watcher_of_a_replaced_session_stands_down() {
    let (state, mut rx, now) = subscribed_state(fixed_questions(3));
    start_session(&state, USER, CHAT, now);
    let first_id = state.sessions.get(&USER).expect("session stored").id;

    // A new start silently discards the unfinished attempt.
    start_session(&state, USER, CHAT, now);
    let second_id = state.sessions.get(&USER).expect("session stored").id;
    assert_ne!(first_id, second_id);

    // Both watchers wake; only the live session's one may terminate.
    tokio::time::sleep(std::time::Duration::from_secs(1000)).await;
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    assert!(state.sessions.get(&USER).is_none());
    assert_eq!(summary_count(&drain(&mut rx)), 1);
  }

  #[tokio::test]
  async fn users_do_not_share_sessions_or_scores() {
    let (state, _rx, now) = subscribed_state(seed_questions());
    let other: UserId = 77;
    state.grant(other, now);

    start_session(&state, USER, CHAT, now);
    start_session(&state, other, 555, now);

    let correct = state.sessions.get(&USER).expect("session stored").questions[0].correct.clone();
    submit_answer(&state, USER, CHAT, 0, &correct, now);

    assert!((state.sessions.get(&USER).expect("session").score - 1.0).abs() < 1e-9);
    assert!(state.sessions.get(&other).expect("session").score.abs() < 1e-9);
  }
}
