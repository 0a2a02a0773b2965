//! Question bank: validated TOML entries plus built-in seed questions, and
//! uniform sampling without replacement for new sessions.

use rand::seq::SliceRandom;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::QuestionCfg;
use crate::domain::Question;

pub struct QuestionBank {
  questions: Vec<Question>,
}

impl QuestionBank {
  pub fn new(questions: Vec<Question>) -> Self {
    Self { questions }
  }

  /// Build from config entries. Invalid entries are skipped with an error
  /// log; when nothing valid remains we fall back to the built-in seed set
  /// so the service stays usable without external config.
  pub fn from_config(entries: &[QuestionCfg]) -> Self {
    let mut questions = Vec::new();
    for qc in entries {
      let id = qc.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
      if qc.options.len() < 2 {
        error!(target: "quiz", %id, "Skipping bank item: fewer than two options.");
        continue;
      }
      if !qc.options.iter().any(|o| o == &qc.correct) {
        error!(target: "quiz", %id, "Skipping bank item: correct label not among options.");
        continue;
      }
      questions.push(Question {
        id,
        prompt: qc.prompt.clone(),
        options: qc.options.clone(),
        correct: qc.correct.clone(),
      });
    }

    if questions.is_empty() {
      info!(target: "quiz", "No configured questions; using the built-in seed bank.");
      questions = seed_questions();
    }
    Self { questions }
  }

  pub fn len(&self) -> usize {
    self.questions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.questions.is_empty()
  }

  /// Up to `target` distinct questions, chosen uniformly at random without
  /// replacement. The order is shuffled once here and then stays fixed for
  /// the whole session.
  pub fn sample(&self, target: usize) -> Vec<Question> {
    let mut rng = rand::thread_rng();
    let mut picked: Vec<Question> = self
      .questions
      .choose_multiple(&mut rng, target.min(self.questions.len()))
      .cloned()
      .collect();
    picked.shuffle(&mut rng);
    picked
  }
}

/// Minimal set of built-in questions that keep the service useful even
/// without a configured bank.
pub fn seed_questions() -> Vec<Question> {
  let q = |id: &str, prompt: &str, options: &[&str], correct: &str| Question {
    id: id.into(),
    prompt: prompt.into(),
    options: options.iter().map(|s| s.to_string()).collect(),
    correct: correct.into(),
  };
  vec![
    q("seed-01", "Which planet is known as the Red Planet?", &["Venus", "Mars", "Jupiter", "Mercury"], "Mars"),
    q("seed-02", "What is the chemical symbol for gold?", &["Ag", "Au", "Gd", "Go"], "Au"),
    q("seed-03", "Who wrote the play 'Julius Caesar'?", &["Marlowe", "Shakespeare", "Jonson", "Webster"], "Shakespeare"),
    q("seed-04", "Which gas makes up most of Earth's atmosphere?", &["Oxygen", "Carbon dioxide", "Nitrogen", "Argon"], "Nitrogen"),
    q("seed-05", "What is the square root of 144?", &["10", "11", "12", "14"], "12"),
    q("seed-06", "Which ocean is the largest by area?", &["Atlantic", "Indian", "Arctic", "Pacific"], "Pacific"),
  ]
}
