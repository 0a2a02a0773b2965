//! Application state: subscription registry, session store, question bank,
//! and the shared handles every handler needs.
//!
//! Both registries are per-key concurrent maps: operations on one user's
//! entry never block another user's, and an entry guard gives the engine
//! the read-check-write atomicity it needs for answer recording and
//! termination.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{info, instrument};

use crate::bank::QuestionBank;
use crate::config::{AppConfig, EngineConfig};
use crate::dispatch::Dispatcher;
use crate::domain::{QuizSession, Subscription, UserId};
use crate::payments::PaymentsClient;

pub struct AppState {
    pub engine: EngineConfig,
    pub bank: QuestionBank,
    pub subscriptions: DashMap<UserId, Subscription>,
    pub sessions: DashMap<UserId, QuizSession>,
    pub dispatcher: Dispatcher,
    pub payments: Option<PaymentsClient>,
    pub webhook_secret: Option<String>,
}

impl AppState {
    /// Build state from config: validate the bank, log the startup
    /// inventory, start with empty registries.
    #[instrument(level = "info", skip_all)]
    pub fn new(
        cfg: AppConfig,
        dispatcher: Dispatcher,
        payments: Option<PaymentsClient>,
        webhook_secret: Option<String>,
    ) -> Self {
        let bank = QuestionBank::from_config(&cfg.questions);
        info!(
            target: "quizpass_backend",
            bank_size = bank.len(),
            payments_enabled = payments.is_some(),
            webhook_enabled = webhook_secret.is_some(),
            "Startup inventory"
        );
        Self {
            engine: cfg.engine,
            bank,
            subscriptions: DashMap::new(),
            sessions: DashMap::new(),
            dispatcher,
            payments,
            webhook_secret,
        }
    }

    /// Unconditional overwrite: a new payment restarts the clock at
    /// `now + validity`, whatever was left on the old subscription.
    #[instrument(level = "info", skip(self))]
    pub fn grant(&self, user: UserId, now: DateTime<Utc>) -> DateTime<Utc> {
        let expires_at = now + self.engine.subscription_validity();
        self.subscriptions.insert(user, Subscription { expires_at });
        info!(target: "quizpass_backend", user, %expires_at, "Subscription granted");
        expires_at
    }

    /// The access gate: a pure read with no side effects.
    pub fn is_active(&self, user: UserId, now: DateTime<Utc>) -> bool {
        self.subscriptions.get(&user).map(|s| s.is_active(now)).unwrap_or(false)
    }
}
