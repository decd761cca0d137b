// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::{
    config::Config,
    services::{AttemptService, AuthoringService, ResultService, UsageService},
    store::{AttemptStore, MemoryStore, PgStore, QuizRepository},
};

#[derive(Clone)]
pub struct AppState {
    pub quizzes: Arc<dyn QuizRepository>,
    pub attempts: Arc<dyn AttemptStore>,
    pub config: Config,
}

impl AppState {
    pub fn postgres(pool: PgPool, config: Config) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            quizzes: store.clone(),
            attempts: store,
            config,
        }
    }

    pub fn in_memory(store: Arc<MemoryStore>, config: Config) -> Self {
        Self {
            quizzes: store.clone(),
            attempts: store,
            config,
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for AttemptService {
    fn from_ref(state: &AppState) -> Self {
        AttemptService::new(state.quizzes.clone(), state.attempts.clone())
    }
}

impl FromRef<AppState> for ResultService {
    fn from_ref(state: &AppState) -> Self {
        ResultService::new(state.quizzes.clone(), state.attempts.clone())
    }
}

impl FromRef<AppState> for AuthoringService {
    fn from_ref(state: &AppState) -> Self {
        AuthoringService::new(state.quizzes.clone())
    }
}

impl FromRef<AppState> for UsageService {
    fn from_ref(state: &AppState) -> Self {
        UsageService::new(state.quizzes.clone(), state.config.ai_daily_limit)
    }
}
