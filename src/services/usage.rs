// src/services/usage.rs

use std::sync::Arc;

use chrono::Utc;

use crate::{error::AppError, models::usage::UsageReport, store::QuizRepository};

/// Daily quota on generated-question requests.
#[derive(Clone)]
pub struct UsageService {
    quizzes: Arc<dyn QuizRepository>,
    daily_limit: u32,
}

impl UsageService {
    pub fn new(quizzes: Arc<dyn QuizRepository>, daily_limit: u32) -> Self {
        Self {
            quizzes,
            daily_limit,
        }
    }

    pub async fn get_usage(&self, user_id: i64) -> Result<UsageReport, AppError> {
        let today = Utc::now().date_naive();
        let usage = self
            .quizzes
            .ai_usage(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        Ok(usage.report(today, self.daily_limit))
    }

    /// Spends one use of today's quota.
    pub async fn consume_usage(&self, user_id: i64) -> Result<UsageReport, AppError> {
        let today = Utc::now().date_naive();
        let usage = self
            .quizzes
            .consume_ai_usage(user_id, today, self.daily_limit)
            .await
            .inspect_err(|e| {
                if matches!(e, AppError::TooManyRequests(_)) {
                    tracing::info!("User {} hit the daily AI limit", user_id);
                }
            })?;
        Ok(usage.report(today, self.daily_limit))
    }
}
