// src/store/memory.rs

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::types::Json;

use crate::{
    error::AppError,
    models::{
        attempt::{
            Attempt, AttemptSummary, Finalization, LeaderboardEntry, NewAttempt, RecordedAnswer,
            StartOutcome, SubmittedAnswer,
        },
        question::{MarkTarget, Question, QuestionDraft},
        quiz::{Quiz, QuizDraft},
        usage::DailyUsage,
        user::User,
    },
    services::allocation::{plan_append, plan_full, plan_reallocation},
    store::{AttemptStore, QuizRepository},
};

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    users: BTreeMap<i64, User>,
    usage: HashMap<i64, DailyUsage>,
    quizzes: BTreeMap<i64, Quiz>,
    questions: BTreeMap<i64, Question>,
    attempts: BTreeMap<i64, Attempt>,
    answers: Vec<SubmittedAnswer>,
    /// (student, quiz) -> id of the active attempt.
    active: HashMap<(i64, i64), i64>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn quiz(&self, id: i64) -> Result<&Quiz, AppError> {
        self.quizzes
            .get(&id)
            .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))
    }

    fn questions_of(&self, quiz_id: i64) -> Vec<Question> {
        // ids are handed out in creation order
        self.questions
            .values()
            .filter(|q| q.quiz_id == quiz_id)
            .cloned()
            .collect()
    }

    fn apply_marks(&mut self, assignments: &[(i64, i32)]) {
        for (id, marks) in assignments {
            if let Some(q) = self.questions.get_mut(id) {
                q.marks = *marks;
            }
        }
    }

    fn insert_questions(&mut self, quiz_id: i64, drafts: &[QuestionDraft], marks: &[i32]) -> Vec<Question> {
        let now = Utc::now();
        drafts
            .iter()
            .zip(marks)
            .map(|(draft, marks)| {
                let question = Question {
                    id: self.next_id(),
                    quiz_id,
                    content: draft.content.clone(),
                    options: Json(draft.options.clone()),
                    answer: draft.answer.clone(),
                    marks: *marks,
                    created_at: Some(now),
                };
                self.questions.insert(question.id, question.clone());
                question
            })
            .collect()
    }

    fn record_answers(&mut self, attempt_id: i64, answers: &[RecordedAnswer]) {
        for answer in answers {
            let id = self.next_id();
            self.answers.push(SubmittedAnswer {
                id,
                attempt_id,
                question_id: Some(answer.question_id),
                selected_response: answer.response.clone(),
            });
        }
    }
}

fn apply_finalization(attempt: &mut Attempt, finalization: &Finalization) {
    let score = &finalization.score;
    attempt.submitted_at = Some(finalization.submitted_at);
    attempt.score_obtained = score.score_obtained;
    attempt.correct_count = score.correct_count;
    attempt.percentage = Some(score.percentage);
    attempt.passed = Some(score.passed);
    attempt.review = Json(score.question_reviews.clone());
}

/// In-process store with the same guarantees as `PgStore`.
///
/// All state sits behind one mutex, so every operation is atomic with respect
/// to every other. The lock is never held across an await.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::InternalServerError("Memory store lock poisoned".to_string()))
    }

    /// Registers a user account. Accounts come from outside the quiz core,
    /// so this has no trait counterpart.
    pub fn add_user(&self, username: &str, role: &str) -> Result<User, AppError> {
        let mut state = self.lock()?;
        if state.users.values().any(|u| u.username == username) {
            return Err(AppError::Conflict("Username already exists".to_string()));
        }
        let user = User {
            id: state.next_id(),
            username: username.to_string(),
            role: role.to_string(),
            created_at: Some(Utc::now()),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    /// Every attempt row of a (student, quiz) pair, oldest first.
    pub fn attempts_for(&self, student_id: i64, quiz_id: i64) -> Result<Vec<Attempt>, AppError> {
        let state = self.lock()?;
        Ok(state
            .attempts
            .values()
            .filter(|a| a.student_id == student_id && a.quiz_id == quiz_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl QuizRepository for MemoryStore {
    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn get_quiz(&self, id: i64) -> Result<Option<Quiz>, AppError> {
        Ok(self.lock()?.quizzes.get(&id).cloned())
    }

    async fn create_quiz(&self, owner_id: i64, draft: &QuizDraft) -> Result<Quiz, AppError> {
        let mut state = self.lock()?;
        let quiz = Quiz {
            id: state.next_id(),
            owner_id: Some(owner_id),
            title: draft.title.clone(),
            description: draft.description.clone(),
            subject: draft.subject.clone(),
            total_marks: draft.total_marks,
            passing_marks: draft.passing_marks,
            timer_minutes: draft.timer_minutes,
            status: draft.status,
            starts_at: draft.starts_at,
            ends_at: draft.ends_at,
            created_at: Some(Utc::now()),
        };
        state.quizzes.insert(quiz.id, quiz.clone());
        Ok(quiz)
    }

    async fn update_quiz(&self, id: i64, draft: &QuizDraft) -> Result<Quiz, AppError> {
        let mut state = self.lock()?;
        let current = state.quiz(id)?.clone();

        let updated = Quiz {
            title: draft.title.clone(),
            description: draft.description.clone(),
            subject: draft.subject.clone(),
            total_marks: draft.total_marks,
            passing_marks: draft.passing_marks,
            timer_minutes: draft.timer_minutes,
            status: draft.status,
            starts_at: draft.starts_at,
            ends_at: draft.ends_at,
            ..current.clone()
        };

        let plan = if updated.total_marks != current.total_marks {
            plan_full(&updated, &state.questions_of(id))?
        } else {
            Vec::new()
        };

        state.apply_marks(&plan);
        state.quizzes.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete_quiz(&self, id: i64) -> Result<(), AppError> {
        let mut state = self.lock()?;
        state.quiz(id)?;

        let submitted = state
            .attempts
            .values()
            .filter(|a| a.quiz_id == id && a.submitted_at.is_some())
            .count();
        if submitted > 0 {
            return Err(AppError::Conflict(format!(
                "Cannot delete: {} attempts have already been submitted for this quiz",
                submitted
            )));
        }

        state.quizzes.remove(&id);
        state.questions.retain(|_, q| q.quiz_id != id);
        state.attempts.retain(|_, a| a.quiz_id != id);
        state.active.retain(|(_, quiz_id), _| *quiz_id != id);
        Ok(())
    }

    async fn questions_for_quiz(&self, quiz_id: i64) -> Result<Vec<Question>, AppError> {
        Ok(self.lock()?.questions_of(quiz_id))
    }

    async fn get_question(&self, id: i64) -> Result<Option<Question>, AppError> {
        Ok(self.lock()?.questions.get(&id).cloned())
    }

    async fn add_questions(
        &self,
        quiz_id: i64,
        drafts: &[QuestionDraft],
    ) -> Result<Vec<Question>, AppError> {
        let mut state = self.lock()?;
        let quiz = state.quiz(quiz_id)?.clone();

        // insert with zero marks, then plan; roll the insert back on error
        let inserted = state.insert_questions(quiz_id, drafts, &vec![0; drafts.len()]);
        let plan = match plan_full(&quiz, &state.questions_of(quiz_id)) {
            Ok(plan) => plan,
            Err(e) => {
                for q in &inserted {
                    state.questions.remove(&q.id);
                }
                return Err(e);
            }
        };
        state.apply_marks(&plan);

        Ok(state.questions_of(quiz_id))
    }

    async fn append_questions(
        &self,
        quiz_id: i64,
        drafts: &[QuestionDraft],
    ) -> Result<Vec<Question>, AppError> {
        let mut state = self.lock()?;
        let quiz = state.quiz(quiz_id)?.clone();

        let marks = plan_append(&quiz, &state.questions_of(quiz_id), drafts.len())?;
        Ok(state.insert_questions(quiz_id, drafts, &marks))
    }

    async fn update_question(&self, id: i64, draft: &QuestionDraft) -> Result<Question, AppError> {
        let mut state = self.lock()?;
        let question = state
            .questions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

        question.content = draft.content.clone();
        question.options = Json(draft.options.clone());
        question.answer = draft.answer.clone();
        Ok(question.clone())
    }

    async fn delete_question(&self, id: i64) -> Result<Vec<Question>, AppError> {
        let mut state = self.lock()?;
        let quiz_id = state
            .questions
            .get(&id)
            .map(|q| q.quiz_id)
            .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;
        let quiz = state.quiz(quiz_id)?.clone();

        if state.answers.iter().any(|a| a.question_id == Some(id)) {
            return Err(AppError::Conflict(
                "Cannot delete: students have already answered this question; edit its text instead"
                    .to_string(),
            ));
        }

        let mut remaining = state.questions_of(quiz_id);
        remaining.retain(|q| q.id != id);
        let plan = plan_full(&quiz, &remaining)?;

        state.questions.remove(&id);
        state.apply_marks(&plan);
        Ok(state.questions_of(quiz_id))
    }

    async fn allocate_marks(
        &self,
        quiz_id: i64,
        budget: i32,
        target: &MarkTarget,
    ) -> Result<Vec<Question>, AppError> {
        let mut state = self.lock()?;
        let quiz = state.quiz(quiz_id)?.clone();

        let plan = plan_reallocation(&quiz, &state.questions_of(quiz_id), budget, target)?;
        if let Some(q) = state.quizzes.get_mut(&quiz_id) {
            q.total_marks = plan.total_marks;
        }
        state.apply_marks(&plan.assignments);

        Ok(state.questions_of(quiz_id))
    }

    async fn ai_usage(&self, user_id: i64) -> Result<Option<DailyUsage>, AppError> {
        let state = self.lock()?;
        if !state.users.contains_key(&user_id) {
            return Ok(None);
        }
        Ok(Some(state.usage.get(&user_id).copied().unwrap_or_default()))
    }

    async fn consume_ai_usage(
        &self,
        user_id: i64,
        today: NaiveDate,
        limit: u32,
    ) -> Result<DailyUsage, AppError> {
        let mut state = self.lock()?;
        if !state.users.contains_key(&user_id) {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        let current = state.usage.get(&user_id).copied().unwrap_or_default();
        let next = current.consume(today, limit)?;
        state.usage.insert(user_id, next);
        Ok(next)
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn find_active_attempt(
        &self,
        student_id: i64,
        quiz_id: i64,
    ) -> Result<Option<Attempt>, AppError> {
        let state = self.lock()?;
        Ok(state
            .active
            .get(&(student_id, quiz_id))
            .and_then(|id| state.attempts.get(id))
            .cloned())
    }

    async fn create_attempt(&self, new: NewAttempt) -> Result<StartOutcome, AppError> {
        let mut state = self.lock()?;
        let key = (new.student_id, new.quiz_id);

        if let Some(existing) = state.active.get(&key).and_then(|id| state.attempts.get(id)) {
            return Ok(StartOutcome::AlreadyActive(existing.clone()));
        }

        let attempt = Attempt {
            id: state.next_id(),
            student_id: new.student_id,
            quiz_id: new.quiz_id,
            started_at: new.started_at,
            remaining_seconds: new.remaining_seconds,
            submitted_at: None,
            score_obtained: 0,
            correct_count: 0,
            total_marks: new.total_marks,
            percentage: None,
            passed: None,
            review: Json(Vec::new()),
        };
        state.active.insert(key, attempt.id);
        state.attempts.insert(attempt.id, attempt.clone());
        Ok(StartOutcome::Created(attempt))
    }

    async fn update_remaining_seconds(
        &self,
        student_id: i64,
        quiz_id: i64,
        seconds: i32,
    ) -> Result<Option<Attempt>, AppError> {
        let mut state = self.lock()?;
        let Some(id) = state.active.get(&(student_id, quiz_id)).copied() else {
            return Ok(None);
        };
        Ok(state.attempts.get_mut(&id).map(|attempt| {
            attempt.remaining_seconds = seconds;
            attempt.clone()
        }))
    }

    async fn finalize_attempt(
        &self,
        attempt_id: i64,
        finalization: &Finalization,
    ) -> Result<Attempt, AppError> {
        let mut state = self.lock()?;
        let attempt = state
            .attempts
            .get_mut(&attempt_id)
            .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))?;
        if !attempt.is_active() {
            return Err(AppError::StaleSubmission { attempt_id });
        }

        apply_finalization(attempt, finalization);
        let finalized = attempt.clone();

        state.active.remove(&(finalized.student_id, finalized.quiz_id));
        state.record_answers(attempt_id, &finalization.answers);
        Ok(finalized)
    }

    async fn record_submitted_attempt(
        &self,
        new: NewAttempt,
        finalization: &Finalization,
    ) -> Result<Attempt, AppError> {
        let mut state = self.lock()?;
        let mut attempt = Attempt {
            id: state.next_id(),
            student_id: new.student_id,
            quiz_id: new.quiz_id,
            started_at: new.started_at,
            remaining_seconds: new.remaining_seconds,
            submitted_at: None,
            score_obtained: 0,
            correct_count: 0,
            total_marks: new.total_marks,
            percentage: None,
            passed: None,
            review: Json(Vec::new()),
        };
        apply_finalization(&mut attempt, finalization);

        state.attempts.insert(attempt.id, attempt.clone());
        state.record_answers(attempt.id, &finalization.answers);
        Ok(attempt)
    }

    async fn get_attempt(&self, id: i64) -> Result<Option<Attempt>, AppError> {
        Ok(self.lock()?.attempts.get(&id).cloned())
    }

    async fn submitted_answers(&self, attempt_id: i64) -> Result<Vec<SubmittedAnswer>, AppError> {
        let state = self.lock()?;
        Ok(state
            .answers
            .iter()
            .filter(|a| a.attempt_id == attempt_id)
            .cloned()
            .collect())
    }

    async fn latest_submitted(
        &self,
        student_id: i64,
        quiz_id: i64,
    ) -> Result<Option<Attempt>, AppError> {
        let state = self.lock()?;
        Ok(state
            .attempts
            .values()
            .filter(|a| a.student_id == student_id && a.quiz_id == quiz_id)
            .filter(|a| a.submitted_at.is_some())
            .max_by_key(|a| (a.submitted_at, a.id))
            .cloned())
    }

    async fn list_attempts(&self, student_id: i64) -> Result<Vec<AttemptSummary>, AppError> {
        let state = self.lock()?;
        let mut summaries: Vec<AttemptSummary> = state
            .attempts
            .values()
            .filter(|a| a.student_id == student_id && a.submitted_at.is_some())
            .filter_map(|a| {
                let quiz = state.quizzes.get(&a.quiz_id)?;
                Some(AttemptSummary {
                    id: a.id,
                    quiz_id: a.quiz_id,
                    quiz_title: quiz.title.clone(),
                    subject: quiz.subject.clone(),
                    started_at: a.started_at,
                    submitted_at: a.submitted_at,
                    score_obtained: a.score_obtained,
                    total_marks: a.total_marks,
                    percentage: a.percentage,
                    passed: a.passed,
                })
            })
            .collect();
        summaries.sort_by(|a, b| (b.submitted_at, b.id).cmp(&(a.submitted_at, a.id)));
        Ok(summaries)
    }

    async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, AppError> {
        let state = self.lock()?;

        let mut totals: HashMap<i64, (i64, i64)> = HashMap::new();
        for attempt in state.attempts.values().filter(|a| a.submitted_at.is_some()) {
            let entry = totals.entry(attempt.student_id).or_default();
            entry.0 += i64::from(attempt.score_obtained);
            entry.1 += 1;
        }

        let mut rows: Vec<(i64, String, i64, i64)> = totals
            .into_iter()
            .filter_map(|(student_id, (score, attempts))| {
                let user = state.users.get(&student_id)?;
                Some((student_id, user.username.clone(), score, attempts))
            })
            .collect();
        rows.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.1.cmp(&b.1)));

        Ok(rows
            .into_iter()
            .take(usize::try_from(limit.max(0)).unwrap_or(usize::MAX))
            .enumerate()
            .map(|(i, (student_id, username, score, attempts))| LeaderboardEntry {
                rank: i as i64 + 1,
                student_id,
                username,
                score,
                attempts,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz::QuizStatus;

    fn draft(total: i32) -> QuizDraft {
        QuizDraft {
            title: "Rivers".to_string(),
            description: None,
            subject: "Geography".to_string(),
            timer_minutes: 10,
            total_marks: total,
            passing_marks: None,
            status: QuizStatus::Published,
            starts_at: None,
            ends_at: None,
        }
    }

    fn question(n: usize) -> QuestionDraft {
        QuestionDraft {
            content: format!("Question {}", n),
            options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            answer: "A".to_string(),
        }
    }

    #[tokio::test]
    async fn add_then_append_keeps_sum_within_total() {
        let store = MemoryStore::new();
        let quiz = store.create_quiz(1, &draft(10)).await.unwrap();

        let all = store.add_questions(quiz.id, &[question(1), question(2), question(3)]).await.unwrap();
        let marks: Vec<i32> = all.iter().map(|q| q.marks).collect();
        assert_eq!(marks, vec![4, 3, 3]);

        // budget fully used, appending must fail and write nothing
        let err = store.append_questions(quiz.id, &[question(4)]).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientBudget { remaining_budget: 0, question_count: 1 }));
        assert_eq!(store.questions_for_quiz(quiz.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn total_change_reallocates_existing_questions() {
        let store = MemoryStore::new();
        let quiz = store.create_quiz(1, &draft(10)).await.unwrap();
        store.add_questions(quiz.id, &[question(1), question(2)]).await.unwrap();

        store.update_quiz(quiz.id, &draft(7)).await.unwrap();

        let marks: Vec<i32> = store
            .questions_for_quiz(quiz.id)
            .await
            .unwrap()
            .iter()
            .map(|q| q.marks)
            .collect();
        assert_eq!(marks, vec![4, 3]);
    }

    #[tokio::test]
    async fn second_start_returns_existing_row() {
        let store = MemoryStore::new();
        let quiz = store.create_quiz(1, &draft(10)).await.unwrap();
        let new = NewAttempt::for_quiz(2, &quiz, Utc::now());

        let first = store.create_attempt(new.clone()).await.unwrap();
        let second = store.create_attempt(new).await.unwrap();

        assert!(matches!(first, StartOutcome::Created(_)));
        assert!(matches!(second, StartOutcome::AlreadyActive(_)));
        assert_eq!(store.attempts_for(2, quiz.id).unwrap().len(), 1);
    }
}
