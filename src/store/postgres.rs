// src/store/postgres.rs

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, types::Json};

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

/// How often `create_attempt` retries when the active row it collided with
/// disappears before it can be read.
const START_RETRIES: usize = 3;

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Loads a quiz and holds its row lock until the transaction ends, which
/// serializes every allocation pass on that quiz.
async fn lock_quiz(conn: &mut PgConnection, quiz_id: i64) -> Result<Quiz, AppError> {
    sqlx::query_as::<_, Quiz>(
        r#"
        SELECT id, owner_id, title, description, subject, total_marks, passing_marks,
               timer_minutes, status, starts_at, ends_at, created_at
        FROM quizzes
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(quiz_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))
}

async fn quiz_questions(conn: &mut PgConnection, quiz_id: i64) -> Result<Vec<Question>, AppError> {
    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, quiz_id, content, options, answer, marks, created_at
        FROM questions
        WHERE quiz_id = $1
        ORDER BY id
        "#,
    )
    .bind(quiz_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(questions)
}

async fn insert_questions(
    conn: &mut PgConnection,
    quiz_id: i64,
    drafts: &[QuestionDraft],
    marks: &[i32],
) -> Result<Vec<Question>, AppError> {
    if drafts.is_empty() {
        return Ok(Vec::new());
    }

    let mut query_builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO questions (quiz_id, content, options, answer, marks) ",
    );
    query_builder.push_values(drafts.iter().zip(marks), |mut row, (draft, marks)| {
        row.push_bind(quiz_id)
            .push_bind(draft.content.clone())
            .push_bind(Json(draft.options.clone()))
            .push_bind(draft.answer.clone())
            .push_bind(*marks);
    });
    query_builder.push(" RETURNING id, quiz_id, content, options, answer, marks, created_at");

    let mut inserted: Vec<Question> = query_builder
        .build_query_as()
        .fetch_all(&mut *conn)
        .await?;
    inserted.sort_by_key(|q| q.id);
    Ok(inserted)
}

async fn apply_marks(
    conn: &mut PgConnection,
    questions: &mut [Question],
    assignments: &[(i64, i32)],
) -> Result<(), AppError> {
    for (id, marks) in assignments {
        sqlx::query("UPDATE questions SET marks = $1 WHERE id = $2")
            .bind(marks)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        if let Some(q) = questions.iter_mut().find(|q| q.id == *id) {
            q.marks = *marks;
        }
    }
    Ok(())
}

async fn insert_answers(
    conn: &mut PgConnection,
    attempt_id: i64,
    answers: &[RecordedAnswer],
) -> Result<(), AppError> {
    if answers.is_empty() {
        return Ok(());
    }

    let mut query_builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO submitted_answers (attempt_id, question_id, selected_response) ",
    );
    query_builder.push_values(answers, |mut row, answer| {
        row.push_bind(attempt_id)
            .push_bind(answer.question_id)
            .push_bind(answer.response.clone());
    });
    query_builder.build().execute(&mut *conn).await?;
    Ok(())
}

#[async_trait]
impl QuizRepository for PgStore {
    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, role, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_quiz(&self, id: i64) -> Result<Option<Quiz>, AppError> {
        let quiz = sqlx::query_as::<_, Quiz>(
            r#"
            SELECT id, owner_id, title, description, subject, total_marks, passing_marks,
                   timer_minutes, status, starts_at, ends_at, created_at
            FROM quizzes
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(quiz)
    }

    async fn create_quiz(&self, owner_id: i64, draft: &QuizDraft) -> Result<Quiz, AppError> {
        let quiz = sqlx::query_as::<_, Quiz>(
            r#"
            INSERT INTO quizzes
                (owner_id, title, description, subject, total_marks, passing_marks,
                 timer_minutes, status, starts_at, ends_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, owner_id, title, description, subject, total_marks, passing_marks,
                      timer_minutes, status, starts_at, ends_at, created_at
            "#,
        )
        .bind(owner_id)
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(&draft.subject)
        .bind(draft.total_marks)
        .bind(draft.passing_marks)
        .bind(draft.timer_minutes)
        .bind(draft.status)
        .bind(draft.starts_at)
        .bind(draft.ends_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create quiz: {:?}", e);
            AppError::from(e)
        })?;
        Ok(quiz)
    }

    async fn update_quiz(&self, id: i64, draft: &QuizDraft) -> Result<Quiz, AppError> {
        let mut tx = self.pool.begin().await?;
        let current = lock_quiz(&mut tx, id).await?;

        let updated = sqlx::query_as::<_, Quiz>(
            r#"
            UPDATE quizzes
            SET title = $2, description = $3, subject = $4, total_marks = $5,
                passing_marks = $6, timer_minutes = $7, status = $8, starts_at = $9, ends_at = $10
            WHERE id = $1
            RETURNING id, owner_id, title, description, subject, total_marks, passing_marks,
                      timer_minutes, status, starts_at, ends_at, created_at
            "#,
        )
        .bind(id)
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(&draft.subject)
        .bind(draft.total_marks)
        .bind(draft.passing_marks)
        .bind(draft.timer_minutes)
        .bind(draft.status)
        .bind(draft.starts_at)
        .bind(draft.ends_at)
        .fetch_one(&mut *tx)
        .await?;

        if updated.total_marks != current.total_marks {
            let mut questions = quiz_questions(&mut tx, id).await?;
            if !questions.is_empty() {
                let plan = plan_full(&updated, &questions)?;
                apply_marks(&mut tx, &mut questions, &plan).await?;
                tracing::info!(
                    "Quiz {} total changed {} -> {}, reallocated {} questions",
                    id,
                    current.total_marks,
                    updated.total_marks,
                    questions.len()
                );
            }
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_quiz(&self, id: i64) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        lock_quiz(&mut tx, id).await?;

        let submitted: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM attempts WHERE quiz_id = $1 AND submitted_at IS NOT NULL",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if submitted > 0 {
            return Err(AppError::Conflict(format!(
                "Cannot delete: {} attempts have already been submitted for this quiz",
                submitted
            )));
        }

        // questions and any unsubmitted attempts go with it (ON DELETE CASCADE)
        sqlx::query("DELETE FROM quizzes WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                tracing::error!("Failed to delete quiz: {:?}", e);
                AppError::from(e)
            })?;

        tx.commit().await?;
        Ok(())
    }

    async fn questions_for_quiz(&self, quiz_id: i64) -> Result<Vec<Question>, AppError> {
        let questions = sqlx::query_as::<_, Question>(
            r#"
            SELECT id, quiz_id, content, options, answer, marks, created_at
            FROM questions
            WHERE quiz_id = $1
            ORDER BY id
            "#,
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(questions)
    }

    async fn get_question(&self, id: i64) -> Result<Option<Question>, AppError> {
        let question = sqlx::query_as::<_, Question>(
            "SELECT id, quiz_id, content, options, answer, marks, created_at FROM questions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(question)
    }

    async fn add_questions(
        &self,
        quiz_id: i64,
        drafts: &[QuestionDraft],
    ) -> Result<Vec<Question>, AppError> {
        let mut tx = self.pool.begin().await?;
        let quiz = lock_quiz(&mut tx, quiz_id).await?;

        insert_questions(&mut tx, quiz_id, drafts, &vec![0; drafts.len()]).await?;
        let mut questions = quiz_questions(&mut tx, quiz_id).await?;
        let plan = plan_full(&quiz, &questions)?;
        apply_marks(&mut tx, &mut questions, &plan).await?;

        tx.commit().await?;
        Ok(questions)
    }

    async fn append_questions(
        &self,
        quiz_id: i64,
        drafts: &[QuestionDraft],
    ) -> Result<Vec<Question>, AppError> {
        let mut tx = self.pool.begin().await?;
        let quiz = lock_quiz(&mut tx, quiz_id).await?;

        let existing = quiz_questions(&mut tx, quiz_id).await?;
        // on error the transaction is dropped and rolled back
        let marks = plan_append(&quiz, &existing, drafts.len())?;
        let inserted = insert_questions(&mut tx, quiz_id, drafts, &marks).await?;

        tx.commit().await?;
        Ok(inserted)
    }

    async fn update_question(&self, id: i64, draft: &QuestionDraft) -> Result<Question, AppError> {
        sqlx::query_as::<_, Question>(
            r#"
            UPDATE questions
            SET content = $2, options = $3, answer = $4
            WHERE id = $1
            RETURNING id, quiz_id, content, options, answer, marks, created_at
            "#,
        )
        .bind(id)
        .bind(&draft.content)
        .bind(Json(&draft.options))
        .bind(&draft.answer)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update question: {:?}", e);
            AppError::from(e)
        })?
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))
    }

    async fn delete_question(&self, id: i64) -> Result<Vec<Question>, AppError> {
        let mut tx = self.pool.begin().await?;

        let quiz_id: i64 = sqlx::query_scalar("SELECT quiz_id FROM questions WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;
        let quiz = lock_quiz(&mut tx, quiz_id).await?;

        let answered: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM submitted_answers WHERE question_id = $1)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if answered {
            return Err(AppError::Conflict(
                "Cannot delete: students have already answered this question; edit its text instead"
                    .to_string(),
            ));
        }

        sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        // the remaining questions take over the freed marks
        let mut questions = quiz_questions(&mut tx, quiz_id).await?;
        let plan = plan_full(&quiz, &questions)?;
        apply_marks(&mut tx, &mut questions, &plan).await?;

        tx.commit().await?;
        Ok(questions)
    }

    async fn allocate_marks(
        &self,
        quiz_id: i64,
        budget: i32,
        target: &MarkTarget,
    ) -> Result<Vec<Question>, AppError> {
        let mut tx = self.pool.begin().await?;
        let quiz = lock_quiz(&mut tx, quiz_id).await?;
        let mut questions = quiz_questions(&mut tx, quiz_id).await?;

        let plan = plan_reallocation(&quiz, &questions, budget, target)?;
        if plan.total_marks != quiz.total_marks {
            sqlx::query("UPDATE quizzes SET total_marks = $1 WHERE id = $2")
                .bind(plan.total_marks)
                .bind(quiz_id)
                .execute(&mut *tx)
                .await?;
        }
        apply_marks(&mut tx, &mut questions, &plan.assignments).await?;

        tx.commit().await?;
        Ok(questions)
    }

    async fn ai_usage(&self, user_id: i64) -> Result<Option<DailyUsage>, AppError> {
        let row: Option<(i32, Option<NaiveDate>)> =
            sqlx::query_as("SELECT ai_usage_count, ai_usage_date FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(count, date)| DailyUsage {
            count: count.max(0) as u32,
            date,
        }))
    }

    async fn consume_ai_usage(
        &self,
        user_id: i64,
        today: NaiveDate,
        limit: u32,
    ) -> Result<DailyUsage, AppError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(i32, Option<NaiveDate>)> = sqlx::query_as(
            "SELECT ai_usage_count, ai_usage_date FROM users WHERE id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let (count, date) = row.ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let next = DailyUsage {
            count: count.max(0) as u32,
            date,
        }
        .consume(today, limit)?;

        sqlx::query("UPDATE users SET ai_usage_count = $2, ai_usage_date = $3 WHERE id = $1")
            .bind(user_id)
            .bind(next.count as i32)
            .bind(next.date)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(next)
    }
}

#[async_trait]
impl AttemptStore for PgStore {
    async fn find_active_attempt(
        &self,
        student_id: i64,
        quiz_id: i64,
    ) -> Result<Option<Attempt>, AppError> {
        let attempt = sqlx::query_as::<_, Attempt>(
            r#"
            SELECT id, student_id, quiz_id, started_at, remaining_seconds, submitted_at,
                   score_obtained, correct_count, total_marks, percentage, passed, review
            FROM attempts
            WHERE student_id = $1 AND quiz_id = $2 AND submitted_at IS NULL
            "#,
        )
        .bind(student_id)
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn create_attempt(&self, new: NewAttempt) -> Result<StartOutcome, AppError> {
        for _ in 0..START_RETRIES {
            // The partial unique index uq_attempts_active turns a duplicate
            // start into a no-op insert; the existing row is then read back.
            let created = sqlx::query_as::<_, Attempt>(
                r#"
                INSERT INTO attempts (student_id, quiz_id, started_at, remaining_seconds, total_marks)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (student_id, quiz_id) WHERE submitted_at IS NULL DO NOTHING
                RETURNING id, student_id, quiz_id, started_at, remaining_seconds, submitted_at,
                          score_obtained, correct_count, total_marks, percentage, passed, review
                "#,
            )
            .bind(new.student_id)
            .bind(new.quiz_id)
            .bind(new.started_at)
            .bind(new.remaining_seconds)
            .bind(new.total_marks)
            .fetch_optional(&self.pool)
            .await?;
            if let Some(attempt) = created {
                return Ok(StartOutcome::Created(attempt));
            }

            if let Some(existing) = self.find_active_attempt(new.student_id, new.quiz_id).await? {
                return Ok(StartOutcome::AlreadyActive(existing));
            }
            // The conflicting row was submitted in between; try again.
        }

        Err(AppError::Conflict(
            "Attempt state changed concurrently, please retry".to_string(),
        ))
    }

    async fn update_remaining_seconds(
        &self,
        student_id: i64,
        quiz_id: i64,
        seconds: i32,
    ) -> Result<Option<Attempt>, AppError> {
        let attempt = sqlx::query_as::<_, Attempt>(
            r#"
            UPDATE attempts SET remaining_seconds = $3
            WHERE student_id = $1 AND quiz_id = $2 AND submitted_at IS NULL
            RETURNING id, student_id, quiz_id, started_at, remaining_seconds, submitted_at,
                      score_obtained, correct_count, total_marks, percentage, passed, review
            "#,
        )
        .bind(student_id)
        .bind(quiz_id)
        .bind(seconds)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn finalize_attempt(
        &self,
        attempt_id: i64,
        finalization: &Finalization,
    ) -> Result<Attempt, AppError> {
        let score = &finalization.score;
        let mut tx = self.pool.begin().await?;

        let finalized = sqlx::query_as::<_, Attempt>(
            r#"
            UPDATE attempts
            SET submitted_at = $2, score_obtained = $3, correct_count = $4,
                percentage = $5, passed = $6, review = $7
            WHERE id = $1 AND submitted_at IS NULL
            RETURNING id, student_id, quiz_id, started_at, remaining_seconds, submitted_at,
                      score_obtained, correct_count, total_marks, percentage, passed, review
            "#,
        )
        .bind(attempt_id)
        .bind(finalization.submitted_at)
        .bind(score.score_obtained)
        .bind(score.correct_count)
        .bind(score.percentage)
        .bind(score.passed)
        .bind(Json(&score.question_reviews))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(attempt) = finalized else {
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM attempts WHERE id = $1")
                .bind(attempt_id)
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match exists {
                Some(_) => AppError::StaleSubmission { attempt_id },
                None => AppError::NotFound("Attempt not found".to_string()),
            });
        };

        insert_answers(&mut tx, attempt.id, &finalization.answers).await?;
        tx.commit().await?;
        Ok(attempt)
    }

    async fn record_submitted_attempt(
        &self,
        new: NewAttempt,
        finalization: &Finalization,
    ) -> Result<Attempt, AppError> {
        let score = &finalization.score;
        let mut tx = self.pool.begin().await?;

        let attempt = sqlx::query_as::<_, Attempt>(
            r#"
            INSERT INTO attempts
                (student_id, quiz_id, started_at, remaining_seconds, total_marks, submitted_at,
                 score_obtained, correct_count, percentage, passed, review)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id, student_id, quiz_id, started_at, remaining_seconds, submitted_at,
                      score_obtained, correct_count, total_marks, percentage, passed, review
            "#,
        )
        .bind(new.student_id)
        .bind(new.quiz_id)
        .bind(new.started_at)
        .bind(new.remaining_seconds)
        .bind(new.total_marks)
        .bind(finalization.submitted_at)
        .bind(score.score_obtained)
        .bind(score.correct_count)
        .bind(score.percentage)
        .bind(score.passed)
        .bind(Json(&score.question_reviews))
        .fetch_one(&mut *tx)
        .await?;

        insert_answers(&mut tx, attempt.id, &finalization.answers).await?;
        tx.commit().await?;
        Ok(attempt)
    }

    async fn get_attempt(&self, id: i64) -> Result<Option<Attempt>, AppError> {
        let attempt = sqlx::query_as::<_, Attempt>(
            r#"
            SELECT id, student_id, quiz_id, started_at, remaining_seconds, submitted_at,
                   score_obtained, correct_count, total_marks, percentage, passed, review
            FROM attempts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn submitted_answers(&self, attempt_id: i64) -> Result<Vec<SubmittedAnswer>, AppError> {
        let answers = sqlx::query_as::<_, SubmittedAnswer>(
            "SELECT id, attempt_id, question_id, selected_response \
             FROM submitted_answers WHERE attempt_id = $1 ORDER BY id",
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(answers)
    }

    async fn latest_submitted(
        &self,
        student_id: i64,
        quiz_id: i64,
    ) -> Result<Option<Attempt>, AppError> {
        let attempt = sqlx::query_as::<_, Attempt>(
            r#"
            SELECT id, student_id, quiz_id, started_at, remaining_seconds, submitted_at,
                   score_obtained, correct_count, total_marks, percentage, passed, review
            FROM attempts
            WHERE student_id = $1 AND quiz_id = $2 AND submitted_at IS NOT NULL
            ORDER BY submitted_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(student_id)
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn list_attempts(&self, student_id: i64) -> Result<Vec<AttemptSummary>, AppError> {
        let attempts = sqlx::query_as::<_, AttemptSummary>(
            r#"
            SELECT
                a.id,
                a.quiz_id,
                q.title AS quiz_title,
                q.subject,
                a.started_at,
                a.submitted_at,
                a.score_obtained,
                a.total_marks,
                a.percentage,
                a.passed
            FROM attempts a
            JOIN quizzes q ON q.id = a.quiz_id
            WHERE a.student_id = $1 AND a.submitted_at IS NOT NULL
            ORDER BY a.submitted_at DESC, a.id DESC
            "#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list attempts: {:?}", e);
            AppError::from(e)
        })?;
        Ok(attempts)
    }

    async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, AppError> {
        let entries = sqlx::query_as::<_, LeaderboardEntry>(
            r#"
            SELECT
                ROW_NUMBER() OVER (ORDER BY SUM(a.score_obtained) DESC, u.username ASC) AS rank,
                u.id AS student_id,
                u.username,
                SUM(a.score_obtained)::BIGINT AS score,
                COUNT(a.id) AS attempts
            FROM attempts a
            JOIN users u ON u.id = a.student_id
            WHERE a.submitted_at IS NOT NULL
            GROUP BY u.id, u.username
            ORDER BY score DESC, u.username ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch leaderboard: {:?}", e);
            AppError::from(e)
        })?;
        Ok(entries)
    }
}
