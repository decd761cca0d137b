// tests/postgres_store_tests.rs
//
// Runs against a real PostgreSQL when DATABASE_URL is set; otherwise each test
// returns early.

use chrono::Utc;
use quiz_platform::{
    error::AppError,
    models::{
        attempt::{Finalization, NewAttempt, RecordedAnswer, ScoreResult, StartOutcome},
        question::{MarkTarget, QuestionDraft},
        quiz::{Quiz, QuizDraft, QuizStatus},
    },
    store::{AttemptStore, PgStore, QuizRepository},
};
use sqlx::postgres::PgPoolOptions;

async fn connect() -> Option<PgStore> {
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    Some(PgStore::new(pool))
}

async fn insert_user(store: &PgStore, role: &str) -> i64 {
    // Truncate UUID to keep usernames short
    let username = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);
    sqlx::query_scalar("INSERT INTO users (username, role) VALUES ($1, $2) RETURNING id")
        .bind(username)
        .bind(role)
        .fetch_one(store.pool())
        .await
        .expect("Failed to insert user")
}

async fn insert_quiz(store: &PgStore, owner_id: i64, total_marks: i32) -> Quiz {
    let draft = QuizDraft {
        title: "Rivers of Europe".to_string(),
        description: None,
        subject: "Geography".to_string(),
        timer_minutes: 15,
        total_marks,
        passing_marks: None,
        status: QuizStatus::Published,
        starts_at: None,
        ends_at: None,
    };
    store.create_quiz(owner_id, &draft).await.unwrap()
}

fn drafts(count: usize) -> Vec<QuestionDraft> {
    (0..count)
        .map(|i| QuestionDraft {
            content: format!("River #{}?", i),
            options: vec!["Danube".into(), "Rhine".into(), "Elbe".into(), "Po".into()],
            answer: "Danube".to_string(),
        })
        .collect()
}

fn finalization(score_obtained: i32) -> Finalization {
    Finalization {
        submitted_at: Utc::now(),
        score: ScoreResult {
            score_obtained,
            correct_count: 1,
            total_marks: 10,
            percentage: f64::from(score_obtained) * 10.0,
            passed: true,
            question_reviews: Vec::new(),
        },
        answers: Vec::new(),
    }
}

#[tokio::test]
async fn concurrent_starts_share_one_active_row() {
    let Some(store) = connect().await else {
        return;
    };
    let owner = insert_user(&store, "instructor").await;
    let student = insert_user(&store, "student").await;
    let quiz = insert_quiz(&store, owner, 10).await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let new = NewAttempt::for_quiz(student, &quiz, Utc::now());
            tokio::spawn(async move { store.create_attempt(new).await })
        })
        .collect();

    let mut ids = Vec::new();
    let mut created = 0;
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        if matches!(outcome, StartOutcome::Created(_)) {
            created += 1;
        }
        ids.push(outcome.into_attempt().id);
    }

    assert_eq!(created, 1);
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn finalize_is_single_shot_and_stops_timer_updates() {
    let Some(store) = connect().await else {
        return;
    };
    let owner = insert_user(&store, "instructor").await;
    let student = insert_user(&store, "student").await;
    let quiz = insert_quiz(&store, owner, 10).await;
    let questions = store.add_questions(quiz.id, &drafts(1)).await.unwrap();

    let attempt = store
        .create_attempt(NewAttempt::for_quiz(student, &quiz, Utc::now()))
        .await
        .unwrap()
        .into_attempt();

    let mut first = finalization(10);
    first.answers.push(RecordedAnswer {
        question_id: questions[0].id,
        response: "Danube".to_string(),
    });
    let finalized = store.finalize_attempt(attempt.id, &first).await.unwrap();
    assert_eq!(finalized.id, attempt.id);
    assert_eq!(finalized.started_at, attempt.started_at);

    assert!(matches!(
        store.finalize_attempt(attempt.id, &finalization(0)).await,
        Err(AppError::StaleSubmission { .. })
    ));
    assert!(
        store
            .update_remaining_seconds(student, quiz.id, 5)
            .await
            .unwrap()
            .is_none()
    );

    let answers = store.submitted_answers(attempt.id).await.unwrap();
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].selected_response, "Danube");

    // a new start after submission opens a fresh row
    let next = store
        .create_attempt(NewAttempt::for_quiz(student, &quiz, Utc::now()))
        .await
        .unwrap();
    assert!(matches!(next, StartOutcome::Created(ref a) if a.id != attempt.id));
}

#[tokio::test]
async fn failed_append_writes_no_questions() {
    let Some(store) = connect().await else {
        return;
    };
    let owner = insert_user(&store, "instructor").await;
    let quiz = insert_quiz(&store, owner, 10).await;

    let appended = store.append_questions(quiz.id, &drafts(3)).await.unwrap();
    assert_eq!(appended.iter().map(|q| q.marks).collect::<Vec<_>>(), vec![4, 3, 3]);

    assert!(matches!(
        store.append_questions(quiz.id, &drafts(2)).await,
        Err(AppError::InsufficientBudget {
            remaining_budget: 0,
            question_count: 2
        })
    ));
    assert_eq!(store.questions_for_quiz(quiz.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn reallocation_updates_quiz_and_questions_together() {
    let Some(store) = connect().await else {
        return;
    };
    let owner = insert_user(&store, "instructor").await;
    let quiz = insert_quiz(&store, owner, 10).await;
    store.add_questions(quiz.id, &drafts(3)).await.unwrap();

    let all = store.allocate_marks(quiz.id, 20, &MarkTarget::All).await.unwrap();
    assert_eq!(all.iter().map(|q| q.marks).collect::<Vec<_>>(), vec![7, 7, 6]);

    let stored = store.get_quiz(quiz.id).await.unwrap().unwrap();
    assert_eq!(stored.total_marks, 20);
}

#[tokio::test]
async fn daily_usage_is_capped() {
    let Some(store) = connect().await else {
        return;
    };
    let user = insert_user(&store, "student").await;
    let today = Utc::now().date_naive();

    store.consume_ai_usage(user, today, 1).await.unwrap();
    assert!(matches!(
        store.consume_ai_usage(user, today, 1).await,
        Err(AppError::TooManyRequests(_))
    ));

    let usage = store.ai_usage(user).await.unwrap().unwrap();
    assert_eq!(usage.current(today), 1);
}

#[tokio::test]
async fn deletes_respect_submitted_answers() {
    let Some(store) = connect().await else {
        return;
    };
    let owner = insert_user(&store, "instructor").await;
    let student = insert_user(&store, "student").await;
    let quiz = insert_quiz(&store, owner, 10).await;
    let questions = store.add_questions(quiz.id, &drafts(3)).await.unwrap();

    let remaining = store.delete_question(questions[2].id).await.unwrap();
    assert_eq!(remaining.iter().map(|q| q.marks).collect::<Vec<_>>(), vec![5, 5]);

    let attempt = store
        .create_attempt(NewAttempt::for_quiz(student, &quiz, Utc::now()))
        .await
        .unwrap()
        .into_attempt();
    let mut submitted = finalization(5);
    submitted.answers.push(RecordedAnswer {
        question_id: questions[0].id,
        response: "Danube".to_string(),
    });
    store.finalize_attempt(attempt.id, &submitted).await.unwrap();

    assert!(matches!(
        store.delete_question(questions[0].id).await,
        Err(AppError::Conflict(_))
    ));
    assert!(matches!(store.delete_quiz(quiz.id).await, Err(AppError::Conflict(_))));

    let untouched = insert_quiz(&store, owner, 10).await;
    store.delete_quiz(untouched.id).await.unwrap();
    assert!(store.get_quiz(untouched.id).await.unwrap().is_none());
}
