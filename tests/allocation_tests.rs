// tests/allocation_tests.rs

use std::sync::Arc;

use chrono::{Duration, Utc};
use quiz_platform::{
    error::AppError,
    models::{
        question::{AllocateMarksRequest, Question, QuestionBatchRequest, QuestionDraft},
        quiz::{QuizDraft, QuizStatus},
        user::{ROLE_INSTRUCTOR, User},
    },
    services::AuthoringService,
    store::{MemoryStore, QuizRepository},
};

fn quiz_draft(total_marks: i32) -> QuizDraft {
    QuizDraft {
        title: "Fractions".to_string(),
        description: Some("Warm-up".to_string()),
        subject: "Math".to_string(),
        timer_minutes: 20,
        total_marks,
        passing_marks: Some(5),
        status: QuizStatus::Draft,
        starts_at: None,
        ends_at: None,
    }
}

fn batch(count: usize) -> QuestionBatchRequest {
    QuestionBatchRequest {
        questions: (0..count)
            .map(|i| QuestionDraft {
                content: format!("What is {}/2?", i * 2),
                options: vec![i.to_string(), "0.5".into(), "2".into(), "-1".into()],
                answer: i.to_string(),
            })
            .collect(),
    }
}

fn marks(questions: &[Question]) -> Vec<i32> {
    questions.iter().map(|q| q.marks).collect()
}

async fn setup() -> (Arc<MemoryStore>, AuthoringService, User) {
    let store = Arc::new(MemoryStore::new());
    let service = AuthoringService::new(store.clone());
    let instructor = store.add_user("mentor", ROLE_INSTRUCTOR).unwrap();
    (store, service, instructor)
}

#[tokio::test]
async fn add_rebalances_every_question() {
    let (_, service, owner) = setup().await;
    let quiz = service.create_quiz(owner.id, &quiz_draft(10)).await.unwrap();

    let first = service.add_questions(quiz.id, owner.id, false, &batch(3)).await.unwrap();
    assert_eq!(marks(&first), vec![4, 3, 3]);

    let all = service.add_questions(quiz.id, owner.id, false, &batch(2)).await.unwrap();
    assert_eq!(marks(&all), vec![2, 2, 2, 2, 2]);
}

#[tokio::test]
async fn append_spends_only_the_leftover() {
    let (store, service, owner) = setup().await;
    let quiz = service.create_quiz(owner.id, &quiz_draft(10)).await.unwrap();

    let appended = service.append_questions(quiz.id, owner.id, false, &batch(3)).await.unwrap();
    assert_eq!(marks(&appended), vec![4, 3, 3]);

    let err = service
        .append_questions(quiz.id, owner.id, false, &batch(1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::InsufficientBudget {
            remaining_budget: 0,
            question_count: 1
        }
    ));

    // nothing from the failed batch was written
    let stored = store.questions_for_quiz(quiz.id).await.unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored.iter().map(|q| q.marks).sum::<i32>(), 10);
}

#[tokio::test]
async fn zero_budget_quiz_allocates_zero_marks() {
    let (_, service, owner) = setup().await;
    let mut draft = quiz_draft(0);
    draft.passing_marks = None;
    let quiz = service.create_quiz(owner.id, &draft).await.unwrap();

    let all = service.add_questions(quiz.id, owner.id, false, &batch(3)).await.unwrap();
    assert_eq!(marks(&all), vec![0, 0, 0]);
}

#[tokio::test]
async fn explicit_allocation_over_all_questions_sets_the_total() {
    let (store, service, owner) = setup().await;
    let quiz = service.create_quiz(owner.id, &quiz_draft(10)).await.unwrap();
    service.add_questions(quiz.id, owner.id, false, &batch(3)).await.unwrap();

    let request = AllocateMarksRequest {
        total_marks: 20,
        question_ids: None,
    };
    let all = service.allocate_marks(quiz.id, owner.id, false, &request).await.unwrap();

    assert_eq!(marks(&all), vec![7, 7, 6]);
    assert_eq!(store.get_quiz(quiz.id).await.unwrap().unwrap().total_marks, 20);

    let first = store.get_question(all[0].id).await.unwrap().unwrap();
    assert_eq!(first.marks, 7);
    assert!(store.get_question(9_999).await.unwrap().is_none());
}

#[tokio::test]
async fn explicit_allocation_over_a_subset_keeps_the_sum() {
    let (_, service, owner) = setup().await;
    let quiz = service.create_quiz(owner.id, &quiz_draft(10)).await.unwrap();
    let all = service.add_questions(quiz.id, owner.id, false, &batch(3)).await.unwrap();
    let (a, b, c) = (all[0].id, all[1].id, all[2].id);

    // b keeps 3 marks; 7 are spread over c then a
    let request = AllocateMarksRequest {
        total_marks: 7,
        question_ids: Some(vec![c, a]),
    };
    let updated = service.allocate_marks(quiz.id, owner.id, false, &request).await.unwrap();

    let by_id = |id: i64| updated.iter().find(|q| q.id == id).unwrap().marks;
    assert_eq!((by_id(a), by_id(b), by_id(c)), (3, 3, 4));

    let unbalanced = AllocateMarksRequest {
        total_marks: 8,
        question_ids: Some(vec![c, a]),
    };
    assert!(matches!(
        service.allocate_marks(quiz.id, owner.id, false, &unbalanced).await,
        Err(AppError::BadRequest(_))
    ));
}

#[tokio::test]
async fn negative_budget_is_rejected() {
    let (_, service, owner) = setup().await;
    let quiz = service.create_quiz(owner.id, &quiz_draft(10)).await.unwrap();
    service.add_questions(quiz.id, owner.id, false, &batch(2)).await.unwrap();

    let request = AllocateMarksRequest {
        total_marks: -4,
        question_ids: None,
    };
    assert!(matches!(
        service.allocate_marks(quiz.id, owner.id, false, &request).await,
        Err(AppError::BadRequest(_))
    ));
}

#[tokio::test]
async fn only_the_owner_or_an_admin_manages_a_quiz() {
    let (store, service, owner) = setup().await;
    let rival = store.add_user("rival", ROLE_INSTRUCTOR).unwrap();
    let quiz = service.create_quiz(owner.id, &quiz_draft(10)).await.unwrap();

    assert!(matches!(
        service.add_questions(quiz.id, rival.id, false, &batch(1)).await,
        Err(AppError::Forbidden(_))
    ));
    assert!(service.add_questions(quiz.id, rival.id, true, &batch(1)).await.is_ok());
}

#[tokio::test]
async fn invalid_drafts_are_rejected() {
    let (_, service, owner) = setup().await;

    let mut draft = quiz_draft(10);
    draft.passing_marks = Some(11);
    assert!(matches!(
        service.create_quiz(owner.id, &draft).await,
        Err(AppError::BadRequest(_))
    ));

    let quiz = service.create_quiz(owner.id, &quiz_draft(10)).await.unwrap();
    let mut bad = batch(1);
    bad.questions[0].answer = "not an option".to_string();
    assert!(matches!(
        service.add_questions(quiz.id, owner.id, false, &bad).await,
        Err(AppError::BadRequest(_))
    ));
}

#[tokio::test]
async fn exam_questions_follow_the_quiz_window() {
    let (_, service, owner) = setup().await;
    let now = Utc::now();

    let draft_quiz = service.create_quiz(owner.id, &quiz_draft(10)).await.unwrap();
    assert!(matches!(
        service.exam_questions(draft_quiz.id, now).await,
        Err(AppError::Forbidden(_))
    ));

    let mut published = quiz_draft(10);
    published.status = QuizStatus::Published;
    published.starts_at = Some(now - Duration::hours(1));
    published.ends_at = Some(now + Duration::hours(1));
    let open = service.create_quiz(owner.id, &published).await.unwrap();
    service.add_questions(open.id, owner.id, false, &batch(2)).await.unwrap();

    let questions = service.exam_questions(open.id, now).await.unwrap();
    assert_eq!(questions.len(), 2);

    assert!(matches!(
        service.exam_questions(open.id, now + Duration::hours(2)).await,
        Err(AppError::Gone(_))
    ));
    assert!(matches!(
        service.exam_questions(open.id, now - Duration::hours(2)).await,
        Err(AppError::Forbidden(_))
    ));
}
