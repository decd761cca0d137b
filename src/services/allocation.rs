// src/services/allocation.rs

//! Turns an allocation request into concrete per-question marks.
//!
//! Both stores load the quiz and its questions inside a transaction, call one
//! of these planners, then write the result. A planner error therefore leaves
//! nothing written.

use std::collections::HashSet;

use crate::{
    error::AppError,
    models::{question::{MarkTarget, Question}, quiz::Quiz},
    utils::marks::{allocate, allocate_incremental, budget_from},
};

/// New quiz total plus the marks each listed question should carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reallocation {
    pub total_marks: i32,
    pub assignments: Vec<(i64, i32)>,
}

fn to_marks(raw: Vec<u32>) -> impl Iterator<Item = i32> {
    // every entry is bounded by a budget that itself fits in i32
    raw.into_iter().map(|m| m as i32)
}

/// Full reallocation of every question against the quiz's own total.
/// `questions` must be in creation order.
pub fn plan_full(quiz: &Quiz, questions: &[Question]) -> Result<Vec<(i64, i32)>, AppError> {
    let budget = budget_from(quiz.total_marks)?;
    Ok(questions
        .iter()
        .map(|q| q.id)
        .zip(to_marks(allocate(budget, questions.len())))
        .collect())
}

/// Marks for `new_count` appended questions, leaving existing ones alone.
pub fn plan_append(quiz: &Quiz, existing: &[Question], new_count: usize) -> Result<Vec<i32>, AppError> {
    let budget = budget_from(quiz.total_marks)?;
    let used: i64 = existing.iter().map(|q| i64::from(q.marks)).sum();
    Ok(to_marks(allocate_incremental(budget, used, new_count)?).collect())
}

/// Explicit allocation of `budget` over `target`.
///
/// * `All` makes `budget` the new quiz total and spreads it over every
///   question in creation order.
/// * `Questions(ids)` spreads `budget` over the listed questions in the
///   listed order. The budget plus the marks of unlisted questions must equal
///   the quiz total, so the sum invariant survives.
pub fn plan_reallocation(
    quiz: &Quiz,
    questions: &[Question],
    budget: i32,
    target: &MarkTarget,
) -> Result<Reallocation, AppError> {
    let raw_budget = budget_from(budget)?;

    match target {
        MarkTarget::All => {
            if quiz.passing_threshold() > budget {
                return Err(AppError::BadRequest(format!(
                    "Total marks {} would fall below passing marks {}",
                    budget,
                    quiz.passing_threshold()
                )));
            }
            let assignments = questions
                .iter()
                .map(|q| q.id)
                .zip(to_marks(allocate(raw_budget, questions.len())))
                .collect();
            Ok(Reallocation {
                total_marks: budget,
                assignments,
            })
        }
        MarkTarget::Questions(ids) => {
            let mut listed = HashSet::new();
            for id in ids {
                if !listed.insert(*id) {
                    return Err(AppError::BadRequest(format!(
                        "Question {} listed more than once",
                        id
                    )));
                }
                if !questions.iter().any(|q| q.id == *id) {
                    return Err(AppError::NotFound(format!(
                        "Question {} does not belong to quiz {}",
                        id, quiz.id
                    )));
                }
            }

            let untouched: i64 = questions
                .iter()
                .filter(|q| !listed.contains(&q.id))
                .map(|q| i64::from(q.marks))
                .sum();
            if untouched + i64::from(budget) != i64::from(quiz.total_marks) {
                return Err(AppError::BadRequest(format!(
                    "Allocating {} marks here would make the quiz total {} instead of {}",
                    budget,
                    untouched + i64::from(budget),
                    quiz.total_marks
                )));
            }

            let assignments = ids
                .iter()
                .copied()
                .zip(to_marks(allocate(raw_budget, ids.len())))
                .collect();
            Ok(Reallocation {
                total_marks: quiz.total_marks,
                assignments,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz::QuizStatus;
    use sqlx::types::Json;

    fn quiz(total: i32, passing: Option<i32>) -> Quiz {
        Quiz {
            id: 3,
            owner_id: Some(1),
            title: "Algebra".to_string(),
            description: None,
            subject: "Math".to_string(),
            total_marks: total,
            passing_marks: passing,
            timer_minutes: 15,
            status: QuizStatus::Draft,
            starts_at: None,
            ends_at: None,
            created_at: None,
        }
    }

    fn question(id: i64, marks: i32) -> Question {
        Question {
            id,
            quiz_id: 3,
            content: "2 + 2?".to_string(),
            options: Json(vec!["4".into(), "3".into(), "5".into(), "22".into()]),
            answer: "4".to_string(),
            marks,
            created_at: None,
        }
    }

    #[test]
    fn full_plan_follows_creation_order() {
        let qs = vec![question(10, 0), question(11, 0), question(12, 0)];
        assert_eq!(
            plan_full(&quiz(100, None), &qs).unwrap(),
            vec![(10, 34), (11, 33), (12, 33)]
        );
    }

    #[test]
    fn append_plan_uses_leftover() {
        let existing = vec![question(1, 4)];
        assert_eq!(plan_append(&quiz(10, None), &existing, 3).unwrap(), vec![2, 2, 2]);
        assert!(matches!(
            plan_append(&quiz(10, None), &existing, 7),
            Err(AppError::InsufficientBudget { remaining_budget: 6, question_count: 7 })
        ));
    }

    #[test]
    fn all_target_replaces_total() {
        let qs = vec![question(1, 5), question(2, 5)];
        let plan = plan_reallocation(&quiz(10, Some(5)), &qs, 21, &MarkTarget::All).unwrap();
        assert_eq!(plan.total_marks, 21);
        assert_eq!(plan.assignments, vec![(1, 11), (2, 10)]);
    }

    #[test]
    fn all_target_cannot_drop_below_passing() {
        let qs = vec![question(1, 5)];
        assert!(matches!(
            plan_reallocation(&quiz(10, Some(8)), &qs, 7, &MarkTarget::All),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn subset_target_keeps_quiz_total() {
        let qs = vec![question(1, 4), question(2, 3), question(3, 3)];
        let target = MarkTarget::Questions(vec![3, 2]);

        let plan = plan_reallocation(&quiz(10, None), &qs, 6, &target).unwrap();
        assert_eq!(plan.total_marks, 10);
        assert_eq!(plan.assignments, vec![(3, 3), (2, 3)]);

        assert!(matches!(
            plan_reallocation(&quiz(10, None), &qs, 5, &target),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn subset_target_rejects_foreign_and_duplicate_ids() {
        let qs = vec![question(1, 10)];
        assert!(matches!(
            plan_reallocation(&quiz(10, None), &qs, 10, &MarkTarget::Questions(vec![99])),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            plan_reallocation(&quiz(10, None), &qs, 10, &MarkTarget::Questions(vec![1, 1])),
            Err(AppError::BadRequest(_))
        ));
    }
}
