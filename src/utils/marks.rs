// src/utils/marks.rs

//! Whole-number mark allocation.
//!
//! `allocate` splits a budget as evenly as possible; the first
//! `budget % count` positions get one extra mark. Callers rely on that order
//! for reproducible totals, so it must not change.

use crate::error::AppError;

/// Rejects negative budgets before they reach the allocator.
pub fn budget_from(total_marks: i32) -> Result<u32, AppError> {
    u32::try_from(total_marks).map_err(|_| {
        AppError::BadRequest(format!("Total marks cannot be negative (got {})", total_marks))
    })
}

/// Splits `total_budget` across `question_count` positions.
///
/// The result sums to `total_budget` exactly and no two entries differ by
/// more than one. `question_count == 0` yields an empty allocation.
pub fn allocate(total_budget: u32, question_count: usize) -> Vec<u32> {
    if question_count == 0 {
        return Vec::new();
    }

    let count = question_count as u64;
    let base = u64::from(total_budget) / count;
    let remainder = (u64::from(total_budget) % count) as usize;

    (0..question_count)
        .map(|i| (base + u64::from(i < remainder)) as u32)
        .collect()
}

/// Allocates marks to `new_count` appended questions from whatever the
/// existing questions left over.
///
/// Fails with `InsufficientBudget` when the leftover cannot give every new
/// question at least one mark. Existing marks are never touched.
pub fn allocate_incremental(
    total_budget: u32,
    existing_marks: i64,
    new_count: usize,
) -> Result<Vec<u32>, AppError> {
    if new_count == 0 {
        return Ok(Vec::new());
    }

    let remaining = i64::from(total_budget) - existing_marks;
    if remaining < new_count as i64 {
        return Err(AppError::InsufficientBudget {
            remaining_budget: remaining.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
            question_count: new_count,
        });
    }

    // remaining >= 1 here and never exceeds total_budget
    Ok(allocate(remaining as u32, new_count))
}
