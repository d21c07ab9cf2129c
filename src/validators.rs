//! Pre-write guards.
//!
//! Services call these before touching storage, and every store runs them
//! again on its write path so a record that breaks a rule never lands,
//! whoever issues the write.

use crate::errors::RecordsError;

/// Maximum number of students a course may hold.
pub const MAX_CLASS_SIZE: usize = 20;

/// Lowest accepted grade value.
pub const MIN_GRADE: i32 = 0;

/// Highest accepted grade value.
pub const MAX_GRADE: i32 = 100;

/// Longest accepted course or student name, in characters.
pub const MAX_NAME_LENGTH: usize = 200;

/// Rejects a roster that would grow past [`MAX_CLASS_SIZE`].
///
/// Stores pass the size the roster would have after their write.
pub fn validate_roster_size(course_name: &str, enrolled: usize) -> Result<(), RecordsError> {
    if enrolled > MAX_CLASS_SIZE {
        return Err(RecordsError::CapacityExceeded(course_name.to_string()));
    }
    Ok(())
}

/// Rejects grade values outside `0..=100`.
pub fn validate_grade_value(value: i32) -> Result<(), RecordsError> {
    if !is_valid_grade(value) {
        return Err(RecordsError::InvalidRange(i64::from(value)));
    }
    Ok(())
}

pub fn is_valid_grade(value: i32) -> bool {
    (MIN_GRADE..=MAX_GRADE).contains(&value)
}

/// Names must be non-blank and at most [`MAX_NAME_LENGTH`] characters.
pub fn validate_name(kind: &str, name: &str) -> Result<(), RecordsError> {
    if name.trim().is_empty() {
        return Err(RecordsError::InvalidArgument(format!(
            "{} name cannot be empty",
            kind
        )));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(RecordsError::InvalidArgument(format!(
            "{} name cannot exceed {} characters",
            kind, MAX_NAME_LENGTH
        )));
    }
    Ok(())
}
