use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::errors::RecordsError;
use crate::validators;

// ============ Identifiers ============

/// Identifier of a persisted [`Course`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseId(pub i64);

/// Identifier of a persisted [`Student`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(pub i64);

/// Identifier of a persisted [`Grade`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GradeId(pub i64);

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============ Entities ============

/// A course and the students currently enrolled in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    /// Unique identifier for the course.
    pub id: CourseId,
    /// Display name, also used to look the course up on enrollment.
    pub name: String,
    /// Enrolled students. Never more than [`validators::MAX_CLASS_SIZE`] once committed.
    pub students: BTreeSet<StudentId>,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
}

impl Course {
    /// Returns true when `student` is in this course's membership set.
    pub fn has_student(&self, student: StudentId) -> bool {
        self.students.contains(&student)
    }
}

/// A student and the courses they are enrolled in.
///
/// `courses` mirrors [`Course::students`]: a student is in a course's set
/// exactly when that course is in the student's set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    /// Unique identifier for the student.
    pub id: StudentId,
    /// Full name.
    pub name: String,
    /// Courses the student is enrolled in.
    pub courses: BTreeSet<CourseId>,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
}

impl Student {
    pub fn is_enrolled_in(&self, course: CourseId) -> bool {
        self.courses.contains(&course)
    }
}

/// A single score for one (course, student) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub id: GradeId,
    pub course_id: CourseId,
    pub student_id: StudentId,
    /// Score in `0..=100`.
    pub value: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for registering a course.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCourse {
    pub name: String,
}

impl NewCourse {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Payload for registering a student.
#[derive(Debug, Clone, Deserialize)]
pub struct NewStudent {
    pub name: String,
}

impl NewStudent {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

// ============ Grading ============

/// Coarse letter bucket for a numeric score. No +/- notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LetterGrade {
    A,
    B,
    C,
    D,
    F,
}

impl LetterGrade {
    /// Converts a score in `0..=100` to its letter.
    ///
    /// `<60` is F, then one letter per ten points up to A. A perfect 100 is an A.
    pub fn from_score(score: i64) -> Result<Self, RecordsError> {
        let value = i32::try_from(score).map_err(|_| RecordsError::InvalidRange(score))?;
        validators::validate_grade_value(value)?;

        Ok(match value {
            0..=59 => LetterGrade::F,
            60..=69 => LetterGrade::D,
            70..=79 => LetterGrade::C,
            80..=89 => LetterGrade::B,
            _ => LetterGrade::A,
        })
    }
}

impl fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            LetterGrade::A => "A",
            LetterGrade::B => "B",
            LetterGrade::C => "C",
            LetterGrade::D => "D",
            LetterGrade::F => "F",
        };
        f.write_str(letter)
    }
}

/// Result of an average query: the rounded score, or its letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AverageGrade {
    Numeric(i64),
    Letter(LetterGrade),
}

impl fmt::Display for AverageGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AverageGrade::Numeric(value) => write!(f, "{}", value),
            AverageGrade::Letter(letter) => write!(f, "{}", letter),
        }
    }
}

/// Rounds a raw average to the nearest integer, ties to even.
pub fn round_average(raw: f64) -> i64 {
    raw.round_ties_even() as i64
}

// ============ API Payloads ============

/// Body of enroll/disenroll requests.
#[derive(Debug, Clone, Deserialize)]
pub struct EnrollmentRequest {
    pub course_id: CourseId,
    pub student_id: StudentId,
}

/// Body of assign/adjust grade requests.
#[derive(Debug, Clone, Deserialize)]
pub struct GradeRequest {
    pub course_id: CourseId,
    pub student_id: StudentId,
    pub value: i32,
}

/// Query parameters for `GET /api/v1/grades`.
#[derive(Debug, Clone, Deserialize)]
pub struct GradeQueryParams {
    pub course_id: CourseId,
    pub student_id: StudentId,
}

/// Query parameters for `GET /api/v1/grades/average`.
///
/// `course_id` is optional at the wire level so a missing course surfaces as
/// an invalid-argument error rather than a rejected query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AverageQueryParams {
    pub course_id: Option<CourseId>,
    pub student_id: Option<StudentId>,
    #[serde(default)]
    pub letter: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GradeValueResponse {
    pub course_id: CourseId,
    pub student_id: StudentId,
    pub value: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AverageGradeResponse {
    pub course_id: CourseId,
    pub student_id: Option<StudentId>,
    pub average: AverageGrade,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letter_grade_buckets() {
        assert_eq!(LetterGrade::from_score(0).unwrap(), LetterGrade::F);
        assert_eq!(LetterGrade::from_score(59).unwrap(), LetterGrade::F);
        assert_eq!(LetterGrade::from_score(60).unwrap(), LetterGrade::D);
        assert_eq!(LetterGrade::from_score(69).unwrap(), LetterGrade::D);
        assert_eq!(LetterGrade::from_score(70).unwrap(), LetterGrade::C);
        assert_eq!(LetterGrade::from_score(79).unwrap(), LetterGrade::C);
        assert_eq!(LetterGrade::from_score(80).unwrap(), LetterGrade::B);
        assert_eq!(LetterGrade::from_score(89).unwrap(), LetterGrade::B);
        assert_eq!(LetterGrade::from_score(90).unwrap(), LetterGrade::A);
        assert_eq!(LetterGrade::from_score(99).unwrap(), LetterGrade::A);
    }

    #[test]
    fn test_perfect_score_is_an_a() {
        assert_eq!(LetterGrade::from_score(100).unwrap(), LetterGrade::A);
    }

    #[test]
    fn test_letter_grade_rejects_out_of_range() {
        assert!(matches!(
            LetterGrade::from_score(101),
            Err(RecordsError::InvalidRange(101))
        ));
        assert!(matches!(
            LetterGrade::from_score(-1),
            Err(RecordsError::InvalidRange(-1))
        ));
        assert!(matches!(
            LetterGrade::from_score(i64::MAX),
            Err(RecordsError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_round_average_ties_to_even() {
        assert_eq!(round_average(70.0), 70);
        assert_eq!(round_average(84.4), 84);
        assert_eq!(round_average(84.6), 85);
        assert_eq!(round_average(84.5), 84);
        assert_eq!(round_average(85.5), 86);
    }

    #[test]
    fn test_average_grade_serializes_untagged() {
        let numeric = serde_json::to_value(AverageGrade::Numeric(70)).unwrap();
        assert_eq!(numeric, serde_json::json!(70));

        let letter = serde_json::to_value(AverageGrade::Letter(LetterGrade::C)).unwrap();
        assert_eq!(letter, serde_json::json!("C"));
    }

    #[test]
    fn test_membership_helpers() {
        let mut course = Course {
            id: CourseId(1),
            name: "Algebra".to_string(),
            students: BTreeSet::new(),
            created_at: Utc::now(),
        };
        course.students.insert(StudentId(7));
        assert!(course.has_student(StudentId(7)));
        assert!(!course.has_student(StudentId(8)));
    }
}
