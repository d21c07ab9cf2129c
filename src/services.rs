use std::sync::Arc;

use crate::errors::RecordsError;
use crate::models::{round_average, AverageGrade, Course, LetterGrade, Student};
use crate::storage::RecordStore;
use crate::validators;

/// Manages the course/student membership relation.
#[derive(Clone)]
pub struct EnrollmentService {
    store: Arc<dyn RecordStore>,
}

impl EnrollmentService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Courses the student is enrolled in, ordered by id.
    pub async fn get_courses(&self, student: &Student) -> Result<Vec<Course>, RecordsError> {
        tracing::debug!("Listing courses for student {}", student.id);
        self.store.courses_of(student.id).await
    }

    /// Students enrolled in the course, ordered by id.
    pub async fn get_students(&self, course: &Course) -> Result<Vec<Student>, RecordsError> {
        tracing::debug!("Listing students for course {}", course.id);
        self.store.students_of(course.id).await
    }

    /// Enroll a student into a course.
    ///
    /// The course is resolved by name, then three checks run in order:
    /// 1. the course exists
    /// 2. it holds fewer than 20 students
    /// 3. the student is not already on its roster
    ///
    /// The store then adds the pair to both sides in one atomic step and
    /// re-checks the roster size against what is stored at that moment.
    pub async fn enroll(&self, student: &Student, course: &Course) -> Result<(), RecordsError> {
        let course = self
            .store
            .find_course_by_name(&course.name)
            .await?
            .ok_or_else(|| {
                tracing::warn!("Enrollment rejected: course '{}' does not exist", course.name);
                RecordsError::NotFound(format!("course '{}'", course.name))
            })?;

        if course.students.len() >= validators::MAX_CLASS_SIZE {
            tracing::warn!(
                "Enrollment rejected: course {} ('{}') is full",
                course.id,
                course.name
            );
            return Err(RecordsError::CapacityExceeded(course.name));
        }

        if course.has_student(student.id) {
            tracing::warn!(
                "Enrollment rejected: student {} already in course {}",
                student.id,
                course.id
            );
            return Err(RecordsError::AlreadyEnrolled {
                course: course.id,
                student: student.id,
            });
        }

        if let Err(e) = self.store.add_membership(course.id, student.id).await {
            tracing::warn!(
                "Enrollment of student {} in course {} failed: {}",
                student.id,
                course.id,
                e
            );
            return Err(e);
        }

        tracing::info!("Enrolled student {} in course {}", student.id, course.id);
        Ok(())
    }

    /// Remove a student from a course. A student who is not enrolled is left alone.
    pub async fn disenroll(&self, student: &Student, course: &Course) -> Result<(), RecordsError> {
        let Some(course) = self.store.get_course(course.id).await? else {
            tracing::debug!("Disenroll skipped: course {} does not exist", course.id);
            return Ok(());
        };

        if !course.has_student(student.id) {
            tracing::debug!(
                "Disenroll skipped: student {} not in course {}",
                student.id,
                course.id
            );
            return Ok(());
        }

        if self.store.remove_membership(course.id, student.id).await? {
            tracing::info!("Disenrolled student {} from course {}", student.id, course.id);
        } else {
            // Another request removed the pair after the roster was read.
            tracing::debug!(
                "Disenroll skipped: student {} already left course {}",
                student.id,
                course.id
            );
        }
        Ok(())
    }
}

/// Manages per-(course, student) grades.
#[derive(Clone)]
pub struct GradeService {
    store: Arc<dyn RecordStore>,
}

impl GradeService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Membership is read from storage, not from the caller's copy of the course.
    async fn is_enrolled(&self, course: &Course, student: &Student) -> Result<bool, RecordsError> {
        Ok(self
            .store
            .get_course(course.id)
            .await?
            .is_some_and(|c| c.has_student(student.id)))
    }

    /// Record the first grade for an enrolled student.
    ///
    /// Fails with `NotEnrolled` for a pair outside the roster, `InvalidRange`
    /// for a value outside 0-100, and `DuplicateGrade` when the pair already
    /// has a grade.
    pub async fn assign_grade(
        &self,
        course: &Course,
        student: &Student,
        grade: i32,
    ) -> Result<(), RecordsError> {
        if !self.is_enrolled(course, student).await? {
            tracing::warn!(
                "Grade rejected: student {} not enrolled in course {}",
                student.id,
                course.id
            );
            return Err(RecordsError::NotEnrolled {
                course: course.id,
                student: student.id,
            });
        }

        validators::validate_grade_value(grade)?;

        if self.store.find_grade(course.id, student.id).await?.is_some() {
            tracing::warn!(
                "Grade rejected: student {} already graded in course {}",
                student.id,
                course.id
            );
            return Err(RecordsError::DuplicateGrade {
                course: course.id,
                student: student.id,
            });
        }

        let created = self.store.create_grade(course.id, student.id, grade).await?;
        tracing::info!(
            "Assigned grade {} ({}) to student {} in course {}",
            created.id,
            created.value,
            student.id,
            course.id
        );
        Ok(())
    }

    /// Replace the value of an existing grade.
    ///
    /// A missing grade and an out-of-range value both fail with `GradeNotFound`.
    pub async fn adjust_grade(
        &self,
        course: &Course,
        student: &Student,
        grade: i32,
    ) -> Result<(), RecordsError> {
        let existing = self.store.find_grade(course.id, student.id).await?;
        let mut existing = match existing {
            Some(g) if validators::is_valid_grade(grade) => g,
            _ => {
                tracing::warn!(
                    "Grade adjustment rejected for student {} in course {} (value {})",
                    student.id,
                    course.id,
                    grade
                );
                return Err(RecordsError::GradeNotFound {
                    course: course.id,
                    student: student.id,
                });
            }
        };

        let previous = existing.value;
        existing.value = grade;
        self.store.update_grade(&existing).await?;

        tracing::info!(
            "Adjusted grade {} for student {} in course {}: {} -> {}",
            existing.id,
            student.id,
            course.id,
            previous,
            grade
        );
        Ok(())
    }

    /// Value of the pair's grade.
    pub async fn get_grade(&self, course: &Course, student: &Student) -> Result<i32, RecordsError> {
        self.store
            .find_grade(course.id, student.id)
            .await?
            .map(|g| g.value)
            .ok_or(RecordsError::GradeNotFound {
                course: course.id,
                student: student.id,
            })
    }

    /// Average grade for a course, or for one enrolled student in it.
    ///
    /// The mean is rounded half-to-even. With `is_letter_grade` the rounded
    /// value is returned as its letter.
    pub async fn get_average_grade(
        &self,
        course: Option<&Course>,
        student: Option<&Student>,
        is_letter_grade: bool,
    ) -> Result<AverageGrade, RecordsError> {
        let course = course.ok_or_else(|| {
            RecordsError::InvalidArgument("course must be specified".to_string())
        })?;

        let raw = match student {
            None => self.store.average_grade(course.id, None).await?,
            Some(student) => {
                if !self.is_enrolled(course, student).await? {
                    return Err(RecordsError::NotEnrolled {
                        course: course.id,
                        student: student.id,
                    });
                }
                self.store.average_grade(course.id, Some(student.id)).await?
            }
        };

        let average = round_average(raw.ok_or(RecordsError::NoGradesFound { course: course.id })?);
        tracing::debug!("Average grade for course {}: {}", course.id, average);

        if is_letter_grade {
            Ok(AverageGrade::Letter(LetterGrade::from_score(average)?))
        } else {
            Ok(AverageGrade::Numeric(average))
        }
    }
}
