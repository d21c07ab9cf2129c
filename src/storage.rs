//! Storage interface the services are written against, plus an in-process store.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

use crate::errors::RecordsError;
use crate::models::{
    Course, CourseId, Grade, GradeId, NewCourse, NewStudent, Student, StudentId,
};
use crate::validators;

/// Abstract interface for course, student and grade persistence.
///
/// Implementations read membership fresh on every call; callers never rely on
/// a cached `Course` or `Student` to decide a rule.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Register a course with an empty roster.
    async fn create_course(&self, course: NewCourse) -> Result<Course, RecordsError>;

    /// Register a student with no enrollments.
    async fn create_student(&self, student: NewStudent) -> Result<Student, RecordsError>;

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, RecordsError>;

    async fn get_student(&self, id: StudentId) -> Result<Option<Student>, RecordsError>;

    /// Exact-match lookup by name. The lowest id wins when names collide.
    async fn find_course_by_name(&self, name: &str) -> Result<Option<Course>, RecordsError>;

    /// All courses, ordered by id.
    async fn list_courses(&self) -> Result<Vec<Course>, RecordsError>;

    /// All students, ordered by id.
    async fn list_students(&self) -> Result<Vec<Student>, RecordsError>;

    /// Courses the student is enrolled in, ordered by id.
    async fn courses_of(&self, student: StudentId) -> Result<Vec<Course>, RecordsError>;

    /// Students enrolled in the course, ordered by id.
    async fn students_of(&self, course: CourseId) -> Result<Vec<Student>, RecordsError>;

    /// Add one student to one course, on both sides of the relation, in one
    /// atomic step.
    ///
    /// The roster size is re-checked against stored state, so this fails with
    /// `CapacityExceeded` when the course is already full, and with
    /// `AlreadyEnrolled` when the pair is already present.
    async fn add_membership(
        &self,
        course: CourseId,
        student: StudentId,
    ) -> Result<(), RecordsError>;

    /// Remove one student from one course on both sides in one atomic step.
    /// Returns false when the pair was not enrolled.
    async fn remove_membership(
        &self,
        course: CourseId,
        student: StudentId,
    ) -> Result<bool, RecordsError>;

    async fn find_grade(
        &self,
        course: CourseId,
        student: StudentId,
    ) -> Result<Option<Grade>, RecordsError>;

    async fn create_grade(
        &self,
        course: CourseId,
        student: StudentId,
        value: i32,
    ) -> Result<Grade, RecordsError>;

    /// Overwrite the stored value of an existing grade.
    async fn update_grade(&self, grade: &Grade) -> Result<(), RecordsError>;

    /// Mean grade value for the course, optionally restricted to one student.
    /// `None` when no grade matches.
    async fn average_grade(
        &self,
        course: CourseId,
        student: Option<StudentId>,
    ) -> Result<Option<f64>, RecordsError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    courses: BTreeMap<CourseId, Course>,
    students: BTreeMap<StudentId, Student>,
    grades: BTreeMap<GradeId, Grade>,
    next_course_id: i64,
    next_student_id: i64,
    next_grade_id: i64,
}

impl MemoryState {
    fn grade_for(&self, course: CourseId, student: StudentId) -> Option<&Grade> {
        self.grades
            .values()
            .find(|g| g.course_id == course && g.student_id == student)
    }
}

/// In-memory `RecordStore`.
///
/// A single lock guards all tables, so each trait call is atomic with respect
/// to every other call.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_course(&self, course: NewCourse) -> Result<Course, RecordsError> {
        validators::validate_name("Course", &course.name)?;

        let mut state = self.state.write().await;
        state.next_course_id += 1;
        let created = Course {
            id: CourseId(state.next_course_id),
            name: course.name,
            students: BTreeSet::new(),
            created_at: Utc::now(),
        };
        state.courses.insert(created.id, created.clone());

        tracing::debug!("Created course {} ({})", created.id, created.name);
        Ok(created)
    }

    async fn create_student(&self, student: NewStudent) -> Result<Student, RecordsError> {
        validators::validate_name("Student", &student.name)?;

        let mut state = self.state.write().await;
        state.next_student_id += 1;
        let created = Student {
            id: StudentId(state.next_student_id),
            name: student.name,
            courses: BTreeSet::new(),
            created_at: Utc::now(),
        };
        state.students.insert(created.id, created.clone());

        tracing::debug!("Created student {} ({})", created.id, created.name);
        Ok(created)
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, RecordsError> {
        Ok(self.state.read().await.courses.get(&id).cloned())
    }

    async fn get_student(&self, id: StudentId) -> Result<Option<Student>, RecordsError> {
        Ok(self.state.read().await.students.get(&id).cloned())
    }

    async fn find_course_by_name(&self, name: &str) -> Result<Option<Course>, RecordsError> {
        Ok(self
            .state
            .read()
            .await
            .courses
            .values()
            .find(|c| c.name == name)
            .cloned())
    }

    async fn list_courses(&self) -> Result<Vec<Course>, RecordsError> {
        Ok(self.state.read().await.courses.values().cloned().collect())
    }

    async fn list_students(&self) -> Result<Vec<Student>, RecordsError> {
        Ok(self.state.read().await.students.values().cloned().collect())
    }

    async fn courses_of(&self, student: StudentId) -> Result<Vec<Course>, RecordsError> {
        let state = self.state.read().await;
        let Some(student) = state.students.get(&student) else {
            return Ok(Vec::new());
        };

        // BTreeSet iteration is already id-ordered.
        Ok(student
            .courses
            .iter()
            .filter_map(|id| state.courses.get(id).cloned())
            .collect())
    }

    async fn students_of(&self, course: CourseId) -> Result<Vec<Student>, RecordsError> {
        let state = self.state.read().await;
        let Some(course) = state.courses.get(&course) else {
            return Ok(Vec::new());
        };

        Ok(course
            .students
            .iter()
            .filter_map(|id| state.students.get(id).cloned())
            .collect())
    }

    async fn add_membership(
        &self,
        course: CourseId,
        student: StudentId,
    ) -> Result<(), RecordsError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let stored_course = state
            .courses
            .get_mut(&course)
            .ok_or_else(|| RecordsError::NotFound(format!("course {}", course)))?;
        let stored_student = state
            .students
            .get_mut(&student)
            .ok_or_else(|| RecordsError::NotFound(format!("student {}", student)))?;

        if stored_course.has_student(student) {
            return Err(RecordsError::AlreadyEnrolled { course, student });
        }
        validators::validate_roster_size(&stored_course.name, stored_course.students.len() + 1)?;

        stored_course.students.insert(student);
        stored_student.courses.insert(course);
        Ok(())
    }

    async fn remove_membership(
        &self,
        course: CourseId,
        student: StudentId,
    ) -> Result<bool, RecordsError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let removed = state
            .courses
            .get_mut(&course)
            .is_some_and(|c| c.students.remove(&student));
        if let Some(stored) = state.students.get_mut(&student) {
            stored.courses.remove(&course);
        }
        Ok(removed)
    }

    async fn find_grade(
        &self,
        course: CourseId,
        student: StudentId,
    ) -> Result<Option<Grade>, RecordsError> {
        Ok(self.state.read().await.grade_for(course, student).cloned())
    }

    async fn create_grade(
        &self,
        course: CourseId,
        student: StudentId,
        value: i32,
    ) -> Result<Grade, RecordsError> {
        validators::validate_grade_value(value)?;

        let mut state = self.state.write().await;
        state.next_grade_id += 1;
        let now = Utc::now();
        let grade = Grade {
            id: GradeId(state.next_grade_id),
            course_id: course,
            student_id: student,
            value,
            created_at: now,
            updated_at: now,
        };
        state.grades.insert(grade.id, grade.clone());
        Ok(grade)
    }

    async fn update_grade(&self, grade: &Grade) -> Result<(), RecordsError> {
        validators::validate_grade_value(grade.value)?;

        let mut state = self.state.write().await;
        match state.grades.get_mut(&grade.id) {
            Some(stored) => {
                stored.value = grade.value;
                stored.updated_at = Utc::now();
                Ok(())
            }
            None => Err(RecordsError::GradeNotFound {
                course: grade.course_id,
                student: grade.student_id,
            }),
        }
    }

    async fn average_grade(
        &self,
        course: CourseId,
        student: Option<StudentId>,
    ) -> Result<Option<f64>, RecordsError> {
        let state = self.state.read().await;
        let values: Vec<i32> = state
            .grades
            .values()
            .filter(|g| g.course_id == course)
            .filter(|g| student.map_or(true, |s| g.student_id == s))
            .map(|g| g.value)
            .collect();

        if values.is_empty() {
            return Ok(None);
        }

        let total: i64 = values.iter().map(|v| i64::from(*v)).sum();
        Ok(Some(total as f64 / values.len() as f64))
    }
}
