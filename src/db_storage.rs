use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::collections::BTreeSet;

use crate::errors::RecordsError;
use crate::models::{
    Course, CourseId, Grade, GradeId, NewCourse, NewStudent, Student, StudentId,
};
use crate::storage::RecordStore;
use crate::validators;

#[derive(Debug, FromRow)]
struct CourseRow {
    id: i64,
    name: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct StudentRow {
    id: i64,
    name: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct GradeRow {
    id: i64,
    course_id: i64,
    student_id: i64,
    value: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<GradeRow> for Grade {
    fn from(row: GradeRow) -> Self {
        Grade {
            id: GradeId(row.id),
            course_id: CourseId(row.course_id),
            student_id: StudentId(row.student_id),
            value: row.value,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// PostgreSQL-backed `RecordStore`.
///
/// The two sides of the membership relation live in separate tables
/// (`course_students`, `student_courses`). Membership changes insert or
/// delete one row on each side inside a single transaction.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn roster(&self, course: CourseId) -> Result<BTreeSet<StudentId>, RecordsError> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            "SELECT student_id FROM course_students WHERE course_id = $1 ORDER BY student_id",
        )
        .bind(course.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| StudentId(id)).collect())
    }

    async fn schedule(&self, student: StudentId) -> Result<BTreeSet<CourseId>, RecordsError> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            "SELECT course_id FROM student_courses WHERE student_id = $1 ORDER BY course_id",
        )
        .bind(student.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| CourseId(id)).collect())
    }

    async fn hydrate_course(&self, row: CourseRow) -> Result<Course, RecordsError> {
        let id = CourseId(row.id);
        Ok(Course {
            id,
            name: row.name,
            students: self.roster(id).await?,
            created_at: row.created_at,
        })
    }

    async fn hydrate_student(&self, row: StudentRow) -> Result<Student, RecordsError> {
        let id = StudentId(row.id);
        Ok(Student {
            id,
            name: row.name,
            courses: self.schedule(id).await?,
            created_at: row.created_at,
        })
    }

    async fn hydrate_courses(&self, rows: Vec<CourseRow>) -> Result<Vec<Course>, RecordsError> {
        let mut courses = Vec::with_capacity(rows.len());
        for row in rows {
            courses.push(self.hydrate_course(row).await?);
        }
        Ok(courses)
    }

    async fn hydrate_students(&self, rows: Vec<StudentRow>) -> Result<Vec<Student>, RecordsError> {
        let mut students = Vec::with_capacity(rows.len());
        for row in rows {
            students.push(self.hydrate_student(row).await?);
        }
        Ok(students)
    }
}

#[async_trait]
impl RecordStore for PostgresStore {
    async fn create_course(&self, course: NewCourse) -> Result<Course, RecordsError> {
        validators::validate_name("Course", &course.name)?;

        let row: CourseRow = sqlx::query_as(
            "INSERT INTO courses (name) VALUES ($1) RETURNING id, name, created_at",
        )
        .bind(&course.name)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!("Created course {} ({})", row.id, row.name);
        Ok(Course {
            id: CourseId(row.id),
            name: row.name,
            students: BTreeSet::new(),
            created_at: row.created_at,
        })
    }

    async fn create_student(&self, student: NewStudent) -> Result<Student, RecordsError> {
        validators::validate_name("Student", &student.name)?;

        let row: StudentRow = sqlx::query_as(
            "INSERT INTO students (name) VALUES ($1) RETURNING id, name, created_at",
        )
        .bind(&student.name)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!("Created student {} ({})", row.id, row.name);
        Ok(Student {
            id: StudentId(row.id),
            name: row.name,
            courses: BTreeSet::new(),
            created_at: row.created_at,
        })
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, RecordsError> {
        let row: Option<CourseRow> =
            sqlx::query_as("SELECT id, name, created_at FROM courses WHERE id = $1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate_course(row).await?)),
            None => Ok(None),
        }
    }

    async fn get_student(&self, id: StudentId) -> Result<Option<Student>, RecordsError> {
        let row: Option<StudentRow> =
            sqlx::query_as("SELECT id, name, created_at FROM students WHERE id = $1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate_student(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_course_by_name(&self, name: &str) -> Result<Option<Course>, RecordsError> {
        let row: Option<CourseRow> = sqlx::query_as(
            "SELECT id, name, created_at FROM courses WHERE name = $1 ORDER BY id LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate_course(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_courses(&self) -> Result<Vec<Course>, RecordsError> {
        let rows: Vec<CourseRow> =
            sqlx::query_as("SELECT id, name, created_at FROM courses ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        self.hydrate_courses(rows).await
    }

    async fn list_students(&self) -> Result<Vec<Student>, RecordsError> {
        let rows: Vec<StudentRow> =
            sqlx::query_as("SELECT id, name, created_at FROM students ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        self.hydrate_students(rows).await
    }

    async fn courses_of(&self, student: StudentId) -> Result<Vec<Course>, RecordsError> {
        let rows: Vec<CourseRow> = sqlx::query_as(
            r#"
            SELECT c.id, c.name, c.created_at
            FROM student_courses sc
            JOIN courses c ON c.id = sc.course_id
            WHERE sc.student_id = $1
            ORDER BY c.id
            "#,
        )
        .bind(student.0)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate_courses(rows).await
    }

    async fn students_of(&self, course: CourseId) -> Result<Vec<Student>, RecordsError> {
        let rows: Vec<StudentRow> = sqlx::query_as(
            r#"
            SELECT s.id, s.name, s.created_at
            FROM course_students cs
            JOIN students s ON s.id = cs.student_id
            WHERE cs.course_id = $1
            ORDER BY s.id
            "#,
        )
        .bind(course.0)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate_students(rows).await
    }

    async fn add_membership(
        &self,
        course: CourseId,
        student: StudentId,
    ) -> Result<(), RecordsError> {
        let mut tx = self.pool.begin().await?;

        // Holds concurrent enrollments into this course until commit, so the
        // roster count below is current.
        let locked: Option<(String,)> =
            sqlx::query_as("SELECT name FROM courses WHERE id = $1 FOR UPDATE")
                .bind(course.0)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((course_name,)) = locked else {
            return Err(RecordsError::NotFound(format!("course {}", course)));
        };

        let student_exists: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM students WHERE id = $1")
                .bind(student.0)
                .fetch_optional(&mut *tx)
                .await?;
        if student_exists.is_none() {
            return Err(RecordsError::NotFound(format!("student {}", student)));
        }

        let (enrolled,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM course_students WHERE course_id = $1")
                .bind(course.0)
                .fetch_one(&mut *tx)
                .await?;
        let enrolled = usize::try_from(enrolled).unwrap_or(usize::MAX);
        validators::validate_roster_size(&course_name, enrolled.saturating_add(1))?;

        let inserted = sqlx::query(
            "INSERT INTO course_students (course_id, student_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(course.0)
        .bind(student.0)
        .execute(&mut *tx)
        .await?;
        if inserted.rows_affected() == 0 {
            return Err(RecordsError::AlreadyEnrolled { course, student });
        }

        sqlx::query(
            "INSERT INTO student_courses (student_id, course_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(student.0)
        .bind(course.0)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::debug!("Added student {} to course {}", student, course);
        Ok(())
    }

    async fn remove_membership(
        &self,
        course: CourseId,
        student: StudentId,
    ) -> Result<bool, RecordsError> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(
            "DELETE FROM course_students WHERE course_id = $1 AND student_id = $2",
        )
        .bind(course.0)
        .bind(student.0)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM student_courses WHERE student_id = $1 AND course_id = $2")
            .bind(student.0)
            .bind(course.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::debug!("Removed student {} from course {}", student, course);
        Ok(removed.rows_affected() > 0)
    }

    async fn find_grade(
        &self,
        course: CourseId,
        student: StudentId,
    ) -> Result<Option<Grade>, RecordsError> {
        let row: Option<GradeRow> = sqlx::query_as(
            r#"
            SELECT id, course_id, student_id, value, created_at, updated_at
            FROM grades
            WHERE course_id = $1 AND student_id = $2
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(course.0)
        .bind(student.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Grade::from))
    }

    async fn create_grade(
        &self,
        course: CourseId,
        student: StudentId,
        value: i32,
    ) -> Result<Grade, RecordsError> {
        validators::validate_grade_value(value)?;

        let row: GradeRow = sqlx::query_as(
            r#"
            INSERT INTO grades (course_id, student_id, value)
            VALUES ($1, $2, $3)
            RETURNING id, course_id, student_id, value, created_at, updated_at
            "#,
        )
        .bind(course.0)
        .bind(student.0)
        .bind(value)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn update_grade(&self, grade: &Grade) -> Result<(), RecordsError> {
        validators::validate_grade_value(grade.value)?;

        let result = sqlx::query("UPDATE grades SET value = $2, updated_at = now() WHERE id = $1")
            .bind(grade.id.0)
            .bind(grade.value)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RecordsError::GradeNotFound {
                course: grade.course_id,
                student: grade.student_id,
            });
        }
        Ok(())
    }

    async fn average_grade(
        &self,
        course: CourseId,
        student: Option<StudentId>,
    ) -> Result<Option<f64>, RecordsError> {
        let (average,): (Option<f64>,) = sqlx::query_as(
            r#"
            SELECT AVG(value)::DOUBLE PRECISION
            FROM grades
            WHERE course_id = $1 AND ($2::BIGINT IS NULL OR student_id = $2)
            "#,
        )
        .bind(course.0)
        .bind(student.map(|s| s.0))
        .fetch_one(&self.pool)
        .await?;

        Ok(average)
    }
}
