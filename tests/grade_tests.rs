/// Integration tests for grading rules over the in-memory store
use std::sync::Arc;

use academic_records_api::errors::RecordsError;
use academic_records_api::models::{AverageGrade, Course, LetterGrade, NewCourse, NewStudent, Student};
use academic_records_api::services::{EnrollmentService, GradeService};
use academic_records_api::storage::{MemoryStore, RecordStore};

struct Fixture {
    store: Arc<MemoryStore>,
    enrollment: EnrollmentService,
    grades: GradeService,
}

impl Fixture {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            enrollment: EnrollmentService::new(store.clone()),
            grades: GradeService::new(store.clone()),
            store,
        }
    }

    async fn course(&self, name: &str) -> Course {
        self.store.create_course(NewCourse::new(name)).await.unwrap()
    }

    async fn enrolled_student(&self, name: &str, course: &Course) -> Student {
        let student = self
            .store
            .create_student(NewStudent::new(name))
            .await
            .unwrap();
        self.enrollment.enroll(&student, course).await.unwrap();
        student
    }
}

#[tokio::test]
async fn test_assign_then_get() {
    let fx = Fixture::new();
    let math = fx.course("Math").await;
    let ana = fx.enrolled_student("Ana", &math).await;

    fx.grades.assign_grade(&math, &ana, 87).await.unwrap();
    assert_eq!(fx.grades.get_grade(&math, &ana).await.unwrap(), 87);
}

#[tokio::test]
async fn test_second_assign_is_duplicate() {
    let fx = Fixture::new();
    let math = fx.course("Math").await;
    let ana = fx.enrolled_student("Ana", &math).await;

    fx.grades.assign_grade(&math, &ana, 87).await.unwrap();
    let result = fx.grades.assign_grade(&math, &ana, 90).await;

    assert_eq!(
        result,
        Err(RecordsError::DuplicateGrade {
            course: math.id,
            student: ana.id
        })
    );
    assert_eq!(fx.grades.get_grade(&math, &ana).await.unwrap(), 87);
}

#[tokio::test]
async fn test_assign_requires_enrollment() {
    let fx = Fixture::new();
    let math = fx.course("Math").await;
    let bob = fx
        .store
        .create_student(NewStudent::new("Bob"))
        .await
        .unwrap();

    let result = fx.grades.assign_grade(&math, &bob, 75).await;
    assert_eq!(
        result,
        Err(RecordsError::NotEnrolled {
            course: math.id,
            student: bob.id
        })
    );
}

#[tokio::test]
async fn test_assign_after_disenroll_is_rejected() {
    let fx = Fixture::new();
    let math = fx.course("Math").await;
    let ana = fx.enrolled_student("Ana", &math).await;

    fx.enrollment.disenroll(&ana, &math).await.unwrap();
    let result = fx.grades.assign_grade(&math, &ana, 75).await;
    assert!(matches!(result, Err(RecordsError::NotEnrolled { .. })));
}

#[tokio::test]
async fn test_assign_boundaries() {
    let fx = Fixture::new();
    let math = fx.course("Math").await;
    let low = fx.enrolled_student("Low", &math).await;
    let high = fx.enrolled_student("High", &math).await;
    let under = fx.enrolled_student("Under", &math).await;
    let over = fx.enrolled_student("Over", &math).await;

    fx.grades.assign_grade(&math, &low, 0).await.unwrap();
    fx.grades.assign_grade(&math, &high, 100).await.unwrap();
    assert_eq!(
        fx.grades.assign_grade(&math, &under, -1).await,
        Err(RecordsError::InvalidRange(-1))
    );
    assert_eq!(
        fx.grades.assign_grade(&math, &over, 101).await,
        Err(RecordsError::InvalidRange(101))
    );
    assert!(fx.grades.get_grade(&math, &under).await.is_err());
}

#[tokio::test]
async fn test_adjust_changes_only_value() {
    let fx = Fixture::new();
    let math = fx.course("Math").await;
    let ana = fx.enrolled_student("Ana", &math).await;

    fx.grades.assign_grade(&math, &ana, 60).await.unwrap();
    let before = fx.store.find_grade(math.id, ana.id).await.unwrap().unwrap();

    fx.grades.adjust_grade(&math, &ana, 95).await.unwrap();
    let after = fx.store.find_grade(math.id, ana.id).await.unwrap().unwrap();

    assert_eq!(fx.grades.get_grade(&math, &ana).await.unwrap(), 95);
    assert_eq!(after.id, before.id);
    assert_eq!(after.course_id, before.course_id);
    assert_eq!(after.student_id, before.student_id);
    assert_eq!(after.created_at, before.created_at);
}

#[tokio::test]
async fn test_adjust_without_grade_is_not_found() {
    let fx = Fixture::new();
    let math = fx.course("Math").await;
    let ana = fx.enrolled_student("Ana", &math).await;

    let result = fx.grades.adjust_grade(&math, &ana, 80).await;
    assert_eq!(
        result,
        Err(RecordsError::GradeNotFound {
            course: math.id,
            student: ana.id
        })
    );
}

#[tokio::test]
async fn test_adjust_out_of_range_is_grade_not_found() {
    let fx = Fixture::new();
    let math = fx.course("Math").await;
    let ana = fx.enrolled_student("Ana", &math).await;

    fx.grades.assign_grade(&math, &ana, 80).await.unwrap();
    let result = fx.grades.adjust_grade(&math, &ana, 120).await;

    assert!(matches!(result, Err(RecordsError::GradeNotFound { .. })));
    assert_eq!(fx.grades.get_grade(&math, &ana).await.unwrap(), 80);
}

#[tokio::test]
async fn test_get_grade_missing() {
    let fx = Fixture::new();
    let math = fx.course("Math").await;
    let ana = fx.enrolled_student("Ana", &math).await;

    assert!(matches!(
        fx.grades.get_grade(&math, &ana).await,
        Err(RecordsError::GradeNotFound { .. })
    ));
}

#[tokio::test]
async fn test_course_average_numeric_and_letter() {
    let fx = Fixture::new();
    let math = fx.course("Math").await;
    for (name, value) in [("A", 60), ("B", 70), ("C", 80)] {
        let s = fx.enrolled_student(name, &math).await;
        fx.grades.assign_grade(&math, &s, value).await.unwrap();
    }

    assert_eq!(
        fx.grades.get_average_grade(Some(&math), None, false).await.unwrap(),
        AverageGrade::Numeric(70)
    );
    assert_eq!(
        fx.grades.get_average_grade(Some(&math), None, true).await.unwrap(),
        AverageGrade::Letter(LetterGrade::C)
    );
}

#[tokio::test]
async fn test_course_average_rounds_half_to_even() {
    let fx = Fixture::new();
    let math = fx.course("Math").await;
    for (name, value) in [("A", 84), ("B", 85)] {
        let s = fx.enrolled_student(name, &math).await;
        fx.grades.assign_grade(&math, &s, value).await.unwrap();
    }

    // 84.5 rounds to the even neighbour.
    assert_eq!(
        fx.grades.get_average_grade(Some(&math), None, false).await.unwrap(),
        AverageGrade::Numeric(84)
    );
}

#[tokio::test]
async fn test_course_average_ignores_other_courses() {
    let fx = Fixture::new();
    let math = fx.course("Math").await;
    let art = fx.course("Art").await;
    let ana = fx.enrolled_student("Ana", &math).await;
    fx.enrollment.enroll(&ana, &art).await.unwrap();

    fx.grades.assign_grade(&math, &ana, 100).await.unwrap();
    fx.grades.assign_grade(&art, &ana, 40).await.unwrap();

    assert_eq!(
        fx.grades.get_average_grade(Some(&math), None, true).await.unwrap(),
        AverageGrade::Letter(LetterGrade::A)
    );
}

#[tokio::test]
async fn test_student_average() {
    let fx = Fixture::new();
    let math = fx.course("Math").await;
    let ana = fx.enrolled_student("Ana", &math).await;
    let bob = fx.enrolled_student("Bob", &math).await;
    fx.grades.assign_grade(&math, &ana, 91).await.unwrap();
    fx.grades.assign_grade(&math, &bob, 55).await.unwrap();

    assert_eq!(
        fx.grades.get_average_grade(Some(&math), Some(&ana), false).await.unwrap(),
        AverageGrade::Numeric(91)
    );
    assert_eq!(
        fx.grades.get_average_grade(Some(&math), Some(&bob), true).await.unwrap(),
        AverageGrade::Letter(LetterGrade::F)
    );
}

#[tokio::test]
async fn test_student_average_requires_enrollment() {
    let fx = Fixture::new();
    let math = fx.course("Math").await;
    let bob = fx
        .store
        .create_student(NewStudent::new("Bob"))
        .await
        .unwrap();

    let result = fx.grades.get_average_grade(Some(&math), Some(&bob), false).await;
    assert!(matches!(result, Err(RecordsError::NotEnrolled { .. })));
}

#[tokio::test]
async fn test_average_requires_course() {
    let fx = Fixture::new();
    let result = fx.grades.get_average_grade(None, None, false).await;
    assert!(matches!(result, Err(RecordsError::InvalidArgument(_))));
}

#[tokio::test]
async fn test_average_without_grades() {
    let fx = Fixture::new();
    let math = fx.course("Math").await;
    let ana = fx.enrolled_student("Ana", &math).await;

    assert_eq!(
        fx.grades.get_average_grade(Some(&math), None, false).await,
        Err(RecordsError::NoGradesFound { course: math.id })
    );
    assert_eq!(
        fx.grades.get_average_grade(Some(&math), Some(&ana), true).await,
        Err(RecordsError::NoGradesFound { course: math.id })
    );
}
