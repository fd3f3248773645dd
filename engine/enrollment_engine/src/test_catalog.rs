use crate::error::EngineError;
use crate::testutil::{draft_course, funded_student, open_course, setup, student};
use crate::types::{CourseState, NewCourse, RegistrationStatus};

#[tokio::test]
async fn test_student_numbers_are_unique() {
    let engine = setup().await;
    student(&engine, "C001").await;

    let err = engine.create_student("Someone Else", "C001").await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = engine.create_student("   ", "C002").await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn test_update_student() {
    let engine = setup().await;
    let s = student(&engine, "C010").await;
    student(&engine, "C011").await;

    let updated = engine
        .update_student(s.id, "Ayşe Yılmaz", "C012")
        .await
        .unwrap();
    assert_eq!(updated.full_name, "Ayşe Yılmaz");
    assert_eq!(updated.student_no, "C012");
    assert_eq!(engine.student(s.id).await.unwrap(), updated);

    assert!(matches!(
        engine.update_student(s.id, "Ayşe Yılmaz", "C011").await.unwrap_err(),
        EngineError::Validation(_)
    ));
    assert!(matches!(
        engine.update_student(999, "Nobody", "C099").await.unwrap_err(),
        EngineError::StudentNotFound(999)
    ));
}

#[tokio::test]
async fn test_create_course_validates_input() {
    let engine = setup().await;
    let teacher = engine.create_teacher("Mehmet Demir", None).await.unwrap();

    let base = NewCourse {
        teacher_id: teacher.id,
        code: "MATH1".to_string(),
        name: "Calculus".to_string(),
        capacity: 10,
        price: 500,
        min_demand: 3,
    };

    for bad in [
        NewCourse { capacity: 0, ..base.clone() },
        NewCourse { price: -1, ..base.clone() },
        NewCourse { min_demand: -1, ..base.clone() },
        NewCourse { code: String::new(), ..base.clone() },
    ] {
        assert!(matches!(
            engine.create_course(&bad).await.unwrap_err(),
            EngineError::Validation(_)
        ));
    }
    assert!(matches!(
        engine
            .create_course(&NewCourse { teacher_id: 77, ..base.clone() })
            .await
            .unwrap_err(),
        EngineError::TeacherNotFound(77)
    ));

    let course = engine.create_course(&base).await.unwrap();
    assert_eq!(course.state, CourseState::Draft);
    assert_eq!(course.confirmed_count, 0);
    assert_eq!(course.waitlist_len, 0);

    assert!(matches!(
        engine.create_course(&base).await.unwrap_err(),
        EngineError::Validation(_)
    ));
}

#[tokio::test]
async fn test_course_lifecycle_transitions() {
    let engine = setup().await;
    let course = draft_course(&engine, "LIFE1", 5, 100).await;

    let err = engine
        .set_course_state(course.id, CourseState::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidTransition {
            from: CourseState::Draft,
            to: CourseState::Cancelled
        }
    ));

    let open = engine
        .set_course_state(course.id, CourseState::Open)
        .await
        .unwrap();
    assert_eq!(open.state, CourseState::Open);

    assert!(engine
        .set_course_state(course.id, CourseState::Draft)
        .await
        .is_err());

    engine
        .set_course_state(course.id, CourseState::Cancelled)
        .await
        .unwrap();
    let back = engine
        .set_course_state(course.id, CourseState::Draft)
        .await
        .unwrap();
    assert_eq!(back.state, CourseState::Draft);
    assert_eq!(
        engine.course(course.id).await.unwrap().course.state,
        CourseState::Draft
    );
}

#[tokio::test]
async fn test_demand_requests_only_for_draft_courses() {
    let engine = setup().await;
    let course = draft_course(&engine, "DEM1", 5, 100).await;
    let a = student(&engine, "D001").await;
    let b = student(&engine, "D002").await;

    engine.request_course(a.id, course.id).await.unwrap();
    let summary = engine.course(course.id).await.unwrap();
    assert_eq!(summary.demand, 1);
    assert!(!summary.min_demand_met);

    assert!(matches!(
        engine.request_course(a.id, course.id).await.unwrap_err(),
        EngineError::AlreadyRequested { .. }
    ));

    engine.request_course(b.id, course.id).await.unwrap();
    let summary = engine.course(course.id).await.unwrap();
    assert_eq!(summary.demand, 2);
    assert!(summary.min_demand_met);

    engine
        .set_course_state(course.id, CourseState::Open)
        .await
        .unwrap();
    let c = student(&engine, "D003").await;
    assert!(matches!(
        engine.request_course(c.id, course.id).await.unwrap_err(),
        EngineError::CourseNotDraft {
            state: CourseState::Open,
            ..
        }
    ));
}

#[tokio::test]
async fn test_list_courses_filters_by_state() {
    let engine = setup().await;
    let draft = draft_course(&engine, "LIST1", 5, 100).await;
    let open = open_course(&engine, "LIST2", 5, 100).await;

    let all = engine.list_courses(None).await.unwrap();
    assert_eq!(all.len(), 2);

    let open_only = engine.list_courses(Some(CourseState::Open)).await.unwrap();
    assert_eq!(open_only.len(), 1);
    assert_eq!(open_only[0].course.id, open.id);

    let drafts = engine.list_courses(Some(CourseState::Draft)).await.unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].course.id, draft.id);

    assert!(engine
        .list_courses(Some(CourseState::Cancelled))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_grades_only_on_confirmed_registrations() {
    let engine = setup().await;
    let course = open_course(&engine, "GRADE1", 1, 100).await;
    let a = funded_student(&engine, "G001", 100).await;
    let b = funded_student(&engine, "G002", 100).await;

    let confirmed = engine.enroll(a.id, course.id).await.unwrap();
    let waitlisted = engine.enroll(b.id, course.id).await.unwrap();
    assert_eq!(waitlisted.status, RegistrationStatus::Waitlisted);

    let graded = engine
        .set_grade(confirmed.registration_id, Some(87), Some("  Good work  "))
        .await
        .unwrap();
    assert_eq!(graded.grade, Some(87));
    assert_eq!(graded.grade_note.as_deref(), Some("Good work"));

    let roster = engine.roster(course.id).await.unwrap();
    assert_eq!(roster[0].grade, Some(87));

    let cleared = engine
        .set_grade(confirmed.registration_id, None, Some(""))
        .await
        .unwrap();
    assert_eq!(cleared.grade, None);
    assert_eq!(cleared.grade_note, None);

    assert!(matches!(
        engine
            .set_grade(confirmed.registration_id, Some(101), None)
            .await
            .unwrap_err(),
        EngineError::Validation(_)
    ));
    assert!(matches!(
        engine
            .set_grade(waitlisted.registration_id, Some(50), None)
            .await
            .unwrap_err(),
        EngineError::NotConfirmed(_)
    ));
    assert!(matches!(
        engine.set_grade(12_345, Some(50), None).await.unwrap_err(),
        EngineError::RegistrationNotFound(12_345)
    ));
}
