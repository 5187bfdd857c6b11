use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Enrollment, EnrollmentDetail, ProgressReq};
use crate::resolver;
use crate::store::{CourseMutation, ProgressUpdate, Store, StoreError, Visibility};

/// Enrolls `user_id` in an active course and bumps the course's enrollment
/// counter. The counter bump is best-effort and keyed by whichever identifier
/// resolved the course.
pub async fn enroll(store: &dyn Store, user_id: &str, course_ref: &str) -> AppResult<Enrollment> {
    let resolved = resolver::resolve_course(store, course_ref, Visibility::ActiveOnly)
        .await?
        .ok_or_else(|| AppError::not_found("Course not found"))?;
    let course_id = resolved.course.id;

    if store.find_enrollment(user_id, &course_id).await?.is_some() {
        return Err(AppError::Conflict("Already enrolled in this course".into()));
    }

    let now = Utc::now();
    let enrollment = Enrollment {
        id: Uuid::new_v4(),
        user_id: user_id.to_owned(),
        course_id: course_id.clone(),
        enrolled_at: now,
        progress: 0,
        completed_lessons: Vec::new(),
        last_accessed_at: now,
        completed_at: None,
        created_at: now,
        updated_at: now,
    };
    match store.insert_enrollment(&enrollment).await {
        Ok(()) => {}
        Err(StoreError::Duplicate(_)) => {
            return Err(AppError::Conflict("Already enrolled in this course".into()))
        }
        Err(e) => return Err(e.into()),
    }

    match store
        .mutate_course(&resolved.key, &CourseMutation::IncrementEnrollment)
        .await
    {
        Ok(true) => {}
        Ok(false) => warn!(key = %resolved.key, "enrollment counter update matched no course"),
        Err(e) => error!(key = %resolved.key, error = %e, "enrollment counter update failed"),
    }

    info!(user_id, course_id = %course_id, "user enrolled");
    Ok(enrollment)
}

/// Overwrites progress and completed lessons. Reaching 100 stamps
/// `completedAt` with the current time on every such call, not only the first.
pub async fn update_progress(
    store: &dyn Store,
    user_id: &str,
    course_ref: &str,
    req: ProgressReq,
) -> AppResult<()> {
    if !(0..=100).contains(&req.progress) {
        return Err(AppError::invalid("Progress must be between 0 and 100"));
    }
    let course_id = resolver::canonical_ref(store, course_ref).await?;

    let now = Utc::now();
    let update = ProgressUpdate {
        progress: req.progress,
        completed_lessons: req.completed_lessons,
        at: now,
        completed_at: (req.progress >= 100).then_some(now),
    };
    if !store.update_progress(user_id, &course_id, &update).await? {
        return Err(AppError::not_found("Enrollment not found"));
    }
    Ok(())
}

/// The caller's enrollments paired with their courses, most recently
/// accessed first. Enrollments whose course no longer resolves are skipped.
pub async fn list_for_user(store: &dyn Store, user_id: &str) -> AppResult<Vec<EnrollmentDetail>> {
    let enrollments = store.list_enrollments(user_id).await?;
    let mut out = Vec::with_capacity(enrollments.len());
    for enrollment in enrollments {
        match resolver::resolve_course(store, &enrollment.course_id, Visibility::Any).await? {
            Some(resolved) => out.push(EnrollmentDetail {
                enrollment,
                course: resolved.course,
            }),
            None => warn!(course_id = %enrollment.course_id, "enrolled course no longer exists"),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ObjectId;
    use crate::models::{CourseCatalog, CourseRecord};
    use crate::store::racing::RacingStore;
    use crate::store::MemoryStore;

    const USER: &str = "65a1b2c3d4e5f60718293a4b";

    fn course(id: Option<&str>, active: bool) -> CourseRecord {
        let now = Utc::now();
        CourseRecord {
            oid: ObjectId::new(),
            id: id.map(str::to_owned),
            catalog: CourseCatalog {
                title: "Biology".into(),
                ..Default::default()
            },
            is_active: active,
            enrollment_count: 0,
            rating: 0.0,
            review_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    async fn count(store: &MemoryStore, reference: &str) -> i32 {
        resolver::resolve_course(store, reference, Visibility::Any)
            .await
            .unwrap()
            .unwrap()
            .course
            .enrollment_count
    }

    #[tokio::test]
    async fn double_enroll_conflicts_and_counts_once() {
        let store = MemoryStore::new();
        store.insert_course(&course(Some("bio-101"), true)).await.unwrap();

        let e = enroll(&store, USER, "bio-101").await.unwrap();
        assert_eq!(e.progress, 0);
        assert_eq!(count(&store, "bio-101").await, 1);

        let err = enroll(&store, USER, "bio-101").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(count(&store, "bio-101").await, 1);
    }

    #[tokio::test]
    async fn insert_losing_the_race_is_a_conflict() {
        let store = RacingStore::hiding_enrollments();
        store
            .inner
            .insert_course(&course(Some("bio-101"), true))
            .await
            .unwrap();

        enroll(&store, USER, "bio-101").await.unwrap();
        let err = enroll(&store, USER, "bio-101").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(count(&store.inner, "bio-101").await, 1);
    }

    #[tokio::test]
    async fn legacy_course_counter_uses_physical_key() {
        let store = MemoryStore::new();
        let legacy = course(None, true);
        let hex = legacy.oid.to_hex();
        store.insert_course(&legacy).await.unwrap();

        let e = enroll(&store, USER, &hex).await.unwrap();
        assert_eq!(e.course_id, hex);
        assert_eq!(count(&store, &hex).await, 1);
    }

    #[tokio::test]
    async fn inactive_or_missing_course_is_not_found() {
        let store = MemoryStore::new();
        store.insert_course(&course(Some("old"), false)).await.unwrap();
        assert!(matches!(
            enroll(&store, USER, "old").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            enroll(&store, USER, "ghost").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn completion_is_stamped_at_full_progress() {
        let store = MemoryStore::new();
        store.insert_course(&course(Some("bio-101"), true)).await.unwrap();
        enroll(&store, USER, "bio-101").await.unwrap();

        let req = |progress| ProgressReq {
            progress,
            completed_lessons: vec!["l1".into()],
        };
        update_progress(&store, USER, "bio-101", req(40)).await.unwrap();
        let e = store.find_enrollment(USER, "bio-101").await.unwrap().unwrap();
        assert_eq!(e.progress, 40);
        assert!(e.completed_at.is_none());

        update_progress(&store, USER, "bio-101", req(100)).await.unwrap();
        let first = store
            .find_enrollment(USER, "bio-101")
            .await
            .unwrap()
            .unwrap()
            .completed_at
            .unwrap();

        update_progress(&store, USER, "bio-101", req(100)).await.unwrap();
        let second = store
            .find_enrollment(USER, "bio-101")
            .await
            .unwrap()
            .unwrap()
            .completed_at
            .unwrap();
        assert!(second >= first);
    }

    #[tokio::test]
    async fn progress_bounds_and_missing_enrollment() {
        let store = MemoryStore::new();
        store.insert_course(&course(Some("bio-101"), true)).await.unwrap();
        let req = ProgressReq {
            progress: 101,
            completed_lessons: Vec::new(),
        };
        assert!(matches!(
            update_progress(&store, USER, "bio-101", req).await,
            Err(AppError::InvalidInput(_))
        ));
        let req = ProgressReq {
            progress: 10,
            completed_lessons: Vec::new(),
        };
        assert!(matches!(
            update_progress(&store, USER, "bio-101", req).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn listing_pairs_courses_even_when_deactivated() {
        let store = MemoryStore::new();
        store.insert_course(&course(Some("bio-101"), true)).await.unwrap();
        enroll(&store, USER, "bio-101").await.unwrap();
        store
            .mutate_course(
                &resolver::CourseKey::Logical("bio-101".into()),
                &CourseMutation::SetActive(false),
            )
            .await
            .unwrap();

        let list = list_for_user(&store, USER).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].course.id, "bio-101");
        assert!(!list[0].course.is_active);
    }
}
