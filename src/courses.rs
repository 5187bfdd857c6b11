//! Catalog operations: public listing and detail views plus the admin-only
//! create, patch and soft delete.

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::ids::ObjectId;
use crate::models::{Course, CourseCatalog, CoursePatch, CourseQuery, CourseRecord, CourseStats, Review};
use crate::rating::{self, RatingSummary};
use crate::resolver;
use crate::store::{CourseMutation, Store, StoreError, Visibility};

const DETAIL_REVIEWS: i64 = 10;

#[derive(Serialize, Debug, Clone)]
pub struct CourseDetail {
    pub course: Course,
    pub reviews: Vec<Review>,
}

pub async fn list(store: &dyn Store, query: &CourseQuery) -> AppResult<Vec<Course>> {
    let records = store.list_courses(query).await?;
    Ok(records.into_iter().map(resolver::normalize).collect())
}

/// An active course with its newest reviews.
pub async fn get(store: &dyn Store, course_ref: &str) -> AppResult<CourseDetail> {
    let resolved = resolver::resolve_course(store, course_ref, Visibility::ActiveOnly)
        .await?
        .ok_or_else(|| AppError::not_found("Course not found"))?;
    let reviews = store
        .list_reviews(&resolved.course.id, Some(DETAIL_REVIEWS))
        .await?;
    Ok(CourseDetail {
        course: resolved.course,
        reviews,
    })
}

pub async fn create(store: &dyn Store, catalog: CourseCatalog) -> AppResult<Course> {
    if catalog.title.trim().is_empty() {
        return Err(AppError::invalid("Title is required"));
    }
    let now = Utc::now();
    let record = CourseRecord {
        oid: ObjectId::new(),
        id: Some(Uuid::new_v4().to_string()),
        catalog,
        is_active: true,
        enrollment_count: 0,
        rating: 0.0,
        review_count: 0,
        created_at: now,
        updated_at: now,
    };
    match store.insert_course(&record).await {
        Ok(()) => {}
        Err(StoreError::Duplicate(key)) => {
            return Err(AppError::Conflict(format!("course identifier clash on {key}")))
        }
        Err(e) => return Err(e.into()),
    }
    let course = resolver::normalize(record);
    info!(course_id = %course.id, title = %course.catalog.title, "course created");
    Ok(course)
}

/// Applies `patch` to a course regardless of its active flag and returns
/// the updated view.
pub async fn update(store: &dyn Store, course_ref: &str, patch: CoursePatch) -> AppResult<Course> {
    if matches!(&patch.title, Some(t) if t.trim().is_empty()) {
        return Err(AppError::invalid("Title cannot be empty"));
    }
    let mutation = CourseMutation::Patch {
        patch,
        at: Utc::now(),
    };
    let key = resolver::mutate_course(store, course_ref, &mutation)
        .await?
        .ok_or_else(|| AppError::not_found("Course not found"))?;
    let record = store
        .find_course(&key, Visibility::Any)
        .await?
        .ok_or_else(|| AppError::not_found("Course not found"))?;
    info!(%key, "course updated");
    Ok(resolver::normalize(record))
}

/// Soft delete: the course stays stored but drops out of every active view.
pub async fn deactivate(store: &dyn Store, course_ref: &str) -> AppResult<()> {
    let key = resolver::mutate_course(store, course_ref, &CourseMutation::SetActive(false))
        .await?
        .ok_or_else(|| AppError::not_found("Course not found"))?;
    info!(%key, "course deactivated");
    Ok(())
}

pub async fn stats(store: &dyn Store, course_ref: &str) -> AppResult<CourseStats> {
    let resolved = resolver::resolve_course(store, course_ref, Visibility::Any)
        .await?
        .ok_or_else(|| AppError::not_found("Course not found"))?;
    let enrollments = resolved.course.enrollment_count;
    let completions = store.count_completions(&resolved.course.id).await?;
    let completion_rate = if enrollments > 0 {
        completions as f64 / f64::from(enrollments) * 100.0
    } else {
        0.0
    };
    Ok(CourseStats {
        enrollments,
        completions,
        completion_rate,
    })
}

/// Live rating over the course's reviews, without touching the stored fields.
pub async fn rating(store: &dyn Store, course_ref: &str) -> AppResult<RatingSummary> {
    let course_id = resolver::canonical_ref(store, course_ref).await?;
    Ok(rating::compute(store, &course_id).await?)
}
