//! Test store that replays the check-then-insert race: lookups that guard an
//! insert report nothing, as if a concurrent writer had not committed yet,
//! while the unique constraints underneath still hold.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{CourseMutation, MemoryStore, ProgressUpdate, Store, StoreResult, Visibility};
use crate::ids::ObjectId;
use crate::models::{Admin, CourseQuery, CourseRecord, Enrollment, Review, User};
use crate::resolver::CourseKey;

#[derive(Default)]
pub struct RacingStore {
    pub inner: MemoryStore,
    /// Number of `find_review_by_author` calls that report a miss.
    stale_review_lookups: AtomicUsize,
    /// Every `find_enrollment` call reports a miss.
    hide_enrollments: bool,
}

impl RacingStore {
    pub fn stale_review_lookups(n: usize) -> Self {
        Self {
            stale_review_lookups: AtomicUsize::new(n),
            ..Self::default()
        }
    }

    pub fn hiding_enrollments() -> Self {
        Self {
            hide_enrollments: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl Store for RacingStore {
    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }

    async fn list_courses(&self, query: &CourseQuery) -> StoreResult<Vec<CourseRecord>> {
        self.inner.list_courses(query).await
    }

    async fn find_course(
        &self,
        key: &CourseKey,
        visibility: Visibility,
    ) -> StoreResult<Option<CourseRecord>> {
        self.inner.find_course(key, visibility).await
    }

    async fn insert_course(&self, course: &CourseRecord) -> StoreResult<()> {
        self.inner.insert_course(course).await
    }

    async fn mutate_course(&self, key: &CourseKey, mutation: &CourseMutation) -> StoreResult<bool> {
        self.inner.mutate_course(key, mutation).await
    }

    async fn find_review(&self, id: ObjectId) -> StoreResult<Option<Review>> {
        self.inner.find_review(id).await
    }

    async fn find_review_by_author(
        &self,
        user_id: ObjectId,
        course_ref: &str,
    ) -> StoreResult<Option<Review>> {
        let stale = self
            .stale_review_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(None);
        }
        self.inner.find_review_by_author(user_id, course_ref).await
    }

    async fn insert_review(&self, review: &Review) -> StoreResult<()> {
        self.inner.insert_review(review).await
    }

    async fn update_review(
        &self,
        id: ObjectId,
        rating: i32,
        comment: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Review>> {
        self.inner.update_review(id, rating, comment, at).await
    }

    async fn delete_review(&self, id: ObjectId) -> StoreResult<bool> {
        self.inner.delete_review(id).await
    }

    async fn list_reviews(&self, course_ref: &str, limit: Option<i64>) -> StoreResult<Vec<Review>> {
        self.inner.list_reviews(course_ref, limit).await
    }

    async fn review_ratings(&self, course_ref: &str) -> StoreResult<Vec<i32>> {
        self.inner.review_ratings(course_ref).await
    }

    async fn find_enrollment(
        &self,
        user_id: &str,
        course_ref: &str,
    ) -> StoreResult<Option<Enrollment>> {
        if self.hide_enrollments {
            return Ok(None);
        }
        self.inner.find_enrollment(user_id, course_ref).await
    }

    async fn insert_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()> {
        self.inner.insert_enrollment(enrollment).await
    }

    async fn update_progress(
        &self,
        user_id: &str,
        course_ref: &str,
        update: &ProgressUpdate,
    ) -> StoreResult<bool> {
        self.inner.update_progress(user_id, course_ref, update).await
    }

    async fn list_enrollments(&self, user_id: &str) -> StoreResult<Vec<Enrollment>> {
        self.inner.list_enrollments(user_id).await
    }

    async fn count_completions(&self, course_ref: &str) -> StoreResult<i64> {
        self.inner.count_completions(course_ref).await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.inner.find_user_by_email(email).await
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.inner.insert_user(user).await
    }

    async fn find_admin_by_email(&self, email: &str) -> StoreResult<Option<Admin>> {
        self.inner.find_admin_by_email(email).await
    }

    async fn insert_admin(&self, admin: &Admin) -> StoreResult<()> {
        self.inner.insert_admin(admin).await
    }
}
