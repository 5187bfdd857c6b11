//! Entity store boundary. Every collection the service touches goes through
//! [`Store`]; the Postgres implementation backs production and the in-memory
//! one backs tests and database-less local runs.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::ids::ObjectId;
use crate::models::{Admin, CoursePatch, CourseQuery, CourseRecord, Enrollment, Review, User};
use crate::resolver::CourseKey;

pub mod memory;
pub mod postgres;
#[cfg(test)]
pub mod racing;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    ActiveOnly,
    Any,
}

impl Visibility {
    pub fn admits(self, is_active: bool) -> bool {
        match self {
            Visibility::ActiveOnly => is_active,
            Visibility::Any => true,
        }
    }
}

/// Partial writes against a single course document.
#[derive(Debug, Clone, PartialEq)]
pub enum CourseMutation {
    Patch { patch: CoursePatch, at: DateTime<Utc> },
    SetActive(bool),
    SetRating { rating: f64, review_count: i32 },
    IncrementEnrollment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub progress: i32,
    pub completed_lessons: Vec<String>,
    pub at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    async fn list_courses(&self, query: &CourseQuery) -> StoreResult<Vec<CourseRecord>>;
    async fn find_course(
        &self,
        key: &CourseKey,
        visibility: Visibility,
    ) -> StoreResult<Option<CourseRecord>>;
    async fn insert_course(&self, course: &CourseRecord) -> StoreResult<()>;
    /// Returns whether a course matched `key`.
    async fn mutate_course(&self, key: &CourseKey, mutation: &CourseMutation) -> StoreResult<bool>;

    async fn find_review(&self, id: ObjectId) -> StoreResult<Option<Review>>;
    async fn find_review_by_author(
        &self,
        user_id: ObjectId,
        course_ref: &str,
    ) -> StoreResult<Option<Review>>;
    async fn insert_review(&self, review: &Review) -> StoreResult<()>;
    async fn update_review(
        &self,
        id: ObjectId,
        rating: i32,
        comment: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Review>>;
    async fn delete_review(&self, id: ObjectId) -> StoreResult<bool>;
    /// Newest first. `course_ref` is compared as plain text.
    async fn list_reviews(&self, course_ref: &str, limit: Option<i64>) -> StoreResult<Vec<Review>>;
    async fn review_ratings(&self, course_ref: &str) -> StoreResult<Vec<i32>>;

    async fn find_enrollment(
        &self,
        user_id: &str,
        course_ref: &str,
    ) -> StoreResult<Option<Enrollment>>;
    async fn insert_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()>;
    async fn update_progress(
        &self,
        user_id: &str,
        course_ref: &str,
        update: &ProgressUpdate,
    ) -> StoreResult<bool>;
    /// Most recently accessed first.
    async fn list_enrollments(&self, user_id: &str) -> StoreResult<Vec<Enrollment>>;
    async fn count_completions(&self, course_ref: &str) -> StoreResult<i64>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    async fn find_admin_by_email(&self, email: &str) -> StoreResult<Option<Admin>>;
    async fn insert_admin(&self, admin: &Admin) -> StoreResult<()>;
}
