use std::cmp::Ordering;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{CourseMutation, ProgressUpdate, Store, StoreError, StoreResult, Visibility};
use crate::ids::ObjectId;
use crate::models::{Admin, CourseQuery, CourseRecord, Enrollment, Review, SortField, User};
use crate::resolver::CourseKey;

#[derive(Default)]
struct Collections {
    courses: Vec<CourseRecord>,
    reviews: Vec<Review>,
    enrollments: Vec<Enrollment>,
    users: Vec<User>,
    admins: Vec<Admin>,
}

/// Process-local store with the same unique constraints as the Postgres
/// schema. Each call holds the lock for its whole body, so every operation
/// is atomic on its own and nothing more.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Collections> {
        // a poisoned lock only means another test thread panicked mid-call
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn compare(a: &CourseRecord, b: &CourseRecord, field: SortField) -> Ordering {
    match field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::Title => a.catalog.title.cmp(&b.catalog.title),
        SortField::Price => a.catalog.price.total_cmp(&b.catalog.price),
        SortField::Rating => a.rating.total_cmp(&b.rating),
        SortField::EnrollmentCount => a.enrollment_count.cmp(&b.enrollment_count),
        SortField::ReviewCount => a.review_count.cmp(&b.review_count),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn list_courses(&self, query: &CourseQuery) -> StoreResult<Vec<CourseRecord>> {
        let field = query.sort_field();
        let mut out: Vec<CourseRecord> = self
            .lock()
            .courses
            .iter()
            .filter(|c| c.is_active && query.matches(&c.catalog))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            let ord = compare(a, b, field);
            if query.descending() {
                ord.reverse()
            } else {
                ord
            }
        });
        Ok(out)
    }

    async fn find_course(
        &self,
        key: &CourseKey,
        visibility: Visibility,
    ) -> StoreResult<Option<CourseRecord>> {
        Ok(self
            .lock()
            .courses
            .iter()
            .find(|c| key.matches(c) && visibility.admits(c.is_active))
            .cloned())
    }

    async fn insert_course(&self, course: &CourseRecord) -> StoreResult<()> {
        let mut db = self.lock();
        let clash = db.courses.iter().any(|c| {
            c.oid == course.oid || (course.id.is_some() && c.id == course.id)
        });
        if clash {
            return Err(StoreError::Duplicate("courses".into()));
        }
        db.courses.push(course.clone());
        Ok(())
    }

    async fn mutate_course(&self, key: &CourseKey, mutation: &CourseMutation) -> StoreResult<bool> {
        let mut db = self.lock();
        let Some(course) = db.courses.iter_mut().find(|c| key.matches(c)) else {
            return Ok(false);
        };
        match mutation {
            CourseMutation::Patch { patch, at } => {
                patch.clone().apply(&mut course.catalog);
                course.updated_at = *at;
            }
            CourseMutation::SetActive(active) => {
                course.is_active = *active;
                course.updated_at = Utc::now();
            }
            CourseMutation::SetRating {
                rating,
                review_count,
            } => {
                course.rating = *rating;
                course.review_count = *review_count;
                course.updated_at = Utc::now();
            }
            CourseMutation::IncrementEnrollment => course.enrollment_count += 1,
        }
        Ok(true)
    }

    async fn find_review(&self, id: ObjectId) -> StoreResult<Option<Review>> {
        Ok(self.lock().reviews.iter().find(|r| r.id == id).cloned())
    }

    async fn find_review_by_author(
        &self,
        user_id: ObjectId,
        course_ref: &str,
    ) -> StoreResult<Option<Review>> {
        Ok(self
            .lock()
            .reviews
            .iter()
            .find(|r| r.user_id == user_id && r.course_id == course_ref)
            .cloned())
    }

    async fn insert_review(&self, review: &Review) -> StoreResult<()> {
        let mut db = self.lock();
        if db
            .reviews
            .iter()
            .any(|r| r.user_id == review.user_id && r.course_id == review.course_id)
        {
            return Err(StoreError::Duplicate("reviews_user_course".into()));
        }
        db.reviews.push(review.clone());
        Ok(())
    }

    async fn update_review(
        &self,
        id: ObjectId,
        rating: i32,
        comment: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Review>> {
        let mut db = self.lock();
        Ok(db.reviews.iter_mut().find(|r| r.id == id).map(|r| {
            r.rating = rating;
            r.comment = comment.to_owned();
            r.updated_at = at;
            r.clone()
        }))
    }

    async fn delete_review(&self, id: ObjectId) -> StoreResult<bool> {
        let mut db = self.lock();
        let before = db.reviews.len();
        db.reviews.retain(|r| r.id != id);
        Ok(db.reviews.len() != before)
    }

    async fn list_reviews(&self, course_ref: &str, limit: Option<i64>) -> StoreResult<Vec<Review>> {
        let mut out: Vec<Review> = self
            .lock()
            .reviews
            .iter()
            .filter(|r| r.course_id == course_ref)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(n) = limit {
            out.truncate(n.max(0) as usize);
        }
        Ok(out)
    }

    async fn review_ratings(&self, course_ref: &str) -> StoreResult<Vec<i32>> {
        Ok(self
            .lock()
            .reviews
            .iter()
            .filter(|r| r.course_id == course_ref)
            .map(|r| r.rating)
            .collect())
    }

    async fn find_enrollment(
        &self,
        user_id: &str,
        course_ref: &str,
    ) -> StoreResult<Option<Enrollment>> {
        Ok(self
            .lock()
            .enrollments
            .iter()
            .find(|e| e.user_id == user_id && e.course_id == course_ref)
            .cloned())
    }

    async fn insert_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()> {
        let mut db = self.lock();
        if db
            .enrollments
            .iter()
            .any(|e| e.user_id == enrollment.user_id && e.course_id == enrollment.course_id)
        {
            return Err(StoreError::Duplicate("enrollments_user_course".into()));
        }
        db.enrollments.push(enrollment.clone());
        Ok(())
    }

    async fn update_progress(
        &self,
        user_id: &str,
        course_ref: &str,
        update: &ProgressUpdate,
    ) -> StoreResult<bool> {
        let mut db = self.lock();
        let Some(e) = db
            .enrollments
            .iter_mut()
            .find(|e| e.user_id == user_id && e.course_id == course_ref)
        else {
            return Ok(false);
        };
        e.progress = update.progress;
        e.completed_lessons = update.completed_lessons.clone();
        e.last_accessed_at = update.at;
        e.updated_at = update.at;
        if update.completed_at.is_some() {
            e.completed_at = update.completed_at;
        }
        Ok(true)
    }

    async fn list_enrollments(&self, user_id: &str) -> StoreResult<Vec<Enrollment>> {
        let mut out: Vec<Enrollment> = self
            .lock()
            .enrollments
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.last_accessed_at.cmp(&a.last_accessed_at));
        Ok(out)
    }

    async fn count_completions(&self, course_ref: &str) -> StoreResult<i64> {
        Ok(self
            .lock()
            .enrollments
            .iter()
            .filter(|e| e.course_id == course_ref && e.completed_at.is_some())
            .count() as i64)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut db = self.lock();
        if db.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate("users_email".into()));
        }
        db.users.push(user.clone());
        Ok(())
    }

    async fn find_admin_by_email(&self, email: &str) -> StoreResult<Option<Admin>> {
        Ok(self.lock().admins.iter().find(|a| a.email == email).cloned())
    }

    async fn insert_admin(&self, admin: &Admin) -> StoreResult<()> {
        let mut db = self.lock();
        if db.admins.iter().any(|a| a.email == admin.email) {
            return Err(StoreError::Duplicate("admins_email".into()));
        }
        db.admins.push(admin.clone());
        Ok(())
    }
}
