use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use uuid::Uuid;

use crate::ids::ObjectId;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tutor {
    pub name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub expertise: String,
    #[serde(default)]
    pub years_exp: i32,
    #[serde(default)]
    pub credentials: String,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumItem {
    pub week: Option<i32>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub duration: String,
    pub resources: Option<Vec<String>>,
}

/// Catalog fields shared by the stored record and the public course view.
#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourseCatalog {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub long_description: String,
    #[serde(rename = "type", default)]
    pub course_type: String,
    pub class_level: Option<String>,
    pub subject: Option<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub lesson_count: i32,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub learning_goals: Vec<String>,
    pub tutor: Option<Tutor>,
    #[serde(default)]
    pub curriculum: Vec<CurriculumItem>,
    #[serde(default)]
    pub certificate: bool,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub metadata: Option<serde_json::Value>,
}

/// A course as the store holds it. `oid` is the physical identifier and
/// `id` the optional logical one; legacy courses only have the former.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseRecord {
    pub oid: ObjectId,
    pub id: Option<String>,
    pub catalog: CourseCatalog,
    pub is_active: bool,
    pub enrollment_count: i32,
    pub rating: f64,
    pub review_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A course as callers see it: one `id`, no physical identifier.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    #[serde(flatten)]
    pub catalog: CourseCatalog,
    pub is_active: bool,
    pub enrollment_count: i32,
    pub rating: f64,
    pub review_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update of the catalog fields. Identifiers and derived counters
/// are not patchable.
#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoursePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub long_description: Option<String>,
    #[serde(rename = "type")]
    pub course_type: Option<String>,
    pub class_level: Option<String>,
    pub subject: Option<String>,
    pub subjects: Option<Vec<String>>,
    pub image_url: Option<String>,
    pub status: Option<String>,
    pub price: Option<f64>,
    pub lesson_count: Option<i32>,
    pub duration: Option<String>,
    pub level: Option<String>,
    pub is_featured: Option<bool>,
    pub features: Option<Vec<String>>,
    pub prerequisites: Option<Vec<String>>,
    pub learning_goals: Option<Vec<String>>,
    pub tutor: Option<Tutor>,
    pub curriculum: Option<Vec<CurriculumItem>>,
    pub certificate: Option<bool>,
    pub language: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<serde_json::Value>,
}

impl CoursePatch {
    pub fn apply(self, c: &mut CourseCatalog) {
        macro_rules! set {
            ($($f:ident),*) => { $( if let Some(v) = self.$f { c.$f = v; } )* };
        }
        set!(
            title, description, long_description, course_type, subjects, image_url, status,
            price, lesson_count, duration, level, is_featured, features, prerequisites,
            learning_goals, curriculum, certificate, language, category, tags
        );
        if self.class_level.is_some() {
            c.class_level = self.class_level;
        }
        if self.subject.is_some() {
            c.subject = self.subject;
        }
        if self.tutor.is_some() {
            c.tutor = self.tutor;
        }
        if self.metadata.is_some() {
            c.metadata = self.metadata;
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: ObjectId,
    pub course_id: String,
    pub user_id: ObjectId,
    pub user_name: String,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReviewInput {
    pub rating: i32,
    #[serde(default)]
    pub comment: String,
}

#[skip_serializing_none]
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: Uuid,
    pub user_id: String,
    pub course_id: String,
    pub enrolled_at: DateTime<Utc>,
    pub progress: i32,
    pub completed_lessons: Vec<String>,
    pub last_accessed_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReq {
    pub progress: i32,
    #[serde(default)]
    pub completed_lessons: Vec<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct EnrollmentDetail {
    pub enrollment: Enrollment,
    pub course: Course,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourseStats {
    pub enrollments: i32,
    pub completions: i64,
    pub completion_rate: f64,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: ObjectId,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Admin {
    pub id: ObjectId,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterReq {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginReq {
    pub email: String,
    pub password: String,
}

/// Filters and ordering for the public catalog listing.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CourseQuery {
    #[serde(rename = "type")]
    pub course_type: Option<String>,
    pub class_level: Option<String>,
    pub subject: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub featured: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    Title,
    Price,
    Rating,
    EnrollmentCount,
    ReviewCount,
}

impl CourseQuery {
    pub fn sort_field(&self) -> SortField {
        match self.sort_by.as_deref() {
            Some("title") => SortField::Title,
            Some("price") => SortField::Price,
            Some("rating") => SortField::Rating,
            Some("enrollmentCount") => SortField::EnrollmentCount,
            Some("reviewCount") => SortField::ReviewCount,
            _ => SortField::CreatedAt,
        }
    }

    pub fn descending(&self) -> bool {
        !matches!(self.order.as_deref(), Some("asc"))
    }

    pub fn featured_only(&self) -> bool {
        self.featured.as_deref() == Some("true")
    }

    pub fn matches(&self, c: &CourseCatalog) -> bool {
        let eq = |want: &Option<String>, have: Option<&str>| match want {
            Some(w) if !w.is_empty() => have == Some(w.as_str()),
            _ => true,
        };
        eq(&self.course_type, Some(&c.course_type))
            && eq(&self.class_level, c.class_level.as_deref())
            && eq(&self.subject, c.subject.as_deref())
            && eq(&self.status, Some(&c.status))
            && eq(&self.category, Some(&c.category))
            && (!self.featured_only() || c.is_featured)
    }
}
