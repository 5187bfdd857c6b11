use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, Postgres, QueryBuilder};

use super::{CourseMutation, ProgressUpdate, Store, StoreError, StoreResult, Visibility};
use crate::db::Db;
use crate::ids::ObjectId;
use crate::models::{
    Admin, CourseCatalog, CourseQuery, CourseRecord, Enrollment, Review, SortField, User,
};
use crate::resolver::CourseKey;

const COURSE_COLUMNS: &str =
    "oid, id, catalog, is_active, enrollment_count, rating, review_count, created_at, updated_at";
const REVIEW_COLUMNS: &str =
    "oid, course_id, user_id, user_name, rating, comment, created_at, updated_at";
const ENROLLMENT_COLUMNS: &str = "id, user_id, course_id, enrolled_at, progress, completed_lessons, \
     last_accessed_at, completed_at, created_at, updated_at";

/// Postgres-backed store. Every statement runs under `timeout`; expiry is
/// reported as [`StoreError::Timeout`] and never retried here.
#[derive(Clone)]
pub struct PgStore {
    pool: Db,
    timeout: Duration,
}

impl PgStore {
    pub fn new(pool: Db, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn bounded<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res.map_err(map_sqlx),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }
}

fn map_sqlx(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            StoreError::Duplicate(db.constraint().unwrap_or("unique").to_owned())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(e.to_string())
        }
        other => StoreError::Database(other),
    }
}

fn parse_oid(s: &str) -> StoreResult<ObjectId> {
    ObjectId::parse_str(s).map_err(|_| StoreError::Corrupt(format!("bad object id {s:?}")))
}

fn key_filter(key: &CourseKey) -> (&'static str, String) {
    match key {
        CourseKey::Logical(id) => ("id", id.clone()),
        CourseKey::Physical(oid) => ("oid", oid.to_hex()),
    }
}

fn sort_column(field: SortField) -> &'static str {
    match field {
        SortField::CreatedAt => "created_at",
        SortField::Title => "catalog->>'title'",
        SortField::Price => "(catalog->>'price')::float8",
        SortField::Rating => "rating",
        SortField::EnrollmentCount => "enrollment_count",
        SortField::ReviewCount => "review_count",
    }
}

#[derive(FromRow)]
struct CourseRow {
    oid: String,
    id: Option<String>,
    catalog: Json<CourseCatalog>,
    is_active: bool,
    enrollment_count: i32,
    rating: f64,
    review_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CourseRow> for CourseRecord {
    type Error = StoreError;

    fn try_from(r: CourseRow) -> StoreResult<Self> {
        Ok(CourseRecord {
            oid: parse_oid(&r.oid)?,
            id: r.id,
            catalog: r.catalog.0,
            is_active: r.is_active,
            enrollment_count: r.enrollment_count,
            rating: r.rating,
            review_count: r.review_count,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ReviewRow {
    oid: String,
    course_id: String,
    user_id: String,
    user_name: String,
    rating: i32,
    comment: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = StoreError;

    fn try_from(r: ReviewRow) -> StoreResult<Self> {
        Ok(Review {
            id: parse_oid(&r.oid)?,
            course_id: r.course_id,
            user_id: parse_oid(&r.user_id)?,
            user_name: r.user_name,
            rating: r.rating,
            comment: r.comment,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(FromRow)]
struct UserRow {
    oid: String,
    name: String,
    email: String,
    password_hash: String,
    verified: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct AdminRow {
    oid: String,
    email: String,
    password_hash: String,
    name: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        self.bounded(sqlx::query("SELECT 1").execute(&self.pool))
            .await
            .map(|_| ())
    }

    async fn list_courses(&self, query: &CourseQuery) -> StoreResult<Vec<CourseRecord>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE is_active"
        ));
        let filters = [
            ("type", &query.course_type),
            ("classLevel", &query.class_level),
            ("subject", &query.subject),
            ("status", &query.status),
            ("category", &query.category),
        ];
        for (field, value) in filters {
            if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
                qb.push(" AND catalog->>'")
                    .push(field)
                    .push("' = ")
                    .push_bind(v.to_owned());
            }
        }
        if query.featured_only() {
            qb.push(" AND (catalog->>'isFeatured')::boolean IS TRUE");
        }
        qb.push(" ORDER BY ")
            .push(sort_column(query.sort_field()))
            .push(if query.descending() { " DESC" } else { " ASC" });

        let rows: Vec<CourseRow> = self
            .bounded(qb.build_query_as().fetch_all(&self.pool))
            .await?;
        rows.into_iter().map(CourseRecord::try_from).collect()
    }

    async fn find_course(
        &self,
        key: &CourseKey,
        visibility: Visibility,
    ) -> StoreResult<Option<CourseRecord>> {
        let (column, value) = key_filter(key);
        let active_only = visibility == Visibility::ActiveOnly;
        let sql = format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE {column} = $1 AND (is_active OR NOT $2)"
        );
        let row: Option<CourseRow> = self
            .bounded(
                sqlx::query_as(&sql)
                    .bind(value)
                    .bind(active_only)
                    .fetch_optional(&self.pool),
            )
            .await?;
        row.map(CourseRecord::try_from).transpose()
    }

    async fn insert_course(&self, course: &CourseRecord) -> StoreResult<()> {
        self.bounded(
            sqlx::query(
                r#"
                INSERT INTO courses (oid, id, catalog, is_active, enrollment_count, rating,
                                     review_count, created_at, updated_at)
                VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
                "#,
            )
            .bind(course.oid.to_hex())
            .bind(&course.id)
            .bind(Json(&course.catalog))
            .bind(course.is_active)
            .bind(course.enrollment_count)
            .bind(course.rating)
            .bind(course.review_count)
            .bind(course.created_at)
            .bind(course.updated_at)
            .execute(&self.pool),
        )
        .await
        .map(|_| ())
    }

    async fn mutate_course(&self, key: &CourseKey, mutation: &CourseMutation) -> StoreResult<bool> {
        let (column, value) = key_filter(key);
        let res = match mutation {
            CourseMutation::Patch { patch, at } => {
                // jsonb || merges top-level keys, so absent patch fields stay untouched
                let sql = format!(
                    "UPDATE courses SET catalog = catalog || $1, updated_at = $2 WHERE {column} = $3"
                );
                self.bounded(
                    sqlx::query(&sql)
                        .bind(Json(patch))
                        .bind(*at)
                        .bind(value)
                        .execute(&self.pool),
                )
                .await?
            }
            CourseMutation::SetActive(active) => {
                let sql = format!(
                    "UPDATE courses SET is_active = $1, updated_at = now() WHERE {column} = $2"
                );
                self.bounded(
                    sqlx::query(&sql)
                        .bind(*active)
                        .bind(value)
                        .execute(&self.pool),
                )
                .await?
            }
            CourseMutation::SetRating {
                rating,
                review_count,
            } => {
                let sql = format!(
                    "UPDATE courses SET rating = $1, review_count = $2, updated_at = now() \
                     WHERE {column} = $3"
                );
                self.bounded(
                    sqlx::query(&sql)
                        .bind(*rating)
                        .bind(*review_count)
                        .bind(value)
                        .execute(&self.pool),
                )
                .await?
            }
            CourseMutation::IncrementEnrollment => {
                let sql = format!(
                    "UPDATE courses SET enrollment_count = enrollment_count + 1 WHERE {column} = $1"
                );
                self.bounded(sqlx::query(&sql).bind(value).execute(&self.pool))
                    .await?
            }
        };
        Ok(res.rows_affected() > 0)
    }

    async fn find_review(&self, id: ObjectId) -> StoreResult<Option<Review>> {
        let sql = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE oid = $1");
        let row: Option<ReviewRow> = self
            .bounded(
                sqlx::query_as(&sql)
                    .bind(id.to_hex())
                    .fetch_optional(&self.pool),
            )
            .await?;
        row.map(Review::try_from).transpose()
    }

    async fn find_review_by_author(
        &self,
        user_id: ObjectId,
        course_ref: &str,
    ) -> StoreResult<Option<Review>> {
        let sql =
            format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE user_id = $1 AND course_id = $2");
        let row: Option<ReviewRow> = self
            .bounded(
                sqlx::query_as(&sql)
                    .bind(user_id.to_hex())
                    .bind(course_ref)
                    .fetch_optional(&self.pool),
            )
            .await?;
        row.map(Review::try_from).transpose()
    }

    async fn insert_review(&self, review: &Review) -> StoreResult<()> {
        self.bounded(
            sqlx::query(
                r#"
                INSERT INTO reviews (oid, course_id, user_id, user_name, rating, comment,
                                     created_at, updated_at)
                VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
                "#,
            )
            .bind(review.id.to_hex())
            .bind(&review.course_id)
            .bind(review.user_id.to_hex())
            .bind(&review.user_name)
            .bind(review.rating)
            .bind(&review.comment)
            .bind(review.created_at)
            .bind(review.updated_at)
            .execute(&self.pool),
        )
        .await
        .map(|_| ())
    }

    async fn update_review(
        &self,
        id: ObjectId,
        rating: i32,
        comment: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Review>> {
        let sql = format!(
            "UPDATE reviews SET rating = $1, comment = $2, updated_at = $3 WHERE oid = $4 \
             RETURNING {REVIEW_COLUMNS}"
        );
        let row: Option<ReviewRow> = self
            .bounded(
                sqlx::query_as(&sql)
                    .bind(rating)
                    .bind(comment)
                    .bind(at)
                    .bind(id.to_hex())
                    .fetch_optional(&self.pool),
            )
            .await?;
        row.map(Review::try_from).transpose()
    }

    async fn delete_review(&self, id: ObjectId) -> StoreResult<bool> {
        let res = self
            .bounded(
                sqlx::query("DELETE FROM reviews WHERE oid = $1")
                    .bind(id.to_hex())
                    .execute(&self.pool),
            )
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_reviews(&self, course_ref: &str, limit: Option<i64>) -> StoreResult<Vec<Review>> {
        let sql = format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE course_id = $1 \
             ORDER BY created_at DESC LIMIT $2"
        );
        // LIMIT NULL means no limit in Postgres
        let rows: Vec<ReviewRow> = self
            .bounded(
                sqlx::query_as(&sql)
                    .bind(course_ref)
                    .bind(limit)
                    .fetch_all(&self.pool),
            )
            .await?;
        rows.into_iter().map(Review::try_from).collect()
    }

    async fn review_ratings(&self, course_ref: &str) -> StoreResult<Vec<i32>> {
        self.bounded(
            sqlx::query_scalar("SELECT rating FROM reviews WHERE course_id = $1")
                .bind(course_ref)
                .fetch_all(&self.pool),
        )
        .await
    }

    async fn find_enrollment(
        &self,
        user_id: &str,
        course_ref: &str,
    ) -> StoreResult<Option<Enrollment>> {
        let sql = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE user_id = $1 AND course_id = $2"
        );
        self.bounded(
            sqlx::query_as(&sql)
                .bind(user_id)
                .bind(course_ref)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn insert_enrollment(&self, e: &Enrollment) -> StoreResult<()> {
        self.bounded(
            sqlx::query(
                r#"
                INSERT INTO enrollments (id, user_id, course_id, enrolled_at, progress,
                                         completed_lessons, last_accessed_at, completed_at,
                                         created_at, updated_at)
                VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
                "#,
            )
            .bind(e.id)
            .bind(&e.user_id)
            .bind(&e.course_id)
            .bind(e.enrolled_at)
            .bind(e.progress)
            .bind(&e.completed_lessons)
            .bind(e.last_accessed_at)
            .bind(e.completed_at)
            .bind(e.created_at)
            .bind(e.updated_at)
            .execute(&self.pool),
        )
        .await
        .map(|_| ())
    }

    async fn update_progress(
        &self,
        user_id: &str,
        course_ref: &str,
        update: &ProgressUpdate,
    ) -> StoreResult<bool> {
        let res = self
            .bounded(
                sqlx::query(
                    r#"
                    UPDATE enrollments
                    SET progress = $1,
                        completed_lessons = $2,
                        last_accessed_at = $3,
                        updated_at = $3,
                        completed_at = COALESCE($4, completed_at)
                    WHERE user_id = $5 AND course_id = $6
                    "#,
                )
                .bind(update.progress)
                .bind(&update.completed_lessons)
                .bind(update.at)
                .bind(update.completed_at)
                .bind(user_id)
                .bind(course_ref)
                .execute(&self.pool),
            )
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_enrollments(&self, user_id: &str) -> StoreResult<Vec<Enrollment>> {
        let sql = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE user_id = $1 \
             ORDER BY last_accessed_at DESC"
        );
        self.bounded(sqlx::query_as(&sql).bind(user_id).fetch_all(&self.pool))
            .await
    }

    async fn count_completions(&self, course_ref: &str) -> StoreResult<i64> {
        self.bounded(
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM enrollments WHERE course_id = $1 AND completed_at IS NOT NULL",
            )
            .bind(course_ref)
            .fetch_one(&self.pool),
        )
        .await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row: Option<UserRow> = self
            .bounded(
                sqlx::query_as(
                    "SELECT oid, name, email, password_hash, verified, created_at, updated_at \
                     FROM users WHERE email = $1",
                )
                .bind(email)
                .fetch_optional(&self.pool),
            )
            .await?;
        row.map(|r| {
            Ok(User {
                id: parse_oid(&r.oid)?,
                name: r.name,
                email: r.email,
                password_hash: r.password_hash,
                verified: r.verified,
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
        })
        .transpose()
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.bounded(
            sqlx::query(
                r#"
                INSERT INTO users (oid, name, email, password_hash, verified, created_at, updated_at)
                VALUES ($1,$2,$3,$4,$5,$6,$7)
                "#,
            )
            .bind(user.id.to_hex())
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.verified)
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&self.pool),
        )
        .await
        .map(|_| ())
    }

    async fn find_admin_by_email(&self, email: &str) -> StoreResult<Option<Admin>> {
        let row: Option<AdminRow> = self
            .bounded(
                sqlx::query_as(
                    "SELECT oid, email, password_hash, name, is_active, created_at \
                     FROM admins WHERE email = $1",
                )
                .bind(email)
                .fetch_optional(&self.pool),
            )
            .await?;
        row.map(|r| {
            Ok(Admin {
                id: parse_oid(&r.oid)?,
                email: r.email,
                password_hash: r.password_hash,
                name: r.name,
                is_active: r.is_active,
                created_at: r.created_at,
            })
        })
        .transpose()
    }

    async fn insert_admin(&self, admin: &Admin) -> StoreResult<()> {
        self.bounded(
            sqlx::query(
                "INSERT INTO admins (oid, email, password_hash, name, is_active, created_at) \
                 VALUES ($1,$2,$3,$4,$5,$6)",
            )
            .bind(admin.id.to_hex())
            .bind(&admin.email)
            .bind(&admin.password_hash)
            .bind(&admin.name)
            .bind(admin.is_active)
            .bind(admin.created_at)
            .execute(&self.pool),
        )
        .await
        .map(|_| ())
    }
}
