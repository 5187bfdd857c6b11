//! Review lifecycle: submit, update, delete and listing, each followed by a
//! rating recompute for the affected course.

use chrono::Utc;
use tracing::{info, warn};

use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::ids::ObjectId;
use crate::models::{Review, ReviewInput};
use crate::rating;
use crate::resolver;
use crate::store::{Store, StoreError, Visibility};

const COMMENT_MIN: usize = 10;
const COMMENT_MAX: usize = 1000;

/// Checks rating and comment bounds. Runs before any store access.
pub fn validate(input: &ReviewInput) -> AppResult<()> {
    if !(1..=5).contains(&input.rating) {
        return Err(AppError::invalid("Rating must be between 1 and 5"));
    }
    let len = input.comment.trim().chars().count();
    if !(COMMENT_MIN..=COMMENT_MAX).contains(&len) {
        return Err(AppError::invalid(format!(
            "Comment must be between {COMMENT_MIN} and {COMMENT_MAX} characters"
        )));
    }
    Ok(())
}

fn parse_review_id(raw: &str) -> AppResult<ObjectId> {
    ObjectId::parse_str(raw).map_err(|_| AppError::invalid("Invalid review ID"))
}

fn author_id(user: &AuthUser) -> AppResult<ObjectId> {
    ObjectId::parse_str(user.user_id()).map_err(|_| AppError::invalid("Invalid user ID"))
}

/// Creates or overwrites the caller's review of `course_ref`. The caller must
/// be enrolled in the course; a second submission for the same course
/// replaces the first in place.
pub async fn submit(
    store: &dyn Store,
    user: &AuthUser,
    course_ref: &str,
    input: ReviewInput,
) -> AppResult<Review> {
    validate(&input)?;
    let author = author_id(user)?;

    let resolved = resolver::resolve_course(store, course_ref, Visibility::ActiveOnly)
        .await?
        .ok_or_else(|| AppError::not_found("Course not found"))?;
    let course_id = resolved.course.id;

    if store
        .find_enrollment(user.user_id(), &course_id)
        .await?
        .is_none()
    {
        return Err(AppError::forbidden("Must be enrolled to review"));
    }

    let comment = input.comment.trim();
    let review = match store.find_review_by_author(author, &course_id).await? {
        Some(existing) => overwrite(store, existing.id, input.rating, comment).await?,
        None => {
            let now = Utc::now();
            let review = Review {
                id: ObjectId::new(),
                course_id: course_id.clone(),
                user_id: author,
                user_name: user.display_name().to_owned(),
                rating: input.rating,
                comment: comment.to_owned(),
                created_at: now,
                updated_at: now,
            };
            match store.insert_review(&review).await {
                Ok(()) => review,
                // lost a race with a concurrent first submission
                Err(StoreError::Duplicate(_)) => {
                    let existing = store
                        .find_review_by_author(author, &course_id)
                        .await?
                        .ok_or_else(|| AppError::Internal("review vanished after conflict".into()))?;
                    overwrite(store, existing.id, input.rating, comment).await?
                }
                Err(e) => return Err(e.into()),
            }
        }
    };

    info!(review_id = %review.id, course_id = %course_id, rating = review.rating, "review saved");
    rating::refresh(store, &course_id).await;
    Ok(review)
}

async fn overwrite(store: &dyn Store, id: ObjectId, rating: i32, comment: &str) -> AppResult<Review> {
    store
        .update_review(id, rating, comment, Utc::now())
        .await?
        .ok_or_else(|| AppError::not_found("Review not found"))
}

/// Author-only edit of an existing review.
pub async fn update(
    store: &dyn Store,
    user: &AuthUser,
    review_id: &str,
    input: ReviewInput,
) -> AppResult<Review> {
    validate(&input)?;
    let id = parse_review_id(review_id)?;
    let existing = store
        .find_review(id)
        .await?
        .ok_or_else(|| AppError::not_found("Review not found"))?;
    if existing.user_id.to_hex() != user.user_id() {
        return Err(AppError::forbidden("You can only update your own reviews"));
    }

    let review = overwrite(store, id, input.rating, input.comment.trim()).await?;
    rating::refresh(store, &review.course_id).await;
    Ok(review)
}

/// Removes a review. Allowed for its author and for administrators.
pub async fn delete(store: &dyn Store, user: &AuthUser, review_id: &str) -> AppResult<()> {
    let id = parse_review_id(review_id)?;
    let existing = store
        .find_review(id)
        .await?
        .ok_or_else(|| AppError::not_found("Review not found"))?;
    let is_author = existing.user_id.to_hex() == user.user_id();
    if !is_author && !user.is_admin() {
        return Err(AppError::forbidden("You can only delete your own reviews"));
    }

    if !store.delete_review(id).await? {
        warn!(review_id = %id, "review disappeared before delete");
        return Err(AppError::not_found("Review not found"));
    }
    info!(review_id = %id, course_id = %existing.course_id, by_admin = !is_author, "review deleted");
    rating::refresh(store, &existing.course_id).await;
    Ok(())
}

pub async fn get(store: &dyn Store, review_id: &str) -> AppResult<Review> {
    let id = parse_review_id(review_id)?;
    store
        .find_review(id)
        .await?
        .ok_or_else(|| AppError::not_found("Review not found"))
}

/// All reviews for a course, newest first. Empty when there are none.
pub async fn list_by_course(store: &dyn Store, course_ref: &str) -> AppResult<Vec<Review>> {
    let course_id = resolver::canonical_ref(store, course_ref).await?;
    Ok(store.list_reviews(&course_id, None).await?)
}
