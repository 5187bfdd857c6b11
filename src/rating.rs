//! Course rating aggregation.
//!
//! `rating` and `reviewCount` on a course are derived from its reviews and
//! rewritten after every review mutation. The write-back is read-then-write
//! and not atomic with the mutation that triggered it, so under concurrent
//! reviews of one course the last recompute wins.

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::resolver;
use crate::store::{CourseMutation, Store, StoreResult};

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub average_rating: f64,
    pub total_reviews: i32,
}

impl RatingSummary {
    pub const EMPTY: RatingSummary = RatingSummary {
        average_rating: 0.0,
        total_reviews: 0,
    };
}

pub fn summarize(ratings: &[i32]) -> RatingSummary {
    if ratings.is_empty() {
        return RatingSummary::EMPTY;
    }
    let total: i64 = ratings.iter().map(|&r| i64::from(r)).sum();
    RatingSummary {
        average_rating: total as f64 / ratings.len() as f64,
        total_reviews: ratings.len() as i32,
    }
}

/// Live aggregate over reviews whose course reference equals `course_ref`
/// exactly. Nothing is written.
pub async fn compute(store: &dyn Store, course_ref: &str) -> StoreResult<RatingSummary> {
    let ratings = store.review_ratings(course_ref).await?;
    Ok(summarize(&ratings))
}

/// Aggregate and write the result onto the course. A reference that matches
/// no course under either identifier scheme leaves nothing to update; that
/// case is logged and the summary still returned.
pub async fn recompute(store: &dyn Store, course_ref: &str) -> StoreResult<RatingSummary> {
    let summary = compute(store, course_ref).await?;
    let mutation = CourseMutation::SetRating {
        rating: summary.average_rating,
        review_count: summary.total_reviews,
    };
    match resolver::mutate_course(store, course_ref, &mutation).await? {
        Some(key) => debug!(
            course_ref,
            %key,
            rating = summary.average_rating,
            reviews = summary.total_reviews,
            "course rating updated"
        ),
        None => warn!(
            course_ref,
            rating = summary.average_rating,
            reviews = summary.total_reviews,
            "rating write-back matched no course, result dropped"
        ),
    }
    Ok(summary)
}

/// Fire-and-forget form used after review mutations: failures are logged
/// and never reach the caller.
pub async fn refresh(store: &dyn Store, course_ref: &str) {
    if let Err(e) = recompute(store, course_ref).await {
        error!(course_ref, error = %e, "course rating recompute failed");
    }
}
