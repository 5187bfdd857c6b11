//! Course identifier resolution.
//!
//! A course reference is either the logical `id` (a UUID for everything
//! created by this service) or, for legacy documents that never received
//! one, the hex form of the physical object id. Lookups and writes try the
//! logical field first and fall back to the physical one; a reference that
//! does not parse as an object id simply has no second candidate.

use std::fmt;

use crate::ids::ObjectId;
use crate::models::{Course, CourseRecord};
use crate::store::{CourseMutation, Store, StoreResult, Visibility};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CourseKey {
    Logical(String),
    Physical(ObjectId),
}

impl CourseKey {
    /// Lookup candidates for `reference`, in the order they must be tried.
    pub fn candidates(reference: &str) -> Vec<CourseKey> {
        let mut keys = vec![CourseKey::Logical(reference.to_owned())];
        if let Ok(oid) = ObjectId::parse_str(reference) {
            keys.push(CourseKey::Physical(oid));
        }
        keys
    }

    pub fn matches(&self, record: &CourseRecord) -> bool {
        match self {
            CourseKey::Logical(id) => record.id.as_deref() == Some(id.as_str()),
            CourseKey::Physical(oid) => record.oid == *oid,
        }
    }
}

impl fmt::Display for CourseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CourseKey::Logical(id) => write!(f, "id={id}"),
            CourseKey::Physical(oid) => write!(f, "_id={oid}"),
        }
    }
}

/// A course found by reference, with the key that matched it. Follow-up
/// writes for the same request must reuse `key`.
#[derive(Debug, Clone)]
pub struct ResolvedCourse {
    pub key: CourseKey,
    pub course: Course,
}

/// Map a stored record to the caller-facing shape.
pub fn normalize(record: CourseRecord) -> Course {
    let id = display_id(&record);
    Course {
        id,
        catalog: record.catalog,
        is_active: record.is_active,
        enrollment_count: record.enrollment_count,
        rating: record.rating,
        review_count: record.review_count,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

pub fn display_id(record: &CourseRecord) -> String {
    match &record.id {
        Some(id) if !id.is_empty() => id.clone(),
        _ => record.oid.to_hex(),
    }
}

pub async fn resolve_course(
    store: &dyn Store,
    reference: &str,
    visibility: Visibility,
) -> StoreResult<Option<ResolvedCourse>> {
    for key in CourseKey::candidates(reference) {
        if let Some(record) = store.find_course(&key, visibility).await? {
            return Ok(Some(ResolvedCourse {
                key,
                course: normalize(record),
            }));
        }
    }
    Ok(None)
}

/// Apply `mutation` to the first candidate that matches a stored course.
/// Returns the key that matched, if any.
pub async fn mutate_course(
    store: &dyn Store,
    reference: &str,
    mutation: &CourseMutation,
) -> StoreResult<Option<CourseKey>> {
    for key in CourseKey::candidates(reference) {
        if store.mutate_course(&key, mutation).await? {
            return Ok(Some(key));
        }
    }
    Ok(None)
}

/// The textual form child documents use for this course: its display id
/// when the reference resolves, the reference verbatim otherwise.
pub async fn canonical_ref(store: &dyn Store, reference: &str) -> StoreResult<String> {
    Ok(resolve_course(store, reference, Visibility::Any)
        .await?
        .map(|r| r.course.id)
        .unwrap_or_else(|| reference.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CourseCatalog;
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn record(id: Option<&str>, active: bool) -> CourseRecord {
        let now = Utc::now();
        CourseRecord {
            oid: ObjectId::new(),
            id: id.map(str::to_owned),
            catalog: CourseCatalog {
                title: "Course".into(),
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

    #[test]
    fn uuid_reference_has_only_logical_candidate() {
        let keys = CourseKey::candidates("abc-123");
        assert_eq!(keys, vec![CourseKey::Logical("abc-123".into())]);
    }

    #[test]
    fn hex_reference_tries_logical_then_physical() {
        let hex = "65a1b2c3d4e5f60718293a4b";
        let keys = CourseKey::candidates(hex);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0], CourseKey::Logical(hex.into()));
        assert_eq!(keys[1], CourseKey::Physical(ObjectId::parse_str(hex).unwrap()));
    }

    #[test]
    fn normalize_prefers_logical_id_and_falls_back_to_hex() {
        let with_id = record(Some("abc-123"), true);
        assert_eq!(normalize(with_id).id, "abc-123");

        let legacy = record(None, true);
        let hex = legacy.oid.to_hex();
        assert_eq!(normalize(legacy).id, hex);

        let blank = record(Some(""), true);
        let hex = blank.oid.to_hex();
        assert_eq!(normalize(blank).id, hex);
    }

    #[tokio::test]
    async fn resolves_uuid_and_legacy_courses_alike() {
        let store = MemoryStore::new();
        let modern = record(Some("3f2b8c1e-0a4d-4c55-9d1e-7a0c2b9e4f11"), true);
        let legacy = record(None, true);
        let legacy_hex = legacy.oid.to_hex();
        store.insert_course(&modern).await.unwrap();
        store.insert_course(&legacy).await.unwrap();

        let a = resolve_course(&store, "3f2b8c1e-0a4d-4c55-9d1e-7a0c2b9e4f11", Visibility::ActiveOnly)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(a.key, CourseKey::Logical(_)));
        assert_eq!(a.course.id, "3f2b8c1e-0a4d-4c55-9d1e-7a0c2b9e4f11");

        let b = resolve_course(&store, &legacy_hex, Visibility::ActiveOnly)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(b.key, CourseKey::Physical(legacy.oid));
        assert_eq!(b.course.id, legacy_hex);
    }

    #[tokio::test]
    async fn unparseable_reference_is_a_clean_miss() {
        let store = MemoryStore::new();
        store.insert_course(&record(Some("abc-123"), true)).await.unwrap();
        let found = resolve_course(&store, "not-a-course", Visibility::Any).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn visibility_applies_to_both_paths() {
        let store = MemoryStore::new();
        let hidden = record(None, false);
        let hex = hidden.oid.to_hex();
        store.insert_course(&hidden).await.unwrap();

        assert!(resolve_course(&store, &hex, Visibility::ActiveOnly).await.unwrap().is_none());
        assert!(resolve_course(&store, &hex, Visibility::Any).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn mutation_reports_matching_key() {
        let store = MemoryStore::new();
        let legacy = record(None, true);
        let hex = legacy.oid.to_hex();
        store.insert_course(&legacy).await.unwrap();

        let key = mutate_course(&store, &hex, &CourseMutation::SetActive(false))
            .await
            .unwrap();
        assert_eq!(key, Some(CourseKey::Physical(legacy.oid)));

        let miss = mutate_course(&store, "nope", &CourseMutation::SetActive(false))
            .await
            .unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn canonical_ref_keeps_unknown_references_verbatim() {
        let store = MemoryStore::new();
        let legacy = record(None, false);
        let hex = legacy.oid.to_hex();
        store.insert_course(&legacy).await.unwrap();

        assert_eq!(canonical_ref(&store, &hex).await.unwrap(), hex);
        assert_eq!(canonical_ref(&store, "ghost").await.unwrap(), "ghost");
    }
}
