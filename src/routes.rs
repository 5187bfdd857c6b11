use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use serde_json::{json, Value};

use crate::{
    accounts,
    auth::{AdminUser, AuthUser},
    courses, enrollments,
    error::{AppError, AppResult},
    models::*,
    reviews,
    state::AppState,
};

/// JSON request body whose rejection is reported as an [`AppError`].
type JsonBody<T> = WithRejection<Json<T>, AppError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // accounts
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/admin/login", post(admin_login))
        // public catalog
        .route("/courses", get(list_courses))
        .route("/courses/:id", get(get_course))
        .route("/courses/:id/stats", get(course_stats))
        .route("/courses/:id/reviews", get(list_reviews))
        .route("/courses/:id/rating", get(course_rating))
        .route(
            "/reviews/:review_id",
            get(get_review).put(update_review).delete(delete_review),
        )
        // signed-in users
        .route("/user/profile", get(profile))
        .route("/user/enroll/:course_id", post(enroll))
        .route("/user/enrollments", get(list_enrollments))
        .route("/user/courses/:course_id/progress", put(update_progress))
        .route("/user/courses/:course_id/review", post(submit_review))
        // admin
        .route("/admin/courses", post(create_course))
        .route("/admin/courses/:id", put(update_course).delete(delete_course))
        .fallback(not_found)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store = match state.store.ping().await {
        Ok(()) => "up",
        Err(e) => {
            tracing::warn!(error = %e, "store ping failed");
            "down"
        }
    };
    Json(json!({ "status": "healthy", "store": store, "time": Utc::now() }))
}

async fn not_found(OriginalUri(uri): OriginalUri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": "Route not found", "path": uri.path() })),
    )
}

async fn register(
    State(state): State<AppState>,
    WithRejection(Json(req), _): JsonBody<RegisterReq>,
) -> AppResult<impl IntoResponse> {
    let user = accounts::register(state.store.as_ref(), req).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Registration successful",
            "user": { "id": user.id, "name": user.name, "email": user.email },
        })),
    ))
}

async fn login(
    State(state): State<AppState>,
    WithRejection(Json(req), _): JsonBody<LoginReq>,
) -> AppResult<Json<Value>> {
    let token = accounts::login(state.store.as_ref(), &state.auth, req).await?;
    Ok(Json(json!({ "message": "Login successfully", "token": token })))
}

async fn admin_login(
    State(state): State<AppState>,
    WithRejection(Json(req), _): JsonBody<LoginReq>,
) -> AppResult<Json<accounts::AdminSession>> {
    Ok(Json(
        accounts::admin_login(state.store.as_ref(), &state.auth, req).await?,
    ))
}

async fn profile(user: AuthUser) -> Json<Value> {
    Json(json!({
        "userId": user.user_id(),
        "email": user.claims.email,
        "role": user.claims.role,
    }))
}

async fn list_courses(
    State(state): State<AppState>,
    WithRejection(Query(query), _): WithRejection<Query<CourseQuery>, AppError>,
) -> AppResult<Json<Value>> {
    let courses = courses::list(state.store.as_ref(), &query).await?;
    Ok(Json(json!({ "count": courses.len(), "courses": courses })))
}

async fn get_course(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<courses::CourseDetail>> {
    Ok(Json(courses::get(state.store.as_ref(), &id).await?))
}

async fn course_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<CourseStats>> {
    Ok(Json(courses::stats(state.store.as_ref(), &id).await?))
}

async fn course_rating(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Value>> {
    let summary = courses::rating(state.store.as_ref(), &id).await?;
    Ok(Json(json!({ "success": true, "data": summary })))
}

async fn list_reviews(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Value>> {
    let reviews = reviews::list_by_course(state.store.as_ref(), &id).await?;
    Ok(Json(json!({ "success": true, "count": reviews.len(), "data": reviews })))
}

async fn get_review(
    State(state): State<AppState>,
    Path(review_id): Path<String>,
) -> AppResult<Json<Value>> {
    let review = reviews::get(state.store.as_ref(), &review_id).await?;
    Ok(Json(json!({ "success": true, "data": review })))
}

async fn submit_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(course_id): Path<String>,
    WithRejection(Json(input), _): JsonBody<ReviewInput>,
) -> AppResult<impl IntoResponse> {
    let review = reviews::submit(state.store.as_ref(), &user, &course_id, input).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "message": "Review saved", "review": review })),
    ))
}

async fn update_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(review_id): Path<String>,
    WithRejection(Json(input), _): JsonBody<ReviewInput>,
) -> AppResult<Json<Value>> {
    let review = reviews::update(state.store.as_ref(), &user, &review_id, input).await?;
    Ok(Json(json!({ "success": true, "message": "Review updated", "review": review })))
}

async fn delete_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(review_id): Path<String>,
) -> AppResult<Json<Value>> {
    reviews::delete(state.store.as_ref(), &user, &review_id).await?;
    Ok(Json(json!({ "success": true, "message": "Review deleted" })))
}

async fn enroll(
    State(state): State<AppState>,
    user: AuthUser,
    Path(course_id): Path<String>,
) -> AppResult<Json<Value>> {
    let enrollment = enrollments::enroll(state.store.as_ref(), user.user_id(), &course_id).await?;
    Ok(Json(json!({ "message": "Successfully enrolled", "enrollment": enrollment })))
}

async fn list_enrollments(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<Value>> {
    let list = enrollments::list_for_user(state.store.as_ref(), user.user_id()).await?;
    Ok(Json(json!({ "count": list.len(), "enrollments": list })))
}

async fn update_progress(
    State(state): State<AppState>,
    user: AuthUser,
    Path(course_id): Path<String>,
    WithRejection(Json(req), _): JsonBody<ProgressReq>,
) -> AppResult<Json<Value>> {
    enrollments::update_progress(state.store.as_ref(), user.user_id(), &course_id, req).await?;
    Ok(Json(json!({ "message": "Progress updated successfully" })))
}

async fn create_course(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    WithRejection(Json(catalog), _): JsonBody<CourseCatalog>,
) -> AppResult<impl IntoResponse> {
    let course = courses::create(state.store.as_ref(), catalog).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Course created successfully", "course": course })),
    ))
}

async fn update_course(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
    WithRejection(Json(patch), _): JsonBody<CoursePatch>,
) -> AppResult<Json<Value>> {
    let course = courses::update(state.store.as_ref(), &id, patch).await?;
    Ok(Json(json!({ "message": "Course updated successfully", "course": course })))
}

async fn delete_course(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    courses::deactivate(state.store.as_ref(), &id).await?;
    Ok(Json(json!({ "message": "Course deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthConfig, Role};
    use crate::ids::ObjectId;
    use crate::store::MemoryStore;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        auth: Arc<AuthConfig>,
    }

    fn harness() -> Harness {
        let state = AppState::new(Arc::new(MemoryStore::new()), AuthConfig::new(b"test", 1));
        let auth = state.auth.clone();
        Harness {
            app: router(state),
            auth,
        }
    }

    impl Harness {
        fn token(&self, role: Role) -> String {
            self.auth
                .issue(&ObjectId::new().to_hex(), "t@example.com", Some("Tester"), role)
                .unwrap()
        }

        async fn call(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut req = Request::builder().method(method).uri(uri);
            if let Some(t) = token {
                req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
            }
            let req = match body {
                Some(v) => req
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(v.to_string()))
                    .unwrap(),
                None => req.body(Body::empty()).unwrap(),
            };
            let res = self.app.clone().oneshot(req).await.unwrap();
            let status = res.status();
            let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
            let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, json)
        }
    }

    #[tokio::test]
    async fn health_and_fallback() {
        let h = harness();
        let (status, body) = h.call(Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = h.call(Method::GET, "/nowhere", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["path"], "/nowhere");
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn protected_routes_require_credentials() {
        let h = harness();
        let (status, body) = h.call(Method::GET, "/user/profile", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");

        let user = h.token(Role::User);
        let (status, _) = h
            .call(
                Method::POST,
                "/admin/courses",
                Some(&user),
                Some(json!({ "title": "Nope" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn enroll_review_and_rating_flow() {
        let h = harness();
        let admin = h.token(Role::Admin);
        let user = h.token(Role::User);

        let (status, body) = h
            .call(
                Method::POST,
                "/admin/courses",
                Some(&admin),
                Some(json!({ "title": "Statistics", "type": "video", "price": 12.5 })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["course"]["id"].as_str().unwrap().to_owned();

        let review = json!({ "rating": 4, "comment": "Well paced and clear." });
        let (status, _) = h
            .call(
                Method::POST,
                &format!("/user/courses/{id}/review"),
                Some(&user),
                Some(review.clone()),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = h
            .call(Method::POST, &format!("/user/enroll/{id}"), Some(&user), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = h
            .call(Method::POST, &format!("/user/enroll/{id}"), Some(&user), None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "conflict");

        let (status, body) = h
            .call(
                Method::POST,
                &format!("/user/courses/{id}/review"),
                Some(&user),
                Some(review),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["review"]["userName"], "Tester");

        let (_, body) = h.call(Method::GET, &format!("/courses/{id}"), None, None).await;
        assert_eq!(body["course"]["rating"], 4.0);
        assert_eq!(body["course"]["reviewCount"], 1);
        assert_eq!(body["course"]["enrollmentCount"], 1);
        assert_eq!(body["reviews"].as_array().unwrap().len(), 1);

        let (_, body) = h
            .call(Method::GET, &format!("/courses/{id}/rating"), None, None)
            .await;
        assert_eq!(body["data"]["averageRating"], 4.0);
        assert_eq!(body["data"]["totalReviews"], 1);
    }

    #[tokio::test]
    async fn reviews_of_unknown_course_are_an_empty_list() {
        let h = harness();
        let (status, body) = h
            .call(Method::GET, "/courses/nothing-here/reviews", None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn malformed_bodies_use_the_error_contract() {
        let h = harness();
        let user = h.token(Role::User);
        let (status, body) = h
            .call(
                Method::POST,
                "/user/courses/abc/review",
                Some(&user),
                Some(json!({ "rating": "five", "comment": "long enough comment" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_input");
        assert_eq!(body["success"], false);

        let (status, body) = h
            .call(Method::POST, "/login", None, Some(json!({ "email": 42 })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_input");
    }

    #[tokio::test]
    async fn malformed_review_id_is_bad_request() {
        let h = harness();
        let (status, body) = h.call(Method::GET, "/reviews/not-hex", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_input");
    }
}
