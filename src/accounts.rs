use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::auth::{hash_password, verify_password, AuthConfig, Role};
use crate::error::{AppError, AppResult};
use crate::ids::ObjectId;
use crate::models::{Admin, LoginReq, RegisterReq, User};
use crate::store::{Store, StoreError};

const BAD_CREDENTIALS: &str = "Invalid email or password";

#[derive(Serialize, Debug, Clone)]
pub struct AdminSession {
    pub token: String,
    pub user: AdminInfo,
}

#[derive(Serialize, Debug, Clone)]
pub struct AdminInfo {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
}

fn looks_like_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.ends_with('.'),
        None => false,
    }
}

pub async fn register(store: &dyn Store, req: RegisterReq) -> AppResult<User> {
    let name = req.name.trim();
    let email = req.email.trim().to_lowercase();
    if name.is_empty() {
        return Err(AppError::invalid("name is required"));
    }
    if !looks_like_email(&email) {
        return Err(AppError::invalid("a valid email is required"));
    }
    if req.password.chars().count() < 6 {
        return Err(AppError::invalid("password must be at least 6 characters"));
    }
    if store.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("email already registered".into()));
    }

    let now = Utc::now();
    let user = User {
        id: ObjectId::new(),
        name: name.to_owned(),
        email,
        password_hash: hash_password(&req.password)?,
        verified: false,
        created_at: now,
        updated_at: now,
    };
    match store.insert_user(&user).await {
        Ok(()) => {}
        Err(StoreError::Duplicate(_)) => {
            return Err(AppError::Conflict("email already registered".into()))
        }
        Err(e) => return Err(e.into()),
    }
    info!(user_id = %user.id, "user registered");
    Ok(user)
}

pub async fn login(store: &dyn Store, auth: &AuthConfig, req: LoginReq) -> AppResult<String> {
    let email = req.email.trim().to_lowercase();
    let user = store
        .find_user_by_email(&email)
        .await?
        .ok_or_else(|| AppError::unauthorized(BAD_CREDENTIALS))?;
    if !verify_password(&req.password, &user.password_hash)? {
        return Err(AppError::unauthorized(BAD_CREDENTIALS));
    }
    auth.issue(&user.id.to_hex(), &user.email, Some(&user.name), Role::User)
}

pub async fn admin_login(
    store: &dyn Store,
    auth: &AuthConfig,
    req: LoginReq,
) -> AppResult<AdminSession> {
    let email = req.email.trim().to_lowercase();
    let admin = store
        .find_admin_by_email(&email)
        .await?
        .ok_or_else(|| AppError::unauthorized(BAD_CREDENTIALS))?;
    if !admin.is_active {
        return Err(AppError::unauthorized("Admin account is deactivated"));
    }
    if !verify_password(&req.password, &admin.password_hash)? {
        return Err(AppError::unauthorized(BAD_CREDENTIALS));
    }
    let name = if admin.name.is_empty() {
        "Admin".to_owned()
    } else {
        admin.name
    };
    let id = admin.id.to_hex();
    let token = auth.issue(&id, &admin.email, Some(&name), Role::Admin)?;
    info!(admin_id = %id, "admin logged in");
    Ok(AdminSession {
        token,
        user: AdminInfo {
            id,
            email: admin.email,
            name,
            role: Role::Admin,
        },
    })
}

/// Creates an admin account unless one with `email` already exists.
/// Returns whether a new account was written.
pub async fn ensure_admin(
    store: &dyn Store,
    email: &str,
    password: &str,
    name: &str,
) -> AppResult<bool> {
    let email = email.trim().to_lowercase();
    if store.find_admin_by_email(&email).await?.is_some() {
        return Ok(false);
    }
    let admin = Admin {
        id: ObjectId::new(),
        email,
        password_hash: hash_password(password)?,
        name: name.to_owned(),
        is_active: true,
        created_at: Utc::now(),
    };
    match store.insert_admin(&admin).await {
        Ok(()) => {
            info!(admin_id = %admin.id, email = %admin.email, "bootstrap admin created");
            Ok(true)
        }
        Err(StoreError::Duplicate(_)) => Ok(false),
        Err(e) => Err(e.into()),
    }
}
