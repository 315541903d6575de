use std::sync::Arc;

use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::{
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    http::header,
    middleware::Next,
    web, Error, HttpMessage, HttpRequest, HttpResponse,
};
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand_core::OsRng;
use uuid::Uuid;

use crate::state::{AdminSession, AppState};

pub const SESSION_COOKIE: &str = "studiolux_session";
pub const LOGIN_PATH: &str = "/admin/login";

pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn session_token(req: &HttpRequest) -> Option<String> {
    req.cookie(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

pub fn session_cookie(req: &HttpRequest, token: &str) -> Cookie<'static> {
    let mut builder = Cookie::build(SESSION_COOKIE, token.to_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    if req.connection_info().scheme() == "https" {
        builder = builder.secure(true);
    }
    builder.finish()
}

pub fn clear_session_cookie(req: &HttpRequest) -> Cookie<'static> {
    let mut builder = Cookie::build(SESSION_COOKIE, "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::seconds(0));
    if req.connection_info().scheme() == "https" {
        builder = builder.secure(true);
    }
    builder.finish()
}

/// Only local admin paths are accepted as a post-login target.
pub fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with("/admin/") && !path.starts_with("//") && path != LOGIN_PATH => {
            path
        }
        _ => "/admin/dashboard",
    }
}

/// Resolves the session cookie to a signed-in admin, or sends the visitor to
/// the login form.
pub async fn admin_guard<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<BoxBody>, Error>
where
    B: actix_web::body::MessageBody + 'static,
{
    let session = match (
        req.app_data::<web::Data<AppState>>(),
        session_token(req.request()),
    ) {
        (Some(state), Some(token)) => state.sessions.resolve(&token),
        _ => None,
    };

    let Some(session) = session else {
        let login_url = format!("{LOGIN_PATH}?next={}", req.path());
        let response = HttpResponse::SeeOther()
            .append_header((header::LOCATION, login_url))
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .cookie(clear_session_cookie(req.request()))
            .finish();
        return Ok(req.into_response(response));
    };

    req.extensions_mut().insert::<Arc<AdminSession>>(session);
    let res = next.call(req).await?;
    Ok(res.map_into_boxed_body())
}
