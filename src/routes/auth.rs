use askama::Template;
use axum::{
    Form, Router,
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect},
    routing::get,
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::AppState;
use crate::auth::{login_user, logout_user};
use crate::error::AppError;
use crate::models::User;

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    error: Option<String>,
    next: String,
    username: String,
    select: String,
    user: Option<User>,
}

#[derive(Template)]
#[template(path = "logout.html")]
struct LogoutTemplate {
    user: Option<User>,
}

#[derive(Deserialize)]
pub struct LoginQuery {
    next: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    next: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page).post(login_submit))
        .route("/logout", get(logout))
}

/// Where to go after signing in: a local path, never the login or logout
/// pages.
fn redirect_target(next: &str) -> &str {
    let next = next.trim();
    let local = next.starts_with('/') && !next.starts_with("//") && !next.starts_with("/\\");
    if !local || next.starts_with("/login") || next.starts_with("/logout") {
        "/"
    } else {
        next
    }
}

async fn login_page(Query(query): Query<LoginQuery>) -> Result<impl IntoResponse, AppError> {
    let template = LoginTemplate {
        error: None,
        next: query.next.unwrap_or_else(|| "/".to_string()),
        username: String::new(),
        select: "username".to_string(),
        user: None,
    };
    Ok(Html(template.render()?))
}

async fn login_submit(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<impl IntoResponse, AppError> {
    let failure = if form.username.is_empty() {
        Some(("Username required", "username"))
    } else if form.password.is_empty() {
        Some(("Password required", "password"))
    } else if !state.authenticator.valid(&form.username, &form.password).await {
        tracing::info!(username = %form.username, "rejected login");
        Some(("Invalid username or password.", "password"))
    } else {
        None
    };

    if let Some((error, field)) = failure {
        let template = LoginTemplate {
            error: Some(error.to_string()),
            next: form.next,
            username: form.username,
            select: field.to_string(),
            user: None,
        };
        return Ok(Html(template.render()?).into_response());
    }

    tracing::info!(username = %form.username, "user logged in");
    login_user(&session, User::new(form.username)).await?;
    Ok(Redirect::to(redirect_target(&form.next)).into_response())
}

async fn logout(session: Session) -> Result<impl IntoResponse, AppError> {
    logout_user(&session).await?;
    Ok(Html(LogoutTemplate { user: None }.render()?))
}
