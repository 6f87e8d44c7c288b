use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;

use ldap3::{LdapConnAsync, LdapConnSettings, LdapError, dn_escape};
use tower_sessions::Session;

use crate::config::{Authentication, LdapSettings, Profiles};
use crate::models::User;

/// LDAP result code for a failed simple bind.
const INVALID_CREDENTIALS: u32 = 49;

const USER_KEY: &str = "user";

/// Checks a username/password pair.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn valid(&self, username: &str, password: &str) -> bool;
}

/// Accepts any user whose password equals the username. For local use only.
pub struct Development;

#[async_trait]
impl Authenticator for Development {
    async fn valid(&self, username: &str, password: &str) -> bool {
        username == password
    }
}

/// Binds to the directory as the user's DN; a successful bind is a valid
/// login.
pub struct Ldap {
    settings: LdapSettings,
}

impl Ldap {
    pub fn new(settings: LdapSettings) -> Self {
        Self { settings }
    }

    pub fn user_dn(&self, username: &str) -> String {
        substitute_user(&self.settings.user_dn_template, &dn_escape(username))
    }

    async fn bind(&self, username: &str, password: &str) -> Result<(), LdapError> {
        let start_tls = self.settings.start_tls && !self.settings.uri.starts_with("ldaps://");
        let settings = LdapConnSettings::new().set_starttls(start_tls);
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.settings.uri).await?;
        ldap3::drive!(conn);

        let bound = ldap
            .simple_bind(&self.user_dn(username), password)
            .await
            .and_then(|result| result.success());
        if let Err(e) = ldap.unbind().await {
            tracing::warn!(error = %e, "Failed to unbind");
        }
        bound.map(|_| ())
    }
}

#[async_trait]
impl Authenticator for Ldap {
    async fn valid(&self, username: &str, password: &str) -> bool {
        // An empty password would be an anonymous bind.
        if password.is_empty() {
            return false;
        }
        match self.bind(username, password).await {
            Ok(()) => true,
            Err(LdapError::LdapResult { result }) if result.rc == INVALID_CREDENTIALS => false,
            Err(e) => {
                tracing::error!(error = %e, uri = %self.settings.uri, "Failed to bind");
                false
            }
        }
    }
}

/// Build the configured backend.
pub fn authenticator(authentication: &Authentication) -> Arc<dyn Authenticator> {
    match authentication {
        Authentication::Development => Arc::new(Development),
        Authentication::Ldap(settings) => Arc::new(Ldap::new(settings.clone())),
    }
}

/// Replace `${user}` and `$user` placeholders. Other `$` sequences are left
/// as they are.
fn substitute_user(template: &str, user: &str) -> String {
    let mut dn = String::with_capacity(template.len() + user.len());
    let mut rest = template;
    while let Some(start) = rest.find('$') {
        dn.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("${user}") {
            dn.push_str(user);
            rest = after;
        } else if let Some(after) = tail
            .strip_prefix("$user")
            .filter(|after| !after.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_'))
        {
            dn.push_str(user);
            rest = after;
        } else {
            dn.push('$');
            rest = &tail[1..];
        }
    }
    dn.push_str(rest);
    dn
}

pub struct AuthUser(pub User);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthRedirect;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let next = parts
            .uri
            .path_and_query()
            .map_or("/", |target| target.as_str())
            .to_string();
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|_| AuthRedirect(next.clone()))?;

        current_user(&session)
            .await
            .map(AuthUser)
            .ok_or(AuthRedirect(next))
    }
}

/// Sends the browser to the login page, remembering where it was going.
pub struct AuthRedirect(pub String);

impl IntoResponse for AuthRedirect {
    fn into_response(self) -> Response {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("next", &self.0)
            .finish();
        Redirect::to(&format!("/login?{query}")).into_response()
    }
}

pub async fn current_user(session: &Session) -> Option<User> {
    session.get(USER_KEY).await.ok().flatten()
}

/// Resolve the API caller from the session, falling back to an application
/// key.
pub async fn api_caller(
    session: &Session,
    profiles: &Profiles,
    app: Option<&str>,
    key: Option<&str>,
) -> Option<User> {
    if let Some(user) = current_user(session).await {
        return Some(user);
    }
    match (app, key) {
        (Some(app), Some(key)) if profiles.verify(app, key) => Some(User::application(app)),
        _ => None,
    }
}

pub async fn login_user(session: &Session, user: User) -> Result<(), tower_sessions::session::Error> {
    session.insert(USER_KEY, user).await
}

pub async fn logout_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}
