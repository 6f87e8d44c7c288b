use askama::Template;
use axum::{
    Router,
    extract::{Query, State},
    response::{Html, IntoResponse},
    routing::get,
};
use chrono::{Local, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::AppState;
use crate::auth::AuthUser;
use crate::client::{EntryView, render_entry};
use crate::error::AppError;
use crate::models::date::format_oplog;
use crate::models::{Entry, User};
use crate::store::{EntryStore, FindQuery};

const PAGE_SIZE: i64 = 20;

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
    entries: Vec<EntryView>,
    more: Option<i64>,
    static_hash: &'static str,

    user: Option<User>,
}

#[derive(Deserialize)]
pub struct HomeQuery {
    #[serde(default)]
    skip: i64,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(home))
}

async fn home(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<HomeQuery>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let skip = query.skip.max(0);

    let mut filter = Map::new();
    filter.insert("_date".to_string(), json!({ "$lt": format_oplog(&now) }));
    let sort = [("_date".to_string(), -1)];

    let rows = EntryStore::new(state.db.clone())
        .find(&FindQuery {
            filter: &filter,
            skip,
            limit: PAGE_SIZE,
            sort: &sort,
        })
        .await?;

    let local = now.with_timezone(&Local);
    let count = rows.len() as i64;
    let entries = rows
        .into_iter()
        .filter_map(|row| serde_json::from_value::<Entry>(Value::Object(row.into_document())).ok())
        .map(|entry| render_entry(&entry, &local, Some(&user.name)))
        .collect();

    let template = HomeTemplate {
        entries,
        more: (count == PAGE_SIZE).then_some(skip + PAGE_SIZE),
        static_hash: crate::STATIC_HASH,
        user: Some(user),
    };
    Ok(Html(template.render()?))
}

pub async fn not_found() -> AppError {
    AppError::NotFound
}
