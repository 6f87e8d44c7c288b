use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_sessions::Session;

use crate::AppState;
use crate::api::{self, INVALID_REQUEST, Message, PARSE_ERROR, RpcFault};
use crate::auth::api_caller;
use crate::store::EntryStore;

#[derive(Deserialize)]
pub struct ApplicationKey {
    app: Option<String>,
    key: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api", post(rpc))
}

fn fault(status: StatusCode, fault: RpcFault) -> Response {
    (status, Json(fault.to_envelope())).into_response()
}

async fn rpc(
    State(state): State<AppState>,
    session: Session,
    Query(credentials): Query<ApplicationKey>,
    body: Bytes,
) -> Response {
    let caller = api_caller(
        &session,
        &state.profiles,
        credentials.app.as_deref(),
        credentials.key.as_deref(),
    )
    .await;
    let Some(user) = caller else {
        return fault(StatusCode::FORBIDDEN, RpcFault::new(INVALID_REQUEST));
    };

    let container: Value = match serde_json::from_slice(&body) {
        Ok(container) => container,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable rpc body");
            return fault(StatusCode::BAD_REQUEST, RpcFault::new(PARSE_ERROR));
        }
    };

    let store = EntryStore::new(state.db.clone());

    match container {
        Value::Array(items) => {
            if items.is_empty() {
                return fault(StatusCode::BAD_REQUEST, RpcFault::new(INVALID_REQUEST));
            }
            // Validate all messages before running any of them
            let messages = match items.into_iter().map(Message::parse).collect::<Result<Vec<_>, _>>() {
                Ok(messages) => messages,
                Err(e) => return fault(StatusCode::BAD_REQUEST, e),
            };
            let mut responses = Vec::with_capacity(messages.len());
            for message in messages {
                responses.push(api::envelope(api::dispatch(&store, &user, message).await));
            }
            Json(Value::Array(responses)).into_response()
        }
        single => {
            let message = match Message::parse(single) {
                Ok(message) => message,
                Err(e) => return fault(StatusCode::BAD_REQUEST, e),
            };
            match api::dispatch(&store, &user, message).await {
                Ok(result) => Json(json!({ "result": result })).into_response(),
                Err(e) => fault(StatusCode::BAD_REQUEST, e),
            }
        }
    }
}
