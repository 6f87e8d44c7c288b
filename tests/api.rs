mod common;

use axum::http::StatusCode;
use common::{APP, APP_KEY, TestApp};
use serde_json::{Value, json};

async fn create(app: &TestApp, cookie: &str, params: Value) -> String {
    let (status, body) = app.rpc(json!({"method": "entry.put", "params": params}), cookie).await;
    assert_eq!(status, StatusCode::OK, "create failed: {body}");
    body["result"].as_str().expect("create returns the new id").to_string()
}

async fn history_count(app: &TestApp, action: &str) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entry_history WHERE type = ?")
        .bind(action)
        .fetch_one(&app.db)
        .await
        .unwrap();
    count
}

#[tokio::test]
async fn create_then_get_by_id() {
    let app = TestApp::new().await;
    let cookie = app.login("alice").await;

    let id = create(
        &app,
        &cookie,
        json!({"_type": "user", "_date": "2011-01-27T18:33:31Z", "summary": "deployed web01", "host": "web01"}),
    )
    .await;

    let (status, body) = app
        .rpc(json!({"method": "entry.get", "params": {"find": {"_id": id}}}), &cookie)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["result"],
        json!([{
            "_id": id,
            "_date": "2011-01-27T18:33:31Z",
            "_user": "alice",
            "_type": "user",
            "summary": "deployed web01",
            "host": "web01",
        }])
    );
}

#[tokio::test]
async fn create_ignores_a_claimed_user_and_defaults_the_date() {
    let app = TestApp::new().await;
    let cookie = app.login("alice").await;

    let id = create(&app, &cookie, json!({"summary": "hello", "_user": "mallory"})).await;

    let (_, body) = app
        .rpc(json!({"method": "entry.get", "params": {"find": {"_id": id}}}), &cookie)
        .await;
    let entry = &body["result"][0];
    assert_eq!(entry["_user"], "alice");
    assert!(oplog::models::date::is_oplog(entry["_date"].as_str().unwrap()));
}

#[tokio::test]
async fn get_honours_sort_skip_limit_and_fields() {
    let app = TestApp::new().await;
    let cookie = app.login("alice").await;
    for hour in 10..15 {
        create(
            &app,
            &cookie,
            json!({"_date": format!("2011-01-27T{hour}:00:00Z"), "summary": format!("at {hour}")}),
        )
        .await;
    }

    let (_, body) = app
        .rpc(
            json!({"method": "entry.get", "params": {
                "find": {"_date": {"$lt": "2011-01-27T14:00:00Z"}},
                "sort": [["_date", -1]],
                "skip": 1,
                "limit": 2,
                "fields": ["summary"],
            }}),
            &cookie,
        )
        .await;

    let entries = body["result"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["summary"], "at 12");
    assert_eq!(entries[1]["summary"], "at 11");
    let mut keys: Vec<&String> = entries[0].as_object().unwrap().keys().collect();
    keys.sort();
    assert_eq!(keys, ["_id", "summary"]);
}

#[tokio::test]
async fn get_filters_on_body_fields() {
    let app = TestApp::new().await;
    let cookie = app.login("alice").await;
    create(&app, &cookie, json!({"summary": "a", "host": "web01"})).await;
    create(&app, &cookie, json!({"summary": "b", "host": "db01"})).await;

    let (_, body) = app
        .rpc(
            json!({"method": "entry.get", "params": {"find": {"host": {"$in": ["db01", "db02"]}}}}),
            &cookie,
        )
        .await;

    let entries = body["result"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["summary"], "b");
}

#[tokio::test]
async fn get_without_find_is_invalid_params() {
    let app = TestApp::new().await;
    let cookie = app.login("alice").await;

    let (status, body) = app
        .rpc(json!({"method": "entry.get", "params": {"skip": 0}}), &cookie)
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": {"code": -32602, "message": "Invalid params"}}));
}

#[tokio::test]
async fn update_sets_fields_and_keeps_history() {
    let app = TestApp::new().await;
    let cookie = app.login("alice").await;
    let id = create(&app, &cookie, json!({"_type": "user", "summary": "old"})).await;

    let (status, body) = app
        .rpc(
            json!({"method": "entry.put", "params": {"_id": id, "$set": {"summary": "new", "_user": "mallory"}}}),
            &cookie,
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["n"], 1);
    let (_, body) = app
        .rpc(json!({"method": "entry.get", "params": {"find": {"_id": id}}}), &cookie)
        .await;
    assert_eq!(body["result"][0]["summary"], "new");
    assert_eq!(body["result"][0]["_user"], "alice");
    assert_eq!(history_count(&app, "entry.put").await, 1);
}

#[tokio::test]
async fn update_of_another_users_entry_changes_nothing() {
    let app = TestApp::new().await;
    let alice = app.login("alice").await;
    let bob = app.login("bob").await;
    let id = create(&app, &alice, json!({"summary": "mine"})).await;

    let (status, body) = app
        .rpc(json!({"method": "entry.put", "params": {"_id": id, "$set": {"summary": "ours"}}}), &bob)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["n"], 0);
    assert_eq!(history_count(&app, "entry.put").await, 0);
}

#[tokio::test]
async fn update_of_a_missing_entry_is_a_server_error() {
    let app = TestApp::new().await;
    let cookie = app.login("alice").await;

    let (status, body) = app
        .rpc(json!({"method": "entry.put", "params": {"_id": "nope", "$set": {"summary": "x"}}}), &cookie)
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"error": {"code": -32099, "message": "Entry with id \"nope\" not found"}})
    );
}

#[tokio::test]
async fn invalid_documents_are_rejected() {
    let app = TestApp::new().await;
    let cookie = app.login("alice").await;

    for params in [
        json!({"_type": "user", "summary": ""}),
        json!({"_type": "user"}),
        json!({"summary": "x", "_date": "27 Jan 2011"}),
        json!({"summary": 42}),
    ] {
        let (status, body) = app.rpc(json!({"method": "entry.put", "params": params}), &cookie).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], -32602);
    }
}

#[tokio::test]
async fn delete_removes_own_entries_only() {
    let app = TestApp::new().await;
    let alice = app.login("alice").await;
    let bob = app.login("bob").await;
    let id = create(&app, &alice, json!({"summary": "mine"})).await;

    let (_, body) = app.rpc(json!({"method": "entry.del", "params": {"_id": id}}), &bob).await;
    assert_eq!(body["result"]["n"], 0);

    let (_, body) = app.rpc(json!({"method": "entry.del", "params": {"_id": id}}), &alice).await;
    assert_eq!(body["result"], json!({"ok": 1.0, "n": 1, "err": null}));
    assert_eq!(history_count(&app, "entry.del").await, 1);

    let (_, body) = app.rpc(json!({"method": "entry.del", "params": {"_id": id}}), &alice).await;
    assert_eq!(body["error"]["code"], -32099);
}

#[tokio::test]
async fn delete_without_id_is_invalid_params() {
    let app = TestApp::new().await;
    let cookie = app.login("alice").await;

    let (status, body) = app.rpc(json!({"method": "entry.del", "params": {}}), &cookie).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], -32602);
}

#[tokio::test]
async fn malformed_requests_get_protocol_errors() {
    let app = TestApp::new().await;
    let cookie = app.login("alice").await;

    let (status, body) = app.post_api("/api", "{not json", Some(&cookie)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": {"code": -32700, "message": "Parse error"}}));

    let (status, body) = app.post_api("/api", r#"{"method": "entry.get"}"#, Some(&cookie)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], -32600);

    let (_, body) = app.post_api("/api", "[]", Some(&cookie)).await;
    assert_eq!(body["error"]["code"], -32600);

    let (status, body) = app
        .rpc(json!({"method": "entry.frobnicate", "params": {}}), &cookie)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": {"code": -32601, "message": "Method not found"}}));
}

#[tokio::test]
async fn batches_answer_each_message_in_order() {
    let app = TestApp::new().await;
    let cookie = app.login("alice").await;

    let batch = json!([
        {"method": "entry.put", "params": {"summary": "first"}},
        {"method": "entry.nope", "params": {}},
        {"method": "entry.get", "params": {"find": {"summary": "first"}}},
    ]);
    let (status, body) = app.rpc(batch, &cookie).await;

    assert_eq!(status, StatusCode::OK);
    let responses = body.as_array().unwrap();
    assert_eq!(responses.len(), 3);
    assert!(responses[0]["result"].is_string());
    assert_eq!(responses[1]["error"]["code"], -32601);
    assert_eq!(responses[2]["result"][0]["summary"], "first");
}

#[tokio::test]
async fn a_malformed_batch_member_rejects_the_whole_batch() {
    let app = TestApp::new().await;
    let cookie = app.login("alice").await;

    let batch = json!([
        {"method": "entry.put", "params": {"summary": "never stored"}},
        {"method": "entry.get"},
    ]);
    let (status, body) = app.rpc(batch, &cookie).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], -32600);
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entries")
        .fetch_one(&app.db)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn anonymous_calls_are_forbidden() {
    let app = TestApp::new().await;

    let body = json!({"method": "entry.get", "params": {"find": {}}}).to_string();
    let (status, response) = app.post_api("/api", &body, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["error"]["code"], -32600);

    let (status, _) = app.post_api(&format!("/api?app={APP}&key=wrong"), &body, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn application_keys_write_as_the_application() {
    let app = TestApp::new().await;
    let uri = format!("/api?app={APP}&key={APP_KEY}");

    let body = json!({"method": "entry.put", "params": {"summary": "nightly backup done"}}).to_string();
    let (status, created) = app.post_api(&uri, &body, None).await;
    assert_eq!(status, StatusCode::OK);

    let id = created["result"].clone();
    let body = json!({"method": "entry.get", "params": {"find": {"_id": id}}}).to_string();
    let (_, found) = app.post_api(&uri, &body, None).await;
    assert_eq!(found["result"][0]["_user"], "[deploy]");
}
