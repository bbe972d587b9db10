//! Drives the real HTTP client against an in-process fake of the hosted backend.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use api::{ApiError, BackendClient, BillUpload, Settings};
use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use store::models::{Table, Task};
use store::{MemoryStore, NetworkOutcome, NetworkStatus, OfflineCache, SyncConfig, SyncService};
use uuid::Uuid;

const TOKEN: &str = "access-token";
const USER_ID: &str = "user-1";
const REJECTED_TITLE: &str = "boom";

#[derive(Default)]
struct Inner {
    rows: BTreeMap<(String, String), Value>,
    objects: BTreeSet<String>,
    upserts: usize,
}

#[derive(Clone, Default)]
struct Backend(Arc<Mutex<Inner>>);

impl Backend {
    fn rows(&self, table: &str) -> Vec<Value> {
        self.0
            .lock()
            .unwrap()
            .rows
            .iter()
            .filter(|((t, _), _)| t == table)
            .map(|(_, v)| v.clone())
            .collect()
    }

    fn objects(&self) -> BTreeSet<String> {
        self.0.lock().unwrap().objects.clone()
    }

    fn upserts(&self) -> usize {
        self.0.lock().unwrap().upserts
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn authorised(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

async fn token(
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    let valid = match params.get("grant_type").map(String::as_str) {
        Some("password") => body["password"] == "secret",
        Some("refresh_token") => body["refresh_token"] == "refresh-token",
        _ => false,
    };
    if !valid {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid login credentials"
            })),
        )
            .into_response();
    }
    Json(json!({
        "access_token": TOKEN,
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": "refresh-token",
        "user": { "id": USER_ID, "email": "a@b.c" }
    }))
    .into_response()
}

async fn rest_insert(
    State(backend): State<Backend>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Json(rows): Json<Vec<Value>>,
) -> Response {
    if !authorised(&headers) {
        return error(StatusCode::UNAUTHORIZED, "JWT required");
    }
    if rows.iter().any(|r| r["title"] == REJECTED_TITLE) {
        return error(StatusCode::BAD_REQUEST, "rejected by policy");
    }
    let merge = headers
        .get("prefer")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("merge-duplicates"));

    let mut inner = backend.0.lock().unwrap();
    let mut stored = Vec::new();
    for mut row in rows {
        if row.get("id").is_none() {
            row["id"] = json!(Uuid::new_v4().to_string());
        }
        let id = row["id"].as_str().unwrap_or_default().to_string();
        if merge {
            inner.upserts += 1;
        }
        inner.rows.insert((table.clone(), id), row.clone());
        stored.push(row);
    }

    if merge {
        StatusCode::CREATED.into_response()
    } else {
        (StatusCode::CREATED, Json(stored)).into_response()
    }
}

fn matches(row: &Value, filters: &HashMap<String, String>) -> bool {
    filters.iter().all(|(column, filter)| {
        let value = row[column.as_str()].as_str().unwrap_or_default();
        if let Some(expected) = filter.strip_prefix("eq.") {
            value == expected
        } else if let Some(pattern) = filter.strip_prefix("ilike.") {
            value
                .to_lowercase()
                .contains(&pattern.trim_matches('%').to_lowercase())
        } else {
            true
        }
    })
}

async fn rest_select(
    State(backend): State<Backend>,
    Path(table): Path<String>,
    Query(mut params): Query<HashMap<String, String>>,
) -> Response {
    params.remove("select");
    params.remove("order");
    let limit = params
        .remove("limit")
        .and_then(|l| l.parse::<usize>().ok())
        .unwrap_or(usize::MAX);
    let rows: Vec<Value> = backend
        .rows(&table)
        .into_iter()
        .filter(|r| matches(r, &params))
        .take(limit)
        .collect();
    Json(rows).into_response()
}

async fn rest_delete(
    State(backend): State<Backend>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !authorised(&headers) {
        return error(StatusCode::UNAUTHORIZED, "JWT required");
    }
    let mut inner = backend.0.lock().unwrap();
    inner
        .rows
        .retain(|(t, _), row| !(t == &table && matches(row, &params)));
    StatusCode::NO_CONTENT.into_response()
}

async fn object_upload(
    State(backend): State<Backend>,
    Path((bucket, path)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let key = format!("{bucket}/{path}");
    let mut inner = backend.0.lock().unwrap();
    if body.is_empty() || !inner.objects.insert(key.clone()) {
        return error(StatusCode::BAD_REQUEST, "The resource already exists");
    }
    Json(json!({ "Key": key })).into_response()
}

async fn object_remove(
    State(backend): State<Backend>,
    Path(bucket): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut inner = backend.0.lock().unwrap();
    for prefix in body["prefixes"].as_array().into_iter().flatten() {
        if let Some(path) = prefix.as_str() {
            inner.objects.remove(&format!("{bucket}/{path}"));
        }
    }
    Json(json!([])).into_response()
}

async fn object_sign(Path((bucket, path)): Path<(String, String)>, Json(body): Json<Value>) -> Response {
    let expires = body["expiresIn"].as_u64().unwrap_or_default();
    Json(json!({
        "signedURL": format!("/object/sign/{bucket}/{path}?token=t&expires={expires}")
    }))
    .into_response()
}

async fn upload_bill_fn(
    State(backend): State<Backend>,
    headers: HeaderMap,
    mut form: Multipart,
) -> Response {
    if !authorised(&headers) {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid token" }))).into_response();
    }
    let mut fields = HashMap::new();
    let mut file_name = None;
    while let Ok(Some(field)) = form.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            file_name = field.file_name().map(str::to_string);
            let _ = field.bytes().await;
        } else if let Ok(text) = field.text().await {
            fields.insert(name, text);
        }
    }
    let Some(file_name) = file_name else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "No file provided" }))).into_response();
    };

    let path = format!("{USER_ID}/1-fn.{}", file_name.rsplit('.').next().unwrap_or("bin"));
    let title = fields
        .get("title")
        .filter(|t| !t.is_empty())
        .cloned()
        .unwrap_or_else(|| file_name.clone());
    let bill = json!({
        "id": Uuid::new_v4().to_string(),
        "user_id": USER_ID,
        "title": title,
        "file_path": path,
        "amount": fields.get("amount").and_then(|a| a.parse::<f64>().ok()),
        "bill_date": fields.get("billDate"),
        "tags": fields.get("tags").map(|t| t.split(',').map(str::trim).collect::<Vec<_>>()),
    });
    let mut inner = backend.0.lock().unwrap();
    inner.objects.insert(format!("bills/{path}"));
    let id = bill["id"].as_str().unwrap_or_default().to_string();
    inner.rows.insert(("bills".into(), id), bill.clone());
    Json(json!({ "success": true, "bill": bill, "message": "Bill uploaded successfully" }))
        .into_response()
}

async fn spawn_backend() -> (BackendClient, Backend) {
    let backend = Backend::default();
    let app = Router::new()
        .route("/auth/v1/token", post(token))
        .route(
            "/rest/v1/{table}",
            post(rest_insert).get(rest_select).delete(rest_delete),
        )
        .route("/storage/v1/object/sign/{bucket}/{*path}", post(object_sign))
        .route("/storage/v1/object/{bucket}/{*path}", post(object_upload))
        .route("/storage/v1/object/{bucket}", delete(object_remove))
        .route("/functions/v1/upload-bill", post(upload_bill_fn))
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut settings = Settings::default();
    settings.backend.url = format!("http://{addr}");
    settings.backend.key = "anon".into();
    (BackendClient::new(&settings).unwrap(), backend)
}

#[tokio::test]
async fn test_sign_in_rejects_bad_password() {
    let (client, _) = spawn_backend().await;
    let err = client.sign_in_with_password("a@b.c", "nope").await.unwrap_err();
    assert_eq!(err.status(), Some(reqwest::StatusCode::BAD_REQUEST));
    assert!(err.to_string().contains("Invalid login credentials"));
    assert!(client.session().await.is_none());
}

#[tokio::test]
async fn test_offline_rows_reach_backend_once_after_reconnect() {
    let (client, backend) = spawn_backend().await;
    let session = client.sign_in_with_password("a@b.c", "secret").await.unwrap();
    assert_eq!(session.user_id(), USER_ID);

    let cache = OfflineCache::new(
        MemoryStore::new(),
        client.clone(),
        NetworkStatus::new(false),
        Some(session.user.id.clone()),
    );
    let service = SyncService::new(cache, SyncConfig::default());
    let first = service.cache().add(Task::new("water plants")).await.unwrap();
    service.cache().add(Task::new(REJECTED_TITLE)).await.unwrap();
    assert!(backend.rows("tasks").is_empty());

    let NetworkOutcome::Reconciled(report) = service.on_network_change(true).await else {
        panic!("expected a pass on reconnect");
    };
    assert_eq!(report.table(Table::Tasks).pushed, 1);
    assert_eq!(report.table(Table::Tasks).failed, 1);

    let row = service.cache().get::<Task>(first.row().id).await.unwrap().unwrap();
    let rows = backend.rows("tasks");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], row.remote_id.unwrap().to_string());
    assert_eq!(rows[0]["user_id"], USER_ID);
    assert_eq!(rows[0]["title"], "water plants");

    let second = service.sync_now().await;
    assert_eq!(second.pushed(), 0);
    assert_eq!(second.failed(), 1);
    assert_eq!(backend.upserts(), 1);
    assert_eq!(backend.rows("tasks").len(), 1);
}

#[tokio::test]
async fn test_online_delete_removes_backend_row() {
    let (client, backend) = spawn_backend().await;
    client.sign_in_with_password("a@b.c", "secret").await.unwrap();
    let cache = OfflineCache::new(
        MemoryStore::new(),
        client,
        NetworkStatus::new(true),
        Some(USER_ID.into()),
    );

    let added = cache.add(Task::new("temporary")).await.unwrap();
    assert!(added.is_synced());
    assert_eq!(backend.rows("tasks").len(), 1);

    assert!(cache.delete::<Task>(added.row().id).await.unwrap());
    assert!(backend.rows("tasks").is_empty());
}

#[tokio::test]
async fn test_remote_writes_need_a_session() {
    let (client, backend) = spawn_backend().await;
    let cache = OfflineCache::new(
        MemoryStore::new(),
        client,
        NetworkStatus::new(true),
        Some(USER_ID.into()),
    );
    let outcome = cache.add(Task::new("signed out")).await.unwrap();
    assert!(!outcome.is_synced());
    assert!(backend.rows("tasks").is_empty());
}

#[tokio::test]
async fn test_upload_bill_direct() {
    let (client, backend) = spawn_backend().await;
    client.sign_in_with_password("a@b.c", "secret").await.unwrap();

    let upload = BillUpload::new("receipt.png", "image/png", vec![1, 2, 3])
        .with_amount("10.25")
        .with_tags("food, weekly");
    let record = client.upload_bill(&upload).await.unwrap();

    assert_eq!(record.user_id.as_deref(), Some(USER_ID));
    assert_eq!(record.data.title, "receipt.png");
    assert!(record.data.file_path.starts_with("user-1/"));
    assert!(record.data.file_path.ends_with(".png"));
    assert_eq!(
        record.data.tags,
        Some(vec!["food".to_string(), "weekly".to_string()])
    );
    assert!(backend
        .objects()
        .contains(&format!("bills/{}", record.data.file_path)));

    let url = client.bill_url(&record.data).await.unwrap();
    assert!(url.starts_with(client.base_url()));
    assert!(url.contains("/storage/v1/object/sign/bills/user-1/"));
    assert!(url.ends_with("expires=3600"));
}

#[tokio::test]
async fn test_upload_bill_removes_file_when_insert_fails() {
    let (client, backend) = spawn_backend().await;
    client.sign_in_with_password("a@b.c", "secret").await.unwrap();

    let upload = BillUpload::new("x.jpg", "image/jpeg", vec![9]).with_title(REJECTED_TITLE);
    let err = client.upload_bill(&upload).await.unwrap_err();
    assert!(matches!(err, ApiError::Backend { .. }));
    assert!(backend.objects().is_empty());
    assert!(backend.rows("bills").is_empty());
}

#[tokio::test]
async fn test_invoke_upload_bill_function() {
    let (client, backend) = spawn_backend().await;
    client.sign_in_with_password("a@b.c", "secret").await.unwrap();

    let upload = BillUpload::new("scan.pdf", "application/pdf", vec![7; 16])
        .with_title("Internet")
        .with_bill_date("2025-03-01");
    let record = client.invoke_upload_bill(&upload).await.unwrap();
    assert_eq!(record.data.title, "Internet");
    assert_eq!(record.data.file_path, "user-1/1-fn.pdf");
    assert_eq!(backend.rows("bills").len(), 1);

    let expense = store::models::Expense {
        amount: rust_decimal_macros::dec!(30),
        category_id: "c-1".into(),
        description: Some("Bill: internet".into()),
        expense_date: chrono::NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
    };
    let found = client.find_bill_for_expense(&expense).await.unwrap().unwrap();
    assert_eq!(found.id, record.id);
}
