use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{any, get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Size of each chunk the `/slow` endpoint emits.
pub const SLOW_CHUNK: usize = 1024;

/// Pause after each body frame read by `/uploads/slow`.
pub const SLOW_UPLOAD_PAUSE_MS: u64 = 5;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateUser {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Upload {
    pub id: Uuid,
    pub size: usize,
}

#[derive(Default)]
pub struct Store {
    users: RwLock<BTreeMap<u64, User>>,
    next_id: AtomicU64,
    uploads: RwLock<HashMap<Uuid, usize>>,
}

pub type Db = Arc<Store>;

pub fn app() -> Router {
    let db: Db = Arc::new(Store::default());
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).patch(update_user).delete(delete_user),
        )
        .route("/search", get(echo_query))
        .route("/headers", get(echo_headers))
        .route("/echo", post(echo_body))
        .route("/status/{code}", any(respond_with_status))
        .route("/files/{size}", get(fixed_file))
        .route("/slow/{chunks}", get(slow_file))
        .route("/uploads", get(list_uploads).post(receive_upload))
        .route("/uploads/slow", post(receive_slow_upload))
        .route("/uploads/{id}", get(get_upload))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn list_users(State(db): State<Db>) -> Json<Vec<User>> {
    let users = db.users.read().await;
    Json(users.values().cloned().collect())
}

async fn create_user(
    State(db): State<Db>,
    Json(input): Json<CreateUser>,
) -> (StatusCode, Json<User>) {
    let user = User {
        id: db.next_id.fetch_add(1, Ordering::SeqCst) + 1,
        name: input.name,
        email: input.email,
    };
    db.users.write().await.insert(user.id, user.clone());
    (StatusCode::CREATED, Json(user))
}

async fn get_user(State(db): State<Db>, Path(id): Path<u64>) -> Result<Json<User>, StatusCode> {
    let users = db.users.read().await;
    users.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn update_user(
    State(db): State<Db>,
    Path(id): Path<u64>,
    Json(input): Json<UpdateUser>,
) -> Result<Json<User>, StatusCode> {
    let mut users = db.users.write().await;
    let user = users.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    if let Some(name) = input.name {
        user.name = name;
    }
    if let Some(email) = input.email {
        user.email = Some(email);
    }
    Ok(Json(user.clone()))
}

async fn delete_user(State(db): State<Db>, Path(id): Path<u64>) -> Result<StatusCode, StatusCode> {
    let mut users = db.users.write().await;
    users.remove(&id).map(|_| StatusCode::NO_CONTENT).ok_or(StatusCode::NOT_FOUND)
}

/// Query pairs in the order they arrived.
async fn echo_query(Query(pairs): Query<Vec<(String, String)>>) -> Json<Vec<(String, String)>> {
    Json(pairs)
}

async fn echo_headers(headers: HeaderMap) -> Json<BTreeMap<String, String>> {
    let echoed = headers
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    Json(echoed)
}

async fn echo_body(body: Bytes) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], body)
}

async fn respond_with_status(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

/// Deterministic content so clients can verify what they stored.
pub fn file_contents(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

async fn fixed_file(Path(size): Path<usize>) -> Vec<u8> {
    file_contents(size)
}

/// `chunks` pieces of `SLOW_CHUNK` bytes, 50ms apart, with a known length.
async fn slow_file(Path(chunks): Path<usize>) -> impl IntoResponse {
    let stream = futures::stream::unfold(0usize, move |sent| async move {
        if sent == chunks {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        Some((Ok::<_, std::io::Error>(Bytes::from(vec![b'.'; SLOW_CHUNK])), sent + 1))
    });
    (
        [(header::CONTENT_LENGTH, (chunks * SLOW_CHUNK).to_string())],
        Body::from_stream(stream),
    )
}

async fn receive_upload(State(db): State<Db>, body: Bytes) -> (StatusCode, Json<Upload>) {
    record_upload(&db, body.len()).await
}

/// Reads the body one frame at a time, pausing between frames. A client that
/// goes away mid-body leaves nothing recorded.
async fn receive_slow_upload(
    State(db): State<Db>,
    body: Body,
) -> Result<(StatusCode, Json<Upload>), StatusCode> {
    let mut frames = body.into_data_stream();
    let mut size = 0;
    while let Some(frame) = frames.next().await {
        size += frame.map_err(|_| StatusCode::BAD_REQUEST)?.len();
        tokio::time::sleep(Duration::from_millis(SLOW_UPLOAD_PAUSE_MS)).await;
    }
    Ok(record_upload(&db, size).await)
}

async fn record_upload(db: &Db, size: usize) -> (StatusCode, Json<Upload>) {
    let upload = Upload {
        id: Uuid::new_v4(),
        size,
    };
    db.uploads.write().await.insert(upload.id, upload.size);
    tracing::debug!(id = %upload.id, size = upload.size, "stored upload");
    (StatusCode::CREATED, Json(upload))
}

async fn list_uploads(State(db): State<Db>) -> Json<Vec<Upload>> {
    let uploads = db.uploads.read().await;
    Json(
        uploads
            .iter()
            .map(|(id, size)| Upload { id: *id, size: *size })
            .collect(),
    )
}

async fn get_upload(State(db): State<Db>, Path(id): Path<Uuid>) -> Result<Json<Upload>, StatusCode> {
    let uploads = db.uploads.read().await;
    uploads
        .get(&id)
        .map(|size| Json(Upload { id, size: *size }))
        .ok_or(StatusCode::NOT_FOUND)
}
