use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Deserialize)]
pub struct CreateUser {
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// Structured error body returned by every failing `/users` route.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: Option<String>,
    pub success: bool,
}

/// What `/echo` saw: lets clients verify injected headers and query pairs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

pub type Db = Arc<RwLock<HashMap<Uuid, User>>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", get(get_user).delete(delete_user))
        .route("/echo", get(echo).post(echo))
        .route("/empty", get(empty))
        .route("/null", get(null_body))
        .route("/malformed", get(malformed))
        .route("/broken", get(broken))
        .route("/broken-empty", get(broken_empty))
        .route("/redirect", get(redirect))
        .route("/redirect-loop", get(redirect_loop))
        .route("/slow", get(slow))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        tracing::debug!(%addr, "mock server accepting connections");
    }
    axum::serve(listener, app()).await
}

fn not_found(id: Uuid) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            code: "USER_NOT_FOUND".to_string(),
            message: Some(format!("user {id} not found")),
            success: false,
        }),
    )
}

async fn list_users(State(db): State<Db>) -> Json<Vec<User>> {
    let users = db.read().await;
    Json(users.values().cloned().collect())
}

async fn create_user(
    State(db): State<Db>,
    Json(input): Json<CreateUser>,
) -> (StatusCode, Json<User>) {
    let user = User {
        id: Uuid::new_v4(),
        name: input.name,
        email: input.email,
    };
    db.write().await.insert(user.id, user.clone());
    (StatusCode::CREATED, Json(user))
}

async fn get_user(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, (StatusCode, Json<ErrorBody>)> {
    let users = db.read().await;
    users.get(&id).cloned().map(Json).ok_or_else(|| not_found(id))
}

async fn delete_user(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, Json<ErrorBody>)> {
    let mut users = db.write().await;
    users
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| not_found(id))
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap) -> Json<Echo> {
    let query = uri
        .query()
        .map(|q| {
            q.split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| match pair.split_once('=') {
                    Some((k, v)) => (k.to_string(), v.to_string()),
                    None => (pair.to_string(), String::new()),
                })
                .collect()
        })
        .unwrap_or_default();
    let headers = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    Json(Echo {
        method: method.to_string(),
        path: uri.path().to_string(),
        query,
        headers,
    })
}

async fn empty() -> StatusCode {
    StatusCode::OK
}

async fn null_body() -> Response {
    ([(header::CONTENT_TYPE, "application/json")], "null").into_response()
}

async fn malformed() -> Response {
    ([(header::CONTENT_TYPE, "application/json")], "not json").into_response()
}

async fn broken() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

async fn broken_empty() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn redirect() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/echo")]).into_response()
}

async fn redirect_loop() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/redirect-loop")]).into_response()
}

async fn slow() -> Json<Echo> {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Json(Echo {
        method: "GET".to_string(),
        path: "/slow".to_string(),
        query: Vec::new(),
        headers: Vec::new(),
    })
}
