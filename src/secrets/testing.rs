//! Stand-in Vault KV v2 server for tests.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::DEFAULT_SECRET_MOUNT;

pub(crate) const TOKEN: &str = "test-token";

type Secrets = Arc<HashMap<String, Value>>;

/// Serves `auth/token/lookup-self` and `{mount}/data/*path`.
///
/// Besides the configured secrets, the paths `deleted`, `garbled` and
/// `broken` answer with a destroyed version, a non-JSON body and a 500.
pub(crate) struct FakeVault {
    mount: String,
    secrets: HashMap<String, Value>,
}

impl FakeVault {
    pub(crate) fn new() -> Self {
        Self {
            mount: DEFAULT_SECRET_MOUNT.to_string(),
            secrets: HashMap::new(),
        }
    }

    pub(crate) fn with_mount(mut self, mount: &str) -> Self {
        self.mount = mount.to_string();
        self
    }

    pub(crate) fn with_secret(mut self, path: &str, data: Value) -> Self {
        self.secrets.insert(path.to_string(), data);
        self
    }

    /// Start serving on an ephemeral port and return the base address.
    pub(crate) async fn spawn(self) -> String {
        let app = Router::new()
            .route("/v1/auth/token/lookup-self", get(lookup_self))
            .route(&format!("/v1/{}/data/*path", self.mount), get(read_kv))
            .with_state(Arc::new(self.secrets));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("x-vault-token").and_then(|v| v.to_str().ok()) == Some(TOKEN)
}

fn permission_denied() -> Value {
    json!({ "errors": ["permission denied"] })
}

async fn lookup_self(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if authorized(&headers) {
        (StatusCode::OK, Json(json!({ "data": { "id": TOKEN } })))
    } else {
        (StatusCode::FORBIDDEN, Json(permission_denied()))
    }
}

async fn read_kv(
    State(secrets): State<Secrets>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, String) {
    if !authorized(&headers) {
        return (StatusCode::FORBIDDEN, permission_denied().to_string());
    }
    if let Some(data) = secrets.get(&path) {
        let body = json!({ "data": { "data": data, "metadata": { "version": 4 } } });
        return (StatusCode::OK, body.to_string());
    }
    match path.as_str() {
        "deleted" => (
            StatusCode::OK,
            json!({ "data": { "data": null, "metadata": { "version": 2 } } }).to_string(),
        ),
        "garbled" => (StatusCode::OK, "<html>not json</html>".to_string()),
        "broken" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "errors": ["storage unavailable"] }).to_string(),
        ),
        _ => (StatusCode::NOT_FOUND, json!({ "errors": [] }).to_string()),
    }
}
