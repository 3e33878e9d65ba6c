//! GitHub Gist backend.
//!
//! Talks to the GitHub REST API (`/gists`) with HTTP basic auth. Every
//! collection is a private gist. There is no retry loop: a
//! failed call is returned to the caller as-is.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Collection, CollectionBackend, FileContents, FileRef, StorageError};

/// Default GitHub API root.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const GIST_DESCRIPTION: &str = "gistvault secret files";
const PAGE_SIZE: usize = 100;
const USER_AGENT: &str = concat!("gistvault/", env!("CARGO_PKG_VERSION"));

/// Configuration for [`GistBackend`].
#[derive(Clone)]
pub struct GistConfig {
    /// API root. Default: `https://api.github.com`.
    pub api_url: String,
    /// GitHub account name.
    pub username: String,
    /// Account password or personal access token.
    pub password: String,
    /// Per-request timeout. Default: 30 seconds.
    pub timeout: Duration,
}

impl GistConfig {
    /// Configuration for the public GitHub API with default timeouts.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            username: username.into(),
            password: password.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for GistConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GistConfig")
            .field("api_url", &self.api_url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A collection backend backed by GitHub Gists.
#[derive(Clone)]
pub struct GistBackend {
    api_url: String,
    username: String,
    password: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GistBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GistBackend")
            .field("api_url", &self.api_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

// --- Wire types ---

#[derive(Deserialize)]
struct GistResponse {
    id: String,
    #[serde(default)]
    files: BTreeMap<String, GistFile>,
}

#[derive(Deserialize)]
struct GistFile {
    raw_url: String,
}

#[derive(Serialize)]
struct FileBody {
    content: String,
}

#[derive(Serialize)]
struct CreateRequest<'a> {
    description: &'a str,
    public: bool,
    files: BTreeMap<String, FileBody>,
}

#[derive(Serialize)]
struct UpdateRequest {
    files: BTreeMap<String, FileBody>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

impl From<GistResponse> for Collection {
    fn from(gist: GistResponse) -> Self {
        Self {
            id: gist.id,
            files: gist
                .files
                .into_iter()
                .map(|(name, file)| {
                    (
                        name,
                        FileRef {
                            raw_url: file.raw_url,
                        },
                    )
                })
                .collect(),
        }
    }
}

fn file_bodies(files: FileContents) -> BTreeMap<String, FileBody> {
    files
        .into_iter()
        .map(|(name, content)| (name, FileBody { content }))
        .collect()
}

impl GistBackend {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Network`] if the HTTP client cannot be built
    /// (e.g. the TLS backend fails to initialize).
    pub fn new(config: GistConfig) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| StorageError::Network {
                operation: "client setup".to_owned(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            username: config.username,
            password: config.password,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_url)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/vnd.github+json")
    }

    async fn send(
        &self,
        operation: &str,
        req: RequestBuilder,
    ) -> Result<reqwest::Response, StorageError> {
        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                StorageError::Timeout {
                    operation: operation.to_owned(),
                }
            } else {
                StorageError::Network {
                    operation: operation.to_owned(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let error_text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&error_text)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StorageError::Auth {
                operation: operation.to_owned(),
                reason: message,
            },
            StatusCode::NOT_FOUND => StorageError::NotFound {
                what: format!("{operation}: {message}"),
            },
            _ => StorageError::Api {
                operation: operation.to_owned(),
                status: status.as_u16(),
                message,
            },
        })
    }

    async fn json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        req: RequestBuilder,
    ) -> Result<T, StorageError> {
        let resp = self.send(operation, req).await?;
        let text = resp.text().await.map_err(|e| StorageError::Network {
            operation: operation.to_owned(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| StorageError::InvalidResponse {
            operation: operation.to_owned(),
            reason: e.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl CollectionBackend for GistBackend {
    async fn list_collections(&self) -> Result<Vec<Collection>, StorageError> {
        let mut collections = Vec::new();

        for page in 1_usize.. {
            let req = self
                .client
                .get(self.url("/gists"))
                .query(&[("per_page", PAGE_SIZE), ("page", page)]);
            let gists: Vec<GistResponse> = self.json("list gists", self.authed(req)).await?;
            let count = gists.len();
            collections.extend(gists.into_iter().map(Collection::from));

            if count < PAGE_SIZE {
                break;
            }
        }

        debug!(count = collections.len(), "listed gists");
        Ok(collections)
    }

    async fn get_collection(&self, id: &str) -> Result<Collection, StorageError> {
        let req = self.client.get(self.url(&format!("/gists/{id}")));
        let gist: GistResponse = self.json("get gist", self.authed(req)).await?;
        Ok(gist.into())
    }

    async fn fetch_file_content(&self, file: &FileRef) -> Result<Vec<u8>, StorageError> {
        // Raw URLs of secret gists are capability URLs served from a
        // different host; they are fetched without account credentials.
        let req = self.client.get(&file.raw_url);
        let resp = self.send("fetch gist file", req).await?;
        let bytes = resp.bytes().await.map_err(|e| StorageError::Network {
            operation: "fetch gist file".to_owned(),
            reason: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }

    async fn create_collection(&self, files: FileContents) -> Result<Collection, StorageError> {
        let body = CreateRequest {
            description: GIST_DESCRIPTION,
            public: false,
            files: file_bodies(files),
        };
        let req = self.client.post(self.url("/gists")).json(&body);
        let gist: GistResponse = self.json("create gist", self.authed(req)).await?;
        debug!(id = %gist.id, "created gist");
        Ok(gist.into())
    }

    async fn update_collection(
        &self,
        id: &str,
        files: FileContents,
    ) -> Result<Collection, StorageError> {
        let body = UpdateRequest {
            files: file_bodies(files),
        };
        let req = self
            .client
            .patch(self.url(&format!("/gists/{id}")))
            .json(&body);
        let gist: GistResponse = self.json("update gist", self.authed(req)).await?;
        Ok(gist.into())
    }

    async fn delete_collection(&self, id: &str) -> Result<(), StorageError> {
        let req = self.client.delete(self.url(&format!("/gists/{id}")));
        self.send("delete gist", self.authed(req)).await?;
        debug!(id = %id, "deleted gist");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::{Query, State};
    use axum::http::HeaderMap;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    use super::*;

    /// Serve `app` on an ephemeral local port and return its base URL.
    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn backend(api_url: &str) -> GistBackend {
        let mut config = GistConfig::new("alice", "pw");
        config.api_url = api_url.to_owned();
        GistBackend::new(config).unwrap()
    }

    fn gists(prefix: &str, count: usize) -> serde_json::Value {
        (0..count)
            .map(|i| json!({ "id": format!("{prefix}-{i}"), "files": {} }))
            .collect()
    }

    #[test]
    fn config_debug_redacts_password() {
        let config = GistConfig::new("alice", "hunter2");
        let debug = format!("{config:?}");
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn api_url_trailing_slash_is_trimmed() {
        let mut config = GistConfig::new("alice", "pw");
        config.api_url = "https://ghe.example.com/api/v3/".to_owned();
        let backend = GistBackend::new(config).unwrap();
        assert_eq!(
            backend.url("/gists"),
            "https://ghe.example.com/api/v3/gists"
        );
    }

    #[test]
    fn gist_response_maps_to_collection() {
        let json = r#"{
            "id": "abc123",
            "description": "gistvault secret files",
            "files": {
                ".gistvault.json": {
                    "filename": ".gistvault.json",
                    "raw_url": "https://gist.githubusercontent.com/u/abc123/raw/x/.gistvault.json",
                    "size": 42
                }
            }
        }"#;
        let gist: GistResponse = serde_json::from_str(json).unwrap();
        let collection = Collection::from(gist);
        assert_eq!(collection.id, "abc123");
        assert!(
            collection
                .file(".gistvault.json")
                .unwrap()
                .raw_url
                .ends_with("/.gistvault.json")
        );
    }

    #[test]
    fn create_request_is_private() {
        let files = BTreeMap::from([("a.json".to_owned(), "{}".to_owned())]);
        let body = CreateRequest {
            description: GIST_DESCRIPTION,
            public: false,
            files: file_bodies(files),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["public"], serde_json::json!(false));
        assert_eq!(value["files"]["a.json"]["content"], "{}");
    }

    #[tokio::test]
    async fn rejected_credentials_map_to_auth() {
        let app = Router::new()
            .route(
                "/gists",
                get(|| async {
                    (
                        StatusCode::UNAUTHORIZED,
                        Json(json!({ "message": "Bad credentials" })),
                    )
                }),
            )
            .route(
                "/gists/{id}",
                get(|| async { (StatusCode::FORBIDDEN, Json(json!({ "message": "Forbidden" }))) }),
            );
        let backend = backend(&serve(app).await);

        let err = backend.list_collections().await.unwrap_err();
        assert!(err.is_auth(), "{err:?}");
        assert!(
            matches!(&err, StorageError::Auth { reason, .. } if reason == "Bad credentials"),
            "{err:?}"
        );

        let err = backend.get_collection("abc").await.unwrap_err();
        assert!(err.is_auth(), "{err:?}");
    }

    #[tokio::test]
    async fn other_failures_keep_their_kind() {
        let app = Router::new()
            .route(
                "/gists",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream down") })
                    .post(|| async { "not json" }),
            )
            .route(
                "/gists/{id}",
                get(|| async { (StatusCode::NOT_FOUND, Json(json!({ "message": "Not Found" }))) }),
            );
        let backend = backend(&serve(app).await);

        let err = backend.get_collection("missing").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }), "{err:?}");

        let err = backend.list_collections().await.unwrap_err();
        assert!(
            matches!(&err, StorageError::Api { status: 500, message, .. } if message == "HTTP 500"),
            "{err:?}"
        );
        assert!(!err.is_auth());

        let err = backend.create_collection(BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidResponse { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn slow_responses_time_out() {
        let app = Router::new().route(
            "/gists",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!([]))
            }),
        );
        let mut config = GistConfig::new("alice", "pw");
        config.api_url = serve(app).await;
        config.timeout = Duration::from_millis(100);
        let backend = GistBackend::new(config).unwrap();

        let err = backend.list_collections().await.unwrap_err();
        assert!(matches!(err, StorageError::Timeout { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn listing_follows_pages_until_a_short_one() {
        async fn list(
            State(requests): State<Arc<AtomicUsize>>,
            headers: HeaderMap,
            Query(params): Query<HashMap<String, String>>,
        ) -> impl IntoResponse {
            requests.fetch_add(1, Ordering::SeqCst);
            if !headers.contains_key("authorization") {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            let param = |name: &str, default: usize| {
                params
                    .get(name)
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(default)
            };
            // GitHub's own default page size is 30.
            let count = match param("page", 1) {
                1 => param("per_page", 30),
                2 => 3,
                _ => 0,
            };
            Json(gists(&format!("p{}", param("page", 1)), count)).into_response()
        }

        let requests = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/gists", get(list))
            .with_state(Arc::clone(&requests));

        let collections = backend(&serve(app).await).list_collections().await.unwrap();
        assert_eq!(collections.len(), PAGE_SIZE + 3);
        assert_eq!(collections[0].id, "p1-0");
        assert_eq!(collections[PAGE_SIZE].id, "p2-0");
        assert_eq!(requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn raw_files_are_fetched_without_credentials() {
        async fn raw(headers: HeaderMap) -> impl IntoResponse {
            if headers.contains_key("authorization") {
                (StatusCode::BAD_REQUEST, "credentials sent to raw host").into_response()
            } else {
                r#"{"a":1}"#.into_response()
            }
        }

        let base = serve(Router::new().route("/raw/{file}", get(raw))).await;
        let file = FileRef {
            raw_url: format!("{base}/raw/a.json"),
        };
        let content = backend(&base).fetch_file_content(&file).await.unwrap();
        assert_eq!(content, br#"{"a":1}"#);
    }
}
