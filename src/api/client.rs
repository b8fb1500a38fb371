use crate::core::config::TransmissionConfig;
use crate::core::error::ClientError;
use crate::models::torrent::{normalize_info_hash, TorrentSnapshot};
use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

/// CSRF token header used by Transmission
pub const SESSION_HEADER: &str = "X-Transmission-Session-Id";

const TORRENT_FIELDS: &[&str] = &[
    "id",
    "name",
    "hashString",
    "labels",
    "addedDate",
    "percentDone",
    "doneDate",
    "rateDownload",
    "peersConnected",
];

/// Operations the janitor needs from a download client
pub trait TorrentClient {
    fn list_torrents(&self) -> impl Future<Output = Result<Vec<TorrentSnapshot>, ClientError>> + Send;

    /// Remove by info hash. With `delete_data` false the downloaded files stay on disk.
    fn remove_torrent(
        &self,
        removal_key: &str,
        delete_data: bool,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// Client for the Transmission JSON RPC endpoint
pub struct TransmissionClient {
    client: reqwest::Client,
    endpoint: String,
    credentials: Option<(String, String)>,
    session_id: Mutex<Option<String>>,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a, A> {
    method: &'a str,
    arguments: A,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<A> {
    result: String,
    arguments: Option<A>,
}

#[derive(Debug, Serialize)]
struct TorrentGetArguments<'a> {
    fields: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct TorrentGetResult {
    torrents: Vec<RpcTorrent>,
}

#[derive(Debug, Serialize)]
struct TorrentRemoveArguments<'a> {
    ids: [&'a str; 1],
    #[serde(rename = "delete-local-data")]
    delete_local_data: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTorrent {
    id: u32,
    // Fields may be absent or null; either falls back to the default
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    hash_string: Option<String>,
    #[serde(default)]
    labels: Option<Vec<String>>,
    #[serde(default)]
    added_date: Option<i64>,
    #[serde(default)]
    percent_done: Option<f64>,
    #[serde(default)]
    done_date: Option<i64>,
    #[serde(default)]
    rate_download: Option<u64>,
    #[serde(default)]
    peers_connected: Option<u32>,
}

impl From<RpcTorrent> for TorrentSnapshot {
    fn from(torrent: RpcTorrent) -> Self {
        // Transmission reports 0 for dates it does not know
        let known = |date: Option<i64>| date.filter(|d| *d > 0);

        TorrentSnapshot {
            id: torrent.id,
            name: torrent.name.unwrap_or_default(),
            labels: torrent.labels.unwrap_or_default().into_iter().collect(),
            added_at: known(torrent.added_date),
            completion_fraction: torrent.percent_done.unwrap_or_default(),
            completed_at: known(torrent.done_date),
            download_rate: torrent.rate_download.unwrap_or_default(),
            connected_peers: torrent.peers_connected.unwrap_or_default(),
            removal_key: torrent.hash_string.as_deref().and_then(normalize_info_hash),
        }
    }
}

impl TransmissionClient {
    pub fn new(
        endpoint: String,
        credentials: Option<(String, String)>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            credentials,
            session_id: Mutex::new(None),
        })
    }

    pub fn from_config(config: &TransmissionConfig) -> Result<Self> {
        let credentials = if config.username.is_empty() {
            None
        } else {
            Some((config.username.clone(), config.password.clone()))
        };

        Self::new(config.rpc_url(), credentials, Duration::from_secs(config.timeout_secs))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn session_id(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_session_id(&self, id: String) {
        *self
            .session_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(id);
    }

    async fn post<B: Serialize>(&self, body: &B) -> Result<reqwest::Response, ClientError> {
        let mut request = self.client.post(&self.endpoint).json(body);

        if let Some(id) = self.session_id() {
            request = request.header(SESSION_HEADER, id);
        }

        if let Some((username, password)) = &self.credentials {
            request = request.basic_auth(username, Some(password));
        }

        request
            .send()
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))
    }

    /// Send one RPC call, performing the session id handshake if the server asks for it
    async fn call<A, R>(&self, method: &str, arguments: A) -> Result<Option<R>, ClientError>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let body = RpcRequest { method, arguments };
        let mut response = self.post(&body).await?;

        if response.status() == StatusCode::CONFLICT {
            let session_id = response
                .headers()
                .get(SESSION_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
                .ok_or_else(|| {
                    ClientError::Protocol("409 Conflict without a session id header".to_string())
                })?;

            tracing::debug!("Refreshed Transmission session id");
            self.set_session_id(session_id);
            response = self.post(&body).await?;
        }

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ClientError::Connection(format!(
                    "authentication failed: {}",
                    response.status()
                )));
            }
            status if !status.is_success() => {
                return Err(ClientError::Protocol(format!(
                    "RPC endpoint returned error status: {}",
                    status
                )));
            }
            _ => {}
        }

        let rpc = response
            .json::<RpcResponse<R>>()
            .await
            .map_err(|e| ClientError::Protocol(format!("Failed to parse RPC response: {}", e)))?;

        if rpc.result != "success" {
            return Err(ClientError::Rejected(rpc.result));
        }

        Ok(rpc.arguments)
    }
}

impl TorrentClient for TransmissionClient {
    async fn list_torrents(&self) -> Result<Vec<TorrentSnapshot>, ClientError> {
        let result: TorrentGetResult = self
            .call(
                "torrent-get",
                TorrentGetArguments {
                    fields: TORRENT_FIELDS,
                },
            )
            .await?
            .ok_or_else(|| ClientError::Protocol("torrent-get returned no arguments".to_string()))?;

        Ok(result.torrents.into_iter().map(TorrentSnapshot::from).collect())
    }

    async fn remove_torrent(&self, removal_key: &str, delete_data: bool) -> Result<(), ClientError> {
        self.call::<_, serde_json::Value>(
            "torrent-remove",
            TorrentRemoveArguments {
                ids: [removal_key],
                delete_local_data: delete_data,
            },
        )
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const SESSION: &str = "session-abc123";
    const HASH: &str = "AABBCCDDEEFF00112233445566778899AABBCCDD";

    #[derive(Clone, Default)]
    struct MockTransmission {
        requests: Arc<std::sync::Mutex<Vec<Value>>>,
        conflicts: Arc<AtomicUsize>,
    }

    async fn rpc(
        State(mock): State<MockTransmission>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Response {
        let session = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok());
        if session != Some(SESSION) {
            mock.conflicts.fetch_add(1, Ordering::SeqCst);
            return (AxumStatus::CONFLICT, [(SESSION_HEADER, SESSION)], "").into_response();
        }

        mock.requests.lock().unwrap().push(body.clone());

        match body["method"].as_str() {
            Some("torrent-get") => Json(json!({
                "result": "success",
                "arguments": {
                    "torrents": [
                        {
                            "id": 1,
                            "name": "complete.iso",
                            "hashString": HASH,
                            "labels": ["keep"],
                            "addedDate": 1700000000,
                            "percentDone": 1.0,
                            "doneDate": 1700003600,
                            "rateDownload": 0,
                            "peersConnected": 2
                        },
                        {
                            "id": 2,
                            "name": "fresh.iso",
                            "hashString": "",
                            "labels": [],
                            "addedDate": 1700000000,
                            "percentDone": 0.25,
                            "doneDate": 0,
                            "rateDownload": 2048,
                            "peersConnected": 0
                        }
                    ]
                }
            }))
            .into_response(),
            Some("torrent-remove") => Json(json!({ "result": "success", "arguments": {} })).into_response(),
            _ => Json(json!({ "result": "method name not recognized" })).into_response(),
        }
    }

    async fn spawn_mock(mock: MockTransmission) -> String {
        let app = Router::new()
            .route("/transmission/rpc", post(rpc))
            .with_state(mock);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/transmission/rpc", addr)
    }

    fn client(endpoint: String) -> TransmissionClient {
        TransmissionClient::new(endpoint, None, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_client_from_config() {
        let config = TransmissionConfig {
            host: "10.0.0.2".to_string(),
            port: 9091,
            rpc_path: "/transmission/rpc".to_string(),
            username: String::new(),
            password: String::new(),
            timeout_secs: 30,
        };
        let client = TransmissionClient::from_config(&config).unwrap();
        assert_eq!(client.endpoint(), "http://10.0.0.2:9091/transmission/rpc");
        assert!(client.credentials.is_none());
    }

    #[test]
    fn test_remove_request_serialization() {
        let body = RpcRequest {
            method: "torrent-remove",
            arguments: TorrentRemoveArguments {
                ids: ["aabb"],
                delete_local_data: false,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            json!({
                "method": "torrent-remove",
                "arguments": { "ids": ["aabb"], "delete-local-data": false }
            })
        );
    }

    #[tokio::test]
    async fn test_list_torrents_with_session_handshake() {
        let mock = MockTransmission::default();
        let client = client(spawn_mock(mock.clone()).await);

        let torrents = client.list_torrents().await.unwrap();
        assert_eq!(torrents.len(), 2);
        assert_eq!(mock.conflicts.load(Ordering::SeqCst), 1);

        let complete = &torrents[0];
        assert_eq!(complete.id, 1);
        assert!(complete.is_complete());
        assert_eq!(complete.completed_at, Some(1_700_003_600));
        assert!(complete.labels.contains("keep"));
        assert_eq!(
            complete.removal_key.as_deref(),
            Some("aabbccddeeff00112233445566778899aabbccdd")
        );

        let fresh = &torrents[1];
        assert_eq!(fresh.completed_at, None);
        assert_eq!(fresh.removal_key, None);
        assert_eq!(fresh.download_rate, 2048);
        assert_eq!(fresh.connected_peers, 0);

        let requests = mock.requests.lock().unwrap();
        assert_eq!(requests[0]["method"], "torrent-get");
        assert!(requests[0]["arguments"]["fields"]
            .as_array()
            .unwrap()
            .contains(&json!("hashString")));
    }

    #[tokio::test]
    async fn test_null_fields_fall_back_to_defaults() {
        async fn nulls() -> Json<Value> {
            Json(json!({
                "result": "success",
                "arguments": {
                    "torrents": [{
                        "id": 3,
                        "name": null,
                        "hashString": HASH,
                        "labels": null,
                        "addedDate": null,
                        "percentDone": null,
                        "doneDate": null,
                        "rateDownload": null,
                        "peersConnected": null
                    }]
                }
            }))
        }

        let app = Router::new().route("/transmission/rpc", post(nulls));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let client = client(format!("http://{}/transmission/rpc", addr));

        let torrents = client.list_torrents().await.unwrap();
        assert_eq!(torrents.len(), 1);

        let torrent = &torrents[0];
        assert_eq!(torrent.id, 3);
        assert_eq!(torrent.name, "");
        assert!(torrent.labels.is_empty());
        assert_eq!(torrent.added_at, None);
        assert_eq!(torrent.completion_fraction, 0.0);
        assert_eq!(torrent.completed_at, None);
        assert_eq!(torrent.download_rate, 0);
        assert_eq!(torrent.connected_peers, 0);
        assert!(torrent.removal_key.is_some());
    }

    #[tokio::test]
    async fn test_session_id_is_reused() {
        let mock = MockTransmission::default();
        let client = client(spawn_mock(mock.clone()).await);

        client.list_torrents().await.unwrap();
        client.list_torrents().await.unwrap();

        assert_eq!(mock.conflicts.load(Ordering::SeqCst), 1);
        assert_eq!(mock.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_torrent_keeps_data() {
        let mock = MockTransmission::default();
        let client = client(spawn_mock(mock.clone()).await);

        client
            .remove_torrent("aabbccddeeff00112233445566778899aabbccdd", false)
            .await
            .unwrap();

        let requests = mock.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0]["method"], "torrent-remove");
        assert_eq!(requests[0]["arguments"]["delete-local-data"], json!(false));
        assert_eq!(
            requests[0]["arguments"]["ids"],
            json!(["aabbccddeeff00112233445566778899aabbccdd"])
        );
    }

    #[tokio::test]
    async fn test_rejected_result() {
        let app = Router::new().route(
            "/transmission/rpc",
            post(|| async { Json(json!({ "result": "invalid or corrupt torrent file" })) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = client(format!("http://{}/transmission/rpc", addr));
        let err = client.remove_torrent("aabb", false).await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected(ref msg) if msg == "invalid or corrupt torrent file"));
    }

    #[tokio::test]
    async fn test_unauthorized_is_connection_error() {
        let app = Router::new().route(
            "/transmission/rpc",
            post(|| async { AxumStatus::UNAUTHORIZED }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = client(format!("http://{}/transmission/rpc", addr));
        let err = client.list_torrents().await.unwrap_err();
        assert!(matches!(err, ClientError::Connection(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        // Bind then drop to get a port with nothing listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client(format!("http://{}/transmission/rpc", addr));
        let err = client.list_torrents().await.unwrap_err();
        assert!(matches!(err, ClientError::Connection(_)));
    }
}
