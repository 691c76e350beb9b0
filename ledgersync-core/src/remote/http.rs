//! HTTP/JSON client for a LedgerSync blob server.

use crate::remote::{
    DeviceInfo, RemoteFreshness, RemoteRecord, RemoteStore, RemoveDeviceResult, SyncMetadata,
};
use crate::{Result, SyncError};
use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PutSnapshotBody<'a> {
    device_id: &'a str,
    encrypted_data: &'a str,
    data_hash: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterDeviceBody<'a> {
    device_id: &'a str,
    device_name: &'a str,
}

/// Remote store reached over HTTP.
///
/// Routes live under `/api/v1/users/{user}/`; a 404 on a read means "no data".
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: Url,
    api_token: Option<String>,
}

impl HttpRemoteStore {
    pub fn new(base_url: &str, timeout: Duration, api_token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| SyncError::Config(format!("Invalid remote URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::Config(format!(
                "Remote URL '{}' cannot carry a path",
                base_url
            )));
        }

        Ok(Self {
            client,
            base_url,
            api_token,
        })
    }

    fn endpoint(&self, user_id: &str, tail: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::Config("Remote URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["api", "v1", "users", user_id])
            .extend(tail);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Option<reqwest::Response>> {
        let resp = builder
            .send()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_else(|_| "unknown".to_string());
            return Err(SyncError::Transport(format!(
                "Server error {}: {}",
                status, body
            )));
        }
        Ok(Some(resp))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>> {
        match self.send(self.request(Method::GET, url)).await? {
            Some(resp) => resp
                .json::<T>()
                .await
                .map(Some)
                .map_err(|e| SyncError::Transport(format!("Invalid response body: {}", e))),
            None => Ok(None),
        }
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<()> {
        match self.send(self.request(method, url).json(body)).await? {
            Some(_) => Ok(()),
            None => Err(SyncError::Transport("Endpoint not found".to_string())),
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn put(
        &self,
        user_id: &str,
        device_id: &str,
        encrypted_data: &str,
        data_hash: &str,
    ) -> Result<()> {
        let url = self.endpoint(user_id, &["snapshot"])?;
        let body = PutSnapshotBody {
            device_id,
            encrypted_data,
            data_hash,
        };
        self.send_json(Method::PUT, url, &body).await
    }

    async fn get(&self, user_id: &str) -> Result<Option<RemoteRecord>> {
        let url = self.endpoint(user_id, &["snapshot"])?;
        self.get_json(url).await
    }

    async fn get_latest(&self, user_id: &str) -> Result<Option<RemoteFreshness>> {
        let url = self.endpoint(user_id, &["snapshot", "latest"])?;
        self.get_json(url).await
    }

    async fn update_metadata(&self, user_id: &str, metadata: &SyncMetadata) -> Result<()> {
        let url = self.endpoint(user_id, &["metadata"])?;
        self.send_json(Method::PUT, url, metadata).await
    }

    async fn register_device(
        &self,
        user_id: &str,
        device_id: &str,
        device_name: &str,
    ) -> Result<()> {
        let url = self.endpoint(user_id, &["devices"])?;
        let body = RegisterDeviceBody {
            device_id,
            device_name,
        };
        self.send_json(Method::POST, url, &body).await
    }

    async fn list_devices(&self, user_id: &str) -> Result<Vec<DeviceInfo>> {
        let url = self.endpoint(user_id, &["devices"])?;
        Ok(self.get_json(url).await?.unwrap_or_default())
    }

    async fn remove_device(&self, user_id: &str, device_id: &str) -> Result<RemoveDeviceResult> {
        let url = self.endpoint(user_id, &["devices", device_id])?;
        match self.send(self.request(Method::DELETE, url)).await? {
            Some(resp) => resp
                .json::<RemoveDeviceResult>()
                .await
                .map_err(|e| SyncError::Transport(format!("Invalid response body: {}", e))),
            None => Ok(RemoveDeviceResult {
                success: false,
                device_name: None,
                error: Some("Device not found".to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn store(base: &str) -> HttpRemoteStore {
        HttpRemoteStore::new(base, Duration::from_secs(5), None).unwrap()
    }

    /// A request as the server saw it: lowercased head and raw body.
    struct Captured {
        head: String,
        body: Vec<u8>,
    }

    impl Captured {
        fn request_line(&self) -> &str {
            self.head.lines().next().unwrap_or_default()
        }

        fn json(&self) -> Value {
            serde_json::from_slice(&self.body).unwrap()
        }
    }

    /// Answer one request with `status` and `body`, then close.
    async fn serve_once(status: u16, body: &'static str) -> (String, JoinHandle<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let head_end = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client closed before sending headers");
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
            let content_length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while buf.len() < head_end + content_length {
                let n = socket.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client closed mid-body");
                buf.extend_from_slice(&chunk[..n]);
            }

            let response = format!(
                "HTTP/1.1 {} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();

            Captured {
                head,
                body: buf[head_end..head_end + content_length].to_vec(),
            }
        });
        (base, task)
    }

    #[tokio::test]
    async fn missing_snapshot_is_none() {
        let (base, server) = serve_once(404, "").await;
        assert_eq!(store(&base).get("u1").await.unwrap(), None);

        let request = server.await.unwrap();
        assert_eq!(request.request_line(), "get /api/v1/users/u1/snapshot http/1.1");
    }

    #[tokio::test]
    async fn server_error_is_transport_error() {
        let (base, server) = serve_once(500, r#"{"error":"boom"}"#).await;
        match store(&base).get_latest("u1").await {
            Err(SyncError::Transport(message)) => {
                assert!(message.contains("500"), "{}", message);
                assert!(message.contains("boom"), "{}", message);
            }
            other => panic!("expected transport error, got {:?}", other),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn put_sends_camel_case_body_and_token() {
        let (base, server) = serve_once(200, "").await;
        let store =
            HttpRemoteStore::new(&base, Duration::from_secs(5), Some("tok-1".to_string()))
                .unwrap();
        store.put("u1", "device-a", "Y2lwaGVy", "abc123").await.unwrap();

        let request = server.await.unwrap();
        assert_eq!(request.request_line(), "put /api/v1/users/u1/snapshot http/1.1");
        assert!(request.head.contains("authorization: bearer tok-1"));
        assert_eq!(
            request.json(),
            json!({ "deviceId": "device-a", "encryptedData": "Y2lwaGVy", "dataHash": "abc123" })
        );
    }

    #[tokio::test]
    async fn get_parses_record() {
        let (base, server) = serve_once(
            200,
            r#"{"userId":"u1","deviceId":"d1","encryptedData":"AAAA","dataHash":"ff","lastModified":42}"#,
        )
        .await;
        let record = store(&base).get("u1").await.unwrap().unwrap();
        assert_eq!(
            record,
            RemoteRecord {
                user_id: "u1".to_string(),
                device_id: "d1".to_string(),
                encrypted_data: "AAAA".to_string(),
                data_hash: "ff".to_string(),
                last_modified: 42,
            }
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn metadata_and_device_bodies() {
        let (base, server) = serve_once(204, "").await;
        let metadata = SyncMetadata {
            device_id: "d1".to_string(),
            protocol_version: 1,
            last_sync: 7,
        };
        store(&base).update_metadata("u1", &metadata).await.unwrap();
        let request = server.await.unwrap();
        assert_eq!(request.request_line(), "put /api/v1/users/u1/metadata http/1.1");
        assert_eq!(
            request.json(),
            json!({ "deviceId": "d1", "protocolVersion": 1, "lastSync": 7 })
        );

        let (base, server) = serve_once(200, "").await;
        store(&base)
            .register_device("u1", "d1", "Chrome on macOS")
            .await
            .unwrap();
        let request = server.await.unwrap();
        assert_eq!(request.request_line(), "post /api/v1/users/u1/devices http/1.1");
        assert_eq!(
            request.json(),
            json!({ "deviceId": "d1", "deviceName": "Chrome on macOS" })
        );
    }

    #[tokio::test]
    async fn removing_unknown_device_reports_failure() {
        let (base, server) = serve_once(404, "").await;
        let result = store(&base).remove_device("u1", "gone").await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Device not found"));

        let request = server.await.unwrap();
        assert_eq!(
            request.request_line(),
            "delete /api/v1/users/u1/devices/gone http/1.1"
        );
    }

    #[test]
    fn endpoints_are_nested_under_user() {
        let store = store("https://sync.example.com/");
        let url = store.endpoint("user-1", &["snapshot", "latest"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sync.example.com/api/v1/users/user-1/snapshot/latest"
        );
    }

    #[test]
    fn base_path_is_kept() {
        let store = store("https://example.com/ledger");
        let url = store.endpoint("u", &["devices"]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/ledger/api/v1/users/u/devices");
    }

    #[test]
    fn path_segments_are_escaped() {
        let store = store("https://example.com");
        let url = store.endpoint("a/b", &["devices", "dev 1"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/api/v1/users/a%2Fb/devices/dev%201"
        );
    }

    #[test]
    fn invalid_url_is_config_error() {
        assert!(matches!(
            HttpRemoteStore::new("not a url", Duration::from_secs(1), None),
            Err(SyncError::Config(_))
        ));
        assert!(matches!(
            HttpRemoteStore::new("mailto:a@example.com", Duration::from_secs(1), None),
            Err(SyncError::Config(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        let store = store("http://127.0.0.1:9");
        assert!(matches!(
            store.get_latest("u").await,
            Err(SyncError::Transport(_))
        ));
    }
}
