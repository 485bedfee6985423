/// HTTP client for the gateway, with bounded retries.
use std::time::Duration;

use {
    chrono::{DateTime, SecondsFormat, Utc},
    persisto_memory::{Metadata, QueryLogEntry, RankedHit},
    reqwest::{
        Method, RequestBuilder, StatusCode,
        header::{HeaderMap, RETRY_AFTER},
    },
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    tracing::{debug, warn},
};

use crate::error::{ClientError, Result};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
/// Environment variable read for the base URL when none is given.
pub const API_URL_ENV: &str = "PERSISTO_API_URL";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

pub struct PersistoClient {
    client: reqwest::Client,
    api_key: Secret<String>,
    base_url: String,
    timeout: Duration,
    retries: u32,
    backoff: Duration,
}

/// Body of a successful `/memory/save`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SaveResponse {
    pub status: String,
    pub fragments: usize,
    pub ids: Vec<String>,
}

/// Body of a successful `/memory/delete`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeleteResponse {
    pub status: String,
    pub count: u64,
}

#[derive(Serialize)]
struct SaveRequest<'a> {
    namespace: &'a str,
    content: &'a str,
    metadata: &'a Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl_seconds: Option<u64>,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    namespace: &'a str,
    query: &'a str,
    filters: &'a Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    mode: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    k: Option<usize>,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    namespace: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a Metadata>,
}

#[derive(Deserialize)]
struct QueryResponse {
    results: Vec<RankedHit>,
}

#[derive(Deserialize)]
struct NamespacesResponse {
    #[serde(default)]
    namespaces: Vec<String>,
}

#[derive(Deserialize)]
struct QueriesResponse {
    #[serde(default)]
    queries: Vec<QueryLogEntry>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    code: Option<String>,
}

impl PersistoClient {
    /// Client for the gateway at `$PERSISTO_API_URL`, falling back to
    /// [`DEFAULT_BASE_URL`].
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ClientError::MissingApiKey);
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key: Secret::new(api_key),
            base_url: resolve_base_url(|name| std::env::var(name).ok()),
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            backoff: DEFAULT_BACKOFF,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Extra attempts after the first one. `0` disables retrying.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// First retry delay; doubled after every retry.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn save(
        &self,
        namespace: &str,
        content: &str,
        metadata: &Metadata,
        ttl_seconds: Option<u64>,
    ) -> Result<SaveResponse> {
        let body = SaveRequest {
            namespace,
            content,
            metadata,
            ttl_seconds,
        };
        self.execute(|| self.request(Method::POST, "/memory/save").json(&body))
            .await
    }

    /// `mode` picks a retrieval profile by name and `k` overrides its
    /// result count; the gateway applies its own defaults for `None`.
    pub async fn query(
        &self,
        namespace: &str,
        query: &str,
        filters: &Metadata,
        mode: Option<&str>,
        k: Option<usize>,
    ) -> Result<Vec<RankedHit>> {
        let body = QueryRequest {
            namespace,
            query,
            filters,
            mode,
            k,
        };
        let resp: QueryResponse = self
            .execute(|| self.request(Method::POST, "/memory/query").json(&body))
            .await?;
        Ok(resp.results)
    }

    /// With neither `content` nor `metadata` the whole namespace is cleared.
    /// Deleting nothing surfaces as [`ClientError::NotFound`].
    pub async fn delete(
        &self,
        namespace: &str,
        content: Option<&str>,
        metadata: Option<&Metadata>,
    ) -> Result<DeleteResponse> {
        let body = DeleteRequest {
            namespace,
            content,
            metadata,
        };
        self.execute(|| self.request(Method::DELETE, "/memory/delete").json(&body))
            .await
    }

    pub async fn list_namespaces(&self) -> Result<Vec<String>> {
        let resp: NamespacesResponse = self
            .execute(|| self.request(Method::GET, "/memory/namespaces"))
            .await?;
        Ok(resp.namespaces)
    }

    /// Newest-first query log, optionally narrowed to a namespace and an
    /// inclusive time window.
    pub async fn list_queries(
        &self,
        namespace: Option<&str>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<QueryLogEntry>> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(ns) = namespace {
            params.push(("namespace", ns.to_string()));
        }
        if let Some(start) = start {
            params.push(("start", start.to_rfc3339_opts(SecondsFormat::Millis, true)));
        }
        if let Some(end) = end {
            params.push(("end", end.to_rfc3339_opts(SecondsFormat::Millis, true)));
        }
        let resp: QueriesResponse = self
            .execute(|| self.request(Method::GET, "/memory/queries").query(&params))
            .await?;
        Ok(resp.queries)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .timeout(self.timeout)
    }

    /// Send the request built by `build`, retrying transport failures, 429
    /// and 5xx up to `retries` extra times.
    async fn execute<T: DeserializeOwned>(&self, build: impl Fn() -> RequestBuilder) -> Result<T> {
        let mut attempt = 0u32;
        let mut backoff = self.backoff;

        loop {
            let resp = match build().send().await {
                Ok(resp) => resp,
                Err(source) => {
                    if attempt >= self.retries {
                        return Err(ClientError::Network {
                            attempts: attempt + 1,
                            source,
                        });
                    }
                    warn!(attempt, error = %source, "request failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    continue;
                },
            };

            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt >= self.retries {
                    let (_, message) = error_message(&read_text(resp).await);
                    return Err(ClientError::RateLimited {
                        attempts: attempt + 1,
                        message,
                    });
                }
                let delay = retry_after(resp.headers()).unwrap_or(backoff);
                warn!(attempt, delay_ms = delay.as_millis() as u64, "rate limited, retrying");
                attempt += 1;
                tokio::time::sleep(delay).await;
                backoff = backoff.saturating_mul(2);
                continue;
            }
            if status.is_server_error() {
                if attempt >= self.retries {
                    let (_, message) = error_message(&read_text(resp).await);
                    return Err(ClientError::Server {
                        status: status.as_u16(),
                        attempts: attempt + 1,
                        message,
                    });
                }
                warn!(attempt, status = status.as_u16(), "server error, retrying");
                attempt += 1;
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
                continue;
            }

            let bytes = resp.bytes().await.map_err(|source| ClientError::Network {
                attempts: attempt + 1,
                source,
            })?;

            if status.is_success() {
                debug!(status = status.as_u16(), bytes = bytes.len(), "response");
                let body: &[u8] = if bytes.is_empty() {
                    b"{}"
                } else {
                    &bytes
                };
                return Ok(serde_json::from_slice(body)?);
            }

            let (code, message) = error_message(&String::from_utf8_lossy(&bytes));
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Auth {
                    status: status.as_u16(),
                    message,
                },
                StatusCode::NOT_FOUND => ClientError::NotFound { message },
                _ => ClientError::Rejected {
                    status: status.as_u16(),
                    code,
                    message,
                },
            });
        }
    }
}

fn resolve_base_url(lookup: impl Fn(&str) -> Option<String>) -> String {
    lookup(API_URL_ENV)
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// `Retry-After` in delta-seconds form. HTTP dates are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok().map(Duration::from_secs)
}

async fn read_text(resp: reqwest::Response) -> String {
    resp.text().await.unwrap_or_default()
}

/// The gateway answers errors with `{"error": .., "code": ..}`; anything
/// else is passed through as-is.
fn error_message(body: &str) -> (Option<String>, String) {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => (parsed.code, parsed.error),
        Err(_) => (None, body.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        mockito::{Matcher, ServerGuard},
        persisto_memory::MetadataValue,
        serde_json::json,
        std::time::Instant,
    };

    fn client(server: &ServerGuard) -> PersistoClient {
        PersistoClient::new("pk-test")
            .unwrap()
            .with_base_url(server.url())
            .with_backoff(Duration::from_millis(1))
    }

    fn meta(pairs: &[(&str, MetadataValue)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(matches!(
            PersistoClient::new(""),
            Err(ClientError::MissingApiKey)
        ));
        assert!(matches!(
            PersistoClient::new("   "),
            Err(ClientError::MissingApiKey)
        ));
    }

    #[test]
    fn base_url_from_env_or_default() {
        assert_eq!(resolve_base_url(|_| None), DEFAULT_BASE_URL);
        assert_eq!(resolve_base_url(|_| Some(" ".into())), DEFAULT_BASE_URL);
        assert_eq!(
            resolve_base_url(|name| (name == API_URL_ENV).then(|| "https://mem.example/".into())),
            "https://mem.example"
        );
        let c = PersistoClient::new("k")
            .unwrap()
            .with_base_url("http://localhost:9000//");
        assert_eq!(c.base_url(), "http://localhost:9000");
    }

    #[test]
    fn retry_after_accepts_only_delta_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));
        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, "-1".parse().unwrap());
        assert_eq!(retry_after(&headers), None);
    }

    #[tokio::test]
    async fn save_and_query_round_trip() {
        let mut server = mockito::Server::new_async().await;
        let save = server
            .mock("POST", "/memory/save")
            .match_header("authorization", "Bearer pk-test")
            .match_body(Matcher::Json(json!({
                "namespace": "notes",
                "content": "rust ownership",
                "metadata": {"lang": "en", "stars": 3},
                "ttl_seconds": 60,
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"saved","fragments":1,"ids":["f1"]}"#)
            .create_async()
            .await;
        let query = server
            .mock("POST", "/memory/query")
            .match_header("authorization", "Bearer pk-test")
            .match_body(Matcher::Json(json!({
                "namespace": "notes",
                "query": "ownership",
                "filters": {},
                "mode": "fuzzy",
                "k": 2,
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"results": [{
                    "id": "f1",
                    "content": "rust ownership",
                    "metadata": {"lang": "en", "stars": 3},
                    "created_at": "2024-05-01T12:00:00Z",
                    "similarity": 0.9,
                    "score": 0.85,
                }]})
                .to_string(),
            )
            .create_async()
            .await;

        let c = client(&server);
        let metadata = meta(&[("lang", "en".into()), ("stars", 3i64.into())]);
        let saved = c
            .save("notes", "rust ownership", &metadata, Some(60))
            .await
            .unwrap();
        assert_eq!(saved.fragments, 1);
        assert_eq!(saved.ids, vec!["f1".to_string()]);

        let hits = c
            .query("notes", "ownership", &Metadata::new(), Some("fuzzy"), Some(2))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "f1");
        assert_eq!(hits[0].metadata, metadata);
        assert_eq!(hits[0].score, 0.85);

        save.assert_async().await;
        query.assert_async().await;
    }

    #[tokio::test]
    async fn optional_fields_are_omitted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/memory/delete")
            .match_body(Matcher::Json(json!({"namespace": "notes"})))
            .with_status(200)
            .with_body(r#"{"status":"deleted","count":4}"#)
            .create_async()
            .await;

        let deleted = client(&server).delete("notes", None, None).await.unwrap();
        assert_eq!(deleted.count, 4);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn list_routes_unwrap_envelopes() {
        let mut server = mockito::Server::new_async().await;
        let namespaces = server
            .mock("GET", "/memory/namespaces")
            .with_status(200)
            .with_body(r#"{"namespaces":["a","b"]}"#)
            .create_async()
            .await;
        let queries = server
            .mock("GET", "/memory/queries")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("namespace".into(), "notes".into()),
                Matcher::UrlEncoded("start".into(), "2024-05-01T00:00:00.000Z".into()),
            ]))
            .with_status(200)
            .with_body(
                json!({"queries": [{
                    "tenant_id": "alice",
                    "namespace": "notes",
                    "query_text": "ownership",
                    "filters": {},
                    "k": 12,
                    "mode": "strict",
                    "timestamp": "2024-05-01T12:00:00Z",
                }]})
                .to_string(),
            )
            .create_async()
            .await;

        let c = client(&server);
        assert_eq!(c.list_namespaces().await.unwrap(), vec!["a", "b"]);

        let start = DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let logged = c.list_queries(Some("notes"), Some(start), None).await.unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].mode, "strict");
        assert_eq!(logged[0].k, 12);

        namespaces.assert_async().await;
        queries.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_is_auth_error_without_retry() {
        for status in [401, 403] {
            let mut server = mockito::Server::new_async().await;
            let mock = server
                .mock("GET", "/memory/namespaces")
                .with_status(status)
                .with_body(r#"{"error":"invalid api key","code":"unauthorized"}"#)
                .expect(1)
                .create_async()
                .await;

            let err = client(&server).list_namespaces().await.unwrap_err();
            match err {
                ClientError::Auth { status: s, message } => {
                    assert_eq!(s, status as u16);
                    assert_eq!(message, "invalid api key");
                },
                other => panic!("expected auth error, got {other}"),
            }
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/memory/query")
            .with_status(404)
            .with_body(r#"{"error":"namespace not found: gone","code":"not_found"}"#)
            .expect(1)
            .create_async()
            .await;

        let err = client(&server)
            .query("gone", "anything", &Metadata::new(), None, None)
            .await
            .unwrap_err();
        assert!(
            matches!(&err, ClientError::NotFound { message } if message.contains("gone")),
            "got {err}"
        );
        assert_eq!(err.status(), Some(404));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn bad_request_keeps_error_code() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/memory/save")
            .with_status(400)
            .with_body(r#"{"error":"invalid filter key: \"a b\"","code":"invalid_filter_key"}"#)
            .expect(1)
            .create_async()
            .await;

        let err = client(&server)
            .save("ns", "x", &meta(&[("a b", 1i64.into())]), None)
            .await
            .unwrap_err();
        match err {
            ClientError::Rejected { status, code, .. } => {
                assert_eq!(status, 400);
                assert_eq!(code.as_deref(), Some("invalid_filter_key"));
            },
            other => panic!("expected rejection, got {other}"),
        }
    }

    #[tokio::test]
    async fn rate_limit_honours_retry_after_then_succeeds() {
        let mut server = mockito::Server::new_async().await;
        let limited = server
            .mock("GET", "/memory/namespaces")
            .with_status(429)
            .with_header("retry-after", "1")
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("GET", "/memory/namespaces")
            .with_status(200)
            .with_body(r#"{"namespaces":["a"]}"#)
            .expect(1)
            .create_async()
            .await;

        let started = Instant::now();
        let namespaces = client(&server).list_namespaces().await.unwrap();
        assert_eq!(namespaces, vec!["a"]);
        // The configured backoff is 1ms, so the wait came from the header.
        assert!(started.elapsed() >= Duration::from_secs(1));

        limited.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limit_exhausts_retries() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/memory/namespaces")
            .with_status(429)
            .with_body(r#"{"error":"slow down","code":"rate_limited"}"#)
            .expect(3)
            .create_async()
            .await;

        let err = client(&server)
            .with_retries(2)
            .list_namespaces()
            .await
            .unwrap_err();
        assert!(
            matches!(&err, ClientError::RateLimited { attempts: 3, message } if message == "slow down"),
            "got {err}"
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_errors_retry_until_exhausted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/memory/save")
            .with_status(502)
            .with_body(r#"{"error":"upstream unavailable","code":"upstream_unavailable"}"#)
            .expect(4)
            .create_async()
            .await;

        let err = client(&server)
            .save("ns", "x", &Metadata::new(), None)
            .await
            .unwrap_err();
        match err {
            ClientError::Server {
                status, attempts, ..
            } => assert_eq!((status, attempts), (502, DEFAULT_RETRIES + 1)),
            other => panic!("expected server error, got {other}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_then_success() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/memory/namespaces")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;
        let ok = server
            .mock("GET", "/memory/namespaces")
            .with_status(200)
            .with_body(r#"{"namespaces":[]}"#)
            .expect(1)
            .create_async()
            .await;

        assert!(client(&server).list_namespaces().await.unwrap().is_empty());
        failing.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn network_errors_retry_then_fail() {
        // Grab a free port and release it so connections are refused.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let err = PersistoClient::new("pk-test")
            .unwrap()
            .with_base_url(format!("http://127.0.0.1:{port}"))
            .with_backoff(Duration::from_millis(1))
            .with_retries(1)
            .list_namespaces()
            .await
            .unwrap_err();
        assert!(
            matches!(err, ClientError::Network { attempts: 2, .. }),
            "got {err}"
        );
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn empty_success_body_lists_nothing() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/memory/namespaces")
            .with_status(204)
            .create_async()
            .await;

        assert!(client(&server).list_namespaces().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_success_body_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/memory/query")
            .with_status(200)
            .with_body("<html>proxy</html>")
            .create_async()
            .await;

        let err = client(&server)
            .query("ns", "q", &Metadata::new(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)), "got {err}");
    }
}
