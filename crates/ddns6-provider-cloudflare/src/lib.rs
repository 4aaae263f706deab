// # Cloudflare DNS Provider
//
// Cloudflare API v4 implementation of `DnsProvider`.
//
// ## Behavior
//
// - One HTTP request per trait call: a filtered list or a single PUT
// - Every error is returned to the caller; retry and backoff belong to the
//   pipeline's `RetryScheduler`
// - Records are never created; an empty list is reported as-is
// - The update body carries the listed record's `ttl` and `proxied` so only the
//   content changes
// - Dry-run mode performs reads but only logs the PUT it would send
//
// ## Error Mapping
//
// | Response                         | Error                          |
// |----------------------------------|--------------------------------|
// | 401, 403                         | `Error::Authentication`        |
// | 404                              | `Error::Config` (unknown zone) |
// | 429, 5xx, other statuses         | `Error::Provider`              |
// | network failure                  | `Error::Http`                  |
// | `"success": false` envelope      | `Error::Provider`              |
//
// ## Security Requirements
//
// - API token NEVER appears in logs or `Debug` output
// - Provider MUST fail fast if token is empty
//
// ## API Reference
//
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=...&type=...`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use ddns6_core::{DnsProvider, DnsRecord, Error, Result};
use reqwest::StatusCode;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// TTL value Cloudflare treats as "automatic"
const AUTOMATIC_TTL: u32 = 1;

const PROVIDER: &str = "cloudflare";

/// Response envelope shared by every v4 endpoint
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    message: String,
}

/// PUT body: the listed record with new content
#[derive(Debug, Serialize)]
struct UpdateBody<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxied: Option<bool>,
}

impl<'a> UpdateBody<'a> {
    fn new(record: &'a DnsRecord, content: &'a str) -> Self {
        Self {
            record_type: &record.record_type,
            name: &record.name,
            content,
            ttl: record.ttl.unwrap_or(AUTOMATIC_TTL),
            proxied: record.proxied,
        }
    }
}

/// Cloudflare DNS provider
///
/// Stateless between calls. In dry-run mode `update_record` logs the request
/// it would have sent and reports success.
pub struct CloudflareProvider {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// API root, without trailing slash
    base_url: String,

    client: reqwest::Client,

    /// Dry-run mode: if true, perform GET requests but skip PUT updates
    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a provider talking to the public Cloudflare API
    ///
    /// `api_token` needs Zone:DNS:Edit permission on the managed zone.
    pub fn new(api_token: impl Into<String>, dry_run: bool) -> Result<Self> {
        Self::with_base_url(api_token, CLOUDFLARE_API_BASE, dry_run)
    }

    /// Create a provider against a different API root
    pub fn with_base_url(
        api_token: impl Into<String>,
        base_url: impl Into<String>,
        dry_run: bool,
    ) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            dry_run,
        })
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn records_url(&self, zone_id: &str) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, zone_id)
    }

    /// Send one request and unwrap the v4 envelope
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<T> {
        let response = request
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::http(format!("{}: {}", context, e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, context, &body));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("{}: malformed response: {}", context, e)))?;

        if !envelope.success {
            return Err(Error::provider(
                PROVIDER,
                format!("{}: {}", context, describe(&envelope.errors)),
            ));
        }

        envelope
            .result
            .ok_or_else(|| Error::provider(PROVIDER, format!("{}: response has no result", context)))
    }
}

/// Map a non-2xx status to an error class
fn status_error(status: StatusCode, context: &str, body: &str) -> Error {
    let detail = serde_json::from_str::<Envelope<IgnoredAny>>(body)
        .map(|envelope| describe(&envelope.errors))
        .unwrap_or_else(|_| body.trim().to_string());

    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "{}: invalid API token or insufficient permissions ({})",
            context, status
        )),
        404 => Error::config(format!("{}: zone or record not found ({})", context, status)),
        429 => Error::provider(PROVIDER, format!("{}: rate limited ({})", context, status)),
        500..=599 => Error::provider(
            PROVIDER,
            format!("{}: server error ({}) {}", context, status, detail),
        ),
        _ => Error::provider(PROVIDER, format!("{}: {} {}", context, status, detail)),
    }
}

fn describe(errors: &[ApiMessage]) -> String {
    if errors.is_empty() {
        return "request unsuccessful".to_string();
    }
    errors
        .iter()
        .map(|e| format!("{} (code {})", e.message, e.code))
        .collect::<Vec<_>>()
        .join("; ")
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn list_records(
        &self,
        zone_id: &str,
        name: &str,
        record_type: &str,
    ) -> Result<Vec<DnsRecord>> {
        tracing::debug!("Listing {} records for {}", record_type, name);

        let request = self
            .client
            .get(self.records_url(zone_id))
            .query(&[("name", name), ("type", record_type)]);

        let records: Vec<DnsRecord> = self.send(request, "list DNS records").await?;
        tracing::debug!("Cloudflare returned {} record(s) for {}", records.len(), name);
        Ok(records)
    }

    async fn update_record(&self, zone_id: &str, record: &DnsRecord, content: &str) -> Result<()> {
        let url = format!("{}/{}", self.records_url(zone_id), record.id);
        let body = UpdateBody::new(record, content);

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send PUT {} with payload: {}",
                url,
                serde_json::to_string(&body)?
            );
            return Ok(());
        }

        let request = self.client.put(&url).json(&body);
        let _: IgnoredAny = self.send(request, "update DNS record").await?;

        tracing::debug!("Cloudflare accepted {} -> {}", record.name, content);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query, State};
    use axum::http::HeaderMap;
    use axum::routing::{get, put};
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    const TOKEN: &str = "secret_token_12345";

    /// Canned Cloudflare API on loopback
    #[derive(Default)]
    struct MockApi {
        list_reply: Mutex<Option<(StatusCode, Value)>>,
        put_reply: Mutex<Option<(StatusCode, Value)>>,
        queries: Mutex<Vec<HashMap<String, String>>>,
        puts: Mutex<Vec<(String, Value)>>,
        authorizations: Mutex<Vec<String>>,
    }

    impl MockApi {
        fn reply_list(&self, status: StatusCode, body: Value) {
            *self.list_reply.lock().unwrap() = Some((status, body));
        }

        fn reply_put(&self, status: StatusCode, body: Value) {
            *self.put_reply.lock().unwrap() = Some((status, body));
        }

        fn record_auth(&self, headers: &HeaderMap) {
            let value = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            self.authorizations.lock().unwrap().push(value);
        }
    }

    fn ok(result: Value) -> (StatusCode, Value) {
        (
            StatusCode::OK,
            json!({ "success": true, "errors": [], "messages": [], "result": result }),
        )
    }

    async fn list_handler(
        State(api): State<Arc<MockApi>>,
        Path(zone): Path<String>,
        headers: HeaderMap,
        Query(query): Query<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        assert_eq!(zone, "zone-123");
        api.record_auth(&headers);
        api.queries.lock().unwrap().push(query);
        let (status, body) = api.list_reply.lock().unwrap().clone().unwrap_or_else(|| ok(json!([])));
        (status, Json(body))
    }

    async fn put_handler(
        State(api): State<Arc<MockApi>>,
        Path((zone, id)): Path<(String, String)>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        assert_eq!(zone, "zone-123");
        api.record_auth(&headers);
        api.puts.lock().unwrap().push((id, body.clone()));
        let (status, reply) = api.put_reply.lock().unwrap().clone().unwrap_or_else(|| ok(body));
        (status, Json(reply))
    }

    async fn serve(api: Arc<MockApi>) -> String {
        let router = Router::new()
            .route("/zones/:zone/dns_records", get(list_handler))
            .route("/zones/:zone/dns_records/:id", put(put_handler))
            .with_state(api);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    async fn provider(dry_run: bool) -> (CloudflareProvider, Arc<MockApi>) {
        let api = Arc::new(MockApi::default());
        let base = serve(api.clone()).await;
        let provider = CloudflareProvider::with_base_url(TOKEN, base, dry_run).unwrap();
        (provider, api)
    }

    fn record(ttl: Option<u32>, proxied: Option<bool>) -> DnsRecord {
        DnsRecord {
            id: "rec-1".to_string(),
            name: "home.example.com".to_string(),
            record_type: "AAAA".to_string(),
            content: "2001:db8::2".to_string(),
            ttl,
            proxied,
        }
    }

    #[tokio::test]
    async fn test_list_records_sends_filter_and_bearer() {
        let (provider, api) = provider(false).await;
        api.reply_list(
            StatusCode::OK,
            ok(json!([{
                "id": "rec-1",
                "name": "home.example.com",
                "type": "AAAA",
                "content": "2001:db8::2",
                "ttl": 300,
                "proxied": false,
                "zone_id": "zone-123"
            }]))
            .1,
        );

        let records = provider
            .list_records("zone-123", "home.example.com", "AAAA")
            .await
            .unwrap();

        assert_eq!(records, vec![record(Some(300), Some(false))]);

        let queries = api.queries.lock().unwrap();
        assert_eq!(queries[0].get("name").map(String::as_str), Some("home.example.com"));
        assert_eq!(queries[0].get("type").map(String::as_str), Some("AAAA"));
        assert_eq!(
            api.authorizations.lock().unwrap()[0],
            format!("Bearer {}", TOKEN)
        );
    }

    #[tokio::test]
    async fn test_missing_record_is_empty_list() {
        let (provider, _api) = provider(false).await;
        let records = provider
            .list_records("zone-123", "home.example.com", "AAAA")
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_update_preserves_ttl_and_proxied() {
        let (provider, api) = provider(false).await;

        provider
            .update_record("zone-123", &record(Some(120), Some(true)), "2001:db8::1")
            .await
            .unwrap();

        let puts = api.puts.lock().unwrap();
        assert_eq!(puts.len(), 1);
        let (id, body) = &puts[0];
        assert_eq!(id, "rec-1");
        assert_eq!(
            body,
            &json!({
                "type": "AAAA",
                "name": "home.example.com",
                "content": "2001:db8::1",
                "ttl": 120,
                "proxied": true
            })
        );
    }

    #[tokio::test]
    async fn test_update_without_ttl_uses_automatic() {
        let (provider, api) = provider(false).await;

        provider
            .update_record("zone-123", &record(None, None), "2001:db8::1")
            .await
            .unwrap();

        let puts = api.puts.lock().unwrap();
        assert_eq!(puts[0].1["ttl"], json!(1));
        assert!(puts[0].1.get("proxied").is_none());
    }

    #[tokio::test]
    async fn test_dry_run_skips_put() {
        let (provider, api) = provider(true).await;
        assert!(provider.is_dry_run());

        provider
            .update_record("zone-123", &record(Some(300), None), "2001:db8::1")
            .await
            .unwrap();

        assert!(api.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_token_is_authentication_error() {
        let (provider, api) = provider(false).await;
        api.reply_list(
            StatusCode::FORBIDDEN,
            json!({ "success": false, "errors": [{ "code": 9109, "message": "Invalid access token" }] }),
        );

        let err = provider
            .list_records("zone-123", "home.example.com", "AAAA")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Authentication(_)), "got {:?}", err);
        assert!(!err.is_retryable());
        assert!(!err.to_string().contains(TOKEN));
    }

    #[tokio::test]
    async fn test_rate_limit_and_server_errors_are_retryable() {
        let (provider, api) = provider(false).await;

        api.reply_put(StatusCode::TOO_MANY_REQUESTS, json!({ "success": false }));
        let err = provider
            .update_record("zone-123", &record(Some(300), None), "2001:db8::1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider { .. }), "got {:?}", err);
        assert!(err.is_retryable());

        api.reply_put(StatusCode::BAD_GATEWAY, json!({ "success": false }));
        let err = provider
            .update_record("zone-123", &record(Some(300), None), "2001:db8::1")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unsuccessful_envelope_carries_messages() {
        let (provider, api) = provider(false).await;
        api.reply_put(
            StatusCode::OK,
            json!({
                "success": false,
                "errors": [{ "code": 81057, "message": "Record already exists." }],
                "result": null
            }),
        );

        let err = provider
            .update_record("zone-123", &record(Some(300), None), "2001:db8::1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
        assert!(err.to_string().contains("Record already exists. (code 81057)"));
    }

    #[tokio::test]
    async fn test_unreachable_api_is_http_error() {
        let provider = CloudflareProvider::with_base_url(TOKEN, "http://127.0.0.1:1", false).unwrap();
        let err = provider
            .list_records("zone-123", "home.example.com", "AAAA")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http(_)), "got {:?}", err);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "list", ""),
            Error::Authentication(_)
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "list", ""),
            Error::Config(_)
        ));
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE, "list", "").is_retryable());
    }

    #[test]
    fn test_empty_token_rejected() {
        let err = CloudflareProvider::new("", false).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let provider = CloudflareProvider::new(TOKEN, false).unwrap();

        let debug_str = format!("{:?}", provider);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("CloudflareProvider"));
    }

    #[test]
    fn test_provider_name() {
        let provider = CloudflareProvider::new("token", false).unwrap();
        assert_eq!(provider.provider_name(), "cloudflare");
    }
}
