// # Cloudflare DNS Provider
//
// This crate provides the Cloudflare backend for the fleetdns control plane.
//
// ## Behavior
//
// - One zone per managed domain, looked up by name unless a zone ID is
//   configured
// - Record names are relative at the trait boundary (`@`, `*`, `www`) and
//   FQDNs on the wire; conversion happens here and nowhere else
// - Record listing follows `result_info.total_pages`
// - A create answered with "record already exists" (81057, 81058) falls
//   back to updating the existing record
// - Deleting a record that is already gone succeeds
// - Dry-run mode (`FLEETDNS_MODE=dry-run`) performs reads and logs writes
//
// ## Trust Level: Untrusted (DNS Provider)
//
// **Forbidden Capabilities** (enforced by code review):
// - ❌ Spawn tasks or threads
// - ❌ Implement retry logic (owned by the reconcile worker's next pass)
// - ❌ Access the state store
// - ❌ Cache state beyond a single call
//
// ## Security Requirements
//
// - API token NEVER appears in logs or Debug output
// - Provider MUST fail fast if token is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List Zones: GET `/zones?name=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?page=..&per_page=..`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`
// - Verify Token: GET `/user/tokens/verify`

use async_trait::async_trait;
use fleetdns_core::config::ProviderConfig;
use fleetdns_core::model::{APEX, ProviderRecord, RecordSpec, RecordType, normalize_name};
use fleetdns_core::traits::{DnsProvider, DnsProviderFactory};
use fleetdns_core::{Error, Result};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Records requested per listing page
const PAGE_SIZE: u32 = 100;

/// "An identical record already exists" and "A record with those settings already exists"
const ALREADY_EXISTS_CODES: [u64; 2] = [81057, 81058];

const PROVIDER: &str = "cloudflare";

/// Cloudflare DNS provider
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform all GET requests (zone lookup, record listing)
/// - Log the intended POST/PUT/DELETE payload
/// - **NOT** actually modify DNS records
pub struct CloudflareProvider {
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Zone ID (optional, looked up from the domain otherwise)
    zone_id: Option<String>,

    account_id: Option<String>,

    client: reqwest::Client,

    base_url: String,

    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("account_id", &self.account_id)
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

/// Response envelope shared by every v4 endpoint
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: u64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    page: u32,
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
    #[serde(default)]
    name_servers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CfRecord {
    id: String,
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    content: String,
    #[serde(default)]
    ttl: u32,
    #[serde(default)]
    proxied: Option<bool>,
    #[serde(default)]
    priority: Option<u16>,
}

#[derive(Debug, Serialize)]
struct RecordBody<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: String,
    content: &'a str,
    ttl: u32,
    proxied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct Deleted {
    #[allow(dead_code)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct TokenStatus {
    #[serde(default)]
    status: String,
}

/// Turn a relative record name into the FQDN Cloudflare expects
fn to_fqdn(name: &str, domain: &str) -> String {
    if name == APEX {
        domain.to_string()
    } else {
        format!("{name}.{domain}")
    }
}

/// Turn a Cloudflare FQDN back into a name relative to `domain`
fn to_relative(fqdn: &str, domain: &str) -> String {
    let fqdn = fqdn.trim_end_matches('.').to_ascii_lowercase();
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    if fqdn == domain {
        return APEX.to_string();
    }
    match fqdn.strip_suffix(&format!(".{domain}")) {
        Some(label) => normalize_name(label),
        None => normalize_name(&fqdn),
    }
}

/// Map a non-success HTTP status onto the crate error taxonomy
fn map_status(status: StatusCode, context: &str, body: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::credential(format!(
            "{context}: invalid API token or insufficient permissions ({status})"
        )),
        404 => Error::not_found(format!("{context}: {status}")),
        429 => Error::provider(
            PROVIDER,
            format!("{context}: rate limit exceeded ({status})"),
        ),
        500..=599 => Error::provider(
            PROVIDER,
            format!("{context}: server error (transient): {status} - {body}"),
        ),
        _ => Error::provider(PROVIDER, format!("{context}: {status} - {body}")),
    }
}

fn describe(errors: &[ApiMessage]) -> String {
    errors
        .iter()
        .map(|e| format!("{} ({})", e.message, e.code))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A failed call, with the vendor error codes kept for fallback decisions
struct CallError {
    error: Error,
    codes: Vec<u64>,
}

impl From<CallError> for Error {
    fn from(err: CallError) -> Self {
        err.error
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:DNS:Edit permissions
    /// - `zone_id`: Optional zone ID (looked up by domain otherwise)
    /// - `account_id`: Optional account ID
    /// - `dry_run`: If true, perform reads but skip writes
    pub fn new(
        api_token: impl Into<String>,
        zone_id: Option<String>,
        account_id: Option<String>,
        dry_run: bool,
    ) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_token,
            zone_id,
            account_id,
            client,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            dry_run,
        })
    }

    /// Point the provider at another API root (tests, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Send a request and unwrap the v4 envelope
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&RecordBody<'_>>,
        context: &str,
    ) -> std::result::Result<Envelope<T>, CallError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(&self.api_token)
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| CallError {
            error: if e.is_timeout() {
                Error::timeout(format!("{context}: {e}"))
            } else {
                Error::provider(PROVIDER, format!("{context}: HTTP request failed: {e}"))
            },
            codes: Vec::new(),
        })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_else(|_| {
            "Unable to read error response".to_string()
        });
        let envelope: Option<Envelope<T>> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            let codes = envelope
                .as_ref()
                .map(|env| env.errors.iter().map(|e| e.code).collect())
                .unwrap_or_default();
            return Err(CallError {
                error: map_status(status, context, &text),
                codes,
            });
        }

        let envelope = envelope.ok_or_else(|| CallError {
            error: Error::provider(PROVIDER, format!("{context}: failed to parse response")),
            codes: Vec::new(),
        })?;
        if !envelope.success {
            return Err(CallError {
                error: Error::provider(
                    PROVIDER,
                    format!("{context}: {}", describe(&envelope.errors)),
                ),
                codes: envelope.errors.iter().map(|e| e.code).collect(),
            });
        }
        Ok(envelope)
    }

    /// Find the zone for a domain
    ///
    /// ```http
    /// GET /zones?name=example.com
    /// GET /zones/:zone_id          (zone ID configured)
    /// ```
    async fn zone(&self, domain: &str) -> Result<Zone> {
        if let Some(zone_id) = &self.zone_id {
            tracing::debug!("Using pre-configured zone ID");
            let envelope: Envelope<Zone> = self
                .call(Method::GET, &format!("/zones/{zone_id}"), &[], None, "zone lookup")
                .await?;
            return envelope
                .result
                .ok_or_else(|| Error::not_found(format!("Zone not found: {zone_id}")));
        }

        tracing::debug!(domain, "Looking up zone ID");
        let envelope: Envelope<Vec<Zone>> = self
            .call(
                Method::GET,
                "/zones",
                &[("name", domain.to_string())],
                None,
                "zone lookup",
            )
            .await?;
        envelope
            .result
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("Zone not found: {domain}")))
    }

    async fn zone_id(&self, domain: &str) -> Result<String> {
        match &self.zone_id {
            Some(zone_id) => Ok(zone_id.clone()),
            None => Ok(self.zone(domain).await?.id),
        }
    }

    /// Every record of a zone, following pagination
    async fn list_zone_records(&self, zone_id: &str) -> Result<Vec<CfRecord>> {
        let path = format!("/zones/{zone_id}/dns_records");
        let mut records = Vec::new();
        let mut page = 1;

        loop {
            let envelope: Envelope<Vec<CfRecord>> = self
                .call(
                    Method::GET,
                    &path,
                    &[("page", page.to_string()), ("per_page", PAGE_SIZE.to_string())],
                    None,
                    "list records",
                )
                .await?;
            records.extend(envelope.result.unwrap_or_default());

            match envelope.result_info {
                Some(info) if info.page < info.total_pages => page = info.page + 1,
                _ => break,
            }
        }

        Ok(records)
    }

    fn convert(record: CfRecord, domain: &str) -> Option<ProviderRecord> {
        let record_type: RecordType = match record.record_type.parse() {
            Ok(t) => t,
            Err(_) => {
                tracing::debug!(
                    record_type = %record.record_type,
                    name = %record.name,
                    "Skipping unsupported record type"
                );
                return None;
            }
        };

        // Cloudflare reports ttl=1 for "automatic"
        let mut spec = RecordSpec::new(to_relative(&record.name, domain), record_type, record.content)
            .with_ttl(record.ttl.max(1))
            .with_proxied(record.proxied.unwrap_or(false));
        spec.priority = record.priority;
        Some(ProviderRecord::new(record.id, spec))
    }

    fn body<'a>(record: &'a RecordSpec, domain: &str) -> RecordBody<'a> {
        RecordBody {
            record_type: record.record_type.as_str(),
            name: to_fqdn(&record.name, domain),
            content: &record.value,
            ttl: record.ttl,
            proxied: record.proxied,
            priority: record.priority,
        }
    }

    async fn put_record(
        &self,
        zone_id: &str,
        domain: &str,
        id: &str,
        record: &RecordSpec,
    ) -> Result<ProviderRecord> {
        let body = Self::body(record, domain);
        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send PUT /zones/{}/dns_records/{} with payload: {}",
                zone_id,
                id,
                serde_json::to_string(&body).unwrap_or_default()
            );
            return Ok(ProviderRecord::new(id, record.clone()));
        }

        let envelope: Envelope<CfRecord> = self
            .call(
                Method::PUT,
                &format!("/zones/{zone_id}/dns_records/{id}"),
                &[],
                Some(&body),
                "update record",
            )
            .await?;
        let updated = envelope
            .result
            .and_then(|r| Self::convert(r, domain))
            .unwrap_or_else(|| ProviderRecord::new(id, record.clone()));

        tracing::info!(record = %record.key(), domain, "DNS record updated");
        Ok(updated)
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    fn provider_name(&self) -> &str {
        PROVIDER
    }

    /// ```http
    /// GET /user/tokens/verify
    /// ```
    async fn validate_credentials(&self) -> Result<()> {
        let envelope: Envelope<TokenStatus> = self
            .call(Method::GET, "/user/tokens/verify", &[], None, "verify token")
            .await?;
        match envelope.result {
            Some(token) if token.status == "active" => Ok(()),
            Some(token) => Err(Error::credential(format!(
                "API token is not active (status: {})",
                token.status
            ))),
            None => Err(Error::credential("API token could not be verified")),
        }
    }

    async fn expected_nameservers(&self, domain: &str) -> Result<Vec<String>> {
        Ok(self.zone(domain).await?.name_servers)
    }

    async fn list_records(&self, domain: &str) -> Result<Vec<ProviderRecord>> {
        let zone_id = self.zone_id(domain).await?;
        let records = self.list_zone_records(&zone_id).await?;
        tracing::debug!(domain, count = records.len(), "Listed Cloudflare records");
        Ok(records
            .into_iter()
            .filter_map(|r| Self::convert(r, domain))
            .collect())
    }

    async fn create_record(&self, domain: &str, record: &RecordSpec) -> Result<ProviderRecord> {
        let zone_id = self.zone_id(domain).await?;
        let body = Self::body(record, domain);

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send POST /zones/{}/dns_records with payload: {}",
                zone_id,
                serde_json::to_string(&body).unwrap_or_default()
            );
            return Ok(ProviderRecord::new("dry-run", record.clone()));
        }

        let result: std::result::Result<Envelope<CfRecord>, CallError> = self
            .call(
                Method::POST,
                &format!("/zones/{zone_id}/dns_records"),
                &[],
                Some(&body),
                "create record",
            )
            .await;

        match result {
            Ok(envelope) => {
                tracing::info!(record = %record.key(), domain, "DNS record created");
                envelope
                    .result
                    .and_then(|r| Self::convert(r, domain))
                    .ok_or_else(|| Error::provider(PROVIDER, "create record: empty result"))
            }
            Err(err) if err.codes.iter().any(|c| ALREADY_EXISTS_CODES.contains(c)) => {
                tracing::debug!(record = %record.key(), domain, "Record already exists, updating");
                let key = record.key();
                let existing = self
                    .list_zone_records(&zone_id)
                    .await?
                    .into_iter()
                    .filter_map(|r| Self::convert(r, domain))
                    .find(|r| r.key() == key)
                    .ok_or(err.error)?;
                self.put_record(&zone_id, domain, &existing.id, record).await
            }
            Err(err) => Err(err.error),
        }
    }

    async fn update_record(
        &self,
        domain: &str,
        id: &str,
        record: &RecordSpec,
    ) -> Result<ProviderRecord> {
        let zone_id = self.zone_id(domain).await?;
        self.put_record(&zone_id, domain, id, record).await
    }

    async fn delete_record(&self, domain: &str, id: &str) -> Result<()> {
        let zone_id = self.zone_id(domain).await?;
        if self.dry_run {
            tracing::info!("[DRY-RUN] Would send DELETE /zones/{}/dns_records/{}", zone_id, id);
            return Ok(());
        }

        let result: std::result::Result<Envelope<Deleted>, CallError> = self
            .call(
                Method::DELETE,
                &format!("/zones/{zone_id}/dns_records/{id}"),
                &[],
                None,
                "delete record",
            )
            .await;
        match result {
            Ok(_) => {
                tracing::info!(domain, id, "DNS record deleted");
                Ok(())
            }
            Err(CallError {
                error: Error::NotFound(_),
                ..
            }) => {
                tracing::debug!(domain, id, "Record already gone");
                Ok(())
            }
            Err(err) => Err(err.error),
        }
    }
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn DnsProvider>> {
        match config {
            ProviderConfig::Cloudflare {
                api_token,
                zone_id,
                account_id,
            } => {
                if api_token.is_empty() {
                    return Err(Error::config("Cloudflare API token is required"));
                }

                // Check for dry-run mode environment variable
                let dry_run = std::env::var("FLEETDNS_MODE")
                    .unwrap_or_default()
                    .eq_ignore_ascii_case("dry-run");

                if dry_run {
                    tracing::warn!(
                        "Cloudflare provider running in DRY-RUN mode - no changes will be made"
                    );
                }

                Ok(Arc::new(CloudflareProvider::new(
                    api_token.clone(),
                    zone_id.clone(),
                    account_id.clone(),
                    dry_run,
                )?))
            }
            _ => Err(Error::config("Invalid config for Cloudflare provider")),
        }
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use fleetdns_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// fleetdns_provider_cloudflare::register(&registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &fleetdns_core::ProviderRegistry) {
    registry.register_provider(PROVIDER, Box::new(CloudflareFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ZONE: &str = "zone-1";

    async fn setup(dry_run: bool) -> (MockServer, CloudflareProvider) {
        let server = MockServer::start().await;
        let provider = CloudflareProvider::new("secret_token_12345", None, None, dry_run)
            .unwrap()
            .with_base_url(server.uri());

        Mock::given(method("GET"))
            .and(path("/zones"))
            .and(query_param("name", "example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "errors": [],
                "result": [{
                    "id": ZONE,
                    "name": "example.com",
                    "name_servers": ["ada.ns.cloudflare.com", "bob.ns.cloudflare.com"]
                }]
            })))
            .mount(&server)
            .await;

        (server, provider)
    }

    fn record(id: &str, record_type: &str, name: &str, content: &str) -> serde_json::Value {
        json!({
            "id": id,
            "type": record_type,
            "name": name,
            "content": content,
            "ttl": 300,
            "proxied": false
        })
    }

    #[test]
    fn test_name_conversion() {
        assert_eq!(to_fqdn("@", "example.com"), "example.com");
        assert_eq!(to_fqdn("*", "example.com"), "*.example.com");
        assert_eq!(to_fqdn("www", "example.com"), "www.example.com");

        assert_eq!(to_relative("example.com", "example.com"), "@");
        assert_eq!(to_relative("*.example.com", "example.com"), "*");
        assert_eq!(to_relative("WWW.Example.com.", "example.com"), "www");
        assert_eq!(to_relative("a.b.example.com", "example.com"), "a.b");
    }

    #[test]
    fn test_map_status() {
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, "x", ""),
            Error::Credential(_)
        ));
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, "x", ""),
            Error::NotFound(_)
        ));
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, "x", ""),
            Error::ProviderApi { .. }
        ));
        assert!(map_status(StatusCode::BAD_GATEWAY, "x", "").is_remote());
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(matches!(
            CloudflareProvider::new("", None, None, false),
            Err(Error::Config(_))
        ));

        let config = ProviderConfig::Cloudflare {
            api_token: String::new(),
            zone_id: None,
            account_id: None,
        };
        assert!(CloudflareFactory.create(&config).is_err());
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let provider = CloudflareProvider::new("secret_token_12345", None, None, false).unwrap();
        let debug_str = format!("{:?}", provider);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("CloudflareProvider"));
    }

    #[test]
    fn test_register() {
        let registry = fleetdns_core::ProviderRegistry::new();
        register(&registry);
        assert!(registry.has_provider("cloudflare"));
    }

    #[tokio::test]
    async fn test_expected_nameservers_from_zone() {
        let (_server, provider) = setup(false).await;
        let ns = provider.expected_nameservers("example.com").await.unwrap();
        assert_eq!(ns, vec!["ada.ns.cloudflare.com", "bob.ns.cloudflare.com"]);
    }

    #[tokio::test]
    async fn test_list_records_follows_pages() {
        let (server, provider) = setup(false).await;

        Mock::given(method("GET"))
            .and(path(format!("/zones/{ZONE}/dns_records")))
            .and(query_param("page", "1"))
            .and(header("authorization", "Bearer secret_token_12345"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": [
                    record("r1", "A", "www.example.com", "1.1.1.1"),
                    record("r2", "SOA", "example.com", "ignored")
                ],
                "result_info": { "page": 1, "per_page": 100, "total_pages": 2 }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/zones/{ZONE}/dns_records")))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": [record("r3", "A", "*.example.com", "2.2.2.2")],
                "result_info": { "page": 2, "per_page": 100, "total_pages": 2 }
            })))
            .mount(&server)
            .await;

        let records = provider.list_records("example.com").await.unwrap();
        assert_eq!(records.len(), 2, "SOA is skipped");
        assert_eq!(records[0].id, "r1");
        assert_eq!(records[0].spec.name, "www");
        assert_eq!(records[1].spec.name, "*");
        assert_eq!(records[1].spec.value, "2.2.2.2");
    }

    #[tokio::test]
    async fn test_create_sends_fqdn() {
        let (server, provider) = setup(false).await;

        Mock::given(method("POST"))
            .and(path(format!("/zones/{ZONE}/dns_records")))
            .and(body_partial_json(json!({
                "type": "A",
                "name": "*.example.com",
                "content": "5.5.5.5"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": record("new-1", "A", "*.example.com", "5.5.5.5")
            })))
            .expect(1)
            .mount(&server)
            .await;

        let spec = RecordSpec::new("*", RecordType::A, "5.5.5.5");
        let created = provider.create_record("example.com", &spec).await.unwrap();
        assert_eq!(created.id, "new-1");
        assert_eq!(created.spec.name, "*");
    }

    #[tokio::test]
    async fn test_create_already_exists_falls_back_to_update() {
        let (server, provider) = setup(false).await;

        Mock::given(method("POST"))
            .and(path(format!("/zones/{ZONE}/dns_records")))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "success": false,
                "errors": [{ "code": 81058, "message": "An identical record already exists." }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/zones/{ZONE}/dns_records")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": [record("r9", "A", "www.example.com", "9.9.9.9")],
                "result_info": { "page": 1, "total_pages": 1 }
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(format!("/zones/{ZONE}/dns_records/r9")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": record("r9", "A", "www.example.com", "1.1.1.1")
            })))
            .expect(1)
            .mount(&server)
            .await;

        let spec = RecordSpec::new("www", RecordType::A, "1.1.1.1");
        let record = provider.create_record("example.com", &spec).await.unwrap();
        assert_eq!(record.id, "r9");
        assert_eq!(record.spec.value, "1.1.1.1");
    }

    #[tokio::test]
    async fn test_delete_missing_record_is_ok() {
        let (server, provider) = setup(false).await;

        Mock::given(method("DELETE"))
            .and(path(format!("/zones/{ZONE}/dns_records/gone")))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "success": false,
                "errors": [{ "code": 81044, "message": "Record does not exist." }]
            })))
            .mount(&server)
            .await;

        provider.delete_record("example.com", "gone").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_token_is_credential_error() {
        let (server, provider) = setup(false).await;

        Mock::given(method("GET"))
            .and(path("/user/tokens/verify"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "success": false,
                "errors": [{ "code": 1000, "message": "Invalid API Token" }]
            })))
            .mount(&server)
            .await;

        let err = provider.validate_credentials().await.unwrap_err();
        assert!(matches!(err, Error::Credential(_)));
        assert!(!err.to_string().contains("secret_token"));
    }

    #[tokio::test]
    async fn test_dry_run_makes_no_writes() {
        let (server, provider) = setup(true).await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        assert!(provider.is_dry_run());
        let spec = RecordSpec::new("www", RecordType::A, "1.1.1.1");
        provider.create_record("example.com", &spec).await.unwrap();
        provider.update_record("example.com", "r1", &spec).await.unwrap();
        provider.delete_record("example.com", "r1").await.unwrap();
    }
}
