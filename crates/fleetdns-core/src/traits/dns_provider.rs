// # DNS Provider Contract
//
// Defines the uniform interface every DNS vendor backend implements.
//
// ## Implementations
//
// - Cloudflare: `fleetdns-provider-cloudflare` crate
// - Custom backends: register a `DnsProviderFactory` under their own name
//
// ## Usage
//
// ```rust,ignore
// use fleetdns_core::DnsProvider;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* DnsProvider implementation */;
//
//     provider.validate_credentials().await?;
//     for record in provider.list_records("example.com").await? {
//         println!("{} {} {}", record.spec.name, record.spec.record_type, record.spec.value);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::{ProviderRecord, RecordSpec};

/// Trait for DNS provider implementations
///
/// Record names crossing this boundary are always relative to the domain
/// (`@`, `*`, `www`). Backends translate to and from their own FQDN or
/// record-id encodings internally.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Trust Level: Untrusted
///
/// DNS providers are **untrusted** components with strict limitations:
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Handle vendor pagination and record-id encoding
/// - ✅ Treat vendor "already exists" answers as success where safe
///
/// ## Forbidden Capabilities
/// - ❌ Spawn tasks or threads
/// - ❌ Retry or back off (owned by the reconciler's next pass)
/// - ❌ Access the state store
/// - ❌ Decide which records to change (owned by the reconciler)
/// - ❌ Return vendor-typed errors; map everything onto [`Error`]
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Short identifier for logging (e.g. "cloudflare")
    fn provider_name(&self) -> &str;

    /// Check the configured credentials are accepted
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Credentials work
    /// - `Err(Error::Credential)`: The provider rejected them
    async fn validate_credentials(&self) -> Result<()>;

    /// Nameservers the provider expects the domain to delegate to
    async fn expected_nameservers(&self, domain: &str) -> Result<Vec<String>>;

    /// List every record currently present for the domain
    async fn list_records(&self, domain: &str) -> Result<Vec<ProviderRecord>>;

    /// Create a record and return it with its provider identifier
    async fn create_record(&self, domain: &str, record: &RecordSpec) -> Result<ProviderRecord>;

    /// Replace the content of an existing record
    async fn update_record(
        &self,
        domain: &str,
        id: &str,
        record: &RecordSpec,
    ) -> Result<ProviderRecord>;

    /// Delete a record by provider identifier
    ///
    /// Deleting a record that no longer exists is not an error.
    async fn delete_record(&self, domain: &str, id: &str) -> Result<()>;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance from configuration
    fn create(&self, config: &crate::config::ProviderConfig) -> Result<Arc<dyn DnsProvider>>;
}

/// Wraps a provider so that every call is bounded by a timeout
///
/// The reconciler always talks to providers through this wrapper so a slow
/// vendor cannot hold a reconcile pass forever.
#[derive(Clone)]
pub struct BoundedProvider {
    inner: Arc<dyn DnsProvider>,
    timeout: Duration,
}

impl BoundedProvider {
    pub fn new(inner: Arc<dyn DnsProvider>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        fut: impl std::future::Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(format!(
                "{} {} exceeded {:?}",
                self.inner.provider_name(),
                operation,
                self.timeout
            ))),
        }
    }
}

#[async_trait]
impl DnsProvider for BoundedProvider {
    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    async fn validate_credentials(&self) -> Result<()> {
        self.bounded("validate_credentials", self.inner.validate_credentials())
            .await
    }

    async fn expected_nameservers(&self, domain: &str) -> Result<Vec<String>> {
        self.bounded("expected_nameservers", self.inner.expected_nameservers(domain))
            .await
    }

    async fn list_records(&self, domain: &str) -> Result<Vec<ProviderRecord>> {
        self.bounded("list_records", self.inner.list_records(domain))
            .await
    }

    async fn create_record(&self, domain: &str, record: &RecordSpec) -> Result<ProviderRecord> {
        self.bounded("create_record", self.inner.create_record(domain, record))
            .await
    }

    async fn update_record(
        &self,
        domain: &str,
        id: &str,
        record: &RecordSpec,
    ) -> Result<ProviderRecord> {
        self.bounded("update_record", self.inner.update_record(domain, id, record))
            .await
    }

    async fn delete_record(&self, domain: &str, id: &str) -> Result<()> {
        self.bounded("delete_record", self.inner.delete_record(domain, id))
            .await
    }
}
