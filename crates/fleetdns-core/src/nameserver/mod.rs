//! Nameserver delegation checks
//!
//! Compares the live NS set of a domain with the nameservers its provider
//! expects. Read-only: a check never changes any state.

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::traits::DnsProvider;

/// Live NS lookups
#[async_trait]
pub trait NameserverLookup: Send + Sync {
    /// Nameservers currently published for `domain`
    async fn lookup_ns(&self, domain: &str) -> Result<Vec<String>>;
}

/// [`NameserverLookup`] backed by the system's resolvers
#[derive(Clone)]
pub struct HickoryLookup {
    resolver: TokioAsyncResolver,
}

impl HickoryLookup {
    /// Use the default upstream resolvers
    pub fn new() -> Self {
        Self::with_config(ResolverConfig::default(), ResolverOpts::default())
    }

    pub fn with_config(config: ResolverConfig, opts: ResolverOpts) -> Self {
        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

impl Default for HickoryLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NameserverLookup for HickoryLookup {
    async fn lookup_ns(&self, domain: &str) -> Result<Vec<String>> {
        let lookup = self
            .resolver
            .ns_lookup(domain)
            .await
            .map_err(|e| Error::lookup(format!("NS lookup for {} failed: {}", domain, e)))?;
        Ok(lookup.iter().map(|ns| ns.0.to_utf8()).collect())
    }
}

/// Delegation state of a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameserverStatus {
    /// Every expected nameserver is published
    Valid,
    /// Some expected nameservers are published
    Pending,
    /// None are, or the check could not run
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameserverReport {
    pub domain: String,
    pub status: NameserverStatus,
    pub expected: Vec<String>,
    pub found: Vec<String>,
    pub missing: Vec<String>,
    /// Why the check could not complete
    pub error: Option<String>,
}

impl NameserverReport {
    fn failed(domain: &str, expected: Vec<String>, error: String) -> Self {
        Self {
            domain: domain.to_string(),
            status: NameserverStatus::Invalid,
            missing: expected.clone(),
            expected,
            found: Vec::new(),
            error: Some(error),
        }
    }
}

fn normalize_ns(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Classify a found NS set against the expected one
///
/// Returns the status and the expected nameservers that were not found.
/// An empty expected set is `Invalid`: there is nothing to confirm.
pub fn classify(expected: &[String], found: &[String]) -> (NameserverStatus, Vec<String>) {
    let found: HashSet<String> = found.iter().map(|n| normalize_ns(n)).collect();
    let missing: Vec<String> = expected
        .iter()
        .map(|n| normalize_ns(n))
        .filter(|n| !found.contains(n))
        .collect();

    let status = if expected.is_empty() || missing.len() == expected.len() {
        NameserverStatus::Invalid
    } else if missing.is_empty() {
        NameserverStatus::Valid
    } else {
        NameserverStatus::Pending
    };
    (status, missing)
}

/// Runs delegation checks for provider-backed domains
#[derive(Clone)]
pub struct NameserverValidator {
    lookup: Arc<dyn NameserverLookup>,
}

impl NameserverValidator {
    pub fn new(lookup: Arc<dyn NameserverLookup>) -> Self {
        Self { lookup }
    }

    /// Check a domain against the nameservers its provider expects
    ///
    /// Failures of either side are reported as `Invalid` rather than
    /// returned as errors.
    pub async fn check(&self, domain: &str, provider: &dyn DnsProvider) -> NameserverReport {
        let expected = match provider.expected_nameservers(domain).await {
            Ok(expected) => expected.iter().map(|n| normalize_ns(n)).collect(),
            Err(e) => {
                return NameserverReport::failed(
                    domain,
                    Vec::new(),
                    format!("provider {}: {}", provider.provider_name(), e),
                );
            }
        };
        self.check_expected(domain, expected).await
    }

    /// Check a domain against an explicit expected set
    pub async fn check_expected(&self, domain: &str, expected: Vec<String>) -> NameserverReport {
        let found = match self.lookup.lookup_ns(domain).await {
            Ok(found) => found.iter().map(|n| normalize_ns(n)).collect::<Vec<_>>(),
            Err(e) => return NameserverReport::failed(domain, expected, e.to_string()),
        };

        let (status, missing) = classify(&expected, &found);
        tracing::debug!(domain, ?status, missing = missing.len(), "Nameserver check");

        NameserverReport {
            domain: domain.to_string(),
            status,
            expected,
            found,
            missing,
            error: None,
        }
    }
}
