//! Desired and remote DNS record shapes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use super::{DomainId, RecordId};
use crate::error::Error;

/// Name used for the zone apex
pub const APEX: &str = "@";

/// Name used for the zone wildcard
pub const WILDCARD: &str = "*";

/// Supported DNS record types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Txt,
    Mx,
    Ns,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Txt => "TXT",
            RecordType::Mx => "MX",
            RecordType::Ns => "NS",
        }
    }

    /// Record type a rotation writes for a machine address
    pub fn for_address(address: &str) -> Self {
        match address.parse::<IpAddr>() {
            Ok(IpAddr::V4(_)) => RecordType::A,
            Ok(IpAddr::V6(_)) => RecordType::Aaaa,
            Err(_) => RecordType::Cname,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            "CNAME" => Ok(RecordType::Cname),
            "TXT" => Ok(RecordType::Txt),
            "MX" => Ok(RecordType::Mx),
            "NS" => Ok(RecordType::Ns),
            other => Err(Error::validation(format!("unsupported record type: {other}"))),
        }
    }
}

/// Reconciliation state of a desired record
///
/// Only `Synced`, `Pending` and `Error` are ever persisted. The remaining
/// variants are labels produced by a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Synced,
    Pending,
    Conflict,
    LocalOnly,
    RemoteOnly,
    Error,
}

impl SyncStatus {
    /// Whether a record in this state still needs pushing to the provider
    pub fn needs_push(&self) -> bool {
        matches!(self, SyncStatus::Pending | SyncStatus::Error)
    }
}

/// Provider-neutral record content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSpec {
    /// Relative name: `@`, `*` or a label such as `www`
    pub name: String,
    pub record_type: RecordType,
    pub value: String,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    /// MX preference
    #[serde(default)]
    pub priority: Option<u16>,
    /// Vendor flag for proxy-through (Cloudflare orange cloud)
    #[serde(default)]
    pub proxied: bool,
}

impl RecordSpec {
    /// Create a record spec with default TTL and flags
    pub fn new(name: impl AsRef<str>, record_type: RecordType, value: impl Into<String>) -> Self {
        Self {
            name: normalize_name(name.as_ref()),
            record_type,
            value: value.into(),
            ttl: default_ttl(),
            priority: None,
            proxied: false,
        }
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_proxied(mut self, proxied: bool) -> Self {
        self.proxied = proxied;
        self
    }

    /// The reconciliation join key
    pub fn key(&self) -> RecordKey {
        RecordKey {
            name: self.name.clone(),
            record_type: self.record_type,
        }
    }

    /// Check the spec is internally consistent
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.is_empty() {
            return Err(Error::validation("record name cannot be empty"));
        }
        if self.value.trim().is_empty() {
            return Err(Error::validation(format!(
                "record {} {} has an empty value",
                self.name, self.record_type
            )));
        }
        if self.ttl == 0 {
            return Err(Error::validation("record TTL must be > 0"));
        }
        match self.record_type {
            RecordType::A => {
                if self.value.parse::<std::net::Ipv4Addr>().is_err() {
                    return Err(Error::validation(format!(
                        "A record value is not an IPv4 address: {}",
                        self.value
                    )));
                }
            }
            RecordType::Aaaa => {
                if self.value.parse::<std::net::Ipv6Addr>().is_err() {
                    return Err(Error::validation(format!(
                        "AAAA record value is not an IPv6 address: {}",
                        self.value
                    )));
                }
            }
            RecordType::Mx if self.priority.is_none() => {
                return Err(Error::validation("MX record requires a priority"));
            }
            _ => {}
        }
        Ok(())
    }
}

/// `(name, type)` join key used by reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub name: String,
    pub record_type: RecordType,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.record_type)
    }
}

/// A domain's intended record, as stored locally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredRecord {
    pub id: RecordId,
    pub domain_id: DomainId,
    #[serde(flatten)]
    pub spec: RecordSpec,
    pub sync_status: SyncStatus,
    /// Message from the last failed push
    #[serde(default)]
    pub sync_error: Option<String>,
    /// Identifier assigned by the provider
    #[serde(default)]
    pub remote_id: Option<String>,
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl DesiredRecord {
    pub fn key(&self) -> RecordKey {
        self.spec.key()
    }
}

/// A record as currently stored at a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRecord {
    /// Provider-specific record identifier
    pub id: String,
    #[serde(flatten)]
    pub spec: RecordSpec,
}

impl ProviderRecord {
    pub fn new(id: impl Into<String>, spec: RecordSpec) -> Self {
        Self { id: id.into(), spec }
    }

    pub fn key(&self) -> RecordKey {
        self.spec.key()
    }
}

/// A desired record a rotation replaced, still to be removed at the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetiredRecord {
    pub id: RecordId,
    pub domain_id: DomainId,
    pub key: RecordKey,
    pub remote_id: String,
    pub retired_at: DateTime<Utc>,
}

/// Lowercase a relative record name and strip surrounding dots
pub fn normalize_name(name: &str) -> String {
    let trimmed = name.trim().trim_matches('.');
    if trimmed.is_empty() {
        APEX.to_string()
    } else {
        trimmed.to_ascii_lowercase()
    }
}

fn default_ttl() -> u32 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("WWW."), "www");
        assert_eq!(normalize_name(""), "@");
        assert_eq!(normalize_name("*"), "*");
        assert_eq!(normalize_name(" Api.Internal "), "api.internal");
    }

    #[test]
    fn test_record_type_for_address() {
        assert_eq!(RecordType::for_address("10.0.0.1"), RecordType::A);
        assert_eq!(RecordType::for_address("2001:db8::1"), RecordType::Aaaa);
        assert_eq!(RecordType::for_address("lb.example.net"), RecordType::Cname);
    }

    #[test]
    fn test_record_type_parse() {
        assert_eq!("aaaa".parse::<RecordType>().unwrap(), RecordType::Aaaa);
        assert!(matches!(
            "SRV".parse::<RecordType>(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_spec_validation() {
        assert!(RecordSpec::new("www", RecordType::A, "1.1.1.1").validate().is_ok());
        assert!(RecordSpec::new("www", RecordType::A, "not-an-ip").validate().is_err());
        assert!(RecordSpec::new("@", RecordType::Mx, "mx.example.com").validate().is_err());
        assert!(
            RecordSpec::new("@", RecordType::Mx, "mx.example.com")
                .with_priority(10)
                .validate()
                .is_ok()
        );
        assert!(RecordSpec::new("www", RecordType::Txt, "  ").validate().is_err());
    }

    #[test]
    fn test_desired_record_json_is_flat() {
        let record = DesiredRecord {
            id: 1,
            domain_id: 2,
            spec: RecordSpec::new("www", RecordType::A, "1.1.1.1"),
            sync_status: SyncStatus::Pending,
            sync_error: None,
            remote_id: None,
            last_synced_at: None,
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["name"], "www");
        assert_eq!(json["record_type"], "A");
        assert_eq!(json["sync_status"], "pending");
    }
}
