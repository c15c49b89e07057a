//! Test doubles and common utilities for contract tests
//!
//! This module provides an in-memory DNS provider with failure injection
//! and a harness that wires a store, a fleet, a reconciler and an engine
//! together the same way the daemon does.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetdns_core::config::SchedulerConfig;
use fleetdns_core::engine::{EngineEvent, RotationEngine};
use fleetdns_core::error::{Error, Result};
use fleetdns_core::membership::MembershipResolver;
use fleetdns_core::model::{Domain, ProviderRecord, RecordSpec};
use fleetdns_core::nameserver::{NameserverLookup, NameserverValidator};
use fleetdns_core::reconcile::{ReconcileWorker, Reconciler};
use fleetdns_core::registry::ProviderSet;
use fleetdns_core::service::ControlPlane;
use fleetdns_core::traits::{DnsProvider, GroupRegistry, Machine, MachineRegistry, StateStore};
use fleetdns_core::{MemoryStateStore, StaticFleet};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const DOMAIN: &str = "example.com";
pub const ACCOUNT: &str = "primary";

/// In-memory provider that records every call
///
/// Records live per domain in insertion order. Names listed in
/// `fail_names` make create and update calls for them fail.
#[derive(Default)]
pub struct MockProvider {
    zones: Mutex<BTreeMap<String, Vec<ProviderRecord>>>,
    next_id: AtomicUsize,
    fail_names: Mutex<HashSet<String>>,
    fail_list: AtomicBool,
    nameservers: Vec<String>,
    pub list_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            nameservers: vec!["ns1.mock.test".to_string(), "ns2.mock.test".to_string()],
            ..Self::default()
        }
    }

    /// Place a record at the provider without counting a call
    pub fn seed(&self, domain: &str, spec: RecordSpec) -> ProviderRecord {
        let record = ProviderRecord::new(self.allocate_id(), spec);
        self.zones
            .lock()
            .unwrap()
            .entry(domain.to_string())
            .or_default()
            .push(record.clone());
        record
    }

    pub fn records(&self, domain: &str) -> Vec<ProviderRecord> {
        self.zones
            .lock()
            .unwrap()
            .get(domain)
            .cloned()
            .unwrap_or_default()
    }

    /// Value of the first record with this name, if any
    pub fn value_of(&self, domain: &str, name: &str) -> Option<String> {
        self.records(domain)
            .into_iter()
            .find(|r| r.spec.name == name)
            .map(|r| r.spec.value)
    }

    pub fn fail_writes_for(&self, name: &str) {
        self.fail_names.lock().unwrap().insert(name.to_string());
    }

    pub fn heal(&self) {
        self.fail_names.lock().unwrap().clear();
        self.fail_list.store(false, Ordering::SeqCst);
    }

    pub fn fail_listing(&self) {
        self.fail_list.store(true, Ordering::SeqCst);
    }

    pub fn writes(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
            + self.update_calls.load(Ordering::SeqCst)
            + self.delete_calls.load(Ordering::SeqCst)
    }

    fn allocate_id(&self) -> String {
        format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn check_write(&self, name: &str) -> Result<()> {
        if self.fail_names.lock().unwrap().contains(name) {
            return Err(Error::provider("mock", format!("injected failure for {name}")));
        }
        Ok(())
    }
}

#[async_trait]
impl DnsProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn validate_credentials(&self) -> Result<()> {
        Ok(())
    }

    async fn expected_nameservers(&self, _domain: &str) -> Result<Vec<String>> {
        Ok(self.nameservers.clone())
    }

    async fn list_records(&self, domain: &str) -> Result<Vec<ProviderRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::provider("mock", "listing unavailable"));
        }
        Ok(self.records(domain))
    }

    async fn create_record(&self, domain: &str, record: &RecordSpec) -> Result<ProviderRecord> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check_write(&record.name)?;
        Ok(self.seed(domain, record.clone()))
    }

    async fn update_record(
        &self,
        domain: &str,
        id: &str,
        record: &RecordSpec,
    ) -> Result<ProviderRecord> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check_write(&record.name)?;

        let mut zones = self.zones.lock().unwrap();
        let existing = zones
            .get_mut(domain)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| Error::provider("mock", format!("record {id} not found")))?;
        existing.spec = record.clone();
        Ok(existing.clone())
    }

    async fn delete_record(&self, domain: &str, id: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(records) = self.zones.lock().unwrap().get_mut(domain) {
            records.retain(|r| r.id != id);
        }
        Ok(())
    }
}

/// NS lookup answering from a fixed list
pub struct FixedLookup(pub Vec<String>);

#[async_trait]
impl NameserverLookup for FixedLookup {
    async fn lookup_ns(&self, _domain: &str) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

/// A machine with a heartbeat at `at`
pub fn machine(id: u64, address: &str, at: DateTime<Utc>) -> Machine {
    Machine::new(id, format!("node-{id}"), address).with_heartbeat(at)
}

/// Everything the daemon wires up, backed by in-memory doubles
pub struct Harness {
    pub store: Arc<dyn StateStore>,
    pub fleet: Arc<StaticFleet>,
    pub provider: Arc<MockProvider>,
    pub reconciler: Arc<Reconciler>,
    pub engine: Arc<RotationEngine>,
    pub plane: ControlPlane,
    pub events: mpsc::Receiver<EngineEvent>,
    pub worker: ReconcileWorker,
    pub domain: Domain,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(SchedulerConfig::default()).await
    }

    pub async fn with_config(config: SchedulerConfig) -> Self {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let fleet = Arc::new(StaticFleet::new());
        let provider = Arc::new(MockProvider::new());

        let mut providers = ProviderSet::new(Duration::from_secs(5));
        providers.insert(ACCOUNT, provider.clone());

        let reconciler = Arc::new(Reconciler::new(Arc::clone(&store), providers));
        let (worker, handle) =
            ReconcileWorker::new(Arc::clone(&reconciler), 64, Duration::from_secs(300));

        let machines: Arc<dyn MachineRegistry> = fleet.clone();
        let groups: Arc<dyn GroupRegistry> = fleet.clone();
        let resolver = MembershipResolver::new(machines, groups, config.health_freshness());

        let (engine, events) = RotationEngine::new(Arc::clone(&store), resolver, &config)
            .expect("engine construction succeeds");
        let engine = Arc::new(engine.with_reconcile(handle));

        let lookup = Arc::new(FixedLookup(vec![
            "ns1.mock.test.".to_string(),
            "ns2.mock.test.".to_string(),
        ]));
        let plane = ControlPlane::new(
            Arc::clone(&engine),
            Arc::clone(&reconciler),
            NameserverValidator::new(lookup),
        );

        let domain = plane
            .register_domain(DOMAIN, ACCOUNT)
            .await
            .expect("domain registration succeeds");

        Self {
            store,
            fleet,
            provider,
            reconciler,
            engine,
            plane,
            events,
            worker,
            domain,
        }
    }

    /// Drain every event emitted so far
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
