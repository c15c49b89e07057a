//! Contract Test: Rotation Decisions
//!
//! Verifies the single resolve → select → commit path shared by manual
//! triggers and scheduler ticks.
//!
//! Constraints verified:
//! - Round-robin advances one position per rotation and wraps
//! - A selection equal to the current target stamps the pool and writes nothing
//! - An empty membership writes nothing and is reported on the pool
//! - A stale version writes nothing
//! - Wildcard pools write `*` (and `@` when asked) and mark them pending
//! - Health-checked pools leave a current target that went offline
//! - A wildcard pool changing address family retires the old records
//! - A binding change on the same target still writes the new records
//! - A hostname target is never written as a CNAME at the apex

mod common;

use chrono::{Duration, Utc};
use common::*;
use fleetdns_core::engine::{EngineEvent, RotationOutcome};
use fleetdns_core::error::Error;
use fleetdns_core::model::{
    DesiredRecord, MemberInput, NewHistory, RecordKey, RecordSpec, RecordType, RotationPool,
    RotationTrigger, SyncStatus,
};
use fleetdns_core::service::{PoolRequest, RecordPoolRequest, WildcardPoolRequest};
use fleetdns_core::traits::{RecordWrite, RotationCommit};
use tokio_test::{assert_err, assert_ok};

async fn www_record(h: &Harness) -> DesiredRecord {
    let spec = RecordSpec::new("www", RecordType::A, "192.0.2.1").with_ttl(120);
    assert_ok!(h.plane.upsert_record(h.domain.id, spec).await)
}

async fn record_pool(
    h: &Harness,
    members: &[MemberInput],
    health_check: bool,
) -> (RotationPool, DesiredRecord) {
    let record = www_record(h).await;
    let pool = assert_ok!(
        h.plane
            .create_record_pool(RecordPoolRequest {
                record_id: record.id,
                pool: PoolRequest {
                    members: members.to_vec(),
                    health_check,
                    ..PoolRequest::default()
                },
            })
            .await
    );
    (pool, record)
}

/// Machines A (1.1.1.1, prio 1) and B (2.2.2.2, prio 2), both fresh
fn seed_ab(h: &Harness) -> Vec<MemberInput> {
    let now = Utc::now();
    h.fleet.upsert_machine(machine(1, "1.1.1.1", now));
    h.fleet.upsert_machine(machine(2, "2.2.2.2", now));
    vec![MemberInput::new(1, 1), MemberInput::new(2, 2)]
}

#[tokio::test]
async fn manual_rotate_moves_record_to_next_member() {
    let h = Harness::new().await;
    let members = seed_ab(&h);
    let (pool, record) = record_pool(&h, &members, false).await;

    // First rotation lands on A
    let first = assert_ok!(h.plane.rotate_pool(pool.id).await);
    assert!(first.is_rotated());
    assert_eq!(first.pool().current_machine_id, Some(1));
    assert_eq!(first.pool().current_index, 0);

    // Current target A → manual rotate → B
    let outcome = assert_ok!(h.plane.rotate_pool(pool.id).await);
    let RotationOutcome::Rotated { pool: rotated, history } = outcome else {
        panic!("expected a rotation");
    };
    assert_eq!(rotated.current_machine_id, Some(2));
    assert_eq!(rotated.current_address.as_deref(), Some("2.2.2.2"));
    assert_eq!(rotated.current_index, 1);

    assert_eq!(history.from_machine_id, Some(1));
    assert_eq!(history.from_address.as_deref(), Some("1.1.1.1"));
    assert_eq!(history.to_machine_id, 2);
    assert_eq!(history.to_address, "2.2.2.2");
    assert_eq!(history.trigger, RotationTrigger::Manual);
    assert_eq!(history.domain.as_deref(), Some(DOMAIN));
    assert_eq!(history.record.as_deref(), Some("www"));

    let stored = h.store.get_record(record.id).await.unwrap().unwrap();
    assert_eq!(stored.spec.value, "2.2.2.2");
    assert_eq!(stored.spec.ttl, 120, "bound record keeps its TTL");
    assert_eq!(stored.sync_status, SyncStatus::Pending);

    let log = assert_ok!(h.plane.pool_history(pool.id, 10).await);
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].id, history.id, "history is newest first");
}

#[tokio::test]
async fn stale_member_is_filtered_and_selection_stays() {
    let h = Harness::new().await;
    let members = seed_ab(&h);
    let (pool, record) = record_pool(&h, &members, true).await;

    assert_ok!(h.plane.rotate_pool(pool.id).await);
    let before = h.store.get_pool(pool.id).await.unwrap().unwrap();
    assert_eq!(before.current_machine_id, Some(1));

    // B last seen 10 minutes ago with a 5 minute window
    h.fleet.heartbeat(2, Utc::now() - Duration::minutes(10));

    let view = assert_ok!(h.plane.get_pool(pool.id).await);
    assert_eq!(view.membership.eligible.len(), 1);
    assert_eq!(view.membership.eligible[0].id, 1);
    assert!(!view.membership.candidates[1].online);

    let outcome = assert_ok!(h.plane.rotate_pool(pool.id).await);
    assert!(!outcome.is_rotated());

    let after = outcome.pool();
    assert_eq!(after.current_machine_id, Some(1));
    assert!(after.last_rotated_at >= before.last_rotated_at);
    assert_eq!(after.version, before.version + 1);

    let stored = h.store.get_record(record.id).await.unwrap().unwrap();
    assert_eq!(stored.spec.value, "1.1.1.1");
    assert_eq!(h.plane.pool_history(pool.id, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn wildcard_pool_writes_star_and_apex() {
    let h = Harness::new().await;
    h.fleet.upsert_machine(machine(5, "5.5.5.5", Utc::now()));

    let pool = assert_ok!(
        h.plane
            .create_wildcard_pool(WildcardPoolRequest {
                domain_id: h.domain.id,
                include_root: true,
                pool: PoolRequest {
                    members: vec![MemberInput::new(5, 0)],
                    ..PoolRequest::default()
                },
            })
            .await
    );

    let outcome = assert_ok!(h.plane.rotate_pool(pool.id).await);
    let RotationOutcome::Rotated { history, .. } = outcome else {
        panic!("expected a rotation");
    };
    assert_eq!(history.record.as_deref(), Some("*"));

    for name in ["*", "@"] {
        let key = RecordKey {
            name: name.to_string(),
            record_type: RecordType::A,
        };
        let record = h
            .store
            .find_record(h.domain.id, &key)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("{name} record written"));
        assert_eq!(record.spec.value, "5.5.5.5");
        assert_eq!(record.sync_status, SyncStatus::Pending);
    }
}

async fn wildcard_pool(h: &Harness, include_root: bool, members: &[MemberInput]) -> RotationPool {
    assert_ok!(
        h.plane
            .create_wildcard_pool(WildcardPoolRequest {
                domain_id: h.domain.id,
                include_root,
                pool: PoolRequest {
                    members: members.to_vec(),
                    ..PoolRequest::default()
                },
            })
            .await
    )
}

fn key(name: &str, record_type: RecordType) -> RecordKey {
    RecordKey {
        name: name.to_string(),
        record_type,
    }
}

#[tokio::test]
async fn wildcard_family_change_retires_previous_records() {
    let h = Harness::new().await;
    h.fleet.upsert_machine(machine(5, "5.5.5.5", Utc::now()));
    let pool = wildcard_pool(&h, false, &[MemberInput::new(5, 0)]).await;

    assert_ok!(h.plane.rotate_pool(pool.id).await);
    assert_eq!(h.worker.pass().await, 0);
    assert_eq!(h.provider.value_of(DOMAIN, "*").as_deref(), Some("5.5.5.5"));

    // Same machine, now reachable over IPv6 only
    h.fleet.upsert_machine(machine(5, "2001:db8::5", Utc::now()));
    let outcome = assert_ok!(h.plane.rotate_pool(pool.id).await);
    assert!(outcome.is_rotated());

    let old = h.store.find_record(h.domain.id, &key("*", RecordType::A)).await.unwrap();
    assert!(old.is_none(), "A record no longer desired");
    let new = h.store.find_record(h.domain.id, &key("*", RecordType::Aaaa)).await.unwrap();
    assert_eq!(new.unwrap().spec.value, "2001:db8::5");
    assert_eq!(h.store.list_retired(h.domain.id).await.unwrap().len(), 1);

    assert_eq!(h.worker.pass().await, 0);
    let remote = h.provider.records(DOMAIN);
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0].spec.record_type, RecordType::Aaaa);
    assert_eq!(remote[0].spec.value, "2001:db8::5");
    assert!(h.store.list_retired(h.domain.id).await.unwrap().is_empty());

    // Nothing left to remove: no further deletes
    let deletes = h.provider.delete_calls.load(std::sync::atomic::Ordering::SeqCst);
    assert_eq!(h.worker.pass().await, 0);
    assert_eq!(h.provider.delete_calls.load(std::sync::atomic::Ordering::SeqCst), deletes);
}

#[tokio::test]
async fn adding_apex_to_a_rotated_wildcard_pool_writes_it() {
    let h = Harness::new().await;
    h.fleet.upsert_machine(machine(5, "5.5.5.5", Utc::now()));
    let members = vec![MemberInput::new(5, 0)];
    let pool = wildcard_pool(&h, false, &members).await;
    assert_ok!(h.plane.rotate_pool(pool.id).await);

    assert_ok!(
        h.plane
            .update_wildcard_pool(
                pool.id,
                WildcardPoolRequest {
                    domain_id: h.domain.id,
                    include_root: true,
                    pool: PoolRequest {
                        members: members.clone(),
                        ..PoolRequest::default()
                    },
                },
            )
            .await
    );

    // Same single member, but the apex has never been written
    let outcome = assert_ok!(h.plane.rotate_pool(pool.id).await);
    assert!(outcome.is_rotated());
    let apex = h.store.find_record(h.domain.id, &key("@", RecordType::A)).await.unwrap();
    assert_eq!(apex.unwrap().spec.value, "5.5.5.5");

    // With everything in place the next selection only stamps the pool
    let outcome = assert_ok!(h.plane.rotate_pool(pool.id).await);
    assert!(!outcome.is_rotated());
}

#[tokio::test]
async fn hostname_target_cannot_be_written_at_the_apex() {
    let h = Harness::new().await;
    h.fleet.upsert_machine(machine(7, "edge.example.net", Utc::now()));
    let pool = wildcard_pool(&h, true, &[MemberInput::new(7, 0)]).await;

    let err = assert_err!(h.plane.rotate_pool(pool.id).await);
    assert!(matches!(err, Error::Validation(_)));

    for name in ["*", "@"] {
        let record = h.store.find_record(h.domain.id, &key(name, RecordType::Cname)).await.unwrap();
        assert!(record.is_none(), "{name} must not be written");
    }
    let stored = h.store.get_pool(pool.id).await.unwrap().unwrap();
    assert!(stored.last_error.is_some());
    assert!(stored.current_machine_id.is_none());
}

#[tokio::test]
async fn round_robin_visits_every_member_without_repeats() {
    let h = Harness::new().await;
    let now = Utc::now();
    for (id, addr) in [(1, "10.0.0.1"), (2, "10.0.0.2"), (3, "10.0.0.3")] {
        h.fleet.upsert_machine(machine(id, addr, now));
    }
    let members = [MemberInput::new(3, 0), MemberInput::new(1, 1), MemberInput::new(2, 2)];
    let (pool, _) = record_pool(&h, &members, false).await;

    let mut targets = Vec::new();
    let mut indexes = Vec::new();
    for _ in 0..5 {
        let outcome = assert_ok!(h.plane.rotate_pool(pool.id).await);
        assert!(outcome.is_rotated());
        targets.push(outcome.pool().current_machine_id.unwrap());
        indexes.push(outcome.pool().current_index);
    }

    // Priority order: 3, 1, 2
    assert_eq!(targets, vec![3, 1, 2, 3, 1]);
    assert_eq!(indexes, vec![0, 1, 2, 0, 1]);
    assert!(targets.windows(2).all(|w| w[0] != w[1]));
}

#[tokio::test]
async fn group_members_join_after_explicit_members() {
    let h = Harness::new().await;
    let now = Utc::now();
    h.fleet.upsert_machine(machine(1, "10.0.0.1", now));
    h.fleet.upsert_machine(machine(7, "10.0.0.7", now));
    h.fleet.set_group_members(40, vec![7, 1]);

    let record = www_record(&h).await;
    let pool = assert_ok!(
        h.plane
            .create_record_pool(RecordPoolRequest {
                record_id: record.id,
                pool: PoolRequest {
                    members: vec![MemberInput::new(1, 0)],
                    group_ids: vec![40],
                    ..PoolRequest::default()
                },
            })
            .await
    );

    let view = assert_ok!(h.plane.get_pool(pool.id).await);
    let ids: Vec<u64> = view.membership.eligible.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![1, 7]);

    // Membership change is visible on the very next decision
    h.fleet.upsert_machine(machine(8, "10.0.0.8", now));
    h.fleet.set_group_members(40, vec![8]);
    let view = assert_ok!(h.plane.get_pool(pool.id).await);
    let ids: Vec<u64> = view.membership.eligible.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![1, 8]);
}

#[tokio::test]
async fn empty_membership_writes_nothing() {
    let mut h = Harness::new().await;
    // Machine 99 is not in the fleet
    let (pool, record) = record_pool(&h, &[MemberInput::new(99, 0)], false).await;

    let err = assert_err!(h.plane.rotate_pool(pool.id).await);
    assert!(matches!(err, Error::NoEligibleMembers(id) if id == pool.id));

    let stored = h.store.get_record(record.id).await.unwrap().unwrap();
    assert_eq!(stored.spec.value, "192.0.2.1");
    assert!(h.plane.pool_history(pool.id, 10).await.unwrap().is_empty());

    let after = h.store.get_pool(pool.id).await.unwrap().unwrap();
    assert!(after.last_error.is_some());
    assert_eq!(after.current_machine_id, None);

    let events = h.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::RotationFailed { pool_id, .. } if *pool_id == pool.id)));

    // A later success clears the error
    h.fleet.upsert_machine(machine(99, "10.9.9.9", Utc::now()));
    assert_ok!(h.plane.rotate_pool(pool.id).await);
    let after = h.store.get_pool(pool.id).await.unwrap().unwrap();
    assert!(after.last_error.is_none());
}

#[tokio::test]
async fn address_family_must_match_bound_record() {
    let h = Harness::new().await;
    h.fleet.upsert_machine(machine(6, "2001:db8::6", Utc::now()));
    let (pool, record) = record_pool(&h, &[MemberInput::new(6, 0)], false).await;

    let err = assert_err!(h.plane.rotate_pool(pool.id).await);
    assert!(matches!(err, Error::Validation(_)));
    let stored = h.store.get_record(record.id).await.unwrap().unwrap();
    assert_eq!(stored.spec.value, "192.0.2.1");
}

#[tokio::test]
async fn stale_version_commit_writes_nothing() {
    let h = Harness::new().await;
    let members = seed_ab(&h);
    let (pool, record) = record_pool(&h, &members, false).await;

    let stale = h.store.get_pool(pool.id).await.unwrap().unwrap();
    assert_ok!(h.plane.rotate_pool(pool.id).await);

    let commit = RotationCommit {
        pool_id: pool.id,
        expected_version: stale.version,
        machine_id: 2,
        address: "2.2.2.2".to_string(),
        index: 1,
        at: Utc::now(),
        writes: vec![RecordWrite::Existing {
            record_id: record.id,
            value: "2.2.2.2".to_string(),
        }],
        history: NewHistory {
            pool_kind: stale.kind(),
            pool_id: pool.id,
            domain: None,
            record: None,
            from_machine_id: None,
            from_address: None,
            to_machine_id: 2,
            to_address: "2.2.2.2".to_string(),
            trigger: RotationTrigger::Manual,
            created_at: Utc::now(),
        },
    };
    let err = assert_err!(h.store.commit_rotation(commit).await);
    assert!(matches!(err, Error::RaceCondition(id) if id == pool.id));

    let stored = h.store.get_record(record.id).await.unwrap().unwrap();
    assert_eq!(stored.spec.value, "1.1.1.1");
    assert_eq!(h.plane.pool_history(pool.id, 10).await.unwrap().len(), 1);

    let err = assert_err!(h.store.stamp_rotation(pool.id, stale.version, 0, Utc::now()).await);
    assert!(matches!(err, Error::RaceCondition(_)));
}

#[tokio::test]
async fn paused_pool_is_skipped_by_ticks_but_rotates_manually() {
    let h = Harness::new().await;
    let members = seed_ab(&h);
    let (pool, _) = record_pool(&h, &members, false).await;

    let paused = assert_ok!(h.plane.pause_pool(pool.id).await);
    assert!(paused.paused);

    let report = assert_ok!(h.engine.tick().await);
    assert_eq!(report.evaluated, 1);
    assert_eq!(report.paused, 1);
    assert_eq!(report.rotated, 0);
    assert!(h.plane.pool_history(pool.id, 10).await.unwrap().is_empty());

    let outcome = assert_ok!(h.plane.rotate_pool(pool.id).await);
    assert!(outcome.is_rotated());
    assert!(outcome.pool().paused);

    let resumed = assert_ok!(h.plane.resume_pool(pool.id).await);
    assert!(!resumed.paused);
}

#[tokio::test]
async fn tick_rotates_due_pools_once() {
    let h = Harness::new().await;
    let members = seed_ab(&h);
    let (pool, _) = record_pool(&h, &members, false).await;

    let now = Utc::now();
    let report = assert_ok!(h.engine.tick_at(now).await);
    assert_eq!(report.rotated, 1);

    // Interval is an hour; nothing is due a minute later
    let report = assert_ok!(h.engine.tick_at(now + Duration::minutes(1)).await);
    assert_eq!(report.not_due, 1);
    assert_eq!(report.rotated, 0);

    let report = assert_ok!(h.engine.tick_at(now + Duration::minutes(61)).await);
    assert_eq!(report.rotated, 1);

    let log = h.plane.pool_history(pool.id, 10).await.unwrap();
    assert_eq!(log.len(), 2);
    assert!(log.iter().all(|e| e.trigger == RotationTrigger::Scheduled));
}

#[tokio::test]
async fn offline_current_target_triggers_health_rotation() {
    let h = Harness::new().await;
    let members = seed_ab(&h);
    let (pool, record) = record_pool(&h, &members, true).await;

    assert_ok!(h.plane.rotate_pool(pool.id).await);
    h.fleet.heartbeat(1, Utc::now() - Duration::minutes(30));

    let report = assert_ok!(h.engine.tick().await);
    assert_eq!(report.rotated, 1);

    let after = h.store.get_pool(pool.id).await.unwrap().unwrap();
    assert_eq!(after.current_machine_id, Some(2));
    let stored = h.store.get_record(record.id).await.unwrap().unwrap();
    assert_eq!(stored.spec.value, "2.2.2.2");

    let log = h.plane.pool_history(pool.id, 1).await.unwrap();
    assert_eq!(log[0].trigger, RotationTrigger::Health);
    assert_eq!(log[0].from_machine_id, Some(1));

    // Everyone offline: the fallback never counts as a health trigger
    h.fleet.heartbeat(2, Utc::now() - Duration::minutes(30));
    let report = assert_ok!(h.engine.tick().await);
    assert_eq!(report.not_due, 1);
}

#[tokio::test]
async fn updating_a_pool_with_the_wrong_kind_is_rejected() {
    let h = Harness::new().await;
    let members = seed_ab(&h);
    let (pool, _) = record_pool(&h, &members, false).await;

    let err = assert_err!(
        h.plane
            .update_wildcard_pool(
                pool.id,
                WildcardPoolRequest {
                    domain_id: h.domain.id,
                    include_root: false,
                    pool: PoolRequest {
                        members: members.clone(),
                        ..PoolRequest::default()
                    },
                },
            )
            .await
    );
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn bound_record_cannot_be_deleted_until_pool_is_gone() {
    let h = Harness::new().await;
    let members = seed_ab(&h);
    let (pool, record) = record_pool(&h, &members, false).await;
    assert_ok!(h.plane.rotate_pool(pool.id).await);

    let err = assert_err!(h.plane.delete_record(record.id).await);
    assert!(matches!(err, Error::Validation(_)));

    assert_ok!(h.plane.delete_pool(pool.id).await);
    assert_ok!(h.plane.delete_record(record.id).await);

    // History outlives the pool
    assert_eq!(h.plane.pool_history(pool.id, 10).await.unwrap().len(), 1);
}
