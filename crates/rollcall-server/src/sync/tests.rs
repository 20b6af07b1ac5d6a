use rollcall_core::wire::CommandType;

use super::*;
use crate::directory::{AttendancePolicy, SqliteDirectory};
use crate::storage::CommandStatus;

struct Fixture {
    db: RollcallDatabase,
    device: Device,
    sync: SyncService,
}

async fn fixture(max_retries: i64) -> Fixture {
    let db = RollcallDatabase::open_in_memory().await.unwrap();
    let device = db.create_device("SN-001", "Gate", "school-1").await.unwrap();
    let directory = Arc::new(SqliteDirectory::new(
        db.clone(),
        AttendancePolicy::new("08:00", 15).unwrap(),
    ));
    let sync = SyncService::new(
        db.clone(),
        PinAllocator::new(db.clone()),
        directory,
        SyncConfig {
            max_retries,
            ..SyncConfig::default()
        },
    );
    Fixture { db, device, sync }
}

async fn command_count(f: &Fixture) -> usize {
    f.db.list_commands(f.device.id, None, 1000).await.unwrap().len()
}

/// Deliver the next command and have the device reject it.
async fn fail_next(f: &Fixture) {
    let cmd = f.db.claim_next_command(f.device.id).await.unwrap().unwrap();
    f.db.finish_command(f.device.id, cmd.id, CommandStatus::Failed, Some("device returned -1"))
        .await
        .unwrap()
        .unwrap();
}

async fn state_of(f: &Fixture, person_id: i64) -> Option<SyncState> {
    f.db.get_sync_status(f.device.id, person_id)
        .await
        .unwrap()
        .and_then(|r| r.state())
}

#[tokio::test]
async fn missing_persons_are_enrolled_in_one_batch() {
    let f = fixture(3).await;
    for id in 1..=3 {
        f.db.upsert_person(id, "school-1", &format!("P{id}"), Some(&format!("C{id}")))
            .await
            .unwrap();
    }
    f.db.upsert_person(4, "school-1", "No card", None).await.unwrap();
    f.db.upsert_person(5, "school-2", "Elsewhere", Some("C5")).await.unwrap();

    let report = f.sync.reconcile_device(&f.device).await.unwrap();
    assert_eq!(report.enrolled, 3);
    assert_eq!(report.commands, 1);

    let cmds = f.db.list_commands(f.device.id, None, 10).await.unwrap();
    assert_eq!(cmds[0].kind(), Some(CommandType::BatchEnroll));
    for id in 1..=3 {
        assert_eq!(state_of(&f, id).await, Some(SyncState::Pending));
    }
    assert_eq!(state_of(&f, 4).await, None);
}

#[tokio::test]
async fn single_missing_person_gets_a_plain_enroll() {
    let f = fixture(3).await;
    f.db.upsert_person(1, "school-1", "Ann", Some("C1")).await.unwrap();

    f.sync.reconcile_device(&f.device).await.unwrap();
    let cmds = f.db.list_commands(f.device.id, None, 10).await.unwrap();
    assert_eq!(cmds.len(), 1);
    assert_eq!(cmds[0].kind(), Some(CommandType::Enroll));
}

#[tokio::test]
async fn rerun_on_unchanged_state_queues_nothing() {
    let f = fixture(3).await;
    f.db.upsert_person(1, "school-1", "Ann", Some("C1")).await.unwrap();
    f.db.upsert_person(2, "school-1", "Bob", Some("C2")).await.unwrap();

    f.sync.reconcile_device(&f.device).await.unwrap();
    let after_first = command_count(&f).await;

    let report = f.sync.reconcile_device(&f.device).await.unwrap();
    assert_eq!(report.commands, 0);
    assert_eq!(command_count(&f).await, after_first);

    // Delivery progress does not disturb convergence either.
    f.db.claim_next_command(f.device.id).await.unwrap();
    let report = f.sync.reconcile_device(&f.device).await.unwrap();
    assert_eq!(report.commands, 0);
}

#[tokio::test]
async fn departed_person_is_removed_once() {
    let f = fixture(3).await;
    f.db.upsert_person(1, "school-1", "Ann", Some("C1")).await.unwrap();
    f.sync.reconcile_device(&f.device).await.unwrap();

    f.db.deactivate_person(1).await.unwrap();
    let report = f.sync.reconcile_device(&f.device).await.unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(report.commands, 1);
    assert_eq!(state_of(&f, 1).await, Some(SyncState::Deleted));
    assert!(f.db.list_mappings(f.device.id).await.unwrap().is_empty());

    let again = f.sync.reconcile_device(&f.device).await.unwrap();
    assert_eq!(again.commands, 0);
}

#[tokio::test]
async fn failed_enrollment_is_retried_up_to_the_bound() {
    let f = fixture(2).await;
    f.db.upsert_person(1, "school-1", "Ann", Some("C1")).await.unwrap();
    f.sync.reconcile_device(&f.device).await.unwrap();
    fail_next(&f).await;
    assert_eq!(state_of(&f, 1).await, Some(SyncState::Failed));

    for attempt in 1..=2 {
        let report = f.sync.reconcile_device(&f.device).await.unwrap();
        assert_eq!(report.retried, 1, "attempt {attempt}");
        fail_next(&f).await;
    }

    let row = f.db.get_sync_status(f.device.id, 1).await.unwrap().unwrap();
    assert_eq!(row.retry_count, 2);

    let before = command_count(&f).await;
    let report = f.sync.reconcile_device(&f.device).await.unwrap();
    assert_eq!(report.exhausted, 1);
    assert_eq!(report.commands, 0);
    assert_eq!(command_count(&f).await, before);
    assert_eq!(state_of(&f, 1).await, Some(SyncState::Failed));
}

#[tokio::test]
async fn retried_enrollment_reuses_pin_and_resets_on_success() {
    let f = fixture(3).await;
    f.db.upsert_person(1, "school-1", "Ann", Some("C1")).await.unwrap();
    f.sync.reconcile_device(&f.device).await.unwrap();
    fail_next(&f).await;

    f.sync.reconcile_device(&f.device).await.unwrap();
    let cmd = f.db.claim_next_command(f.device.id).await.unwrap().unwrap();
    f.db.finish_command(f.device.id, cmd.id, CommandStatus::Completed, None)
        .await
        .unwrap();

    let row = f.db.get_sync_status(f.device.id, 1).await.unwrap().unwrap();
    assert_eq!(row.state(), Some(SyncState::Synced));
    assert_eq!(row.retry_count, 0);
    assert_eq!(row.pin, Some(1));
}

#[tokio::test]
async fn failed_removal_is_redriven_with_remembered_pin() {
    let f = fixture(3).await;
    f.db.upsert_person(1, "school-1", "Ann", Some("C1")).await.unwrap();
    f.sync.reconcile_device(&f.device).await.unwrap();
    f.db.claim_next_command(f.device.id).await.unwrap();

    f.db.deactivate_person(1).await.unwrap();
    f.sync.reconcile_device(&f.device).await.unwrap();
    fail_next(&f).await;
    assert_eq!(state_of(&f, 1).await, Some(SyncState::Failed));

    let report = f.sync.reconcile_device(&f.device).await.unwrap();
    assert_eq!(report.retried, 1);
    assert_eq!(report.commands, 1);
    let cmds = f.db.list_commands(f.device.id, Some(CommandStatus::Pending), 10).await.unwrap();
    assert_eq!(cmds[0].command, format!("C:{}:DATA DELETE user Pin=1", cmds[0].id));
}

#[tokio::test]
async fn crud_hooks_fan_out_to_tenant_devices() {
    let f = fixture(3).await;
    let second = f.db.create_device("SN-002", "Back", "school-1").await.unwrap();
    f.db.create_device("SN-003", "Other school", "school-2").await.unwrap();
    f.db.upsert_person(9, "school-1", "Ann", Some("C9")).await.unwrap();

    assert_eq!(f.sync.enroll_person("school-1", 9).await.unwrap(), 2);
    assert_eq!(f.db.list_mappings(second.id).await.unwrap().len(), 1);

    assert_eq!(f.sync.remove_person("school-1", 9).await.unwrap(), 2);
    assert_eq!(f.sync.remove_person("school-1", 9).await.unwrap(), 0);

    assert!(matches!(
        f.sync.enroll_person("school-2", 9).await,
        Err(SyncError::PersonNotFound(9))
    ));
}

#[tokio::test]
async fn run_once_covers_all_active_devices() {
    let f = fixture(3).await;
    let other = f.db.create_device("SN-002", "Back", "school-1").await.unwrap();
    f.db.deactivate_device(other.id).await.unwrap();
    f.db.upsert_person(1, "school-1", "Ann", Some("C1")).await.unwrap();

    let reports = f.sync.run_once().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].device_id, f.device.id);
}
