//! Architectural Contract Test: Reconciliation Pass & Apply State
//!
//! Verifies the idempotent backup/install/restore cycle driven by the
//! reconciliation pass.
//!
//! Constraints verified:
//! - A pass over unchanged leases invokes zero scripts
//! - Withdrawing every lease for a kind restores exactly once
//! - A failed backup withholds install and retries identically
//! - One kind's failure never blocks another kind
//!
//! If this test fails, apply-state management is broken.

mod common;

use common::*;
use netlease_core::{
    KindOutcome, LeaseStore, ScriptAction, ScriptSet, SettingKind, SettingsConfig,
};

#[tokio::test]
async fn unchanged_leases_trigger_zero_script_invocations() {
    let mut store = LeaseStore::new();
    store.insert("eth0", dhcp_hostname_lease("worker-1"));

    let executor = MockScriptExecutor::new();
    let (mut engine, _events) = engine_with(&executor, full_config());

    engine.reconcile_all(&store).await.unwrap();
    let after_first = executor.call_count();
    assert_eq!(after_first, 2, "backup + install on the first pass");

    let report = engine.reconcile_all(&store).await.unwrap();
    assert!(report.all_ok());
    assert_eq!(
        executor.call_count(),
        after_first,
        "second pass over unchanged leases runs no scripts"
    );
}

#[tokio::test]
async fn withdrawing_all_leases_restores_exactly_once() {
    let mut store = LeaseStore::new();
    let handle = store.insert("eth0", dhcp_hostname_lease("worker-1"));

    let executor = MockScriptExecutor::new();
    let (mut engine, _events) = engine_with(&executor, full_config());

    engine.reconcile_all(&store).await.unwrap();
    assert!(engine.registry().get(SettingKind::Hostname).have_backup);

    // Lease withdrawn: the kind's sources empty out and the backed-up
    // settings come back.
    store.remove(handle).unwrap();
    let report = engine.reconcile_all(&store).await.unwrap();
    assert_eq!(
        report.outcome(SettingKind::Hostname),
        Some(&KindOutcome::Restored)
    );
    assert_eq!(
        executor.count_for(SettingKind::Hostname, ScriptAction::Restore),
        1
    );

    let updater = engine.registry().get(SettingKind::Hostname);
    assert!(!updater.have_backup);
    assert_eq!(updater.installed_seqno, 0, "reset to the not-installed sentinel");
    assert_eq!(updater.source_count(), 0, "stale sources pruned");

    // Nothing left to restore on the next pass
    engine.reconcile_all(&store).await.unwrap();
    assert_eq!(
        executor.count_for(SettingKind::Hostname, ScriptAction::Restore),
        1,
        "restore runs exactly once"
    );
}

#[tokio::test]
async fn failed_backup_withholds_install_until_it_succeeds() {
    // Scenario: the backup script fails. Install must not run, the
    // updater stays in "needs backup", and the identical step retries
    // every pass until backup succeeds.

    let mut store = LeaseStore::new();
    store.insert("eth0", dhcp_hostname_lease("worker-1"));

    let executor = MockScriptExecutor::new();
    executor.fail(SettingKind::Hostname, ScriptAction::Backup);
    let (mut engine, _events) = engine_with(&executor, full_config());

    for pass in 1..=3 {
        let report = engine.reconcile_all(&store).await.unwrap();
        assert_eq!(
            report.outcome(SettingKind::Hostname),
            Some(&KindOutcome::BackupFailed)
        );
        assert_eq!(
            executor.count_for(SettingKind::Hostname, ScriptAction::Backup),
            pass
        );
        assert_eq!(
            executor.count_for(SettingKind::Hostname, ScriptAction::Install),
            0,
            "install withheld while backup keeps failing"
        );
        let updater = engine.registry().get(SettingKind::Hostname);
        assert!(!updater.have_backup);
        assert_eq!(updater.installed_seqno, 0);
    }

    // Backup recovers: the very next pass backs up and installs
    executor.recover(SettingKind::Hostname, ScriptAction::Backup);
    let report = engine.reconcile_all(&store).await.unwrap();
    assert!(report.all_ok());
    assert_eq!(
        executor.count_for(SettingKind::Hostname, ScriptAction::Install),
        1
    );
    assert!(engine.registry().get(SettingKind::Hostname).have_backup);
}

#[tokio::test]
async fn failed_install_retries_with_seqno_unchanged() {
    let mut store = LeaseStore::new();
    store.insert("eth0", dhcp_hostname_lease("worker-1"));

    let executor = MockScriptExecutor::new();
    executor.fail(SettingKind::Hostname, ScriptAction::Install);
    let (mut engine, _events) = engine_with(&executor, full_config());

    let report = engine.reconcile_all(&store).await.unwrap();
    assert_eq!(
        report.outcome(SettingKind::Hostname),
        Some(&KindOutcome::InstallFailed)
    );
    assert_eq!(engine.registry().get(SettingKind::Hostname).installed_seqno, 0);
    // Backup succeeded and is not repeated on retry
    assert!(engine.registry().get(SettingKind::Hostname).have_backup);

    executor.recover(SettingKind::Hostname, ScriptAction::Install);
    let report = engine.reconcile_all(&store).await.unwrap();
    assert!(report.all_ok());
    assert_eq!(
        executor.count_for(SettingKind::Hostname, ScriptAction::Backup),
        1,
        "backup ran once across both passes"
    );
    assert_eq!(
        executor.count_for(SettingKind::Hostname, ScriptAction::Install),
        2
    );
    assert_ne!(engine.registry().get(SettingKind::Hostname).installed_seqno, 0);
}

#[tokio::test]
async fn one_kind_failure_does_not_block_the_other() {
    let mut store = LeaseStore::new();
    store.insert("eth0", dhcp_hostname_lease("worker-1"));
    store.insert("eth0", dhcp_resolver_lease("10.0.0.53"));

    let executor = MockScriptExecutor::new();
    executor.fail(SettingKind::Hostname, ScriptAction::Install);
    let (mut engine, _events) = engine_with(&executor, full_config());

    let report = engine.reconcile_all(&store).await.unwrap();
    assert!(!report.all_ok());
    assert_eq!(
        report.outcome(SettingKind::Hostname),
        Some(&KindOutcome::InstallFailed)
    );
    assert!(matches!(
        report.outcome(SettingKind::Resolver),
        Some(&KindOutcome::Installed { .. })
    ));
}

#[tokio::test]
async fn install_only_config_skips_backup_and_restore() {
    // Install present but backup/restore missing: unconditional install,
    // and nothing to put back once the lease goes away.

    let mut config = SettingsConfig::new();
    config.set_scripts(
        SettingKind::Hostname,
        ScriptSet::install_only("/etc/netlease/hostname install"),
    );

    let mut store = LeaseStore::new();
    let handle = store.insert("eth0", dhcp_hostname_lease("worker-1"));

    let executor = MockScriptExecutor::new();
    let (mut engine, _events) = engine_with(&executor, config);

    engine.reconcile_all(&store).await.unwrap();
    assert_eq!(
        executor.count_for(SettingKind::Hostname, ScriptAction::Backup),
        0
    );
    assert_eq!(
        executor.count_for(SettingKind::Hostname, ScriptAction::Install),
        1
    );
    assert!(!engine.registry().get(SettingKind::Hostname).have_backup);

    store.remove(handle).unwrap();
    engine.reconcile_all(&store).await.unwrap();
    assert_eq!(
        executor.count_for(SettingKind::Hostname, ScriptAction::Restore),
        0,
        "no backup was taken, so nothing is restored"
    );
}

#[tokio::test]
async fn better_lease_arriving_later_reinstalls_without_second_backup() {
    let mut store = LeaseStore::new();
    store.insert("eth0", dhcp_hostname_lease("dhcp-name"));

    let executor = MockScriptExecutor::new();
    let (mut engine, _events) = engine_with(&executor, full_config());

    engine.reconcile_all(&store).await.unwrap();

    // A firmware lease appears and outranks the installed DHCP one
    store.insert("eth0", firmware_hostname_lease("fw-name"));
    let report = engine.reconcile_all(&store).await.unwrap();
    assert!(matches!(
        report.outcome(SettingKind::Hostname),
        Some(&KindOutcome::Installed { .. })
    ));

    assert_eq!(
        executor.count_for(SettingKind::Hostname, ScriptAction::Backup),
        1,
        "the original backup still covers the pre-lease settings"
    );
    let installs: Vec<_> = executor
        .calls()
        .into_iter()
        .filter(|call| call.action == ScriptAction::Install)
        .collect();
    assert_eq!(installs.len(), 2);
    assert_eq!(installs[1].artifact.as_deref(), Some("fw-name\n"));
}
