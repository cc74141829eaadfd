//! End-to-end engine workflows against a controllable time source.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chronovault::api::Engine;
use chronovault::config::Settings;
use chronovault::crypto::Credential;
use chronovault::errors::ChronoVaultError;
use chronovault::tamper::TamperEvent;
use chronovault::timesource::{ManualTimeProvider, TimeProvider, TimeSourceError, TrustedClock};
use chronovault::vault::format::{read_index, write_index};
use tempfile::TempDir;

const T0: u64 = 1_700_000_000;

struct Fixture {
    _tmp: TempDir,
    dir: PathBuf,
    out: PathBuf,
    work: PathBuf,
    time: Arc<ManualTimeProvider>,
    engine: Engine,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let time = Arc::new(ManualTimeProvider::named("worldtimeapi", T0));
        let local = Arc::clone(&time);
        let clock = TrustedClock::new(
            vec![Arc::clone(&time) as Arc<dyn TimeProvider>],
            Duration::from_secs(5),
            120,
        )
        .with_local_clock(move || local.now());

        Self {
            dir: tmp.path().join("vault"),
            out: tmp.path().join("out"),
            work: tmp.path().to_path_buf(),
            time,
            engine: Engine::with_clock(Settings::fast_kdf(), clock),
            _tmp: tmp,
        }
    }

    fn init(self) -> Self {
        self.engine.init_vault(&self.dir, &password()).unwrap();
        self
    }

    fn source(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.work.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn go_offline(&self) {
        self.time.fail_with(TimeSourceError::NoNetwork {
            provider: "worldtimeapi".into(),
            reason: "connection refused".into(),
        });
    }
}

fn password() -> Credential {
    Credential::new("Secret123")
}

fn read(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap()
}

// ---------------------------------------------------------------------------
// The basic lifecycle
// ---------------------------------------------------------------------------

#[test]
fn report_locks_until_its_date_then_unlocks() {
    let fx = Fixture::new();
    let info = fx.engine.init_vault(&fx.dir, &password()).unwrap();
    assert_eq!(info.created, T0);
    assert!(info.created_trusted);
    assert_eq!(info.time_source.as_deref(), Some("worldtimeapi"));

    let report = fx.source("report.pdf", b"%PDF-1.7 quarterly numbers");
    let added = fx.engine.add_file(&fx.dir, &report, &password(), T0 + 3600).unwrap();
    assert_eq!(added.name, "report.pdf");
    assert_eq!(added.added_at, T0);
    assert!(!added.eligible_now);

    // Half an hour later it is still locked.
    fx.time.set(T0 + 1800);
    let status = fx.engine.status_with_refresh(&fx.dir, &password()).unwrap();
    assert_eq!(status.trusted_time, Some(T0 + 1800));
    assert_eq!(status.files.len(), 1);
    assert!(!status.files[0].eligible);

    let err = fx.engine.unlock_file(&fx.dir, &fx.out, &password(), "report.pdf").unwrap_err();
    assert!(matches!(err, ChronoVaultError::NotEligible { unlock_at, .. } if unlock_at == T0 + 3600));
    assert!(!fx.out.join("report.pdf").exists());

    // One second past the unlock time it opens.
    fx.time.set(T0 + 3601);
    let unlocked = fx.engine.unlock_file(&fx.dir, &fx.out, &password(), "report.pdf").unwrap();
    assert_eq!(unlocked.output_path, fx.out.join("report.pdf"));
    assert_eq!(read(&unlocked.output_path), b"%PDF-1.7 quarterly numbers");
    assert!(unlocked.warnings.is_empty());
}

#[test]
fn same_name_is_refused_then_accepted_under_a_new_name() {
    let fx = Fixture::new().init();
    let report = fx.source("report.pdf", b"v1");
    fx.engine.add_file(&fx.dir, &report, &password(), T0 + 3600).unwrap();

    let err = fx.engine.add_file(&fx.dir, &report, &password(), T0 + 7200).unwrap_err();
    assert_eq!(err.to_string(), "FILE_EXISTS:report.pdf");
    assert_eq!(err.collision_name(), Some("report.pdf"));

    let retry = fx
        .engine
        .add_file_with_custom_name(&fx.dir, &report, &password(), T0 + 7200, "report (1).pdf")
        .unwrap();
    assert_eq!(retry.name, "report (1).pdf");

    let status = fx.engine.status_with_password(&fx.dir, &password()).unwrap();
    let names: Vec<_> = status.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["report.pdf", "report (1).pdf"]);
}

#[test]
fn renaming_gives_up_after_ten_suffixes() {
    let fx = Fixture::new().init();
    let notes = fx.source("notes.txt", b"n");
    fx.engine.add_file(&fx.dir, &notes, &password(), T0).unwrap();
    for n in 1..=10 {
        let name = format!("notes ({n}).txt");
        fx.engine
            .add_file_with_custom_name(&fx.dir, &notes, &password(), T0, &name)
            .unwrap();
    }

    let err = fx
        .engine
        .add_file_renaming(&fx.dir, &notes, &password(), T0, None)
        .unwrap_err();
    assert!(matches!(err, ChronoVaultError::TooManySimilarNames(_)));
    assert_eq!(
        fx.engine.status_with_password(&fx.dir, &password()).unwrap().files.len(),
        11
    );
}

#[test]
fn wrong_password_changes_nothing() {
    let fx = Fixture::new().init();
    let notes = fx.source("notes.txt", b"n");

    let wrong = Credential::new("Secret124");
    assert!(matches!(
        fx.engine.verify_vault_password(&fx.dir, &wrong),
        Err(ChronoVaultError::WrongPassword)
    ));
    assert!(matches!(
        fx.engine.add_file(&fx.dir, &notes, &wrong, T0),
        Err(ChronoVaultError::WrongPassword)
    ));
    assert!(fx.engine.verify_vault_password(&fx.dir, &password()).is_ok());
    assert!(fx
        .engine
        .status_with_password(&fx.dir, &password())
        .unwrap()
        .files
        .is_empty());
}

#[test]
fn past_dated_file_is_eligible_at_once() {
    let fx = Fixture::new().init();
    let old = fx.source("old.txt", b"already due");
    let added = fx.engine.add_file(&fx.dir, &old, &password(), T0 - 86_400).unwrap();
    assert!(added.eligible_now);

    let unlocked = fx.engine.unlock_file(&fx.dir, &fx.out, &password(), "old.txt").unwrap();
    assert_eq!(read(&unlocked.output_path), b"already due");
}

#[test]
fn unlocking_twice_never_overwrites() {
    let fx = Fixture::new().init();
    let note = fx.source("note.txt", b"hello");
    fx.engine.add_file(&fx.dir, &note, &password(), T0 - 10).unwrap();

    let first = fx.engine.unlock_file(&fx.dir, &fx.out, &password(), "note.txt").unwrap();
    let second = fx.engine.unlock_file(&fx.dir, &fx.out, &password(), "note.txt").unwrap();
    assert_eq!(first.output_path, fx.out.join("note.txt"));
    assert_eq!(second.output_path, fx.out.join("note (1).txt"));
}

#[test]
fn unknown_name_is_not_found() {
    let fx = Fixture::new().init();
    let err = fx.engine.unlock_file(&fx.dir, &fx.out, &password(), "ghost.txt").unwrap_err();
    assert!(matches!(err, ChronoVaultError::EntryNotFound(_)));
}

#[test]
fn unlock_all_reports_each_file() {
    let fx = Fixture::new().init();
    let a = fx.source("a.txt", b"a");
    let b = fx.source("b.txt", b"b");
    let c = fx.source("c.txt", b"c");
    fx.engine.add_file(&fx.dir, &a, &password(), T0 + 10).unwrap();
    fx.engine.add_file(&fx.dir, &b, &password(), T0 + 20).unwrap();
    fx.engine.add_file(&fx.dir, &c, &password(), T0 + 86_400).unwrap();

    fx.time.set(T0 + 60);
    let summary = fx.engine.unlock_vault(&fx.dir, &fx.out, &password()).unwrap();

    assert_eq!(summary.unlocked.len(), 2);
    assert!(summary.failures.is_empty());
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.skipped[0].name, "c.txt");
    assert_eq!(read(&fx.out.join("a.txt")), b"a");
    assert_eq!(read(&fx.out.join("b.txt")), b"b");
    assert!(!fx.out.join("c.txt").exists());
}

// ---------------------------------------------------------------------------
// Trusted time
// ---------------------------------------------------------------------------

#[test]
fn rollback_is_reported_and_still_adopted() {
    let fx = Fixture::new().init();
    fx.time.set(T0 + 3601);
    fx.engine.status_with_refresh(&fx.dir, &password()).unwrap();

    fx.time.set(T0);
    let status = fx.engine.status_with_refresh(&fx.dir, &password()).unwrap();

    assert!(status.tamper_events.iter().any(|e| matches!(
        e,
        TamperEvent::TimeRollback { previous, observed, .. }
            if *previous == T0 + 3601 && *observed == T0
    )));
    assert_eq!(status.trusted_time, Some(T0));
    assert_eq!(fx.engine.vault_info(&fx.dir).unwrap().last_server_time, Some(T0));
}

#[test]
fn offline_unlock_uses_the_cached_anchor() {
    let fx = Fixture::new().init();
    let soon = fx.source("soon.txt", b"s");
    fx.engine.add_file(&fx.dir, &soon, &password(), T0 + 60).unwrap();

    fx.go_offline();
    fx.time.set(T0 + 3600);
    let err = fx.engine.unlock_file(&fx.dir, &fx.out, &password(), "soon.txt").unwrap_err();
    match err {
        ChronoVaultError::NotEligible { trusted_now, .. } => assert_eq!(trusted_now, Some(T0)),
        other => panic!("expected NotEligible, got {other:?}"),
    }

    fx.time.recover();
    assert!(fx.engine.unlock_file(&fx.dir, &fx.out, &password(), "soon.txt").is_ok());
}

#[test]
fn offline_status_refresh_is_marked_stale() {
    let fx = Fixture::new().init();
    fx.go_offline();

    let status = fx.engine.status_with_refresh(&fx.dir, &password()).unwrap();
    assert!(status.time_is_stale);
    assert_eq!(status.trusted_time, Some(T0));
    assert!(status.time_warning.is_some());

    let info = fx.engine.refresh_server_time(&fx.dir).unwrap();
    assert!(info.is_stale);
    assert_eq!(info.last_server_time, Some(T0));
    assert!(!info.warnings.is_empty());
}

#[test]
fn vault_created_offline_cannot_unlock_until_time_is_known() {
    let fx = Fixture::new();
    fx.go_offline();

    let info = fx.engine.init_vault(&fx.dir, &password()).unwrap();
    assert!(!info.created_trusted);
    assert!(info.last_server_time.is_none());
    assert!(!info.warnings.is_empty());

    let old = fx.source("old.txt", b"o");
    let added = fx.engine.add_file(&fx.dir, &old, &password(), 1).unwrap();
    assert_eq!(added.added_at, 0);
    assert!(!added.eligible_now);

    let err = fx.engine.unlock_vault(&fx.dir, &fx.out, &password()).unwrap_err();
    assert!(matches!(err, ChronoVaultError::TimeSourceUnavailable(_)));
    let err = fx.engine.unlock_file(&fx.dir, &fx.out, &password(), "old.txt").unwrap_err();
    assert!(matches!(err, ChronoVaultError::TimeSourceUnavailable(_)));

    fx.time.recover();
    assert!(fx.engine.unlock_file(&fx.dir, &fx.out, &password(), "old.txt").is_ok());
}

#[test]
fn info_needs_no_password_and_no_network() {
    let fx = Fixture::new().init();
    fx.go_offline();
    let info = fx.engine.vault_info(&fx.dir).unwrap();
    assert_eq!(info.created, T0);
    assert_eq!(info.last_server_time, Some(T0));
    assert!(!info.is_stale);
}

// ---------------------------------------------------------------------------
// Tampering
// ---------------------------------------------------------------------------

#[test]
fn corrupted_record_tag_hides_only_that_entry() {
    let fx = Fixture::new().init();
    let a = fx.source("a.txt", b"a");
    let b = fx.source("b.txt", b"b");
    fx.engine.add_file(&fx.dir, &a, &password(), T0 - 10).unwrap();
    fx.engine.add_file(&fx.dir, &b, &password(), T0 - 10).unwrap();

    let mut body = read_index(&fx.dir).unwrap();
    let record = body
        .records
        .iter_mut()
        .find(|r| r.name() == Some("b.txt"))
        .and_then(|r| r.parsed_mut())
        .unwrap();
    record.sealed.tag[3] ^= 0xFF;
    write_index(&fx.dir, &body).unwrap();

    let status = fx.engine.status_with_password(&fx.dir, &password()).unwrap();
    assert_eq!(
        status.tamper_events,
        vec![TamperEvent::IntegrityMismatch { entry: "b.txt".into() }]
    );
    let a_row = status.files.iter().find(|f| f.name == "a.txt").unwrap();
    let b_row = status.files.iter().find(|f| f.name == "b.txt").unwrap();
    assert!(a_row.eligible && a_row.tamper_events.is_empty());
    assert!(!b_row.eligible && b_row.unlock_timestamp.is_none());

    assert!(fx.engine.unlock_file(&fx.dir, &fx.out, &password(), "a.txt").is_ok());
    let err = fx.engine.unlock_file(&fx.dir, &fx.out, &password(), "b.txt").unwrap_err();
    assert!(matches!(err, ChronoVaultError::TamperDetected(_)));

    // The damaged name stays reserved.
    let err = fx.engine.add_file(&fx.dir, &b, &password(), T0).unwrap_err();
    assert_eq!(err.to_string(), "FILE_EXISTS:b.txt");
}

#[test]
fn add_after_a_deleted_record_is_refused_and_leaves_no_blob() {
    let fx = Fixture::new().init();
    let a = fx.source("a.txt", b"a");
    let b = fx.source("b.txt", b"b");
    let c = fx.source("c.txt", b"c");
    fx.engine.add_file(&fx.dir, &a, &password(), T0 + 60).unwrap();
    fx.engine.add_file(&fx.dir, &b, &password(), T0 + 60).unwrap();

    let mut body = read_index(&fx.dir).unwrap();
    body.records.remove(0);
    write_index(&fx.dir, &body).unwrap();
    let blobs = fs::read_dir(fx.dir.join("blobs")).unwrap().count();

    let err = fx.engine.add_file(&fx.dir, &c, &password(), T0 + 60).unwrap_err();
    assert!(matches!(err, ChronoVaultError::TamperDetected(_)));
    assert_eq!(fs::read_dir(fx.dir.join("blobs")).unwrap().count(), blobs);

    let status = fx.engine.status_with_password(&fx.dir, &password()).unwrap();
    assert!(status
        .tamper_events
        .contains(&TamperEvent::ManifestMismatch { expected: 2, found: 1 }));
}

#[test]
fn unlock_all_lists_damaged_entries_as_failures() {
    let fx = Fixture::new().init();
    let a = fx.source("a.txt", b"a");
    let b = fx.source("b.txt", b"b");
    fx.engine.add_file(&fx.dir, &a, &password(), T0 - 10).unwrap();
    fx.engine.add_file(&fx.dir, &b, &password(), T0 - 10).unwrap();

    let mut body = read_index(&fx.dir).unwrap();
    body.records[0].parsed_mut().unwrap().sealed.ciphertext[0] ^= 0x01;
    write_index(&fx.dir, &body).unwrap();

    let summary = fx.engine.unlock_vault(&fx.dir, &fx.out, &password()).unwrap();
    assert_eq!(summary.unlocked.len(), 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].name, "a.txt");
    assert!(!summary.warnings.is_empty());
}
