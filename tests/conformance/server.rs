//! Supervision of a real server
//!
//! Skips when pg_ctl cannot be found or initdb refuses to run.

use pgkv::supervisor::{ServerStatus, Supervisor, SupervisorError};
use pgkv::Context;
use tempfile::TempDir;

use crate::common::init_tracing;

fn supervisor_or_skip() -> Option<Supervisor> {
    init_tracing();
    match Supervisor::locate(None) {
        Ok(supervisor) => Some(supervisor),
        Err(e) if e.is_missing_installation() => {
            eprintln!("skipping: {}", e);
            None
        }
        Err(e) => panic!("locating pg_ctl failed: {}", e),
    }
}

#[test]
fn start_is_idempotent_and_stop_releases() {
    let Some(supervisor) = supervisor_or_skip() else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("database");
    let ctx = Context::background();

    let owner = match supervisor.start(&ctx, &data_dir) {
        Ok(handle) => handle,
        Err(e) if e.is_missing_installation() => {
            eprintln!("skipping: {}", e);
            return;
        }
        Err(e) => panic!("start failed: {}", e),
    };
    assert!(owner.is_owner());
    assert!(Supervisor::is_initialized(&data_dir));
    assert_eq!(supervisor.status(&ctx, &data_dir).unwrap(), ServerStatus::Running);

    let second = supervisor.start(&ctx, &data_dir).unwrap();
    assert!(!second.is_owner());
    second.stop().unwrap();
    assert_eq!(supervisor.status(&ctx, &data_dir).unwrap(), ServerStatus::Running);

    owner.stop().unwrap();
    assert_eq!(supervisor.status(&ctx, &data_dir).unwrap(), ServerStatus::NotRunning);
}
