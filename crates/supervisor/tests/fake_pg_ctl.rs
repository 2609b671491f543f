//! Supervisor tests against a scripted pg_ctl
//!
//! The fake binary records every invocation in `calls.log` next to itself and
//! simulates a server with a `running` marker file inside the data directory.
//! Marker files next to the binary inject failures:
//! - `fail_initdb`: initdb writes partial output then exits 1
//! - `status_broken`: status exits 4
//! - `fail_start`: start/restart exits 1
//! - `fail_start_running`: start/restart brings the server up but exits 1
//! - `start_timeout`: start/restart brings the server up, then reports that
//!   it did not start in time
//! - `slow_start`: start/restart brings the server up, then hangs

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use pgkv_core::{Context, Error, ErrorKind};
use pgkv_supervisor::{
    PgCtl, ServerStatus, Supervisor, SupervisorError, SupervisorOptions, SERVER_CONFIG_FILE,
};
use tempfile::TempDir;

// Writing an executable while another test thread forks can fail the exec
// with ETXTBSY, so these tests run one at a time.
static SERIAL: Mutex<()> = parking_lot::const_mutex(());

const SCRIPT: &str = r#"#!/bin/sh
here=$(dirname "$0")
echo "$@" >> "$here/calls.log"
cmd=$1
shift
dir=""
while [ $# -gt 0 ]; do
  case "$1" in
    -D) dir=$2; shift 2 ;;
    *) shift ;;
  esac
done
case "$cmd" in
  initdb)
    mkdir -p "$dir"
    echo 16 > "$dir/PG_VERSION"
    if [ -e "$here/fail_initdb" ]; then
      echo "initdb: error: simulated failure" >&2
      exit 1
    fi
    exit 0 ;;
  status)
    if [ -e "$here/status_broken" ]; then
      echo "pg_ctl: directory is not a database cluster directory" >&2
      exit 4
    fi
    if [ -e "$dir/running" ]; then
      echo "pg_ctl: server is running"
      exit 0
    fi
    echo "pg_ctl: no server running"
    exit 3 ;;
  start|restart)
    if [ -e "$here/start_timeout" ]; then
      touch "$dir/running"
      echo "pg_ctl: server did not start in time" >&2
      exit 1
    fi
    if [ -e "$here/slow_start" ]; then
      touch "$dir/running"
      sleep 5
      exit 0
    fi
    if [ -e "$here/fail_start_running" ]; then
      touch "$dir/running"
      echo "pg_ctl: another server might be running" >&2
      exit 1
    fi
    if [ -e "$here/fail_start" ]; then
      echo "pg_ctl: could not start server" >&2
      exit 1
    fi
    touch "$dir/running" "$dir/postmaster.opts"
    echo "server started"
    exit 0 ;;
  stop)
    rm -f "$dir/running"
    echo "server stopped"
    exit 0 ;;
esac
exit 2
"#;

struct Fixture {
    _root: TempDir,
    bin_dir: PathBuf,
    data_dir: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let bin_dir = dir.path().join("bin");
        fs::create_dir(&bin_dir).unwrap();
        let script = bin_dir.join("pg_ctl");
        fs::write(&script, SCRIPT).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        let data_dir = dir.path().join("db").join("database");
        Fixture {
            _root: dir,
            bin_dir,
            data_dir,
        }
    }

    fn supervisor(&self, create_database: bool) -> Supervisor {
        Supervisor::locate(Some(&self.bin_dir.join("pg_ctl")))
            .unwrap()
            .with_options(SupervisorOptions {
                create_database,
                connect_timeout: Duration::from_secs(2),
                ..SupervisorOptions::default()
            })
    }

    fn marker(&self, name: &str) {
        fs::write(self.bin_dir.join(name), "").unwrap();
    }

    /// Subcommands in call order
    fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.bin_dir.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .filter_map(|line| line.split_whitespace().next().map(str::to_string))
            .collect()
    }

    fn running(&self) -> bool {
        self.data_dir.join("running").exists()
    }

    fn staging_dirs(&self) -> Vec<PathBuf> {
        let parent = self.data_dir.parent().unwrap();
        match fs::read_dir(parent) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| is_staging(p))
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

fn is_staging(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(".pgdir"))
        .unwrap_or(false)
}

#[test]
fn test_fresh_start_initializes_and_owns_server() {
    let _serial = SERIAL.lock();
    let fx = Fixture::new();
    let ctx = Context::background();

    let handle = fx.supervisor(false).start(&ctx, &fx.data_dir).unwrap();
    assert!(handle.is_owner());
    assert_eq!(handle.data_dir(), fx.data_dir.as_path());
    assert!(fx.data_dir.join("PG_VERSION").exists());
    assert!(fx.running());
    assert!(fx.staging_dirs().is_empty());
    assert_eq!(fx.calls(), vec!["initdb", "status", "start"]);

    handle.stop().unwrap();
    assert!(!fx.running());
    assert_eq!(fx.calls().last().map(String::as_str), Some("stop"));
}

#[test]
fn test_initdb_settings_written_to_config_file() {
    let _serial = SERIAL.lock();
    let fx = Fixture::new();

    let handle = fx
        .supervisor(false)
        .start(&Context::background(), &fx.data_dir)
        .unwrap();

    // initdb before PostgreSQL 16 rejects -c, so settings go to the file
    let log = fs::read_to_string(fx.bin_dir.join("calls.log")).unwrap();
    let initdb_line = log.lines().next().unwrap();
    assert!(initdb_line.starts_with("initdb"));
    assert!(!initdb_line.contains("-c "), "{initdb_line}");
    assert!(initdb_line.contains("--auth-local=trust"));

    let conf = fs::read_to_string(fx.data_dir.join(SERVER_CONFIG_FILE)).unwrap();
    assert!(conf.contains("listen_addresses = ''"));
    let socket_setting = format!("unix_socket_directories = '{}'", fx.data_dir.display());
    assert!(conf.contains(&socket_setting), "{conf}");
    handle.stop().unwrap();
}

#[test]
fn test_start_timeout_stops_server() {
    let _serial = SERIAL.lock();
    let fx = Fixture::new();
    fx.marker("start_timeout");

    let err = fx
        .supervisor(false)
        .start(&Context::background(), &fx.data_dir)
        .unwrap_err();
    assert!(matches!(err, SupervisorError::StartTimeout { .. }), "{err}");
    assert!(!fx.running());
    assert_eq!(fx.calls(), vec!["initdb", "status", "start", "stop"]);
}

#[test]
fn test_deadline_during_start_stops_server() {
    let _serial = SERIAL.lock();
    let fx = Fixture::new();
    fx.marker("slow_start");
    let ctx = Context::background().with_timeout(Duration::from_millis(500));

    let err = fx.supervisor(false).start(&ctx, &fx.data_dir).unwrap_err();
    assert!(matches!(err, SupervisorError::DeadlineExceeded), "{err}");
    assert!(!fx.running());
    assert_eq!(fx.calls(), vec!["initdb", "status", "start", "stop"]);
}

#[test]
fn test_initdb_failure_leaves_nothing_behind() {
    let _serial = SERIAL.lock();
    let fx = Fixture::new();
    fx.marker("fail_initdb");

    let err = fx
        .supervisor(false)
        .start(&Context::background(), &fx.data_dir)
        .unwrap_err();
    assert!(matches!(err, SupervisorError::InitFailed { .. }));
    assert!(err.to_string().contains("simulated failure"));
    assert!(!fx.data_dir.exists());
    assert!(fx.staging_dirs().is_empty());
    assert_eq!(fx.calls(), vec!["initdb"]);
}

#[test]
fn test_already_running_is_not_owned() {
    let _serial = SERIAL.lock();
    let fx = Fixture::new();
    fs::create_dir_all(&fx.data_dir).unwrap();
    fs::write(fx.data_dir.join("running"), "").unwrap();

    let handle = fx
        .supervisor(true)
        .start(&Context::background(), &fx.data_dir)
        .unwrap();
    assert!(!handle.is_owner());
    handle.stop().unwrap();

    assert!(fx.running());
    assert_eq!(fx.calls(), vec!["status"]);
}

#[test]
fn test_start_is_idempotent() {
    let _serial = SERIAL.lock();
    let fx = Fixture::new();
    let ctx = Context::background();
    let supervisor = fx.supervisor(false);

    let first = supervisor.start(&ctx, &fx.data_dir).unwrap();
    let second = supervisor.start(&ctx, &fx.data_dir).unwrap();
    assert!(first.is_owner());
    assert!(!second.is_owner());

    drop(second);
    assert!(fx.running());
    first.stop().unwrap();
    assert!(!fx.running());
}

#[test]
fn test_previous_run_uses_restart() {
    let _serial = SERIAL.lock();
    let fx = Fixture::new();
    fs::create_dir_all(&fx.data_dir).unwrap();
    fs::write(fx.data_dir.join("postmaster.opts"), "").unwrap();

    let handle = fx
        .supervisor(false)
        .start(&Context::background(), &fx.data_dir)
        .unwrap();
    assert_eq!(fx.calls(), vec!["status", "restart"]);
    handle.stop().unwrap();
}

#[test]
fn test_drop_stops_owned_server() {
    let _serial = SERIAL.lock();
    let fx = Fixture::new();
    let handle = fx
        .supervisor(false)
        .start(&Context::background(), &fx.data_dir)
        .unwrap();
    assert!(fx.running());
    drop(handle);
    assert!(!fx.running());
}

#[test]
fn test_detach_leaves_server_running() {
    let _serial = SERIAL.lock();
    let fx = Fixture::new();
    let handle = fx
        .supervisor(false)
        .start(&Context::background(), &fx.data_dir)
        .unwrap();
    handle.detach();
    assert!(fx.running());
    assert!(!fx.calls().contains(&"stop".to_string()));
}

#[test]
fn test_catalog_failure_stops_server() {
    let _serial = SERIAL.lock();
    let fx = Fixture::new();

    // No real server listens on the socket, so the catalog connection fails
    let err = fx
        .supervisor(true)
        .start(&Context::background(), &fx.data_dir)
        .unwrap_err();
    assert!(matches!(err, SupervisorError::Catalog { .. }), "{err}");
    assert!(!fx.running());
    assert_eq!(fx.calls(), vec!["initdb", "status", "start", "stop"]);

    let err: Error = err.into();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
}

#[test]
fn test_status_failure() {
    let _serial = SERIAL.lock();
    let fx = Fixture::new();
    fs::create_dir_all(&fx.data_dir).unwrap();
    fx.marker("status_broken");

    let supervisor = fx.supervisor(false);
    let err = supervisor
        .status(&Context::background(), &fx.data_dir)
        .unwrap_err();
    assert!(matches!(err, SupervisorError::StatusFailed { code: Some(4), .. }));

    let err = supervisor
        .start(&Context::background(), &fx.data_dir)
        .unwrap_err();
    assert!(matches!(err, SupervisorError::StatusFailed { .. }));
}

#[test]
fn test_status_reports_state() {
    let _serial = SERIAL.lock();
    let fx = Fixture::new();
    fs::create_dir_all(&fx.data_dir).unwrap();
    let supervisor = fx.supervisor(false);
    let ctx = Context::background();

    assert_eq!(supervisor.status(&ctx, &fx.data_dir).unwrap(), ServerStatus::NotRunning);
    fs::write(fx.data_dir.join("running"), "").unwrap();
    assert_eq!(supervisor.status(&ctx, &fx.data_dir).unwrap(), ServerStatus::Running);
}

#[test]
fn test_start_failure() {
    let _serial = SERIAL.lock();
    let fx = Fixture::new();
    fx.marker("fail_start");

    let err = fx
        .supervisor(false)
        .start(&Context::background(), &fx.data_dir)
        .unwrap_err();
    assert!(matches!(err, SupervisorError::StartFailed { .. }));
    assert!(err.to_string().contains("could not start server"));
    assert!(!fx.running());
}

#[test]
fn test_lost_start_race_attaches() {
    let _serial = SERIAL.lock();
    let fx = Fixture::new();
    fx.marker("fail_start_running");

    let handle = fx
        .supervisor(false)
        .start(&Context::background(), &fx.data_dir)
        .unwrap();
    assert!(!handle.is_owner());
    assert!(fx.running());
    assert_eq!(fx.calls(), vec!["initdb", "status", "start", "status"]);
}

#[test]
fn test_relative_data_dir_is_made_absolute() {
    let _serial = SERIAL.lock();
    let fx = Fixture::new();
    let relative = PathBuf::from("relative-pgkv-test-dir");
    let ctx = Context::background();

    let status = fx.supervisor(false).status(&ctx, &relative);
    // The fake reports "not running" for any directory without a marker
    assert_eq!(status.unwrap(), ServerStatus::NotRunning);
    let log = fs::read_to_string(fx.bin_dir.join("calls.log")).unwrap();
    let expected = std::env::current_dir().unwrap().join(&relative);
    assert!(log.contains(&expected.display().to_string()));
}

#[test]
fn test_cancelled_context_runs_nothing() {
    let _serial = SERIAL.lock();
    let fx = Fixture::new();
    let (ctx, cancel) = Context::background().with_cancel();
    cancel.cancel();

    let err = fx.supervisor(true).start(&ctx, &fx.data_dir).unwrap_err();
    assert!(err.is_cancelled());
    assert!(fx.calls().is_empty());
    assert!(!fx.data_dir.exists());
}

#[test]
fn test_missing_binary() {
    let dir = TempDir::new().unwrap();
    let err = Supervisor::locate(Some(&dir.path().join("pg_ctl"))).unwrap_err();
    assert!(matches!(err, SupervisorError::BinaryNotFound { .. }));
    let err: Error = err.into();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
}

#[test]
fn test_explicit_path_wins_over_env() {
    let _serial = SERIAL.lock();
    let fx = Fixture::new();
    let explicit = fx.bin_dir.join("pg_ctl");
    let pg_ctl = PgCtl::locate(Some(&explicit)).unwrap();
    assert_eq!(pg_ctl.path(), explicit.as_path());
}
