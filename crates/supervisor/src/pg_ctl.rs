//! Thin wrapper around the `pg_ctl` binary
//!
//! Each subcommand runs as a child process whose output is captured. While
//! it runs, the caller's [`Context`] is polled; a cancelled context or an
//! expired command time limit kills the child.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use pgkv_core::Context;
use tracing::{debug, info};

use crate::error::{check, SupervisorError};

/// Environment variable overriding the pg_ctl location
pub const PG_CTL_ENV: &str = "PGKV_PG_CTL";

/// Name of the log file `pg_ctl start` writes inside the data directory
pub const SERVER_LOG_FILE: &str = "pg_ctl.log";

/// Server configuration file initdb writes into a new cluster
pub const SERVER_CONFIG_FILE: &str = "postgresql.conf";

/// Install locations searched after `PATH`
const INSTALL_DIRS: &[&str] = &["/usr/local/pgsql/bin", "/opt/homebrew/bin", "/usr/local/bin"];

/// Debian/Ubuntu keep one `bin` dir per major version under here
const VERSIONED_INSTALL_ROOT: &str = "/usr/lib/postgresql";

/// Slack added on top of the pg_ctl wait limit before the child is killed
const COMMAND_GRACE: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// pg_ctl exit code meaning "no server running"
const STATUS_NOT_RUNNING: i32 = 3;

/// Result of `pg_ctl status`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    /// A postmaster is serving the data directory
    Running,
    /// No server is running on the data directory
    NotRunning,
}

/// Captured output of a finished command
#[derive(Debug)]
struct CommandOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl CommandOutput {
    fn combined(&self) -> String {
        let mut out = self.stdout.trim().to_string();
        let err = self.stderr.trim();
        if !err.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(err);
        }
        out
    }
}

/// Resolved `pg_ctl` binary
#[derive(Debug, Clone)]
pub struct PgCtl {
    path: PathBuf,
    wait_timeout: Duration,
}

impl PgCtl {
    /// Use the binary at `path` as-is
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            wait_timeout: Duration::from_secs(60),
        }
    }

    /// Find pg_ctl
    ///
    /// Lookup order: `explicit`, then `$PGKV_PG_CTL`, then `PATH`, then
    /// well-known install directories. The result is made absolute and must
    /// exist.
    ///
    /// # Errors
    ///
    /// `BinaryNotFound` if no candidate exists.
    pub fn locate(explicit: Option<&Path>) -> Result<Self, SupervisorError> {
        let (candidate, tried) = match explicit {
            Some(path) => (Some(path.to_path_buf()), path.display().to_string()),
            None => match env::var_os(PG_CTL_ENV).filter(|v| !v.is_empty()) {
                Some(path) => {
                    let path = PathBuf::from(path);
                    let tried = format!("${} = {}", PG_CTL_ENV, path.display());
                    (Some(path), tried)
                }
                None => (
                    search_path().or_else(search_install_dirs),
                    "PATH and standard install directories".to_string(),
                ),
            },
        };

        let path = candidate.ok_or_else(|| SupervisorError::BinaryNotFound {
            tried: tried.clone(),
        })?;
        let path = crate::absolute_path(&path)
            .map_err(|e| SupervisorError::io("resolving pg_ctl path", e))?;
        if !path.is_file() {
            return Err(SupervisorError::BinaryNotFound { tried });
        }
        debug!(target: "pgkv::supervisor", pg_ctl = %path.display(), "located pg_ctl");
        Ok(Self::new(path))
    }

    /// Set how long pg_ctl waits for start/stop (`-t`)
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Absolute path of the binary
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait limit passed to start/stop
    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// Create a new cluster in `target`, configured to serve `socket_dir`
    ///
    /// The cluster only accepts local trust connections over a unix socket
    /// placed in `socket_dir`; TCP is disabled. Server settings go into
    /// `postgresql.conf` rather than initdb's command line, which only takes
    /// `-c` from PostgreSQL 16 on.
    pub fn initdb(&self, ctx: &Context, target: &Path, socket_dir: &Path) -> Result<(), SupervisorError> {
        let mut args: Vec<OsString> = vec!["initdb".into(), "-D".into(), target.into()];
        for option in ["--auth-host=reject", "--auth-local=trust", "-U postgres"] {
            args.push("-o".into());
            args.push(option.into());
        }

        info!(target: "pgkv::supervisor", data_dir = %socket_dir.display(), "initializing postgres cluster");
        let output = self.run(ctx, "initdb", &args)?;
        if !output.status.success() {
            return Err(SupervisorError::InitFailed {
                data_dir: socket_dir.to_path_buf(),
                output: output.combined(),
            });
        }

        let conf = target.join(SERVER_CONFIG_FILE);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&conf)
            .map_err(|e| SupervisorError::io(format!("opening {}", conf.display()), e))?;
        file.write_all(server_settings(socket_dir).as_bytes())
            .map_err(|e| SupervisorError::io(format!("writing {}", conf.display()), e))?;
        Ok(())
    }

    /// Ask pg_ctl whether a server runs on `data_dir`
    ///
    /// # Errors
    ///
    /// `StatusFailed` for any exit code other than 0 (running) and 3 (not
    /// running).
    pub fn status(&self, ctx: &Context, data_dir: &Path) -> Result<ServerStatus, SupervisorError> {
        let args: Vec<OsString> = vec!["status".into(), "-D".into(), data_dir.into()];
        let output = self.run(ctx, "status", &args)?;
        match output.status.code() {
            Some(0) => Ok(ServerStatus::Running),
            Some(STATUS_NOT_RUNNING) => Ok(ServerStatus::NotRunning),
            code => Err(SupervisorError::StatusFailed {
                data_dir: data_dir.to_path_buf(),
                code,
                output: output.combined(),
            }),
        }
    }

    /// Start the server on `data_dir` and wait until it accepts connections
    ///
    /// With `restart` set, `pg_ctl restart` is used instead of `start`; it
    /// replays the options recorded in `postmaster.opts` by an earlier run.
    pub fn start(&self, ctx: &Context, data_dir: &Path, restart: bool) -> Result<(), SupervisorError> {
        let command = if restart { "restart" } else { "start" };
        let args: Vec<OsString> = vec![
            command.into(),
            "-D".into(),
            data_dir.into(),
            "-l".into(),
            data_dir.join(SERVER_LOG_FILE).into(),
            "--wait".into(),
            "-t".into(),
            self.wait_timeout.as_secs().max(1).to_string().into(),
        ];

        info!(target: "pgkv::supervisor", data_dir = %data_dir.display(), command, "starting postgres");
        let output = self.run(ctx, command, &args)?;
        if output.status.success() {
            return Ok(());
        }
        let combined = output.combined();
        if combined.contains("did not start in time") {
            return Err(SupervisorError::StartTimeout {
                data_dir: data_dir.to_path_buf(),
                timeout: self.wait_timeout,
            });
        }
        Err(SupervisorError::StartFailed {
            data_dir: data_dir.to_path_buf(),
            output: combined,
        })
    }

    /// Stop the server on `data_dir` (fast shutdown) and wait for it to exit
    pub fn stop(&self, ctx: &Context, data_dir: &Path) -> Result<(), SupervisorError> {
        let args: Vec<OsString> = vec![
            "stop".into(),
            "-D".into(),
            data_dir.into(),
            "--wait".into(),
            "-m".into(),
            "fast".into(),
            "-t".into(),
            self.wait_timeout.as_secs().max(1).to_string().into(),
        ];

        info!(target: "pgkv::supervisor", data_dir = %data_dir.display(), "stopping postgres");
        let output = self.run(ctx, "stop", &args)?;
        if !output.status.success() {
            return Err(SupervisorError::StopFailed {
                data_dir: data_dir.to_path_buf(),
                output: output.combined(),
            });
        }
        Ok(())
    }

    fn run(&self, ctx: &Context, command: &'static str, args: &[OsString]) -> Result<CommandOutput, SupervisorError> {
        check(ctx)?;
        debug!(target: "pgkv::supervisor", pg_ctl = %self.path.display(), ?args, "running pg_ctl");

        let mut child = Command::new(&self.path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SupervisorError::io(format!("spawning {}", self.path.display()), e))?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let limit = self.wait_timeout + COMMAND_GRACE;
        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    kill(&mut child);
                    return Err(SupervisorError::io(format!("waiting for pg_ctl {}", command), e));
                }
            }
            if let Err(e) = check(ctx) {
                debug!(target: "pgkv::supervisor", command, "context done, killing pg_ctl");
                kill(&mut child);
                return Err(e);
            }
            if started.elapsed() >= limit {
                kill(&mut child);
                return Err(SupervisorError::CommandTimeout {
                    command,
                    timeout: limit,
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let output = CommandOutput {
            status,
            stdout: collect(stdout),
            stderr: collect(stderr),
        };
        debug!(
            target: "pgkv::supervisor",
            command,
            code = ?output.status.code(),
            output = %output.combined(),
            "pg_ctl finished"
        );
        Ok(output)
    }
}

/// Settings appended to a fresh cluster's `postgresql.conf`
fn server_settings(socket_dir: &Path) -> String {
    format!(
        "\n# pgkv: unix socket only, inside the data directory\n\
         listen_addresses = ''\n\
         unix_socket_directories = {}\n\
         log_min_messages = info\n\
         logging_collector = on\n",
        quote_setting(&socket_dir.display().to_string())
    )
}

/// Quote a string value for `postgresql.conf`
fn quote_setting(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn search_path() -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join("pg_ctl"))
        .find(|candidate| candidate.is_file())
}

fn search_install_dirs() -> Option<PathBuf> {
    let mut versioned: Vec<(Option<u32>, PathBuf)> = fs::read_dir(VERSIONED_INSTALL_ROOT)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .map(|entry| {
            let version = entry.file_name().to_str().and_then(|s| s.parse().ok());
            (version, entry.path().join("bin"))
        })
        .collect();
    // Newest major version first
    versioned.sort_by(|a, b| b.0.cmp(&a.0));

    versioned
        .into_iter()
        .map(|(_, dir)| dir)
        .chain(INSTALL_DIRS.iter().map(PathBuf::from))
        .map(|dir| dir.join("pg_ctl"))
        .find(|candidate| candidate.is_file())
}
