//! Device command layer over the adb binary.
//!
//! This module provides a unified interface for driving one attached device:
//! - `AdbDevice` shells out to adb with a per-command timeout
//! - `DeviceControl` is the seam that lets probes run against a scripted
//!   device in tests
//!
//! Every captured command targets an explicit serial; fire-and-forget input
//! events discard output and suppress errors (the caller re-snapshots to
//! observe the effect).

use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Error types for device operations
#[derive(Debug)]
pub enum DeviceError {
    /// The adb binary could not be executed
    NotRunnable(String),
    /// Zero or more than one attached device, and no serial requested
    NoUniqueDevice(Vec<String>),
    /// The requested serial is not attached (or unauthorized)
    NotFound { serial: String, detected: Vec<String> },
    /// A captured command exited nonzero
    CommandFailed { command: String, detail: String },
    /// A command did not finish within its timeout
    Timeout { command: String, timeout: Duration },
    /// I/O error
    Io(std::io::Error),
}

impl std::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceError::NotRunnable(path) => write!(f, "adb not runnable: {}", path),
            DeviceError::NoUniqueDevice(detected) => write!(
                f,
                "no unique device selected; set SERIAL. Detected devices: {:?}",
                detected
            ),
            DeviceError::NotFound { serial, detected } => write!(
                f,
                "requested device not found/unauthorized: {}. Detected devices: {:?}",
                serial, detected
            ),
            DeviceError::CommandFailed { command, detail } => {
                write!(f, "command failed: {}: {}", command, detail)
            }
            DeviceError::Timeout { command, timeout } => {
                write!(f, "command timed out after {:?}: {}", timeout, command)
            }
            DeviceError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for DeviceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeviceError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DeviceError {
    fn from(err: std::io::Error) -> Self {
        DeviceError::Io(err)
    }
}

/// Trait for device control backends
///
/// Implementations drive a real device (`AdbDevice`) or replay a scripted
/// interaction in tests. Probes only ever talk to this trait.
pub trait DeviceControl {
    /// Run a device shell command and capture its stdout
    fn shell(&self, args: &[&str], timeout: Duration) -> DeviceResult<String>;

    /// Run a device shell command fire-and-forget: output discarded,
    /// timeout and exit status suppressed
    fn run(&self, args: &[&str], timeout: Duration);

    /// Send a one-shot tap input event
    fn tap(&self, x: i32, y: i32, timeout: Duration) {
        self.run(&["input", "tap", &x.to_string(), &y.to_string()], timeout);
    }

    /// Send a one-shot swipe input event
    fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u32, timeout: Duration) {
        self.run(
            &[
                "input",
                "swipe",
                &x1.to_string(),
                &y1.to_string(),
                &x2.to_string(),
                &y2.to_string(),
                &duration_ms.to_string(),
            ],
            timeout,
        );
    }
}

/// A single attached device addressed through adb
#[derive(Debug, Clone)]
pub struct AdbDevice {
    /// Path to the adb binary
    adb_path: String,
    /// Resolved device serial
    serial: String,
}

impl AdbDevice {
    /// Create a device handle for a resolved serial
    pub fn new(adb_path: impl Into<String>, serial: impl Into<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
            serial: serial.into(),
        }
    }

    /// The serial this handle targets
    pub fn serial(&self) -> &str {
        &self.serial
    }

    fn shell_command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.adb_path);
        cmd.args(["-s", &self.serial, "shell"]);
        cmd.args(args);
        cmd
    }
}

impl DeviceControl for AdbDevice {
    fn shell(&self, args: &[&str], timeout: Duration) -> DeviceResult<String> {
        let command = format!("adb -s {} shell {}", self.serial, args.join(" "));
        let output = run_with_timeout(self.shell_command(args), &command, timeout)?;
        Ok(output)
    }

    fn run(&self, args: &[&str], timeout: Duration) {
        let command = format!("adb -s {} shell {}", self.serial, args.join(" "));
        // Input events and app lifecycle commands are best-effort; the caller
        // re-snapshots to observe the result.
        let _ = run_with_timeout(self.shell_command(args), &command, timeout);
    }
}

/// Run a command to completion with a timeout, capturing stdout.
///
/// The child is spawned and waited on from a watcher thread; if the result
/// does not arrive within `timeout` the child is killed and the command
/// reported as timed out.
fn run_with_timeout(mut cmd: Command, command: &str, timeout: Duration) -> DeviceResult<String> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let child = cmd.spawn().map_err(DeviceError::Io)?;

    let (tx, rx) = mpsc::channel();
    let killer = child.id();
    let handle = thread::spawn(move || {
        let _ = tx.send(child.wait_with_output());
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(output)) => {
            let _ = handle.join();
            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            } else {
                Err(DeviceError::CommandFailed {
                    command: command.to_string(),
                    detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                })
            }
        }
        Ok(Err(err)) => {
            let _ = handle.join();
            Err(DeviceError::Io(err))
        }
        Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
            kill_process(killer);
            Err(DeviceError::Timeout {
                command: command.to_string(),
                timeout,
            })
        }
    }
}

#[cfg(unix)]
fn kill_process(pid: u32) {
    // The Child moved into the watcher thread; signal by pid instead.
    let _ = Command::new("kill")
        .args(["-9", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

#[cfg(not(unix))]
fn kill_process(pid: u32) {
    let _ = Command::new("taskkill")
        .args(["/F", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

/// Preflight check that the adb binary is runnable (`adb version`)
pub fn preflight(adb_path: &str, timeout: Duration) -> DeviceResult<()> {
    let mut cmd = Command::new(adb_path);
    cmd.arg("version");
    run_with_timeout(cmd, &format!("{} version", adb_path), timeout)
        .map(|_| ())
        .map_err(|_| DeviceError::NotRunnable(adb_path.to_string()))
}

/// List attached device serials in the `device` state
pub fn list_devices(adb_path: &str, timeout: Duration) -> DeviceResult<Vec<String>> {
    let mut cmd = Command::new(adb_path);
    cmd.arg("devices");
    let out = run_with_timeout(cmd, &format!("{} devices", adb_path), timeout)?;
    Ok(parse_device_list(&out))
}

/// Parse `adb devices` output into serials in the `device` state
pub fn parse_device_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of devices"))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(serial), Some("device")) => Some(serial.to_string()),
                _ => None,
            }
        })
        .collect()
}

/// Resolve exactly one target serial.
///
/// A requested serial must be among the attached devices; otherwise the
/// single attached device is used. Zero or multiple devices without an
/// explicit request is a configuration error.
pub fn resolve_serial(
    adb_path: &str,
    requested: Option<&str>,
    timeout: Duration,
) -> DeviceResult<String> {
    let detected = list_devices(adb_path, timeout)?;
    match requested {
        Some(serial) => {
            if detected.iter().any(|d| d == serial) {
                Ok(serial.to_string())
            } else {
                Err(DeviceError::NotFound {
                    serial: serial.to_string(),
                    detected,
                })
            }
        }
        None => {
            if detected.len() == 1 {
                Ok(detected[0].clone())
            } else {
                Err(DeviceError::NoUniqueDevice(detected))
            }
        }
    }
}
