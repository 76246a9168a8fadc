//! Pid-file state (`akeyshually.pid`) and daemon liveness checks.
//!
//! The file holds a plain integer pid. A recorded pid whose process is
//! gone counts as absent. During a restart the replacement daemon is told
//! which pid it supersedes via `AKEYSHUALLY_REPLACING`.

use std::io;
use std::path::Path;

use nix::sys::signal::kill;
use nix::unistd::Pid;

use crate::paths;

/// Environment variable carrying the pid a replacement daemon supersedes.
pub const REPLACING_ENV: &str = "AKEYSHUALLY_REPLACING";

/// Write the given pid to the pid file.
pub fn write(dir: &Path, pid: u32) -> io::Result<()> {
    std::fs::write(paths::pid_file(dir), pid.to_string())
}

/// Read the pid file. `Ok(None)` when it does not exist.
pub fn read(dir: &Path) -> io::Result<Option<u32>> {
    let content = match std::fs::read_to_string(paths::pid_file(dir)) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let pid = content
        .trim()
        .parse::<u32>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("invalid pid: {e}")))?;
    Ok(Some(pid))
}

/// Remove the pid file. Missing files are fine.
pub fn remove(dir: &Path) -> io::Result<()> {
    match std::fs::remove_file(paths::pid_file(dir)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Signal-0 probe: is a process with this pid alive?
pub fn is_process_running(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// The pid of a live daemon recorded in the pid file, if any. A stale
/// entry (process gone) counts as not running.
pub fn running_daemon(dir: &Path) -> io::Result<Option<u32>> {
    match read(dir)? {
        Some(pid) if is_process_running(pid) => Ok(Some(pid)),
        _ => Ok(None),
    }
}

/// True when this process was spawned to replace the daemon at `pid`
/// (restart handshake).
pub fn is_replacing(pid: u32) -> bool {
    std::env::var(REPLACING_ENV)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        == Some(pid)
}
