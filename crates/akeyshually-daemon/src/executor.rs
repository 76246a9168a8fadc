//! Shell command execution.
//!
//! Commands run through the configured shell (`-c`), each child in its own
//! session so that signalling a whileheld process never touches the daemon
//! or sibling children. Commands start in the user's home directory and
//! may source an environment file first. Spawn failures are logged and the
//! event pipeline keeps going.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use akeyshually_config::paths::expand_home;
use akeyshually_config::Config;

/// A tracked whileheld subprocess.
pub enum HeldChild {
    Process(Child),
    /// Capture-mode stand-in so tracking logic stays testable.
    Recorded,
}

/// What a capture-mode executor reports instead of spawning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEvent {
    /// A detached command was spawned (resolved form).
    Spawn(String),
    /// A whileheld subprocess was started (resolved form).
    HeldStart(String),
    /// The whileheld subprocess for a combo was terminated.
    HeldStop(String),
}

/// Spawns commands, detached, through the user's shell.
///
/// Cheap to clone; every behavior worker carries one.
#[derive(Clone)]
pub struct Executor {
    shell: String,
    env_file: Option<String>,
    variables: Arc<HashMap<String, String>>,
    sink: Option<mpsc::UnboundedSender<ExecEvent>>,
}

impl Executor {
    pub fn new(config: &Config) -> Self {
        let shell = if config.settings.shell.is_empty() {
            std::env::var("SHELL").unwrap_or_else(|_| "sh".to_string())
        } else {
            config.settings.shell.clone()
        };

        let env_file = if config.settings.env_file.is_empty() {
            None
        } else {
            Some(expand_home(&config.settings.env_file))
        };

        Self {
            shell,
            env_file,
            variables: Arc::new(config.commands.clone()),
            sink: None,
        }
    }

    /// An executor that records [`ExecEvent`]s instead of spawning
    /// processes. Used by the engine tests.
    pub fn capture(config: &Config) -> (Self, mpsc::UnboundedReceiver<ExecEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut executor = Self::new(config);
        executor.sink = Some(tx);
        (executor, rx)
    }

    /// Resolve a command reference through `[command_variables]`.
    pub fn resolve<'a>(&'a self, reference: &'a str) -> &'a str {
        self.variables
            .get(reference)
            .map(String::as_str)
            .unwrap_or(reference)
    }

    /// Start a detached subprocess and forget about it (a helper task
    /// reaps it). Never blocks the event path.
    pub fn spawn(&self, reference: &str) {
        let command = self.resolve(reference).to_string();
        if let Some(sink) = &self.sink {
            let _ = sink.send(ExecEvent::Spawn(command));
            return;
        }

        match self.spawn_child(&command) {
            Ok(mut child) => {
                tokio::spawn(async move {
                    let _ = child.wait().await;
                });
            }
            Err(e) => tracing::warn!("failed to execute '{}': {}", command, e),
        }
    }

    /// Start a subprocess whose handle the caller keeps for later
    /// termination. `None` means the spawn failed.
    pub fn spawn_held(&self, reference: &str) -> Option<HeldChild> {
        let command = self.resolve(reference).to_string();
        if let Some(sink) = &self.sink {
            let _ = sink.send(ExecEvent::HeldStart(command));
            return Some(HeldChild::Recorded);
        }

        match self.spawn_child(&command) {
            Ok(child) => Some(HeldChild::Process(child)),
            Err(e) => {
                tracing::warn!("failed to execute '{}': {}", command, e);
                None
            }
        }
    }

    /// SIGTERM a tracked subprocess and reap it in the background. The
    /// handle has already been removed from the shared map, so nothing
    /// blocks under a lock.
    pub fn terminate_held(&self, label: &str, held: HeldChild) {
        match held {
            HeldChild::Recorded => {
                if let Some(sink) = &self.sink {
                    let _ = sink.send(ExecEvent::HeldStop(label.to_string()));
                }
            }
            HeldChild::Process(mut child) => {
                if let Some(pid) = child.id() {
                    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                        tracing::warn!("failed to signal process for {}: {}", label, e);
                    }
                }
                tokio::spawn(async move {
                    let _ = child.wait().await;
                });
            }
        }
    }

    fn spawn_child(&self, command: &str) -> std::io::Result<Child> {
        let full = self.full_command(command);
        tracing::debug!("exec: {} -c {:?}", self.shell, full);

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(&full)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // New session: terminating the child later must not reach the
        // daemon or any sibling child.
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid()
                    .map(|_| ())
                    .map_err(std::io::Error::from)
            });
        }

        cmd.spawn()
    }

    /// Commands start in the home directory unless they change it, and an
    /// optional environment file is sourced first.
    fn full_command(&self, command: &str) -> String {
        match &self.env_file {
            Some(env_file) => format!("source {env_file} && cd && {command}"),
            None => format!("cd && {command}"),
        }
    }
}
