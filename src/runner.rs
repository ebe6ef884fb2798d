//! External process seam
//!
//! Every interaction with the host (docker, nginx, systemctl) goes through
//! the `CommandRunner` trait so the pipeline can be exercised against a mock.
//! The real runner polls `try_wait` on a fixed interval with a fixed ceiling,
//! so no external call can block indefinitely.

use std::io::Read;
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::error::{DeployError, DeployResult};

/// Captured output of an external command
#[derive(Debug, Clone)]
pub struct CmdOutput {
    /// Exit code, if the process exited normally
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// stderr if non-empty, else stdout - the more useful diagnostic
    pub fn diagnostic(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Abstract command execution interface
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> DeployResult<CmdOutput>;

    /// Run and fail unless the command exits zero
    fn run_checked(&self, program: &str, args: &[&str]) -> DeployResult<CmdOutput> {
        let output = self.run(program, args)?;
        if output.success() {
            Ok(output)
        } else {
            Err(DeployError::CommandFailed {
                program: format!("{} {}", program, args.join(" ")),
                detail: output.diagnostic().trim().to_string(),
            })
        }
    }
}

/// Runs commands on the local host
pub struct HostRunner {
    timeout: Duration,
}

const POLL_INTERVAL: Duration = Duration::from_millis(100);

impl HostRunner {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HostRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for HostRunner {
    fn run(&self, program: &str, args: &[&str]) -> DeployResult<CmdOutput> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain pipes on reader threads so a chatty child never fills the
        // pipe buffer and wedges against our wait loop.
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let stdout_thread = std::thread::spawn(move || {
            let mut buf = String::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_string(&mut buf);
            }
            buf
        });
        let stderr_thread = std::thread::spawn(move || {
            let mut buf = String::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_string(&mut buf);
            }
            buf
        });

        let mut waited = Duration::ZERO;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if waited >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(DeployError::CommandTimeout {
                    program: program.to_string(),
                    seconds: self.timeout.as_secs(),
                });
            }
            std::thread::sleep(POLL_INTERVAL);
            waited += POLL_INTERVAL;
        };

        let stdout = stdout_thread.join().unwrap_or_default();
        let stderr = stderr_thread.join().unwrap_or_default();

        Ok(CmdOutput {
            status: status.code(),
            stdout,
            stderr,
        })
    }
}

/// Scripted runner for tests
///
/// Responses are matched by command-line prefix; the first matching script
/// wins. Unmatched commands fail with exit code 1 so a test that forgets to
/// script a call sees an explicit failure, not silent success. Uses
/// `Arc<Mutex<>>` internally so it can be cloned and shared.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MockRunner {
    scripts: std::sync::Arc<std::sync::Mutex<Vec<(String, CmdOutput)>>>,
    pub calls: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
}

#[cfg(test)]
impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful response for any command starting with `prefix`
    pub fn on(&self, prefix: &str, stdout: &str) -> &Self {
        self.scripts.lock().unwrap().push((
            prefix.to_string(),
            CmdOutput {
                status: Some(0),
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        ));
        self
    }

    /// Script a failing response for any command starting with `prefix`
    pub fn on_fail(&self, prefix: &str, stderr: &str) -> &Self {
        self.scripts.lock().unwrap().push((
            prefix.to_string(),
            CmdOutput {
                status: Some(1),
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        ));
        self
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

#[cfg(test)]
impl CommandRunner for MockRunner {
    fn run(&self, program: &str, args: &[&str]) -> DeployResult<CmdOutput> {
        let line = if args.is_empty() {
            program.to_string()
        } else {
            format!("{} {}", program, args.join(" "))
        };
        self.calls.lock().unwrap().push(line.clone());

        let scripts = self.scripts.lock().unwrap();
        for (prefix, output) in scripts.iter() {
            if line.starts_with(prefix.as_str()) {
                return Ok(output.clone());
            }
        }
        Ok(CmdOutput {
            status: Some(1),
            stdout: String::new(),
            stderr: format!("unscripted command: {}", line),
        })
    }
}
