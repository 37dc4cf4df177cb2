//! External process invocation for the Azure CLI.
//!
//! Everything azctl does against Azure goes through [`CommandRunner`], so the
//! remote configuration source and the commands can be exercised against a
//! scripted runner in tests.

use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Runs the external cloud CLI.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run with inherited stdio. Output goes straight to the terminal.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::CommandFailed`] if the process cannot be started
    /// or exits unsuccessfully.
    async fn run(&self, args: &[String]) -> Result<()>;

    /// Run and capture stdout.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::CommandFailed`] if the process cannot be started
    /// or exits unsuccessfully. The error carries the captured stderr.
    async fn run_capture(&self, args: &[String]) -> Result<String>;
}

/// [`CommandRunner`] backed by the `az` executable.
///
/// Children are killed when the returned future is dropped, so a caller-side
/// `tokio::time::timeout` aborts the invocation.
#[derive(Debug, Clone)]
pub struct AzCli {
    program: String,
}

impl AzCli {
    /// Create a runner for `az` on `PATH`.
    pub fn new() -> Self {
        Self::with_program("az")
    }

    /// Create a runner for a specific executable.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args).kill_on_drop(true);
        cmd
    }

    fn failed(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::CommandFailed {
            command: self.program.clone(),
            reason: reason.into(),
        }
    }
}

impl Default for AzCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for AzCli {
    async fn run(&self, args: &[String]) -> Result<()> {
        debug!(program = %self.program, args = ?args, "running");
        let status = self
            .command(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| self.failed(e.to_string()))?;

        if !status.success() {
            return Err(self.failed(status.to_string()));
        }
        Ok(())
    }

    async fn run_capture(&self, args: &[String]) -> Result<String> {
        debug!(program = %self.program, args = ?args, "running (captured)");
        let output = self
            .command(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.failed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failed(format!("{}: {}", output.status, stderr.trim())));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Build an owned argument vector from string slices.
pub fn args<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}

/// Scripted runner used by unit and integration tests.
#[doc(hidden)]
pub mod testing {
    use super::*;
    use parking_lot::Mutex;

    type Responder = Box<dyn Fn(&[String]) -> Option<Result<String>> + Send + Sync>;

    /// Answers invocations from a list of responders and records every call.
    ///
    /// The first responder returning `Some` wins. Unmatched invocations fail
    /// like a missing resource would.
    #[derive(Default)]
    pub struct MockRunner {
        responders: Vec<Responder>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl MockRunner {
        /// Create a runner with no responses.
        pub fn new() -> Self {
            Self::default()
        }

        /// Respond with `output` to invocations containing every token in `needles`.
        pub fn on(mut self, needles: &[&str], output: impl Into<String>) -> Self {
            let needles: Vec<String> = needles.iter().map(|s| s.to_string()).collect();
            let output = output.into();
            self.responders.push(Box::new(move |args| {
                needles
                    .iter()
                    .all(|n| args.iter().any(|a| a == n))
                    .then(|| Ok(output.clone()))
            }));
            self
        }

        /// Respond with `output` when `pred` matches.
        pub fn when<F>(mut self, pred: F, output: impl Into<String>) -> Self
        where
            F: Fn(&[String]) -> bool + Send + Sync + 'static,
        {
            let output = output.into();
            self.responders
                .push(Box::new(move |args| pred(args).then(|| Ok(output.clone()))));
            self
        }

        /// Every invocation seen so far.
        pub fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().clone()
        }

        fn respond(&self, args: &[String]) -> Result<String> {
            self.calls.lock().push(args.to_vec());
            self.responders
                .iter()
                .find_map(|r| r(args))
                .unwrap_or_else(|| {
                    Err(ConfigError::CommandFailed {
                        command: "az".to_string(),
                        reason: "exit status: 3: (ResourceNotFound)".to_string(),
                    })
                })
        }
    }

    #[async_trait]
    impl CommandRunner for MockRunner {
        async fn run(&self, args: &[String]) -> Result<()> {
            self.respond(args).map(|_| ())
        }

        async fn run_capture(&self, args: &[String]) -> Result<String> {
            self.respond(args)
        }
    }
}
