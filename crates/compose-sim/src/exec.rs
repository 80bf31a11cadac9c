//! External command execution with on-disk failure diagnostics.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use anyhow::{Result, anyhow};
use tracing::{debug, warn};
use uuid::Uuid;

/// Runs commands inside a scratch directory and leaves a diagnostic bundle
/// (`argv`, `stdout`, `stderr`) behind for every command that fails.
#[derive(Debug, Clone)]
pub struct Executor {
    workdir: PathBuf,
}

/// Captured result of one command.
#[derive(Debug)]
pub struct Execution {
    pub argv: Vec<String>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the process could not be spawned.
    pub status: Option<ExitStatus>,
    pub spawn_error: Option<std::io::Error>,
    /// Where the diagnostic bundle was written, if the command failed.
    pub diagnostics: Option<PathBuf>,
}

impl Execution {
    pub fn success(&self) -> bool {
        self.status.is_some_and(|s| s.success())
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Turn a failed execution into an error carrying argv and stderr.
    pub fn check(self) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        let argv = self.argv.join(" ");
        let bundle = self
            .diagnostics
            .as_ref()
            .map(|p| format!(" (diagnostics in {})", p.display()))
            .unwrap_or_default();
        Err(match (&self.spawn_error, self.status) {
            (Some(err), _) => anyhow!("failed to spawn `{argv}`: {err}{bundle}"),
            (None, status) => anyhow!(
                "command failed: {argv} ({}){bundle}\n{}",
                status.map_or_else(|| "no status".to_string(), |s| s.to_string()),
                String::from_utf8_lossy(&self.stderr).trim()
            ),
        })
    }
}

impl Executor {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Run `args` to completion, returning raw output.
    pub fn run<S: AsRef<str>>(&self, args: &[S]) -> Execution {
        let argv: Vec<String> = args.iter().map(|a| a.as_ref().to_string()).collect();
        debug!(cmd = argv.join(" "), "running command");

        let mut execution = match argv.split_first() {
            None => Execution {
                argv: argv.clone(),
                stdout: Vec::new(),
                stderr: Vec::new(),
                status: None,
                spawn_error: Some(std::io::Error::other("empty command line")),
                diagnostics: None,
            },
            Some((program, rest)) => {
                match Command::new(program)
                    .args(rest)
                    .current_dir(&self.workdir)
                    .output()
                {
                    Ok(output) => Execution {
                        argv: argv.clone(),
                        stdout: output.stdout,
                        stderr: output.stderr,
                        status: Some(output.status),
                        spawn_error: None,
                        diagnostics: None,
                    },
                    Err(err) => Execution {
                        argv: argv.clone(),
                        stdout: Vec::new(),
                        stderr: Vec::new(),
                        status: None,
                        spawn_error: Some(err),
                        diagnostics: None,
                    },
                }
            }
        };

        if !execution.success() {
            execution.diagnostics = Some(self.write_diagnostics(&execution));
        }
        execution
    }

    /// Run `args`, failing if the command cannot be spawned or exits non-zero.
    pub fn run_checked<S: AsRef<str>>(&self, args: &[S]) -> Result<Execution> {
        self.run(args).check()
    }

    fn write_diagnostics(&self, execution: &Execution) -> PathBuf {
        let dir = self.workdir.join(Uuid::new_v4().to_string());
        warn!(
            cmd = execution.argv.join(" "),
            dir = %dir.display(),
            "command failed, writing diagnostics"
        );
        if let Err(err) = fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), "error creating diagnostics directory: {err}");
            return dir;
        }
        let argv = execution.argv.join(" ");
        let files: [(&str, &[u8]); 3] = [
            ("argv", argv.as_bytes()),
            ("stdout", &execution.stdout),
            ("stderr", &execution.stderr),
        ];
        for (name, contents) in files {
            if let Err(err) = fs::write(dir.join(name), contents) {
                warn!(dir = %dir.display(), "error writing {name}: {err}");
            }
        }
        dir
    }
}
