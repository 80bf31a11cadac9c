//! Long-lived packet capture processes attached to router interfaces.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tracing::debug;

/// A background process whose stdout streams into a file.
///
/// Terminated on [`CaptureProcess::terminate`] or on drop.
pub struct CaptureProcess {
    child: Child,
    label: String,
    output: PathBuf,
}

impl CaptureProcess {
    /// Spawn `args` with stdout redirected to `output` (created or truncated).
    pub fn spawn<S: AsRef<str>>(args: &[S], output: &Path) -> Result<Self> {
        let Some((program, rest)) = args.split_first() else {
            bail!("empty capture command");
        };
        let label = args.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(" ");
        let file = File::create(output)
            .with_context(|| format!("create capture file {}", output.display()))?;

        let child = Command::new(program.as_ref())
            .args(rest.iter().map(AsRef::as_ref))
            .stdin(Stdio::null())
            .stdout(file)
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawn {label}"))?;

        debug!(%label, pid = child.id(), output = %output.display(), "spawned capture");
        Ok(Self {
            child,
            label,
            output: output.to_path_buf(),
        })
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    pub fn is_alive(&mut self) -> bool {
        self.child.try_wait().ok().flatten().is_none()
    }

    /// Send SIGTERM, wait up to `grace`, then SIGKILL and reap.
    pub fn terminate(&mut self, grace: Duration) -> Result<()> {
        if !self.is_alive() {
            return Ok(());
        }
        let pid = self.child.id().to_string();
        let _ = Command::new("kill").args(["-TERM", &pid]).output();

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if !self.is_alive() {
                debug!(label = self.label, "capture exited after SIGTERM");
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        self.child
            .kill()
            .with_context(|| format!("kill {}", self.label))?;
        self.child
            .wait()
            .with_context(|| format!("reap {}", self.label))?;
        Ok(())
    }
}

impl Drop for CaptureProcess {
    fn drop(&mut self) {
        let _ = self.terminate(Duration::from_millis(500));
    }
}
