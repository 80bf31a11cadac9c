use std::process::Command;

/// Returns `true` if a docker daemon answers `docker info`.
pub fn check_docker(docker: &str) -> bool {
    Command::new(docker)
        .arg("info")
        .output()
        .is_ok_and(|o| o.status.success())
}

/// Returns `true` if `compose version` succeeds for the given program prefix.
pub fn check_compose(compose: &[String]) -> bool {
    let Some((program, rest)) = compose.split_first() else {
        return false;
    };
    Command::new(program)
        .args(rest)
        .arg("version")
        .output()
        .is_ok_and(|o| o.status.success())
}

#[cfg(unix)]
pub use fake::FakeDocker;

#[cfg(unix)]
mod fake {
    use std::collections::BTreeMap;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use anyhow::{Context, Result};
    use tempfile::TempDir;

    use crate::environment::EnvironmentConfig;

    /// Shell script standing in for both `docker` and `docker compose`.
    ///
    /// Every invocation is appended to a log. Containers answer `inspect`
    /// and `ip -o -4 addr show` from the attachments registered with
    /// [`FakeDocker::attach`]; interfaces are numbered `eth0`, `eth1`, ...
    /// in attachment order. Network ids equal network names.
    pub struct FakeDocker {
        dir: TempDir,
        /// container -> [(network, address)]
        attachments: BTreeMap<String, Vec<(String, String)>>,
        failures: Vec<String>,
    }

    impl FakeDocker {
        pub fn new() -> Result<Self> {
            Ok(Self {
                dir: tempfile::tempdir().context("create fake docker dir")?,
                attachments: BTreeMap::new(),
                failures: Vec::new(),
            })
        }

        pub fn attach(&mut self, container: &str, network: &str, ip: &str) -> &mut Self {
            self.attachments
                .entry(container.to_string())
                .or_default()
                .push((network.to_string(), ip.to_string()));
            self
        }

        /// Make every invocation whose arguments contain `pattern` exit 1.
        pub fn fail_on(&mut self, pattern: &str) -> &mut Self {
            self.failures.push(pattern.to_string());
            self
        }

        pub fn program(&self) -> PathBuf {
            self.dir.path().join("docker")
        }

        fn log_path(&self) -> PathBuf {
            self.dir.path().join("invocations.log")
        }

        /// Write the script. Call after all `attach`/`fail_on` calls.
        pub fn install(&self) -> Result<()> {
            let path = self.program();
            fs::write(&path, self.script()).with_context(|| format!("write {}", path.display()))?;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
                .with_context(|| format!("chmod {}", path.display()))?;
            Ok(())
        }

        /// Environment config routing docker and compose through the script.
        pub fn config(&self, scratch_root: &Path) -> EnvironmentConfig {
            let program = self.program().to_string_lossy().into_owned();
            EnvironmentConfig {
                docker: program.clone(),
                compose: vec![program, "compose".to_string()],
                scratch_root: scratch_root.to_path_buf(),
                capture_grace: Duration::from_millis(200),
                ..EnvironmentConfig::default()
            }
        }

        /// Argument lines of every invocation so far, oldest first.
        pub fn invocations(&self) -> Vec<String> {
            fs::read_to_string(self.log_path())
                .map(|log| log.lines().map(str::to_string).collect())
                .unwrap_or_default()
        }

        fn script(&self) -> String {
            let mut s = String::from("#!/bin/sh\n");
            s.push_str(&format!(
                "printf '%s\\n' \"$*\" >> {}\n",
                quote(&self.log_path().to_string_lossy())
            ));

            s.push_str("case \"$*\" in\n");
            for pattern in &self.failures {
                s.push_str(&format!(
                    "  *{}*) echo 'injected failure' >&2; exit 1 ;;\n",
                    quote(pattern)
                ));
            }
            s.push_str("esac\n");

            s.push_str("case \"$1\" in\ninspect)\n  case \"$4\" in\n");
            for (container, nets) in &self.attachments {
                let json: serde_json::Map<String, serde_json::Value> = nets
                    .iter()
                    .map(|(net, ip)| {
                        (
                            net.clone(),
                            serde_json::json!({ "NetworkID": net, "IPAddress": ip }),
                        )
                    })
                    .collect();
                s.push_str(&format!(
                    "    {}) printf '%s\\n' {} ;;\n",
                    quote(container),
                    quote(&serde_json::Value::Object(json).to_string())
                ));
            }
            s.push_str("    *) echo 'Error: No such object' >&2; exit 1 ;;\n  esac ;;\n");

            s.push_str(
                "network) printf '{\"com.docker.compose.network\":\"%s\"}\\n' \"$5\" ;;\n",
            );

            s.push_str("exec)\n  case \"$4\" in\n  tcpdump) exec sleep 30 ;;\n  ip)\n");
            s.push_str("    [ \"$5\" = \"-o\" ] || exit 0\n    case \"$3\" in\n");
            for (container, nets) in &self.attachments {
                let lines: Vec<String> = nets
                    .iter()
                    .enumerate()
                    .map(|(i, (_, ip))| {
                        quote(&format!(
                            "{}: eth{i}@if{}    inet {ip}/24 scope global eth{i}",
                            2 * i + 10,
                            2 * i + 11
                        ))
                    })
                    .collect();
                s.push_str(&format!(
                    "      {}) printf '%s\\n' {} ;;\n",
                    quote(container),
                    lines.join(" ")
                ));
            }
            s.push_str("    esac ;;\n  esac ;;\n");

            s.push_str("build) echo \"sha256:fake-$(basename \"$3\")\" ;;\nesac\nexit 0\n");
            s
        }
    }

    fn quote(raw: &str) -> String {
        format!("'{}'", raw.replace('\'', r"'\''"))
    }

}
