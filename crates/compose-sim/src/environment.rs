//! Environment lifecycle: bring a [`Setup`] up with docker-compose, rewire
//! routes and NAT rules, and tear everything down again.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::capture::CaptureProcess;
use crate::descriptor::DESCRIPTOR_FILE;
use crate::exec::{Execution, Executor};
use crate::inspect::{self, COMPOSE_NETWORK_LABEL, LABELS_TEMPLATE, NETWORKS_TEMPLATE};
use crate::topology::{Entity, NetworkId, RouterId, Setup};

/// How the environment reaches docker and where it keeps scratch state.
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    /// docker CLI binary.
    pub docker: String,
    /// Program prefix for compose, e.g. `["docker-compose"]` or `["docker", "compose"]`.
    pub compose: Vec<String>,
    /// Parent directory of per-setup scratch directories.
    pub scratch_root: PathBuf,
    /// Run tcpdump on every router interface.
    pub capture: bool,
    /// Leave the scratch directory (descriptor, diagnostics, captures) on stop.
    pub keep_scratch: bool,
    /// Time a capture gets to exit after SIGTERM before it is killed.
    pub capture_grace: Duration,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            docker: "docker".to_string(),
            compose: vec!["docker-compose".to_string()],
            scratch_root: std::env::temp_dir(),
            capture: false,
            keep_scratch: false,
            capture_grace: Duration::from_secs(2),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvironmentState {
    Unstarted,
    Starting,
    Running,
    Stopping,
    Stopped,
    /// Start failed. Teardown has already been attempted.
    Failed,
}

/// Teardown step that can fail independently of the others.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopStep {
    Captures,
    ComposeDown,
    ScratchDir,
}

impl fmt::Display for StopStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopStep::Captures => write!(f, "terminate captures"),
            StopStep::ComposeDown => write!(f, "compose down"),
            StopStep::ScratchDir => write!(f, "remove scratch directory"),
        }
    }
}

/// Every teardown step that failed, in the order they were attempted.
#[derive(Debug, thiserror::Error)]
#[error("{}", summarize(.failures))]
pub struct StopError {
    failures: Vec<(StopStep, anyhow::Error)>,
}

impl StopError {
    pub fn failures(&self) -> &[(StopStep, anyhow::Error)] {
        &self.failures
    }

    pub fn steps(&self) -> Vec<StopStep> {
        self.failures.iter().map(|(step, _)| *step).collect()
    }
}

fn summarize(failures: &[(StopStep, anyhow::Error)]) -> String {
    match failures {
        [] => "teardown failed".to_string(),
        [(step, err)] => format!("{step} failed: {err:#}"),
        [(step, err), rest @ ..] => {
            format!("{step} failed: {err:#} (and {} more teardown failures)", rest.len())
        }
    }
}

/// A running (or about to run) instance of a [`Setup`].
///
/// Owns the setup for its whole lifetime. Dropping a started environment that
/// was not stopped tears it down.
pub struct Environment {
    setup: Setup,
    config: EnvironmentConfig,
    scratch_dir: PathBuf,
    executor: Executor,
    state: EnvironmentState,
    scratch_created: bool,
    compose_invoked: bool,
    torn_down: bool,
    captures: Vec<CaptureProcess>,
    /// entity name -> compose network name -> address
    addresses: Mutex<HashMap<String, BTreeMap<String, IpAddr>>>,
    /// docker network id -> compose network label
    labels: Mutex<HashMap<String, Option<String>>>,
}

impl Environment {
    pub fn new(setup: Setup, config: EnvironmentConfig) -> Self {
        let scratch_dir = config.scratch_root.join(setup.scratch_dir_name());
        Self {
            executor: Executor::new(&scratch_dir),
            scratch_dir,
            setup,
            config,
            state: EnvironmentState::Unstarted,
            scratch_created: false,
            compose_invoked: false,
            torn_down: false,
            captures: Vec::new(),
            addresses: Mutex::new(HashMap::new()),
            labels: Mutex::new(HashMap::new()),
        }
    }

    pub fn setup(&self) -> &Setup {
        &self.setup
    }

    pub fn state(&self) -> EnvironmentState {
        self.state
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.scratch_dir.join(DESCRIPTOR_FILE)
    }

    /// Paths of the running capture files.
    pub fn capture_files(&self) -> Vec<&Path> {
        self.captures.iter().map(CaptureProcess::output_path).collect()
    }

    /// Bring the topology up and configure routes and NAT.
    ///
    /// On failure the environment is torn down before the error is returned,
    /// and ends in [`EnvironmentState::Failed`].
    pub fn start(&mut self) -> Result<()> {
        if self.state != EnvironmentState::Unstarted {
            bail!(
                "setup {} cannot be started from state {:?}",
                self.setup.id(),
                self.state
            );
        }
        self.state = EnvironmentState::Starting;
        info!(setup = self.setup.id(), "starting environment");

        match self.bring_up() {
            Ok(()) => {
                self.state = EnvironmentState::Running;
                info!(setup = self.setup.id(), "environment running");
                Ok(())
            }
            Err(err) => {
                self.state = EnvironmentState::Failed;
                warn!(setup = self.setup.id(), "start failed, tearing down: {err:#}");
                if let Err(stop_err) = self.stop() {
                    warn!(setup = self.setup.id(), "teardown after failed start: {stop_err}");
                }
                Err(err)
            }
        }
    }

    /// Terminate captures, run compose down, remove the scratch directory.
    ///
    /// Every step is attempted; all failures are returned together.
    pub fn stop(&mut self) -> Result<(), StopError> {
        match self.state {
            EnvironmentState::Stopped => return Ok(()),
            EnvironmentState::Failed if self.torn_down => return Ok(()),
            EnvironmentState::Unstarted => {
                self.state = EnvironmentState::Stopped;
                return Ok(());
            }
            _ => {}
        }
        let failed = self.state == EnvironmentState::Failed;
        if !failed {
            self.state = EnvironmentState::Stopping;
        }
        info!(setup = self.setup.id(), "stopping environment");

        let mut failures = Vec::new();

        let grace = self.config.capture_grace;
        for mut capture in self.captures.drain(..) {
            if let Err(err) = capture.terminate(grace) {
                failures.push((StopStep::Captures, err));
            }
        }

        if self.compose_invoked {
            if let Err(err) = self.compose(&["down"]) {
                failures.push((StopStep::ComposeDown, err));
            }
        }

        if self.scratch_created {
            if self.config.keep_scratch {
                info!(dir = %self.scratch_dir.display(), "keeping scratch directory");
            } else if let Err(err) = fs::remove_dir_all(&self.scratch_dir) {
                failures.push((
                    StopStep::ScratchDir,
                    anyhow::Error::new(err)
                        .context(format!("remove {}", self.scratch_dir.display())),
                ));
            }
        }

        self.torn_down = true;
        self.state = if failed {
            EnvironmentState::Failed
        } else {
            EnvironmentState::Stopped
        };

        for (step, err) in failures.iter().skip(1) {
            warn!(setup = self.setup.id(), "additional teardown failure ({step}): {err:#}");
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(StopError { failures })
        }
    }

    /// Address `entity` has on `network`.
    pub fn ip_address_for_network(
        &self,
        entity: impl Into<Entity>,
        network: NetworkId,
    ) -> Result<IpAddr> {
        let entity = entity.into();
        let name = self.setup.base(entity)?.name.clone();
        let network = self.setup.network(network)?.name.clone();
        self.addresses_by_network(entity)?
            .get(&network)
            .copied()
            .with_context(|| format!("{name} has no address on network {network}"))
    }

    /// Address `entity` has on the first network it shares with `peer`.
    pub fn ip_address_for(
        &self,
        entity: impl Into<Entity>,
        peer: impl Into<Entity>,
    ) -> Result<IpAddr> {
        let entity = entity.into();
        let network = self.setup.shared_network(entity, peer)?;
        self.ip_address_for_network(entity, network)
    }

    /// Every address attached to `entity`, sorted.
    pub fn all_ip_addresses(&self, entity: impl Into<Entity>) -> Result<Vec<IpAddr>> {
        let mut addrs: Vec<IpAddr> = self.addresses_by_network(entity)?.into_values().collect();
        addrs.sort();
        Ok(addrs)
    }

    /// Addresses of `entity`, keyed by the (namespaced) network name.
    pub fn addresses_by_network(
        &self,
        entity: impl Into<Entity>,
    ) -> Result<BTreeMap<String, IpAddr>> {
        let name = self.setup.base(entity.into())?.name.clone();
        if let Some(cached) = self
            .addresses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
        {
            return Ok(cached.clone());
        }

        let out = self
            .docker(&["inspect", "--format", NETWORKS_TEMPLATE, name.as_str()])
            .with_context(|| format!("inspect {name}"))?;
        let mut by_network = BTreeMap::new();
        for attachment in inspect::parse_attachments(&out.stdout)?.into_values() {
            let Some(label) = self.network_label(&attachment.network_id)? else {
                continue;
            };
            if let Some(ip) = attachment.ip() {
                by_network.insert(label, ip);
            }
        }
        debug!(entity = %name, ?by_network, "discovered addresses");

        self.addresses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, by_network.clone());
        Ok(by_network)
    }

    /// Run `args` inside `container` with `docker exec --privileged`.
    pub fn exec_in(&self, container: &str, args: &[&str]) -> Result<Execution> {
        let mut argv = vec!["exec", "--privileged", container];
        argv.extend_from_slice(args);
        self.docker(&argv)
    }

    fn network_label(&self, network_id: &str) -> Result<Option<String>> {
        if let Some(cached) = self
            .labels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(network_id)
        {
            return Ok(cached.clone());
        }
        let out = self
            .docker(&["network", "inspect", "--format", LABELS_TEMPLATE, network_id])
            .with_context(|| format!("inspect network {network_id}"))?;
        let label = inspect::parse_labels(&out.stdout)?
            .remove(COMPOSE_NETWORK_LABEL);
        self.labels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(network_id.to_string(), label.clone());
        Ok(label)
    }

    fn bring_up(&mut self) -> Result<()> {
        // configuration errors surface before any container exists
        let gateways = self.setup.gateway_plan()?;
        let routers = self.setup.configuration_order()?;

        fs::create_dir_all(&self.scratch_dir)
            .with_context(|| format!("create scratch dir {}", self.scratch_dir.display()))?;
        self.scratch_created = true;
        let descriptor = self.descriptor_path();
        fs::write(&descriptor, self.setup.to_descriptor())
            .with_context(|| format!("write {}", descriptor.display()))?;
        debug!(path = %descriptor.display(), "wrote compose descriptor");

        self.compose_invoked = true;
        self.compose(&["up", "-d"]).context("bring up topology")?;

        for (computer, router, network) in gateways {
            self.configure_gateway(computer.into(), router, network)?;
        }
        for router in routers {
            self.configure_router(router)?;
        }
        Ok(())
    }

    fn configure_gateway(
        &self,
        computer: Entity,
        router: RouterId,
        network: NetworkId,
    ) -> Result<()> {
        let name = self.setup.base(computer)?.name.clone();
        let via = self.ip_address_for_network(router, network)?;
        info!(computer = %name, %via, "rewiring default route");

        self.exec_in(&name, &["ip", "route", "del", "default"])
            .with_context(|| format!("delete default route of {name}"))?;
        let via_arg = via.to_string();
        self.exec_in(&name, &["ip", "route", "add", "default", "via", via_arg.as_str()])
            .with_context(|| format!("route {name} via {via}"))?;
        Ok(())
    }

    fn configure_router(&mut self, id: RouterId) -> Result<()> {
        let router = self.setup.router(id)?;
        let name = router.base.name.clone();
        let (lan, internet) = (router.lan, router.internet);

        let lan_ip = self.ip_address_for_network(id, lan)?;
        let internet_ip = self.ip_address_for_network(id, internet)?;
        let listing = self
            .exec_in(&name, &["ip", "-o", "-4", "addr", "show"])
            .with_context(|| format!("list interfaces of {name}"))?
            .stdout_str();
        let lan_if = inspect::interface_for_address(&listing, lan_ip)
            .with_context(|| format!("{name} has no interface with {lan_ip}"))?;
        let internet_if = inspect::interface_for_address(&listing, internet_ip)
            .with_context(|| format!("{name} has no interface with {internet_ip}"))?;
        info!(router = %name, lan = %lan_if, internet = %internet_if, "installing NAT rules");
        let (lan_if, internet_if) = (lan_if.as_str(), internet_if.as_str());

        let rules: [&[&str]; 3] = [
            &[
                "iptables", "-A", "FORWARD", "-i", internet_if, "-o", lan_if, "-m", "state",
                "--state", "RELATED,ESTABLISHED", "-j", "ACCEPT",
            ],
            &["iptables", "-A", "FORWARD", "-i", lan_if, "-o", internet_if, "-j", "ACCEPT"],
            &[
                "iptables", "-t", "nat", "-A", "POSTROUTING", "-o", internet_if, "-j",
                "MASQUERADE",
            ],
        ];
        for rule in rules {
            self.exec_in(&name, rule)
                .with_context(|| format!("install rule on {name}"))?;
        }

        if self.config.capture {
            for iface in [lan_if, internet_if] {
                let output = self.scratch_dir.join(format!("{name}.{iface}.tcpdump"));
                let argv = [
                    self.config.docker.as_str(),
                    "exec",
                    "--privileged",
                    name.as_str(),
                    "tcpdump",
                    "-i",
                    iface,
                    "-xx",
                    "-vv",
                    "-n",
                ];
                let capture = CaptureProcess::spawn(&argv, &output)?;
                self.captures.push(capture);
            }
        }
        Ok(())
    }

    fn docker(&self, args: &[&str]) -> Result<Execution> {
        let mut argv = vec![self.config.docker.as_str()];
        argv.extend_from_slice(args);
        self.executor.run_checked(&argv)
    }

    fn compose(&self, args: &[&str]) -> Result<Execution> {
        let mut argv: Vec<&str> = self.config.compose.iter().map(String::as_str).collect();
        argv.extend_from_slice(args);
        self.executor.run_checked(&argv)
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        let pending = match self.state {
            EnvironmentState::Starting
            | EnvironmentState::Running
            | EnvironmentState::Stopping => true,
            EnvironmentState::Failed => !self.torn_down,
            EnvironmentState::Unstarted | EnvironmentState::Stopped => false,
        };
        if pending {
            if let Err(err) = self.stop() {
                warn!(setup = self.setup.id(), "teardown on drop failed: {err}");
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_util::FakeDocker;

    /// Two computers on a LAN behind one router; internet on the other side.
    fn nat_setup() -> Setup {
        let mut setup = Setup::new();
        let lan = setup.new_network("lan", Some("10.1.0.0/24")).unwrap();
        let internet = setup.new_network("internet", Some("10.2.0.0/24")).unwrap();
        let router = setup.new_router("router", "nat", lan, internet).unwrap();
        setup
            .new_computer("computer", "peer", &[lan], Some(router))
            .unwrap();
        setup
            .new_computer("computer2", "peer", &[lan], Some(router))
            .unwrap();
        setup
    }

    fn fake_for(setup: &Setup) -> FakeDocker {
        let mut fake = FakeDocker::new().unwrap();
        let id = setup.id();
        fake.attach(&format!("{id}_router"), &format!("{id}_lan"), "10.1.0.254");
        fake.attach(&format!("{id}_router"), &format!("{id}_internet"), "10.2.0.2");
        fake.attach(&format!("{id}_computer"), &format!("{id}_lan"), "10.1.0.2");
        fake.attach(&format!("{id}_computer2"), &format!("{id}_lan"), "10.1.0.3");
        fake
    }

    #[test]
    fn start_configures_routes_then_nat_and_stop_cleans_up() {
        let setup = nat_setup();
        let id = setup.id().to_string();
        let fake = fake_for(&setup);
        fake.install().unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let mut env = Environment::new(setup, fake.config(scratch.path()));
        env.start().unwrap();
        assert_eq!(env.state(), EnvironmentState::Running);

        let descriptor = fs::read_to_string(env.descriptor_path()).unwrap();
        assert_eq!(descriptor, env.setup().to_descriptor());

        let calls = fake.invocations();
        let pos = |needle: &str| {
            calls
                .iter()
                .position(|c| c.contains(needle))
                .unwrap_or_else(|| panic!("`{needle}` never ran:\n{}", calls.join("\n")))
        };
        assert_eq!(pos("compose up -d"), 0);
        assert!(pos(&format!("{id}_computer ip route del default")) > 0);
        assert!(
            pos(&format!("{id}_computer ip route add default via 10.1.0.254"))
                < pos(&format!("{id}_computer2 ip route add default via 10.1.0.254"))
        );
        // router lan is eth0 and internet eth1 in the fake listing
        assert!(
            pos(&format!("{id}_computer2 ip route add"))
                < pos("-A FORWARD -i eth1 -o eth0 -m state --state RELATED,ESTABLISHED -j ACCEPT")
        );
        pos("-A FORWARD -i eth0 -o eth1 -j ACCEPT");
        pos("-t nat -A POSTROUTING -o eth1 -j MASQUERADE");

        let scratch_dir = env.scratch_dir().to_path_buf();
        env.stop().unwrap();
        assert_eq!(env.state(), EnvironmentState::Stopped);
        assert!(!scratch_dir.exists());
        assert!(fake.invocations().last().unwrap().ends_with("compose down"));
    }

    #[test]
    fn route_failure_on_second_computer_still_tears_down() {
        let setup = nat_setup();
        let id = setup.id().to_string();
        let mut fake = fake_for(&setup);
        fake.fail_on(&format!("{id}_computer2 ip route add"));
        fake.install().unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let mut env = Environment::new(setup, fake.config(scratch.path()));
        let err = env.start().unwrap_err();
        assert!(format!("{err:#}").contains(&format!("route {id}_computer2")), "{err:#}");

        assert_eq!(env.state(), EnvironmentState::Failed);
        assert!(!env.scratch_dir().exists());
        let calls = fake.invocations();
        assert!(calls.last().unwrap().ends_with("compose down"), "{calls:?}");
        assert!(!calls.iter().any(|c| c.contains("iptables")));

        // stop after a failed start is a no-op
        env.stop().unwrap();
        assert_eq!(fake.invocations().len(), calls.len());
    }

    #[test]
    fn bring_up_failure_keeps_diagnostics_when_asked() {
        let setup = nat_setup();
        let mut fake = fake_for(&setup);
        fake.fail_on("compose up");
        fake.install().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let mut config = fake.config(scratch.path());
        config.keep_scratch = true;

        let mut env = Environment::new(setup, config);
        assert!(env.start().is_err());
        assert_eq!(env.state(), EnvironmentState::Failed);

        // descriptor plus one diagnostics bundle for the failed `up`
        let bundles: Vec<_> = fs::read_dir(env.scratch_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .collect();
        assert_eq!(bundles.len(), 1);
        let argv = fs::read_to_string(bundles[0].path().join("argv")).unwrap();
        assert!(argv.ends_with("compose up -d"), "{argv}");
        assert!(fake.invocations().last().unwrap().ends_with("compose down"));
    }

    #[test]
    fn missing_shared_network_fails_before_bring_up() {
        let mut setup = Setup::new();
        let net1 = setup.new_network("net1", None).unwrap();
        let lan = setup.new_network("lan", None).unwrap();
        let internet = setup.new_network("internet", None).unwrap();
        let router = setup.new_router("router", "nat", lan, internet).unwrap();
        setup
            .new_computer("computer", "peer", &[net1], Some(router))
            .unwrap();
        let fake = FakeDocker::new().unwrap();
        fake.install().unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let mut env = Environment::new(setup, fake.config(scratch.path()));
        let err = env.start().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::TopologyError>(),
            Some(crate::TopologyError::NoSharedNetwork { .. })
        ));
        assert!(fake.invocations().is_empty());
        assert_eq!(env.state(), EnvironmentState::Failed);
    }

    #[test]
    fn teardown_failures_are_aggregated() {
        let setup = nat_setup();
        let mut fake = fake_for(&setup);
        fake.fail_on("compose down");
        fake.install().unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let mut env = Environment::new(setup, fake.config(scratch.path()));
        env.start().unwrap();
        let err = env.stop().unwrap_err();
        assert_eq!(err.steps(), vec![StopStep::ComposeDown]);
        assert!(err.to_string().starts_with("compose down failed"), "{err}");
        // the scratch dir is still removed
        assert!(!env.scratch_dir().exists());
        assert_eq!(env.state(), EnvironmentState::Stopped);
    }

    #[test]
    fn addresses_are_sorted_and_resolved_by_shared_network() {
        let mut setup = Setup::new();
        let n1 = setup.new_network("network1", None).unwrap();
        let n2 = setup.new_network("network2", None).unwrap();
        let a = setup.new_computer("a", "peer", &[n1, n2], None).unwrap();
        let b = setup.new_computer("b", "peer", &[n2], None).unwrap();
        let id = setup.id().to_string();

        let mut fake = FakeDocker::new().unwrap();
        // declared in descending order to check sorting
        fake.attach(&format!("{id}_a"), &format!("{id}_network2"), "172.19.0.9");
        fake.attach(&format!("{id}_a"), &format!("{id}_network1"), "172.18.0.2");
        fake.attach(&format!("{id}_b"), &format!("{id}_network2"), "172.19.0.3");
        fake.install().unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let mut env = Environment::new(setup, fake.config(scratch.path()));
        env.start().unwrap();

        let all: Vec<String> = env
            .all_ip_addresses(a)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(all, ["172.18.0.2", "172.19.0.9"]);
        assert_eq!(env.ip_address_for(a, b).unwrap().to_string(), "172.19.0.9");
        assert_eq!(
            env.ip_address_for_network(a, n1).unwrap().to_string(),
            "172.18.0.2"
        );
        assert!(env.ip_address_for_network(b, n1).is_err());

        // second lookup is served from the cache
        let before = fake.invocations().len();
        env.all_ip_addresses(a).unwrap();
        assert_eq!(fake.invocations().len(), before);

        env.stop().unwrap();
    }

    #[test]
    fn capture_processes_are_terminated_on_stop() {
        let setup = nat_setup();
        let fake = fake_for(&setup);
        fake.install().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let mut config = fake.config(scratch.path());
        config.capture = true;
        config.capture_grace = Duration::from_millis(500);

        let mut env = Environment::new(setup, config);
        env.start().unwrap();
        assert_eq!(env.capture_files().len(), 2);
        assert!(
            env.capture_files()
                .iter()
                .all(|p| p.extension().is_some_and(|e| e == "tcpdump"))
        );
        env.stop().unwrap();
        assert_eq!(env.state(), EnvironmentState::Stopped);
    }

    #[test]
    fn drop_tears_down_a_running_environment() {
        let setup = nat_setup();
        let fake = fake_for(&setup);
        fake.install().unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let scratch_dir;
        {
            let mut env = Environment::new(setup, fake.config(scratch.path()));
            env.start().unwrap();
            scratch_dir = env.scratch_dir().to_path_buf();
        }
        assert!(!scratch_dir.exists());
        assert!(fake.invocations().last().unwrap().ends_with("compose down"));
    }

    #[test]
    fn environment_is_single_use() {
        let setup = nat_setup();
        let fake = fake_for(&setup);
        fake.install().unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let mut env = Environment::new(setup, fake.config(scratch.path()));
        env.start().unwrap();
        env.stop().unwrap();
        assert!(env.start().is_err());
    }
}
