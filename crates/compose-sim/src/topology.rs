//! In-memory topology model: networks, computers, routers and STUN servers
//! owned by a single [`Setup`].
//!
//! Every entity name is prefixed with the setup id so that several setups can
//! share one container host without colliding. Entities are referenced through
//! small copyable handles that remember which setup created them.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use ipnetwork::Ipv4Network;
use thiserror::Error;
use uuid::Uuid;

/// Image used for every STUN server.
pub const STUN_IMAGE: &str = "gortc/gortcd";

static SETUP_SERIAL: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("'{entity}' must be attached to at least one network")]
    NoNetworks { entity: String },
    #[error("name '{name}' is already declared in this setup")]
    DuplicateName { name: String },
    #[error("invalid name '{name}': use letters, digits, '_', '.' or '-'")]
    InvalidName { name: String },
    #[error("invalid subnet '{subnet}' for network '{network}'")]
    InvalidSubnet { network: String, subnet: String },
    #[error("handle does not belong to setup {setup}")]
    ForeignHandle { setup: String },
    #[error("router '{router}' needs distinct lan and internet networks")]
    RouterLoop { router: String },
    #[error("no shared network between '{a}' and '{b}'")]
    NoSharedNetwork { a: String, b: String },
    #[error("routers form a gateway cycle: {routers}")]
    GatewayCycle { routers: String },
}

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub struct $name {
            owner: u64,
            index: usize,
        }
    };
}

handle!(
    /// Handle to a [`Network`] of a [`Setup`].
    NetworkId
);
handle!(
    /// Handle to a [`Computer`] of a [`Setup`].
    ComputerId
);
handle!(
    /// Handle to a [`Router`] of a [`Setup`].
    RouterId
);
handle!(
    /// Handle to a [`StunServer`] of a [`Setup`].
    StunServerId
);

/// Any container-backed entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Entity {
    Computer(ComputerId),
    Router(RouterId),
    StunServer(StunServerId),
}

impl From<ComputerId> for Entity {
    fn from(id: ComputerId) -> Self {
        Entity::Computer(id)
    }
}

impl From<RouterId> for Entity {
    fn from(id: RouterId) -> Self {
        Entity::Router(id)
    }
}

impl From<StunServerId> for Entity {
    fn from(id: StunServerId) -> Self {
        Entity::StunServer(id)
    }
}

#[derive(Debug, Clone)]
pub struct Network {
    pub name: String,
    pub subnet: Option<Ipv4Network>,
}

/// Fields shared by every container in the topology.
#[derive(Debug, Clone)]
pub struct BaseComputer {
    pub name: String,
    pub image: String,
    /// Attached networks, in declaration order. Never empty.
    pub networks: Vec<NetworkId>,
}

#[derive(Debug, Clone)]
pub struct Computer {
    pub base: BaseComputer,
    /// Router the default route is rewired through after bring-up.
    pub gateway: Option<RouterId>,
}

/// NAT router bridging a LAN network and an internet-side network.
#[derive(Debug, Clone)]
pub struct Router {
    pub base: BaseComputer,
    pub lan: NetworkId,
    pub internet: NetworkId,
}

#[derive(Debug, Clone)]
pub struct StunServer {
    pub base: BaseComputer,
}

/// Aggregate owning every entity of one scenario's topology.
#[derive(Debug)]
pub struct Setup {
    id: String,
    serial: u64,
    networks: Vec<Network>,
    computers: Vec<Computer>,
    routers: Vec<Router>,
    stun_servers: Vec<StunServer>,
    names: HashSet<String>,
}

impl Default for Setup {
    fn default() -> Self {
        Self::new()
    }
}

impl Setup {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            serial: SETUP_SERIAL.fetch_add(1, Ordering::Relaxed),
            networks: Vec::new(),
            computers: Vec::new(),
            routers: Vec::new(),
            stun_servers: Vec::new(),
            names: HashSet::new(),
        }
    }

    /// Unique token prefixed onto every entity name.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name of this setup's scratch directory (relative to the scratch root).
    pub fn scratch_dir_name(&self) -> String {
        format!("vortices-{}", self.id)
    }

    /// Namespaced form of a logical name: `{id}_{name}`.
    pub fn namespaced(&self, name: &str) -> String {
        format!("{}_{}", self.id, name)
    }

    pub fn networks(&self) -> &[Network] {
        &self.networks
    }

    pub fn computers(&self) -> &[Computer] {
        &self.computers
    }

    pub fn routers(&self) -> &[Router] {
        &self.routers
    }

    pub fn stun_servers(&self) -> &[StunServer] {
        &self.stun_servers
    }

    pub fn computer_ids(&self) -> impl Iterator<Item = ComputerId> + '_ {
        (0..self.computers.len()).map(|index| ComputerId {
            owner: self.serial,
            index,
        })
    }

    pub fn router_ids(&self) -> impl Iterator<Item = RouterId> + '_ {
        (0..self.routers.len()).map(|index| RouterId {
            owner: self.serial,
            index,
        })
    }

    pub fn stun_server_ids(&self) -> impl Iterator<Item = StunServerId> + '_ {
        (0..self.stun_servers.len()).map(|index| StunServerId {
            owner: self.serial,
            index,
        })
    }

    /// Declare a network, optionally pinned to an IPv4 subnet (`a.b.c.d/len`).
    pub fn new_network(
        &mut self,
        name: &str,
        subnet: Option<&str>,
    ) -> Result<NetworkId, TopologyError> {
        let subnet = subnet.map(|raw| parse_subnet(name, raw)).transpose()?;
        let name = self.claim_name(name)?;
        self.networks.push(Network { name, subnet });
        Ok(NetworkId {
            owner: self.serial,
            index: self.networks.len() - 1,
        })
    }

    pub fn new_computer(
        &mut self,
        name: &str,
        image: &str,
        networks: &[NetworkId],
        gateway: Option<RouterId>,
    ) -> Result<ComputerId, TopologyError> {
        if let Some(router) = gateway {
            self.router(router)?;
        }
        let base = self.new_base(name, image, networks)?;
        self.computers.push(Computer { base, gateway });
        Ok(ComputerId {
            owner: self.serial,
            index: self.computers.len() - 1,
        })
    }

    /// Route `computer`'s default traffic through `router` once started.
    pub fn set_gateway(
        &mut self,
        computer: ComputerId,
        router: RouterId,
    ) -> Result<(), TopologyError> {
        self.router(router)?;
        self.check_owner(computer.owner)?;
        let computer = self
            .computers
            .get_mut(computer.index)
            .ok_or_else(|| TopologyError::ForeignHandle {
                setup: self.id.clone(),
            })?;
        computer.gateway = Some(router);
        Ok(())
    }

    pub fn new_router(
        &mut self,
        name: &str,
        image: &str,
        lan: NetworkId,
        internet: NetworkId,
    ) -> Result<RouterId, TopologyError> {
        if lan == internet {
            return Err(TopologyError::RouterLoop {
                router: name.to_string(),
            });
        }
        let base = self.new_base(name, image, &[lan, internet])?;
        self.routers.push(Router {
            base,
            lan,
            internet,
        });
        Ok(RouterId {
            owner: self.serial,
            index: self.routers.len() - 1,
        })
    }

    pub fn new_stun_server(
        &mut self,
        name: &str,
        networks: &[NetworkId],
    ) -> Result<StunServerId, TopologyError> {
        let base = self.new_base(name, STUN_IMAGE, networks)?;
        self.stun_servers.push(StunServer { base });
        Ok(StunServerId {
            owner: self.serial,
            index: self.stun_servers.len() - 1,
        })
    }

    pub fn network(&self, id: NetworkId) -> Result<&Network, TopologyError> {
        self.check_owner(id.owner)?;
        self.networks.get(id.index).ok_or_else(|| self.foreign())
    }

    pub fn computer(&self, id: ComputerId) -> Result<&Computer, TopologyError> {
        self.check_owner(id.owner)?;
        self.computers.get(id.index).ok_or_else(|| self.foreign())
    }

    pub fn router(&self, id: RouterId) -> Result<&Router, TopologyError> {
        self.check_owner(id.owner)?;
        self.routers.get(id.index).ok_or_else(|| self.foreign())
    }

    pub fn stun_server(&self, id: StunServerId) -> Result<&StunServer, TopologyError> {
        self.check_owner(id.owner)?;
        self.stun_servers.get(id.index).ok_or_else(|| self.foreign())
    }

    pub fn base(&self, entity: Entity) -> Result<&BaseComputer, TopologyError> {
        match entity {
            Entity::Computer(id) => self.computer(id).map(|c| &c.base),
            Entity::Router(id) => self.router(id).map(|r| &r.base),
            Entity::StunServer(id) => self.stun_server(id).map(|s| &s.base),
        }
    }

    /// First network of `a` (in its declaration order) that `b` is also on.
    pub fn shared_network(
        &self,
        a: impl Into<Entity>,
        b: impl Into<Entity>,
    ) -> Result<NetworkId, TopologyError> {
        let a = self.base(a.into())?;
        let b = self.base(b.into())?;
        a.networks
            .iter()
            .copied()
            .find(|net| b.networks.contains(net))
            .ok_or_else(|| TopologyError::NoSharedNetwork {
                a: a.name.clone(),
                b: b.name.clone(),
            })
    }

    /// Routers in the order their rules must be installed.
    ///
    /// A router whose internet side is another router's LAN is configured
    /// after that upstream router. Ties keep declaration order.
    pub fn configuration_order(&self) -> Result<Vec<RouterId>, TopologyError> {
        let n = self.routers.len();
        // upstream[i] lists routers that must precede router i
        let upstream: Vec<Vec<usize>> = self
            .routers
            .iter()
            .enumerate()
            .map(|(i, router)| {
                self.routers
                    .iter()
                    .enumerate()
                    .filter(|&(j, other)| j != i && other.lan == router.internet)
                    .map(|(j, _)| j)
                    .collect()
            })
            .collect();

        let mut pending: Vec<usize> = upstream.iter().map(Vec::len).collect();
        let mut done = vec![false; n];
        let mut order = Vec::with_capacity(n);

        while order.len() < n {
            let Some(next) = (0..n).find(|&i| !done[i] && pending[i] == 0) else {
                let routers = (0..n)
                    .filter(|&i| !done[i])
                    .map(|i| self.routers[i].base.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(TopologyError::GatewayCycle { routers });
            };
            done[next] = true;
            order.push(RouterId {
                owner: self.serial,
                index: next,
            });
            for (i, ups) in upstream.iter().enumerate() {
                pending[i] -= ups.iter().filter(|&&j| j == next).count();
            }
        }
        Ok(order)
    }

    /// Every `(computer, gateway, shared network)` triple, in declaration order.
    pub fn gateway_plan(&self) -> Result<Vec<(ComputerId, RouterId, NetworkId)>, TopologyError> {
        self.computer_ids()
            .filter_map(|id| {
                let gateway = self.computers[id.index].gateway?;
                Some(
                    self.shared_network(id, gateway)
                        .map(|network| (id, gateway, network)),
                )
            })
            .collect()
    }

    fn new_base(
        &mut self,
        name: &str,
        image: &str,
        networks: &[NetworkId],
    ) -> Result<BaseComputer, TopologyError> {
        for network in networks {
            self.network(*network)?;
        }
        if networks.is_empty() {
            return Err(TopologyError::NoNetworks {
                entity: name.to_string(),
            });
        }
        let name = self.claim_name(name)?;
        Ok(BaseComputer {
            name,
            image: image.to_string(),
            networks: networks.to_vec(),
        })
    }

    fn claim_name(&mut self, name: &str) -> Result<String, TopologyError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
        if !valid {
            return Err(TopologyError::InvalidName {
                name: name.to_string(),
            });
        }
        let namespaced = self.namespaced(name);
        if !self.names.insert(namespaced.clone()) {
            return Err(TopologyError::DuplicateName {
                name: name.to_string(),
            });
        }
        Ok(namespaced)
    }

    fn check_owner(&self, owner: u64) -> Result<(), TopologyError> {
        if owner == self.serial {
            Ok(())
        } else {
            Err(self.foreign())
        }
    }

    fn foreign(&self) -> TopologyError {
        TopologyError::ForeignHandle {
            setup: self.id.clone(),
        }
    }
}

fn parse_subnet(network: &str, raw: &str) -> Result<Ipv4Network, TopologyError> {
    let invalid = || TopologyError::InvalidSubnet {
        network: network.to_string(),
        subnet: raw.to_string(),
    };
    if !raw.contains('/') {
        return Err(invalid());
    }
    let subnet: Ipv4Network = raw.parse().map_err(|_| invalid())?;
    // docker rejects subnets with host bits set
    if subnet.network() != subnet.ip() {
        return Err(invalid());
    }
    Ok(subnet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_namespaced_by_setup_id() {
        let mut setup = Setup::new();
        let net = setup.new_network("network1", None).unwrap();
        let computer = setup.new_computer("computer", "ubuntu", &[net], None).unwrap();

        let expected = format!("{}_computer", setup.id());
        assert_eq!(setup.computer(computer).unwrap().base.name, expected);
        assert_eq!(
            setup.network(net).unwrap().name,
            format!("{}_network1", setup.id())
        );
    }

    #[test]
    fn distinct_setups_never_collide() {
        let mut a = Setup::new();
        let mut b = Setup::new();
        assert_ne!(a.id(), b.id());

        let na = a.new_network("network1", None).unwrap();
        let nb = b.new_network("network1", None).unwrap();
        assert_ne!(a.network(na).unwrap().name, b.network(nb).unwrap().name);
        assert_ne!(a.scratch_dir_name(), b.scratch_dir_name());
    }

    #[test]
    fn foreign_handles_are_rejected() {
        let mut a = Setup::new();
        let mut b = Setup::new();
        let foreign = b.new_network("network1", None).unwrap();

        let err = a
            .new_computer("computer", "ubuntu", &[foreign], None)
            .unwrap_err();
        assert!(matches!(err, TopologyError::ForeignHandle { .. }));
        assert!(a.computers().is_empty());
    }

    #[test]
    fn computers_need_a_network() {
        let mut setup = Setup::new();
        let err = setup.new_computer("computer", "ubuntu", &[], None).unwrap_err();
        assert_eq!(
            err,
            TopologyError::NoNetworks {
                entity: "computer".into()
            }
        );
    }

    #[test]
    fn duplicate_and_invalid_names_are_rejected() {
        let mut setup = Setup::new();
        let net = setup.new_network("net", None).unwrap();
        setup.new_computer("pc", "ubuntu", &[net], None).unwrap();

        assert!(matches!(
            setup.new_computer("pc", "ubuntu", &[net], None),
            Err(TopologyError::DuplicateName { .. })
        ));
        assert!(matches!(
            setup.new_network("bad name", None),
            Err(TopologyError::InvalidName { .. })
        ));
    }

    #[test]
    fn subnets_are_validated() {
        let mut setup = Setup::new();
        let net = setup.new_network("ok", Some("172.18.0.0/24")).unwrap();
        assert_eq!(
            setup.network(net).unwrap().subnet.unwrap().to_string(),
            "172.18.0.0/24"
        );

        for bad in ["172.18.0.0", "172.18.0.5/24", "300.1.1.0/24", "10.0.0.0/40"] {
            assert!(
                matches!(
                    setup.new_network(&format!("n{}", bad.len()), Some(bad)),
                    Err(TopologyError::InvalidSubnet { .. })
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn router_needs_two_distinct_networks() {
        let mut setup = Setup::new();
        let lan = setup.new_network("lan", None).unwrap();
        let err = setup.new_router("router", "router", lan, lan).unwrap_err();
        assert!(matches!(err, TopologyError::RouterLoop { .. }));
    }

    #[test]
    fn stun_servers_use_fixed_image() {
        let mut setup = Setup::new();
        let net = setup.new_network("internet", None).unwrap();
        let stun = setup.new_stun_server("stun", &[net]).unwrap();
        assert_eq!(setup.stun_server(stun).unwrap().base.image, STUN_IMAGE);
    }

    #[test]
    fn gateway_resolves_through_only_shared_network() {
        let mut setup = Setup::new();
        let net1 = setup.new_network("net1", None).unwrap();
        let internet = setup.new_network("internet", None).unwrap();
        let router = setup.new_router("router", "router", net1, internet).unwrap();
        let computer = setup
            .new_computer("computer", "ubuntu", &[net1], Some(router))
            .unwrap();

        assert_eq!(setup.shared_network(computer, router).unwrap(), net1);
        assert_eq!(
            setup.gateway_plan().unwrap(),
            vec![(computer, router, net1)]
        );
    }

    #[test]
    fn disjoint_gateway_is_a_configuration_error() {
        let mut setup = Setup::new();
        let net1 = setup.new_network("net1", None).unwrap();
        let lan = setup.new_network("lan", None).unwrap();
        let internet = setup.new_network("internet", None).unwrap();
        let router = setup.new_router("router", "router", lan, internet).unwrap();
        let computer = setup.new_computer("computer", "ubuntu", &[net1], None).unwrap();
        setup.set_gateway(computer, router).unwrap();

        let err = setup.gateway_plan().unwrap_err();
        assert!(matches!(err, TopologyError::NoSharedNetwork { .. }));
        assert!(err.to_string().contains("no shared network"));
    }

    #[test]
    fn chained_routers_are_configured_upstream_first() {
        let mut setup = Setup::new();
        let home = setup.new_network("home", None).unwrap();
        let isp = setup.new_network("isp", None).unwrap();
        let internet = setup.new_network("internet", None).unwrap();
        // declared downstream first on purpose
        let home_router = setup.new_router("home_router", "router", home, isp).unwrap();
        let cgnat = setup.new_router("cgnat", "router", isp, internet).unwrap();

        assert_eq!(setup.configuration_order().unwrap(), vec![cgnat, home_router]);
    }

    #[test]
    fn router_cycles_are_rejected() {
        let mut setup = Setup::new();
        let a = setup.new_network("a", None).unwrap();
        let b = setup.new_network("b", None).unwrap();
        setup.new_router("r1", "router", a, b).unwrap();
        setup.new_router("r2", "router", b, a).unwrap();

        assert!(matches!(
            setup.configuration_order(),
            Err(TopologyError::GatewayCycle { .. })
        ));
    }
}
