//! docker-compose backed network topologies for NAT traversal testing.
//!
//! A [`Setup`] describes networks, computers, NAT routers and STUN servers.
//! An [`Environment`] renders it to a compose file, brings it up, rewires
//! default routes through the routers and installs masquerading rules, then
//! tears everything down again.
//!
//! # Modules
//!
//! - [`topology`]: Entity model, handles and validation
//! - [`descriptor`]: Deterministic compose file rendering
//! - [`exec`]: Command execution with on-disk failure diagnostics
//! - [`environment`]: Start/stop lifecycle and address discovery
//! - [`inspect`]: Parsing of `docker inspect` and `ip addr` output
//! - [`capture`]: Background packet captures on router interfaces
//! - [`image`]: Local image builds
//! - [`test_util`]: Docker availability checks and a scripted fake docker

pub mod capture;
pub mod descriptor;
pub mod environment;
pub mod exec;
pub mod image;
pub mod inspect;
pub mod test_util;
pub mod topology;

pub use descriptor::DESCRIPTOR_FILE;
pub use environment::{Environment, EnvironmentConfig, EnvironmentState, StopError, StopStep};
pub use exec::{Execution, Executor};
pub use image::{build_image_from_dockerfile, build_image_from_path};
pub use test_util::{check_compose, check_docker};
pub use topology::{
    BaseComputer, Computer, ComputerId, Entity, Network, NetworkId, Router, RouterId, STUN_IMAGE,
    Setup, StunServer, StunServerId, TopologyError,
};
