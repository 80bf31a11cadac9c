//! Compose file generation.
//!
//! The document is built by hand rather than through a YAML serializer so the
//! output stays byte-for-byte stable: tests and diffs compare it literally.

use crate::topology::{BaseComputer, Network, Setup};

/// File name the descriptor is written to inside the scratch directory.
pub const DESCRIPTOR_FILE: &str = "docker-compose.yml";

const HEADER: &str = "version: \"2.1\"\nservices:\n";

impl Setup {
    /// Render the compose document for this topology.
    ///
    /// Services are emitted computers first, then STUN servers, then routers,
    /// each group in declaration order.
    pub fn to_descriptor(&self) -> String {
        let mut doc = String::from(HEADER);

        let services = self
            .computers()
            .iter()
            .map(|c| &c.base)
            .chain(self.stun_servers().iter().map(|s| &s.base))
            .chain(self.routers().iter().map(|r| &r.base));
        for base in services {
            doc.push_str(&self.service_entry(base));
        }

        if !self.networks().is_empty() {
            doc.push_str("networks:\n");
            for network in self.networks() {
                doc.push_str(&network_entry(network));
            }
        }
        doc
    }

    fn service_entry(&self, base: &BaseComputer) -> String {
        let mut entry = format!(
            "  {name}:\n    container_name: {name}\n    image: {image}\n    privileged: true\n",
            name = base.name,
            image = base.image,
        );
        entry.push_str("    networks:\n");
        // handles were validated when the entity was created
        for network in base.networks.iter().filter_map(|id| self.network(*id).ok()) {
            entry.push_str(&format!("      {}:\n", network.name));
        }
        entry
    }
}

fn network_entry(network: &Network) -> String {
    match network.subnet {
        Some(subnet) => format!(
            "  {}:\n    ipam:\n      config:\n      - subnet: {}\n",
            network.name, subnet
        ),
        None => format!("  {}:\n", network.name),
    }
}
