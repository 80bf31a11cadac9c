//! Parsing of `docker inspect` and in-container `ip addr` output.

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Label docker-compose puts on every network it creates, holding the key the
/// network had in the compose file.
pub const COMPOSE_NETWORK_LABEL: &str = "com.docker.compose.network";

/// Go template printing a container's network attachments as JSON.
pub const NETWORKS_TEMPLATE: &str = "{{json .NetworkSettings.Networks}}";

/// Go template printing a network's labels as JSON.
pub const LABELS_TEMPLATE: &str = "{{json .Labels}}";

/// One entry of `.NetworkSettings.Networks`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(rename = "IPAddress", default)]
    pub ip_address: String,
}

impl Attachment {
    /// Parsed address; `None` while docker has not assigned one.
    pub fn ip(&self) -> Option<IpAddr> {
        self.ip_address.parse().ok()
    }
}

/// Parse the output of `docker inspect --format NETWORKS_TEMPLATE`, keyed by
/// docker's own network name.
pub fn parse_attachments(raw: &[u8]) -> Result<BTreeMap<String, Attachment>> {
    let parsed: Option<BTreeMap<String, Attachment>> =
        serde_json::from_slice(raw.trim_ascii()).context("parse container network attachments")?;
    Ok(parsed.unwrap_or_default())
}

/// Parse the output of `docker network inspect --format LABELS_TEMPLATE`.
pub fn parse_labels(raw: &[u8]) -> Result<HashMap<String, String>> {
    let parsed: Option<HashMap<String, String>> =
        serde_json::from_slice(raw.trim_ascii()).context("parse network labels")?;
    Ok(parsed.unwrap_or_default())
}

/// Find the interface carrying `addr` in `ip -o -4 addr show` output.
///
/// Lines look like `17: eth0@if18    inet 172.18.0.2/24 brd ... scope global eth0`.
pub fn interface_for_address(listing: &str, addr: IpAddr) -> Option<String> {
    listing.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let _index = fields.next()?;
        let iface = fields.next()?;
        if fields.next()? != "inet" {
            return None;
        }
        let cidr = fields.next()?;
        let ip: IpAddr = cidr.split('/').next()?.parse().ok()?;
        (ip == addr).then(|| iface.split('@').next().unwrap_or(iface).to_string())
    })
}
