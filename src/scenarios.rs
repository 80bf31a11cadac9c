//! Built-in scenarios.
//!
//! Each one declares its own subnets so concurrently running scenarios never
//! compete for the same address range.

use anyhow::{Context, Result, bail, ensure};
use compose_sim::{Environment, Setup};
use tracing::{info, warn};

use crate::control::stun_ice_config;
use crate::runner::{Scenario, ScenarioContext};

/// Port STUN servers listen on.
pub const STUN_PORT: u16 = 3478;

/// Pings sent by the gateway scenarios.
const PING_COUNT: u32 = 3;

pub static REGISTRY: &[Scenario] = &[
    Scenario {
        name: "ice_candidates_gather",
        description: "gathered host candidates match the container's addresses",
        run: ice_candidates_gather,
    },
    Scenario {
        name: "gateway",
        description: "a computer behind a NAT router reaches a server on the internet side",
        run: gateway,
    },
    Scenario {
        name: "stun_behind_nat",
        description: "STUN reports the router's internet address for a computer behind NAT",
        run: stun_behind_nat,
    },
    Scenario {
        name: "ice_connection_behind_nat",
        description: "two computers behind separate NATs connect via ICE with a STUN server",
        run: ice_connection_behind_nat,
    },
];

pub fn find(name: &str) -> Option<&'static Scenario> {
    REGISTRY.iter().find(|s| s.name == name)
}

/// Start `setup`, run `body` against it and tear it down.
///
/// A teardown failure is only reported when the body succeeded.
fn with_environment(
    ctx: &ScenarioContext,
    setup: Setup,
    body: impl FnOnce(&Environment) -> Result<()>,
) -> Result<()> {
    let mut env = Environment::new(setup, ctx.config.environment.clone());
    env.start()?;
    let result = body(&env);
    match (result, env.stop()) {
        (Ok(()), Ok(())) => Ok(()),
        (Ok(()), Err(stop)) => Err(stop.into()),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(stop)) => {
            warn!(setup = env.setup().id(), "teardown after failed test: {stop}");
            Err(err)
        }
    }
}

fn ice_candidates_gather(ctx: &ScenarioContext) -> Result<()> {
    let mut setup = Setup::new();
    let network1 = setup.new_network("network1", Some("172.18.0.0/24"))?;
    let network2 = setup.new_network("network2", Some("172.19.0.0/24"))?;
    let target = ctx.images.target.as_str();
    let computers = [
        setup.new_computer("computer", target, &[network1, network2], None)?,
        setup.new_computer("computer2", target, &[network1, network2], None)?,
    ];

    with_environment(ctx, setup, |env| {
        for computer in computers {
            let addresses = env.all_ip_addresses(computer)?;
            ensure!(
                addresses.len() == 2,
                "expected 2 addresses, container has {addresses:?}"
            );
            let candidates = ctx.control(addresses[0])?.gather_candidates()?;
            check_candidates_match(
                candidates.into_iter().map(|c| c.address).collect(),
                addresses.iter().map(ToString::to_string).collect(),
            )?;
        }
        Ok(())
    })
}

/// Compare gathered candidate addresses with the container's, ignoring order.
pub fn check_candidates_match(mut received: Vec<String>, mut expected: Vec<String>) -> Result<()> {
    ensure!(
        received.len() == expected.len(),
        "expected {} candidates, got {}",
        expected.len(),
        received.len()
    );
    received.sort();
    expected.sort();
    if received != expected {
        bail!("ip addresses do not match\ncontainer has: {expected:?}\nreceived: {received:?}");
    }
    Ok(())
}

fn gateway(ctx: &ScenarioContext) -> Result<()> {
    let mut setup = Setup::new();
    let lan = setup.new_network("lan", Some("172.20.0.0/24"))?;
    let internet = setup.new_network("internet", Some("172.21.0.0/24"))?;
    let router = setup.new_router("router", &ctx.images.router, lan, internet)?;
    let computer = setup.new_computer("computer", &ctx.images.target, &[lan], Some(router))?;
    let server = setup.new_computer("server", &ctx.images.target, &[internet], None)?;

    with_environment(ctx, setup, |env| {
        let server_ip = env.ip_address_for_network(server, internet)?;
        let client = ctx.control(env.ip_address_for_network(computer, lan)?)?;
        let times = client
            .ping(server_ip, PING_COUNT)
            .with_context(|| format!("ping {server_ip} through the router"))?;
        ensure!(
            times.len() == PING_COUNT as usize,
            "expected {PING_COUNT} round trips to {server_ip}, got {times:?}"
        );
        info!(?times, "ping through NAT");
        Ok(())
    })
}

fn stun_behind_nat(ctx: &ScenarioContext) -> Result<()> {
    let mut setup = Setup::new();
    let lan = setup.new_network("lan", Some("172.22.0.0/24"))?;
    let internet = setup.new_network("internet", Some("172.23.0.0/24"))?;
    let router = setup.new_router("router", &ctx.images.router, lan, internet)?;
    let computer = setup.new_computer("computer", &ctx.images.target, &[lan], Some(router))?;
    let stun = setup.new_stun_server("stun", &[internet])?;

    with_environment(ctx, setup, |env| {
        let stun_ip = env.ip_address_for_network(stun, internet)?;
        let public_ip = env.ip_address_for_network(router, internet)?;
        let client = ctx.control(env.ip_address_for_network(computer, lan)?)?;

        let reported = client.ip_from_stun(&format!("{stun_ip}:{STUN_PORT}"))?;
        ensure!(
            reported.trim() == public_ip.to_string(),
            "STUN reported {reported}, expected the router's address {public_ip}"
        );
        Ok(())
    })
}

fn ice_connection_behind_nat(ctx: &ScenarioContext) -> Result<()> {
    let mut setup = Setup::new();
    let lan1 = setup.new_network("lan1", Some("172.24.0.0/24"))?;
    let lan2 = setup.new_network("lan2", Some("172.25.0.0/24"))?;
    let internet = setup.new_network("internet", Some("172.26.0.0/24"))?;
    let router1 = setup.new_router("router1", &ctx.images.router, lan1, internet)?;
    let router2 = setup.new_router("router2", &ctx.images.router, lan2, internet)?;
    let computer1 = setup.new_computer("computer1", &ctx.images.target, &[lan1], Some(router1))?;
    let computer2 = setup.new_computer("computer2", &ctx.images.target, &[lan2], Some(router2))?;
    let stun = setup.new_stun_server("stun", &[internet])?;

    with_environment(ctx, setup, |env| {
        let stun_ip = env.ip_address_for_network(stun, internet)?;
        let config = stun_ice_config(stun_ip, STUN_PORT);
        let offerer = ctx.control(env.ip_address_for_network(computer1, lan1)?)?;
        let answerer = ctx.control(env.ip_address_for_network(computer2, lan2)?)?;

        let offer = offerer.create_offer(&config).context("create offer")?;
        let answer = answerer
            .create_answer(&offer, &config)
            .context("create answer")?;
        offerer.received_answer(&answer).context("deliver answer")?;

        let (attempts, interval) = (ctx.config.poll_attempts, ctx.config.poll_interval);
        for client in [&offerer, &answerer] {
            let state = client.wait_connected(attempts, interval)?;
            info!(peer = client.base_url(), state = %state, "ICE connected");
        }
        Ok(())
    })
}
