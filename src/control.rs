//! Blocking HTTP client for the control plane each computer image serves.

use std::net::IpAddr;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// ICE states after which polling stops.
const ICE_READY: [&str; 2] = ["connected", "completed"];
const ICE_DEAD: [&str; 2] = ["failed", "closed"];

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Candidate {
    pub address: String,
}

#[derive(Deserialize)]
struct Candidates {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Times {
    #[serde(default)]
    times: Vec<f64>,
}

#[derive(Deserialize)]
struct Ip {
    ip: String,
}

#[derive(Deserialize)]
struct Sdp {
    sdp: String,
}

#[derive(Deserialize)]
struct State {
    state: String,
}

/// Talks to the control plane of one computer.
pub struct ControlClient {
    client: Client,
    base: String,
}

impl ControlClient {
    pub fn new(ip: IpAddr, port: u16) -> Result<Self> {
        let host = match ip {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{v6}]"),
        };
        Self::with_base_url(format!("http://{host}:{port}"))
    }

    pub fn with_base_url(base: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build control-plane HTTP client")?;
        Ok(Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub fn gather_candidates(&self) -> Result<Vec<Candidate>> {
        let body: Candidates = self.get("gather-candidates")?;
        Ok(body.candidates)
    }

    /// Round-trip times in milliseconds of `times` pings to `ip`.
    pub fn ping(&self, ip: IpAddr, times: u32) -> Result<Vec<f64>> {
        let body: Times = self.post(
            "ping",
            &[("ip", ip.to_string()), ("times", times.to_string())],
        )?;
        Ok(body.times)
    }

    /// Public address the computer sees when asking the STUN server at `stun`
    /// (`host:port`).
    pub fn ip_from_stun(&self, stun: &str) -> Result<String> {
        let body: Ip = self.post("get-ip-from-stun", &[("stun", stun.to_string())])?;
        Ok(body.ip)
    }

    pub fn create_offer(&self, config: &serde_json::Value) -> Result<String> {
        let body: Sdp = self.post("create-offer", &[("config", config.to_string())])?;
        Ok(body.sdp)
    }

    pub fn create_answer(&self, offer: &str, config: &serde_json::Value) -> Result<String> {
        let body: Sdp = self.post(
            "create-answer",
            &[("offer", offer.to_string()), ("config", config.to_string())],
        )?;
        Ok(body.sdp)
    }

    pub fn received_answer(&self, answer: &str) -> Result<()> {
        let url = self.url("received-answer");
        let res = self
            .client
            .post(&url)
            .form(&[("answer", answer)])
            .send()
            .with_context(|| format!("POST {url}"))?;
        check_status(&url, res)?;
        Ok(())
    }

    pub fn ice_connection_state(&self) -> Result<String> {
        let body: State = self.get("get-ice-connection-state")?;
        Ok(body.state)
    }

    /// Poll the ICE connection state until it is connected or completed.
    ///
    /// Fails on `failed`/`closed` or once `attempts` polls have been made.
    pub fn wait_connected(&self, attempts: u32, interval: Duration) -> Result<String> {
        let mut last = String::new();
        for attempt in 1..=attempts {
            last = self.ice_connection_state()?;
            debug!(url = %self.base, attempt, state = %last, "ice connection state");
            if ICE_READY.contains(&last.as_str()) {
                return Ok(last);
            }
            if ICE_DEAD.contains(&last.as_str()) {
                bail!("ICE connection at {} ended in state {last}", self.base);
            }
            if attempt < attempts {
                thread::sleep(interval);
            }
        }
        bail!(
            "ICE connection at {} not ready after {attempts} polls (last state '{last}')",
            self.base
        )
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base)
    }

    fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = self.url(endpoint);
        let res = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("GET {url}"))?;
        check_status(&url, res)?
            .json()
            .with_context(|| format!("decode response of {url}"))
    }

    fn post<T: DeserializeOwned>(&self, endpoint: &str, form: &[(&str, String)]) -> Result<T> {
        let url = self.url(endpoint);
        let res = self
            .client
            .post(&url)
            .form(form)
            .send()
            .with_context(|| format!("POST {url}"))?;
        check_status(&url, res)?
            .json()
            .with_context(|| format!("decode response of {url}"))
    }
}

fn check_status(url: &str, res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().unwrap_or_default();
    bail!("{url} returned {status}: {}", body.trim())
}

/// ICE configuration pointing at a single STUN server.
pub fn stun_ice_config(stun_ip: IpAddr, port: u16) -> serde_json::Value {
    serde_json::json!({
        "ice_servers": [{ "urls": [format!("stun:{stun_ip}:{port}")] }]
    })
}
