//! Network Enumeration Implementation

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    network::{ConnectedNetwork, NetworkEnumerator, NetworkHandle, NetworkTransport},
};
use tokio::process::Command;
use tracing::{debug, warn};

const NMCLI_TIMEOUT: Duration = Duration::from_secs(3);

/// Desktop network enumerator
///
/// Lists the host's network interfaces with `if-addrs`, classifies each one by
/// transport and asks NetworkManager (`nmcli`) for the SSID of the active
/// Wi-Fi connection on every wireless device.
///
/// Hosts without NetworkManager still get their interfaces listed; Wi-Fi
/// interfaces simply carry no SSID and can never match a bind request.
pub struct DesktopNetworkEnumerator {
    nmcli: String,
}

impl DesktopNetworkEnumerator {
    pub fn new() -> Self {
        Self {
            nmcli: "nmcli".to_string(),
        }
    }

    /// Use a different `nmcli` binary (tests, sandboxed hosts).
    pub fn with_nmcli(mut self, program: impl Into<String>) -> Self {
        self.nmcli = program.into();
        self
    }

    async fn active_ssids(&self) -> HashMap<String, String> {
        let output = tokio::time::timeout(
            NMCLI_TIMEOUT,
            Command::new(&self.nmcli)
                .args([
                    "-t",
                    "-f",
                    "ACTIVE,SSID,DEVICE",
                    "device",
                    "wifi",
                    "list",
                    "--rescan",
                    "no",
                ])
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match output {
            Ok(Ok(output)) if output.status.success() => {
                parse_nmcli_wifi_list(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(Ok(output)) => {
                debug!(status = ?output.status, "nmcli exited unsuccessfully");
                HashMap::new()
            }
            Ok(Err(e)) => {
                debug!(error = %e, "nmcli not available");
                HashMap::new()
            }
            Err(_) => {
                warn!("nmcli did not answer in time");
                HashMap::new()
            }
        }
    }
}

impl Default for DesktopNetworkEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkEnumerator for DesktopNetworkEnumerator {
    async fn connected_networks(&self) -> Result<Vec<ConnectedNetwork>> {
        let interfaces = if_addrs::get_if_addrs().map_err(|e| {
            BridgeError::QueryFailed(format!("Failed to enumerate interfaces: {}", e))
        })?;

        // One entry per interface; prefer its IPv4 address.
        let mut by_name: Vec<(String, Option<u32>, IpAddr)> = Vec::new();
        for iface in interfaces {
            if iface.is_loopback() {
                continue;
            }
            let ip = iface.ip();
            match by_name.iter_mut().find(|(name, _, _)| *name == iface.name) {
                Some(entry) => {
                    if entry.2.is_ipv6() && ip.is_ipv4() {
                        entry.2 = ip;
                    }
                }
                None => by_name.push((iface.name.clone(), iface.index, ip)),
            }
        }

        let ssids = if by_name
            .iter()
            .any(|(name, _, _)| transport_for(name) == NetworkTransport::WiFi)
        {
            self.active_ssids().await
        } else {
            HashMap::new()
        };

        let networks: Vec<ConnectedNetwork> = by_name
            .into_iter()
            .enumerate()
            .map(|(position, (name, index, ip))| {
                let transport = transport_for(&name);
                let ssid = ssids.get(&name).cloned();
                let handle = index.map(u64::from).unwrap_or(position as u64 + 1);
                ConnectedNetwork {
                    handle: NetworkHandle::new(handle, name).with_local_addr(ip),
                    transport,
                    connected: true,
                    ssid,
                }
            })
            .collect();

        debug!(count = networks.len(), "Enumerated desktop networks");
        Ok(networks)
    }
}

fn transport_for(name: &str) -> NetworkTransport {
    let wireless_dir = Path::new("/sys/class/net").join(name).join("wireless");
    classify_interface(name, wireless_dir.exists())
}

fn classify_interface(name: &str, has_wireless_dir: bool) -> NetworkTransport {
    if has_wireless_dir || name.starts_with("wl") || name.starts_with("wifi") {
        NetworkTransport::WiFi
    } else if name.starts_with("ww") || name.starts_with("rmnet") || name.starts_with("pdp_ip") {
        NetworkTransport::Cellular
    } else if name.starts_with("en") || name.starts_with("eth") {
        NetworkTransport::Ethernet
    } else {
        NetworkTransport::Other
    }
}

/// Parse `nmcli -t -f ACTIVE,SSID,DEVICE device wifi list` into device → SSID
/// for the active rows. Terse mode escapes `:` and `\` inside values.
fn parse_nmcli_wifi_list(output: &str) -> HashMap<String, String> {
    let mut ssids = HashMap::new();
    for line in output.lines() {
        let fields = split_terse(line);
        let [active, ssid, device] = fields.as_slice() else {
            continue;
        };
        if active == "yes" && !ssid.is_empty() && !device.is_empty() {
            ssids.insert(device.clone(), ssid.clone());
        }
    }
    ssids
}

fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ':' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
