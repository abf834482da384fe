// Who is calling: the public IP and a short description of this machine,
// sent with every API request.

use reqwest::blocking::Client;
use serde::Deserialize;

pub const DEFAULT_IP_LOOKUP_URL: &str = "https://api.ipify.org?format=json";

const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub ip: String,
    pub machine: String,
}

#[derive(Deserialize)]
struct IpResponse {
    ip: String,
}

/// Look up the public IP and machine description side by side.
///
/// A failed IP lookup is logged and reported as `unknown` rather than
/// failing the command.
pub fn lookup(client: &Client, ip_lookup_url: &str) -> Identity {
    let (ip, machine) = std::thread::scope(|scope| {
        let ip = scope.spawn(|| public_ip(client, ip_lookup_url));
        let machine = scope.spawn(machine_description);
        (ip.join(), machine.join())
    });

    let ip = match ip {
        Ok(Ok(ip)) => ip,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "could not determine public ip");
            UNKNOWN.to_string()
        }
        Err(_) => UNKNOWN.to_string(),
    };
    let machine = machine.unwrap_or_else(|_| UNKNOWN.to_string());
    tracing::debug!(%ip, %machine, "resolved caller identity");
    Identity { ip, machine }
}

fn public_ip(client: &Client, url: &str) -> reqwest::Result<String> {
    let res: IpResponse = client.get(url).send()?.error_for_status()?.json()?;
    Ok(res.ip)
}

/// e.g. `build-box (linux x86_64)`
pub fn machine_description() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string());
    format!("{host} ({} {})", std::env::consts::OS, std::env::consts::ARCH)
}
