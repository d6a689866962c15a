// src/discovery.rs
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::Serialize;

pub const WS_DISCOVERY_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
pub const WS_DISCOVERY_PORT: u16 = 3702;

/// A camera that answered the WS-Discovery probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredDevice {
    pub ip: IpAddr,
    /// First `http://a.b.c.d:port` service address in the reply, if any.
    pub xaddr: Option<String>,
}

fn probe_message(message_id: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<e:Envelope xmlns:e="http://www.w3.org/2003/05/soap-envelope"
            xmlns:w="http://schemas.xmlsoap.org/ws/2004/08/addressing"
            xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery"
            xmlns:dn="http://www.onvif.org/ver10/network/wsdl">
  <e:Header>
    <w:MessageID>uuid:{}</w:MessageID>
    <w:To>urn:schemas-xmlsoap-org:ws:2005:04:discovery</w:To>
    <w:Action>http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe</w:Action>
  </e:Header>
  <e:Body>
    <d:Probe>
      <d:Types>dn:NetworkVideoTransmitter</d:Types>
    </d:Probe>
  </e:Body>
</e:Envelope>"#,
        message_id
    )
}

fn random_uuid() -> String {
    let v: u128 = rand::random();
    // version 4, RFC 4122 variant
    let v = (v & !(0xf << 76)) | (0x4 << 76);
    let v = (v & !(0x3 << 62)) | (0x2 << 62);
    let hex = format!("{:032x}", v);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Multicasts one probe for ONVIF video transmitters and collects replies
/// until `timeout` runs out. One entry per responding IP, in IP order.
pub fn discover_onvif(timeout: Duration) -> anyhow::Result<Vec<DiscoveredDevice>> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).context("bind discovery socket")?;
    socket.set_multicast_ttl_v4(1)?;

    let probe = probe_message(&random_uuid());
    socket
        .send_to(probe.as_bytes(), SocketAddr::from((WS_DISCOVERY_GROUP, WS_DISCOVERY_PORT)))
        .context("send WS-Discovery probe")?;
    log::info!("[discovery] probe sent, listening for {:?}", timeout);

    let deadline = Instant::now() + timeout;
    let mut found: BTreeMap<IpAddr, DiscoveredDevice> = BTreeMap::new();
    let mut buf = [0u8; 8192];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        socket.set_read_timeout(Some(remaining))?;

        match socket.recv_from(&mut buf) {
            Ok((n, from)) => {
                let ip = from.ip();
                if found.contains_key(&ip) {
                    continue;
                }
                let body = String::from_utf8_lossy(&buf[..n]);
                let xaddr = extract_xaddr(&body);
                log::info!("[discovery] device at {} xaddr={:?}", ip, xaddr);
                found.insert(ip, DiscoveredDevice { ip, xaddr });
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => break,
            Err(e) => return Err(e).context("receive WS-Discovery reply"),
        }
    }

    log::info!("[discovery] finished, {} device(s)", found.len());
    Ok(found.into_values().collect())
}

/// Finds the first `http://<ipv4>:<port>` in a probe match.
pub fn extract_xaddr(body: &str) -> Option<String> {
    let mut rest = body;
    while let Some(pos) = rest.find("http://") {
        let candidate = &rest[pos + "http://".len()..];
        let end = candidate
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ':'))
            .unwrap_or(candidate.len());
        if let Some(hostport) = parse_ipv4_port(&candidate[..end]) {
            return Some(format!("http://{}", hostport));
        }
        rest = candidate;
    }
    None
}

fn parse_ipv4_port(s: &str) -> Option<&str> {
    let (host, port) = s.split_once(':')?;
    let port_len = port.bytes().take_while(u8::is_ascii_digit).count();
    if port_len == 0 {
        return None;
    }
    let octets: Vec<&str> = host.split('.').collect();
    if octets.len() != 4 || octets.iter().any(|o| o.is_empty()) {
        return None;
    }
    Some(&s[..host.len() + 1 + port_len])
}

/// TOML snippet ready to paste into the config file.
pub fn source_snippet(id: u32, device: &DiscoveredDevice) -> String {
    let mut out = format!(
        "[[sources]]\nid = {}\nname = \"{}\"\naddress = \"{}\"\ninterval_secs = 10\nenabled = false\n",
        id, device.ip, device.ip
    );
    if let Some(xaddr) = &device.xaddr {
        out.insert_str(0, &format!("# onvif {}\n", xaddr));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_first_numeric_xaddr() {
        let body = "<d:XAddrs>http://cam.local/onvif http://192.168.1.69:8899/onvif/device_service \
                    http://10.0.0.2:80/x</d:XAddrs>";
        assert_eq!(
            extract_xaddr(body).as_deref(),
            Some("http://192.168.1.69:8899")
        );
    }

    #[test]
    fn no_xaddr_without_port() {
        assert_eq!(extract_xaddr("<XAddrs>http://192.168.1.69/onvif</XAddrs>"), None);
        assert_eq!(extract_xaddr("nothing here"), None);
    }

    #[test]
    fn probe_targets_video_transmitters() {
        let id = random_uuid();
        assert_eq!(id.len(), 36);
        assert_eq!(&id[14..15], "4");

        let msg = probe_message(&id);
        assert!(msg.contains("dn:NetworkVideoTransmitter"));
        assert!(msg.contains(&format!("uuid:{}", id)));
    }

    #[test]
    fn snippet_is_valid_source_toml() {
        let device = DiscoveredDevice {
            ip: "192.168.1.69".parse().unwrap(),
            xaddr: Some("http://192.168.1.69:8899".into()),
        };
        let snippet = source_snippet(7, &device);
        let cfg = crate::config::parse(&snippet).unwrap();
        assert_eq!(cfg.sources[0].id, 7);
        assert_eq!(cfg.sources[0].address, "192.168.1.69");
    }
}
