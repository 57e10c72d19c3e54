//! Type registry used by the context-aware decoder.
//!
//! The registry decides which `"type"` values a build accepts for each
//! polymorphic section, and resolves legacy DNS server entries that carry
//! only an `"address"` URL into an explicit transport type.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

const INBOUND_TYPES: [&str; 17] = [
    "tun",
    "mixed",
    "socks",
    "http",
    "direct",
    "redirect",
    "tproxy",
    "shadowsocks",
    "vmess",
    "vless",
    "trojan",
    "naive",
    "hysteria",
    "hysteria2",
    "tuic",
    "shadowtls",
    "anytls",
];
const OUTBOUND_TYPES: [&str; 20] = [
    "direct",
    "block",
    "dns",
    "selector",
    "urltest",
    "socks",
    "http",
    "shadowsocks",
    "vmess",
    "vless",
    "trojan",
    "naive",
    "hysteria",
    "hysteria2",
    "tuic",
    "shadowtls",
    "anytls",
    "ssh",
    "wireguard",
    "tor",
];
const DNS_TRANSPORT_TYPES: [&str; 11] = [
    "local", "udp", "tcp", "tls", "quic", "https", "h3", "dhcp", "fakeip", "rcode", "hosts",
];

const RCODES: [&str; 6] = [
    "success",
    "format_error",
    "server_failure",
    "name_error",
    "not_implemented",
    "refused",
];
const DHCP_AUTO: &str = "auto";

const DEFAULT_DOH_PATH: &str = "/dns-query";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    inbounds: BTreeSet<&'static str>,
    outbounds: BTreeSet<&'static str>,
    dns_transports: BTreeSet<&'static str>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::standard()
    }
}

impl Registry {
    /// Every inbound, outbound and DNS transport type the engine schema knows.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            inbounds: INBOUND_TYPES.into_iter().collect(),
            outbounds: OUTBOUND_TYPES.into_iter().collect(),
            dns_transports: DNS_TRANSPORT_TYPES.into_iter().collect(),
        }
    }

    /// Drop an inbound type, for builds that leave a listener out.
    #[must_use]
    pub fn without_inbound(mut self, kind: &str) -> Self {
        self.inbounds.remove(kind);
        self
    }

    #[must_use]
    pub fn without_outbound(mut self, kind: &str) -> Self {
        self.outbounds.remove(kind);
        self
    }

    #[must_use]
    pub fn without_dns_transport(mut self, kind: &str) -> Self {
        self.dns_transports.remove(kind);
        self
    }

    #[must_use]
    pub fn has_inbound(&self, kind: &str) -> bool {
        self.inbounds.contains(kind)
    }

    #[must_use]
    pub fn has_outbound(&self, kind: &str) -> bool {
        self.outbounds.contains(kind)
    }

    #[must_use]
    pub fn has_dns_transport(&self, kind: &str) -> bool {
        self.dns_transports.contains(kind)
    }

    /// Translate a legacy DNS `address` (`tls://1.1.1.1`, `https://dns.google/dns-query`,
    /// `8.8.8.8:53`, `dhcp://auto`, `rcode://refused`, `local`, `fakeip`) into
    /// typed transport fields.
    pub fn infer_dns_transport(&self, address: &str) -> Result<Map<String, Value>, String> {
        let address = address.trim();
        let (kind, rest) = match address.split_once("://") {
            Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
            None => match address {
                "local" | "fakeip" => (address.to_string(), ""),
                _ => ("udp".to_string(), address),
            },
        };

        if !self.has_dns_transport(&kind) {
            return Err(format!("unknown DNS transport {:?} in address {:?}", kind, address));
        }

        let mut fields = Map::new();
        fields.insert("type".into(), Value::String(kind.clone()));
        match kind.as_str() {
            "local" | "fakeip" => return Ok(fields),
            "dhcp" => {
                if !rest.is_empty() && rest != DHCP_AUTO {
                    fields.insert("interface".into(), Value::String(rest.to_string()));
                }
                return Ok(fields);
            }
            "rcode" => {
                let code = rest.to_ascii_lowercase();
                if !RCODES.contains(&code.as_str()) {
                    return Err(format!("unknown rcode {:?} in address {:?}", rest, address));
                }
                fields.insert("rcode".into(), Value::String(code));
                return Ok(fields);
            }
            _ => {}
        }

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], Some(&rest[idx..])),
            None => (rest, None),
        };
        let (host, port) = split_host_port(authority)
            .ok_or_else(|| format!("invalid DNS server address {:?}", address))?;

        fields.insert("server".into(), Value::String(host.to_string()));
        if let Some(port) = port {
            fields.insert("server_port".into(), Value::from(port));
        }
        if kind == "https" || kind == "h3" {
            let path = path.filter(|p| !p.is_empty()).unwrap_or(DEFAULT_DOH_PATH);
            fields.insert("path".into(), Value::String(path.to_string()));
        }
        Ok(fields)
    }
}

/// Split `host`, `host:port`, `[v6]` or `[v6]:port`. A bare IPv6 literal
/// without brackets is returned as the host.
fn split_host_port(authority: &str) -> Option<(&str, Option<u16>)> {
    if authority.is_empty() {
        return None;
    }
    if let Some(rest) = authority.strip_prefix('[') {
        let end = rest.find(']')?;
        let host = &rest[..end];
        let tail = &rest[end + 1..];
        if tail.is_empty() {
            return Some((host, None));
        }
        let port = tail.strip_prefix(':')?.parse().ok()?;
        return Some((host, Some(port)));
    }
    match authority.matches(':').count() {
        0 => Some((authority, None)),
        1 => {
            let (host, port) = authority.split_once(':')?;
            if host.is_empty() {
                return None;
            }
            Some((host, Some(port.parse().ok()?)))
        }
        _ => Some((authority, None)),
    }
}
