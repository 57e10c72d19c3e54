//! Typed engine configuration.
//!
//! Polymorphic sections (inbounds, outbounds, DNS servers) are internally
//! tagged by their `"type"` field. Only what this crate inspects is
//! modelled; every other key lands in an `extra` map and is serialized
//! back unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const CONSOLE_LOG_OUTPUT: &str = "console";

/// Keys passed through to the engine untouched.
pub type Settings = Map<String, Value>;

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Options {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<LogOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsOptions>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inbounds: Vec<Inbound>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outbounds: Vec<Outbound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Value>,
    /// `ntp`, `endpoints`, `certificate` and other top-level sections.
    #[serde(flatten)]
    pub extra: Settings,
}

impl Options {
    /// Route engine logs to its console writer, creating the log section
    /// when the document has none.
    pub fn force_console_log(&mut self) {
        self.log.get_or_insert_with(LogOptions::default).output =
            Some(CONSOLE_LOG_OUTPUT.to_string());
    }

    pub fn tun_inbounds(&self) -> impl Iterator<Item = &TunInboundOptions> {
        self.inbounds.iter().filter_map(|inbound| match &inbound.options {
            InboundOptions::Tun(tun) => Some(tun),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogOptions {
    #[serde(default, skip_serializing_if = "is_false")]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<bool>,
    #[serde(flatten)]
    pub extra: Settings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DnsOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<DnsServer>,
    /// Rules, `final`, strategy and the like.
    #[serde(flatten)]
    pub extra: Settings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsServer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(flatten)]
    pub transport: DnsTransport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DnsTransport {
    Local(Settings),
    Udp(RemoteDns),
    Tcp(RemoteDns),
    Tls(RemoteDns),
    Quic(RemoteDns),
    Https(RemoteDns),
    H3(RemoteDns),
    Dhcp(DhcpDns),
    Fakeip(FakeIpDns),
    Rcode(RcodeDns),
    Hosts(Settings),
}

impl DnsTransport {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::Udp(_) => "udp",
            Self::Tcp(_) => "tcp",
            Self::Tls(_) => "tls",
            Self::Quic(_) => "quic",
            Self::Https(_) => "https",
            Self::H3(_) => "h3",
            Self::Dhcp(_) => "dhcp",
            Self::Fakeip(_) => "fakeip",
            Self::Rcode(_) => "rcode",
            Self::Hosts(_) => "hosts",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteDns {
    pub server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detour: Option<String>,
    #[serde(flatten)]
    pub extra: Settings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DhcpDns {
    /// Interface to query; absent means the default one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(flatten)]
    pub extra: Settings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FakeIpDns {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inet4_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inet6_range: Option<String>,
    #[serde(flatten)]
    pub extra: Settings,
}

/// Answers every query with a fixed response code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RcodeDns {
    pub rcode: String,
    #[serde(flatten)]
    pub extra: Settings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inbound {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(flatten)]
    pub options: InboundOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundOptions {
    Tun(TunInboundOptions),
    Mixed(ListenOptions),
    Socks(ListenOptions),
    Http(ListenOptions),
    Direct(ListenOptions),
    Redirect(ListenOptions),
    Tproxy(ListenOptions),
    Shadowsocks(ListenOptions),
    Vmess(ListenOptions),
    Vless(ListenOptions),
    Trojan(ListenOptions),
    Naive(ListenOptions),
    Hysteria(ListenOptions),
    Hysteria2(ListenOptions),
    Tuic(ListenOptions),
    ShadowTls(ListenOptions),
    AnyTls(ListenOptions),
}

impl InboundOptions {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tun(_) => "tun",
            Self::Mixed(_) => "mixed",
            Self::Socks(_) => "socks",
            Self::Http(_) => "http",
            Self::Direct(_) => "direct",
            Self::Redirect(_) => "redirect",
            Self::Tproxy(_) => "tproxy",
            Self::Shadowsocks(_) => "shadowsocks",
            Self::Vmess(_) => "vmess",
            Self::Vless(_) => "vless",
            Self::Trojan(_) => "trojan",
            Self::Naive(_) => "naive",
            Self::Hysteria(_) => "hysteria",
            Self::Hysteria2(_) => "hysteria2",
            Self::Tuic(_) => "tuic",
            Self::ShadowTls(_) => "shadowtls",
            Self::AnyTls(_) => "anytls",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TunInboundOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub address: Vec<String>,
    // Pre-1.10 split address fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inet4_address: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inet6_address: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_route: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub strict_route: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_descriptor: Option<i32>,
    #[serde(flatten)]
    pub extra: Settings,
}

/// Listener shared by every non-tun inbound. Users, TLS and protocol
/// settings stay in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListenOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<u16>,
    #[serde(flatten)]
    pub extra: Settings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outbound {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(flatten)]
    pub options: OutboundOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundOptions {
    Direct(Settings),
    Block(Settings),
    Dns(Settings),
    Selector(GroupOptions),
    Urltest(GroupOptions),
    Socks(ServerOptions),
    Http(ServerOptions),
    Shadowsocks(ServerOptions),
    Vmess(ServerOptions),
    Vless(ServerOptions),
    Trojan(ServerOptions),
    Naive(ServerOptions),
    Hysteria(ServerOptions),
    Hysteria2(ServerOptions),
    Tuic(ServerOptions),
    ShadowTls(ServerOptions),
    AnyTls(ServerOptions),
    Ssh(ServerOptions),
    /// Peers may carry their own servers, so nothing is required here.
    Wireguard(Settings),
    Tor(Settings),
}

impl OutboundOptions {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Direct(_) => "direct",
            Self::Block(_) => "block",
            Self::Dns(_) => "dns",
            Self::Selector(_) => "selector",
            Self::Urltest(_) => "urltest",
            Self::Socks(_) => "socks",
            Self::Http(_) => "http",
            Self::Shadowsocks(_) => "shadowsocks",
            Self::Vmess(_) => "vmess",
            Self::Vless(_) => "vless",
            Self::Trojan(_) => "trojan",
            Self::Naive(_) => "naive",
            Self::Hysteria(_) => "hysteria",
            Self::Hysteria2(_) => "hysteria2",
            Self::Tuic(_) => "tuic",
            Self::ShadowTls(_) => "shadowtls",
            Self::AnyTls(_) => "anytls",
            Self::Ssh(_) => "ssh",
            Self::Wireguard(_) => "wireguard",
            Self::Tor(_) => "tor",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outbounds: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// `url`, `interval`, `tolerance` and friends.
    #[serde(flatten)]
    pub extra: Settings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerOptions {
    pub server: String,
    /// Absent when the outbound hops over `server_ports`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_port: Option<u16>,
    /// Credentials, TLS and transport settings.
    #[serde(flatten)]
    pub settings: Settings,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_force_console_log_creates_section() {
        let mut options = Options::default();
        options.force_console_log();
        assert_eq!(
            options.log.and_then(|l| l.output).as_deref(),
            Some(CONSOLE_LOG_OUTPUT)
        );
    }

    #[test]
    fn test_force_console_log_keeps_level() {
        let mut options = Options {
            log: Some(LogOptions {
                level: Some("debug".into()),
                output: Some("/sdcard/box.log".into()),
                ..LogOptions::default()
            }),
            ..Options::default()
        };
        options.force_console_log();
        let log = options.log.unwrap();
        assert_eq!(log.level.as_deref(), Some("debug"));
        assert_eq!(log.output.as_deref(), Some("console"));
    }

    #[test]
    fn test_tagged_inbound_decodes() {
        let inbound: Inbound = serde_json::from_value(json!({
            "type": "tun",
            "tag": "tun-in",
            "address": ["172.19.0.1/30"],
            "file_descriptor": 42,
            "auto_route": false
        }))
        .unwrap();
        assert_eq!(inbound.tag.as_deref(), Some("tun-in"));
        match inbound.options {
            InboundOptions::Tun(tun) => {
                assert_eq!(tun.file_descriptor, Some(42));
                assert_eq!(tun.address, vec!["172.19.0.1/30".to_string()]);
            }
            other => panic!("unexpected inbound {:?}", other.kind()),
        }
    }

    #[test]
    fn test_server_settings_pass_through() {
        let outbound: Outbound = serde_json::from_value(json!({
            "type": "shadowsocks",
            "tag": "proxy",
            "server": "198.51.100.7",
            "server_port": 8388,
            "method": "2022-blake3-aes-128-gcm",
            "password": "secret"
        }))
        .unwrap();
        let OutboundOptions::Shadowsocks(server) = &outbound.options else {
            panic!("expected shadowsocks outbound");
        };
        assert_eq!(server.server_port, Some(8388));
        assert_eq!(server.settings.get("method"), Some(&json!("2022-blake3-aes-128-gcm")));

        let back = serde_json::to_value(&outbound).unwrap();
        assert_eq!(back["password"], json!("secret"));
        assert_eq!(back["type"], json!("shadowsocks"));
    }

    #[test]
    fn test_unit_outbounds() {
        let outbounds: Vec<Outbound> = serde_json::from_value(json!([
            {"type": "direct", "tag": "direct"},
            {"type": "block", "tag": "block"}
        ]))
        .unwrap();
        assert_eq!(outbounds[0].options.kind(), "direct");
        assert_eq!(outbounds[1].options, OutboundOptions::Block(Settings::new()));
    }

    #[test]
    fn test_unmodelled_keys_survive_round_trip() {
        let document = json!({
            "log": {"level": "warn", "output": "console"},
            "ntp": {"enabled": true, "server": "time.apple.com"},
            "inbounds": [
                {
                    "type": "tun",
                    "tag": "tun-in",
                    "address": ["172.19.0.1/30"],
                    "auto_route": true,
                    "sniff": true,
                    "route_exclude_address": ["192.168.0.0/16"]
                },
                {
                    "type": "mixed",
                    "tag": "mixed-in",
                    "listen_port": 2080,
                    "users": [{"username": "u", "password": "p"}]
                }
            ],
            "outbounds": [
                {"type": "direct", "tag": "direct", "domain_strategy": "prefer_ipv4"},
                {
                    "type": "urltest",
                    "tag": "auto",
                    "outbounds": ["a", "b"],
                    "url": "https://www.gstatic.com/generate_204",
                    "interval": "3m"
                },
                {"type": "wireguard", "tag": "wg", "peers": [{"server": "198.51.100.1", "server_port": 51820}]}
            ],
            "dns": {
                "servers": [
                    {"type": "tls", "tag": "remote", "server": "1.1.1.1", "client_subnet": "1.0.0.0/24"},
                    {"type": "dhcp", "tag": "isp"},
                    {"type": "rcode", "tag": "block", "rcode": "refused"}
                ],
                "final": "remote"
            }
        });

        let options: Options = serde_json::from_value(document.clone()).unwrap();
        assert_eq!(serde_json::to_value(&options).unwrap(), document);

        let mixed = &options.inbounds[1];
        let InboundOptions::Mixed(listen) = &mixed.options else {
            panic!("expected mixed inbound");
        };
        assert_eq!(listen.extra["users"][0]["username"], json!("u"));
        assert_eq!(options.extra["ntp"]["server"], json!("time.apple.com"));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = serde_json::from_value::<Inbound>(json!({"type": "bogus"})).unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }
}
