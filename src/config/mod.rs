//! Configuration transform pipeline.
//!
//! raw text -> generic JSON tree -> optional tun fd splice -> re-serialized
//! text -> typed [`Options`]. The typed decode first runs against a
//! [`Registry`] and falls back to the plain tagged decoder.

pub mod options;
pub mod registry;
pub mod splice;

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{AppError, Result};

pub use options::Options;
pub use registry::Registry;
pub use splice::{inject_tun_fd, TUN_INBOUND_TYPE};

/// How the host tunnel descriptor reaches the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionStrategy {
    /// Write `file_descriptor` into every tun inbound of the raw document.
    RawSplice,
    /// Leave the document alone and hand the fd out through the platform
    /// interface when the engine asks for its tunnel.
    PlatformDelegate,
}

impl Default for InjectionStrategy {
    fn default() -> Self {
        if cfg!(feature = "raw-splice") {
            Self::RawSplice
        } else {
            Self::PlatformDelegate
        }
    }
}

impl fmt::Display for InjectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RawSplice => write!(f, "raw-splice"),
            Self::PlatformDelegate => write!(f, "platform-delegate"),
        }
    }
}

impl FromStr for InjectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "raw-splice" => Ok(Self::RawSplice),
            "platform-delegate" => Ok(Self::PlatformDelegate),
            other => Err(format!(
                "unknown strategy {:?} (expected raw-splice, platform-delegate)",
                other
            )),
        }
    }
}

/// A handle only counts when it is present and positive.
#[must_use]
pub fn usable_fd(tunnel_handle: Option<i32>) -> Option<i32> {
    tunnel_handle.filter(|fd| *fd > 0)
}

/// Parse, splice and re-serialize the document.
pub fn splice(raw_text: &str, tunnel_handle: Option<i32>) -> Result<String> {
    let mut document: Value = serde_json::from_str(raw_text).map_err(AppError::ConfigParse)?;

    if let Some(fd) = usable_fd(tunnel_handle) {
        let patched = inject_tun_fd(&mut document, fd);
        tracing::debug!(fd, patched, "tun_fd_spliced");
    }

    serde_json::to_string(&document).map_err(AppError::ConfigMarshal)
}

/// Full pipeline for the raw splice strategy.
pub fn transform(raw_text: &str, tunnel_handle: Option<i32>, registry: &Registry) -> Result<Options> {
    let spliced = splice(raw_text, tunnel_handle)?;
    parse_typed(&spliced, registry)
}

/// Decode text into the typed model: context-aware first, plain second.
/// When both fail the error carries both messages. The engine log output
/// is forced to the console on success.
pub fn parse_typed(text: &str, registry: &Registry) -> Result<Options> {
    let document: Value = serde_json::from_str(text).map_err(AppError::ConfigParse)?;

    let mut options = match decode_with_registry(document.clone(), registry) {
        Ok(options) => options,
        Err(context_err) => {
            tracing::debug!(error = %context_err, "context_decode_failed_trying_plain");
            decode_plain(document).map_err(|plain_err| {
                AppError::typed_parse_both(&context_err, &plain_err)
            })?
        }
    };
    options.force_console_log();
    Ok(options)
}

/// Registry-driven decode: every polymorphic entry must name a registered
/// type, and DNS servers without a `type` are resolved from their `address`.
pub fn decode_with_registry(
    mut document: Value,
    registry: &Registry,
) -> std::result::Result<Options, String> {
    let root = document
        .as_object_mut()
        .ok_or_else(|| "configuration root must be an object".to_string())?;

    if let Some(inbounds) = root.get("inbounds").and_then(Value::as_array) {
        for (idx, inbound) in inbounds.iter().enumerate() {
            let kind = entry_type(inbound).ok_or_else(|| format!("inbounds[{idx}]: missing type"))?;
            if !registry.has_inbound(kind) {
                return Err(format!("inbounds[{idx}]: unknown inbound type {:?}", kind));
            }
        }
    }

    if let Some(outbounds) = root.get("outbounds").and_then(Value::as_array) {
        for (idx, outbound) in outbounds.iter().enumerate() {
            let kind = entry_type(outbound).ok_or_else(|| format!("outbounds[{idx}]: missing type"))?;
            if !registry.has_outbound(kind) {
                return Err(format!("outbounds[{idx}]: unknown outbound type {:?}", kind));
            }
        }
    }

    if let Some(servers) = root
        .get_mut("dns")
        .and_then(|dns| dns.get_mut("servers"))
        .and_then(Value::as_array_mut)
    {
        for (idx, server) in servers.iter_mut().enumerate() {
            resolve_dns_server(server, registry).map_err(|e| format!("dns.servers[{idx}]: {e}"))?;
        }
    }

    serde_json::from_value(document).map_err(|e| e.to_string())
}

/// Tagged decode without a registry; legacy DNS addresses are rejected.
pub fn decode_plain(document: Value) -> std::result::Result<Options, String> {
    serde_json::from_value(document).map_err(|e| e.to_string())
}

fn entry_type(entry: &Value) -> Option<&str> {
    entry.get("type").and_then(Value::as_str)
}

fn resolve_dns_server(server: &mut Value, registry: &Registry) -> std::result::Result<(), String> {
    let entry = server
        .as_object_mut()
        .ok_or_else(|| "server must be an object".to_string())?;

    if let Some(kind) = entry.get("type").and_then(Value::as_str) {
        if !registry.has_dns_transport(kind) {
            return Err(format!("unknown DNS transport {:?}", kind));
        }
        return Ok(());
    }

    let address = entry
        .remove("address")
        .ok_or_else(|| "missing type and address".to_string())?;
    let address = address
        .as_str()
        .ok_or_else(|| "address must be a string".to_string())?;
    let fields = registry.infer_dns_transport(address)?;
    entry.extend(fields);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::options::{DnsTransport, InboundOptions};
    use super::*;
    use serde_json::json;

    fn registry() -> Registry {
        Registry::standard()
    }

    #[test]
    fn test_transform_example_document() {
        let raw = r#"{"inbounds":[{"type":"tun","tag":"t1"},{"type":"mixed","tag":"t2"}]}"#;
        let spliced: Value = serde_json::from_str(&splice(raw, Some(42)).unwrap()).unwrap();
        assert_eq!(
            spliced["inbounds"],
            json!([
                {"type":"tun","tag":"t1","file_descriptor":42,"auto_route":false,"interface_name":""},
                {"type":"mixed","tag":"t2"}
            ])
        );

        let options = transform(raw, Some(42), &registry()).unwrap();
        let tun = options.tun_inbounds().next().unwrap();
        assert_eq!(tun.file_descriptor, Some(42));
        assert!(!tun.auto_route);
        assert_eq!(tun.interface_name.as_deref(), Some(""));
        assert_eq!(options.inbounds[1].options.kind(), "mixed");
    }

    #[test]
    fn test_splice_without_handle_is_identity() {
        let raw = r#"{"inbounds":[{"type":"tun","auto_route":true},{"type":"socks"}],"route":{"final":"proxy"}}"#;
        let original: Value = serde_json::from_str(raw).unwrap();
        for handle in [None, Some(0), Some(-1)] {
            let out: Value = serde_json::from_str(&splice(raw, handle).unwrap()).unwrap();
            assert_eq!(out, original, "handle {:?}", handle);
        }
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        for raw in ["", "{", "{\"inbounds\": [}", "not json"] {
            let err = transform(raw, Some(4), &registry()).unwrap_err();
            assert!(matches!(err, AppError::ConfigParse(_)), "input {:?}", raw);
            let err = parse_typed(raw, &registry()).unwrap_err();
            assert!(matches!(err, AppError::ConfigParse(_)), "input {:?}", raw);
        }
    }

    #[test]
    fn test_parse_typed_forces_console_log() {
        let options = parse_typed(r#"{"log":{"level":"info","output":"box.log"}}"#, &registry()).unwrap();
        assert_eq!(options.log.unwrap().output.as_deref(), Some("console"));
    }

    #[test]
    fn test_context_decode_resolves_legacy_dns() {
        let raw = r#"{
            "dns": {
                "servers": [
                    {"tag": "remote", "address": "tls://1.1.1.1", "detour": "proxy"},
                    {"tag": "local", "address": "local"}
                ],
                "final": "remote"
            }
        }"#;
        let options = parse_typed(raw, &registry()).unwrap();
        let dns = options.dns.unwrap();
        assert_eq!(dns.extra.get("final"), Some(&json!("remote")));
        match &dns.servers[0].transport {
            DnsTransport::Tls(remote) => {
                assert_eq!(remote.server, "1.1.1.1");
                assert_eq!(remote.detour.as_deref(), Some("proxy"));
            }
            other => panic!("unexpected transport {}", other.kind()),
        }
        assert_eq!(dns.servers[1].transport.kind(), "local");
    }

    #[test]
    fn test_plain_decode_rejects_legacy_dns() {
        let doc = json!({"dns": {"servers": [{"address": "8.8.8.8"}]}});
        assert!(decode_plain(doc.clone()).is_err());
        assert!(decode_with_registry(doc, &registry()).is_ok());
    }

    #[test]
    fn test_fallback_to_plain_decode() {
        // The trimmed registry refuses "http", the tagged decoder still knows it.
        let reg = Registry::standard().without_inbound("http");
        let options = parse_typed(r#"{"inbounds":[{"type":"http","listen_port":8080}]}"#, &reg).unwrap();
        match &options.inbounds[0].options {
            InboundOptions::Http(listen) => assert_eq!(listen.listen_port, Some(8080)),
            other => panic!("unexpected inbound {}", other.kind()),
        }
    }

    #[test]
    fn test_double_failure_reports_both_messages() {
        let err = parse_typed(r#"{"inbounds":[{"type":"bogus"}]}"#, &registry()).unwrap_err();
        let AppError::ConfigTypedParse(msg) = &err else {
            panic!("unexpected error {err}");
        };
        assert!(msg.contains("context decode: inbounds[0]: unknown inbound type \"bogus\""));
        assert!(msg.contains("plain decode: "));
        assert!(msg.contains("bogus"));
    }

    #[test]
    fn test_non_object_root() {
        let err = parse_typed("[1,2]", &registry()).unwrap_err();
        assert!(matches!(err, AppError::ConfigTypedParse(_)));
        let spliced = splice("[1,2]", Some(3)).unwrap();
        assert_eq!(spliced, "[1,2]");
    }

    #[test]
    fn test_strategy_round_trip() {
        for strategy in [InjectionStrategy::RawSplice, InjectionStrategy::PlatformDelegate] {
            assert_eq!(strategy.to_string().parse::<InjectionStrategy>().unwrap(), strategy);
        }
        assert!("splice".parse::<InjectionStrategy>().is_err());
    }

    #[test]
    fn test_usable_fd() {
        assert_eq!(usable_fd(Some(7)), Some(7));
        assert_eq!(usable_fd(Some(0)), None);
        assert_eq!(usable_fd(Some(-3)), None);
        assert_eq!(usable_fd(None), None);
    }

    #[test]
    fn test_transform_keeps_host_settings() {
        let raw = json!({
            "ntp": {"enabled": true, "server": "time.apple.com"},
            "inbounds": [
                {"type": "tun", "tag": "t", "sniff": true, "route_exclude_address": ["10.0.0.0/8"]},
                {"type": "mixed", "tag": "m", "listen_port": 2080, "users": [{"username": "u", "password": "p"}]}
            ],
            "outbounds": [
                {"type": "direct", "tag": "direct", "domain_strategy": "ipv4_only"},
                {"type": "urltest", "tag": "auto", "outbounds": ["direct"], "url": "https://cp.cloudflare.com", "interval": "5m"}
            ]
        });

        let options = transform(&raw.to_string(), None, &registry()).unwrap();
        let mut decoded = serde_json::to_value(&options).unwrap();
        // The only change is the forced console log.
        assert_eq!(decoded["log"], json!({"output": "console"}));
        decoded.as_object_mut().unwrap().remove("log");
        assert_eq!(decoded, raw);

        let spliced = serde_json::to_value(transform(&raw.to_string(), Some(9), &registry()).unwrap()).unwrap();
        assert_eq!(spliced["inbounds"][0]["file_descriptor"], json!(9));
        assert_eq!(spliced["inbounds"][0]["sniff"], json!(true));
        assert_eq!(spliced["inbounds"][1]["users"], raw["inbounds"][1]["users"]);
    }

    #[test]
    fn test_legacy_dns_keeps_resolver_fields() {
        let raw = r#"{"dns":{"servers":[
            {"tag":"remote","address":"https://dns.google/dns-query","address_resolver":"local","strategy":"ipv4_only"},
            {"tag":"isp","address":"dhcp://auto"},
            {"tag":"block","address":"rcode://refused"},
            {"tag":"local","address":"local"}
        ]}}"#;
        let dns = parse_typed(raw, &registry()).unwrap().dns.unwrap();
        let DnsTransport::Https(remote) = &dns.servers[0].transport else {
            panic!("expected https transport");
        };
        assert_eq!(remote.path.as_deref(), Some("/dns-query"));
        assert_eq!(remote.extra.get("address_resolver"), Some(&json!("local")));
        assert_eq!(remote.extra.get("strategy"), Some(&json!("ipv4_only")));
        assert!(remote.extra.get("address").is_none());

        match &dns.servers[1].transport {
            DnsTransport::Dhcp(dhcp) => assert_eq!(dhcp.interface, None),
            other => panic!("unexpected transport {}", other.kind()),
        }
        match &dns.servers[2].transport {
            DnsTransport::Rcode(rcode) => assert_eq!(rcode.rcode, "refused"),
            other => panic!("unexpected transport {}", other.kind()),
        }
        assert_eq!(dns.servers[3].transport.kind(), "local");
    }

    #[test]
    fn test_common_protocols_accepted() {
        let raw = r#"{
            "inbounds": [
                {"type": "shadowsocks", "listen_port": 8388, "method": "aes-128-gcm", "password": "x"},
                {"type": "vless", "listen_port": 443, "users": [{"uuid": "bf000d23-0752-40b4-affe-68f7707a9661"}]},
                {"type": "hysteria2", "listen_port": 8443}
            ],
            "outbounds": [
                {"type": "wireguard", "tag": "wg", "server": "198.51.100.1", "server_port": 51820, "private_key": "k"},
                {"type": "hysteria2", "tag": "hy", "server": "example.org", "server_ports": ["20000:30000"]}
            ]
        }"#;
        let options = parse_typed(raw, &registry()).unwrap();
        let kinds: Vec<_> = options.inbounds.iter().map(|i| i.options.kind()).collect();
        assert_eq!(kinds, ["shadowsocks", "vless", "hysteria2"]);
        assert_eq!(options.outbounds[0].options.kind(), "wireguard");
        assert_eq!(options.outbounds[1].options.kind(), "hysteria2");
    }
}
