use serde_json::Value;

pub const INBOUNDS_KEY: &str = "inbounds";
pub const TUN_INBOUND_TYPE: &str = "tun";

/// Point every `tun` inbound at the host-owned descriptor.
///
/// The host has already set up routing and the interface, so `auto_route`
/// is forced off and `interface_name` cleared. Non-object entries and a
/// missing or malformed `inbounds` list are skipped. Returns the number of
/// entries patched.
pub fn inject_tun_fd(document: &mut Value, fd: i32) -> usize {
    let Some(inbounds) = document
        .get_mut(INBOUNDS_KEY)
        .and_then(Value::as_array_mut)
    else {
        return 0;
    };

    let mut patched = 0;
    for inbound in inbounds.iter_mut() {
        let Some(entry) = inbound.as_object_mut() else {
            continue;
        };
        if entry.get("type").and_then(Value::as_str) != Some(TUN_INBOUND_TYPE) {
            continue;
        }
        entry.insert("file_descriptor".into(), Value::from(fd));
        entry.insert("auto_route".into(), Value::Bool(false));
        entry.insert("interface_name".into(), Value::String(String::new()));
        patched += 1;
    }
    patched
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inject_single_tun() {
        let mut doc = json!({
            "inbounds": [
                {"type": "tun", "tag": "t1"},
                {"type": "mixed", "tag": "t2"}
            ]
        });
        assert_eq!(inject_tun_fd(&mut doc, 42), 1);
        assert_eq!(
            doc["inbounds"][0],
            json!({
                "type": "tun",
                "tag": "t1",
                "file_descriptor": 42,
                "auto_route": false,
                "interface_name": ""
            })
        );
        assert_eq!(doc["inbounds"][1], json!({"type": "mixed", "tag": "t2"}));
    }

    #[test]
    fn test_inject_overrides_existing_fields() {
        let mut doc = json!({
            "inbounds": [{
                "type": "tun",
                "interface_name": "tun0",
                "auto_route": true,
                "file_descriptor": 3
            }]
        });
        inject_tun_fd(&mut doc, 77);
        let tun = &doc["inbounds"][0];
        assert_eq!(tun["file_descriptor"], json!(77));
        assert_eq!(tun["auto_route"], json!(false));
        assert_eq!(tun["interface_name"], json!(""));
    }

    #[test]
    fn test_inject_every_tun_preserving_order() {
        let mut doc = json!({
            "inbounds": [
                {"type": "tun", "tag": "a"},
                {"type": "socks", "tag": "b"},
                {"type": "tun", "tag": "c"}
            ]
        });
        assert_eq!(inject_tun_fd(&mut doc, 9), 2);
        let inbounds = doc["inbounds"].as_array().unwrap();
        assert_eq!(inbounds.len(), 3);
        let tags: Vec<_> = inbounds.iter().map(|i| i["tag"].as_str().unwrap()).collect();
        assert_eq!(tags, ["a", "b", "c"]);
        assert_eq!(inbounds[0]["file_descriptor"], json!(9));
        assert_eq!(inbounds[2]["file_descriptor"], json!(9));
        assert!(inbounds[1].get("file_descriptor").is_none());
    }

    #[test]
    fn test_inject_skips_malformed() {
        let mut doc = json!({"inbounds": [1, "tun", null, {"type": 5}, {"tag": "x"}]});
        let before = doc.clone();
        assert_eq!(inject_tun_fd(&mut doc, 5), 0);
        assert_eq!(doc, before);

        let mut doc = json!({"inbounds": {"type": "tun"}});
        assert_eq!(inject_tun_fd(&mut doc, 5), 0);

        let mut doc = json!([{"type": "tun"}]);
        assert_eq!(inject_tun_fd(&mut doc, 5), 0);

        let mut doc = json!({"outbounds": []});
        assert_eq!(inject_tun_fd(&mut doc, 5), 0);
        assert_eq!(doc, json!({"outbounds": []}));
    }
}
