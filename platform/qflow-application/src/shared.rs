use qflow_domain::value_objects::node::Node;
use sha2::{Digest, Sha256};

/// SHA-256 over the canonical JSON projection of a resolved tree.
/// Object keys serialize sorted, so equal trees hash equally regardless of
/// declaration order.
pub fn fingerprint(tree: &Node) -> String {
    let canonical = serde_json::to_string(&tree.to_json())
        .unwrap_or_else(|_| "{\"error\":\"tree\"}".to_string());
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let bytes = hasher.finalize();
    to_hex(&bytes[..])
}

/// `<stem>-<first 12 hex chars of the fingerprint>`.
pub fn run_id(stem: &str, fingerprint: &str) -> String {
    let short: String = fingerprint.chars().take(12).collect();
    let stem = sanitize_stem(stem);
    if stem.is_empty() {
        return short;
    }
    format!("{stem}-{short}")
}

fn sanitize_stem(stem: &str) -> String {
    stem.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn to_hex(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}
