use crate::normalize::NormalizedManifest;
use crate::types::{ContentHash, ShortHash};
use serde::Serialize;

const DOMAIN: &[u8] = b"envpin-manifest-v1";

/// Identity of a manifest: its full content hash plus the display prefix.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ManifestIdentity {
    pub hash: ContentHash,
    pub short: ShortHash,
}

/// Compute the content hash of a normalized manifest.
///
/// Every field is fed as a tagged, length-prefixed record so that no two
/// distinct manifests share an encoding. Unordered fields are already sorted
/// by normalization, so the result is independent of declaration order.
pub fn compute_manifest_hash(normalized: &NormalizedManifest) -> ManifestIdentity {
    let mut hasher = blake3::Hasher::new();
    hasher.update(DOMAIN);
    record(&mut hasher, "version", &normalized.manifest_version.to_string());

    for tc in &normalized.toolchains {
        record(&mut hasher, "toolchain", &tc.name);
        record(&mut hasher, "role", &tc.role);
        record(&mut hasher, "channel", &tc.channel.to_string());
        for ext in &tc.extensions {
            record(&mut hasher, "ext", ext);
        }
        for target in &tc.targets {
            record(&mut hasher, "target", target);
        }
        if tc.cross {
            record(&mut hasher, "cross", "1");
        }
        record(&mut hasher, "end", &tc.name);
    }

    for pkg in &normalized.packages {
        record(&mut hasher, "pkg", pkg);
    }

    for (name, value) in &normalized.variables {
        record(&mut hasher, "var", name);
        record(&mut hasher, "val", value);
    }

    let hex = hasher.finalize().to_hex().to_string();
    let hash = ContentHash::new(hex);
    ManifestIdentity {
        short: hash.short(),
        hash,
    }
}

fn record(hasher: &mut blake3::Hasher, tag: &str, value: &str) {
    hasher.update(tag.as_bytes());
    hasher.update(&[0]);
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}
