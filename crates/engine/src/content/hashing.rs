use std::path::Path;

use sha2::{Digest, Sha256};

/// Running fingerprint over the compiled content set. Mod order and file paths are part of
/// the hash, so reordering mods changes it even when no file changed.
pub(crate) struct ContentHasher {
    hasher: Sha256,
    xml_file_count: usize,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
            xml_file_count: 0,
        }
    }

    pub fn begin_mod(&mut self, mod_id: &str) {
        self.hasher.update(b"mod\0");
        self.hasher.update(mod_id.as_bytes());
        self.hasher.update([0u8]);
    }

    pub fn add_file(&mut self, normalized_rel: &str, bytes: &[u8]) {
        self.hasher.update(normalized_rel.as_bytes());
        self.hasher.update([0u8]);
        self.hasher.update(bytes);
        self.xml_file_count += 1;
    }

    pub fn xml_file_count(&self) -> usize {
        self.xml_file_count
    }

    pub fn finish(self) -> String {
        to_hex_lower(&self.hasher.finalize())
    }
}

pub(crate) fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn to_hex_lower(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}
