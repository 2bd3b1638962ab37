// Editing-session document keys.
//
// Every editing session is identified by an opaque key; co-editors join a
// session by opening the same key. Keys mix the file id, the file's creation
// time and the current wall clock, so a file re-opened after its lock is
// gone always gets a fresh session identity.

use sha2::{Digest, Sha256};

/// Width of a rendered document key in hex characters.
const KEY_LENGTH: usize = 32;

/// Derive a fresh session key for a file.
pub fn document_key(file_id: &str, file_created: i64, now_ms: i64) -> String {
    let digest = sha256_hex(format!("{file_id}{file_created}{now_ms}").as_bytes());
    digest[..KEY_LENGTH].to_string()
}

/// Lowercase hex SHA-256 of the given bytes.
pub fn sha256_hex(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}
