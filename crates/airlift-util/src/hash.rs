use std::io::Read;
use std::path::Path;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of a byte slice, returning a lowercase hex string.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Compute the SHA-1 hash of a byte slice, returning a lowercase hex string.
pub fn sha1_bytes(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Compute the MD5 hash of a byte slice, returning a lowercase hex string.
pub fn md5_bytes(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Compute the SHA-256 hash of a file without loading it into memory.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::with_capacity(64 * 1024, file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Compute the SHA-1 hash of a file without loading it into memory.
pub fn sha1_file(path: &Path) -> std::io::Result<String> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::with_capacity(64 * 1024, file);
    let mut hasher = Sha1::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Extract the hex digest from a checksum sidecar file.
///
/// Sidecars may contain just the hash, or `hash  filename`.
pub fn extract_sidecar_hash(content: &str) -> String {
    content.split_whitespace().next().unwrap_or("").to_string()
}

/// A checksum expectation attached to an artifact by its index.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Checksum {
    Sha256(String),
    Sha1(String),
    Md5(String),
    /// npm `dist.integrity` strings (`sha512-...`), verified opaquely.
    Integrity(String),
}

impl Checksum {
    /// Verify `data` against this expectation.
    ///
    /// Integrity strings other than sha512 base64 are accepted unverified
    /// with a warning, since the registry also supplies `shasum`.
    pub fn verify(&self, data: &[u8]) -> bool {
        match self {
            Checksum::Sha256(expected) => sha256_bytes(data).eq_ignore_ascii_case(expected),
            Checksum::Sha1(expected) => sha1_bytes(data).eq_ignore_ascii_case(expected),
            Checksum::Md5(expected) => md5_bytes(data).eq_ignore_ascii_case(expected),
            Checksum::Integrity(s) => {
                if let Some(b64) = s.strip_prefix("sha512-") {
                    use sha2::Sha512;
                    let mut hasher = Sha512::new();
                    hasher.update(data);
                    let digest = hasher.finalize();
                    base64_eq(b64, &digest)
                } else {
                    tracing::warn!("unrecognized integrity algorithm in {s}, skipping check");
                    true
                }
            }
        }
    }

    /// Verify a file on disk against this expectation, streaming the
    /// content rather than loading it.
    pub fn verify_file(&self, path: &Path) -> std::io::Result<bool> {
        Ok(match self {
            Checksum::Sha256(expected) => sha256_file(path)?.eq_ignore_ascii_case(expected),
            Checksum::Sha1(expected) => sha1_file(path)?.eq_ignore_ascii_case(expected),
            Checksum::Md5(_) | Checksum::Integrity(_) => {
                let data = std::fs::read(path)?;
                self.verify(&data)
            }
        })
    }

    /// The algorithm name for error messages.
    pub fn algorithm(&self) -> &'static str {
        match self {
            Checksum::Sha256(_) => "sha256",
            Checksum::Sha1(_) => "sha1",
            Checksum::Md5(_) => "md5",
            Checksum::Integrity(_) => "integrity",
        }
    }

    /// The expected digest as given by the index.
    pub fn expected(&self) -> &str {
        match self {
            Checksum::Sha256(s) | Checksum::Sha1(s) | Checksum::Md5(s) | Checksum::Integrity(s) => {
                s
            }
        }
    }
}

/// Compare a standard base64 string against raw digest bytes without
/// pulling in a base64 crate: encode the digest and compare.
fn base64_eq(encoded: &str, digest: &[u8]) -> bool {
    base64_encode(digest) == encoded
}

fn base64_encode(data: &[u8]) -> String {
    const TABLE: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity(data.len().div_ceil(3) * 4);
    for chunk in data.chunks(3) {
        let b = [chunk[0], *chunk.get(1).unwrap_or(&0), *chunk.get(2).unwrap_or(&0)];
        let n = (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]);
        out.push(TABLE[(n >> 18) as usize & 63] as char);
        out.push(TABLE[(n >> 12) as usize & 63] as char);
        out.push(if chunk.len() > 1 {
            TABLE[(n >> 6) as usize & 63] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            TABLE[n as usize & 63] as char
        } else {
            '='
        });
    }
    out
}
