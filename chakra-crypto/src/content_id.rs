//! Content addressing for policy program sources.
//!
//! The threshold network identifies an executing program by the IPFS CIDv0
//! of its source text, computed without adding it to any node ("only hash").
//! For inputs that fit one UnixFS chunk that is:
//!
//! ```text
//! unixfs = Data { Type: File, Data: bytes, filesize: len }
//! node   = PBNode { Data: unixfs }
//! cid    = base58btc(0x12 0x20 || sha256(node))
//! ```

use crate::error::{CryptoError, CryptoResult};
use sha2::{Digest, Sha256};

/// Largest input accepted by [`IpfsCidV0`] (default UnixFS chunk size).
pub const MAX_SINGLE_CHUNK: usize = 262_144;

/// Computes a stable identifier for a byte string.
pub trait ContentHasher: Send + Sync {
    fn content_id(&self, bytes: &[u8]) -> CryptoResult<String>;
}

/// IPFS CIDv0 of a single-chunk UnixFS file.
#[derive(Clone, Copy, Debug, Default)]
pub struct IpfsCidV0;

/// Lowercase hex SHA-256.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256Hex;

impl ContentHasher for IpfsCidV0 {
    fn content_id(&self, bytes: &[u8]) -> CryptoResult<String> {
        if bytes.len() > MAX_SINGLE_CHUNK {
            return Err(CryptoError::ContentId(format!(
                "{} bytes exceeds the single chunk limit of {MAX_SINGLE_CHUNK}",
                bytes.len()
            )));
        }

        // UnixFS Data message: Type=File(2), Data, filesize.
        let mut unixfs = Vec::with_capacity(bytes.len() + 16);
        unixfs.extend_from_slice(&[0x08, 0x02]);
        if !bytes.is_empty() {
            unixfs.push(0x12);
            put_varint(&mut unixfs, bytes.len() as u64);
            unixfs.extend_from_slice(bytes);
        }
        unixfs.push(0x18);
        put_varint(&mut unixfs, bytes.len() as u64);

        // dag-pb PBNode with only the Data field.
        let mut node = Vec::with_capacity(unixfs.len() + 8);
        node.push(0x0a);
        put_varint(&mut node, unixfs.len() as u64);
        node.extend_from_slice(&unixfs);

        let mut multihash = Vec::with_capacity(34);
        multihash.extend_from_slice(&[0x12, 0x20]);
        multihash.extend_from_slice(&Sha256::digest(&node));

        Ok(bs58::encode(multihash).into_string())
    }
}

impl ContentHasher for Sha256Hex {
    fn content_id(&self, bytes: &[u8]) -> CryptoResult<String> {
        Ok(hex::encode(Sha256::digest(bytes)))
    }
}

fn put_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}
