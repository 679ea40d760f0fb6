//! CIDv1 strings for leaves
//!
//! A leaf hash is `"b" + base32lower(0x01 || 0x51 || 0x12 || 0x20 || sha256)`:
//! CID version 1, the CBOR codec, a sha2-256 multihash, multibase base32.

use ::cid::{Cid, Version};
use multihash::Multihash;

use crate::hash::sha256;
use crate::types::Hash;

/// Multicodec code for CBOR
pub const CBOR_CODEC: u64 = 0x51;

/// Multihash code for sha2-256
pub const SHA2_256: u64 = 0x12;

/// Error type for CID building and parsing
#[derive(Debug, thiserror::Error)]
pub enum CidError {
    #[error("Multihash error: {0}")]
    Multihash(String),
    #[error("Invalid CID {cid}: {reason}")]
    Parse { cid: String, reason: String },
    #[error("Unexpected CID version in {0}: only CIDv1 is used")]
    UnexpectedVersion(String),
    #[error("Unexpected codec {codec:#x} in {cid}: expected 0x51")]
    UnexpectedCodec { cid: String, codec: u64 },
    #[error("Unexpected multihash in {0}: expected 32-byte sha2-256")]
    UnexpectedDigest(String),
}

/// Build the CID string for a SHA256 digest of a canonical record
pub fn cid_from_digest(digest: &Hash) -> Result<String, CidError> {
    let mh = Multihash::<64>::wrap(SHA2_256, digest)
        .map_err(|e| CidError::Multihash(e.to_string()))?;
    Ok(Cid::new_v1(CBOR_CODEC, mh).to_string())
}

/// Hash an encoded record and build its CID string
pub fn cid_for_bytes(data: &[u8]) -> Result<String, CidError> {
    cid_from_digest(&sha256(data))
}

/// Parse a leaf CID string and return its SHA256 digest
///
/// Rejects anything that isn't CIDv1 / CBOR / sha2-256.
pub fn parse_cid(s: &str) -> Result<Hash, CidError> {
    let cid = Cid::try_from(s).map_err(|e| CidError::Parse {
        cid: s.to_string(),
        reason: e.to_string(),
    })?;

    if cid.version() != Version::V1 {
        return Err(CidError::UnexpectedVersion(s.to_string()));
    }
    if cid.codec() != CBOR_CODEC {
        return Err(CidError::UnexpectedCodec {
            cid: s.to_string(),
            codec: cid.codec(),
        });
    }

    let mh = cid.hash();
    if mh.code() != SHA2_256 || mh.digest().len() != 32 {
        return Err(CidError::UnexpectedDigest(s.to_string()));
    }

    let mut digest = [0u8; 32];
    digest.copy_from_slice(mh.digest());
    Ok(digest)
}

/// Raw CID bytes (version, codec, multihash) of a leaf CID string
pub fn cid_bytes(s: &str) -> Result<Vec<u8>, CidError> {
    let cid = Cid::try_from(s).map_err(|e| CidError::Parse {
        cid: s.to_string(),
        reason: e.to_string(),
    })?;
    Ok(cid.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cid_layout() {
        let digest = sha256(b"record");
        let s = cid_from_digest(&digest).unwrap();

        assert!(s.starts_with('b'));
        assert_eq!(s, s.to_lowercase());
        assert!(!s.contains('='));

        let bytes = cid_bytes(&s).unwrap();
        assert_eq!(&bytes[..4], &[0x01, 0x51, 0x12, 0x20]);
        assert_eq!(&bytes[4..], &digest);
    }

    #[test]
    fn test_cid_golden() {
        // CID of the canonical record of a non-root file leaf "a.txt" with content "x"
        let record = hex::decode(concat!(
            "a6684974656d4e616d6565612e74787464547970656466696c656a4d65726b6c65526f6f74",
            "407043757272656e744c696e6b436f756e74006b436f6e74656e744861736858202d711642",
            "b726b04401627ca9fbac32f5c8530fb1903cc4db02258717921a48816e4164646974696f6e",
            "616c4461746180"
        ))
        .unwrap();
        assert_eq!(
            cid_for_bytes(&record).unwrap(),
            "bafireid2yg6lqicee25zlv5iicyypunv2glqobdmar77lcqbqoayy6jy44"
        );
    }

    #[test]
    fn test_parse_roundtrip() {
        let digest = sha256(b"abc");
        let s = cid_from_digest(&digest).unwrap();
        assert_eq!(parse_cid(&s).unwrap(), digest);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse_cid("not-a-cid"), Err(CidError::Parse { .. })));
    }

    #[test]
    fn test_parse_rejects_other_codec() {
        let mh = Multihash::<64>::wrap(SHA2_256, &sha256(b"abc")).unwrap();
        // dag-pb
        let other = Cid::new_v1(0x70, mh).to_string();
        assert!(matches!(
            parse_cid(&other),
            Err(CidError::UnexpectedCodec { codec: 0x70, .. })
        ));
    }
}
