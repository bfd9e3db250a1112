//! ADK proof generation.
//!
//! The proof is a TOTP (RFC 6238) code over HMAC-SHA1 with a 60 s step and
//! 9 decimal digits, computed from a short base32 secret shared with the
//! clients. The decimal code itself is the 32-bit proof the gate compares.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use data_encoding::BASE32_NOPAD;
use rand::RngCore;
use ring::hmac;

/// Random bytes in a generated secret, one ADK proof wide (7 base32 chars)
pub const ADK_SECRET_LEN: usize = 4;
pub const ADK_SECRET_ENCODED_LEN: usize = 7;
pub const ADK_PROOF_PERIOD_SECS: u64 = 60;
pub const ADK_PROOF_DIGITS: u32 = 9;

/// Source of the proofs installed into the gate's allow-list.
///
/// `0` means "no proof available"; it is never installed.
pub trait ProofGenerator: Send + Sync {
    fn proof_now(&self) -> u32;
    fn proof_next(&self) -> u32;
}

pub fn generate_secret() -> String {
    let mut secret = [0u8; ADK_SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut secret);
    BASE32_NOPAD.encode(&secret)
}

/// Decode a base32 secret. Case and trailing padding are ignored.
pub fn decode_secret(secret: &str) -> Result<Vec<u8>> {
    let normalized = secret.trim().trim_end_matches('=').to_ascii_uppercase();
    let key = BASE32_NOPAD
        .decode(normalized.as_bytes())
        .context("ADK secret is not valid base32")?;

    if key.is_empty() {
        bail!("ADK secret is empty");
    }
    Ok(key)
}

/// HOTP (RFC 4226) dynamic truncation, reduced to `digits` decimal digits.
pub fn hotp(key: &hmac::Key, counter: u64, digits: u32) -> u32 {
    let tag = hmac::sign(key, &counter.to_be_bytes());
    let mac = tag.as_ref();

    // SHA-1 tags are 20 bytes, offset + 3 stays in range
    let offset = (mac[mac.len() - 1] & 0x0f) as usize;
    let code = u32::from_be_bytes([
        mac[offset] & 0x7f,
        mac[offset + 1],
        mac[offset + 2],
        mac[offset + 3],
    ]);

    code % 10u32.pow(digits)
}

#[derive(Clone)]
pub struct TotpProofGenerator {
    key: hmac::Key,
}

impl TotpProofGenerator {
    pub fn new(secret: &str) -> Result<Self> {
        let raw = decode_secret(secret)?;
        Ok(Self {
            key: hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, &raw),
        })
    }

    /// Proof valid during the step containing `unix_secs`.
    pub fn proof_at(&self, unix_secs: u64) -> u32 {
        hotp(&self.key, unix_secs / ADK_PROOF_PERIOD_SECS, ADK_PROOF_DIGITS)
    }

    fn now() -> Option<u64> {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => Some(d.as_secs()),
            Err(e) => {
                log::error!("System clock before UNIX epoch: {}", e);
                None
            }
        }
    }
}

impl ProofGenerator for TotpProofGenerator {
    fn proof_now(&self) -> u32 {
        Self::now().map_or(0, |t| self.proof_at(t))
    }

    fn proof_next(&self) -> u32 {
        Self::now().map_or(0, |t| self.proof_at(t + ADK_PROOF_PERIOD_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// "12345678901234567890", the RFC 4226 / RFC 6238 test key
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    fn rfc_key() -> hmac::Key {
        hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, b"12345678901234567890")
    }

    #[test]
    fn test_hotp_rfc4226_vectors() {
        let expected = [
            755224, 287082, 359152, 969429, 338314, 254676, 287922, 162583, 399871, 520489,
        ];
        let key = rfc_key();
        for (counter, want) in expected.iter().enumerate() {
            assert_eq!(hotp(&key, counter as u64, 6), *want, "counter {}", counter);
        }
    }

    #[test]
    fn test_hotp_nine_digits() {
        let key = rfc_key();
        assert_eq!(hotp(&key, 0, 9), 284755224);
        assert_eq!(hotp(&key, 1, 9), 94287082);
        assert_eq!(hotp(&key, 7, 9), 82162583);
    }

    #[test]
    fn test_proof_steps_every_minute() {
        let gen = TotpProofGenerator::new(RFC_SECRET).unwrap();
        assert_eq!(gen.proof_at(0), 284755224);
        assert_eq!(gen.proof_at(59), 284755224);
        assert_eq!(gen.proof_at(60), 94287082);
        assert_eq!(gen.proof_at(119), 94287082);
    }

    #[test]
    fn test_live_proofs_are_well_formed() {
        let gen = TotpProofGenerator::new(RFC_SECRET).unwrap();
        assert!(gen.proof_now() < 1_000_000_000);
        assert!(gen.proof_next() < 1_000_000_000);
    }

    #[test]
    fn test_secret_roundtrip() {
        let secret = generate_secret();
        assert_eq!(secret.len(), ADK_SECRET_ENCODED_LEN);
        assert_eq!(secret.len(), 7);
        assert_eq!(decode_secret(&secret).unwrap().len(), ADK_SECRET_LEN);
    }

    #[test]
    fn test_decode_seven_char_secret() {
        // Four-byte secret as issued by existing OpenSPA servers
        let key = decode_secret("MFRGGZA").unwrap();
        assert_eq!(key, b"abcd");
        assert_eq!(key.len(), ADK_SECRET_LEN);
        assert_eq!(decode_secret("mfrggza").unwrap(), key);
        assert_eq!(decode_secret("MFRGGZA=").unwrap(), key);
        assert!(TotpProofGenerator::new("MFRGGZA").is_ok());
    }

    #[test]
    fn test_decode_secret_normalizes() {
        let upper = decode_secret("MFRGGZDF").unwrap();
        assert_eq!(upper, b"abcde");
        assert_eq!(decode_secret("mfrggzdf").unwrap(), upper);
        assert_eq!(decode_secret(" MFRGGZDF \n").unwrap(), upper);
    }

    #[test]
    fn test_decode_secret_rejects_garbage() {
        assert!(decode_secret("").is_err());
        assert!(decode_secret("not base32!").is_err());
        assert!(TotpProofGenerator::new("1111").is_err());
    }
}
