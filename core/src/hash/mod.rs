/*
 * mod.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Staffetta, a store-and-forward mail relay.
 *
 * Staffetta is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Staffetta is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Staffetta.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Digest registry and HMAC (RFC 2104).
//!
//! Plain hashing and plain-key HMAC go through the RustCrypto crates
//! (md-5, sha1, sha2, hmac). Masked-key HMAC needs a digest that can be
//! restarted from intermediate state, which only the built-in MD5 supports;
//! asking for a masked operation with any other digest fails with
//! [`AuthError::NoState`].

pub mod md5;

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;

use crate::auth::AuthError;

/// A digest algorithm usable for CRAM mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashType {
    Sha256,
    Sha1,
    Md5,
}

impl HashType {
    /// All known digests, strongest first.
    pub fn all() -> &'static [HashType] {
        &[HashType::Sha256, HashType::Sha1, HashType::Md5]
    }

    /// Parse a digest name, case-insensitively. Dashed spellings such as
    /// `SHA-1` are accepted alongside `SHA1`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().replace('-', "").as_str() {
            "MD5" => Some(HashType::Md5),
            "SHA1" => Some(HashType::Sha1),
            "SHA256" => Some(HashType::Sha256),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HashType::Md5 => "MD5",
            HashType::Sha1 => "SHA1",
            HashType::Sha256 => "SHA256",
        }
    }

    pub fn block_size(&self) -> usize {
        64
    }

    pub fn value_size(&self) -> usize {
        match self {
            HashType::Md5 => 16,
            HashType::Sha1 => 20,
            HashType::Sha256 => 32,
        }
    }

    /// True if the digest can be initialised with intermediate state,
    /// i.e. if masked secrets of this type are usable.
    pub fn supports_state(&self) -> bool {
        matches!(self, HashType::Md5)
    }
}

impl std::fmt::Display for HashType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Hash the concatenation of the given parts.
pub fn digest(hash_type: HashType, parts: &[&[u8]]) -> Vec<u8> {
    use sha1::Digest;
    match hash_type {
        HashType::Md5 => {
            let mut h = ::md5::Md5::new();
            for p in parts {
                h.update(p);
            }
            h.finalize().to_vec()
        }
        HashType::Sha1 => {
            let mut h = Sha1::new();
            for p in parts {
                h.update(p);
            }
            h.finalize().to_vec()
        }
        HashType::Sha256 => {
            let mut h = Sha256::new();
            for p in parts {
                h.update(p);
            }
            h.finalize().to_vec()
        }
    }
}

type HmacMd5 = Hmac<::md5::Md5>;
type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// RFC 2104 HMAC with a plaintext key.
pub fn hmac(hash_type: HashType, key: &[u8], message: &[u8]) -> Vec<u8> {
    match hash_type {
        HashType::Md5 => {
            let mut mac = HmacMd5::new_from_slice(key).expect("any key length");
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
        HashType::Sha1 => {
            let mut mac = HmacSha1::new_from_slice(key).expect("any key length");
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
        HashType::Sha256 => {
            let mut mac = HmacSha256::new_from_slice(key).expect("any key length");
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
    }
}

/// RFC 2104 HMAC with a masked key (a stored pair of intermediate states).
pub fn hmac_masked(
    hash_type: HashType,
    masked_key: &[u8],
    message: &[u8],
) -> Result<Vec<u8>, AuthError> {
    if !hash_type.supports_state() {
        return Err(AuthError::NoState(hash_type.name().to_string()));
    }
    Ok(md5::postdigest(masked_key, message)?.to_vec())
}

/// Compute a masked key for storage in the secrets file. Only digests with
/// state support can be masked.
pub fn mask(hash_type: HashType, shared_key: &[u8]) -> Result<Vec<u8>, AuthError> {
    if !hash_type.supports_state() {
        return Err(AuthError::NoState(hash_type.name().to_string()));
    }
    Ok(md5::mask(shared_key).to_vec())
}

/// Lowercase hexadecimal with no separators.
pub fn printable(bytes: &[u8]) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        s.push(HEX[(b >> 4) as usize] as char);
        s.push(HEX[(b & 15) as usize] as char);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 2202 section 2 test vectors for HMAC-MD5.
    #[test]
    fn rfc2202_hmac_md5() {
        let cases: &[(&[u8], &[u8], &str)] = &[
            (
                &[0x0b; 16],
                b"Hi There",
                "9294727a3638bb1c13f48ef8158bfc9d",
            ),
            (
                b"Jefe",
                b"what do ya want for nothing?",
                "750c783e6ab0b503eaa86e310a5db738",
            ),
            (&[0xaa; 16], &[0xdd; 50], "56be34521d144c88dbb8c733f0e8b3f6"),
            (
                &[
                    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d,
                    0x0e, 0x0f, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19,
                ],
                &[0xcd; 50],
                "697eaf0aca3a3aea3a75164746ffaa79",
            ),
            (&[0x0c; 16], b"Test With Truncation", "56461ef2342edc00f9bab995690efd4c"),
            (
                &[0xaa; 80],
                b"Test Using Larger Than Block-Size Key - Hash Key First",
                "6b1ab7fe4bd7bf8f0b62e6ce61b9d0cd",
            ),
            (
                &[0xaa; 80],
                b"Test Using Larger Than Block-Size Key and Larger Than One Block-Size Data",
                "6f630fad67cda0ee1fb1f562db3aa53e",
            ),
        ];
        for (key, message, expected) in cases {
            assert_eq!(&printable(&hmac(HashType::Md5, key, message)), expected);
        }
    }

    #[test]
    fn masking_equivalence() {
        // mask() + hmac_masked() must agree with the crate HMAC for any
        // key up to one block.
        let keys: &[&[u8]] = &[b"", b"pencil", b"Jefe", &[0xaa; 64]];
        let messages: &[&[u8]] = &[b"", b"<1896.697170952@postoffice.reston.mci.net>"];
        for key in keys {
            let masked = mask(HashType::Md5, key).unwrap();
            assert_eq!(masked.len(), 2 * HashType::Md5.value_size());
            for message in messages {
                assert_eq!(
                    hmac_masked(HashType::Md5, &masked, message).unwrap(),
                    hmac(HashType::Md5, key, message)
                );
            }
        }
    }

    #[test]
    fn masked_sha_is_rejected() {
        assert!(matches!(
            mask(HashType::Sha1, b"pencil"),
            Err(AuthError::NoState(_))
        ));
        assert!(matches!(
            hmac_masked(HashType::Sha256, &[0u8; 64], b"x"),
            Err(AuthError::NoState(_))
        ));
    }

    #[test]
    fn digest_concatenates_parts() {
        let split = digest(HashType::Md5, &[b"message ", b"digest"]);
        let whole = digest(HashType::Md5, &[b"message digest"]);
        assert_eq!(split, whole);
        assert_eq!(printable(&whole), "f96b697d7cb7938d525a2f31aaf161d0");
    }

    #[test]
    fn hash_name_parsing() {
        assert_eq!(HashType::from_name("md5"), Some(HashType::Md5));
        assert_eq!(HashType::from_name("SHA-1"), Some(HashType::Sha1));
        assert_eq!(HashType::from_name(" sha256 "), Some(HashType::Sha256));
        assert_eq!(HashType::from_name("whirlpool"), None);
    }

    #[test]
    fn printable_is_lowercase_hex() {
        assert_eq!(printable(&[0x00, 0xab, 0xff]), "00abff");
    }
}
