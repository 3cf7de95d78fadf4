/*
 * xtext.rs
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

//! xtext encoding (RFC 3461 section 4): printable US-ASCII passes through,
//! everything else (and `+` and `=`) becomes `+HH` with uppercase hex.
//! Used for ids and plaintext payloads in the secrets file.

use crate::auth::AuthError;

fn is_xchar(b: u8) -> bool {
    (33..=126).contains(&b) && b != b'+' && b != b'='
}

/// Encode arbitrary bytes as xtext.
pub fn encode(data: &[u8]) -> String {
    const HEX: &[u8] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(data.len());
    for &b in data {
        if is_xchar(b) {
            out.push(b as char);
        } else {
            out.push('+');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 15) as usize] as char);
        }
    }
    out
}

/// Decode xtext back to bytes.
pub fn decode(encoded: &str) -> Result<Vec<u8>, AuthError> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'+' {
            let hi = bytes.get(i + 1).and_then(|c| (*c as char).to_digit(16));
            let lo = bytes.get(i + 2).and_then(|c| (*c as char).to_digit(16));
            match (hi, lo) {
                (Some(hi), Some(lo)) => out.push((hi * 16 + lo) as u8),
                _ => return Err(AuthError::ParseError("xtext escape".to_string())),
            }
            i += 3;
        } else if is_xchar(b) {
            out.push(b);
            i += 1;
        } else {
            return Err(AuthError::ParseError("xtext character".to_string()));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_ascii_passes_through() {
        assert_eq!(encode(b"alice"), "alice");
        assert_eq!(decode("alice").unwrap(), b"alice");
    }

    #[test]
    fn specials_are_escaped() {
        assert_eq!(encode(b"a+b=c d"), "a+2Bb+3Dc+20d");
        assert_eq!(decode("a+2Bb+3Dc+20d").unwrap(), b"a+b=c d");
    }

    #[test]
    fn roundtrip_binary() {
        let data: Vec<u8> = (0u8..=255).collect();
        assert_eq!(decode(&encode(&data)).unwrap(), data);
    }

    #[test]
    fn lowercase_hex_accepted() {
        assert_eq!(decode("+2b").unwrap(), b"+");
    }

    #[test]
    fn truncated_escape_rejected() {
        assert!(decode("abc+2").is_err());
        assert!(decode("abc+").is_err());
    }

    #[test]
    fn raw_space_rejected() {
        assert!(decode("a b").is_err());
    }
}
