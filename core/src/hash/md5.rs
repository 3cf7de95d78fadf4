/*
 * md5.rs
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

//! Built-in MD5 (RFC 1321) with intermediate-state extraction.
//!
//! The RustCrypto digests cover ordinary hashing; this implementation exists
//! for masked credentials, which need a digest that can be stopped after one
//! block and restarted later from the captured state. The state encoding is
//! the four internal words followed by the running byte count, all
//! little-endian, so `Md5::with_state(h.state()?)` then `add(rest)` equals
//! hashing the whole input in one go whenever the split falls on a block
//! boundary.

use crate::auth::AuthError;

/// Block size in bytes.
pub const BLOCK_SIZE: usize = 64;
/// Digest value size in bytes.
pub const VALUE_SIZE: usize = 16;
/// Encoded state size in bytes: four words plus the byte count.
pub const STATE_SIZE: usize = 20;

const INIT: [u32; 4] = [0x6745_2301, 0xefcd_ab89, 0x98ba_dcfe, 0x1032_5476];

const K: [u32; 64] = [
    0xd76a_a478, 0xe8c7_b756, 0x2420_70db, 0xc1bd_ceee, 0xf57c_0faf, 0x4787_c62a, 0xa830_4613,
    0xfd46_9501, 0x6980_98d8, 0x8b44_f7af, 0xffff_5bb1, 0x895c_d7be, 0x6b90_1122, 0xfd98_7193,
    0xa679_438e, 0x49b4_0821, 0xf61e_2562, 0xc040_b340, 0x265e_5a51, 0xe9b6_c7aa, 0xd62f_105d,
    0x0244_1453, 0xd8a1_e681, 0xe7d3_fbc8, 0x21e1_cde6, 0xc337_07d6, 0xf4d5_0d87, 0x455a_14ed,
    0xa9e3_e905, 0xfcef_a3f8, 0x676f_02d9, 0x8d2a_4c8a, 0xfffa_3942, 0x8771_f681, 0x6d9d_6122,
    0xfde5_380c, 0xa4be_ea44, 0x4bde_cfa9, 0xf6bb_4b60, 0xbebf_bc70, 0x289b_7ec6, 0xeaa1_27fa,
    0xd4ef_3085, 0x0488_1d05, 0xd9d4_d039, 0xe6db_99e5, 0x1fa2_7cf8, 0xc4ac_5665, 0xf429_2244,
    0x432a_ff97, 0xab94_23a7, 0xfc93_a039, 0x655b_59c3, 0x8f0c_cc92, 0xffef_f47d, 0x8584_5dd1,
    0x6fa8_7e4f, 0xfe2c_e6e0, 0xa301_4314, 0x4e08_11a1, 0xf753_7e82, 0xbd3a_f235, 0x2ad7_d2bb,
    0xeb86_d391,
];

const S: [u32; 64] = [
    7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22, 5, 9, 14, 20, 5, 9, 14, 20, 5, 9,
    14, 20, 5, 9, 14, 20, 4, 11, 16, 23, 4, 11, 16, 23, 4, 11, 16, 23, 4, 11, 16, 23, 6, 10, 15,
    21, 6, 10, 15, 21, 6, 10, 15, 21, 6, 10, 15, 21,
];

/// An MD5 digest stream.
pub struct Md5 {
    h: [u32; 4],
    count: u64,
    pending: Vec<u8>,
}

impl Default for Md5 {
    fn default() -> Self {
        Self::new()
    }
}

impl Md5 {
    pub fn new() -> Self {
        Self {
            h: INIT,
            count: 0,
            pending: Vec::with_capacity(BLOCK_SIZE),
        }
    }

    /// Restart from a captured intermediate state (see [`Md5::state`]).
    pub fn with_state(state: &[u8]) -> Result<Self, AuthError> {
        if state.len() != STATE_SIZE {
            return Err(AuthError::InvalidState);
        }
        let mut h = [0u32; 4];
        for (i, w) in h.iter_mut().enumerate() {
            *w = u32::from_le_bytes([
                state[i * 4],
                state[i * 4 + 1],
                state[i * 4 + 2],
                state[i * 4 + 3],
            ]);
        }
        let count = u32::from_le_bytes([state[16], state[17], state[18], state[19]]) as u64;
        if count % BLOCK_SIZE as u64 != 0 {
            return Err(AuthError::InvalidState);
        }
        Ok(Self {
            h,
            count,
            pending: Vec::with_capacity(BLOCK_SIZE),
        })
    }

    /// Restart from a bare word state (no count), assuming exactly one
    /// processed block. This is the masked-credential case: a mask stores
    /// only the words, with the one-block count implied.
    pub fn with_word_state(words: &[u8]) -> Result<Self, AuthError> {
        if words.len() != VALUE_SIZE {
            return Err(AuthError::InvalidState);
        }
        let mut state = [0u8; STATE_SIZE];
        state[..VALUE_SIZE].copy_from_slice(words);
        state[VALUE_SIZE..].copy_from_slice(&(BLOCK_SIZE as u32).to_le_bytes());
        Self::with_state(&state)
    }

    pub fn add(&mut self, data: &[u8]) {
        self.count += data.len() as u64;
        if !self.pending.is_empty() {
            let need = BLOCK_SIZE - self.pending.len();
            if data.len() < need {
                self.pending.extend_from_slice(data);
                return;
            }
            let pending = std::mem::take(&mut self.pending);
            let mut block = [0u8; BLOCK_SIZE];
            block[..pending.len()].copy_from_slice(&pending);
            block[pending.len()..].copy_from_slice(&data[..need]);
            compress(&mut self.h, &block);
            return self.add_aligned(&data[need..]);
        }
        self.add_aligned(data)
    }

    fn add_aligned(&mut self, data: &[u8]) {
        let mut chunks = data.chunks_exact(BLOCK_SIZE);
        for block in &mut chunks {
            compress(&mut self.h, block.try_into().unwrap());
        }
        self.pending.extend_from_slice(chunks.remainder());
    }

    /// The current intermediate state. Only available when the total added
    /// size is a whole number of blocks; otherwise the words do not yet
    /// reflect the trailing data.
    pub fn state(&self) -> Result<[u8; STATE_SIZE], AuthError> {
        if !self.pending.is_empty() {
            return Err(AuthError::InvalidState);
        }
        let mut out = [0u8; STATE_SIZE];
        for (i, w) in self.h.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
        }
        out[16..].copy_from_slice(&(self.count as u32).to_le_bytes());
        Ok(out)
    }

    /// Finalise and return the 16-byte digest.
    pub fn value(mut self) -> [u8; VALUE_SIZE] {
        let bits = self.count.wrapping_mul(8);
        self.add(&[0x80]);
        while self.pending.len() != BLOCK_SIZE - 8 {
            self.add(&[0]);
        }
        let mut block = [0u8; BLOCK_SIZE];
        block[..BLOCK_SIZE - 8].copy_from_slice(&self.pending);
        block[BLOCK_SIZE - 8..].copy_from_slice(&bits.to_le_bytes());
        compress(&mut self.h, &block);
        let mut out = [0u8; VALUE_SIZE];
        for (i, w) in self.h.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
        }
        out
    }
}

fn compress(h: &mut [u32; 4], block: &[u8; BLOCK_SIZE]) {
    let mut m = [0u32; 16];
    for (i, w) in m.iter_mut().enumerate() {
        *w = u32::from_le_bytes([block[i * 4], block[i * 4 + 1], block[i * 4 + 2], block[i * 4 + 3]]);
    }
    let (mut a, mut b, mut c, mut d) = (h[0], h[1], h[2], h[3]);
    for i in 0..64 {
        let (f, g) = match i / 16 {
            0 => ((b & c) | (!b & d), i),
            1 => ((d & b) | (!d & c), (5 * i + 1) % 16),
            2 => (b ^ c ^ d, (3 * i + 5) % 16),
            _ => (c ^ (b | !d), (7 * i) % 16),
        };
        let rotated = a
            .wrapping_add(f)
            .wrapping_add(K[i])
            .wrapping_add(m[g])
            .rotate_left(S[i]);
        a = d;
        d = c;
        c = b;
        b = b.wrapping_add(rotated);
    }
    h[0] = h[0].wrapping_add(a);
    h[1] = h[1].wrapping_add(b);
    h[2] = h[2].wrapping_add(c);
    h[3] = h[3].wrapping_add(d);
}

/// Zero-pad (or pre-hash) a shared key up to one block, RFC 2104 style.
fn block_key(key: &[u8]) -> [u8; BLOCK_SIZE] {
    let mut out = [0u8; BLOCK_SIZE];
    if key.len() > BLOCK_SIZE {
        let mut h = Md5::new();
        h.add(key);
        out[..VALUE_SIZE].copy_from_slice(&h.value());
    } else {
        out[..key.len()].copy_from_slice(key);
    }
    out
}

fn pad_state(key: &[u8; BLOCK_SIZE], pad: u8) -> [u8; VALUE_SIZE] {
    let mut h = Md5::new();
    let xored: Vec<u8> = key.iter().map(|b| b ^ pad).collect();
    h.add(&xored);
    let state = h.state().expect("one whole block was added");
    let mut out = [0u8; VALUE_SIZE];
    out.copy_from_slice(&state[..VALUE_SIZE]);
    out
}

/// Compute a masked key from a shared key: the pair of intermediate word
/// states after hashing the ipad- and opad-prepared key, one block each.
/// The result can be stored in place of the plaintext secret and later fed
/// to [`postdigest`].
pub fn mask(shared_key: &[u8]) -> [u8; 2 * VALUE_SIZE] {
    let key = block_key(shared_key);
    let mut out = [0u8; 2 * VALUE_SIZE];
    out[..VALUE_SIZE].copy_from_slice(&pad_state(&key, 0x36));
    out[VALUE_SIZE..].copy_from_slice(&pad_state(&key, 0x5c));
    out
}

/// Finish an HMAC from a masked key: restart the inner digest from the
/// first half of the state pair, add the message, then restart the outer
/// digest from the second half and add the inner result.
pub fn postdigest(state_pair: &[u8], message: &[u8]) -> Result<[u8; VALUE_SIZE], AuthError> {
    if state_pair.len() != 2 * VALUE_SIZE {
        return Err(AuthError::InvalidState);
    }
    let mut inner = Md5::with_word_state(&state_pair[..VALUE_SIZE])?;
    inner.add(message);
    let mut outer = Md5::with_word_state(&state_pair[VALUE_SIZE..])?;
    outer.add(&inner.value());
    Ok(outer.value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::printable;

    fn md5_hex(input: &[u8]) -> String {
        let mut h = Md5::new();
        h.add(input);
        printable(&h.value())
    }

    #[test]
    fn rfc1321_test_suite() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex(b"a"), "0cc175b9c0f1b6a831c399e269772661");
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(md5_hex(b"message digest"), "f96b697d7cb7938d525a2f31aaf161d0");
        assert_eq!(
            md5_hex(b"abcdefghijklmnopqrstuvwxyz"),
            "c3fcd3d76192e4007dfb496cca67e13b"
        );
        assert_eq!(
            md5_hex(b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789"),
            "d174ab98d277d9f5a5611c2c9f419d9f"
        );
        assert_eq!(
            md5_hex(
                b"12345678901234567890123456789012345678901234567890123456789012345678901234567890"
            ),
            "57edf4a22be3c955ac49da2e2107b67a"
        );
    }

    #[test]
    fn incremental_add_matches_one_shot() {
        let mut h1 = Md5::new();
        h1.add(b"message ");
        h1.add(b"digest");
        assert_eq!(printable(&h1.value()), "f96b697d7cb7938d525a2f31aaf161d0");
    }

    #[test]
    fn state_roundtrip_on_block_boundary() {
        let x = vec![0x41u8; BLOCK_SIZE * 2];
        let y = b"the rest of the stream";

        let mut h1 = Md5::new();
        h1.add(&x);
        let state = h1.state().unwrap();

        let mut h2 = Md5::with_state(&state).unwrap();
        h2.add(y);

        let mut whole = Md5::new();
        whole.add(&x);
        whole.add(y);
        assert_eq!(h2.value(), whole.value());
    }

    #[test]
    fn state_unavailable_mid_block() {
        let mut h = Md5::new();
        h.add(b"short");
        assert!(h.state().is_err());
    }

    #[test]
    fn with_state_rejects_bad_length() {
        assert!(Md5::with_state(&[0u8; 19]).is_err());
        assert!(Md5::with_word_state(&[0u8; 15]).is_err());
    }

    #[test]
    fn mask_then_postdigest_is_hmac() {
        // RFC 2202 section 2, test case 2
        let key = b"Jefe";
        let message = b"what do ya want for nothing?";
        let masked = mask(key);
        let value = postdigest(&masked, message).unwrap();
        assert_eq!(printable(&value), "750c783e6ab0b503eaa86e310a5db738");
    }

    #[test]
    fn postdigest_rejects_short_pair() {
        assert!(postdigest(&[0u8; 31], b"x").is_err());
    }
}
