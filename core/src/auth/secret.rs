/*
 * secret.rs
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

//! One credential record from the secrets store.

/// A shared secret, either plaintext or masked. A masked secret holds the
/// pair of inner/outer HMAC intermediate digest states instead of the
/// password itself, and reports the digest it was masked with.
///
/// Lookups that find nothing return the invalid sentinel from
/// [`Secret::none`], which tests false everywhere.
pub struct Secret {
    valid: bool,
    id: String,
    value: Vec<u8>,
    hash_function: String,
    context: String,
}

impl Secret {
    /// The invalid sentinel.
    pub fn none() -> Self {
        Self {
            valid: false,
            id: String::new(),
            value: Vec::new(),
            hash_function: String::new(),
            context: String::new(),
        }
    }

    pub(crate) fn new_plain(id: String, value: Vec<u8>, context: String) -> Self {
        Self {
            valid: true,
            id,
            value,
            hash_function: String::new(),
            context,
        }
    }

    pub(crate) fn new_masked(
        id: String,
        value: Vec<u8>,
        hash_function: String,
        context: String,
    ) -> Self {
        Self {
            valid: true,
            id,
            value,
            hash_function,
            context,
        }
    }

    pub fn valid(&self) -> bool {
        self.valid
    }

    /// The authentication id this secret belongs to.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The payload: password bytes, or the masked state pair.
    pub fn secret(&self) -> &[u8] {
        &self.value
    }

    /// True if the payload is a masked state pair rather than a password.
    pub fn masked(&self) -> bool {
        !self.hash_function.is_empty()
    }

    /// The digest the secret was masked with; empty for plaintext.
    pub fn mask_hash_function(&self) -> &str {
        &self.hash_function
    }

    /// A loggable description that never includes the payload.
    pub fn info(&self, id: &str) -> String {
        let id = if id.is_empty() { self.id.as_str() } else { id };
        if !self.valid {
            if id.is_empty() {
                "no secret".to_string()
            } else {
                format!("no secret for [{}]", id)
            }
        } else {
            let kind = if self.masked() {
                format!("{}-masked", self.hash_function.to_lowercase())
            } else {
                "plaintext".to_string()
            };
            let mut s = format!("{} secret for [{}]", kind, id);
            if !self.context.is_empty() {
                s.push_str(" from ");
                s.push_str(&self.context);
            }
            s
        }
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        // wipe the payload; it may be a password
        for b in self.value.iter_mut() {
            *b = 0;
        }
    }
}
