/*
 * cram.rs
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

//! Challenge-response authentication (RFC 2195), also covering APOP's
//! non-HMAC MD5 variant.
//!
//! `response` and `validate` trap every internal error (bad digest name,
//! mismatched masked secret, missing state support) and return an empty
//! string or false after logging a warning, so a protocol dialog cannot be
//! stalled by an internal fault.

use crate::auth::{AuthError, Secret};
use crate::hash::{self, HashType};

/// Challenge generation and response validation for CRAM and APOP.
pub struct Cram;

impl Cram {
    /// Format a challenge: `<N.T@D>` with a random integer, the Unix time
    /// in seconds, and the challenge domain (the local host name when the
    /// given domain is empty).
    pub fn challenge(random: u32, challenge_domain: &str) -> String {
        let domain = if challenge_domain.is_empty() {
            local_domain()
        } else {
            challenge_domain.to_string()
        };
        format!("<{}.{}@{}>", random, chrono::Utc::now().timestamp(), domain)
    }

    /// Build a response: `<id_prefix> <hex-digest>`. Empty on any failure;
    /// the caller treats empty as authentication-refused.
    pub fn response(
        hash_type: &str,
        as_hmac: bool,
        secret: &Secret,
        challenge: &str,
        id_prefix: &str,
    ) -> String {
        match Self::response_imp(hash_type, as_hmac, secret, challenge) {
            Ok(hex) => format!("{} {}", id_prefix, hex),
            Err(e) => {
                log::warn!("challenge-response failure: {}", e);
                String::new()
            }
        }
    }

    /// Check a response against a fresh computation over the same secret
    /// and challenge. The comparison is byte-exact on the hex tail after
    /// the last space; an empty expectation never validates.
    pub fn validate(
        hash_type: &str,
        as_hmac: bool,
        secret: &Secret,
        challenge: &str,
        response_in: &str,
    ) -> bool {
        let expectation = match response_in.rsplit_once(' ') {
            Some((_, tail)) => tail,
            None => return false,
        };
        if expectation.is_empty() {
            return false;
        }
        match Self::response_imp(hash_type, as_hmac, secret, challenge) {
            Ok(hex) => hex == expectation,
            Err(e) => {
                log::warn!("challenge-response failure: {}", e);
                false
            }
        }
    }

    /// The id part of a response: everything before the last space, since
    /// ids may themselves contain spaces. Empty if there is no space.
    pub fn id(response: &str) -> String {
        match response.rsplit_once(' ') {
            Some((head, _)) => head.to_string(),
            None => String::new(),
        }
    }

    /// The available digest names, strongest first, optionally filtered to
    /// those that can be initialised with intermediate state (for stores
    /// that hold only masked secrets). Each name gets the given prefix.
    pub fn hash_types(prefix: &str, require_state: bool) -> Vec<String> {
        HashType::all()
            .iter()
            .filter(|h| !require_state || h.supports_state())
            .map(|h| format!("{}{}", prefix, h.name()))
            .collect()
    }

    fn response_imp(
        hash_type: &str,
        as_hmac: bool,
        secret: &Secret,
        challenge: &str,
    ) -> Result<String, AuthError> {
        if !secret.valid() {
            return Err(AuthError::NotFound(format!("[{}]", secret.id())));
        }
        let hash = HashType::from_name(hash_type)
            .ok_or_else(|| AuthError::UnknownHash(hash_type.to_string()))?;
        if !as_hmac {
            if secret.masked() {
                return Err(AuthError::BadType(secret.mask_hash_function().to_string()));
            }
            let value = hash::digest(hash, &[challenge.as_bytes(), secret.secret()]);
            Ok(hash::printable(&value))
        } else if secret.masked() {
            if HashType::from_name(secret.mask_hash_function()) != Some(hash) {
                return Err(AuthError::Mismatch {
                    secret: secret.mask_hash_function().to_string(),
                    mechanism: hash.name().to_string(),
                });
            }
            let value = hash::hmac_masked(hash, secret.secret(), challenge.as_bytes())?;
            Ok(hash::printable(&value))
        } else {
            let value = hash::hmac(hash, secret.secret(), challenge.as_bytes());
            Ok(hash::printable(&value))
        }
    }
}

/// The local challenge domain when none is configured.
fn local_domain() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
