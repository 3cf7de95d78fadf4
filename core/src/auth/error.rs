/*
 * error.rs
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

//! Authentication errors.
//!
//! The CRAM layer traps all of these and turns them into an empty response
//! or a false validation, so a protocol session never stalls on an internal
//! fault; the error text goes to the warning log, never to the peer.

use std::fmt;

/// Errors from digest, CRAM, and secrets-store operations. None of these
/// carry secret material.
#[derive(Debug)]
pub enum AuthError {
    /// A masked secret was used with a non-HMAC operation.
    BadType(String),
    /// The mechanism's digest does not match the secret's digest.
    Mismatch { secret: String, mechanism: String },
    /// The digest cannot be initialised with intermediate state.
    NoState(String),
    /// A masked-key payload has the wrong length or format.
    InvalidState,
    /// The named digest is not in the registry.
    UnknownHash(String),
    /// No secret for the given (side, type, id).
    NotFound(String),
    /// A malformed response or secrets-file field.
    ParseError(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::BadType(hash) => {
                write!(f, "masked {} secret cannot make a non-hmac digest", hash)
            }
            AuthError::Mismatch { secret, mechanism } => write!(
                f,
                "secret hash [{}] does not match mechanism hash [{}]",
                secret, mechanism
            ),
            AuthError::NoState(hash) => {
                write!(f, "digest [{}] has no intermediate-state support", hash)
            }
            AuthError::InvalidState => write!(f, "invalid masked-key state"),
            AuthError::UnknownHash(name) => write!(f, "unknown digest [{}]", name),
            AuthError::NotFound(what) => write!(f, "no secret for {}", what),
            AuthError::ParseError(what) => write!(f, "malformed {}", what),
        }
    }
}

impl std::error::Error for AuthError {}
