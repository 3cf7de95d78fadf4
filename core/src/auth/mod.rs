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

//! The authentication core: CRAM challenge-response, the secrets store,
//! and the SASL server and client state machines.

mod client;
mod cram;
mod error;
mod secret;
mod secrets;
mod server;

pub use client::{ClientResponse, SaslClient};
pub use cram::Cram;
pub use error::AuthError;
pub use secret::Secret;
pub use secrets::SecretsFile;
pub use server::SaslServer;
