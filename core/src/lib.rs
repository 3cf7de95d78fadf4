/*
 * lib.rs
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

//! Core of the staffetta mail relay.
//!
//! The authentication machinery lives in [`auth`] (SASL server and client,
//! CRAM, the secrets store) over the digest and HMAC primitives in
//! [`hash`]. Protocol glue binding SASL to the SMTP AUTH verb, to the POP3
//! greeting/APOP/AUTH commands, and to the upstream forwarding connection
//! is under [`protocol`]. The [`install`] module holds the provisioning
//! action runner and the batch-file helpers shared with the service
//! wrapper.

pub mod auth;
pub mod hash;
pub mod install;
pub mod mapfile;
pub mod net;
pub mod protocol;
pub mod xtext;
