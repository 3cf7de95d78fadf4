/*
 * auth.rs
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

//! The authentication part of a POP3 session, sans-IO. Covers the APOP
//! timestamp banner in the greeting (RFC 1939 section 7), USER/PASS (run
//! through the LOGIN machinery, which has the same plaintext-compare
//! semantics), and the AUTH command with base64 continuations (RFC 5034).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::auth::{SaslServer, SecretsFile};

/// Authentication state for one POP3 session.
pub struct Pop3Auth<'a> {
    sasl: SaslServer<'a>,
    secure: bool,
    banner: String,
    in_auth: bool,
    user_pending: bool,
}

impl<'a> Pop3Auth<'a> {
    /// `with_apop` puts a timestamp banner in the greeting and enables the
    /// APOP command; `secure` selects which mechanism list applies.
    pub fn new(
        secrets: &'a SecretsFile,
        with_apop: bool,
        secure: bool,
        config: &str,
        challenge_domain: &str,
    ) -> Self {
        let mut sasl = SaslServer::new(secrets, with_apop, config, challenge_domain);
        let mut banner = String::new();
        if with_apop && sasl.init(secure, "APOP") {
            banner = sasl.initial_challenge();
        }
        Self {
            sasl,
            secure,
            banner,
            in_auth: false,
            user_pending: false,
        }
    }

    /// The greeting line, with the APOP timestamp when enabled.
    pub fn greeting(&self) -> String {
        if self.banner.is_empty() {
            "+OK POP3 server ready".to_string()
        } else {
            format!("+OK POP3 server ready {}", self.banner)
        }
    }

    /// The mechanism names for the CAPA `SASL` line and the bare `AUTH`
    /// listing.
    pub fn mechanisms(&self) -> Vec<String> {
        self.sasl
            .mechanisms(self.secure)
            .iter()
            .filter(|m| m.as_str() != "APOP")
            .cloned()
            .collect()
    }

    /// Handle `USER <name>`. Runs the LOGIN machinery, so a store with no
    /// plaintext secrets refuses USER/PASS.
    pub fn user(&mut self, name: &str) -> String {
        self.in_auth = false;
        self.user_pending = false;
        if name.is_empty() {
            return "-ERR missing user name".to_string();
        }
        if !self.sasl.init(self.secure, "LOGIN") {
            return "-ERR password login disabled".to_string();
        }
        match self.sasl.apply(name.as_bytes()) {
            Some(_) => {
                self.user_pending = true;
                "+OK send PASS".to_string()
            }
            None => "-ERR bad user".to_string(),
        }
    }

    /// Handle `PASS <password>` after USER.
    pub fn pass(&mut self, password: &str) -> String {
        if !self.user_pending {
            return "-ERR send USER first".to_string();
        }
        self.user_pending = false;
        let _ = self.sasl.apply(password.as_bytes());
        if self.sasl.authenticated() {
            "+OK mailbox ready".to_string()
        } else {
            "-ERR authentication failed".to_string()
        }
    }

    /// Handle `APOP <name> <hex-digest>` against the greeting banner.
    pub fn apop(&mut self, args: &str) -> String {
        // only valid while the banner challenge from the greeting is still
        // the current dialog, i.e. before any USER or AUTH
        if self.banner.is_empty() || self.sasl.mechanism() != "APOP" {
            return "-ERR APOP not available".to_string();
        }
        let _ = self.sasl.apply(args.trim().as_bytes());
        if self.sasl.authenticated() {
            "+OK mailbox ready".to_string()
        } else {
            "-ERR authentication failed".to_string()
        }
    }

    /// Handle `AUTH` with no arguments: the mechanism listing, one name
    /// per line, dot-terminated.
    pub fn auth_list(&self) -> Vec<String> {
        let mut lines = vec!["+OK".to_string()];
        lines.extend(self.mechanisms());
        lines.push(".".to_string());
        lines
    }

    /// Handle `AUTH <mechanism> [initial-base64]`.
    pub fn auth(&mut self, args: &str) -> String {
        self.in_auth = false;
        self.user_pending = false;
        let mut words = args.split_whitespace();
        let mechanism = words.next().unwrap_or("");
        let initial = words.next();
        if mechanism.eq_ignore_ascii_case("APOP")
            || !self.sasl.init(self.secure, mechanism)
        {
            return "-ERR unrecognized authentication type".to_string();
        }
        match initial {
            None => {
                self.in_auth = true;
                format!("+ {}", BASE64.encode(self.sasl.initial_challenge()))
            }
            Some(_) if self.sasl.must_challenge() => {
                self.sasl.reset();
                "-ERR invalid initial response".to_string()
            }
            Some("=") => self.step(Vec::new()),
            Some(initial) => match BASE64.decode(initial) {
                Ok(decoded) => self.step(decoded),
                Err(_) => {
                    self.sasl.reset();
                    "-ERR invalid base64".to_string()
                }
            },
        }
    }

    /// True while an AUTH dialog is underway and the next line is a
    /// response rather than a command.
    pub fn in_auth(&self) -> bool {
        self.in_auth
    }

    /// Handle one AUTH continuation line: base64 or `*` to cancel.
    pub fn respond(&mut self, line: &str) -> String {
        if !self.in_auth {
            return "-ERR no authentication in progress".to_string();
        }
        let line = line.trim();
        if line == "*" {
            self.in_auth = false;
            self.sasl.reset();
            return "-ERR authentication cancelled".to_string();
        }
        match BASE64.decode(line) {
            Ok(decoded) => self.step(decoded),
            Err(_) => {
                self.in_auth = false;
                self.sasl.reset();
                "-ERR invalid base64".to_string()
            }
        }
    }

    fn step(&mut self, response: Vec<u8>) -> String {
        match self.sasl.apply(&response) {
            Some(challenge) => {
                self.in_auth = true;
                format!("+ {}", BASE64.encode(challenge))
            }
            None => {
                self.in_auth = false;
                if self.sasl.authenticated() {
                    "+OK mailbox ready".to_string()
                } else {
                    "-ERR authentication failed".to_string()
                }
            }
        }
    }

    pub fn authenticated(&self) -> bool {
        self.sasl.authenticated()
    }

    pub fn id(&self) -> &str {
        self.sasl.id()
    }

    /// Address-wildcard trust bypass; a trusted peer skips the dialog.
    pub fn trusted(&mut self, address_wildcards: &[String], address_display: &str) -> bool {
        self.sasl.trusted(address_wildcards, address_display)
    }
}
