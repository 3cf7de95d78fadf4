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

//! The AUTH verb of the receiving SMTP session (RFC 4954), sans-IO:
//! command arguments in, reply lines out, with the base64 transport
//! encoding handled here and the mechanism dialog delegated to
//! [`SaslServer`].

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::auth::{SaslServer, SecretsFile};

/// One SMTP reply line.
#[derive(Debug, PartialEq, Eq)]
pub struct SmtpReply {
    pub code: u16,
    pub text: String,
}

impl SmtpReply {
    fn new(code: u16, text: &str) -> Self {
        Self {
            code,
            text: text.to_string(),
        }
    }

    /// The wire form, without CRLF.
    pub fn line(&self) -> String {
        format!("{} {}", self.code, self.text)
    }
}

/// Server-side AUTH dialog state for one SMTP session.
pub struct AuthVerb<'a> {
    sasl: SaslServer<'a>,
    in_progress: bool,
}

impl<'a> AuthVerb<'a> {
    pub fn new(secrets: &'a SecretsFile, config: &str, challenge_domain: &str) -> Self {
        Self {
            sasl: SaslServer::new(secrets, false, config, challenge_domain),
            in_progress: false,
        }
    }

    /// The EHLO capability line, or None when no mechanism is usable.
    pub fn advertisement(&self, secure: bool) -> Option<String> {
        let mechanisms = self.sasl.mechanisms(secure);
        if mechanisms.is_empty() {
            None
        } else {
            Some(format!("AUTH {}", mechanisms.join(" ")))
        }
    }

    /// True while a dialog is underway and the next line from the peer is a
    /// response rather than a command.
    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    /// Handle `AUTH <mechanism> [initial-response]`.
    pub fn begin(&mut self, secure: bool, args: &str) -> SmtpReply {
        if self.sasl.authenticated() {
            return SmtpReply::new(503, "5.5.1 already authenticated");
        }
        self.in_progress = false;
        let mut words = args.split_whitespace();
        let mechanism = match words.next() {
            Some(m) => m,
            None => return SmtpReply::new(501, "5.5.4 missing mechanism"),
        };
        let initial = words.next();
        if words.next().is_some() {
            return SmtpReply::new(501, "5.5.4 too many arguments");
        }
        if !self.sasl.init(secure, mechanism) {
            return SmtpReply::new(504, "5.5.4 unrecognized authentication type");
        }
        match initial {
            None => {
                self.in_progress = true;
                SmtpReply::new(334, &BASE64.encode(self.sasl.initial_challenge()))
            }
            Some(_) if self.sasl.must_challenge() => {
                // server-first mechanisms cannot take an initial response
                self.sasl.reset();
                SmtpReply::new(501, "5.7.0 invalid initial response")
            }
            Some("=") => self.step(Vec::new()),
            Some(initial) => match BASE64.decode(initial) {
                Ok(decoded) => self.step(decoded),
                Err(_) => {
                    self.sasl.reset();
                    SmtpReply::new(501, "5.5.2 invalid base64")
                }
            },
        }
    }

    /// Handle one continuation line: a base64 response or `*` to cancel.
    pub fn respond(&mut self, line: &str) -> SmtpReply {
        if !self.in_progress {
            return SmtpReply::new(503, "5.5.1 no authentication in progress");
        }
        let line = line.trim();
        if line == "*" {
            self.in_progress = false;
            self.sasl.reset();
            return SmtpReply::new(501, "5.7.0 authentication cancelled");
        }
        match BASE64.decode(line) {
            Ok(decoded) => self.step(decoded),
            Err(_) => {
                self.in_progress = false;
                self.sasl.reset();
                SmtpReply::new(501, "5.5.2 invalid base64")
            }
        }
    }

    fn step(&mut self, response: Vec<u8>) -> SmtpReply {
        match self.sasl.apply(&response) {
            Some(challenge) => {
                self.in_progress = true;
                SmtpReply::new(334, &BASE64.encode(challenge))
            }
            None => {
                self.in_progress = false;
                if self.sasl.authenticated() {
                    SmtpReply::new(235, "2.7.0 authentication successful")
                } else {
                    SmtpReply::new(535, "5.7.8 authentication credentials invalid")
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

    /// Address-wildcard trust bypass; see [`SaslServer::trusted`].
    pub fn trusted(&mut self, address_wildcards: &[String], address_display: &str) -> bool {
        self.sasl.trusted(address_wildcards, address_display)
    }

    pub fn reset(&mut self) {
        self.in_progress = false;
        self.sasl.reset();
    }
}
