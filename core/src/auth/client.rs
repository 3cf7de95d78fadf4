/*
 * client.rs
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

//! Client-side SASL: mechanism selection against a server's advertised
//! list, and response generation, when forwarding to the upstream server.
//!
//! With a plaintext client secret any CRAM digest is usable; with only
//! masked secrets the digest must match the stored type and support
//! intermediate-state initialisation. The candidate list is ordered
//! strongest CRAM first, then XOAUTH2, then PLAIN, then LOGIN, filtered by
//! the `M:`/`X:` configuration string, and intersected with the server's
//! list preserving our preference order.

use crate::auth::{Cram, Secret, SecretsFile};

const LOGIN_CHALLENGE_1: &[u8] = b"Username:";
const LOGIN_CHALLENGE_2: &[u8] = b"Password:";

/// One step of the client dialog.
#[derive(Default)]
pub struct ClientResponse {
    /// The bytes to send (before any transport base64).
    pub data: Vec<u8>,
    /// Suppress logging of the data.
    pub sensitive: bool,
    /// The dialog cannot continue (no usable secret, unexpected prompt).
    pub error: bool,
    /// The server's decision comes next.
    pub is_final: bool,
}

/// Client-side SASL session state.
pub struct SaslClient<'a> {
    secrets: &'a SecretsFile,
    config: String,
    mechanisms: Vec<String>,
    id: String,
    info: String,
}

impl<'a> SaslClient<'a> {
    pub fn new(secrets: &'a SecretsFile, config: &str) -> Self {
        Self {
            secrets,
            config: config.to_string(),
            mechanisms: Vec::new(),
            id: String::new(),
            info: String::new(),
        }
    }

    /// Build the usable-mechanism list from our secrets and the server's
    /// advertisement, and return the first choice (empty if none).
    pub fn select_mechanism(&mut self, server_mechanisms: &[String], selector: &str) -> String {
        let have_plain = self.secrets.client_secret("plain", selector).valid();
        let mut our_list = if have_plain {
            Cram::hash_types("CRAM-", false)
        } else {
            Cram::hash_types("CRAM-", true)
                .into_iter()
                .filter(|m| {
                    let hash_type = m["CRAM-".len()..].to_lowercase();
                    self.secrets.client_secret(&hash_type, selector).valid()
                })
                .collect()
        };
        if self.secrets.client_secret("oauth", selector).valid() {
            our_list.push("XOAUTH2".to_string());
        }
        if have_plain {
            our_list.push("PLAIN".to_string());
            our_list.push("LOGIN".to_string());
        }

        // the configuration string is a whitelist and/or blocklist; a bare
        // mechanism name works as well as "m:<name>"
        if !self.config.is_empty() {
            let upper = self.config.to_uppercase();
            let simple = our_list.iter().any(|m| m.eq_ignore_ascii_case(&upper));
            let tokens: Vec<String> = upper.split(';').map(str::to_string).collect();
            let whitelist: Vec<String> = if simple {
                split_list(&upper)
            } else {
                split_list(&residue(&tokens, "M:"))
            };
            let blocklist = split_list(&residue(&tokens, "X:"));
            if !whitelist.is_empty() {
                our_list.retain(|m| whitelist.iter().any(|w| w.eq_ignore_ascii_case(m)));
            }
            our_list.retain(|m| !blocklist.iter().any(|b| b.eq_ignore_ascii_case(m)));
        }

        self.mechanisms = our_list
            .into_iter()
            .filter(|m| server_mechanisms.iter().any(|s| s.eq_ignore_ascii_case(m)))
            .collect();
        log::debug!("usable mechanisms: [{}]", self.mechanisms.join(","));
        self.mechanism()
    }

    /// Drop the current mechanism and move to the next candidate. Returns
    /// false when the list is exhausted.
    pub fn next(&mut self) -> bool {
        if !self.mechanisms.is_empty() {
            self.mechanisms.remove(0);
        }
        !self.mechanisms.is_empty()
    }

    /// The current mechanism, or empty.
    pub fn mechanism(&self) -> String {
        self.mechanisms.first().cloned().unwrap_or_default()
    }

    /// The first response for a client-first mechanism, computed without a
    /// server challenge. Empty (and not an error) for server-first
    /// mechanisms or when the response would exceed `limit`.
    pub fn initial_response(&mut self, selector: &str, limit: usize) -> ClientResponse {
        // response() derives everything from the challenge, so there is no
        // dialog state to worry about between this and the real exchange
        let mechanism = self.mechanism();
        if mechanism.is_empty() || mechanism.starts_with("CRAM-") {
            return ClientResponse::default();
        }
        let challenge: &[u8] = if mechanism == "LOGIN" {
            LOGIN_CHALLENGE_1
        } else {
            b""
        };
        let rsp = self.response(&mechanism, challenge, selector);
        if rsp.error || rsp.data.len() > limit {
            ClientResponse::default()
        } else {
            rsp
        }
    }

    /// Generate the response to a server challenge.
    pub fn response(
        &mut self,
        mechanism: &str,
        challenge: &[u8],
        selector: &str,
    ) -> ClientResponse {
        let mut rsp = ClientResponse {
            data: Vec::new(),
            sensitive: true,
            error: true,
            is_final: false,
        };

        let mut secret = Secret::none();
        if let Some(hash_type) = mechanism.strip_prefix("CRAM-") {
            let found = self.secrets.client_secret(&hash_type.to_lowercase(), selector);
            secret = if found.valid() {
                found
            } else {
                self.secrets.client_secret("plain", selector)
            };
            let challenge = String::from_utf8_lossy(challenge).into_owned();
            rsp.data = Cram::response(hash_type, true, &secret, &challenge, secret.id())
                .into_bytes();
            rsp.error = rsp.data.is_empty();
            rsp.is_final = true;
        } else if mechanism == "APOP" {
            // APOP needs the password itself, not a masked state
            secret = self.secrets.client_secret("plain", selector);
            let challenge = String::from_utf8_lossy(challenge).into_owned();
            rsp.data = Cram::response("MD5", false, &secret, &challenge, secret.id())
                .into_bytes();
            rsp.error = rsp.data.is_empty();
            rsp.is_final = true;
        } else if mechanism == "PLAIN" {
            secret = self.secrets.client_secret("plain", selector);
            let mut data = vec![0u8];
            data.extend_from_slice(secret.id().as_bytes());
            data.push(0);
            data.extend_from_slice(secret.secret());
            rsp.data = data;
            rsp.error = !secret.valid();
            rsp.is_final = true;
        } else if mechanism == "LOGIN" && challenge == LOGIN_CHALLENGE_1 {
            secret = self.secrets.client_secret("plain", selector);
            rsp.data = secret.id().as_bytes().to_vec();
            rsp.error = !secret.valid();
            rsp.is_final = false;
            rsp.sensitive = false; // just the userid
        } else if mechanism == "LOGIN" && challenge == LOGIN_CHALLENGE_2 {
            secret = self.secrets.client_secret("plain", selector);
            rsp.data = secret.secret().to_vec();
            rsp.error = !secret.valid();
            rsp.is_final = true;
        } else if mechanism == "XOAUTH2" && challenge.is_empty() {
            secret = self.secrets.client_secret("oauth", selector);
            rsp.data = secret.secret().to_vec();
            rsp.error = !secret.valid();
            rsp.is_final = true; // not always -- may get an informational challenge
        } else if mechanism == "XOAUTH2" {
            // an information-only challenge gets an empty response
            secret = self.secrets.client_secret("oauth", selector);
            rsp.data.clear();
            rsp.error = false;
            rsp.is_final = true;
            rsp.sensitive = false;
        }

        if rsp.is_final {
            self.info = format!(
                "using mechanism [{}] and {}",
                mechanism.to_lowercase(),
                secret.info("")
            );
            self.id = secret.id().to_string();
        }

        rsp
    }

    /// The id of the secret used in the last final response, for logging.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// A loggable description of the last final response.
    pub fn info(&self) -> &str {
        &self.info
    }

    pub fn valid_selector(&self, selector: &str) -> bool {
        self.secrets.valid_selector(selector)
    }

    pub fn must_authenticate(&self, selector: &str) -> bool {
        self.secrets.must_authenticate(selector)
    }
}

fn residue(tokens: &[String], head: &str) -> String {
    tokens
        .iter()
        .find(|t| t.trim().starts_with(head))
        .map(|t| t.trim()[head.len()..].to_string())
        .unwrap_or_default()
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
