/*
 * server.rs
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

//! Server-side SASL state machine: mechanism advertisement, the
//! challenge/response dialog, and the authentication decision.
//!
//! One instance per connection, borrowing the shared secrets store. The
//! advertised mechanisms are computed once at construction, in two views:
//! the secure list (after TLS) always offers PLAIN when any usable secret
//! exists (RFC 4954 section 4), the insecure list may be narrower. The
//! configuration string filters both: `M:`/`X:` are the allow/deny lists
//! (insecure only when `A:`/`D:` are also present, otherwise both), and
//! `A:`/`D:` are the secure allow/deny lists.

use crate::auth::{Cram, Secret, SecretsFile};

const LOGIN_CHALLENGE_1: &str = "Username:";
const LOGIN_CHALLENGE_2: &str = "Password:";

/// Server-side SASL session state.
pub struct SaslServer<'a> {
    secrets: &'a SecretsFile,
    mechanisms_secure: Vec<String>,
    mechanisms_insecure: Vec<String>,
    challenge_domain: String,
    mechanism: String,
    challenge: String,
    authenticated: bool,
    id: String,
    trustee: String,
    first_apply: bool,
}

impl<'a> SaslServer<'a> {
    /// Build the per-connection state and compute the mechanism lists.
    /// `with_apop` adds APOP for POP3 sessions; `config` is the `M:`/`X:`/
    /// `A:`/`D:` filter string; an empty `challenge_domain` falls back to
    /// the local host name.
    pub fn new(
        secrets: &'a SecretsFile,
        with_apop: bool,
        config: &str,
        challenge_domain: &str,
    ) -> Self {
        // remove mechanisms that are completely unusable: with a plaintext
        // secret anything goes, otherwise only the CRAMs whose masked
        // secrets exist and whose digest can restart from stored state
        let mut mechanisms = Vec::new();
        if secrets.contains("plain", "") {
            mechanisms = Cram::hash_types("CRAM-", false);
            mechanisms.push("PLAIN".to_string());
            mechanisms.push("LOGIN".to_string());
        } else {
            for hash_type in Cram::hash_types("", true) {
                if secrets.contains(&hash_type, "") {
                    mechanisms.push(format!("CRAM-{}", hash_type));
                }
            }
        }
        if with_apop {
            mechanisms.push("APOP".to_string());
        }

        let mut secure = mechanisms.clone();
        let insecure = mechanisms;

        // RFC-4954 4 p6 -- PLAIN is always an option when secure
        if secure.is_empty() && secrets.valid() {
            secure.push("PLAIN".to_string());
        }

        let mut this = Self {
            secrets,
            mechanisms_secure: secure,
            mechanisms_insecure: insecure,
            challenge_domain: challenge_domain.to_string(),
            mechanism: String::new(),
            challenge: String::new(),
            authenticated: false,
            id: String::new(),
            trustee: String::new(),
            first_apply: true,
        };
        this.configure(config);
        this
    }

    fn configure(&mut self, config: &str) {
        let tokens = split_tokens(&config.to_uppercase(), ';');
        let m = head_residue(&tokens, "M:");
        let x = head_residue(&tokens, "X:").unwrap_or_default();
        let a = head_residue(&tokens, "A:");
        let d = head_residue(&tokens, "D:").unwrap_or_default();
        let deny_insecure = split_tokens(&x, ',');
        let allow_insecure = m.as_deref().map(|s| split_tokens(s, ','));
        if a.is_some() || !d.is_empty() {
            let deny_secure = split_tokens(&d, ',');
            let allow_secure = a.as_deref().map(|s| split_tokens(s, ','));
            filter(&mut self.mechanisms_insecure, &allow_insecure, &deny_insecure);
            filter(&mut self.mechanisms_secure, &allow_secure, &deny_secure);
        } else {
            // legacy form: one allow/deny pair for both lists
            filter(&mut self.mechanisms_insecure, &allow_insecure, &deny_insecure);
            filter(&mut self.mechanisms_secure, &allow_insecure, &deny_insecure);
        }
    }

    /// The advertised mechanisms for the current transport security.
    pub fn mechanisms(&self, secure: bool) -> &[String] {
        if secure {
            &self.mechanisms_secure
        } else {
            &self.mechanisms_insecure
        }
    }

    /// Clear all per-dialog state.
    pub fn reset(&mut self) {
        self.first_apply = true;
        self.authenticated = false;
        self.id.clear();
        self.trustee.clear();
        self.challenge.clear();
        self.mechanism.clear();
    }

    /// Select a mechanism (case-insensitively) and prepare the dialog.
    /// Returns false if the mechanism is not in the advertised list.
    pub fn init(&mut self, secure: bool, mechanism: &str) -> bool {
        self.reset();
        let mechanism = mechanism.trim().to_uppercase();
        if mechanism.is_empty() || !self.mechanisms(secure).contains(&mechanism) {
            log::debug!("requested mechanism [{}] is not in our list", mechanism);
            return false;
        }
        if mechanism == "APOP" || mechanism.starts_with("CRAM-") {
            self.challenge = Cram::challenge(rand::random(), &self.challenge_domain);
        }
        self.mechanism = mechanism;
        true
    }

    /// The selected mechanism, upper-case, or empty.
    pub fn mechanism(&self) -> &str {
        &self.mechanism
    }

    /// Once an id is known, a CRAM mechanism for which that id has a
    /// matching secret, scanning the advertised list from the back. Used to
    /// hint a usable mechanism to a client that failed. Empty if there is
    /// none.
    pub fn preferred_mechanism(&self, secure: bool) -> String {
        if !self.id.is_empty() {
            for m in self.mechanisms(secure).iter().rev() {
                if let Some(hash_type) = m.strip_prefix("CRAM-") {
                    if self.secrets.contains(&hash_type.to_lowercase(), &self.id) {
                        return m.clone();
                    }
                }
            }
        }
        String::new()
    }

    /// True if the mechanism requires a server challenge before any
    /// response (APOP and CRAM); PLAIN and LOGIN are client-first.
    pub fn must_challenge(&self) -> bool {
        let plain = self.mechanism.eq_ignore_ascii_case("PLAIN");
        let login = !plain && self.mechanism.eq_ignore_ascii_case("LOGIN");
        !plain && !login
    }

    /// The first challenge of the dialog; see RFC 4422 section 5. Empty for
    /// client-first PLAIN.
    pub fn initial_challenge(&self) -> String {
        if self.mechanism == "PLAIN" {
            String::new()
        } else if self.mechanism == "LOGIN" {
            LOGIN_CHALLENGE_1.to_string()
        } else {
            self.challenge.clone()
        }
    }

    /// Feed one client response into the dialog. `Some(challenge)` means
    /// the dialog continues; `None` means it is decided and
    /// [`authenticated`](Self::authenticated) holds the outcome.
    pub fn apply(&mut self, response: &[u8]) -> Option<String> {
        let first_apply = self.first_apply;
        self.first_apply = false;

        let mut done = false;
        let mut next_challenge = None;
        let mut id = String::new();
        let mut secret = Secret::none();

        if self.mechanism.starts_with("CRAM-") || self.mechanism == "APOP" {
            let text = String::from_utf8_lossy(response).into_owned();
            id = Cram::id(&text);
            if !id.is_empty() {
                secret = if self.mechanism == "APOP" {
                    // APOP is MD5 but not HMAC, over the plaintext secret
                    self.secrets.server_secret("plain", &id)
                } else {
                    let hash_type = &self.mechanism[5..];
                    let found = self.secrets.server_secret(hash_type, &id);
                    if found.valid() {
                        found
                    } else {
                        self.secrets.server_secret("plain", &id)
                    }
                };
            }
            if !secret.valid() {
                self.authenticated = false;
            } else {
                self.id = id.clone();
                self.authenticated = if self.mechanism == "APOP" {
                    Cram::validate("MD5", false, &secret, &self.challenge, &text)
                } else {
                    Cram::validate(&self.mechanism[5..], true, &secret, &self.challenge, &text)
                };
            }
            done = true;
        } else if self.mechanism == "PLAIN" {
            // a single response of three nul-separated fields
            let mut fields = response.splitn(3, |&b| b == 0);
            let _authzid = fields.next().unwrap_or_default();
            let authcid = fields.next().unwrap_or_default();
            let password = fields.next().unwrap_or_default();
            id = String::from_utf8_lossy(authcid).into_owned();
            secret = self.secrets.server_secret("plain", &id);
            self.authenticated = secret.valid()
                && !id.is_empty()
                && !password.is_empty()
                && password == secret.secret();
            self.id = id.clone();
            done = true;
        } else if first_apply {
            // LOGIN username prompt answered
            id = String::from_utf8_lossy(response).into_owned();
            self.id = id.clone();
            next_challenge = Some(if self.id.is_empty() {
                String::new()
            } else {
                LOGIN_CHALLENGE_2.to_string()
            });
        } else {
            // LOGIN password prompt answered
            id = self.id.clone();
            secret = self.secrets.server_secret("plain", &self.id);
            self.authenticated =
                secret.valid() && !response.is_empty() && response == secret.secret();
            done = true;
        }

        if done {
            let line = format!(
                "{} authentication of remote client using mechanism [{}] and {}",
                if self.authenticated { "successful" } else { "failed" },
                self.mechanism.to_lowercase(),
                secret.info(&id)
            );
            if self.authenticated {
                log::info!("{}", line);
            } else {
                log::warn!("{}", line);
            }
            None
        } else {
            next_challenge
        }
    }

    /// Check the peer's address wildcards (longest match first) against the
    /// trust entries. On a match the session is trusted and [`id`](Self::id)
    /// reports the trustee tag without any SASL dialog.
    pub fn trusted(&mut self, address_wildcards: &[String], address_display: &str) -> bool {
        for wildcard in address_wildcards {
            let (trustee, context) = self.secrets.server_trust(wildcard);
            if !trustee.is_empty() {
                log::info!(
                    "trusting [{}]: matched [{}] from {}",
                    address_display,
                    wildcard,
                    context
                );
                self.trustee = trustee;
                return true;
            }
        }
        false
    }

    pub fn authenticated(&self) -> bool {
        self.authenticated
    }

    /// The authenticated id, or the trustee tag for a trusted peer.
    pub fn id(&self) -> &str {
        if self.authenticated {
            &self.id
        } else {
            &self.trustee
        }
    }

    #[cfg(test)]
    pub(crate) fn set_challenge(&mut self, challenge: &str) {
        self.challenge = challenge.to_string();
    }
}

fn split_tokens(s: &str, sep: char) -> Vec<String> {
    s.split(sep)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// The residue of the first token with the given prefix, or None.
fn head_residue(tokens: &[String], head: &str) -> Option<String> {
    tokens
        .iter()
        .find(|t| t.starts_with(head))
        .map(|t| t[head.len()..].to_string())
}

fn filter(list: &mut Vec<String>, allow: &Option<Vec<String>>, deny: &[String]) {
    if let Some(allow) = allow {
        list.retain(|m| allow.iter().any(|a| a.eq_ignore_ascii_case(m)));
    }
    list.retain(|m| !deny.iter().any(|d| d.eq_ignore_ascii_case(m)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets(content: &str) -> SecretsFile {
        SecretsFile::parse(content, "test")
    }

    fn names(list: &[String]) -> Vec<&str> {
        list.iter().map(|s| s.as_str()).collect()
    }

    #[test]
    fn plain_secret_enables_everything() {
        let s = secrets("server plain alice secret\n");
        let sasl = SaslServer::new(&s, false, "", "");
        assert_eq!(
            names(sasl.mechanisms(false)),
            ["CRAM-SHA256", "CRAM-SHA1", "CRAM-MD5", "PLAIN", "LOGIN"]
        );
        assert_eq!(sasl.mechanisms(true), sasl.mechanisms(false));
    }

    #[test]
    fn masked_secrets_enable_only_state_capable_crams() {
        let masked = crate::hash::mask(crate::hash::HashType::Md5, b"pencil").unwrap();
        use base64::Engine as _;
        let content = format!(
            "server cram-md5 alice {}\n",
            base64::engine::general_purpose::STANDARD.encode(&masked)
        );
        let s = secrets(&content);
        let sasl = SaslServer::new(&s, false, "", "");
        assert_eq!(names(sasl.mechanisms(false)), ["CRAM-MD5"]);
        // and PLAIN is offered on the secure side regardless (RFC 4954)
        // -- not here, because the insecure list is non-empty
        assert_eq!(names(sasl.mechanisms(true)), ["CRAM-MD5"]);
    }

    #[test]
    fn trust_only_store_still_offers_plain_when_secure() {
        let s = secrets("server none 192.168.0.0/16 lan-trust\n");
        let sasl = SaslServer::new(&s, false, "", "");
        assert!(sasl.mechanisms(false).is_empty());
        assert_eq!(names(sasl.mechanisms(true)), ["PLAIN"]);
    }

    #[test]
    fn apop_is_appended_when_enabled() {
        let s = secrets("server plain alice secret\n");
        let sasl = SaslServer::new(&s, true, "", "");
        assert_eq!(sasl.mechanisms(false).last().unwrap(), "APOP");
    }

    #[test]
    fn legacy_filter_applies_to_both_lists() {
        let s = secrets("server plain alice secret\n");
        let sasl = SaslServer::new(&s, false, "m:plain,login;x:login", "");
        assert_eq!(names(sasl.mechanisms(false)), ["PLAIN"]);
        assert_eq!(names(sasl.mechanisms(true)), ["PLAIN"]);
    }

    #[test]
    fn two_track_filter() {
        let s = secrets("server plain alice secret\n");
        let sasl = SaslServer::new(&s, false, "m:;a:plain,login", "");
        assert!(sasl.mechanisms(false).is_empty());
        assert_eq!(names(sasl.mechanisms(true)), ["PLAIN", "LOGIN"]);
    }

    #[test]
    fn deny_only_two_track_filter() {
        let s = secrets("server plain alice secret\n");
        let sasl = SaslServer::new(&s, false, "d:cram-sha256", "");
        assert_eq!(
            names(sasl.mechanisms(true)),
            ["CRAM-SHA1", "CRAM-MD5", "PLAIN", "LOGIN"]
        );
        // insecure untouched by D:
        assert_eq!(
            names(sasl.mechanisms(false)),
            ["CRAM-SHA256", "CRAM-SHA1", "CRAM-MD5", "PLAIN", "LOGIN"]
        );
    }

    #[test]
    fn init_is_case_insensitive() {
        let s = secrets("server plain alice secret\n");
        let mut sasl = SaslServer::new(&s, false, "", "");
        assert!(sasl.init(false, "plain"));
        assert_eq!(sasl.mechanism(), "PLAIN");
        assert!(sasl.init(false, "PLAIN"));
        assert_eq!(sasl.mechanism(), "PLAIN");
        assert!(!sasl.init(false, "APOP"));
        assert!(!sasl.init(false, ""));
    }

    #[test]
    fn must_challenge_for_server_first_mechanisms() {
        let s = secrets("server plain alice secret\n");
        let mut sasl = SaslServer::new(&s, true, "", "");
        sasl.init(false, "CRAM-MD5");
        assert!(sasl.must_challenge());
        sasl.init(false, "PLAIN");
        assert!(!sasl.must_challenge());
        sasl.init(false, "LOGIN");
        assert!(!sasl.must_challenge());
    }

    #[test]
    fn plain_success() {
        let s = secrets("server plain alice secret\n");
        let mut sasl = SaslServer::new(&s, false, "", "");
        assert!(sasl.init(false, "PLAIN"));
        assert_eq!(sasl.initial_challenge(), "");
        assert_eq!(sasl.apply(b"\0alice\0secret"), None);
        assert!(sasl.authenticated());
        assert_eq!(sasl.id(), "alice");
    }

    #[test]
    fn plain_wrong_password() {
        let s = secrets("server plain alice secret\n");
        let mut sasl = SaslServer::new(&s, false, "", "");
        assert!(sasl.init(false, "PLAIN"));
        assert_eq!(sasl.apply(b"\0alice\0bad"), None);
        assert!(!sasl.authenticated());
        assert_eq!(sasl.id(), "");
    }

    #[test]
    fn plain_without_authzid_field_fails() {
        let s = secrets("server plain alice secret\n");
        let mut sasl = SaslServer::new(&s, false, "", "");
        sasl.init(false, "PLAIN");
        assert_eq!(sasl.apply(b"alice secret"), None);
        assert!(!sasl.authenticated());
    }

    #[test]
    fn login_two_step() {
        let s = secrets("server plain alice secret\n");
        let mut sasl = SaslServer::new(&s, false, "", "");
        assert!(sasl.init(false, "LOGIN"));
        assert_eq!(sasl.initial_challenge(), "Username:");
        assert_eq!(sasl.apply(b"alice"), Some("Password:".to_string()));
        assert!(!sasl.authenticated());
        assert_eq!(sasl.apply(b"secret"), None);
        assert!(sasl.authenticated());
        assert_eq!(sasl.id(), "alice");
    }

    #[test]
    fn login_wrong_password() {
        let s = secrets("server plain alice secret\n");
        let mut sasl = SaslServer::new(&s, false, "", "");
        sasl.init(false, "LOGIN");
        sasl.apply(b"alice");
        assert_eq!(sasl.apply(b"wrong"), None);
        assert!(!sasl.authenticated());
    }

    #[test]
    fn cram_md5_with_plaintext_secret() {
        let s = secrets("server plain tim tanstaaftanstaaf\n");
        let mut sasl = SaslServer::new(&s, false, "", "");
        assert!(sasl.init(false, "CRAM-MD5"));
        sasl.set_challenge("<1896.697170952@postoffice.reston.mci.net>");
        assert_eq!(
            sasl.apply(b"tim b913a602c7eda7a495b4e6e7334d3890"),
            None
        );
        assert!(sasl.authenticated());
        assert_eq!(sasl.id(), "tim");
    }

    #[test]
    fn cram_md5_with_masked_secret() {
        let masked = crate::hash::mask(crate::hash::HashType::Md5, b"pencil").unwrap();
        use base64::Engine as _;
        let content = format!(
            "server cram-md5 alice {}\n",
            base64::engine::general_purpose::STANDARD.encode(&masked)
        );
        let s = secrets(&content);
        let mut sasl = SaslServer::new(&s, false, "", "");
        assert!(sasl.init(false, "CRAM-MD5"));
        let challenge = sasl.initial_challenge();
        let client_secret = Secret::new_plain("alice".to_string(), b"pencil".to_vec(), String::new());
        let response = Cram::response("MD5", true, &client_secret, &challenge, "alice");
        assert_eq!(sasl.apply(response.as_bytes()), None);
        assert!(sasl.authenticated());
        assert_eq!(sasl.id(), "alice");
    }

    #[test]
    fn cram_unknown_user_fails() {
        let s = secrets("server plain alice secret\n");
        let mut sasl = SaslServer::new(&s, false, "", "");
        sasl.init(false, "CRAM-MD5");
        assert_eq!(sasl.apply(b"mallory 00000000000000000000000000000000"), None);
        assert!(!sasl.authenticated());
    }

    #[test]
    fn trust_bypass() {
        let s = secrets("server none 192.168.0.0/16 lan-trust\n");
        let mut sasl = SaslServer::new(&s, false, "", "");
        let wildcards = vec![
            "192.168.1.2".to_string(),
            "192.168.1.0/24".to_string(),
            "192.168.0.0/16".to_string(),
        ];
        assert!(sasl.trusted(&wildcards, "192.168.1.2"));
        assert_eq!(sasl.id(), "lan-trust");
        assert!(!sasl.authenticated());
    }

    #[test]
    fn no_trust_match() {
        let s = secrets("server none 192.168.0.0/16 lan-trust\n");
        let mut sasl = SaslServer::new(&s, false, "", "");
        assert!(!sasl.trusted(&["10.0.0.0/8".to_string()], "10.1.2.3"));
        assert_eq!(sasl.id(), "");
    }

    #[test]
    fn reset_clears_dialog_state() {
        let s = secrets("server plain alice secret\n");
        let mut sasl = SaslServer::new(&s, false, "", "");
        sasl.init(false, "PLAIN");
        sasl.apply(b"\0alice\0secret");
        assert!(sasl.authenticated());
        sasl.reset();
        assert!(!sasl.authenticated());
        assert_eq!(sasl.mechanism(), "");
        assert_eq!(sasl.id(), "");
    }

    #[test]
    fn challenges_differ_between_dialogs() {
        let s = secrets("server plain alice secret\n");
        let mut sasl = SaslServer::new(&s, false, "", "relay.example.com");
        sasl.init(false, "CRAM-MD5");
        let c1 = sasl.initial_challenge();
        sasl.init(false, "CRAM-MD5");
        let c2 = sasl.initial_challenge();
        assert_ne!(c1, c2);
    }

    #[test]
    fn preferred_mechanism_prefers_stored_cram_type() {
        let masked = crate::hash::mask(crate::hash::HashType::Md5, b"pencil").unwrap();
        use base64::Engine as _;
        let content = format!(
            "server plain alice pencil\nserver cram-md5 alice {}\n",
            base64::engine::general_purpose::STANDARD.encode(&masked)
        );
        let s = secrets(&content);
        let mut sasl = SaslServer::new(&s, false, "", "");
        sasl.init(false, "PLAIN");
        sasl.apply(b"\0alice\0pencil");
        assert_eq!(sasl.preferred_mechanism(false), "CRAM-MD5");
    }
}
