/*
 * secrets.rs
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

//! The secrets store: credentials loaded from a text file of
//! `<side> <type> <id-or-wildcard> <payload>` lines.
//!
//! `side` is `server` or `client`. `type` is `plain`, `plain:b` (base64 id
//! and payload), `oauth`, a masked digest tag (`md5`, `cram-md5`,
//! `cram-sha1`, ...), or `none` for address-based trust. Ids and plaintext
//! payloads are xtext; masked payloads are base64 state pairs. Client lines
//! may carry a trailing selector token naming an alternative identity.
//! Comments start with `#`. Reading never mutates; lookups that miss return
//! the invalid [`Secret`] sentinel. Duplicate keys: last line wins.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::auth::secret::Secret;
use crate::hash::HashType;
use crate::xtext;

struct Entry {
    id: String,
    value: Vec<u8>,
    hash_function: String,
    line: usize,
}

/// An immutable collection of [`Secret`] records keyed by (side, type, id).
pub struct SecretsFile {
    name: String,
    map: HashMap<String, Entry>,
    server_types: HashSet<String>,
}

/// Fold a type tag to its storage form: `plain`, `oauth`, `none`, or the
/// lowercase digest name with any `cram-` prefix stripped.
fn canonical_type(type_tag: &str) -> String {
    let lower = type_tag.trim().to_lowercase();
    if lower == "plain:b" {
        return "plain".to_string();
    }
    let bare = lower.strip_prefix("cram-").unwrap_or(&lower);
    match HashType::from_name(bare) {
        Some(hash) => hash.name().to_lowercase(),
        None => lower,
    }
}

impl SecretsFile {
    /// Read and parse the secrets file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        Ok(Self::parse(&content, &path.display().to_string()))
    }

    /// Parse secrets from text. `name` is used in log lines and in
    /// [`Secret::info`] context strings.
    pub fn parse(content: &str, name: &str) -> Self {
        let mut this = Self {
            name: name.to_string(),
            map: HashMap::new(),
            server_types: HashSet::new(),
        };
        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Err(why) = this.process(line, index + 1) {
                log::warn!("{}: ignoring line {}: {}", name, index + 1, why);
            }
        }
        this
    }

    /// True if the file yielded at least one usable record.
    pub fn valid(&self) -> bool {
        !self.map.is_empty()
    }

    fn process(&mut self, line: &str, line_number: usize) -> Result<(), String> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let side = words
            .first()
            .map(|w| w.to_lowercase())
            .unwrap_or_default();
        let is_client = side == "client";
        if side != "server" && !is_client {
            return Err(format!("unknown side [{}]", side));
        }
        if words.len() != 4 && !(is_client && words.len() == 5) {
            return Err("wrong number of fields".to_string());
        }

        let type_tag = words[1].to_lowercase();
        let ctype = canonical_type(&type_tag);

        if ctype == "none" {
            if is_client {
                return Err("trust entries are server-side only".to_string());
            }
            // third field is an address wildcard, fourth a trust keyword
            let wildcard = words[2].to_string();
            let keyword = words[3].to_string();
            self.map.insert(
                format!("none:{}", wildcard),
                Entry {
                    id: keyword,
                    value: Vec::new(),
                    hash_function: String::new(),
                    line: line_number,
                },
            );
            self.server_types.insert("none".to_string());
            return Ok(());
        }

        let base64_fields = type_tag == "plain:b";
        let id_bytes = if base64_fields {
            BASE64
                .decode(words[2])
                .map_err(|_| "bad base64 id".to_string())?
        } else {
            xtext::decode(words[2]).map_err(|e| e.to_string())?
        };
        let id = String::from_utf8(id_bytes).map_err(|_| "id is not utf-8".to_string())?;
        if id.is_empty() {
            return Err("empty id".to_string());
        }

        let (value, hash_function) = match ctype.as_str() {
            "plain" | "oauth" => {
                let value = if base64_fields {
                    BASE64
                        .decode(words[3])
                        .map_err(|_| "bad base64 payload".to_string())?
                } else {
                    xtext::decode(words[3]).map_err(|e| e.to_string())?
                };
                (value, String::new())
            }
            _ => {
                let hash = HashType::from_name(&ctype)
                    .ok_or_else(|| format!("unknown secret type [{}]", type_tag))?;
                let value = BASE64
                    .decode(words[3])
                    .map_err(|_| "bad base64 masked payload".to_string())?;
                if value.len() != 2 * hash.value_size() {
                    return Err(format!("wrong masked payload size for {}", hash.name()));
                }
                (value, hash.name().to_string())
            }
        };

        let key = if is_client {
            let selector = words.get(4).copied().unwrap_or("");
            client_key(&ctype, selector)
        } else {
            format!("{}:{}", ctype, xtext::encode(id.as_bytes()))
        };
        if !is_client {
            self.server_types.insert(ctype);
        }
        self.map.insert(
            key,
            Entry {
                id,
                value,
                hash_function,
                line: line_number,
            },
        );
        Ok(())
    }

    fn context(&self, entry: &Entry) -> String {
        format!("line {} of {}", entry.line, self.name)
    }

    fn to_secret(&self, entry: &Entry) -> Secret {
        if entry.hash_function.is_empty() {
            Secret::new_plain(entry.id.clone(), entry.value.clone(), self.context(entry))
        } else {
            Secret::new_masked(
                entry.id.clone(),
                entry.value.clone(),
                entry.hash_function.clone(),
                self.context(entry),
            )
        }
    }

    /// True if any server-side secret of the given type exists (empty id),
    /// or if the specific (type, id) record exists.
    pub fn contains(&self, type_tag: &str, id: &str) -> bool {
        let ctype = canonical_type(type_tag);
        if id.is_empty() {
            self.server_types.contains(&ctype)
        } else {
            self.map
                .contains_key(&format!("{}:{}", ctype, xtext::encode(id.as_bytes())))
        }
    }

    /// The server-side secret for authenticating a remote client.
    pub fn server_secret(&self, type_tag: &str, id: &str) -> Secret {
        let ctype = canonical_type(type_tag);
        let key = format!("{}:{}", ctype, xtext::encode(id.as_bytes()));
        match self.map.get(&key) {
            Some(entry) => self.to_secret(entry),
            None => Secret::none(),
        }
    }

    /// The client-side secret for authenticating with a remote server.
    /// There is at most one per (type, selector).
    pub fn client_secret(&self, type_tag: &str, selector: &str) -> Secret {
        let ctype = canonical_type(type_tag);
        match self.map.get(&client_key(&ctype, selector)) {
            Some(entry) => self.to_secret(entry),
            None => Secret::none(),
        }
    }

    /// Match an address wildcard against the trust entries. Returns the
    /// trustee keyword and a context description; an empty trustee means no
    /// match.
    pub fn server_trust(&self, address_wildcard: &str) -> (String, String) {
        match self.map.get(&format!("none:{}", address_wildcard)) {
            Some(entry) => (entry.id.clone(), self.context(entry)),
            None => (String::new(), String::new()),
        }
    }

    /// True if any client secret exists for the selector.
    pub fn valid_selector(&self, selector: &str) -> bool {
        if selector.is_empty() {
            return true;
        }
        self.map
            .keys()
            .any(|k| k.ends_with(&format!(" client {}", selector)))
    }

    /// True if the store obliges the client side to authenticate, i.e. any
    /// client secret exists for the selector.
    pub fn must_authenticate(&self, selector: &str) -> bool {
        ["plain", "oauth", "md5", "sha1", "sha256"]
            .iter()
            .any(|t| self.client_secret(t, selector).valid())
    }
}

fn client_key(ctype: &str, selector: &str) -> String {
    if selector.is_empty() {
        format!("{} client", ctype)
    } else {
        format!("{} client {}", ctype, selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash;

    fn store(content: &str) -> SecretsFile {
        SecretsFile::parse(content, "test")
    }

    #[test]
    fn parses_server_plain() {
        let s = store("# comment\nserver plain alice secret\n");
        assert!(s.valid());
        assert!(s.contains("plain", ""));
        assert!(s.contains("plain", "alice"));
        let secret = s.server_secret("plain", "alice");
        assert!(secret.valid());
        assert!(!secret.masked());
        assert_eq!(secret.secret(), b"secret");
        assert_eq!(secret.id(), "alice");
    }

    #[test]
    fn missing_lookup_is_invalid_sentinel() {
        let s = store("server plain alice secret\n");
        assert!(!s.server_secret("plain", "bob").valid());
        assert!(!s.client_secret("plain", "").valid());
    }

    #[test]
    fn type_tags_are_case_insensitive() {
        let s = store("server PLAIN alice secret\n");
        assert!(s.contains("Plain", "alice"));
        assert!(s.server_secret("PLAIN", "alice").valid());
    }

    #[test]
    fn xtext_ids_decode() {
        let s = store("server plain alice+40example.com secret+20word\n");
        let secret = s.server_secret("plain", "alice@example.com");
        assert!(secret.valid());
        assert_eq!(secret.secret(), b"secret word");
    }

    #[test]
    fn base64_variant_lines() {
        // "bob" / "pwd" in base64
        let s = store("server plain:b Ym9i cHdk\n");
        let secret = s.server_secret("plain", "bob");
        assert!(secret.valid());
        assert_eq!(secret.secret(), b"pwd");
    }

    #[test]
    fn masked_md5_line() {
        let masked = hash::mask(hash::HashType::Md5, b"pencil").unwrap();
        let line = format!(
            "server cram-md5 alice {}\n",
            base64::engine::general_purpose::STANDARD.encode(&masked)
        );
        let s = store(&line);
        let secret = s.server_secret("MD5", "alice");
        assert!(secret.valid());
        assert!(secret.masked());
        assert_eq!(secret.mask_hash_function(), "MD5");
        assert_eq!(secret.secret(), masked.as_slice());
        // the bare "md5" tag is an alias
        assert!(s.contains("md5", "alice"));
    }

    #[test]
    fn masked_payload_with_wrong_size_is_skipped() {
        let s = store("server cram-md5 alice AAAA\n");
        assert!(!s.server_secret("MD5", "alice").valid());
        assert!(!s.valid());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let s = store("server plain alice\nnonsense\nserver plain bob pw\n");
        assert!(!s.contains("plain", "alice"));
        assert!(s.contains("plain", "bob"));
    }

    #[test]
    fn duplicate_key_last_wins() {
        let s = store("server plain alice first\nserver plain alice second\n");
        assert_eq!(s.server_secret("plain", "alice").secret(), b"second");
    }

    #[test]
    fn client_secret_with_and_without_selector() {
        let s = store("client plain alice pw1\nclient plain carol pw2 backup\n");
        assert_eq!(s.client_secret("plain", "").id(), "alice");
        assert_eq!(s.client_secret("plain", "backup").id(), "carol");
        assert!(!s.client_secret("plain", "nosuch").valid());
        assert!(s.valid_selector(""));
        assert!(s.valid_selector("backup"));
        assert!(!s.valid_selector("nosuch"));
        assert!(s.must_authenticate(""));
    }

    #[test]
    fn trust_entries() {
        let s = store("server none 192.168.0.0/16 lan-trust\n");
        let (trustee, context) = s.server_trust("192.168.0.0/16");
        assert_eq!(trustee, "lan-trust");
        assert!(context.contains("line 1"));
        let (trustee, _) = s.server_trust("10.0.0.0/8");
        assert!(trustee.is_empty());
    }

    #[test]
    fn oauth_client_secret() {
        let s = store("client oauth alice@example.com bearer+2Dtoken\n");
        let secret = s.client_secret("oauth", "");
        assert!(secret.valid());
        assert_eq!(secret.secret(), b"bearer-token");
    }

    #[test]
    fn load_from_file() {
        let path = std::env::temp_dir().join(format!("staffetta-secrets-{}", std::process::id()));
        fs::write(&path, "server plain alice secret\n").unwrap();
        let s = SecretsFile::load(&path).unwrap();
        assert!(s.contains("plain", "alice"));
        let secret = s.server_secret("plain", "alice");
        assert!(secret.info("").contains(&path.display().to_string()));
        let _ = fs::remove_file(&path);
    }
}
