/*
 * mapfile.rs
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

//! Simple key/value configuration files: one `key=value` (or `key value`)
//! pair per line, `#` comments. Used for the wrapper's sibling `.cfg` file
//! and the relay configuration written by the installer.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

/// An ordered map of configuration entries.
#[derive(Default, Clone)]
pub struct MapFile {
    map: BTreeMap<String, String>,
}

impl MapFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from text. The separator is the first `=`, or the first run of
    /// whitespace if there is no `=`. A key with neither holds an empty
    /// value.
    pub fn parse(content: &str) -> Self {
        let mut map = BTreeMap::new();
        for raw in content.lines() {
            let line = raw.trim().trim_start_matches('\u{feff}');
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = match line.split_once('=') {
                Some((k, v)) => (k, v),
                None => line.split_once(char::is_whitespace).unwrap_or((line, "")),
            };
            map.insert(key.trim().to_string(), value.trim().to_string());
        }
        Self { map }
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    pub fn add(&mut self, key: &str, value: &str) {
        self.map.insert(key.to_string(), value.to_string());
    }

    pub fn remove(&mut self, key: &str) {
        self.map.remove(key);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// The value for the key, or the empty string.
    pub fn value(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_string()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Replace `%name%` markers with map values; unknown names are left
    /// alone so later expansion passes can pick them up.
    pub fn expand(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find('%') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            match after.find('%') {
                Some(end) => {
                    let name = &after[..end];
                    match self.get(name) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('%');
                            out.push_str(name);
                            out.push('%');
                        }
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push('%');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Serialise as `key=value` lines, with an optional leading comment.
    pub fn to_text(&self, header: &str) -> String {
        let mut out = String::new();
        if !header.is_empty() {
            for line in header.lines() {
                out.push_str("# ");
                out.push_str(line);
                out.push('\n');
            }
        }
        for (key, value) in &self.map {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    pub fn save(&self, path: &Path, header: &str) -> io::Result<()> {
        fs::write(path, self.to_text(header))
    }
}
