/*
 * batch.rs
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

//! One-line start files: the installer writes the relay command line into
//! `<name>-start.bat` and the service wrapper reads it back. The format is
//! a single command line; `@echo off` prefixes, `rem` comments, and a
//! UTF-8 byte-order mark are tolerated on read, and double quotes group
//! arguments containing spaces.

use std::fs;
use std::io;
use std::path::Path;

/// Read the command line from a start file and split it into arguments.
pub fn read_command(path: &Path) -> io::Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    for raw in content.lines() {
        let line = raw.trim_start_matches('\u{feff}').trim();
        if line.is_empty() {
            continue;
        }
        let lower = line.to_lowercase();
        if lower == "@echo off" || lower.starts_with("rem ") || lower.starts_with("::") {
            continue;
        }
        let args = split_command(line);
        if !args.is_empty() {
            return Ok(args);
        }
    }
    Err(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("no command line in {}", path.display()),
    ))
}

/// Write a command line, quoting arguments that need it.
pub fn write_command(path: &Path, args: &[String]) -> io::Result<()> {
    let line = args
        .iter()
        .map(|a| quote(a))
        .collect::<Vec<String>>()
        .join(" ");
    fs::write(path, format!("{}\n", line))
}

fn quote(arg: &str) -> String {
    if arg.is_empty() || arg.contains(' ') || arg.contains('\t') {
        format!("\"{}\"", arg)
    } else {
        arg.to_string()
    }
}

/// Split on whitespace, honouring double quotes.
fn split_command(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut seen = false;
    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                seen = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if seen {
                    args.push(std::mem::take(&mut current));
                    seen = false;
                }
            }
            c => {
                current.push(c);
                seen = true;
            }
        }
    }
    if seen {
        args.push(current);
    }
    args
}
