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

//! The installer: an ordered list of provisioning actions behind a
//! UI-agnostic iteration contract. The front end calls [`Installer::next`]
//! to move to an action, shows its text, calls [`Installer::run`], and
//! shows the outcome; an error stops forward progress but [`Installer::back`]
//! allows a retry. Inputs come as two maps, the page outputs and the
//! platform ivalues, both `%var%` expanded.

pub mod actions;
pub mod batch;

use std::path::{Path, PathBuf};

use crate::mapfile::MapFile;

use self::actions::{
    CreateBatchFile, CreateConfigFile, CreateDirectory, CreateLink, CreateSecretsFile,
    EditConfigFile, GenerateTlsKey, SecretsItem,
};

/// One provisioning step.
pub trait Action {
    /// What is about to happen, e.g. "creating spool directory".
    fn text(&self) -> String;
    /// What it happens to, e.g. the path.
    fn subject(&self) -> String;
    /// The success outcome text.
    fn ok_text(&self) -> String {
        "done".to_string()
    }
    fn run(&mut self) -> Result<(), String>;
}

/// What the front end shows for the current action.
#[derive(Default, Clone)]
pub struct Output {
    pub action: String,
    pub subject: String,
    pub result: String,
    pub error: String,
}

/// The ordered action runner.
pub struct Installer {
    list: Vec<Box<dyn Action>>,
    pos: Option<usize>,
    have_run: bool,
    output: Output,
}

impl Installer {
    pub fn new(list: Vec<Box<dyn Action>>) -> Self {
        Self {
            list,
            pos: None,
            have_run: false,
            output: Output::default(),
        }
    }

    /// Build the standard installation plan from the page outputs and the
    /// platform ivalues.
    pub fn plan(pvalues: &MapFile, ivalues: &MapFile) -> Self {
        let value = |key: &str| ivalues.expand(&pvalues.value(key));
        let yes = |key: &str| {
            let v = value(key);
            v.eq_ignore_ascii_case("y")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("true")
                || v == "1"
        };

        let dir_install = PathBuf::from(value("dir-install"));
        let dir_config = PathBuf::from(value("dir-config"));
        let dir_run = PathBuf::from(value("dir-run"));
        let dir_spool = PathBuf::from(value("dir-spool"));

        let mut list: Vec<Box<dyn Action>> = vec![
            Box::new(CreateDirectory::new("install", &dir_install, false)),
            Box::new(CreateDirectory::new("configuration", &dir_config, true)),
            Box::new(CreateDirectory::new("runtime", &dir_run, false)),
            Box::new(CreateDirectory::new("spool", &dir_spool, false)),
        ];

        let mut secrets = Vec::new();
        let server_name = value("auth-server-name");
        if !server_name.is_empty() {
            secrets.push(plain_secret_item(
                "server",
                &server_name,
                &value("auth-server-password"),
            ));
        }
        let client_name = value("auth-client-name");
        if !client_name.is_empty() {
            secrets.push(plain_secret_item(
                "client",
                &client_name,
                &value("auth-client-password"),
            ));
        }
        let trust_address = value("auth-trust-address");
        if !trust_address.is_empty() {
            secrets.push(SecretsItem {
                key: format!("server none {}", trust_address),
                key2: String::new(),
                line: format!("server none {} trusted", trust_address),
            });
        }
        let auth_file = dir_config.join("staffetta.auth");
        let have_secrets = !secrets.is_empty();
        if have_secrets {
            list.push(Box::new(CreateSecretsFile::new(&auth_file, None, secrets)));
        }

        let config_file = dir_config.join("staffetta.conf");
        list.push(Box::new(CreateConfigFile::new(&config_file, None)));
        let mut config = MapFile::new();
        config.add("spool-dir", &dir_spool.display().to_string());
        config.add("pid-file", &dir_run.join("staffetta.pid").display().to_string());
        for key in ["port", "pop-port", "forward-to"] {
            let v = value(key);
            if !v.is_empty() {
                config.add(key, &v);
            }
        }
        if have_secrets {
            config.add("server-auth", &auth_file.display().to_string());
        }
        list.push(Box::new(EditConfigFile::new(&config_file, config)));

        if yes("gen-tls-key") {
            list.push(Box::new(GenerateTlsKey::new(
                Path::new(&ivalues.value("-keygen")),
                &dir_config.join("staffetta.pem"),
                &value("tls-certificate-name"),
            )));
        }

        let exe = ivalues.value("-exe");
        let batch_path = dir_install.join("staffetta-start.bat");
        list.push(Box::new(CreateBatchFile::new(
            &batch_path,
            vec![exe, format!("--config={}", config_file.display())],
        )));

        if yes("start-link") {
            list.push(Box::new(CreateLink::new(
                &dir_install.join("staffetta-start"),
                &batch_path,
            )));
        }

        Self::new(list)
    }

    /// Move to the next action and expose its text. Returns false when the
    /// list is exhausted.
    pub fn next(&mut self) -> bool {
        self.output = Output::default();
        if self.list.is_empty() {
            return false;
        }
        let next = match self.pos {
            None => 0,
            Some(i) => i + 1,
        };
        if next >= self.list.len() {
            self.pos = None;
            false
        } else {
            self.pos = Some(next);
            self.output.action = self.list[next].text();
            self.output.subject = self.list[next].subject();
            true
        }
    }

    /// Step back to the previous action, e.g. to retry after a failure.
    pub fn back(&mut self) {
        self.output = Output::default();
        if self.list.is_empty() {
            return;
        }
        let previous = match self.pos {
            None => self.list.len() - 1,
            Some(0) => return,
            Some(i) => i - 1,
        };
        self.pos = Some(previous);
        self.output.action = self.list[previous].text();
        self.output.subject = self.list[previous].subject();
    }

    /// Run the current action, capturing success text or the error.
    pub fn run(&mut self) {
        if let Some(i) = self.pos {
            self.output.action = self.list[i].text();
            self.output.subject = self.list[i].subject();
            match self.list[i].run() {
                Ok(()) => {
                    self.output.result = self.list[i].ok_text();
                    self.output.error.clear();
                    log::info!("install: {}: {}: {}", self.output.action, self.output.subject, self.output.result);
                }
                Err(e) => {
                    self.output.error = e;
                    log::warn!("install: {}: {}: {}", self.output.action, self.output.subject, self.output.error);
                }
            }
            self.have_run = true;
        }
    }

    /// True once a run has failed; forward progress should stop.
    pub fn failed(&self) -> bool {
        self.have_run && !self.output.error.is_empty()
    }

    /// True when iteration is past the last action (or before the first
    /// call to [`Installer::next`]).
    pub fn done(&self) -> bool {
        self.pos.is_none()
    }

    pub fn output(&self) -> &Output {
        &self.output
    }
}

fn plain_secret_item(side: &str, name: &str, password: &str) -> SecretsItem {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    SecretsItem {
        key: format!("{} plain {}", side, crate::xtext::encode(name.as_bytes())),
        key2: format!("{} plain:b {}", side, BASE64.encode(name.as_bytes())),
        line: format!(
            "{} plain {} {}",
            side,
            crate::xtext::encode(name.as_bytes()),
            crate::xtext::encode(password.as_bytes())
        ),
    }
}
