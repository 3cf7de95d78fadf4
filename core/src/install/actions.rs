/*
 * actions.rs
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

//! The individual provisioning actions run by the installer.

use std::fs;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use crate::install::batch;
use crate::install::Action;
use crate::mapfile::MapFile;

fn io_err(what: &str, e: std::io::Error) -> String {
    format!("{}: {}", what, e)
}

/// Create a directory (and parents). `tight` restricts it to the owner.
pub struct CreateDirectory {
    display_name: String,
    path: PathBuf,
    tight: bool,
}

impl CreateDirectory {
    pub fn new(display_name: &str, path: &Path, tight: bool) -> Self {
        Self {
            display_name: display_name.to_string(),
            path: path.to_path_buf(),
            tight,
        }
    }
}

impl Action for CreateDirectory {
    fn text(&self) -> String {
        format!("creating {} directory", self.display_name)
    }

    fn subject(&self) -> String {
        self.path.display().to_string()
    }

    fn ok_text(&self) -> String {
        if self.path.is_dir() {
            "exists".to_string()
        } else {
            "created".to_string()
        }
    }

    fn run(&mut self) -> Result<(), String> {
        fs::create_dir_all(&self.path).map_err(|e| io_err("mkdir", e))?;
        #[cfg(unix)]
        if self.tight {
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o700))
                .map_err(|e| io_err("chmod", e))?;
        }
        Ok(())
    }
}

/// Copy one file, overwriting the destination.
pub struct CopyFile {
    src: PathBuf,
    dst: PathBuf,
}

impl CopyFile {
    pub fn new(src: &Path, dst: &Path) -> Self {
        Self {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
        }
    }
}

impl Action for CopyFile {
    fn text(&self) -> String {
        "copying file".to_string()
    }

    fn subject(&self) -> String {
        format!("{} -> {}", self.src.display(), self.dst.display())
    }

    fn run(&mut self) -> Result<(), String> {
        fs::copy(&self.src, &self.dst).map_err(|e| io_err("copy", e))?;
        Ok(())
    }
}

/// One replace-or-append edit to the secrets file. `key` (and the optional
/// `key2` alias) is the `<side> <type> <id>` prefix that identifies the
/// line to replace; `line` is the full replacement.
pub struct SecretsItem {
    pub key: String,
    pub key2: String,
    pub line: String,
}

/// Create or update the secrets file, preserving comments and unrelated
/// lines: a line whose `<side> <type> <id>` prefix matches an item is
/// replaced, otherwise the item is appended.
pub struct CreateSecretsFile {
    path: PathBuf,
    template: Option<PathBuf>,
    items: Vec<SecretsItem>,
}

impl CreateSecretsFile {
    pub fn new(path: &Path, template: Option<&Path>, items: Vec<SecretsItem>) -> Self {
        Self {
            path: path.to_path_buf(),
            template: template.map(Path::to_path_buf),
            items,
        }
    }

    fn default_header() -> Vec<String> {
        [
            "#",
            "# staffetta.auth",
            "#",
            "# client plain <name(xtext)> <password(xtext)>",
            "# client plain:b <name(base64)> <password(base64)>",
            "# server plain <name(xtext)> <password(xtext)>",
            "# server cram-md5 <name(xtext)> <masked-password(base64)>",
            "# server none <address-range> <trust-keyword>",
            "#",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn matches(line: &str, key: &str) -> bool {
        if key.is_empty() || line.trim_start().starts_with('#') {
            return false;
        }
        let line_words: Vec<&str> = line.split_whitespace().collect();
        let key_words: Vec<&str> = key.split_whitespace().collect();
        line_words.len() >= key_words.len()
            && line_words
                .iter()
                .zip(key_words.iter())
                .all(|(a, b)| a.eq_ignore_ascii_case(*b))
    }
}

impl Action for CreateSecretsFile {
    fn text(&self) -> String {
        "updating authentication secrets".to_string()
    }

    fn subject(&self) -> String {
        self.path.display().to_string()
    }

    fn run(&mut self) -> Result<(), String> {
        let mut lines: Vec<String> = match fs::read_to_string(&self.path) {
            Ok(content) => content.lines().map(|l| l.trim_end_matches('\r').to_string()).collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(io_err("read", e)),
        };
        if lines.is_empty() {
            lines = match &self.template {
                Some(template) if template.exists() => fs::read_to_string(template)
                    .map_err(|e| io_err("read template", e))?
                    .lines()
                    .map(|l| l.trim_end_matches('\r').to_string())
                    .collect(),
                _ => Self::default_header(),
            };
        }
        for item in &self.items {
            let replaced = lines
                .iter_mut()
                .find(|l| Self::matches(l, &item.key) || Self::matches(l, &item.key2));
            match replaced {
                Some(line) => *line = item.line.clone(),
                None => lines.push(item.line.clone()),
            }
        }
        let mut content = lines.join("\n");
        content.push('\n');
        fs::write(&self.path, content).map_err(|e| io_err("write", e))?;
        #[cfg(unix)]
        fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))
            .map_err(|e| io_err("chmod", e))?;
        Ok(())
    }
}

/// Create the relay configuration file if missing, from a template when
/// one is given.
pub struct CreateConfigFile {
    path: PathBuf,
    template: Option<PathBuf>,
}

impl CreateConfigFile {
    pub fn new(path: &Path, template: Option<&Path>) -> Self {
        Self {
            path: path.to_path_buf(),
            template: template.map(Path::to_path_buf),
        }
    }
}

impl Action for CreateConfigFile {
    fn text(&self) -> String {
        "creating configuration file".to_string()
    }

    fn subject(&self) -> String {
        self.path.display().to_string()
    }

    fn ok_text(&self) -> String {
        if self.path.exists() {
            "exists".to_string()
        } else {
            "created".to_string()
        }
    }

    fn run(&mut self) -> Result<(), String> {
        if self.path.exists() {
            return Ok(());
        }
        match &self.template {
            Some(template) if template.exists() => {
                fs::copy(template, &self.path).map_err(|e| io_err("copy template", e))?;
            }
            _ => {
                fs::write(&self.path, "# staffetta relay configuration\n")
                    .map_err(|e| io_err("write", e))?;
            }
        }
        Ok(())
    }
}

/// Merge entries into the configuration file, keeping existing comments
/// and unrelated keys.
pub struct EditConfigFile {
    path: PathBuf,
    changes: MapFile,
}

impl EditConfigFile {
    pub fn new(path: &Path, changes: MapFile) -> Self {
        Self {
            path: path.to_path_buf(),
            changes,
        }
    }
}

impl Action for EditConfigFile {
    fn text(&self) -> String {
        "editing configuration file".to_string()
    }

    fn subject(&self) -> String {
        self.path.display().to_string()
    }

    fn run(&mut self) -> Result<(), String> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(io_err("read", e)),
        };
        let mut lines: Vec<String> = content
            .lines()
            .map(|l| l.trim_end_matches('\r').to_string())
            .collect();
        for (key, value) in self.changes.iter() {
            let mut replaced = false;
            for line in lines.iter_mut() {
                let trimmed = line.trim_start();
                if trimmed.starts_with('#') {
                    continue;
                }
                let line_key = trimmed
                    .split(|c: char| c == '=' || c.is_whitespace())
                    .next()
                    .unwrap_or("");
                if line_key == key {
                    *line = format!("{}={}", key, value);
                    replaced = true;
                    break;
                }
            }
            if !replaced {
                lines.push(format!("{}={}", key, value));
            }
        }
        let mut new_content = lines.join("\n");
        new_content.push('\n');
        fs::write(&self.path, new_content).map_err(|e| io_err("write", e))
    }
}

/// Write the one-line start file the service wrapper reads.
pub struct CreateBatchFile {
    path: PathBuf,
    args: Vec<String>,
}

impl CreateBatchFile {
    pub fn new(path: &Path, args: Vec<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            args,
        }
    }
}

impl Action for CreateBatchFile {
    fn text(&self) -> String {
        "creating start file".to_string()
    }

    fn subject(&self) -> String {
        self.path.display().to_string()
    }

    fn run(&mut self) -> Result<(), String> {
        batch::write_command(&self.path, &self.args).map_err(|e| io_err("write", e))
    }
}

/// Generate a TLS server key and certificate by running an external helper
/// with the output path and certificate name as its arguments.
pub struct GenerateTlsKey {
    helper: PathBuf,
    out: PathBuf,
    certificate_name: String,
}

impl GenerateTlsKey {
    pub fn new(helper: &Path, out: &Path, certificate_name: &str) -> Self {
        Self {
            helper: helper.to_path_buf(),
            out: out.to_path_buf(),
            certificate_name: certificate_name.to_string(),
        }
    }
}

impl Action for GenerateTlsKey {
    fn text(&self) -> String {
        "generating tls server key".to_string()
    }

    fn subject(&self) -> String {
        self.out.display().to_string()
    }

    fn run(&mut self) -> Result<(), String> {
        if self.out.exists() {
            return Ok(());
        }
        let status = std::process::Command::new(&self.helper)
            .arg(&self.out)
            .arg(&self.certificate_name)
            .status()
            .map_err(|e| io_err("run key helper", e))?;
        if status.success() {
            Ok(())
        } else {
            Err(format!("key helper failed with {}", status))
        }
    }
}

/// Create (or replace) a symbolic link. A no-op on platforms without
/// symlinks.
pub struct CreateLink {
    link: PathBuf,
    target: PathBuf,
}

impl CreateLink {
    pub fn new(link: &Path, target: &Path) -> Self {
        Self {
            link: link.to_path_buf(),
            target: target.to_path_buf(),
        }
    }
}

impl Action for CreateLink {
    fn text(&self) -> String {
        "creating start link".to_string()
    }

    fn subject(&self) -> String {
        self.link.display().to_string()
    }

    fn run(&mut self) -> Result<(), String> {
        #[cfg(unix)]
        {
            let _ = fs::remove_file(&self.link);
            std::os::unix::fs::symlink(&self.target, &self.link)
                .map_err(|e| io_err("symlink", e))
        }
        #[cfg(not(unix))]
        {
            let _ = &self.target;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "staffetta-actions-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn create_directory() {
        let dir = temp_dir("mkdir");
        let target = dir.join("spool/incoming");
        let mut action = CreateDirectory::new("spool", &target, false);
        assert!(action.run().is_ok());
        assert!(target.is_dir());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn secrets_edit_preserves_comments_and_replaces_matches() {
        let dir = temp_dir("secrets");
        let path = dir.join("staffetta.auth");
        fs::write(
            &path,
            "# keep this comment\nserver plain alice oldpw\nserver none 127.0.0.1 localhost\n",
        )
        .unwrap();
        let items = vec![
            SecretsItem {
                key: "server plain alice".to_string(),
                key2: "server plain:b YWxpY2U=".to_string(),
                line: "server plain alice newpw".to_string(),
            },
            SecretsItem {
                key: "client plain".to_string(),
                key2: String::new(),
                line: "client plain relay forwardpw".to_string(),
            },
        ];
        let mut action = CreateSecretsFile::new(&path, None, items);
        assert!(action.run().is_ok());
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# keep this comment\n"));
        assert!(content.contains("server plain alice newpw"));
        assert!(!content.contains("oldpw"));
        assert!(content.contains("server none 127.0.0.1 localhost"));
        assert!(content.ends_with("client plain relay forwardpw\n"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn secrets_file_created_with_header_when_missing() {
        let dir = temp_dir("secrets-new");
        let path = dir.join("staffetta.auth");
        let items = vec![SecretsItem {
            key: "server plain alice".to_string(),
            key2: String::new(),
            line: "server plain alice pw".to_string(),
        }];
        let mut action = CreateSecretsFile::new(&path, None, items);
        assert!(action.run().is_ok());
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("#\n# staffetta.auth\n"));
        assert!(content.contains("server plain alice pw"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn config_edit_replaces_and_appends() {
        let dir = temp_dir("conf");
        let path = dir.join("staffetta.conf");
        fs::write(&path, "# relay config\nport=25\nspool-dir=/old\n").unwrap();
        let mut changes = MapFile::new();
        changes.add("spool-dir", "/var/spool/staffetta");
        changes.add("forward-to", "smarthost.example.net:587");
        let mut action = EditConfigFile::new(&path, changes);
        assert!(action.run().is_ok());
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("# relay config"));
        assert!(content.contains("port=25"));
        assert!(content.contains("spool-dir=/var/spool/staffetta"));
        assert!(content.contains("forward-to=smarthost.example.net:587"));
        assert!(!content.contains("/old"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn batch_file_action_roundtrips() {
        let dir = temp_dir("batch");
        let path = dir.join("staffetta-start.bat");
        let args = vec!["/opt/staffetta/bin/staffetta".to_string(), "--no-daemon".to_string()];
        let mut action = CreateBatchFile::new(&path, args.clone());
        assert!(action.run().is_ok());
        assert_eq!(batch::read_command(&path).unwrap(), args);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn failed_key_helper_reports_error() {
        let dir = temp_dir("keygen");
        let out = dir.join("server.pem");
        let mut action = GenerateTlsKey::new(Path::new("/no/such/helper"), &out, "CN=relay");
        assert!(action.run().is_err());
        let _ = fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn create_link() {
        let dir = temp_dir("link");
        let target = dir.join("target.txt");
        fs::write(&target, "x").unwrap();
        let link = dir.join("link.txt");
        let mut action = CreateLink::new(&link, &target);
        assert!(action.run().is_ok());
        assert_eq!(fs::read_to_string(&link).unwrap(), "x");
        let _ = fs::remove_dir_all(&dir);
    }
}
