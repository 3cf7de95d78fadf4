/*
 * install.rs
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

//! Service registration: a start-stop script in the init directory that
//! launches and terminates the wrapper.

use std::fs;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Where start-stop scripts go unless overridden.
pub fn default_script_dir() -> PathBuf {
    PathBuf::from("/etc/init.d")
}

fn script_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
}

/// Write the start-stop script for this wrapper executable.
pub fn install(dir: &Path, name: &str, display_name: &str, exe: &Path) -> Result<PathBuf, String> {
    let path = script_path(dir, name);
    let pid_file = format!("/var/run/{}-wrapper.pid", name);
    let script = format!(
        "#!/bin/sh\n\
         ### BEGIN INIT INFO\n\
         # Provides:          {name}\n\
         # Default-Start:     2 3 4 5\n\
         # Default-Stop:      0 1 6\n\
         # Short-Description: {display_name}\n\
         ### END INIT INFO\n\
         \n\
         WRAPPER=\"{exe}\"\n\
         PID_FILE=\"{pid_file}\"\n\
         \n\
         case \"$1\" in\n\
         \tstart)\n\
         \t\t\"$WRAPPER\" &\n\
         \t\techo $! > \"$PID_FILE\"\n\
         \t\t;;\n\
         \tstop)\n\
         \t\tif [ -f \"$PID_FILE\" ]\n\
         \t\tthen\n\
         \t\t\tkill \"$(cat \"$PID_FILE\")\" && rm -f \"$PID_FILE\"\n\
         \t\tfi\n\
         \t\t;;\n\
         \t*)\n\
         \t\techo \"usage: $0 {{start|stop}}\" >&2\n\
         \t\texit 2\n\
         \t\t;;\n\
         esac\n",
        name = name,
        display_name = display_name,
        exe = exe.display(),
        pid_file = pid_file,
    );
    fs::write(&path, script).map_err(|e| format!("cannot write {}: {}", path.display(), e))?;
    #[cfg(unix)]
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .map_err(|e| format!("cannot chmod {}: {}", path.display(), e))?;
    Ok(path)
}

/// Remove the start-stop script. Removing a script that is not there is
/// not an error.
pub fn remove(dir: &Path, name: &str) -> Result<(), String> {
    let path = script_path(dir, name);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(format!("cannot remove {}: {}", path.display(), e)),
    }
}
