/*
 * supervisor.rs
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

//! The supervision loop: spawn the relay with the command line from its
//! start file, probe its liveness on a short cycle, and terminate it on
//! shutdown. The invariant is that the child is running exactly while the
//! reported state is `Running`.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use staffetta_core::install::batch;
use staffetta_core::mapfile::MapFile;

/// Liveness probe cycle.
const PROBE_INTERVAL: Duration = Duration::from_secs(3);
/// Probes that must pass before the service counts as started; with the
/// probe cycle this gives roughly an eight second startup window.
const STARTUP_PROBES: u32 = 2;
/// Grace period between a polite terminate and a hard kill.
const STOP_GRACE: Duration = Duration::from_secs(3);

/// The reported service state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    StartPending,
    Running,
    Stopped,
}

/// The start file for the named service: `<name>-start.bat` next to the
/// wrapper executable, unless a sibling `<exe>.cfg` names a different
/// directory with its `dir-config` entry.
pub fn start_file(exe: &Path, name: &str) -> PathBuf {
    let exe_dir = exe.parent().unwrap_or_else(|| Path::new("."));
    let mut dir = exe_dir.to_path_buf();
    let cfg = exe.with_extension("cfg");
    if let Ok(map) = MapFile::load(&cfg) {
        let configured = map.value("dir-config");
        if !configured.is_empty() {
            dir = PathBuf::from(configured);
        }
    }
    dir.join(format!("{}-start.bat", name))
}

/// Supervise the relay: spawn it from the start file and run until it dies
/// or the shutdown future completes. On shutdown the child is terminated
/// politely, then killed.
pub async fn supervise<F>(start_file: &Path, name: &str, shutdown: F) -> Result<(), String>
where
    F: Future<Output = ()>,
{
    let mut args = batch::read_command(start_file)
        .map_err(|e| format!("cannot read start file: {}", e))?;
    if !args.iter().any(|a| a == "--no-daemon") {
        args.push("--no-daemon".to_string());
    }

    let mut state = ServiceState::StartPending;
    log::info!("service [{}]: start pending: [{}]", name, args.join(" "));
    let mut child = tokio::process::Command::new(&args[0])
        .args(&args[1..])
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("cannot spawn [{}]: {}", args[0], e))?;

    tokio::pin!(shutdown);
    let mut probes = 0u32;
    loop {
        tokio::select! {
            status = child.wait() => {
                let detail = match status {
                    Ok(s) => s.to_string(),
                    Err(e) => e.to_string(),
                };
                let was_running = state == ServiceState::Running;
                state = ServiceState::Stopped;
                log::warn!("service [{}]: stopped: child exited: {}", name, detail);
                return Err(if was_running {
                    format!("relay process exited: {}", detail)
                } else {
                    format!("relay process failed to start: {}", detail)
                });
            }
            _ = tokio::time::sleep(PROBE_INTERVAL) => {
                // the child is still running, or wait() would have won
                if state == ServiceState::StartPending {
                    probes += 1;
                    if probes >= STARTUP_PROBES {
                        state = ServiceState::Running;
                        log::info!("service [{}]: running", name);
                    }
                }
            }
            _ = &mut shutdown => {
                log::info!("service [{}]: stop requested", name);
                stop_child(&mut child).await;
                log::info!("service [{}]: stopped", name);
                return Ok(());
            }
        }
    }
}

/// Terminate the child: polite signal first, hard kill after the grace
/// period.
async fn stop_child(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
        if tokio::time::timeout(STOP_GRACE, child.wait()).await.is_ok() {
            return;
        }
        log::warn!("relay process ignored the terminate signal");
    }
    let _ = child.kill().await;
    let _ = child.wait().await;
}
