/*
 * main.rs
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

//! The service wrapper. With no arguments it supervises the relay process,
//! reading the command line from the sibling start file; `--install` and
//! `--remove` manage the start-stop script. Exit codes: 0 success, 1
//! error, 2 help.

mod install;
mod supervisor;

fn usage(program: &str) -> String {
    format!(
        "usage: {} [{{--help|--install|--remove}}] [<name> [<display-name>]]",
        program
    )
}

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();
    std::process::exit(run(&args));
}

fn run(args: &[String]) -> i32 {
    let program = args.first().map(String::as_str).unwrap_or("staffetta-service");
    let arg1 = args.get(1).map(|s| s.to_lowercase()).unwrap_or_default();
    let name = args.get(2).cloned().unwrap_or_else(|| "staffetta".to_string());
    let display_name = args
        .get(3)
        .cloned()
        .unwrap_or_else(|| "Staffetta Mail Relay".to_string());

    let help = matches!(arg1.as_str(), "--help" | "-h" | "-?" | "/?");
    let install = matches!(arg1.as_str(), "--install" | "-install" | "/install");
    let remove = matches!(
        arg1.as_str(),
        "--remove" | "-remove" | "/remove" | "--uninstall" | "-uninstall" | "/uninstall"
    );

    if help {
        println!("{}", usage(program));
        return 2;
    }
    if !arg1.is_empty() && !install && !remove {
        eprintln!("{}: unknown option [{}]", program, arg1);
        eprintln!("{}", usage(program));
        return 1;
    }

    if install {
        let exe = match std::env::current_exe() {
            Ok(exe) => exe,
            Err(e) => {
                eprintln!("{}: cannot resolve executable path: {}", program, e);
                return 1;
            }
        };
        return match install::install(&install::default_script_dir(), &name, &display_name, &exe)
        {
            Ok(path) => {
                println!("installed {}", path.display());
                0
            }
            Err(e) => {
                eprintln!("{}: {}", program, e);
                1
            }
        };
    }
    if remove {
        return match install::remove(&install::default_script_dir(), &name) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("{}: {}", program, e);
                1
            }
        };
    }

    serve(&name)
}

/// The service dispatch loop: supervise the relay until it dies or a
/// shutdown signal arrives.
fn serve(name: &str) -> i32 {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("cannot start runtime: {}", e);
            return 1;
        }
    };
    let result = runtime.block_on(async {
        let exe = std::env::current_exe()
            .map_err(|e| format!("cannot resolve executable path: {}", e))?;
        let start_file = supervisor::start_file(&exe, name);
        supervisor::supervise(&start_file, name, shutdown_signal()).await
    });
    match result {
        Ok(()) => 0,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("staffetta-service: {}", e);
            1
        }
    }
}

/// Resolves when the process is asked to stop.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn help_exits_2() {
        assert_eq!(run(&args(&["staffetta-service", "--help"])), 2);
        assert_eq!(run(&args(&["staffetta-service", "/?"])), 2);
    }

    #[test]
    fn unknown_option_exits_1() {
        assert_eq!(run(&args(&["staffetta-service", "--bogus"])), 1);
    }

    #[test]
    fn usage_names_the_options() {
        let text = usage("staffetta-service");
        assert!(text.contains("--install"));
        assert!(text.contains("--remove"));
    }
}
