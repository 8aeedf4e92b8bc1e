//! scrivener: headless replay of a simulated authoring session.
//!
//! Entry point for the `scrivener` binary. Streams one built-in artifact set
//! through the core workbench, prints a progress line per event to stderr,
//! and finishes with a diff preview for every file that had a baseline.
//!
//! # Startup sequence
//!
//! 1. Install the tracing subscriber (`RUST_LOG`, default `info`).
//! 2. Load `config.toml` from the XDG config dir; missing or broken files
//!    fall back to defaults.
//! 3. `register_sigterm()` returns an `Arc<AtomicBool>` polled by the loop.
//! 4. Seed baselines, start the session, and pump events until a terminal
//!    event arrives. SIGTERM or Ctrl-C cancel the session.

mod demo;
mod render;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use scrivener_core::{CoreConfig, SessionEvent, Workbench};
use signal_hook::consts::SIGTERM;
use signal_hook::flag::register;
use tracing_subscriber::EnvFilter;

/// Returns the path to the scrivener config file.
///
/// Prefers `$XDG_CONFIG_HOME/scrivener/config.toml`; falls back to
/// `~/.config/scrivener/config.toml` when the env var is absent.
fn config_path() -> std::path::PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(std::path::PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| std::path::PathBuf::from(h).join(".config"))
        })
        .unwrap_or_else(|| std::path::PathBuf::from(".config"));
    base.join("scrivener").join("config.toml")
}

/// Reads `[demo] set` from the config file. Defaults to `"web"`.
fn load_demo_set(path: &std::path::Path) -> String {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return "web".to_owned();
    };
    let table: toml::Table = match toml::from_str(&raw) {
        Ok(t) => t,
        Err(_) => return "web".to_owned(),
    };
    table
        .get("demo")
        .and_then(|d| d.get("set"))
        .and_then(|v| v.as_str())
        .unwrap_or("web")
        .to_owned()
}

/// Register a SIGTERM handler that sets an `AtomicBool` flag.
///
/// # Panics
///
/// Panics if the OS refuses to register the signal handler, which is treated
/// as a fatal initialisation error.
fn register_sigterm() -> Arc<AtomicBool> {
    let term = Arc::new(AtomicBool::new(false));
    register(SIGTERM, Arc::clone(&term)).expect("Failed to register SIGTERM handler");
    term
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let path = config_path();
    let config = CoreConfig::load_or_default(&path);
    let set_name = load_demo_set(&path);
    if !demo::SET_NAMES.contains(&set_name.as_str()) {
        tracing::warn!(set = %set_name, known = ?demo::SET_NAMES, "unknown demo set, using web");
    }
    let set = demo::artifact_set(&set_name);
    let term_flag = register_sigterm();

    let workbench = Workbench::new(config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let mut rx = workbench.subscribe();

    for (file, baseline) in &set.baselines {
        workbench.open_file(file, Some(baseline));
    }
    let baselines: Vec<_> = set
        .baselines
        .iter()
        .filter_map(|(file, _)| workbench.current_revision(file).map(|r| (*file, r)))
        .collect();

    tracing::info!(set = set.name, files = set.files.len(), "replaying artifact set");
    workbench
        .start_streaming_session(set.files)
        .map_err(std::io::Error::other)?;

    'event_loop: loop {
        tokio::select! {
            // Heartbeat so SIGTERM is noticed even between ticks.
            _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {
                if term_flag.load(Ordering::Relaxed) {
                    workbench.cancel_streaming_session();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                workbench.cancel_streaming_session();
            }
            maybe_event = rx.recv() => {
                match maybe_event {
                    Some(SessionEvent::Progress { progress, .. }) => {
                        eprint!("\r{}", render::progress_line(&progress));
                    }
                    Some(SessionEvent::FileCompleted { file_path, revision, .. }) => {
                        eprintln!();
                        tracing::info!(file = %file_path, %revision, "file written");
                    }
                    Some(SessionEvent::Error { error, .. }) => {
                        eprintln!();
                        tracing::warn!(%error, "artifact skipped");
                    }
                    Some(SessionEvent::Completed { .. }) => {
                        eprintln!();
                        break 'event_loop;
                    }
                    Some(SessionEvent::Cancelled { .. }) => {
                        eprintln!();
                        tracing::warn!("session cancelled");
                        break 'event_loop;
                    }
                    None => break 'event_loop,
                    _ => {}
                }
            }
        }
    }

    for (file, base) in baselines {
        let Some(head) = workbench.current_revision(file) else {
            continue;
        };
        match workbench.request_diff_preview(file, base, head) {
            Ok(preview) => eprint!("{}", render::preview_text(&preview)),
            Err(e) => tracing::warn!(file, error = %e, "no preview"),
        }
    }
    Ok(())
}
