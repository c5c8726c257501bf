//! Logging setup for the binary, plus a helper for keeping multi-line
//! report text on a single log line.
//!
//! The engine logs on a few fixed targets so they can be filtered
//! independently (`RUST_LOG=movement=debug,concurrency=warn`):
//!
//! - `creation` - spawn, placement and discard of nodes
//! - `movement` - completed moves and shifts
//! - `destruction` - destroyed nodes
//! - `concurrency` - deferrals, refused cycles and stalled waits
//! - `dispatch` - notification delivery problems

use std::io::Write;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::config::LoggingConfig;

/// Escape a string for single-line logging:
/// - `\n` => `\\n`
/// - `\r` => `\\r`
/// - `\t` => `\\t`
/// - backslash => `\\\\`
///   Truncates very long strings with an ellipsis to cap log noise.
pub fn escape_log(s: &str) -> String {
    const MAX_PREVIEW: usize = 300;
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Level from `-v` count, falling back to the configured level.
fn level_for(config: Option<&LoggingConfig>, verbosity: u8) -> log::LevelFilter {
    match verbosity {
        0 => config
            .and_then(|c| log::LevelFilter::from_str(&c.level).ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

/// Install the global logger. Lines go to the configured file, and to the
/// console as well when stdout is a terminal. `RUST_LOG` refines the level
/// per target. Calling this twice is harmless.
pub fn init_logging(config: Option<&LoggingConfig>, verbosity: u8) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level_for(config, verbosity));
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }

    let file = config
        .and_then(|c| c.file.as_ref())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        })
        .map(|f| Arc::new(Mutex::new(f)));

    match file {
        Some(sink) => {
            let is_tty = atty::is(atty::Stream::Stdout);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}: {}", ts, record.level(), record.target(), record.args());
                if let Ok(mut guard) = sink.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                writeln!(
                    fmt,
                    "{} [{}] {}: {}",
                    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                    record.level(),
                    record.target(),
                    record.args()
                )
            });
        }
    }
    let _ = builder.try_init();
}
