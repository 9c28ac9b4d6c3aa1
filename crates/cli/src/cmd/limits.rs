//! Show the kernel's inotify tunables

use anyhow::{Context, Result};
use inwatch_core::limits::{self, Limits, Tunable, PROC_DIR};
use owo_colors::OwoColorize;

pub async fn run() -> Result<()> {
    let values = Limits::read().context("Failed to read inotify limits")?;

    println!("{}", "Kernel inotify limits".bold());
    println!("{}: {}\n", "Location".dimmed(), PROC_DIR.dimmed());

    for tunable in Tunable::ALL {
        let access = if limits::is_tunable(tunable) {
            "writable".green().to_string()
        } else {
            "read-only".dimmed().to_string()
        };
        println!(
            "  {} {:>12}  {}",
            format!("{:<20}", tunable.file_name()).cyan(),
            values.get(tunable),
            access
        );
    }

    Ok(())
}
