//! Watch paths and print events as they arrive

use crate::config::Config;
use anyhow::{Context, Result};
use inwatch_core::{Event, EventMask};
use inwatch_watcher::{EventLoop, Session, WatchTable};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Default, Clone, Copy)]
struct Counts {
    events: u64,
    overflows: u64,
}

pub async fn run(
    paths: &[PathBuf],
    events: &[String],
    duration: Option<Duration>,
    config: &Config,
) -> Result<()> {
    // 1. Resolve the mask: command line events win over the config file
    let kinds = if events.is_empty() {
        config.watch.event_mask()?
    } else {
        EventMask::parse_names(events)
            .map_err(|name| anyhow::anyhow!("Unknown event name '{}'", name))?
    };
    let mask = kinds | config.watch.options();

    // 2. Open the session and register every path
    let session = Arc::new(Session::open().context("Failed to open inotify session")?);
    let table = Arc::new(WatchTable::new(Arc::clone(&session)));
    for path in paths {
        let wd = table
            .register(path, mask)
            .with_context(|| format!("Failed to watch {}", path.display()))?;
        debug!(wd = wd.as_raw(), path = %path.display(), "watching");
    }

    println!(
        "{} {} {} ({})",
        "Watching".green().bold(),
        paths.len(),
        if paths.len() == 1 { "path" } else { "paths" },
        kinds.dimmed()
    );
    println!("{}", "Press Ctrl-C to stop".dimmed());

    // 3. Run the loop on a blocking worker
    let started = Instant::now();
    let mut worker = {
        let session = Arc::clone(&session);
        let table = Arc::clone(&table);
        tokio::task::spawn_blocking(move || {
            let mut counts = Counts::default();
            let result = EventLoop::run(&session, |event: Event| -> anyhow::Result<()> {
                if event.is_overflow() {
                    counts.overflows += 1;
                } else {
                    counts.events += 1;
                }
                print_event(&event, table.resolve(&event).as_deref());
                if event.is_terminal() {
                    table.on_terminal_event(event.wd());
                }
                Ok(())
            });
            result.map(|()| counts)
        })
    };

    // 4. Stop on Ctrl-C, on timeout, or when the loop fails on its own
    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    let finished = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("interrupted");
            None
        }
        _ = deadline => None,
        joined = &mut worker => Some(joined),
    };
    let joined = match finished {
        Some(joined) => joined,
        None => {
            session.cancel();
            worker.await
        }
    };
    let counts = joined.context("Event loop task panicked")??;

    // 5. Summary
    println!(
        "\nReceived {} events and {} queue-overflow events in {:.2} s",
        counts.events,
        counts.overflows,
        started.elapsed().as_secs_f64()
    );

    Ok(())
}

fn print_event(event: &Event, path: Option<&Path>) {
    let time = chrono::Local::now().format("%H:%M:%S%.3f");
    let target = path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "?".to_string());

    if event.is_overflow() {
        println!("{} {}", time.dimmed(), "QUEUE OVERFLOW: events were lost".red().bold());
        return;
    }

    let cookie = if event.cookie() != 0 {
        format!(" cookie={}", event.cookie())
    } else {
        String::new()
    };
    println!(
        "{} {} {}{}",
        time.dimmed(),
        event.mask().yellow(),
        target.cyan(),
        cookie.dimmed()
    );
}
