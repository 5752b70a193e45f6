//! Watch command implementation.
//!
//! Runs a [`Poller`] against the device and prints every state it publishes.
//! The session reconnects on its own after a failed poll, so this loop only
//! reports failures.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use prana_core::{DeviceEvent, PollOptions, Poller};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::cli::{DeviceArgs, OutputFormat};
use crate::config::Config;
use crate::format::{format_state_json, format_watch_line};
use crate::util::open_session;

/// Arguments for the watch command.
pub struct WatchArgs<'a> {
    pub device: &'a DeviceArgs,
    pub interval: Option<u64>,
    pub count: u32,
    pub format: OutputFormat,
}

pub async fn cmd_watch(args: WatchArgs<'_>, config: &Config, quiet: bool) -> Result<()> {
    let WatchArgs {
        device,
        interval,
        count,
        format,
    } = args;

    let session = Arc::new(open_session(device, config)?);
    let options = match interval {
        Some(secs) => PollOptions::with_interval(Duration::from_secs(secs)),
        None => config.poll_options(),
    };

    // Subscribe before the first poll so its state is not missed.
    let mut events = session.subscribe();
    let poller = Poller::spawn(Arc::clone(&session), options)?;

    if !quiet {
        eprintln!("Watching: {}", session.address());
        if count > 0 {
            eprintln!(
                "Interval: {}s | Count: {} | Press Ctrl+C to stop",
                poller.options().interval.as_secs(),
                count
            );
        } else {
            eprintln!(
                "Interval: {}s | Press Ctrl+C to stop",
                poller.options().interval.as_secs()
            );
        }
        eprintln!("{}", "-".repeat(50));
    }

    let mut printed: u32 = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nShutting down...");
                break;
            }
            event = events.recv() => {
                match event {
                    Ok(DeviceEvent::StateUpdated { device, state, captured_at }) => {
                        match format {
                            OutputFormat::Text => println!("{}", format_watch_line(captured_at, &state)),
                            OutputFormat::Json => {
                                println!("{}", format_state_json(&device, captured_at, &state, false)?)
                            }
                        }
                        printed += 1;
                        if count > 0 && printed >= count {
                            if !quiet {
                                eprintln!("Completed {} readings.", printed);
                            }
                            break;
                        }
                    }
                    Ok(DeviceEvent::PollFailed { error, consecutive_failures, .. }) => {
                        if !quiet {
                            eprintln!("Poll failed ({}): {}", consecutive_failures, error);
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Event stream lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    poller.shutdown().await;
    Ok(())
}
