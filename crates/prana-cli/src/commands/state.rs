//! State command implementation.

use anyhow::Result;

use crate::cli::{DeviceArgs, OutputFormat};
use crate::config::Config;
use crate::format::{format_state_json, format_state_text};
use crate::util::open_session;

pub async fn cmd_state(device: &DeviceArgs, format: OutputFormat, config: &Config) -> Result<()> {
    let session = open_session(device, config)?;
    let result = session.request_state().await;
    let snapshot = session.last_snapshot();
    session.shutdown().await;

    let state = result?;
    match format {
        OutputFormat::Text => print!("{}", format_state_text(&state)),
        OutputFormat::Json => {
            let captured_at = snapshot
                .map(|s| s.captured_at)
                .unwrap_or_else(time::OffsetDateTime::now_utc);
            println!(
                "{}",
                format_state_json(session.address(), captured_at, &state, true)?
            );
        }
    }
    Ok(())
}
