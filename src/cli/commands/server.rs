//! Commands that talk to the configured Subsonic server.

use std::path::Path;
use tokio::runtime::Runtime;

use crate::error::ResultExt;

/// Check connectivity and credentials
pub fn cmd_ping(rt: &Runtime, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = super::load_config(config_path);
    let client = super::connect(&config)?;

    let info = rt
        .block_on(client.ping())
        .with_context(format!("Pinging {}", client.base_url()))?;
    println!("Connected to {}", client.base_url());
    println!("API version: {}", info.api_version);
    if let Some(server_type) = info.server_type {
        match info.server_version {
            Some(version) => println!("Server: {} {}", server_type, version),
            None => println!("Server: {}", server_type),
        }
    }
    Ok(())
}

/// Print the stream URL for a track, using the configured transcoding
pub fn cmd_stream_url(config_path: Option<&Path>, id: &str, raw: bool) -> anyhow::Result<()> {
    let config = super::load_config(config_path);
    let client = super::connect(&config)?;

    let transcode = config.transcoding.settings();
    let force_raw = raw || config.transcoding.force_raw_file;
    println!("{}", client.stream_url_for(id, transcode.as_ref(), force_raw));
    Ok(())
}

/// Scrobble tracks one after another, reporting each result
pub fn cmd_scrobble(
    rt: &Runtime,
    config_path: Option<&Path>,
    ids: &[String],
    submission: bool,
) -> anyhow::Result<()> {
    let config = super::load_config(config_path);
    let client = super::connect(&config)?;

    let failures = rt.block_on(async {
        let mut failures = 0;
        for id in ids {
            match client.scrobble(id, submission).await {
                Ok(()) => println!("  ✓ {}", id),
                Err(e) => {
                    eprintln!("  ✗ {} - {}", id, e);
                    failures += 1;
                }
            }
        }
        failures
    });

    if failures > 0 {
        anyhow::bail!("{} of {} scrobbles failed", failures, ids.len());
    }
    Ok(())
}
