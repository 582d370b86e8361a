//! Saved play queue commands.

use std::path::Path;

use crate::config;
use crate::error::ResultExt;
use crate::saved_queue::SavedPlayQueue;

/// Print the saved play queue, marking the playing track
pub fn cmd_queue_show(file: Option<&Path>) -> anyhow::Result<()> {
    let path = match file {
        Some(path) => path.to_path_buf(),
        None => config::saved_queue_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?,
    };
    if !path.exists() {
        println!("No saved play queue at {}", path.display());
        return Ok(());
    }

    let saved = SavedPlayQueue::load(&path)
        .with_context(format!("Reading saved queue {}", path.display()))?;
    print!("{}", render(&saved));
    Ok(())
}

fn render(saved: &SavedPlayQueue) -> String {
    let mut out = format!(
        "Saved Play Queue\n================\nServer: {}\nTracks: {}\n",
        saved.server_id,
        saved.track_ids.len()
    );
    let playing = saved.playing_index();
    for (i, id) in saved.track_ids.iter().enumerate() {
        let marker = if playing == Some(i) { "▶" } else { " " };
        out.push_str(&format!("  {} {:>3}. {}\n", marker, i + 1, id));
    }
    if let Some(idx) = playing {
        out.push_str(&format!(
            "Resume at track {} from {:.1}s\n",
            idx + 1,
            saved.time_pos
        ));
    }
    out
}
