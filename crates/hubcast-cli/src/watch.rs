//! `hubcast watch`: follow a stream and print the projection.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use hubcast_client::connect_with;
use hubcast_core::{ClientProjection, DecodedEvent, OpacityScale};
use tracing::{info, warn};

pub(crate) struct WatchOptions {
    pub url: String,
    pub show_cells: bool,
    pub retry: Option<Duration>,
    pub scale: OpacityScale,
}

/// Follow the stream until it ends, reconnecting when `retry` is set.
///
/// Every connection starts from an empty projection.
pub(crate) async fn run<W: Write>(options: &WatchOptions, out: &mut W) -> Result<()> {
    let client = reqwest::Client::new();
    loop {
        let outcome = follow(&client, options, out).await;
        let Some(delay) = options.retry else {
            return outcome;
        };
        match outcome {
            Ok(()) => info!(url = %options.url, "stream ended, reconnecting in {delay:?}"),
            Err(err) => warn!(url = %options.url, error = %format!("{err:#}"), "stream failed, reconnecting in {delay:?}"),
        }
        tokio::time::sleep(delay).await;
    }
}

async fn follow<W: Write>(
    client: &reqwest::Client,
    options: &WatchOptions,
    out: &mut W,
) -> Result<()> {
    let mut feed = connect_with(client, &options.url)
        .await
        .with_context(|| format!("Failed to open {}", options.url))?;

    while let Some(event) = feed.next_event().await.context("Stream failed")? {
        render(&event, feed.projection(), options, out).context("Failed to write output")?;
    }
    Ok(())
}

fn render<W: Write>(
    event: &DecodedEvent,
    projection: &ClientProjection,
    options: &WatchOptions,
    out: &mut W,
) -> std::io::Result<()> {
    writeln!(
        out,
        "{} cells, last update {}",
        projection.len(),
        projection.display_timestamp().as_deref().unwrap_or("-")
    )?;
    if options.show_cells {
        for (geohash, count) in updated_cells(event) {
            writeln!(
                out,
                "  {geohash} {count} opacity={:.3}",
                options.scale.fill_opacity(count)
            )?;
        }
    }
    out.flush()
}

fn updated_cells(event: &DecodedEvent) -> Vec<(&str, u64)> {
    match event {
        DecodedEvent::SingleUpdate { geohash, count, .. } => vec![(geohash.as_str(), *count)],
        DecodedEvent::BulkUpdate { items, .. } => items
            .iter()
            .map(|item| (item.geohash.as_str(), item.count))
            .collect(),
    }
}
