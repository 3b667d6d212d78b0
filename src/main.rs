// src/main.rs

mod backend;
mod config;
mod error;
mod history;
mod overlay;
mod snapshot;
mod stream;
mod types;

use anyhow::Result;
use backend::{BackendClient, UploadResponse};
use error::{describe, BackendError};
use history::ViolationHistory;
use image::DynamicImage;
use overlay::OverlayRenderer;
use std::path::Path;
use std::time::Duration;
use stream::notices::{Notice, NoticeBoard};
use stream::{event_queue, NoticeKind, SessionController, SessionStatus, StreamSource, WsTransport};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use types::Config;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config_path =
        std::env::var("VIEWER_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let mut config = Config::load_or_default(&config_path)?;
    config.apply_env_overrides();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("violation_stream_viewer={}", config.logging.level))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚦 Violation Stream Viewer starting");
    if Path::new(&config_path).exists() {
        info!("✓ Configuration loaded from {}", config_path);
    } else {
        info!("No {} found, using defaults", config_path);
    }
    config.validate()?;

    let backend = BackendClient::new(
        &config.backend.base_url,
        config.backend.timeout_secs,
        config.backend.upload_timeout_secs,
    )?;
    let transport = WsTransport::new(config.channel_url());
    info!("📡 Backend: {}", config.backend.base_url);
    info!("📡 Frame channel: {}", transport.url());

    // failed requests land here; stream problems go to the session's board
    let mut requests = NoticeBoard::new(config.stream.max_notices);
    let mut history = ViolationHistory::new();
    history.refresh(&backend, &mut requests).await;
    log_history(&history, &backend);
    log_notices(requests.drain());

    let renderer = match &config.display.font_path {
        Some(path) => OverlayRenderer::from_font_file(path)?,
        None => OverlayRenderer::new(),
    };
    if !renderer.has_font() {
        info!("No display.font_path set, overlay labels will not be rasterised");
    }

    let source = resolve_source(&config, &backend, &mut requests).await;
    log_notices(requests.drain());

    let (sink, mut events) = event_queue();
    let mut session = SessionController::new(transport, sink, renderer)
        .with_notice_capacity(config.stream.max_notices);
    session.set_viewport(config.display.viewport);

    match source {
        StreamSource::File(path) => {
            session.start_from_source(&path)?;
        }
        StreamSource::LiveCamera => {
            session.start_from_live_camera();
        }
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut last_preview = 0u64;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                match session.active_session() {
                    Some(id) if session.has_open_channel() => {
                        info!("Ctrl-C received, closing session {}", id)
                    }
                    _ => info!("Ctrl-C received, stopping stream"),
                }
                session.stop();
                break;
            }
            received = events.recv() => {
                let Some(event) = received else { break };
                session.handle_event(event);

                log_notices(session.drain_notices());
                maybe_write_preview(&session, &config, &mut last_preview);

                if session.status() == SessionStatus::Stopped {
                    break;
                }
            }
        }
    }

    // ========================================================================
    // SUMMARY
    // ========================================================================

    let summary = session.metrics().summary();
    info!("\n========================================");
    match session.source() {
        Some(source) => info!("Stream finished: {}", source),
        None => info!("Stream finished before it started"),
    }
    info!("  Frames received: {} ({:.1} fps)", summary.frames_received, summary.fps);
    info!("  Metadata updates: {}", summary.metadata_updates);
    info!("  Dropped: {} malformed, {} undecodable, {} stale",
        summary.malformed_messages, summary.frame_decode_failures, summary.stale_events_dropped);
    if let Some(snapshot) = session.snapshot() {
        info!(
            "  Crossings: {} | Red-light violations: {}",
            snapshot.total_crossings.unwrap_or(0),
            snapshot.red_light_violations.unwrap_or(0)
        );
        let flagged = snapshot.red_light_violators();
        if !flagged.is_empty() {
            info!("  Flagged in last update: {}", flagged.join(", "));
        }
    }
    let ledger = session.ledger();
    if !ledger.is_empty() {
        info!(
            "  Vehicles tracked: {} ({} crossed)",
            ledger.len(),
            ledger.crossed_count()
        );
    }
    let violators = session.red_light_violators();
    if !violators.is_empty() {
        info!("  🚨 Ran the red light: {}", violators.join(", "));
    }
    if let Some(handle) = session.recording_handle() {
        info!("  💾 Processed video: {}", backend.download_url(handle));
    }
    match serde_json::to_string(&summary) {
        Ok(json) => info!("Metrics: {}", json),
        Err(e) => warn!("Could not serialise metrics: {}", e),
    }
    info!("========================================\n");

    if history.refresh(&backend, &mut requests).await {
        log_history(&history, &backend);
        for id in &violators {
            if let Some(url) = history
                .for_vehicle(id)
                .find_map(|v| backend.processed_video_url(v))
            {
                info!("  🚨 Vehicle {} on record: {}", id, url);
            }
        }
    }
    log_notices(requests.drain());

    Ok(())
}

/// Upload wins over a configured source; with neither, stream the live camera.
/// A failed upload is published as a request notice and falls through to the
/// configured source.
async fn resolve_source(
    config: &Config,
    backend: &BackendClient,
    notices: &mut NoticeBoard,
) -> StreamSource {
    if let Some(file) = &config.stream.upload_file {
        match upload_with_progress(backend, Path::new(file)).await {
            Ok(uploaded) => return StreamSource::File(uploaded.file_path),
            Err(e) => {
                let reason = describe(e);
                warn!("📤 Upload of {} failed: {}", file, reason);
                notices.publish(
                    NoticeKind::Request,
                    format!("Upload of {} failed: {}", file, reason),
                );
            }
        }
    }
    config
        .stream
        .source
        .as_deref()
        .and_then(StreamSource::parse)
        .unwrap_or(StreamSource::LiveCamera)
}

async fn upload_with_progress(
    backend: &BackendClient,
    path: &Path,
) -> Result<UploadResponse, BackendError> {
    let upload = backend.upload_video(path);
    tokio::pin!(upload);
    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    // first tick fires immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            result = &mut upload => return result,
            _ = ticker.tick() => {
                if backend.is_uploading() {
                    info!("📤 Upload of {} still in progress...", path.display());
                }
            }
        }
    }
}

fn log_notices(notices: Vec<Notice>) {
    for notice in notices {
        warn!("[{}] {}", notice.kind, notice.message);
    }
}

fn maybe_write_preview<T: stream::channel::FrameTransport>(
    session: &SessionController<T>,
    config: &Config,
    last_preview: &mut u64,
) {
    let Some(path) = &config.display.preview_path else {
        return;
    };
    let Some(frame) = session.displayed_frame() else {
        return;
    };
    if frame.sequence == *last_preview || (frame.sequence - 1) % config.display.preview_every != 0 {
        return;
    }
    *last_preview = frame.sequence;

    match session.compose_preview() {
        Some(Ok(image)) => match DynamicImage::ImageRgba8(image).to_rgb8().save(path) {
            Ok(()) => debug!(
                "Preview of frame {} written to {} ({} overlay primitives)",
                frame.sequence,
                path,
                session.overlay().primitives().len()
            ),
            Err(e) => warn!("Failed to write preview {}: {}", path, e),
        },
        Some(Err(e)) => warn!("Failed to compose preview: {:#}", e),
        None => {}
    }
}

fn log_history(history: &ViolationHistory, backend: &BackendClient) {
    if let Some(reason) = history.last_error() {
        error!("Violation history unavailable: {}", reason);
        return;
    }
    let fetched = history
        .fetched_at()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_default();
    if history.is_empty() {
        info!("📋 No violations on record (fetched {})", fetched);
        return;
    }
    for violation in history.violations().iter().take(10) {
        let vehicle = violation
            .vehicle_id
            .as_ref()
            .map_or("?", |id| id.0.as_str());
        let when = violation
            .timestamp
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        info!(
            "  #{} vehicle {} at {} (video {:.0}s) {}",
            violation.id,
            vehicle,
            when,
            violation.video_second.unwrap_or(0.0),
            backend.processed_video_url(violation).unwrap_or_default()
        );
        if let Some(original) = backend.original_video_url(violation) {
            debug!("     source video: {}", original);
        }
    }
    if history.len() > 10 {
        info!("  ... and {} more", history.len() - 10);
    }
    debug!("History fetched at {}", fetched);
}
