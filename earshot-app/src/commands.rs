//! Command handlers for the `earshot` binary.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDate, Utc};
use earshot_core::{
    bundle_file_name, list_input_devices, write_dated_bundle, CaptureWriter, CorruptionPolicy,
    DirStore, GapPolicy, Reconstructor, SegmentIndex, SegmentStore, SessionEvent,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::settings::AppSettings;

pub fn open_store(settings: &AppSettings) -> anyhow::Result<Arc<dyn SegmentStore>> {
    let store = DirStore::open(
        &settings.recordings_dir,
        settings.audio_format(),
        settings.codec,
    )
    .with_context(|| format!("opening {}", settings.recordings_dir.display()))?;
    Ok(Arc::new(store))
}

/// Capture until Ctrl-C (or `limit`), then seal the tail segment.
pub async fn record(
    settings: &AppSettings,
    limit: Option<std::time::Duration>,
) -> anyhow::Result<()> {
    let store = open_store(settings)?;
    let writer = Arc::new(CaptureWriter::new(settings.capture_config(), store));
    let mut events = writer.subscribe();

    let starter = Arc::clone(&writer);
    let session = tokio::task::spawn_blocking(move || starter.start_session()).await??;
    info!(
        session,
        dir = %settings.recordings_dir.display(),
        segment_seconds = settings.segment_seconds,
        "recording; press Ctrl-C to stop"
    );

    let sleep = async {
        match limit {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
            _ = &mut sleep => {
                info!("recording limit reached");
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::SegmentSealed { segment, .. }) => {
                    println!("{}  {:>8.3}s  {}", segment.id, segment.duration_secs(), segment.location.display());
                }
                Ok(SessionEvent::Ended { reason, .. }) if reason.is_fault() => {
                    warn!(?reason, "capture ended by fault");
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "event listener lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    let report = tokio::task::spawn_blocking(move || writer.stop_session()).await??;
    info!(
        session = report.session,
        segments = report.segments.len(),
        end = ?report.end,
        frames = report.diagnostics.frames_drained,
        "recording finished"
    );
    if report.end.is_fault() {
        bail!("capture session {} ended by fault: {:?}", report.session, report.end);
    }
    Ok(())
}

pub fn list(
    settings: &AppSettings,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    json: bool,
) -> anyhow::Result<()> {
    let store = open_store(settings)?;
    let index = SegmentIndex::scan(store.as_ref())?;
    if let Some((first, last)) = index.extent() {
        info!(%first, %last, "recordings span");
    }
    // Newest first, the way a listing page shows them.
    let mut segments: Vec<_> = index.filter_by_date(from, to).collect();
    segments.reverse();

    if json {
        println!("{}", serde_json::to_string_pretty(&segments)?);
        return Ok(());
    }
    for seg in &segments {
        println!(
            "{}  {}  {:>8.3}s  {}",
            seg.start_time.format("%Y-%m-%d %H:%M:%S%.3f"),
            seg.end_time.format("%H:%M:%S%.3f"),
            seg.duration_secs(),
            seg.location.display()
        );
    }
    info!(segments = segments.len(), "listed");
    Ok(())
}

pub struct ExportArgs {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub out: PathBuf,
    pub strict: bool,
    pub reject_gaps: bool,
}

/// Reconstruct a window into one WAV file.
pub fn export(settings: &AppSettings, args: ExportArgs) -> anyhow::Result<()> {
    let store = open_store(settings)?;
    let mut options = settings.reconstruct_options();
    if args.strict {
        options.corruption_policy = CorruptionPolicy::Strict;
    }
    if args.reject_gaps {
        options.gap_policy = GapPolicy::Reject;
    }

    let audio = Reconstructor::new(store).reconstruct(args.start, args.end, &options)?;
    let file = File::create(&args.out).with_context(|| format!("creating {}", args.out.display()))?;
    audio.write_wav(BufWriter::new(file))?;

    for d in audio.discontinuities() {
        warn!(
            start = %d.start_time,
            end = %d.end_time,
            kind = ?d.kind,
            "silence substituted"
        );
    }
    println!(
        "{}  {:.3}s  {} discontinuities",
        args.out.display(),
        audio.duration_secs(),
        audio.discontinuities().len()
    );
    Ok(())
}

/// Zip every segment that started between two dates (inclusive).
pub fn bundle(
    settings: &AppSettings,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    out_dir: &Path,
) -> anyhow::Result<PathBuf> {
    let store = open_store(settings)?;
    let index = SegmentIndex::scan(store.as_ref())?;

    let today = Utc::now().date_naive();
    let first_day = index.list_segments().next().map(|s| s.start_time.date_naive());
    let last_day = index.newest_first().next().map(|s| s.start_time.date_naive());
    let from = from.or(first_day).unwrap_or(today);
    let to = to.or(last_day).unwrap_or(today);
    if to < from {
        bail!("--to {to} is before --from {from}");
    }

    std::fs::create_dir_all(out_dir)?;
    let path = out_dir.join(bundle_file_name(from, to));
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    let segments = write_dated_bundle(&index, store.as_ref(), from, to, BufWriter::new(file))?;

    println!("{}  {} segments", path.display(), segments.len());
    Ok(path)
}

pub fn devices(json: bool) -> anyhow::Result<()> {
    let devices = list_input_devices();
    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }
    if devices.is_empty() {
        println!("no input devices found");
    }
    for d in devices {
        let rate = d
            .native_sample_rate
            .map(|r| format!("{r} Hz"))
            .unwrap_or_else(|| "?".into());
        println!(
            "{}{}  {}{}",
            if d.is_default { "* " } else { "  " },
            d.name,
            rate,
            if d.is_loopback_like { "  (loopback)" } else { "" }
        );
    }
    Ok(())
}
