//! Persistent recorder settings (JSON file in the app data directory).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use earshot_core::{
    AudioFormat, CaptureConfig, CorruptionPolicy, GapPolicy, RangeLimits, ReconstructOptions,
    SegmentCodec,
};
use serde::{Deserialize, Serialize};

/// Rates the recorder accepts; anything else falls back to the default.
pub const SUPPORTED_SAMPLE_RATES: &[u32] = &[8_000, 16_000, 32_000, 44_100, 48_000];
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub recordings_dir: PathBuf,
    pub sample_rate: u32,
    pub segment_seconds: u64,
    pub codec: SegmentCodec,
    pub preferred_input_device: Option<String>,
    pub max_reconstruct_minutes: u64,
    pub max_reconstruct_segments: usize,
    pub gap_policy: GapPolicy,
    pub corruption_policy: CorruptionPolicy,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            recordings_dir: default_recordings_dir(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            segment_seconds: 60,
            codec: SegmentCodec::ZippedWav,
            preferred_input_device: None,
            max_reconstruct_minutes: 360,
            max_reconstruct_segments: 2048,
            gap_policy: GapPolicy::FillSilence,
            corruption_policy: CorruptionPolicy::Lenient,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        if self.recordings_dir.as_os_str().is_empty() {
            self.recordings_dir = default_recordings_dir();
        }
        if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            tracing::warn!(
                sample_rate = self.sample_rate,
                "unsupported sample rate, using {DEFAULT_SAMPLE_RATE}"
            );
            self.sample_rate = DEFAULT_SAMPLE_RATE;
        }
        self.segment_seconds = self.segment_seconds.clamp(1, 3_600);
        self.max_reconstruct_minutes = self.max_reconstruct_minutes.clamp(1, 24 * 60);
        self.max_reconstruct_segments = self.max_reconstruct_segments.clamp(1, 100_000);
        self.preferred_input_device = self
            .preferred_input_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
    }

    /// Apply `EARSHOT_*` overrides from `lookup`, then normalise again.
    /// Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("EARSHOT_RECORDINGS_DIR") {
            self.recordings_dir = PathBuf::from(dir);
        }
        if let Some(rate) = lookup("EARSHOT_SAMPLE_RATE").and_then(|v| v.trim().parse().ok()) {
            self.sample_rate = rate;
        }
        if let Some(secs) = lookup("EARSHOT_SEGMENT_SECONDS").and_then(|v| v.trim().parse().ok()) {
            self.segment_seconds = secs;
        }
        if let Some(device) = lookup("EARSHOT_INPUT_DEVICE") {
            self.preferred_input_device = Some(device);
        }
        self.normalize();
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Mono 16-bit at the configured rate; capture downmixes every input to mono.
    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat::mono16(self.sample_rate)
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            segment_duration: Duration::from_secs(self.segment_seconds),
            preferred_input_device: self.preferred_input_device.clone(),
        }
    }

    pub fn range_limits(&self) -> RangeLimits {
        RangeLimits {
            max_span: Some(TimeDelta::minutes(self.max_reconstruct_minutes as i64)),
            max_segments: Some(self.max_reconstruct_segments),
        }
    }

    pub fn reconstruct_options(&self) -> ReconstructOptions {
        ReconstructOptions {
            gap_policy: self.gap_policy,
            corruption_policy: self.corruption_policy,
            limits: self.range_limits(),
            cancel: None,
        }
    }
}

pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("Earshot")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("earshot")
    }
}

pub fn default_recordings_dir() -> PathBuf {
    default_data_dir().join("recordings")
}

pub fn default_settings_path() -> PathBuf {
    default_data_dir().join("settings.json")
}

/// Read settings, falling back to defaults on a missing or malformed file.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| match serde_json::from_str::<AppSettings>(&raw) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring malformed settings: {e}");
                None
            }
        })
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
