//! Input device enumeration.

use serde::{Deserialize, Serialize};

/// An audio input the recorder could open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDevice {
    /// Name reported by the OS; pass it as the preferred input device.
    pub name: String,
    pub is_default: bool,
    /// Native rate of the default input config, when the device reports one.
    pub native_sample_rate: Option<u32>,
    pub channels: Option<u16>,
    /// Probably captures system output rather than a microphone.
    pub is_loopback_like: bool,
}

const LOOPBACK_KEYWORDS: &[&str] = &[
    "stereo mix",
    "what u hear",
    "what you hear",
    "loopback",
    "monitor of",
    "virtual output",
];

/// Name heuristic for loopback/system-output inputs.
pub fn is_loopback_like_name(name: &str) -> bool {
    let lowered = name.trim().to_ascii_lowercase();
    LOOPBACK_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Default first, then microphones before loopback inputs, then by name.
pub fn sort_devices(devices: &mut [InputDevice]) {
    devices.sort_by_key(|d| {
        (
            !d.is_default,
            d.is_loopback_like,
            d.name.to_ascii_lowercase(),
        )
    });
}

/// List the host's input devices. Empty when none exist or enumeration fails.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Vec<InputDevice> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = match host.input_devices() {
        Ok(devices) => devices,
        Err(e) => {
            tracing::warn!("failed to enumerate input devices: {e}");
            return Vec::new();
        }
    };

    let mut list: Vec<InputDevice> = devices
        .enumerate()
        .map(|(idx, device)| {
            let name = device
                .name()
                .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
            let config = device.default_input_config().ok();
            InputDevice {
                is_default: default_name.as_deref() == Some(name.as_str()),
                native_sample_rate: config.as_ref().map(|c| c.sample_rate().0),
                channels: config.as_ref().map(|c| c.channels()),
                is_loopback_like: is_loopback_like_name(&name),
                name,
            }
        })
        .collect();

    sort_devices(&mut list);
    list
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<InputDevice> {
    Vec::new()
}
