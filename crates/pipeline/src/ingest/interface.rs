//! Capture interface selection from `/sys/class/net`.

use std::path::Path;

use tracing::{debug, info};

use crate::error::SpanPipelineError;

/// Where the kernel lists network interfaces.
pub const SYS_CLASS_NET: &str = "/sys/class/net";

const IFF_UP: u32 = 0x1;
const IFF_LOOPBACK: u32 = 0x8;

/// Returns `configured` if set, otherwise the first active non-loopback
/// interface under `sys_root`.
pub async fn resolve_interface(
    configured: &str,
    sys_root: &Path,
) -> Result<String, SpanPipelineError> {
    let configured = configured.trim();
    if !configured.is_empty() {
        debug!(interface = configured, "using configured interface");
        return Ok(configured.to_owned());
    }

    match first_active_interface(sys_root).await? {
        Some(name) => {
            info!(interface = %name, "selected capture interface");
            Ok(name)
        }
        None => Err(SpanPipelineError::NoInterface(format!(
            "no interface under {} is up and not loopback",
            sys_root.display()
        ))),
    }
}

/// First interface (by name) whose flags have `IFF_UP` and not `IFF_LOOPBACK`.
pub async fn first_active_interface(sys_root: &Path) -> Result<Option<String>, SpanPipelineError> {
    let mut entries = tokio::fs::read_dir(sys_root).await.map_err(|e| {
        SpanPipelineError::NoInterface(format!("cannot list {}: {e}", sys_root.display()))
    })?;

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_owned());
        }
    }
    names.sort();

    for name in names {
        let flags_path = sys_root.join(&name).join("flags");
        let Ok(raw) = tokio::fs::read_to_string(&flags_path).await else {
            continue;
        };
        match parse_flags(&raw) {
            Some(flags) if is_active(flags) => return Ok(Some(name)),
            Some(flags) => debug!(interface = %name, flags, "skipping interface"),
            None => debug!(interface = %name, raw = raw.trim(), "unreadable interface flags"),
        }
    }
    Ok(None)
}

/// Parses the `flags` file format, e.g. `0x1003`.
fn parse_flags(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    let hex = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    u32::from_str_radix(hex, 16).ok()
}

fn is_active(flags: u32) -> bool {
    flags & IFF_UP != 0 && flags & IFF_LOOPBACK == 0
}
