use std::path::{Path, PathBuf};

const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

pub fn format_bytes(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

/// Inverse of [`format_bytes`]. Accepts a bare integer or `<number> <unit>`
/// with B/KB/MB/GB/TB (or the KiB spellings) at factor 1024.
pub fn parse_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let Some((number, unit)) = text.split_once(' ') else {
        return text.parse().ok();
    };

    let value: f64 = number.trim().parse().ok()?;
    let exponent = match unit.trim() {
        "B" => 0,
        "KB" | "KiB" => 1,
        "MB" | "MiB" => 2,
        "GB" | "GiB" => 3,
        "TB" | "TiB" => 4,
        _ => return None,
    };

    Some((value * 1024f64.powi(exponent)) as u64)
}

pub fn format_duration(seconds: i64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m {}s", seconds / 3600, (seconds % 3600) / 60, seconds % 60)
    }
}

/// `report.pdf` + `-2` -> `report-2.pdf`; names without an extension get the
/// suffix appended.
pub fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };

    path.with_file_name(name)
}

/// Lowercased extension, empty when there is none.
pub fn lowercase_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}
