//! Destination filenames for downloaded volumes.
//!
//! Files are named `[{site_tag}][{series_title}]{volume_name}.{extension}`.
//! Title and volume name come from scraped markup, so each is sanitized
//! before being joined onto the download directory.

use std::path::{Component, Path, PathBuf};

use crate::catalog::AssetFormat;

/// Replaces characters that are unsafe in a single path segment.
///
/// Separators, reserved Windows characters and control characters become
/// `_`. A result that would still be interpreted as `.`/`..` has its dots
/// replaced too.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized.replace('.', "_")
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Builds the filename of one volume.
#[must_use]
pub fn volume_filename(
    site_tag: &str,
    series_title: &str,
    volume_name: &str,
    format: AssetFormat,
) -> String {
    format!(
        "[{}][{}]{}.{}",
        sanitize_filename(site_tag),
        sanitize_filename(series_title),
        sanitize_filename(volume_name),
        format.extension()
    )
}

/// Joins [`volume_filename`] onto `output_dir`.
#[must_use]
pub fn volume_destination(
    output_dir: &Path,
    site_tag: &str,
    series_title: &str,
    volume_name: &str,
    format: AssetFormat,
) -> PathBuf {
    output_dir.join(volume_filename(site_tag, series_title, volume_name, format))
}
