//! Internal utility functions for sprite-cutter.
//!
//! This module contains common functionality used across different image operations.

use std::path::{Path, PathBuf};

/// Validates that two images have matching dimensions.
///
/// # Arguments
///
/// * `width1` - The width of the first image
/// * `height1` - The height of the first image
/// * `width2` - The width of the second image
/// * `height2` - The height of the second image
/// * `context` - A description of the context for error messages
///
/// # Returns
///
/// `Ok(())` if the dimensions match, otherwise an error
pub fn validate_matching_dimensions(
    width1: u32,
    height1: u32,
    width2: u32,
    height2: u32,
    context: &str,
) -> Result<(), String> {
    if width1 != width2 || height1 != height2 {
        Err(format!(
            "{}: Image dimensions must match. Got {}x{} and {}x{}",
            context, width1, height1, width2, height2
        ))
    } else {
        Ok(())
    }
}

/// File name a sprite is written under.
///
/// Without an extension override the candidate's own file name is kept.
/// With one, everything from the first `.` of the name is replaced, so
/// `walk.01.webp` with `png` becomes `walk.png`.
pub fn output_file_name(candidate: &Path, extension: Option<&str>) -> Option<String> {
    let name = candidate.file_name()?.to_str()?;
    match extension {
        None => Some(name.to_string()),
        Some(extension) => {
            let stem = name.split('.').next().unwrap_or(name);
            Some(format!("{stem}.{}", extension.trim_start_matches('.')))
        }
    }
}

/// File name of the diagnostic mask preview for a sprite file name.
#[inline]
pub fn mask_file_name(sprite_name: &str) -> String {
    format!("diff{sprite_name}")
}

/// Temporary sibling a file is written to before being renamed into place.
pub fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    target.with_file_name(name)
}
