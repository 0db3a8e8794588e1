//! Helpers for output names and download destinations

use crate::config::FileCollisionAction;
use crate::error::{Error, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

#[allow(clippy::expect_used)]
static UNSAFE_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.\-]").expect("static pattern compiles"));

/// Make free text safe to use as an output file name
///
/// Every character outside `A-Z`, `a-z`, `0-9`, `_`, `-` and `.` becomes `_`,
/// the same cleaning the backend applies to uploaded names. Returns `None` for
/// blank input so callers can omit the override entirely.
///
/// # Examples
///
/// ```
/// use syncdub_client::utils::sanitize_output_name;
///
/// assert_eq!(sanitize_output_name(" Mi película (ES) ").as_deref(), Some("Mi_pel_cula__ES_"));
/// assert_eq!(sanitize_output_name("   "), None);
/// ```
#[must_use]
pub fn sanitize_output_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(UNSAFE_NAME_CHARS.replace_all(trimmed, "_").into_owned())
}

/// Pick the path to write a downloaded artifact to
///
/// `Rename` appends ` (1)`, ` (2)`, ... before the extension until the name
/// is free, `Overwrite` returns `path` unchanged and `Skip` fails if `path`
/// already exists.
pub fn get_unique_path(path: &Path, action: FileCollisionAction) -> Result<PathBuf> {
    match action {
        FileCollisionAction::Overwrite => Ok(path.to_path_buf()),
        FileCollisionAction::Skip => {
            if path.exists() {
                return Err(Error::FileCollision {
                    path: path.to_path_buf(),
                    reason: "file already exists and collision action is skip".to_string(),
                });
            }
            Ok(path.to_path_buf())
        }
        FileCollisionAction::Rename => {
            if !path.exists() {
                return Ok(path.to_path_buf());
            }

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| Error::FileCollision {
                    path: path.to_path_buf(),
                    reason: "cannot extract file stem".to_string(),
                })?;
            let extension = path.extension().and_then(|e| e.to_str());
            let parent = path.parent().unwrap_or_else(|| Path::new(""));

            for i in 1..=MAX_RENAME_ATTEMPTS {
                let candidate = parent.join(match extension {
                    Some(ext) => format!("{stem} ({i}).{ext}"),
                    None => format!("{stem} ({i})"),
                });
                if !candidate.exists() {
                    return Ok(candidate);
                }
            }

            Err(Error::FileCollision {
                path: path.to_path_buf(),
                reason: format!("no free name after {MAX_RENAME_ATTEMPTS} attempts"),
            })
        }
    }
}
