//! Staging for locked source artifacts.
//!
//! The WebCache database is held open by the host browser's service process,
//! so a plain copy usually fails with a sharing violation. On Windows the
//! staging path falls back to a point-in-time volume shadow snapshot and
//! copies the artifact out through the snapshot device. On other platforms
//! (or when snapshotting fails) an already-staged copy is accepted instead.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::extract::ExtractError;

pub fn ensure_staging_dir(dir: &Path) -> Result<(), ExtractError> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}

/// Stage a possibly-locked artifact into `staging_dir`.
///
/// Order: direct copy, volume-shadow copy (Windows only), then any
/// already-staged file matching one of `fallback_names`. Exhausting all
/// three is a permission failure.
pub fn stage_locked_artifact(
    source: &Path,
    staging_dir: &Path,
    fallback_names: &[String],
) -> Result<PathBuf, ExtractError> {
    ensure_staging_dir(staging_dir)?;
    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or(ExtractError::NotFound)?;
    let staged = staging_dir.join(&file_name);

    if source.is_file() {
        match std::fs::copy(source, &staged) {
            Ok(_) => return Ok(staged),
            Err(e) => debug!("direct copy of {} failed: {e}", source.display()),
        }

        #[cfg(windows)]
        match shadow_copy(source, &staged) {
            Ok(()) => return Ok(staged),
            Err(e) => tracing::warn!("shadow copy of {} failed: {e}", source.display()),
        }
    }

    for name in fallback_names {
        let candidate = staging_dir.join(name);
        if candidate.is_file() {
            debug!("using already-staged artifact {}", candidate.display());
            return Ok(candidate);
        }
    }

    Err(ExtractError::Permission(format!(
        "{}: locked and no staged copy available",
        source.display()
    )))
}

/// Copy a locked file out through a transient volume shadow snapshot.
#[cfg(windows)]
fn shadow_copy(source: &Path, dest: &Path) -> std::io::Result<()> {
    use std::io::{Error, ErrorKind};
    use std::process::Command;

    let volume = source
        .components()
        .next()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .ok_or_else(|| Error::new(ErrorKind::InvalidInput, "source has no volume prefix"))?;

    let created = Command::new("vssadmin")
        .args(["create", "shadow", &format!("/For={volume}")])
        .output()?;
    if !created.status.success() {
        return Err(Error::new(ErrorKind::PermissionDenied, "vssadmin create shadow failed"));
    }

    let stdout = String::from_utf8_lossy(&created.stdout);
    let device = stdout
        .lines()
        .find_map(|line| line.split("Shadow Copy Volume Name:").nth(1))
        .map(str::trim)
        .ok_or_else(|| Error::new(ErrorKind::Other, "no shadow volume in vssadmin output"))?
        .to_string();
    let shadow_id = stdout
        .lines()
        .find_map(|line| line.split("Shadow Copy ID:").nth(1))
        .map(str::trim)
        .map(str::to_string);

    let relative: PathBuf = source.components().skip(1).collect();
    let shadow_path = PathBuf::from(&device).join(relative);
    let result = std::fs::copy(&shadow_path, dest).map(|_| ());

    if let Some(id) = shadow_id {
        let _ = Command::new("vssadmin")
            .args(["delete", "shadows", &format!("/Shadow={id}"), "/Quiet"])
            .output();
    }

    result
}
