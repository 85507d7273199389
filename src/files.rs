//! Path confinement and atomic replacement of engine files.
//!
//! Every file the dashboard rewrites (HOST_CONFIG, DIR_CONFIG sources,
//! INFO files) goes through [`write_atomic`], which writes a hidden sibling
//! and renames it over the target so readers never see partial content.
//!
//! Engine files are Latin-1. [`decode_latin1`] and [`encode_latin1`] map
//! bytes to chars one for one, so unchanged text survives a rewrite byte
//! for byte.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use tempfile::Builder;

use crate::{AppError, Result};

/// Resolve `candidate` relative to `base`, rejecting anything that leaves it.
///
/// Absolute paths and `..` segments are refused outright. An existing target
/// is canonicalized so a symlink pointing outside `base` is refused too.
///
/// # Errors
///
/// Returns `AppError::PathViolation` if `base` cannot be canonicalized or
/// the candidate escapes it.
pub fn resolve_within(base: &Path, candidate: impl AsRef<Path>) -> Result<PathBuf> {
    let root = base
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("base directory invalid: {err}")))?;

    let mut relative = PathBuf::new();
    for component in candidate.as_ref().components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(AppError::PathViolation(format!(
                    "{} is not a plain relative path",
                    candidate.as_ref().display()
                )));
            }
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(AppError::PathViolation("empty file name".into()));
    }

    let absolute = root.join(relative);
    if absolute.exists() {
        let canonical = absolute
            .canonicalize()
            .map_err(|err| AppError::PathViolation(format!("cannot resolve path: {err}")))?;
        if !canonical.starts_with(&root) {
            return Err(AppError::PathViolation(
                "symlink target escapes base directory".into(),
            ));
        }
    }
    Ok(absolute)
}

/// Replace `target` with `content` via a hidden temp file in the same
/// directory followed by a rename.
///
/// # Errors
///
/// Returns `AppError::Io` if the temp file cannot be created, written or
/// renamed over `target`.
pub fn write_atomic(target: &Path, content: &[u8]) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| AppError::Io(format!("{} has no parent directory", target.display())))?;
    let prefix = format!(
        ".{}",
        target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    );

    let mut tmp = Builder::new()
        .prefix(&prefix)
        .tempfile_in(parent)
        .map_err(|err| AppError::Io(format!("failed to create temporary file: {err}")))?;
    tmp.write_all(content)
        .map_err(|err| AppError::Io(format!("failed to write temporary file: {err}")))?;
    tmp.persist(target).map_err(|err| {
        AppError::Io(format!("failed to persist {}: {}", target.display(), err.error))
    })?;
    Ok(())
}

/// Bytes as Latin-1 text, one char per byte.
#[must_use]
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Text as Latin-1 bytes. Chars above U+00FF have no encoding and become `?`.
#[must_use]
pub fn encode_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// Read `path` as Latin-1 text.
///
/// # Errors
///
/// Returns `AppError::NotFound` for a missing file and `AppError::Io` for
/// any other read failure.
pub fn read_latin1(path: &Path) -> Result<String> {
    Ok(decode_latin1(&std::fs::read(path)?))
}

/// [`write_atomic`] of `text` encoded as Latin-1.
///
/// # Errors
///
/// See [`write_atomic`].
pub fn write_latin1(target: &Path, text: &str) -> Result<()> {
    write_atomic(target, &encode_latin1(text))
}
