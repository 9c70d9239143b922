//! Discovery and creation of the `.beads/` directory.

use std::path::{Path, PathBuf};

use crate::config::{BeadsConfig, ConfigError};

/// The name of the beads metadata directory.
pub const BEADS_DIR_NAME: &str = ".beads";

/// Database file created by `bd init`.
pub const DEFAULT_DB_FILE: &str = "beads.db";

/// Overrides discovery when set to an existing directory.
const BEADS_DIR_ENV: &str = "BEADS_DIR";

/// Finds the `.beads/` directory for `start`.
///
/// `BEADS_DIR` wins when it names a directory; otherwise the tree is walked
/// up from `start` until a `.beads/` child is found.
pub fn find_beads_dir(start: &Path) -> Option<PathBuf> {
    if let Ok(env_dir) = std::env::var(BEADS_DIR_ENV) {
        let env_path = PathBuf::from(env_dir);
        if env_path.is_dir() {
            return Some(env_path);
        }
    }

    let start = start.canonicalize().ok()?;
    start
        .ancestors()
        .map(|dir| dir.join(BEADS_DIR_NAME))
        .find(|candidate| candidate.is_dir())
}

/// Like [`find_beads_dir`], but an error when nothing is found.
pub fn find_beads_dir_or_error(start: &Path) -> Result<PathBuf, ConfigError> {
    find_beads_dir(start).ok_or(ConfigError::BeadsDirNotFound)
}

/// Creates `.beads/` under `path` (or `path` itself if already named
/// `.beads`) and returns it.
pub fn ensure_beads_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    let beads_dir = if path.ends_with(BEADS_DIR_NAME) {
        path.to_path_buf()
    } else {
        path.join(BEADS_DIR_NAME)
    };
    std::fs::create_dir_all(&beads_dir)?;
    Ok(beads_dir)
}

/// The SQLite file for a project: `db` from config, resolved against the
/// project root, or `.beads/beads.db`.
pub fn database_path(beads_dir: &Path, config: &BeadsConfig) -> PathBuf {
    match config.db.as_deref() {
        Some(db) if Path::new(db).is_absolute() => PathBuf::from(db),
        Some(db) => beads_dir.parent().unwrap_or(beads_dir).join(db),
        None => beads_dir.join(DEFAULT_DB_FILE),
    }
}
