use std::{
    env,
    ffi::OsString,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

#[cfg(windows)]
pub const SEARCH_PATH_VAR: &str = "PATH";
#[cfg(target_os = "macos")]
pub const SEARCH_PATH_VAR: &str = "DYLD_LIBRARY_PATH";
#[cfg(not(any(windows, target_os = "macos")))]
pub const SEARCH_PATH_VAR: &str = "LD_LIBRARY_PATH";

/// Outcome of [`ensure_library_search_path`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchPathUpdate {
    /// The directory was already listed.
    Present,
    /// The directory was appended for this process.
    Added,
    /// The directory is missing and the dynamic loader only reads the
    /// variable at process launch, so it has to be set before starting.
    NeedsRestart,
}

/// Directory of the running executable, where the tracker's native
/// dependencies are installed next to it.
pub fn plugin_directory() -> Option<PathBuf> {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Returns `current` with `dir` appended, or `None` if it is already listed.
pub fn with_directory(current: Option<OsString>, dir: &Path) -> Result<Option<OsString>> {
    let mut paths: Vec<PathBuf> = current
        .as_deref()
        .map(|value| env::split_paths(value).collect())
        .unwrap_or_default();

    if paths.iter().any(|existing| existing == dir) {
        return Ok(None);
    }

    paths.push(dir.to_path_buf());
    let joined = env::join_paths(paths)
        .with_context(|| format!("cannot add {} to the library search path", dir.display()))?;
    Ok(Some(joined))
}

/// Makes sure `dir` is part of the process's dynamic-library search path.
///
/// Only Windows consults `PATH` when a library is loaded at runtime; there
/// the directory is appended. Elsewhere the variable is left untouched.
pub fn ensure_library_search_path(dir: &Path) -> Result<SearchPathUpdate> {
    let Some(updated) = with_directory(env::var_os(SEARCH_PATH_VAR), dir)? else {
        return Ok(SearchPathUpdate::Present);
    };
    append_to_search_path(updated)
}

#[cfg(windows)]
fn append_to_search_path(updated: OsString) -> Result<SearchPathUpdate> {
    // SAFETY: the Windows environment block is guarded by the OS, so
    // `set_var` is sound with other threads running.
    unsafe {
        env::set_var(SEARCH_PATH_VAR, &updated);
    }
    Ok(SearchPathUpdate::Added)
}

#[cfg(not(windows))]
fn append_to_search_path(_updated: OsString) -> Result<SearchPathUpdate> {
    Ok(SearchPathUpdate::NeedsRestart)
}
