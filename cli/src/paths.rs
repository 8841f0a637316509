use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::BaseDirs;

/// The current user's home directory
pub fn home_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/// Replaces a leading `~` with the home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    let Some(rest) = path.strip_prefix('~') else {
        return Ok(PathBuf::from(path));
    };
    // `~user` is not supported
    if !(rest.is_empty() || rest.starts_with('/')) {
        return Ok(PathBuf::from(path));
    }
    let home = home_dir().context("cannot expand '~': no home directory")?;
    Ok(home.join(rest.trim_start_matches('/')))
}

/// Home-expands `path` and makes it absolute against the working directory.
pub fn resolve(path: &str) -> Result<PathBuf> {
    let expanded = expand_home(path)?;
    absolute(&expanded)
}

/// True for locations such as `memory:///` or `s3://bucket/prefix` that are
/// handed to a backend as they are.
pub fn is_url(location: &str) -> bool {
    location
        .split_once("://")
        .is_some_and(|(scheme, _)| !scheme.is_empty() && !scheme.contains('/'))
}

/// Resolves a datastore location: URLs pass through, paths are resolved.
pub fn store_location(location: &str) -> Result<PathBuf> {
    if is_url(location) {
        return Ok(PathBuf::from(location));
    }
    resolve(location)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = env::current_dir().context("failed to read the working directory")?;
    Ok(cwd.join(path))
}
