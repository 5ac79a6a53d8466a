//! Copying plugin trees into and out of the managed install directory.
//!
//! Installed plugins live at `<install_dir>/<category>/<name>`.

use std::path::{Component, Path, PathBuf};

use {tracing::warn, walkdir::WalkDir};

use crate::{Error, Result, manifest::PluginDescriptor};

/// Where `descriptor` is installed under `install_dir`.
pub fn install_target(install_dir: &Path, descriptor: &PluginDescriptor) -> PathBuf {
    install_dir.join(&descriptor.category).join(&descriptor.name)
}

/// Whether `target` names a directory strictly below `root` without any
/// `.`, `..` or absolute component on the way.
fn stays_under(root: &Path, target: &Path) -> bool {
    target.strip_prefix(root).is_ok_and(|rest| {
        rest.components().next().is_some()
            && rest.components().all(|c| matches!(c, Component::Normal(_)))
    })
}

/// Copy `source` to `target`, replacing anything already there.
///
/// `target` must lie below `install_dir`. Symlinks are skipped rather than
/// followed.
pub fn copy_plugin_tree(source: &Path, install_dir: &Path, target: &Path) -> Result<usize> {
    if !stays_under(install_dir, target) {
        return Err(Error::message(format!(
            "install target {} is outside {}",
            target.display(),
            install_dir.display()
        )));
    }
    if !source.is_dir() {
        return Err(Error::message(format!(
            "plugin source is not a directory: {}",
            source.display()
        )));
    }
    let canonical_source = std::fs::canonicalize(source)?;
    if let Ok(canonical_target) = std::fs::canonicalize(target)
        && canonical_source.starts_with(&canonical_target)
    {
        return Err(Error::message("plugin source lies inside the install target"));
    }

    if target.exists() {
        std::fs::remove_dir_all(target)?;
    }
    std::fs::create_dir_all(target)?;

    let mut copied = 0;
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| Error::external("failed to walk plugin source", e))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| Error::external("plugin path escaped its source", e))?;
        let dest = target.join(relative);

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            warn!(path = %entry.path().display(), "skipping symlink in plugin source");
        } else if file_type.is_dir() {
            std::fs::create_dir_all(&dest)?;
        } else {
            std::fs::copy(entry.path(), &dest)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Delete an installed plugin directory if it lies under `install_dir`.
///
/// Returns `false` when `path` is outside the managed area.
pub fn remove_managed(install_dir: &Path, path: &Path) -> Result<bool> {
    let (Ok(root), Ok(dir)) = (std::fs::canonicalize(install_dir), std::fs::canonicalize(path)) else {
        return Ok(false);
    };
    if dir == root || !dir.starts_with(&root) {
        return Ok(false);
    }
    std::fs::remove_dir_all(&dir)?;

    // Drop the category directory once it is empty.
    if let Some(parent) = dir.parent()
        && parent != root
        && std::fs::read_dir(parent).is_ok_and(|mut d| d.next().is_none())
    {
        let _ = std::fs::remove_dir(parent);
    }
    Ok(true)
}
