//! Staged pack writes with transactional publish.
//!
//! Outputs stage into a scratch directory and publish in one pass:
//! existing files are backed up, each staged file lands via temp-file +
//! atomic rename, and any failure rolls the destination back. A
//! cancelled or failed compile therefore never leaves partial output
//! visible.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub fn stage_text(stage_root: &Path, rel_path: &str, text: &str) -> Result<()> {
    let staged = stage_root.join(rel_path);
    if let Some(parent) = staged.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(&staged, text.as_bytes())
        .with_context(|| format!("stage {}", staged.display()))?;
    Ok(())
}

pub fn stage_json<T: serde::Serialize>(stage_root: &Path, rel_path: &str, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize staged JSON")?;
    stage_text(stage_root, rel_path, &text)
}

pub fn stage_yaml<T: serde::Serialize>(stage_root: &Path, rel_path: &str, value: &T) -> Result<()> {
    let text = serde_yaml::to_string(value).context("serialize staged YAML")?;
    stage_text(stage_root, rel_path, &text)
}

/// Move everything under `stage_root` into `dest_root` transactionally.
/// `backup_root` receives displaced files; on error the destination is
/// restored and the error propagates.
pub fn publish(stage_root: &Path, backup_root: &Path, dest_root: &Path) -> Result<Vec<PathBuf>> {
    let staged_files = collect_files(stage_root)?;
    fs::create_dir_all(backup_root)
        .with_context(|| format!("create {}", backup_root.display()))?;

    let mut published = Vec::new();
    let mut displaced: Vec<(PathBuf, PathBuf)> = Vec::new();
    let mut created: Vec<PathBuf> = Vec::new();
    for staged in staged_files {
        let rel = staged
            .strip_prefix(stage_root)
            .context("strip stage prefix")?;
        let dest = dest_root.join(rel);
        if dest.exists() {
            let backup = backup_root.join(rel);
            if let Some(parent) = backup.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            fs::rename(&dest, &backup)
                .or_else(|_| fs::copy(&dest, &backup).map(|_| ()))
                .with_context(|| format!("back up {}", dest.display()))?;
            displaced.push((dest.clone(), backup));
        } else {
            created.push(dest.clone());
        }

        if let Err(err) = install_file(&staged, &dest) {
            roll_back(&published, &displaced, &created);
            return Err(err);
        }
        published.push(dest);
    }
    tracing::debug!(files = published.len(), dest = %dest_root.display(), "published pack");
    Ok(published)
}

fn install_file(staged: &Path, dest: &Path) -> Result<()> {
    let parent = dest
        .parent()
        .ok_or_else(|| anyhow!("destination {} has no parent", dest.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    let file_name = dest
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("staged");
    let tmp = parent.join(format!(".{file_name}.tmp"));
    fs::copy(staged, &tmp).with_context(|| format!("publish {}", dest.display()))?;
    fs::rename(&tmp, dest).with_context(|| format!("publish {}", dest.display()))?;
    Ok(())
}

fn roll_back(published: &[PathBuf], displaced: &[(PathBuf, PathBuf)], created: &[PathBuf]) {
    for path in published.iter().chain(created) {
        if path.exists() {
            let _ = fs::remove_file(path);
        }
    }
    for (dest, backup) in displaced {
        if let Some(parent) = dest.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let _ = fs::rename(backup, dest).or_else(|_| fs::copy(backup, dest).map(|_| ()));
    }
}

pub fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !root.exists() {
        return Ok(files);
    }
    for entry in fs::read_dir(root).with_context(|| format!("read {}", root.display()))? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            files.extend(collect_files(&path)?);
        } else if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
