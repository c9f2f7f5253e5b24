//! Local-filesystem transport.
//!
//! Everything is a direct `std::fs` call; the mirror operations delegate to
//! a recursive copy-with-delete utility so a `protocol = "file"` site needs
//! no external tools at all.

use std::{fs, path::Path};

use glob::Pattern;

use super::{Transport, run_checked};
use crate::error::{Error, Result};

pub struct LocalTransport;

impl Transport for LocalTransport {
    fn dir_exists(&self, path: &str) -> Result<bool> {
        Ok(Path::new(path).is_dir())
    }

    fn file_exists(&self, path: &str) -> Result<bool> {
        Ok(Path::new(path).is_file())
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn rmdir(&self, path: &str) -> Result<()> {
        fs::remove_dir_all(path)?;
        Ok(())
    }

    fn get(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        fs::copy(remote_path, local_path)?;
        Ok(())
    }

    fn put(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        fs::copy(local_path, remote_path)?;
        Ok(())
    }

    fn mirror(&self, remote_dir: &str, local_dir: &Path) -> Result<()> {
        copy_with_delete(Path::new(remote_dir), local_dir, &[])
    }

    fn mirror_reverse(
        &self,
        local_dir: &Path,
        remote_dir: &str,
        exclude: &[String],
    ) -> Result<()> {
        let patterns = compile_patterns(exclude)?;
        copy_with_delete(local_dir, Path::new(remote_dir), &patterns)
    }

    fn cat(&self, path: &str) -> Result<String> {
        Ok(fs::read_to_string(path)?)
    }

    fn cat_write(&self, path: &str, content: &str) -> Result<()> {
        fs::write(path, content)?;
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<()> {
        fs::remove_file(path)?;
        Ok(())
    }

    fn shell(&self, command: &str) -> Result<String> {
        run_checked(&["sh".into(), "-c".into(), command.into()])
    }

    fn has_shell(&self) -> bool {
        true
    }
}

// ─── Copy with delete ─────────────────────────────────────────────────────────

fn compile_patterns(exclude: &[String]) -> Result<Vec<Pattern>> {
    exclude
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| Error::Transport {
                command: "mirror".into(),
                detail: format!("invalid exclude pattern {p}: {e}"),
            })
        })
        .collect()
}

/// `true` when `name` matches any exclude pattern. Patterns apply to entry
/// names at every depth, matching the basename semantics of
/// `rsync --exclude` for the patterns this tool uses.
fn excluded(name: &str, patterns: &[Pattern]) -> bool {
    patterns.iter().any(|p| p.matches(name))
}

/// Recursively copy `src` into `dst`, then delete `dst` entries that do not
/// exist in `src`. Excluded names are neither copied nor deleted.
fn copy_with_delete(src: &Path, dst: &Path, exclude: &[Pattern]) -> Result<()> {
    fs::create_dir_all(dst)?;

    let mut keep: Vec<std::ffi::OsString> = Vec::new();
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if excluded(&name.to_string_lossy(), exclude) {
            continue;
        }
        let target = dst.join(&name);
        if entry.file_type()?.is_dir() {
            copy_with_delete(&entry.path(), &target, exclude)?;
        } else {
            if target.is_dir() {
                fs::remove_dir_all(&target)?;
            }
            fs::copy(entry.path(), &target)?;
        }
        keep.push(name);
    }

    for entry in fs::read_dir(dst)? {
        let entry = entry?;
        let name = entry.file_name();
        if excluded(&name.to_string_lossy(), exclude) || keep.contains(&name) {
            continue;
        }
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────────────────
