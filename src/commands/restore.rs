//! `wpsync restore` — restore a backup set onto a site.
//!
//! The command is flexible about what it is given:
//!
//! - `--backup site@yyyy-mm-ddThh:mm:ss` names both the source site and the
//!   set; `--site` then only overrides the destination.
//! - `--backup yyyy-mm-ddThh:mm:ss` plus `--site` restores that set of the
//!   named site onto itself.
//! - `--site` alone restores the site's most recent backup onto it.
//! - With no selection flags, the selection is detected from the set's
//!   subdirectories — whatever was backed up gets restored.

use std::path::Path;

use anyhow::bail;

use super::{Ctx, preflight};
use crate::{
    cli::Selection,
    config::Site,
    error::{Error, Result},
    transport::Connection,
};

pub fn run(
    ctx: &Ctx,
    backup_arg: Option<&str>,
    site_arg: Option<&str>,
    select: Selection,
) -> anyhow::Result<()> {
    let id_parts = backup_arg.map(parse_backup_id).transpose()?;
    let id_site_name = id_parts.as_ref().and_then(|(site, _)| site.clone());
    let given_id = id_parts.map(|(_, ts)| ts);

    // Destination: --site wins, then the site@ prefix of the backup id.
    let dest: &Site = match (site_arg, &id_site_name) {
        (Some(name), _) => ctx.config.site_or_err(name)?,
        (None, Some(name)) => ctx.config.site_or_err(name)?,
        (None, None) => bail!(
            "you must either provide a fully qualified backup id (site@timestamp) or a site name"
        ),
    };

    // Source: the site the backup came from; defaults to the destination.
    let source: &Site = match &id_site_name {
        Some(name) => ctx.config.site_or_err(name)?,
        None => dest,
    };

    let fs_id = match given_id {
        Some(ts) => ts.replace(':', "_"),
        None => latest_backup_id(ctx.workdir, source)?,
    };

    // No flags means "restore what the set contains".
    let select = if select.any() {
        select
    } else {
        detect_selection(ctx.workdir, source, &fs_id)
    };

    preflight(&[source, dest])?;
    let conn = Connection::open(dest)?;
    crate::restore::restore(
        ctx.workdir,
        source,
        dest,
        &conn,
        ctx.log,
        ctx.quiet,
        &fs_id,
        select,
    )?;
    Ok(())
}

// ─── Backup-id resolution ─────────────────────────────────────────────────────

/// Parse `[site@]yyyy-mm-ddThh:mm:ss` into its site prefix and timestamp.
fn parse_backup_id(arg: &str) -> anyhow::Result<(Option<String>, String)> {
    let (site, timestamp) = match arg.rsplit_once('@') {
        Some((site, ts)) => (Some(site.to_string()), ts),
        None => (None, arg),
    };
    if chrono::NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S").is_err() {
        bail!("wrong backup id format, it should look like [site@]yyyy-mm-ddThh:mm:ss");
    }
    Ok((site, timestamp.to_string()))
}

/// Most recent backup-set ID (filesystem-safe form) of `site`.
fn latest_backup_id(workdir: &Path, site: &Site) -> Result<String> {
    let backups_dir = workdir.join("backups").join(site.fs_safe_name());
    let not_found = || Error::BackupNotFound(format!("there are no backups of {}", site.name));

    let mut ids: Vec<String> = std::fs::read_dir(&backups_dir)
        .map_err(|_| not_found())?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    ids.sort();
    ids.pop().ok_or_else(not_found)
}

/// Selection matching exactly what the backup set contains.
fn detect_selection(workdir: &Path, site: &Site, fs_id: &str) -> Selection {
    let backup_dir = workdir
        .join("backups")
        .join(site.fs_safe_name())
        .join(fs_id);
    Selection {
        database: backup_dir.join("database").is_dir(),
        uploads: backup_dir.join("uploads").is_dir(),
        plugins: backup_dir.join("plugins").is_dir(),
        themes: backup_dir.join("themes").is_dir(),
        all: false,
        full: backup_dir.join("full").is_dir(),
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
