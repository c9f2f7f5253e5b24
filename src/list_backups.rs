//! Backup-set listing.
//!
//! A backup set's subdirectories are the sole source of truth for what it
//! contains, so listing is pure directory inspection — nothing is opened or
//! parsed. Selection flags act as filters: each category flag requires its
//! subdirectory to be present, `--all` requires all four content categories
//! at once, `--full` requires a full-site snapshot.

use std::path::Path;

use crate::cli::Selection;

/// Produce the listing lines for `sites` (pairs of display name and
/// filesystem-safe name). With `single` set the `site@` prefix is omitted
/// and an empty site yields an explanatory line instead of silence.
pub fn list_backups(
    workdir: &Path,
    sites: &[(String, String)],
    single: bool,
    select: Selection,
) -> Vec<String> {
    let select = select.resolved();
    let mut lines = Vec::new();

    for (name, fs_safe) in sites {
        let site_backup_dir = workdir.join("backups").join(fs_safe);
        let mut ids: Vec<String> = match std::fs::read_dir(&site_backup_dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir())
                .filter_map(|e| e.file_name().into_string().ok())
                .collect(),
            Err(_) => {
                if single {
                    lines.push(format!("There are no backups for {name}."));
                }
                continue;
            }
        };
        ids.sort();

        for id in ids {
            let backup_dir = site_backup_dir.join(&id);
            let mut details: Vec<String> = match std::fs::read_dir(&backup_dir) {
                Ok(entries) => entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| e.file_name().into_string().ok())
                    .collect(),
                Err(_) => continue,
            };
            details.sort();

            let has = |what: &str| details.iter().any(|d| d == what);
            let mut listed = !details.is_empty();
            if select.database {
                listed = listed && has("database");
            }
            if select.uploads {
                listed = listed && has("uploads");
            }
            if select.plugins {
                listed = listed && has("plugins");
            }
            if select.themes {
                listed = listed && has("themes");
            }
            if select.full {
                listed = listed && has("full");
            }
            if !listed {
                continue;
            }

            let mut title = id.replace('_', ":");
            if !single {
                title = format!("{name}@{title}");
            }
            lines.push(format!("{title} {}", details.join(" ")));
        }
    }
    lines
}

// ─── Tests ────────────────────────────────────────────────────────────────────
