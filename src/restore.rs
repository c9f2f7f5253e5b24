//! Restore orchestrator.
//!
//! The inverse of [`crate::backup`]: takes a backup set and a destination
//! site and mirrors the selected categories back. Restoring onto a
//! *different* site than the backup came from additionally means:
//!
//! - the dump is rewritten to the destination's database settings
//!   ([`crate::dump`]) before import,
//! - the source site's URL is replaced with the destination's inside the
//!   imported database (serialized-data aware, done by the execution
//!   server's `replace` command),
//! - a full-site restore excludes `.htaccess` and `wp-config.php` from the
//!   mirror, rewrites the config's database defines to the destination's
//!   values, and uploads a neutral default `.htaccess`.
//!
//! Failure policy: a missing prerequisite backup aborts the whole restore
//! with an actionable message; any other failure is fatal only to its own
//! category — the remaining categories are still attempted.

use std::{fs, io::Write, path::Path};

use regex::Regex;

use crate::{
    backup::CONTENT_DIRS,
    cli::Selection,
    config::Site,
    dump,
    error::{Error, Result},
    host_info::HostInfo,
    server::{RemoteServer, php_escape},
    transport::Connection,
    ui::{Log, spinner},
};

/// Neutral `.htaccess` uploaded after a cross-site full restore — the
/// stock WordPress rewrite block, valid on any host.
const DEFAULT_HTACCESS: &str = "\
# BEGIN WordPress
<IfModule mod_rewrite.c>
RewriteEngine On
RewriteBase /
RewriteRule ^index\\.php$ - [L]
RewriteCond %{REQUEST_FILENAME} !-f
RewriteCond %{REQUEST_FILENAME} !-d
RewriteRule . /index.php [L]
</IfModule>
# END WordPress
";

/// Restore the backup set `backup_id` (filesystem-safe form) of `source`
/// onto `dest` through `conn`.
pub fn restore(
    workdir: &Path,
    source: &Site,
    dest: &Site,
    conn: &Connection,
    log: &dyn Log,
    quiet: bool,
    backup_id: &str,
    select: Selection,
) -> Result<()> {
    let backup_dir = workdir
        .join("backups")
        .join(source.fs_safe_name())
        .join(backup_id);

    let mut what = format!("{}@{}", source.name, backup_id.replace('_', ":"));
    if source.name != dest.name {
        what.push_str(&format!(" to {}", dest.name));
    }
    log.title(&format!("Restoring {what}"));

    let select = select.resolved();

    if select.database || select.full {
        match restore_database(workdir, source, dest, conn, log, quiet, &backup_dir) {
            Err(e @ Error::BackupNotFound(_)) => return Err(e),
            Err(e) => log.error(&format!("Error restoring database: {e}")),
            Ok(()) => {}
        }
    }

    for name in CONTENT_DIRS {
        if select.contains(name) {
            if let Err(e) = restore_content_dir(dest, conn, log, quiet, &backup_dir, name) {
                log.error(&format!("Error restoring {name}: {e}"));
            }
        }
    }

    if select.full {
        if let Err(e) = restore_full(source, dest, conn, log, quiet, &backup_dir) {
            log.error(&format!("Error restoring full site: {e}"));
        }
    }

    Ok(())
}

// ─── Database ─────────────────────────────────────────────────────────────────

fn restore_database(
    workdir: &Path,
    source: &Site,
    dest: &Site,
    conn: &Connection,
    log: &dyn Log,
    quiet: bool,
    backup_dir: &Path,
) -> Result<()> {
    let dump_file = backup_dir.join("database").join("dump.sql");
    if !dump_file.is_file() {
        log.error("Database is not contained in this backup");
        return Ok(());
    }
    log.step("Restoring database");

    let cross_site = source.name != dest.name;
    let mut host = HostInfo::new(workdir, dest)?;

    // Cross-site restores rewrite the dump to the destination's settings
    // first; the rewritten copy is staged in a temp file that dies with
    // this function.
    let staged;
    let upload_path = if cross_site {
        log.info("Altering database dump to match target settings");
        let settings = host.database_settings().map_err(|e| match e {
            Error::BackupNotFound(msg) => Error::BackupNotFound(format!(
                "{msg} — create a backup of {} first",
                dest.name
            )),
            other => other,
        })?;
        let text = fs::read_to_string(&dump_file)?;
        let mut tmp = tempfile::NamedTempFile::new()?;
        tmp.write_all(dump::adapt_dump(&text, &settings).as_bytes())?;
        staged = tmp;
        staged.path().to_path_buf()
    } else {
        dump_file
    };

    let remote_dump = conn.scratch_path("dump.sql");
    let pb = spinner(!quiet, "Uploading dump");
    let uploaded = conn.put(&upload_path, &remote_dump);
    pb.finish_and_clear();
    uploaded?;

    let server = RemoteServer::install(conn, &mut host)?;

    let pb = spinner(!quiet, "Importing dump");
    let imported = server.run("import", &[("dump_file_name", "dump.sql")]);
    pb.finish_and_clear();

    // The uploaded dump never outlives the import attempt.
    conn.remove(&remote_dump)?;

    if let Err(e) = imported {
        log.error(&format!("Error importing the SQL dump: {e}"));
        return Ok(());
    }

    if cross_site {
        log.step("Replacing urls in the database");
        let pb = spinner(!quiet, "Rewriting serialized data");
        let replaced = server.run("replace", &[
            ("search", source.base_url.as_str()),
            ("replace", dest.base_url.as_str()),
        ]);
        pb.finish_and_clear();
        if let Err(e) = replaced {
            // The import itself succeeded; a failed URL rewrite is reported
            // but does not undo it.
            log.error(&format!("Error replacing urls in the database: {e}"));
        }
    }
    Ok(())
}

// ─── Content categories ───────────────────────────────────────────────────────

fn restore_content_dir(
    dest: &Site,
    conn: &Connection,
    log: &dyn Log,
    quiet: bool,
    backup_dir: &Path,
    name: &str,
) -> Result<()> {
    let local_dir = backup_dir.join(name);
    if !local_dir.is_dir() {
        log.error(&format!("{name} is not contained in this backup"));
        return Ok(());
    }
    log.step(&format!("Restoring {name}"));

    let remote_dir = format!("{}wp-content/{name}", dest.base_dir);
    if !conn.dir_exists(&remote_dir)? {
        log.info(&format!(
            "wp-content/{name} doesn't exist on {}, creating it",
            dest.name
        ));
        conn.mkdir(&remote_dir)?;
    }

    let pb = spinner(!quiet, &format!("Mirroring {name}"));
    let result = conn.mirror_reverse(&local_dir, &remote_dir, &[]);
    pb.finish_and_clear();
    result
}

// ─── Full site ────────────────────────────────────────────────────────────────

fn restore_full(
    source: &Site,
    dest: &Site,
    conn: &Connection,
    log: &dyn Log,
    quiet: bool,
    backup_dir: &Path,
) -> Result<()> {
    let local_dir = backup_dir.join("full");
    if !local_dir.is_dir() {
        log.error("Full site is not contained in this backup");
        return Ok(());
    }
    log.step("Restoring full site");

    let cross_site = source.name != dest.name;
    let remote_dir = dest.base_dir.trim_end_matches('/');

    // Host-specific files must not travel between different hosts.
    let exclude: Vec<String> = if cross_site {
        vec![".htaccess".into(), "wp-config.php".into()]
    } else {
        Vec::new()
    };

    let pb = spinner(!quiet, "Mirroring site root");
    let mirrored = conn.mirror_reverse(&local_dir, remote_dir, &exclude);
    pb.finish_and_clear();
    mirrored?;

    if cross_site {
        log.step("Adapting wp-config.php for the target and uploading it");
        let wp_config = local_dir.join("wp-config.php");
        if wp_config.is_file() {
            let adapted = adapt_wp_config(&fs::read_to_string(&wp_config)?, dest);
            let mut tmp = tempfile::NamedTempFile::new()?;
            tmp.write_all(adapted.as_bytes())?;
            conn.put(tmp.path(), &format!("{}wp-config.php", dest.base_dir))?;
        } else {
            log.warn("wp-config.php is not contained in this backup, skipping adaptation");
        }

        log.step("Uploading default .htaccess");
        conn.cat_write(&format!("{}.htaccess", dest.base_dir), DEFAULT_HTACCESS)?;
    }
    Ok(())
}

/// Rewrite the database defines of a `wp-config.php` to `site`'s values.
/// Everything else (salts, table prefix, custom code) passes through.
pub(crate) fn adapt_wp_config(content: &str, site: &Site) -> String {
    let mut adapted = content.to_string();
    for (key, value) in [
        ("DB_NAME", &site.mysql_name),
        ("DB_USER", &site.mysql_user),
        ("DB_PASSWORD", &site.mysql_pass),
        ("DB_HOST", &site.mysql_host),
    ] {
        let pattern =
            format!(r#"define\s*\(\s*['"]{key}['"]\s*,\s*('[^']*'|"[^"]*")\s*\)"#);
        let re = Regex::new(&pattern).unwrap();
        let replacement = format!("define('{key}', '{}')", php_escape(value));
        adapted = re.replace_all(&adapted, regex::NoExpand(&replacement)).into_owned();
    }
    adapted
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backup, config::Protocol, ui::NullLog};

    fn local_site(name: &str, base_dir: &str) -> Site {
        Site {
            name: name.into(),
            aliases: vec![],
            protocol: Protocol::File,
            base_url: format!("http://{name}.example.org"),
            file_url: None,
            base_dir: base_dir.into(),
            user: None,
            host: None,
            password: None,
            http_user: None,
            http_pass: None,
            mysql_host: "localhost".into(),
            mysql_name: format!("wp_{name}"),
            mysql_user: format!("user_{name}"),
            mysql_pass: format!("pass_{name}"),
            mysql_port: 3306,
            sudo_remote: false,
            chown_remote: None,
            chgrp_remote: None,
            no_verify_ssl: false,
        }
    }

    const WP_CONFIG: &str = r#"<?php
define( 'DB_NAME', 'old_db' );
define( 'DB_USER', "old_user" );
define( 'DB_PASSWORD', 'old_pass' );
define( 'DB_HOST', 'old-host.example.org' );
define( 'AUTH_KEY', 'keep~this$alone' );
$table_prefix = 'wp_';
"#;

    // ── adapt_wp_config ───────────────────────────────────────────────────────

    #[test]
    fn all_four_defines_are_rewritten() {
        let site = local_site("dest", "/var/www/");
        let out = adapt_wp_config(WP_CONFIG, &site);
        assert!(out.contains("define('DB_NAME', 'wp_dest')"));
        assert!(out.contains("define('DB_USER', 'user_dest')"));
        assert!(out.contains("define('DB_PASSWORD', 'pass_dest')"));
        assert!(out.contains("define('DB_HOST', 'localhost')"));
        assert!(!out.contains("old_db"));
    }

    #[test]
    fn unrelated_defines_survive() {
        let site = local_site("dest", "/var/www/");
        let out = adapt_wp_config(WP_CONFIG, &site);
        assert!(out.contains("define( 'AUTH_KEY', 'keep~this$alone' )"));
        assert!(out.contains("$table_prefix = 'wp_';"));
    }

    #[test]
    fn quotes_in_credentials_are_escaped() {
        let mut site = local_site("dest", "/var/www/");
        site.mysql_pass = "it's$1".into();
        let out = adapt_wp_config(WP_CONFIG, &site);
        assert!(out.contains(r"define('DB_PASSWORD', 'it\'s$1')"));
    }

    // ── category restore over the local transport ─────────────────────────────

    fn selection_uploads() -> Selection {
        Selection {
            uploads: true,
            ..Selection::default()
        }
    }

    #[test]
    fn backup_then_restore_is_idempotent_for_same_site() {
        let tmp = tempfile::tempdir().unwrap();
        let site_root = tmp.path().join("site");
        let uploads = site_root.join("wp-content/uploads");
        fs::create_dir_all(uploads.join("2024")).unwrap();
        fs::write(uploads.join("2024/a.jpg"), "original-a").unwrap();
        fs::write(uploads.join("b.txt"), "original-b").unwrap();
        let workdir = tmp.path().join(".wpsync");

        let site = local_site("mine", &format!("{}/", site_root.display()));

        let fs_ts = {
            let conn = Connection::open(&site).unwrap();
            backup::backup(&workdir, &site, &conn, &NullLog, true, selection_uploads()).unwrap()
        };

        // Local drift after the backup must be rolled back by the restore.
        fs::write(uploads.join("b.txt"), "drifted").unwrap();
        fs::write(uploads.join("stray.tmp"), "extraneous").unwrap();

        {
            let conn = Connection::open(&site).unwrap();
            restore(
                &workdir, &site, &site, &conn, &NullLog, true, &fs_ts,
                selection_uploads(),
            )
            .unwrap();
        }

        assert_eq!(fs::read_to_string(uploads.join("2024/a.jpg")).unwrap(), "original-a");
        assert_eq!(fs::read_to_string(uploads.join("b.txt")).unwrap(), "original-b");
        assert!(!uploads.join("stray.tmp").exists(), "extraneous entries are deleted");
    }

    #[test]
    fn missing_category_in_backup_is_reported_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let site_root = tmp.path().join("site");
        fs::create_dir_all(&site_root).unwrap();
        let workdir = tmp.path().join(".wpsync");
        let site = local_site("mine", &format!("{}/", site_root.display()));

        // A backup set that only contains themes.
        let backup_dir = workdir.join("backups/mine/2024-01-01T10_00_00");
        fs::create_dir_all(backup_dir.join("themes")).unwrap();

        let conn = Connection::open(&site).unwrap();
        let select = Selection {
            uploads: true,
            themes: true,
            ..Selection::default()
        };
        restore(
            &workdir, &site, &site, &conn, &NullLog, true, "2024-01-01T10_00_00", select,
        )
        .unwrap();

        // The present category was still restored.
        assert!(site_root.join("wp-content/themes").is_dir());
    }

    #[test]
    fn cross_site_full_restore_adapts_config_and_htaccess() {
        let tmp = tempfile::tempdir().unwrap();
        let dest_root = tmp.path().join("dest");
        fs::create_dir_all(&dest_root).unwrap();
        fs::write(dest_root.join(".htaccess"), "dest-specific rules").unwrap();
        let workdir = tmp.path().join(".wpsync");

        let source = local_site("src", "/nonexistent/src/");
        let dest = local_site("dst", &format!("{}/", dest_root.display()));

        // Fabricate a full backup of the source.
        let full = workdir.join("backups/src/2024-01-01T10_00_00/full");
        fs::create_dir_all(&full).unwrap();
        fs::write(full.join("index.php"), "<?php // site").unwrap();
        fs::write(full.join("wp-config.php"), WP_CONFIG).unwrap();
        fs::write(full.join(".htaccess"), "source-specific rules").unwrap();

        let conn = Connection::open(&dest).unwrap();
        let select = Selection {
            full: true,
            ..Selection::default()
        };
        // The database part reports "not contained" and moves on; full runs.
        restore(
            &workdir, &source, &dest, &conn, &NullLog, true, "2024-01-01T10_00_00", select,
        )
        .unwrap();

        assert_eq!(
            fs::read_to_string(dest_root.join("index.php")).unwrap(),
            "<?php // site"
        );
        let config = fs::read_to_string(dest_root.join("wp-config.php")).unwrap();
        assert!(config.contains("define('DB_NAME', 'wp_dst')"));
        assert!(!config.contains("old_db"), "source credentials must not leak");
        assert_eq!(
            fs::read_to_string(dest_root.join(".htaccess")).unwrap(),
            DEFAULT_HTACCESS,
            "cross-site restore installs the neutral .htaccess"
        );
    }

    #[test]
    fn same_site_full_restore_keeps_config_verbatim() {
        let tmp = tempfile::tempdir().unwrap();
        let site_root = tmp.path().join("site");
        fs::create_dir_all(&site_root).unwrap();
        let workdir = tmp.path().join(".wpsync");
        let site = local_site("mine", &format!("{}/", site_root.display()));

        let full = workdir.join("backups/mine/2024-01-01T10_00_00/full");
        fs::create_dir_all(&full).unwrap();
        fs::write(full.join("wp-config.php"), WP_CONFIG).unwrap();
        fs::write(full.join(".htaccess"), "my own rules").unwrap();

        let conn = Connection::open(&site).unwrap();
        let select = Selection {
            full: true,
            ..Selection::default()
        };
        restore(
            &workdir, &site, &site, &conn, &NullLog, true, "2024-01-01T10_00_00", select,
        )
        .unwrap();

        assert_eq!(
            fs::read_to_string(site_root.join("wp-config.php")).unwrap(),
            WP_CONFIG
        );
        assert_eq!(
            fs::read_to_string(site_root.join(".htaccess")).unwrap(),
            "my own rules"
        );
    }
}
