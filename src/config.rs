//! Configuration types and loading logic.
//!
//! `Config` is a direct 1-to-1 mapping of `wpsync.toml`: one `[sites.<name>]`
//! table per WordPress installation. A `Site` is constructed once from the
//! validated file and is immutable afterwards — orchestrators share it by
//! reference for the whole operation.
//!
//! # File format
//!
//! ```toml
//! [sites.production]
//! protocol   = "ssh"            # file | ssh | ftp | sftp
//! base_url   = "https://example.org"
//! base_dir   = "/var/www/html/" # normalised to end with a slash
//! user       = "deploy"
//! host       = "example.org"
//! mysql_host = "localhost"
//! mysql_name = "wordpress"
//! mysql_user = "wp"
//! mysql_pass = "hunter2"
//! aliases    = ["prod", "live"]
//!
//! [sites.local]
//! protocol   = "file"
//! base_url   = "http://localhost:8080"
//! base_dir   = "/home/alice/sites/local/"
//! mysql_host = "127.0.0.1"
//! mysql_name = "wordpress_dev"
//! mysql_user = "root"
//! mysql_pass = ""
//! ```
//!
//! # Credential invariants
//!
//! Which of `user`/`host`/`pass` are allowed depends on the protocol:
//! `file` forbids all three, `ssh` requires `user`+`host` and forbids `pass`
//! (key-based auth only), `ftp`/`sftp` require all three. Violations are
//! [`Error::Config`] and abort before any connection opens.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ─── Top-level ────────────────────────────────────────────────────────────────

/// Root configuration object, deserialised from `wpsync.toml`.
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct Config {
    /// All configured sites, keyed by section name.
    #[serde(default)]
    pub sites: BTreeMap<String, Site>,
}

impl Config {
    /// Look up a site by name or by one of its aliases.
    pub fn site(&self, key: &str) -> Option<&Site> {
        if let Some(site) = self.sites.get(key) {
            return Some(site);
        }
        self.sites
            .values()
            .find(|s| s.aliases.iter().any(|a| a == key))
    }

    /// Like [`Config::site`] but with the standard fatal error message.
    pub fn site_or_err(&self, key: &str) -> Result<&Site> {
        self.site(key)
            .ok_or_else(|| Error::Config(format!("site {key} is not configured")))
    }
}

// ─── Protocol ─────────────────────────────────────────────────────────────────

/// How a site's filesystem (and shell, if any) is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    File,
    Ssh,
    Ftp,
    Sftp,
}

// ─── [sites.<name>] ───────────────────────────────────────────────────────────

/// One configured WordPress installation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Site {
    /// Section name; filled in after parsing, not part of the file.
    #[serde(skip)]
    pub name: String,

    /// Alternative names accepted wherever a site name is expected.
    #[serde(default)]
    pub aliases: Vec<String>,

    pub protocol: Protocol,

    /// Public URL of the installation, without trailing slash.
    pub base_url: String,

    /// Alternative URL used to *reach* the site over HTTP, e.g. a plain-http
    /// address for locally hosted test installations behind self-signed SSL.
    /// Falls back to `base_url` when unset.
    #[serde(default)]
    pub file_url: Option<String>,

    /// Root directory of the installation. Always normalised to end with `/`.
    pub base_dir: String,

    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default, rename = "pass")]
    pub password: Option<String>,

    /// HTTP Basic credentials for sites behind server-level auth.
    /// Must be set together or not at all.
    #[serde(default)]
    pub http_user: Option<String>,
    #[serde(default)]
    pub http_pass: Option<String>,

    pub mysql_host: String,
    pub mysql_name: String,
    pub mysql_user: String,
    pub mysql_pass: String,
    #[serde(default = "default_mysql_port")]
    pub mysql_port: u16,

    /// Prefix every remote shell command with `sudo` (ssh only; forces a
    /// pseudo-terminal).
    #[serde(default)]
    pub sudo_remote: bool,

    /// Owner to `chown` remote paths to after every affecting operation.
    #[serde(default)]
    pub chown_remote: Option<String>,

    /// Group to `chgrp` remote paths to after every affecting operation.
    #[serde(default)]
    pub chgrp_remote: Option<String>,

    /// Skip TLS certificate verification when talking to the site over HTTP.
    #[serde(default)]
    pub no_verify_ssl: bool,
}

impl Site {
    /// URL used for HTTP requests against the site (remote execution,
    /// one-shot scripts). `file_url` wins when configured.
    pub fn http_url(&self) -> &str {
        self.file_url.as_deref().unwrap_or(&self.base_url)
    }

    /// Filesystem-safe form of the site name, used for the per-site backup
    /// and capability-cache paths.
    pub fn fs_safe_name(&self) -> String {
        fs_safe_name(&self.name)
    }
}

/// Characters kept verbatim when encoding a site name for filesystem use —
/// the unreserved set of RFC 3986, everything else is percent-encoded.
const SITE_NAME_KEEP: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub fn fs_safe_name(name: &str) -> String {
    utf8_percent_encode(name, SITE_NAME_KEEP).to_string()
}

pub fn default_mysql_port() -> u16 {
    3306
}

// ─── Discovery ────────────────────────────────────────────────────────────────

/// Candidate file names, tried in order in every searched directory.
const CONFIG_FILE_NAMES: &[&str] = &["wpsync.toml", ".wpsync.toml", ".wpsync/wpsync.toml"];

/// Find the configuration file.
///
/// With an explicit `path` only that file is considered. Otherwise the
/// current directory, all its ancestors, and finally the home directory are
/// searched for the candidate names, first hit wins.
pub fn find_config_file(path: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = path {
        if p.is_file() {
            return Ok(p.to_path_buf());
        }
        return Err(Error::Config(format!(
            "config file {} not found",
            p.display()
        )));
    }

    let cwd = std::env::current_dir()?;
    let mut dirs: Vec<PathBuf> = cwd.ancestors().map(Path::to_path_buf).collect();
    if let Some(home) = dirs_next::home_dir() {
        if !dirs.contains(&home) {
            dirs.push(home);
        }
    }

    for dir in dirs {
        for name in CONFIG_FILE_NAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    Err(Error::Config(
        "config file not found (looked for wpsync.toml in the current \
         directory, its parents, and your home directory)"
            .into(),
    ))
}

/// The working directory holding `backups/` and `info/`, next to the config
/// file. A config already inside a `.wpsync` directory uses that directory.
pub fn workdir(config_path: &Path) -> Result<PathBuf> {
    let parent = config_path.parent().unwrap_or_else(|| Path::new("."));
    let dir = if parent.file_name().is_some_and(|n| n == ".wpsync") {
        parent.to_path_buf()
    } else {
        parent.join(".wpsync")
    };
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

// ─── Loader ───────────────────────────────────────────────────────────────────

/// Read, parse, normalise and validate the configuration at `path`.
///
/// Returns the config plus any normalisation warnings (the caller decides
/// how to print them — this module never logs).
pub fn load_config(path: &Path) -> Result<(Config, Vec<String>)> {
    let text = std::fs::read_to_string(path)?;
    let mut config: Config =
        toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;

    for (name, site) in &mut config.sites {
        site.name = name.clone();
    }

    let warnings = normalize(&mut config);
    validate(&config)?;
    Ok((config, warnings))
}

// ─── Normalisation ────────────────────────────────────────────────────────────

/// Fix up derivable fields and collect warnings about suspicious values.
///
/// - `base_dir` always ends with `/`.
/// - An `ftp` `base_dir` starting with `/` is usually a mistake (paths are
///   relative to the FTP login root) — warned about, not changed.
/// - `sftp` hosts get the `sftp://` scheme prefix the FTP client expects.
fn normalize(config: &mut Config) -> Vec<String> {
    let mut warnings = Vec::new();
    for site in config.sites.values_mut() {
        if site.protocol == Protocol::Ftp && site.base_dir.starts_with('/') {
            warnings.push(format!(
                "base_dir for {} is configured as {} — did you mean to supply an absolute path?",
                site.name, site.base_dir
            ));
        }
        if !site.base_dir.ends_with('/') {
            site.base_dir.push('/');
        }
        if site.protocol == Protocol::Sftp {
            if let Some(host) = &site.host {
                if !host.starts_with("sftp://") {
                    site.host = Some(format!("sftp://{host}"));
                }
            }
        }
    }
    warnings
}

// ─── Validation ───────────────────────────────────────────────────────────────

/// Enforce the invariants serde cannot express. All violations are fatal.
fn validate(config: &Config) -> Result<()> {
    for site in config.sites.values() {
        let complain =
            |msg: &str| Err(Error::Config(format!("{msg} (check site {})", site.name)));

        if site.http_user.is_some() != site.http_pass.is_some() {
            return complain("http_user and http_pass must always be used together");
        }

        match site.protocol {
            Protocol::File => {
                if site.user.is_some() || site.host.is_some() || site.password.is_some() {
                    return complain("no use specifying user, host or pass with protocol=file");
                }
            }
            Protocol::Ssh => {
                if site.user.is_none() || site.host.is_none() {
                    return complain("user and host must be specified with protocol=ssh");
                }
                if site.password.is_some() {
                    return complain("ssh with password is not supported, use key-based auth");
                }
            }
            Protocol::Ftp | Protocol::Sftp => {
                if site.user.is_none() || site.host.is_none() || site.password.is_none() {
                    return complain(
                        "user, host and pass must be specified with protocol=ftp|sftp",
                    );
                }
            }
        }

        if site.sudo_remote && site.protocol != Protocol::Ssh {
            return complain("sudo_remote is only possible with protocol=ssh");
        }
        if (site.chown_remote.is_some() || site.chgrp_remote.is_some())
            && site.protocol != Protocol::Ssh
        {
            return complain("chown_remote/chgrp_remote are only possible with protocol=ssh");
        }
    }
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────────────────
