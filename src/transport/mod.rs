//! Transport abstraction over file, ssh and (s)ftp access to a site.
//!
//! All three implementations expose the same capability set, so the backup
//! and restore orchestrators run identical logic whether the target is a
//! local directory, an ssh host, or a shared-hosting FTP account:
//!
//! | Capability        | Local            | SSH               | FTP/SFTP          |
//! |-------------------|------------------|-------------------|-------------------|
//! | existence checks  | `std::fs`        | `test -d/-f`      | `glob --exist`    |
//! | mkdir/rmdir/rm    | `std::fs`        | one-shot command  | scripted session  |
//! | get/put           | `std::fs::copy`  | `scp`             | `get`/`put`       |
//! | mirror (both ways)| copy-with-delete | `rsync --del`     | `mirror --delete` |
//! | cat/cat_write     | `std::fs`        | `cat` / upload    | `cat` / upload    |
//! | shell             | `sh -c`          | `ssh <cmd>`       | —                 |
//!
//! Failure semantics: any external command exiting non-zero raises
//! [`Error::Transport`]; there are no retries at this layer and nothing is
//! logged here — the orchestrators decide what is fatal.
//!
//! [`Connection`] is the scoped session around a transport: opening it
//! guarantees the remote scratch directory (`<base_dir>wpsync`) exists,
//! dropping it removes the scratch directory again no matter how the
//! operations in between ended.

pub mod ftp;
pub mod local;
pub mod ssh;

use std::{
    path::Path,
    process::{Command, Output, Stdio},
};

use crate::{
    config::{Protocol, Site},
    error::{Error, Result},
};

// ─── Contract ─────────────────────────────────────────────────────────────────

pub trait Transport {
    fn dir_exists(&self, path: &str) -> Result<bool>;
    fn file_exists(&self, path: &str) -> Result<bool>;
    fn mkdir(&self, path: &str) -> Result<()>;
    /// Recursive removal.
    fn rmdir(&self, path: &str) -> Result<()>;
    fn get(&self, remote_path: &str, local_path: &Path) -> Result<()>;
    fn put(&self, local_path: &Path, remote_path: &str) -> Result<()>;
    /// Remote → local recursive sync, deleting extraneous local entries.
    fn mirror(&self, remote_dir: &str, local_dir: &Path) -> Result<()>;
    /// Local → remote recursive sync, deleting extraneous remote entries.
    /// `exclude` patterns are glob-style and match at any depth.
    fn mirror_reverse(&self, local_dir: &Path, remote_dir: &str, exclude: &[String])
    -> Result<()>;
    fn cat(&self, path: &str) -> Result<String>;
    fn cat_write(&self, path: &str, content: &str) -> Result<()>;
    fn remove(&self, path: &str) -> Result<()>;

    /// Run a shell command on the host, returning its stdout.
    fn shell(&self, command: &str) -> Result<String> {
        let _ = command;
        Err(Error::Transport {
            command: "shell".into(),
            detail: "this transport offers no shell".into(),
        })
    }

    fn has_shell(&self) -> bool {
        false
    }
}

// ─── Connection ───────────────────────────────────────────────────────────────

/// A live transport session bound to exactly one site.
///
/// Owns the remote scratch directory for the session's artifacts (dumps in
/// transit, uploaded payloads). The directory is created on open and removed
/// on drop — also when the operations inside the scope failed, so a crashed
/// restore does not leave payloads behind on the host.
pub struct Connection<'a> {
    pub site: &'a Site,
    transport: Box<dyn Transport>,
    scratch_dir: String,
}

impl<'a> Connection<'a> {
    pub fn open(site: &'a Site) -> Result<Self> {
        let transport: Box<dyn Transport> = match site.protocol {
            Protocol::File => Box::new(local::LocalTransport),
            Protocol::Ssh => Box::new(ssh::SshTransport::new(site)?),
            Protocol::Ftp | Protocol::Sftp => Box::new(ftp::FtpTransport::new(site)?),
        };
        let scratch_dir = format!("{}wpsync", site.base_dir);
        if !transport.dir_exists(&scratch_dir)? {
            transport.mkdir(&scratch_dir)?;
        }
        Ok(Self {
            site,
            transport,
            scratch_dir,
        })
    }

    /// Absolute path of `name` inside the session's scratch directory.
    pub fn scratch_path(&self, name: &str) -> String {
        format!("{}/{name}", self.scratch_dir)
    }

    // Delegates. Kept explicit so call sites read as connection operations.

    pub fn dir_exists(&self, path: &str) -> Result<bool> {
        self.transport.dir_exists(path)
    }
    pub fn file_exists(&self, path: &str) -> Result<bool> {
        self.transport.file_exists(path)
    }
    pub fn mkdir(&self, path: &str) -> Result<()> {
        self.transport.mkdir(path)
    }
    pub fn rmdir(&self, path: &str) -> Result<()> {
        self.transport.rmdir(path)
    }
    pub fn get(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        self.transport.get(remote_path, local_path)
    }
    pub fn put(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        self.transport.put(local_path, remote_path)
    }
    pub fn mirror(&self, remote_dir: &str, local_dir: &Path) -> Result<()> {
        self.transport.mirror(remote_dir, local_dir)
    }
    pub fn mirror_reverse(
        &self,
        local_dir: &Path,
        remote_dir: &str,
        exclude: &[String],
    ) -> Result<()> {
        self.transport.mirror_reverse(local_dir, remote_dir, exclude)
    }
    pub fn cat(&self, path: &str) -> Result<String> {
        self.transport.cat(path)
    }
    pub fn cat_write(&self, path: &str, content: &str) -> Result<()> {
        self.transport.cat_write(path, content)
    }
    pub fn remove(&self, path: &str) -> Result<()> {
        self.transport.remove(path)
    }
    pub fn shell(&self, command: &str) -> Result<String> {
        self.transport.shell(command)
    }
    pub fn has_shell(&self) -> bool {
        self.transport.has_shell()
    }
}

impl Drop for Connection<'_> {
    fn drop(&mut self) {
        // Best-effort teardown: a cleanup failure must not mask whatever
        // error unwound the scope.
        let _ = self.transport.rmdir(&self.scratch_dir);
    }
}

// ─── Captured execution ───────────────────────────────────────────────────────

/// Run a command, capturing stdout and stderr.
///
/// Returns `(exit_code, stdout, stderr)`; only a spawn failure is an error.
/// Callers that need to distinguish "exited 1" from "could not run at all"
/// (the existence checks) branch on the code themselves.
pub fn run_captured(args: &[String]) -> Result<(Option<i32>, String, String)> {
    let (prog, rest) = args
        .split_first()
        .ok_or_else(|| Error::transport(args, "cannot run an empty command"))?;

    let output: Output = Command::new(prog)
        .args(rest)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| Error::transport(args, format!("failed to spawn: {e}")))?;

    Ok((
        output.status.code(),
        String::from_utf8_lossy(&output.stdout).into_owned(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
    ))
}

/// Run a command and require exit code 0, returning its stdout.
pub fn run_checked(args: &[String]) -> Result<String> {
    let (code, stdout, stderr) = run_captured(args)?;
    if code == Some(0) {
        return Ok(stdout);
    }
    let detail = if stderr.trim().is_empty() {
        match code {
            Some(c) => format!("exited with status {c}"),
            None => "terminated by signal".into(),
        }
    } else {
        stderr.trim().to_string()
    };
    Err(Error::transport(args, detail))
}

// ─── Shell quoting ────────────────────────────────────────────────────────────

/// Quote `s` for use as a single word in a POSIX shell command line.
pub fn sh_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;

    fn local_site(base_dir: &str) -> Site {
        Site {
            name: "local".into(),
            aliases: vec![],
            protocol: Protocol::File,
            base_url: "http://localhost".into(),
            file_url: None,
            base_dir: base_dir.into(),
            user: None,
            host: None,
            password: None,
            http_user: None,
            http_pass: None,
            mysql_host: "localhost".into(),
            mysql_name: "wp".into(),
            mysql_user: "wp".into(),
            mysql_pass: "pw".into(),
            mysql_port: 3306,
            sudo_remote: false,
            chown_remote: None,
            chgrp_remote: None,
            no_verify_ssl: false,
        }
    }

    // ── sh_quote ──────────────────────────────────────────────────────────────

    #[test]
    fn plain_words_are_not_quoted() {
        assert_eq!(sh_quote("/var/www/html"), "/var/www/html");
        assert_eq!(sh_quote("user@host"), "user@host");
    }

    #[test]
    fn spaces_force_quotes() {
        assert_eq!(sh_quote("my site"), "'my site'");
    }

    #[test]
    fn single_quotes_are_escaped() {
        assert_eq!(sh_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn empty_string_is_quoted() {
        assert_eq!(sh_quote(""), "''");
    }

    // ── run_captured / run_checked ────────────────────────────────────────────

    #[test]
    fn run_captured_reports_exit_code() {
        let (code, _, _) = run_captured(&["false".into()]).unwrap();
        assert_eq!(code, Some(1));
    }

    #[test]
    fn run_captured_captures_stdout() {
        let (code, out, _) =
            run_captured(&["sh".into(), "-c".into(), "echo hello".into()]).unwrap();
        assert_eq!(code, Some(0));
        assert!(out.contains("hello"));
    }

    #[test]
    fn run_checked_fails_with_stderr_detail() {
        let err = run_checked(&["sh".into(), "-c".into(), "echo oops >&2; exit 3".into()])
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("oops"));
    }

    #[test]
    fn run_checked_empty_command_errors() {
        assert!(run_checked(&[]).is_err());
    }

    #[test]
    fn unspawnable_command_errors() {
        assert!(run_checked(&["/definitely/not/a/binary".into()]).is_err());
    }

    // ── Connection lifecycle ──────────────────────────────────────────────────

    #[test]
    fn open_creates_scratch_dir_and_drop_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let base = format!("{}/", dir.path().display());
        let site = local_site(&base);

        let scratch = dir.path().join("wpsync");
        {
            let conn = Connection::open(&site).unwrap();
            assert!(scratch.is_dir());
            assert_eq!(
                conn.scratch_path("dump.sql"),
                format!("{base}wpsync/dump.sql")
            );
        }
        assert!(!scratch.exists(), "scratch dir must be removed on drop");
    }

    #[test]
    fn scratch_dir_is_removed_even_after_failed_operations() {
        let dir = tempfile::tempdir().unwrap();
        let base = format!("{}/", dir.path().display());
        let site = local_site(&base);

        {
            let conn = Connection::open(&site).unwrap();
            // A failing operation inside the scope must not keep the scratch
            // directory alive.
            assert!(conn.cat("/no/such/file/anywhere").is_err());
        }
        assert!(!dir.path().join("wpsync").exists());
    }
}
