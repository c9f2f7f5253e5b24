//! SQL-dump scanning and rewriting.
//!
//! Restoring a backup into a *different* site means the captured dump's
//! table options may not match what the destination database supports
//! (storage engine, character set, collation). This module retargets those
//! options without touching anything else: the dump is split into
//! statements, only statements starting with `CREATE` are tokenised and
//! rewritten, everything else passes through byte-for-byte. Statements are
//! never reordered and row data is never altered.
//!
//! The same tokenizer also powers [`parse_database_settings`], which
//! recovers a site's effective `CHARSET`/`COLLATE`/`ENGINE` from an existing
//! dump of that site.

use std::collections::{BTreeMap, BTreeSet};

/// Table options recognised by the rewriter, in the order they are searched.
pub const SETTING_KEYS: [&str; 3] = ["CHARSET", "COLLATE", "ENGINE"];

// ─── Tokens ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    /// Identifier-class token: keyword, table/option name, charset name.
    Word,
    Number,
    Quoted,
    Comment,
    Whitespace,
    Symbol,
}

#[derive(Debug)]
struct Token {
    kind: Kind,
    text: String,
}

fn tokenize(statement: &str) -> Vec<Token> {
    let bytes = statement.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        let kind = match bytes[i] {
            b if b.is_ascii_whitespace() => {
                while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                Kind::Whitespace
            }
            b'\'' | b'"' | b'`' => {
                i = skip_quoted(bytes, i);
                Kind::Quoted
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = skip_line(bytes, i);
                Kind::Comment
            }
            b'#' => {
                i = skip_line(bytes, i);
                Kind::Comment
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = skip_block_comment(bytes, i);
                Kind::Comment
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                while i < bytes.len() && is_word_byte(bytes[i]) {
                    i += 1;
                }
                Kind::Word
            }
            b if b.is_ascii_digit() => {
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                Kind::Number
            }
            _ => {
                // Multi-byte UTF-8 sequences land here one scalar at a time.
                i += statement[i..].chars().next().map_or(1, char::len_utf8);
                Kind::Symbol
            }
        };
        tokens.push(Token {
            kind,
            text: statement[start..i].to_string(),
        });
    }
    tokens
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Advance past a quoted literal starting at `i`, honouring backslash
/// escapes and doubled closing quotes. Returns the index after the closing
/// quote (or the end of input for an unterminated literal).
fn skip_quoted(bytes: &[u8], i: usize) -> usize {
    let quote = bytes[i];
    let mut j = i + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' if quote != b'`' => j += 2,
            b if b == quote => {
                if bytes.get(j + 1) == Some(&quote) {
                    j += 2;
                } else {
                    return j + 1;
                }
            }
            _ => j += 1,
        }
    }
    bytes.len()
}

fn skip_line(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i] != b'\n' {
        i += 1;
    }
    i.min(bytes.len())
}

fn skip_block_comment(bytes: &[u8], i: usize) -> usize {
    let mut j = i + 2;
    while j + 1 < bytes.len() {
        if bytes[j] == b'*' && bytes[j + 1] == b'/' {
            return j + 2;
        }
        j += 1;
    }
    bytes.len()
}

// ─── Statement splitting ──────────────────────────────────────────────────────

/// Split a dump into statements at `;`, quote- and comment-aware.
///
/// Each slice includes its terminating `;`; any trailing text after the last
/// `;` becomes a final fragment. Concatenating the result reproduces the
/// input exactly.
fn split_statements(dump: &str) -> Vec<&str> {
    let bytes = dump.as_bytes();
    let mut statements = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' | b'`' => i = skip_quoted(bytes, i),
            b'-' if bytes.get(i + 1) == Some(&b'-') => i = skip_line(bytes, i),
            b'#' => i = skip_line(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
            b';' => {
                statements.push(&dump[start..=i]);
                start = i + 1;
                i += 1;
            }
            _ => i += 1,
        }
    }
    if start < dump.len() {
        statements.push(&dump[start..]);
    }
    statements
}

/// First identifier-class token of a statement, skipping whitespace and
/// comments.
fn leading_word(statement: &str) -> Option<String> {
    tokenize(statement)
        .into_iter()
        .find(|t| !matches!(t.kind, Kind::Whitespace | Kind::Comment))
        .filter(|t| t.kind == Kind::Word)
        .map(|t| t.text)
}

// ─── Rewriting ────────────────────────────────────────────────────────────────

/// Rewrite `CREATE` table options in `dump` according to `to_set`.
///
/// For every statement beginning with `CREATE`: when a token equals one of
/// the pending keys of `to_set`, the next identifier-class token becomes the
/// configured value and that key is done for this statement. When `COLLATE`
/// is absent from `to_set`, every `COLLATE <value>` clause is blanked out
/// entirely — the destination defines no explicit collation, so a stale one
/// must not survive the import.
///
/// Non-`CREATE` statements pass through untouched.
pub fn adapt_dump(dump: &str, to_set: &BTreeMap<String, String>) -> String {
    let mut output = String::with_capacity(dump.len());

    for statement in split_statements(dump) {
        if leading_word(statement).as_deref() != Some("CREATE") {
            output.push_str(statement);
            continue;
        }

        let mut tokens = tokenize(statement);
        let mut pending: BTreeSet<&str> = to_set.keys().map(String::as_str).collect();
        let mut detected: Option<String> = None;
        let mut stripping_collate = false;

        for token in &mut tokens {
            if stripping_collate {
                let was_word = token.kind == Kind::Word;
                token.text.clear();
                if was_word {
                    stripping_collate = false;
                }
                continue;
            }

            if let Some(key) = detected.take() {
                if token.kind == Kind::Word {
                    token.text = to_set[&key].clone();
                    pending.remove(key.as_str());
                } else {
                    // Still between the keyword and its value (`=`, spaces).
                    detected = Some(key);
                }
                continue;
            }

            if token.kind == Kind::Word {
                if pending.contains(token.text.as_str()) {
                    detected = Some(token.text.clone());
                } else if token.text == "COLLATE" && !to_set.contains_key("COLLATE") {
                    token.text.clear();
                    stripping_collate = true;
                }
            }
        }

        for token in &tokens {
            output.push_str(&token.text);
        }
    }

    output
}

// ─── Settings detection ───────────────────────────────────────────────────────

/// Recover `CHARSET`/`COLLATE`/`ENGINE` from the `CREATE` statements of a
/// dump. The first value found per key wins; keys the dump never mentions
/// are absent from the result.
pub fn parse_database_settings(dump: &str) -> BTreeMap<String, String> {
    let mut to_find: BTreeSet<&str> = SETTING_KEYS.iter().copied().collect();
    let mut settings = BTreeMap::new();

    for statement in split_statements(dump) {
        if leading_word(statement).as_deref() != Some("CREATE") {
            continue;
        }
        let mut detected: Option<String> = None;
        for token in tokenize(statement) {
            if let Some(key) = detected.take() {
                if token.kind == Kind::Word {
                    to_find.remove(key.as_str());
                    settings.insert(key, token.text);
                    if to_find.is_empty() {
                        return settings;
                    }
                } else {
                    detected = Some(key);
                }
            } else if token.kind == Kind::Word && to_find.contains(token.text.as_str()) {
                detected = Some(token.text);
            }
        }
    }
    settings
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "\
-- MySQL dump
DROP TABLE IF EXISTS `wp_posts`;
CREATE TABLE `wp_posts` (
  `ID` bigint(20) unsigned NOT NULL,
  `post_title` text NOT NULL
) ENGINE=MyISAM DEFAULT CHARSET=latin1 COLLATE=latin1_swedish_ci;
INSERT INTO `wp_posts` VALUES (1,'CHARSET=latin1 is just text; not an option');
";

    fn settings(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // ── adapt_dump ────────────────────────────────────────────────────────────

    #[test]
    fn retargets_engine_and_charset_and_drops_collate() {
        let out = adapt_dump(DUMP, &settings(&[("ENGINE", "InnoDB"), ("CHARSET", "utf8mb4")]));
        assert!(out.contains("ENGINE=InnoDB"));
        assert!(out.contains("CHARSET=utf8mb4"));
        assert!(!out.contains("COLLATE=latin1_swedish_ci"));
        assert!(!out.contains("latin1_swedish_ci"));
    }

    #[test]
    fn keeps_collate_when_target_defines_one() {
        let out = adapt_dump(DUMP, &settings(&[("COLLATE", "utf8mb4_unicode_ci")]));
        assert!(out.contains("COLLATE=utf8mb4_unicode_ci"));
    }

    #[test]
    fn row_data_is_untouched() {
        let out = adapt_dump(DUMP, &settings(&[("CHARSET", "utf8mb4")]));
        assert!(out.contains("'CHARSET=latin1 is just text; not an option'"));
    }

    #[test]
    fn non_create_statements_pass_through_byte_for_byte() {
        let dump = "INSERT INTO t VALUES ('ENGINE=MyISAM');\nUPDATE t SET x = 1;\n";
        let out = adapt_dump(dump, &settings(&[("ENGINE", "InnoDB")]));
        assert_eq!(out, dump);
    }

    #[test]
    fn empty_mapping_is_identity_for_collateless_dumps() {
        let dump = "CREATE TABLE t (a int) ENGINE=InnoDB;\n";
        assert_eq!(adapt_dump(dump, &BTreeMap::new()), dump);
    }

    #[test]
    fn every_create_statement_is_rewritten() {
        let dump = "CREATE TABLE a (x int) ENGINE=MyISAM;\nCREATE TABLE b (y int) ENGINE=MyISAM;\n";
        let out = adapt_dump(dump, &settings(&[("ENGINE", "InnoDB")]));
        assert_eq!(out.matches("ENGINE=InnoDB").count(), 2);
        assert!(!out.contains("MyISAM"));
    }

    // ── split_statements ──────────────────────────────────────────────────────

    #[test]
    fn concatenation_reproduces_input() {
        assert_eq!(split_statements(DUMP).concat(), DUMP);
    }

    #[test]
    fn semicolons_inside_strings_do_not_split() {
        let dump = "INSERT INTO t VALUES ('a;b');INSERT INTO t VALUES (2);";
        assert_eq!(split_statements(dump).len(), 2);
    }

    #[test]
    fn semicolons_inside_comments_do_not_split() {
        let dump = "-- nope; really\nSELECT 1;";
        let statements = split_statements(dump);
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0], dump);
    }

    #[test]
    fn escaped_quote_does_not_end_string() {
        let dump = r"INSERT INTO t VALUES ('it\'s; fine');SELECT 1;";
        assert_eq!(split_statements(dump).len(), 2);
    }

    // ── parse_database_settings ───────────────────────────────────────────────

    #[test]
    fn detects_all_three_settings() {
        let got = parse_database_settings(DUMP);
        assert_eq!(got["ENGINE"], "MyISAM");
        assert_eq!(got["CHARSET"], "latin1");
        assert_eq!(got["COLLATE"], "latin1_swedish_ci");
    }

    #[test]
    fn missing_collate_is_absent_from_result() {
        let dump = "CREATE TABLE t (a int) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;\n";
        let got = parse_database_settings(dump);
        assert_eq!(got.get("ENGINE").map(String::as_str), Some("InnoDB"));
        assert_eq!(got.get("CHARSET").map(String::as_str), Some("utf8mb4"));
        assert!(!got.contains_key("COLLATE"));
    }

    #[test]
    fn settings_inside_insert_rows_are_ignored() {
        let dump = "INSERT INTO t VALUES ('ENGINE=MyISAM CHARSET=latin1');\n";
        assert!(parse_database_settings(dump).is_empty());
    }

    #[test]
    fn first_create_wins() {
        let dump = "\
CREATE TABLE a (x int) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;
CREATE TABLE b (y int) ENGINE=MyISAM DEFAULT CHARSET=latin1 COLLATE=latin1_swedish_ci;
";
        let got = parse_database_settings(dump);
        assert_eq!(got["ENGINE"], "InnoDB");
        assert_eq!(got["CHARSET"], "utf8mb4");
    }
}
