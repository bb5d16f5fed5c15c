//! Maildir naming conventions and mail header extraction.
//!
//! A maildir file name carries its flags in an `:2,<letters>` suffix. Four
//! flag letters correspond directly to tags (`D` draft, `F` flagged, `P`
//! passed, `R` replied); `S` (seen) corresponds to the *absence* of the
//! `unread` tag. Flagged files live in `cur/`, so applying flags to a file
//! still sitting in `new/` moves it to the sibling `cur/`.

use std::collections::BTreeSet;

/// Tag names with a direct flag letter, in letter order.
const FLAG_TAGS: [(char, &str); 4] = [
    ('D', "draft"),
    ('F', "flagged"),
    ('P', "passed"),
    ('R', "replied"),
];

/// Info-suffix separator in maildir file names.
const INFO_SEPARATOR: &str = ":2,";

/// Returns the flag letters a tag set maps to, in ASCII order.
pub fn flags_for_tags(tags: &BTreeSet<String>) -> String {
    let mut flags = String::new();
    for (letter, tag) in FLAG_TAGS {
        if tags.contains(tag) {
            flags.push(letter);
        }
    }
    if !tags.contains("unread") {
        flags.push('S');
    }
    flags
}

/// Returns the tags implied by the flag letters of a file name, starting
/// from the defaults a freshly ingested message receives.
pub fn tags_for_name(rel: &str) -> BTreeSet<String> {
    let mut tags: BTreeSet<String> = ["inbox", "unread"].iter().map(|t| t.to_string()).collect();
    if let Some(flags) = info_suffix(rel) {
        for (letter, tag) in FLAG_TAGS {
            if flags.contains(letter) {
                tags.insert(tag.to_string());
            }
        }
        if flags.contains('S') {
            tags.remove("unread");
        }
    }
    tags
}

/// Returns the flag letters of `rel`, if it carries an info suffix.
pub fn info_suffix(rel: &str) -> Option<&str> {
    let base = rel.rsplit('/').next().unwrap_or(rel);
    base.rfind(INFO_SEPARATOR)
        .map(|at| &base[at + INFO_SEPARATOR.len()..])
}

/// Rewrites `rel` to carry exactly `flags`.
///
/// A file in `new/` with at least one flag moves to the sibling `cur/`.
/// With no flags to apply a name that never carried an info suffix is left
/// untouched, keeping names stable across peers; everything else gets a
/// normalized `:2,<flags>` suffix in place.
pub fn name_with_flags(rel: &str, flags: &str) -> String {
    if flags.is_empty() && info_suffix(rel).is_none() {
        return rel.to_string();
    }

    let (dir, base) = match rel.rsplit_once('/') {
        Some((dir, base)) => (Some(dir), base),
        None => (None, rel),
    };
    let stem = base.split(INFO_SEPARATOR).next().unwrap_or(base);

    let in_new = dir.is_some_and(|d| d == "new" || d.ends_with("/new"));

    let dir = match dir {
        Some(d) if in_new => {
            let parent = &d[..d.len() - "new".len()];
            format!("{parent}cur")
        }
        Some(d) => d.to_string(),
        None => String::new(),
    };

    if dir.is_empty() {
        format!("{stem}{INFO_SEPARATOR}{flags}")
    } else {
        format!("{dir}/{stem}{INFO_SEPARATOR}{flags}")
    }
}

/// Extracts the Message-ID from a mail file, angle brackets stripped.
///
/// Only the header section (up to the first blank line) is scanned; folded
/// continuation lines are honored. Returns `None` when the header is
/// missing or empty.
pub fn extract_message_id(data: &[u8]) -> Option<String> {
    let mut value: Option<String> = None;
    let mut in_message_id = false;

    for line in data.split(|&b| b == b'\n') {
        let line = strip_cr(line);
        if line.is_empty() {
            break;
        }
        if in_message_id {
            if line[0] == b' ' || line[0] == b'\t' {
                if let Some(v) = value.as_mut() {
                    v.push_str(String::from_utf8_lossy(line).trim());
                }
                continue;
            }
            break;
        }
        if let Some(rest) = header_value(line, "message-id:") {
            value = Some(String::from_utf8_lossy(rest).trim().to_string());
            in_message_id = true;
        }
    }

    let raw = value?;
    let trimmed = raw
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
        .to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn strip_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

fn header_value<'a>(line: &'a [u8], name: &str) -> Option<&'a [u8]> {
    if line.len() < name.len() {
        return None;
    }
    let (head, rest) = line.split_at(name.len());
    if head.eq_ignore_ascii_case(name.as_bytes()) {
        Some(rest)
    } else {
        None
    }
}
