//! Folder-path exclusion rules.
//!
//! Paths are `/`-joined folder titles from the root container down, e.g.
//! `书签栏/工作/私人`.

use regex::RegexBuilder;
use tracing::debug;

use crate::types::settings::FilterSettings;

fn fold(s: &str, ignore_case: bool) -> String {
    if ignore_case {
        s.to_lowercase()
    } else {
        s.to_string()
    }
}

/// Tests a folder path against one exclusion pattern.
///
/// * no wildcard: the full path, its last segments (`…/pattern`) or any single
///   segment equal the pattern;
/// * `prefix/*`: anything below a folder named `prefix`;
/// * otherwise a glob where `*` is any run and `?` one character, matched
///   against the whole path.
pub fn matches(path: &str, pattern: &str, ignore_case: bool) -> bool {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return false;
    }

    if !pattern.contains('*') && !pattern.contains('?') {
        let path = fold(path, ignore_case);
        let pattern = fold(pattern, ignore_case);
        return path == pattern
            || path.ends_with(&format!("/{}", pattern))
            || path.split('/').any(|segment| segment == pattern);
    }

    if let Some(parent) = pattern.strip_suffix("/*") {
        if !parent.contains('*') && !parent.contains('?') {
            let path = fold(path, ignore_case);
            let parent = fold(parent, ignore_case);
            return path.starts_with(&format!("{}/", parent))
                || path.contains(&format!("/{}/", parent));
        }
    }

    let mut source = String::with_capacity(pattern.len() * 2 + 2);
    source.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    source.push('$');

    match RegexBuilder::new(&source).case_insensitive(ignore_case).build() {
        Ok(re) => re.is_match(path),
        Err(e) => {
            debug!(pattern, error = %e, "ignoring unusable filter pattern");
            false
        }
    }
}

/// Whether a link in `folder_path` is excluded from organizing.
pub fn should_filter(folder_path: &str, settings: &FilterSettings) -> bool {
    if !settings.auto_filter {
        return false;
    }

    let folded_path = fold(folder_path, settings.ignore_case);
    let in_excluded_folder = settings
        .exclude_folders
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .any(|f| folded_path.contains(&fold(f, settings.ignore_case)));
    if in_excluded_folder {
        return true;
    }

    settings
        .exclude_patterns
        .iter()
        .any(|p| matches(folder_path, p, settings.ignore_case))
}
