//! Unit tests for folder-path exclusion rules.

use rstest::rstest;

use smartmarks::services::filter_matcher::{matches, should_filter};
use smartmarks::types::settings::FilterSettings;

#[rstest]
#[case("书签栏/工作", "工作", true)]
#[case("书签栏/工作/私人", "私人", true)]
#[case("书签栏/工作/私人", "工作", true)]
#[case("书签栏/工作区", "工作", false)]
#[case("书签栏/Work", "work", true)]
#[case("工作/私人", "工作/*", true)]
#[case("书签栏/工作/私人/深层", "工作/*", true)]
#[case("工作私人", "工作/*", false)]
#[case("书签栏/工作", "工作/*", false)]
#[case("书签栏/temp-2024", "*/temp-*", true)]
#[case("书签栏/temp", "*/tem?", true)]
#[case("书签栏/temp", "*/te?", false)]
#[case("书签栏/a.b", "*/a.b", true)]
#[case("书签栏/axb", "*/a.b", false)]
#[case("书签栏/工作", "", false)]
fn test_matches_ignoring_case(#[case] path: &str, #[case] pattern: &str, #[case] expected: bool) {
    assert_eq!(matches(path, pattern, true), expected, "{} vs {}", path, pattern);
}

#[rstest]
#[case("书签栏/Work", "work", false)]
#[case("书签栏/Work", "Work", true)]
#[case("书签栏/Temp/x", "*/temp/*", false)]
#[case("书签栏/Temp/x", "*/Temp/*", true)]
fn test_matches_case_sensitive(#[case] path: &str, #[case] pattern: &str, #[case] expected: bool) {
    assert_eq!(matches(path, pattern, false), expected);
}

#[test]
fn test_should_filter_by_folder_substring() {
    let settings = FilterSettings {
        exclude_folders: vec!["私人".to_string(), "  ".to_string()],
        ..FilterSettings::default()
    };
    assert!(should_filter("书签栏/工作/私人项目", &settings));
    assert!(!should_filter("书签栏/工作", &settings));
}

#[test]
fn test_should_filter_by_pattern() {
    let settings = FilterSettings {
        exclude_patterns: vec!["*/归档*".to_string()],
        ..FilterSettings::default()
    };
    assert!(should_filter("书签栏/归档2023", &settings));
    assert!(!should_filter("书签栏/工作", &settings));
}

#[test]
fn test_auto_filter_off_disables_everything() {
    let settings = FilterSettings {
        exclude_folders: vec!["工作".to_string()],
        exclude_patterns: vec!["*".to_string()],
        auto_filter: false,
        ignore_case: true,
    };
    assert!(!should_filter("书签栏/工作", &settings));
}

#[test]
fn test_exclude_folders_honor_ignore_case() {
    let mut settings = FilterSettings {
        exclude_folders: vec!["private".to_string()],
        ..FilterSettings::default()
    };
    assert!(should_filter("书签栏/Private", &settings));
    settings.ignore_case = false;
    assert!(!should_filter("书签栏/Private", &settings));
}
