//! Property-based tests for folder name normalization.
//!
//! Normalizing is idempotent, standard folders are fixed points, and merge
//! suggestions only ever propose a rename to the normalized form.

use proptest::prelude::*;
use smartmarks::services::folder_normalizer::{merge_suggestions, normalize, STANDARD_FOLDERS};

/// Folder-like names: mixed ASCII, CJK and a few known variants.
fn arb_folder_name() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z][a-zA-Z0-9 ]{0,20}",
        "[\u{4e00}-\u{9fa5}]{1,6}",
        Just("GitHub".to_string()),
        Just(" 编程 ".to_string()),
        Just("Shopping".to_string()),
        Just(String::new()),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn normalize_is_idempotent(name in arb_folder_name()) {
        let once = normalize(&name);
        prop_assert_eq!(normalize(&once), once);
    }

    #[test]
    fn normalized_names_are_trimmed(name in arb_folder_name()) {
        let out = normalize(&name);
        prop_assert_eq!(out.trim(), out.as_str());
    }

    #[test]
    fn standard_folders_are_fixed_points(idx in 0..STANDARD_FOLDERS.len()) {
        let standard = STANDARD_FOLDERS[idx];
        prop_assert_eq!(normalize(standard), standard);
    }

    #[test]
    fn merge_suggestions_target_normalized_names(
        names in proptest::collection::vec(arb_folder_name(), 0..12),
    ) {
        let suggestions = merge_suggestions(names.as_slice());
        for (from, to) in &suggestions {
            prop_assert!(names.contains(from));
            prop_assert_ne!(from, to);
            prop_assert_eq!(&normalize(from), to);
            prop_assert!(!STANDARD_FOLDERS.contains(&from.as_str()));
        }
    }
}
