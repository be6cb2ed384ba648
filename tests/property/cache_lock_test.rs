//! Property-based tests for classification locking.
//!
//! A locked record only changes through a manual write, and provider answers
//! lock themselves exactly when they are confident enough.

use proptest::prelude::*;
use std::sync::Arc;

use smartmarks::services::classification_cache::{ClassificationCache, AUTO_LOCK_CONFIDENCE};
use smartmarks::services::state_store::{MemoryStateStore, StateStore};
use smartmarks::types::classification::ClassificationSource;

fn fresh_cache() -> ClassificationCache {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
    ClassificationCache::new(store).expect("cache")
}

fn arb_automatic_source() -> impl Strategy<Value = ClassificationSource> {
    prop_oneof![
        Just(ClassificationSource::Dictionary),
        Just(ClassificationSource::Ai),
        Just(ClassificationSource::Enrichment),
    ]
}

fn arb_category() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("开发工具".to_string()),
        Just("学习教育".to_string()),
        Just("新闻资讯".to_string()),
        "[a-z]{3,10}",
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn locked_record_survives_automatic_writes(
        category in arb_category(),
        writes in proptest::collection::vec(
            (arb_automatic_source(), arb_category(), 0.0f64..=1.0, proptest::option::of(any::<bool>())),
            1..10,
        ),
    ) {
        let cache = fresh_cache();
        let url = "https://locked.example.org/page";
        prop_assert!(cache.set(url, &category, 1.0, ClassificationSource::Manual, None));
        let before = cache.peek(url).expect("record");
        prop_assert!(before.locked);

        for (source, other, confidence, lock) in writes {
            prop_assert!(!cache.set(url, &other, confidence, source, lock));
        }

        let after = cache.peek(url).expect("record");
        prop_assert_eq!(after.category, before.category);
        prop_assert_eq!(after.source, ClassificationSource::Manual);
        prop_assert!(after.locked);
    }

    #[test]
    fn manual_write_replaces_locked_record(
        first in arb_category(),
        second in arb_category(),
    ) {
        let cache = fresh_cache();
        let url = "https://manual.example.org/";
        cache.set(url, &first, 0.95, ClassificationSource::Ai, None);
        prop_assert!(cache.set(url, &second, 1.0, ClassificationSource::Manual, None));
        prop_assert_eq!(cache.peek(url).expect("record").category, second);
    }

    #[test]
    fn provider_answers_lock_at_threshold(confidence in 0.0f64..=1.0) {
        let cache = fresh_cache();
        let url = "https://auto.example.org/";
        prop_assert!(cache.set(url, "学习教育", confidence, ClassificationSource::Ai, None));
        let record = cache.peek(url).expect("record");
        prop_assert_eq!(record.locked, confidence >= AUTO_LOCK_CONFIDENCE);
    }
}
