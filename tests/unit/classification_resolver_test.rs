//! Unit tests for the multi-stage ClassificationResolver.
//!
//! The AI provider and the metadata source are scripted fakes; the bookmark
//! tree and the state store are real, on an in-memory database.

#[path = "../common/mod.rs"]
mod common;

use common::{reply, test_env, test_env_with, FakeMetadataSource, FakeProvider, TestEnv};
use smartmarks::managers::bookmark_tree::BookmarkTree;
use smartmarks::types::ai::ProviderName;
use smartmarks::types::bookmark::Link;
use smartmarks::types::classification::{
    ClassificationResult, ClassificationSource, ClassifyOptions, FALLBACK_CATEGORY,
};

async fn link(env: &TestEnv, url: &str, title: &str) -> Link {
    let id = env.add_link(url, title, &env.bar.id);
    env.tree.get_link(&id).await.unwrap().expect("link")
}

async fn classify(env: &TestEnv, link: &Link) -> ClassificationResult {
    env.app
        .resolver
        .classify(link, &env.app.settings.provider(), ClassifyOptions::default())
        .await
}

// ─── Dictionary ───

/// Known domains are answered from the dictionary, locked, and never reach
/// the provider.
#[tokio::test]
async fn test_dictionary_hit_is_locked_and_skips_provider() {
    let env = test_env();
    let github = link(&env, "https://github.com/rust-lang/rust", "Rust").await;

    let first = classify(&env, &github).await;
    assert_eq!(first.category, "开发工具");
    assert_eq!(first.confidence, 0.95);
    assert_eq!(first.source, ClassificationSource::Dictionary);

    let cached = env.app.cache.peek(&github.url).expect("cached");
    assert!(cached.locked);
    assert_eq!(cached.category, "开发工具");

    let second = classify(&env, &github).await;
    assert_eq!(second.category, "开发工具");
    assert_eq!(env.provider.calls(), 0);
}

#[tokio::test]
async fn test_subdomain_uses_parent_domain_entry() {
    let env = test_env();
    let docs = link(&env, "https://gist.github.com/someone/abc", "gist").await;
    let result = classify(&env, &docs).await;
    assert_eq!(result.category, "开发工具");
    assert_eq!(result.confidence, 0.9);
}

/// A user-confirmed category wins over the dictionary.
#[tokio::test]
async fn test_manual_record_overrides_everything() {
    let env = test_env();
    let github = link(&env, "https://github.com/trending", "Trending").await;
    env.app
        .cache
        .set(&github.url, "我的收藏", 1.0, ClassificationSource::Manual, None);

    let result = classify(&env, &github).await;
    assert_eq!(result.category, "我的收藏");
    assert_eq!(result.source, ClassificationSource::Manual);
    assert_eq!(env.provider.calls(), 0);
}

// ─── Provider ───

#[tokio::test]
async fn test_provider_answer_is_normalized_and_cached() {
    let env = test_env_with(
        FakeProvider::answering(&reply("Tutorial", 0.9)),
        FakeMetadataSource::empty(),
    );
    let page = link(&env, "https://learn.example.org/rust", "Learn Rust").await;

    let result = classify(&env, &page).await;
    assert_eq!(result.category, "学习教育");
    assert_eq!(result.source, ClassificationSource::Ai);
    assert_eq!(result.reasoning.as_deref(), Some("test"));

    let cached = env.app.cache.peek(&page.url).expect("cached");
    assert_eq!(cached.category, "学习教育");
    assert!(cached.locked, "0.9 from the provider locks");
}

#[tokio::test]
async fn test_cache_hit_avoids_second_provider_call() {
    let env = test_env_with(
        FakeProvider::answering(&reply("菜谱", 0.5)),
        FakeMetadataSource::empty(),
    );
    let page = link(&env, "https://food.example.org/soup", "Soup").await;

    assert_eq!(classify(&env, &page).await.category, "菜谱");
    assert_eq!(classify(&env, &page).await.category, "菜谱");
    assert_eq!(env.provider.calls(), 1);
}

#[tokio::test]
async fn test_force_reclassify_asks_again() {
    let env = test_env_with(
        FakeProvider::answering(&reply("菜谱", 0.5)),
        FakeMetadataSource::empty(),
    );
    let page = link(&env, "https://food.example.org/soup", "Soup").await;
    classify(&env, &page).await;

    env.provider.set_reply(&reply("新闻资讯", 0.6));
    let forced = env
        .app
        .resolver
        .classify(
            &page,
            &env.app.settings.provider(),
            ClassifyOptions {
                force_reclassify: true,
            },
        )
        .await;
    assert_eq!(forced.category, "新闻资讯");
    assert_eq!(env.provider.calls(), 2);
}

/// A locked answer survives a later, different provider answer.
#[tokio::test]
async fn test_locked_record_is_returned_when_forced() {
    let env = test_env_with(
        FakeProvider::answering(&reply("学习教育", 0.95)),
        FakeMetadataSource::empty(),
    );
    let page = link(&env, "https://course.example.org/", "Course").await;
    classify(&env, &page).await;

    env.provider.set_reply(&reply("新闻资讯", 0.9));
    let forced = env
        .app
        .resolver
        .classify(
            &page,
            &env.app.settings.provider(),
            ClassifyOptions {
                force_reclassify: true,
            },
        )
        .await;
    assert_eq!(forced.category, "学习教育");
}

// ─── Fallback ───

#[tokio::test]
async fn test_provider_failure_falls_back_without_caching() {
    let env = test_env_with(FakeProvider::failing("unavailable"), FakeMetadataSource::empty());
    let page = link(&env, "https://unknown.example.org/", "Unknown").await;

    let result = classify(&env, &page).await;
    assert_eq!(result.category, FALLBACK_CATEGORY);
    assert_eq!(result.confidence, 0.3);
    assert!(result.is_fallback());
    assert!(env.app.cache.peek(&page.url).is_none());
}

#[tokio::test]
async fn test_malformed_reply_falls_back() {
    let env = test_env_with(
        FakeProvider::answering("I think this is about cooking."),
        FakeMetadataSource::empty(),
    );
    let page = link(&env, "https://unknown.example.org/", "Unknown").await;

    let result = classify(&env, &page).await;
    assert!(result.is_fallback());
    assert!(env.app.cache.is_empty());
}

/// JSON wrapped in prose is still understood.
#[tokio::test]
async fn test_reply_embedded_in_text_is_parsed() {
    let env = test_env_with(
        FakeProvider::answering("Sure! {\"category\": \"新闻资讯\", \"confidence\": \"85%\"} Hope that helps."),
        FakeMetadataSource::empty(),
    );
    let page = link(&env, "https://daily.example.org/", "Daily").await;

    let result = classify(&env, &page).await;
    assert_eq!(result.category, "新闻资讯");
    assert!((result.confidence - 0.85).abs() < 1e-9);
}

// ─── Enrichment ───

#[tokio::test]
async fn test_enriched_description_marks_source() {
    let env = test_env_with(
        FakeProvider::answering(&reply("菜谱", 0.7)),
        FakeMetadataSource::with_description("Home cooking recipes"),
    );
    let page = link(&env, "https://food.example.org/", "").await;

    let result = classify(&env, &page).await;
    assert_eq!(result.source, ClassificationSource::Enrichment);
    assert_eq!(env.metadata.calls(), 1);
    assert!(!env.app.cache.peek(&page.url).expect("cached").locked);

    let request = env.provider.requests().remove(0);
    assert_eq!(request.description.as_deref(), Some("Home cooking recipes"));
    assert!(request.keywords.contains(&"fake".to_string()));
}

#[tokio::test]
async fn test_existing_description_skips_enrichment() {
    let env = test_env_with(
        FakeProvider::answering(&reply("菜谱", 0.7)),
        FakeMetadataSource::with_description("ignored"),
    );
    let id = env
        .tree
        .add_link("https://food.example.org/", "Food", &env.bar.id, Some("my own notes"))
        .unwrap();
    let page = env.tree.get_link(&id).await.unwrap().unwrap();

    let result = classify(&env, &page).await;
    assert_eq!(result.source, ClassificationSource::Ai);
    assert_eq!(env.metadata.calls(), 0);
    assert_eq!(
        env.provider.requests()[0].description.as_deref(),
        Some("my own notes")
    );
}

// ─── Folder vocabulary ───

#[tokio::test]
async fn test_existing_folders_skip_roots_staging_and_system() {
    let env = test_env();
    env.add_folder(&env.bar.id, "GitHub");
    env.add_folder(&env.bar.id, "菜谱");
    env.add_folder(&env.bar.id, "智能分类");
    env.add_folder(&env.other.id, "移动设备书签");
    env.add_folder(&env.other.id, "开发工具");

    let folders = env.app.resolver.existing_folders().await.unwrap();
    assert_eq!(folders, vec!["开发工具".to_string(), "菜谱".to_string()]);

    let page = link(&env, "https://food.example.org/", "Food").await;
    classify(&env, &page).await;
    assert_eq!(env.provider.requests()[0].existing_folders, folders);
}

// ─── Connection test ───

#[tokio::test]
async fn test_connection_check() {
    let env = test_env();
    assert!(env
        .app
        .resolver
        .test_connection(ProviderName::Gemini, "key", "gemini-1.5-flash")
        .await
        .is_ok());

    env.provider.set_failure("bad key");
    assert!(env
        .app
        .resolver
        .test_connection(ProviderName::OpenAi, "key", "")
        .await
        .is_err());
}
