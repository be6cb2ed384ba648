//! Unit tests for the MoveCoordinator: destination resolution, the processed
//! set and interference handling.

#[path = "../common/mod.rs"]
mod common;

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Notify;

use common::test_env;
use smartmarks::managers::bookmark_tree::{BookmarkTree, SqliteBookmarkTree};
use smartmarks::managers::move_coordinator::{FolderStrategy, MoveCoordinator};
use smartmarks::types::bookmark::{FolderNode, Link};
use smartmarks::types::errors::{MoveError, TreeError};
use smartmarks::types::events::OrganizeEvent;

/// Tree whose `move_link` waits for the gate to open before writing.
struct GatedTree {
    inner: Arc<SqliteBookmarkTree>,
    gate: Arc<Notify>,
}

#[async_trait]
impl BookmarkTree for GatedTree {
    async fn get_link(&self, link_id: &str) -> Result<Option<Link>, TreeError> {
        self.inner.get_link(link_id).await
    }

    async fn get_folder(&self, folder_id: &str) -> Result<Option<FolderNode>, TreeError> {
        self.inner.get_folder(folder_id).await
    }

    async fn root_containers(&self) -> Result<Vec<FolderNode>, TreeError> {
        self.inner.root_containers().await
    }

    async fn children_folders(&self, parent_id: &str) -> Result<Vec<FolderNode>, TreeError> {
        self.inner.children_folders(parent_id).await
    }

    async fn all_folders(&self) -> Result<Vec<FolderNode>, TreeError> {
        self.inner.all_folders().await
    }

    async fn all_links(&self) -> Result<Vec<Link>, TreeError> {
        self.inner.all_links().await
    }

    async fn links_in_folder(&self, folder_id: &str) -> Result<Vec<Link>, TreeError> {
        self.inner.links_in_folder(folder_id).await
    }

    async fn create_folder(&self, parent_id: &str, title: &str) -> Result<FolderNode, TreeError> {
        self.inner.create_folder(parent_id, title).await
    }

    async fn move_link(&self, link_id: &str, parent_id: &str) -> Result<(), TreeError> {
        self.gate.notified().await;
        self.inner.move_link(link_id, parent_id).await
    }
}

// ─── Destination ───

/// Batch moves create the category inside the staging container.
#[tokio::test]
async fn test_staging_container_created_on_demand() {
    let env = test_env();
    let id = env.add_link("https://a.example.org/", "A", &env.bar.id);

    let outcome = env
        .app
        .coordinator
        .move_to_category(&id, "学习教育", FolderStrategy::AlwaysUseStaging)
        .await
        .unwrap();
    assert!(outcome.moved);
    assert_eq!(outcome.from_folder.as_deref(), Some(env.bar.id.as_str()));

    let folder_id = outcome.folder_id.expect("folder");
    assert_eq!(env.tree.folder_path(&folder_id).await.unwrap(), "书签栏/智能分类/学习教育");
    let link = env.tree.get_link(&id).await.unwrap().unwrap();
    assert_eq!(link.parent_id.as_deref(), Some(folder_id.as_str()));
}

#[tokio::test]
async fn test_staged_category_is_reused() {
    let env = test_env();
    let a = env.add_link("https://a.example.org/", "A", &env.bar.id);
    let b = env.add_link("https://b.example.org/", "B", &env.bar.id);
    let coordinator = &env.app.coordinator;

    let first = coordinator
        .move_to_category(&a, "学习教育", FolderStrategy::AlwaysUseStaging)
        .await
        .unwrap();
    let second = coordinator
        .move_to_category(&b, "学习教育", FolderStrategy::AlwaysUseStaging)
        .await
        .unwrap();
    assert_eq!(first.folder_id, second.folder_id);

    let staging: Vec<_> = env
        .tree
        .children_folders(&env.bar.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|f| f.title == "智能分类")
        .collect();
    assert_eq!(staging.len(), 1);
}

/// A top-level folder with the exact name wins over staging.
#[tokio::test]
async fn test_existing_top_level_folder_is_used() {
    let env = test_env();
    let existing = env.add_folder(&env.other.id, "学习教育");
    let id = env.add_link("https://a.example.org/", "A", &env.bar.id);

    let outcome = env
        .app
        .coordinator
        .move_to_category(&id, "学习教育", FolderStrategy::AlwaysUseStaging)
        .await
        .unwrap();
    assert_eq!(outcome.folder_id.as_deref(), Some(existing.id.as_str()));
    assert!(env
        .tree
        .children_folders(&env.bar.id)
        .await
        .unwrap()
        .iter()
        .all(|f| f.title != "智能分类"));
}

#[tokio::test]
async fn test_contextual_creates_under_first_root() {
    let env = test_env();
    let id = env.add_link("https://a.example.org/", "A", &env.other.id);

    let outcome = env
        .app
        .coordinator
        .move_to_category(&id, "菜谱", FolderStrategy::Contextual)
        .await
        .unwrap();
    let folder_id = outcome.folder_id.unwrap();
    assert_eq!(env.tree.folder_path(&folder_id).await.unwrap(), "书签栏/菜谱");
}

#[tokio::test]
async fn test_invalid_category_and_missing_link() {
    let env = test_env();
    let id = env.add_link("https://a.example.org/", "A", &env.bar.id);
    let coordinator = &env.app.coordinator;

    let err = coordinator
        .move_to_category(&id, "   ", FolderStrategy::Contextual)
        .await
        .unwrap_err();
    assert!(matches!(err, MoveError::InvalidCategory(_)));

    let err = coordinator
        .move_to_category("ghost", "菜谱", FolderStrategy::Contextual)
        .await
        .unwrap_err();
    assert!(matches!(err, MoveError::Tree(TreeError::NotFound(_))));
    assert!(!coordinator.is_moving("ghost"), "in-flight marker released on error");
}

// ─── Processed set ───

#[tokio::test]
async fn test_processed_links_are_skipped() {
    let env = test_env();
    let id = env.add_link("https://a.example.org/", "A", &env.bar.id);
    let coordinator = &env.app.coordinator;

    coordinator
        .move_to_category(&id, "学习教育", FolderStrategy::AlwaysUseStaging)
        .await
        .unwrap();
    assert!(coordinator.is_processed(&id));

    let again = coordinator
        .move_to_category(&id, "新闻资讯", FolderStrategy::AlwaysUseStaging)
        .await
        .unwrap();
    assert!(!again.moved);
    assert_eq!(again.skipped_reason.as_deref(), Some("already processed"));
}

/// User moves ignore the processed set.
#[tokio::test]
async fn test_manual_move_bypasses_processed() {
    let env = test_env();
    let id = env.add_link("https://a.example.org/", "A", &env.bar.id);
    let coordinator = &env.app.coordinator;
    coordinator.mark_processed(&id).unwrap();

    let outcome = coordinator.move_manually(&id, "新闻资讯").await.unwrap();
    assert!(outcome.moved);
    let folder_id = outcome.folder_id.unwrap();
    assert_eq!(env.tree.folder_path(&folder_id).await.unwrap(), "书签栏/新闻资讯");
}

#[tokio::test]
async fn test_processed_set_survives_restart() {
    let env = test_env();
    let id = env.add_link("https://a.example.org/", "A", &env.bar.id);
    env.app.coordinator.mark_processed(&id).unwrap();

    let restarted = env.restart();
    assert!(restarted.coordinator.is_processed(&id));

    assert!(restarted.coordinator.unmark_processed(&id).unwrap());
    assert!(!restarted.coordinator.unmark_processed(&id).unwrap());
    assert!(!env.restart().coordinator.is_processed(&id));
}

#[tokio::test]
async fn test_clear_processed() {
    let env = test_env();
    let coordinator = &env.app.coordinator;
    coordinator.mark_processed("a").unwrap();
    coordinator.mark_processed("b").unwrap();
    coordinator.clear_processed().unwrap();
    assert!(coordinator.processed_ids().is_empty());
}

/// A second move of the same link while the first is still writing is
/// skipped instead of racing it.
#[tokio::test]
async fn test_concurrent_move_of_same_link_is_skipped() {
    let env = test_env();
    let id = env.add_link("https://a.example.org/", "A", &env.bar.id);
    let gate = Arc::new(Notify::new());
    let tree = Arc::new(GatedTree {
        inner: env.tree.clone(),
        gate: gate.clone(),
    });
    let coordinator = MoveCoordinator::new(
        tree,
        env.store.clone(),
        env.app.settings.clone(),
        env.events.clone(),
    )
    .unwrap();

    let first = coordinator.move_to_category(&id, "学习教育", FolderStrategy::AlwaysUseStaging);
    let second = coordinator.move_to_category(&id, "新闻资讯", FolderStrategy::AlwaysUseStaging);
    let (first, second, ()) = tokio::join!(first, second, async {
        gate.notify_one();
    });

    let first = first.unwrap();
    let second = second.unwrap();
    assert!(first.moved);
    assert!(!second.moved);
    assert_eq!(second.skipped_reason.as_deref(), Some("already moving"));
    assert!(!coordinator.is_moving(&id));

    let link = env.tree.get_link(&id).await.unwrap().unwrap();
    let path = env.tree.folder_path(link.parent_id.as_deref().unwrap()).await.unwrap();
    assert_eq!(path, "书签栏/智能分类/学习教育");
}

// ─── Interference ───

#[tokio::test]
async fn test_external_move_reported_and_forgotten() {
    let env = test_env();
    let id = env.add_link("https://a.example.org/", "A", &env.bar.id);
    let coordinator = &env.app.coordinator;
    let outcome = coordinator
        .move_to_category(&id, "学习教育", FolderStrategy::AlwaysUseStaging)
        .await
        .unwrap();
    let organized = outcome.folder_id.unwrap();
    assert_eq!(coordinator.expected_folder(&id).as_deref(), Some(organized.as_str()));

    env.tree.move_link(&id, &env.other.id).await.unwrap();
    assert!(coordinator.on_external_move(&id, &env.other.id).await.unwrap());

    let events = env.events.events();
    assert!(events.iter().any(|e| matches!(
        e,
        OrganizeEvent::Interference { link_id, reverted: false, .. } if link_id == &id
    )));
    let link = env.tree.get_link(&id).await.unwrap().unwrap();
    assert_eq!(link.parent_id.as_deref(), Some(env.other.id.as_str()));

    assert!(coordinator.expected_folder(&id).is_none());
    assert!(!coordinator.on_external_move(&id, &env.bar.id).await.unwrap());
}

#[tokio::test]
async fn test_external_move_reverted_when_enabled() {
    let env = test_env();
    env.app
        .settings
        .set_value("organizer.revertInterference", json!(true))
        .unwrap();
    let id = env.add_link("https://a.example.org/", "A", &env.bar.id);
    let organized = env
        .app
        .coordinator
        .move_to_category(&id, "学习教育", FolderStrategy::AlwaysUseStaging)
        .await
        .unwrap()
        .folder_id
        .unwrap();

    env.tree.move_link(&id, &env.other.id).await.unwrap();
    assert!(env.app.coordinator.on_external_move(&id, &env.other.id).await.unwrap());

    let link = env.tree.get_link(&id).await.unwrap().unwrap();
    assert_eq!(link.parent_id.as_deref(), Some(organized.as_str()));
    assert!(env
        .events
        .events()
        .iter()
        .any(|e| matches!(e, OrganizeEvent::Interference { reverted: true, .. })));
    assert!(!env.app.coordinator.is_moving(&id));

    // The hint is spent: a second move away is the user's call.
    assert!(env.app.coordinator.expected_folder(&id).is_none());
    env.tree.move_link(&id, &env.other.id).await.unwrap();
    assert!(!env.app.coordinator.on_external_move(&id, &env.other.id).await.unwrap());
    let link = env.tree.get_link(&id).await.unwrap().unwrap();
    assert_eq!(link.parent_id.as_deref(), Some(env.other.id.as_str()));
}

/// Moves that agree with the hint, or links without a hint, are not reported.
#[tokio::test]
async fn test_expected_or_unknown_moves_are_quiet() {
    let env = test_env();
    let id = env.add_link("https://a.example.org/", "A", &env.bar.id);
    let coordinator = &env.app.coordinator;
    let organized = coordinator
        .move_to_category(&id, "学习教育", FolderStrategy::AlwaysUseStaging)
        .await
        .unwrap()
        .folder_id
        .unwrap();

    assert!(!coordinator.on_external_move(&id, &organized).await.unwrap());
    assert!(!coordinator.on_external_move("other-link", &env.bar.id).await.unwrap());
    assert!(env.events.events().is_empty());
}
