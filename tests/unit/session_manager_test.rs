//! Unit tests for the organize session state machine, history and undo.

#[path = "../common/mod.rs"]
mod common;

use serde_json::json;

use common::test_env;
use smartmarks::managers::bookmark_tree::BookmarkTree;
use smartmarks::managers::move_coordinator::FolderStrategy;
use smartmarks::services::state_store::{StateStore, KEY_CURRENT_SESSION};
use smartmarks::types::errors::SessionError;
use smartmarks::types::events::OrganizeEvent;
use smartmarks::types::session::{OrganizeRecord, RecordStatus, SessionStatus};

fn record(link_id: &str, status: RecordStatus) -> OrganizeRecord {
    OrganizeRecord::new(link_id, "Title", "https://a.example.org/", "学习教育", status)
}

// ─── State machine ───

#[tokio::test]
async fn test_only_one_running_session() {
    let env = test_env();
    let sessions = &env.app.sessions;
    let id = sessions.start(3).unwrap();
    assert!(sessions.is_running());

    let err = sessions.start(1).unwrap_err();
    assert!(matches!(err, SessionError::AlreadyRunning(running) if running == id));
}

#[tokio::test]
async fn test_record_step_counts_and_emits_progress() {
    let env = test_env();
    let sessions = &env.app.sessions;
    sessions.start(2).unwrap();
    sessions.record_step(record("l1", RecordStatus::Completed)).unwrap();
    sessions.record_step(record("l2", RecordStatus::Pending)).unwrap();

    let current = sessions.current_session().unwrap();
    assert_eq!(current.processed_count, 2);
    assert_eq!(current.records.len(), 2);

    let progress: Vec<usize> = env
        .events
        .events()
        .into_iter()
        .filter_map(|e| match e {
            OrganizeEvent::Progress { processed, total, .. } => {
                assert_eq!(total, 2);
                Some(processed)
            }
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![1, 2]);
}

#[tokio::test]
async fn test_record_step_without_session_fails() {
    let env = test_env();
    let err = env
        .app
        .sessions
        .record_step(record("l1", RecordStatus::Completed))
        .unwrap_err();
    assert!(matches!(err, SessionError::NoActiveSession));
}

#[tokio::test]
async fn test_pause_and_resume() {
    let env = test_env();
    let sessions = &env.app.sessions;
    sessions.start(3).unwrap();
    sessions.record_step(record("l1", RecordStatus::Completed)).unwrap();
    sessions.pause(vec!["l2".into(), "l3".into()]).unwrap();

    assert!(sessions.is_paused());
    let paused = sessions.current_session().unwrap();
    assert_eq!(paused.status, SessionStatus::Paused);
    assert!(paused.paused_at.is_some());
    assert_eq!(paused.remaining_link_ids, Some(vec!["l2".to_string(), "l3".to_string()]));
    assert!(env.events.events().iter().any(|e| matches!(
        e,
        OrganizeEvent::Paused { processed: 1, remaining: 2, .. }
    )));

    assert!(matches!(sessions.pause(vec![]), Err(SessionError::InvalidState { .. })));

    let remaining = sessions.resume().unwrap();
    assert_eq!(remaining, vec!["l2", "l3"]);
    assert!(sessions.is_running());
    assert!(sessions.current_session().unwrap().remaining_link_ids.is_none());
}

#[tokio::test]
async fn test_resume_requires_paused_session() {
    let env = test_env();
    let sessions = &env.app.sessions;
    assert!(matches!(sessions.resume(), Err(SessionError::NoActiveSession)));

    sessions.start(1).unwrap();
    assert!(matches!(sessions.resume(), Err(SessionError::InvalidState { .. })));
}

#[tokio::test]
async fn test_end_archives_session() {
    let env = test_env();
    let sessions = &env.app.sessions;
    let id = sessions.start(1).unwrap();
    sessions.record_step(record("l1", RecordStatus::Completed)).unwrap();

    let ended = sessions.end(SessionStatus::Completed).unwrap();
    assert_eq!(ended.id, id);
    assert!(ended.end_time.is_some());
    assert!(sessions.current_session().is_none());
    assert!(env.store.get_raw(KEY_CURRENT_SESSION).unwrap().is_none());

    let history = sessions.history(None);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, SessionStatus::Completed);
    assert_eq!(history[0].processed_count, 1);
    assert!(env.events.events().iter().any(|e| matches!(
        e,
        OrganizeEvent::Finished { status: SessionStatus::Completed, processed: 1, total: 1, .. }
    )));
}

/// Starting over a paused run archives it as paused.
#[tokio::test]
async fn test_start_archives_paused_session() {
    let env = test_env();
    let sessions = &env.app.sessions;
    let paused_id = sessions.start(2).unwrap();
    sessions.pause(vec!["l1".into(), "l2".into()]).unwrap();

    sessions.start(5).unwrap();
    let history = sessions.history(None);
    assert_eq!(history[0].id, paused_id);
    assert_eq!(history[0].status, SessionStatus::Paused);
    assert!(sessions.is_running());
}

// ─── Restart ───

#[tokio::test]
async fn test_paused_session_survives_restart() {
    let env = test_env();
    env.app.sessions.start(2).unwrap();
    env.app.sessions.pause(vec!["l2".into()]).unwrap();

    let restarted = env.restart();
    assert!(restarted.sessions.is_paused());
    assert_eq!(restarted.sessions.resume().unwrap(), vec!["l2"]);
}

/// A session still running at startup was interrupted.
#[tokio::test]
async fn test_interrupted_session_archived_as_error() {
    let env = test_env();
    let id = env.app.sessions.start(4).unwrap();
    env.app
        .sessions
        .record_step(record("l1", RecordStatus::Completed))
        .unwrap();

    let restarted = env.restart();
    assert!(restarted.sessions.current_session().is_none());
    let history = restarted.sessions.history(None);
    assert_eq!(history[0].id, id);
    assert_eq!(history[0].status, SessionStatus::Error);
    assert_eq!(history[0].processed_count, 1);
    assert!(env.store.get_raw(KEY_CURRENT_SESSION).unwrap().is_none());
}

/// A record with a non-finite confidence must not corrupt the persisted
/// snapshot or the archive.
#[tokio::test]
async fn test_non_finite_confidence_survives_restart() {
    let env = test_env();
    let sessions = &env.app.sessions;
    sessions.start(2).unwrap();
    sessions
        .record_step(record("l1", RecordStatus::Error).with_confidence(f64::NAN, None))
        .unwrap();
    sessions
        .record_step(record("l2", RecordStatus::Pending).with_confidence(f64::INFINITY, None))
        .unwrap();
    sessions.end(SessionStatus::Completed).unwrap();

    let restarted = env.restart();
    let history = restarted.sessions.history(None);
    assert_eq!(history[0].records.len(), 2);
    assert!(history[0].records.iter().all(|r| r.confidence == 0.0));
}

// ─── History ───

#[tokio::test]
async fn test_history_is_capped_newest_first() {
    let env = test_env();
    env.app
        .settings
        .set_value("organizer.historyMaxSessions", json!(2))
        .unwrap();
    let sessions = &env.app.sessions;

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(sessions.start(0).unwrap());
        sessions.end(SessionStatus::Completed).unwrap();
    }

    let history = sessions.history(None);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, ids[2]);
    assert_eq!(history[1].id, ids[1]);
    assert_eq!(sessions.history(Some(1)).len(), 1);
}

#[tokio::test]
async fn test_recent_records_span_current_and_archived() {
    let env = test_env();
    let sessions = &env.app.sessions;
    sessions.start(1).unwrap();
    sessions.record_step(record("old", RecordStatus::Completed)).unwrap();
    sessions.end(SessionStatus::Completed).unwrap();

    sessions.start(1).unwrap();
    let mut newer = record("new", RecordStatus::Pending);
    newer.timestamp += 1_000;
    sessions.record_step(newer).unwrap();

    let recent = sessions.recent_records(10);
    let ids: Vec<&str> = recent.iter().map(|r| r.link_id.as_str()).collect();
    assert_eq!(ids, vec!["new", "old"]);
    assert_eq!(sessions.recent_records(1).len(), 1);
}

// ─── Undo ───

/// Undo moves the link back to its original folder and makes it eligible
/// for organizing again.
#[tokio::test]
async fn test_undo_restores_original_folder() {
    let env = test_env();
    let inbox = env.add_folder(&env.bar.id, "Inbox");
    let id = env.add_link("https://a.example.org/", "A", &inbox.id);

    let outcome = env
        .app
        .coordinator
        .move_to_category(&id, "学习教育", FolderStrategy::AlwaysUseStaging)
        .await
        .unwrap();
    let step = record(&id, RecordStatus::Completed)
        .with_origin(outcome.from_folder.clone(), Some("Inbox".to_string()));
    let record_id = step.id.clone();
    env.app.sessions.start(1).unwrap();
    env.app.sessions.record_step(step).unwrap();
    env.app.sessions.end(SessionStatus::Completed).unwrap();

    let undone = env.app.sessions.undo(&record_id).await.unwrap();
    assert_eq!(undone.link_id, id);

    let link = env.tree.get_link(&id).await.unwrap().unwrap();
    assert_eq!(link.parent_id.as_deref(), Some(inbox.id.as_str()));
    assert!(!env.app.coordinator.is_processed(&id));
    assert!(env.app.coordinator.expected_folder(&id).is_none());
    assert_eq!(env.app.sessions.history(None)[0].records.len(), 1, "history untouched");
}

#[tokio::test]
async fn test_undo_falls_back_to_first_root() {
    let env = test_env();
    let id = env.add_link("https://a.example.org/", "A", &env.other.id);
    let step = record(&id, RecordStatus::Completed).with_origin(Some("deleted-folder".into()), None);
    let record_id = step.id.clone();
    env.app.sessions.start(1).unwrap();
    env.app.sessions.record_step(step).unwrap();

    env.app.sessions.undo(&record_id).await.unwrap();
    let link = env.tree.get_link(&id).await.unwrap().unwrap();
    assert_eq!(link.parent_id.as_deref(), Some(env.bar.id.as_str()));
}

#[tokio::test]
async fn test_undo_unknown_record() {
    let env = test_env();
    let err = env.app.sessions.undo("record_missing").await.unwrap_err();
    assert!(matches!(err, SessionError::RecordNotFound(_)));
}
