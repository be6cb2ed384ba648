//! The bookmark tree the engine organizes.
//!
//! [`BookmarkTree`] is the seam to the externally owned hierarchy; it can be
//! changed by the user at any time, so callers re-read before every write.
//! [`SqliteBookmarkTree`] is the SQLite-backed implementation used by the RPC
//! server and the tests.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use uuid::Uuid;

use crate::database::Database;
use crate::types::bookmark::{FolderNode, Link};
use crate::types::errors::TreeError;

/// Titles of the root containers created for a fresh tree.
pub const DEFAULT_ROOTS: [&str; 2] = ["书签栏", "其他书签"];

/// Guards path walks against cyclic parent references.
const MAX_DEPTH: usize = 64;

/// Async view of the hierarchical bookmark store.
#[async_trait]
pub trait BookmarkTree: Send + Sync {
    async fn get_link(&self, link_id: &str) -> Result<Option<Link>, TreeError>;

    async fn get_folder(&self, folder_id: &str) -> Result<Option<FolderNode>, TreeError>;

    /// Top-level containers (folders without a parent), in display order.
    async fn root_containers(&self) -> Result<Vec<FolderNode>, TreeError>;

    async fn children_folders(&self, parent_id: &str) -> Result<Vec<FolderNode>, TreeError>;

    async fn all_folders(&self) -> Result<Vec<FolderNode>, TreeError>;

    async fn all_links(&self) -> Result<Vec<Link>, TreeError>;

    /// Links directly inside `folder_id` (not in subfolders).
    async fn links_in_folder(&self, folder_id: &str) -> Result<Vec<Link>, TreeError>;

    async fn create_folder(&self, parent_id: &str, title: &str) -> Result<FolderNode, TreeError>;

    async fn move_link(&self, link_id: &str, parent_id: &str) -> Result<(), TreeError>;

    /// `/`-joined titles from the root container down to `folder_id`.
    async fn folder_path(&self, folder_id: &str) -> Result<String, TreeError> {
        let mut titles = Vec::new();
        let mut next = Some(folder_id.to_string());
        while let Some(id) = next {
            if titles.len() >= MAX_DEPTH {
                break;
            }
            match self.get_folder(&id).await? {
                Some(folder) => {
                    titles.push(folder.title);
                    next = folder.parent_id;
                }
                None if titles.is_empty() => return Err(TreeError::FolderNotFound(id)),
                None => break,
            }
        }
        titles.reverse();
        Ok(titles.join("/"))
    }
}

/// Bookmark tree stored in the `bookmark_folders` and `bookmarks` tables.
pub struct SqliteBookmarkTree {
    db: Arc<Database>,
}

impl SqliteBookmarkTree {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn now() -> i64 {
        Utc::now().timestamp()
    }

    fn next_folder_position(conn: &Connection, parent_id: Option<&str>) -> Result<i32, TreeError> {
        let pos = match parent_id {
            Some(pid) => conn.query_row(
                "SELECT COALESCE(MAX(position), -1) + 1 FROM bookmark_folders WHERE parent_id = ?1",
                params![pid],
                |row| row.get(0),
            )?,
            None => conn.query_row(
                "SELECT COALESCE(MAX(position), -1) + 1 FROM bookmark_folders WHERE parent_id IS NULL",
                [],
                |row| row.get(0),
            )?,
        };
        Ok(pos)
    }

    fn next_link_position(conn: &Connection, folder_id: &str) -> Result<i32, TreeError> {
        let pos = conn.query_row(
            "SELECT COALESCE(MAX(position), -1) + 1 FROM bookmarks WHERE folder_id = ?1",
            params![folder_id],
            |row| row.get(0),
        )?;
        Ok(pos)
    }

    fn folder_exists(conn: &Connection, folder_id: &str) -> Result<bool, TreeError> {
        let count: i32 = conn.query_row(
            "SELECT COUNT(*) FROM bookmark_folders WHERE id = ?1",
            params![folder_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn row_to_folder(row: &rusqlite::Row) -> rusqlite::Result<FolderNode> {
        Ok(FolderNode {
            id: row.get(0)?,
            title: row.get(1)?,
            parent_id: row.get(2)?,
        })
    }

    fn row_to_link(row: &rusqlite::Row) -> rusqlite::Result<Link> {
        let keywords: String = row.get(5)?;
        Ok(Link {
            id: row.get(0)?,
            url: row.get(1)?,
            title: row.get(2)?,
            parent_id: row.get(3)?,
            description: row.get(4)?,
            keywords: keywords
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }

    fn query_folders(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<FolderNode>, TreeError> {
        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, Self::row_to_folder)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn query_links(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Link>, TreeError> {
        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, Self::row_to_link)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn insert_folder(&self, parent_id: Option<&str>, title: &str) -> Result<FolderNode, TreeError> {
        let conn = self.db.connection()?;
        if let Some(pid) = parent_id {
            if !Self::folder_exists(&conn, pid)? {
                return Err(TreeError::FolderNotFound(pid.to_string()));
            }
        }
        let id = Uuid::new_v4().to_string();
        let position = Self::next_folder_position(&conn, parent_id)?;
        conn.execute(
            "INSERT INTO bookmark_folders (id, name, parent_id, position) VALUES (?1, ?2, ?3, ?4)",
            params![id, title, parent_id, position],
        )?;
        Ok(FolderNode {
            id,
            title: title.to_string(),
            parent_id: parent_id.map(str::to_string),
        })
    }

    /// Creates a folder under `parent_id`.
    pub fn add_folder(&self, parent_id: &str, title: &str) -> Result<FolderNode, TreeError> {
        self.insert_folder(Some(parent_id), title)
    }

    /// Creates a root container.
    pub fn create_root(&self, title: &str) -> Result<FolderNode, TreeError> {
        self.insert_folder(None, title)
    }

    /// Creates the default root containers when the tree has none.
    pub fn ensure_default_roots(&self) -> Result<Vec<FolderNode>, TreeError> {
        let existing = self.query_folders(
            "SELECT id, name, parent_id FROM bookmark_folders WHERE parent_id IS NULL ORDER BY position",
            &[],
        )?;
        if !existing.is_empty() {
            return Ok(existing);
        }
        DEFAULT_ROOTS.iter().map(|title| self.create_root(title)).collect()
    }

    /// Adds a link under `folder_id`. Returns the new link id.
    pub fn add_link(
        &self,
        url: &str,
        title: &str,
        folder_id: &str,
        description: Option<&str>,
    ) -> Result<String, TreeError> {
        let conn = self.db.connection()?;
        if !Self::folder_exists(&conn, folder_id)? {
            return Err(TreeError::FolderNotFound(folder_id.to_string()));
        }
        let id = Uuid::new_v4().to_string();
        let now = Self::now();
        let position = Self::next_link_position(&conn, folder_id)?;
        conn.execute(
            "INSERT INTO bookmarks (id, url, title, folder_id, position, created_at, updated_at, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![id, url, title, folder_id, position, now, now, description],
        )?;
        Ok(id)
    }

    pub fn remove_link(&self, link_id: &str) -> Result<(), TreeError> {
        let conn = self.db.connection()?;
        let affected = conn.execute("DELETE FROM bookmarks WHERE id = ?1", params![link_id])?;
        if affected == 0 {
            return Err(TreeError::NotFound(link_id.to_string()));
        }
        Ok(())
    }
}

const LINK_COLUMNS: &str = "id, url, title, folder_id, description, keywords";

#[async_trait]
impl BookmarkTree for SqliteBookmarkTree {
    async fn get_link(&self, link_id: &str) -> Result<Option<Link>, TreeError> {
        let conn = self.db.connection()?;
        let link = conn
            .query_row(
                &format!("SELECT {} FROM bookmarks WHERE id = ?1", LINK_COLUMNS),
                params![link_id],
                Self::row_to_link,
            )
            .optional()?;
        Ok(link)
    }

    async fn get_folder(&self, folder_id: &str) -> Result<Option<FolderNode>, TreeError> {
        let conn = self.db.connection()?;
        let folder = conn
            .query_row(
                "SELECT id, name, parent_id FROM bookmark_folders WHERE id = ?1",
                params![folder_id],
                Self::row_to_folder,
            )
            .optional()?;
        Ok(folder)
    }

    async fn root_containers(&self) -> Result<Vec<FolderNode>, TreeError> {
        self.query_folders(
            "SELECT id, name, parent_id FROM bookmark_folders WHERE parent_id IS NULL ORDER BY position",
            &[],
        )
    }

    async fn children_folders(&self, parent_id: &str) -> Result<Vec<FolderNode>, TreeError> {
        self.query_folders(
            "SELECT id, name, parent_id FROM bookmark_folders WHERE parent_id = ?1 ORDER BY position",
            &[&parent_id],
        )
    }

    async fn all_folders(&self) -> Result<Vec<FolderNode>, TreeError> {
        self.query_folders(
            "SELECT id, name, parent_id FROM bookmark_folders ORDER BY parent_id IS NOT NULL, position",
            &[],
        )
    }

    async fn all_links(&self) -> Result<Vec<Link>, TreeError> {
        self.query_links(
            &format!("SELECT {} FROM bookmarks ORDER BY created_at, position", LINK_COLUMNS),
            &[],
        )
    }

    async fn links_in_folder(&self, folder_id: &str) -> Result<Vec<Link>, TreeError> {
        self.query_links(
            &format!("SELECT {} FROM bookmarks WHERE folder_id = ?1 ORDER BY position", LINK_COLUMNS),
            &[&folder_id],
        )
    }

    async fn create_folder(&self, parent_id: &str, title: &str) -> Result<FolderNode, TreeError> {
        self.add_folder(parent_id, title)
    }

    async fn move_link(&self, link_id: &str, parent_id: &str) -> Result<(), TreeError> {
        let conn = self.db.connection()?;
        if !Self::folder_exists(&conn, parent_id)? {
            return Err(TreeError::FolderNotFound(parent_id.to_string()));
        }
        let position = Self::next_link_position(&conn, parent_id)?;
        let affected = conn.execute(
            "UPDATE bookmarks SET folder_id = ?1, position = ?2, updated_at = ?3 WHERE id = ?4",
            params![parent_id, position, Self::now(), link_id],
        )?;
        if affected == 0 {
            return Err(TreeError::NotFound(link_id.to_string()));
        }
        Ok(())
    }
}
