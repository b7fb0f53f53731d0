//! Persistence boundary for remembered window geometry, instance runtime
//! fields and named workspaces.
//!
//! [`SqliteStore`] opens a connection per operation and drops it on every
//! exit path, so a store value can be handed to any thread without sharing a
//! live connection across threads.

use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};

use crate::error::{Result, WinkeepError};
use crate::types::{
    Geometry, InstanceStatus, ShowState, TrackingState, WindowState, WorkspaceEntry,
};

/// Partial update of an instance row. `None` fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceRuntime {
    pub app_name: Option<String>,
    pub command: Option<String>,
    pub pid: Option<u32>,
    pub status: Option<InstanceStatus>,
    pub tracking: Option<TrackingState>,
    pub window_id: Option<String>,
    pub geometry: Option<Geometry>,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
}

pub trait StateStore: Send + Sync {
    /// The active record for `app_name`, if one was ever saved.
    fn get_window_state_for_app(&self, app_name: &str) -> Result<Option<WindowState>>;

    /// Upserts geometry for `app_name`, keeping its show state and remember flag.
    fn save_window_state(&self, app_name: &str, geometry: Geometry, display_index: i32)
        -> Result<()>;

    /// Updates the show state and remember flag of an existing record. `None`
    /// keeps the stored value. Returns whether a record existed.
    fn set_window_preferences(
        &self,
        app_name: &str,
        state: Option<ShowState>,
        remember: Option<bool>,
    ) -> Result<bool>;

    fn update_instance_runtime(&self, instance_id: &str, runtime: &InstanceRuntime) -> Result<()>;

    /// Sets `last_used` for `app_name`; returns whether a record existed.
    fn touch_last_used(&self, app_name: &str, at: &str) -> Result<bool>;

    fn list_app_names(&self) -> Result<Vec<String>>;

    fn forget_window_state(&self, app_name: &str) -> Result<bool>;

    /// Replaces the workspace `name` with `entries`.
    fn save_workspace(&self, name: &str, entries: &[WorkspaceEntry]) -> Result<()>;

    fn load_workspace(&self, name: &str) -> Result<Vec<WorkspaceEntry>>;

    fn list_workspaces(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct InstanceRow {
    pub instance_id: String,
    pub app_name: Option<String>,
    pub command: Option<String>,
    pub pid: Option<u32>,
    pub status: Option<String>,
    pub tracking: Option<String>,
    pub window_id: Option<String>,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let store = Self { path };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_instance(&self, instance_id: &str) -> Result<Option<InstanceRow>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT instance_id, app_name, command, pid, status, tracking, window_id, \
                        started_at, ended_at \
                 FROM instances WHERE instance_id = ?1",
                params![instance_id],
                |row| {
                    Ok(InstanceRow {
                        instance_id: row.get(0)?,
                        app_name: row.get(1)?,
                        command: row.get(2)?,
                        pid: row.get::<_, Option<i64>>(3)?.map(|pid| pid as u32),
                        status: row.get(4)?,
                        tracking: row.get(5)?,
                        window_id: row.get(6)?,
                        started_at: row.get(7)?,
                        ended_at: row.get(8)?,
                    })
                },
            )
            .optional()
            .map_err(|err| WinkeepError::store("Failed to query instance", err))
        })
    }

    fn init_schema(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS window_states (
                    app_name TEXT PRIMARY KEY,
                    x INTEGER NOT NULL,
                    y INTEGER NOT NULL,
                    width INTEGER NOT NULL,
                    height INTEGER NOT NULL,
                    display_index INTEGER NOT NULL DEFAULT 0,
                    state TEXT NOT NULL DEFAULT 'normal',
                    remember INTEGER NOT NULL DEFAULT 1,
                    last_used TEXT,
                    updated_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS instances (
                    instance_id TEXT PRIMARY KEY,
                    app_name TEXT,
                    command TEXT,
                    pid INTEGER,
                    status TEXT,
                    tracking TEXT,
                    window_id TEXT,
                    x INTEGER,
                    y INTEGER,
                    width INTEGER,
                    height INTEGER,
                    started_at TEXT,
                    ended_at TEXT,
                    updated_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS workspaces (
                    name TEXT NOT NULL,
                    position INTEGER NOT NULL,
                    app_name TEXT NOT NULL,
                    command TEXT NOT NULL,
                    x INTEGER NOT NULL,
                    y INTEGER NOT NULL,
                    width INTEGER NOT NULL,
                    height INTEGER NOT NULL,
                    display_index INTEGER NOT NULL,
                    saved_at TEXT NOT NULL,
                    PRIMARY KEY (name, position)
                 );
                 COMMIT;",
            )
            .map_err(|err| WinkeepError::store("Failed to initialize schema", err))
        })
    }

    fn with_connection<T>(&self, op: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.open()?;
        op(&mut conn)
    }

    fn open(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            fs_err::create_dir_all(parent)
                .map_err(|err| WinkeepError::io("Failed to create data dir", err))?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(|err| WinkeepError::store("Failed to open sqlite db", err))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|err| WinkeepError::store("Failed to enable WAL", err))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|err| WinkeepError::store("Failed to set synchronous", err))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|err| WinkeepError::store("Failed to set busy_timeout", err))?;

        Ok(conn)
    }
}

impl StateStore for SqliteStore {
    fn get_window_state_for_app(&self, app_name: &str) -> Result<Option<WindowState>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT x, y, width, height, display_index, state, remember, last_used \
                 FROM window_states WHERE app_name = ?1",
                params![app_name],
                |row| {
                    let state_raw: String = row.get(5)?;
                    Ok(WindowState {
                        x: row.get(0)?,
                        y: row.get(1)?,
                        width: row.get::<_, i64>(2)?.max(0) as u32,
                        height: row.get::<_, i64>(3)?.max(0) as u32,
                        display_index: row.get(4)?,
                        state: ShowState::from_str(&state_raw).unwrap_or_default(),
                        remember: row.get::<_, i64>(6)? != 0,
                        last_used: row.get(7)?,
                    })
                },
            )
            .optional()
            .map_err(|err| WinkeepError::store("Failed to query window state", err))
        })
    }

    fn save_window_state(
        &self,
        app_name: &str,
        geometry: Geometry,
        display_index: i32,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO window_states \
                    (app_name, x, y, width, height, display_index, last_used, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) \
                 ON CONFLICT(app_name) DO UPDATE SET \
                    x = excluded.x, \
                    y = excluded.y, \
                    width = excluded.width, \
                    height = excluded.height, \
                    display_index = excluded.display_index, \
                    last_used = excluded.last_used, \
                    updated_at = excluded.updated_at",
                params![
                    app_name,
                    geometry.x,
                    geometry.y,
                    geometry.width as i64,
                    geometry.height as i64,
                    display_index,
                    now
                ],
            )
            .map_err(|err| WinkeepError::store("Failed to upsert window state", err))?;
            Ok(())
        })
    }

    fn set_window_preferences(
        &self,
        app_name: &str,
        state: Option<ShowState>,
        remember: Option<bool>,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            let changed = conn
                .execute(
                    "UPDATE window_states SET \
                        state = COALESCE(?2, state), \
                        remember = COALESCE(?3, remember), \
                        updated_at = ?4 \
                     WHERE app_name = ?1",
                    params![
                        app_name,
                        state.map(|state| state.as_str()),
                        remember.map(i64::from),
                        now
                    ],
                )
                .map_err(|err| WinkeepError::store("Failed to update window preferences", err))?;
            Ok(changed > 0)
        })
    }

    fn update_instance_runtime(&self, instance_id: &str, runtime: &InstanceRuntime) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let geometry = runtime.geometry;
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO instances \
                    (instance_id, app_name, command, pid, status, tracking, window_id, \
                     x, y, width, height, started_at, ended_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14) \
                 ON CONFLICT(instance_id) DO UPDATE SET \
                    app_name = COALESCE(excluded.app_name, instances.app_name), \
                    command = COALESCE(excluded.command, instances.command), \
                    pid = COALESCE(excluded.pid, instances.pid), \
                    status = COALESCE(excluded.status, instances.status), \
                    tracking = COALESCE(excluded.tracking, instances.tracking), \
                    window_id = COALESCE(excluded.window_id, instances.window_id), \
                    x = COALESCE(excluded.x, instances.x), \
                    y = COALESCE(excluded.y, instances.y), \
                    width = COALESCE(excluded.width, instances.width), \
                    height = COALESCE(excluded.height, instances.height), \
                    started_at = COALESCE(excluded.started_at, instances.started_at), \
                    ended_at = COALESCE(excluded.ended_at, instances.ended_at), \
                    updated_at = excluded.updated_at",
                params![
                    instance_id,
                    runtime.app_name,
                    runtime.command,
                    runtime.pid.map(i64::from),
                    runtime.status.map(|status| status.as_str()),
                    runtime.tracking.map(|tracking| tracking.as_str()),
                    runtime.window_id,
                    geometry.map(|g| g.x),
                    geometry.map(|g| g.y),
                    geometry.map(|g| g.width as i64),
                    geometry.map(|g| g.height as i64),
                    runtime.started_at,
                    runtime.ended_at,
                    now
                ],
            )
            .map_err(|err| WinkeepError::store("Failed to update instance runtime", err))?;
            Ok(())
        })
    }

    fn touch_last_used(&self, app_name: &str, at: &str) -> Result<bool> {
        self.with_connection(|conn| {
            let changed = conn
                .execute(
                    "UPDATE window_states SET last_used = ?2 WHERE app_name = ?1",
                    params![app_name, at],
                )
                .map_err(|err| WinkeepError::store("Failed to touch last_used", err))?;
            Ok(changed > 0)
        })
    }

    fn list_app_names(&self) -> Result<Vec<String>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("SELECT app_name FROM window_states ORDER BY app_name ASC")
                .map_err(|err| WinkeepError::store("Failed to prepare app name query", err))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|err| WinkeepError::store("Failed to read app names", err))?;

            let mut names = Vec::new();
            for row in rows {
                names.push(row.map_err(|err| WinkeepError::store("Failed to decode app name", err))?);
            }
            Ok(names)
        })
    }

    fn forget_window_state(&self, app_name: &str) -> Result<bool> {
        self.with_connection(|conn| {
            let removed = conn
                .execute(
                    "DELETE FROM window_states WHERE app_name = ?1",
                    params![app_name],
                )
                .map_err(|err| WinkeepError::store("Failed to delete window state", err))?;
            Ok(removed > 0)
        })
    }

    fn save_workspace(&self, name: &str, entries: &[WorkspaceEntry]) -> Result<()> {
        let saved_at = Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            let tx = conn
                .transaction()
                .map_err(|err| WinkeepError::store("Failed to begin workspace save", err))?;
            tx.execute("DELETE FROM workspaces WHERE name = ?1", params![name])
                .map_err(|err| WinkeepError::store("Failed to clear workspace", err))?;
            for (position, entry) in entries.iter().enumerate() {
                tx.execute(
                    "INSERT INTO workspaces \
                        (name, position, app_name, command, x, y, width, height, display_index, saved_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        name,
                        position as i64,
                        entry.app_name,
                        entry.command,
                        entry.x,
                        entry.y,
                        entry.width as i64,
                        entry.height as i64,
                        entry.display_index,
                        saved_at
                    ],
                )
                .map_err(|err| WinkeepError::store("Failed to insert workspace entry", err))?;
            }
            tx.commit()
                .map_err(|err| WinkeepError::store("Failed to commit workspace", err))?;
            Ok(())
        })
    }

    fn load_workspace(&self, name: &str) -> Result<Vec<WorkspaceEntry>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT app_name, command, x, y, width, height, display_index \
                     FROM workspaces WHERE name = ?1 ORDER BY position ASC",
                )
                .map_err(|err| WinkeepError::store("Failed to prepare workspace query", err))?;
            let rows = stmt
                .query_map(params![name], |row| {
                    Ok(WorkspaceEntry {
                        app_name: row.get(0)?,
                        command: row.get(1)?,
                        x: row.get(2)?,
                        y: row.get(3)?,
                        width: row.get::<_, i64>(4)?.max(0) as u32,
                        height: row.get::<_, i64>(5)?.max(0) as u32,
                        display_index: row.get(6)?,
                    })
                })
                .map_err(|err| WinkeepError::store("Failed to read workspace rows", err))?;

            let mut entries = Vec::new();
            for row in rows {
                entries.push(
                    row.map_err(|err| WinkeepError::store("Failed to decode workspace row", err))?,
                );
            }
            Ok(entries)
        })
    }

    fn list_workspaces(&self) -> Result<Vec<String>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("SELECT DISTINCT name FROM workspaces ORDER BY name ASC")
                .map_err(|err| WinkeepError::store("Failed to prepare workspace list", err))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|err| WinkeepError::store("Failed to read workspace names", err))?;

            let mut names = Vec::new();
            for row in rows {
                names.push(
                    row.map_err(|err| WinkeepError::store("Failed to decode workspace name", err))?,
                );
            }
            Ok(names)
        })
    }
}
