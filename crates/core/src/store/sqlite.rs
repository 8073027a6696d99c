//! SQLite-backed tracking store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use tracing::debug;

use crate::matching::{extract_thread_id, normalise_url};

use super::{
    NewWork, SortKey, SortOrder, StateTriple, StoreError, TrackingFilter, TrackingRow,
    TrackingStore, TrackingUpdate, User, Work, WorkStatus, WorkUpdate,
};

const WORK_COLUMNS: &str = "g.id, g.f95_url, g.thread_id, g.name, g.version, g.author, g.image_url, \
    g.rss_pub_date, g.completed_status, g.description, g.changelog, g.engine, g.language, \
    g.censorship, g.tags_json, g.download_links_json, g.download_links_raw_html, g.os_list, \
    g.release_date, g.thread_updated_date, g.first_added_to_db, g.last_seen_on_rss, \
    g.last_updated_in_db, g.last_checked_at, g.scraper_last_run_at";

const TRACKING_COLUMNS: &str = "upg.id, upg.user_id, upg.user_notes, upg.user_rating, \
    upg.notify_for_updates, upg.date_added_to_played_list, upg.last_notified_version, \
    upg.last_notified_rss_pub_date, upg.last_notified_completion_status, \
    upg.user_acknowledged_version, upg.user_acknowledged_rss_pub_date, \
    upg.user_acknowledged_completion_status";

/// Number of columns in `TRACKING_COLUMNS`; work columns follow.
const TRACKING_COLUMN_COUNT: usize = 12;

fn db_err(e: impl ToString) -> StoreError {
    StoreError::Database(e.to_string())
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn parse_ts(value: Option<String>) -> Option<DateTime<Utc>> {
    value.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .or_else(|_| DateTime::parse_from_rfc2822(&s))
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

fn tracking_select() -> String {
    format!(
        "SELECT {TRACKING_COLUMNS}, {WORK_COLUMNS} FROM user_played_games upg JOIN games g ON g.id = upg.game_id"
    )
}

/// SQLite-backed tracking store.
pub struct SqliteTrackingStore {
    conn: Mutex<Connection>,
}

impl SqliteTrackingStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".to_string()))
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        // Returns the resulting mode; in-memory databases report "memory".
        let mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(db_err)?;
        debug!(journal_mode = %mode, "Opened tracking database");

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                is_admin INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS games (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                f95_url TEXT UNIQUE NOT NULL,
                name TEXT NOT NULL DEFAULT 'Unknown',
                version TEXT NOT NULL DEFAULT 'Unknown',
                author TEXT NOT NULL DEFAULT 'N/A',
                image_url TEXT,
                rss_pub_date TEXT,
                completed_status TEXT NOT NULL DEFAULT 'UNKNOWN',
                first_added_to_db TEXT NOT NULL,
                last_seen_on_rss TEXT,
                last_updated_in_db TEXT,
                last_checked_at TEXT,
                description TEXT,
                engine TEXT,
                language TEXT,
                censorship TEXT,
                tags_json TEXT,
                download_links_json TEXT,
                download_links_raw_html TEXT,
                scraper_last_run_at TEXT,
                os_list TEXT,
                release_date TEXT,
                thread_updated_date TEXT
            );

            CREATE TABLE IF NOT EXISTS user_played_games (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                game_id INTEGER NOT NULL,
                user_notes TEXT,
                user_rating REAL,
                notify_for_updates INTEGER NOT NULL DEFAULT 1,
                date_added_to_played_list TEXT NOT NULL,
                last_notified_version TEXT,
                last_notified_rss_pub_date TEXT,
                last_notified_completion_status TEXT,
                user_acknowledged_version TEXT,
                user_acknowledged_rss_pub_date TEXT,
                user_acknowledged_completion_status TEXT,
                UNIQUE (user_id, game_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (game_id) REFERENCES games(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS app_settings (
                user_id INTEGER NOT NULL,
                setting_key TEXT NOT NULL,
                setting_value TEXT,
                PRIMARY KEY (user_id, setting_key),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_upg_user ON user_played_games(user_id);
            "#,
        )
        .map_err(db_err)?;

        // Migration: thread id column for identity lookups
        let _ = conn.execute("ALTER TABLE games ADD COLUMN thread_id INTEGER", []);

        // Migration: changelog column
        let _ = conn.execute("ALTER TABLE games ADD COLUMN changelog TEXT", []);

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_games_thread_id ON games(thread_id)",
            [],
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn row_to_work(row: &rusqlite::Row, base: usize) -> rusqlite::Result<Work> {
        let thread_id: Option<i64> = row.get(base + 2)?;
        let status: Option<String> = row.get(base + 8)?;
        let tags_json: Option<String> = row.get(base + 14)?;
        let links_json: Option<String> = row.get(base + 15)?;
        let first_added: Option<String> = row.get(base + 20)?;

        Ok(Work {
            id: row.get(base)?,
            url: row.get(base + 1)?,
            thread_id: thread_id.and_then(|id| u64::try_from(id).ok()),
            name: row
                .get::<_, Option<String>>(base + 3)?
                .unwrap_or_else(|| "Unknown".to_string()),
            version: row
                .get::<_, Option<String>>(base + 4)?
                .unwrap_or_else(|| "Unknown".to_string()),
            author: row
                .get::<_, Option<String>>(base + 5)?
                .unwrap_or_else(|| "N/A".to_string()),
            image: row.get(base + 6)?,
            rss_pub_date: parse_ts(row.get(base + 7)?),
            status: status.as_deref().map(WorkStatus::parse).unwrap_or_default(),
            description: row.get(base + 9)?,
            changelog: row.get(base + 10)?,
            engine: row.get(base + 11)?,
            language: row.get(base + 12)?,
            censorship: row.get(base + 13)?,
            tags: tags_json
                .and_then(|j| serde_json::from_str(&j).ok())
                .unwrap_or_default(),
            download_links: links_json
                .and_then(|j| serde_json::from_str(&j).ok())
                .unwrap_or_default(),
            download_raw_html: row.get(base + 16)?,
            os_list: row.get(base + 17)?,
            release_date: row.get(base + 18)?,
            thread_updated: row.get(base + 19)?,
            first_added: parse_ts(first_added).unwrap_or_else(Utc::now),
            last_seen_on_feed: parse_ts(row.get(base + 21)?),
            last_updated: parse_ts(row.get(base + 22)?),
            last_checked: parse_ts(row.get(base + 23)?),
            last_scraped: parse_ts(row.get(base + 24)?),
        })
    }

    fn row_to_triple(row: &rusqlite::Row, base: usize) -> rusqlite::Result<StateTriple> {
        let status: Option<String> = row.get(base + 2)?;
        Ok(StateTriple {
            version: row.get(base)?,
            rss_date: parse_ts(row.get(base + 1)?),
            status: status.as_deref().map(WorkStatus::parse),
        })
    }

    fn row_to_tracking(row: &rusqlite::Row) -> rusqlite::Result<TrackingRow> {
        let date_added: Option<String> = row.get(5)?;
        Ok(TrackingRow {
            id: row.get(0)?,
            user_id: row.get(1)?,
            notes: row.get(2)?,
            rating: row.get(3)?,
            notify: row.get(4)?,
            date_added: parse_ts(date_added).unwrap_or_else(Utc::now),
            last_notified: Self::row_to_triple(row, 6)?,
            acknowledged: Self::row_to_triple(row, 9)?,
            work: Self::row_to_work(row, TRACKING_COLUMN_COUNT)?,
        })
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let created_at: Option<String> = row.get(3)?;
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            is_admin: row.get(2)?,
            created_at: parse_ts(created_at).unwrap_or_else(Utc::now),
        })
    }

    fn work_by_id(conn: &Connection, id: i64) -> Result<Option<Work>, StoreError> {
        conn.query_row(
            &format!("SELECT {WORK_COLUMNS} FROM games g WHERE g.id = ?"),
            params![id],
            |row| Self::row_to_work(row, 0),
        )
        .optional()
        .map_err(db_err)
    }

    fn work_by_url(conn: &Connection, url: &str) -> Result<Option<Work>, StoreError> {
        let url = url.trim();
        let by_column = |sql: &str, value: &dyn ToSql| {
            conn.query_row(sql, [value], |row| Self::row_to_work(row, 0))
                .optional()
                .map_err(db_err)
        };

        let exact = format!("SELECT {WORK_COLUMNS} FROM games g WHERE g.f95_url = ?");
        if let Some(work) = by_column(&exact, &url)? {
            return Ok(Some(work));
        }

        if let Some(thread_id) = extract_thread_id(url) {
            let by_id = format!(
                "SELECT {WORK_COLUMNS} FROM games g WHERE g.thread_id = ? ORDER BY g.id LIMIT 1"
            );
            if let Some(work) = by_column(&by_id, &(thread_id as i64))? {
                return Ok(Some(work));
            }
        }

        let normalised = normalise_url(url);
        let by_normalised = format!(
            "SELECT {WORK_COLUMNS} FROM games g WHERE g.f95_url IN (?1, ?1 || '/') ORDER BY g.id LIMIT 1"
        );
        by_column(&by_normalised, &normalised)
    }

    fn tracking_by_id(conn: &Connection, user_id: i64, tracking_id: i64) -> Result<Option<TrackingRow>, StoreError> {
        conn.query_row(
            &format!("{} WHERE upg.id = ? AND upg.user_id = ?", tracking_select()),
            params![tracking_id, user_id],
            Self::row_to_tracking,
        )
        .optional()
        .map_err(db_err)
    }

    fn query_tracking(
        conn: &Connection,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<Vec<TrackingRow>, StoreError> {
        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params, Self::row_to_tracking)
            .map_err(db_err)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(db_err)?);
        }
        Ok(result)
    }

    fn insert_work(conn: &Connection, work: &NewWork, now: DateTime<Utc>) -> Result<(Work, bool), StoreError> {
        let url = work.url.trim();
        let inserted = conn.execute(
            "INSERT INTO games (f95_url, thread_id, name, version, author, image_url, rss_pub_date, first_added_to_db, last_seen_on_rss) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                url,
                extract_thread_id(url).map(|id| id as i64),
                work.name.clone().unwrap_or_else(|| "Unknown".to_string()),
                work.version.clone().unwrap_or_else(|| "Unknown".to_string()),
                work.author.clone().unwrap_or_else(|| "N/A".to_string()),
                work.image,
                work.rss_pub_date.map(|d| d.to_rfc3339()),
                now.to_rfc3339(),
                if work.seen_on_feed { Some(now.to_rfc3339()) } else { None },
            ],
        );

        match inserted {
            Ok(_) => {
                let id = conn.last_insert_rowid();
                let stored = Self::work_by_id(conn, id)?
                    .ok_or_else(|| StoreError::NotFound(format!("work {id}")))?;
                Ok((stored, true))
            }
            Err(e) if is_unique_violation(&e) => {
                debug!(url = %url, "Work inserted concurrently, re-reading");
                let stored = Self::work_by_url(conn, url)?.ok_or_else(|| db_err(e))?;
                Ok((stored, false))
            }
            Err(e) => Err(db_err(e)),
        }
    }

    fn build_update(update: &WorkUpdate, now: DateTime<Utc>) -> Result<(Vec<&'static str>, Vec<Box<dyn ToSql>>), StoreError> {
        let mut sets: Vec<&'static str> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        macro_rules! set {
            ($col:literal, $value:expr) => {
                if let Some(v) = $value {
                    sets.push(concat!($col, " = ?"));
                    params.push(Box::new(v));
                }
            };
        }

        set!("name", update.name.clone());
        set!("version", update.version.clone());
        set!("author", update.author.clone());
        set!("image_url", update.image.clone());
        set!("rss_pub_date", update.rss_pub_date.map(|d| d.to_rfc3339()));
        set!("completed_status", update.status.map(|s| s.as_db_str().to_string()));
        set!("description", update.description.clone());
        set!("changelog", update.changelog.clone());
        set!("engine", update.engine.clone());
        set!("language", update.language.clone());
        set!("censorship", update.censorship.clone());
        set!(
            "tags_json",
            update.tags.as_ref().map(serde_json::to_string).transpose().map_err(db_err)?
        );
        set!(
            "download_links_json",
            update
                .download_links
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(db_err)?
        );
        set!("download_links_raw_html", update.download_raw_html.clone());
        set!("os_list", update.os_list.clone());
        set!("release_date", update.release_date.clone());
        set!("thread_updated_date", update.thread_updated.clone());
        set!("scraper_last_run_at", update.scraped_at.map(|d| d.to_rfc3339()));
        set!("last_seen_on_rss", update.seen_on_feed_at.map(|d| d.to_rfc3339()));
        set!("last_checked_at", update.checked_at.map(|d| d.to_rfc3339()));
        if update.has_changes() {
            set!("last_updated_in_db", Some(now.to_rfc3339()));
        }

        Ok((sets, params))
    }

    fn apply_update(conn: &Connection, id: i64, update: &WorkUpdate, now: DateTime<Utc>) -> Result<Work, StoreError> {
        let (sets, mut params) = Self::build_update(update, now)?;
        if !sets.is_empty() {
            let sql = format!("UPDATE games SET {} WHERE id = ?", sets.join(", "));
            params.push(Box::new(id));
            let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let changed = conn.execute(&sql, param_refs.as_slice()).map_err(db_err)?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("work {id}")));
            }
        }
        Self::work_by_id(conn, id)?.ok_or_else(|| StoreError::NotFound(format!("work {id}")))
    }

    /// Fields of `incoming` that differ from `existing`. Feed dates only move forward.
    fn refresh_from(existing: &Work, incoming: &NewWork) -> WorkUpdate {
        let differs = |new: &Option<String>, old: &str| {
            new.as_ref()
                .filter(|v| !v.trim().is_empty() && v.as_str() != old)
                .cloned()
        };
        WorkUpdate {
            name: differs(&incoming.name, &existing.name),
            version: differs(&incoming.version, &existing.version),
            author: differs(&incoming.author, &existing.author),
            image: incoming
                .image
                .clone()
                .filter(|i| existing.image.as_deref() != Some(i.as_str())),
            rss_pub_date: match (incoming.rss_pub_date, existing.rss_pub_date) {
                (Some(new), Some(old)) if new > old => Some(new),
                (Some(new), None) => Some(new),
                _ => None,
            },
            ..Default::default()
        }
    }
}

impl TrackingStore for SqliteTrackingStore {
    fn create_user(&self, username: &str, password_hash: &str, is_admin: bool) -> Result<User, StoreError> {
        let conn = self.conn()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO users (username, password_hash, is_admin, created_at) VALUES (?, ?, ?, ?)",
            params![username, password_hash, is_admin, now.to_rfc3339()],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::InvalidInput(format!("username '{username}' is taken"))
            } else {
                db_err(e)
            }
        })?;

        Ok(User {
            id: conn.last_insert_rowid(),
            username: username.to_string(),
            is_admin,
            created_at: now,
        })
    }

    fn delete_user(&self, user_id: i64) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let deleted = conn
            .execute("DELETE FROM users WHERE id = ?", params![user_id])
            .map_err(db_err)?;
        Ok(deleted > 0)
    }

    fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, username, is_admin, created_at FROM users ORDER BY id ASC")
            .map_err(db_err)?;
        let rows = stmt.query_map([], Self::row_to_user).map_err(db_err)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row.map_err(db_err)?);
        }
        Ok(users)
    }

    fn primary_admin(&self) -> Result<Option<User>, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, username, is_admin, created_at FROM users WHERE is_admin = 1 ORDER BY id ASC LIMIT 1",
            [],
            Self::row_to_user,
        )
        .optional()
        .map_err(db_err)
    }

    fn upsert_work_by_url(&self, work: &NewWork, now: DateTime<Utc>) -> Result<(Work, bool), StoreError> {
        let url = work.url.trim();
        if url.is_empty() {
            return Err(StoreError::InvalidInput("work URL is empty".to_string()));
        }

        let conn = self.conn()?;
        match Self::work_by_url(&conn, url)? {
            Some(existing) => {
                let mut update = Self::refresh_from(&existing, work);
                if work.seen_on_feed {
                    update.seen_on_feed_at = Some(now);
                }
                let updated = Self::apply_update(&conn, existing.id, &update, now)?;
                Ok((updated, false))
            }
            None => Self::insert_work(&conn, work, now),
        }
    }

    fn find_work_by_id(&self, id: i64) -> Result<Option<Work>, StoreError> {
        let conn = self.conn()?;
        Self::work_by_id(&conn, id)
    }

    fn find_work_by_url(&self, url: &str) -> Result<Option<Work>, StoreError> {
        let conn = self.conn()?;
        Self::work_by_url(&conn, url)
    }

    fn search_works(&self, term: &str, limit: u32) -> Result<Vec<Work>, StoreError> {
        let conn = self.conn()?;
        let pattern = format!("%{}%", term.trim());
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {WORK_COLUMNS} FROM games g WHERE g.name LIKE ?1 OR g.author LIKE ?1 ORDER BY g.name COLLATE NOCASE ASC LIMIT ?2"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![pattern, limit], |row| Self::row_to_work(row, 0))
            .map_err(db_err)?;

        let mut works = Vec::new();
        for row in rows {
            works.push(row.map_err(db_err)?);
        }
        Ok(works)
    }

    fn apply_work_update(&self, id: i64, update: &WorkUpdate, now: DateTime<Utc>) -> Result<Work, StoreError> {
        let conn = self.conn()?;
        Self::apply_update(&conn, id, update, now)
    }

    fn add_tracking(&self, user_id: i64, work_id: i64, now: DateTime<Utc>) -> Result<TrackingRow, StoreError> {
        let conn = self.conn()?;
        let work = Self::work_by_id(&conn, work_id)?
            .ok_or_else(|| StoreError::NotFound(format!("work {work_id}")))?;

        let version = work.version.clone();
        let rss_date = work.rss_pub_date.map(|d| d.to_rfc3339());
        let status = work.status.as_db_str();

        conn.execute(
            "INSERT INTO user_played_games (user_id, game_id, notify_for_updates, date_added_to_played_list, \
             last_notified_version, last_notified_rss_pub_date, last_notified_completion_status, \
             user_acknowledged_version, user_acknowledged_rss_pub_date, user_acknowledged_completion_status) \
             VALUES (?1, ?2, 1, ?3, ?4, ?5, ?6, ?4, ?5, ?6)",
            params![user_id, work_id, now.to_rfc3339(), version, rss_date, status],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::AlreadyTracked
            } else {
                db_err(e)
            }
        })?;

        let id = conn.last_insert_rowid();
        Self::tracking_by_id(&conn, user_id, id)?
            .ok_or_else(|| StoreError::NotFound(format!("tracking row {id}")))
    }

    fn get_tracking(&self, user_id: i64, tracking_id: i64) -> Result<Option<TrackingRow>, StoreError> {
        let conn = self.conn()?;
        Self::tracking_by_id(&conn, user_id, tracking_id)
    }

    fn list_tracking(&self, user_id: i64, filter: &TrackingFilter) -> Result<Vec<TrackingRow>, StoreError> {
        let conn = self.conn()?;

        let mut conditions = vec!["upg.user_id = ?"];
        let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(user_id)];

        if let Some(name) = filter.name_contains.as_deref().filter(|n| !n.trim().is_empty()) {
            conditions.push("g.name LIKE ?");
            params.push(Box::new(format!("%{}%", name.trim())));
        }
        if let Some(min_rating) = filter.min_rating {
            conditions.push("upg.user_rating >= ?");
            params.push(Box::new(min_rating));
        }

        let sort_column = match filter.sort {
            SortKey::Name => "g.name COLLATE NOCASE",
            SortKey::Rating => "upg.user_rating",
            SortKey::LastUpdated => "COALESCE(g.rss_pub_date, g.last_updated_in_db)",
            SortKey::DateAdded => "upg.date_added_to_played_list",
        };
        let order = match filter.order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };

        let sql = format!(
            "{} WHERE {} ORDER BY {} {}, upg.id ASC",
            tracking_select(),
            conditions.join(" AND "),
            sort_column,
            order
        );
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        Self::query_tracking(&conn, &sql, param_refs.as_slice())
    }

    fn list_sync_candidates(&self, user_id: i64) -> Result<Vec<TrackingRow>, StoreError> {
        let conn = self.conn()?;
        let sql = format!(
            "{} WHERE upg.user_id = ? AND upg.notify_for_updates = 1 \
             AND COALESCE(g.completed_status, 'UNKNOWN') NOT IN ('COMPLETED', 'ABANDONED') \
             ORDER BY upg.id ASC",
            tracking_select()
        );
        Self::query_tracking(&conn, &sql, &[&user_id as &dyn ToSql])
    }

    fn delete_tracking(&self, user_id: i64, tracking_id: i64) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM user_played_games WHERE id = ? AND user_id = ?",
                params![tracking_id, user_id],
            )
            .map_err(db_err)?;
        Ok(deleted > 0)
    }

    fn update_tracking(
        &self,
        user_id: i64,
        tracking_id: i64,
        update: &TrackingUpdate,
    ) -> Result<Option<TrackingRow>, StoreError> {
        if let Some(Some(rating)) = update.rating {
            if !(0.0..=5.0).contains(&rating) {
                return Err(StoreError::InvalidInput(format!(
                    "rating must be between 0 and 5, got {rating}"
                )));
            }
        }

        let conn = self.conn()?;
        let mut sets: Vec<&str> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(notes) = &update.notes {
            sets.push("user_notes = ?");
            params.push(Box::new(notes.clone()));
        }
        if let Some(rating) = update.rating {
            sets.push("user_rating = ?");
            params.push(Box::new(rating));
        }
        if let Some(notify) = update.notify {
            sets.push("notify_for_updates = ?");
            params.push(Box::new(notify));
        }

        if !sets.is_empty() {
            let sql = format!(
                "UPDATE user_played_games SET {} WHERE id = ? AND user_id = ?",
                sets.join(", ")
            );
            params.push(Box::new(tracking_id));
            params.push(Box::new(user_id));
            let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            conn.execute(&sql, param_refs.as_slice()).map_err(db_err)?;
        }

        Self::tracking_by_id(&conn, user_id, tracking_id)
    }

    fn acknowledge(&self, user_id: i64, tracking_id: i64) -> Result<Option<TrackingRow>, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE user_played_games SET \
             user_acknowledged_version = (SELECT version FROM games WHERE games.id = user_played_games.game_id), \
             user_acknowledged_rss_pub_date = (SELECT rss_pub_date FROM games WHERE games.id = user_played_games.game_id), \
             user_acknowledged_completion_status = (SELECT completed_status FROM games WHERE games.id = user_played_games.game_id) \
             WHERE id = ? AND user_id = ?",
            params![tracking_id, user_id],
        )
        .map_err(db_err)?;

        Self::tracking_by_id(&conn, user_id, tracking_id)
    }

    fn update_last_notified(&self, user_id: i64, tracking_id: i64, triple: &StateTriple) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE user_played_games SET last_notified_version = ?, last_notified_rss_pub_date = ?, \
                 last_notified_completion_status = ? WHERE id = ? AND user_id = ?",
                params![
                    triple.version,
                    triple.rss_date.map(|d| d.to_rfc3339()),
                    triple.status.map(|s| s.as_db_str()),
                    tracking_id,
                    user_id
                ],
            )
            .map_err(db_err)?;

        if changed == 0 {
            return Err(StoreError::NotFound(format!("tracking row {tracking_id}")));
        }
        Ok(())
    }

    fn get_setting(&self, user_id: i64, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT setting_value FROM app_settings WHERE user_id = ? AND setting_key = ?",
            params![user_id, key],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()
        .map(Option::flatten)
        .map_err(db_err)
    }

    fn set_setting(&self, user_id: i64, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO app_settings (user_id, setting_key, setting_value) VALUES (?, ?, ?) \
             ON CONFLICT(user_id, setting_key) DO UPDATE SET setting_value = excluded.setting_value",
            params![user_id, key, value],
        )
        .map_err(db_err)?;
        Ok(())
    }
}
