//! SQLite permission store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use permissions::{Permission, Persistence};
use rusqlite::{params, Connection};
use serde::Deserialize;
use tracing::debug;

use crate::Result;

/// SQLite-backed permission store.
///
/// Grants are keyed by (subject, target) and returned in first-grant order.
pub struct PermissionDb {
    conn: Mutex<Connection>,
}

#[derive(Deserialize)]
struct StoredPermission {
    data: String,
}

impl PermissionDb {
    /// Open or create a permission store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory permission store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS permissions (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                subject TEXT NOT NULL,
                target TEXT NOT NULL,
                id TEXT NOT NULL,
                date INTEGER NOT NULL,
                data TEXT NOT NULL,
                UNIQUE (subject, target)
            );
            "#,
        )?;
        Ok(())
    }

    /// Insert or replace the grant for the permission's (invoker, target).
    pub fn save(&self, permission: &Permission) -> Result<()> {
        self.conn().execute(
            "INSERT INTO permissions (subject, target, id, date, data)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (subject, target) DO UPDATE SET
                id = excluded.id, date = excluded.date, data = excluded.data",
            params![
                permission.invoker(),
                permission.target(),
                permission.id().to_string(),
                permission.date(),
                serde_json::to_string(permission)?,
            ],
        )?;
        debug!(subject = permission.invoker(), target = permission.target(), "saved permission");
        Ok(())
    }

    /// Delete one grant. Returns whether a row was removed.
    pub fn remove(&self, subject: &str, target: &str) -> Result<bool> {
        let removed = self.conn().execute(
            "DELETE FROM permissions WHERE subject = ?1 AND target = ?2",
            params![subject, target],
        )?;
        Ok(removed > 0)
    }

    /// Delete every grant of a subject. Returns the number of rows removed.
    pub fn remove_subject(&self, subject: &str) -> Result<usize> {
        let removed = self
            .conn()
            .execute("DELETE FROM permissions WHERE subject = ?1", params![subject])?;
        Ok(removed)
    }

    /// Load the grants of one subject.
    pub fn load_subject(&self, subject: &str) -> Result<Vec<Permission>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT data FROM permissions WHERE subject = ?1 ORDER BY seq")?;
        let rows = serde_rusqlite::from_rows::<StoredPermission>(stmt.query([subject])?);
        decode(rows)
    }

    /// Load every stored grant.
    pub fn load_all(&self) -> Result<Vec<Permission>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT data FROM permissions ORDER BY seq")?;
        let rows = serde_rusqlite::from_rows::<StoredPermission>(stmt.query([])?);
        decode(rows)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn decode(
    rows: impl Iterator<Item = std::result::Result<StoredPermission, serde_rusqlite::Error>>,
) -> Result<Vec<Permission>> {
    let mut permissions = Vec::new();
    for row in rows {
        permissions.push(serde_json::from_str(&row?.data)?);
    }
    Ok(permissions)
}

impl Persistence for PermissionDb {
    fn save(&self, permission: &Permission) -> permissions::Result<()> {
        Ok(PermissionDb::save(self, permission)?)
    }

    fn remove(&self, subject: &str, target: &str) -> permissions::Result<()> {
        PermissionDb::remove(self, subject, target)?;
        Ok(())
    }

    fn remove_subject(&self, subject: &str) -> permissions::Result<()> {
        PermissionDb::remove_subject(self, subject)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use permissions::{construct_permission, Caveat, PermissionOptions};
    use serde_json::json;

    fn permission(subject: &str, target: &str) -> Permission {
        construct_permission(
            PermissionOptions::new(target, subject)
                .with_caveats(vec![Caveat::new("limit", json!({ "max": 3 }))]),
        )
    }

    #[test]
    fn save_and_load_round_trip() {
        let db = PermissionDb::in_memory().unwrap();
        let first = permission("npm:a", "wallet_plugin_x");
        let second = permission("npm:a", "endowment:long-running");
        db.save(&first).unwrap();
        db.save(&second).unwrap();
        db.save(&permission("npm:b", "wallet_plugin_x")).unwrap();

        assert_eq!(db.load_subject("npm:a").unwrap(), [first, second]);
        assert_eq!(db.load_all().unwrap().len(), 3);
    }

    #[test]
    fn save_replaces_in_place() {
        let db = PermissionDb::in_memory().unwrap();
        db.save(&permission("npm:a", "t_one")).unwrap();
        db.save(&permission("npm:a", "t_two")).unwrap();
        let replacement = permission("npm:a", "t_one");
        db.save(&replacement).unwrap();

        let loaded = db.load_subject("npm:a").unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], replacement);
    }

    #[test]
    fn remove_grants() {
        let db = PermissionDb::in_memory().unwrap();
        db.save(&permission("npm:a", "t_one")).unwrap();
        db.save(&permission("npm:a", "t_two")).unwrap();

        assert!(db.remove("npm:a", "t_one").unwrap());
        assert!(!db.remove("npm:a", "t_one").unwrap());
        assert_eq!(db.remove_subject("npm:a").unwrap(), 1);
        assert!(db.load_all().unwrap().is_empty());
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("permissions.db");
        let saved = permission("npm:a", "t_one");

        PermissionDb::open(&path).unwrap().save(&saved).unwrap();
        let reopened = PermissionDb::open(&path).unwrap();
        assert_eq!(reopened.load_all().unwrap(), [saved]);
    }
}
