use rusqlite::params;
use tracing::info;

use courier_core::types::{now_rfc3339, IdentityId};

use crate::db::{row_to_identity, IDENTITY_COLUMNS};
use crate::error::{Result, StoreError};
use crate::types::Identity;

impl crate::Store {
    /// Insert a brand-new identity row for an external account.
    ///
    /// The caller (the excluded auth subsystem) supplies whatever profile
    /// fields it learned during login; everything else starts at defaults.
    pub fn create_identity(
        &self,
        remote_id: i64,
        phone: Option<&str>,
        first_name: Option<&str>,
        username: Option<&str>,
    ) -> Result<Identity> {
        let now = now_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO identities
                (remote_id, phone, first_name, username, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![remote_id, phone, first_name, username, now],
        )?;
        let id = db.last_insert_rowid();
        drop(db);
        self.get_identity(id)?
            .ok_or(StoreError::IdentityNotFound { id })
    }

    /// Load an identity by primary key. Returns `None` instead of an error
    /// when absent so callers decide whether missing is exceptional.
    pub fn get_identity(&self, id: IdentityId) -> Result<Option<Identity>> {
        let db = self.db.lock().unwrap();
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = ?1");
        match db.query_row(&sql, params![id], row_to_identity) {
            Ok(i) => Ok(Some(i)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Look up an identity by its platform-native id.
    pub fn get_identity_by_remote(&self, remote_id: i64) -> Result<Option<Identity>> {
        let db = self.db.lock().unwrap();
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE remote_id = ?1");
        match db.query_row(&sql, params![remote_id], row_to_identity) {
            Ok(i) => Ok(Some(i)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// All identities that currently hold a credential and are authorized —
    /// the set the reconciler spawns a loop for.
    pub fn list_authorized_identities(&self) -> Result<Vec<Identity>> {
        let db = self.db.lock().unwrap();
        let sql = format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities
             WHERE authorized = 1 AND credential IS NOT NULL
             ORDER BY id"
        );
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt
            .query_map([], row_to_identity)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Store a fresh encrypted credential and mark the identity authorized.
    pub fn set_credential(&self, id: IdentityId, blob: &str) -> Result<()> {
        let now = now_rfc3339();
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE identities
             SET credential = ?2, authorized = 1, last_login = ?3, updated_at = ?3
             WHERE id = ?1",
            params![id, blob, now],
        )?;
        if changed == 0 {
            return Err(StoreError::IdentityNotFound { id });
        }
        Ok(())
    }

    /// Persist the mutable preference flags of an identity.
    pub fn update_identity_settings(&self, identity: &Identity) -> Result<()> {
        let now = now_rfc3339();
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE identities SET
                phone = ?2, first_name = ?3, username = ?4,
                notifications_enabled = ?5, simplified_login_enabled = ?6,
                is_admin = ?7, language = ?8, updated_at = ?9
             WHERE id = ?1",
            params![
                identity.id,
                identity.phone,
                identity.first_name,
                identity.username,
                identity.notifications_enabled as i64,
                identity.simplified_login_enabled as i64,
                identity.is_admin as i64,
                identity.language,
                now,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::IdentityNotFound { id: identity.id });
        }
        Ok(())
    }

    /// The store half of the invalidation cascade, as one transaction:
    /// clear the credential and authorized flag, then pause every runnable
    /// task the identity owns (`status='paused'`, `next_run=NULL`,
    /// `running=0`).
    ///
    /// Returns the ids of the tasks that were paused so the caller can drop
    /// their scheduler entries. Idempotent: on an already-invalidated
    /// identity both updates match nothing and the returned list is empty.
    pub fn invalidate_identity(&self, id: IdentityId) -> Result<Vec<String>> {
        let now = now_rfc3339();
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;

        tx.execute(
            "UPDATE identities
             SET credential = NULL, authorized = 0, updated_at = ?2
             WHERE id = ?1 AND (credential IS NOT NULL OR authorized = 1)",
            params![id, now],
        )?;

        let paused: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM tasks
                 WHERE identity_id = ?1 AND status IN ('active', 'scheduled')",
            )?;
            let rows = stmt.query_map(params![id], |row| row.get::<_, String>(0))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        if !paused.is_empty() {
            tx.execute(
                "UPDATE tasks
                 SET status = 'paused', next_run = NULL, running = 0, updated_at = ?2
                 WHERE identity_id = ?1 AND status IN ('active', 'scheduled')",
                params![id, now],
            )?;
        }

        tx.commit()?;

        if !paused.is_empty() {
            info!(identity_id = id, paused = paused.len(), "identity invalidated, tasks paused");
        }
        Ok(paused)
    }

    /// Remove an identity and, via FK cascade, all of its tasks, bindings,
    /// and execution history.
    pub fn delete_identity(&self, id: IdentityId) -> Result<()> {
        let db = self.db.lock().unwrap();
        let changed = db.execute("DELETE FROM identities WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StoreError::IdentityNotFound { id });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::Store;

    #[test]
    fn create_and_fetch_identity() {
        let store = Store::open_in_memory().unwrap();
        let identity = store
            .create_identity(42, Some("+1555"), Some("Ada"), None)
            .unwrap();
        assert_eq!(identity.remote_id, 42);
        assert!(!identity.authorized);
        assert!(identity.notifications_enabled);

        let by_remote = store.get_identity_by_remote(42).unwrap().unwrap();
        assert_eq!(by_remote.id, identity.id);
    }

    #[test]
    fn set_credential_marks_authorized() {
        let store = Store::open_in_memory().unwrap();
        let identity = store.create_identity(1, None, None, None).unwrap();
        store.set_credential(identity.id, "blob").unwrap();

        let reloaded = store.get_identity(identity.id).unwrap().unwrap();
        assert!(reloaded.authorized);
        assert_eq!(reloaded.credential.as_deref(), Some("blob"));
        assert_eq!(store.list_authorized_identities().unwrap().len(), 1);
    }

    #[test]
    fn invalidate_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let identity = store.create_identity(7, None, None, None).unwrap();
        store.set_credential(identity.id, "blob").unwrap();

        let first = store.invalidate_identity(identity.id).unwrap();
        assert!(first.is_empty()); // no tasks yet
        let reloaded = store.get_identity(identity.id).unwrap().unwrap();
        assert!(!reloaded.authorized);
        assert!(reloaded.credential.is_none());

        // Second call: same end state, still no error.
        let second = store.invalidate_identity(identity.id).unwrap();
        assert!(second.is_empty());
        let again = store.get_identity(identity.id).unwrap().unwrap();
        assert!(!again.authorized);
        assert!(again.credential.is_none());
    }
}
