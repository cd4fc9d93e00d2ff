use rusqlite::params;

use courier_core::types::{now_rfc3339, DestinationId, IdentityId};

use crate::db::row_to_binding;
use crate::error::{Result, StoreError};
use crate::types::ChatBinding;

const BINDING_COLUMNS: &str =
    "id, identity_id, destination_id, name, kind, active, last_checked, created_at, updated_at";

impl crate::Store {
    /// Insert or refresh a binding for `(identity, destination)`, marking it
    /// active with a fresh `last_checked`. The UNIQUE constraint makes this a
    /// true upsert — name and kind are updated in place on conflict.
    pub fn upsert_binding(
        &self,
        identity_id: IdentityId,
        destination_id: DestinationId,
        name: &str,
        kind: &str,
    ) -> Result<()> {
        let now = now_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO chat_bindings
                (identity_id, destination_id, name, kind, active, last_checked, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5, ?5)
             ON CONFLICT (identity_id, destination_id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                active = 1,
                last_checked = excluded.last_checked,
                updated_at = excluded.updated_at",
            params![identity_id, destination_id, name, kind, now],
        )?;
        Ok(())
    }

    pub fn get_binding(
        &self,
        identity_id: IdentityId,
        destination_id: DestinationId,
    ) -> Result<Option<ChatBinding>> {
        let db = self.db.lock().unwrap();
        let sql = format!(
            "SELECT {BINDING_COLUMNS} FROM chat_bindings
             WHERE identity_id = ?1 AND destination_id = ?2"
        );
        match db.query_row(&sql, params![identity_id, destination_id], row_to_binding) {
            Ok(b) => Ok(Some(b)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Hard delete — reserved for bindings superseded by a migration winner.
    /// Everything else uses the soft path (`deactivate_bindings_except`).
    pub fn delete_binding(
        &self,
        identity_id: IdentityId,
        destination_id: DestinationId,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "DELETE FROM chat_bindings WHERE identity_id = ?1 AND destination_id = ?2",
            params![identity_id, destination_id],
        )?;
        Ok(())
    }

    /// Soft-delete every binding for `identity_id` whose destination is not
    /// in `keep` — destinations that vanished from the remote listing this
    /// cycle. Rows are kept (history) but excluded from active listings.
    pub fn deactivate_bindings_except(
        &self,
        identity_id: IdentityId,
        keep: &[DestinationId],
    ) -> Result<usize> {
        let now = now_rfc3339();
        let placeholders = (0..keep.len())
            .map(|i| format!("?{}", i + 3))
            .collect::<Vec<_>>()
            .join(",");
        let sql = if keep.is_empty() {
            "UPDATE chat_bindings SET active = 0, updated_at = ?2
             WHERE identity_id = ?1 AND active = 1"
                .to_string()
        } else {
            format!(
                "UPDATE chat_bindings SET active = 0, updated_at = ?2
                 WHERE identity_id = ?1 AND active = 1 AND destination_id NOT IN ({placeholders})"
            )
        };

        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&sql)?;
        let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&identity_id, &now];
        for id in keep {
            params_vec.push(id);
        }
        let changed = stmt.execute(params_vec.as_slice())?;
        Ok(changed)
    }

    /// Bindings for one identity; `active_only` filters out soft-deleted rows.
    pub fn list_bindings(
        &self,
        identity_id: IdentityId,
        active_only: bool,
    ) -> Result<Vec<ChatBinding>> {
        let sql = if active_only {
            format!(
                "SELECT {BINDING_COLUMNS} FROM chat_bindings
                 WHERE identity_id = ?1 AND active = 1 ORDER BY name"
            )
        } else {
            format!(
                "SELECT {BINDING_COLUMNS} FROM chat_bindings
                 WHERE identity_id = ?1 ORDER BY name"
            )
        };
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt
            .query_map(params![identity_id], row_to_binding)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_active_bindings(&self, identity_id: IdentityId) -> Result<u64> {
        let db = self.db.lock().unwrap();
        let count = db.query_row(
            "SELECT COUNT(*) FROM chat_bindings WHERE identity_id = ?1 AND active = 1",
            params![identity_id],
            |row| row.get::<_, u64>(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use crate::Store;

    fn store_with_identity() -> (Store, i64) {
        let store = Store::open_in_memory().unwrap();
        let identity = store.create_identity(1, None, None, None).unwrap();
        (store, identity.id)
    }

    #[test]
    fn upsert_refreshes_existing_row() {
        let (store, id) = store_with_identity();
        store.upsert_binding(id, 100, "Foo", "group").unwrap();
        store.upsert_binding(id, 100, "Foo Renamed", "supergroup").unwrap();

        let bindings = store.list_bindings(id, true).unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].name, "Foo Renamed");
        assert_eq!(bindings[0].kind, "supergroup");
    }

    #[test]
    fn deactivate_except_soft_deletes_the_rest() {
        let (store, id) = store_with_identity();
        store.upsert_binding(id, 100, "Foo", "group").unwrap();
        store.upsert_binding(id, 200, "Bar", "group").unwrap();
        store.upsert_binding(id, 300, "Baz", "group").unwrap();

        let changed = store.deactivate_bindings_except(id, &[100]).unwrap();
        assert_eq!(changed, 2);

        let active = store.list_bindings(id, true).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].destination_id, 100);
        // Soft-deleted rows remain queryable.
        assert_eq!(store.list_bindings(id, false).unwrap().len(), 3);
    }

    #[test]
    fn delete_binding_removes_the_row() {
        let (store, id) = store_with_identity();
        store.upsert_binding(id, 100, "Foo", "group").unwrap();
        store.delete_binding(id, 100).unwrap();
        assert!(store.get_binding(id, 100).unwrap().is_none());
        assert_eq!(store.list_bindings(id, false).unwrap().len(), 0);
    }
}
