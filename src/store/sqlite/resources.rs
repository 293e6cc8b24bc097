use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{
    SqliteStore, format_datetime, format_optional_datetime, parse_datetime,
    parse_optional_datetime,
};
use crate::error::{Error, Result};
use crate::store::ResourceStore;
use crate::types::*;

const RESOURCE_COLUMNS: &str = "s.structure_id, s.resource_id, s.parent_id, s.resource_path,
     r.resource_type, r.flags, r.project_last_modified, s.state, r.date_created, r.created_by,
     r.date_last_modified, r.last_modified_by, s.date_released, s.date_expired,
     r.sibling_count, r.length, r.content_id
     FROM structures s
     JOIN resources r ON r.workspace = s.workspace AND r.resource_id = s.resource_id";

fn map_resource(row: &Row<'_>) -> rusqlite::Result<Resource> {
    let type_code: i64 = row.get(4)?;
    let state_code: i64 = row.get(7)?;
    Ok(Resource {
        structure_id: row.get(0)?,
        resource_id: row.get(1)?,
        parent_id: row.get(2)?,
        root_path: row.get(3)?,
        resource_type: ResourceType::from_code(type_code)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(4, type_code))?,
        flags: ResourceFlags::from(row.get::<_, i64>(5)?),
        project_last_modified: row.get(6)?,
        state: ResourceState::from_code(state_code)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(7, state_code))?,
        date_created: parse_datetime(&row.get::<_, String>(8)?),
        created_by: row.get(9)?,
        date_last_modified: parse_datetime(&row.get::<_, String>(10)?),
        last_modified_by: row.get(11)?,
        date_released: parse_optional_datetime(row.get(12)?),
        date_expired: parse_optional_datetime(row.get(13)?),
        sibling_count: row.get(14)?,
        length: row.get(15)?,
        content_id: row.get(16)?,
    })
}

fn query_resources(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Resource>> {
    let sql = format!("SELECT {RESOURCE_COLUMNS} WHERE {filter} ORDER BY s.resource_path");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params, map_resource)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

fn upsert_resource_record(conn: &Connection, ws: Workspace, r: &Resource) -> Result<()> {
    conn.execute(
        "INSERT INTO resources (workspace, resource_id, resource_type, flags, project_last_modified,
             date_created, created_by, date_last_modified, last_modified_by, length, content_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(workspace, resource_id) DO UPDATE SET
             resource_type = excluded.resource_type,
             flags = excluded.flags,
             project_last_modified = excluded.project_last_modified,
             date_last_modified = excluded.date_last_modified,
             last_modified_by = excluded.last_modified_by,
             length = excluded.length,
             content_id = excluded.content_id",
        params![
            ws,
            r.resource_id,
            r.resource_type.code(),
            i64::from(r.flags),
            r.project_last_modified,
            format_datetime(&r.date_created),
            r.created_by,
            format_datetime(&r.date_last_modified),
            r.last_modified_by,
            r.length,
            r.content_id,
        ],
    )?;
    Ok(())
}

fn insert_structure(conn: &Connection, ws: Workspace, r: &Resource) -> Result<()> {
    let state = match r.state {
        ResourceState::Keep => ResourceState::New,
        other => other,
    };
    let inserted = conn.execute(
        "INSERT INTO structures (workspace, structure_id, resource_id, parent_id, resource_path,
             state, date_released, date_expired)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            ws,
            r.structure_id,
            r.resource_id,
            r.parent_id,
            r.root_path,
            state.code(),
            format_optional_datetime(r.date_released.as_ref()),
            format_optional_datetime(r.date_expired.as_ref()),
        ],
    );
    match inserted {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(Error::AlreadyExists(r.root_path.clone()))
        }
        Err(e) => Err(e.into()),
    }
}

fn update_sibling_count(conn: &Connection, ws: Workspace, resource_id: &ResourceId) -> Result<i64> {
    conn.execute(
        "UPDATE resources SET sibling_count =
             (SELECT COUNT(*) FROM structures WHERE workspace = ?1 AND resource_id = ?2)
         WHERE workspace = ?1 AND resource_id = ?2",
        params![ws, resource_id],
    )?;
    let count = conn
        .query_row(
            "SELECT sibling_count FROM resources WHERE workspace = ?1 AND resource_id = ?2",
            params![ws, resource_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(count.unwrap_or(0))
}

impl ResourceStore for SqliteStore {
    fn read_resource(&self, ws: Workspace, root_path: &str) -> Result<Option<Resource>> {
        let conn = self.conn();
        let sql = format!("SELECT {RESOURCE_COLUMNS} WHERE s.workspace = ?1 AND s.resource_path = ?2");
        conn.query_row(&sql, params![ws, root_path], map_resource)
            .optional()
            .map_err(Error::from)
    }

    fn read_resource_by_id(&self, ws: Workspace, id: &StructureId) -> Result<Option<Resource>> {
        let conn = self.conn();
        let sql = format!("SELECT {RESOURCE_COLUMNS} WHERE s.workspace = ?1 AND s.structure_id = ?2");
        conn.query_row(&sql, params![ws, id], map_resource)
            .optional()
            .map_err(Error::from)
    }

    fn read_children(&self, ws: Workspace, parent: &StructureId) -> Result<Vec<Resource>> {
        let conn = self.conn();
        query_resources(
            &conn,
            "s.workspace = ?1 AND s.parent_id = ?2",
            params![ws, parent],
        )
    }

    fn read_siblings(&self, ws: Workspace, resource_id: &ResourceId) -> Result<Vec<Resource>> {
        let conn = self.conn();
        query_resources(
            &conn,
            "s.workspace = ?1 AND s.resource_id = ?2",
            params![ws, resource_id],
        )
    }

    fn read_subtree(&self, ws: Workspace, root_path: &str) -> Result<Vec<Resource>> {
        let conn = self.conn();
        query_resources(
            &conn,
            "s.workspace = ?1 AND substr(s.resource_path, 1, length(?2)) = ?2",
            params![ws, root_path],
        )
    }

    fn read_modified_resources(&self, ws: Workspace) -> Result<Vec<Resource>> {
        let conn = self.conn();
        query_resources(
            &conn,
            "s.workspace = ?1 AND s.state != ?2",
            params![ws, ResourceState::Unchanged.code()],
        )
    }

    fn read_content(&self, ws: Workspace, resource_id: &ResourceId) -> Result<Option<Vec<u8>>> {
        self.conn()
            .query_row(
                "SELECT data FROM contents WHERE workspace = ?1 AND resource_id = ?2",
                params![ws, resource_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(Error::from)
    }

    fn create_resource(
        &self,
        ws: Workspace,
        resource: &Resource,
        content: Option<&[u8]>,
    ) -> Result<()> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        upsert_resource_record(&tx, ws, resource)?;
        if let (Some(data), Some(content_id)) = (content, resource.content_id.as_ref()) {
            tx.execute(
                "INSERT INTO contents (workspace, resource_id, content_id, data) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(workspace, resource_id) DO UPDATE SET
                     content_id = excluded.content_id, data = excluded.data",
                params![ws, resource.resource_id, content_id, data],
            )?;
        }
        insert_structure(&tx, ws, resource)?;
        update_sibling_count(&tx, ws, &resource.resource_id)?;
        tx.commit()?;
        Ok(())
    }

    fn create_sibling(&self, ws: Workspace, resource: &Resource) -> Result<()> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM resources WHERE workspace = ?1 AND resource_id = ?2",
                params![ws, resource.resource_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(Error::not_found(format!(
                "resource record {}",
                resource.resource_id
            )));
        }
        insert_structure(&tx, ws, resource)?;
        update_sibling_count(&tx, ws, &resource.resource_id)?;
        tx.commit()?;
        Ok(())
    }

    fn write_resource(&self, ws: Workspace, resource: &Resource) -> Result<()> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        let rows = tx.execute(
            "UPDATE structures SET parent_id = ?3, resource_path = ?4, state = ?5,
                 date_released = ?6, date_expired = ?7
             WHERE workspace = ?1 AND structure_id = ?2",
            params![
                ws,
                resource.structure_id,
                resource.parent_id,
                resource.root_path,
                resource.state.code(),
                format_optional_datetime(resource.date_released.as_ref()),
                format_optional_datetime(resource.date_expired.as_ref()),
            ],
        )?;
        if rows == 0 {
            return Err(Error::not_found(resource.root_path.clone()));
        }
        upsert_resource_record(&tx, ws, resource)?;
        tx.commit()?;
        Ok(())
    }

    fn write_content(
        &self,
        ws: Workspace,
        resource_id: &ResourceId,
        content_id: &ContentId,
        data: &[u8],
    ) -> Result<()> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO contents (workspace, resource_id, content_id, data) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(workspace, resource_id) DO UPDATE SET
                 content_id = excluded.content_id, data = excluded.data",
            params![ws, resource_id, content_id, data],
        )?;
        tx.execute(
            "UPDATE resources SET length = ?3, content_id = ?4 WHERE workspace = ?1 AND resource_id = ?2",
            params![ws, resource_id, data.len() as i64, content_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn mark_siblings_changed(&self, ws: Workspace, resource_id: &ResourceId) -> Result<usize> {
        let rows = self.conn().execute(
            "UPDATE structures SET state = ?3
             WHERE workspace = ?1 AND resource_id = ?2 AND state = ?4",
            params![
                ws,
                resource_id,
                ResourceState::Changed.code(),
                ResourceState::Unchanged.code()
            ],
        )?;
        Ok(rows)
    }

    fn remove_resource(&self, ws: Workspace, id: &StructureId) -> Result<bool> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        let resource_id: Option<ResourceId> = tx
            .query_row(
                "SELECT resource_id FROM structures WHERE workspace = ?1 AND structure_id = ?2",
                params![ws, id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(resource_id) = resource_id else {
            return Err(Error::not_found(format!("structure {id}")));
        };

        tx.execute(
            "DELETE FROM properties WHERE workspace = ?1 AND structure_id = ?2",
            params![ws, id],
        )?;
        tx.execute(
            "DELETE FROM structures WHERE workspace = ?1 AND structure_id = ?2",
            params![ws, id],
        )?;

        let remaining = update_sibling_count(&tx, ws, &resource_id)?;
        let record_removed = remaining == 0;
        if record_removed {
            tx.execute(
                "DELETE FROM contents WHERE workspace = ?1 AND resource_id = ?2",
                params![ws, resource_id],
            )?;
            tx.execute(
                "DELETE FROM resources WHERE workspace = ?1 AND resource_id = ?2",
                params![ws, resource_id],
            )?;
        }
        tx.commit()?;
        Ok(record_removed)
    }

    fn read_properties(&self, ws: Workspace, id: &StructureId) -> Result<BTreeMap<String, String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT name, value FROM properties WHERE workspace = ?1 AND structure_id = ?2",
        )?;
        let rows = stmt.query_map(params![ws, id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        rows.collect::<std::result::Result<BTreeMap<_, _>, _>>()
            .map_err(Error::from)
    }

    fn write_property(
        &self,
        ws: Workspace,
        id: &StructureId,
        name: &str,
        value: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn();
        match value {
            Some(value) => conn.execute(
                "INSERT INTO properties (workspace, structure_id, name, value) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(workspace, structure_id, name) DO UPDATE SET value = excluded.value",
                params![ws, id, name, value],
            )?,
            None => conn.execute(
                "DELETE FROM properties WHERE workspace = ?1 AND structure_id = ?2 AND name = ?3",
                params![ws, id, name],
            )?,
        };
        Ok(())
    }

    fn remove_properties(&self, ws: Workspace, id: &StructureId) -> Result<()> {
        self.conn().execute(
            "DELETE FROM properties WHERE workspace = ?1 AND structure_id = ?2",
            params![ws, id],
        )?;
        Ok(())
    }

    fn has_property_definition(&self, name: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM property_definitions WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn create_property_definition(&self, name: &str) -> Result<()> {
        let rows = self.conn().execute(
            "INSERT OR IGNORE INTO property_definitions (name) VALUES (?1)",
            params![name],
        )?;
        if rows == 0 {
            return Err(Error::AlreadyExists(format!("property definition '{name}'")));
        }
        Ok(())
    }

    fn read_property_definitions(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT name FROM property_definitions ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::TempDir;

    use super::*;
    use crate::store::Store;

    fn test_store() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::new(dir.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        (store, dir)
    }

    fn resource(path: &str, resource_type: ResourceType) -> Resource {
        let now = Utc::now();
        let user = PrincipalId::new();
        Resource {
            structure_id: StructureId::new(),
            resource_id: ResourceId::new(),
            parent_id: None,
            root_path: path.to_string(),
            resource_type,
            flags: ResourceFlags::default(),
            project_last_modified: Some(ProjectId::new(2)),
            state: ResourceState::New,
            date_created: now,
            created_by: user,
            date_last_modified: now,
            last_modified_by: user,
            date_released: None,
            date_expired: None,
            sibling_count: 1,
            length: 0,
            content_id: None,
        }
    }

    fn file(path: &str, content: &[u8]) -> Resource {
        let mut r = resource(path, ResourceType::Plain);
        r.length = content.len() as i64;
        r.content_id = Some(ContentId::new());
        r
    }

    #[test]
    fn test_create_and_read_resource() {
        let (store, _dir) = test_store();
        let r = file("/a/x.html", b"hi");
        store
            .create_resource(Workspace::Offline, &r, Some(b"hi"))
            .unwrap();

        let read = store
            .read_resource(Workspace::Offline, "/a/x.html")
            .unwrap()
            .unwrap();
        assert_eq!(read.structure_id, r.structure_id);
        assert_eq!(read.state, ResourceState::New);
        assert_eq!(read.sibling_count, 1);
        assert_eq!(read.length, 2);

        let content = store
            .read_content(Workspace::Offline, &r.resource_id)
            .unwrap();
        assert_eq!(content.as_deref(), Some(&b"hi"[..]));

        assert!(
            store
                .read_resource(Workspace::Online, "/a/x.html")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_duplicate_path_is_already_exists() {
        let (store, _dir) = test_store();
        store
            .create_resource(Workspace::Offline, &file("/x", b""), Some(b""))
            .unwrap();
        let err = store
            .create_resource(Workspace::Offline, &file("/x", b""), Some(b""))
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[test]
    fn test_sibling_count_tracks_structures() {
        let (store, _dir) = test_store();
        let r = file("/a/x.html", b"hi");
        store
            .create_resource(Workspace::Offline, &r, Some(b"hi"))
            .unwrap();

        let mut sibling = r.clone();
        sibling.structure_id = StructureId::new();
        sibling.root_path = "/b/x.html".to_string();
        store.create_sibling(Workspace::Offline, &sibling).unwrap();

        let siblings = store
            .read_siblings(Workspace::Offline, &r.resource_id)
            .unwrap();
        assert_eq!(siblings.len(), 2);
        assert!(siblings.iter().all(|s| s.sibling_count == 2));
        assert!(siblings.iter().all(|s| s.content_id == r.content_id));

        let removed = store
            .remove_resource(Workspace::Offline, &r.structure_id)
            .unwrap();
        assert!(!removed);
        let left = store
            .read_resource(Workspace::Offline, "/b/x.html")
            .unwrap()
            .unwrap();
        assert_eq!(left.sibling_count, 1);

        let removed = store
            .remove_resource(Workspace::Offline, &sibling.structure_id)
            .unwrap();
        assert!(removed);
        assert!(
            store
                .read_content(Workspace::Offline, &r.resource_id)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_sibling_requires_resource_record() {
        let (store, _dir) = test_store();
        let err = store
            .create_sibling(Workspace::Offline, &file("/x", b""))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_mark_siblings_changed_leaves_new_alone() {
        let (store, _dir) = test_store();
        let mut r = file("/a", b"1");
        r.state = ResourceState::Unchanged;
        store
            .create_resource(Workspace::Offline, &r, Some(b"1"))
            .unwrap();
        let mut sibling = r.clone();
        sibling.structure_id = StructureId::new();
        sibling.root_path = "/b".to_string();
        sibling.state = ResourceState::New;
        store.create_sibling(Workspace::Offline, &sibling).unwrap();

        let moved = store
            .mark_siblings_changed(Workspace::Offline, &r.resource_id)
            .unwrap();
        assert_eq!(moved, 1);

        let a = store.read_resource(Workspace::Offline, "/a").unwrap().unwrap();
        let b = store.read_resource(Workspace::Offline, "/b").unwrap().unwrap();
        assert_eq!(a.state, ResourceState::Changed);
        assert_eq!(b.state, ResourceState::New);
    }

    #[test]
    fn test_write_content_updates_length_for_all_siblings() {
        let (store, _dir) = test_store();
        let r = file("/a", b"1");
        store
            .create_resource(Workspace::Offline, &r, Some(b"1"))
            .unwrap();
        let mut sibling = r.clone();
        sibling.structure_id = StructureId::new();
        sibling.root_path = "/b".to_string();
        store.create_sibling(Workspace::Offline, &sibling).unwrap();

        let content_id = ContentId::new();
        store
            .write_content(Workspace::Offline, &r.resource_id, &content_id, b"hello")
            .unwrap();

        for path in ["/a", "/b"] {
            let read = store.read_resource(Workspace::Offline, path).unwrap().unwrap();
            assert_eq!(read.length, 5);
            assert_eq!(read.content_id, Some(content_id));
        }
    }

    #[test]
    fn test_children_and_subtree() {
        let (store, _dir) = test_store();
        let root = resource("/", ResourceType::Folder);
        store.create_resource(Workspace::Offline, &root, None).unwrap();
        let mut a = resource("/a/", ResourceType::Folder);
        a.parent_id = Some(root.structure_id);
        store.create_resource(Workspace::Offline, &a, None).unwrap();
        let mut x = file("/a/x.html", b"");
        x.parent_id = Some(a.structure_id);
        store
            .create_resource(Workspace::Offline, &x, Some(b""))
            .unwrap();

        let children = store
            .read_children(Workspace::Offline, &root.structure_id)
            .unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].root_path, "/a/");

        let subtree = store.read_subtree(Workspace::Offline, "/a/").unwrap();
        let paths: Vec<_> = subtree.iter().map(|r| r.root_path.as_str()).collect();
        assert_eq!(paths, vec!["/a/", "/a/x.html"]);
    }

    #[test]
    fn test_properties() {
        let (store, _dir) = test_store();
        let r = file("/a", b"");
        store.create_resource(Workspace::Offline, &r, Some(b"")).unwrap();
        store
            .write_property(Workspace::Offline, &r.structure_id, "title", Some("Hello"))
            .unwrap();
        store
            .write_property(Workspace::Offline, &r.structure_id, "title", Some("World"))
            .unwrap();
        let props = store
            .read_properties(Workspace::Offline, &r.structure_id)
            .unwrap();
        assert_eq!(props.get("title").map(String::as_str), Some("World"));

        store
            .write_property(Workspace::Offline, &r.structure_id, "title", None)
            .unwrap();
        assert!(
            store
                .read_properties(Workspace::Offline, &r.structure_id)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_property_definitions() {
        let (store, _dir) = test_store();
        assert!(!store.has_property_definition("title").unwrap());
        store.create_property_definition("title").unwrap();
        assert!(store.has_property_definition("title").unwrap());
        assert!(matches!(
            store.create_property_definition("title"),
            Err(Error::AlreadyExists(_))
        ));
        assert_eq!(store.read_property_definitions().unwrap(), vec!["title"]);
    }

    #[test]
    fn test_modified_resources_excludes_unchanged() {
        let (store, _dir) = test_store();
        let mut unchanged = file("/u", b"");
        unchanged.state = ResourceState::Unchanged;
        store
            .create_resource(Workspace::Offline, &unchanged, Some(b""))
            .unwrap();
        store
            .create_resource(Workspace::Offline, &file("/n", b""), Some(b""))
            .unwrap();

        let modified = store.read_modified_resources(Workspace::Offline).unwrap();
        assert_eq!(modified.len(), 1);
        assert_eq!(modified[0].root_path, "/n");
    }

    #[test]
    fn test_query_count_increments() {
        let (store, _dir) = test_store();
        let before = store.query_count();
        store.read_resource(Workspace::Offline, "/missing").unwrap();
        assert_eq!(store.query_count(), before + 1);
    }
}
