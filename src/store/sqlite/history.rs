use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};

use super::{SqliteStore, format_datetime, parse_datetime};
use crate::error::{Error, Result};
use crate::store::HistoryStore;
use crate::types::*;

const BACKUP_COLUMNS: &str = "tag, structure_id, resource_id, resource_path, resource_type, state,
     length, data, properties, published_at";

fn map_backup(row: &Row<'_>) -> rusqlite::Result<BackupResource> {
    let type_code: i64 = row.get(4)?;
    let state_code: i64 = row.get(5)?;
    let properties: String = row.get(8)?;
    Ok(BackupResource {
        tag: row.get(0)?,
        structure_id: row.get(1)?,
        resource_id: row.get(2)?,
        root_path: row.get(3)?,
        resource_type: ResourceType::from_code(type_code)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(4, type_code))?,
        state: ResourceState::from_code(state_code)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(5, state_code))?,
        length: row.get(6)?,
        contents: row.get::<_, Option<Vec<u8>>>(7)?.unwrap_or_default(),
        properties: serde_json::from_str(&properties).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?,
        published_at: parse_datetime(&row.get::<_, String>(9)?),
    })
}

fn map_published(row: &Row<'_>) -> rusqlite::Result<PublishedResource> {
    let state_code: i64 = row.get(5)?;
    Ok(PublishedResource {
        history_id: row.get(0)?,
        tag: row.get(1)?,
        structure_id: row.get(2)?,
        resource_id: row.get(3)?,
        root_path: row.get(4)?,
        state: ResourceState::from_code(state_code)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(5, state_code))?,
    })
}

impl HistoryStore for SqliteStore {
    fn next_backup_tag(&self) -> Result<i64> {
        self.conn()
            .query_row(
                "SELECT COALESCE(MAX(tag), 0) + 1 FROM backup_projects",
                [],
                |row| row.get(0),
            )
            .map_err(Error::from)
    }

    fn write_backup_project(&self, backup: &BackupProject) -> Result<()> {
        self.conn().execute(
            "INSERT INTO backup_projects (tag, project_id, project_name, published_by, published_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                backup.tag,
                backup.project_id,
                backup.project_name,
                backup.published_by,
                format_datetime(&backup.published_at),
            ],
        )?;
        Ok(())
    }

    fn write_backup_resource(&self, backup: &BackupResource, max_versions: usize) -> Result<()> {
        let properties = serde_json::to_string(&backup.properties)?;
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO backup_resources (tag, structure_id, resource_id, resource_path,
                 resource_type, state, length, data, properties, published_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                backup.tag,
                backup.structure_id,
                backup.resource_id,
                backup.root_path,
                backup.resource_type.code(),
                backup.state.code(),
                backup.length,
                backup.contents,
                properties,
                format_datetime(&backup.published_at),
            ],
        )?;
        if max_versions > 0 {
            tx.execute(
                "DELETE FROM backup_resources
                 WHERE structure_id = ?1 AND tag NOT IN (
                     SELECT tag FROM backup_resources WHERE structure_id = ?1
                     ORDER BY tag DESC LIMIT ?2
                 )",
                params![backup.structure_id, max_versions as i64],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn read_backup_resource(&self, tag: i64, id: &StructureId) -> Result<Option<BackupResource>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {BACKUP_COLUMNS} FROM backup_resources WHERE tag = ?1 AND structure_id = ?2"
            ),
            params![tag, id],
            map_backup,
        )
        .optional()
        .map_err(Error::from)
    }

    fn read_backup_versions(&self, id: &StructureId) -> Result<Vec<BackupResource>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BACKUP_COLUMNS} FROM backup_resources WHERE structure_id = ?1 ORDER BY tag DESC"
        ))?;
        let rows = stmt.query_map(params![id], map_backup)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_backups(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        let cutoff = format_datetime(&older_than);
        tx.execute(
            "DELETE FROM backup_resources WHERE tag IN
                 (SELECT tag FROM backup_projects WHERE published_at < ?1)",
            params![cutoff],
        )?;
        let rows = tx.execute(
            "DELETE FROM backup_projects WHERE published_at < ?1",
            params![cutoff],
        )?;
        tx.commit()?;
        Ok(rows)
    }

    fn write_publish_history(&self, entry: &PublishedResource) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO publish_history (history_id, tag, structure_id, resource_id,
                 resource_path, state)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.history_id,
                entry.tag,
                entry.structure_id,
                entry.resource_id,
                entry.root_path,
                entry.state.code(),
            ],
        )?;
        Ok(())
    }

    fn read_published_resources(
        &self,
        history_id: &PublishHistoryId,
    ) -> Result<Vec<PublishedResource>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT history_id, tag, structure_id, resource_id, resource_path, state
             FROM publish_history WHERE history_id = ?1 ORDER BY resource_path",
        )?;
        let rows = stmt.query_map(params![history_id], map_published)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}
