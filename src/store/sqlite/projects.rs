use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{SqliteStore, format_datetime, parse_datetime};
use crate::error::{Error, Result};
use crate::store::ProjectStore;
use crate::types::*;

const PROJECT_COLUMNS: &str = "id, name, description, owner_id, user_group_id, manager_group_id,
     project_type, locked, hidden, created_at";

fn map_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        owner_id: row.get(3)?,
        user_group_id: row.get(4)?,
        manager_group_id: row.get(5)?,
        project_type: ProjectType::from_code(row.get(6)?),
        locked: row.get(7)?,
        hidden: row.get(8)?,
        resources: Vec::new(),
        created_at: parse_datetime(&row.get::<_, String>(9)?),
    })
}

fn load_resources(conn: &Connection, project: &mut Project) -> Result<()> {
    let mut stmt = conn.prepare(
        "SELECT resource_path FROM project_resources WHERE project_id = ?1 ORDER BY resource_path",
    )?;
    let rows = stmt.query_map(params![project.id], |row| row.get::<_, String>(0))?;
    project.resources = rows.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(())
}

fn read_one(conn: &Connection, filter: &str, param: &dyn rusqlite::ToSql) -> Result<Option<Project>> {
    let project = conn
        .query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE {filter}"),
            &[param],
            map_project,
        )
        .optional()?;
    match project {
        Some(mut project) => {
            load_resources(conn, &mut project)?;
            Ok(Some(project))
        }
        None => Ok(None),
    }
}

impl ProjectStore for SqliteStore {
    fn create_project(&self, project: &NewProject, owner: &PrincipalId) -> Result<Project> {
        let conn = self.conn();
        let now = chrono::Utc::now();
        conn.execute(
            "INSERT INTO projects (name, description, owner_id, user_group_id, manager_group_id,
                 project_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                project.name,
                project.description,
                owner,
                project.user_group_id,
                project.manager_group_id,
                project.project_type.code(),
                format_datetime(&now),
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::AlreadyExists(format!("project '{}'", project.name))
            }
            other => other.into(),
        })?;
        let id = ProjectId::new(conn.last_insert_rowid());
        read_one(&conn, "id = ?1", &id)?
            .ok_or_else(|| Error::not_found(format!("project {id}")))
    }

    fn read_project(&self, id: ProjectId) -> Result<Option<Project>> {
        let conn = self.conn();
        read_one(&conn, "id = ?1", &id)
    }

    fn read_project_by_name(&self, name: &str) -> Result<Option<Project>> {
        let conn = self.conn();
        read_one(&conn, "name = ?1", &name)
    }

    fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY id"))?;
        let rows = stmt.query_map([], map_project)?;
        let mut projects = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        for project in &mut projects {
            load_resources(&conn, project)?;
        }
        Ok(projects)
    }

    fn write_project(&self, project: &Project) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE projects SET description = ?2, user_group_id = ?3, manager_group_id = ?4,
                 project_type = ?5, locked = ?6, hidden = ?7
             WHERE id = ?1",
            params![
                project.id,
                project.description,
                project.user_group_id,
                project.manager_group_id,
                project.project_type.code(),
                project.locked,
                project.hidden,
            ],
        )?;
        if rows == 0 {
            return Err(Error::not_found(format!("project {}", project.id)));
        }
        Ok(())
    }

    fn delete_project(&self, id: ProjectId) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn add_project_resource(&self, id: ProjectId, root_path: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO project_resources (project_id, resource_path) VALUES (?1, ?2)",
            params![id, root_path],
        )?;
        Ok(())
    }

    fn remove_project_resource(&self, id: ProjectId, root_path: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM project_resources WHERE project_id = ?1 AND resource_path = ?2",
            params![id, root_path],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::store::Store;

    fn test_store() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::new(dir.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        (store, dir)
    }

    #[test]
    fn test_online_project_exists_after_initialize() {
        let (store, _dir) = test_store();
        store.initialize().unwrap();
        let online = store.read_project(ProjectId::ONLINE).unwrap().unwrap();
        assert!(online.is_online());
        assert_eq!(store.list_projects().unwrap().len(), 1);
    }

    #[test]
    fn test_create_project_with_resources() {
        let (store, _dir) = test_store();
        let owner = PrincipalId::new();
        let project = store
            .create_project(
                &NewProject {
                    name: "Offline".to_string(),
                    project_type: ProjectType::Temporary,
                    ..Default::default()
                },
                &owner,
            )
            .unwrap();
        assert!(!project.is_online());
        assert!(project.is_temporary());
        assert_eq!(project.owner_id, Some(owner));

        store.add_project_resource(project.id, "/sites/").unwrap();
        store.add_project_resource(project.id, "/sites/").unwrap();
        let read = store.read_project_by_name("Offline").unwrap().unwrap();
        assert_eq!(read.resources, vec!["/sites/"]);

        assert!(store.remove_project_resource(project.id, "/sites/").unwrap());
        assert!(store.delete_project(project.id).unwrap());
        assert!(store.read_project(project.id).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_project_name() {
        let (store, _dir) = test_store();
        let err = store
            .create_project(
                &NewProject {
                    name: "Online".to_string(),
                    ..Default::default()
                },
                &PrincipalId::new(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[test]
    fn test_write_project_flags() {
        let (store, _dir) = test_store();
        let mut project = store
            .create_project(
                &NewProject {
                    name: "Draft".to_string(),
                    ..Default::default()
                },
                &PrincipalId::new(),
            )
            .unwrap();
        project.locked = true;
        store.write_project(&project).unwrap();
        assert!(store.read_project(project.id).unwrap().unwrap().locked);
    }
}
