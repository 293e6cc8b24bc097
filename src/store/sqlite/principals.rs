use rusqlite::{OptionalExtension, Row, params};

use super::{SqliteStore, format_datetime, format_optional_datetime, parse_datetime, parse_optional_datetime};
use crate::error::{Error, Result};
use crate::store::PrincipalStore;
use crate::types::*;

const USER_COLUMNS: &str = "id, name, description, password_hash, enabled, created_at";
const GROUP_COLUMNS: &str = "id, name, description, parent_id, created_at";
const TOKEN_COLUMNS: &str =
    "id, token_hash, token_lookup, user_id, created_at, expires_at, last_used_at";

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        password_hash: row.get(3)?,
        enabled: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn map_group(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        parent_id: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn map_token(row: &Row<'_>) -> rusqlite::Result<Token> {
    Ok(Token {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        user_id: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        expires_at: parse_optional_datetime(row.get(5)?),
        last_used_at: parse_optional_datetime(row.get(6)?),
    })
}

fn map_ace(row: &Row<'_>) -> rusqlite::Result<AccessControlEntry> {
    Ok(AccessControlEntry {
        resource_id: row.get(0)?,
        principal_id: row.get(1)?,
        allowed: PermissionSet::from(row.get::<_, i64>(2)?),
        denied: PermissionSet::from(row.get::<_, i64>(3)?),
        flags: AceFlags::from(row.get::<_, i64>(4)?),
    })
}

fn unique_violation(e: rusqlite::Error, what: String) -> Error {
    match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::AlreadyExists(what)
        }
        other => other.into(),
    }
}

impl PrincipalStore for SqliteStore {
    fn create_user(&self, user: &User) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO users (id, name, description, password_hash, enabled, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user.id,
                    user.name,
                    user.description,
                    user.password_hash,
                    user.enabled,
                    format_datetime(&user.created_at),
                ],
            )
            .map_err(|e| unique_violation(e, format!("user '{}'", user.name)))?;
        Ok(())
    }

    fn read_user(&self, id: &PrincipalId) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            map_user,
        )
        .optional()
        .map_err(Error::from)
    }

    fn read_user_by_name(&self, name: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE name = ?1"),
            params![name],
            map_user,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY name"))?;
        let rows = stmt.query_map([], map_user)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_user(&self, user: &User) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE users SET description = ?2, password_hash = ?3, enabled = ?4 WHERE id = ?1",
            params![user.id, user.description, user.password_hash, user.enabled],
        )?;
        if rows == 0 {
            return Err(Error::not_found(format!("user '{}'", user.name)));
        }
        Ok(())
    }

    fn create_group(&self, group: &Group) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO groups (id, name, description, parent_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    group.id,
                    group.name,
                    group.description,
                    group.parent_id,
                    format_datetime(&group.created_at),
                ],
            )
            .map_err(|e| unique_violation(e, format!("group '{}'", group.name)))?;
        Ok(())
    }

    fn read_group(&self, id: &PrincipalId) -> Result<Option<Group>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {GROUP_COLUMNS} FROM groups WHERE id = ?1"),
            params![id],
            map_group,
        )
        .optional()
        .map_err(Error::from)
    }

    fn read_group_by_name(&self, name: &str) -> Result<Option<Group>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {GROUP_COLUMNS} FROM groups WHERE name = ?1"),
            params![name],
            map_group,
        )
        .optional()
        .map_err(Error::from)
    }

    fn add_user_to_group(&self, user: &PrincipalId, group: &PrincipalId) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?1, ?2)",
            params![group, user],
        )?;
        Ok(())
    }

    fn remove_user_from_group(&self, user: &PrincipalId, group: &PrincipalId) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
            params![group, user],
        )?;
        Ok(rows > 0)
    }

    fn read_groups_of_user(&self, user: &PrincipalId) -> Result<Vec<Group>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT g.id, g.name, g.description, g.parent_id, g.created_at
             FROM groups g
             JOIN group_members m ON m.group_id = g.id
             WHERE m.user_id = ?1
             ORDER BY g.name",
        )?;
        let rows = stmt.query_map(params![user], map_group)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn read_users_of_group(&self, group: &PrincipalId) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT u.id, u.name, u.description, u.password_hash, u.enabled, u.created_at
             FROM users u
             JOIN group_members m ON m.user_id = u.id
             WHERE m.group_id = ?1
             ORDER BY u.name",
        )?;
        let rows = stmt.query_map(params![group], map_user)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn read_aces(&self, ws: Workspace, resource_id: &ResourceId) -> Result<Vec<AccessControlEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT resource_id, principal_id, allowed, denied, flags
             FROM access_control_entries
             WHERE workspace = ?1 AND resource_id = ?2
             ORDER BY principal_id",
        )?;
        let rows = stmt.query_map(params![ws, resource_id], map_ace)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn write_ace(&self, ws: Workspace, ace: &AccessControlEntry) -> Result<()> {
        self.conn().execute(
            "INSERT INTO access_control_entries (workspace, resource_id, principal_id, allowed, denied, flags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(workspace, resource_id, principal_id) DO UPDATE SET
                 allowed = excluded.allowed, denied = excluded.denied, flags = excluded.flags",
            params![
                ws,
                ace.resource_id,
                ace.principal_id,
                i64::from(ace.allowed),
                i64::from(ace.denied),
                i64::from(ace.flags),
            ],
        )?;
        Ok(())
    }

    fn remove_ace(
        &self,
        ws: Workspace,
        resource_id: &ResourceId,
        principal: &PrincipalId,
    ) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM access_control_entries
             WHERE workspace = ?1 AND resource_id = ?2 AND principal_id = ?3",
            params![ws, resource_id, principal],
        )?;
        Ok(rows > 0)
    }

    fn remove_aces(&self, ws: Workspace, resource_id: &ResourceId) -> Result<()> {
        self.conn().execute(
            "DELETE FROM access_control_entries WHERE workspace = ?1 AND resource_id = ?2",
            params![ws, resource_id],
        )?;
        Ok(())
    }

    fn set_aces_deleted(&self, ws: Workspace, resource_id: &ResourceId, deleted: bool) -> Result<()> {
        let flag = i64::from(AceFlags::DELETED);
        let sql = if deleted {
            "UPDATE access_control_entries SET flags = flags | ?3
             WHERE workspace = ?1 AND resource_id = ?2"
        } else {
            "UPDATE access_control_entries SET flags = flags & ~?3
             WHERE workspace = ?1 AND resource_id = ?2"
        };
        self.conn().execute(sql, params![ws, resource_id, flag])?;
        Ok(())
    }

    fn create_token(&self, token: &Token) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO tokens (id, token_hash, token_lookup, user_id, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    token.id,
                    token.token_hash,
                    token.token_lookup,
                    token.user_id,
                    format_datetime(&token.created_at),
                    format_optional_datetime(token.expires_at.as_ref()),
                ],
            )
            .map_err(|e| match unique_violation(e, String::new()) {
                Error::AlreadyExists(_) => Error::TokenLookupCollision,
                other => other,
            })?;
        Ok(())
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE token_lookup = ?1"),
            params![lookup],
            map_token,
        )
        .optional()
        .map_err(Error::from)
    }

    fn update_token_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&chrono::Utc::now()), id],
        )?;
        Ok(())
    }
}
