use anyhow::{Context, Result};
use rusqlite::{Row, params};

use super::CrmDb;
use crate::crm::models::{Permission, PermissionAction, PermissionResource, Role, RoleInput, RoleType, permission_name};

const PERMISSION_COLUMNS: &str = "id, name, action, resource, description, created_at";
const ROLE_COLUMNS: &str = "id, name, type, description, level, actif, created_at, updated_at";

fn row_to_permission(row: &Row<'_>) -> rusqlite::Result<Permission> {
    Ok(Permission {
        id: row.get(0)?,
        name: row.get(1)?,
        action: row.get(2)?,
        resource: row.get(3)?,
        description: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Role row without its permissions; filled in by `with_permissions`.
fn row_to_role(row: &Row<'_>) -> rusqlite::Result<Role> {
    Ok(Role {
        id: row.get(0)?,
        name: row.get(1)?,
        role_type: row.get(2)?,
        description: row.get(3)?,
        level: row.get(4)?,
        actif: row.get(5)?,
        permissions: Vec::new(),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl CrmDb {
    // ── Permissions ───────────────────────────────────────────────────

    /// Insert the permission unless one with the same name exists.
    /// Returns the permission and whether it was created.
    pub fn ensure_permission(
        &self,
        action: PermissionAction,
        resource: PermissionResource,
    ) -> Result<(Permission, bool)> {
        let name = permission_name(action, resource);
        if let Some(existing) = self.get_permission_by_name(&name)? {
            return Ok((existing, false));
        }
        self.conn
            .execute(
                "INSERT INTO permissions (name, action, resource, description) VALUES (?1, ?2, ?3, ?4)",
                params![
                    name,
                    action,
                    resource,
                    format!("Permission to {} {}", action, resource)
                ],
            )
            .context("Failed to insert permission")?;
        let permission = self
            .get_permission_by_name(&name)?
            .context("Permission not found after insert")?;
        Ok((permission, true))
    }

    pub fn list_permissions(&self) -> Result<Vec<Permission>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM permissions ORDER BY id", PERMISSION_COLUMNS))
            .context("Failed to prepare list_permissions")?;
        let rows = stmt
            .query_map([], row_to_permission)
            .context("Failed to query permissions")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read permission row")
    }

    pub fn get_permission_by_name(&self, name: &str) -> Result<Option<Permission>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM permissions WHERE name = ?1", PERMISSION_COLUMNS))
            .context("Failed to prepare get_permission_by_name")?;
        let mut rows = stmt
            .query_map(params![name], row_to_permission)
            .context("Failed to query permission")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read permission row")?)),
            None => Ok(None),
        }
    }

    fn role_permissions(&self, role_id: i64) -> Result<Vec<Permission>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT p.id, p.name, p.action, p.resource, p.description, p.created_at
                 FROM permissions p
                 JOIN role_permissions rp ON rp.permission_id = p.id
                 WHERE rp.role_id = ?1
                 ORDER BY p.id",
            )
            .context("Failed to prepare role_permissions")?;
        let rows = stmt
            .query_map(params![role_id], row_to_permission)
            .context("Failed to query role permissions")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read permission row")
    }

    /// Permission names granted to a user through their role.
    pub fn user_permission_names(&self, user_id: i64) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT p.name FROM permissions p
                 JOIN role_permissions rp ON rp.permission_id = p.id
                 JOIN roles r ON r.id = rp.role_id
                 JOIN users u ON u.role_id = r.id
                 WHERE u.id = ?1 AND r.actif = 1
                 ORDER BY p.id",
            )
            .context("Failed to prepare user_permission_names")?;
        let rows = stmt
            .query_map(params![user_id], |row| row.get(0))
            .context("Failed to query user permissions")?;
        rows.collect::<rusqlite::Result<Vec<String>>>()
            .context("Failed to read permission name")
    }

    // ── Role CRUD ─────────────────────────────────────────────────────

    fn with_permissions(&self, mut role: Role) -> Result<Role> {
        role.permissions = self.role_permissions(role.id)?;
        Ok(role)
    }

    fn replace_role_permissions(&self, role_id: i64, permission_ids: &[i64]) -> Result<()> {
        self.conn
            .execute("DELETE FROM role_permissions WHERE role_id = ?1", params![role_id])
            .context("Failed to clear role permissions")?;
        for permission_id in permission_ids {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO role_permissions (role_id, permission_id) VALUES (?1, ?2)",
                    params![role_id, permission_id],
                )
                .context("Failed to grant permission to role")?;
        }
        Ok(())
    }

    pub fn create_role(&self, input: &RoleInput) -> Result<Role> {
        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO roles (name, type, description, level, actif) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![input.name, input.role_type, input.description, input.level, input.actif],
        )
        .context("Failed to insert role")?;
        let id = tx.last_insert_rowid();
        self.replace_role_permissions(id, &input.permission_ids)?;
        tx.commit().context("Failed to commit role insert")?;
        self.get_role(id)?.context("Role not found after insert")
    }

    pub fn list_roles(&self) -> Result<Vec<Role>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM roles ORDER BY level, id", ROLE_COLUMNS))
            .context("Failed to prepare list_roles")?;
        let roles = stmt
            .query_map([], row_to_role)
            .context("Failed to query roles")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read role row")?;
        roles.into_iter().map(|r| self.with_permissions(r)).collect()
    }

    pub fn get_role(&self, id: i64) -> Result<Option<Role>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM roles WHERE id = ?1", ROLE_COLUMNS))
            .context("Failed to prepare get_role")?;
        let mut rows = stmt
            .query_map(params![id], row_to_role)
            .context("Failed to query role")?;
        match rows.next() {
            Some(row) => Ok(Some(self.with_permissions(row.context("Failed to read role row")?)?)),
            None => Ok(None),
        }
    }

    pub fn get_role_by_type(&self, role_type: RoleType) -> Result<Option<Role>> {
        let id: Option<i64> = {
            let mut stmt = self
                .conn
                .prepare("SELECT id FROM roles WHERE type = ?1")
                .context("Failed to prepare get_role_by_type")?;
            let mut rows = stmt
                .query_map(params![role_type], |row| row.get(0))
                .context("Failed to query role")?;
            rows.next().transpose().context("Failed to read role id")?
        };
        match id {
            Some(id) => self.get_role(id),
            None => Ok(None),
        }
    }

    pub fn update_role(&self, id: i64, input: &RoleInput) -> Result<Option<Role>> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let count = tx
            .execute(
                "UPDATE roles SET name = ?1, type = ?2, description = ?3, level = ?4, actif = ?5,
                     updated_at = datetime('now')
                 WHERE id = ?6",
                params![input.name, input.role_type, input.description, input.level, input.actif, id],
            )
            .context("Failed to update role")?;
        if count == 0 {
            return Ok(None);
        }
        self.replace_role_permissions(id, &input.permission_ids)?;
        tx.commit().context("Failed to commit role update")?;
        self.get_role(id)
    }

    /// Refused while users still hold the role.
    pub fn delete_role(&self, id: i64) -> Result<bool> {
        self.delete_by_id(
            "roles",
            id,
            "Impossible de supprimer ce rôle : des utilisateurs y sont rattachés",
        )
    }
}
