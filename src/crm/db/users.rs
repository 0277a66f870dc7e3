use anyhow::{Context, Result};
use rusqlite::{Row, params};

use super::{CrmDb, json_column, to_json};
use crate::crm::models::{User, UserInput};

const SELECT_USER: &str = "SELECT u.id, u.email, u.password_hash, u.first_name, u.last_name, u.phone, u.avatar,
            u.actif, u.role_id, r.name, r.type, u.localisation_id, u.managed_localisations,
            u.last_login_at, u.created_at, u.updated_at
     FROM users u
     LEFT JOIN roles r ON r.id = u.role_id";

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let first_name: String = row.get(3)?;
    let last_name: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        full_name: format!("{} {}", first_name, last_name),
        first_name,
        last_name,
        phone: row.get(5)?,
        avatar: row.get(6)?,
        actif: row.get(7)?,
        role_id: row.get(8)?,
        role_name: row.get(9)?,
        role_type: row.get(10)?,
        localisation_id: row.get(11)?,
        managed_localisations: json_column(row, 12)?,
        last_login_at: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

impl CrmDb {
    // ── User CRUD ─────────────────────────────────────────────────────

    /// `password_hash` must already be an Argon2 PHC string.
    pub fn create_user(&self, input: &UserInput, password_hash: &str) -> Result<User> {
        self.conn
            .execute(
                "INSERT INTO users (email, password_hash, first_name, last_name, phone, avatar, actif,
                                    role_id, localisation_id, managed_localisations)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    input.email.to_lowercase(),
                    password_hash,
                    input.first_name,
                    input.last_name,
                    input.phone,
                    input.avatar,
                    input.actif,
                    input.role_id,
                    input.localisation_id,
                    to_json(&input.managed_localisations)?,
                ],
            )
            .context("Failed to insert user")?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?.context("User not found after insert")
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} ORDER BY u.last_name, u.first_name", SELECT_USER))
            .context("Failed to prepare list_users")?;
        let rows = stmt.query_map([], row_to_user).context("Failed to query users")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read user row")
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.find_user("u.id = ?1", params![id])
    }

    /// Emails are stored lowercase, so lookups ignore case.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_user("u.email = ?1", params![email.to_lowercase()])
    }

    fn find_user(&self, condition: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Option<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} WHERE {}", SELECT_USER, condition))
            .context("Failed to prepare user lookup")?;
        let mut rows = stmt.query_map(args, row_to_user).context("Failed to query user")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read user row")?)),
            None => Ok(None),
        }
    }

    /// Rewrite the profile; the stored hash is replaced only when a new one
    /// is given.
    pub fn update_user(
        &self,
        id: i64,
        input: &UserInput,
        password_hash: Option<&str>,
    ) -> Result<Option<User>> {
        let count = self
            .conn
            .execute(
                "UPDATE users SET email = ?1, password_hash = COALESCE(?2, password_hash), first_name = ?3, last_name = ?4,
                     phone = ?5, avatar = ?6, actif = ?7, role_id = ?8, localisation_id = ?9,
                     managed_localisations = ?10, updated_at = datetime('now')
                 WHERE id = ?11",
                params![
                    input.email.to_lowercase(),
                    password_hash,
                    input.first_name,
                    input.last_name,
                    input.phone,
                    input.avatar,
                    input.actif,
                    input.role_id,
                    input.localisation_id,
                    to_json(&input.managed_localisations)?,
                    id,
                ],
            )
            .context("Failed to update user")?;
        if count == 0 {
            return Ok(None);
        }
        self.get_user(id)
    }

    pub fn touch_last_login(&self, id: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE users SET last_login_at = datetime('now') WHERE id = ?1",
                params![id],
            )
            .context("Failed to record login")?;
        Ok(())
    }

    pub fn delete_user(&self, id: i64) -> Result<bool> {
        self.delete_by_id("users", id, "Cet utilisateur est encore référencé")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::auth::{hash_password, verify_password};
    use crate::crm::db::test_support::{create_user, role_input, test_password_hash, user_input};
    use crate::crm::db::{ConstraintKind, constraint_kind};
    use crate::crm::models::RoleType;

    #[test]
    fn test_create_user_hashes_password() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let user = create_user(&db, "Claire.Petit@AFPI.fr", RoleType::Commercial)?;
        assert_eq!(user.email, "claire.petit@afpi.fr");
        assert_eq!(user.full_name, "Claire Petit");
        assert_eq!(user.role_type, Some(RoleType::Commercial));
        assert_eq!(user.role_name.as_deref(), Some("Commercial"));
        assert!(user.password_hash.starts_with("$argon2id$"));
        assert!(verify_password("Password123!", &user.password_hash)?);
        Ok(())
    }

    #[test]
    fn test_update_keeps_existing_hash() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let user = create_user(&db, "c@afpi.fr", RoleType::Commercial)?;
        let mut input = user.to_input();
        input.phone = Some("0323000000".into());
        let updated = db.update_user(user.id, &input, None)?.expect("user");
        assert_eq!(updated.password_hash, user.password_hash);
        assert_eq!(updated.phone.as_deref(), Some("0323000000"));

        let new_hash = hash_password("NewPassword1")?;
        let updated = db.update_user(user.id, &input, Some(&new_hash))?.expect("user");
        assert!(verify_password("NewPassword1", &updated.password_hash)?);
        assert_eq!(updated.phone.as_deref(), Some("0323000000"));
        Ok(())
    }

    #[test]
    fn test_lookup_by_email_ignores_case() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let user = create_user(&db, "c@afpi.fr", RoleType::Commercial)?;
        assert_eq!(db.get_user_by_email("C@AFPI.FR")?.map(|u| u.id), Some(user.id));
        assert!(db.get_user_by_email("x@afpi.fr")?.is_none());
        Ok(())
    }

    #[test]
    fn test_duplicate_email_and_unknown_role() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let user = create_user(&db, "c@afpi.fr", RoleType::Commercial)?;
        let err = db
            .create_user(&user_input("c@afpi.fr", user.role_id), &test_password_hash())
            .unwrap_err();
        assert_eq!(constraint_kind(&err), Some(ConstraintKind::Unique));

        let err = db
            .create_user(&user_input("d@afpi.fr", 999), &test_password_hash())
            .unwrap_err();
        assert_eq!(constraint_kind(&err), Some(ConstraintKind::ForeignKey));
        Ok(())
    }

    #[test]
    fn test_touch_last_login_and_delete() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let role = db.create_role(&role_input(RoleType::Assistante))?;
        let user = db.create_user(&user_input("a@afpi.fr", role.id), &test_password_hash())?;
        assert!(user.last_login_at.is_none());
        db.touch_last_login(user.id)?;
        assert!(db.get_user(user.id)?.expect("user").last_login_at.is_some());

        assert!(db.delete_user(user.id)?);
        assert!(db.list_users()?.is_empty());
        Ok(())
    }
}
