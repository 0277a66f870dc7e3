use anyhow::{Context, Result};
use rusqlite::{Row, params, params_from_iter, types::Value};

use super::CrmDb;
use crate::crm::models::{Notification, NotificationFilter, NotificationInput};

const COLUMNS: &str = "id, utilisateur_id, titre, message, type, lu, lien, created_at, updated_at";

fn row_to_notification(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        utilisateur_id: row.get(1)?,
        titre: row.get(2)?,
        message: row.get(3)?,
        type_notification: row.get(4)?,
        lu: row.get(5)?,
        lien: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl CrmDb {
    pub fn create_notification(&self, input: &NotificationInput) -> Result<Notification> {
        self.conn
            .execute(
                "INSERT INTO notifications (utilisateur_id, titre, message, type, lu, lien)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    input.utilisateur_id,
                    input.titre,
                    input.message,
                    input.type_notification,
                    input.lu,
                    input.lien,
                ],
            )
            .context("Failed to insert notification")?;
        let id = self.conn.last_insert_rowid();
        self.get_notification(id)?
            .context("Notification not found after insert")
    }

    /// Newest first, narrowed by recipient and read flag when set.
    pub fn list_notifications(&self, filter: &NotificationFilter) -> Result<Vec<Notification>> {
        let mut conditions = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(user_id) = filter.utilisateur_id {
            values.push(Value::Integer(user_id));
            conditions.push(format!("utilisateur_id = ?{}", values.len()));
        }
        if let Some(lu) = filter.lu {
            values.push(Value::Integer(lu as i64));
            conditions.push(format!("lu = ?{}", values.len()));
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM notifications{} ORDER BY created_at DESC, id DESC",
                COLUMNS, where_clause
            ))
            .context("Failed to prepare list_notifications")?;
        let rows = stmt
            .query_map(params_from_iter(values), row_to_notification)
            .context("Failed to query notifications")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read notification row")
    }

    pub fn get_notification(&self, id: i64) -> Result<Option<Notification>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM notifications WHERE id = ?1", COLUMNS))
            .context("Failed to prepare get_notification")?;
        let mut rows = stmt
            .query_map(params![id], row_to_notification)
            .context("Failed to query notification")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read notification row")?)),
            None => Ok(None),
        }
    }

    pub fn update_notification(
        &self,
        id: i64,
        input: &NotificationInput,
    ) -> Result<Option<Notification>> {
        let count = self
            .conn
            .execute(
                "UPDATE notifications SET utilisateur_id = ?1, titre = ?2, message = ?3, type = ?4,
                     lu = ?5, lien = ?6, updated_at = datetime('now')
                 WHERE id = ?7",
                params![
                    input.utilisateur_id,
                    input.titre,
                    input.message,
                    input.type_notification,
                    input.lu,
                    input.lien,
                    id,
                ],
            )
            .context("Failed to update notification")?;
        if count == 0 {
            return Ok(None);
        }
        self.get_notification(id)
    }

    pub fn mark_notification_read(&self, id: i64) -> Result<Option<Notification>> {
        let count = self
            .conn
            .execute(
                "UPDATE notifications SET lu = 1, updated_at = datetime('now') WHERE id = ?1",
                params![id],
            )
            .context("Failed to mark notification as read")?;
        if count == 0 {
            return Ok(None);
        }
        self.get_notification(id)
    }

    pub fn delete_notification(&self, id: i64) -> Result<bool> {
        self.delete_by_id("notifications", id, "Cette notification est encore référencée")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::db::test_support::create_user;
    use crate::crm::models::{RoleType, TypeNotification};

    fn notification_input(utilisateur_id: i64, message: &str) -> NotificationInput {
        NotificationInput {
            utilisateur_id,
            titre: Some("Opportunité".into()),
            message: message.into(),
            type_notification: TypeNotification::Warning,
            lu: false,
            lien: None,
        }
    }

    #[test]
    fn test_filter_by_user_and_read_flag() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let claire = create_user(&db, "claire@afpi.fr", RoleType::Commercial)?;
        let paul = create_user(&db, "paul@afpi.fr", RoleType::Commercial)?;

        let first = db.create_notification(&notification_input(claire.id, "Devis accepté"))?;
        db.create_notification(&notification_input(claire.id, "Relance client"))?;
        db.create_notification(&notification_input(paul.id, "Nouveau dossier"))?;

        let read = db.mark_notification_read(first.id)?.expect("notification");
        assert!(read.lu);
        assert_eq!(read.type_notification, TypeNotification::Warning);

        let for_claire = NotificationFilter {
            utilisateur_id: Some(claire.id),
            lu: None,
        };
        assert_eq!(db.list_notifications(&for_claire)?.len(), 2);
        let unread = NotificationFilter {
            utilisateur_id: Some(claire.id),
            lu: Some(false),
        };
        let unread = db.list_notifications(&unread)?;
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].message, "Relance client");
        assert_eq!(db.list_notifications(&NotificationFilter::default())?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_notifications_removed_with_user() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let user = create_user(&db, "claire@afpi.fr", RoleType::Commercial)?;
        let created = db.create_notification(&notification_input(user.id, "Bienvenue"))?;
        db.delete_user(user.id)?;
        assert!(db.get_notification(created.id)?.is_none());
        assert!(db.mark_notification_read(created.id)?.is_none());
        Ok(())
    }
}
