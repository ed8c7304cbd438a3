// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User notifications.
//!
//! Writes are best-effort from the financial paths: a failed notification
//! never rolls back a committed ledger transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{composite_prefix, inverted_ts, Reader, StoreResult, Writer, NOTIFICATIONS};

/// An in-app notification.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    /// Kind tag, e.g. `deposit_confirmed`.
    pub kind: String,
    pub title: String,
    pub message: String,
    /// Structured payload for clients.
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: impl Into<String>,
        kind: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        data: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            kind: kind.into(),
            title: title.into(),
            message: message.into(),
            data,
            is_read: false,
            created_at,
        }
    }

    fn key(&self) -> Vec<u8> {
        let mut key = composite_prefix(&[&self.user_id]);
        key.extend_from_slice(&inverted_ts(self.created_at.timestamp()));
        key.push(b'|');
        key.extend_from_slice(self.id.as_bytes());
        key
    }
}

/// Repository for notifications.
pub struct NotificationRepo<'a, T> {
    tx: &'a T,
}

impl<'a, T: Reader> NotificationRepo<'a, T> {
    pub fn new(tx: &'a T) -> Self {
        Self { tx }
    }

    /// A user's notifications, newest first.
    pub fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Notification>> {
        Ok(self
            .tx
            .scan_rows(NOTIFICATIONS, &composite_prefix(&[user_id]))?
            .into_iter()
            .map(|(_, n)| n)
            .collect())
    }
}

impl<'a, T: Writer> NotificationRepo<'a, T> {
    pub fn insert(&self, notification: &Notification) -> StoreResult<()> {
        self.tx
            .put_by(NOTIFICATIONS, &notification.key(), notification)
    }

    /// Mark one of the user's notifications read. Returns whether it existed.
    pub fn mark_read(&self, user_id: &str, notification_id: &str) -> StoreResult<bool> {
        let rows: Vec<(Vec<u8>, Notification)> = self
            .tx
            .scan_rows(NOTIFICATIONS, &composite_prefix(&[user_id]))?;
        for (key, mut notification) in rows {
            if notification.id == notification_id {
                notification.is_read = true;
                self.tx.put_by(NOTIFICATIONS, &key, &notification)?;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::temp_store;
    use super::*;
    use serde_json::json;

    #[test]
    fn newest_first_ordering() {
        let (_dir, store) = temp_store();
        let t0 = Utc::now();
        store
            .write(|tx| {
                let repo = NotificationRepo::new(tx);
                repo.insert(&Notification::new(
                    "u1", "a", "older", "", json!({}), t0 - chrono::Duration::hours(1),
                ))?;
                repo.insert(&Notification::new("u1", "b", "newer", "", json!({}), t0))
            })
            .unwrap();

        let list = store.read(|tx| NotificationRepo::new(tx).list_for_user("u1")).unwrap();
        assert_eq!(list[0].title, "newer");
        assert_eq!(list[1].title, "older");
    }

    #[test]
    fn mark_read_is_scoped_to_owner() {
        let (_dir, store) = temp_store();
        let notification = Notification::new("u1", "k", "t", "m", json!({}), Utc::now());
        store
            .write(|tx| NotificationRepo::new(tx).insert(&notification))
            .unwrap();

        // Another user cannot mark it.
        let touched = store
            .write(|tx| NotificationRepo::new(tx).mark_read("u2", &notification.id))
            .unwrap();
        assert!(!touched);

        let touched = store
            .write(|tx| NotificationRepo::new(tx).mark_read("u1", &notification.id))
            .unwrap();
        assert!(touched);

        let list = store.read(|tx| NotificationRepo::new(tx).list_for_user("u1")).unwrap();
        assert!(list[0].is_read);
    }
}
