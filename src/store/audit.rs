// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Append-only admin action log.
//!
//! Every admin-mutating action records a before/after snapshot. Snapshots
//! are sanitized before persistence: secret-bearing fields are replaced
//! with `[REDACTED]` wherever they appear in the JSON tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{seq_bytes, Reader, StoreResult, Writer, AUDIT_LOG};

/// Fields scrubbed from audit snapshots.
const REDACTED_FIELDS: [&str; 8] = [
    "passwordHash",
    "password_hash",
    "password",
    "encryptedSecret",
    "encrypted_secret",
    "encryptedPrivateKey",
    "encrypted_private_key",
    "refreshToken",
];

const REDACTED: &str = "[REDACTED]";

/// One audited admin action.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditLogEntry {
    pub id: String,
    pub actor_id: Option<String>,
    pub actor_email: Option<String>,
    /// Verb, e.g. `withdrawal.approve`.
    pub action: String,
    /// Entity kind, e.g. `WithdrawalRequest`.
    pub entity: String,
    pub entity_id: String,
    #[schema(value_type = Option<Object>)]
    pub before: Option<serde_json::Value>,
    #[schema(value_type = Option<Object>)]
    pub after: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Build an entry with sanitized snapshots.
    pub fn new(
        action: impl Into<String>,
        entity: impl Into<String>,
        entity_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            actor_id: None,
            actor_email: None,
            action: action.into(),
            entity: entity.into(),
            entity_id: entity_id.into(),
            before: None,
            after: None,
            ip_address: None,
            user_agent: None,
            created_at,
        }
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>, actor_email: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self.actor_email = Some(actor_email.into());
        self
    }

    pub fn with_before(mut self, before: serde_json::Value) -> Self {
        self.before = Some(redact(before));
        self
    }

    pub fn with_after(mut self, after: serde_json::Value) -> Self {
        self.after = Some(redact(after));
        self
    }

    pub fn with_request_meta(
        mut self,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}

/// Replace secret-bearing fields anywhere in a JSON tree.
pub fn redact(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    if REDACTED_FIELDS.contains(&key.as_str())
                        || key == "accessToken"
                        || key == "access_token"
                        || key == "refresh_token"
                        || key == "refresh_token_hash"
                    {
                        (key, serde_json::Value::String(REDACTED.into()))
                    } else {
                        (key, redact(value))
                    }
                })
                .collect(),
        ),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(redact).collect())
        }
        other => other,
    }
}

/// Repository for the audit log.
pub struct AuditRepo<'a, T> {
    tx: &'a T,
}

impl<'a, T: Reader> AuditRepo<'a, T> {
    pub fn new(tx: &'a T) -> Self {
        Self { tx }
    }

    /// All entries in append order.
    pub fn list(&self) -> StoreResult<Vec<AuditLogEntry>> {
        Ok(self
            .tx
            .scan_rows(AUDIT_LOG, &[])?
            .into_iter()
            .map(|(_, e)| e)
            .collect())
    }
}

impl<'a, T: Writer> AuditRepo<'a, T> {
    /// Append an entry. The sequence counter orders entries globally.
    pub fn append(&self, entry: &AuditLogEntry) -> StoreResult<()> {
        let seq = self.tx.next_counter("audit_seq")?;
        self.tx.put_by(AUDIT_LOG, &seq_bytes(seq), entry)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::temp_store;
    use super::*;
    use serde_json::json;

    #[test]
    fn redaction_scrubs_nested_secrets() {
        let snapshot = json!({
            "email": "a@b.com",
            "password_hash": "argon2...",
            "nested": {
                "encryptedPrivateKey": "aabbcc",
                "amount": "1.5",
            },
            "sessions": [{"refreshToken": "tok"}],
        });

        let clean = redact(snapshot);
        assert_eq!(clean["password_hash"], "[REDACTED]");
        assert_eq!(clean["nested"]["encryptedPrivateKey"], "[REDACTED]");
        assert_eq!(clean["sessions"][0]["refreshToken"], "[REDACTED]");
        // Non-secret fields survive.
        assert_eq!(clean["email"], "a@b.com");
        assert_eq!(clean["nested"]["amount"], "1.5");
    }

    #[test]
    fn append_preserves_order() {
        let (_dir, store) = temp_store();
        store
            .write(|tx| {
                let repo = AuditRepo::new(tx);
                for action in ["first", "second", "third"] {
                    repo.append(&AuditLogEntry::new(action, "Pool", "p1", Utc::now()))?;
                }
                Ok(())
            })
            .unwrap();

        let entries = store.read(|tx| AuditRepo::new(tx).list()).unwrap();
        let actions: Vec<_> = entries.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["first", "second", "third"]);
    }

    #[test]
    fn builder_redacts_snapshots() {
        let entry = AuditLogEntry::new("user.update", "User", "u1", Utc::now())
            .with_actor("admin-1", "admin@example.com")
            .with_before(json!({"password_hash": "old"}))
            .with_after(json!({"password_hash": "new"}));

        assert_eq!(entry.before.unwrap()["password_hash"], "[REDACTED]");
        assert_eq!(entry.after.unwrap()["password_hash"], "[REDACTED]");
    }
}
