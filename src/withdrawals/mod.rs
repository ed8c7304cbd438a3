// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Withdrawal Workflow
//!
//! Request intake with idempotency and fraud scoring, plus the admin
//! review operations. Submission always reserves the full amount from the
//! available balance and always lands in PENDING_REVIEW; no payout ever
//! executes without an explicit admin approval.

use bigdecimal::BigDecimal;
use chrono::Duration;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::ledger::{post, Posting};
use crate::money::quantize;
use crate::state::AppState;
use crate::store::{
    AssetRepo, AuditLogEntry, AuditRepo, ChainRepo, Notification, NotificationRepo, StoreError,
    UserRepo, WhitelistEntry, WhitelistRepo, WithdrawalRepo, WithdrawalRequest, WithdrawalStatus,
    Writer,
};

pub mod fraud;

/// Hours a first-seen destination stays in its whitelist cooldown.
const WHITELIST_COOLDOWN_HOURS: i64 = 24;

/// Validated submission input.
#[derive(Debug, Clone)]
pub struct SubmitParams {
    pub asset_id: String,
    pub chain_id: String,
    pub amount: BigDecimal,
    /// Lowercased, format-validated.
    pub destination_address: String,
    pub user_notes: Option<String>,
    pub idempotency_key: String,
}

/// Submit a withdrawal request. Idempotent on the client key: a repeat
/// submission returns the original request unchanged.
pub fn submit(
    state: &AppState,
    user_id: &str,
    params: SubmitParams,
) -> Result<WithdrawalRequest, ApiError> {
    // Fast path outside the writer.
    let existing = state
        .store
        .read(|tx| WithdrawalRepo::new(tx).by_idempotency_key(&params.idempotency_key))?;
    if let Some(request) = existing {
        return finish_idempotent(request, user_id);
    }

    let now = state.clock.now();

    state.store.write(|tx| {
        let repo = WithdrawalRepo::new(tx);
        if let Some(request) = repo.by_idempotency_key(&params.idempotency_key)? {
            return finish_idempotent(request, user_id);
        }

        let user = UserRepo::new(tx).require(user_id)?;
        let asset = AssetRepo::new(tx).require(&params.asset_id)?;
        if !asset.is_active {
            return Err(ApiError::domain("ASSET_INACTIVE", "Asset is not withdrawable"));
        }
        if asset.chain_id != params.chain_id {
            return Err(ApiError::bad_request("Asset does not live on the given chain"));
        }
        ChainRepo::new(tx).require(&params.chain_id)?;

        let amount = quantize(&params.amount);
        let fee_from_rate = quantize(&(&amount * &state.security.withdrawal_fee_rate));
        let fee = fee_from_rate.max(state.security.withdrawal_min_fee.clone());
        let net_amount = quantize(&(&amount - &fee));
        if net_amount <= BigDecimal::from(0u32) {
            return Err(ApiError::domain(
                "AMOUNT_TOO_SMALL",
                format!("Amount does not cover the {fee} fee"),
            ));
        }

        // Risk context, all read under the same transaction.
        let whitelist_repo = WhitelistRepo::new(tx);
        let whitelist_entry =
            whitelist_repo.get(user_id, &params.chain_id, &params.destination_address)?;

        let window_start = now - Duration::hours(24);
        let mut requests_last_24h = 0u32;
        let amount_usd = quantize(&(&amount * &asset.price_usd));
        let mut daily_total_usd = amount_usd.clone();
        for prior in repo.list_for_user(user_id)? {
            if prior.created_at < window_start {
                continue;
            }
            requests_last_24h += 1;
            if prior.status != WithdrawalStatus::Rejected {
                let prior_asset = AssetRepo::new(tx).require(&prior.asset_id)?;
                daily_total_usd =
                    quantize(&(&daily_total_usd + quantize(&(&prior.amount * &prior_asset.price_usd))));
            }
        }

        let ctx = fraud::FraudContext {
            user: &user,
            whitelist_entry: whitelist_entry.as_ref(),
            amount_usd,
            daily_total_usd,
            requests_last_24h,
            now,
        };
        let (fraud_indicators, fraud_score) = fraud::score(&ctx, &state.security);

        let request = WithdrawalRequest {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            asset_id: params.asset_id.clone(),
            chain_id: params.chain_id.clone(),
            amount: amount.clone(),
            fee,
            net_amount,
            destination_address: params.destination_address.clone(),
            status: WithdrawalStatus::PendingReview,
            user_notes: params.user_notes.clone(),
            admin_notes: None,
            reviewed_by: None,
            reviewed_at: None,
            manual_proof_url: None,
            idempotency_key: params.idempotency_key.clone(),
            fraud_score,
            fraud_indicators,
            created_at: now,
        };

        match repo.insert(&request) {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                // Raced another submit with the same key; theirs wins.
                let winner = repo
                    .by_idempotency_key(&params.idempotency_key)?
                    .ok_or_else(|| ApiError::internal("idempotency index out of sync"))?;
                return finish_idempotent(winner, user_id);
            }
            Err(e) => return Err(e.into()),
        }

        // Reserve the full amount; fails when available is short.
        post(
            tx,
            Posting::withdrawal_requested(
                user_id,
                &params.asset_id,
                &params.chain_id,
                amount,
                &request.id,
            ),
            now,
        )?;

        // First use of a destination starts its cooldown; later uses never
        // refresh it.
        whitelist_repo.add_if_absent(&WhitelistEntry {
            user_id: user_id.to_string(),
            chain_id: params.chain_id.clone(),
            address: params.destination_address.clone(),
            label: None,
            cooldown_ends_at: now + Duration::hours(WHITELIST_COOLDOWN_HOURS),
            created_at: now,
        })?;

        Ok(request)
    })
}

fn finish_idempotent(
    request: WithdrawalRequest,
    user_id: &str,
) -> Result<WithdrawalRequest, ApiError> {
    if request.user_id != user_id {
        // The key belongs to someone else's request; treat as a collision.
        return Err(ApiError::conflict("Idempotency key is already in use"));
    }
    Ok(request)
}

fn audit_transition(
    tx: &impl Writer,
    admin: &AuthUser,
    action: &str,
    before: &WithdrawalRequest,
    after: &WithdrawalRequest,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(), StoreError> {
    AuditRepo::new(tx).append(
        &AuditLogEntry::new(action, "WithdrawalRequest", &before.id, now)
            .with_actor(&admin.user_id, &admin.email)
            .with_before(serde_json::to_value(before)?)
            .with_after(serde_json::to_value(after)?),
    )
}

/// Approve a pending request and queue its payout job.
pub fn approve(
    state: &AppState,
    admin: &AuthUser,
    request_id: &str,
    admin_notes: Option<String>,
) -> Result<WithdrawalRequest, ApiError> {
    let now = state.clock.now();

    let approved = state.store.write(|tx| {
        let repo = WithdrawalRepo::new(tx);
        let before = repo.require(request_id)?;
        let after = repo.transition(
            request_id,
            WithdrawalStatus::PendingReview,
            WithdrawalStatus::Approved,
            |request| {
                request.reviewed_by = Some(admin.user_id.clone());
                request.reviewed_at = Some(now);
                request.admin_notes = admin_notes.clone();
            },
        )?;
        audit_transition(tx, admin, "withdrawal.approve", &before, &after, now)?;
        Ok::<_, ApiError>(after)
    })?;

    // Queued only after the approval committed.
    crate::payout::enqueue_payout(state, &approved.id);
    Ok(approved)
}

/// Reject a pending request and release its reserve.
pub fn reject(
    state: &AppState,
    admin: &AuthUser,
    request_id: &str,
    admin_notes: String,
) -> Result<WithdrawalRequest, ApiError> {
    let now = state.clock.now();

    state.store.write(|tx| {
        let repo = WithdrawalRepo::new(tx);
        let before = repo.require(request_id)?;
        let after = repo.transition(
            request_id,
            WithdrawalStatus::PendingReview,
            WithdrawalStatus::Rejected,
            |request| {
                request.reviewed_by = Some(admin.user_id.clone());
                request.reviewed_at = Some(now);
                request.admin_notes = Some(admin_notes.clone());
            },
        )?;

        post(
            tx,
            Posting::withdrawal_rejected(
                &after.user_id,
                &after.asset_id,
                &after.chain_id,
                after.amount.clone(),
                &after.id,
            ),
            now,
        )?;

        audit_transition(tx, admin, "withdrawal.reject", &before, &after, now)?;
        NotificationRepo::new(tx).insert(&Notification::new(
            &after.user_id,
            "withdrawal_rejected",
            "Withdrawal rejected",
            format!("Your withdrawal of {} was rejected", after.amount),
            serde_json::json!({ "withdrawalId": after.id }),
            now,
        ))?;
        Ok(after)
    })
}

/// Settle a request outside the payout executor (bank transfer, manual
/// on-chain send). Allowed from PENDING_REVIEW, APPROVED, or FAILED.
pub fn mark_paid(
    state: &AppState,
    admin: &AuthUser,
    request_id: &str,
    admin_notes: String,
    proof_url: Option<String>,
) -> Result<WithdrawalRequest, ApiError> {
    let now = state.clock.now();

    state.store.write(|tx| {
        let repo = WithdrawalRepo::new(tx);
        let before = repo.require(request_id)?;
        if !matches!(
            before.status,
            WithdrawalStatus::PendingReview | WithdrawalStatus::Approved | WithdrawalStatus::Failed
        ) {
            return Err(ApiError::forbidden(format!(
                "Cannot mark a {} request as paid manually",
                before.status.as_str()
            )));
        }

        let after = repo.transition(
            request_id,
            before.status,
            WithdrawalStatus::PaidManually,
            |request| {
                request.reviewed_by = Some(admin.user_id.clone());
                request.reviewed_at = Some(now);
                request.admin_notes = Some(admin_notes.clone());
                request.manual_proof_url = proof_url.clone();
            },
        )?;

        post(
            tx,
            Posting::withdrawal_paid(
                &after.user_id,
                &after.asset_id,
                &after.chain_id,
                after.amount.clone(),
                &after.id,
            ),
            now,
        )?;

        audit_transition(tx, admin, "withdrawal.mark_paid", &before, &after, now)?;
        NotificationRepo::new(tx).insert(&Notification::new(
            &after.user_id,
            "withdrawal_paid",
            "Withdrawal paid",
            format!("Your withdrawal of {} has been paid", after.net_amount),
            serde_json::json!({ "withdrawalId": after.id, "proofUrl": after.manual_proof_url }),
            now,
        ))?;
        Ok(after)
    })
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::ledger::{post as ledger_post, Posting as LedgerPosting};
    use crate::store::catalog::fixtures as catalog_fixtures;
    use crate::store::ChainRepo;

    pub const DEST: &str = "0x1111111111111111111111111111111111111111";

    pub struct WithdrawalFixture {
        pub asset_id: String,
        pub chain_id: String,
    }

    /// Chain + asset + `available` balance for `user_id`.
    pub fn seed_funds(
        state: &AppState,
        user_id: &str,
        available: &str,
    ) -> WithdrawalFixture {
        // Unique slug so repeated seeding never trips the slug index.
        let slug = format!("sepolia-{}", &uuid::Uuid::new_v4().to_string()[..8]);
        let chain = catalog_fixtures::chain(&slug);
        let asset = catalog_fixtures::token(&chain.id, "USDT");
        let fixture = WithdrawalFixture {
            asset_id: asset.id.clone(),
            chain_id: chain.id.clone(),
        };
        let now = state.clock.now();
        let user = crate::store::User::new(
            format!("{user_id}@example.com"),
            "$argon2id$stub".into(),
            now - chrono::Duration::days(30),
            BigDecimal::from(50_000u32),
        );
        let mut user = user;
        user.id = user_id.to_string();
        user.email_verified = true;

        state
            .store
            .write(|tx| {
                UserRepo::new(tx).insert(&user)?;
                ChainRepo::new(tx).insert(&chain)?;
                AssetRepo::new(tx).insert(&asset)?;
                ledger_post(
                    tx,
                    LedgerPosting::deposit_confirmed(
                        user_id,
                        &asset.id,
                        &chain.id,
                        std::str::FromStr::from_str(available).unwrap(),
                        &format!("seed-{user_id}"),
                    ),
                    now,
                )
                .map_err(ApiError::from)?;
                Ok::<_, ApiError>(())
            })
            .unwrap();
        fixture
    }

    pub fn params(fixture: &WithdrawalFixture, amount: &str, key: &str) -> SubmitParams {
        SubmitParams {
            asset_id: fixture.asset_id.clone(),
            chain_id: fixture.chain_id.clone(),
            amount: std::str::FromStr::from_str(amount).unwrap(),
            destination_address: DEST.to_string(),
            user_notes: None,
            idempotency_key: key.to_string(),
        }
    }

    pub fn admin_user() -> AuthUser {
        AuthUser {
            user_id: "admin-1".into(),
            session_id: "sess-admin".into(),
            email: "admin@example.com".into(),
            role: crate::auth::Role::Admin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use crate::ledger::{balance_of, entries_for, EntryType};
    use crate::state::testutil::test_state;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn submit_reserves_and_lands_in_review() {
        let (_dir, state, _clock) = test_state();
        let fixture = seed_funds(&state, "u1", "2.0");

        let request = submit(&state, "u1", params(&fixture, "1.0", "key-1")).unwrap();
        assert_eq!(request.status, WithdrawalStatus::PendingReview);
        assert_eq!(request.fee, quantize(&dec("0.001")));
        assert_eq!(request.net_amount, quantize(&dec("0.999")));
        assert_eq!(request.fraud_score, 30);
        assert_eq!(request.fraud_indicators.len(), 1);
        assert_eq!(request.fraud_indicators[0].indicator_type, "NEW_ADDRESS");

        let balance = state
            .store
            .read(|tx| balance_of(tx, "u1", &fixture.asset_id, &fixture.chain_id, state.clock.now()))
            .unwrap();
        assert_eq!(balance.available, quantize(&dec("1.0")));
        assert_eq!(balance.withdrawals_pending, quantize(&dec("1.0")));
    }

    #[test]
    fn fee_floor_applies_to_dust() {
        let (_dir, state, _clock) = test_state();
        let fixture = seed_funds(&state, "u1", "2.0");

        // 0.001 rate on 0.01 would be 0.00001, below the 0.0001 floor.
        let request = submit(&state, "u1", params(&fixture, "0.01", "key-1")).unwrap();
        assert_eq!(request.fee, quantize(&dec("0.0001")));

        // An amount at or below the floor fee nets nothing and is refused.
        let err = submit(&state, "u1", params(&fixture, "0.0001", "key-2")).unwrap_err();
        assert_eq!(err.code, Some("AMOUNT_TOO_SMALL"));
    }

    #[test]
    fn duplicate_key_returns_original_request() {
        let (_dir, state, _clock) = test_state();
        let fixture = seed_funds(&state, "u1", "2.0");

        let first = submit(&state, "u1", params(&fixture, "1.0", "key-1")).unwrap();
        let second = submit(&state, "u1", params(&fixture, "1.0", "key-1")).unwrap();
        assert_eq!(first.id, second.id);

        // Only one reservation happened.
        let balance = state
            .store
            .read(|tx| balance_of(tx, "u1", &fixture.asset_id, &fixture.chain_id, state.clock.now()))
            .unwrap();
        assert_eq!(balance.withdrawals_pending, quantize(&dec("1.0")));

        let entries = state
            .store
            .read(|tx| entries_for(tx, "u1", &fixture.asset_id, &fixture.chain_id))
            .unwrap();
        let reservations = entries
            .iter()
            .filter(|e| e.entry_type == EntryType::WithdrawalRequested)
            .count();
        assert_eq!(reservations, 1);
    }

    #[test]
    fn anothers_idempotency_key_conflicts() {
        let (_dir, state, _clock) = test_state();
        let fixture = seed_funds(&state, "u1", "2.0");
        seed_funds(&state, "u2", "2.0");

        submit(&state, "u1", params(&fixture, "1.0", "shared-key")).unwrap();
        let err = submit(&state, "u2", params(&fixture, "1.0", "shared-key")).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::CONFLICT);
    }

    #[test]
    fn insufficient_balance_refuses_submission() {
        let (_dir, state, _clock) = test_state();
        let fixture = seed_funds(&state, "u1", "0.5");

        let err = submit(&state, "u1", params(&fixture, "1.0", "key-1")).unwrap_err();
        assert_eq!(err.code, Some("INSUFFICIENT_BALANCE"));

        // Nothing persisted, so the key can be reused after topping up.
        let stored = state
            .store
            .read(|tx| WithdrawalRepo::new(tx).by_idempotency_key("key-1"))
            .unwrap();
        assert!(stored.is_none());
    }

    #[test]
    fn whitelist_cooldown_set_once_never_refreshed() {
        let (_dir, state, clock) = test_state();
        let fixture = seed_funds(&state, "u1", "10.0");

        submit(&state, "u1", params(&fixture, "1.0", "key-1")).unwrap();
        let first = state
            .store
            .read(|tx| WhitelistRepo::new(tx).get("u1", &fixture.chain_id, DEST))
            .unwrap()
            .unwrap();

        clock.advance_secs(3600);
        submit(&state, "u1", params(&fixture, "1.0", "key-2")).unwrap();
        let second = state
            .store
            .read(|tx| WhitelistRepo::new(tx).get("u1", &fixture.chain_id, DEST))
            .unwrap()
            .unwrap();
        assert_eq!(first.cooldown_ends_at, second.cooldown_ends_at);
    }

    #[test]
    fn second_submit_within_cooldown_scores_high() {
        let (_dir, state, clock) = test_state();
        let fixture = seed_funds(&state, "u1", "10.0");

        submit(&state, "u1", params(&fixture, "1.0", "key-1")).unwrap();
        clock.advance_secs(3600);
        let second = submit(&state, "u1", params(&fixture, "1.0", "key-2")).unwrap();

        let new_address = second
            .fraud_indicators
            .iter()
            .find(|i| i.indicator_type == "NEW_ADDRESS")
            .unwrap();
        assert_eq!(new_address.score, 50);
    }

    #[test]
    fn reject_releases_reserve_exactly_once() {
        let (_dir, state, _clock) = test_state();
        let fixture = seed_funds(&state, "u1", "2.0");
        let admin = admin_user();

        let request = submit(&state, "u1", params(&fixture, "0.5", "key-1")).unwrap();
        let rejected = reject(&state, &admin, &request.id, "suspicious".into()).unwrap();
        assert_eq!(rejected.status, WithdrawalStatus::Rejected);
        assert_eq!(rejected.admin_notes.as_deref(), Some("suspicious"));

        let balance = state
            .store
            .read(|tx| balance_of(tx, "u1", &fixture.asset_id, &fixture.chain_id, state.clock.now()))
            .unwrap();
        assert_eq!(balance.available, quantize(&dec("2.0")));
        assert_eq!(balance.withdrawals_pending, quantize(&dec("0")));

        // A second reject fails the CAS guard.
        assert!(reject(&state, &admin, &request.id, "again".into()).is_err());
    }

    #[test]
    fn approve_then_reject_is_refused() {
        let (_dir, state, _clock) = test_state();
        let fixture = seed_funds(&state, "u1", "2.0");
        let admin = admin_user();

        let request = submit(&state, "u1", params(&fixture, "1.0", "key-1")).unwrap();
        let approved = approve(&state, &admin, &request.id, None).unwrap();
        assert_eq!(approved.status, WithdrawalStatus::Approved);
        assert_eq!(approved.reviewed_by.as_deref(), Some("admin-1"));

        let err = reject(&state, &admin, &request.id, "too late".into()).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::CONFLICT);
    }

    #[test]
    fn mark_paid_clears_pending_and_is_terminal() {
        let (_dir, state, _clock) = test_state();
        let fixture = seed_funds(&state, "u1", "2.0");
        let admin = admin_user();

        let request = submit(&state, "u1", params(&fixture, "1.0", "key-1")).unwrap();
        let paid = mark_paid(
            &state,
            &admin,
            &request.id,
            "settled via bank".into(),
            Some("https://proof.example/tx/1".into()),
        )
        .unwrap();
        assert_eq!(paid.status, WithdrawalStatus::PaidManually);
        assert_eq!(paid.manual_proof_url.as_deref(), Some("https://proof.example/tx/1"));

        let balance = state
            .store
            .read(|tx| balance_of(tx, "u1", &fixture.asset_id, &fixture.chain_id, state.clock.now()))
            .unwrap();
        assert_eq!(balance.available, quantize(&dec("1.0")));
        assert_eq!(balance.withdrawals_pending, quantize(&dec("0")));

        // Terminal: no further transitions.
        assert!(mark_paid(&state, &admin, &request.id, "again".into(), None).is_err());

        // Ledger shows the reservation and exactly one settlement.
        let entries = state
            .store
            .read(|tx| entries_for(tx, "u1", &fixture.asset_id, &fixture.chain_id))
            .unwrap();
        let paid_entries = entries
            .iter()
            .filter(|e| e.entry_type == EntryType::WithdrawalPaid)
            .count();
        assert_eq!(paid_entries, 1);
    }

    #[test]
    fn review_actions_are_audited_with_redaction() {
        let (_dir, state, _clock) = test_state();
        let fixture = seed_funds(&state, "u1", "2.0");
        let admin = admin_user();

        let request = submit(&state, "u1", params(&fixture, "1.0", "key-1")).unwrap();
        approve(&state, &admin, &request.id, Some("ok".into())).unwrap();

        let entries = state.store.read(|tx| AuditRepo::new(tx).list()).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.action, "withdrawal.approve");
        assert_eq!(entry.actor_email.as_deref(), Some("admin@example.com"));
        assert_eq!(entry.entity_id, request.id);
        let before = entry.before.as_ref().unwrap();
        assert_eq!(before["status"], "PENDING_REVIEW");
        let after = entry.after.as_ref().unwrap();
        assert_eq!(after["status"], "APPROVED");
    }

    #[test]
    fn velocity_indicator_appears_at_the_seventh_request() {
        let (_dir, state, _clock) = test_state();
        let fixture = seed_funds(&state, "u1", "100.0");

        for i in 0..7 {
            submit(&state, "u1", params(&fixture, "1.0", &format!("key-{i}"))).unwrap();
        }
        let eighth = submit(&state, "u1", params(&fixture, "1.0", "key-7")).unwrap();
        assert!(eighth
            .fraud_indicators
            .iter()
            .any(|i| i.indicator_type == "VELOCITY" && i.score == 20));
    }
}
