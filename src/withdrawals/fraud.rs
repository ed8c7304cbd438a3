// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Heuristic risk scoring for withdrawal requests.
//!
//! Scoring never blocks submission; it annotates the request for the admin
//! reviewer. The rules are pure functions over a context the submit path
//! assembles inside its transaction, which keeps them deterministic and
//! directly testable.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::SecuritySettings;
use crate::store::{User, WhitelistEntry};

/// Indicator severity shown to reviewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// One triggered risk rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FraudIndicator {
    /// Rule tag, e.g. `NEW_ADDRESS`.
    pub indicator_type: String,
    pub severity: Severity,
    pub description: String,
    pub score: u32,
}

impl FraudIndicator {
    fn new(
        indicator_type: &str,
        severity: Severity,
        description: impl Into<String>,
        score: u32,
    ) -> Self {
        Self {
            indicator_type: indicator_type.to_string(),
            severity,
            description: description.into(),
            score,
        }
    }
}

/// Everything the rules look at, gathered by the submit path.
#[derive(Debug)]
pub struct FraudContext<'a> {
    pub user: &'a User,
    /// Whitelist row for the destination, if any.
    pub whitelist_entry: Option<&'a WhitelistEntry>,
    /// USD value of this withdrawal.
    pub amount_usd: BigDecimal,
    /// Non-rejected USD volume in the trailing 24 h including this request.
    pub daily_total_usd: BigDecimal,
    /// Requests submitted in the trailing 24 h, excluding this one.
    pub requests_last_24h: u32,
    pub now: DateTime<Utc>,
}

/// Evaluate every rule. Returns the triggered indicators and total score.
pub fn score(ctx: &FraudContext<'_>, settings: &SecuritySettings) -> (Vec<FraudIndicator>, u32) {
    let mut indicators = Vec::new();

    match ctx.whitelist_entry {
        None => {
            indicators.push(FraudIndicator::new(
                "NEW_ADDRESS",
                Severity::Medium,
                "Destination address has not been used before",
                30,
            ));
        }
        Some(entry) if entry.cooldown_ends_at > ctx.now => {
            indicators.push(FraudIndicator::new(
                "NEW_ADDRESS",
                Severity::High,
                "Destination address is still in its 24h cooldown",
                50,
            ));
        }
        Some(_) => {}
    }

    if ctx.amount_usd > ctx.user.daily_withdrawal_limit_usd {
        indicators.push(FraudIndicator::new(
            "HIGH_AMOUNT",
            Severity::High,
            format!("Single withdrawal of ${} exceeds the user's daily limit", ctx.amount_usd),
            40,
        ));
    } else if ctx.amount_usd > settings.large_withdrawal_threshold_usd {
        indicators.push(FraudIndicator::new(
            "HIGH_AMOUNT",
            Severity::Medium,
            format!("Withdrawal of ${} is above the large-withdrawal threshold", ctx.amount_usd),
            20,
        ));
    }

    if ctx.daily_total_usd > ctx.user.daily_withdrawal_limit_usd {
        indicators.push(FraudIndicator::new(
            "DAILY_LIMIT",
            Severity::High,
            "Cumulative 24h withdrawals exceed the user's daily limit",
            50,
        ));
    }

    let max_requests = settings.max_daily_withdrawal_requests;
    let near_limit = (max_requests as f64 * 0.7).ceil() as u32;
    if ctx.requests_last_24h >= max_requests {
        indicators.push(FraudIndicator::new(
            "VELOCITY",
            Severity::High,
            format!("{} withdrawal requests in the last 24h", ctx.requests_last_24h),
            40,
        ));
    } else if ctx.requests_last_24h >= near_limit {
        indicators.push(FraudIndicator::new(
            "VELOCITY",
            Severity::Medium,
            format!("{} withdrawal requests in the last 24h", ctx.requests_last_24h),
            20,
        ));
    }

    if ctx.now - ctx.user.created_at < Duration::days(7) {
        indicators.push(FraudIndicator::new(
            "NEW_ACCOUNT",
            Severity::Medium,
            "Account is less than 7 days old",
            25,
        ));
    }

    if !ctx.user.email_verified {
        indicators.push(FraudIndicator::new(
            "UNVERIFIED_EMAIL",
            Severity::Low,
            "Email address has not been verified",
            15,
        ));
    }

    let total = indicators.iter().map(|i| i.score).sum();
    (indicators, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn user(created_days_ago: i64, email_verified: bool) -> User {
        let now = Utc::now();
        let mut user = User::new(
            "u@example.com".into(),
            "$argon2id$stub".into(),
            now - Duration::days(created_days_ago),
            dec("50000"),
        );
        user.email_verified = email_verified;
        user.role = Role::User;
        user
    }

    fn base_ctx<'a>(user: &'a User, whitelist: Option<&'a WhitelistEntry>) -> FraudContext<'a> {
        FraudContext {
            user,
            whitelist_entry: whitelist,
            amount_usd: dec("100"),
            daily_total_usd: dec("100"),
            requests_last_24h: 0,
            now: Utc::now(),
        }
    }

    fn entry(cooldown_hours_from_now: i64) -> WhitelistEntry {
        WhitelistEntry {
            user_id: "u1".into(),
            chain_id: "c1".into(),
            address: "0xaa".into(),
            label: None,
            cooldown_ends_at: Utc::now() + Duration::hours(cooldown_hours_from_now),
            created_at: Utc::now(),
        }
    }

    fn find<'a>(indicators: &'a [FraudIndicator], tag: &str) -> Option<&'a FraudIndicator> {
        indicators.iter().find(|i| i.indicator_type == tag)
    }

    #[test]
    fn seasoned_verified_user_to_known_address_scores_zero() {
        let user = user(30, true);
        let whitelist = entry(-1);
        let ctx = base_ctx(&user, Some(&whitelist));
        let (indicators, total) = score(&ctx, &SecuritySettings::default());
        assert!(indicators.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn new_address_scores_30() {
        let user = user(30, true);
        let ctx = base_ctx(&user, None);
        let (indicators, total) = score(&ctx, &SecuritySettings::default());
        let hit = find(&indicators, "NEW_ADDRESS").unwrap();
        assert_eq!(hit.severity, Severity::Medium);
        assert_eq!(hit.score, 30);
        assert_eq!(total, 30);
    }

    #[test]
    fn cooldown_address_escalates_to_50() {
        let user = user(30, true);
        let whitelist = entry(12);
        let ctx = base_ctx(&user, Some(&whitelist));
        let (indicators, _) = score(&ctx, &SecuritySettings::default());
        let hit = find(&indicators, "NEW_ADDRESS").unwrap();
        assert_eq!(hit.severity, Severity::High);
        assert_eq!(hit.score, 50);
    }

    #[test]
    fn high_amount_tiers_are_exclusive() {
        let user = user(30, true);
        let whitelist = entry(-1);

        let mut ctx = base_ctx(&user, Some(&whitelist));
        ctx.amount_usd = dec("15000");
        ctx.daily_total_usd = dec("15000");
        let (indicators, _) = score(&ctx, &SecuritySettings::default());
        assert_eq!(find(&indicators, "HIGH_AMOUNT").unwrap().score, 20);

        ctx.amount_usd = dec("60000");
        ctx.daily_total_usd = dec("60000");
        let (indicators, _) = score(&ctx, &SecuritySettings::default());
        let hit = find(&indicators, "HIGH_AMOUNT").unwrap();
        assert_eq!(hit.score, 40);
        assert_eq!(hit.severity, Severity::High);
        // Over the daily limit it also triggers DAILY_LIMIT.
        assert_eq!(find(&indicators, "DAILY_LIMIT").unwrap().score, 50);
    }

    #[test]
    fn velocity_tiers() {
        let user = user(30, true);
        let whitelist = entry(-1);
        let settings = SecuritySettings::default();

        let mut ctx = base_ctx(&user, Some(&whitelist));
        ctx.requests_last_24h = 7;
        let (indicators, _) = score(&ctx, &settings);
        assert_eq!(find(&indicators, "VELOCITY").unwrap().score, 20);

        ctx.requests_last_24h = 10;
        let (indicators, _) = score(&ctx, &settings);
        assert_eq!(find(&indicators, "VELOCITY").unwrap().score, 40);

        ctx.requests_last_24h = 3;
        let (indicators, _) = score(&ctx, &settings);
        assert!(find(&indicators, "VELOCITY").is_none());
    }

    #[test]
    fn young_account_and_unverified_email_stack() {
        let user = user(2, false);
        let whitelist = entry(-1);
        let ctx = base_ctx(&user, Some(&whitelist));
        let (indicators, total) = score(&ctx, &SecuritySettings::default());
        assert_eq!(find(&indicators, "NEW_ACCOUNT").unwrap().score, 25);
        assert_eq!(find(&indicators, "UNVERIFIED_EMAIL").unwrap().score, 15);
        assert_eq!(total, 40);
    }

    #[test]
    fn spec_scenario_new_address_only() {
        // A verified month-old user withdrawing to a brand-new address.
        let user = user(30, true);
        let ctx = base_ctx(&user, None);
        let (indicators, total) = score(&ctx, &SecuritySettings::default());
        assert_eq!(indicators.len(), 1);
        assert_eq!(total, 30);
    }
}
