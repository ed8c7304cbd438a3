// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Application State
//!
//! Shared state passed to every Axum handler and background worker.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         AppState                             │
//! │  Arc<Store>          embedded ACID database (ledger, rows)   │
//! │  Arc<ChainRegistry>  one JSON-RPC client per chain           │
//! │  JobQueue            payout jobs, status checks              │
//! │  Arc<dyn HdSigner>   deposit address derivation              │
//! │  Arc<dyn Clock>      injected time source                    │
//! │  TokenIssuer         access/refresh token minting            │
//! │  SecretBox           master-key AEAD for stored secrets      │
//! │  Arc<RateLimiter>    per-IP token buckets                    │
//! │  SecuritySettings    fraud thresholds, fee policy            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything is `Clone + Send + Sync`; handlers and workers share the
//! same instances, so a worker's ledger write is immediately visible to
//! the API through the store.

use std::sync::Arc;

use crate::auth::{RateLimiter, TokenIssuer};
use crate::chain::ChainRegistry;
use crate::clock::Clock;
use crate::config::SecuritySettings;
use crate::crypto::SecretBox;
use crate::queue::JobQueue;
use crate::signer::HdSigner;
use crate::store::Store;

/// Shared application state for request handlers and workers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub chains: Arc<ChainRegistry>,
    pub queue: JobQueue,
    pub signer: Arc<dyn HdSigner>,
    pub clock: Arc<dyn Clock>,
    pub tokens: TokenIssuer,
    pub secrets: SecretBox,
    pub rate_limiter: Arc<RateLimiter>,
    pub security: SecuritySettings,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<Store>,
        chains: Arc<ChainRegistry>,
        queue: JobQueue,
        signer: Arc<dyn HdSigner>,
        clock: Arc<dyn Clock>,
        tokens: TokenIssuer,
        secrets: SecretBox,
        security: SecuritySettings,
    ) -> Self {
        Self {
            store,
            chains,
            queue,
            signer,
            clock,
            tokens,
            secrets,
            rate_limiter: Arc::new(RateLimiter::new()),
            security,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::test_state;

    #[test]
    fn state_can_be_cloned_and_shares_store() {
        let (_dir, state, _clock) = test_state();
        let cloned = state.clone();
        assert!(std::sync::Arc::ptr_eq(&state.store, &cloned.store));
    }
}
