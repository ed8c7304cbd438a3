// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger reconciliation tool.
//!
//! Replays the journal for every (user, asset, chain) tuple and compares
//! the result against the balance cache. Check mode reports discrepancies
//! and exits non-zero when any exist; `--fix` overwrites divergent cache
//! rows from the replay.
//!
//! ```text
//! reconcile [--fix] [--data-dir /data]
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use stakevault_server::clock::{Clock, SystemClock};
use stakevault_server::config;
use stakevault_server::ledger::reconcile;
use stakevault_server::store::Store;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let fix = args.iter().any(|a| a == "--fix");
    let data_dir = args
        .iter()
        .position(|a| a == "--data-dir")
        .and_then(|i| args.get(i + 1).cloned())
        .or_else(|| std::env::var(config::DATA_DIR_ENV).ok())
        .unwrap_or_else(|| "/data".to_string());

    let db_path = PathBuf::from(&data_dir).join("stakevault.redb");
    let store = match Store::open(&db_path) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("cannot open store at {}: {e}", db_path.display());
            return ExitCode::FAILURE;
        }
    };

    let now = SystemClock.now();
    let report = if fix {
        reconcile::fix(&store, now)
    } else {
        reconcile::check(&store, now)
    };

    match report {
        Ok(report) => {
            println!(
                "checked {} tuple(s): {} discrepancy(ies){}",
                report.tuples_checked,
                report.discrepancies.len(),
                if fix {
                    format!(", {} fixed", report.tuples_fixed)
                } else {
                    String::new()
                }
            );
            for d in &report.discrepancies {
                println!(
                    "  ({}, {}, {}) {}: cached={} replayed={}",
                    d.user_id, d.asset_id, d.chain_id, d.field, d.cached, d.replayed
                );
            }
            if report.is_clean() || fix {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("reconciliation failed: {e}");
            ExitCode::FAILURE
        }
    }
}
