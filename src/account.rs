//! External-collaborator traits the relay core calls through (§1, §9).
//!
//! The account CRUD service, its encrypted credential store, and the usage
//! ledger are explicitly out of scope (§1). Rather than a lazy `require` to
//! break the account/translation cycle as the source does, this crate takes
//! the Design Notes' own recommendation literally: constructor injection of
//! an `Arc<dyn AccountResolver>` (§9, "Lazy inter-module dependency").

use async_trait::async_trait;

use crate::types::{Account, UsageCounts};
use crate::{Error, Result};

/// Resolves an account by id. The relay calls this once per request (§3:
/// "fetched once per request by id; never mutated by the core").
#[async_trait]
pub trait AccountResolver: Send + Sync {
    async fn get_account(&self, id: &str) -> Result<Account>;
}

/// Records usage and quota consumption. Failures here are logged, never
/// surfaced to the client (§7g).
#[async_trait]
pub trait UsageRecorder: Send + Sync {
    async fn record_usage(&self, account_id: &str, model: &str, usage: &UsageCounts) -> Result<()>;

    /// Called for 2xx responses when `daily_quota > 0` (§4.10 step 7).
    async fn update_usage_quota(&self, account_id: &str, cost: f64) -> Result<()>;

    /// Called for every 2xx response to bump `lastUsedAt` (§4.10 step 7).
    async fn update_last_used(&self, account_id: &str) -> Result<()>;
}

/// Computes the monetary cost of a request's token usage. Owned externally
/// (§1: "the cost-rate table" is an external collaborator) — the relay only
/// calls through this narrow interface.
pub trait CostCalculator: Send + Sync {
    fn cost_for(&self, account_id: &str, model: &str, usage: &UsageCounts) -> f64;
}

/// An in-memory resolver useful for tests and for hosts that keep their
/// account pool in memory.
pub struct StaticAccountResolver {
    accounts: std::collections::HashMap<String, Account>,
}

impl StaticAccountResolver {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self {
            accounts: accounts.into_iter().map(|a| (a.id.clone(), a)).collect(),
        }
    }
}

#[async_trait]
impl AccountResolver for StaticAccountResolver {
    async fn get_account(&self, id: &str) -> Result<Account> {
        self.accounts
            .get(id)
            .cloned()
            .ok_or_else(|| Error::invalid_input(format!("unknown account id: {id}")))
    }
}
