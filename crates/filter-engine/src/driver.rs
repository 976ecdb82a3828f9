//! Packet filter engine abstraction for testability.
//!
//! The [`FilterDriver`] trait is the capability surface the applier and the
//! harvester depend on. Production code uses [`IptablesDriver`]; tests and
//! benches use [`MemoryFilterDriver`](crate::memory::MemoryFilterDriver).
//!
//! # Architecture
//!
//! ```text
//!  FilterApplier   CounterHarvester
//!        │                │
//!        └──────┬─────────┘
//!               ▼
//!        ┌─────────────┐
//!        │FilterDriver │ (trait)
//!        └─────────────┘
//!           │       │
//!           ▼       ▼
//!      ┌────────┐ ┌──────┐
//!      │iptables│ │Memory│
//!      └────────┘ └──────┘
//! ```
//!
//! All methods are synchronous, matching the underlying `iptables` crate.
//! Async callers run them on the blocking pool.

use tracing::debug;

use crate::counters::{SlotCounter, parse_listing};
use crate::error::FilterEngineError;
use crate::spec::FilterSpec;

/// Capability set of a live packet filter.
///
/// The trait is `Send + Sync + 'static` so one driver can be shared between
/// the reconciliation loop and the harvest loop.
pub trait FilterDriver: Send + Sync + 'static {
    /// Returns whether `chain` exists in `table`.
    fn chain_exists(&self, table: &str, chain: &str) -> Result<bool, FilterEngineError>;

    /// Creates an empty chain. Fails if it already exists.
    fn create_chain(&self, table: &str, chain: &str) -> Result<(), FilterEngineError>;

    /// Removes every rule from the chain, keeping the chain itself.
    fn clear_chain(&self, table: &str, chain: &str) -> Result<(), FilterEngineError>;

    /// Appends the rule at the chain tail unless an identical rule is present.
    fn append_unique(
        &self,
        table: &str,
        chain: &str,
        spec: &FilterSpec,
    ) -> Result<(), FilterEngineError>;

    /// Inserts the rule at a 1-based `position`.
    fn insert(
        &self,
        table: &str,
        chain: &str,
        position: u32,
        spec: &FilterSpec,
    ) -> Result<(), FilterEngineError>;

    /// Reads per-slot counters of the chain, in slot order.
    fn chain_counters(&self, table: &str, chain: &str)
    -> Result<Vec<SlotCounter>, FilterEngineError>;
}

/// IPv4 `iptables` driver backed by the `iptables` crate.
pub struct IptablesDriver {
    inner: iptables::IPTables,
}

impl IptablesDriver {
    /// Locates the `iptables` binary and probes its capabilities.
    ///
    /// # Errors
    ///
    /// Returns `FilterEngineError::Unavailable` when the binary cannot be run.
    pub fn new() -> Result<Self, FilterEngineError> {
        let inner =
            iptables::new(false).map_err(|e| FilterEngineError::Unavailable(e.to_string()))?;
        Ok(Self { inner })
    }
}

fn command_error(
    op: &'static str,
    table: &str,
    chain: &str,
    err: impl std::fmt::Display,
) -> FilterEngineError {
    FilterEngineError::Command {
        op,
        chain: format!("{table}/{chain}"),
        reason: err.to_string(),
    }
}

impl FilterDriver for IptablesDriver {
    fn chain_exists(&self, table: &str, chain: &str) -> Result<bool, FilterEngineError> {
        self.inner
            .chain_exists(table, chain)
            .map_err(|e| command_error("chain-exists", table, chain, e))
    }

    fn create_chain(&self, table: &str, chain: &str) -> Result<(), FilterEngineError> {
        self.inner
            .new_chain(table, chain)
            .map_err(|e| command_error("create-chain", table, chain, e))
    }

    fn clear_chain(&self, table: &str, chain: &str) -> Result<(), FilterEngineError> {
        self.inner
            .flush_chain(table, chain)
            .map_err(|e| command_error("clear-chain", table, chain, e))
    }

    fn append_unique(
        &self,
        table: &str,
        chain: &str,
        spec: &FilterSpec,
    ) -> Result<(), FilterEngineError> {
        let rule = spec.to_rule_string();
        let present = self
            .inner
            .exists(table, chain, &rule)
            .map_err(|e| command_error("append", table, chain, e))?;
        if present {
            debug!(table, chain, rule = %rule, "rule already present, skipping append");
            return Ok(());
        }
        self.inner
            .append(table, chain, &rule)
            .map_err(|e| command_error("append", table, chain, e))
    }

    fn insert(
        &self,
        table: &str,
        chain: &str,
        position: u32,
        spec: &FilterSpec,
    ) -> Result<(), FilterEngineError> {
        let position = i32::try_from(position)
            .map_err(|_| command_error("insert", table, chain, "position out of range"))?;
        self.inner
            .insert(table, chain, &spec.to_rule_string(), position)
            .map_err(|e| command_error("insert", table, chain, e))
    }

    fn chain_counters(
        &self,
        table: &str,
        chain: &str,
    ) -> Result<Vec<SlotCounter>, FilterEngineError> {
        let output = self
            .inner
            .execute(table, &format!("-L {chain} -n -v -x"))
            .map_err(|e| command_error("counters", table, chain, e))?;
        if !output.status.success() {
            return Err(command_error(
                "counters",
                table,
                chain,
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }
        let listing = String::from_utf8_lossy(&output.stdout);
        parse_listing(&format!("{table}/{chain}"), &listing)
    }
}
