//! Per-thread default contract context.
//!
//! For callers that would rather not thread a [`ContractContext`] through
//! every signature. Each thread gets its own context, initialised from the
//! environment on first use, so old values never leak between threads.

use std::cell::RefCell;

use crate::config::ContractConfig;
use crate::context::ContractContext;

thread_local! {
    static CONTRACTS: RefCell<ContractContext> = RefCell::new(initial_context());
}

fn initial_context() -> ContractContext {
    let config = ContractConfig::from_env().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "ignoring contract configuration from environment");
        ContractConfig::default()
    });
    ContractContext::with_config(config)
}

/// Runs `f` with this thread's contract context.
///
/// # Panics
///
/// Panics if called again from inside `f`; pass the `&mut ContractContext`
/// down instead.
pub fn with_contracts<R>(f: impl FnOnce(&mut ContractContext) -> R) -> R {
    CONTRACTS.with(|cell| f(&mut cell.borrow_mut()))
}
