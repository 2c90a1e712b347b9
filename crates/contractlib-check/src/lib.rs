//! Design-by-contract runtime checks with scope-keyed old values.
//!
//! - [`contracts`]: direct checks (`requires`, `ensures`, `asserts`, their
//!   `*_value` forms, `for_all`, `unreachable`).
//! - [`context`]: [`ContractContext`], the enforcement flag and the
//!   wrappers that make contract blocks skippable in production.
//! - [`old_values`]: per-call memory of values remembered in preconditions.
//! - [`config`]: [`ContractConfig`] and environment loading.
//! - [`thread`]: a per-thread default context.

pub mod config;
pub mod context;
pub mod contracts;
pub mod old_values;
pub mod thread;

pub use config::{ConfigError, ContractConfig};
pub use context::{CallGuard, ContractContext, Enforcement};
pub use old_values::{OldValueBag, OldValueStore};

pub use contractlib_core::{
    call_site, ContractError, ContractFailure, FailureKind, Frame, ResolvedScope, ScopeError,
    ScopeKey, Value, WrapperKind,
};
