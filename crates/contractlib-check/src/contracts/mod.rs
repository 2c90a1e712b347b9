//! Contract checks for preconditions, postconditions and mid-method
//! assertions.
//!
//! Every check takes a boolean the caller has already evaluated. A false
//! check produces a [`ContractFailure`] carrying the [`FailureKind`], the
//! offending value for the `*_value` variants, and an optional reason.
//! Failures propagate with `?` and are never recovered inside this crate.

pub mod check;

pub use check::{
    asserts, asserts_value, ensures, ensures_value, for_all, requires, requires_value,
    unreachable, unreachable_here,
};
pub use contractlib_core::error::{ContractFailure, FailureKind};
