//! Direct contract checks: evaluate an already-computed boolean and fail with
//! a structured [`ContractFailure`] when it is false.
//!
//! These are never gated by the enforcement flag. Wrap them in
//! [`ContractContext::preconditions`](crate::context::ContractContext::preconditions)
//! and friends to make them skippable.

use std::panic::Location;

use contractlib_core::{ContractFailure, FailureKind, Value};

/// Precondition: is `expr` true?
pub fn requires(expr: bool, reason: Option<&str>) -> Result<(), ContractFailure> {
    check(expr, FailureKind::Requires, || None, reason)
}

/// Precondition that reports `value` when it fails.
pub fn requires_value<V: Into<Value>>(
    value: V,
    expr: bool,
    reason: Option<&str>,
) -> Result<(), ContractFailure> {
    check(expr, FailureKind::RequiresValue, || Some(value.into()), reason)
}

/// Postcondition: is `expr` true?
pub fn ensures(expr: bool, reason: Option<&str>) -> Result<(), ContractFailure> {
    check(expr, FailureKind::Ensures, || None, reason)
}

/// Postcondition that reports `value` when it fails.
pub fn ensures_value<V: Into<Value>>(
    value: V,
    expr: bool,
    reason: Option<&str>,
) -> Result<(), ContractFailure> {
    check(expr, FailureKind::EnsuresValue, || Some(value.into()), reason)
}

/// Mid-condition: is `expr` true?
pub fn asserts(expr: bool, reason: Option<&str>) -> Result<(), ContractFailure> {
    check(expr, FailureKind::Asserts, || None, reason)
}

/// Mid-condition that reports `value` when it fails.
pub fn asserts_value<V: Into<Value>>(
    value: V,
    expr: bool,
    reason: Option<&str>,
) -> Result<(), ContractFailure> {
    check(expr, FailureKind::AssertsValue, || Some(value.into()), reason)
}

/// Applies `predicate` to every item in order, stopping at the first error.
///
/// No aggregation: the first failing item's error is returned as-is.
pub fn for_all<I, F, E>(items: I, predicate: F) -> Result<(), E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Result<(), E>,
{
    items.into_iter().try_for_each(predicate)
}

/// Marks a code path that must never execute. Always fails.
pub fn unreachable<T>(file: &str, line: u32) -> Result<T, ContractFailure> {
    tracing::debug!(file, line, "unreachable code reached");
    Err(ContractFailure::new(FailureKind::Unreachable).with_reason(format!(
        "Unreachable code in file {} at line {} has somehow been reached. Go figure!",
        file, line
    )))
}

/// [`unreachable`] with the location taken from the caller.
#[track_caller]
pub fn unreachable_here<T>() -> Result<T, ContractFailure> {
    let location = Location::caller();
    unreachable(location.file(), location.line())
}

fn check(
    expr: bool,
    kind: FailureKind,
    value: impl FnOnce() -> Option<Value>,
    reason: Option<&str>,
) -> Result<(), ContractFailure> {
    if expr {
        return Ok(());
    }

    let failure = ContractFailure {
        kind,
        value: value(),
        reason: reason.map(str::to_owned),
    };
    tracing::debug!(kind = %kind, "contract check failed");
    Err(failure)
}
