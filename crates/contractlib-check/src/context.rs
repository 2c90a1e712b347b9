//! The contract engine state: enforcement flag, scope tracking and old-value
//! memory, owned by the application instead of living in process globals.
//!
//! # Architecture
//!
//! - [`ContractContext`] holds the [`Enforcement`] state, the stack of
//!   entered [`Frame`]s, the stack of active wrappers, and the
//!   [`OldValueStore`].
//! - [`ContractContext::enter`] pushes a frame for the calling function and
//!   returns a [`CallGuard`] that pops it on drop. The chain of entered
//!   frames is the [`ScopeKey`] of the current call.
//! - [`ContractContext::preconditions`], [`postconditions`] and
//!   [`conditionals`] run their block only when wrapped contracts are
//!   enforced, recording which wrapper is active and how many frames were
//!   entered when it started. That frame count fixes the scope key for the
//!   whole block, so helpers entered inside it share their caller's memory.
//!
//! # Usage
//!
//! ```ignore
//! fn deposit(ctx: &mut ContractContext, account: &mut Account, amount: i64) -> Result<(), ContractError> {
//!     let mut call = ctx.enter(call_site!())?;
//!     call.preconditions(|ctx| {
//!         requires(amount > 0, Some("deposit must be positive"))?;
//!         ctx.remember_old_value("balance", &account.balance)
//!     })?;
//!
//!     account.balance += amount;
//!
//!     call.postconditions(|ctx| {
//!         let old: Option<i64> = ctx.old_value_as("balance")?;
//!         ensures(old.map(|b| b + amount) == Some(account.balance), None)?;
//!         ctx.forget_old_values()?;
//!         Ok(())
//!     })
//! }
//! ```
//!
//! [`postconditions`]: ContractContext::postconditions
//! [`conditionals`]: ContractContext::conditionals

use std::ops::{Deref, DerefMut};

use serde::de::DeserializeOwned;
use serde::Serialize;

use contractlib_core::{
    ContractError, Frame, ResolvedScope, ScopeError, ScopeKey, Value, WrapperKind,
};

use crate::config::ContractConfig;
use crate::old_values::OldValueStore;

/// Whether wrapper-gated blocks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Enforcement {
    /// Only direct checks are enforced; wrapped blocks are skipped.
    #[default]
    DirectOnly,
    /// Wrapped blocks run as well.
    WrappedEnabled,
}

/// Application-owned contract engine.
///
/// One context per thread or task; it is `Send` but carries no locking.
#[derive(Debug)]
pub struct ContractContext {
    config: ContractConfig,
    enforcement: Enforcement,
    /// Entered frames, outermost first.
    frames: Vec<Frame>,
    /// Active wrappers with the frame depth at their start, innermost last.
    wrappers: Vec<(WrapperKind, usize)>,
    old_values: OldValueStore,
    leak_warned: bool,
}

impl Default for ContractContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ContractContext {
    /// Creates a context in the direct-only state with default settings.
    pub fn new() -> Self {
        Self::with_config(ContractConfig::default())
    }

    pub fn with_config(config: ContractConfig) -> Self {
        let enforcement = if config.enforce_wrapped {
            Enforcement::WrappedEnabled
        } else {
            Enforcement::DirectOnly
        };

        ContractContext {
            config,
            enforcement,
            frames: Vec::new(),
            wrappers: Vec::new(),
            old_values: OldValueStore::new(),
            leak_warned: false,
        }
    }

    pub fn config(&self) -> &ContractConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Enforcement flag
    // -----------------------------------------------------------------------

    pub fn enforcement(&self) -> Enforcement {
        self.enforcement
    }

    pub fn is_enforcing_wrapped(&self) -> bool {
        self.enforcement == Enforcement::WrappedEnabled
    }

    /// Run wrapped contract blocks from now on.
    pub fn enforce_wrapped_contracts(&mut self) {
        if self.enforcement != Enforcement::WrappedEnabled {
            tracing::debug!("enforcing wrapped contracts");
        }
        self.enforcement = Enforcement::WrappedEnabled;
    }

    /// Enforce only direct checks; wrapped blocks are skipped from now on.
    pub fn enforce_only_direct_contracts(&mut self) {
        if self.enforcement != Enforcement::DirectOnly {
            tracing::debug!("enforcing only direct contracts");
        }
        self.enforcement = Enforcement::DirectOnly;
    }

    // -----------------------------------------------------------------------
    // Scope tracking
    // -----------------------------------------------------------------------

    /// Pushes `frame` for the duration of the returned guard.
    ///
    /// Call once at the top of every function whose contracts use old
    /// values, usually with [`call_site!`](contractlib_core::call_site).
    pub fn enter(&mut self, frame: Frame) -> Result<CallGuard<'_>, ScopeError> {
        let limit = self.config.max_scope_depth;
        if self.frames.len() >= limit {
            return Err(ScopeError::DepthExceeded { limit, frame });
        }

        let depth = self.frames.len();
        self.frames.push(frame);
        Ok(CallGuard { ctx: self, depth })
    }

    /// Number of entered frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Resolves the innermost active wrapper and the key of the call that
    /// invoked it.
    ///
    /// The key is the frame chain as it stood when that wrapper started;
    /// frames entered inside the block are not part of it. Fails with
    /// [`ScopeError::Resolution`] outside every wrapper.
    pub fn current_scope(&self) -> Result<ResolvedScope, ScopeError> {
        let (caller, depth) = *self.wrappers.last().ok_or(ScopeError::Resolution)?;
        let depth = depth.min(self.frames.len());
        Ok(ResolvedScope {
            caller,
            key: ScopeKey::from_frames(self.frames[..depth].iter().cloned()),
        })
    }

    // -----------------------------------------------------------------------
    // Wrapped contracts
    // -----------------------------------------------------------------------

    /// Runs a block of preconditions if wrapped contracts are enforced.
    pub fn preconditions<F>(&mut self, block: F) -> Result<(), ContractError>
    where
        F: FnOnce(&mut Self) -> Result<(), ContractError>,
    {
        self.run_wrapped(WrapperKind::Preconditions, (), |ctx, ()| block(ctx))
    }

    /// [`preconditions`](Self::preconditions) with positional arguments.
    pub fn preconditions_with<A, F>(&mut self, args: A, block: F) -> Result<(), ContractError>
    where
        F: FnOnce(&mut Self, A) -> Result<(), ContractError>,
    {
        self.run_wrapped(WrapperKind::Preconditions, args, block)
    }

    /// Runs a block of postconditions if wrapped contracts are enforced.
    pub fn postconditions<F>(&mut self, block: F) -> Result<(), ContractError>
    where
        F: FnOnce(&mut Self) -> Result<(), ContractError>,
    {
        self.run_wrapped(WrapperKind::Postconditions, (), |ctx, ()| block(ctx))
    }

    /// [`postconditions`](Self::postconditions) with positional arguments.
    pub fn postconditions_with<A, F>(&mut self, args: A, block: F) -> Result<(), ContractError>
    where
        F: FnOnce(&mut Self, A) -> Result<(), ContractError>,
    {
        self.run_wrapped(WrapperKind::Postconditions, args, block)
    }

    /// Runs a block of mid-method checks if wrapped contracts are enforced.
    pub fn conditionals<F>(&mut self, block: F) -> Result<(), ContractError>
    where
        F: FnOnce(&mut Self) -> Result<(), ContractError>,
    {
        self.run_wrapped(WrapperKind::Conditionals, (), |ctx, ()| block(ctx))
    }

    /// [`conditionals`](Self::conditionals) with positional arguments.
    pub fn conditionals_with<A, F>(&mut self, args: A, block: F) -> Result<(), ContractError>
    where
        F: FnOnce(&mut Self, A) -> Result<(), ContractError>,
    {
        self.run_wrapped(WrapperKind::Conditionals, args, block)
    }

    fn run_wrapped<A, F>(&mut self, kind: WrapperKind, args: A, block: F) -> Result<(), ContractError>
    where
        F: FnOnce(&mut Self, A) -> Result<(), ContractError>,
    {
        if !self.is_enforcing_wrapped() {
            tracing::trace!(wrapper = %kind, "wrapped contracts not enforced, skipping block");
            return Ok(());
        }

        let active = self.wrappers.len();
        self.wrappers.push((kind, self.frames.len()));
        let mut guard = WrapperGuard { ctx: self, active };
        block(&mut *guard, args)
    }

    // -----------------------------------------------------------------------
    // Old values
    // -----------------------------------------------------------------------

    /// Remembers a snapshot of `value` for the current call.
    ///
    /// Only valid inside a precondition block; the store rejects anything
    /// else. The snapshot is a deep copy, so later changes to `value` are not
    /// seen by [`old_value`](Self::old_value).
    pub fn remember_old_value<T: Serialize + ?Sized>(
        &mut self,
        name: &str,
        value: &T,
    ) -> Result<(), ContractError> {
        let scope = self.current_scope()?;
        let snapshot = Value::capture(value)?;
        self.old_values.stash(&scope, name, snapshot)?;
        self.check_for_leaks();
        Ok(())
    }

    /// Returns the value remembered under `name` for the current call, or
    /// `None` when nothing was remembered.
    pub fn old_value(&self, name: &str) -> Result<Option<Value>, ScopeError> {
        let scope = self.current_scope()?;
        Ok(self.old_values.fetch(&scope.key, name).cloned())
    }

    /// [`old_value`](Self::old_value) restored into a concrete type.
    pub fn old_value_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ContractError> {
        match self.old_value(name)? {
            Some(value) => Ok(Some(value.restore()?)),
            None => Ok(None),
        }
    }

    /// Releases everything remembered for the current call.
    ///
    /// Returns whether anything was remembered.
    pub fn forget_old_values(&mut self) -> Result<bool, ScopeError> {
        let scope = self.current_scope()?;
        let removed = self.old_values.forget(&scope.key);
        if self.old_values.scope_count() == 0 {
            self.leak_warned = false;
        }
        Ok(removed)
    }

    /// Number of calls currently holding remembered values.
    pub fn remembered_scope_count(&self) -> usize {
        self.old_values.scope_count()
    }

    /// Keys of the calls currently holding remembered values.
    pub fn remembered_scopes(&self) -> impl Iterator<Item = &ScopeKey> {
        self.old_values.scopes()
    }

    pub fn old_values(&self) -> &OldValueStore {
        &self.old_values
    }

    fn check_for_leaks(&mut self) {
        let Some(threshold) = self.config.leak_warning_threshold else {
            return;
        };
        let count = self.old_values.scope_count();
        if count > threshold.get() && !self.leak_warned {
            self.leak_warned = true;
            tracing::warn!(
                count,
                threshold,
                "old values remembered for many scopes; are postconditions forgetting them?"
            );
        }
    }
}

/// Keeps a frame entered on a [`ContractContext`]; pops it on drop.
///
/// Dereferences to the context, so contract calls go straight through it.
#[derive(Debug)]
pub struct CallGuard<'a> {
    ctx: &'a mut ContractContext,
    depth: usize,
}

impl Deref for CallGuard<'_> {
    type Target = ContractContext;

    fn deref(&self) -> &ContractContext {
        self.ctx
    }
}

impl DerefMut for CallGuard<'_> {
    fn deref_mut(&mut self) -> &mut ContractContext {
        self.ctx
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.ctx.frames.truncate(self.depth);
    }
}

/// Keeps a wrapper active while its block runs, including during unwinding.
struct WrapperGuard<'a> {
    ctx: &'a mut ContractContext,
    active: usize,
}

impl Deref for WrapperGuard<'_> {
    type Target = ContractContext;

    fn deref(&self) -> &ContractContext {
        self.ctx
    }
}

impl DerefMut for WrapperGuard<'_> {
    fn deref_mut(&mut self) -> &mut ContractContext {
        self.ctx
    }
}

impl Drop for WrapperGuard<'_> {
    fn drop(&mut self) {
        self.ctx.wrappers.truncate(self.active);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;

    use crate::contracts::{ensures, requires};
    use contractlib_core::{call_site, FailureKind};

    fn enforcing() -> ContractContext {
        let mut ctx = ContractContext::new();
        ctx.enforce_wrapped_contracts();
        ctx
    }

    #[test]
    fn starts_direct_only() {
        let ctx = ContractContext::new();
        assert_eq!(ctx.enforcement(), Enforcement::DirectOnly);
        assert!(!ctx.is_enforcing_wrapped());
    }

    #[test]
    fn config_can_start_enforcing() {
        let ctx = ContractContext::with_config(ContractConfig {
            enforce_wrapped: true,
            ..ContractConfig::default()
        });
        assert_eq!(ctx.enforcement(), Enforcement::WrappedEnabled);
    }

    #[test]
    fn flag_transitions() {
        let mut ctx = ContractContext::new();
        ctx.enforce_wrapped_contracts();
        assert!(ctx.is_enforcing_wrapped());
        ctx.enforce_wrapped_contracts();
        assert!(ctx.is_enforcing_wrapped());
        ctx.enforce_only_direct_contracts();
        assert_eq!(ctx.enforcement(), Enforcement::DirectOnly);
    }

    #[test]
    fn guard_pops_frame_on_drop() {
        let mut ctx = ContractContext::new();
        {
            let mut outer = ctx.enter(Frame::new("lib.rs", "outer")).unwrap();
            assert_eq!(outer.depth(), 1);
            {
                let inner = outer.enter(Frame::new("lib.rs", "inner")).unwrap();
                assert_eq!(inner.depth(), 2);
            }
            assert_eq!(outer.depth(), 1);
        }
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn enter_respects_depth_limit() {
        let mut ctx = ContractContext::with_config(ContractConfig {
            max_scope_depth: 1,
            ..ContractConfig::default()
        });
        let mut call = ctx.enter(Frame::new("lib.rs", "first")).unwrap();
        let err = call.enter(Frame::new("lib.rs", "second")).unwrap_err();
        assert!(matches!(err, ScopeError::DepthExceeded { limit: 1, .. }));
    }

    #[test]
    fn current_scope_outside_wrapper_fails() {
        let ctx = ContractContext::new();
        assert_eq!(ctx.current_scope(), Err(ScopeError::Resolution));
    }

    #[test]
    fn current_scope_reports_innermost_wrapper() {
        let mut ctx = enforcing();
        let mut call = ctx.enter(call_site!()).unwrap();
        call.preconditions(|ctx| {
            assert_eq!(ctx.current_scope()?.caller, WrapperKind::Preconditions);
            ctx.conditionals(|ctx| {
                assert_eq!(ctx.current_scope()?.caller, WrapperKind::Conditionals);
                Ok(())
            })?;
            assert_eq!(ctx.current_scope()?.caller, WrapperKind::Preconditions);
            Ok(())
        })
        .unwrap();
        assert_eq!(call.current_scope(), Err(ScopeError::Resolution));
    }

    #[test]
    fn failure_inside_block_still_pops_wrapper() {
        let mut ctx = enforcing();
        let err = ctx
            .postconditions(|_| {
                ensures(false, None)?;
                Ok(())
            })
            .unwrap_err();
        assert_eq!(err.failure_kind(), Some(FailureKind::Ensures));
        assert_eq!(ctx.current_scope(), Err(ScopeError::Resolution));
    }

    #[test]
    fn block_args_are_passed_through() {
        let mut ctx = enforcing();
        let mut seen = None;
        ctx.preconditions_with((1, 2, 3), |_, (x, y, z)| {
            requires(x < y, None)?;
            requires(y < z, None)?;
            seen = Some(x + y + z);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, Some(6));
    }

    #[test]
    fn remember_in_nested_conditionals_is_rejected() {
        let mut ctx = enforcing();
        let err = ctx
            .preconditions(|ctx| ctx.conditionals(|ctx| ctx.remember_old_value("x", &1)))
            .unwrap_err();
        assert!(matches!(
            err,
            ContractError::Scope(ScopeError::Discipline {
                caller: WrapperKind::Conditionals
            })
        ));
    }

    #[test]
    fn leak_warning_resets_after_all_forgotten() {
        let mut ctx = ContractContext::with_config(ContractConfig {
            enforce_wrapped: true,
            leak_warning_threshold: NonZeroUsize::new(1),
            ..ContractConfig::default()
        });
        for function in ["first", "second"] {
            let mut call = ctx.enter(Frame::new("lib.rs", function)).unwrap();
            call.preconditions(|ctx| ctx.remember_old_value("x", &1)).unwrap();
        }
        assert_eq!(ctx.remembered_scope_count(), 2);
        assert!(ctx.leak_warned);

        for function in ["first", "second"] {
            let mut call = ctx.enter(Frame::new("lib.rs", function)).unwrap();
            call.postconditions(|ctx| {
                ctx.forget_old_values()?;
                Ok(())
            })
            .unwrap();
        }
        assert!(!ctx.leak_warned);
    }

    #[test]
    fn no_leak_warning_at_threshold() {
        let mut ctx = ContractContext::with_config(ContractConfig {
            enforce_wrapped: true,
            leak_warning_threshold: NonZeroUsize::new(1),
            ..ContractConfig::default()
        });
        ctx.preconditions(|ctx| ctx.remember_old_value("x", &1)).unwrap();
        assert!(!ctx.leak_warned);
    }

    #[test]
    fn scope_is_fixed_when_wrapper_starts() {
        let mut ctx = enforcing();
        let mut call = ctx.enter(Frame::new("lib.rs", "withdraw")).unwrap();
        call.preconditions(|ctx| {
            let outer = ctx.current_scope()?.key;
            let helper = ctx.enter(Frame::new("lib.rs", "helper"))?;
            assert_eq!(helper.depth(), 2);
            assert_eq!(helper.current_scope()?.key, outer);
            assert_eq!(outer.depth(), 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn panic_inside_block_still_pops_wrapper() {
        let mut ctx = enforcing();
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = ctx.preconditions(|_| panic!("block panicked"));
        }));
        assert!(caught.is_err());

        assert_eq!(ctx.current_scope(), Err(ScopeError::Resolution));
        assert!(matches!(
            ctx.remember_old_value("x", &1),
            Err(ContractError::Scope(ScopeError::Resolution))
        ));
        assert_eq!(ctx.remembered_scope_count(), 0);
    }
}
