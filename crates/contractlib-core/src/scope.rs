//! Scope identity for old-value memory.
//!
//! A [`ScopeKey`] names one logical call: the chain of [`Frame`]s, outermost
//! first, that were active when a contract wrapper ran. Frames carry the
//! source unit and the function path but never a line number, so the
//! precondition block and the postcondition block of the same call resolve
//! to the same key.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::ScopeError;

/// One entry of the contract call chain: a function inside a source unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Frame {
    unit: Cow<'static, str>,
    function: Cow<'static, str>,
}

impl Frame {
    pub fn new(
        unit: impl Into<Cow<'static, str>>,
        function: impl Into<Cow<'static, str>>,
    ) -> Self {
        Frame {
            unit: unit.into(),
            function: function.into(),
        }
    }

    /// Builds a frame from a compile-time type path, as produced by
    /// [`call_site!`](crate::call_site).
    ///
    /// Strips the marker item and any trailing `{{closure}}` segments so a
    /// call site inside a closure names the enclosing function.
    pub fn from_function_path(unit: &'static str, path: &'static str) -> Self {
        let mut function = path.strip_suffix("::__call_site").unwrap_or(path);
        while let Some(outer) = function.strip_suffix("::{{closure}}") {
            function = outer;
        }
        Frame::new(unit, function)
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn function(&self) -> &str {
        &self.function
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.function, self.unit)
    }
}

/// Captures the enclosing function as a line-free [`Frame`].
///
/// Two invocations in the same function produce equal frames regardless of
/// the line they sit on.
#[macro_export]
macro_rules! call_site {
    () => {{
        fn __call_site() {}
        fn __type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        $crate::scope::Frame::from_function_path(file!(), __type_name_of(__call_site))
    }};
}

/// Identity of one logical call, built from the full frame chain.
///
/// Comparing whole chains keeps two call paths apart even when they share
/// their innermost frame, and gives each recursion depth its own key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeKey(SmallVec<[Frame; 4]>);

impl ScopeKey {
    /// The key used when no frame has been entered.
    pub fn root() -> Self {
        ScopeKey::default()
    }

    pub fn from_frames<I: IntoIterator<Item = Frame>>(frames: I) -> Self {
        ScopeKey(frames.into_iter().collect())
    }

    /// Frames, outermost first.
    pub fn frames(&self) -> &[Frame] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        for (i, frame) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{}", frame)?;
        }
        Ok(())
    }
}

/// The wrapper that gates a block of contract checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WrapperKind {
    Preconditions,
    Postconditions,
    Conditionals,
}

impl WrapperKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WrapperKind::Preconditions => "Preconditions",
            WrapperKind::Postconditions => "Postconditions",
            WrapperKind::Conditionals => "Conditionals",
        }
    }
}

impl fmt::Display for WrapperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of scope resolution: the innermost active wrapper plus the key of
/// the call it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedScope {
    pub caller: WrapperKind,
    pub key: ScopeKey,
}

impl ResolvedScope {
    /// Old values may only be recorded from a precondition block.
    pub fn ensure_recording(&self) -> Result<(), ScopeError> {
        match self.caller {
            WrapperKind::Preconditions => Ok(()),
            caller => Err(ScopeError::Discipline { caller }),
        }
    }
}
