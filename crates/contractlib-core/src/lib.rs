pub mod value;
pub mod scope;
pub mod error;

// Re-export commonly used types
pub use value::Value;
pub use scope::{Frame, ResolvedScope, ScopeKey, WrapperKind};
pub use error::{ContractError, ContractFailure, FailureKind, ScopeError, SnapshotError};
