//! Error types for the physics server
//!
//! Only handle-validity and precondition failures surface here. Geometry and
//! solver degradation is absorbed where it happens and shows up as
//! conservative query results instead.

use thiserror::Error;

use crate::config::ConfigError;
use crate::rid::Rid;

/// Result alias used by every server entry point
pub type PhysicsResult<T> = Result<T, PhysicsError>;

/// Errors returned by the physics server
#[derive(Error, Debug)]
pub enum PhysicsError {
    /// The handle does not resolve to a live object of the expected kind
    #[error("invalid {kind} handle: {rid:?}")]
    InvalidHandle {
        /// Expected object kind
        kind: &'static str,
        /// The offending handle
        rid: Rid,
    },

    /// The handle resolves, but to an object of another kind
    #[error("{rid:?} is not a {expected}")]
    WrongKind {
        /// Expected kind
        expected: &'static str,
        /// The offending handle
        rid: Rid,
    },

    /// A value or state precondition was violated
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The space is being stepped and cannot be mutated or queried
    #[error("space is locked while the solver runs")]
    SpaceLocked,

    /// The operation is not allowed from inside `flush_queries`
    #[error("cannot change this state while flushing queries")]
    FlushingQueries,

    /// Direct state access outside of the sync window
    #[error("direct state is only available between sync() and end_sync()")]
    DirectStateUnavailable,

    /// A motion query asked for more contacts than the result buffer holds
    #[error("max_collisions {requested} out of range 1..={max}")]
    TooManyCollisions {
        /// Requested count
        requested: usize,
        /// Largest supported count
        max: usize,
    },

    /// Configuration could not be loaded or failed validation
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PhysicsError {
    /// Shorthand for a precondition failure
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }
}

/// Return early with `$err` (logged at error level) unless `$cond` holds
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            let err: $crate::error::PhysicsError = $err;
            log::error!("{}", err);
            return Err(err);
        }
    };
}
