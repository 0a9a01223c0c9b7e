//! The managed-runtime side of the bridge
//!
//! When the engine calls back into a host-backed object, the bridge forwards
//! the call to the managed runtime through a [`Boundary`]. The contract is
//! deliberately narrow: invoke a named method with a fixed signature on a host
//! object, passing every handle as a 64-bit integer, and get one 64-bit
//! result back.

use std::fmt;

/// Reference to a host-side (managed runtime) object owned by the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostRef(pub u64);

impl fmt::Display for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host#{}", self.0)
    }
}

/// A callback method resolved by name and type signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackMethod {
    pub name: &'static str,
    pub signature: &'static str,
}

/// `finalizeCallback(object)`
pub const FINALIZE_CALLBACK: CallbackMethod = CallbackMethod {
    name: "finalizeCallback",
    signature: "(J)V",
};

/// `functionCallback(ctx, function, this, args[], exception)`
pub const FUNCTION_CALLBACK: CallbackMethod = CallbackMethod {
    name: "functionCallback",
    signature: "(JJJ[JJ)J",
};

/// `constructorCallback(ctx, constructor, args[], exception)`
pub const CONSTRUCTOR_CALLBACK: CallbackMethod = CallbackMethod {
    name: "constructorCallback",
    signature: "(JJ[JJ)J",
};

/// `hasInstanceCallback(ctx, constructor, candidate, exception)`
pub const HAS_INSTANCE_CALLBACK: CallbackMethod = CallbackMethod {
    name: "hasInstanceCallback",
    signature: "(JJJJ)Z",
};

/// One argument of a callback invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg<'a> {
    /// A handle or scalar as a fixed-width integer
    Long(i64),
    /// An argument list, count implied by the slice length
    LongArray(&'a [i64]),
    /// The exception out-slot; the host reports a thrown value through
    /// [`Invocation::exception`]
    Exception,
}

/// What the host returned from a callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Invocation {
    /// Method result; 0/1 for boolean methods, 0 for void ones
    pub result: i64,
    /// Value handle the host threw, 0 if none
    pub exception: i64,
}

impl Invocation {
    pub fn returned(result: i64) -> Self {
        Self {
            result,
            exception: 0,
        }
    }

    pub fn threw(exception: i64) -> Self {
        Self {
            result: 0,
            exception,
        }
    }
}

/// The external managed runtime.
///
/// Implementations must be callable from any thread; callbacks arrive on
/// whichever worker (or collector) thread the engine is running on.
pub trait Boundary: Send + Sync {
    /// Invoke `method` on `receiver`
    fn invoke(&self, receiver: HostRef, method: &CallbackMethod, args: &[Arg<'_>]) -> Invocation;

    /// Drop the bridge's reference to `host`; called once per registered object
    fn release_host(&self, host: HostRef);
}
