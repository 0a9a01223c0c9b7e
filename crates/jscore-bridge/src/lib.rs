//! jscore-bridge - thread-affine bridge between a managed runtime and
//! JavaScriptCore contexts.
//!
//! The host (a managed runtime reached through a [`Boundary`]) drives a script
//! engine (an [`Engine`]) through a [`Bridge`]. Every context gets its own
//! dispatch pool from `jscore-dispatch`, so the engine only ever sees a
//! context from that context's worker threads, whichever thread the host
//! called from.
//!
//! # Architecture
//!
//! ```text
//! host thread ──▶ Bridge ──ContextHandle──▶ HandleTable ──▶ ContextWrapper
//!                   │                                         └─ DispatchQueue ──▶ Engine
//!                   └─ shared DispatchQueue (strings, groups) ───────────────────▶ Engine
//!
//! Engine ──hook──▶ CallbackRouter ──ObjectRef──▶ HandleRegistry ──HostRef──▶ Boundary
//! ```
//!
//! Engine-side objects, strings and values cross as pointer-sized handles
//! ([`refs`]). Operations that may throw return a [`ReturnObject`] carrying
//! the script exception next to the result.

mod boundary;
mod bridge;
mod callbacks;
mod config;
mod context;
mod engine;
mod error;
mod handles;
pub mod refs;
mod registry;

pub use boundary::{
    Arg, Boundary, CONSTRUCTOR_CALLBACK, CallbackMethod, FINALIZE_CALLBACK, FUNCTION_CALLBACK,
    HAS_INSTANCE_CALLBACK, HostRef, Invocation,
};
pub use bridge::{Bridge, ContextHandle};
pub use callbacks::CallbackRouter;
pub use config::BridgeConfig;
pub use context::ContextWrapper;
pub use engine::{ClassDefinition, ClassHooks, Engine, HostCallbacks};
pub use error::{BridgeError, BridgeResult};
pub use handles::{Handle, HandleTable};
pub use refs::{
    ClassRef, Completion, ContextGroupRef, ContextRef, ObjectKind, ObjectRef, PropertyAttributes,
    PropertyNameArrayRef, ReturnObject, StringRef, ValueRef, ValueType,
};
pub use registry::{HandleRegistry, HostKind, HostObject};
