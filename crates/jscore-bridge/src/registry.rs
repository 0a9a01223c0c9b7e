//! Registry of host-backed engine objects
//!
//! Maps engine object handles to the host record that owns them, so an
//! engine-invoked callback can find its way back to the managed runtime.
//!
//! Entries are `Arc<HostObject>`. A lookup clones the `Arc` while the shard
//! lock is held and returns after releasing it; whatever the caller then does
//! with the record (including re-entering the host) runs without any registry
//! lock, and a concurrent `unregister` cannot free the record underneath it.

use crate::boundary::HostRef;
use crate::refs::{ClassRef, ContextRef, ObjectRef};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{trace, warn};

/// Which host API created the object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    /// Plain object with a finalizer
    Instance,
    /// Callable object forwarding calls to the host
    Function,
}

/// Host-side record for one engine object
#[derive(Debug)]
pub struct HostObject {
    object: ObjectRef,
    class: ClassRef,
    host: HostRef,
    kind: HostKind,
    context: ContextRef,
    torn_down: AtomicBool,
}

impl HostObject {
    pub fn new(
        object: ObjectRef,
        class: ClassRef,
        host: HostRef,
        kind: HostKind,
        context: ContextRef,
    ) -> Self {
        Self {
            object,
            class,
            host,
            kind,
            context,
            torn_down: AtomicBool::new(false),
        }
    }

    pub fn object(&self) -> ObjectRef {
        self.object
    }

    pub fn class(&self) -> ClassRef {
        self.class
    }

    pub fn host(&self) -> HostRef {
        self.host
    }

    pub fn kind(&self) -> HostKind {
        self.kind
    }

    /// Context the object was created in
    pub fn context(&self) -> ContextRef {
        self.context
    }

    /// Claim the right to tear this record down.
    ///
    /// Returns `true` exactly once over the record's lifetime.
    pub fn begin_teardown(&self) -> bool {
        !self.torn_down.swap(true, Ordering::AcqRel)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }
}

/// Concurrent map from engine object handle to its host record
#[derive(Debug, Default)]
pub struct HandleRegistry {
    entries: DashMap<ObjectRef, Arc<HostObject>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `record` under its object handle.
    ///
    /// Registering a handle twice is a caller bug; the newer record wins.
    pub fn register(&self, record: Arc<HostObject>) {
        let object = record.object();
        if let Some(previous) = self.entries.insert(object, record) {
            warn!(
                %object,
                previous_host = %previous.host(),
                "Handle registered twice, replacing previous record"
            );
        } else {
            trace!(%object, "Handle registered");
        }
    }

    /// Find the record for `object`.
    ///
    /// `None` is normal for objects whose record was already finalized.
    pub fn lookup(&self, object: ObjectRef) -> Option<Arc<HostObject>> {
        self.entries.get(&object).map(|entry| entry.value().clone())
    }

    /// Remove and return the record for `object`
    pub fn unregister(&self, object: ObjectRef) -> Option<Arc<HostObject>> {
        let removed = self.entries.remove(&object).map(|(_, record)| record);
        if removed.is_some() {
            trace!(%object, "Handle unregistered");
        }
        removed
    }

    /// Whether `object` has a live record
    pub fn contains(&self, object: ObjectRef) -> bool {
        self.entries.contains_key(&object)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
