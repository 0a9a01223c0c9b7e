//! Generation-checked handle table for host-visible records
//!
//! The host refers to bridge-side records (context wrappers) by integer
//! handles. A [`HandleTable`] hands those out and resolves them back. Each
//! handle carries the generation of its slot, so a handle used after its
//! record was removed is detected instead of silently resolving to whatever
//! reused the slot.
//!
//! ## Example
//!
//! ```
//! use jscore_bridge::HandleTable;
//!
//! let table = HandleTable::new();
//! let handle = table.insert("context");
//! assert_eq!(*table.get(handle).unwrap(), "context");
//!
//! table.remove(handle);
//! assert!(table.get(handle).is_none());
//! ```

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Opaque host-side handle: slot index plus slot generation.
///
/// The raw value is never 0, so 0 can stand for "no handle" on the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    fn new(index: usize, generation: u32) -> Self {
        Self((u64::from(generation) << 32) | (index as u64 + 1))
    }

    fn index(self) -> Option<usize> {
        let low = (self.0 & 0xffff_ffff) as usize;
        low.checked_sub(1)
    }

    fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Boundary encoding
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Decode from the boundary encoding.
    ///
    /// No validation happens here; a bogus value simply fails to resolve.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<Arc<T>>,
}

struct Slots<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    live: usize,
}

/// Thread-safe slab of records addressed by generation-checked [`Handle`]s.
///
/// Records are stored as `Arc<T>`: [`get`](HandleTable::get) hands out a
/// clone, so a record stays alive for whoever resolved it even if it is
/// removed from the table concurrently.
pub struct HandleTable<T> {
    inner: Mutex<Slots<T>>,
}

impl<T> HandleTable<T> {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Slots {
                slots: Vec::new(),
                free: Vec::new(),
                live: 0,
            }),
        }
    }

    /// Store a record and return its handle
    pub fn insert(&self, value: T) -> Handle {
        self.insert_arc(Arc::new(value))
    }

    /// Store an already shared record
    pub fn insert_arc(&self, value: Arc<T>) -> Handle {
        let mut inner = self.inner.lock();
        inner.live += 1;
        if let Some(index) = inner.free.pop() {
            let slot = &mut inner.slots[index];
            slot.value = Some(value);
            return Handle::new(index, slot.generation);
        }
        let index = inner.slots.len();
        inner.slots.push(Slot {
            generation: 1,
            value: Some(value),
        });
        Handle::new(index, 1)
    }

    /// Resolve a handle, `None` if it is unknown or stale
    pub fn get(&self, handle: Handle) -> Option<Arc<T>> {
        let index = handle.index()?;
        let inner = self.inner.lock();
        let slot = inner.slots.get(index)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.clone()
    }

    /// Remove a record. The slot's generation is bumped so the handle
    /// becomes stale.
    pub fn remove(&self, handle: Handle) -> Option<Arc<T>> {
        let index = handle.index()?;
        let mut inner = self.inner.lock();
        let slot = inner.slots.get_mut(index)?;
        if slot.generation != handle.generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1).max(1);
        inner.free.push(index);
        inner.live -= 1;
        Some(value)
    }

    /// Whether the handle currently resolves
    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.inner.lock().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every record, returning them
    pub fn drain(&self) -> Vec<Arc<T>> {
        let mut inner = self.inner.lock();
        let mut drained = Vec::with_capacity(inner.live);
        let Slots { slots, free, live } = &mut *inner;
        for (index, slot) in slots.iter_mut().enumerate() {
            if let Some(value) = slot.value.take() {
                slot.generation = slot.generation.wrapping_add(1).max(1);
                free.push(index);
                drained.push(value);
            }
        }
        *live = 0;
        drained
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for HandleTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("HandleTable")
            .field("live", &inner.live)
            .field("slots", &inner.slots.len())
            .finish()
    }
}
