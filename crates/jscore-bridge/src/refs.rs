//! Pointer-sized engine handles and the fixed-shape return record
//!
//! Every engine object crosses the boundary as a pointer-sized integer. Each
//! kind gets its own newtype so a string handle cannot be passed where a
//! context is expected; all of them are `#[repr(transparent)]` over `usize`.

use std::fmt;

macro_rules! raw_ref {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
        pub struct $name(pub usize);

        impl $name {
            /// The null handle
            pub const NULL: Self = Self(0);

            /// Whether this is the null handle
            pub fn is_null(self) -> bool {
                self.0 == 0
            }

            /// Boundary encoding (a signed 64-bit integer)
            pub fn as_raw(self) -> i64 {
                self.0 as i64
            }

            /// Decode from the boundary encoding
            pub fn from_raw(raw: i64) -> Self {
                Self(raw as usize)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }
    };
}

raw_ref!(
    /// A context group (shared heap for several contexts)
    ContextGroupRef
);
raw_ref!(
    /// A global script context
    ContextRef
);
raw_ref!(
    /// Any script value
    ValueRef
);
raw_ref!(
    /// A script object; every object is also a value
    ObjectRef
);
raw_ref!(
    /// An engine string
    StringRef
);
raw_ref!(
    /// A class descriptor
    ClassRef
);
raw_ref!(PropertyNameArrayRef);

impl From<ObjectRef> for ValueRef {
    fn from(object: ObjectRef) -> Self {
        Self(object.0)
    }
}

/// Property attribute bit set
pub type PropertyAttributes = u32;
/// No attributes
pub const PROPERTY_ATTRIBUTE_NONE: PropertyAttributes = 0;
/// Assignment is ignored
pub const PROPERTY_ATTRIBUTE_READ_ONLY: PropertyAttributes = 1 << 1;
/// Hidden from property enumeration
pub const PROPERTY_ATTRIBUTE_DONT_ENUM: PropertyAttributes = 1 << 2;
/// Deletion is refused
pub const PROPERTY_ATTRIBUTE_DONT_DELETE: PropertyAttributes = 1 << 3;

/// Type tag of a script value, numbered as the engine numbers them
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Undefined = 0,
    Null = 1,
    Boolean = 2,
    Number = 3,
    String = 4,
    Object = 5,
    Symbol = 6,
}

/// Built-in object kinds constructible from an argument list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Array,
    Date,
    Error,
    RegExp,
}

/// Result of an engine call that may throw.
///
/// A thrown script exception is not an error of the bridge; it travels next
/// to the (then usually null) value and the caller decides what to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Completion<T> {
    pub value: T,
    pub exception: Option<ValueRef>,
}

impl<T> Completion<T> {
    /// A completion without exception
    pub fn ok(value: T) -> Self {
        Self {
            value,
            exception: None,
        }
    }

    /// A completion carrying a thrown exception
    pub fn thrown(value: T, exception: ValueRef) -> Self {
        Self {
            value,
            exception: Some(exception),
        }
    }

    /// Whether an exception was thrown
    pub fn is_thrown(&self) -> bool {
        self.exception.is_some()
    }
}

/// Fixed-shape compound result handed back across the boundary.
///
/// Exactly one of `boolean`, `number` or `reference` is meaningful for a given
/// operation; `exception` is 0 unless the engine threw.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReturnObject {
    pub boolean: bool,
    pub number: f64,
    pub reference: i64,
    pub exception: i64,
}

impl ReturnObject {
    /// The exception as a value handle, if one was thrown
    pub fn exception(&self) -> Option<ValueRef> {
        (self.exception != 0).then(|| ValueRef::from_raw(self.exception))
    }
}

/// A value that fits one slot of a [`ReturnObject`]
pub trait ReturnField {
    /// Write `self` into its slot of `out`
    fn store(self, out: &mut ReturnObject);
}

impl ReturnField for () {
    fn store(self, _out: &mut ReturnObject) {}
}

impl ReturnField for bool {
    fn store(self, out: &mut ReturnObject) {
        out.boolean = self;
    }
}

impl ReturnField for f64 {
    fn store(self, out: &mut ReturnObject) {
        out.number = self;
    }
}

impl ReturnField for ValueRef {
    fn store(self, out: &mut ReturnObject) {
        out.reference = self.as_raw();
    }
}

impl ReturnField for ObjectRef {
    fn store(self, out: &mut ReturnObject) {
        out.reference = self.as_raw();
    }
}

impl ReturnField for StringRef {
    fn store(self, out: &mut ReturnObject) {
        out.reference = self.as_raw();
    }
}

impl<T: ReturnField> From<Completion<T>> for ReturnObject {
    fn from(completion: Completion<T>) -> Self {
        let mut out = ReturnObject {
            exception: completion.exception.map_or(0, ValueRef::as_raw),
            ..Default::default()
        };
        completion.value.store(&mut out);
        out
    }
}
