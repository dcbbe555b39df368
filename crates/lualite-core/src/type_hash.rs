//! Stable type identity for native classes.
//!
//! [`TypeHash`] is a 64-bit identifier used to key class descriptors. It is
//! derived from the type's `TypeId` through XXHash64 seeded with a domain
//! constant.
//!
//! ```
//! use lualite_core::TypeHash;
//!
//! struct Counter;
//!
//! assert_eq!(TypeHash::of::<Counter>(), TypeHash::of::<Counter>());
//! assert_ne!(TypeHash::of::<Counter>(), TypeHash::of::<i32>());
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

use xxhash_rust::xxh64::Xxh64;

/// Domain-specific mixing constants for hash computation.
pub mod hash_constants {
    /// Domain marker for hashes derived from a Rust `TypeId`
    pub const TYPE: u64 = 0x2fac10b63a6cc57c;
}

/// A 64-bit identity for a native type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeHash(pub u64);

impl TypeHash {
    /// Hash of a Rust type.
    ///
    /// The same type always produces the same hash within one build.
    pub fn of<T: Any + ?Sized>() -> Self {
        Self::of_type_id(TypeId::of::<T>())
    }

    /// Hash of the Rust type behind a `TypeId`, equal to `of::<T>()`.
    pub fn of_type_id(type_id: TypeId) -> Self {
        let mut hasher = Xxh64::new(hash_constants::TYPE);
        type_id.hash(&mut hasher);
        TypeHash(hasher.finish())
    }
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#018x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}
