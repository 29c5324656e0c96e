//! Deterministic hash-based identity for registered entities.
//!
//! [`TypeHash`] is a 64-bit hash computed from names, used as the key for
//! types, methods, and global functions in the registry. Hashes are
//! deterministic, so a key can be computed before the entity it refers to is
//! registered: base chains may name types that only register later, and the
//! lookup side never depends on registration order.
//!
//! Domain constants keep the hash spaces for types, methods, and globals
//! disjoint, so a type named `print` never collides with a global function
//! of the same name.

use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Domain-specific mixing constants for hash computation.
mod hash_constants {
    /// Domain marker for type hashes
    pub const TYPE: u64 = 0x2fac10b63a6cc57c;

    /// Domain marker for global function hashes
    pub const FUNCTION: u64 = 0x5ea77ffbcdf5f302;

    /// Domain marker for method hashes
    pub const METHOD: u64 = 0x7d3c8b4a92e15f6d;
}

/// A deterministic 64-bit hash identifying a type, method, or global function.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeHash(pub u64);

impl TypeHash {
    /// Empty/invalid hash constant.
    pub const EMPTY: TypeHash = TypeHash(0);

    /// Create a type hash from a registered type name.
    ///
    /// The same name always produces the same hash.
    #[inline]
    pub fn from_name(name: &str) -> Self {
        TypeHash(hash_constants::TYPE ^ xxh64(name.as_bytes(), 0))
    }

    /// Create a method hash from the owning type's hash and the method name.
    ///
    /// Methods are distinguished from global functions and from same-named
    /// methods on other types by incorporating the owner hash.
    #[inline]
    pub fn from_method(owner: TypeHash, name: &str) -> Self {
        TypeHash(hash_constants::METHOD ^ owner.0 ^ xxh64(name.as_bytes(), 0))
    }

    /// Create a global function hash from its name.
    #[inline]
    pub fn from_global(name: &str) -> Self {
        TypeHash(hash_constants::FUNCTION ^ xxh64(name.as_bytes(), 0))
    }

    /// Check if this is an empty/invalid hash.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Get the underlying u64 value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_hash_determinism() {
        assert_eq!(TypeHash::from_name("Point"), TypeHash::from_name("Point"));
        assert_eq!(
            TypeHash::from_method(TypeHash::from_name("Point"), "move"),
            TypeHash::from_method(TypeHash::from_name("Point"), "move"),
        );
    }

    #[test]
    fn type_hash_uniqueness() {
        assert_ne!(TypeHash::from_name("Point"), TypeHash::from_name("Actor"));
        assert_ne!(TypeHash::from_name("Point"), TypeHash::from_name("point"));
    }

    #[test]
    fn method_hash_includes_owner() {
        let point = TypeHash::from_name("Point");
        let actor = TypeHash::from_name("Actor");
        assert_ne!(
            TypeHash::from_method(point, "update"),
            TypeHash::from_method(actor, "update"),
        );
    }

    #[test]
    fn domains_are_disjoint() {
        // A type, a global, and a method sharing one name must not collide.
        let ty = TypeHash::from_name("print");
        let global = TypeHash::from_global("print");
        let method = TypeHash::from_method(ty, "print");
        assert_ne!(ty, global);
        assert_ne!(ty, method);
        assert_ne!(global, method);
    }

    #[test]
    fn empty_hash() {
        assert!(TypeHash::EMPTY.is_empty());
        assert!(!TypeHash::from_name("Point").is_empty());
    }

    #[test]
    fn hash_display_and_debug() {
        let hash = TypeHash::from_name("Point");
        assert!(format!("{}", hash).starts_with("0x"));
        assert!(format!("{:?}", hash).starts_with("TypeHash(0x"));
    }
}
