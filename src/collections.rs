//! Concurrent map aliases that switch between gxhash and std hashing
//! based on feature flags. This allows building on systems without specific
//! CPU intrinsics (AES-NI, SSE2) while providing better performance on systems
//! that support these features.

use dashmap::DashMap;

#[cfg(feature = "gxhash")]
pub use gxhash::GxBuildHasher;

/// Hasher type that uses GxBuildHasher when available, std otherwise
#[cfg(not(feature = "gxhash"))]
pub type GxBuildHasher = std::hash::RandomState;

/// DashMap keyed by entry identity, hashed with the fastest available hasher
pub type IdentityMap<V> = DashMap<String, V, GxBuildHasher>;

/// Create an empty [`IdentityMap`]
pub fn identity_map<V>() -> IdentityMap<V> {
    DashMap::with_hasher(GxBuildHasher::default())
}
