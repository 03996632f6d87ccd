use parking_lot::RwLock;

use crate::core::stream::Stream;

#[cfg(feature = "ahash")]
pub(crate) use ahash::AHashMap as Map;
#[cfg(not(feature = "ahash"))]
pub(crate) use std::collections::HashMap as Map;

/// stream hash -> stream
pub(crate) type Streams = Map<u64, Stream>;
/// partition -> streams
pub(crate) type Partitions = Map<i32, Streams>;
/// tenant -> partitions
pub(crate) type Tenants = Map<String, Partitions>;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// One independently locked slice of the tenant space
///
/// Aligned to a cache line so neighbouring locks in the shard table do not
/// share one.
#[repr(align(64))]
pub(crate) struct Shard {
    pub(crate) tenants: RwLock<Tenants>,
}

impl Shard {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Shard {
            tenants: RwLock::new(Map::with_capacity(capacity)),
        }
    }
}

/// 32-bit FNV-1a over the tenant id
///
/// Deterministic across processes and builds, so a tenant always lands in
/// the same shard for a given shard count.
#[inline]
pub(crate) fn fnv1a(tenant: &str) -> u32 {
    tenant.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    })
}
