//! Memoized external lookups
//!
//! Lookups whose answer does not change for the lifetime of an account or
//! VPC (the account ID behind a set of credentials, the CIDR of a VPC) are
//! cached in process-scoped objects created once at boot and shared by
//! reference with every resource that needs them. Each key performs its
//! remote call at most once per TTL window; concurrent callers for the same
//! key wait for the first one instead of racing it, and failed lookups are
//! not cached.

mod account_id;
mod vpc_cidr;

use std::time::Duration;

use moka::future::Cache;

pub use account_id::{parse_account_id, validate_account_id, AccountIdCache};
pub use vpc_cidr::VpcCidrCache;

/// Default lifetime of a cached lookup.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

fn lookup_cache(ttl: Duration) -> Cache<String, String> {
    Cache::builder().time_to_live(ttl).build()
}

/// The process-scoped caches injected into the resources at boot.
pub struct LookupCaches {
    pub account_id: AccountIdCache,
    pub vpc_cidr: VpcCidrCache,
}

impl LookupCaches {
    pub fn new(ttl: Duration) -> Self {
        Self {
            account_id: AccountIdCache::new(ttl),
            vpc_cidr: VpcCidrCache::new(ttl),
        }
    }
}

impl Default for LookupCaches {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}
