use sqlx::{PgPool, migrate::Migrator};

use crate::cache::CacheService;
use crate::memory::MemoryStore;

/// Compile-time discovered SQLx migrations for the `npn-database` crate.
pub static MIGRATOR: Migrator = sqlx::migrate!();

/// Where persisted state lives. Query modules match on this and run the
/// equivalent operation against either backend.
#[derive(Clone, Debug)]
pub enum Backend {
    Postgres(PgPool),
    Memory(MemoryStore),
}

/// Shared database handle passed across crates.
#[derive(Clone, Debug)]
pub struct Database {
    backend: Backend,
    cache: CacheService,
}

impl Database {
    /// Create a database handle from an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            backend: Backend::Postgres(pool),
            cache: CacheService::disabled("npn:prod"),
        }
    }

    /// Create a database handle from an existing pool and cache service.
    pub fn with_cache(pool: PgPool, cache: CacheService) -> Self {
        Self {
            backend: Backend::Postgres(pool),
            cache,
        }
    }

    /// Process-local store with the same semantics as Postgres. State is lost
    /// on restart.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(MemoryStore::default()),
            cache: CacheService::disabled("npn:memory"),
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Expose the underlying pool when running against Postgres.
    pub fn pool(&self) -> Option<&PgPool> {
        match &self.backend {
            Backend::Postgres(pool) => Some(pool),
            Backend::Memory(_) => None,
        }
    }

    /// Expose the cache service for query modules.
    pub fn cache(&self) -> &CacheService {
        &self.cache
    }
}
