//! Application-wide constants

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Default depth ceiling for a newly created tenant tree.
pub const DEFAULT_MAX_DEPTH: i32 = 5;
/// Hard upper bound a root may configure as its depth ceiling.
pub const MAX_TREE_DEPTH: i32 = 20;
/// Children-per-parent ceiling unless configured otherwise.
pub const DEFAULT_MAX_CHILDREN: i64 = 100;

pub const MIN_NAME_LENGTH: u64 = 2;
pub const MAX_NAME_LENGTH: u64 = 100;
pub const MIN_SLUG_LENGTH: usize = 2;
pub const MAX_SLUG_LENGTH: usize = 100;

/// Statement timeout applied to every repository transaction.
pub const DEFAULT_STATEMENT_TIMEOUT_MS: u64 = 5_000;

/// TTL for cached hierarchy reads (ancestors, descendants, children).
pub const HIERARCHY_CACHE_TTL_SECS: u64 = 120;
/// TTL for cached role lookups used by permission checks.
pub const ROLE_CACHE_TTL_SECS: u64 = 60;
