//! Configuration management

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub app: AppSettings,
    pub database: DatabaseSettings,
    pub hierarchy: HierarchySettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    pub env: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub statement_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HierarchySettings {
    /// Default depth ceiling applied to new roots that do not specify one.
    pub default_max_depth: i32,
    /// Children-per-parent ceiling.
    pub max_children_per_parent: i64,
    /// When true, slugs are unique across the whole tenant space instead of
    /// per-parent.
    pub global_slug_scope: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    pub hierarchy_ttl_secs: u64,
    pub role_ttl_secs: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".into());
        let config = Config::builder()
            .set_default("app.env", "development")?
            .set_default("app.name", "tenancy-core")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 1)?
            .set_default(
                "database.statement_timeout_ms",
                i64::try_from(super::constants::DEFAULT_STATEMENT_TIMEOUT_MS)
                    .unwrap_or(5_000),
            )?
            .set_default(
                "hierarchy.default_max_depth",
                i64::from(super::constants::DEFAULT_MAX_DEPTH),
            )?
            .set_default(
                "hierarchy.max_children_per_parent",
                super::constants::DEFAULT_MAX_CHILDREN,
            )?
            .set_default("hierarchy.global_slug_scope", false)?
            .set_default(
                "cache.hierarchy_ttl_secs",
                i64::try_from(super::constants::HIERARCHY_CACHE_TTL_SECS).unwrap_or(120),
            )?
            .set_default(
                "cache.role_ttl_secs",
                i64::try_from(super::constants::ROLE_CACHE_TTL_SECS).unwrap_or(60),
            )?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::default().separator("__").try_parsing(true))
            .build()?;
        config.try_deserialize()
    }
}
