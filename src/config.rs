use crate::app::{PROVIDER_MEMORY, PROVIDER_SURREAL};
use crate::error::RetrievalError;
use crate::retrieval::multihop::TraversalDepth;
use clap::{Parser, Subcommand};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file picked up from the working directory when none is given.
const DEFAULT_CONFIG_FILE: &str = "graph-retriever.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE", global = true)]
    pub config: Option<String>,

    /// Graph store URL
    #[arg(long, env = "GRAPH_STORE_URL", global = true)]
    pub graph_url: Option<String>,

    /// Cache store URL
    #[arg(long, env = "CACHE_URL", global = true)]
    pub cache_url: Option<String>,

    /// Enable or disable the query cache
    #[arg(long, env = "CACHE_ENABLED", global = true)]
    pub cache_enabled: Option<bool>,

    /// Maximum multi-hop traversal depth (1-5)
    #[arg(long, env = "MAX_DEPTH", global = true)]
    pub max_depth: Option<u8>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Retrieve passages for a natural-language question
    Query {
        /// Question text
        text: String,
        /// Pre-extracted entity (repeatable); skips entity extraction
        #[arg(short, long = "entity")]
        entities: Vec<String>,
        /// Maximum number of documents to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Multi-hop depth for this request only
        #[arg(long = "depth")]
        depth: Option<u8>,
    },
    /// Delete cached entries matching a glob pattern
    Invalidate { pattern: String },
    /// Delete every cached entry under the configured namespace
    Clear,
    /// Print cache statistics
    Stats,
    /// Reset cache hit/miss counters
    ResetStats,
    /// Pre-populate the cache from a JSON or YAML file of warm entries
    Warm { file: PathBuf },
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub graph_store: GraphStoreConfig,
    pub cache: CacheConfig,
    pub retrieval: RetrievalConfig,
    pub ner: NerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphStoreConfig {
    /// `surreal` or `memory`
    pub provider: String,
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Graph fixture for the `memory` provider
    pub fixture_path: Option<String>,
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub url: String,
    /// Prefix of every cache key
    pub namespace: String,
    pub default_ttl_secs: u64,
    /// SCAN batch size
    pub scan_count: usize,
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    pub max_depth: u8,
    pub top_k: usize,
    pub max_top_k: usize,
    /// Per-strategy result limit
    pub strategy_limit: usize,
    pub direct_timeout_ms: u64,
    pub expansion_timeout_ms: u64,
    pub multihop_timeout_ms: u64,
    /// Overall deadline for one retrieval call
    pub request_timeout_ms: u64,
    pub cache_ttl_secs: u64,
    /// Additional case-insensitive surface patterns for entity extraction
    #[serde(default)]
    pub extra_patterns: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NerConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
}

impl RetrievalConfig {
    pub fn direct_timeout(&self) -> Duration {
        Duration::from_millis(self.direct_timeout_ms)
    }

    pub fn expansion_timeout(&self) -> Duration {
        Duration::from_millis(self.expansion_timeout_ms)
    }

    pub fn multihop_timeout(&self) -> Duration {
        Duration::from_millis(self.multihop_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            top_k: 10,
            max_top_k: 100,
            strategy_limit: 20,
            direct_timeout_ms: 5_000,
            expansion_timeout_ms: 5_000,
            multihop_timeout_ms: 10_000,
            request_timeout_ms: 15_000,
            cache_ttl_secs: 300,
            extra_patterns: Vec::new(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "redis://localhost:6379/1".to_string(),
            namespace: "graph:query:".to_string(),
            default_ttl_secs: 300,
            scan_count: 100,
            connect_timeout_ms: 2_000,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, RetrievalError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, RetrievalError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Self::from_cli(&cli)
    }

    pub fn from_cli(cli: &Cli) -> Result<Self, RetrievalError> {
        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("graph_store.provider", "surreal")?
            .set_default("graph_store.url", "ws://localhost:8000")?
            .set_default("graph_store.namespace", "graph")?
            .set_default("graph_store.database", "graph")?
            .set_default("graph_store.connect_timeout_ms", 5_000)?
            .set_default("cache.enabled", true)?
            .set_default("cache.url", "redis://localhost:6379/1")?
            .set_default("cache.namespace", "graph:query:")?
            .set_default("cache.default_ttl_secs", 300)?
            .set_default("cache.scan_count", 100)?
            .set_default("cache.connect_timeout_ms", 2_000)?
            .set_default("retrieval.max_depth", 3)?
            .set_default("retrieval.top_k", 10)?
            .set_default("retrieval.max_top_k", 100)?
            .set_default("retrieval.strategy_limit", 20)?
            .set_default("retrieval.direct_timeout_ms", 5_000)?
            .set_default("retrieval.expansion_timeout_ms", 5_000)?
            .set_default("retrieval.multihop_timeout_ms", 10_000)?
            .set_default("retrieval.request_timeout_ms", 15_000)?
            .set_default("retrieval.cache_ttl_secs", 300)?
            .set_default("ner.enabled", false)?
            .set_default("ner.base_url", "http://localhost:8080")?
            .set_default("ner.timeout_ms", 2_000)?
            .set_default("logging.filter", "info,graph_retriever=debug")?
            .set_default("logging.json", false)?;

        // 2. Config file: explicit path must exist, the cwd default is optional
        match &cli.config {
            Some(path) => builder = builder.add_source(File::from(Path::new(path))),
            None => {
                builder = builder.add_source(File::from(Path::new(DEFAULT_CONFIG_FILE)).required(false));
            }
        }

        // 3. Environment variables (prefixed with GR_), e.g. GR_RETRIEVAL__MAX_DEPTH=4
        builder = builder.add_source(
            Environment::with_prefix("GR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags (and their env aliases, resolved by clap)
        if let Some(url) = &cli.graph_url {
            builder = builder.set_override("graph_store.url", url.as_str())?;
        }
        if let Some(url) = &cli.cache_url {
            builder = builder.set_override("cache.url", url.as_str())?;
        }
        if let Some(enabled) = cli.cache_enabled {
            builder = builder.set_override("cache.enabled", enabled)?;
        }
        if let Some(depth) = cli.max_depth {
            builder = builder.set_override("retrieval.max_depth", u64::from(depth))?;
        }

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make retrieval unsafe or meaningless.
    pub fn validate(&self) -> Result<(), RetrievalError> {
        TraversalDepth::new(self.retrieval.max_depth)?;
        if ![PROVIDER_SURREAL, PROVIDER_MEMORY].contains(&self.graph_store.provider.as_str()) {
            return Err(RetrievalError::InvalidRequest(format!(
                "graph_store.provider must be `{PROVIDER_SURREAL}` or `{PROVIDER_MEMORY}`, got `{}`",
                self.graph_store.provider
            )));
        }
        if self.retrieval.strategy_limit == 0 {
            return Err(RetrievalError::InvalidRequest(
                "retrieval.strategy_limit must be at least 1".to_string(),
            ));
        }
        if self.retrieval.top_k > self.retrieval.max_top_k {
            return Err(RetrievalError::InvalidRequest(format!(
                "retrieval.top_k ({}) exceeds retrieval.max_top_k ({})",
                self.retrieval.top_k, self.retrieval.max_top_k
            )));
        }
        Ok(())
    }
}
