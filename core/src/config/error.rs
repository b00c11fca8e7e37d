use thiserror::Error;

/// Errors raised while resolving a cluster config (§4.1, §7). `Cache`
/// failures are deliberately narrow: per the fallback-on-corruption policy,
/// callers that hit `Cache` should re-resolve rather than propagate it to
/// the user.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unsupported provider type `{0}`")]
    UnsupportedProvider(String),

    #[error("config validation failed: {0}")]
    Validation(String),

    #[error("config cache error: {0}")]
    Cache(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing dependency for runtime: {0}")]
    MissingDependency(String),
}
