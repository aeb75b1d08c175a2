use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] lyra_core::Error),
    #[error(transparent)]
    Config(#[from] lyra_core::ConfigError),
    #[error(transparent)]
    Sync(#[from] lyra_core::SyncError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(
        "Sync is not configured. Set LYRA_API_BASE_URL (and LYRA_AUTH_TOKEN) to enable `lyra sync`."
    )]
    SyncNotConfigured,
}
