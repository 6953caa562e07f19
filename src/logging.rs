//! Process-wide tracing subscriber setup.
#![forbid(unsafe_code)]

use tracing_subscriber::{fmt, EnvFilter};

use crate::types::{PenumbraError, Result};

/// Installs a formatting subscriber filtered by `level` (an `EnvFilter`
/// directive such as `"info"` or `"penumbra::db=debug"`).
///
/// Fails if the directive does not parse or a global subscriber is already set.
pub fn init_logging(level: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|e| PenumbraError::InvalidOwned(format!("invalid log level: {e}")))?,
        )
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|_| PenumbraError::Invalid("logging already initialized"))
}
