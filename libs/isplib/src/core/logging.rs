// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Console logging setup for binaries and tests.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Filter variable consulted first; `RUST_LOG` is the fallback.
pub const LOG_ENV_VAR: &str = "ISPLIB_LOG";

/// Directive used when neither variable is set.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Build the filter from `ISPLIB_LOG`, then `RUST_LOG`, then `default_directive`.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    [LOG_ENV_VAR, EnvFilter::DEFAULT_ENV]
        .into_iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.trim().is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directive))
}

/// Install a stderr fmt subscriber. Returns false if one was already set.
pub fn init() -> bool {
    init_with_default(DEFAULT_DIRECTIVE)
}

pub fn init_with_default(default_directive: &str) -> bool {
    let installed = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(env_filter(default_directive))
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!("[logging] subscriber installed");
    }
    installed
}
