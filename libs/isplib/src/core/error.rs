// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

use crate::core::ports::PortDirection;

#[derive(Error, Debug)]
pub enum IspError {
    #[error("Port registration failed: {0}")]
    PortRegistration(String),

    #[error("Invalid {direction} port id: {port_id}")]
    InvalidPortId {
        direction: PortDirection,
        port_id: usize,
    },

    #[error("Unsupported conversion: {0}")]
    UnsupportedConversion(String),

    #[error("Incompatible port chain: {0}")]
    IncompatiblePortChain(String),

    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Frame unavailable: {0}")]
    FrameUnavailable(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// How far a failure propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// Affects one frame only; the pipeline skips it and continues.
    Frame,
    /// A rejected setting or conversion; prior state is retained.
    UserRecoverable,
    /// Blocks the plugin (and therefore the pipeline) from running.
    Fatal,
}

impl IspError {
    pub fn scope(&self) -> ErrorScope {
        match self {
            Self::FrameUnavailable(_) => ErrorScope::Frame,
            Self::UnsupportedConversion(_) | Self::InvalidState(_) => ErrorScope::UserRecoverable,
            _ => ErrorScope::Fatal,
        }
    }
}

pub type Result<T> = std::result::Result<T, IspError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_classification() {
        assert_eq!(
            IspError::FrameUnavailable("eof".into()).scope(),
            ErrorScope::Frame
        );
        assert_eq!(
            IspError::UnsupportedConversion("GRAY8 -> BGR48".into()).scope(),
            ErrorScope::UserRecoverable
        );
        assert_eq!(
            IspError::ResourceUnavailable("Not exist table file".into()).scope(),
            ErrorScope::Fatal
        );
        assert_eq!(
            IspError::PortRegistration("relation (0, 3)".into()).scope(),
            ErrorScope::Fatal
        );
    }

    #[test]
    fn test_invalid_port_id_message() {
        let err = IspError::InvalidPortId {
            direction: PortDirection::Output,
            port_id: 4,
        };
        assert_eq!(err.to_string(), "Invalid output port id: 4");
    }
}
