//! # pullfeed-rpc
//!
//! Chain node access for the convergence engine.
//!
//! ## Modules
//!
//! - [`node`]: the [`ChainNode`] seam and the [`CallRequest`] it simulates
//! - [`http`]: [`HttpNode`], a JSON-RPC client over HTTP

pub mod http;
pub mod node;

pub use http::HttpNode;
pub use node::{CallRequest, ChainNode};

use alloy_primitives::Bytes;

/// Error types for chain node access.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum NodeError {
    /// The simulated call reverted with `data`.
    #[error("execution reverted: {message}")]
    Reverted {
        /// Raw revert bytes.
        data: Bytes,
        /// Node-supplied message.
        message: String,
    },

    /// The node answered with a JSON-RPC error carrying no revert data.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// The node could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// The node answered with something that is not a valid response.
    #[error("invalid node response: {0}")]
    InvalidResponse(String),
}

impl NodeError {
    /// Revert bytes, if this is a revert.
    pub fn revert_data(&self) -> Option<&Bytes> {
        match self {
            Self::Reverted { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Node-supplied message, if any.
    pub fn message(&self) -> &str {
        match self {
            Self::Reverted { message, .. } | Self::Rpc { message, .. } => message,
            Self::Transport(message) | Self::InvalidResponse(message) => message,
        }
    }
}

/// Result type alias for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
