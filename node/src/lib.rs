//! Meridian node: orchestrates the sub-block pipeline.
//!
//! The node is the coordinator that:
//! - Verifies and pools submitted transactions
//! - Cuts pooled transactions into sub-blocks
//! - Commits sub-blocks through the consensus engine into the ledger
//! - Exposes consensus administration and ledger queries
//! - Runs the periodic assemble → commit loop until shutdown

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod pipeline;
pub mod shutdown;
pub mod tracing_spans;

pub use config::{GenesisAccount, GenesisValidator, NodeConfig};
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::{Collaborators, MeridianNode};
pub use pipeline::spawn_pipeline;
pub use shutdown::ShutdownController;
