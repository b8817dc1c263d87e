//! Mempool: where submitted transactions wait and sub-blocks are cut.
//!
//! ## Module overview
//!
//! - [`records`]: Arena of canonical transaction state keyed by id.
//! - [`pool`]: Concurrent FIFO holding area with atomic batch draining.
//! - [`assembler`]: Cuts pooled transactions into Draft sub-blocks and
//!   tracks them until they are committed or released.
//! - [`error`]: Mempool error types.

pub mod assembler;
pub mod error;
pub mod pool;
pub mod records;

pub use assembler::{AssemblerConfig, BatchPolicy, SubBlockAssembler};
pub use error::MempoolError;
pub use pool::{TransactionPool, DEFAULT_POOL_CAPACITY};
pub use records::TransactionRecordStore;
