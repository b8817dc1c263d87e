//! Pre-built [`tracing::Span`] constructors for common pipeline operations.
//!
//! Consistent span names and field sets make it easy to filter and
//! correlate one transaction's or sub-block's journey through the logs.

use meridian_types::{SubBlockId, TxId};
use tracing::{info_span, Span};

/// Span covering verification and admission of one submitted transaction.
pub fn submit_span(tx: &TxId) -> Span {
    info_span!("submit", tx = %tx)
}

/// Span covering assembly of one sub-block.
pub fn assemble_span(requested: usize) -> Span {
    info_span!("assemble", requested)
}

/// Span covering one commit attempt.
pub fn commit_span(sub_block: &SubBlockId) -> Span {
    info_span!("commit_sub_block", sub_block = %sub_block)
}

/// Span covering one assemble → commit cycle of the pipeline loop.
pub fn pipeline_cycle_span(cycle: u64) -> Span {
    info_span!("pipeline_cycle", cycle)
}
