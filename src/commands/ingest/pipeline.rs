use anyhow::Result;
use tracing::info;

use super::chunking::{ChunkedRecords, Chunker};
use super::records::{AssembledRecords, RunStamp, assemble_records};
use super::references::ReferenceExtractor;
use super::semantic_path::SemanticPathBuilder;
use super::tokens::TokenCounter;
use crate::error::PipelineError;
use crate::model::{IngestConfig, Record, SourceRow};

#[derive(Debug, Default)]
pub(crate) struct PipelineOutput {
    pub records: Vec<Record>,
    pub skipped_untitled: usize,
    pub duplicate_anchors: usize,
    pub records_resolved: usize,
    pub chunked_parents: usize,
    pub chunk_records: usize,
    pub order_fallbacks: usize,
    pub warnings: Vec<String>,
}

/// Hierarchy resolution, semantic paths and chunking over one ordered batch.
pub(crate) struct Pipeline<'a> {
    config: &'a IngestConfig,
    references: ReferenceExtractor,
    semantic: SemanticPathBuilder,
    chunker: Chunker<'a>,
}

impl<'a> Pipeline<'a> {
    pub(crate) fn new(config: &'a IngestConfig, counter: &'a TokenCounter) -> Result<Self> {
        Ok(Self {
            config,
            references: ReferenceExtractor::new()?,
            semantic: SemanticPathBuilder::new()?,
            chunker: Chunker::new(counter, config.max_tokens)?,
        })
    }

    pub(crate) fn run(
        &self,
        rows: &[SourceRow],
        stamp: &RunStamp,
    ) -> Result<PipelineOutput, PipelineError> {
        let AssembledRecords {
            records,
            skipped_untitled,
            duplicate_anchors,
            mut warnings,
        } = assemble_records(rows, self.config, &self.references, stamp);
        let records_resolved = records.len();
        info!(
            records = records_resolved,
            skipped_untitled, duplicate_anchors, "resolved hierarchy"
        );

        let records = self.semantic.annotate(records)?;
        info!(records = records.len(), "built semantic paths");

        let ChunkedRecords {
            records,
            order_fallbacks,
        } = self.chunker.chunk_records(records);
        warnings.extend(order_fallbacks.iter().map(|anchor| {
            format!("anchor `{anchor}`: child order cannot be encoded; children reuse the parent order")
        }));
        let chunked_parents = records
            .iter()
            .filter(|record| record.has_children == Some(true))
            .count();
        let chunk_records = records
            .iter()
            .filter(|record| record.chunk_meta.is_some())
            .count();
        info!(
            records = records.len(),
            chunked_parents,
            chunk_records,
            order_fallbacks = order_fallbacks.len(),
            "applied hierarchical chunking"
        );

        Ok(PipelineOutput {
            records,
            skipped_untitled,
            duplicate_anchors,
            records_resolved,
            chunked_parents,
            chunk_records,
            order_fallbacks: order_fallbacks.len(),
            warnings,
        })
    }
}
