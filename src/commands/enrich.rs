use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::cli::EnrichArgs;
use crate::commands::ingest::{
    Chunker, SemanticPathBuilder, TokenCounter, corpus_statistics, default_output_prefix,
    log_statistics, read_records_jsonl, with_suffix, write_records_jsonl,
};
use crate::model::Record;

/// Re-runs semantic path construction and chunking over an existing record file.
pub fn run(args: EnrichArgs) -> Result<()> {
    if args.chunking.max_tokens == 0 {
        bail!("--max-tokens must be greater than zero");
    }

    let (records, skipped) = read_records_jsonl(&args.input)?;
    let loaded = records.len();
    let records = strip_chunks(records);
    info!(
        input = %args.input.display(),
        records = loaded,
        parents = records.len(),
        skipped,
        "loaded records for enrichment"
    );

    let builder = SemanticPathBuilder::new()?;
    let records = builder
        .annotate(records)
        .with_context(|| format!("failed to build semantic paths for {}", args.input.display()))?;
    let semantic_path = output_path(&args.input, "_semantic.jsonl");
    write_records_jsonl(&semantic_path, &records)?;

    let counter = TokenCounter::select(args.chunking.token_mode)?;
    let chunker = Chunker::new(&counter, args.chunking.max_tokens)?;
    let chunked = chunker.chunk_records(records);
    let records = chunked.records;
    let chunked_path = output_path(&args.input, "_semantic_chunked.jsonl");
    write_records_jsonl(&chunked_path, &records)?;

    log_statistics(&corpus_statistics(&records), records.len());
    info!(
        semantic = %semantic_path.display(),
        chunked = %chunked_path.display(),
        records = records.len(),
        order_fallbacks = chunked.order_fallbacks.len(),
        token_counter = counter.label(),
        "enrichment completed"
    );
    Ok(())
}

/// Drops chunk children from an earlier run and resets their parents so the
/// records can be chunked again.
fn strip_chunks(records: Vec<Record>) -> Vec<Record> {
    records
        .into_iter()
        .filter(|record| record.chunk_meta.is_none())
        .map(|mut record| {
            record.has_children = None;
            record.child_count = None;
            record.semantic_content = None;
            record
        })
        .collect()
}

fn output_path(input: &Path, suffix: &str) -> PathBuf {
    with_suffix(&default_output_prefix(input), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_appends_suffix_to_stem() {
        let path = output_path(Path::new("out/ecm_records.jsonl"), "_semantic.jsonl");
        assert_eq!(path, PathBuf::from("out/ecm_records_semantic.jsonl"));
    }
}
