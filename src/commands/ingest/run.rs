use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::info;

use super::clean::clean_row;
use super::pipeline::Pipeline;
use super::records::RunStamp;
use super::sinks::{write_records_jsonl, write_records_parquet, write_records_sqlite};
use super::sources::read_rows;
use super::stats::{corpus_statistics, log_statistics};
use super::tokens::TokenCounter;
use crate::cli::IngestArgs;
use crate::model::{IngestConfig, IngestCounts, IngestOutputs, IngestRunManifest, Source};
use crate::util::{now_utc_string, sha256_file, utc_compact_string, write_json_pretty};

const MANIFEST_VERSION: u32 = 1;

pub fn run(args: IngestArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let config = resolve_config(&args)?;
    let output_prefix = args
        .output_prefix
        .clone()
        .unwrap_or_else(|| default_output_prefix(&args.input));
    let manifest_path = args
        .manifest_path
        .clone()
        .unwrap_or_else(|| with_suffix(&output_prefix, ".manifest.json"));

    info!(
        input = %args.input.display(),
        run_id = %run_id,
        doc_id = %config.doc_id,
        format = config.output_format.as_str(),
        max_tokens = config.max_tokens,
        "starting ingest"
    );

    let input_sha256 = sha256_file(&args.input)?;
    let (input_format, batch) = read_rows(&args.input)?;
    let rows_read = batch.rows.len() + batch.skipped_malformed;
    let rows = if config.clean_content {
        batch.rows.into_iter().map(clean_row).collect()
    } else {
        batch.rows
    };

    let counter = TokenCounter::select(config.token_mode)?;
    info!(
        mode = config.token_mode.as_str(),
        token_counter = counter.label(),
        "selected token counter"
    );

    let stamp = RunStamp {
        ingested_at: started_at.clone(),
        source: Source {
            kind: input_format.as_str().to_string(),
            file: args
                .source_label
                .clone()
                .unwrap_or_else(|| file_name(&args.input)),
        },
    };

    let output = Pipeline::new(&config, &counter)?
        .run(&rows, &stamp)
        .with_context(|| format!("failed to process {}", args.input.display()))?;

    let mut outputs = IngestOutputs {
        jsonl_path: None,
        parquet_path: None,
        sqlite_path: None,
    };
    if config.output_format.writes_jsonl() {
        let path = with_suffix(&output_prefix, ".jsonl");
        write_records_jsonl(&path, &output.records)?;
        outputs.jsonl_path = Some(path.display().to_string());
    }
    if config.output_format.writes_parquet() {
        let path = with_suffix(&output_prefix, ".parquet");
        write_records_parquet(&path, &output.records)?;
        outputs.parquet_path = Some(path.display().to_string());
    }
    if config.output_format.writes_sqlite() {
        let path = with_suffix(&output_prefix, ".sqlite");
        write_records_sqlite(&path, &config.doc_id, &output.records)?;
        outputs.sqlite_path = Some(path.display().to_string());
    }

    let statistics = corpus_statistics(&output.records);
    log_statistics(&statistics, output.records.len());

    let counts = IngestCounts {
        rows_read,
        rows_skipped_malformed: batch.skipped_malformed,
        rows_skipped_untitled: output.skipped_untitled,
        duplicate_anchors: output.duplicate_anchors,
        records_resolved: output.records_resolved,
        records_written: output.records.len(),
        chunked_parents: output.chunked_parents,
        chunk_records: output.chunk_records,
        order_fallbacks: output.order_fallbacks,
    };

    let mut warnings = batch.warnings;
    warnings.extend(output.warnings);

    let manifest = IngestRunManifest {
        manifest_version: MANIFEST_VERSION,
        run_id: run_id.clone(),
        status: "completed".to_string(),
        started_at,
        updated_at: now_utc_string(),
        input_path: args.input.display().to_string(),
        input_sha256,
        input_format: input_format.as_str().to_string(),
        token_counter: counter.label().to_string(),
        config,
        outputs,
        counts,
        statistics,
        warnings,
    };
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        run_id = %run_id,
        records = manifest.counts.records_written,
        skipped_untitled = manifest.counts.rows_skipped_untitled,
        skipped_malformed = manifest.counts.rows_skipped_malformed,
        manifest = %manifest_path.display(),
        "ingest completed"
    );

    Ok(())
}

pub(crate) fn resolve_config(args: &IngestArgs) -> Result<IngestConfig> {
    if args.chunking.max_tokens == 0 {
        bail!("--max-tokens must be greater than zero");
    }
    if args.doc_id.trim().is_empty() {
        bail!("--doc-id must not be empty");
    }

    let mut config = IngestConfig::with_doc_id(args.doc_id.trim());
    config.output_format = args.output_format;
    config.normalize_anchors = args.normalize_anchors;
    config.max_tokens = args.chunking.max_tokens;
    config.token_mode = args.chunking.token_mode;
    config.clean_content = args.clean_content;

    if !args.heading_terms.is_empty() {
        config.heading_vocabulary.clear();
        for term in &args.heading_terms {
            let term = term.trim();
            if !term.is_empty() && !config.heading_vocabulary.iter().any(|known| known == term) {
                config.heading_vocabulary.push(term.to_string());
            }
        }
    }

    Ok(config)
}

pub(crate) fn default_output_prefix(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|value| value.to_os_string())
        .unwrap_or_else(|| "records".into());
    input.with_file_name(stem)
}

pub(crate) fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut raw = prefix.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|value| value.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
