use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int64Array, ListBuilder, StringArray, StringBuilder,
};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use rusqlite::{Connection, params};
use tracing::{info, warn};

use crate::model::Record;
use crate::util::ensure_directory;

const RECORDS_SCHEMA_VERSION: &str = "1";

pub(crate) fn write_records_jsonl(path: &Path, records: &[Record]) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    for record in records {
        serde_json::to_writer(&mut writer, record)
            .with_context(|| format!("failed to serialize record {}", record.anchor))?;
        writer
            .write_all(b"\n")
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;

    info!(path = %path.display(), records = records.len(), "wrote JSONL records");
    Ok(())
}

/// Reads previously written records; undecodable lines are reported and skipped.
pub(crate) fn read_records_jsonl(path: &Path) -> Result<(Vec<Record>, usize)> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut records = Vec::new();
    let mut skipped = 0_usize;

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line_no = index + 1;
        let parsed = line
            .map_err(anyhow::Error::from)
            .and_then(|line| {
                if line.trim().is_empty() {
                    return Ok(None);
                }
                serde_json::from_str::<Record>(&line)
                    .map(Some)
                    .map_err(anyhow::Error::from)
            });

        match parsed {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(err) => {
                warn!(line = line_no, error = %err, "skipping unreadable record line");
                skipped += 1;
            }
        }
    }

    Ok((records, skipped))
}

/// SQLite copy of the corpus: one row per record, `section_labels` flattened.
/// Rows of `doc_id` from earlier runs are replaced, not merged.
pub(crate) fn write_records_sqlite(path: &Path, doc_id: &str, records: &[Record]) -> Result<usize> {
    ensure_parent(path)?;
    let mut connection =
        Connection::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;

    let tx = connection.transaction()?;
    let removed = tx
        .execute("DELETE FROM records WHERE doc_id = ?1", [doc_id])
        .with_context(|| format!("failed to clear previous records of {doc_id}"))?;
    {
        let mut statement = tx.prepare(
            "
            INSERT INTO records(
              doc_id, anchor, node_id, title, subtitle, content, url, path, parent_anchor,
              block_type, section, chapter, subsection, order_index, tokens, confidence, refs,
              hash, ingested_at, source_type, source_file, semantic_path, semantic_path_string,
              semantic_content, has_children, child_count, chunk_no, chunk_count, est_tokens
            )
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29)
            ON CONFLICT(doc_id, anchor) DO UPDATE SET
              node_id=excluded.node_id,
              title=excluded.title,
              subtitle=excluded.subtitle,
              content=excluded.content,
              url=excluded.url,
              path=excluded.path,
              parent_anchor=excluded.parent_anchor,
              block_type=excluded.block_type,
              section=excluded.section,
              chapter=excluded.chapter,
              subsection=excluded.subsection,
              order_index=excluded.order_index,
              tokens=excluded.tokens,
              confidence=excluded.confidence,
              refs=excluded.refs,
              hash=excluded.hash,
              ingested_at=excluded.ingested_at,
              source_type=excluded.source_type,
              source_file=excluded.source_file,
              semantic_path=excluded.semantic_path,
              semantic_path_string=excluded.semantic_path_string,
              semantic_content=excluded.semantic_content,
              has_children=excluded.has_children,
              child_count=excluded.child_count,
              chunk_no=excluded.chunk_no,
              chunk_count=excluded.chunk_count,
              est_tokens=excluded.est_tokens
            ",
        )?;

        for record in records {
            let path_json = serde_json::to_string(&record.path)?;
            let refs_json = serde_json::to_string(&record.refs)?;
            let semantic_path_json = record
                .semantic_path
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            let chunk_meta = record.chunk_meta.as_ref();

            statement
                .execute(params![
                    record.doc_id,
                    record.anchor,
                    record.node_id,
                    record.title,
                    record.subtitle,
                    record.content,
                    record.url,
                    path_json,
                    record.parent_anchor,
                    record.block_type.as_str(),
                    record.section_labels.section,
                    record.section_labels.chapter,
                    record.section_labels.subsection,
                    record.order,
                    record.tokens as i64,
                    record.confidence,
                    refs_json,
                    record.hash,
                    record.ingested_at,
                    record.source.kind,
                    record.source.file,
                    semantic_path_json,
                    record.semantic_path_string,
                    record.semantic_content,
                    record.has_children,
                    record.child_count.map(|value| value as i64),
                    chunk_meta.map(|meta| meta.chunk_no as i64),
                    chunk_meta.map(|meta| meta.chunk_count as i64),
                    chunk_meta.map(|meta| meta.est_tokens as i64),
                ])
                .with_context(|| format!("failed to insert record {}", record.anchor))?;
        }
    }
    tx.commit()?;

    info!(
        path = %path.display(),
        records = records.len(),
        replaced = removed,
        "wrote SQLite records"
    );
    Ok(records.len())
}

/// Parquet copy of the corpus with `section_labels` flattened into `section`,
/// `chapter` and `subsection`. `path` and `semantic_path` are string lists;
/// `refs` is stored as JSON text. The file is rewritten on every run.
pub(crate) fn write_records_parquet(path: &Path, records: &[Record]) -> Result<usize> {
    ensure_parent(path)?;
    let batch = records_batch(records)?;

    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let properties = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(properties))
        .with_context(|| format!("failed to open parquet writer for {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("failed to write {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("failed to finalize {}", path.display()))?;

    info!(path = %path.display(), records = records.len(), "wrote Parquet records");
    Ok(records.len())
}

fn records_batch(records: &[Record]) -> Result<RecordBatch> {
    let strings = |value: fn(&Record) -> Option<&str>| -> ArrayRef {
        Arc::new(records.iter().map(value).collect::<StringArray>()) as ArrayRef
    };
    let counts = |value: fn(&Record) -> Option<usize>| -> ArrayRef {
        Arc::new(
            records
                .iter()
                .map(|record| value(record).map(|count| count as i64))
                .collect::<Int64Array>(),
        ) as ArrayRef
    };

    let refs = records
        .iter()
        .map(|record| serde_json::to_string(&record.refs))
        .collect::<serde_json::Result<Vec<String>>>()
        .context("failed to serialize references")?;

    let columns: Vec<(&str, ArrayRef)> = vec![
        ("doc_id", strings(|record| Some(record.doc_id.as_str()))),
        ("anchor", strings(|record| Some(record.anchor.as_str()))),
        ("node_id", strings(|record| Some(record.node_id.as_str()))),
        ("title", strings(|record| record.title.as_deref())),
        ("subtitle", strings(|record| record.subtitle.as_deref())),
        ("content", strings(|record| record.content.as_deref())),
        ("url", strings(|record| record.url.as_deref())),
        ("path", string_lists(records, |record| Some(&record.path))),
        ("parent_anchor", strings(|record| record.parent_anchor.as_deref())),
        ("block_type", strings(|record| Some(record.block_type.as_str()))),
        ("section", strings(|record| record.section_labels.section.as_deref())),
        ("chapter", strings(|record| record.section_labels.chapter.as_deref())),
        ("subsection", strings(|record| record.section_labels.subsection.as_deref())),
        (
            "order",
            Arc::new(Int64Array::from_iter_values(
                records.iter().map(|record| record.order),
            )) as ArrayRef,
        ),
        ("tokens", counts(|record| Some(record.tokens))),
        (
            "confidence",
            Arc::new(Float64Array::from_iter_values(
                records.iter().map(|record| record.confidence),
            )) as ArrayRef,
        ),
        ("refs", Arc::new(StringArray::from(refs)) as ArrayRef),
        ("hash", strings(|record| Some(record.hash.as_str()))),
        ("ingested_at", strings(|record| Some(record.ingested_at.as_str()))),
        ("source_type", strings(|record| Some(record.source.kind.as_str()))),
        ("source_file", strings(|record| Some(record.source.file.as_str()))),
        (
            "semantic_path",
            string_lists(records, |record| record.semantic_path.as_ref()),
        ),
        (
            "semantic_path_string",
            strings(|record| record.semantic_path_string.as_deref()),
        ),
        ("semantic_content", strings(|record| record.semantic_content.as_deref())),
        (
            "has_children",
            Arc::new(
                records
                    .iter()
                    .map(|record| record.has_children)
                    .collect::<BooleanArray>(),
            ) as ArrayRef,
        ),
        ("child_count", counts(|record| record.child_count)),
        ("chunk_no", counts(|record| record.chunk_meta.as_ref().map(|meta| meta.chunk_no))),
        (
            "chunk_count",
            counts(|record| record.chunk_meta.as_ref().map(|meta| meta.chunk_count)),
        ),
        (
            "est_tokens",
            counts(|record| record.chunk_meta.as_ref().map(|meta| meta.est_tokens)),
        ),
    ];

    RecordBatch::try_from_iter(columns).context("failed to assemble record batch")
}

fn string_lists(records: &[Record], value: fn(&Record) -> Option<&Vec<String>>) -> ArrayRef {
    let mut builder = ListBuilder::new(StringBuilder::new());
    for record in records {
        match value(record) {
            Some(items) => {
                for item in items {
                    builder.values().append_value(item);
                }
                builder.append(true);
            }
            None => builder.append(false),
        }
    }
    Arc::new(builder.finish())
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS records (
          doc_id TEXT NOT NULL,
          anchor TEXT NOT NULL,
          node_id TEXT NOT NULL,
          title TEXT,
          subtitle TEXT,
          content TEXT,
          url TEXT,
          path TEXT NOT NULL,
          parent_anchor TEXT,
          block_type TEXT NOT NULL,
          section TEXT,
          chapter TEXT,
          subsection TEXT,
          order_index INTEGER NOT NULL,
          tokens INTEGER NOT NULL,
          confidence REAL NOT NULL,
          refs TEXT NOT NULL,
          hash TEXT NOT NULL,
          ingested_at TEXT NOT NULL,
          source_type TEXT NOT NULL,
          source_file TEXT NOT NULL,
          semantic_path TEXT,
          semantic_path_string TEXT,
          semantic_content TEXT,
          has_children INTEGER,
          child_count INTEGER,
          chunk_no INTEGER,
          chunk_count INTEGER,
          est_tokens INTEGER,
          PRIMARY KEY(doc_id, anchor)
        );

        CREATE INDEX IF NOT EXISTS idx_records_parent ON records(doc_id, parent_anchor);
        CREATE INDEX IF NOT EXISTS idx_records_order ON records(doc_id, order_index);
        ",
        )
        .context("failed to create records schema")?;

    connection
        .execute(
            "INSERT INTO metadata(key, value) VALUES('records_schema_version', ?1)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            [RECORDS_SCHEMA_VERSION],
        )
        .context("failed to record schema version")?;

    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_directory(parent),
        _ => Ok(()),
    }
}
