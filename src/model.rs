use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cli::{OutputFormat, TokenMode};

pub const DEFAULT_HEADING_VOCABULARY: &[&str] = &[
    "Operating Permit",
    "Environmental Resource Inventory",
    "Interbasin Diversion",
    "Pollution Attenuation",
    "Resource Extraction",
    "Administrative",
    "General",
    "Definitions",
    "Glossary",
    "Appendix",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BlockType {
    Heading,
    Para,
    Table,
    Glossary,
}

impl BlockType {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockType::Heading => "HEADING",
            BlockType::Para => "PARA",
            BlockType::Table => "TABLE",
            BlockType::Glossary => "GLOSSARY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReferenceKind {
    Code,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub text: String,
    /// Character offsets `[start, end)` into the text the reference was found in.
    pub span: [usize; 2],
    #[serde(rename = "type")]
    pub kind: ReferenceKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "type")]
    pub kind: String,
    pub file: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionLabels {
    pub section: Option<String>,
    pub chapter: Option<String>,
    pub subsection: Option<String>,
}

impl SectionLabels {
    pub fn from_path(path: &[String]) -> Self {
        Self {
            section: path.first().cloned(),
            chapter: path.get(1).cloned(),
            subsection: path.get(2).cloned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub chunk_no: usize,
    pub chunk_count: usize,
    pub char_span: [usize; 2],
    pub est_tokens: usize,
}

/// Canonical output unit: one per titled source row, plus one per chunk of an
/// over-budget row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub doc_id: String,
    pub anchor: String,
    pub node_id: String,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
    pub path: Vec<String>,
    pub parent_anchor: Option<String>,
    pub block_type: BlockType,
    #[serde(default)]
    pub section_labels: SectionLabels,
    pub order: i64,
    #[serde(default)]
    pub tokens: usize,
    pub confidence: f64,
    #[serde(default)]
    pub refs: Vec<Reference>,
    pub hash: String,
    pub ingested_at: String,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_path: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_path_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_children: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_meta: Option<ChunkMeta>,
}

/// A raw input row as handed over by one of the readers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceRow {
    /// 1-based line (JSONL) or row (CSV, spreadsheet) number in the input.
    pub line: usize,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestConfig {
    pub doc_id: String,
    pub output_format: OutputFormat,
    pub normalize_anchors: bool,
    pub heading_vocabulary: Vec<String>,
    pub max_tokens: usize,
    pub token_mode: TokenMode,
    pub clean_content: bool,
}

impl IngestConfig {
    pub fn with_doc_id(doc_id: &str) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            output_format: OutputFormat::Both,
            normalize_anchors: false,
            heading_vocabulary: DEFAULT_HEADING_VOCABULARY
                .iter()
                .map(|term| term.to_string())
                .collect(),
            max_tokens: 300,
            token_mode: TokenMode::Auto,
            clean_content: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestCounts {
    pub rows_read: usize,
    pub rows_skipped_malformed: usize,
    pub rows_skipped_untitled: usize,
    pub duplicate_anchors: usize,
    pub records_resolved: usize,
    pub records_written: usize,
    pub chunked_parents: usize,
    pub chunk_records: usize,
    pub order_fallbacks: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfidenceBuckets {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CorpusStatistics {
    pub block_types: BTreeMap<String, usize>,
    pub confidence: ConfidenceBuckets,
    pub references_total: usize,
    pub records_with_references: usize,
    pub tokens_total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutputs {
    pub jsonl_path: Option<String>,
    pub parquet_path: Option<String>,
    pub sqlite_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub input_path: String,
    pub input_sha256: String,
    pub input_format: String,
    pub token_counter: String,
    pub config: IngestConfig,
    pub outputs: IngestOutputs,
    pub counts: IngestCounts,
    pub statistics: CorpusStatistics,
    pub warnings: Vec<String>,
}
