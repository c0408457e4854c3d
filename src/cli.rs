use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "ecm-ingest",
    version,
    about = "Tabular document ingestion into a hierarchical, chunked search corpus"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Ingest(IngestArgs),
    Enrich(EnrichArgs),
    Inspect(InspectArgs),
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    /// Spreadsheet (.xlsx/.xls/.ods), CSV or JSONL file with title/subtitle/content/url columns.
    pub input: PathBuf,

    /// Output path without extension; defaults to the input stem next to the input.
    #[arg(long)]
    pub output_prefix: Option<PathBuf>,

    #[arg(long, default_value = "ecm")]
    pub doc_id: String,

    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Both)]
    pub output_format: OutputFormat,

    /// Strip a trailing `.0` from numeric anchors.
    #[arg(long, default_value_t = false)]
    pub normalize_anchors: bool,

    /// Heading vocabulary term used for record confidence; repeatable.
    #[arg(long = "heading-term")]
    pub heading_terms: Vec<String>,

    #[arg(long, default_value_t = false)]
    pub clean_content: bool,

    /// Overrides the file name recorded in each record's `source`.
    #[arg(long)]
    pub source_label: Option<String>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[command(flatten)]
    pub chunking: ChunkingArgs,
}

#[derive(Args, Debug, Clone)]
pub struct EnrichArgs {
    /// JSONL file of records produced by `ingest`.
    pub input: PathBuf,

    #[command(flatten)]
    pub chunking: ChunkingArgs,
}

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    pub input: PathBuf,

    #[arg(long, default_value_t = 5)]
    pub rows: usize,

    #[arg(long, default_value_t = false)]
    pub detailed: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ChunkingArgs {
    #[arg(long, default_value_t = 300)]
    pub max_tokens: usize,

    #[arg(long, value_enum, default_value_t = TokenMode::Auto)]
    pub token_mode: TokenMode,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jsonl,
    Parquet,
    /// SQLite `records` table.
    Sqlite,
    /// JSONL and Parquet.
    Both,
    /// JSONL, Parquet and SQLite.
    All,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Parquet => "parquet",
            Self::Sqlite => "sqlite",
            Self::Both => "both",
            Self::All => "all",
        }
    }

    pub fn writes_jsonl(self) -> bool {
        matches!(self, Self::Jsonl | Self::Both | Self::All)
    }

    pub fn writes_parquet(self) -> bool {
        matches!(self, Self::Parquet | Self::Both | Self::All)
    }

    pub fn writes_sqlite(self) -> bool {
        matches!(self, Self::Sqlite | Self::All)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenMode {
    /// BPE when the encoding loads, otherwise the word heuristic.
    Auto,
    Bpe,
    Words,
}

impl TokenMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Bpe => "bpe",
            Self::Words => "words",
        }
    }
}
