mod chunking;
mod clean;
mod hashing;
mod hierarchy;
mod identifiers;
mod pipeline;
mod records;
mod references;
mod run;
mod scoring;
mod semantic_path;
mod sinks;
mod sources;
mod stats;
#[cfg(test)]
mod tests;
mod tokens;

pub use run::run;

pub(crate) use chunking::Chunker;
pub(crate) use identifiers::normalize_identifier;
pub(crate) use run::{default_output_prefix, with_suffix};
pub(crate) use semantic_path::SemanticPathBuilder;
pub(crate) use sinks::{read_records_jsonl, write_records_jsonl};
pub(crate) use sources::read_rows;
pub(crate) use stats::{corpus_statistics, log_statistics};
pub(crate) use tokens::TokenCounter;
