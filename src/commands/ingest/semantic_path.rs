use std::collections::HashMap;

use anyhow::{Context, Result};
use regex::Regex;

use super::identifiers::is_numeric_identifier;
use crate::error::PipelineError;
use crate::model::Record;

const PATH_SEPARATOR: &str = " > ";

/// Composes de-numbered, human-readable ancestor paths from subtitles.
pub(crate) struct SemanticPathBuilder {
    label_prefix: Regex,
    non_word: Regex,
    top_level: Regex,
}

impl SemanticPathBuilder {
    pub(crate) fn new() -> Result<Self> {
        Ok(Self {
            // Word labels need a boundary so "Partition" keeps its text. This
            // also leaves "Section5" unstripped; do not drop the `\b`.
            label_prefix: Regex::new(r"(?i)^(?:(?:section|chapter|part)\b|sec\.|ch\.|p\.)\s*")
                .context("failed to compile label prefix regex")?,
            non_word: Regex::new(r"[^\w\s]").context("failed to compile non-word regex")?,
            top_level: Regex::new(r"(?i)^section\s+\d+")
                .context("failed to compile top-level section regex")?,
        })
    }

    /// Returns copies of `records` carrying `semantic_path` and
    /// `semantic_path_string`. Existing semantic fields are ignored, so running
    /// the pass again yields the same paths.
    pub(crate) fn annotate(&self, records: Vec<Record>) -> Result<Vec<Record>, PipelineError> {
        let mut index = HashMap::<&str, usize>::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            index.entry(record.anchor.as_str()).or_insert(position);
        }

        let paths = records
            .iter()
            .map(|record| self.semantic_path(record, &records, &index))
            .collect::<Result<Vec<_>, _>>()?;
        drop(index);

        Ok(records
            .into_iter()
            .zip(paths)
            .map(|(mut record, path)| {
                record.semantic_path_string = Some(path.join(PATH_SEPARATOR));
                record.semantic_path = Some(path);
                record
            })
            .collect())
    }

    pub(crate) fn semantic_path(
        &self,
        record: &Record,
        records: &[Record],
        index: &HashMap<&str, usize>,
    ) -> Result<Vec<String>, PipelineError> {
        let limit = records.len().max(1);
        let mut chain = vec![record];
        let mut current = record;

        while !self.is_top_level(current) {
            let Some(parent) = current
                .parent_anchor
                .as_deref()
                .and_then(|anchor| index.get(anchor))
                .map(|position| &records[*position])
            else {
                break;
            };

            if chain.len() >= limit {
                return Err(PipelineError::SemanticPathCycle {
                    anchor: record.anchor.clone(),
                    limit,
                });
            }
            chain.push(parent);
            current = parent;
        }

        let mut path = Vec::with_capacity(chain.len());
        for (depth, ancestor) in chain.iter().rev().enumerate() {
            if depth == 0 && self.is_top_level(ancestor) {
                path.push(self.clean_segment(&effective_subtitle(ancestor)));
                continue;
            }
            if let Some(segment) = self.own_segment(ancestor) {
                path.push(segment);
            }
        }

        Ok(path)
    }

    /// Lowercased label without a leading `Section`/`Chapter`/`Part` marker
    /// and without punctuation.
    pub(crate) fn clean_segment(&self, label: &str) -> String {
        let without_prefix = self.label_prefix.replace(label, "");
        let lower = without_prefix.to_lowercase();
        let words_only = self.non_word.replace_all(&lower, "");
        let collapsed = words_only.split_whitespace().collect::<Vec<&str>>().join(" ");

        if collapsed.is_empty() {
            "untitled".to_string()
        } else {
            collapsed
        }
    }

    fn is_top_level(&self, record: &Record) -> bool {
        self.top_level.is_match(&effective_subtitle(record))
    }

    /// Segment a non-top-level record contributes to its own path. Numeric
    /// titles are link-only; only a descriptive subtitle from the input is kept.
    fn own_segment(&self, record: &Record) -> Option<String> {
        if !title_is_numeric(record) {
            return Some(self.clean_segment(&effective_subtitle(record)));
        }

        record
            .subtitle
            .as_deref()
            .filter(|subtitle| !subtitle.is_empty() && !is_numeric_identifier(subtitle))
            .map(|subtitle| self.clean_segment(subtitle))
    }
}

fn title_is_numeric(record: &Record) -> bool {
    record
        .title
        .as_deref()
        .is_some_and(|title| is_numeric_identifier(title))
}

fn effective_subtitle(record: &Record) -> String {
    if let Some(subtitle) = record.subtitle.as_deref().filter(|value| !value.is_empty()) {
        return subtitle.to_string();
    }

    match record.title.as_deref().filter(|value| !value.is_empty()) {
        Some(title) if is_numeric_identifier(title) => format!("Section {title}"),
        Some(title) => title.to_string(),
        None => "Untitled".to_string(),
    }
}
