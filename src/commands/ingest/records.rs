use std::collections::HashSet;

use tracing::{debug, warn};

use super::hashing::record_hash;
use super::hierarchy::{TraversalContext, resolve_hierarchy};
use super::identifiers::{
    Identifier, is_numeric_identifier, normalize_identifier, strip_trailing_zero,
};
use super::references::ReferenceExtractor;
use super::scoring::record_confidence;
use crate::model::{BlockType, IngestConfig, Record, SectionLabels, Source, SourceRow};

const GLOSSARY_CUES: &[&str] = &[
    "is defined as",
    "means",
    "refers to",
    "shall mean",
    "definitions",
    "glossary",
    "terms",
    "definitions and terms",
];

/// Values shared by every record of one ingestion run.
#[derive(Debug, Clone)]
pub(crate) struct RunStamp {
    pub ingested_at: String,
    pub source: Source,
}

#[derive(Debug, Default)]
pub(crate) struct AssembledRecords {
    pub records: Vec<Record>,
    pub skipped_untitled: usize,
    pub duplicate_anchors: usize,
    pub warnings: Vec<String>,
}

/// Resolves rows in document order into hierarchy-placed records.
pub(crate) fn assemble_records(
    rows: &[SourceRow],
    config: &IngestConfig,
    references: &ReferenceExtractor,
    stamp: &RunStamp,
) -> AssembledRecords {
    let mut assembled = AssembledRecords::default();
    let mut context = TraversalContext::default();
    let mut anchors = AnchorRegistry::default();
    let mut last_order = 0_i64;
    let anchor_style = AnchorStyle::from_config(config);

    for row in rows {
        let Some(identifier) = normalize_identifier(row.title.as_deref()) else {
            assembled.skipped_untitled += 1;
            continue;
        };

        let (placement, next_context) = resolve_hierarchy(&identifier, context);
        context = next_context;

        let mut path: Vec<String> = placement
            .path
            .iter()
            .map(|segment| anchor_style.apply(segment))
            .collect();
        let parent_anchor = placement
            .parent_anchor
            .as_deref()
            .map(|anchor| anchor_style.apply(anchor));

        let styled_anchor = anchor_style.apply(&identifier.anchor);
        let (anchor, renamed) = anchors.claim(styled_anchor.clone());
        if renamed {
            if let Some(last) = path.last_mut().filter(|last| **last == styled_anchor) {
                *last = anchor.clone();
            }
            assembled.duplicate_anchors += 1;
            let message = format!(
                "row {}: anchor `{}` already used; emitted as `{}`",
                row.line, identifier.anchor, anchor
            );
            warn!(line = row.line, anchor = %identifier.anchor, renamed = %anchor, "duplicate anchor");
            assembled.warnings.push(message);
        }

        let order = match document_order(&identifier) {
            Some(order) => order,
            None => {
                if identifier.is_numeric {
                    warn!(line = row.line, node_id = %identifier.node_id, "identifier too deep to encode as order; inheriting previous");
                }
                last_order
            }
        };
        last_order = order;

        debug!(
            line = row.line,
            anchor = %anchor,
            level = placement.level.as_str(),
            parent = parent_anchor.as_deref().unwrap_or("-"),
            "resolved hierarchy"
        );

        let title = row.title.as_deref().map(str::trim).map(str::to_string);
        let content = row.content.clone();
        let refs = content
            .as_deref()
            .map(|text| references.extract(text))
            .unwrap_or_default();

        assembled.records.push(Record {
            doc_id: config.doc_id.clone(),
            anchor,
            node_id: identifier.node_id.clone(),
            confidence: record_confidence(
                title.as_deref(),
                content.as_deref(),
                &config.heading_vocabulary,
            ),
            hash: record_hash(
                &identifier.node_id,
                title.as_deref(),
                row.subtitle.as_deref(),
                content.as_deref(),
            ),
            block_type: classify_block(title.as_deref(), content.as_deref()),
            section_labels: SectionLabels::from_path(&path),
            title,
            subtitle: row.subtitle.clone(),
            content,
            url: row.url.clone(),
            path,
            parent_anchor,
            order,
            tokens: 0,
            refs,
            ingested_at: stamp.ingested_at.clone(),
            source: stamp.source.clone(),
            semantic_path: None,
            semantic_path_string: None,
            semantic_content: None,
            has_children: None,
            child_count: None,
            chunk_meta: None,
        });
    }

    assembled
}

#[derive(Debug, Clone, Copy)]
enum AnchorStyle {
    AsIs,
    StripTrailingZero,
}

impl AnchorStyle {
    fn from_config(config: &IngestConfig) -> Self {
        if config.normalize_anchors {
            Self::StripTrailingZero
        } else {
            Self::AsIs
        }
    }

    fn apply(self, anchor: &str) -> String {
        match self {
            Self::AsIs => anchor.to_string(),
            Self::StripTrailingZero => strip_trailing_zero(anchor).to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct AnchorRegistry {
    seen: HashSet<String>,
}

impl AnchorRegistry {
    /// Returns a run-unique anchor and whether it had to be suffixed.
    fn claim(&mut self, anchor: String) -> (String, bool) {
        if self.seen.insert(anchor.clone()) {
            return (anchor, false);
        }

        let mut ordinal = 2_usize;
        loop {
            let candidate = format!("{anchor}-{ordinal}");
            if self.seen.insert(candidate.clone()) {
                return (candidate, true);
            }
            ordinal += 1;
        }
    }
}

pub(crate) fn classify_block(title: Option<&str>, content: Option<&str>) -> BlockType {
    let has_cue = |text: &str| {
        let lower = text.to_lowercase();
        GLOSSARY_CUES.iter().any(|cue| lower.contains(cue))
    };

    let title = title.filter(|value| !value.is_empty());
    let content = content.filter(|value| !value.is_empty());

    if title.is_some_and(has_cue) || content.is_some_and(has_cue) {
        return BlockType::Glossary;
    }
    if content.is_some_and(|text| text.matches('|').count() > 2) {
        return BlockType::Table;
    }
    if title.is_some() {
        BlockType::Heading
    } else {
        BlockType::Para
    }
}

/// Numeric identifiers map to their zero-padded parts (`1.2.1` -> `1002001`).
/// Free-text identifiers have no position of their own and yield `None`.
pub(crate) fn document_order(identifier: &Identifier) -> Option<i64> {
    if !identifier.is_numeric || !is_numeric_identifier(&identifier.node_id) {
        return None;
    }

    let padded: String = identifier
        .node_id
        .split('.')
        .map(|part| format!("{part:0>3}"))
        .collect();
    padded.parse::<i64>().ok()
}
