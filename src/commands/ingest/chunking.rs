use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, warn};

use super::hashing::chunk_hash;
use super::references::ReferenceExtractor;
use super::scoring::chunk_confidence;
use super::tokens::TokenCounter;
use crate::model::{BlockType, ChunkMeta, Record};

const OVERLAP_WORDS: usize = 5;
/// Chunk numbers occupy the last three decimal digits of a child's order.
const ORDER_STRIDE: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BoundaryKind {
    Lettered,
    Numbered,
    Bulleted,
}

impl BoundaryKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            BoundaryKind::Lettered => "lettered",
            BoundaryKind::Numbered => "numbered",
            BoundaryKind::Bulleted => "bulleted",
        }
    }
}

struct BoundaryDetector {
    kind: BoundaryKind,
    line_marker: Regex,
}

/// Pieces of a text cut at the first boundary strategy that matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BoundarySplit<'t> {
    pub kind: Option<BoundaryKind>,
    pub pieces: Vec<&'t str>,
}

/// Output of one chunking pass.
#[derive(Debug, Default)]
pub(crate) struct ChunkedRecords {
    pub records: Vec<Record>,
    /// Anchors whose children could not be given `parent.order * 1000 + n`
    /// and reuse the parent's order instead.
    pub order_fallbacks: Vec<String>,
}

/// A record after chunking: the record alone, or the parent followed by its
/// children.
#[derive(Debug)]
pub(crate) struct ChunkedRecord {
    pub records: Vec<Record>,
    pub order_fallback: bool,
}

pub(crate) struct Chunker<'a> {
    detectors: Vec<BoundaryDetector>,
    sentence_end: Regex,
    references: ReferenceExtractor,
    counter: &'a TokenCounter,
    max_tokens: usize,
    target_tokens: usize,
}

impl<'a> Chunker<'a> {
    pub(crate) fn new(counter: &'a TokenCounter, max_tokens: usize) -> Result<Self> {
        let detectors = vec![
            BoundaryDetector {
                kind: BoundaryKind::Lettered,
                line_marker: Regex::new(r"(?m)^[A-Z]\.\s+")
                    .context("failed to compile lettered boundary regex")?,
            },
            BoundaryDetector {
                kind: BoundaryKind::Numbered,
                line_marker: Regex::new(r"(?m)^(?:\(?\d+\)?\.?\s+|\(?[IVX]+\)?\.?\s+)")
                    .context("failed to compile numbered boundary regex")?,
            },
            BoundaryDetector {
                kind: BoundaryKind::Bulleted,
                line_marker: Regex::new(r"(?m)^[•\-–*]\s+")
                    .context("failed to compile bullet boundary regex")?,
            },
        ];

        Ok(Self {
            detectors,
            sentence_end: Regex::new(r"[.!?]\s+").context("failed to compile sentence regex")?,
            references: ReferenceExtractor::new()?,
            counter,
            max_tokens,
            target_tokens: (max_tokens * 5 / 6).max(1),
        })
    }

    pub(crate) fn chunk_records(&self, records: Vec<Record>) -> ChunkedRecords {
        let mut out = ChunkedRecords {
            records: Vec::with_capacity(records.len()),
            order_fallbacks: Vec::new(),
        };
        for record in records {
            let anchor = record.anchor.clone();
            let chunked = self.chunk_record(record);
            if chunked.order_fallback {
                out.order_fallbacks.push(anchor);
            }
            out.records.extend(chunked.records);
        }
        out
    }

    /// Returns the record alone when it fits the budget (or yields a single
    /// chunk), otherwise the parent followed by its ordered children.
    ///
    /// Every record that already carries a semantic path also gets
    /// `semantic_content`, including records that stay under the budget, so
    /// the field is present on the whole corpus rather than on chunked
    /// records only.
    pub(crate) fn chunk_record(&self, mut record: Record) -> ChunkedRecord {
        let content = record.content.clone().unwrap_or_default();
        let tokens = self.counter.count(&content);

        if content.is_empty() || tokens <= self.max_tokens {
            record.tokens = tokens;
            record.semantic_content = semantic_content(&record, record.content.as_deref());
            return ChunkedRecord::whole(record);
        }

        let chunks = self.chunk_text(&content);
        if chunks.len() <= 1 {
            record.tokens = chunks
                .first()
                .map(|chunk| self.counter.count(chunk))
                .unwrap_or(tokens);
            record.semantic_content = semantic_content(&record, record.content.as_deref());
            return ChunkedRecord::whole(record);
        }

        let chunk_count = chunks.len();
        let orders = child_orders(record.order, chunk_count);
        let order_fallback = orders.is_none();
        if order_fallback {
            warn!(
                anchor = %record.anchor,
                order = record.order,
                children = chunk_count,
                "child order cannot be encoded; children reuse the parent order"
            );
        }

        let mut children = Vec::with_capacity(chunk_count);
        for (position, chunk) in chunks.iter().enumerate() {
            let order = orders
                .as_ref()
                .map(|orders| orders[position])
                .unwrap_or(record.order);
            children.push(self.child_record(&record, chunk, position + 1, chunk_count, order));
        }

        debug!(
            anchor = %record.anchor,
            tokens,
            children = chunk_count,
            "split record into chunks"
        );

        record.has_children = Some(true);
        record.child_count = Some(chunk_count);
        record.tokens = children.iter().map(|child| child.tokens).sum();
        record.semantic_content = semantic_content(&record, record.content.as_deref());

        let mut records = Vec::with_capacity(chunk_count + 1);
        records.push(record);
        records.extend(children);
        ChunkedRecord {
            records,
            order_fallback,
        }
    }

    /// Boundary split, then sentence windowing of any piece still over budget.
    pub(crate) fn chunk_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let split = self.split_on_boundaries(text);
        debug!(
            boundary = split.kind.map(BoundaryKind::as_str).unwrap_or("none"),
            pieces = split.pieces.len(),
            "split content on boundaries"
        );

        let mut chunks = Vec::new();
        for piece in split.pieces {
            let piece = piece.trim();
            if self.counter.count(piece) <= self.max_tokens {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.window(piece));
            }
        }
        chunks
    }

    /// Tries lettered, numbered, then bulleted line markers; the first kind with
    /// any match decides the cut points. Text before the first marker is kept
    /// as its own piece.
    pub(crate) fn split_on_boundaries<'t>(&self, text: &'t str) -> BoundarySplit<'t> {
        for detector in &self.detectors {
            let starts: Vec<usize> = detector
                .line_marker
                .find_iter(text)
                .map(|found| found.start())
                .collect();
            let Some(first) = starts.first().copied() else {
                continue;
            };

            let mut pieces = Vec::with_capacity(starts.len() + 1);
            let preamble = &text[..first];
            if !preamble.trim().is_empty() {
                pieces.push(preamble);
            }
            for (position, start) in starts.iter().enumerate() {
                let end = starts.get(position + 1).copied().unwrap_or(text.len());
                pieces.push(&text[*start..end]);
            }

            return BoundarySplit {
                kind: Some(detector.kind),
                pieces,
            };
        }

        BoundarySplit {
            kind: None,
            pieces: vec![text],
        }
    }

    /// Greedy sentence packing up to the target budget; every window after the
    /// first opens with the last words of the previous one.
    pub(crate) fn window(&self, text: &str) -> Vec<String> {
        if self.counter.count(text) <= self.max_tokens {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::<String>::new();
        let mut current = String::new();

        for sentence in self.sentences(text) {
            let candidate = if current.is_empty() {
                sentence.to_string()
            } else {
                format!("{current} {sentence}")
            };

            if self.counter.count(&candidate) <= self.target_tokens {
                current = candidate;
                continue;
            }

            if !current.trim().is_empty() {
                chunks.push(current.trim().to_string());
            }

            current = match chunks.last() {
                Some(previous) => format!("{} {sentence}", trailing_words(previous, OVERLAP_WORDS)),
                None => sentence.to_string(),
            };
        }

        if !current.trim().is_empty() {
            chunks.push(current.trim().to_string());
        }
        chunks
    }

    fn sentences<'t>(&self, text: &'t str) -> Vec<&'t str> {
        let mut sentences = Vec::new();
        let mut start = 0;
        for found in self.sentence_end.find_iter(text) {
            // terminators are single-byte ASCII
            let end = found.start() + 1;
            sentences.push(&text[start..end]);
            start = found.end();
        }
        sentences.push(&text[start..]);

        sentences
            .into_iter()
            .map(str::trim)
            .filter(|sentence| !sentence.is_empty())
            .collect()
    }

    fn child_record(
        &self,
        parent: &Record,
        chunk: &str,
        chunk_no: usize,
        chunk_count: usize,
        order: i64,
    ) -> Record {
        let anchor = format!("{}_{}", parent.anchor, chunk_suffix(chunk_no));
        let tokens = self.counter.count(chunk);

        let mut path = parent.path.clone();
        path.push(anchor.clone());

        let mut child = Record {
            doc_id: parent.doc_id.clone(),
            anchor,
            node_id: parent.node_id.clone(),
            title: parent.title.clone(),
            subtitle: parent.subtitle.clone(),
            content: Some(chunk.to_string()),
            url: parent.url.clone(),
            path,
            parent_anchor: Some(parent.anchor.clone()),
            block_type: BlockType::Para,
            section_labels: parent.section_labels.clone(),
            order,
            tokens,
            confidence: chunk_confidence(chunk),
            refs: self.references.extract(chunk),
            hash: chunk_hash(
                &parent.doc_id,
                &parent.anchor,
                parent.title.as_deref(),
                parent.subtitle.as_deref(),
                chunk,
                chunk_no,
            ),
            ingested_at: parent.ingested_at.clone(),
            source: parent.source.clone(),
            semantic_path: parent.semantic_path.clone(),
            semantic_path_string: parent.semantic_path_string.clone(),
            semantic_content: None,
            has_children: None,
            child_count: None,
            chunk_meta: Some(ChunkMeta {
                chunk_no,
                chunk_count,
                char_span: [0, chunk.chars().count()],
                est_tokens: tokens,
            }),
        };
        child.semantic_content = semantic_content(&child, Some(chunk));
        child
    }
}

impl ChunkedRecord {
    fn whole(record: Record) -> Self {
        Self {
            records: vec![record],
            order_fallback: false,
        }
    }
}

/// `parent_order * 1000 + n` for `n` in `1..=chunk_count`, or `None` when the
/// chunk numbers do not fit three digits or the product overflows.
pub(crate) fn child_orders(parent_order: i64, chunk_count: usize) -> Option<Vec<i64>> {
    let count = i64::try_from(chunk_count).ok()?;
    if count >= ORDER_STRIDE {
        return None;
    }
    let base = parent_order.checked_mul(ORDER_STRIDE)?;
    (1..=count)
        .map(|chunk_no| base.checked_add(chunk_no))
        .collect()
}

/// Bijective base-26 label for a 1-based chunk number: `A`..`Z`, `AA`, `AB`, ...
pub(crate) fn chunk_suffix(chunk_no: usize) -> String {
    let mut remaining = chunk_no;
    let mut letters = Vec::new();
    while remaining > 0 {
        remaining -= 1;
        letters.push(char::from(b'A' + (remaining % 26) as u8));
        remaining /= 26;
    }
    letters.iter().rev().collect()
}

fn trailing_words(text: &str, count: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = words.len().saturating_sub(count);
    words[start..].join(" ")
}

fn semantic_content(record: &Record, body: Option<&str>) -> Option<String> {
    let path = record
        .semantic_path_string
        .as_deref()
        .filter(|value| !value.is_empty())?;

    match body.filter(|value| !value.is_empty()) {
        Some(body) => Some(format!("{path} | {body}")),
        None => Some(path.to_string()),
    }
}
