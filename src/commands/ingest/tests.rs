use std::fs;

use arrow::array::{Array, StringArray};
use calamine::Data;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use proptest::prelude::*;
use rusqlite::Connection;

use super::chunking::{BoundaryKind, child_orders, chunk_suffix};
use super::clean::clean_content;
use super::hashing::{chunk_hash, record_hash};
use super::hierarchy::{HierarchyLevel, TraversalContext, resolve_hierarchy};
use super::identifiers::{section_anchor, slugify, strip_trailing_zero};
use super::pipeline::Pipeline;
use super::records::{RunStamp, assemble_records, classify_block, document_order};
use super::references::ReferenceExtractor;
use super::run::{default_output_prefix, resolve_config, with_suffix};
use super::scoring::{chunk_confidence, record_confidence};
use super::sinks::{write_records_parquet, write_records_sqlite};
use super::sources::{cell_text, grid_rows, read_csv_rows, read_jsonl_rows};
use super::*;
use crate::cli::{ChunkingArgs, IngestArgs, OutputFormat, TokenMode};
use crate::error::PipelineError;
use crate::model::{
    BlockType, DEFAULT_HEADING_VOCABULARY, IngestConfig, Record, ReferenceKind, Source, SourceRow,
};

fn stamp() -> RunStamp {
    RunStamp {
        ingested_at: "2026-01-01T00:00:00Z".to_string(),
        source: Source {
            kind: "csv".to_string(),
            file: "ecm.csv".to_string(),
        },
    }
}

fn row(title: &str, subtitle: Option<&str>, content: Option<&str>) -> SourceRow {
    SourceRow {
        line: 0,
        title: Some(title.to_string()),
        subtitle: subtitle.map(str::to_string),
        content: content.map(str::to_string),
        url: None,
    }
}

fn assemble(rows: &[SourceRow], config: &IngestConfig) -> Vec<Record> {
    let references = ReferenceExtractor::new().unwrap();
    assemble_records(rows, config, &references, &stamp()).records
}

fn vocabulary() -> Vec<String> {
    DEFAULT_HEADING_VOCABULARY
        .iter()
        .map(|term| term.to_string())
        .collect()
}

/// Distinct sentences of nine words each (about seven tokens by word estimate).
fn long_content(sentences: usize) -> String {
    (1..=sentences)
        .map(|n| format!("Sentence number {n} requires the director to review it."))
        .collect::<Vec<_>>()
        .join(" ")
}

fn approx(left: f64, right: f64) -> bool {
    (left - right).abs() < 1e-9
}

#[test]
fn numeric_identifiers_are_placed_by_depth() {
    let mut context = TraversalContext::default();
    let mut placements = Vec::new();
    for title in ["1", "1.2.0", "1.2.1", "1.2.1.1"] {
        let identifier = normalize_identifier(Some(title)).unwrap();
        let (placement, next) = resolve_hierarchy(&identifier, context);
        context = next;
        placements.push(placement);
    }

    assert_eq!(placements[0].path, vec!["section-1"]);
    assert_eq!(placements[0].parent_anchor, None);
    assert_eq!(placements[0].level, HierarchyLevel::Section);

    assert_eq!(placements[1].path, vec!["section-1", "1.2.0"]);
    assert_eq!(placements[1].parent_anchor.as_deref(), Some("section-1"));

    assert_eq!(placements[2].path, vec!["section-1", "1.2.0", "1.2.1"]);
    assert_eq!(placements[2].parent_anchor.as_deref(), Some("1.2.0"));

    assert_eq!(
        placements[3].path,
        vec!["section-1", "1.2.0", "1.2.1", "1.2.1.1"]
    );
    assert_eq!(placements[3].parent_anchor.as_deref(), Some("1.2.1"));
    assert_eq!(placements[3].level, HierarchyLevel::Detail);

    assert_eq!(context.section.as_deref(), Some("1"));
    assert_eq!(context.subsection.as_deref(), Some("1.2.0"));
    assert_eq!(context.subsubsection.as_deref(), Some("1.2.1"));
}

#[test]
fn two_part_identifier_hangs_off_its_section() {
    let identifier = normalize_identifier(Some("3.4")).unwrap();
    let (placement, context) = resolve_hierarchy(&identifier, TraversalContext::default());

    assert_eq!(placement.path, vec!["section-3", "3.4"]);
    assert_eq!(placement.parent_anchor.as_deref(), Some("section-3"));
    assert_eq!(context.subsection.as_deref(), Some("3.4"));
}

#[test]
fn free_text_identifier_is_a_root_and_keeps_context() {
    let context = TraversalContext {
        section: Some("2".to_string()),
        ..TraversalContext::default()
    };
    let identifier = normalize_identifier(Some("General Provisions")).unwrap();
    let (placement, next) = resolve_hierarchy(&identifier, context.clone());

    assert_eq!(identifier.anchor, "general-provisions");
    assert!(!identifier.is_numeric);
    assert_eq!(placement.level, HierarchyLevel::Topic);
    assert_eq!(placement.path, vec!["general-provisions"]);
    assert_eq!(placement.parent_anchor, None);
    assert_eq!(next, context);
}

#[test]
fn identifiers_deeper_than_four_parts_are_unresolved() {
    let identifier = normalize_identifier(Some("1.2.3.4.5")).unwrap();
    let (placement, _) = resolve_hierarchy(&identifier, TraversalContext::default());

    assert_eq!(placement.level, HierarchyLevel::Unresolved);
    assert_eq!(placement.path, vec!["1.2.3.4.5"]);
    assert_eq!(placement.parent_anchor, None);
}

#[test]
fn normalize_identifier_trims_and_rejects_blank_titles() {
    assert_eq!(normalize_identifier(None), None);
    assert_eq!(normalize_identifier(Some("   ")), None);

    let numeric = normalize_identifier(Some(" 1.2.0 ")).unwrap();
    assert!(numeric.is_numeric);
    assert_eq!(numeric.node_id, "1.2.0");
    assert_eq!(numeric.anchor, "1.2.0");
}

#[test]
fn slugify_handles_common_titles() {
    assert_eq!(slugify("Operating Permit"), "operating-permit");
    assert_eq!(slugify("  A -- B  "), "a-b");
    assert_eq!(slugify("Fees & Charges"), "fees-charges");
    assert_eq!(slugify("snake_case"), "snakecase");
    assert_eq!(slugify("!!!"), "untitled");
    assert_eq!(section_anchor("12"), "section-12");
}

#[test]
fn strip_trailing_zero_only_touches_numeric_anchors() {
    assert_eq!(strip_trailing_zero("1.2.0"), "1.2");
    assert_eq!(strip_trailing_zero("10"), "10");
    assert_eq!(strip_trailing_zero("general.0"), "general.0");
}

#[test]
fn references_are_found_with_character_spans() {
    let extractor = ReferenceExtractor::new().unwrap();
    let refs = extractor.extract("Section 25-8-184 defines... LDC 25-8-514.");

    assert_eq!(refs.len(), 2);
    assert_eq!(refs[0].text, "Section 25-8-184");
    assert_eq!(refs[0].span, [0, 16]);
    assert_eq!(refs[0].kind, ReferenceKind::Code);
    assert_eq!(refs[1].text, "LDC 25-8-514");
    assert_eq!(refs[1].span, [28, 40]);
}

#[test]
fn reference_spans_count_characters_not_bytes() {
    let extractor = ReferenceExtractor::new().unwrap();
    let refs = extractor.extract("See § 25-8-2 and Title 25-8.");

    assert_eq!(refs.len(), 2);
    assert_eq!(refs[0].text, "§ 25-8-2");
    assert_eq!(refs[0].span, [4, 12]);
    assert_eq!(refs[1].text, "Title 25-8");
    assert_eq!(refs[1].span, [17, 27]);
}

#[test]
fn subsection_suffixes_stay_in_the_reference() {
    let extractor = ReferenceExtractor::new().unwrap();
    let refs = extractor.extract("as required by Sec. 25-8-184(A)(2), not 25-8-184");

    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].text, "Sec. 25-8-184(A)(2)");
}

#[test]
fn vocabulary_title_scores_at_least_point_nine() {
    let score = record_confidence(Some("General"), Some("Applies citywide."), &vocabulary());
    assert!(score >= 0.9);
    assert!(approx(score, 0.95));

    let empty = record_confidence(None, None, &vocabulary());
    assert!(approx(empty, 0.8));
}

#[test]
fn chunk_confidence_rewards_list_markers_and_lexicon() {
    let rich = chunk_confidence("A. The director shall approve the plan before any work begins.");
    assert!(approx(rich, 0.9));

    let short = chunk_confidence("see above");
    assert!(approx(short, 0.6));
}

proptest! {
    #[test]
    fn chunk_confidence_stays_in_unit_interval(text in ".{0,200}") {
        let score = chunk_confidence(&text);
        prop_assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn slugs_are_non_empty_and_hyphen_separated(text in ".{0,80}") {
        let slug = slugify(&text);
        prop_assert!(!slug.is_empty());
        prop_assert!(!slug.starts_with('-') && !slug.ends_with('-'));
        prop_assert!(!slug.contains("--"));
        prop_assert!(slug.chars().all(|ch| ch.is_alphanumeric() || ch == '-'));
    }
}

#[test]
fn record_hash_is_stable_and_content_sensitive() {
    let first = record_hash("1.2.0", Some("1.2.0"), Some("Permits"), Some("text"));
    let second = record_hash("1.2.0", Some("1.2.0"), Some("Permits"), Some("text"));
    let changed = record_hash("1.2.0", Some("1.2.0"), Some("Permits"), Some("text!"));

    assert_eq!(first, second);
    assert_ne!(first, changed);
    assert!(first.starts_with("sha256:"));
    assert_eq!(first.len(), "sha256:".len() + 64);
    assert_eq!(
        record_hash("x", None, None, None),
        record_hash("x", Some(""), Some(""), Some(""))
    );
}

#[test]
fn chunk_hash_depends_on_position() {
    let first = chunk_hash("ecm", "1.2", Some("1.2"), None, "body", 1);
    let second = chunk_hash("ecm", "1.2", Some("1.2"), None, "body", 2);
    assert_ne!(first, second);
}

#[test]
fn block_types_follow_content_cues() {
    assert_eq!(classify_block(Some("1"), None), BlockType::Heading);
    assert_eq!(classify_block(Some("Definitions"), None), BlockType::Glossary);
    assert_eq!(
        classify_block(Some("1.2"), Some("Impervious cover means any surface.")),
        BlockType::Glossary
    );
    assert_eq!(
        classify_block(Some("1.3"), Some("a | b | c | d")),
        BlockType::Table
    );
    assert_eq!(classify_block(None, Some("plain")), BlockType::Para);
}

#[test]
fn document_order_pads_numeric_parts() {
    let order = |title: &str| document_order(&normalize_identifier(Some(title)).unwrap());
    assert_eq!(order("1.2.1"), Some(1_002_001));
    assert_eq!(order("2"), Some(2));
    assert_eq!(order("General"), None);
}

#[test]
fn assembled_records_follow_the_document_hierarchy() {
    let config = IngestConfig::with_doc_id("ecm");
    let rows = vec![
        row("1", None, None),
        SourceRow {
            title: None,
            content: Some("orphan".to_string()),
            ..SourceRow::default()
        },
        row("1.2.0", Some("Permits"), Some("See Section 25-8-184.")),
        row("General", None, Some("Applies citywide.")),
    ];

    let records = assemble(&rows, &config);
    assert_eq!(records.len(), 3);

    let section = &records[0];
    assert_eq!(section.anchor, "1");
    assert_eq!(section.path, vec!["section-1"]);
    assert_eq!(section.parent_anchor, None);
    assert_eq!(section.block_type, BlockType::Heading);
    assert_eq!(section.section_labels.section.as_deref(), Some("section-1"));

    let permits = &records[1];
    assert_eq!(permits.parent_anchor.as_deref(), Some("section-1"));
    assert_eq!(permits.refs.len(), 1);
    assert_eq!(permits.order, 1_002_000);
    assert_eq!(permits.section_labels.chapter.as_deref(), Some("1.2.0"));
    assert_eq!(permits.source.file, "ecm.csv");

    let general = &records[2];
    assert_eq!(general.anchor, "general");
    assert_eq!(general.order, permits.order);
    assert!(general.confidence >= 0.9);
}

#[test]
fn duplicate_anchors_are_suffixed() {
    let config = IngestConfig::with_doc_id("ecm");
    let rows = vec![
        row("General", None, None),
        row("General", None, Some("again")),
    ];
    let references = ReferenceExtractor::new().unwrap();
    let assembled = assemble_records(&rows, &config, &references, &stamp());

    assert_eq!(assembled.duplicate_anchors, 1);
    assert_eq!(assembled.warnings.len(), 1);
    assert_eq!(assembled.records[1].anchor, "general-2");
    assert_eq!(assembled.records[1].path, vec!["general-2"]);
}

#[test]
fn normalized_anchors_drop_trailing_zero_everywhere() {
    let mut config = IngestConfig::with_doc_id("ecm");
    config.normalize_anchors = true;

    let records = assemble(
        &[row("1.2.0", None, None), row("1.2.1", None, None)],
        &config,
    );

    assert_eq!(records[0].anchor, "1.2");
    assert_eq!(records[1].parent_anchor.as_deref(), Some("1.2"));
    assert_eq!(records[1].path, vec!["section-1", "1.2", "1.2.1"]);
    assert_eq!(records[1].node_id, "1.2.1");
}

fn semantic_fixture() -> Vec<Record> {
    let config = IngestConfig::with_doc_id("ecm");
    assemble(
        &[
            row("Section 1", Some("Section 1 Administrative Provisions"), None),
            row("1.2.0", Some("Permits"), None),
            row("1.2.1", Some("Applications"), None),
            row("1.2.1.1", None, Some("Submit the form.")),
        ],
        &config,
    )
}

#[test]
fn semantic_paths_use_descriptive_ancestor_labels() {
    let builder = SemanticPathBuilder::new().unwrap();
    let records = builder.annotate(semantic_fixture()).unwrap();

    assert_eq!(
        records[0].semantic_path,
        Some(vec!["1 administrative provisions".to_string()])
    );
    assert_eq!(
        records[3].semantic_path_string.as_deref(),
        Some("1 administrative provisions > permits > applications")
    );
}

#[test]
fn semantic_annotation_is_idempotent() {
    let builder = SemanticPathBuilder::new().unwrap();
    let once = builder.annotate(semantic_fixture()).unwrap();
    let twice = builder.annotate(once.clone()).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn clean_segment_strips_labels_and_punctuation() {
    let builder = SemanticPathBuilder::new().unwrap();
    assert_eq!(builder.clean_segment("Chapter 4: Water Quality!"), "4 water quality");
    assert_eq!(builder.clean_segment("Partition Rules"), "partition rules");
    assert_eq!(builder.clean_segment("Section5 Drainage"), "section5 drainage");
    assert_eq!(builder.clean_segment("Sec. 5 Drainage"), "5 drainage");
    assert_eq!(builder.clean_segment("§§"), "untitled");
}

#[test]
fn parent_cycles_fail_instead_of_looping() {
    let config = IngestConfig::with_doc_id("ecm");
    let mut records = assemble(&[row("alpha", None, None), row("beta", None, None)], &config);
    records[0].parent_anchor = Some("beta".to_string());
    records[1].parent_anchor = Some("alpha".to_string());

    let builder = SemanticPathBuilder::new().unwrap();
    let err = builder.annotate(records).unwrap_err();
    assert_eq!(
        err,
        PipelineError::SemanticPathCycle {
            anchor: "alpha".to_string(),
            limit: 2,
        }
    );
}

#[test]
fn over_budget_record_gets_lettered_children() {
    let config = IngestConfig::with_doc_id("ecm");
    let content = long_content(75);
    let records = assemble(
        &[
            row("1", None, None),
            row("1.2.0", None, None),
            row("1.2.1", None, None),
            row("1.2.1.1", None, Some(&content)),
        ],
        &config,
    );
    let detail = records[3].clone();
    assert_eq!(detail.path, vec!["section-1", "1.2.0", "1.2.1", "1.2.1.1"]);
    assert_eq!(detail.parent_anchor.as_deref(), Some("1.2.1"));

    let counter = TokenCounter::Words;
    assert!(counter.count(&content) >= 500);
    let chunker = Chunker::new(&counter, 300).unwrap();
    let out = chunker.chunk_record(detail).records;

    let parent = &out[0];
    let children = &out[1..];
    assert!(children.len() >= 2);
    assert_eq!(parent.has_children, Some(true));
    assert_eq!(parent.child_count, Some(children.len()));
    assert_eq!(
        parent.tokens,
        children.iter().map(|child| child.tokens).sum::<usize>()
    );

    assert_eq!(children[0].anchor, "1.2.1.1_A");
    assert_eq!(children[1].anchor, "1.2.1.1_B");
    for (position, child) in children.iter().enumerate() {
        let meta = child.chunk_meta.as_ref().unwrap();
        assert_eq!(meta.chunk_no, position + 1);
        assert_eq!(meta.chunk_count, children.len());
        assert_eq!(child.parent_anchor.as_deref(), Some("1.2.1.1"));
        assert_eq!(child.block_type, BlockType::Para);
        assert_eq!(child.order, parent.order * 1000 + (position as i64 + 1));
        assert!(child.tokens <= 300);
        assert_eq!(child.path.last(), Some(&child.anchor));
    }

    for n in 1..=75 {
        let needle = format!("number {n} requires");
        assert!(
            children
                .iter()
                .any(|child| child.content.as_deref().unwrap_or_default().contains(&needle)),
            "sentence {n} lost"
        );
    }
}

#[test]
fn within_budget_record_is_left_whole() {
    let counter = TokenCounter::Words;
    let chunker = Chunker::new(&counter, 300).unwrap();
    let config = IngestConfig::with_doc_id("ecm");
    let record = assemble(&[row("1.2", None, Some("A short body."))], &config).remove(0);

    let out = chunker.chunk_record(record);
    assert!(!out.order_fallback);
    let out = out.records;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].tokens, 2);
    assert_eq!(out[0].has_children, None);
}

#[test]
fn more_than_twenty_six_chunks_use_two_letter_suffixes() {
    let content = (1..=30)
        .map(|n| format!("- the director shall approve item {n}"))
        .collect::<Vec<_>>()
        .join("\n");
    let config = IngestConfig::with_doc_id("ecm");
    let record = assemble(&[row("4.1", None, Some(&content))], &config).remove(0);

    let counter = TokenCounter::Words;
    let chunker = Chunker::new(&counter, 10).unwrap();
    let out = chunker.chunk_record(record).records;

    assert_eq!(out.len(), 31);
    assert_eq!(out[26].anchor, "4.1_Z");
    assert_eq!(out[27].anchor, "4.1_AA");
    assert_eq!(out[30].anchor, "4.1_AD");
}

#[test]
fn chunk_suffixes_are_bijective_base_26() {
    assert_eq!(chunk_suffix(1), "A");
    assert_eq!(chunk_suffix(26), "Z");
    assert_eq!(chunk_suffix(27), "AA");
    assert_eq!(chunk_suffix(52), "AZ");
    assert_eq!(chunk_suffix(53), "BA");
    assert_eq!(chunk_suffix(702), "ZZ");
    assert_eq!(chunk_suffix(703), "AAA");
}

#[test]
fn lettered_markers_win_over_numbered_ones() {
    let counter = TokenCounter::Words;
    let chunker = Chunker::new(&counter, 300).unwrap();
    let split = chunker
        .split_on_boundaries("Intro text here.\nA. first item\nB. second item\n1. numbered");

    assert_eq!(split.kind, Some(BoundaryKind::Lettered));
    assert_eq!(
        split.pieces,
        vec![
            "Intro text here.\n",
            "A. first item\n",
            "B. second item\n1. numbered"
        ]
    );

    let bullets = chunker.split_on_boundaries("- one\n- two");
    assert_eq!(bullets.kind, Some(BoundaryKind::Bulleted));
    assert_eq!(bullets.pieces, vec!["- one\n", "- two"]);

    let plain = chunker.split_on_boundaries("no markers at all");
    assert_eq!(plain.kind, None);
    assert_eq!(plain.pieces, vec!["no markers at all"]);
}

#[test]
fn windows_overlap_by_trailing_words() {
    let counter = TokenCounter::Words;
    let chunker = Chunker::new(&counter, 12).unwrap();
    let text = "Alpha beta gamma delta epsilon zeta eta theta. \
                Iota kappa lambda mu nu xi omicron pi. \
                Rho sigma tau upsilon phi chi psi omega.";

    let windows = chunker.window(text);
    assert_eq!(windows.len(), 3);
    assert_eq!(windows[0], "Alpha beta gamma delta epsilon zeta eta theta.");
    assert!(windows[1].starts_with("delta epsilon zeta eta theta. Iota"));
    assert!(windows[2].starts_with("mu nu xi omicron pi. Rho"));
}

#[test]
fn child_orders_stay_below_the_next_parent() {
    assert_eq!(child_orders(3, 2), Some(vec![3001, 3002]));
    assert_eq!(child_orders(3, 999).map(|orders| orders[998]), Some(3999));
    assert_eq!(child_orders(3, 1000), None);
    assert_eq!(child_orders(i64::MAX / 1000 + 1, 1), None);
    assert_eq!(child_orders(i64::MAX, 2), None);
}

#[test]
fn unencodable_child_order_falls_back_to_the_parent_order() {
    let config = IngestConfig::with_doc_id("ecm");
    let mut record = assemble(&[row("7.1", None, Some(&long_content(60)))], &config).remove(0);
    record.order = i64::MAX;

    let counter = TokenCounter::Words;
    let chunker = Chunker::new(&counter, 50).unwrap();
    let out = chunker.chunk_record(record);
    assert!(out.order_fallback);

    let parent = &out.records[0];
    let children = &out.records[1..];
    assert!(children.len() >= 2);
    assert_eq!(parent.child_count, Some(children.len()));
    assert_eq!(children[0].anchor, "7.1_A");
    assert!(children.iter().all(|child| child.order == i64::MAX));
}

#[test]
fn deep_identifier_with_long_content_does_not_abort_the_batch() {
    let mut config = IngestConfig::with_doc_id("ecm");
    config.max_tokens = 50;
    let counter = TokenCounter::Words;
    let pipeline = Pipeline::new(&config, &counter).unwrap();

    let content = long_content(30);
    let rows = vec![
        row("1", None, Some("Intro.")),
        row("1.2.3.4.5.6.7", None, Some(&content)),
    ];

    let output = pipeline.run(&rows, &stamp()).unwrap();
    assert_eq!(output.records_resolved, 2);
    assert_eq!(output.order_fallbacks, 1);
    assert!(output.chunk_records >= 2);
    assert!(
        output
            .warnings
            .iter()
            .any(|warning| warning.contains("1.2.3.4.5.6.7") && warning.contains("child order"))
    );

    let deep = output
        .records
        .iter()
        .find(|record| record.anchor == "1.2.3.4.5.6.7")
        .unwrap();
    let children: Vec<_> = output
        .records
        .iter()
        .filter(|record| record.parent_anchor.as_deref() == Some("1.2.3.4.5.6.7"))
        .collect();
    assert_eq!(deep.child_count, Some(children.len()));
    assert!(children.iter().all(|child| child.order == deep.order));
}

#[test]
fn clean_content_decodes_entities_and_tidies_spacing() {
    let cleaned =
        clean_content("Fees&nbsp;&amp; charges ( see below ) , then\r\n\r\n\r\nNext   line\n\n");
    assert_eq!(
        cleaned.as_deref(),
        Some("Fees & charges (see below), then\n\nNext line")
    );
    assert_eq!(clean_content("  \n "), None);
}

#[test]
fn pipeline_reports_counts() {
    let mut config = IngestConfig::with_doc_id("ecm");
    config.max_tokens = 100;
    let counter = TokenCounter::Words;
    let pipeline = Pipeline::new(&config, &counter).unwrap();

    let content = long_content(40);
    let rows = vec![
        row("Section 2", None, None),
        row("2.1", Some("Scope"), Some("Short scope.")),
        row("2.2", Some("Rules"), Some(&content)),
        SourceRow::default(),
    ];

    let output = pipeline.run(&rows, &stamp()).unwrap();
    assert_eq!(output.skipped_untitled, 1);
    assert_eq!(output.records_resolved, 3);
    assert_eq!(output.chunked_parents, 1);
    assert_eq!(output.records.len(), 3 + output.chunk_records);
    assert!(output.chunk_records >= 2);

    let scope = &output.records[1];
    assert_eq!(scope.semantic_path_string.as_deref(), Some("2 > scope"));
    assert_eq!(
        scope.semantic_content.as_deref(),
        Some("2 > scope | Short scope.")
    );

    let stats = corpus_statistics(&output.records);
    let parent_tokens = output.records[2].tokens;
    assert_eq!(stats.tokens_total, scope.tokens + parent_tokens);
}

#[test]
fn jsonl_rows_accept_any_key_case_and_skip_bad_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ecm.jsonl");
    fs::write(
        &path,
        "{\"Title\":\"1\",\"Subtitle\":\"Section 1\",\"Content\":\"x\"}\n\
         not json\n\
         \n\
         {\"title\": 1.2, \"content\": null}\n",
    )
    .unwrap();

    let batch = read_jsonl_rows(&path).unwrap();
    assert_eq!(batch.rows.len(), 2);
    assert_eq!(batch.skipped_malformed, 1);
    assert_eq!(batch.rows[0].subtitle.as_deref(), Some("Section 1"));
    assert_eq!(batch.rows[1].title.as_deref(), Some("1.2"));
    assert_eq!(batch.rows[1].content, None);
    assert_eq!(batch.rows[1].line, 4);
}

#[test]
fn csv_rows_map_columns_by_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ecm.csv");
    fs::write(
        &path,
        "URL,Title,Subtitle,Content\n,1,Section 1,\nhttp://x,1.2.0,Permits,\"Some, text\"\n",
    )
    .unwrap();

    let batch = read_csv_rows(&path).unwrap();
    assert_eq!(batch.rows.len(), 2);
    assert_eq!(batch.rows[0].line, 2);
    assert_eq!(batch.rows[0].content, None);
    assert_eq!(batch.rows[0].url, None);
    assert_eq!(batch.rows[1].content.as_deref(), Some("Some, text"));
    assert_eq!(batch.rows[1].url.as_deref(), Some("http://x"));
}

#[test]
fn unknown_input_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ecm.txt");
    fs::write(&path, "Title\n1\n").unwrap();
    assert!(read_rows(&path).is_err());
}

#[test]
fn records_survive_jsonl_and_sqlite_output() {
    let config = IngestConfig::with_doc_id("ecm");
    let builder = SemanticPathBuilder::new().unwrap();
    let records = builder.annotate(semantic_fixture()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let jsonl = dir.path().join("out").join("ecm.jsonl");
    write_records_jsonl(&jsonl, &records).unwrap();
    let (loaded, skipped) = read_records_jsonl(&jsonl).unwrap();
    assert_eq!(skipped, 0);
    assert_eq!(loaded, records);

    let sqlite = dir.path().join("ecm.sqlite");
    assert_eq!(
        write_records_sqlite(&sqlite, &config.doc_id, &records).unwrap(),
        records.len()
    );
    write_records_sqlite(&sqlite, &config.doc_id, &records).unwrap();

    let connection = Connection::open(&sqlite).unwrap();
    let count: i64 = connection
        .query_row(
            "SELECT COUNT(*) FROM records WHERE doc_id = ?1",
            [config.doc_id.as_str()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(count, records.len() as i64);

    let parent: Option<String> = connection
        .query_row(
            "SELECT parent_anchor FROM records WHERE anchor = '1.2.1'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(parent.as_deref(), Some("1.2.0"));
}

fn chunked_run(sentences: usize, max_tokens: usize) -> Vec<Record> {
    let mut config = IngestConfig::with_doc_id("ecm");
    config.max_tokens = max_tokens;
    let counter = TokenCounter::Words;
    let content = long_content(sentences);
    let rows = vec![
        row("2", Some("Streets"), None),
        row("2.1", Some("Permits"), Some(&content)),
    ];
    Pipeline::new(&config, &counter)
        .unwrap()
        .run(&rows, &stamp())
        .unwrap()
        .records
}

#[test]
fn sqlite_rerun_replaces_rows_of_the_same_document() {
    let first = chunked_run(30, 20);
    let second = chunked_run(8, 20);
    assert!(first.len() > second.len());

    let dir = tempfile::tempdir().unwrap();
    let sqlite = dir.path().join("ecm.sqlite");
    let other: Vec<Record> = first
        .iter()
        .cloned()
        .map(|mut record| {
            record.doc_id = "other".to_string();
            record
        })
        .collect();
    write_records_sqlite(&sqlite, "ecm", &first).unwrap();
    write_records_sqlite(&sqlite, "other", &other).unwrap();
    write_records_sqlite(&sqlite, "ecm", &second).unwrap();

    let connection = Connection::open(&sqlite).unwrap();
    let count = |sql: &str| -> i64 { connection.query_row(sql, [], |row| row.get(0)).unwrap() };
    assert_eq!(
        count("SELECT COUNT(*) FROM records WHERE doc_id = 'ecm'"),
        second.len() as i64
    );
    assert_eq!(
        count("SELECT COUNT(*) FROM records WHERE doc_id = 'other'"),
        first.len() as i64
    );

    let child_count = count(
        "SELECT child_count FROM records WHERE doc_id = 'ecm' AND anchor = '2.1'",
    );
    let child_rows = count(
        "SELECT COUNT(*) FROM records WHERE doc_id = 'ecm' AND parent_anchor = '2.1'",
    );
    assert!(child_count >= 2);
    assert_eq!(child_rows, child_count);
}

#[test]
fn parquet_output_flattens_section_labels() {
    let records = chunked_run(30, 20);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("ecm.parquet");
    assert_eq!(write_records_parquet(&path, &records).unwrap(), records.len());

    let reader = ParquetRecordBatchReaderBuilder::try_new(fs::File::open(&path).unwrap())
        .unwrap()
        .build()
        .unwrap();
    let batches: Vec<_> = reader.collect::<Result<_, _>>().unwrap();
    let rows: usize = batches.iter().map(|batch| batch.num_rows()).sum();
    assert_eq!(rows, records.len());

    let batch = &batches[0];
    assert!(batch.column_by_name("section_labels").is_none());
    for name in ["section", "chapter", "subsection", "semantic_path", "anchor"] {
        assert!(batch.column_by_name(name).is_some(), "missing column {name}");
    }
    let anchors = batch
        .column_by_name("anchor")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(anchors.value(0), records[0].anchor);
    let sections = batch
        .column_by_name("section")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(
        sections.value(1),
        records[1].section_labels.section.as_deref().unwrap()
    );
}

#[test]
fn empty_record_set_writes_an_empty_parquet_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.parquet");
    assert_eq!(write_records_parquet(&path, &[]).unwrap(), 0);
    assert!(path.exists());
}

fn grid(rows: &[&[&str]]) -> Vec<Vec<Option<String>>> {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
                .collect()
        })
        .collect()
}

#[test]
fn sheet_header_is_found_below_leading_blank_rows() {
    let sheet = grid(&[
        &["", "", ""],
        &["Code of Ordinances", "", ""],
        &["Content", "title", "Subtitle"],
        &["Body text", "1", "General"],
        &["", "", ""],
        &["More text", "1.1", ""],
    ]);

    let batch = grid_rows(&sheet, 1).unwrap();
    assert_eq!(batch.rows.len(), 3);
    assert_eq!(batch.rows[0].line, 4);
    assert_eq!(batch.rows[0].title.as_deref(), Some("1"));
    assert_eq!(batch.rows[0].subtitle.as_deref(), Some("General"));
    assert_eq!(batch.rows[0].content.as_deref(), Some("Body text"));
    assert_eq!(batch.rows[0].url, None);
    assert_eq!(batch.rows[1].title, None);
    assert_eq!(batch.rows[2].line, 6);
    assert_eq!(batch.rows[2].subtitle, None);
}

#[test]
fn sheet_lines_account_for_the_used_range_offset() {
    let sheet = grid(&[&["Title"], &["1"], &["2"]]);
    let batch = grid_rows(&sheet, 3).unwrap();
    assert_eq!(batch.rows[0].line, 4);
    assert_eq!(batch.rows[1].line, 5);
}

#[test]
fn sheet_without_title_header_is_rejected() {
    let sheet = grid(&[&["Heading", "Body"], &["1", "text"]]);
    assert!(grid_rows(&sheet, 1).is_none());
}

#[test]
fn spreadsheet_cells_become_trimmed_text() {
    assert_eq!(cell_text(&Data::Float(1.0)).as_deref(), Some("1"));
    assert_eq!(cell_text(&Data::Float(1.1)).as_deref(), Some("1.1"));
    assert_eq!(cell_text(&Data::Int(12)).as_deref(), Some("12"));
    assert_eq!(cell_text(&Data::String("  1.2.0 ".to_string())).as_deref(), Some("1.2.0"));
    assert_eq!(cell_text(&Data::String("   ".to_string())), None);
    assert_eq!(cell_text(&Data::Empty), None);
}

fn ingest_args(heading_terms: &[&str], max_tokens: usize) -> IngestArgs {
    IngestArgs {
        input: "data/ecm.xlsx".into(),
        output_prefix: None,
        doc_id: " ecm ".to_string(),
        output_format: OutputFormat::Jsonl,
        normalize_anchors: true,
        heading_terms: heading_terms.iter().map(|term| term.to_string()).collect(),
        clean_content: false,
        source_label: None,
        manifest_path: None,
        chunking: ChunkingArgs {
            max_tokens,
            token_mode: TokenMode::Words,
        },
    }
}

#[test]
fn resolve_config_applies_overrides_and_defaults() {
    let config = resolve_config(&ingest_args(&[], 120)).unwrap();
    assert_eq!(config.doc_id, "ecm");
    assert_eq!(config.max_tokens, 120);
    assert!(config.normalize_anchors);
    assert_eq!(config.heading_vocabulary, vocabulary());

    let custom = resolve_config(&ingest_args(&["Drainage", " Drainage ", ""], 120)).unwrap();
    assert_eq!(custom.heading_vocabulary, vec!["Drainage".to_string()]);

    assert!(resolve_config(&ingest_args(&[], 0)).is_err());
}

#[test]
fn output_paths_derive_from_the_input_stem() {
    let prefix = default_output_prefix(std::path::Path::new("data/ecm.xlsx"));
    assert_eq!(prefix, std::path::PathBuf::from("data/ecm"));
    assert_eq!(
        with_suffix(&prefix, ".manifest.json"),
        std::path::PathBuf::from("data/ecm.manifest.json")
    );
}
