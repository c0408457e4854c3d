use tracing::info;

use crate::model::{CorpusStatistics, Record};

pub(crate) fn corpus_statistics(records: &[Record]) -> CorpusStatistics {
    let mut stats = CorpusStatistics::default();

    for record in records {
        *stats
            .block_types
            .entry(record.block_type.as_str().to_string())
            .or_insert(0) += 1;

        if record.confidence >= 0.8 {
            stats.confidence.high += 1;
        } else if record.confidence >= 0.6 {
            stats.confidence.medium += 1;
        } else {
            stats.confidence.low += 1;
        }

        stats.references_total += record.refs.len();
        if !record.refs.is_empty() {
            stats.records_with_references += 1;
        }

        // parents already carry the sum of their children
        if record.chunk_meta.is_none() {
            stats.tokens_total += record.tokens;
        }
    }

    stats
}

pub(crate) fn log_statistics(stats: &CorpusStatistics, record_count: usize) {
    for (block_type, count) in &stats.block_types {
        info!(
            block_type = %block_type,
            count,
            share = %format!("{:.1}%", percentage(*count, record_count)),
            "block type distribution"
        );
    }

    info!(
        high = stats.confidence.high,
        medium = stats.confidence.medium,
        low = stats.confidence.low,
        "confidence distribution (>=0.8, 0.6-0.8, <0.6)"
    );
    info!(
        references = stats.references_total,
        records_with_references = stats.records_with_references,
        share = %format!("{:.1}%", percentage(stats.records_with_references, record_count)),
        tokens = stats.tokens_total,
        "reference statistics"
    );
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}
