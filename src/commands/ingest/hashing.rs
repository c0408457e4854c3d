use crate::util::sha256_text;

const HASH_PREFIX: &str = "sha256:";
const FIELD_JOINER: &str = "|";

/// `node_id|title|subtitle|content`; the field order is part of the dedup contract.
pub(crate) fn record_hash(
    node_id: &str,
    title: Option<&str>,
    subtitle: Option<&str>,
    content: Option<&str>,
) -> String {
    stable_hash(&[
        node_id,
        title.unwrap_or_default(),
        subtitle.unwrap_or_default(),
        content.unwrap_or_default(),
    ])
}

/// `doc_id|parent_anchor|title|subtitle|chunk|chunk_no`, with a 1-based `chunk_no`.
pub(crate) fn chunk_hash(
    doc_id: &str,
    parent_anchor: &str,
    title: Option<&str>,
    subtitle: Option<&str>,
    chunk: &str,
    chunk_no: usize,
) -> String {
    let chunk_no = chunk_no.to_string();
    stable_hash(&[
        doc_id,
        parent_anchor,
        title.unwrap_or_default(),
        subtitle.unwrap_or_default(),
        chunk,
        &chunk_no,
    ])
}

fn stable_hash(fields: &[&str]) -> String {
    format!("{HASH_PREFIX}{}", sha256_text(&fields.join(FIELD_JOINER)))
}
