use anyhow::{Context, Result};
use regex::Regex;

use crate::model::{Reference, ReferenceKind};

/// Code citation scanner: `Section 25-8-184(A)`, `LDC 25-8-514`, `Title 25-8`.
pub(crate) struct ReferenceExtractor {
    families: Vec<Regex>,
}

impl ReferenceExtractor {
    pub(crate) fn new() -> Result<Self> {
        let section = Regex::new(r"(?:\bSection|\bSec\.|§)\s*\d{1,2}-\d-\d+(?:\([A-Za-z0-9]+\))*")
            .context("failed to compile section reference regex")?;
        let ldc = Regex::new(r"\bLDC\s*\d{1,2}-\d-\d+(?:\([A-Za-z0-9]+\))*")
            .context("failed to compile LDC reference regex")?;
        let title =
            Regex::new(r"\bTitle\s*\d+-\d+").context("failed to compile title reference regex")?;

        Ok(Self {
            families: vec![section, ldc, title],
        })
    }

    /// References ordered by position; spans are character offsets into `text`.
    pub(crate) fn extract(&self, text: &str) -> Vec<Reference> {
        let mut matches = Vec::<(usize, usize)>::new();
        for family in &self.families {
            matches.extend(family.find_iter(text).map(|found| (found.start(), found.end())));
        }
        matches.sort_unstable();
        matches.dedup();

        matches
            .into_iter()
            .map(|(start, end)| Reference {
                text: text[start..end].to_string(),
                span: [char_offset(text, start), char_offset(text, end)],
                kind: ReferenceKind::Code,
            })
            .collect()
    }
}

fn char_offset(text: &str, byte_index: usize) -> usize {
    text[..byte_index].chars().count()
}
