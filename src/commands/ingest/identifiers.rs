/// Canonical identity of a row, derived from its title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Identifier {
    pub node_id: String,
    pub anchor: String,
    pub is_numeric: bool,
}

/// Returns `None` for absent or blank titles; such rows never become records.
pub(crate) fn normalize_identifier(raw: Option<&str>) -> Option<Identifier> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }

    if is_numeric_identifier(trimmed) {
        return Some(Identifier {
            node_id: trimmed.to_string(),
            anchor: trimmed.to_string(),
            is_numeric: true,
        });
    }

    let slug = slugify(trimmed);
    Some(Identifier {
        node_id: slug.clone(),
        anchor: slug,
        is_numeric: false,
    })
}

/// Dot-delimited runs of ASCII digits, e.g. `1`, `1.2.0`, `10.4.1.3`.
pub(crate) fn is_numeric_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|ch| ch.is_ascii_digit()))
}

pub(crate) fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_separator = false;

    for ch in input.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('-');
            }
            pending_separator = false;
            out.push(ch);
        } else if ch.is_whitespace() || ch == '-' {
            pending_separator = true;
        }
    }

    if out.is_empty() {
        "untitled".to_string()
    } else {
        out
    }
}

pub(crate) fn section_anchor(section: &str) -> String {
    slugify(&format!("SECTION {section}"))
}

/// Drops one trailing `.0` from a numeric anchor (`1.2.0` -> `1.2`).
pub(crate) fn strip_trailing_zero(anchor: &str) -> &str {
    if !is_numeric_identifier(anchor) {
        return anchor;
    }
    anchor.strip_suffix(".0").unwrap_or(anchor)
}
