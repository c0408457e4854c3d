const CHUNK_LEXICON: &[&str] = &[
    "shall",
    "must",
    "required",
    "prohibited",
    "permitted",
    "approved",
    "director",
    "department",
    "city",
    "code",
    "manual",
    "criteria",
];

const BULLET_GLYPHS: &[char] = &['•', '-', '–', '*'];

pub(crate) fn record_confidence(
    title: Option<&str>,
    content: Option<&str>,
    heading_vocabulary: &[String],
) -> f64 {
    let mut confidence = 0.9;

    let title = title.filter(|value| !value.is_empty());
    let content = content.filter(|value| !value.is_empty());
    if title.is_none() && content.is_none() {
        confidence -= 0.1;
    }

    if let Some(title) = title {
        let title_lower = title.to_lowercase();
        if heading_vocabulary
            .iter()
            .any(|term| title_lower.contains(&term.to_lowercase()))
        {
            confidence += 0.05;
        }
    }

    clamp_unit(confidence)
}

pub(crate) fn chunk_confidence(chunk: &str) -> f64 {
    let mut confidence = 0.7;
    let trimmed = chunk.trim();

    if starts_with_list_marker(trimmed) {
        confidence += 0.1;
    }

    let lower = chunk.to_lowercase();
    if CHUNK_LEXICON.iter().any(|term| lower.contains(term)) {
        confidence += 0.1;
    }

    let total_chars = chunk.chars().count();
    let symbol_chars = chunk.chars().filter(|ch| is_symbol(*ch)).count();
    if trimmed.chars().count() < 40 || symbol_chars as f64 > total_chars as f64 * 0.3 {
        confidence -= 0.1;
    }

    clamp_unit(confidence)
}

fn starts_with_list_marker(text: &str) -> bool {
    let mut chars = text.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    if BULLET_GLYPHS.contains(&first) {
        return true;
    }
    if first.is_ascii_uppercase() {
        return chars.next() == Some('.');
    }
    if first.is_ascii_digit() {
        let rest = text.trim_start_matches(|ch: char| ch.is_ascii_digit());
        return rest.starts_with('.');
    }
    false
}

fn is_symbol(ch: char) -> bool {
    !(ch.is_alphanumeric() || ch == '_' || ch.is_whitespace())
}

fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
