use crate::model::SourceRow;

pub(crate) fn clean_row(row: SourceRow) -> SourceRow {
    SourceRow {
        content: row.content.as_deref().and_then(clean_content),
        ..row
    }
}

/// Decodes common HTML entities and tidies spacing while keeping line breaks,
/// so list markers stay at the start of their lines.
pub(crate) fn clean_content(raw: &str) -> Option<String> {
    let decoded = raw
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace('\u{00a0}', " ")
        .replace("\r\n", "\n");

    let mut lines = Vec::<String>::new();
    for line in decoded.lines() {
        let collapsed = tidy_line(line);
        if collapsed.is_empty() {
            if lines.last().is_some_and(|previous| !previous.is_empty()) {
                lines.push(String::new());
            }
            continue;
        }
        lines.push(collapsed);
    }

    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }

    let cleaned = lines.join("\n");
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

fn tidy_line(line: &str) -> String {
    let collapsed = line.split_whitespace().collect::<Vec<&str>>().join(" ");

    let mut out = String::with_capacity(collapsed.len());
    let mut chars = collapsed.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '(' | '[' => {
                out.push(ch);
                while chars.peek() == Some(&' ') {
                    chars.next();
                }
            }
            ' ' if matches!(chars.peek(), Some(')' | ']' | ',' | ';' | ':' | '!' | '?')) => {}
            _ => out.push(ch),
        }
    }
    out
}
