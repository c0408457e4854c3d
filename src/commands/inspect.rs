use anyhow::Result;
use tracing::info;

use crate::cli::InspectArgs;
use crate::commands::ingest::{normalize_identifier, read_rows};
use crate::model::SourceRow;

#[derive(Debug, Default, PartialEq, Eq)]
struct RowProfile {
    rows: usize,
    untitled: usize,
    numeric_titles: usize,
    trailing_zero_titles: usize,
    max_depth: usize,
    with_subtitle: usize,
    with_content: usize,
    with_url: usize,
}

/// Reports what `ingest` would see in an input file without writing anything.
pub fn run(args: InspectArgs) -> Result<()> {
    let (format, batch) = read_rows(&args.input)?;
    let profile = profile_rows(&batch.rows);

    info!(
        input = %args.input.display(),
        format = format.as_str(),
        rows = profile.rows,
        skipped_malformed = batch.skipped_malformed,
        untitled = profile.untitled,
        numeric_titles = profile.numeric_titles,
        trailing_zero_titles = profile.trailing_zero_titles,
        max_depth = profile.max_depth,
        "input profile"
    );

    if args.detailed {
        info!(
            title = profile.rows - profile.untitled,
            subtitle = profile.with_subtitle,
            content = profile.with_content,
            url = profile.with_url,
            "non-empty cells per column"
        );
    }

    for row in batch.rows.iter().take(args.rows) {
        info!(
            line = row.line,
            title = row.title.as_deref().unwrap_or_default(),
            subtitle = row.subtitle.as_deref().unwrap_or_default(),
            content = %preview(row.content.as_deref().unwrap_or_default(), 80),
            "row"
        );
    }

    Ok(())
}

fn profile_rows(rows: &[SourceRow]) -> RowProfile {
    let mut profile = RowProfile {
        rows: rows.len(),
        ..RowProfile::default()
    };

    for row in rows {
        match normalize_identifier(row.title.as_deref()) {
            None => profile.untitled += 1,
            Some(identifier) if identifier.is_numeric => {
                profile.numeric_titles += 1;
                if identifier.node_id.ends_with(".0") {
                    profile.trailing_zero_titles += 1;
                }
                let depth = identifier.node_id.split('.').count();
                profile.max_depth = profile.max_depth.max(depth);
            }
            Some(_) => {}
        }

        profile.with_subtitle += usize::from(row.subtitle.is_some());
        profile.with_content += usize::from(row.content.is_some());
        profile.with_url += usize::from(row.url.is_some());
    }

    profile
}

fn preview(text: &str, limit: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= limit {
        flat
    } else {
        let cut: String = flat.chars().take(limit).collect();
        format!("{cut}...")
    }
}
