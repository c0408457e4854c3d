use super::identifiers::{Identifier, section_anchor};

/// Most recently seen identifier at each of the three shallowest numeric depths.
///
/// The caller owns one context per ordered pass and threads it through
/// [`resolve_hierarchy`] row by row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TraversalContext {
    pub section: Option<String>,
    pub subsection: Option<String>,
    pub subsubsection: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HierarchyLevel {
    Topic,
    Section,
    MajorSubsection,
    MinorSubsection,
    Detail,
    Unresolved,
}

impl HierarchyLevel {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            HierarchyLevel::Topic => "topic",
            HierarchyLevel::Section => "section",
            HierarchyLevel::MajorSubsection => "major_subsection",
            HierarchyLevel::MinorSubsection => "minor_subsection",
            HierarchyLevel::Detail => "detail",
            HierarchyLevel::Unresolved => "unresolved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Placement {
    pub level: HierarchyLevel,
    pub path: Vec<String>,
    pub parent_anchor: Option<String>,
}

/// Places one identifier in the hierarchy and returns the context for the next row.
///
/// Rows are expected in ascending document order. Ancestors are derived from the
/// identifier and the context alone; whether they exist as rows is not checked.
pub(crate) fn resolve_hierarchy(
    identifier: &Identifier,
    mut context: TraversalContext,
) -> (Placement, TraversalContext) {
    if !identifier.is_numeric {
        let placement = Placement {
            level: HierarchyLevel::Topic,
            path: vec![identifier.anchor.clone()],
            parent_anchor: None,
        };
        return (placement, context);
    }

    let title = identifier.node_id.as_str();
    let parts: Vec<&str> = title.split('.').collect();

    let placement = match parts.as_slice() {
        [_] => {
            context.section = Some(title.to_string());
            context.subsection = None;
            context.subsubsection = None;
            Placement {
                level: HierarchyLevel::Section,
                path: vec![section_anchor(title)],
                parent_anchor: None,
            }
        }
        [leading, _] => {
            let section = enter_section(&mut context, leading);
            context.subsection = Some(title.to_string());
            context.subsubsection = None;
            Placement {
                level: HierarchyLevel::MajorSubsection,
                path: vec![section.clone(), title.to_string()],
                parent_anchor: Some(section),
            }
        }
        [leading, _, "0"] => {
            let section = enter_section(&mut context, leading);
            context.subsection = Some(title.to_string());
            context.subsubsection = None;
            Placement {
                level: HierarchyLevel::MajorSubsection,
                path: vec![section.clone(), title.to_string()],
                parent_anchor: Some(section),
            }
        }
        [leading, second, _] => {
            let section = enter_section(&mut context, leading);
            let parent_subsection = format!("{leading}.{second}.0");
            context.subsection = Some(parent_subsection.clone());
            context.subsubsection = Some(title.to_string());
            Placement {
                level: HierarchyLevel::MinorSubsection,
                path: vec![section, parent_subsection.clone(), title.to_string()],
                parent_anchor: Some(parent_subsection),
            }
        }
        [leading, second, third, _] => {
            let section = enter_section(&mut context, leading);
            let parent_subsection = format!("{leading}.{second}.0");
            let parent_subsubsection = format!("{leading}.{second}.{third}");
            context.subsection = Some(parent_subsection.clone());
            context.subsubsection = Some(parent_subsubsection.clone());
            Placement {
                level: HierarchyLevel::Detail,
                path: vec![
                    section,
                    parent_subsection,
                    parent_subsubsection.clone(),
                    title.to_string(),
                ],
                parent_anchor: Some(parent_subsubsection),
            }
        }
        _ => Placement {
            level: HierarchyLevel::Unresolved,
            path: vec![title.to_string()],
            parent_anchor: None,
        },
    };

    (placement, context)
}

/// Switches the context to `leading` when it names a different section and
/// returns the anchor of whichever section the context now holds.
fn enter_section(context: &mut TraversalContext, leading: &str) -> String {
    if context.section.as_deref() != Some(leading) {
        context.section = Some(leading.to_string());
    }
    section_anchor(context.section.as_deref().unwrap_or(leading))
}
