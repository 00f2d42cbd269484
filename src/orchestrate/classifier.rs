//! Pure full-rebuild classifier: given a batch of changed paths, decide
//! whether the whole site must be rebuilt or whether incremental change
//! detection can proceed. First matching rule wins.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Deleted,
    Moved,
    Modified,
}

#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub path: String,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildReason {
    Structural,
    Template,
    Autodoc,
    SvgIcon,
    SharedContent,
    VersionConfig,
    Incremental,
}

impl RebuildReason {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Structural => "structural",
            Self::Template => "template",
            Self::Autodoc => "autodoc",
            Self::SvgIcon => "svg-icon",
            Self::SharedContent => "shared-content",
            Self::VersionConfig => "version-config",
            Self::Incremental => "incremental",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildDecision {
    pub full_rebuild: bool,
    pub reason: RebuildReason,
}

/// Predicates injected by the caller, so the classifier stays a pure
/// function with no knowledge of config or filesystem layout.
pub struct ClassifierPredicates<'a> {
    pub is_template: &'a dyn Fn(&str) -> bool,
    pub autodoc_requires_regeneration: &'a dyn Fn(&str) -> bool,
    pub is_shared_content: &'a dyn Fn(&str) -> bool,
    pub is_version_config: &'a dyn Fn(&str) -> bool,
}

/// `.svg` files under `/themes/**/assets/icons/` (POSIX-normalized)
/// trigger a full rebuild because icon sprites are inlined at multiple
/// call sites whose reverse dependencies are not individually tracked.
fn is_svg_icon(path: &str) -> bool {
    let posix = path.replace('\\', "/");
    if !posix.ends_with(".svg") {
        return false;
    }
    let Some(themes_idx) = posix.find("themes/") else {
        return false;
    };
    let after_themes = &posix[themes_idx + "themes/".len()..];
    after_themes.contains("/assets/icons/")
}

pub fn classify(events: &[ChangeEvent], predicates: &ClassifierPredicates) -> RebuildDecision {
    if events.iter().any(|e| {
        matches!(
            e.kind,
            EventKind::Created | EventKind::Deleted | EventKind::Moved
        )
    }) {
        return RebuildDecision {
            full_rebuild: true,
            reason: RebuildReason::Structural,
        };
    }

    if events.iter().any(|e| (predicates.is_template)(&e.path)) {
        return RebuildDecision {
            full_rebuild: true,
            reason: RebuildReason::Template,
        };
    }

    if events
        .iter()
        .any(|e| (predicates.autodoc_requires_regeneration)(&e.path))
    {
        return RebuildDecision {
            full_rebuild: true,
            reason: RebuildReason::Autodoc,
        };
    }

    if events.iter().any(|e| is_svg_icon(&e.path)) {
        return RebuildDecision {
            full_rebuild: true,
            reason: RebuildReason::SvgIcon,
        };
    }

    if events
        .iter()
        .any(|e| (predicates.is_shared_content)(&e.path))
    {
        return RebuildDecision {
            full_rebuild: true,
            reason: RebuildReason::SharedContent,
        };
    }

    if events
        .iter()
        .any(|e| (predicates.is_version_config)(&e.path))
    {
        return RebuildDecision {
            full_rebuild: true,
            reason: RebuildReason::VersionConfig,
        };
    }

    RebuildDecision {
        full_rebuild: false,
        reason: RebuildReason::Incremental,
    }
}
