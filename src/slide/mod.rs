/// Slide kinds: validation and render contracts per `kind` tag.
///
/// Each kind registers a handler in a [`SlideKindRegistry`] built once at
/// startup and passed by reference wherever plans are validated or
/// rendered. Adding a kind means implementing [`SlideKind`] in its own
/// file and registering it in [`SlideKindRegistry::with_builtin_kinds`]
/// (or calling `register` on a custom registry before first use).
mod code;
mod standard;
mod title;

use std::collections::BTreeMap;
use std::path::Path;

pub use code::CodeKind;
pub use standard::StandardKind;
pub use title::TitleKind;

use crate::ooxml::docx::content_type_for_extension;
use crate::ooxml::pptx::{
    ParagraphSpec, PlaceholderRef, Pptx, find_placeholder, placeholders,
};
use crate::plan::{ImageRef, Plan, Slide, resolve_image_path};

/// Validation and rendering contract of one slide kind.
pub trait SlideKind: Send + Sync {
    /// The `kind` tag this handler owns.
    fn tag(&self) -> &'static str;

    /// Name of the layout role this kind renders onto.
    fn layout_role(&self) -> &'static str;

    /// Collect every violation of this slide, never stopping at the
    /// first. `index` is the 1-based slide position used in messages.
    fn validate(&self, slide: &Slide, assets_base: &Path, index: usize) -> Vec<String>;

    /// Fill a freshly instantiated slide with this slide's content.
    fn render(&self, slide: &Slide, target: &mut RenderTarget<'_>) -> crate::ooxml::Result<()>;
}

/// Registry of slide kinds, built once and shared by reference.
pub struct SlideKindRegistry {
    kinds: BTreeMap<&'static str, Box<dyn SlideKind>>,
}

impl SlideKindRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            kinds: BTreeMap::new(),
        }
    }

    /// The registry with the built-in kinds (`title`, `standard`,
    /// `code`).
    pub fn with_builtin_kinds() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(TitleKind));
        registry.register(Box::new(StandardKind));
        registry.register(Box::new(CodeKind));
        registry
    }

    pub fn register(&mut self, kind: Box<dyn SlideKind>) {
        let tag = kind.tag();
        self.kinds.insert(tag, kind);
    }

    pub fn get(&self, tag: &str) -> Option<&dyn SlideKind> {
        self.kinds.get(tag).map(Box::as_ref)
    }

    /// Registered kind tags, sorted.
    pub fn tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.kinds.keys().copied()
    }
}

/// Validate a whole plan, collecting every violation.
///
/// Structural problems (missing `module`/`nucleus`/`slides`) are
/// reported independently of per-slide checks; per-slide checks run for
/// every slide even when earlier slides already failed.
pub fn validate_plan(
    plan: &Plan,
    assets_base: &Path,
    registry: &SlideKindRegistry,
) -> Vec<String> {
    let mut violations = Vec::new();

    if plan.module.is_none() {
        violations.push("missing required field: module".to_string());
    }
    if plan.nucleus.is_none() {
        violations.push("missing required field: nucleus".to_string());
    }
    let slides = match plan.slides {
        None => {
            violations.push("missing required field: slides".to_string());
            violations.push("slides must be a non-empty list".to_string());
            return violations;
        }
        Some(ref slides) if slides.is_empty() => {
            violations.push("slides must be a non-empty list".to_string());
            return violations;
        }
        Some(ref slides) => slides,
    };

    for (position, slide) in slides.iter().enumerate() {
        let index = position + 1;
        match registry.get(&slide.kind) {
            Some(kind) => violations.extend(kind.validate(slide, assets_base, index)),
            None => violations.push(format!("slide {index}: unknown kind ({})", slide.kind)),
        }
    }
    violations
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(str::trim).unwrap_or_default().is_empty()
}

/// Checks shared by every kind: `slide_id`, `title`, bullet entries.
pub(crate) fn common_violations(slide: &Slide, index: usize) -> Vec<String> {
    let mut violations = Vec::new();
    if is_blank(slide.slide_id.as_deref()) {
        violations.push(format!("slide {index}: slide_id missing or empty"));
    }
    if is_blank(slide.title.as_deref()) {
        violations.push(format!("slide {index}: title missing or empty"));
    }
    for (position, bullet) in slide.bullets().iter().enumerate() {
        if bullet.trim().is_empty() {
            violations.push(format!("slide {index}: bullet {} empty", position + 1));
        }
    }
    violations
}

/// Checks for a docx-sourced image: `source`, `path`, path existence.
pub(crate) fn image_violations(
    image: &ImageRef,
    assets_base: &Path,
    index: usize,
) -> Vec<String> {
    let mut violations = Vec::new();
    if is_blank(image.source.as_deref()) {
        violations.push(format!("slide {index}: image.source missing"));
    }
    match image.path.as_deref().map(str::trim) {
        None | Some("") => {
            violations.push(format!("slide {index}: image.path missing"));
        }
        Some(path) => {
            if !resolve_image_path(assets_base, path).exists() {
                violations.push(format!("slide {index}: image.path not found ({path})"));
            }
        }
    }
    violations
}

/// Check for a generation intent.
pub(crate) fn intent_violations(intent: Option<&str>, index: usize) -> Vec<String> {
    if is_blank(intent) {
        vec![format!("slide {index}: image.intent missing or empty")]
    } else {
        Vec::new()
    }
}

/// Everything a render contract needs: the open deck, the destination
/// slide and its layout, the asset root, and the layout's resolved
/// placeholder-role → structural-index table.
pub struct RenderTarget<'a> {
    pub deck: &'a mut Pptx,
    pub slide_part: String,
    pub layout_part: String,
    pub assets_base: &'a Path,
    pub placeholders: &'a BTreeMap<String, u32>,
}

/// Fallback picture box when no placeholder geometry can be resolved:
/// centered, half the slide in each dimension.
const DEFAULT_SLIDE_SIZE: (i64, i64) = (12192000, 6858000);

impl RenderTarget<'_> {
    fn role_idx(&self, role: &str) -> Option<u32> {
        self.placeholders.get(role).copied()
    }

    /// Whether `role` resolves to a placeholder present on the slide.
    pub fn has_placeholder(&self, role: &str) -> crate::ooxml::Result<bool> {
        let Some(idx) = self.role_idx(role) else {
            return Ok(false);
        };
        let xml = self.deck.package().part(&self.slide_part)?;
        let phs = placeholders(xml)?;
        Ok(find_placeholder(&phs, &PlaceholderRef::Idx(idx)).is_some())
    }

    /// Replace the text of a role's placeholder with `paragraphs`.
    /// Roles that do not resolve, or resolve to a placeholder the slide
    /// does not carry, are skipped.
    pub fn set_paragraphs(
        &mut self,
        role: &str,
        paragraphs: &[ParagraphSpec],
    ) -> crate::ooxml::Result<()> {
        let Some(idx) = self.role_idx(role) else {
            tracing::debug!(role, slide = %self.slide_part, "role not in mapping, skipping");
            return Ok(());
        };
        if !self.has_placeholder(role)? {
            tracing::debug!(role, slide = %self.slide_part, "placeholder absent, skipping");
            return Ok(());
        }
        self.deck
            .set_placeholder_text(&self.slide_part, &PlaceholderRef::Idx(idx), paragraphs)
    }

    /// Set a single-paragraph text.
    pub fn set_text(&mut self, role: &str, text: &str) -> crate::ooxml::Result<()> {
        self.set_paragraphs(role, &[ParagraphSpec::plain(text)])
    }

    /// One paragraph per bullet.
    pub fn set_bullets(&mut self, role: &str, bullets: &[String]) -> crate::ooxml::Result<()> {
        let paragraphs: Vec<ParagraphSpec> =
            bullets.iter().map(ParagraphSpec::plain).collect();
        self.set_paragraphs(role, &paragraphs)
    }

    /// Lead as the first paragraph, bullets after it.
    pub fn set_lead_with_bullets(
        &mut self,
        role: &str,
        lead: &str,
        bullets: &[String],
    ) -> crate::ooxml::Result<()> {
        let mut paragraphs = Vec::with_capacity(1 + bullets.len());
        if !lead.is_empty() {
            paragraphs.push(ParagraphSpec::plain(lead));
        }
        paragraphs.extend(bullets.iter().map(ParagraphSpec::plain));
        self.set_paragraphs(role, &paragraphs)
    }

    /// Insert the image file scaled to exactly fill the role's
    /// placeholder box. Missing roles, placeholders, and files are
    /// skipped, matching how a broken picture renders as nothing.
    pub fn insert_image(&mut self, role: &str, image_path: &Path) -> crate::ooxml::Result<()> {
        let Some(idx) = self.role_idx(role) else {
            return Ok(());
        };
        if !image_path.exists() {
            tracing::warn!(path = %image_path.display(), "image file missing, skipping");
            return Ok(());
        }
        let bounds = self.placeholder_bounds(idx)?;
        let extension = image_path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| "png".to_string());
        let content_type =
            content_type_for_extension(&extension).unwrap_or("application/octet-stream");
        let bytes = std::fs::read(image_path)?;
        self.deck
            .insert_picture(&self.slide_part, bytes, &extension, content_type, bounds)
    }

    /// Bounding box of a placeholder, searching the instantiated slide,
    /// then its layout, then the layout's master; the final fallback is
    /// a centered half-slide box.
    fn placeholder_bounds(&self, idx: u32) -> crate::ooxml::Result<(i64, i64, i64, i64)> {
        let mut parts = vec![self.slide_part.clone(), self.layout_part.clone()];
        if let Ok(master) = self.deck.layout_master(&self.layout_part) {
            parts.push(master);
        }
        for part in &parts {
            let xml = self.deck.package().part(part)?;
            let phs = placeholders(xml)?;
            if let Some(ph) = find_placeholder(&phs, &PlaceholderRef::Idx(idx)) {
                if let (Some(offset), Some(extent)) = (ph.offset, ph.extent) {
                    return Ok((offset.0, offset.1, extent.0, extent.1));
                }
            }
        }
        let (cx, cy) = self.deck.slide_size().unwrap_or(DEFAULT_SLIDE_SIZE);
        Ok((cx / 4, cy / 4, cx / 2, cy / 2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::CodeRef;

    fn slide(kind: &str) -> Slide {
        Slide {
            slide_id: Some("s1".to_string()),
            kind: kind.to_string(),
            title: Some("Título".to_string()),
            lead: None,
            bullets: None,
            image: None,
            code: None,
        }
    }

    fn plan_with(slides: Vec<Slide>) -> Plan {
        Plan {
            module: Some(1),
            nucleus: Some("mod1_nc1".to_string()),
            slides: Some(slides),
        }
    }

    #[test]
    fn test_structural_errors_reported_together() {
        let registry = SlideKindRegistry::with_builtin_kinds();
        let plan = Plan {
            module: None,
            nucleus: None,
            slides: None,
        };
        let violations = validate_plan(&plan, Path::new("/tmp"), &registry);
        assert_eq!(violations.len(), 4);
        assert!(violations[0].contains("module"));
        assert!(violations[1].contains("nucleus"));
    }

    #[test]
    fn test_empty_slides_list() {
        let registry = SlideKindRegistry::with_builtin_kinds();
        let plan = plan_with(Vec::new());
        let violations = validate_plan(&plan, Path::new("/tmp"), &registry);
        assert_eq!(violations, vec!["slides must be a non-empty list".to_string()]);
    }

    #[test]
    fn test_validation_is_total_across_slides() {
        let registry = SlideKindRegistry::with_builtin_kinds();
        let mut first = slide("title");
        first.slide_id = None;
        let mut second = slide("standard");
        second.image = Some(ImageRef {
            source: Some("generated".to_string()),
            path: None,
            intent: Some("esquema".to_string()),
        });
        // second is also missing its lead
        let violations =
            validate_plan(&plan_with(vec![first, second]), Path::new("/tmp"), &registry);
        assert!(violations.iter().any(|v| v.starts_with("slide 1:") && v.contains("slide_id")));
        assert!(violations.iter().any(|v| v.starts_with("slide 2:") && v.contains("lead")));
    }

    #[test]
    fn test_unknown_kind_named_in_violation() {
        let registry = SlideKindRegistry::with_builtin_kinds();
        let violations =
            validate_plan(&plan_with(vec![slide("diagram")]), Path::new("/tmp"), &registry);
        assert_eq!(violations, vec!["slide 1: unknown kind (diagram)".to_string()]);
    }

    #[test]
    fn test_registry_tags_and_extension() {
        let mut registry = SlideKindRegistry::with_builtin_kinds();
        let tags: Vec<&str> = registry.tags().collect();
        assert_eq!(tags, vec!["code", "standard", "title"]);

        struct QuoteKind;
        impl SlideKind for QuoteKind {
            fn tag(&self) -> &'static str {
                "quote"
            }
            fn layout_role(&self) -> &'static str {
                "standard"
            }
            fn validate(&self, slide: &Slide, _: &Path, index: usize) -> Vec<String> {
                common_violations(slide, index)
            }
            fn render(
                &self,
                slide: &Slide,
                target: &mut RenderTarget<'_>,
            ) -> crate::ooxml::Result<()> {
                target.set_text("title", slide.title())
            }
        }
        registry.register(Box::new(QuoteKind));
        assert!(registry.get("quote").is_some());

        let violations = validate_plan(
            &plan_with(vec![slide("quote")]),
            Path::new("/tmp"),
            &registry,
        );
        assert!(violations.is_empty());
    }

    #[test]
    fn test_common_violations_bullets() {
        let mut s = slide("title");
        s.bullets = Some(vec!["ok".to_string(), "  ".to_string()]);
        let violations = common_violations(&s, 3);
        assert_eq!(violations, vec!["slide 3: bullet 2 empty".to_string()]);
    }

    #[test]
    fn test_image_violations_check_existence() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("mod1_nc1")).unwrap();
        std::fs::write(tmp.path().join("mod1_nc1/img_0001.png"), b"png").unwrap();

        let present = ImageRef {
            source: Some("docx".to_string()),
            path: Some("mod1_nc1/img_0001.png".to_string()),
            intent: None,
        };
        assert!(image_violations(&present, tmp.path(), 1).is_empty());

        let missing = ImageRef {
            source: Some("docx".to_string()),
            path: Some("mod1_nc1/img_9999.png".to_string()),
            intent: None,
        };
        let violations = image_violations(&missing, tmp.path(), 1);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("img_9999.png"));
    }

    #[test]
    fn test_code_slide_requires_language_and_text() {
        let registry = SlideKindRegistry::with_builtin_kinds();
        let mut s = slide("code");
        s.code = Some(CodeRef {
            language: None,
            text: Some("print('oi')".to_string()),
        });
        let violations = validate_plan(&plan_with(vec![s]), Path::new("/tmp"), &registry);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("code.language"));
    }
}
