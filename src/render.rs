/// Final deck rendering: a validated plan plus the template and its
/// mapping become `<unit>.pptx`.
///
/// The template is opened fresh for every render. Slides left in the
/// template that use one of the mapped layouts are sentinels (authoring
/// examples) and get deleted before any content slide is added.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::ooxml::OoxmlError;
use crate::ooxml::pptx::{Pptx, slide_name};
use crate::plan::{Plan, Slide};
use crate::slide::{RenderTarget, SlideKind, SlideKindRegistry};
use crate::template::{TemplateError, TemplateMapping, find_layout_part, map_path_for_template};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("template mapping not found: {0} (build the mapping before rendering)")]
    MappingNotFound(PathBuf),
    #[error("template has no slide layouts")]
    NoLayouts,
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Ooxml(#[from] OoxmlError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RenderError>;

/// Render a plan into `output`, loading the mapping persisted beside
/// the template. An optional `cover_title` adds a title slide before
/// the plan's own slides.
pub fn render_plan(
    plan: &Plan,
    template: &Path,
    output: &Path,
    assets_base: &Path,
    cover_title: Option<&str>,
    registry: &SlideKindRegistry,
) -> Result<()> {
    let map_path = map_path_for_template(template);
    if !map_path.exists() {
        return Err(RenderError::MappingNotFound(map_path));
    }
    let mapping = TemplateMapping::load(&map_path)?;

    let mut deck = Pptx::open(template)?;
    let layouts = LayoutTable::resolve(&deck, &mapping)?;

    delete_sentinel_slides(&mut deck, &mapping)?;

    let empty_roles = BTreeMap::new();
    let mut rendered = 0usize;

    if let Some(title) = cover_title {
        if let Some(kind) = registry.get("title") {
            let cover = Slide {
                title: Some(title.to_string()),
                kind: "title".to_string(),
                ..Slide::default()
            };
            render_one(&mut deck, &cover, kind, &layouts, &mapping, assets_base, &empty_roles)?;
            rendered += 1;
        }
    }

    for slide in plan.slides() {
        let Some(kind) = registry.get(&slide.kind).or_else(|| registry.get("standard")) else {
            warn!(kind = %slide.kind, "no handler registered, skipping slide");
            continue;
        };
        render_one(&mut deck, slide, kind, &layouts, &mapping, assets_base, &empty_roles)?;
        rendered += 1;
    }

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    deck.save(output)?;
    info!(slides = rendered, output = %output.display(), "deck rendered");
    Ok(())
}

fn render_one(
    deck: &mut Pptx,
    slide: &Slide,
    handler: &dyn SlideKind,
    layouts: &LayoutTable,
    mapping: &TemplateMapping,
    assets_base: &Path,
    empty_roles: &BTreeMap<String, u32>,
) -> Result<()> {
    let layout_role = handler.layout_role();
    let layout_part = layouts.for_role(deck, mapping, layout_role)?;
    let slide_part = deck.add_slide_from_layout(&layout_part)?;
    let roles = mapping.role_idx(layout_role).unwrap_or(empty_roles);

    let mut target = RenderTarget {
        deck,
        slide_part,
        layout_part,
        assets_base,
        placeholders: roles,
    };
    handler.render(slide, &mut target)?;
    Ok(())
}

/// Layout parts resolved once per render for the built-in roles.
/// Missing `title`/`standard` layouts fall back to the deck's first
/// layout; a missing `code` layout falls back to `standard`.
struct LayoutTable {
    title: String,
    standard: String,
    code: String,
}

impl LayoutTable {
    fn resolve(deck: &Pptx, mapping: &TemplateMapping) -> Result<Self> {
        let default = deck
            .layout_parts()
            .into_iter()
            .next()
            .ok_or(RenderError::NoLayouts)?;
        let title = Self::lookup(deck, mapping, "title")?.unwrap_or_else(|| default.clone());
        let standard = Self::lookup(deck, mapping, "standard")?.unwrap_or(default);
        let code = Self::lookup(deck, mapping, "code")?.unwrap_or_else(|| standard.clone());
        Ok(Self {
            title,
            standard,
            code,
        })
    }

    fn for_role(&self, deck: &Pptx, mapping: &TemplateMapping, role: &str) -> Result<String> {
        match role {
            "title" => Ok(self.title.clone()),
            "standard" => Ok(self.standard.clone()),
            "code" => Ok(self.code.clone()),
            other => {
                Ok(Self::lookup(deck, mapping, other)?.unwrap_or_else(|| self.standard.clone()))
            }
        }
    }

    fn lookup(deck: &Pptx, mapping: &TemplateMapping, role: &str) -> Result<Option<String>> {
        let name = mapping
            .layouts
            .get(role)
            .map(String::as_str)
            .unwrap_or(role);
        Ok(find_layout_part(deck, name)?)
    }
}

/// Delete every template slide whose layout display name is one of the
/// mapping's layout names.
fn delete_sentinel_slides(deck: &mut Pptx, mapping: &TemplateMapping) -> Result<()> {
    let sentinels: Vec<&str> = mapping.sentinel_layouts().collect();
    if sentinels.is_empty() {
        return Ok(());
    }

    let mut doomed = Vec::new();
    for slide in deck.slides()? {
        let layout_part = deck.slide_layout(&slide.part_name)?;
        let layout_xml = deck.package().part(&layout_part)?;
        if let Some(name) = slide_name(layout_xml)? {
            if sentinels.contains(&name.trim()) {
                doomed.push(slide.part_name);
            }
        }
    }
    for part in doomed {
        debug!(slide = %part, "deleting sentinel slide");
        deck.delete_slide(&part)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{CodeRef, ImageRef};
    use crate::template::ensure_template_mapping;
    use crate::testutil::{PNG_BYTES, template_pptx};

    fn setup(dir: &Path) -> PathBuf {
        let template = dir.join("template.pptx");
        fs::write(&template, template_pptx()).unwrap();
        ensure_template_mapping(&template, false).unwrap();
        template
    }

    fn slide(kind: &str, title: &str) -> Slide {
        Slide {
            slide_id: Some(format!("s-{kind}")),
            kind: kind.to_string(),
            title: Some(title.to_string()),
            ..Slide::default()
        }
    }

    fn plan_with(slides: Vec<Slide>) -> Plan {
        Plan {
            module: Some(1),
            nucleus: Some("mod1_nc1".to_string()),
            slides: Some(slides),
        }
    }

    fn part_text(deck: &Pptx, part: &str) -> String {
        String::from_utf8_lossy(deck.package().part(part).unwrap()).into_owned()
    }

    #[test]
    fn test_renders_full_plan_over_sentinels() {
        let tmp = tempfile::tempdir().unwrap();
        let template = setup(tmp.path());
        let assets = tmp.path().join("assets");
        fs::create_dir_all(assets.join("mod1_nc1")).unwrap();
        fs::write(assets.join("mod1_nc1/img_0001.png"), PNG_BYTES).unwrap();

        let mut standard = slide("standard", "Conceitos");
        standard.lead = Some("Ideia central".to_string());
        standard.bullets = Some(vec!["um".to_string(), "dois".to_string()]);
        standard.image = Some(ImageRef {
            source: Some("docx".to_string()),
            path: Some("mod1_nc1/img_0001.png".to_string()),
            intent: None,
        });
        let mut code = slide("code", "Exemplo");
        code.code = Some(CodeRef {
            language: Some("python".to_string()),
            text: Some("def f():\n    return 1".to_string()),
        });
        let plan = plan_with(vec![slide("title", "Introdução"), standard, code]);

        let output = tmp.path().join("out/deck.pptx");
        let registry = SlideKindRegistry::with_builtin_kinds();
        render_plan(&plan, &template, &output, &assets, None, &registry).unwrap();

        let deck = Pptx::open(&output).unwrap();
        let slides = deck.slides().unwrap();
        // The three template example slides are sentinels and got deleted.
        assert_eq!(slides.len(), 3);

        assert!(part_text(&deck, &slides[0].part_name).contains("Introdução"));
        let standard_xml = part_text(&deck, &slides[1].part_name);
        assert!(standard_xml.contains("Ideia central"));
        assert!(standard_xml.contains("dois"));
        assert!(deck.largest_picture(&slides[1].part_name).unwrap().is_some());
        let code_xml = part_text(&deck, &slides[2].part_name);
        assert!(code_xml.contains("Consolas"));
        assert!(code_xml.contains("return 1"));
    }

    #[test]
    fn test_cover_title_precedes_plan_slides() {
        let tmp = tempfile::tempdir().unwrap();
        let template = setup(tmp.path());
        let plan = plan_with(vec![slide("title", "Unidade")]);

        let output = tmp.path().join("deck.pptx");
        let registry = SlideKindRegistry::with_builtin_kinds();
        render_plan(
            &plan,
            &template,
            &output,
            tmp.path(),
            Some("Curso de Rust"),
            &registry,
        )
        .unwrap();

        let deck = Pptx::open(&output).unwrap();
        let slides = deck.slides().unwrap();
        assert_eq!(slides.len(), 2);
        assert!(part_text(&deck, &slides[0].part_name).contains("Curso de Rust"));
        assert!(part_text(&deck, &slides[1].part_name).contains("Unidade"));
    }

    #[test]
    fn test_unknown_kind_falls_back_to_standard_handler() {
        let tmp = tempfile::tempdir().unwrap();
        let template = setup(tmp.path());
        let mut odd = slide("diagram", "Esquema");
        odd.lead = Some("Visão geral".to_string());
        let plan = plan_with(vec![odd]);

        let output = tmp.path().join("deck.pptx");
        let registry = SlideKindRegistry::with_builtin_kinds();
        render_plan(&plan, &template, &output, tmp.path(), None, &registry).unwrap();

        let deck = Pptx::open(&output).unwrap();
        let slides = deck.slides().unwrap();
        assert_eq!(slides.len(), 1);
        let xml = part_text(&deck, &slides[0].part_name);
        assert!(xml.contains("Esquema"));
        assert!(xml.contains("Visão geral"));
        // Fallback renders onto the standard layout.
        assert_eq!(
            deck.slide_layout(&slides[0].part_name).unwrap(),
            "ppt/slideLayouts/slideLayout2.xml"
        );
    }

    #[test]
    fn test_missing_mapping_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let template = tmp.path().join("template.pptx");
        fs::write(&template, template_pptx()).unwrap();

        let registry = SlideKindRegistry::with_builtin_kinds();
        let err = render_plan(
            &plan_with(vec![slide("title", "x")]),
            &template,
            &tmp.path().join("deck.pptx"),
            tmp.path(),
            None,
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::MappingNotFound(_)));
    }

    #[test]
    fn test_render_creates_output_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let template = setup(tmp.path());
        let output = tmp.path().join("dist/nested/deck.pptx");
        let registry = SlideKindRegistry::with_builtin_kinds();
        render_plan(
            &plan_with(vec![slide("title", "x")]),
            &template,
            &output,
            tmp.path(),
            None,
            &registry,
        )
        .unwrap();
        assert!(output.exists());
    }
}
