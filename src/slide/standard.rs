/// Content slide with lead, bullets and an image (`kind = "standard"`).
use std::path::Path;

use crate::plan::{Slide, resolve_image_path};

use super::{
    RenderTarget, SlideKind, common_violations, image_violations, intent_violations, is_blank,
};

pub struct StandardKind;

impl SlideKind for StandardKind {
    fn tag(&self) -> &'static str {
        "standard"
    }

    fn layout_role(&self) -> &'static str {
        "standard"
    }

    fn validate(&self, slide: &Slide, assets_base: &Path, index: usize) -> Vec<String> {
        let mut violations = common_violations(slide, index);

        if is_blank(slide.lead.as_deref()) {
            violations.push(format!("slide {index}: lead missing or empty"));
        }

        let Some(ref image) = slide.image else {
            violations.push(format!("slide {index}: image missing"));
            return violations;
        };
        match image.source.as_deref() {
            Some("docx") => {
                if !is_blank(image.intent.as_deref()) {
                    violations.push(format!(
                        "slide {index}: image.intent not allowed when source=docx"
                    ));
                }
                violations.extend(image_violations(image, assets_base, index));
            }
            Some("generated") => {
                violations.extend(intent_violations(image.intent.as_deref(), index));
            }
            other => {
                violations.push(format!(
                    "slide {index}: image.source invalid ({})",
                    other.unwrap_or("missing")
                ));
            }
        }
        violations
    }

    fn render(&self, slide: &Slide, target: &mut RenderTarget<'_>) -> crate::ooxml::Result<()> {
        target.set_text("title", slide.title())?;

        // "pip" is the template's name for the lead text box.
        let lead = slide.lead();
        let bullets = slide.bullets();
        if target.has_placeholder("pip")? && target.has_placeholder("bullets")? {
            target.set_text("pip", lead)?;
            target.set_bullets("bullets", bullets)?;
        } else {
            let role = if target.has_placeholder("bullets")? {
                "bullets"
            } else {
                "pip"
            };
            target.set_lead_with_bullets(role, lead, bullets)?;
        }

        if let Some(path) = slide.image.as_ref().and_then(|image| image.path.as_deref()) {
            if !path.trim().is_empty() {
                let resolved = resolve_image_path(target.assets_base, path);
                target.insert_image("image", &resolved)?;
            }
        }
        Ok(())
    }
}
