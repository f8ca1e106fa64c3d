/// Cover slide (`kind = "title"`).
use std::path::Path;

use crate::plan::Slide;

use super::{RenderTarget, SlideKind, common_violations, is_blank};

pub struct TitleKind;

impl SlideKind for TitleKind {
    fn tag(&self) -> &'static str {
        "title"
    }

    fn layout_role(&self) -> &'static str {
        "title"
    }

    fn validate(&self, slide: &Slide, _assets_base: &Path, index: usize) -> Vec<String> {
        let mut violations = common_violations(slide, index);

        // The planner schema always emits image/code objects, so only
        // non-empty content counts as a violation.
        if let Some(ref image) = slide.image {
            if !is_blank(image.path.as_deref()) || !is_blank(image.intent.as_deref()) {
                violations.push(format!("slide {index}: kind=title does not use an image"));
            }
        }
        if let Some(ref code) = slide.code {
            if !is_blank(code.language.as_deref()) || !is_blank(code.text.as_deref()) {
                violations.push(format!("slide {index}: kind=title does not use code"));
            }
        }
        violations
    }

    fn render(&self, slide: &Slide, target: &mut RenderTarget<'_>) -> crate::ooxml::Result<()> {
        target.set_text("title", slide.title())
    }
}
