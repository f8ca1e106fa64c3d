/// Source-code slide (`kind = "code"`).
use std::path::Path;

use crate::ooxml::pptx::{ParagraphSpec, RunSpec};
use crate::plan::Slide;

use super::{RenderTarget, SlideKind, common_violations, is_blank};

/// Monospace font for code placeholders.
const CODE_FONT: &str = "Consolas";
/// Code font size in hundredths of a point (16pt).
const CODE_SIZE: u32 = 1600;

pub struct CodeKind;

impl SlideKind for CodeKind {
    fn tag(&self) -> &'static str {
        "code"
    }

    fn layout_role(&self) -> &'static str {
        "code"
    }

    fn validate(&self, slide: &Slide, _assets_base: &Path, index: usize) -> Vec<String> {
        let mut violations = common_violations(slide, index);

        if let Some(ref image) = slide.image {
            if !is_blank(image.path.as_deref()) || !is_blank(image.intent.as_deref()) {
                violations.push(format!("slide {index}: kind=code does not use an image"));
            }
        }

        match slide.code {
            Some(ref code) => {
                if is_blank(code.text.as_deref()) {
                    violations.push(format!("slide {index}: code.text missing or empty"));
                }
                if is_blank(code.language.as_deref()) {
                    violations.push(format!("slide {index}: code.language missing or empty"));
                }
            }
            None => {
                violations.push(format!("slide {index}: code missing"));
            }
        }
        violations
    }

    fn render(&self, slide: &Slide, target: &mut RenderTarget<'_>) -> crate::ooxml::Result<()> {
        target.set_text("title", slide.title())?;

        let code_text = slide
            .code
            .as_ref()
            .and_then(|code| code.text.as_deref())
            .unwrap_or_default();
        let bullets = slide.bullets();

        let has_code = target.has_placeholder("code")?;
        let has_bullets = target.has_placeholder("bullets")?;
        if has_code {
            target.set_paragraphs("code", &code_paragraphs(code_text))?;
            if has_bullets {
                target.set_bullets("bullets", bullets)?;
            }
        } else if has_bullets {
            // No dedicated code placeholder: append the bullets after the
            // code text in the same box.
            let mut combined = code_paragraphs(code_text);
            if !bullets.is_empty() {
                combined.push(ParagraphSpec::empty());
                for bullet in bullets {
                    combined.push(ParagraphSpec::plain(format!("- {bullet}")));
                }
            }
            target.set_paragraphs("bullets", &combined)?;
        }
        Ok(())
    }
}

/// One monospace paragraph per code line, with leading spaces converted
/// to no-break spaces so the indentation survives autofit.
fn code_paragraphs(code_text: &str) -> Vec<ParagraphSpec> {
    let lines: Vec<&str> = if code_text.is_empty() {
        vec![""]
    } else {
        code_text.lines().collect()
    };
    lines
        .into_iter()
        .map(|line| ParagraphSpec {
            runs: vec![RunSpec::styled(protect_indent(line), CODE_FONT, CODE_SIZE)],
        })
        .collect()
}

fn protect_indent(line: &str) -> String {
    let stripped = line.trim_start_matches(' ');
    let prefix = line.len() - stripped.len();
    if prefix == 0 {
        return line.to_string();
    }
    let mut protected = "\u{00A0}".repeat(prefix);
    protected.push_str(stripped);
    protected
}
