/// Slide-plan data model.
///
/// A plan is the structured output of the remote planner for one unit:
/// top-level `module`, `nucleus` and an ordered `slides` list. The model
/// is deliberately lenient — every field is optional at the serde level
/// so that a structurally defective plan still deserializes and the
/// validator can report every violation at once instead of failing on
/// the first missing field.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlanError>;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// File name of the persisted plan inside a unit directory.
pub const PLAN_FILE: &str = "slides_plan.json";

/// Path of the plan file for a unit directory.
pub fn plan_path(unit_dir: &Path) -> PathBuf {
    unit_dir.join(PLAN_FILE)
}

/// The slide plan of one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nucleus: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slides: Option<Vec<Slide>>,
}

impl Plan {
    /// Load a plan from its JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Persist the plan as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut rendered = serde_json::to_string_pretty(self)?;
        rendered.push('\n');
        std::fs::write(path, rendered)?;
        Ok(())
    }

    /// The slides, empty when the field is absent.
    pub fn slides(&self) -> &[Slide] {
        self.slides.as_deref().unwrap_or_default()
    }

    /// The slides, mutable. Materialization rewrites image paths here.
    pub fn slides_mut(&mut self) -> &mut [Slide] {
        match self.slides {
            Some(ref mut slides) => slides,
            None => &mut [],
        }
    }
}

/// One slide of a plan. `kind` selects the validation and render
/// contract; everything else is the union of fields the known kinds use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slide {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide_id: Option<String>,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bullets: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeRef>,
}

fn default_kind() -> String {
    "standard".to_string()
}

impl Default for Slide {
    fn default() -> Self {
        Self {
            slide_id: None,
            kind: default_kind(),
            title: None,
            lead: None,
            bullets: None,
            image: None,
            code: None,
        }
    }
}

impl Slide {
    /// The bullets, empty when absent.
    pub fn bullets(&self) -> &[String] {
        self.bullets.as_deref().unwrap_or_default()
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }

    pub fn lead(&self) -> &str {
        self.lead.as_deref().unwrap_or_default()
    }
}

/// Reference to a slide image: either an extracted docx asset (`path`)
/// or a yet-to-be-generated one (`intent`). Materialization fills in
/// `path` for generated images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
}

impl ImageRef {
    /// Whether the image still needs to be generated.
    pub fn needs_generation(&self) -> bool {
        self.source.as_deref() == Some("generated")
            && self.path.as_deref().filter(|p| !p.trim().is_empty()).is_none()
    }
}

/// Code block of a `code` slide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Resolve an image path against the asset base, keeping absolute paths
/// as they are.
pub fn resolve_image_path(assets_base: &Path, image_path: &str) -> PathBuf {
    let path = Path::new(image_path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        assets_base.join(path)
    }
}
