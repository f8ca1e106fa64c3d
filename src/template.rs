/// Template fitness and the placeholder-index mapping.
///
/// A deck template is usable when, for every slide role, either an
/// example slide instantiating that layout or the layout definition
/// itself exposes the placeholder names the renderer fills. The
/// resolved `role -> placeholder name -> idx` table is persisted next
/// to the template and reused on later runs.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ooxml::OoxmlError;
use crate::ooxml::pptx::{Pptx, placeholders, slide_name};

/// Placeholder names each layout role must provide.
const WANTED: [(&str, &[&str]); 3] = [
    ("title", &["title", "subtitle"]),
    ("standard", &["title", "pip", "bullets", "image"]),
    ("code", &["title", "pip", "code", "bullets"]),
];

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("no example slide or layout found for '{0}'")]
    LayoutNotFound(String),
    #[error("layout '{role}' missing placeholders: {missing:?}")]
    MissingPlaceholders { role: String, missing: Vec<String> },
    #[error(transparent)]
    Ooxml(#[from] OoxmlError),
    #[error("mapping serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TemplateError>;

/// Resolved placeholder mapping for one template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateMapping {
    /// Role -> layout display name in the template.
    pub layouts: BTreeMap<String, String>,
    /// Role -> placeholder name -> placeholder idx.
    pub idx: BTreeMap<String, BTreeMap<String, u32>>,
}

impl TemplateMapping {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut raw = serde_json::to_string_pretty(self)?;
        raw.push('\n');
        fs::write(path, raw)?;
        Ok(())
    }

    /// Placeholder indexes for a role, when the template provides it.
    pub fn role_idx(&self, role: &str) -> Option<&BTreeMap<String, u32>> {
        self.idx.get(role)
    }

    /// Layout display names claimed by the mapping. Slides using these
    /// layouts in the template are sentinels and get deleted before
    /// rendering.
    pub fn sentinel_layouts(&self) -> impl Iterator<Item = &str> {
        self.layouts.values().map(String::as_str)
    }
}

/// Resolve the placeholder mapping from a template on disk.
///
/// Example slides are preferred over layout definitions because decks
/// exported from slide editors often renumber layout placeholders
/// while the example slides keep the authored names and indexes.
pub fn build_mapping(template: &Path) -> Result<TemplateMapping> {
    let deck = Pptx::open(template)?;
    let mut mapping = TemplateMapping::default();

    for slide in deck.slides()? {
        let layout_part = deck.slide_layout(&slide.part_name)?;
        let layout_xml = deck.package().part(&layout_part)?;
        let Some(name) = slide_name(layout_xml)? else {
            continue;
        };
        let role = name.trim();
        let Some(names) = wanted_names(role) else {
            continue;
        };
        let slide_xml = deck.package().part(&slide.part_name)?;
        let found = collect_named(slide_xml, names)?;
        if !found.is_empty() {
            mapping.layouts.insert(role.to_string(), role.to_string());
            mapping.idx.insert(role.to_string(), found);
        }
    }

    for (role, names) in WANTED {
        if !mapping.idx.contains_key(role) {
            if let Some(layout_part) = find_layout_part(&deck, role)? {
                let layout_xml = deck.package().part(&layout_part)?;
                let found = collect_named(layout_xml, names)?;
                if !found.is_empty() {
                    mapping.layouts.insert(role.to_string(), role.to_string());
                    mapping.idx.insert(role.to_string(), found);
                }
            }
        }

        let Some(found) = mapping.idx.get(role) else {
            return Err(TemplateError::LayoutNotFound(role.to_string()));
        };
        let missing: Vec<String> = names
            .iter()
            .filter(|name| !found.contains_key(**name))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(TemplateError::MissingPlaceholders {
                role: role.to_string(),
                missing,
            });
        }
    }
    Ok(mapping)
}

/// Mapping file path associated with a template (`<stem>_map.json`).
pub fn map_path_for_template(template: &Path) -> PathBuf {
    let stem = template
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    template.with_file_name(format!("{stem}_map.json"))
}

/// Build and persist the mapping unless it already exists.
pub fn ensure_template_mapping(template: &Path, force: bool) -> Result<PathBuf> {
    let map_path = map_path_for_template(template);
    if map_path.exists() && !force {
        debug!(map = %map_path.display(), "reusing existing template mapping");
        return Ok(map_path);
    }

    let mapping = build_mapping(template)?;
    mapping.save(&map_path)?;
    info!(
        template = %template.display(),
        map = %map_path.display(),
        roles = mapping.idx.len(),
        "template mapping written"
    );
    Ok(map_path)
}

/// Check template fitness without persisting anything.
pub fn validate_template(template: &Path) -> Result<()> {
    build_mapping(template).map(|_| ())
}

fn wanted_names(role: &str) -> Option<&'static [&'static str]> {
    WANTED
        .iter()
        .find(|(name, _)| *name == role)
        .map(|(_, names)| *names)
}

/// Collect `name -> effective idx` for the placeholders of a part whose
/// shape name is in the wanted list.
fn collect_named(xml: &[u8], names: &[&str]) -> Result<BTreeMap<String, u32>> {
    let mut found = BTreeMap::new();
    for placeholder in placeholders(xml)? {
        let name = placeholder.name.trim();
        if names.contains(&name) {
            found.insert(name.to_string(), placeholder.effective_idx());
        }
    }
    Ok(found)
}

/// The layout part whose `p:cSld` display name matches the role.
pub(crate) fn find_layout_part(deck: &Pptx, role: &str) -> Result<Option<String>> {
    for part in deck.layout_parts() {
        let xml = deck.package().part(&part)?;
        if let Some(name) = slide_name(xml)? {
            if name.trim() == role {
                return Ok(Some(part));
            }
        }
    }
    Ok(None)
}
