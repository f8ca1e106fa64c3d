/// Asset tagging: extract embedded images and leave textual markers.
///
/// The tagged copy of a unit document (`<unit>_tagged.docx`) is what the
/// remote planner reads; every image run is replaced by
/// `[[IMG:assets/<unit>/img_NNNN.<ext>]]` markers so the plan can refer
/// to extracted asset files by path.
use std::ops::Range;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::ooxml::OoxmlError;
use crate::ooxml::docx::{Docx, extension_for_content_type, marker_run};
use crate::ooxml::splice;
use crate::unit::UnitDir;

pub type Result<T> = std::result::Result<T, TagError>;

#[derive(Error, Debug)]
pub enum TagError {
    #[error("unit {0} has no content document")]
    NoContentDocument(String),
    #[error("document error: {0}")]
    Ooxml(#[from] OoxmlError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tag a unit's content document into `<unit>_tagged.docx`, extracting
/// assets under `assets/<unit>/` at the course root. Returns how many
/// images were extracted.
pub fn tag_unit(unit: &UnitDir, course_root: &Path) -> Result<usize> {
    let source = content_docx(unit)
        .ok_or_else(|| TagError::NoContentDocument(unit.id.to_string()))?;
    let tagged = unit.dir.join(format!("{}_tagged.docx", unit.id));
    let assets_dir = course_root.join("assets").join(unit.id.dir_name());
    let prefix = format!("assets/{}", unit.id);
    tag_images(&source, &tagged, &assets_dir, &prefix)
}

/// Copy `source` to `tagged` with every image run replaced by markers.
///
/// Image bytes land in `assets_dir` as `img_NNNN.<ext>` with a counter
/// that is monotonic across the whole document; `tag_prefix` is the path
/// prefix written into the markers. Unresolvable image relationships are
/// skipped, matching how broken pictures render as nothing in Word.
pub fn tag_images(
    source: &Path,
    tagged: &Path,
    assets_dir: &Path,
    tag_prefix: &str,
) -> Result<usize> {
    std::fs::create_dir_all(assets_dir)?;
    if let Some(parent) = tagged.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut doc = Docx::open(source)?;
    let runs = doc.image_runs()?;
    let prefix = tag_prefix.trim_matches(&['/', '\\'][..]);

    let mut index = 1usize;
    let mut edits: Vec<(Range<usize>, Vec<u8>)> = Vec::new();
    for run in &runs {
        let mut tags = Vec::new();
        for rel_id in &run.rel_ids {
            let (bytes, content_type) = match doc.image_data(rel_id) {
                Ok(found) => found,
                Err(error) => {
                    tracing::debug!(rel_id = %rel_id, %error, "skipping unresolvable image");
                    continue;
                }
            };
            let extension = extension_for_content_type(&content_type).unwrap_or("png");
            let filename = format!("img_{index:04}.{extension}");
            index += 1;
            std::fs::write(assets_dir.join(&filename), bytes)?;
            let tag_path = if prefix.is_empty() {
                filename
            } else {
                format!("{prefix}/{filename}")
            };
            tags.push(format!("[[IMG:{tag_path}]]"));
        }
        if !tags.is_empty() {
            edits.push((run.range.clone(), marker_run(&tags.join(" "))));
        }
    }
    if !edits.is_empty() {
        let rewritten = splice(doc.document_xml()?, &edits);
        doc.set_document_xml(rewritten);
    }
    doc.save(tagged)?;

    let count = index - 1;
    tracing::info!(
        source = %source.display(),
        tagged = %tagged.display(),
        images = count,
        "tagged document written"
    );
    Ok(count)
}

/// The content document of a unit directory.
///
/// The canonically named `<unit>/<unit>.docx` wins; otherwise the first
/// `.docx` that is neither a roteiro (`ROT_*`) nor a tagged copy.
pub fn content_docx(unit: &UnitDir) -> Option<PathBuf> {
    let named = unit.dir.join(format!("{}.docx", unit.id));
    if named.exists() {
        return Some(named);
    }
    docx_candidates(&unit.dir)
        .into_iter()
        .find(|path| match path.file_name() {
            Some(name) => {
                let name = name.to_string_lossy();
                !name.starts_with("ROT_") && !name.ends_with("_tagged.docx")
            }
            None => false,
        })
}

/// The roteiro document (`ROT_*.docx`) of a unit directory, when present.
pub fn roteiro_docx(dir: &Path) -> Option<PathBuf> {
    docx_candidates(dir).into_iter().find(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy().starts_with("ROT_"))
            .unwrap_or(false)
    })
}

fn docx_candidates(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut candidates: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("docx"))
                    .unwrap_or(false)
        })
        .collect();
    candidates.sort();
    candidates
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    use super::*;
    use crate::unit::UnitId;

    const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake";

    fn docx_with_images(body: &str, image_count: usize) -> Vec<u8> {
        let mut data = Vec::new();
        {
            let cursor = Cursor::new(&mut data);
            let mut writer = ZipWriter::new(cursor);
            let options = SimpleFileOptions::default();

            writer.start_file("[Content_Types].xml", options).unwrap();
            writer.write_all(br#"<?xml version="1.0"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
    <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
    <Default Extension="xml" ContentType="application/xml"/>
    <Default Extension="png" ContentType="image/png"/>
    <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>"#).unwrap();

            let mut rels = String::from(
                r#"<?xml version="1.0"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
            );
            for n in 1..=image_count {
                rels.push_str(&format!(
                    r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image{n}.png"/>"#
                ));
            }
            rels.push_str("</Relationships>");
            writer
                .start_file("word/_rels/document.xml.rels", options)
                .unwrap();
            writer.write_all(rels.as_bytes()).unwrap();

            writer.start_file("word/document.xml", options).unwrap();
            writer
                .write_all(
                    format!(
                        r#"<?xml version="1.0"?><w:document xmlns:w="http://w" xmlns:a="http://a" xmlns:r="http://r"><w:body>{body}</w:body></w:document>"#
                    )
                    .as_bytes(),
                )
                .unwrap();

            for n in 1..=image_count {
                writer
                    .start_file(format!("word/media/image{n}.png"), options)
                    .unwrap();
                writer.write_all(PNG_BYTES).unwrap();
            }

            writer.finish().unwrap();
        }
        data
    }

    #[test]
    fn test_tag_images_extracts_and_marks() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("mod1_nc1.docx");
        let body = r#"<w:p><w:r><w:t>antes</w:t></w:r><w:r><w:drawing><a:blip r:embed="rId1"/></w:drawing></w:r></w:p>"#;
        std::fs::write(&source, docx_with_images(body, 1)).unwrap();

        let tagged = tmp.path().join("mod1_nc1_tagged.docx");
        let assets = tmp.path().join("assets/mod1_nc1");
        let count = tag_images(&source, &tagged, &assets, "assets/mod1_nc1").unwrap();
        assert_eq!(count, 1);
        assert_eq!(std::fs::read(assets.join("img_0001.png")).unwrap(), PNG_BYTES);

        let doc = Docx::open(&tagged).unwrap();
        let blocks = doc.blocks().unwrap();
        assert_eq!(blocks[0].text(), "antes[[IMG:assets/mod1_nc1/img_0001.png]]");
    }

    #[test]
    fn test_tag_images_joins_markers_in_one_run() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("doc.docx");
        let body = r#"<w:p><w:r><w:drawing><a:blip r:embed="rId1"/><a:blip r:embed="rId2"/></w:drawing></w:r></w:p>"#;
        std::fs::write(&source, docx_with_images(body, 2)).unwrap();

        let tagged = tmp.path().join("doc_tagged.docx");
        let assets = tmp.path().join("assets");
        let count = tag_images(&source, &tagged, &assets, "assets").unwrap();
        assert_eq!(count, 2);

        let doc = Docx::open(&tagged).unwrap();
        let blocks = doc.blocks().unwrap();
        assert_eq!(
            blocks[0].text(),
            "[[IMG:assets/img_0001.png]] [[IMG:assets/img_0002.png]]"
        );
    }

    #[test]
    fn test_tag_images_without_pictures() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("doc.docx");
        let body = r#"<w:p><w:r><w:t>texto puro</w:t></w:r></w:p>"#;
        std::fs::write(&source, docx_with_images(body, 0)).unwrap();

        let tagged = tmp.path().join("doc_tagged.docx");
        let count = tag_images(&source, &tagged, &tmp.path().join("assets"), "assets").unwrap();
        assert_eq!(count, 0);
        assert!(tagged.exists());
    }

    #[test]
    fn test_tag_images_skips_broken_relationship() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("doc.docx");
        let body = r#"<w:p><w:r><w:drawing><a:blip r:embed="rId99"/></w:drawing></w:r></w:p>"#;
        std::fs::write(&source, docx_with_images(body, 0)).unwrap();

        let tagged = tmp.path().join("doc_tagged.docx");
        let count = tag_images(&source, &tagged, &tmp.path().join("assets"), "assets").unwrap();
        assert_eq!(count, 0);
        let doc = Docx::open(&tagged).unwrap();
        assert_eq!(doc.blocks().unwrap()[0].text(), "");
    }

    #[test]
    fn test_content_docx_prefers_canonical_name() {
        let tmp = tempfile::tempdir().unwrap();
        let unit = UnitDir {
            id: UnitId::conceptual(1, 1),
            dir: tmp.path().to_path_buf(),
        };
        std::fs::write(tmp.path().join("outro.docx"), b"x").unwrap();
        assert!(content_docx(&unit).unwrap().ends_with("outro.docx"));

        std::fs::write(tmp.path().join("mod1_nc1.docx"), b"x").unwrap();
        assert!(content_docx(&unit).unwrap().ends_with("mod1_nc1.docx"));
    }

    #[test]
    fn test_content_docx_ignores_roteiro_and_tagged() {
        let tmp = tempfile::tempdir().unwrap();
        let unit = UnitDir {
            id: UnitId::conceptual(1, 1),
            dir: tmp.path().to_path_buf(),
        };
        std::fs::write(tmp.path().join("ROT_mod1_nc1.docx"), b"x").unwrap();
        std::fs::write(tmp.path().join("mod1_nc1_tagged.docx"), b"x").unwrap();
        assert!(content_docx(&unit).is_none());
        assert!(roteiro_docx(tmp.path()).unwrap().ends_with("ROT_mod1_nc1.docx"));
    }
}
