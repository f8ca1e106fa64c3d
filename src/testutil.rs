/// Shared test fixtures: a minimal but complete presentation template
/// with named layouts (`title`, `standard`, `code`), a master, and
/// optional example slides instantiating each layout.
use std::io::{Cursor, Write};

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const PRESENTATION_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml";
const MASTER_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml";
const LAYOUT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml";
const SLIDE_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slide+xml";

const NS: &str = r#" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;

const REL_NS: &str = r#"xmlns="http://schemas.openxmlformats.org/package/2006/relationships""#;

struct PlaceholderDef {
    name: &'static str,
    ph_type: &'static str,
    idx: Option<u32>,
}

const LAYOUT_ROLES: [(&str, &[PlaceholderDef]); 3] = [
    (
        "title",
        &[
            PlaceholderDef {
                name: "title",
                ph_type: "ctrTitle",
                idx: None,
            },
            PlaceholderDef {
                name: "subtitle",
                ph_type: "subTitle",
                idx: Some(1),
            },
        ],
    ),
    (
        "standard",
        &[
            PlaceholderDef {
                name: "title",
                ph_type: "title",
                idx: None,
            },
            PlaceholderDef {
                name: "pip",
                ph_type: "body",
                idx: Some(13),
            },
            PlaceholderDef {
                name: "bullets",
                ph_type: "body",
                idx: Some(1),
            },
            PlaceholderDef {
                name: "image",
                ph_type: "pic",
                idx: Some(2),
            },
        ],
    ),
    (
        "code",
        &[
            PlaceholderDef {
                name: "title",
                ph_type: "title",
                idx: None,
            },
            PlaceholderDef {
                name: "pip",
                ph_type: "body",
                idx: Some(13),
            },
            PlaceholderDef {
                name: "code",
                ph_type: "body",
                idx: Some(1),
            },
            PlaceholderDef {
                name: "bullets",
                ph_type: "body",
                idx: Some(2),
            },
        ],
    ),
];

fn placeholder_sp(shape_id: usize, ph: &PlaceholderDef) -> String {
    let idx_attr = match ph.idx {
        Some(idx) => format!(r#" idx="{idx}""#),
        None => String::new(),
    };
    let x = 457200 * shape_id as i64;
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{shape_id}" name="{name}"/><p:cNvSpPr><a:spLocks noGrp="1"/></p:cNvSpPr><p:nvPr><p:ph type="{ph_type}"{idx_attr}/></p:nvPr></p:nvSpPr><p:spPr><a:xfrm><a:off x="{x}" y="457200"/><a:ext cx="3657600" cy="1828800"/></a:xfrm></p:spPr><p:txBody><a:bodyPr/><a:lstStyle/><a:p/></p:txBody></p:sp>"#,
        name = ph.name,
        ph_type = ph.ph_type,
    )
}

fn sp_tree(role: &str, omit: &[(&str, &str)]) -> String {
    let placeholders = LAYOUT_ROLES
        .iter()
        .find(|(name, _)| *name == role)
        .map(|(_, defs)| *defs)
        .unwrap_or_default();
    let mut shapes = String::new();
    for (position, ph) in placeholders.iter().enumerate() {
        if omit.contains(&(role, ph.name)) {
            continue;
        }
        shapes.push_str(&placeholder_sp(position + 2, ph));
    }
    format!(
        r#"<p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{shapes}</p:spTree>"#
    )
}

/// The full template: master, three named layouts, one example slide per
/// layout.
pub(crate) fn template_pptx() -> Vec<u8> {
    build_template(true, &[])
}

/// Build a template, optionally without example slides and with
/// `(layout role, placeholder name)` pairs omitted from both layouts and
/// example slides.
pub(crate) fn build_template(with_example_slides: bool, omit: &[(&str, &str)]) -> Vec<u8> {
    let mut data = Vec::new();
    {
        let cursor = Cursor::new(&mut data);
        let mut writer = ZipWriter::new(cursor);
        let options = SimpleFileOptions::default();
        let mut put = |name: String, content: String| {
            writer.start_file(name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        };

        let slide_count = if with_example_slides {
            LAYOUT_ROLES.len()
        } else {
            0
        };

        let mut types = String::from(
            r#"<?xml version="1.0"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/>"#,
        );
        types.push_str(&format!(
            r#"<Override PartName="/ppt/presentation.xml" ContentType="{PRESENTATION_TYPE}"/><Override PartName="/ppt/slideMasters/slideMaster1.xml" ContentType="{MASTER_TYPE}"/>"#
        ));
        for n in 1..=LAYOUT_ROLES.len() {
            types.push_str(&format!(
                r#"<Override PartName="/ppt/slideLayouts/slideLayout{n}.xml" ContentType="{LAYOUT_TYPE}"/>"#
            ));
        }
        for n in 1..=slide_count {
            types.push_str(&format!(
                r#"<Override PartName="/ppt/slides/slide{n}.xml" ContentType="{SLIDE_TYPE}"/>"#
            ));
        }
        types.push_str("</Types>");
        put("[Content_Types].xml".to_string(), types);

        put(
            "_rels/.rels".to_string(),
            format!(
                r#"<?xml version="1.0"?><Relationships {REL_NS}><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="ppt/presentation.xml"/></Relationships>"#
            ),
        );

        let mut sld_ids = String::new();
        let mut pres_rels = format!(
            r#"<?xml version="1.0"?><Relationships {REL_NS}><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster" Target="slideMasters/slideMaster1.xml"/>"#
        );
        for n in 1..=slide_count {
            let rel = format!("rId{}", n + 1);
            sld_ids.push_str(&format!(r#"<p:sldId id="{}" r:id="{rel}"/>"#, 255 + n));
            pres_rels.push_str(&format!(
                r#"<Relationship Id="{rel}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide{n}.xml"/>"#
            ));
        }
        pres_rels.push_str("</Relationships>");
        put(
            "ppt/presentation.xml".to_string(),
            format!(
                r#"<?xml version="1.0"?><p:presentation{NS}><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst><p:sldIdLst>{sld_ids}</p:sldIdLst><p:sldSz cx="12192000" cy="6858000"/></p:presentation>"#
            ),
        );
        put("ppt/_rels/presentation.xml.rels".to_string(), pres_rels);

        put(
            "ppt/slideMasters/slideMaster1.xml".to_string(),
            format!(
                r#"<?xml version="1.0"?><p:sldMaster{NS}><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/></p:spTree></p:cSld></p:sldMaster>"#
            ),
        );
        let mut master_rels = format!(r#"<?xml version="1.0"?><Relationships {REL_NS}>"#);
        for n in 1..=LAYOUT_ROLES.len() {
            master_rels.push_str(&format!(
                r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout" Target="../slideLayouts/slideLayout{n}.xml"/>"#
            ));
        }
        master_rels.push_str("</Relationships>");
        put(
            "ppt/slideMasters/_rels/slideMaster1.xml.rels".to_string(),
            master_rels,
        );

        for (position, (role, _)) in LAYOUT_ROLES.iter().enumerate() {
            let n = position + 1;
            put(
                format!("ppt/slideLayouts/slideLayout{n}.xml"),
                format!(
                    r#"<?xml version="1.0"?><p:sldLayout{NS}><p:cSld name="{role}">{tree}</p:cSld></p:sldLayout>"#,
                    tree = sp_tree(role, omit),
                ),
            );
            put(
                format!("ppt/slideLayouts/_rels/slideLayout{n}.xml.rels"),
                format!(
                    r#"<?xml version="1.0"?><Relationships {REL_NS}><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster" Target="../slideMasters/slideMaster1.xml"/></Relationships>"#
                ),
            );
        }

        for (position, (role, _)) in LAYOUT_ROLES.iter().enumerate().take(slide_count) {
            let n = position + 1;
            put(
                format!("ppt/slides/slide{n}.xml"),
                format!(
                    r#"<?xml version="1.0"?><p:sld{NS}><p:cSld>{tree}</p:cSld></p:sld>"#,
                    tree = sp_tree(role, omit),
                ),
            );
            put(
                format!("ppt/slides/_rels/slide{n}.xml.rels"),
                format!(
                    r#"<?xml version="1.0"?><Relationships {REL_NS}><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout" Target="../slideLayouts/slideLayout{n}.xml"/></Relationships>"#
                ),
            );
        }

        writer.finish().unwrap();
    }
    data
}

/// A tiny valid PNG payload for picture-insertion tests.
pub(crate) const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfixture";
