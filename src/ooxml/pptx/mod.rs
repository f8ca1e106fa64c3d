/// PresentationML model.
///
/// Read side: slide order from `ppt/presentation.xml`, slide → layout →
/// master resolution through relationships, placeholder and picture
/// inventories per shape tree. Write side (`compose`): slide deletion,
/// slide instantiation from a layout, placeholder text fill and picture
/// insertion, all expressed as byte-range splices on the part XML.
mod compose;
mod presentation;
mod slide;

pub use compose::{ParagraphSpec, RunSpec};
pub use presentation::{Pptx, SlideRef, PRESENTATION_PART};
pub use slide::{find_placeholder, pictures, placeholders, slide_name, Picture, Placeholder, PlaceholderRef};

/// Relationship types used by the presentation graph.
pub(crate) mod rel_type {
    pub const SLIDE: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";
    pub const SLIDE_LAYOUT: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout";
    pub const SLIDE_MASTER: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster";
    pub const IMAGE: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
}

/// Content type of an individual slide part.
pub(crate) const SLIDE_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slide+xml";
