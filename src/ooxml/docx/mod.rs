/// Word document model.
///
/// The pipeline reads `.docx` files at two granularities: a top-level
/// block scan over `word/document.xml` (paragraphs and tables with their
/// byte ranges, used by segmentation) and a run-level image scan (used by
/// asset tagging). Rewrites splice the original part bytes so unrelated
/// markup survives untouched.
mod document;
mod image;
mod rewrite;
mod styles;

pub use document::{Block, Docx, DOCUMENT_PART, STYLES_PART};
pub use image::{content_type_for_extension, extension_for_content_type, ImageRun};
pub use rewrite::marker_run;
