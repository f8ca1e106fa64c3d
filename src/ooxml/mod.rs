/// OOXML package support for the pipeline.
///
/// This module provides the low-level machinery the pipeline is built on:
/// OPC container access (`opc`), the Word document model used for
/// segmentation and asset tagging (`docx`), and the PresentationML model
/// used for template inspection and rendering (`pptx`).
///
/// All document rewrites are splice-based: scans record half-open byte
/// ranges into the original part XML, and edits are produced by copying
/// the original bytes with selected ranges replaced. The original markup
/// outside the edited ranges is preserved byte for byte.
pub mod docx;
pub mod error;
pub mod opc;
pub mod pptx;

pub use error::{OoxmlError, Result};

use std::ops::Range;

/// Splice byte-range replacements into `source`.
///
/// `replacements` must be non-overlapping; they are applied in range order
/// regardless of the order given. Each `(range, bytes)` pair removes the
/// range from the output and inserts `bytes` in its place. An empty
/// replacement deletes the range.
pub(crate) fn splice(source: &[u8], replacements: &[(Range<usize>, Vec<u8>)]) -> Vec<u8> {
    let mut ordered: Vec<&(Range<usize>, Vec<u8>)> = replacements.iter().collect();
    ordered.sort_by_key(|(range, _)| range.start);

    let mut out = Vec::with_capacity(source.len());
    let mut cursor = 0usize;
    for (range, bytes) in ordered {
        out.extend_from_slice(&source[cursor..range.start]);
        out.extend_from_slice(bytes);
        cursor = range.end;
    }
    out.extend_from_slice(&source[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splice_replaces_ranges_in_order() {
        let source = b"abcdefghij";
        let out = splice(source, &[(6..8, b"XY".to_vec()), (1..3, b"Z".to_vec())]);
        assert_eq!(out, b"aZdefXYij");
    }

    #[test]
    fn test_splice_empty_replacement_deletes() {
        let out = splice(b"keep-drop-keep", &[(4..10, Vec::new())]);
        assert_eq!(out, b"keep-keep");
    }

    #[test]
    fn test_splice_no_replacements_is_identity() {
        let out = splice(b"unchanged", &[]);
        assert_eq!(out, b"unchanged");
    }
}
