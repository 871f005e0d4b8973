//! Image/annotation correlation.
//!
//! Images and detection boxes are written to the store independently. Boxes
//! are only meaningful on the exact frame they were computed from, so they
//! are released for drawing only when both records carry the same timestamp.

use crate::models::{AnnotationRecord, BoundingBox, ImageRecord};

// ---

/// Boxes to overlay on `image`: the annotation's boxes, unmodified, when the
/// timestamps are equal, otherwise none.
pub fn correlate(image: &ImageRecord, annotation: &AnnotationRecord) -> Vec<BoundingBox> {
    // ---
    if image.timestamp == annotation.timestamp {
        annotation.boxes.clone()
    } else {
        Vec::new()
    }
}

/// [`correlate`] for records that may be missing.
pub fn overlay(
    image: Option<&ImageRecord>,
    annotation: Option<&AnnotationRecord>,
) -> Vec<BoundingBox> {
    // ---
    match (image, annotation) {
        (Some(image), Some(annotation)) => correlate(image, annotation),
        _ => Vec::new(),
    }
}
