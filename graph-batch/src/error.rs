/// Violations of the flattened-batch well-formedness invariant.
///
/// Any of these conditions would corrupt the split operation, so they
/// abort the run instead of producing silent garbage slices.
#[derive(Debug, thiserror::Error)]
pub enum MalformedBatch {
    #[error(
        "object-to-image map decreases at position {index}: {prev} followed by {next}"
    )]
    NonMonotoneObjToImg { index: usize, prev: i64, next: i64 },
    #[error(
        "triple {triple} references object {object}, outside the object slice of image {image}"
    )]
    TripleOutOfRange {
        triple: usize,
        object: i64,
        image: i64,
    },
    #[error("triple {triple} belongs to image {image}, which owns no objects")]
    TripleWithoutImage { triple: usize, image: i64 },
    #[error("tensor '{name}' has leading length {found}, expected {expected}")]
    LengthMismatch {
        name: &'static str,
        found: i64,
        expected: i64,
    },
    #[error("tensor '{name}' has unexpected shape {shape:?}")]
    BadShape { name: &'static str, shape: Vec<i64> },
}
