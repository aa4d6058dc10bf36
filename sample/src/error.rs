use crate::common::*;

/// Fatal conditions of the sampling run.
///
/// None of these are recoverable at this level: a run either completes
/// the full dataset pass and emits a summary, or aborts without one.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    /// Feature sampling was requested but the feature file is absent.
    /// Detected before any batch is processed.
    #[error("feature file '{}' does not exist", .path.display())]
    MissingFeatureFile { path: PathBuf },
    /// The dataset pass finished with zero boxes, so no metric can be
    /// reported. Guarded explicitly rather than surfacing as NaN.
    #[error("evaluation saw no boxes; refusing to report metrics")]
    EmptyEvaluation,
    /// Opaque failure propagated from the generative model.
    #[error("model invocation failed")]
    ModelInvocation(#[from] tch::TchError),
    /// The model broke its documented output contract.
    #[error("unexpected model output: {0}")]
    UnexpectedModelOutput(String),
}
