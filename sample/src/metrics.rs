use crate::{common::*, error::SampleError};

/// Per-batch IoU statistics of positionally paired boxes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchIouStats {
    pub iou_sum: f64,
    pub above_05: i64,
    pub above_03: i64,
    pub num_boxes: i64,
}

impl std::ops::Add for BatchIouStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            iou_sum: self.iou_sum + rhs.iou_sum,
            above_05: self.above_05 + rhs.above_05,
            above_03: self.above_03 + rhs.above_03,
            num_boxes: self.num_boxes + rhs.num_boxes,
        }
    }
}

impl std::iter::Sum for BatchIouStats {
    fn sum<I>(iter: I) -> Self
    where
        I: Iterator<Item = Self>,
    {
        iter.fold(Self::default(), |lhs, rhs| lhs + rhs)
    }
}

/// Computes IoU of predicted vs. ground-truth boxes paired by position.
///
/// Both inputs are `[n, 4]` in `(x0, y0, x1, y1)` order. A pair whose
/// union area is zero contributes exactly 0.
pub fn jaccard(pred_boxes: &Tensor, gt_boxes: &Tensor) -> Result<BatchIouStats> {
    let (num_pred, pred_params) = pred_boxes.size2()?;
    let (num_gt, gt_params) = gt_boxes.size2()?;
    ensure!(
        pred_params == 4 && gt_params == 4,
        "boxes must have 4 parameters, got {} and {}",
        pred_params,
        gt_params
    );
    ensure!(
        num_pred == num_gt,
        "predicted and ground-truth box counts differ: {} vs. {}",
        num_pred,
        num_gt
    );
    if num_pred == 0 {
        return Ok(BatchIouStats::default());
    }

    let iou = pairwise_iou(pred_boxes, gt_boxes);

    Ok(BatchIouStats {
        iou_sum: f64::from(&iou.sum(Kind::Float)),
        above_05: i64::from(&iou.ge(0.5).sum(Kind::Int64)),
        above_03: i64::from(&iou.ge(0.3).sum(Kind::Int64)),
        num_boxes: num_pred,
    })
}

fn pairwise_iou(lhs: &Tensor, rhs: &Tensor) -> Tensor {
    let lhs_x0 = lhs.select(1, 0);
    let lhs_y0 = lhs.select(1, 1);
    let lhs_x1 = lhs.select(1, 2);
    let lhs_y1 = lhs.select(1, 3);
    let rhs_x0 = rhs.select(1, 0);
    let rhs_y0 = rhs.select(1, 1);
    let rhs_x1 = rhs.select(1, 2);
    let rhs_y1 = rhs.select(1, 3);

    let inner_w = (lhs_x1.minimum(&rhs_x1) - lhs_x0.maximum(&rhs_x0)).clamp_min(0.0);
    let inner_h = (lhs_y1.minimum(&rhs_y1) - lhs_y0.maximum(&rhs_y0)).clamp_min(0.0);
    let intersection = inner_w * inner_h;

    let lhs_area = (lhs_x1 - lhs_x0).clamp_min(0.0) * (lhs_y1 - lhs_y0).clamp_min(0.0);
    let rhs_area = (rhs_x1 - rhs_x0).clamp_min(0.0) * (rhs_y1 - rhs_y0).clamp_min(0.0);
    let union = lhs_area + rhs_area - &intersection;

    // a zero union forces a zero intersection, so the clamp keeps the
    // quotient at exactly 0 for degenerate pairs
    &intersection / union.clamp_min(1e-12)
}

/// Running totals across the whole dataset pass. The accumulator is the
/// only writer of these totals; it is threaded through the loop as an
/// explicit value rather than kept in module state.
#[derive(Debug, Default)]
pub struct IouAccumulator {
    totals: BatchIouStats,
}

impl IouAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, stats: BatchIouStats) {
        self.totals = self.totals + stats;
    }

    pub fn num_boxes(&self) -> i64 {
        self.totals.num_boxes
    }

    /// Final report after the full pass. Fails with
    /// [`SampleError::EmptyEvaluation`] when no boxes were seen.
    pub fn summarize(&self) -> Result<IouSummary, SampleError> {
        let BatchIouStats {
            iou_sum,
            above_05,
            above_03,
            num_boxes,
        } = self.totals;
        if num_boxes == 0 {
            return Err(SampleError::EmptyEvaluation);
        }
        let count = num_boxes as f64;
        Ok(IouSummary {
            mean_iou: iou_sum / count,
            recall_at_05: above_05 as f64 / count,
            recall_at_03: above_03 as f64 / count,
        })
    }
}

/// The three scalars reported to the operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IouSummary {
    pub mean_iou: f64,
    pub recall_at_05: f64,
    pub recall_at_03: f64,
}

impl Display for IouSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "mean IoU {:.4}", self.mean_iou)?;
        writeln!(f, "r0.5 {:.4}", self.recall_at_05)?;
        write!(f, "r0.3 {:.4}", self.recall_at_03)
    }
}
