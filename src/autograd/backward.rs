//! Backward records for reverse-mode differentiation

use super::Tensor;

/// Per-operation backward record
///
/// Each differentiable operation attaches one of these to its result. The
/// record reads the result's accumulated gradient and adds each input's
/// contribution; it never recurses. Traversal order is the responsibility of
/// [`super::backward`], which fires every reachable record exactly once in
/// reverse topological order — required for the diamond-shaped graphs the
/// architectures produce (residual sums, skip concatenations).
pub trait BackwardOp {
    /// Tensors this operation consumed
    fn inputs(&self) -> Vec<Tensor>;

    /// Propagate the result's gradient to the inputs
    fn backward(&self);
}
