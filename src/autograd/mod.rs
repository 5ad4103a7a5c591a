//! Tape-based autograd engine
//!
//! Provides automatic differentiation over N-dimensional `f32` tensors using
//! per-operation backward records. Operations build the graph implicitly as
//! they run; [`backward`] replays the reachable records in reverse
//! topological order, so every record fires exactly once even when a tensor
//! feeds several consumers (residual additions, skip concatenations).

mod backward;
mod context;
mod ops;
mod tensor;

#[cfg(test)]
mod tests;

pub use backward::BackwardOp;
pub use context::Context;
pub use ops::*;
pub use tensor::Tensor;

use ndarray::ArrayD;
use std::collections::HashSet;
use std::rc::Rc;

/// Perform backward pass on a tensor
///
/// Seeds the output gradient (with ones when `grad_output` is `None`, the
/// scalar-loss convention), then fires each reachable backward record once,
/// consumers before producers.
pub fn backward(tensor: &Tensor, grad_output: Option<ArrayD<f32>>) {
    match grad_output {
        Some(grad) => tensor.set_grad(grad),
        None => tensor.set_grad(ArrayD::ones(tensor.data().raw_dim())),
    }

    let Some(root) = tensor.backward_op() else {
        return;
    };

    let mut visited = HashSet::new();
    let mut postorder = Vec::new();
    collect(&root, &mut visited, &mut postorder);

    // Reverse postorder of the producer graph is a topological order with
    // every consumer ahead of its producers, so each record reads a fully
    // accumulated result gradient.
    for op in postorder.iter().rev() {
        op.backward();
    }
}

fn collect(
    op: &Rc<dyn BackwardOp>,
    visited: &mut HashSet<usize>,
    postorder: &mut Vec<Rc<dyn BackwardOp>>,
) {
    let key = Rc::as_ptr(op) as *const () as usize;
    if !visited.insert(key) {
        return;
    }
    for input in op.inputs() {
        if let Some(producer) = input.backward_op() {
            collect(&producer, visited, postorder);
        }
    }
    postorder.push(Rc::clone(op));
}
