//! Model reporting: parameter counts and structural summaries

use std::fmt;

use crate::autograd::{Context, Tensor};

/// Common surface of every constructed model
///
/// The external training driver sees exactly this: a forward entry point,
/// the shared parameter handles it updates, and a renderable structure.
pub trait Network: fmt::Display {
    /// Run the model on an input tensor
    fn forward(&self, input: &Tensor, ctx: &Context) -> Tensor;

    /// Shared handles of every trainable parameter tensor
    fn parameters(&self) -> Vec<Tensor>;

    /// Total trainable parameter count
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(Tensor::len).sum()
    }
}

/// Render the structure of a network plus its total parameter count
pub fn network_summary<N: Network + ?Sized>(net: &N) -> String {
    format!("{net}Total number of parameters: {}\n", net.num_parameters())
}
