//! Autograd operations with backward passes
//!
//! Every operation builds its result eagerly and attaches a backward record
//! when any input tracks gradients. This is the complete operation set the
//! deblurring architectures compose.

mod activations;
mod basic;
mod conv;
mod normalize;
mod pad;

// Re-export all public operations
pub use activations::{leaky_relu, relu, sigmoid, tanh};
pub use basic::{add, clamp, concat_channels, dropout};
pub use conv::{conv2d, conv_transpose2d};
pub use normalize::{batch_norm2d, instance_norm2d, normalize2d_fixed};
pub use pad::{pad2d, PaddingMode};
