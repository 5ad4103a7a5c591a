//! Layer primitives
//!
//! Parameterized layer structs over the autograd substrate, the closed
//! [`Layer`] set they compose into, the symbolic normalization selector,
//! and the weight-initialization policy.

mod conv;
mod dropout;
pub mod init;
mod layer;
mod norm;
mod padding;

pub use conv::{Conv2d, ConvTranspose2d};
pub use dropout::Dropout;
pub use init::init_layers;
pub use layer::{forward_seq, seq_parameters, Layer};
pub(crate) use layer::write_seq;
pub use norm::{BatchNorm2d, InstanceNorm2d, Norm2d, NormKind};
pub use padding::Pad2d;
