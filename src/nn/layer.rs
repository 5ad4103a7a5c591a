//! Closed layer set and sequential composition
//!
//! The architectures compose from this closed set, and the tagged variants
//! drive weight initialization, parameter collection, and the structural
//! summary without any name-based dispatch.

use std::fmt;

use super::conv::{Conv2d, ConvTranspose2d};
use super::dropout::Dropout;
use super::norm::Norm2d;
use super::padding::Pad2d;
use crate::autograd::{leaky_relu, relu, sigmoid, tanh, Context, Tensor};
use crate::networks::resnet::ResnetBlock;

/// A single step in a sequential composition
#[derive(Debug)]
pub enum Layer {
    Pad(Pad2d),
    Conv(Conv2d),
    ConvTranspose(ConvTranspose2d),
    Norm(Norm2d),
    Relu,
    LeakyRelu { negative_slope: f32 },
    Tanh,
    Sigmoid,
    Dropout(Dropout),
    /// Nested residual block (two conv stages plus identity shortcut)
    Residual(ResnetBlock),
}

impl Layer {
    /// Forward pass
    pub fn forward(&self, x: &Tensor, ctx: &Context) -> Tensor {
        match self {
            Self::Pad(pad) => pad.forward(x),
            Self::Conv(conv) => conv.forward(x),
            Self::ConvTranspose(conv) => conv.forward(x),
            Self::Norm(norm) => norm.forward(x, ctx),
            Self::Relu => relu(x),
            Self::LeakyRelu { negative_slope } => leaky_relu(x, *negative_slope),
            Self::Tanh => tanh(x),
            Self::Sigmoid => sigmoid(x),
            Self::Dropout(dropout) => dropout.forward(x, ctx),
            Self::Residual(block) => block.forward(x, ctx),
        }
    }

    /// Trainable parameter handles
    pub fn parameters(&self) -> Vec<Tensor> {
        match self {
            Self::Conv(conv) => conv.parameters(),
            Self::ConvTranspose(conv) => conv.parameters(),
            Self::Norm(norm) => norm.parameters(),
            Self::Residual(block) => block.parameters(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pad(pad) => pad.fmt(f),
            Self::Conv(conv) => conv.fmt(f),
            Self::ConvTranspose(conv) => conv.fmt(f),
            Self::Norm(norm) => norm.fmt(f),
            Self::Relu => f.write_str("ReLU"),
            Self::LeakyRelu { negative_slope } => write!(f, "LeakyReLU({negative_slope})"),
            Self::Tanh => f.write_str("Tanh"),
            Self::Sigmoid => f.write_str("Sigmoid"),
            Self::Dropout(dropout) => dropout.fmt(f),
            Self::Residual(block) => block.fmt(f),
        }
    }
}

/// Run an ordered layer slice
pub fn forward_seq(layers: &[Layer], x: &Tensor, ctx: &Context) -> Tensor {
    let mut h = x.clone();
    for layer in layers {
        h = layer.forward(&h, ctx);
    }
    h
}

/// Collect every trainable parameter handle of an ordered layer slice
pub fn seq_parameters(layers: &[Layer]) -> Vec<Tensor> {
    layers.iter().flat_map(Layer::parameters).collect()
}

/// Render one line per layer, indented, for the structural summary
pub(crate) fn write_seq(f: &mut fmt::Formatter<'_>, layers: &[Layer], indent: usize) -> fmt::Result {
    let pad = "  ".repeat(indent);
    for (i, layer) in layers.iter().enumerate() {
        match layer {
            Layer::Residual(block) => {
                writeln!(f, "{pad}({i}): {}", block.header())?;
                write_seq(f, block.layers(), indent + 1)?;
            }
            other => writeln!(f, "{pad}({i}): {other}")?,
        }
    }
    Ok(())
}
