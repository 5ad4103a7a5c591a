//! Explicit spatial padding layer

use std::fmt;

use crate::autograd::{pad2d, PaddingMode, Tensor};

/// Explicit padding layer placed ahead of a convolution
///
/// Zero padding is normally folded into the convolution itself; this layer
/// exists for the reflect/replicate strategies (and for the wide border of
/// the k7 head convolution).
#[derive(Debug)]
pub struct Pad2d {
    padding: usize,
    mode: PaddingMode,
}

impl Pad2d {
    /// Create a padding layer
    pub fn new(padding: usize, mode: PaddingMode) -> Self {
        Self { padding, mode }
    }

    /// Forward pass
    pub fn forward(&self, x: &Tensor) -> Tensor {
        pad2d(x, self.padding, self.mode)
    }
}

impl fmt::Display for Pad2d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            PaddingMode::Reflect => write!(f, "ReflectionPad2d({})", self.padding),
            PaddingMode::Replicate => write!(f, "ReplicationPad2d({})", self.padding),
            PaddingMode::Zero => write!(f, "ZeroPad2d({})", self.padding),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_layer_grows_spatial_dims() {
        let pad = Pad2d::new(3, PaddingMode::Replicate);
        let x = Tensor::zeros(&[1, 3, 8, 8], false);
        assert_eq!(pad.forward(&x).shape(), vec![1, 3, 14, 14]);
    }

    #[test]
    fn test_pad_layer_display() {
        assert_eq!(Pad2d::new(1, PaddingMode::Reflect).to_string(), "ReflectionPad2d(1)");
        assert_eq!(Pad2d::new(3, PaddingMode::Replicate).to_string(), "ReplicationPad2d(3)");
    }
}
