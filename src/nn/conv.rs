//! Convolution layers with owned parameters

use rand::Rng;
use std::fmt;

use super::init::sample_normal;
use crate::autograd::{conv2d, conv_transpose2d, Tensor};

fn init_weight<R: Rng>(shape: &[usize], fan_in: usize, fan_out: usize, rng: &mut R) -> Tensor {
    // Xavier scale; the factory re-applies the adversarial policy afterwards.
    let std = (2.0 / (fan_in + fan_out) as f64).sqrt() as f32;
    let len: usize = shape.iter().product();
    let values: Vec<f32> = (0..len).map(|_| sample_normal(rng, 0.0, std)).collect();
    Tensor::from_shape_vec(shape, values, true)
}

/// 2-D convolution layer
#[derive(Debug)]
pub struct Conv2d {
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    /// Kernel weights, `[out_channels, in_channels, k, k]`
    pub weight: Tensor,
    /// Optional per-output-channel bias
    pub bias: Option<Tensor>,
}

impl Conv2d {
    /// Create a convolution layer with freshly initialized parameters
    pub fn new<R: Rng>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        bias: bool,
        rng: &mut R,
    ) -> Self {
        let k = kernel_size;
        let weight = init_weight(
            &[out_channels, in_channels, k, k],
            in_channels * k * k,
            out_channels * k * k,
            rng,
        );
        Self {
            in_channels,
            out_channels,
            kernel_size,
            stride,
            padding,
            weight,
            bias: bias.then(|| Tensor::zeros(&[out_channels], true)),
        }
    }

    /// Forward pass
    pub fn forward(&self, x: &Tensor) -> Tensor {
        conv2d(x, &self.weight, self.bias.as_ref(), self.stride, self.padding)
    }

    /// Trainable parameter handles
    pub fn parameters(&self) -> Vec<Tensor> {
        let mut params = vec![self.weight.clone()];
        params.extend(self.bias.clone());
        params
    }

    /// Output channel count
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }
}

impl fmt::Display for Conv2d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Conv2d({}, {}, kernel_size={}, stride={}, padding={}, bias={})",
            self.in_channels,
            self.out_channels,
            self.kernel_size,
            self.stride,
            self.padding,
            self.bias.is_some()
        )
    }
}

/// 2-D transposed convolution layer
#[derive(Debug)]
pub struct ConvTranspose2d {
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    output_padding: usize,
    /// Kernel weights, `[in_channels, out_channels, k, k]`
    pub weight: Tensor,
    /// Optional per-output-channel bias
    pub bias: Option<Tensor>,
}

impl ConvTranspose2d {
    /// Create a transposed-convolution layer with freshly initialized parameters
    #[allow(clippy::too_many_arguments)]
    pub fn new<R: Rng>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        output_padding: usize,
        bias: bool,
        rng: &mut R,
    ) -> Self {
        let k = kernel_size;
        let weight = init_weight(
            &[in_channels, out_channels, k, k],
            in_channels * k * k,
            out_channels * k * k,
            rng,
        );
        Self {
            in_channels,
            out_channels,
            kernel_size,
            stride,
            padding,
            output_padding,
            weight,
            bias: bias.then(|| Tensor::zeros(&[out_channels], true)),
        }
    }

    /// Forward pass
    pub fn forward(&self, x: &Tensor) -> Tensor {
        conv_transpose2d(
            x,
            &self.weight,
            self.bias.as_ref(),
            self.stride,
            self.padding,
            self.output_padding,
        )
    }

    /// Trainable parameter handles
    pub fn parameters(&self) -> Vec<Tensor> {
        let mut params = vec![self.weight.clone()];
        params.extend(self.bias.clone());
        params
    }

    /// Output channel count
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }
}

impl fmt::Display for ConvTranspose2d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConvTranspose2d({}, {}, kernel_size={}, stride={}, padding={}, output_padding={}, bias={})",
            self.in_channels,
            self.out_channels,
            self.kernel_size,
            self.stride,
            self.padding,
            self.output_padding,
            self.bias.is_some()
        )
    }
}
