//! Residual generator: encoder – residual bottleneck – decoder
//!
//! The block design follows the fast-neural-style lineage: two 3×3
//! convolution stages wrapped around an identity shortcut, stacked at the
//! bottleneck between two strided downsampling stages and their mirrored
//! transposed-convolution upsampling stages.

use rand::Rng;
use std::fmt;

use super::config::GeneratorConfig;
use super::summary::Network;
use crate::autograd::{add, clamp, Context, PaddingMode, Tensor};
use crate::device::ComputeDevice;
use crate::error::{NetworkError, Result};
use crate::nn::{
    forward_seq, init_layers, seq_parameters, write_seq, Conv2d, ConvTranspose2d, Dropout, Layer,
    NormKind, Pad2d,
};

// Explicit-pad modes get a padding layer and an unpadded convolution; zero
// padding is folded into the convolution.
fn conv_padding(mode: PaddingMode, pad: usize) -> usize {
    if mode == PaddingMode::Zero {
        pad
    } else {
        0
    }
}

fn push_pad(layers: &mut Vec<Layer>, mode: PaddingMode, pad: usize) {
    if mode != PaddingMode::Zero {
        layers.push(Layer::Pad(Pad2d::new(pad, mode)));
    }
}

/// Fixed-topology residual block
///
/// Output = input + stage(input); the stages preserve the spatial size and
/// channel width exactly, so the sum is always well-formed.
#[derive(Debug)]
pub struct ResnetBlock {
    dim: usize,
    padding: PaddingMode,
    layers: Vec<Layer>,
}

impl ResnetBlock {
    /// Build the two-stage conv block
    pub fn new<R: Rng>(
        dim: usize,
        padding: PaddingMode,
        norm: NormKind,
        use_dropout: bool,
        use_bias: bool,
        rng: &mut R,
    ) -> Self {
        let p = conv_padding(padding, 1);
        let mut layers = Vec::new();

        push_pad(&mut layers, padding, 1);
        layers.push(Layer::Conv(Conv2d::new(dim, dim, 3, 1, p, use_bias, rng)));
        layers.push(Layer::Norm(norm.build(dim)));
        layers.push(Layer::Relu);
        if use_dropout {
            layers.push(Layer::Dropout(Dropout::new(0.5, rng)));
        }

        push_pad(&mut layers, padding, 1);
        layers.push(Layer::Conv(Conv2d::new(dim, dim, 3, 1, p, use_bias, rng)));
        layers.push(Layer::Norm(norm.build(dim)));

        Self { dim, padding, layers }
    }

    /// Forward pass: identity shortcut around the conv stages
    pub fn forward(&self, x: &Tensor, ctx: &Context) -> Tensor {
        add(x, &forward_seq(&self.layers, x, ctx))
    }

    /// Trainable parameter handles
    pub fn parameters(&self) -> Vec<Tensor> {
        seq_parameters(&self.layers)
    }

    /// Inner layers, for initialization and summary rendering
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// One-line description used as the summary heading
    pub fn header(&self) -> String {
        format!("ResnetBlock({}, padding={})", self.dim, self.padding)
    }
}

impl fmt::Display for ResnetBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header())
    }
}

/// Residual generator
///
/// stem → 2 strided downsamplings → `n_blocks` residual blocks → 2 mirrored
/// upsamplings → k7 head bounded by tanh. With residual learning the model
/// predicts a delta: output = clamp(input + net(input), -1, 1).
#[derive(Debug)]
pub struct ResnetGenerator {
    input_nc: usize,
    output_nc: usize,
    ngf: usize,
    n_blocks: usize,
    learn_residual: bool,
    use_parallel: bool,
    devices: Vec<usize>,
    device: ComputeDevice,
    model: Vec<Layer>,
}

impl ResnetGenerator {
    /// Build the generator graph
    pub fn new<R: Rng>(
        config: &GeneratorConfig,
        n_blocks: usize,
        norm: NormKind,
        padding: PaddingMode,
        rng: &mut R,
    ) -> Result<Self> {
        if config.learn_residual && config.input_nc != config.output_nc {
            return Err(NetworkError::ChannelMismatch {
                input_nc: config.input_nc,
                output_nc: config.output_nc,
            });
        }

        let ngf = config.ngf;
        let use_bias = norm.conv_bias();
        let mut model = Vec::new();

        // Stem
        push_pad(&mut model, padding, 1);
        model.push(Layer::Conv(Conv2d::new(
            config.input_nc,
            ngf,
            3,
            1,
            conv_padding(padding, 1),
            use_bias,
            rng,
        )));
        model.push(Layer::Norm(norm.build(ngf)));
        model.push(Layer::Relu);

        // Downsampling: halve the resolution, double the width
        let n_downsampling = 2;
        for i in 0..n_downsampling {
            let mult = 1 << i;
            model.push(Layer::Conv(Conv2d::new(
                ngf * mult,
                ngf * mult * 2,
                3,
                2,
                1,
                use_bias,
                rng,
            )));
            model.push(Layer::Norm(norm.build(ngf * mult * 2)));
            model.push(Layer::Relu);
        }

        // Residual bottleneck
        let mult = 1 << n_downsampling;
        for _ in 0..n_blocks {
            model.push(Layer::Residual(ResnetBlock::new(
                ngf * mult,
                padding,
                norm,
                config.use_dropout,
                use_bias,
                rng,
            )));
        }

        // Upsampling mirrors the downsampling
        for i in 0..n_downsampling {
            let mult = 1 << (n_downsampling - i);
            model.push(Layer::ConvTranspose(ConvTranspose2d::new(
                ngf * mult,
                ngf * mult / 2,
                3,
                2,
                1,
                1,
                use_bias,
                rng,
            )));
            model.push(Layer::Norm(norm.build(ngf * mult / 2)));
            model.push(Layer::Relu);
        }

        // Head
        push_pad(&mut model, padding, 3);
        model.push(Layer::Conv(Conv2d::new(
            ngf,
            config.output_nc,
            7,
            1,
            conv_padding(padding, 3),
            true,
            rng,
        )));
        model.push(Layer::Tanh);

        Ok(Self {
            input_nc: config.input_nc,
            output_nc: config.output_nc,
            ngf,
            n_blocks,
            learn_residual: config.learn_residual,
            use_parallel: config.use_parallel,
            devices: config.devices.clone(),
            device: placement(&config.devices),
            model,
        })
    }

    /// Apply the normal-initialization policy to every parameterized layer
    pub fn init_weights<R: Rng>(&self, rng: &mut R) {
        init_layers(&self.model, rng);
    }

    /// Device the model is placed on
    pub fn device(&self) -> ComputeDevice {
        self.device
    }

    /// Devices listed for data-parallel invocation by the training driver
    pub fn devices(&self) -> &[usize] {
        &self.devices
    }

    /// Whether the training driver may replicate across `devices()`
    pub fn use_parallel(&self) -> bool {
        self.use_parallel
    }
}

pub(crate) fn placement(devices: &[usize]) -> ComputeDevice {
    devices
        .first()
        .map(|&device_id| ComputeDevice::Cuda { device_id })
        .unwrap_or(ComputeDevice::Cpu)
}

impl Network for ResnetGenerator {
    fn forward(&self, input: &Tensor, ctx: &Context) -> Tensor {
        let output = forward_seq(&self.model, input, ctx);
        if self.learn_residual {
            clamp(&add(input, &output), -1.0, 1.0)
        } else {
            output
        }
    }

    fn parameters(&self) -> Vec<Tensor> {
        seq_parameters(&self.model)
    }
}

impl fmt::Display for ResnetGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ResnetGenerator(input_nc={}, output_nc={}, ngf={}, n_blocks={}, learn_residual={})",
            self.input_nc, self.output_nc, self.ngf, self.n_blocks, self.learn_residual
        )?;
        write_seq(f, &self.model, 1)
    }
}
