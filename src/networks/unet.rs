//! U-shaped generator built from recursively nested skip blocks
//!
//! ```text
//! X ----------------------identity---------------------- X
//!   |-- downsampling -- |nested block| -- upsampling --|
//! ```
//!
//! Each non-outermost block returns the channel-wise concatenation of its
//! up-sampled output with its own input, which is why every enclosing
//! up-convolution consumes twice the nested width. The tree is built bottom
//! up, innermost first, and owned strictly: each block holds at most one
//! nested block.

use rand::Rng;
use std::fmt;

use super::config::GeneratorConfig;
use super::resnet::placement;
use super::summary::Network;
use crate::autograd::{add, clamp, concat_channels, Context, Tensor};
use crate::device::ComputeDevice;
use crate::error::{NetworkError, Result};
use crate::nn::{
    forward_seq, init_layers, seq_parameters, write_seq, Conv2d, ConvTranspose2d, Dropout, Layer,
    NormKind,
};

/// Position of a skip block within the U
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnetPosition {
    Innermost,
    Intermediate,
    Outermost,
}

/// Self-similar skip block
#[derive(Debug)]
pub struct UnetSkipBlock {
    position: UnetPosition,
    outer_nc: usize,
    inner_nc: usize,
    down: Vec<Layer>,
    submodule: Option<Box<UnetSkipBlock>>,
    up: Vec<Layer>,
}

impl UnetSkipBlock {
    /// Innermost block: no nested submodule
    pub fn innermost<R: Rng>(outer_nc: usize, inner_nc: usize, norm: NormKind, rng: &mut R) -> Self {
        let use_bias = norm.conv_bias();
        let down = vec![
            Layer::LeakyRelu { negative_slope: 0.2 },
            Layer::Conv(Conv2d::new(outer_nc, inner_nc, 4, 2, 1, use_bias, rng)),
        ];
        let up = vec![
            Layer::Relu,
            Layer::ConvTranspose(ConvTranspose2d::new(
                inner_nc, outer_nc, 4, 2, 1, 0, use_bias, rng,
            )),
            Layer::Norm(norm.build(outer_nc)),
        ];
        Self {
            position: UnetPosition::Innermost,
            outer_nc,
            inner_nc,
            down,
            submodule: None,
            up,
        }
    }

    /// Intermediate block wrapping a nested submodule
    ///
    /// The up-convolution consumes `2·inner_nc` channels: the nested block
    /// returns its output concatenated with its input.
    pub fn intermediate<R: Rng>(
        outer_nc: usize,
        inner_nc: usize,
        submodule: UnetSkipBlock,
        norm: NormKind,
        use_dropout: bool,
        rng: &mut R,
    ) -> Self {
        let use_bias = norm.conv_bias();
        let down = vec![
            Layer::LeakyRelu { negative_slope: 0.2 },
            Layer::Conv(Conv2d::new(outer_nc, inner_nc, 4, 2, 1, use_bias, rng)),
            Layer::Norm(norm.build(inner_nc)),
        ];
        let mut up = vec![
            Layer::Relu,
            Layer::ConvTranspose(ConvTranspose2d::new(
                inner_nc * 2,
                outer_nc,
                4,
                2,
                1,
                0,
                use_bias,
                rng,
            )),
            Layer::Norm(norm.build(outer_nc)),
        ];
        if use_dropout {
            up.push(Layer::Dropout(Dropout::new(0.5, rng)));
        }
        Self {
            position: UnetPosition::Intermediate,
            outer_nc,
            inner_nc,
            down,
            submodule: Some(Box::new(submodule)),
            up,
        }
    }

    /// Outermost block: bare down-convolution, tanh-bounded up path
    pub fn outermost<R: Rng>(
        outer_nc: usize,
        inner_nc: usize,
        submodule: UnetSkipBlock,
        norm: NormKind,
        rng: &mut R,
    ) -> Self {
        let use_bias = norm.conv_bias();
        let down = vec![Layer::Conv(Conv2d::new(
            outer_nc, inner_nc, 4, 2, 1, use_bias, rng,
        ))];
        let up = vec![
            Layer::Relu,
            Layer::ConvTranspose(ConvTranspose2d::new(
                inner_nc * 2,
                outer_nc,
                4,
                2,
                1,
                0,
                true,
                rng,
            )),
            Layer::Tanh,
        ];
        Self {
            position: UnetPosition::Outermost,
            outer_nc,
            inner_nc,
            down,
            submodule: Some(Box::new(submodule)),
            up,
        }
    }

    /// Forward pass
    ///
    /// Down path, nested block, up path; every non-outermost result is the
    /// channel concatenation with the block's own input. The symmetric
    /// k4/s2/p1 sampling guarantees the spatial sizes agree.
    pub fn forward(&self, x: &Tensor, ctx: &Context) -> Tensor {
        let mut h = forward_seq(&self.down, x, ctx);
        if let Some(submodule) = &self.submodule {
            h = submodule.forward(&h, ctx);
        }
        let h = forward_seq(&self.up, &h, ctx);
        match self.position {
            UnetPosition::Outermost => h,
            _ => concat_channels(&h, x),
        }
    }

    /// Trainable parameter handles of the whole subtree
    pub fn parameters(&self) -> Vec<Tensor> {
        let mut params = seq_parameters(&self.down);
        if let Some(submodule) = &self.submodule {
            params.extend(submodule.parameters());
        }
        params.extend(seq_parameters(&self.up));
        params
    }

    /// Apply the normal-initialization policy to the whole subtree
    pub fn init_weights<R: Rng>(&self, rng: &mut R) {
        init_layers(&self.down, rng);
        if let Some(submodule) = &self.submodule {
            submodule.init_weights(rng);
        }
        init_layers(&self.up, rng);
    }

    /// Nesting depth of this subtree
    pub fn depth(&self) -> usize {
        1 + self.submodule.as_ref().map_or(0, |s| s.depth())
    }

    fn write(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        writeln!(
            f,
            "{pad}UnetSkipBlock({:?}, outer_nc={}, inner_nc={})",
            self.position, self.outer_nc, self.inner_nc
        )?;
        write_seq(f, &self.down, indent + 1)?;
        if let Some(submodule) = &self.submodule {
            submodule.write(f, indent + 1)?;
        }
        write_seq(f, &self.up, indent + 1)
    }
}

impl fmt::Display for UnetSkipBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f, 0)
    }
}

/// U-Net generator
///
/// Built bottom-up: an innermost block at `8·ngf`, `num_downs − 5` further
/// bottleneck blocks at `8·ngf`, four blocks stepping the width down to
/// `ngf`, and the outermost block mapping back to image channels. Minimum
/// valid input spatial size is `2^num_downs`.
#[derive(Debug)]
pub struct UnetGenerator {
    input_nc: usize,
    output_nc: usize,
    ngf: usize,
    num_downs: usize,
    learn_residual: bool,
    use_parallel: bool,
    devices: Vec<usize>,
    device: ComputeDevice,
    model: UnetSkipBlock,
}

impl UnetGenerator {
    /// Build the generator tree
    pub fn new<R: Rng>(
        config: &GeneratorConfig,
        num_downs: usize,
        norm: NormKind,
        rng: &mut R,
    ) -> Result<Self> {
        // The skip topology feeds the input straight into the output stage,
        // so the variant only supports equal channel counts.
        if config.input_nc != config.output_nc {
            return Err(NetworkError::ChannelMismatch {
                input_nc: config.input_nc,
                output_nc: config.output_nc,
            });
        }
        if num_downs < 5 {
            return Err(NetworkError::DepthTooShallow(num_downs));
        }

        let ngf = config.ngf;
        let mut block = UnetSkipBlock::innermost(ngf * 8, ngf * 8, norm, rng);
        for _ in 0..num_downs - 5 {
            block =
                UnetSkipBlock::intermediate(ngf * 8, ngf * 8, block, norm, config.use_dropout, rng);
        }
        block = UnetSkipBlock::intermediate(ngf * 4, ngf * 8, block, norm, false, rng);
        block = UnetSkipBlock::intermediate(ngf * 2, ngf * 4, block, norm, false, rng);
        block = UnetSkipBlock::intermediate(ngf, ngf * 2, block, norm, false, rng);
        let model = UnetSkipBlock::outermost(config.output_nc, ngf, block, norm, rng);

        Ok(Self {
            input_nc: config.input_nc,
            output_nc: config.output_nc,
            ngf,
            num_downs,
            learn_residual: config.learn_residual,
            use_parallel: config.use_parallel,
            devices: config.devices.clone(),
            device: placement(&config.devices),
            model,
        })
    }

    /// Apply the normal-initialization policy to the whole tree
    pub fn init_weights<R: Rng>(&self, rng: &mut R) {
        self.model.init_weights(rng);
    }

    /// Number of downsampling stages
    pub fn num_downs(&self) -> usize {
        self.num_downs
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

impl Network for UnetGenerator {
    fn forward(&self, input: &Tensor, ctx: &Context) -> Tensor {
        let output = self.model.forward(input, ctx);
        if self.learn_residual {
            clamp(&add(input, &output), -1.0, 1.0)
        } else {
            output
        }
    }

    fn parameters(&self) -> Vec<Tensor> {
        self.model.parameters()
    }
}

impl fmt::Display for UnetGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "UnetGenerator(input_nc={}, output_nc={}, ngf={}, num_downs={}, learn_residual={})",
            self.input_nc, self.output_nc, self.ngf, self.num_downs, self.learn_residual
        )?;
        self.model.write(f, 1)
    }
}
