//! PatchGAN discriminator
//!
//! An N-layer strided convolutional classifier that scores overlapping
//! patches instead of whole images: the output is a spatial grid of
//! real/fake logits, one per receptive field.

use rand::Rng;
use std::fmt;

use super::config::DiscriminatorConfig;
use super::resnet::placement;
use super::summary::Network;
use crate::autograd::{Context, Tensor};
use crate::device::ComputeDevice;
use crate::nn::{forward_seq, init_layers, seq_parameters, write_seq, Conv2d, Layer, NormKind};

const KW: usize = 4;

/// N-layer patch discriminator
#[derive(Debug)]
pub struct NLayerDiscriminator {
    input_nc: usize,
    ndf: usize,
    n_layers: usize,
    use_sigmoid: bool,
    use_parallel: bool,
    devices: Vec<usize>,
    device: ComputeDevice,
    model: Vec<Layer>,
}

impl NLayerDiscriminator {
    /// Build the discriminator graph
    pub fn new<R: Rng>(
        config: &DiscriminatorConfig,
        n_layers: usize,
        norm: NormKind,
        rng: &mut R,
    ) -> Self {
        let ndf = config.ndf;
        let use_bias = norm.conv_bias();
        let padw = (KW - 1).div_ceil(2);
        let mut model = Vec::new();

        // Stem
        model.push(Layer::Conv(Conv2d::new(
            config.input_nc,
            ndf,
            KW,
            2,
            padw,
            true,
            rng,
        )));
        model.push(Layer::LeakyRelu { negative_slope: 0.2 });

        // Strided stages of doubling width, capped at 8x
        let mut nf_mult = 1;
        for n in 1..n_layers {
            let nf_mult_prev = nf_mult;
            nf_mult = (1 << n).min(8);
            model.push(Layer::Conv(Conv2d::new(
                ndf * nf_mult_prev,
                ndf * nf_mult,
                KW,
                2,
                padw,
                use_bias,
                rng,
            )));
            model.push(Layer::Norm(norm.build(ndf * nf_mult)));
            model.push(Layer::LeakyRelu { negative_slope: 0.2 });
        }

        // One stride-1 stage at the capped width
        let nf_mult_prev = nf_mult;
        nf_mult = (1 << n_layers).min(8);
        model.push(Layer::Conv(Conv2d::new(
            ndf * nf_mult_prev,
            ndf * nf_mult,
            KW,
            1,
            padw,
            use_bias,
            rng,
        )));
        model.push(Layer::Norm(norm.build(ndf * nf_mult)));
        model.push(Layer::LeakyRelu { negative_slope: 0.2 });

        // Single-channel patch score map
        model.push(Layer::Conv(Conv2d::new(ndf * nf_mult, 1, KW, 1, padw, true, rng)));

        if config.use_sigmoid {
            model.push(Layer::Sigmoid);
        }

        Self {
            input_nc: config.input_nc,
            ndf,
            n_layers,
            use_sigmoid: config.use_sigmoid,
            use_parallel: config.use_parallel,
            devices: config.devices.clone(),
            device: placement(&config.devices),
            model,
        }
    }

    /// Apply the normal-initialization policy to every parameterized layer
    pub fn init_weights<R: Rng>(&self, rng: &mut R) {
        init_layers(&self.model, rng);
    }

    /// Number of strided stages after the stem
    pub fn n_layers(&self) -> usize {
        self.n_layers
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

impl Network for NLayerDiscriminator {
    fn forward(&self, input: &Tensor, ctx: &Context) -> Tensor {
        forward_seq(&self.model, input, ctx)
    }

    fn parameters(&self) -> Vec<Tensor> {
        seq_parameters(&self.model)
    }
}

impl fmt::Display for NLayerDiscriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "NLayerDiscriminator(input_nc={}, ndf={}, n_layers={}, sigmoid={})",
            self.input_nc, self.ndf, self.n_layers, self.use_sigmoid
        )?;
        write_seq(f, &self.model, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_config() -> DiscriminatorConfig {
        DiscriminatorConfig {
            input_nc: 3,
            ndf: 4,
            ..DiscriminatorConfig::default()
        }
    }

    #[test]
    fn test_discriminator_produces_single_channel_score_map() {
        let mut rng = StdRng::seed_from_u64(8);
        let net = NLayerDiscriminator::new(&small_config(), 3, NormKind::Instance, &mut rng);
        let ctx = Context::new();

        let x = Tensor::zeros(&[2, 3, 64, 64], false);
        let y = net.forward(&x, &ctx);
        let shape = y.shape();
        assert_eq!(shape[0], 2);
        assert_eq!(shape[1], 1);
        assert!(shape[2] < 64 && shape[3] < 64, "score map must be reduced");
    }

    #[test]
    fn test_discriminator_resolution_shrinks_per_strided_stage() {
        let mut rng = StdRng::seed_from_u64(8);
        let ctx = Context::new();

        // Track spatial size through successively deeper discriminators: each
        // added strided stage must shrink the score map further.
        let mut previous = usize::MAX;
        for n_layers in 1..=3 {
            let net =
                NLayerDiscriminator::new(&small_config(), n_layers, NormKind::Instance, &mut rng);
            let y = net.forward(&Tensor::zeros(&[1, 3, 64, 64], false), &ctx);
            let size = y.shape()[2];
            assert!(size < previous, "n_layers={n_layers} did not shrink: {size}");
            previous = size;
        }
    }

    #[test]
    fn test_discriminator_sigmoid_bounds_scores() {
        let mut rng = StdRng::seed_from_u64(8);
        let config = DiscriminatorConfig {
            use_sigmoid: true,
            ..small_config()
        };
        let net = NLayerDiscriminator::new(&config, 3, NormKind::Instance, &mut rng);
        let ctx = Context::new();

        let x = Tensor::from_shape_vec(
            &[1, 3, 32, 32],
            (0..3 * 32 * 32).map(|v| ((v as f32) * 0.11).sin()).collect(),
            false,
        );
        let y = net.forward(&x, &ctx);
        assert!(y.data().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_discriminator_width_caps_at_eight_fold() {
        let mut rng = StdRng::seed_from_u64(8);
        let net = NLayerDiscriminator::new(&small_config(), 5, NormKind::Batch, &mut rng);
        let text = net.to_string();
        // ndf=4: widths double per stage but never exceed 32 channels.
        assert!(text.contains("Conv2d(32, 32"), "summary:\n{text}");
        assert!(!text.contains("Conv2d(32, 64"), "summary:\n{text}");
    }
}
