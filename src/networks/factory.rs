//! Factory functions: name-dispatched construction of generators and
//! discriminators
//!
//! Each factory validates the configuration (normalization mode, padding
//! strategy, device preconditions, channel constraints), builds the
//! requested variant, applies the normal-initialization policy exactly
//! once, and returns the finished model. Unrecognized names abort with a
//! configuration error.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;

use super::config::{DiscriminatorConfig, GeneratorConfig};
use super::discriminator::NLayerDiscriminator;
use super::resnet::ResnetGenerator;
use super::summary::Network;
use super::unet::UnetGenerator;
use crate::autograd::{Context, PaddingMode, Tensor};
use crate::device::ComputeDevice;
use crate::error::{NetworkError, Result};
use crate::nn::NormKind;

/// A constructed generator, either variant
#[derive(Debug)]
pub enum Generator {
    Resnet(ResnetGenerator),
    Unet(UnetGenerator),
}

impl Generator {
    /// Device the model is placed on
    pub fn device(&self) -> ComputeDevice {
        match self {
            Self::Resnet(net) => net.device(),
            Self::Unet(net) => net.device(),
        }
    }

    fn init_weights(&self, rng: &mut StdRng) {
        match self {
            Self::Resnet(net) => net.init_weights(rng),
            Self::Unet(net) => net.init_weights(rng),
        }
    }
}

impl Network for Generator {
    fn forward(&self, input: &Tensor, ctx: &Context) -> Tensor {
        match self {
            Self::Resnet(net) => net.forward(input, ctx),
            Self::Unet(net) => net.forward(input, ctx),
        }
    }

    fn parameters(&self) -> Vec<Tensor> {
        match self {
            Self::Resnet(net) => net.parameters(),
            Self::Unet(net) => net.parameters(),
        }
    }
}

impl fmt::Display for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resnet(net) => net.fmt(f),
            Self::Unet(net) => net.fmt(f),
        }
    }
}

fn check_devices(devices: &[usize]) -> Result<()> {
    if !devices.is_empty() && !ComputeDevice::cuda_available() {
        return Err(NetworkError::AcceleratorUnavailable);
    }
    Ok(())
}

/// Build a generator from its configuration
pub fn define_generator(config: &GeneratorConfig) -> Result<Generator> {
    let mut rng = StdRng::from_os_rng();
    build_generator(config, &mut rng)
}

/// Build a generator with a fixed construction seed
///
/// Same seed, same configuration, same parameters.
pub fn define_generator_seeded(config: &GeneratorConfig, seed: u64) -> Result<Generator> {
    let mut rng = StdRng::seed_from_u64(seed);
    build_generator(config, &mut rng)
}

fn build_generator(config: &GeneratorConfig, rng: &mut StdRng) -> Result<Generator> {
    check_devices(&config.devices)?;
    let norm = NormKind::from_name(&config.norm)?;
    let padding = PaddingMode::from_name(&config.padding)?;

    let net = match config.arch.as_str() {
        "resnet_9blocks" => {
            Generator::Resnet(ResnetGenerator::new(config, 9, norm, padding, rng)?)
        }
        "resnet_6blocks" => {
            Generator::Resnet(ResnetGenerator::new(config, 6, norm, padding, rng)?)
        }
        "unet_128" => Generator::Unet(UnetGenerator::new(config, 7, norm, rng)?),
        "unet_256" => Generator::Unet(UnetGenerator::new(config, 8, norm, rng)?),
        other => return Err(NetworkError::UnsupportedGenerator(other.to_string())),
    };

    net.init_weights(rng);
    Ok(net)
}

/// Build a discriminator from its configuration
pub fn define_discriminator(config: &DiscriminatorConfig) -> Result<NLayerDiscriminator> {
    let mut rng = StdRng::from_os_rng();
    build_discriminator(config, &mut rng)
}

/// Build a discriminator with a fixed construction seed
pub fn define_discriminator_seeded(
    config: &DiscriminatorConfig,
    seed: u64,
) -> Result<NLayerDiscriminator> {
    let mut rng = StdRng::seed_from_u64(seed);
    build_discriminator(config, &mut rng)
}

fn build_discriminator(
    config: &DiscriminatorConfig,
    rng: &mut StdRng,
) -> Result<NLayerDiscriminator> {
    check_devices(&config.devices)?;
    let norm = NormKind::from_name(&config.norm)?;

    let net = match config.arch.as_str() {
        "basic" => NLayerDiscriminator::new(config, 3, norm, rng),
        "n_layers" => NLayerDiscriminator::new(config, config.n_layers, norm, rng),
        other => return Err(NetworkError::UnsupportedDiscriminator(other.to_string())),
    };

    net.init_weights(rng);
    Ok(net)
}
