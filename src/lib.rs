//! enfocar — motion-deblurring GAN architectures
//!
//! A model-definition library: it declares the layer graphs of an
//! image-to-image adversarial pair (residual and U-Net generators, a
//! PatchGAN discriminator) over a tape-based autograd substrate, and
//! returns composed differentiable models for an external optimization
//! loop to train.
//!
//! The crate deliberately contains no training loop, loss, optimizer,
//! dataset, or checkpoint logic. A driver obtains models through the
//! factories, reads their shared parameter handles, runs `forward`, and
//! calls [`autograd::backward`] on whatever loss it assembles.
//!
//! ```
//! use enfocar::autograd::{Context, Tensor};
//! use enfocar::networks::{
//!     define_discriminator_seeded, DiscriminatorConfig, Network,
//! };
//!
//! let config = DiscriminatorConfig { ndf: 4, ..DiscriminatorConfig::default() };
//! let netd = define_discriminator_seeded(&config, 0).unwrap();
//!
//! let image = Tensor::zeros(&[1, 3, 64, 64], false);
//! let scores = netd.forward(&image, &Context::new());
//! assert_eq!(scores.shape()[1], 1);
//! ```

pub mod autograd;
pub mod device;
pub mod error;
pub mod networks;
pub mod nn;

pub use autograd::{backward, Context, Tensor};
pub use device::{ComputeDevice, DeviceInfo};
pub use error::{NetworkError, Result};
pub use networks::{
    define_discriminator, define_discriminator_seeded, define_generator,
    define_generator_seeded, network_summary, DiscriminatorConfig, Generator, GeneratorConfig,
    NLayerDiscriminator, Network, ResnetGenerator, UnetGenerator,
};
