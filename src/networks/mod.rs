//! Deblurring network architectures
//!
//! The adversarial pair for motion deblurring:
//!
//! ```text
//! Blurred image ──► Generator ──► Restored image ──┬─► Discriminator ──► patch scores
//!                                                  │
//!                   Sharp ground truth ────────────┘
//! ```
//!
//! Two generator families are provided — a residual encoder–bottleneck–
//! decoder and a recursively nested U-Net — plus a PatchGAN discriminator.
//! The factories select a variant by name, validate the configuration,
//! initialize weights, and hand back a [`Network`] the external training
//! loop drives.
//!
//! # Example
//!
//! ```
//! use enfocar::autograd::{Context, Tensor};
//! use enfocar::networks::{define_generator_seeded, GeneratorConfig, Network};
//!
//! let config = GeneratorConfig {
//!     ngf: 4,
//!     arch: "resnet_6blocks".to_string(),
//!     ..GeneratorConfig::default()
//! };
//! let net = define_generator_seeded(&config, 42).unwrap();
//!
//! let blurred = Tensor::zeros(&[1, 3, 16, 16], false);
//! let restored = net.forward(&blurred, &Context::new());
//! assert_eq!(restored.shape(), vec![1, 3, 16, 16]);
//! ```

pub mod config;
pub mod discriminator;
pub mod factory;
pub mod resnet;
pub mod summary;
pub mod unet;

pub use config::{DiscriminatorConfig, GeneratorConfig};
pub use discriminator::NLayerDiscriminator;
pub use factory::{
    define_discriminator, define_discriminator_seeded, define_generator,
    define_generator_seeded, Generator,
};
pub use resnet::{ResnetBlock, ResnetGenerator};
pub use summary::{network_summary, Network};
pub use unet::{UnetGenerator, UnetSkipBlock};
