//! Configuration types for the deblurring networks
//!
//! Plain immutable data: the factories read these, validate them, and build
//! the graphs. Variant, normalization, and padding selection stay symbolic
//! (names), so unrecognized values surface as configuration errors instead
//! of failing to parse.

use serde::{Deserialize, Serialize};

/// Configuration for [`super::factory::define_generator`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Input image channels
    pub input_nc: usize,
    /// Output image channels
    pub output_nc: usize,
    /// Base filter count
    pub ngf: usize,
    /// Architecture name: `resnet_9blocks`, `resnet_6blocks`, `unet_128`, `unet_256`
    pub arch: String,
    /// Normalization mode: `batch` or `instance`
    pub norm: String,
    /// Insert dropout into the residual/bottleneck blocks
    pub use_dropout: bool,
    /// Padding strategy for the residual variant: `reflect`, `replicate`, `zero`
    pub padding: String,
    /// Accelerator device ids; empty means CPU
    pub devices: Vec<usize>,
    /// Allow the training driver to replicate across `devices`
    pub use_parallel: bool,
    /// Predict a clamped delta on top of the input instead of a full image
    pub learn_residual: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            input_nc: 3,
            output_nc: 3,
            ngf: 64,
            arch: "resnet_9blocks".to_string(),
            norm: "instance".to_string(),
            use_dropout: false,
            padding: "replicate".to_string(),
            devices: Vec::new(),
            use_parallel: true,
            learn_residual: false,
        }
    }
}

/// Configuration for [`super::factory::define_discriminator`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscriminatorConfig {
    /// Input image channels
    pub input_nc: usize,
    /// Base filter count
    pub ndf: usize,
    /// Architecture name: `basic` (fixed 3 layers) or `n_layers`
    pub arch: String,
    /// Strided stage count for the `n_layers` variant
    pub n_layers: usize,
    /// Normalization mode: `batch` or `instance`
    pub norm: String,
    /// Bound patch scores to [0, 1]
    pub use_sigmoid: bool,
    /// Accelerator device ids; empty means CPU
    pub devices: Vec<usize>,
    /// Allow the training driver to replicate across `devices`
    pub use_parallel: bool,
}

impl Default for DiscriminatorConfig {
    fn default() -> Self {
        Self {
            input_nc: 3,
            ndf: 64,
            arch: "basic".to_string(),
            n_layers: 3,
            norm: "instance".to_string(),
            use_sigmoid: false,
            devices: Vec::new(),
            use_parallel: true,
        }
    }
}
