//! Normalization layers and the symbolic mode selector

use ndarray::Ix4;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;

use crate::autograd::{batch_norm2d, instance_norm2d, normalize2d_fixed, Context, Tensor};
use crate::error::{NetworkError, Result};

const NORM_EPS: f32 = 1e-5;
const NORM_MOMENTUM: f32 = 0.1;

/// Symbolic normalization mode
///
/// The selector is pure and deterministic: it captures the fixed
/// configuration each mode implies. Batch normalization runs with affine
/// parameters and tracked running statistics; instance normalization runs
/// without affine parameters and with tracked running statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormKind {
    Batch,
    Instance,
}

impl NormKind {
    /// Parse a symbolic normalization name
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "batch" => Ok(Self::Batch),
            "instance" => Ok(Self::Instance),
            other => Err(NetworkError::UnsupportedNorm(other.to_string())),
        }
    }

    /// Symbolic name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Batch => "batch",
            Self::Instance => "instance",
        }
    }

    /// Whether convolutions feeding this norm should carry a bias
    ///
    /// Instance normalization has no affine parameters here, so the
    /// preceding convolution keeps its own bias; an affine batch norm makes
    /// the convolution bias redundant.
    pub fn conv_bias(&self) -> bool {
        matches!(self, Self::Instance)
    }

    /// Instantiate a normalization layer over `num_features` channels
    pub fn build(&self, num_features: usize) -> Norm2d {
        match self {
            Self::Batch => Norm2d::Batch(BatchNorm2d::new(num_features)),
            Self::Instance => Norm2d::Instance(InstanceNorm2d::new(num_features)),
        }
    }
}

impl fmt::Display for NormKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Per-channel batch statistics of an NCHW tensor: (means, unbiased vars)
// for the running-buffer update. Normalization itself recomputes biased
// statistics inside the autograd op.
fn channel_batch_stats(x: &Tensor) -> (Vec<f32>, Vec<f32>) {
    let data = x.data();
    let x4 = data.view().into_dimensionality::<Ix4>().expect("4-D");
    let (n, c, h, w) = x4.dim();
    let m = (n * h * w) as f32;

    let mut means = vec![0.0f32; c];
    let mut vars = vec![0.0f32; c];
    for bc in 0..c {
        let mut sum = 0.0f32;
        let mut sq_sum = 0.0f32;
        for bn in 0..n {
            for i in 0..h {
                for j in 0..w {
                    let v = x4[[bn, bc, i, j]];
                    sum += v;
                    sq_sum += v * v;
                }
            }
        }
        let mean = sum / m;
        let var = (sq_sum / m - mean * mean).max(0.0);
        means[bc] = mean;
        vars[bc] = if m > 1.0 { var * m / (m - 1.0) } else { var };
    }
    (means, vars)
}

// Per-channel statistics averaged over instances: instance-norm running
// buffers track the mean of per-instance statistics.
fn instance_batch_stats(x: &Tensor) -> (Vec<f32>, Vec<f32>) {
    let data = x.data();
    let x4 = data.view().into_dimensionality::<Ix4>().expect("4-D");
    let (n, c, h, w) = x4.dim();
    let m = (h * w) as f32;

    let mut means = vec![0.0f32; c];
    let mut vars = vec![0.0f32; c];
    for bc in 0..c {
        for bn in 0..n {
            let mut sum = 0.0f32;
            let mut sq_sum = 0.0f32;
            for i in 0..h {
                for j in 0..w {
                    let v = x4[[bn, bc, i, j]];
                    sum += v;
                    sq_sum += v * v;
                }
            }
            let mean = sum / m;
            let var = (sq_sum / m - mean * mean).max(0.0);
            means[bc] += mean / n as f32;
            vars[bc] += if m > 1.0 { var * m / (m - 1.0) } else { var } / n as f32;
        }
    }
    (means, vars)
}

fn update_running(
    running_mean: &RefCell<Vec<f32>>,
    running_var: &RefCell<Vec<f32>>,
    means: &[f32],
    vars: &[f32],
) {
    let mut rm = running_mean.borrow_mut();
    let mut rv = running_var.borrow_mut();
    for c in 0..rm.len() {
        rm[c] = (1.0 - NORM_MOMENTUM) * rm[c] + NORM_MOMENTUM * means[c];
        rv[c] = (1.0 - NORM_MOMENTUM) * rv[c] + NORM_MOMENTUM * vars[c];
    }
}

/// Batch normalization layer (affine, tracked running statistics)
#[derive(Debug)]
pub struct BatchNorm2d {
    num_features: usize,
    /// Per-channel scale γ
    pub weight: Tensor,
    /// Per-channel shift β
    pub bias: Tensor,
    running_mean: RefCell<Vec<f32>>,
    running_var: RefCell<Vec<f32>>,
}

impl BatchNorm2d {
    /// Create a batch normalization layer over `num_features` channels
    pub fn new(num_features: usize) -> Self {
        Self {
            num_features,
            weight: Tensor::ones(&[num_features], true),
            bias: Tensor::zeros(&[num_features], true),
            running_mean: RefCell::new(vec![0.0; num_features]),
            running_var: RefCell::new(vec![1.0; num_features]),
        }
    }

    /// Forward pass
    ///
    /// Training mode normalizes with batch statistics and updates the
    /// running buffers; eval mode normalizes with the running buffers.
    pub fn forward(&self, x: &Tensor, ctx: &Context) -> Tensor {
        if ctx.is_training() {
            let (means, vars) = channel_batch_stats(x);
            update_running(&self.running_mean, &self.running_var, &means, &vars);
            batch_norm2d(x, Some(&self.weight), Some(&self.bias), NORM_EPS)
        } else {
            normalize2d_fixed(
                x,
                Some(&self.weight),
                Some(&self.bias),
                &self.running_mean.borrow(),
                &self.running_var.borrow(),
                NORM_EPS,
            )
        }
    }

    /// Current running mean buffer
    pub fn running_mean(&self) -> Vec<f32> {
        self.running_mean.borrow().clone()
    }

    /// Current running variance buffer
    pub fn running_var(&self) -> Vec<f32> {
        self.running_var.borrow().clone()
    }
}

/// Instance normalization layer (no affine parameters, tracked running statistics)
#[derive(Debug)]
pub struct InstanceNorm2d {
    num_features: usize,
    running_mean: RefCell<Vec<f32>>,
    running_var: RefCell<Vec<f32>>,
}

impl InstanceNorm2d {
    /// Create an instance normalization layer over `num_features` channels
    pub fn new(num_features: usize) -> Self {
        Self {
            num_features,
            running_mean: RefCell::new(vec![0.0; num_features]),
            running_var: RefCell::new(vec![1.0; num_features]),
        }
    }

    /// Forward pass
    pub fn forward(&self, x: &Tensor, ctx: &Context) -> Tensor {
        if ctx.is_training() {
            let (means, vars) = instance_batch_stats(x);
            update_running(&self.running_mean, &self.running_var, &means, &vars);
            instance_norm2d(x, None, None, NORM_EPS)
        } else {
            normalize2d_fixed(
                x,
                None,
                None,
                &self.running_mean.borrow(),
                &self.running_var.borrow(),
                NORM_EPS,
            )
        }
    }

    /// Current running mean buffer
    pub fn running_mean(&self) -> Vec<f32> {
        self.running_mean.borrow().clone()
    }

    /// Current running variance buffer
    pub fn running_var(&self) -> Vec<f32> {
        self.running_var.borrow().clone()
    }
}

/// Tagged normalization layer
#[derive(Debug)]
pub enum Norm2d {
    Batch(BatchNorm2d),
    Instance(InstanceNorm2d),
}

impl Norm2d {
    /// Forward pass
    pub fn forward(&self, x: &Tensor, ctx: &Context) -> Tensor {
        match self {
            Self::Batch(norm) => norm.forward(x, ctx),
            Self::Instance(norm) => norm.forward(x, ctx),
        }
    }

    /// Trainable parameter handles
    pub fn parameters(&self) -> Vec<Tensor> {
        match self {
            Self::Batch(norm) => vec![norm.weight.clone(), norm.bias.clone()],
            Self::Instance(_) => Vec::new(),
        }
    }

    /// Channel count
    pub fn num_features(&self) -> usize {
        match self {
            Self::Batch(norm) => norm.num_features,
            Self::Instance(norm) => norm.num_features,
        }
    }

    /// Whether the layer carries affine parameters
    pub fn affine(&self) -> bool {
        matches!(self, Self::Batch(_))
    }

    /// Whether the layer tracks running statistics
    pub fn tracks_running_stats(&self) -> bool {
        true
    }
}

impl fmt::Display for Norm2d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Batch(norm) => write!(f, "BatchNorm2d({}, affine=true)", norm.num_features),
            Self::Instance(norm) => {
                write!(f, "InstanceNorm2d({}, affine=false)", norm.num_features)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_batch_configuration() {
        let kind = NormKind::from_name("batch").unwrap();
        assert_eq!(kind, NormKind::Batch);
        assert!(!kind.conv_bias());

        let norm = kind.build(16);
        assert!(norm.affine());
        assert!(norm.tracks_running_stats());
        assert_eq!(norm.num_features(), 16);
        assert_eq!(norm.parameters().len(), 2);
    }

    #[test]
    fn test_selector_instance_configuration() {
        let kind = NormKind::from_name("instance").unwrap();
        assert_eq!(kind, NormKind::Instance);
        assert!(kind.conv_bias());

        let norm = kind.build(16);
        assert!(!norm.affine());
        assert!(norm.tracks_running_stats());
        assert!(norm.parameters().is_empty());
    }

    #[test]
    fn test_selector_rejects_unknown_mode() {
        let err = NormKind::from_name("group").unwrap_err();
        assert!(matches!(err, NetworkError::UnsupportedNorm(name) if name == "group"));
    }

    #[test]
    fn test_batch_norm_updates_running_stats_in_training() {
        let norm = BatchNorm2d::new(1);
        let mut ctx = Context::new();
        let x = Tensor::from_shape_vec(&[1, 1, 2, 2], vec![10.0, 12.0, 14.0, 16.0], false);

        let _ = norm.forward(&x, &ctx);
        let rm = norm.running_mean();
        // Fresh buffer is 0; one update moves it 10% toward the batch mean 13.
        assert!((rm[0] - 1.3).abs() < 1e-4, "running mean = {}", rm[0]);

        // Eval mode must not move the buffers.
        ctx.eval();
        let _ = norm.forward(&x, &ctx);
        assert!((norm.running_mean()[0] - 1.3).abs() < 1e-4);
    }

    #[test]
    fn test_instance_norm_eval_uses_running_stats() {
        let norm = InstanceNorm2d::new(1);
        let mut ctx = Context::new();
        ctx.eval();

        // With the initial buffers (mean 0, var 1) eval normalization is the
        // identity up to eps.
        let x = Tensor::from_shape_vec(&[1, 1, 2, 2], vec![1.0, -1.0, 2.0, -2.0], false);
        let y = norm.forward(&x, &ctx);
        for (a, b) in y.data().iter().zip(x.data().iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_norm_display() {
        assert_eq!(
            NormKind::Batch.build(64).to_string(),
            "BatchNorm2d(64, affine=true)"
        );
        assert_eq!(
            NormKind::Instance.build(32).to_string(),
            "InstanceNorm2d(32, affine=false)"
        );
    }
}
