//! Normal-distribution weight initialization
//!
//! The adversarial-training initialization policy: convolution weights are
//! resampled from N(0, 0.02²) with zeroed biases, batch-normalization
//! weights from N(1, 0.02²) with zeroed biases. Applied once, after
//! construction, over the closed set of layer kinds.

use ndarray::{ArrayD, IxDyn};
use rand::Rng;

use super::layer::Layer;
use super::norm::Norm2d;
use crate::autograd::Tensor;

/// Standard deviation of the initialization policy
pub const INIT_STD: f32 = 0.02;

/// Sample from N(mean, std²) using the Box–Muller transform
pub(crate) fn sample_normal<R: Rng>(rng: &mut R, mean: f32, std: f32) -> f32 {
    let u1: f64 = rng.random::<f64>().max(1e-10);
    let u2: f64 = rng.random::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + (z * f64::from(std)) as f32
}

/// Refill a tensor with samples from N(mean, std²), preserving its shape
pub(crate) fn fill_normal<R: Rng>(tensor: &Tensor, mean: f32, std: f32, rng: &mut R) {
    let shape = tensor.shape();
    let values: Vec<f32> = (0..tensor.len())
        .map(|_| sample_normal(rng, mean, std))
        .collect();
    tensor.set_data(ArrayD::from_shape_vec(IxDyn(&shape), values).expect("shape preserved"));
}

/// Zero a tensor in place
pub(crate) fn fill_zeros(tensor: &Tensor) {
    tensor.set_data(ArrayD::zeros(IxDyn(&tensor.shape())));
}

/// Apply the initialization policy to a slice of layers
///
/// Dispatches over the closed `Layer` set: convolutions and batch
/// normalization are reinitialized, instance normalization carries no
/// affine parameters, everything else is parameter-free. Residual blocks
/// are visited recursively.
pub fn init_layers<R: Rng>(layers: &[Layer], rng: &mut R) {
    for layer in layers {
        match layer {
            Layer::Conv(conv) => {
                fill_normal(&conv.weight, 0.0, INIT_STD, rng);
                if let Some(bias) = &conv.bias {
                    fill_zeros(bias);
                }
            }
            Layer::ConvTranspose(conv) => {
                fill_normal(&conv.weight, 0.0, INIT_STD, rng);
                if let Some(bias) = &conv.bias {
                    fill_zeros(bias);
                }
            }
            Layer::Norm(Norm2d::Batch(norm)) => {
                fill_normal(&norm.weight, 1.0, INIT_STD, rng);
                fill_zeros(&norm.bias);
            }
            Layer::Norm(Norm2d::Instance(_)) => {}
            Layer::Residual(block) => init_layers(block.layers(), rng),
            Layer::Pad(_)
            | Layer::Relu
            | Layer::LeakyRelu { .. }
            | Layer::Tanh
            | Layer::Sigmoid
            | Layer::Dropout(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_sample_normal_moments() {
        let mut rng = StdRng::seed_from_u64(42);
        let samples: Vec<f32> = (0..20_000).map(|_| sample_normal(&mut rng, 0.0, 0.02)).collect();
        let n = samples.len() as f32;
        let mean: f32 = samples.iter().sum::<f32>() / n;
        let var: f32 = samples.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;

        assert!(mean.abs() < 1e-3, "mean = {mean}");
        assert!((var.sqrt() - 0.02).abs() < 2e-3, "std = {}", var.sqrt());
    }

    #[test]
    fn test_fill_normal_preserves_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let t = Tensor::zeros(&[4, 2, 3, 3], true);
        fill_normal(&t, 1.0, 0.02, &mut rng);
        assert_eq!(t.shape(), vec![4, 2, 3, 3]);
        let data = t.data();
        let mean: f32 = data.iter().sum::<f32>() / data.len() as f32;
        assert!((mean - 1.0).abs() < 0.01, "mean = {mean}");
    }
}
