//! Gradient checks for the normalization operations

use super::test_utils::{assert_grad_close, numeric_grad, wave};
use crate::autograd::{backward, batch_norm2d, instance_norm2d, normalize2d_fixed, Tensor};

const H: f32 = 1e-2;
const TOL: f32 = 3e-2;

fn tensor(shape: &[usize], phase: f32, requires_grad: bool) -> Tensor {
    let len: usize = shape.iter().product();
    Tensor::from_shape_vec(shape, wave(len, phase), requires_grad)
}

// The plain sum of a standardized group is ~constant, so its input gradient
// nearly vanishes and a gradient check would compare noise. A weighted seed
// breaks the symmetry.
fn seed_weights(len: usize) -> ndarray::ArrayD<f32> {
    ndarray::ArrayD::from_shape_vec(
        ndarray::IxDyn(&[len]),
        (0..len).map(|i| ((i as f32 * 0.61).cos()) + 2.0).collect(),
    )
    .unwrap()
}

fn weighted_scalar(data: &ndarray::ArrayD<f32>, weights: &[f32]) -> f32 {
    data.iter().zip(weights).map(|(v, w)| v * w).sum()
}

#[test]
fn test_batch_norm_input_gradient_matches_finite_difference() {
    let shape = [2, 2, 3, 3];
    let x = tensor(&shape, 0.0, true);
    let len = x.len();
    let weights: Vec<f32> = seed_weights(len).iter().copied().collect();

    let y = batch_norm2d(&x, None, None, 1e-5);
    let seed = ndarray::ArrayD::from_shape_vec(ndarray::IxDyn(&shape), weights.clone()).unwrap();
    backward(&y, Some(seed));

    let numeric = numeric_grad(
        &x.data().clone(),
        |probe| {
            let xp = Tensor::new(probe.clone(), false);
            weighted_scalar(&batch_norm2d(&xp, None, None, 1e-5).data(), &weights)
        },
        H,
    );
    assert_grad_close(&x.grad().unwrap(), &numeric, TOL);
}

#[test]
fn test_batch_norm_affine_gradients_match_finite_difference() {
    let shape = [2, 2, 3, 3];
    let x = tensor(&shape, 0.4, false);
    let gamma = Tensor::from_vec(vec![1.5, 0.8], true);
    let beta = Tensor::from_vec(vec![0.1, -0.2], true);
    let len: usize = shape.iter().product();
    let weights: Vec<f32> = seed_weights(len).iter().copied().collect();

    let y = batch_norm2d(&x, Some(&gamma), Some(&beta), 1e-5);
    let seed = ndarray::ArrayD::from_shape_vec(ndarray::IxDyn(&shape), weights.clone()).unwrap();
    backward(&y, Some(seed));

    let numeric_gamma = numeric_grad(
        &gamma.data().clone(),
        |probe| {
            let gp = Tensor::new(probe.clone(), false);
            weighted_scalar(&batch_norm2d(&x, Some(&gp), Some(&beta), 1e-5).data(), &weights)
        },
        H,
    );
    assert_grad_close(&gamma.grad().unwrap(), &numeric_gamma, TOL);

    let numeric_beta = numeric_grad(
        &beta.data().clone(),
        |probe| {
            let bp = Tensor::new(probe.clone(), false);
            weighted_scalar(&batch_norm2d(&x, Some(&gamma), Some(&bp), 1e-5).data(), &weights)
        },
        H,
    );
    assert_grad_close(&beta.grad().unwrap(), &numeric_beta, TOL);
}

#[test]
fn test_instance_norm_input_gradient_matches_finite_difference() {
    let shape = [2, 2, 3, 3];
    let x = tensor(&shape, 0.7, true);
    let len = x.len();
    let weights: Vec<f32> = seed_weights(len).iter().copied().collect();

    let y = instance_norm2d(&x, None, None, 1e-5);
    let seed = ndarray::ArrayD::from_shape_vec(ndarray::IxDyn(&shape), weights.clone()).unwrap();
    backward(&y, Some(seed));

    let numeric = numeric_grad(
        &x.data().clone(),
        |probe| {
            let xp = Tensor::new(probe.clone(), false);
            weighted_scalar(&instance_norm2d(&xp, None, None, 1e-5).data(), &weights)
        },
        H,
    );
    assert_grad_close(&x.grad().unwrap(), &numeric, TOL);
}

#[test]
fn test_fixed_norm_input_gradient_is_channel_rescale() {
    let shape = [1, 2, 2, 2];
    let x = tensor(&shape, 0.2, true);
    let mean = [0.5, -0.5];
    let var = [4.0, 0.25];

    let y = normalize2d_fixed(&x, None, None, &mean, &var, 0.0);
    backward(&y, None);

    let grad = x.grad().unwrap();
    let g4 = grad.view().into_dimensionality::<ndarray::Ix4>().unwrap();
    for i in 0..2 {
        for j in 0..2 {
            assert!((g4[[0, 0, i, j]] - 0.5).abs() < 1e-6); // 1/sqrt(4)
            assert!((g4[[0, 1, i, j]] - 2.0).abs() < 1e-6); // 1/sqrt(0.25)
        }
    }
}
