//! Normalization autograd operations: batch and instance normalization
//!
//! Both follow the same decomposition: per-group standardization to zero
//! mean and unit variance, then an optional per-channel affine transform.
//! Batch normalization groups by channel over (N, H, W); instance
//! normalization groups by (instance, channel) over (H, W). The fixed-
//! statistics variant normalizes with running statistics and is the eval
//! path for both.

use crate::autograd::{BackwardOp, Tensor};
use ndarray::{ArrayD, Ix1, Ix4, IxDyn};
use std::rc::Rc;

fn channel_param(t: Option<&Tensor>, channels: usize, what: &str) -> Option<Tensor> {
    if let Some(t) = t {
        assert_eq!(t.shape(), vec![channels], "{what} must have one value per channel");
    }
    t.cloned()
}

/// Batch normalization with batch statistics (the training path)
///
/// Gradients flow through the batch mean and variance, so the backward pass
/// carries the standardization correction terms.
pub fn batch_norm2d(
    x: &Tensor,
    gamma: Option<&Tensor>,
    beta: Option<&Tensor>,
    eps: f32,
) -> Tensor {
    let data = x.data();
    let x4 = data
        .view()
        .into_dimensionality::<Ix4>()
        .expect("batch_norm2d expects an NCHW tensor");
    let (n, c, h, w) = x4.dim();
    let gamma = channel_param(gamma, c, "gamma");
    let beta = channel_param(beta, c, "beta");
    let m = (n * h * w) as f32;

    let mut std = vec![0.0f32; c];
    let mut xhat = ArrayD::zeros(IxDyn(&[n, c, h, w]));
    let mut out = ArrayD::zeros(IxDyn(&[n, c, h, w]));
    {
        let mut xh4 = xhat.view_mut().into_dimensionality::<Ix4>().expect("4-D");
        let mut out4 = out.view_mut().into_dimensionality::<Ix4>().expect("4-D");
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
            std[bc] = (var + eps).sqrt();

            let g = gamma.as_ref().map_or(1.0, |t| t.data()[[bc]]);
            let b = beta.as_ref().map_or(0.0, |t| t.data()[[bc]]);
            for bn in 0..n {
                for i in 0..h {
                    for j in 0..w {
                        let normalized = (x4[[bn, bc, i, j]] - mean) / std[bc];
                        xh4[[bn, bc, i, j]] = normalized;
                        out4[[bn, bc, i, j]] = g * normalized + b;
                    }
                }
            }
        }
    }
    drop(data);

    let requires_grad = x.requires_grad()
        || gamma.as_ref().is_some_and(Tensor::requires_grad)
        || beta.as_ref().is_some_and(Tensor::requires_grad);
    let result = Tensor::new(out, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(BatchNormBackward {
            x: x.clone(),
            gamma,
            beta,
            xhat,
            std,
            result: result.clone(),
        }));
    }

    result
}

struct BatchNormBackward {
    x: Tensor,
    gamma: Option<Tensor>,
    beta: Option<Tensor>,
    xhat: ArrayD<f32>,
    std: Vec<f32>,
    result: Tensor,
}

impl BackwardOp for BatchNormBackward {
    fn inputs(&self) -> Vec<Tensor> {
        let mut inputs = vec![self.x.clone()];
        inputs.extend(self.gamma.clone());
        inputs.extend(self.beta.clone());
        inputs
    }

    fn backward(&self) {
        let Some(grad) = self.result.grad() else {
            return;
        };
        let g4 = grad.view().into_dimensionality::<Ix4>().expect("4-D");
        let xh4 = self.xhat.view().into_dimensionality::<Ix4>().expect("4-D");
        let (n, c, h, w) = g4.dim();
        let m = (n * h * w) as f32;

        let mut grad_gamma = vec![0.0f32; c];
        let mut grad_beta = vec![0.0f32; c];
        let mut grad_x = self
            .x
            .requires_grad()
            .then(|| ArrayD::zeros(IxDyn(&[n, c, h, w])));

        {
            let mut gx4 = grad_x
                .as_mut()
                .map(|a| a.view_mut().into_dimensionality::<Ix4>().expect("4-D"));
            for bc in 0..c {
                let scale = self.gamma.as_ref().map_or(1.0, |t| t.data()[[bc]]);
                let mut sum_g = 0.0f32;
                let mut sum_gx = 0.0f32;
                for bn in 0..n {
                    for i in 0..h {
                        for j in 0..w {
                            let g = g4[[bn, bc, i, j]];
                            let normalized = xh4[[bn, bc, i, j]];
                            grad_gamma[bc] += g * normalized;
                            grad_beta[bc] += g;
                            sum_g += g * scale;
                            sum_gx += g * scale * normalized;
                        }
                    }
                }
                if let Some(gx) = gx4.as_mut() {
                    // ∂L/∂x = (ĝ − mean(ĝ) − x̂·mean(ĝ·x̂)) / σ, ĝ = γ·∂L/∂y
                    for bn in 0..n {
                        for i in 0..h {
                            for j in 0..w {
                                let ghat = g4[[bn, bc, i, j]] * scale;
                                let normalized = xh4[[bn, bc, i, j]];
                                gx[[bn, bc, i, j]] = (ghat
                                    - sum_g / m
                                    - normalized * sum_gx / m)
                                    / self.std[bc];
                            }
                        }
                    }
                }
            }
        }

        if let Some(gx) = grad_x {
            self.x.accumulate_grad(gx);
        }
        if let Some(gamma) = &self.gamma {
            if gamma.requires_grad() {
                gamma.accumulate_grad(
                    ArrayD::from_shape_vec(IxDyn(&[c]), grad_gamma).expect("1-D"),
                );
            }
        }
        if let Some(beta) = &self.beta {
            if beta.requires_grad() {
                beta.accumulate_grad(ArrayD::from_shape_vec(IxDyn(&[c]), grad_beta).expect("1-D"));
            }
        }
    }
}

/// Instance normalization with per-instance statistics (the training path)
pub fn instance_norm2d(
    x: &Tensor,
    gamma: Option<&Tensor>,
    beta: Option<&Tensor>,
    eps: f32,
) -> Tensor {
    let data = x.data();
    let x4 = data
        .view()
        .into_dimensionality::<Ix4>()
        .expect("instance_norm2d expects an NCHW tensor");
    let (n, c, h, w) = x4.dim();
    let gamma = channel_param(gamma, c, "gamma");
    let beta = channel_param(beta, c, "beta");
    let m = (h * w) as f32;

    let mut std = vec![0.0f32; n * c];
    let mut xhat = ArrayD::zeros(IxDyn(&[n, c, h, w]));
    let mut out = ArrayD::zeros(IxDyn(&[n, c, h, w]));
    {
        let mut xh4 = xhat.view_mut().into_dimensionality::<Ix4>().expect("4-D");
        let mut out4 = out.view_mut().into_dimensionality::<Ix4>().expect("4-D");
        for bn in 0..n {
            for bc in 0..c {
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
                let sd = (var + eps).sqrt();
                std[bn * c + bc] = sd;

                let g = gamma.as_ref().map_or(1.0, |t| t.data()[[bc]]);
                let b = beta.as_ref().map_or(0.0, |t| t.data()[[bc]]);
                for i in 0..h {
                    for j in 0..w {
                        let normalized = (x4[[bn, bc, i, j]] - mean) / sd;
                        xh4[[bn, bc, i, j]] = normalized;
                        out4[[bn, bc, i, j]] = g * normalized + b;
                    }
                }
            }
        }
    }
    drop(data);

    let requires_grad = x.requires_grad()
        || gamma.as_ref().is_some_and(Tensor::requires_grad)
        || beta.as_ref().is_some_and(Tensor::requires_grad);
    let result = Tensor::new(out, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(InstanceNormBackward {
            x: x.clone(),
            gamma,
            beta,
            xhat,
            std,
            result: result.clone(),
        }));
    }

    result
}

struct InstanceNormBackward {
    x: Tensor,
    gamma: Option<Tensor>,
    beta: Option<Tensor>,
    xhat: ArrayD<f32>,
    std: Vec<f32>,
    result: Tensor,
}

impl BackwardOp for InstanceNormBackward {
    fn inputs(&self) -> Vec<Tensor> {
        let mut inputs = vec![self.x.clone()];
        inputs.extend(self.gamma.clone());
        inputs.extend(self.beta.clone());
        inputs
    }

    fn backward(&self) {
        let Some(grad) = self.result.grad() else {
            return;
        };
        let g4 = grad.view().into_dimensionality::<Ix4>().expect("4-D");
        let xh4 = self.xhat.view().into_dimensionality::<Ix4>().expect("4-D");
        let (n, c, h, w) = g4.dim();
        let m = (h * w) as f32;

        let mut grad_gamma = vec![0.0f32; c];
        let mut grad_beta = vec![0.0f32; c];
        let mut grad_x = self
            .x
            .requires_grad()
            .then(|| ArrayD::zeros(IxDyn(&[n, c, h, w])));

        {
            let mut gx4 = grad_x
                .as_mut()
                .map(|a| a.view_mut().into_dimensionality::<Ix4>().expect("4-D"));
            for bn in 0..n {
                for bc in 0..c {
                    let scale = self.gamma.as_ref().map_or(1.0, |t| t.data()[[bc]]);
                    let mut sum_g = 0.0f32;
                    let mut sum_gx = 0.0f32;
                    for i in 0..h {
                        for j in 0..w {
                            let g = g4[[bn, bc, i, j]];
                            let normalized = xh4[[bn, bc, i, j]];
                            grad_gamma[bc] += g * normalized;
                            grad_beta[bc] += g;
                            sum_g += g * scale;
                            sum_gx += g * scale * normalized;
                        }
                    }
                    if let Some(gx) = gx4.as_mut() {
                        let sd = self.std[bn * c + bc];
                        for i in 0..h {
                            for j in 0..w {
                                let ghat = g4[[bn, bc, i, j]] * scale;
                                let normalized = xh4[[bn, bc, i, j]];
                                gx[[bn, bc, i, j]] =
                                    (ghat - sum_g / m - normalized * sum_gx / m) / sd;
                            }
                        }
                    }
                }
            }
        }

        if let Some(gx) = grad_x {
            self.x.accumulate_grad(gx);
        }
        if let Some(gamma) = &self.gamma {
            if gamma.requires_grad() {
                gamma.accumulate_grad(
                    ArrayD::from_shape_vec(IxDyn(&[c]), grad_gamma).expect("1-D"),
                );
            }
        }
        if let Some(beta) = &self.beta {
            if beta.requires_grad() {
                beta.accumulate_grad(ArrayD::from_shape_vec(IxDyn(&[c]), grad_beta).expect("1-D"));
            }
        }
    }
}

/// Normalization with fixed per-channel statistics (the eval path)
///
/// The statistics are constants, so the input gradient is a plain
/// per-channel rescale.
pub fn normalize2d_fixed(
    x: &Tensor,
    gamma: Option<&Tensor>,
    beta: Option<&Tensor>,
    mean: &[f32],
    var: &[f32],
    eps: f32,
) -> Tensor {
    let data = x.data();
    let x4 = data
        .view()
        .into_dimensionality::<Ix4>()
        .expect("normalize2d_fixed expects an NCHW tensor");
    let (n, c, h, w) = x4.dim();
    assert_eq!(mean.len(), c, "running mean must have one value per channel");
    assert_eq!(var.len(), c, "running variance must have one value per channel");
    let gamma = channel_param(gamma, c, "gamma");
    let beta = channel_param(beta, c, "beta");

    let std: Vec<f32> = var.iter().map(|v| (v + eps).sqrt()).collect();
    let mut out = ArrayD::zeros(IxDyn(&[n, c, h, w]));
    {
        let mut out4 = out.view_mut().into_dimensionality::<Ix4>().expect("4-D");
        for bn in 0..n {
            for bc in 0..c {
                let g = gamma.as_ref().map_or(1.0, |t| t.data()[[bc]]);
                let b = beta.as_ref().map_or(0.0, |t| t.data()[[bc]]);
                for i in 0..h {
                    for j in 0..w {
                        out4[[bn, bc, i, j]] = g * (x4[[bn, bc, i, j]] - mean[bc]) / std[bc] + b;
                    }
                }
            }
        }
    }
    drop(data);

    let requires_grad = x.requires_grad()
        || gamma.as_ref().is_some_and(Tensor::requires_grad)
        || beta.as_ref().is_some_and(Tensor::requires_grad);
    let result = Tensor::new(out, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(FixedNormBackward {
            x: x.clone(),
            gamma,
            beta,
            mean: mean.to_vec(),
            std,
            result: result.clone(),
        }));
    }

    result
}

struct FixedNormBackward {
    x: Tensor,
    gamma: Option<Tensor>,
    beta: Option<Tensor>,
    mean: Vec<f32>,
    std: Vec<f32>,
    result: Tensor,
}

impl BackwardOp for FixedNormBackward {
    fn inputs(&self) -> Vec<Tensor> {
        let mut inputs = vec![self.x.clone()];
        inputs.extend(self.gamma.clone());
        inputs.extend(self.beta.clone());
        inputs
    }

    fn backward(&self) {
        let Some(grad) = self.result.grad() else {
            return;
        };
        let g4 = grad.view().into_dimensionality::<Ix4>().expect("4-D");
        let data = self.x.data();
        let x4 = data.view().into_dimensionality::<Ix4>().expect("4-D");
        let (n, c, h, w) = g4.dim();

        let mut grad_gamma = vec![0.0f32; c];
        let mut grad_beta = vec![0.0f32; c];
        let mut grad_x = self
            .x
            .requires_grad()
            .then(|| ArrayD::zeros(IxDyn(&[n, c, h, w])));

        {
            let mut gx4 = grad_x
                .as_mut()
                .map(|a| a.view_mut().into_dimensionality::<Ix4>().expect("4-D"));
            for bn in 0..n {
                for bc in 0..c {
                    let scale = self.gamma.as_ref().map_or(1.0, |t| t.data()[[bc]]);
                    for i in 0..h {
                        for j in 0..w {
                            let g = g4[[bn, bc, i, j]];
                            let normalized = (x4[[bn, bc, i, j]] - self.mean[bc]) / self.std[bc];
                            grad_gamma[bc] += g * normalized;
                            grad_beta[bc] += g;
                            if let Some(gx) = gx4.as_mut() {
                                gx[[bn, bc, i, j]] = g * scale / self.std[bc];
                            }
                        }
                    }
                }
            }
        }
        drop(data);

        if let Some(gx) = grad_x {
            self.x.accumulate_grad(gx);
        }
        if let Some(gamma) = &self.gamma {
            if gamma.requires_grad() {
                gamma.accumulate_grad(
                    ArrayD::from_shape_vec(IxDyn(&[c]), grad_gamma).expect("1-D"),
                );
            }
        }
        if let Some(beta) = &self.beta {
            if beta.requires_grad() {
                beta.accumulate_grad(ArrayD::from_shape_vec(IxDyn(&[c]), grad_beta).expect("1-D"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn channel_stats(data: &[f32]) -> (f32, f32) {
        let n = data.len() as f32;
        let mean: f32 = data.iter().sum::<f32>() / n;
        let var: f32 = data.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
        (mean, var)
    }

    #[test]
    fn test_batch_norm_standardizes_each_channel() {
        let x = Tensor::from_shape_vec(
            &[2, 2, 2, 2],
            (0..16).map(|v| v as f32 * 0.7 - 3.0).collect(),
            false,
        );
        let y = batch_norm2d(&x, None, None, 1e-5);

        let d = y.data().clone();
        let d4 = d.view().into_dimensionality::<Ix4>().unwrap();
        for c in 0..2 {
            let mut vals = Vec::new();
            for n in 0..2 {
                for i in 0..2 {
                    for j in 0..2 {
                        vals.push(d4[[n, c, i, j]]);
                    }
                }
            }
            let (mean, var) = channel_stats(&vals);
            assert_relative_eq!(mean, 0.0, epsilon = 1e-4);
            assert_relative_eq!(var, 1.0, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_instance_norm_standardizes_each_instance_channel() {
        let x = Tensor::from_shape_vec(
            &[2, 3, 4, 4],
            (0..96).map(|v| (v as f32 * 0.37).sin() * 5.0).collect(),
            false,
        );
        let y = instance_norm2d(&x, None, None, 1e-5);

        let d = y.data().clone();
        let d4 = d.view().into_dimensionality::<Ix4>().unwrap();
        for n in 0..2 {
            for c in 0..3 {
                let mut vals = Vec::new();
                for i in 0..4 {
                    for j in 0..4 {
                        vals.push(d4[[n, c, i, j]]);
                    }
                }
                let (mean, var) = channel_stats(&vals);
                assert_relative_eq!(mean, 0.0, epsilon = 1e-4);
                assert_relative_eq!(var, 1.0, epsilon = 1e-2);
            }
        }
    }

    #[test]
    fn test_batch_norm_affine_applies_scale_and_shift() {
        let x = Tensor::from_shape_vec(&[1, 1, 2, 2], vec![1.0, 2.0, 3.0, 4.0], false);
        let gamma = Tensor::from_vec(vec![2.0], false);
        let beta = Tensor::from_vec(vec![10.0], false);
        let y = batch_norm2d(&x, Some(&gamma), Some(&beta), 1e-5);

        let d = y.data();
        let mean: f32 = d.iter().sum::<f32>() / 4.0;
        assert_relative_eq!(mean, 10.0, epsilon = 1e-4);
    }

    #[test]
    fn test_fixed_norm_uses_provided_statistics() {
        let x = Tensor::from_shape_vec(&[1, 2, 1, 1], vec![3.0, 8.0], false);
        let y = normalize2d_fixed(&x, None, None, &[1.0, 2.0], &[4.0, 9.0], 0.0);
        let d = y.data();
        assert_relative_eq!(d[[0, 0, 0, 0]], 1.0); // (3-1)/2
        assert_relative_eq!(d[[0, 1, 0, 0]], 2.0); // (8-2)/3
    }

    #[test]
    fn test_constant_input_is_finite() {
        let x = Tensor::from_shape_vec(&[1, 1, 2, 2], vec![5.0; 4], false);
        let y = instance_norm2d(&x, None, None, 1e-5);
        assert!(y.data().iter().all(|v| v.is_finite()));
    }
}
