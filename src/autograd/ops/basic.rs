//! Basic autograd operations: add, clamp, channel concatenation, dropout

use crate::autograd::{BackwardOp, Tensor};
use ndarray::{ArrayD, Axis};
use rand::Rng;
use std::rc::Rc;

/// Add two tensors element-wise
pub fn add(a: &Tensor, b: &Tensor) -> Tensor {
    assert_eq!(a.shape(), b.shape(), "add requires matching shapes");
    let data = &*a.data() + &*b.data();
    let requires_grad = a.requires_grad() || b.requires_grad();

    let result = Tensor::new(data, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(AddBackward {
            a: a.clone(),
            b: b.clone(),
            result: result.clone(),
        }));
    }

    result
}

struct AddBackward {
    a: Tensor,
    b: Tensor,
    result: Tensor,
}

impl BackwardOp for AddBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone(), self.b.clone()]
    }

    fn backward(&self) {
        let Some(grad) = self.result.grad() else {
            return;
        };
        if self.a.requires_grad() {
            self.a.accumulate_grad(grad.clone());
        }
        if self.b.requires_grad() {
            self.b.accumulate_grad(grad);
        }
    }
}

/// Clamp every element into `[min, max]`
///
/// Gradients pass through unclipped elements and are zero elsewhere.
pub fn clamp(a: &Tensor, min: f32, max: f32) -> Tensor {
    let data = a.data().mapv(|x| x.clamp(min, max));
    let requires_grad = a.requires_grad();

    let result = Tensor::new(data, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(ClampBackward {
            a: a.clone(),
            min,
            max,
            result: result.clone(),
        }));
    }

    result
}

struct ClampBackward {
    a: Tensor,
    min: f32,
    max: f32,
    result: Tensor,
}

impl BackwardOp for ClampBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self) {
        let Some(grad) = self.result.grad() else {
            return;
        };
        if self.a.requires_grad() {
            let mask = self
                .a
                .data()
                .mapv(|x| if x >= self.min && x <= self.max { 1.0 } else { 0.0 });
            self.a.accumulate_grad(&grad * &mask);
        }
    }
}

/// Concatenate two NCHW tensors along the channel axis
///
/// The skip-connection merge: batch and spatial dimensions must agree.
pub fn concat_channels(a: &Tensor, b: &Tensor) -> Tensor {
    let (sa, sb) = (a.shape(), b.shape());
    assert_eq!(sa.len(), 4, "concat_channels expects NCHW tensors");
    assert_eq!(sb.len(), 4, "concat_channels expects NCHW tensors");
    assert_eq!(sa[0], sb[0], "batch dimensions must match");
    assert_eq!(sa[2], sb[2], "spatial height must match");
    assert_eq!(sa[3], sb[3], "spatial width must match");

    let data = ndarray::concatenate(Axis(1), &[a.data().view(), b.data().view()])
        .expect("channel concatenation");
    let requires_grad = a.requires_grad() || b.requires_grad();

    let result = Tensor::new(data, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(ConcatBackward {
            a: a.clone(),
            b: b.clone(),
            a_channels: sa[1],
            result: result.clone(),
        }));
    }

    result
}

struct ConcatBackward {
    a: Tensor,
    b: Tensor,
    a_channels: usize,
    result: Tensor,
}

impl BackwardOp for ConcatBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone(), self.b.clone()]
    }

    fn backward(&self) {
        let Some(grad) = self.result.grad() else {
            return;
        };
        let split = self.a_channels as isize;
        if self.a.requires_grad() {
            let grad_a = grad.slice_axis(Axis(1), ndarray::Slice::from(..split)).to_owned();
            self.a.accumulate_grad(grad_a);
        }
        if self.b.requires_grad() {
            let grad_b = grad.slice_axis(Axis(1), ndarray::Slice::from(split..)).to_owned();
            self.b.accumulate_grad(grad_b);
        }
    }
}

/// Inverted dropout
///
/// In training mode each element is zeroed with probability `p` and the
/// survivors are scaled by `1/(1-p)`, so the expected activation is
/// unchanged and eval mode is the identity.
pub fn dropout<R: Rng>(a: &Tensor, p: f32, training: bool, rng: &mut R) -> Tensor {
    assert!((0.0..1.0).contains(&p), "dropout probability must be in [0, 1)");
    if !training || p == 0.0 {
        return a.clone();
    }

    let keep = 1.0 - p;
    let mask = ArrayD::from_shape_simple_fn(a.data().raw_dim(), || {
        if rng.random::<f32>() < keep {
            1.0 / keep
        } else {
            0.0
        }
    });

    let data = &*a.data() * &mask;
    let requires_grad = a.requires_grad();

    let result = Tensor::new(data, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(DropoutBackward {
            a: a.clone(),
            mask,
            result: result.clone(),
        }));
    }

    result
}

struct DropoutBackward {
    a: Tensor,
    mask: ArrayD<f32>,
    result: Tensor,
}

impl BackwardOp for DropoutBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self) {
        let Some(grad) = self.result.grad() else {
            return;
        };
        if self.a.requires_grad() {
            self.a.accumulate_grad(&grad * &self.mask);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_add_forward() {
        let a = Tensor::from_vec(vec![1.0, 2.0], false);
        let b = Tensor::from_vec(vec![3.0, 4.0], false);
        let c = add(&a, &b);
        assert_eq!(c.data().as_slice().unwrap(), &[4.0, 6.0]);
        assert!(c.backward_op().is_none());
    }

    #[test]
    fn test_add_backward_flows_to_both_inputs() {
        let a = Tensor::from_vec(vec![1.0, 2.0], true);
        let b = Tensor::from_vec(vec![3.0, 4.0], true);
        let c = add(&a, &b);
        backward(&c, None);
        assert_eq!(a.grad().unwrap().as_slice().unwrap(), &[1.0, 1.0]);
        assert_eq!(b.grad().unwrap().as_slice().unwrap(), &[1.0, 1.0]);
    }

    #[test]
    fn test_shared_input_accumulates_once_per_path() {
        // x feeds both operands: d(x+x)/dx = 2, not 4.
        let x = Tensor::from_vec(vec![1.0, -1.0], true);
        let y = add(&x, &x);
        backward(&y, None);
        assert_eq!(x.grad().unwrap().as_slice().unwrap(), &[2.0, 2.0]);
    }

    #[test]
    fn test_clamp_bounds_and_gradient_mask() {
        let x = Tensor::from_vec(vec![-2.0, -0.5, 0.5, 2.0], true);
        let y = clamp(&x, -1.0, 1.0);
        assert_eq!(y.data().as_slice().unwrap(), &[-1.0, -0.5, 0.5, 1.0]);

        backward(&y, None);
        assert_eq!(x.grad().unwrap().as_slice().unwrap(), &[0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_concat_channels_shapes_and_backward() {
        let a = Tensor::from_shape_vec(&[1, 2, 2, 2], (0..8).map(|v| v as f32).collect(), true);
        let b = Tensor::from_shape_vec(&[1, 1, 2, 2], vec![9.0; 4], true);
        let c = concat_channels(&a, &b);
        assert_eq!(c.shape(), vec![1, 3, 2, 2]);
        assert_eq!(c.data()[[0, 2, 0, 0]], 9.0);

        backward(&c, None);
        assert_eq!(a.grad().unwrap().len(), 8);
        assert_eq!(b.grad().unwrap().len(), 4);
        assert!(a.grad().unwrap().iter().all(|&g| g == 1.0));
    }

    #[test]
    fn test_dropout_eval_is_identity() {
        let mut rng = StdRng::seed_from_u64(7);
        let x = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);
        let y = dropout(&x, 0.5, false, &mut rng);
        assert_eq!(y.data().as_slice().unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_dropout_train_zeroes_or_scales() {
        let mut rng = StdRng::seed_from_u64(7);
        let x = Tensor::from_vec(vec![1.0; 1000], false);
        let y = dropout(&x, 0.5, true, &mut rng);
        let data = y.data();
        let zeros = data.iter().filter(|&&v| v == 0.0).count();
        assert!(data.iter().all(|&v| v == 0.0 || (v - 2.0).abs() < 1e-6));
        // Roughly half the elements should be dropped.
        assert!(zeros > 350 && zeros < 650, "dropped {zeros}/1000");
    }

    #[test]
    fn test_dropout_backward_matches_mask() {
        let mut rng = StdRng::seed_from_u64(3);
        let x = Tensor::from_vec(vec![1.0; 64], true);
        let y = dropout(&x, 0.5, true, &mut rng);
        backward(&y, None);
        let grad = x.grad().unwrap();
        let out = y.data();
        for (g, v) in grad.iter().zip(out.iter()) {
            assert_eq!(*g, *v, "gradient must equal the applied mask scale");
        }
    }
}
