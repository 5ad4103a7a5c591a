//! Graph-ordering tests: shared nodes must contribute exactly once per path

use super::test_utils::{assert_grad_close, numeric_grad, wave};
use crate::autograd::{add, backward, conv2d, relu, tanh, Tensor};

fn tensor(shape: &[usize], phase: f32, requires_grad: bool) -> Tensor {
    let len: usize = shape.iter().product();
    Tensor::from_shape_vec(shape, wave(len, phase), requires_grad)
}

#[test]
fn test_residual_diamond_gradient_matches_finite_difference() {
    // y = x + conv(x): x is consumed by two operations, and the conv result
    // depends on it transitively. Naive per-path recursion double-counts
    // everything below x; the topological replay must not.
    let x = tensor(&[1, 2, 4, 4], 0.0, true);
    let w = tensor(&[2, 2, 3, 3], 1.0, false);

    let y = add(&x, &conv2d(&x, &w, None, 1, 1));
    backward(&y, None);

    let numeric = numeric_grad(
        &x.data().clone(),
        |probe| {
            let xp = Tensor::new(probe.clone(), false);
            add(&xp, &conv2d(&xp, &w, None, 1, 1)).data().sum()
        },
        1e-2,
    );
    assert_grad_close(&x.grad().unwrap(), &numeric, 2e-2);
}

#[test]
fn test_nested_diamond_with_nonlinearity() {
    // h = relu(x); y = h + tanh(h): the shared node h is itself an
    // intermediate with its own producer.
    let x = tensor(&[1, 1, 3, 3], 0.3, true);

    let h = relu(&x);
    let y = add(&h, &tanh(&h));
    backward(&y, None);

    let numeric = numeric_grad(
        &x.data().clone(),
        |probe| {
            let xp = Tensor::new(probe.clone(), false);
            let hp = relu(&xp);
            add(&hp, &tanh(&hp)).data().sum()
        },
        1e-3,
    );
    assert_grad_close(&x.grad().unwrap(), &numeric, 2e-2);
}

#[test]
fn test_backward_without_record_only_seeds_the_output() {
    let x = tensor(&[1, 1, 2, 2], 0.0, false);
    backward(&x, None);
    assert!(x.grad().unwrap().iter().all(|&g| g == 1.0));
}

#[test]
fn test_chain_depth_does_not_revisit_records() {
    // A long chain of residual adds: with per-path recursion the visit count
    // would be exponential in depth; here it must stay linear (this test
    // would effectively hang otherwise).
    let x = tensor(&[1, 1, 4, 4], 0.0, true);
    let mut h = x.clone();
    for _ in 0..40 {
        h = add(&h, &relu(&h));
    }
    backward(&h, None);
    assert!(x.grad().is_some());
    assert!(x.grad().unwrap().iter().all(|g| g.is_finite()));
}
