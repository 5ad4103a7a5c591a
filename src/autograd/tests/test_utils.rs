//! Shared helpers for gradient checking

use ndarray::ArrayD;

/// Central-difference numeric gradient of a scalar-valued function
pub fn numeric_grad<F>(x: &ArrayD<f32>, mut f: F, h: f32) -> ArrayD<f32>
where
    F: FnMut(&ArrayD<f32>) -> f32,
{
    let mut probe = x.clone();
    let mut grad = ArrayD::zeros(x.raw_dim());
    for i in 0..x.len() {
        let orig = probe.as_slice().expect("standard layout")[i];

        probe.as_slice_mut().expect("standard layout")[i] = orig + h;
        let f_plus = f(&probe);

        probe.as_slice_mut().expect("standard layout")[i] = orig - h;
        let f_minus = f(&probe);

        probe.as_slice_mut().expect("standard layout")[i] = orig;
        grad.as_slice_mut().expect("standard layout")[i] = (f_plus - f_minus) / (2.0 * h);
    }
    grad
}

/// Assert element-wise closeness between analytic and numeric gradients
pub fn assert_grad_close(analytic: &ArrayD<f32>, numeric: &ArrayD<f32>, tol: f32) {
    assert_eq!(analytic.shape(), numeric.shape(), "gradient shapes differ");
    for (i, (a, n)) in analytic.iter().zip(numeric.iter()).enumerate() {
        let scale = 1.0_f32.max(a.abs()).max(n.abs());
        assert!(
            (a - n).abs() <= tol * scale,
            "gradient mismatch at flat index {i}: analytic={a}, numeric={n}"
        );
    }
}

/// Deterministic smooth test values in roughly [-1, 1]
pub fn wave(len: usize, phase: f32) -> Vec<f32> {
    (0..len).map(|i| (i as f32 * 0.37 + phase).sin()).collect()
}
