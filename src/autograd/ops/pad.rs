//! 2-D spatial padding: reflect, replicate, zero

use crate::autograd::{BackwardOp, Tensor};
use crate::error::{NetworkError, Result};
use ndarray::{ArrayD, Ix4, IxDyn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Padding strategy applied ahead of a convolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaddingMode {
    /// Mirror the border rows/columns (excluding the edge itself)
    Reflect,
    /// Repeat the edge rows/columns
    Replicate,
    /// Implicit zero padding, folded into the convolution itself
    Zero,
}

impl PaddingMode {
    /// Parse a symbolic padding name
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "reflect" => Ok(Self::Reflect),
            "replicate" => Ok(Self::Replicate),
            "zero" => Ok(Self::Zero),
            other => Err(NetworkError::UnsupportedPadding(other.to_string())),
        }
    }

    /// Symbolic name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Reflect => "reflect",
            Self::Replicate => "replicate",
            Self::Zero => "zero",
        }
    }
}

impl fmt::Display for PaddingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Source row/column for an output coordinate `t` in [-pad, size+pad);
// None means the zero-padded region.
fn source_index(t: isize, size: isize, mode: PaddingMode) -> Option<isize> {
    if (0..size).contains(&t) {
        return Some(t);
    }
    match mode {
        PaddingMode::Reflect => Some(if t < 0 { -t } else { 2 * size - 2 - t }),
        PaddingMode::Replicate => Some(t.clamp(0, size - 1)),
        PaddingMode::Zero => None,
    }
}

/// Pad an NCHW tensor symmetrically by `pad` rows/columns on each side
///
/// Reflect padding requires `pad < H` and `pad < W`.
pub fn pad2d(x: &Tensor, pad: usize, mode: PaddingMode) -> Tensor {
    let data = x.data();
    let x4 = data
        .view()
        .into_dimensionality::<Ix4>()
        .expect("pad2d expects an NCHW tensor");
    let (n, c, h, w) = x4.dim();
    if mode == PaddingMode::Reflect {
        assert!(pad < h && pad < w, "reflect padding needs pad < spatial size");
    }

    let (oh, ow) = (h + 2 * pad, w + 2 * pad);
    let mut out = ArrayD::zeros(IxDyn(&[n, c, oh, ow]));
    {
        let mut out4 = out.view_mut().into_dimensionality::<Ix4>().expect("4-D");
        let (p, hh, ww) = (pad as isize, h as isize, w as isize);
        for bn in 0..n {
            for bc in 0..c {
                for i in 0..oh {
                    let si = source_index(i as isize - p, hh, mode);
                    for j in 0..ow {
                        let sj = source_index(j as isize - p, ww, mode);
                        if let (Some(si), Some(sj)) = (si, sj) {
                            out4[[bn, bc, i, j]] = x4[[bn, bc, si as usize, sj as usize]];
                        }
                    }
                }
            }
        }
    }
    drop(data);

    let requires_grad = x.requires_grad();
    let result = Tensor::new(out, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(Pad2dBackward {
            x: x.clone(),
            pad,
            mode,
            result: result.clone(),
        }));
    }

    result
}

struct Pad2dBackward {
    x: Tensor,
    pad: usize,
    mode: PaddingMode,
    result: Tensor,
}

impl BackwardOp for Pad2dBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.x.clone()]
    }

    fn backward(&self) {
        let Some(grad) = self.result.grad() else {
            return;
        };
        if !self.x.requires_grad() {
            return;
        }

        let g4 = grad.view().into_dimensionality::<Ix4>().expect("4-D");
        let shape = self.x.shape();
        let (n, c, h, w) = (shape[0], shape[1], shape[2], shape[3]);
        let (oh, ow) = (h + 2 * self.pad, w + 2 * self.pad);

        let mut grad_x = ArrayD::zeros(IxDyn(&shape));
        {
            // Scatter-add through the same index map the forward pass used;
            // border source cells receive several contributions.
            let mut gx4 = grad_x.view_mut().into_dimensionality::<Ix4>().expect("4-D");
            let (p, hh, ww) = (self.pad as isize, h as isize, w as isize);
            for bn in 0..n {
                for bc in 0..c {
                    for i in 0..oh {
                        let si = source_index(i as isize - p, hh, self.mode);
                        for j in 0..ow {
                            let sj = source_index(j as isize - p, ww, self.mode);
                            if let (Some(si), Some(sj)) = (si, sj) {
                                gx4[[bn, bc, si as usize, sj as usize]] += g4[[bn, bc, i, j]];
                            }
                        }
                    }
                }
            }
        }

        self.x.accumulate_grad(grad_x);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;

    fn input_2x2() -> Tensor {
        Tensor::from_shape_vec(&[1, 1, 2, 2], vec![1.0, 2.0, 3.0, 4.0], true)
    }

    #[test]
    fn test_padding_mode_from_name() {
        assert_eq!(PaddingMode::from_name("reflect").unwrap(), PaddingMode::Reflect);
        assert_eq!(PaddingMode::from_name("replicate").unwrap(), PaddingMode::Replicate);
        assert_eq!(PaddingMode::from_name("zero").unwrap(), PaddingMode::Zero);
        assert!(matches!(
            PaddingMode::from_name("circular"),
            Err(NetworkError::UnsupportedPadding(_))
        ));
    }

    #[test]
    fn test_zero_pad_shape_and_border() {
        let x = input_2x2();
        let y = pad2d(&x, 1, PaddingMode::Zero);
        assert_eq!(y.shape(), vec![1, 1, 4, 4]);
        let d = y.data();
        assert_eq!(d[[0, 0, 0, 0]], 0.0);
        assert_eq!(d[[0, 0, 1, 1]], 1.0);
        assert_eq!(d[[0, 0, 2, 2]], 4.0);
    }

    #[test]
    fn test_replicate_pad_repeats_edges() {
        let x = input_2x2();
        let y = pad2d(&x, 1, PaddingMode::Replicate);
        let d = y.data();
        assert_eq!(d[[0, 0, 0, 0]], 1.0);
        assert_eq!(d[[0, 0, 0, 3]], 2.0);
        assert_eq!(d[[0, 0, 3, 0]], 3.0);
        assert_eq!(d[[0, 0, 3, 3]], 4.0);
    }

    #[test]
    fn test_reflect_pad_mirrors_interior() {
        // Row [1 2 3] reflect-padded by 1 becomes [2 1 2 3 2].
        let x = Tensor::from_shape_vec(&[1, 1, 3, 3], (1..=9).map(|v| v as f32).collect(), false);
        let y = pad2d(&x, 1, PaddingMode::Reflect);
        let d = y.data();
        assert_eq!(y.shape(), vec![1, 1, 5, 5]);
        assert_eq!(d[[0, 0, 1, 0]], 2.0);
        assert_eq!(d[[0, 0, 1, 4]], 2.0);
        // The corner mirrors both axes: source (1, 1).
        assert_eq!(d[[0, 0, 0, 0]], 5.0);
    }

    #[test]
    fn test_pad_backward_total_gradient_is_conserved_for_zero_mode() {
        let x = input_2x2();
        let y = pad2d(&x, 2, PaddingMode::Zero);
        backward(&y, None);
        // Zero padding: every interior cell contributes exactly once.
        assert!(x.grad().unwrap().iter().all(|&g| g == 1.0));
    }

    #[test]
    fn test_pad_backward_replicate_accumulates_border() {
        let x = input_2x2();
        let y = pad2d(&x, 1, PaddingMode::Replicate);
        backward(&y, None);
        // Each corner cell is read once for the interior, twice for the two
        // edges, and once for the corner: 4 contributions.
        assert!(x.grad().unwrap().iter().all(|&g| g == 4.0));
    }
}
