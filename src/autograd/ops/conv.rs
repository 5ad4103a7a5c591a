//! 2-D convolution and transposed convolution
//!
//! Direct NCHW loop formulation. The backward loops walk the exact index
//! arithmetic of the forward loops, so input, weight, and bias gradients
//! stay consistent with the forward definition by construction.

use crate::autograd::{BackwardOp, Tensor};
use ndarray::{ArrayD, Ix1, Ix4, IxDyn};
use std::rc::Rc;

/// 2-D convolution over an NCHW tensor
///
/// `x`: `[N, C_in, H, W]`, `weight`: `[C_out, C_in, K, K]`,
/// `bias`: `[C_out]`. Output spatial size is `(H + 2·padding − K)/stride + 1`.
pub fn conv2d(
    x: &Tensor,
    weight: &Tensor,
    bias: Option<&Tensor>,
    stride: usize,
    padding: usize,
) -> Tensor {
    let data = x.data();
    let x4 = data
        .view()
        .into_dimensionality::<Ix4>()
        .expect("conv2d expects an NCHW tensor");
    let wdata = weight.data();
    let w4 = wdata
        .view()
        .into_dimensionality::<Ix4>()
        .expect("conv2d weight must be [C_out, C_in, K, K]");

    let (n, cin, h, w) = x4.dim();
    let (cout, wcin, k, _) = w4.dim();
    assert_eq!(cin, wcin, "input channels must match weight channels");
    assert!(h + 2 * padding >= k && w + 2 * padding >= k, "kernel larger than padded input");

    let oh = (h + 2 * padding - k) / stride + 1;
    let ow = (w + 2 * padding - k) / stride + 1;

    let mut out = ArrayD::zeros(IxDyn(&[n, cout, oh, ow]));
    {
        let mut out4 = out.view_mut().into_dimensionality::<Ix4>().expect("4-D");
        let bias_data = bias.map(|b| {
            b.data()
                .view()
                .into_dimensionality::<Ix1>()
                .expect("1-D bias")
                .to_owned()
        });
        let (hh, ww, p) = (h as isize, w as isize, padding as isize);

        for bn in 0..n {
            for co in 0..cout {
                let base = bias_data.as_ref().map_or(0.0, |b| b[co]);
                for i in 0..oh {
                    for j in 0..ow {
                        let mut acc = base;
                        for ci in 0..cin {
                            for kh in 0..k {
                                let ih = (i * stride + kh) as isize - p;
                                if !(0..hh).contains(&ih) {
                                    continue;
                                }
                                for kw in 0..k {
                                    let iw = (j * stride + kw) as isize - p;
                                    if (0..ww).contains(&iw) {
                                        acc += w4[[co, ci, kh, kw]]
                                            * x4[[bn, ci, ih as usize, iw as usize]];
                                    }
                                }
                            }
                        }
                        out4[[bn, co, i, j]] = acc;
                    }
                }
            }
        }
    }
    drop(wdata);
    drop(data);

    let requires_grad =
        x.requires_grad() || weight.requires_grad() || bias.is_some_and(Tensor::requires_grad);
    let result = Tensor::new(out, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(Conv2dBackward {
            x: x.clone(),
            weight: weight.clone(),
            bias: bias.cloned(),
            stride,
            padding,
            result: result.clone(),
        }));
    }

    result
}

struct Conv2dBackward {
    x: Tensor,
    weight: Tensor,
    bias: Option<Tensor>,
    stride: usize,
    padding: usize,
    result: Tensor,
}

impl BackwardOp for Conv2dBackward {
    fn inputs(&self) -> Vec<Tensor> {
        let mut inputs = vec![self.x.clone(), self.weight.clone()];
        if let Some(b) = &self.bias {
            inputs.push(b.clone());
        }
        inputs
    }

    fn backward(&self) {
        let Some(grad) = self.result.grad() else {
            return;
        };
        let g4 = grad.view().into_dimensionality::<Ix4>().expect("4-D");

        let data = self.x.data();
        let x4 = data.view().into_dimensionality::<Ix4>().expect("4-D");
        let wdata = self.weight.data();
        let w4 = wdata.view().into_dimensionality::<Ix4>().expect("4-D");

        let (n, cin, h, w) = x4.dim();
        let (cout, _, k, _) = w4.dim();
        let (_, _, oh, ow) = g4.dim();

        let need_gx = self.x.requires_grad();
        let need_gw = self.weight.requires_grad();
        let mut grad_x = need_gx.then(|| ArrayD::zeros(IxDyn(&[n, cin, h, w])));
        let mut grad_w = need_gw.then(|| ArrayD::zeros(IxDyn(&[cout, cin, k, k])));
        let mut grad_b = vec![0.0f32; cout];

        {
            let mut gx4 = grad_x
                .as_mut()
                .map(|a| a.view_mut().into_dimensionality::<Ix4>().expect("4-D"));
            let mut gw4 = grad_w
                .as_mut()
                .map(|a| a.view_mut().into_dimensionality::<Ix4>().expect("4-D"));
            let (hh, ww, p) = (h as isize, w as isize, self.padding as isize);

            for bn in 0..n {
                for co in 0..cout {
                    for i in 0..oh {
                        for j in 0..ow {
                            let g = g4[[bn, co, i, j]];
                            if g == 0.0 {
                                continue;
                            }
                            grad_b[co] += g;
                            for ci in 0..cin {
                                for kh in 0..k {
                                    let ih = (i * self.stride + kh) as isize - p;
                                    if !(0..hh).contains(&ih) {
                                        continue;
                                    }
                                    for kw in 0..k {
                                        let iw = (j * self.stride + kw) as isize - p;
                                        if !(0..ww).contains(&iw) {
                                            continue;
                                        }
                                        let (ih, iw) = (ih as usize, iw as usize);
                                        if let Some(gx) = gx4.as_mut() {
                                            gx[[bn, ci, ih, iw]] += w4[[co, ci, kh, kw]] * g;
                                        }
                                        if let Some(gw) = gw4.as_mut() {
                                            gw[[co, ci, kh, kw]] += x4[[bn, ci, ih, iw]] * g;
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        drop(wdata);
        drop(data);

        if let Some(gx) = grad_x {
            self.x.accumulate_grad(gx);
        }
        if let Some(gw) = grad_w {
            self.weight.accumulate_grad(gw);
        }
        if let Some(b) = &self.bias {
            if b.requires_grad() {
                b.accumulate_grad(ArrayD::from_shape_vec(IxDyn(&[cout]), grad_b).expect("1-D"));
            }
        }
    }
}

/// 2-D transposed convolution over an NCHW tensor
///
/// `x`: `[N, C_in, H, W]`, `weight`: `[C_in, C_out, K, K]`, `bias`:
/// `[C_out]`. Output spatial size is
/// `(H − 1)·stride − 2·padding + K + output_padding`.
pub fn conv_transpose2d(
    x: &Tensor,
    weight: &Tensor,
    bias: Option<&Tensor>,
    stride: usize,
    padding: usize,
    output_padding: usize,
) -> Tensor {
    let data = x.data();
    let x4 = data
        .view()
        .into_dimensionality::<Ix4>()
        .expect("conv_transpose2d expects an NCHW tensor");
    let wdata = weight.data();
    let w4 = wdata
        .view()
        .into_dimensionality::<Ix4>()
        .expect("conv_transpose2d weight must be [C_in, C_out, K, K]");

    let (n, cin, h, w) = x4.dim();
    let (wcin, cout, k, _) = w4.dim();
    assert_eq!(cin, wcin, "input channels must match weight channels");
    assert!(output_padding < stride, "output_padding must be smaller than stride");

    let oh = (h - 1) * stride + k + output_padding - 2 * padding;
    let ow = (w - 1) * stride + k + output_padding - 2 * padding;

    let mut out = ArrayD::zeros(IxDyn(&[n, cout, oh, ow]));
    {
        let mut out4 = out.view_mut().into_dimensionality::<Ix4>().expect("4-D");
        let (ohh, oww, p) = (oh as isize, ow as isize, padding as isize);

        for bn in 0..n {
            for ci in 0..cin {
                for i in 0..h {
                    for j in 0..w {
                        let v = x4[[bn, ci, i, j]];
                        if v == 0.0 {
                            continue;
                        }
                        for co in 0..cout {
                            for kh in 0..k {
                                let out_i = (i * stride + kh) as isize - p;
                                if !(0..ohh).contains(&out_i) {
                                    continue;
                                }
                                for kw in 0..k {
                                    let out_j = (j * stride + kw) as isize - p;
                                    if (0..oww).contains(&out_j) {
                                        out4[[bn, co, out_i as usize, out_j as usize]] +=
                                            w4[[ci, co, kh, kw]] * v;
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        if let Some(b) = bias {
            let bdata = b.data();
            let b1 = bdata.view().into_dimensionality::<Ix1>().expect("1-D bias");
            for bn in 0..n {
                for co in 0..cout {
                    for i in 0..oh {
                        for j in 0..ow {
                            out4[[bn, co, i, j]] += b1[co];
                        }
                    }
                }
            }
        }
    }
    drop(wdata);
    drop(data);

    let requires_grad =
        x.requires_grad() || weight.requires_grad() || bias.is_some_and(Tensor::requires_grad);
    let result = Tensor::new(out, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(ConvTranspose2dBackward {
            x: x.clone(),
            weight: weight.clone(),
            bias: bias.cloned(),
            stride,
            padding,
            result: result.clone(),
        }));
    }

    result
}

struct ConvTranspose2dBackward {
    x: Tensor,
    weight: Tensor,
    bias: Option<Tensor>,
    stride: usize,
    padding: usize,
    result: Tensor,
}

impl BackwardOp for ConvTranspose2dBackward {
    fn inputs(&self) -> Vec<Tensor> {
        let mut inputs = vec![self.x.clone(), self.weight.clone()];
        if let Some(b) = &self.bias {
            inputs.push(b.clone());
        }
        inputs
    }

    fn backward(&self) {
        let Some(grad) = self.result.grad() else {
            return;
        };
        let g4 = grad.view().into_dimensionality::<Ix4>().expect("4-D");

        let data = self.x.data();
        let x4 = data.view().into_dimensionality::<Ix4>().expect("4-D");
        let wdata = self.weight.data();
        let w4 = wdata.view().into_dimensionality::<Ix4>().expect("4-D");

        let (n, cin, h, w) = x4.dim();
        let (_, cout, k, _) = w4.dim();
        let (_, _, oh, ow) = g4.dim();

        let need_gx = self.x.requires_grad();
        let need_gw = self.weight.requires_grad();
        let mut grad_x = need_gx.then(|| ArrayD::zeros(IxDyn(&[n, cin, h, w])));
        let mut grad_w = need_gw.then(|| ArrayD::zeros(IxDyn(&[cin, cout, k, k])));

        {
            let mut gx4 = grad_x
                .as_mut()
                .map(|a| a.view_mut().into_dimensionality::<Ix4>().expect("4-D"));
            let mut gw4 = grad_w
                .as_mut()
                .map(|a| a.view_mut().into_dimensionality::<Ix4>().expect("4-D"));
            let (ohh, oww, p) = (oh as isize, ow as isize, self.padding as isize);

            for bn in 0..n {
                for ci in 0..cin {
                    for i in 0..h {
                        for j in 0..w {
                            for co in 0..cout {
                                for kh in 0..k {
                                    let out_i = (i * self.stride + kh) as isize - p;
                                    if !(0..ohh).contains(&out_i) {
                                        continue;
                                    }
                                    for kw in 0..k {
                                        let out_j = (j * self.stride + kw) as isize - p;
                                        if !(0..oww).contains(&out_j) {
                                            continue;
                                        }
                                        let g = g4[[bn, co, out_i as usize, out_j as usize]];
                                        if let Some(gx) = gx4.as_mut() {
                                            gx[[bn, ci, i, j]] += w4[[ci, co, kh, kw]] * g;
                                        }
                                        if let Some(gw) = gw4.as_mut() {
                                            gw[[ci, co, kh, kw]] += x4[[bn, ci, i, j]] * g;
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        drop(wdata);
        drop(data);

        if let Some(gx) = grad_x {
            self.x.accumulate_grad(gx);
        }
        if let Some(gw) = grad_w {
            self.weight.accumulate_grad(gw);
        }
        if let Some(b) = &self.bias {
            if b.requires_grad() {
                let mut grad_b = vec![0.0f32; cout];
                for bn in 0..n {
                    for co in 0..cout {
                        for i in 0..oh {
                            for j in 0..ow {
                                grad_b[co] += g4[[bn, co, i, j]];
                            }
                        }
                    }
                }
                b.accumulate_grad(ArrayD::from_shape_vec(IxDyn(&[cout]), grad_b).expect("1-D"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_conv2d_identity_kernel() {
        // 1x1 kernel with weight 1 is the identity map.
        let x = Tensor::from_shape_vec(&[1, 1, 2, 2], vec![1.0, 2.0, 3.0, 4.0], false);
        let w = Tensor::from_shape_vec(&[1, 1, 1, 1], vec![1.0], false);
        let y = conv2d(&x, &w, None, 1, 0);
        assert_eq!(y.shape(), vec![1, 1, 2, 2]);
        assert_eq!(y.data().as_slice().unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_conv2d_output_shape_strided() {
        // 64 -> (64 + 2 - 3)/2 + 1 = 32 with k3 s2 p1.
        let x = Tensor::zeros(&[2, 3, 64, 64], false);
        let w = Tensor::zeros(&[8, 3, 3, 3], false);
        let y = conv2d(&x, &w, None, 2, 1);
        assert_eq!(y.shape(), vec![2, 8, 32, 32]);
    }

    #[test]
    fn test_conv2d_sum_kernel_with_bias() {
        let x = Tensor::from_shape_vec(&[1, 1, 2, 2], vec![1.0, 2.0, 3.0, 4.0], false);
        let w = Tensor::from_shape_vec(&[1, 1, 2, 2], vec![1.0; 4], false);
        let b = Tensor::from_vec(vec![10.0], false);
        let y = conv2d(&x, &w, Some(&b), 1, 0);
        assert_eq!(y.shape(), vec![1, 1, 1, 1]);
        assert_relative_eq!(y.data()[[0, 0, 0, 0]], 20.0);
    }

    #[test]
    fn test_conv_transpose2d_doubles_spatial_size() {
        // k4 s2 p1: (H-1)*2 + 4 - 2 = 2H.
        let x = Tensor::zeros(&[1, 4, 8, 8], false);
        let w = Tensor::zeros(&[4, 2, 4, 4], false);
        let y = conv_transpose2d(&x, &w, None, 2, 1, 0);
        assert_eq!(y.shape(), vec![1, 2, 16, 16]);
    }

    #[test]
    fn test_conv_transpose2d_k3_output_padding() {
        // k3 s2 p1 op1: (H-1)*2 + 3 + 1 - 2 = 2H.
        let x = Tensor::zeros(&[1, 4, 8, 8], false);
        let w = Tensor::zeros(&[4, 2, 3, 3], false);
        let y = conv_transpose2d(&x, &w, None, 2, 1, 1);
        assert_eq!(y.shape(), vec![1, 2, 16, 16]);
    }

    #[test]
    fn test_conv_transpose2d_scatter_values() {
        // Single input pixel scatters the kernel.
        let x = Tensor::from_shape_vec(&[1, 1, 1, 1], vec![2.0], false);
        let w = Tensor::from_shape_vec(&[1, 1, 2, 2], vec![1.0, 2.0, 3.0, 4.0], false);
        let y = conv_transpose2d(&x, &w, None, 1, 0, 0);
        assert_eq!(y.shape(), vec![1, 1, 2, 2]);
        assert_eq!(y.data().as_slice().unwrap(), &[2.0, 4.0, 6.0, 8.0]);
    }
}
