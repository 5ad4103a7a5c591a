//! Activation autograd operations: relu, leaky_relu, tanh, sigmoid

use crate::autograd::{BackwardOp, Tensor};
use std::rc::Rc;

/// ReLU activation
pub fn relu(a: &Tensor) -> Tensor {
    let data = a.data().mapv(|x| x.max(0.0));
    let requires_grad = a.requires_grad();

    let result = Tensor::new(data, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(ReluBackward {
            a: a.clone(),
            result: result.clone(),
        }));
    }

    result
}

struct ReluBackward {
    a: Tensor,
    result: Tensor,
}

impl BackwardOp for ReluBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self) {
        let Some(grad) = self.result.grad() else {
            return;
        };
        if self.a.requires_grad() {
            // ∂L/∂a = ∂L/∂out * (a > 0)
            let mask = self.a.data().mapv(|x| if x > 0.0 { 1.0 } else { 0.0 });
            self.a.accumulate_grad(&grad * &mask);
        }
    }
}

/// LeakyReLU activation with the given negative slope
pub fn leaky_relu(a: &Tensor, negative_slope: f32) -> Tensor {
    let data = a
        .data()
        .mapv(|x| if x > 0.0 { x } else { negative_slope * x });
    let requires_grad = a.requires_grad();

    let result = Tensor::new(data, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(LeakyReluBackward {
            a: a.clone(),
            negative_slope,
            result: result.clone(),
        }));
    }

    result
}

struct LeakyReluBackward {
    a: Tensor,
    negative_slope: f32,
    result: Tensor,
}

impl BackwardOp for LeakyReluBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self) {
        let Some(grad) = self.result.grad() else {
            return;
        };
        if self.a.requires_grad() {
            let slope = self.negative_slope;
            let mask = self.a.data().mapv(|x| if x > 0.0 { 1.0 } else { slope });
            self.a.accumulate_grad(&grad * &mask);
        }
    }
}

/// Tanh activation, bounding values to (-1, 1)
pub fn tanh(a: &Tensor) -> Tensor {
    let data = a.data().mapv(f32::tanh);
    let requires_grad = a.requires_grad();

    let result = Tensor::new(data, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(TanhBackward {
            a: a.clone(),
            result: result.clone(),
        }));
    }

    result
}

struct TanhBackward {
    a: Tensor,
    result: Tensor,
}

impl BackwardOp for TanhBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self) {
        let Some(grad) = self.result.grad() else {
            return;
        };
        if self.a.requires_grad() {
            // ∂tanh/∂x = 1 - tanh²(x), read from the stored output
            let derivative = self.result.data().mapv(|y| 1.0 - y * y);
            self.a.accumulate_grad(&grad * &derivative);
        }
    }
}

/// Sigmoid activation, bounding values to (0, 1)
pub fn sigmoid(a: &Tensor) -> Tensor {
    let data = a.data().mapv(|x| 1.0 / (1.0 + (-x).exp()));
    let requires_grad = a.requires_grad();

    let result = Tensor::new(data, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(SigmoidBackward {
            a: a.clone(),
            result: result.clone(),
        }));
    }

    result
}

struct SigmoidBackward {
    a: Tensor,
    result: Tensor,
}

impl BackwardOp for SigmoidBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self) {
        let Some(grad) = self.result.grad() else {
            return;
        };
        if self.a.requires_grad() {
            // ∂σ/∂x = σ(x)(1 - σ(x))
            let derivative = self.result.data().mapv(|y| y * (1.0 - y));
            self.a.accumulate_grad(&grad * &derivative);
        }
    }
}
