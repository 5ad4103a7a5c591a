//! Shared tensor handle with gradient storage
//!
//! A `Tensor` is a cheaply clonable handle: clones share the same data,
//! gradient cell, and backward record. Layers hand out their parameter
//! handles through `parameters()`, and the external training loop mutates
//! values in place through those shared handles.

use ndarray::{ArrayD, IxDyn};
use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use super::backward::BackwardOp;

/// N-dimensional `f32` tensor with optional gradient
#[derive(Clone)]
pub struct Tensor {
    inner: Rc<TensorInner>,
}

struct TensorInner {
    data: RefCell<ArrayD<f32>>,
    grad: RefCell<Option<ArrayD<f32>>>,
    requires_grad: bool,
    backward_op: RefCell<Option<Rc<dyn BackwardOp>>>,
}

impl Tensor {
    /// Create a tensor from raw array data
    pub fn new(data: ArrayD<f32>, requires_grad: bool) -> Self {
        Self {
            inner: Rc::new(TensorInner {
                data: RefCell::new(data),
                grad: RefCell::new(None),
                requires_grad,
                backward_op: RefCell::new(None),
            }),
        }
    }

    /// Create a 1-D tensor from a vector
    pub fn from_vec(values: Vec<f32>, requires_grad: bool) -> Self {
        Self::new(ArrayD::from_shape_vec(IxDyn(&[values.len()]), values).expect("1-D shape"), requires_grad)
    }

    /// Create a tensor of the given shape from a flat vector
    ///
    /// The value count must match the shape's element count.
    pub fn from_shape_vec(shape: &[usize], values: Vec<f32>, requires_grad: bool) -> Self {
        let data = ArrayD::from_shape_vec(IxDyn(shape), values)
            .expect("value count must match tensor shape");
        Self::new(data, requires_grad)
    }

    /// Create a zero-filled tensor
    pub fn zeros(shape: &[usize], requires_grad: bool) -> Self {
        Self::new(ArrayD::zeros(IxDyn(shape)), requires_grad)
    }

    /// Create a one-filled tensor
    pub fn ones(shape: &[usize], requires_grad: bool) -> Self {
        Self::new(ArrayD::ones(IxDyn(shape)), requires_grad)
    }

    /// Borrow the tensor data
    pub fn data(&self) -> Ref<'_, ArrayD<f32>> {
        self.inner.data.borrow()
    }

    /// Replace the tensor data in place, preserving shape
    ///
    /// This is the value-mutation entry point used by weight initialization
    /// and external parameter updates; the graph shape never changes.
    pub fn set_data(&self, data: ArrayD<f32>) {
        assert_eq!(
            data.shape(),
            self.inner.data.borrow().shape(),
            "set_data must preserve the tensor shape"
        );
        *self.inner.data.borrow_mut() = data;
    }

    /// Tensor shape
    pub fn shape(&self) -> Vec<usize> {
        self.inner.data.borrow().shape().to_vec()
    }

    /// Total number of elements
    pub fn len(&self) -> usize {
        self.inner.data.borrow().len()
    }

    /// Whether the tensor is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether gradients are tracked for this tensor
    pub fn requires_grad(&self) -> bool {
        self.inner.requires_grad
    }

    /// Current gradient, if any
    pub fn grad(&self) -> Option<ArrayD<f32>> {
        self.inner.grad.borrow().clone()
    }

    /// Overwrite the gradient
    pub fn set_grad(&self, grad: ArrayD<f32>) {
        assert_eq!(
            grad.shape(),
            self.inner.data.borrow().shape(),
            "gradient shape must match tensor shape"
        );
        *self.inner.grad.borrow_mut() = Some(grad);
    }

    /// Add a contribution into the gradient, initializing it if absent
    pub fn accumulate_grad(&self, grad: ArrayD<f32>) {
        assert_eq!(
            grad.shape(),
            self.inner.data.borrow().shape(),
            "gradient shape must match tensor shape"
        );
        let mut cell = self.inner.grad.borrow_mut();
        match cell.as_mut() {
            Some(existing) => *existing += &grad,
            None => *cell = Some(grad),
        }
    }

    /// Clear the gradient
    pub fn zero_grad(&self) {
        *self.inner.grad.borrow_mut() = None;
    }

    /// Backward record of the operation that produced this tensor
    pub fn backward_op(&self) -> Option<Rc<dyn BackwardOp>> {
        self.inner.backward_op.borrow().clone()
    }

    /// Attach the backward record of the producing operation
    pub fn set_backward_op(&self, op: Rc<dyn BackwardOp>) {
        *self.inner.backward_op.borrow_mut() = Some(op);
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape())
            .field("requires_grad", &self.requires_grad())
            .finish()
    }
}
