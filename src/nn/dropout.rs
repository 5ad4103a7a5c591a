//! Dropout layer

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::fmt;

use crate::autograd::{dropout, Context, Tensor};

/// Inverted dropout layer
///
/// Owns its RNG stream, split off the construction RNG, so a seeded model
/// stays reproducible end to end.
#[derive(Debug)]
pub struct Dropout {
    p: f32,
    rng: RefCell<StdRng>,
}

impl Dropout {
    /// Create a dropout layer with drop probability `p`
    pub fn new<R: Rng>(p: f32, rng: &mut R) -> Self {
        Self {
            p,
            rng: RefCell::new(StdRng::from_rng(rng)),
        }
    }

    /// Forward pass; identity in eval mode
    pub fn forward(&self, x: &Tensor, ctx: &Context) -> Tensor {
        dropout(x, self.p, ctx.is_training(), &mut *self.rng.borrow_mut())
    }
}

impl fmt::Display for Dropout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dropout(p={})", self.p)
    }
}
