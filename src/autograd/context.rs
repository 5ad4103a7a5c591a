//! Execution context for forward passes

/// Context for a forward pass
///
/// Carries the train/eval mode that dropout and the normalization layers
/// branch on: dropout is active and normalization uses batch statistics in
/// training mode; in eval mode dropout is the identity and normalization
/// uses its running statistics.
pub struct Context {
    training: bool,
}

impl Context {
    /// Create a new context in training mode
    pub fn new() -> Self {
        Self { training: true }
    }

    /// Set training mode
    pub fn train(&mut self) {
        self.training = true;
    }

    /// Set evaluation mode
    pub fn eval(&mut self) {
        self.training = false;
    }

    /// Check if in training mode
    pub fn is_training(&self) -> bool {
        self.training
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_new() {
        let ctx = Context::new();
        assert!(ctx.is_training());
    }

    #[test]
    fn test_context_mode_switching() {
        let mut ctx = Context::default();
        ctx.eval();
        assert!(!ctx.is_training());

        ctx.train();
        assert!(ctx.is_training());
    }
}
