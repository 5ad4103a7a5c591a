//! Error types for network construction.

use thiserror::Error;

/// Construction-time configuration errors.
///
/// Every variant is raised synchronously by a factory or block constructor
/// and aborts construction; there are no retry semantics. The caller is
/// responsible for correcting the configuration.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("normalization layer [{0}] is not found")]
    UnsupportedNorm(String),

    #[error("generator model name [{0}] is not recognized")]
    UnsupportedGenerator(String),

    #[error("discriminator model name [{0}] is not recognized")]
    UnsupportedDiscriminator(String),

    #[error("padding [{0}] is not implemented")]
    UnsupportedPadding(String),

    #[error("accelerator placement requested but no CUDA device is available")]
    AcceleratorUnavailable,

    #[error("residual learning requires matching channel counts: input_nc={input_nc}, output_nc={output_nc}")]
    ChannelMismatch { input_nc: usize, output_nc: usize },

    #[error("U-Net depth {0} is too shallow: at least 5 downsampling stages are required")]
    DepthTooShallow(usize),
}

/// Result type for network construction
pub type Result<T> = std::result::Result<T, NetworkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_offending_mode() {
        let err = NetworkError::UnsupportedNorm("spectral".into());
        assert!(err.to_string().contains("[spectral]"));

        let err = NetworkError::UnsupportedGenerator("resnet_12blocks".into());
        assert!(err.to_string().contains("[resnet_12blocks]"));
    }

    #[test]
    fn test_channel_mismatch_reports_both_counts() {
        let err = NetworkError::ChannelMismatch {
            input_nc: 3,
            output_nc: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("input_nc=3"));
        assert!(msg.contains("output_nc=1"));
    }
}
