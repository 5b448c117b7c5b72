use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures reported by the table builder and the weight solver. Nothing is emitted when one of
/// these is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Invalid or unsupported parameter combination
    #[error("invalid configuration: {details}")]
    Configuration { details: String },

    /// Interference + noise covariance could not be factored
    #[error("interference covariance is singular at band {band}")]
    SingularCovariance { band: usize },

    /// Weight vector failed the w^H w == 1 check
    #[error("weights at band {band} are not normalized (w^H w = {norm})")]
    NotNormalized { band: usize, norm: f64 },

    /// A NaN or infinite coefficient was produced
    #[error("non-finite coefficient at band {band}")]
    NonFinite { band: usize },

    /// Accumulator magnitude does not fit in an i32 table entry
    #[error("accumulator bound {bound} for frame_bits={frame_bits}, order={order} overflows i32")]
    OverflowRisk { frame_bits: usize, order: usize, bound: u128 },

    #[error("failed to format generated source")]
    Format(#[from] core::fmt::Error),
}

impl Error {
    pub fn config(details: impl Into<String>) -> Self {
        Self::Configuration { details: details.into() }
    }
}
