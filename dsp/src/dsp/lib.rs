//! Coefficient generation for CIC decimators and two-mic frequency domain beamformers
//!
//! Both engines are pure batch computations. [`cic`] builds the integrator carry (K) table and the
//! per-order accumulator lookup tables consumed by LUT-driven CIC decimators; [`beamforming`]
//! solves one complex weight vector per FFT band, either max-SIR or delay-and-subtract.
//! [`emit`] renders the results for the native build.

pub mod beamforming;
pub mod cic;
pub mod emit;
pub mod error;
pub mod linalg;
pub mod sweep;

pub use error::{Error, Result};
