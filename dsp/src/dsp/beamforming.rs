use core::f64::consts::PI;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::linalg::{max_generalized_eigenvector, outer_hermitian, vector_norm};

/// Adiabatic index of air
pub const GAMMA_AIR: f64 = 1.4;
/// Specific gas constant of air, J/(kg K)
pub const GAS_CONSTANT_AIR: f64 = 287.058;
pub const DEFAULT_TEMPERATURE_C: f64 = 20.0;
/// The delay-and-subtract design only exists for dual mics at this rate
pub const DMA_SAMPLE_RATE_HZ: f64 = 16000.0;
/// Tolerance on w^H w == 1 for SIR weights
pub const NORMALIZATION_TOLERANCE: f64 = 1e-9;

/// Keeps the equalizer finite at DC
const OMEGA_EPSILON: f64 = 1e-10;
/// Bands below this index copy its equalizer gain
const DMA_LOW_BAND_CLAMP: usize = 4;

pub fn speed_of_sound(temperature_c: f64) -> f64 {
    libm::sqrt(GAMMA_AIR * GAS_CONSTANT_AIR * (273.15 + temperature_c))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BeamformerMode {
    /// Maximum signal-to-interference ratio, solved per band by generalized eigen-decomposition
    #[serde(rename = "SIR")]
    Sir,
    /// Dual mic delay-and-subtract with low frequency equalization
    #[serde(rename = "DMA")]
    Dma,
}

/// Polar pattern of the delay-and-subtract pair, set by the ratio of applied to acoustic delay
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DmaPattern {
    Cardioid,
    Hypercardioid,
    Dipole,
}

impl DmaPattern {
    /// T / Ta
    pub fn delay_ratio(&self) -> f64 {
        match self {
            DmaPattern::Cardioid => 1.0,
            DmaPattern::Hypercardioid => 1.0 / 3.0,
            DmaPattern::Dipole => 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeamformerConfig {
    pub mic_count: usize,
    pub mic_spacing_mm: f64,
    pub sample_rate_hz: f64,
    /// FFT half spectrum size, i.e. nfft / 2 + 1
    pub band_count: usize,
    pub mode: BeamformerMode,
    /// Diagonal loading added to the interference covariance
    pub noise_variance_floor: f64,
    /// Degrees; the first entry is the steered direction
    pub speech_angles: Vec<f64>,
    /// Degrees
    pub interference_angles: Vec<f64>,
    pub temperature_c: f64,
    pub dma_pattern: DmaPattern,
    /// Mic the firmware treats as the reference channel; not part of the configuration label
    pub antenna_id: usize,
}

impl Default for BeamformerConfig {
    fn default() -> Self {
        Self {
            mic_count: 2,
            mic_spacing_mm: 21.0,
            sample_rate_hz: 16000.0,
            band_count: 129,
            mode: BeamformerMode::Sir,
            noise_variance_floor: 1e-4,
            speech_angles: vec![0.0],
            interference_angles: vec![45.0],
            temperature_c: DEFAULT_TEMPERATURE_C,
            dma_pattern: DmaPattern::Cardioid,
            antenna_id: 0,
        }
    }
}

impl BeamformerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.mic_count == 0 {
            return Err(Error::config("mic_count must be at least 1"));
        }
        if !(self.mic_spacing_mm.is_finite() && self.mic_spacing_mm > 0.0) {
            return Err(Error::config(format!("mic spacing must be positive, got {} mm", self.mic_spacing_mm)));
        }
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(Error::config(format!("sample rate must be positive, got {} Hz", self.sample_rate_hz)));
        }
        if self.band_count < 3 || self.band_count % 2 == 0 {
            return Err(Error::config(format!(
                "band count must be odd and at least 3, got {}",
                self.band_count
            )));
        }
        if self.antenna_id >= self.mic_count {
            return Err(Error::config(format!(
                "antenna_id {} is out of range for {} mics",
                self.antenna_id, self.mic_count
            )));
        }
        if !(self.temperature_c.is_finite() && self.temperature_c > -273.15) {
            return Err(Error::config(format!("temperature {} C is not physical", self.temperature_c)));
        }

        match self.mode {
            BeamformerMode::Sir => {
                if self.speech_angles.is_empty() {
                    return Err(Error::config("SIR mode needs at least one speech angle"));
                }
                if self.source_angles().any(|a| !a.is_finite()) {
                    return Err(Error::config("source angles must be finite"));
                }
                if !(self.noise_variance_floor.is_finite() && self.noise_variance_floor >= 0.0) {
                    return Err(Error::config(format!(
                        "noise variance floor must be finite and non-negative, got {}",
                        self.noise_variance_floor
                    )));
                }
            }
            BeamformerMode::Dma => {
                if self.mic_count != 2 || self.sample_rate_hz != DMA_SAMPLE_RATE_HZ {
                    return Err(Error::config(format!(
                        "DMA beamforming is implemented for 2 mics at {} Hz only (got {} mics at {} Hz)",
                        DMA_SAMPLE_RATE_HZ, self.mic_count, self.sample_rate_hz
                    )));
                }
                if self.band_count <= DMA_LOW_BAND_CLAMP {
                    return Err(Error::config(format!(
                        "DMA beamforming needs more than {} bands, got {}",
                        DMA_LOW_BAND_CLAMP, self.band_count
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn speed_of_sound(&self) -> f64 {
        speed_of_sound(self.temperature_c)
    }

    /// Speech angles followed by interference angles
    pub fn source_angles(&self) -> impl Iterator<Item = f64> + '_ {
        self.speech_angles.iter().chain(self.interference_angles.iter()).copied()
    }

    pub fn fft_len(&self) -> usize {
        (self.band_count - 1) * 2
    }

    /// Duration of one processing frame with 50% overlap, in ms
    pub fn frame_duration_ms(&self) -> f64 {
        self.fft_len() as f64 / (self.sample_rate_hz / 1000.0) / 2.0
    }

    pub fn band_frequencies(&self) -> Array1<f64> {
        band_frequencies(self.sample_rate_hz, self.band_count)
    }
}

/// Center frequencies of the half spectrum bins, 0 to Nyquist inclusive
pub fn band_frequencies(sample_rate_hz: f64, band_count: usize) -> Array1<f64> {
    Array1::linspace(0.0, sample_rate_hz / 2.0, band_count)
}

/// Far-field plane wave steering vector for a uniform linear array, mic 0 is the phase reference
pub fn steering_vector(
    mic_count: usize,
    mic_spacing_mm: f64,
    angle_deg: f64,
    freq_hz: f64,
    speed_of_sound: f64,
) -> Array1<Complex64> {
    let sin_theta = libm::sin(angle_deg.to_radians());
    Array1::from_shape_fn(mic_count, |m| {
        let t = mic_spacing_mm / 1000.0 * m as f64 * sin_theta / speed_of_sound;
        Complex64::from_polar(1.0, 2.0 * PI * freq_hz * t)
    })
}

/// Complex weights, one row per band and one column per mic
#[derive(Clone, Debug)]
pub struct WeightMatrix {
    weights: Array2<Complex64>,
    frequencies: Array1<f64>,
    mic_spacing_mm: f64,
    speed_of_sound: f64,
}

impl WeightMatrix {
    /// Wrap externally computed weights; `frequencies` must hold one entry per row
    pub fn new(
        weights: Array2<Complex64>,
        frequencies: Array1<f64>,
        mic_spacing_mm: f64,
        speed_of_sound: f64,
    ) -> Result<Self> {
        if weights.nrows() != frequencies.len() {
            return Err(Error::config(format!(
                "{} weight rows for {} band frequencies",
                weights.nrows(),
                frequencies.len()
            )));
        }
        Ok(Self { weights, frequencies, mic_spacing_mm, speed_of_sound })
    }

    pub fn as_array(&self) -> ArrayView2<'_, Complex64> {
        self.weights.view()
    }

    pub fn band(&self, band: usize) -> ArrayView1<'_, Complex64> {
        self.weights.row(band)
    }

    /// All bands for one mic
    pub fn channel(&self, mic: usize) -> ArrayView1<'_, Complex64> {
        self.weights.column(mic)
    }

    pub fn band_count(&self) -> usize {
        self.weights.nrows()
    }

    pub fn mic_count(&self) -> usize {
        self.weights.ncols()
    }

    pub fn frequencies(&self) -> &Array1<f64> {
        &self.frequencies
    }

    /// Index of the band whose center frequency is closest to freq_hz
    pub fn nearest_band(&self, freq_hz: f64) -> usize {
        let last = self.band_count() - 1;
        let spacing = self.frequencies[last] / last as f64;
        let idx = libm::round(freq_hz / spacing);
        if idx <= 0.0 {
            0
        } else {
            (idx as usize).min(last)
        }
    }

    /// Polar response of the band nearest to freq_hz, evaluated at freq_hz
    pub fn polar_response(&self, freq_hz: f64, angle_count: usize) -> Array1<f64> {
        compute_polar_response(
            self.band(self.nearest_band(freq_hz)),
            freq_hz,
            self.mic_spacing_mm,
            self.speed_of_sound,
            angle_count,
        )
    }
}

/// Magnitude of sum over m of weights[m] * exp(j k d sin(theta) (m - 1)) for angle_count angles
/// evenly spread over the full circle starting at 0 degrees
pub fn compute_polar_response(
    weights: ArrayView1<Complex64>,
    freq_hz: f64,
    mic_spacing_mm: f64,
    speed_of_sound: f64,
    angle_count: usize,
) -> Array1<f64> {
    let k = 2.0 * PI * freq_hz / speed_of_sound;
    let d = mic_spacing_mm / 1000.0;
    Array1::from_shape_fn(angle_count, |i| {
        let theta = (i as f64 * 360.0 / angle_count as f64).to_radians();
        let phi = k * d * libm::sin(theta);
        let mut sum = Complex64::new(0.0, 0.0);
        for (m, w) in weights.iter().enumerate() {
            sum += w * Complex64::from_polar(1.0, phi * (m as f64 - 1.0));
        }
        sum.norm()
    })
}

pub fn to_db(magnitude: &Array1<f64>) -> Array1<f64> {
    magnitude.mapv(|x| 20.0 * libm::log10(x))
}

/// Produces the weight matrix for one beamformer configuration
pub trait WeightSolver {
    fn solve(&self) -> Result<WeightMatrix>;
}

pub struct SirBeamformer<'a> {
    config: &'a BeamformerConfig,
    frequencies: Array1<f64>,
    speed_of_sound: f64,
}

impl<'a> SirBeamformer<'a> {
    pub fn new(config: &'a BeamformerConfig) -> Result<Self> {
        config.validate()?;
        if config.mode != BeamformerMode::Sir {
            return Err(Error::config("SirBeamformer needs a SIR mode configuration"));
        }
        Ok(Self {
            config,
            frequencies: config.band_frequencies(),
            speed_of_sound: config.speed_of_sound(),
        })
    }

    /// Steering matrix for a band: one column per source, speech sources first
    pub fn steering_matrix(&self, band: usize) -> Array2<Complex64> {
        let freq = self.frequencies[band];
        let angles: Vec<f64> = self.config.source_angles().collect();
        let mut a = Array2::<Complex64>::zeros((self.config.mic_count, angles.len()));
        for (s, &angle) in angles.iter().enumerate() {
            let sv = steering_vector(
                self.config.mic_count,
                self.config.mic_spacing_mm,
                angle,
                freq,
                self.speed_of_sound,
            );
            a.column_mut(s).assign(&sv);
        }
        a
    }

    /// Max-SIR weight vector for one band
    pub fn solve_band(&self, band: usize) -> Result<Array1<Complex64>> {
        let a = self.steering_matrix(band);
        let mic_count = self.config.mic_count;

        let a0 = a.column(0);
        let rdd = outer_hermitian(a0, a0);

        let mut rii = Array2::<Complex64>::eye(mic_count).mapv(|x| x * self.config.noise_variance_floor);
        for s in 1..a.ncols() {
            let col = a.column(s);
            rii = rii + outer_hermitian(col, col);
        }

        let eig = max_generalized_eigenvector(&rdd, &rii).ok_or(Error::SingularCovariance { band })?;
        if eig.ties > 1 {
            log::warn!("band {}: {} eigenvalues tie for the maximum, using the first", band, eig.ties);
        }

        let w = eig.vector;
        if w.iter().any(|x| !x.re.is_finite() || !x.im.is_finite()) {
            return Err(Error::NonFinite { band });
        }
        let norm = vector_norm(w.view());
        let norm_sqr = norm * norm;
        if (norm_sqr - 1.0).abs() > NORMALIZATION_TOLERANCE {
            return Err(Error::NotNormalized { band, norm: norm_sqr });
        }
        log::debug!("band {} ({} Hz): SIR gain {}", band, self.frequencies[band], eig.value);
        Ok(w)
    }
}

impl<'a> WeightSolver for SirBeamformer<'a> {
    fn solve(&self) -> Result<WeightMatrix> {
        let mut weights = Array2::<Complex64>::zeros((self.config.band_count, self.config.mic_count));
        for band in 0..self.config.band_count {
            let w = self.solve_band(band)?;
            weights.row_mut(band).assign(&w);
        }
        Ok(WeightMatrix {
            weights,
            frequencies: self.frequencies.clone(),
            mic_spacing_mm: self.config.mic_spacing_mm,
            speed_of_sound: self.speed_of_sound,
        })
    }
}

pub struct DmaBeamformer<'a> {
    config: &'a BeamformerConfig,
    frequencies: Array1<f64>,
    speed_of_sound: f64,
}

impl<'a> DmaBeamformer<'a> {
    pub fn new(config: &'a BeamformerConfig) -> Result<Self> {
        config.validate()?;
        if config.mode != BeamformerMode::Dma {
            return Err(Error::config("DmaBeamformer needs a DMA mode configuration"));
        }
        Ok(Self {
            config,
            frequencies: config.band_frequencies(),
            speed_of_sound: config.speed_of_sound(),
        })
    }

    /// Acoustic delay across half the mic spacing, in seconds
    pub fn acoustic_delay(&self) -> f64 {
        (self.config.mic_spacing_mm / 2.0 / 1000.0) / self.speed_of_sound
    }

    /// Delay applied to the subtracted channel, in seconds
    pub fn applied_delay(&self) -> f64 {
        self.acoustic_delay() * self.config.dma_pattern.delay_ratio()
    }

    /// Equalizer cutoff in rad/s
    pub fn cutoff(&self) -> f64 {
        PI / (self.acoustic_delay() + self.applied_delay())
    }

    /// First band above the cutoff, from which the equalizer is clamped to unity
    pub fn clamp_band(&self) -> Option<usize> {
        let omega_c = self.cutoff();
        self.frequencies.iter().position(|&f| 2.0 * PI * f + OMEGA_EPSILON > omega_c)
    }

    /// Equalizer gain per band, before the 1/4 compensation
    pub fn equalizer(&self) -> Array1<f64> {
        let omega_c = self.cutoff();
        let clamp_band = self.clamp_band();
        let mut weq = Array1::from_shape_fn(self.frequencies.len(), |band| match clamp_band {
            Some(c) if band >= c => 1.0,
            _ => 1.0 / libm::sin(PI / 2.0 * (2.0 * PI * self.frequencies[band] + OMEGA_EPSILON) / omega_c),
        });
        let floor = weq[DMA_LOW_BAND_CLAMP];
        for band in 0..DMA_LOW_BAND_CLAMP {
            weq[band] = floor;
        }
        log::debug!("DMA equalizer cutoff {} Hz", omega_c / 2.0 / PI);
        if let Some(band) = clamp_band {
            log::warn!(
                "DMA equalizer clamped to unity from band {} ({} Hz) up",
                band,
                self.frequencies[band]
            );
        }
        weq
    }
}

impl<'a> WeightSolver for DmaBeamformer<'a> {
    /// Column 0 is the subtracted mic, `-exp(-j 2 pi f T) * gain`; column 1 is `exp(+j 2 pi f T) * gain`
    fn solve(&self) -> Result<WeightMatrix> {
        let t = self.applied_delay();
        let weq = self.equalizer();
        let mut weights = Array2::<Complex64>::zeros((self.config.band_count, 2));
        for (band, &f) in self.frequencies.iter().enumerate() {
            // fixed 1/4 output scaling
            let gain = weq[band] / 4.0;
            let phase = 2.0 * PI * f * t;
            // mic 0 is subtracted and delayed the other way
            weights[[band, 0]] = -Complex64::from_polar(gain, -phase);
            weights[[band, 1]] = Complex64::from_polar(gain, phase);
        }
        if let Some(band) = weights
            .rows()
            .into_iter()
            .position(|row| row.iter().any(|x| !x.re.is_finite() || !x.im.is_finite()))
        {
            return Err(Error::NonFinite { band });
        }
        Ok(WeightMatrix {
            weights,
            frequencies: self.frequencies.clone(),
            mic_spacing_mm: self.config.mic_spacing_mm,
            speed_of_sound: self.speed_of_sound,
        })
    }
}

/// Validate the configuration and solve it with the solver for its mode
pub fn compute_weights(config: &BeamformerConfig) -> Result<WeightMatrix> {
    match config.mode {
        BeamformerMode::Sir => SirBeamformer::new(config)?.solve(),
        BeamformerMode::Dma => DmaBeamformer::new(config)?.solve(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sir_config() -> BeamformerConfig {
        BeamformerConfig {
            mic_spacing_mm: 63.0,
            noise_variance_floor: 1e-11,
            ..Default::default()
        }
    }

    fn dma_config() -> BeamformerConfig {
        BeamformerConfig {
            mode: BeamformerMode::Dma,
            mic_spacing_mm: 63.0,
            ..Default::default()
        }
    }

    #[test]
    fn speed_of_sound_at_room_temperature() {
        let c = speed_of_sound(DEFAULT_TEMPERATURE_C);
        assert!((c - 343.237).abs() < 1e-2);
        assert!(speed_of_sound(0.0) < c);
    }

    #[test]
    fn band_frequencies_span_to_nyquist() {
        let f = band_frequencies(16000.0, 129);
        assert_eq!(f.len(), 129);
        assert_eq!(f[0], 0.0);
        assert!((f[64] - 4000.0).abs() < 1e-9);
        assert!((f[128] - 8000.0).abs() < 1e-9);
    }

    #[test]
    fn frame_duration() {
        let config = BeamformerConfig::default();
        assert_eq!(config.fft_len(), 256);
        assert!((config.frame_duration_ms() - 8.0).abs() < 1e-12);
    }

    #[test]
    fn steering_vector_phases() {
        let c = 343.0;
        let sv = steering_vector(3, 50.0, 90.0, 1000.0, c);
        assert_eq!(sv[0], Complex64::new(1.0, 0.0));
        for m in 0..3 {
            assert!((sv[m].norm() - 1.0).abs() < 1e-12);
            let expected = 2.0 * PI * 1000.0 * 0.05 * m as f64 / c;
            let diff = sv[m] / Complex64::from_polar(1.0, expected);
            assert!((diff - Complex64::new(1.0, 0.0)).norm() < 1e-12);
        }
        // Broadside arrivals are in phase on every mic
        let broadside = steering_vector(4, 50.0, 0.0, 3000.0, c);
        assert!(broadside.iter().all(|x| (x - Complex64::new(1.0, 0.0)).norm() < 1e-12));
    }

    #[test]
    fn sir_weights_are_normalized() {
        let config = sir_config();
        let weights = compute_weights(&config).unwrap();
        assert_eq!(weights.band_count(), 129);
        assert_eq!(weights.mic_count(), 2);
        for band in 0..weights.band_count() {
            let norm: f64 = weights.band(band).iter().map(|x| x.norm_sqr()).sum();
            assert!((norm - 1.0).abs() < 1e-6, "band {} norm {}", band, norm);
        }
    }

    #[test]
    fn sir_weights_reject_the_interferer() {
        let config = BeamformerConfig {
            mic_count: 4,
            mic_spacing_mm: 21.0,
            noise_variance_floor: 1e-6,
            speech_angles: vec![25.0],
            interference_angles: vec![0.0, -45.0],
            ..Default::default()
        };
        let solver = SirBeamformer::new(&config).unwrap();
        let c = config.speed_of_sound();
        let freq = config.band_frequencies()[80];
        let w = solver.solve_band(80).unwrap();
        let response = |angle: f64| -> f64 {
            let a = steering_vector(4, 21.0, angle, freq, c);
            w.iter().zip(a.iter()).map(|(w, a)| w.conj() * a).sum::<Complex64>().norm()
        };
        let speech = response(25.0);
        assert!(response(0.0) < 1e-2 * speech);
        assert!(response(-45.0) < 1e-2 * speech);
    }

    #[test]
    fn singular_interference_is_an_error() {
        let config = BeamformerConfig {
            noise_variance_floor: 0.0,
            ..sir_config()
        };
        let err = compute_weights(&config).unwrap_err();
        assert!(matches!(err, Error::SingularCovariance { band: 0 }));
    }

    #[test]
    fn sir_without_interference_steers_to_speech() {
        let config = BeamformerConfig {
            interference_angles: vec![],
            noise_variance_floor: 1e-3,
            ..sir_config()
        };
        let weights = compute_weights(&config).unwrap();
        // Matched filter: w is parallel to the speech steering vector
        let band = 40;
        let a = steering_vector(2, 63.0, 0.0, weights.frequencies()[band], config.speed_of_sound());
        let overlap: Complex64 = a.iter().zip(weights.band(band).iter()).map(|(a, w)| a.conj() * w).sum();
        assert!((overlap.norm() - 2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn dma_filters_are_conjugate_antisymmetric() {
        let config = dma_config();
        let weights = compute_weights(&config).unwrap();
        let band = weights.nearest_band(1000.0);
        assert!((weights.frequencies()[band] - 1000.0).abs() < 1e-9);
        let mic0 = weights.band(band)[0];
        let mic1 = weights.band(band)[1];
        assert!((mic0 + mic1.conj()).norm() < 1e-12);
        for band in 0..weights.band_count() {
            let row = weights.band(band);
            assert!((row[0] + row[1].conj()).norm() < 1e-12);
        }
    }

    #[test]
    fn dma_column_zero_is_the_subtracted_mic() {
        let config = dma_config();
        let dma = DmaBeamformer::new(&config).unwrap();
        let weights = dma.solve().unwrap();
        let weq = dma.equalizer();
        let t = dma.applied_delay();
        let band = weights.nearest_band(1000.0);
        let f = weights.frequencies()[band];
        let gain = weq[band] / 4.0;
        let expected0 = -Complex64::from_polar(gain, -2.0 * PI * f * t);
        let expected1 = Complex64::from_polar(gain, 2.0 * PI * f * t);
        assert!((weights.band(band)[0] - expected0).norm() < 1e-12);
        assert!((weights.band(band)[1] - expected1).norm() < 1e-12);
        // Negative real part on the subtracted mic at low frequency
        assert!(weights.band(band)[0].re < 0.0);
    }

    #[test]
    fn dma_equalizer_shape() {
        let config = dma_config();
        let dma = DmaBeamformer::new(&config).unwrap();
        let weq = dma.equalizer();
        for band in 0..4 {
            assert_eq!(weq[band], weq[4]);
        }
        assert!(weq[4] > weq[20]);
        // Cardioid cutoff: pi / (2 Ta) rad/s, ~2.7 kHz for 63 mm
        let cutoff_hz = 1.0 / (4.0 * dma.acoustic_delay());
        let above = weights_above(&config, cutoff_hz);
        assert!(above.iter().all(|&g| g == 1.0));
        assert_eq!(weq[weq.len() - 1], 1.0);

        let clamp = dma.clamp_band().unwrap();
        assert!(config.band_frequencies()[clamp] > cutoff_hz);
        assert!(config.band_frequencies()[clamp - 1] <= cutoff_hz);
        assert!(weq.iter().skip(clamp).all(|&g| g == 1.0));
        assert!(weq[clamp - 1] > 1.0);
        let gains = compute_weights(&config).unwrap();
        assert!((gains.band(128)[1].norm() - 0.25).abs() < 1e-12);
    }

    fn weights_above(config: &BeamformerConfig, cutoff_hz: f64) -> Vec<f64> {
        let dma = DmaBeamformer::new(config).unwrap();
        let weq = dma.equalizer();
        config
            .band_frequencies()
            .iter()
            .zip(weq.iter())
            .filter(|(f, _)| **f > cutoff_hz)
            .map(|(_, g)| *g)
            .collect()
    }

    #[test]
    fn dma_patterns_change_the_delay() {
        let cardioid = dma_config();
        let dipole = BeamformerConfig { dma_pattern: DmaPattern::Dipole, ..dma_config() };
        let hyper = BeamformerConfig { dma_pattern: DmaPattern::Hypercardioid, ..dma_config() };
        let ta = DmaBeamformer::new(&cardioid).unwrap().acoustic_delay();
        assert_eq!(DmaBeamformer::new(&cardioid).unwrap().applied_delay(), ta);
        assert_eq!(DmaBeamformer::new(&dipole).unwrap().applied_delay(), 0.0);
        assert!((DmaBeamformer::new(&hyper).unwrap().applied_delay() - ta / 3.0).abs() < 1e-18);
        // No applied delay leaves every filter real
        let w = compute_weights(&dipole).unwrap();
        assert!(w.as_array().iter().all(|x| x.im == 0.0));
    }

    #[test]
    fn dma_rejects_unsupported_arrays() {
        let four_mics = BeamformerConfig { mic_count: 4, ..dma_config() };
        assert!(matches!(compute_weights(&four_mics), Err(Error::Configuration { .. })));
        let fast = BeamformerConfig { sample_rate_hz: 48000.0, ..dma_config() };
        assert!(matches!(compute_weights(&fast), Err(Error::Configuration { .. })));
    }

    #[test]
    fn config_validation() {
        assert!(BeamformerConfig::default().validate().is_ok());
        let even = BeamformerConfig { band_count: 128, ..Default::default() };
        assert!(even.validate().is_err());
        let no_speech = BeamformerConfig { speech_angles: vec![], ..Default::default() };
        assert!(no_speech.validate().is_err());
        let negative_noise = BeamformerConfig { noise_variance_floor: -1.0, ..Default::default() };
        assert!(negative_noise.validate().is_err());
        let no_mics = BeamformerConfig { mic_count: 0, ..Default::default() };
        assert!(no_mics.validate().is_err());
        let nan_angle = BeamformerConfig { interference_angles: vec![f64::NAN], ..Default::default() };
        assert!(nan_angle.validate().is_err());
        let second_mic = BeamformerConfig { antenna_id: 1, ..Default::default() };
        assert!(second_mic.validate().is_ok());
        let missing_mic = BeamformerConfig { antenna_id: 2, ..Default::default() };
        assert!(missing_mic.validate().is_err());
        assert!(SirBeamformer::new(&dma_config()).is_err());
    }

    #[test]
    fn polar_response_of_a_single_mic_is_flat() {
        let w = Array1::from(vec![Complex64::new(0.5, 0.0)]);
        let polar = compute_polar_response(w.view(), 2000.0, 20.0, 343.0, 360);
        assert_eq!(polar.len(), 360);
        assert!(polar.iter().all(|&x| (x - 0.5).abs() < 1e-12));
        let db = to_db(&polar);
        assert!((db[0] - 20.0 * 0.5f64.log10()).abs() < 1e-12);
    }

    #[test]
    fn nearest_band_clamps() {
        let weights = compute_weights(&sir_config()).unwrap();
        assert_eq!(weights.nearest_band(-10.0), 0);
        assert_eq!(weights.nearest_band(4000.0), 64);
        assert_eq!(weights.nearest_band(4020.0), 64);
        assert_eq!(weights.nearest_band(20000.0), 128);
    }

    #[test]
    fn config_round_trips_through_json() {
        let json = r#"{ "mode": "DMA", "mic_spacing_mm": 63.0, "dma_pattern": "Hypercardioid" }"#;
        let config: BeamformerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.mode, BeamformerMode::Dma);
        assert_eq!(config.dma_pattern, DmaPattern::Hypercardioid);
        assert_eq!(config.band_count, 129);
        assert_eq!(config.speech_angles, vec![0.0]);
    }
}
