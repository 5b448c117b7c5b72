use serde::{Deserialize, Serialize};

use crate::beamforming::{BeamformerConfig, BeamformerMode};
use crate::error::{Error, Result};

/// One swept parameter and the values it takes
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SweepAxis {
    MicSpacingMm(Vec<f64>),
    BandCount(Vec<usize>),
    NoiseVarianceFloor(Vec<f64>),
    SpeechAngles(Vec<Vec<f64>>),
    InterferenceAngles(Vec<Vec<f64>>),
}

impl SweepAxis {
    pub fn len(&self) -> usize {
        match self {
            SweepAxis::MicSpacingMm(v) => v.len(),
            SweepAxis::BandCount(v) => v.len(),
            SweepAxis::NoiseVarianceFloor(v) => v.len(),
            SweepAxis::SpeechAngles(v) => v.len(),
            SweepAxis::InterferenceAngles(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn apply(&self, index: usize, config: &mut BeamformerConfig) {
        match self {
            SweepAxis::MicSpacingMm(v) => config.mic_spacing_mm = v[index],
            SweepAxis::BandCount(v) => config.band_count = v[index],
            SweepAxis::NoiseVarianceFloor(v) => config.noise_variance_floor = v[index],
            SweepAxis::SpeechAngles(v) => config.speech_angles = v[index].clone(),
            SweepAxis::InterferenceAngles(v) => config.interference_angles = v[index].clone(),
        }
    }
}

/// A base configuration and the axes whose cartesian product is explored
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSpec {
    pub base: BeamformerConfig,
    pub axes: Vec<SweepAxis>,
}

impl SweepSpec {
    /// Every combination of axis values applied to the base, first axis varying slowest.
    /// With no axes this is just the base configuration.
    pub fn configs(&self) -> Result<Vec<BeamformerConfig>> {
        if let Some(empty) = self.axes.iter().find(|a| a.is_empty()) {
            return Err(Error::config(format!("sweep axis {:?} has no values", empty)));
        }
        let total: usize = self.axes.iter().map(|a| a.len()).product();
        let mut configs = Vec::with_capacity(total);
        for n in 0..total {
            let mut config = self.base.clone();
            let mut rem = n;
            for axis in self.axes.iter().rev() {
                axis.apply(rem % axis.len(), &mut config);
                rem /= axis.len();
            }
            config.validate()?;
            configs.push(config);
        }
        Ok(configs)
    }
}

fn value_text(v: f64) -> String {
    format!("{}", v).replace('-', "_")
}

/// Name that identifies a configuration in generated files, e.g.
/// `fBeamforming_micDist63_bandsNb129_source0_noise45_noiseStdDev0p0001`.
/// Fields appear in a fixed order: spacing, bands, speech angles, interference angles, noise floor
pub fn config_label(name: &str, config: &BeamformerConfig) -> String {
    let mut label = String::from(name);
    label.push_str(&format!("_micDist{}", value_text(config.mic_spacing_mm)));
    label.push_str(&format!("_bandsNb{}", config.band_count));
    if config.mode == BeamformerMode::Sir {
        for a in &config.speech_angles {
            label.push_str(&format!("_source{}", value_text(*a)));
        }
        for a in &config.interference_angles {
            label.push_str(&format!("_noise{}", value_text(*a)));
        }
        label.push_str(&format!("_noiseStdDev{}", value_text(config.noise_variance_floor)));
    }
    label.replace('.', "p")
}
