/** Compute frequency domain beamformer weights for a two (or more) mic linear array and write
them as C coefficient arrays, optionally sweeping parameters */
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use coeffgen_dsp::beamforming::{compute_weights, to_db, BeamformerMode, DmaPattern};
use coeffgen_dsp::emit;
use coeffgen_dsp::sweep::{config_label, SweepSpec};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Sir,
    Dma,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PatternArg {
    Cardioid,
    Hypercardioid,
    Dipole,
}

#[derive(Parser, Debug)]
#[command(about = "Beamformer coefficient generator")]
struct Args {
    /// JSON sweep file ({"base": {...}, "axes": [...]}); a bare base config is not accepted
    #[arg(long)]
    sweep: Option<PathBuf>,

    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    #[arg(long)]
    mics: Option<usize>,

    /// Mic spacing in mm
    #[arg(long)]
    spacing: Option<f64>,

    #[arg(long)]
    sample_rate: Option<f64>,

    #[arg(long)]
    bands: Option<usize>,

    /// Diagonal loading of the interference covariance
    #[arg(long)]
    noise: Option<f64>,

    /// Speech direction in degrees (repeatable, first is steered)
    #[arg(long, allow_negative_numbers = true)]
    speech: Vec<f64>,

    /// Interference direction in degrees (repeatable)
    #[arg(long, allow_negative_numbers = true)]
    interference: Vec<f64>,

    #[arg(long, value_enum)]
    pattern: Option<PatternArg>,

    /// Reference mic declared in the generated headers
    #[arg(long)]
    antenna_id: Option<usize>,

    #[arg(long, default_value = "fBeamforming")]
    name: String,

    #[arg(long, default_value = "coeff_files")]
    out_dir: PathBuf,

    /// Also write the weights as JSON
    #[arg(long)]
    json: bool,

    /// Print the polar response (dB, 1 degree steps) at this frequency instead of writing files
    #[arg(long)]
    polar: Option<f64>,

    /// Increase log verbosity
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_sweep(args: &Args) -> Result<SweepSpec> {
    let mut spec = match &args.sweep {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => SweepSpec::default(),
    };
    let base = &mut spec.base;
    if let Some(mode) = args.mode {
        base.mode = match mode {
            ModeArg::Sir => BeamformerMode::Sir,
            ModeArg::Dma => BeamformerMode::Dma,
        };
    }
    if let Some(mics) = args.mics {
        base.mic_count = mics;
    }
    if let Some(spacing) = args.spacing {
        base.mic_spacing_mm = spacing;
    }
    if let Some(rate) = args.sample_rate {
        base.sample_rate_hz = rate;
    }
    if let Some(bands) = args.bands {
        base.band_count = bands;
    }
    if let Some(noise) = args.noise {
        base.noise_variance_floor = noise;
    }
    if !args.speech.is_empty() {
        base.speech_angles = args.speech.clone();
    }
    if !args.interference.is_empty() {
        base.interference_angles = args.interference.clone();
    }
    if let Some(pattern) = args.pattern {
        base.dma_pattern = match pattern {
            PatternArg::Cardioid => DmaPattern::Cardioid,
            PatternArg::Hypercardioid => DmaPattern::Hypercardioid,
            PatternArg::Dipole => DmaPattern::Dipole,
        };
    }
    if let Some(antenna_id) = args.antenna_id {
        base.antenna_id = antenna_id;
    }
    Ok(spec)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(args.verbose);
    let spec = load_sweep(&args)?;
    let configs = spec.configs()?;

    if let Some(freq) = args.polar {
        if configs.len() != 1 {
            bail!("--polar needs a single configuration, the sweep has {}", configs.len());
        }
        let weights = compute_weights(&configs[0])?;
        let polar = to_db(&weights.polar_response(freq, 360));
        for (angle, db) in polar.iter().enumerate() {
            println!("{}\t{:.2}", angle, db);
        }
        return Ok(());
    }

    fs::create_dir_all(&args.out_dir).with_context(|| format!("creating {}", args.out_dir.display()))?;
    for config in &configs {
        let label = config_label(&args.name, config);
        let weights = compute_weights(config).with_context(|| format!("solving {}", label))?;

        let path = args.out_dir.join(format!("{}.c", label));
        fs::write(&path, emit::beamformer_source(&args.name, config, &weights)?)
            .with_context(|| format!("writing {}", path.display()))?;
        let path = args.out_dir.join(format!("{}.h", label));
        fs::write(&path, emit::beamformer_header(&args.name, config)?)
            .with_context(|| format!("writing {}", path.display()))?;

        if args.json {
            let path = args.out_dir.join(format!("{}.json", label));
            let json = serde_json::to_string_pretty(&emit::beamformer_json(&weights)?)?;
            fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        }
        log::info!("{}: {} bands, frame {} ms", label, config.band_count, config.frame_duration_ms());
    }

    let includes = [
        (format!("{}_cInclude.c", args.name), emit::beamformer_c_include(&args.name, &configs)?),
        (format!("{}_hInclude.h", args.name), emit::beamformer_h_include(&args.name, &configs)?),
    ];
    for (name, text) in includes {
        let path = args.out_dir.join(name);
        fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}
