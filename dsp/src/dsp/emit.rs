//! Text renderers for the generated tables and weights
//!
//! All functions build strings; writing them to disk is left to the caller.

use core::fmt::{self, Write};

use ndarray::ArrayView1;
use num_complex::Complex64;
use serde_json::{Map, Value};

use crate::beamforming::{BeamformerConfig, BeamformerMode, WeightMatrix};
use crate::cic::{CicDesign, CicTables};
use crate::error::{Error, Result};
use crate::sweep::config_label;

const K_COEFFS_PROTO: &str = "int32_t kCoefficients[CIC_FRAME_SIZE_MAX][CIC_ORDER_MAX]";
/// Table entries per line in generated C arrays
const LUT_VALUES_PER_LINE: usize = 8;
/// Complex coefficients per line in generated C arrays
const COEFFS_PER_LINE: usize = 4;
/// Build define of the x86 simulation target, which selects configurations by header
const SIMULATION_DEFINE: &str = "SIMULATION_X86";

fn header_guard(basename: &str) -> String {
    format!("_{}_H_", basename.to_uppercase())
}

fn render(f: impl FnOnce(&mut String) -> fmt::Result) -> Result<String> {
    let mut out = String::new();
    f(&mut out)?;
    Ok(out)
}

/// `<basename>_conf.h`: which frame sizes are compiled in
pub fn cic_conf_header(basename: &str, design: &CicDesign) -> Result<String> {
    let guard = header_guard(&format!("{}_conf", basename));
    render(|out| {
        writeln!(out, "#ifndef {}", guard)?;
        writeln!(out, "#define {}\n", guard)?;
        for frame_size in &design.frame_sizes {
            writeln!(out, "#define CIC_FRAME_SIZE_{}_USED", frame_size)?;
        }
        writeln!(out, "\n#endif /* {} */", guard)
    })
}

/// `<basename>.h`: K table and accumulator table declarations
pub fn cic_header(basename: &str, tables: &[CicTables]) -> Result<String> {
    let guard = header_guard(basename);
    let frame_size_max = tables.iter().map(|t| t.frame_bits).max().unwrap_or(0);
    let order_max = tables.iter().map(|t| t.order).max().unwrap_or(0);

    render(|out| {
        writeln!(out, "#ifndef {}", guard)?;
        writeln!(out, "#define {}\n", guard)?;
        writeln!(out, "#include \"{}_conf.h\"", basename)?;
        writeln!(out, "#include <stdint.h>\n")?;
        writeln!(out, "#define CIC_FRAME_SIZE_MAX {}", frame_size_max)?;
        writeln!(out, "#define CIC_ORDER_MAX {}\n", order_max)?;
        writeln!(out, "extern {};\n", K_COEFFS_PROTO)?;
        for t in tables {
            writeln!(out, "#ifdef CIC_FRAME_SIZE_{}_USED", t.frame_bits)?;
            for lut in &t.luts {
                for order in 1..=t.order {
                    writeln!(out, "  extern int32_t {}[{}];", lut.name(order), lut.config().lut_size())?;
                }
            }
            writeln!(out, "#endif\n")?;
        }
        writeln!(out, "#endif /* {} */", guard)
    })
}

fn write_lut(out: &mut String, name: &str, values: ArrayView1<i32>) -> fmt::Result {
    writeln!(out, "int32_t {}[{}] = \n{{", name, values.len())?;
    let last = values.len().saturating_sub(1);
    for (i, v) in values.iter().enumerate() {
        if i == last {
            writeln!(out, "{:6}", v)?;
        } else {
            write!(out, "{:6},  ", v)?;
            if (i + 1) % LUT_VALUES_PER_LINE == 0 {
                out.push('\n');
            }
        }
    }
    out.push_str("};\n\n");
    Ok(())
}

/// `<basename>.c`: the K table of the largest frame size followed by every accumulator table
pub fn cic_source(basename: &str, tables: &[CicTables]) -> Result<String> {
    let largest = tables
        .iter()
        .max_by_key(|t| t.frame_bits)
        .ok_or_else(|| Error::config("no CIC tables to emit"))?;

    render(|out| {
        writeln!(out, "#include \"{}.h\"\n", basename)?;
        writeln!(out, "{} = \n{{ ", K_COEFFS_PROTO)?;
        let rows = largest.k.frame_bits();
        for lut in 1..=rows {
            let row: Vec<String> = largest.k.row(lut).iter().map(|v| v.to_string()).collect();
            write!(out, "    {{{}}}", row.join(", "))?;
            out.push_str(if lut < rows { ",\n" } else { "\n" });
        }
        out.push_str("};\n\n");

        for t in tables {
            writeln!(out, "#ifdef CIC_FRAME_SIZE_{}_USED", t.frame_bits)?;
            for lut in &t.luts {
                for order in 1..=t.order {
                    write_lut(out, &lut.name(order), lut.table(order))?;
                }
            }
            out.push_str("#endif\n\n");
        }
        Ok(())
    })
}

fn check_finite(weights: &WeightMatrix) -> Result<()> {
    for band in 0..weights.band_count() {
        if weights.band(band).iter().any(|x| !x.re.is_finite() || !x.im.is_finite()) {
            return Err(Error::NonFinite { band });
        }
    }
    Ok(())
}

fn write_complex_table(out: &mut String, vector: ArrayView1<Complex64>) -> fmt::Result {
    let n = vector.len();
    for (row, x) in vector.iter().enumerate() {
        if row % COEFFS_PER_LINE == 0 {
            out.push_str("  ");
        }
        write!(out, "{:+.10}f, {:+.10}f", x.re, x.im)?;
        if row + 1 < n {
            out.push_str(if (row + 1) % COEFFS_PER_LINE == 0 { ",\n" } else { ", " });
        }
    }
    Ok(())
}

/// `<NAME>_Coeff_t const <name>Coeff<mic>`
fn descriptor(name: &str, mic: usize) -> String {
    format!("{}_Coeff_t const {}Coeff{}", name.to_uppercase(), name.to_lowercase(), mic)
}

/// C source holding one interleaved (re, im) float array per mic plus its descriptor
pub fn beamformer_source(name: &str, config: &BeamformerConfig, weights: &WeightMatrix) -> Result<String> {
    check_finite(weights)?;
    let define = format!("USE_{}", config_label(name, config).to_uppercase());

    render(|out| {
        writeln!(out, "#ifdef {}\n", define)?;
        let mode = match config.mode {
            BeamformerMode::Sir => "SIR",
            BeamformerMode::Dma => "DMA",
        };
        writeln!(out, "// - type : {}", mode)?;
        writeln!(out, "// - freqHz : {}", config.sample_rate_hz)?;
        writeln!(out, "// - micsNb : {}", config.mic_count)?;
        writeln!(out, "// - micDist : {}", config.mic_spacing_mm)?;
        writeln!(out, "// - bandsNb : {}", config.band_count)?;
        if config.mode == BeamformerMode::Sir {
            writeln!(out, "// - source : {:?}", config.speech_angles)?;
            writeln!(out, "// - noise : {:?}", config.interference_angles)?;
            writeln!(out, "// - noiseStdDev : {}", config.noise_variance_floor)?;
        }
        out.push('\n');

        for mic in 0..weights.mic_count() {
            let channel = weights.channel(mic);
            let coef_name = format!("{}{}", name, mic);
            writeln!(out, "static const float {}[2 * {}] =\n{{", coef_name, channel.len())?;
            write_complex_table(out, channel)?;
            out.push_str("\n};\n\n");
            writeln!(out, "{} =\n{{", descriptor(name, mic))?;
            writeln!(out, "  .pCoeff = {},", coef_name)?;
            writeln!(out, "  .nbElements = {}", channel.len())?;
            out.push_str("};\n\n");
        }
        writeln!(out, "#endif /* {} */", define)
    })
}

/// Per-configuration header declaring the descriptors of [`beamformer_source`] and the
/// antenna used as reference
pub fn beamformer_header(name: &str, config: &BeamformerConfig) -> Result<String> {
    let label = config_label(name, config).to_uppercase();
    let guard = format!("__{}_H", label);
    let define = format!("USE_{}", label);

    render(|out| {
        writeln!(out, "#ifndef {}", guard)?;
        writeln!(out, "#define {}\n", guard)?;
        writeln!(out, "#ifdef {}", define)?;
        for mic in 0..config.mic_count {
            writeln!(out, "extern {};", descriptor(name, mic))?;
        }
        writeln!(out, "  #define {}_ANTENNA_ID {}", name.to_uppercase(), config.antenna_id)?;
        writeln!(out, "#endif /* {} */", define)?;
        writeln!(out, "\n#endif  /* {} */", guard)
    })
}

/// `<name>_cInclude.c`: pulls in the source of every configuration
pub fn beamformer_c_include(name: &str, configs: &[BeamformerConfig]) -> Result<String> {
    render(|out| {
        for config in configs {
            writeln!(out, "#include \"{}.c\"", config_label(name, config))?;
        }
        Ok(())
    })
}

/// `<name>_hInclude.h`: descriptor declarations, then the per-configuration headers for the
/// simulation build and a fixed reference antenna otherwise
pub fn beamformer_h_include(name: &str, configs: &[BeamformerConfig]) -> Result<String> {
    let mic_count = configs.iter().map(|c| c.mic_count).max().unwrap_or(0);
    render(|out| {
        writeln!(out, "#include \"{}_coef.h\"\n", name)?;
        for mic in 0..mic_count {
            writeln!(out, "extern {};", descriptor(name, mic))?;
        }
        writeln!(out, "#ifdef {}", SIMULATION_DEFINE)?;
        for config in configs {
            writeln!(out, "  #include \"{}.h\"", config_label(name, config))?;
        }
        writeln!(out, "#else // {}", SIMULATION_DEFINE)?;
        writeln!(out, "  #define {}_ANTENNA_ID 0U", name.to_uppercase())?;
        writeln!(out, "#endif // {}", SIMULATION_DEFINE)
    })
}

/// `{ "<mic>": { "<band>": [re, im] } }`
pub fn beamformer_json(weights: &WeightMatrix) -> Result<Value> {
    check_finite(weights)?;
    let mut mics = Map::new();
    for mic in 0..weights.mic_count() {
        let mut bands = Map::new();
        for (band, x) in weights.channel(mic).iter().enumerate() {
            bands.insert(band.to_string(), Value::from(vec![x.re, x.im]));
        }
        mics.insert(mic.to_string(), Value::Object(bands));
    }
    Ok(Value::Object(mics))
}
