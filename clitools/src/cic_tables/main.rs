/** Generate the K coefficient table and the accumulator lookup tables used by LUT driven CIC
decimators, as C source (<basename>_conf.h, <basename>.h, <basename>.c) */
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use coeffgen_dsp::cic::{build_design, compute_k_coefficients, BitOrder, CicDesign};
use coeffgen_dsp::emit;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BitOrderArg {
    Msb,
    Lsb,
}

impl From<BitOrderArg> for BitOrder {
    fn from(arg: BitOrderArg) -> Self {
        match arg {
            BitOrderArg::Msb => BitOrder::MsbFirst,
            BitOrderArg::Lsb => BitOrder::LsbFirst,
        }
    }
}

#[derive(Parser, Debug)]
#[command(about = "CIC lookup table generator")]
struct Args {
    /// JSON file with a CIC design ({"order", "frame_sizes", "bit_orders"})
    #[arg(long)]
    config: Option<PathBuf>,

    /// CIC order
    #[arg(long)]
    order: Option<usize>,

    /// Number of PDM bits folded into one table entry (repeatable)
    #[arg(long = "frame-size")]
    frame_sizes: Vec<usize>,

    /// Bit order(s) to generate (repeatable)
    #[arg(long = "bit-order", value_enum)]
    bit_orders: Vec<BitOrderArg>,

    #[arg(long, default_value = "cic_design")]
    basename: String,

    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Print the K table as markdown instead of writing files
    #[arg(long)]
    markdown: bool,

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

fn load_design(args: &Args) -> Result<CicDesign> {
    let mut design = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => CicDesign::default(),
    };
    if let Some(order) = args.order {
        design.order = order;
    }
    if !args.frame_sizes.is_empty() {
        design.frame_sizes = args.frame_sizes.clone();
    }
    if !args.bit_orders.is_empty() {
        design.bit_orders = args.bit_orders.iter().map(|&b| b.into()).collect();
    }
    Ok(design)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(args.verbose);
    let design = load_design(&args)?;

    if args.markdown {
        let k = compute_k_coefficients(design.max_frame_size(), design.order)?;
        print!("{}", k.to_markdown());
        return Ok(());
    }

    let tables = build_design(&design)?;
    fs::create_dir_all(&args.out_dir).with_context(|| format!("creating {}", args.out_dir.display()))?;

    let files = [
        (format!("{}_conf.h", args.basename), emit::cic_conf_header(&args.basename, &design)?),
        (format!("{}.h", args.basename), emit::cic_header(&args.basename, &tables)?),
        (format!("{}.c", args.basename), emit::cic_source(&args.basename, &tables)?),
    ];
    for (name, text) in files {
        let path = args.out_dir.join(name);
        fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
        log::info!("wrote {}", path.display());
    }
    for t in &tables {
        for lut in &t.luts {
            log::info!(
                "frame size {} ({}): {} tables of {} entries",
                t.frame_bits,
                lut.config().bit_order.suffix(),
                t.order,
                lut.config().lut_size()
            );
        }
    }
    Ok(())
}
