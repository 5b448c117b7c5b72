use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest frame size accepted; tables hold 2^frame_bits entries per order
pub const MAX_FRAME_BITS: usize = 24;
/// Largest cascade accepted
pub const MAX_CIC_ORDER: usize = 32;

/// Order in which the bits of a LUT index are replayed through the integrators
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitOrder {
    MsbFirst,
    LsbFirst,
}

impl BitOrder {
    /// Suffix used in generated table names
    pub fn suffix(&self) -> &'static str {
        match self {
            BitOrder::MsbFirst => "Msb",
            BitOrder::LsbFirst => "Lsb",
        }
    }

    /// Zero when no bit of a frame_bits wide index can be addressed
    fn first_mask(&self, frame_bits: usize) -> usize {
        match self {
            BitOrder::MsbFirst => u32::try_from(frame_bits)
                .ok()
                .and_then(|bits| bits.checked_sub(1))
                .and_then(|shift| 1usize.checked_shl(shift))
                .unwrap_or(0),
            BitOrder::LsbFirst => 1,
        }
    }

    fn next_mask(&self, mask: usize) -> usize {
        match self {
            BitOrder::MsbFirst => mask >> 1,
            BitOrder::LsbFirst => mask << 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CicConfig {
    pub order: usize,
    pub frame_bits: usize,
    pub bit_order: BitOrder,
}

impl CicConfig {
    pub fn new(order: usize, frame_bits: usize, bit_order: BitOrder) -> Result<Self> {
        let config = Self { order, frame_bits, bit_order };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_dimensions(self.frame_bits, self.order)?;
        let bound = accumulator_bound(self.frame_bits, self.order);
        if bound > i32::MAX as u128 {
            return Err(Error::OverflowRisk {
                frame_bits: self.frame_bits,
                order: self.order,
                bound,
            });
        }
        Ok(())
    }

    /// Number of entries in each accumulator table
    pub fn lut_size(&self) -> usize {
        1 << self.frame_bits
    }
}

fn validate_dimensions(frame_bits: usize, order: usize) -> Result<()> {
    if frame_bits == 0 || frame_bits > MAX_FRAME_BITS {
        return Err(Error::config(format!(
            "frame_bits must be in 1..={}, got {}",
            MAX_FRAME_BITS, frame_bits
        )));
    }
    if order == 0 || order > MAX_CIC_ORDER {
        return Err(Error::config(format!(
            "CIC order must be in 1..={}, got {}",
            MAX_CIC_ORDER, order
        )));
    }
    Ok(())
}

/// Worst case magnitude of the order-th accumulator after frame_bits samples of the same sign
///
/// A constant +1 (or -1) input drives stage k to C(frame_bits + k - 1, k), which is the largest
/// value any bit pattern can reach.
pub fn accumulator_bound(frame_bits: usize, order: usize) -> u128 {
    num_integer::binomial((frame_bits + order - 1) as u128, order as u128)
}

/// A group of tables to generate: every frame size in every bit order, all sharing one order
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CicDesign {
    pub order: usize,
    pub frame_sizes: Vec<usize>,
    pub bit_orders: Vec<BitOrder>,
}

impl Default for CicDesign {
    fn default() -> Self {
        Self {
            order: 5,
            frame_sizes: vec![8],
            bit_orders: vec![BitOrder::LsbFirst, BitOrder::MsbFirst],
        }
    }
}

impl CicDesign {
    /// Expand into one validated config per (frame size, bit order)
    pub fn configs(&self) -> Result<Vec<CicConfig>> {
        if self.frame_sizes.is_empty() || self.bit_orders.is_empty() {
            return Err(Error::config("CIC design needs at least one frame size and one bit order"));
        }
        let mut configs = Vec::with_capacity(self.frame_sizes.len() * self.bit_orders.len());
        for &frame_bits in &self.frame_sizes {
            for &bit_order in &self.bit_orders {
                configs.push(CicConfig::new(self.order, frame_bits, bit_order)?);
            }
        }
        Ok(configs)
    }

    pub fn max_frame_size(&self) -> usize {
        self.frame_sizes.iter().copied().max().unwrap_or(0)
    }
}

/// Integrator carry coefficients, rows are frame lengths 1..=frame_bits and columns are orders
/// 1..=order
///
/// K[lut][order] = K[lut-1][order] + K[lut][order-1] with the first row and the first column
/// seeded to 1, so K[lut][order] == C(lut + order - 2, order - 1). K[n][m+1] is the weight with
/// which an integrator m stages upstream feeds forward over an n-sample frame.
#[derive(Clone, Debug, PartialEq)]
pub struct KCoefficientTable {
    k: Array2<i32>,
}

impl KCoefficientTable {
    /// K coefficient for a 1-based (lut, order) pair
    pub fn get(&self, lut: usize, order: usize) -> i32 {
        self.k[[lut - 1, order - 1]]
    }

    /// All orders for a 1-based lut index
    pub fn row(&self, lut: usize) -> ArrayView1<'_, i32> {
        self.k.row(lut - 1)
    }

    pub fn frame_bits(&self) -> usize {
        self.k.dim().0
    }

    pub fn order(&self) -> usize {
        self.k.dim().1
    }

    pub fn as_array(&self) -> &Array2<i32> {
        &self.k
    }

    /// Render as a markdown table, one line per frame length
    pub fn to_markdown(&self) -> String {
        let order = self.order();
        let mut out = String::from("| Number of Bits |");
        for o in 1..=order {
            out.push_str(&format!(" CIC Order {} |", o));
        }
        out.push('\n');
        out.push_str(&"|---".repeat(order + 1));
        out.push_str("|\n");
        for lut in 1..=self.frame_bits() {
            out.push_str(&format!("| {} |", lut));
            for o in 1..=order {
                out.push_str(&format!(" {} |", self.get(lut, o)));
            }
            out.push('\n');
        }
        out
    }
}

pub fn compute_k_coefficients(frame_bits: usize, order: usize) -> Result<KCoefficientTable> {
    // Same sizing rules as the accumulator tables; K never exceeds the accumulator bound
    CicConfig::new(order, frame_bits, BitOrder::LsbFirst)?;

    let mut k = Array2::<i32>::ones((frame_bits, order));
    for lut in 1..frame_bits {
        for o in 1..order {
            k[[lut, o]] = k[[lut - 1, o]] + k[[lut, o - 1]];
        }
    }
    log::debug!("computed K coefficients for frame_bits={} order={}", frame_bits, order);
    Ok(KCoefficientTable { k })
}

/// Per-order accumulator tables for one frame size and bit order
#[derive(Clone, Debug, PartialEq)]
pub struct AccumulatorLut {
    config: CicConfig,
    // shape (order, 2^frame_bits)
    tables: Array2<i32>,
}

impl AccumulatorLut {
    pub fn config(&self) -> &CicConfig {
        &self.config
    }

    /// Table for a 1-based order
    pub fn table(&self, order: usize) -> ArrayView1<'_, i32> {
        self.tables.row(order - 1)
    }

    pub fn get(&self, order: usize, index: usize) -> i32 {
        self.tables[[order - 1, index]]
    }

    /// Name of the generated table, e.g. lookUpAcc3_FrameSize8Msb
    pub fn name(&self, order: usize) -> String {
        format!(
            "lookUpAcc{}_FrameSize{}{}",
            order,
            self.config.frame_bits,
            self.config.bit_order.suffix()
        )
    }
}

/// Replay the bits of `index` through the integrator cascade of a validated config,
/// returning every stage
pub(crate) fn replay_bits(index: usize, config: &CicConfig) -> Array1<i32> {
    let bit_order = config.bit_order;
    let mut acc = Array1::<i32>::zeros(config.order);
    let mut mask = bit_order.first_mask(config.frame_bits);
    for _ in 0..config.frame_bits {
        let mut x = if index & mask != 0 { 1 } else { -1 };
        for stage in 0..config.order {
            acc[stage] += x;
            x = acc[stage];
        }
        mask = bit_order.next_mask(mask);
    }
    acc
}

pub fn compute_accumulator_lut(frame_bits: usize, order: usize, bit_order: BitOrder) -> Result<AccumulatorLut> {
    let config = CicConfig::new(order, frame_bits, bit_order)?;
    Ok(build_accumulator_lut(config))
}

fn build_accumulator_lut(config: CicConfig) -> AccumulatorLut {
    let lut_size = config.lut_size();
    let mut tables = Array2::<i32>::zeros((config.order, lut_size));
    for index in 0..lut_size {
        let acc = replay_bits(index, &config);
        tables.column_mut(index).assign(&acc);
    }
    log::debug!(
        "computed {} accumulator tables of {} entries ({:?})",
        config.order,
        lut_size,
        config.bit_order
    );
    AccumulatorLut { config, tables }
}

/// Everything generated for one frame size: the K table plus one accumulator set per bit order
#[derive(Clone, Debug)]
pub struct CicTables {
    pub frame_bits: usize,
    pub order: usize,
    pub k: KCoefficientTable,
    pub luts: Vec<AccumulatorLut>,
}

/// Build the tables for every frame size of a design, in frame size order
pub fn build_design(design: &CicDesign) -> Result<Vec<CicTables>> {
    let configs = design.configs()?;
    let mut result = Vec::with_capacity(design.frame_sizes.len());
    for &frame_bits in &design.frame_sizes {
        let k = compute_k_coefficients(frame_bits, design.order)?;
        let luts = configs
            .iter()
            .filter(|c| c.frame_bits == frame_bits)
            .map(|c| build_accumulator_lut(*c))
            .collect();
        result.push(CicTables { frame_bits, order: design.order, k, luts });
    }
    Ok(result)
}

/// Bit-serial cascade of integrators fed with bipolar (+1/-1) samples
pub struct CicIntegrator {
    integrator: Vec<i32>,
}

impl CicIntegrator {
    pub fn new(order: usize) -> Self {
        Self { integrator: vec![0; order] }
    }

    pub fn integrate(&mut self, bit: bool) -> i32 {
        let mut x = if bit { 1 } else { -1 };
        for stage in 0..self.integrator.len() {
            self.integrator[stage] = self.integrator[stage].overflowing_add(x).0;
            x = self.integrator[stage];
        }
        x
    }

    /// Push one frame of bits, in the order given by bit_order
    pub fn push_frame(&mut self, frame: usize, frame_bits: usize, bit_order: BitOrder) -> Result<()> {
        if frame_bits == 0 || frame_bits > MAX_FRAME_BITS {
            return Err(Error::config(format!(
                "frame_bits must be in 1..={}, got {}",
                MAX_FRAME_BITS, frame_bits
            )));
        }
        let mut mask = bit_order.first_mask(frame_bits);
        for _ in 0..frame_bits {
            self.integrate(frame & mask != 0);
            mask = bit_order.next_mask(mask);
        }
        Ok(())
    }

    pub fn state(&self) -> &[i32] {
        &self.integrator
    }
}

/// Integrator cascade that advances a whole frame per step through the accumulator tables
pub struct FrameIntegrator<'a> {
    lut: &'a AccumulatorLut,
    carry: ArrayView1<'a, i32>,
    sum: Vec<i32>,
}

impl<'a> FrameIntegrator<'a> {
    pub fn new(lut: &'a AccumulatorLut, k: &'a KCoefficientTable) -> Result<Self> {
        let config = lut.config();
        if k.frame_bits() < config.frame_bits || k.order() < config.order {
            return Err(Error::config(format!(
                "K table ({}x{}) is too small for frame_bits={} order={}",
                k.frame_bits(),
                k.order(),
                config.frame_bits,
                config.order
            )));
        }
        Ok(Self {
            lut,
            carry: k.row(config.frame_bits),
            sum: vec![0; config.order],
        })
    }

    /// Bits of `frame` above the table's frame size are ignored
    pub fn push_frame(&mut self, frame: usize) {
        let frame = frame & (self.lut.config().lut_size() - 1);
        let order = self.sum.len();
        // Highest stage first so lower stages still hold the previous frame's state
        for stage in (0..order).rev() {
            let mut x = self.lut.get(stage + 1, frame);
            for upstream in 0..=stage {
                x = x.overflowing_add(self.carry[stage - upstream].overflowing_mul(self.sum[upstream]).0).0;
            }
            self.sum[stage] = x;
        }
    }

    pub fn state(&self) -> &[i32] {
        &self.sum
    }
}
