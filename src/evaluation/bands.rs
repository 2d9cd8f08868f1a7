/// Initial best HPWL of every band; any real layout beats it.
pub const HPWL_SENTINEL: f64 = 1e6;

/// Scores below this count as zero overlap.
pub const ZERO_OVERLAP_EPSILON: f64 = 1e-6;

/// One overlap-tolerance regime under which a best layout is tracked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapBand {
    /// Human-readable name used in the evaluation log.
    pub label: &'static str,
    /// Prefix of the board files written when the band improves.
    pub file_prefix: &'static str,
    pub bound: f64,
}

impl OverlapBand {
    pub const ZERO: OverlapBand = OverlapBand {
        label: "Zero overlap",
        file_prefix: "best_hpwl_zero_overlap",
        bound: 0.0,
    };
    pub const TEN_PERCENT: OverlapBand = OverlapBand {
        label: "10% overlap",
        file_prefix: "best_hpwl_10_overlap",
        bound: 0.1,
    };
    pub const TWENTY_PERCENT: OverlapBand = OverlapBand {
        label: "20% overlap",
        file_prefix: "best_hpwl_20_overlap",
        bound: 0.2,
    };

    /// Whether a layout with this overlap score competes in the band.
    pub fn admits(&self, overlap: f64) -> bool {
        if self.bound <= 0.0 {
            overlap < ZERO_OVERLAP_EPSILON
        } else {
            overlap <= self.bound
        }
    }
}

/// A band whose best HPWL improved on the observed step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandRecord {
    pub band: OverlapBand,
    pub hpwl: f64,
}

/// Best HPWL per band, evaluated strictest band first.
#[derive(Debug, Clone)]
pub struct BestLayoutBands {
    bands: Vec<(OverlapBand, f64)>,
}

impl BestLayoutBands {
    /// The three standard bands: zero, 10% and 20% overlap.
    pub fn new() -> Self {
        Self::with_bands(&[
            OverlapBand::ZERO,
            OverlapBand::TEN_PERCENT,
            OverlapBand::TWENTY_PERCENT,
        ])
    }

    pub fn with_bands(bands: &[OverlapBand]) -> Self {
        let mut bands: Vec<(OverlapBand, f64)> =
            bands.iter().map(|&b| (b, HPWL_SENTINEL)).collect();
        bands.sort_by(|a, b| a.0.bound.total_cmp(&b.0.bound));
        BestLayoutBands { bands }
    }

    /// Offer one step's layout. Returns every band it improved, strictest
    /// first; a band only changes when the HPWL is strictly better and the
    /// overlap score is within its bound.
    pub fn observe(&mut self, hpwl: f64, overlap: f64) -> Vec<BandRecord> {
        let mut improved = Vec::new();
        for (band, best) in &mut self.bands {
            if hpwl < *best && band.admits(overlap) {
                *best = hpwl;
                improved.push(BandRecord { band: *band, hpwl });
            }
        }
        improved
    }

    pub fn best(&self, band: &OverlapBand) -> Option<f64> {
        self.bands
            .iter()
            .find(|(b, _)| b == band)
            .map(|&(_, best)| best)
    }
}

impl Default for BestLayoutBands {
    fn default() -> Self {
        Self::new()
    }
}
