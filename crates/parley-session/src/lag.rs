//! Round-trip lag history and the latency recommendation.
//!
//! Samples live in a ring of [`LagSampler::CAPACITY`] slots indexed by
//! sample number. The slot the next sample will land in is "being written"
//! and is left out of every statistic, so the numbers always describe the
//! previous 63 round trips. Slots that have never been written hold zero
//! and do count toward the mean, which keeps early estimates low instead of
//! jumpy.

use parley_protocol::SampleNumber;

/// Statistics handed to observers after each recorded sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LagSnapshot {
    pub sample: SampleNumber,
    pub latest: u64,
    pub mean: u64,
    pub standard_deviation: u64,
    pub recommended_latency: u64,
}

/// Fixed ring of round-trip durations, in ticks.
#[derive(Debug, Clone)]
pub struct LagSampler {
    samples: [u64; Self::CAPACITY],
    cursor: usize,
    recorded: u64,
}

impl Default for LagSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl LagSampler {
    pub const CAPACITY: usize = 64;

    /// Recommendations snap to this many ticks.
    pub const LATENCY_STEP: u64 = 6;

    pub fn new() -> Self {
        Self {
            samples: [0; Self::CAPACITY],
            cursor: 0,
            recorded: 0,
        }
    }

    /// Stores the round trip of `sample` and moves the write cursor past it.
    pub fn record(&mut self, sample: SampleNumber, ticks: u64) {
        let slot = Self::slot(sample);
        self.samples[slot] = ticks;
        self.cursor = (slot + 1) % Self::CAPACITY;
        self.recorded += 1;
    }

    /// Mean of every slot except the one being written, rounded to the
    /// nearest tick. Zero before anything has been recorded.
    pub fn mean(&self) -> u64 {
        if self.recorded == 0 {
            return 0;
        }
        let sum: u64 = self.history().sum();
        round(sum as f64 / (Self::CAPACITY - 1) as f64)
    }

    /// Integer square root of the variance around `mean`, over the same
    /// slots `mean` uses.
    pub fn standard_deviation(&self, mean: u64) -> u64 {
        if self.recorded == 0 {
            return 0;
        }
        let squares: f64 = self
            .history()
            .map(|s| {
                let d = s as f64 - mean as f64;
                d * d
            })
            .sum();
        let variance = round(squares / (Self::CAPACITY - 1) as f64);
        variance.isqrt()
    }

    /// Largest sample that is both positive and no greater than
    /// `threshold`, or 0 if none qualifies.
    pub fn highest_below(&self, threshold: u64) -> u64 {
        self.history()
            .filter(|&s| s > 0 && s <= threshold)
            .max()
            .unwrap_or(0)
    }

    /// Suggested input latency: the worst "typical" round trip (within one
    /// standard deviation above the mean), moved up to the next multiple of
    /// [`Self::LATENCY_STEP`].
    pub fn recommended_latency(&self) -> u64 {
        let mean = self.mean();
        let ceiling = mean + self.standard_deviation(mean);
        let highest = self.highest_below(ceiling);
        highest + Self::LATENCY_STEP - highest % Self::LATENCY_STEP
    }

    pub fn snapshot(&self, sample: SampleNumber) -> LagSnapshot {
        let mean = self.mean();
        LagSnapshot {
            sample,
            latest: self.samples[Self::slot(sample)],
            mean,
            standard_deviation: self.standard_deviation(mean),
            recommended_latency: self.recommended_latency(),
        }
    }

    /// The 63 historical slots, oldest first, for drawing a lag graph.
    pub fn chronological(&self) -> impl Iterator<Item = u64> + '_ {
        (1..Self::CAPACITY).map(move |offset| self.samples[(self.cursor + offset) % Self::CAPACITY])
    }

    pub fn recorded(&self) -> u64 {
        self.recorded
    }

    fn history(&self) -> impl Iterator<Item = u64> + '_ {
        self.samples
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != self.cursor)
            .map(|(_, &s)| s)
    }

    fn slot(sample: SampleNumber) -> usize {
        sample.0 as usize % Self::CAPACITY
    }
}

fn round(value: f64) -> u64 {
    (value + 0.5).floor().max(0.0) as u64
}
