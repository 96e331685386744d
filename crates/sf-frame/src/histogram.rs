//! Monitor histogram filling.
//!
//! One [`HistogramAccumulator`] is filled per partition; partition results are
//! merged in partition order and finished into a [`MonitorHistogram`].

use sf_core::{Error, FlowPolicy, HistogramBinning, MonitorHistogram, Result};

/// Partially filled monitor histogram.
#[derive(Debug, Clone)]
pub struct HistogramAccumulator {
    name: String,
    column: String,
    checkpoint: String,
    binning: HistogramBinning,
    policy: FlowPolicy,
    edges: Vec<f64>,
    bin_content: Vec<f64>,
    underflow: f64,
    overflow: f64,
    entries: u64,
}

impl HistogramAccumulator {
    /// Empty accumulator for the given booking.
    pub fn new(
        name: impl Into<String>,
        column: impl Into<String>,
        checkpoint: impl Into<String>,
        binning: HistogramBinning,
        policy: FlowPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            checkpoint: checkpoint.into(),
            edges: binning.edges(),
            bin_content: vec![0.0; binning.bins],
            binning,
            policy,
            underflow: 0.0,
            overflow: 0.0,
            entries: 0,
        }
    }

    /// Histogram name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Monitored column.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Add one value with unit weight. NaN values are skipped.
    pub fn fill(&mut self, val: f64) -> Result<()> {
        if val.is_nan() {
            return Ok(());
        }
        let n_bins = self.bin_content.len();
        let out_of_range = if val < self.binning.low {
            self.underflow += 1.0;
            Some(0)
        } else if val >= self.binning.high {
            self.overflow += 1.0;
            Some(n_bins - 1)
        } else {
            None
        };

        match (out_of_range, self.policy) {
            (None, _) => {
                // Rounded edges may leave a gap just below `high`.
                let b = find_bin(&self.edges, val).unwrap_or(n_bins - 1);
                self.bin_content[b] += 1.0;
                self.entries += 1;
            }
            (Some(b), FlowPolicy::Fold) => {
                self.bin_content[b] += 1.0;
                self.entries += 1;
            }
            (Some(_), FlowPolicy::Drop) => {}
            (Some(_), FlowPolicy::Error) => {
                return Err(Error::Validation(format!(
                    "value {val} of '{}' outside histogram range [{}, {}) (histogram '{}')",
                    self.column, self.binning.low, self.binning.high, self.name
                )));
            }
        }
        Ok(())
    }

    /// Add every value of a slice.
    pub fn fill_all(&mut self, values: &[f64]) -> Result<()> {
        values.iter().try_for_each(|&v| self.fill(v))
    }

    /// Add the contents of another accumulator with identical binning.
    pub fn merge(&mut self, other: &HistogramAccumulator) -> Result<()> {
        if self.binning != other.binning || self.name != other.name {
            return Err(Error::Validation(format!(
                "cannot merge histogram '{}' into '{}'",
                other.name, self.name
            )));
        }
        for (a, b) in self.bin_content.iter_mut().zip(&other.bin_content) {
            *a += b;
        }
        self.underflow += other.underflow;
        self.overflow += other.overflow;
        self.entries += other.entries;
        Ok(())
    }

    /// Final histogram.
    pub fn finish(self) -> MonitorHistogram {
        MonitorHistogram {
            name: self.name,
            column: self.column,
            checkpoint: self.checkpoint,
            binning: self.binning,
            flow_policy: self.policy,
            bin_content: self.bin_content,
            underflow: self.underflow,
            overflow: self.overflow,
            entries: self.entries,
        }
    }
}

/// Find the bin index for a value given sorted bin edges.
///
/// Returns `None` for underflow/overflow.
fn find_bin(edges: &[f64], val: f64) -> Option<usize> {
    if val < edges[0] || val >= edges[edges.len() - 1] {
        return None;
    }
    match edges.binary_search_by(|e| e.total_cmp(&val)) {
        Ok(i) => Some(i.min(edges.len() - 2)),
        Err(i) => Some(i - 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn acc(policy: FlowPolicy) -> HistogramAccumulator {
        HistogramAccumulator::new("MET_pt_Initial", "MET_pt", "Initial", HistogramBinning::new(4, 0.0, 100.0).unwrap(), policy)
    }

    #[test]
    fn find_bin_edges() {
        let edges = [0.0, 1.0, 2.0, 3.0];
        assert_eq!(find_bin(&edges, 0.0), Some(0));
        assert_eq!(find_bin(&edges, 0.5), Some(0));
        assert_eq!(find_bin(&edges, 1.0), Some(1));
        assert_eq!(find_bin(&edges, 2.99), Some(2));
        assert_eq!(find_bin(&edges, 3.0), None);
        assert_eq!(find_bin(&edges, -0.1), None);
    }

    #[test]
    fn fold_clips_into_edge_bins() {
        let mut h = acc(FlowPolicy::Fold);
        h.fill_all(&[-5.0, 10.0, 60.0, 100.0, 250.0]).unwrap();
        let h = h.finish();
        assert_eq!(h.bin_content, vec![2.0, 0.0, 1.0, 2.0]);
        assert_relative_eq!(h.underflow, 1.0);
        assert_relative_eq!(h.overflow, 2.0);
        assert_eq!(h.entries, 5);
        assert_relative_eq!(h.integral(), 5.0);
    }

    #[test]
    fn value_below_high_past_rounded_last_edge_lands_in_last_bin() {
        let binning = HistogramBinning::new(3, 2.39, 6.04).unwrap();
        for policy in [FlowPolicy::Fold, FlowPolicy::Drop, FlowPolicy::Error] {
            let mut h = HistogramAccumulator::new("x_Initial", "x", "Initial", binning, policy);
            h.fill(6.039999999999999).unwrap();
            let h = h.finish();
            assert_eq!(h.entries, 1);
            assert_eq!(h.bin_content, vec![0.0, 0.0, 1.0]);
            assert_relative_eq!(h.underflow + h.overflow, 0.0);
        }
    }

    #[test]
    fn drop_keeps_flow_out_of_bins() {
        let mut h = acc(FlowPolicy::Drop);
        h.fill_all(&[-5.0, 10.0, 250.0]).unwrap();
        let h = h.finish();
        assert_eq!(h.bin_content, vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(h.entries, 1);
        assert_relative_eq!(h.underflow + h.overflow, 2.0);
    }

    #[test]
    fn error_policy_fails_on_flow() {
        let mut h = acc(FlowPolicy::Error);
        h.fill(50.0).unwrap();
        let err = h.fill(100.0).unwrap_err();
        assert!(err.to_string().contains("outside histogram range"));
    }

    #[test]
    fn nan_is_skipped() {
        let mut h = acc(FlowPolicy::Error);
        h.fill(f64::NAN).unwrap();
        assert_eq!(h.finish().entries, 0);
    }

    #[test]
    fn merge_sums_contents() {
        let mut a = acc(FlowPolicy::Fold);
        let mut b = acc(FlowPolicy::Fold);
        a.fill_all(&[10.0, 30.0]).unwrap();
        b.fill_all(&[30.0, 500.0]).unwrap();
        a.merge(&b).unwrap();
        let h = a.finish();
        assert_eq!(h.bin_content, vec![1.0, 2.0, 0.0, 1.0]);
        assert_eq!(h.entries, 4);

        let mut c = acc(FlowPolicy::Fold);
        let other = HistogramAccumulator::new("x", "x", "Initial", HistogramBinning::default(), FlowPolicy::Fold);
        assert!(c.merge(&other).is_err());
    }
}
