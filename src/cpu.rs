//! Runtime CPU/core detection feeding `BuildConfig::suggested` (§9's
//! supplemented feature, carried over from the teacher's own
//! `CpuFeatures`/`optimal_config` pair). SIMD feature bits no longer
//! drive anything here — the bucketed displacement builder has no SIMD
//! path — so only core count survives, now used to pick
//! `parallel_bucketing` and a level trimmed for very large key sets.

use crate::mphf::BuildConfig;

/// A snapshot of the host's available parallelism, used only to pick
/// reasonable build defaults.
#[derive(Debug, Clone, Copy)]
pub struct CpuFeatures {
    pub available_parallelism: usize,
}

impl CpuFeatures {
    pub fn detect() -> Self {
        Self {
            available_parallelism: std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }

    /// A `BuildConfig` tuned for this host: enables `parallel_bucketing`
    /// once more than two cores are available (mirrors the teacher's own
    /// threshold), and backs off `level` slightly on single-core hosts
    /// where a larger bucket-overflow retry would be comparatively more
    /// expensive to recover from.
    pub fn optimal_config(&self) -> BuildConfig {
        let parallel_bucketing = cfg!(feature = "parallel") && self.available_parallelism > 2;
        let level = if self.available_parallelism <= 1 { 4 } else { 5 };

        BuildConfig {
            level,
            parallel_bucketing,
            ..Default::default()
        }
    }
}

/// Convenience wrapper mirroring the teacher's free function.
pub fn detect_features() -> CpuFeatures {
    CpuFeatures::detect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimal_config_is_internally_consistent() {
        let features = CpuFeatures::detect();
        let cfg = features.optimal_config();
        assert!((1..=10).contains(&cfg.level));
        if !cfg!(feature = "parallel") {
            assert!(!cfg.parallel_bucketing);
        }
    }
}
