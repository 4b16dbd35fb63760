//! Scaled-exit state machine.
//!
//! Thresholds in R: 0.8 closes a quarter of what is left, 1.0 closes half of
//! what is left, 1.5 closes the rest. Each step fires at most once per trade,
//! and steps fire in ascending order, so a gap past several thresholds runs
//! every step it crossed.

use crate::models::{ExitConfig, ExitKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitStep {
    Partial25,
    Partial50,
    FullExit,
}

impl ExitStep {
    pub fn kind(&self) -> ExitKind {
        match self {
            ExitStep::Partial25 => ExitKind::Partial25,
            ExitStep::Partial50 => ExitKind::Partial50,
            ExitStep::FullExit => ExitKind::FullExit,
        }
    }

    /// Units to close out of `remaining`. Never zero while something is open.
    pub fn units_to_close(&self, remaining: u64) -> u64 {
        let units = match self {
            ExitStep::Partial25 => remaining / 4,
            ExitStep::Partial50 => remaining / 2,
            ExitStep::FullExit => remaining,
        };
        units.clamp(remaining.min(1), remaining)
    }
}

/// Monotonic exit flags. Once set, a flag is never cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitFlags {
    pub partial25: bool,
    pub partial50: bool,
    pub full_exit: bool,
}

impl ExitFlags {
    pub fn is_set(&self, step: ExitStep) -> bool {
        match step {
            ExitStep::Partial25 => self.partial25,
            ExitStep::Partial50 => self.partial50,
            ExitStep::FullExit => self.full_exit,
        }
    }

    /// Marks only `step` done.
    pub fn mark(&mut self, step: ExitStep) {
        match step {
            ExitStep::FullExit => self.full_exit = true,
            ExitStep::Partial50 => self.partial50 = true,
            ExitStep::Partial25 => self.partial25 = true,
        }
    }
}

/// Lowest step whose threshold `r` has reached and which has not fired yet.
pub fn next_step(flags: &ExitFlags, r: f64, cfg: &ExitConfig) -> Option<ExitStep> {
    if !r.is_finite() {
        return None;
    }
    [
        (ExitStep::Partial25, cfg.partial25_r),
        (ExitStep::Partial50, cfg.partial50_r),
        (ExitStep::FullExit, cfg.full_exit_r),
    ]
    .into_iter()
    .find(|(step, threshold)| r >= *threshold && !flags.is_set(*step))
    .map(|(step, _)| step)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds() {
        let cfg = ExitConfig::default();
        let flags = ExitFlags::default();
        assert_eq!(next_step(&flags, 0.79, &cfg), None);
        assert_eq!(next_step(&flags, 0.8, &cfg), Some(ExitStep::Partial25));
        assert_eq!(next_step(&flags, 1.0, &cfg), Some(ExitStep::Partial25));
        assert_eq!(next_step(&flags, 1.7, &cfg), Some(ExitStep::Partial25));
        assert_eq!(next_step(&flags, f64::NAN, &cfg), None);
    }

    #[test]
    fn test_flags_are_monotonic() {
        let cfg = ExitConfig::default();
        let mut flags = ExitFlags::default();

        flags.mark(ExitStep::Partial25);
        assert_eq!(next_step(&flags, 0.9, &cfg), None);
        assert_eq!(next_step(&flags, 1.1, &cfg), Some(ExitStep::Partial50));

        flags.mark(ExitStep::Partial50);
        // Falling back below a threshold and rising again never repeats it.
        assert_eq!(next_step(&flags, 0.9, &cfg), None);
        assert_eq!(next_step(&flags, 1.2, &cfg), None);
        assert_eq!(next_step(&flags, 1.5, &cfg), Some(ExitStep::FullExit));
    }

    #[test]
    fn test_gap_walks_every_crossed_step() {
        let cfg = ExitConfig::default();
        let mut flags = ExitFlags::default();
        let mut fired = Vec::new();
        while let Some(step) = next_step(&flags, 1.7, &cfg) {
            flags.mark(step);
            fired.push(step);
        }
        assert_eq!(
            fired,
            vec![ExitStep::Partial25, ExitStep::Partial50, ExitStep::FullExit]
        );
    }

    #[test]
    fn test_mark_sets_only_the_given_step() {
        let mut flags = ExitFlags::default();
        flags.mark(ExitStep::Partial50);
        assert!(!flags.partial25);
        assert!(flags.partial50);
        assert!(!flags.full_exit);
    }

    #[test]
    fn test_units_to_close() {
        assert_eq!(ExitStep::Partial25.units_to_close(1_000), 250);
        assert_eq!(ExitStep::Partial50.units_to_close(750), 375);
        assert_eq!(ExitStep::FullExit.units_to_close(375), 375);
        assert_eq!(ExitStep::Partial25.units_to_close(3), 1);
        assert_eq!(ExitStep::Partial25.units_to_close(0), 0);
    }
}
