//! Leveling Engine - experience ↔ level conversion
//!
//! A geometric curve: finishing level `L` costs `round(base * multiplier^(L-1))`
//! experience. The cumulative cost of a level is the sum of the *rounded*
//! per-level costs, so client and server agree on every threshold.
//!
//! ```text
//! level:     1    2    3    4    5
//! required: 100  115  132  152  175
//! reach L+1: 100  215  347  499  674
//! ```
//!
//! Everything here is pure. Experience is `i64` to match the stored BIGINT;
//! negative input is treated as 0. Sums run in `i128`, so the curve stays
//! exact up to [`LevelCurve::top_level`]: the configured cap, or the last
//! level whose threshold still fits in `i64` (266 for the default curve).

use serde::{Deserialize, Serialize};

/// Experience needed to finish level 1.
pub const BASE_EXPERIENCE: f64 = 100.0;
/// Growth factor applied per level.
pub const LEVEL_MULTIPLIER: f64 = 1.15;
/// Configured upper bound on levels. Keeps every loop in this module bounded.
pub const MAX_LEVEL: u32 = 1000;

/// Parameters of the level curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelCurve {
    pub base: f64,
    pub multiplier: f64,
    pub max_level: u32,
}

impl Default for LevelCurve {
    fn default() -> Self {
        Self {
            base: BASE_EXPERIENCE,
            multiplier: LEVEL_MULTIPLIER,
            max_level: MAX_LEVEL,
        }
    }
}

/// Level, progress and remaining experience for one experience total.
///
/// Serialized in the shape returned by the reward endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelProgress {
    pub level: u32,
    pub experience: i64,
    pub experience_to_next_level: i64,
    pub progress_percentage: f64,
}

impl LevelCurve {
    /// Same curve with a different level cap (at least 1).
    pub fn with_max_level(max_level: u32) -> Self {
        Self {
            max_level: max_level.max(1),
            ..Self::default()
        }
    }

    /// Highest level this curve can award: `max_level`, or lower when the
    /// threshold to reach a level no longer fits in `i64` experience.
    pub fn top_level(&self) -> u32 {
        let mut threshold = 0i128;
        for level in 1..self.max_level.max(1) {
            threshold = threshold.saturating_add(self.required_wide(level));
            if threshold > i64::MAX as i128 {
                return level;
            }
        }
        self.max_level.max(1)
    }

    /// Experience needed to complete `level`. Levels below 1 are treated as
    /// 1 and levels above [`top_level`](Self::top_level) as the top level.
    pub fn experience_required_for_level(&self, level: u32) -> i64 {
        let level = level.clamp(1, self.top_level());
        i64::try_from(self.required_wide(level)).unwrap_or(i64::MAX)
    }

    /// Total experience needed to reach `level + 1`, i.e. the sum of the
    /// requirements of levels `1..=level`. Level 0 costs nothing.
    pub fn cumulative_experience_for_level(&self, level: u32) -> i64 {
        let level = level.min(self.top_level());
        clamp_to_i64(self.cumulative_wide(level))
    }

    /// Level reached with `experience`. Saturates at the top level.
    pub fn level_from_experience(&self, experience: i64) -> u32 {
        let experience = experience.max(0) as i128;
        let mut threshold = 0i128;
        for level in 1..self.max_level.max(1) {
            threshold = threshold.saturating_add(self.required_wide(level));
            // a threshold past i64::MAX is out of reach, so this is the top
            if experience < threshold {
                return level;
            }
        }
        self.max_level.max(1)
    }

    /// Share of the current level's requirement already earned, in `[0, 100]`.
    pub fn level_progress_percentage(&self, experience: i64) -> f64 {
        let experience = experience.max(0);
        let level = self.level_from_experience(experience);
        let into_level = experience as i128 - self.cumulative_wide(level - 1);
        let required = self.required_wide(level);
        if required <= 0 {
            return 0.0;
        }
        (into_level as f64 / required as f64 * 100.0).clamp(0.0, 100.0)
    }

    /// Experience still missing before the next level. Never negative.
    pub fn experience_remaining_to_next_level(&self, experience: i64) -> i64 {
        let experience = experience.max(0);
        let level = self.level_from_experience(experience);
        let into_level = experience as i128 - self.cumulative_wide(level - 1);
        clamp_to_i64((self.required_wide(level) - into_level).max(0))
    }

    pub fn progress(&self, experience: i64) -> LevelProgress {
        let experience = experience.max(0);
        LevelProgress {
            level: self.level_from_experience(experience),
            experience,
            experience_to_next_level: self.experience_remaining_to_next_level(experience),
            progress_percentage: self.level_progress_percentage(experience),
        }
    }

    /// Number of levels crossed going from `before` to `after` experience.
    pub fn levels_gained(&self, before: i64, after: i64) -> u32 {
        self.level_from_experience(after)
            .saturating_sub(self.level_from_experience(before))
    }

    fn required_wide(&self, level: u32) -> i128 {
        let exponent = level.max(1) - 1;
        // `as` saturates far past anything below the top level
        (self.base * self.multiplier.powi(exponent as i32)).round() as i128
    }

    fn cumulative_wide(&self, level: u32) -> i128 {
        (1..=level).fold(0i128, |total, l| total.saturating_add(self.required_wide(l)))
    }
}

fn clamp_to_i64(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

// ============================================================================
// Default-curve shorthands
// ============================================================================

pub fn experience_required_for_level(level: u32) -> i64 {
    LevelCurve::default().experience_required_for_level(level)
}

pub fn cumulative_experience_for_level(level: u32) -> i64 {
    LevelCurve::default().cumulative_experience_for_level(level)
}

pub fn level_from_experience(experience: i64) -> u32 {
    LevelCurve::default().level_from_experience(experience)
}

pub fn level_progress_percentage(experience: i64) -> f64 {
    LevelCurve::default().level_progress_percentage(experience)
}

pub fn experience_remaining_to_next_level(experience: i64) -> i64 {
    LevelCurve::default().experience_remaining_to_next_level(experience)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_experience_first_levels() {
        assert_eq!(experience_required_for_level(1), 100);
        assert_eq!(experience_required_for_level(2), 115);
        assert_eq!(experience_required_for_level(3), 132); // 132.25
        assert_eq!(experience_required_for_level(4), 152); // 152.0875
        assert_eq!(experience_required_for_level(5), 175); // 174.900625
    }

    #[test]
    fn test_level_zero_treated_as_one() {
        assert_eq!(experience_required_for_level(0), 100);
    }

    #[test]
    fn test_cumulative_sums_rounded_requirements() {
        assert_eq!(cumulative_experience_for_level(0), 0);
        assert_eq!(cumulative_experience_for_level(1), 100);
        assert_eq!(cumulative_experience_for_level(2), 215);
        assert_eq!(cumulative_experience_for_level(3), 347);
        assert_eq!(cumulative_experience_for_level(4), 499);
    }

    #[test]
    fn test_level_boundaries() {
        assert_eq!(level_from_experience(0), 1);
        assert_eq!(level_from_experience(99), 1);
        assert_eq!(level_from_experience(100), 2);
        assert_eq!(level_from_experience(214), 2);
        assert_eq!(level_from_experience(215), 3);
    }

    #[test]
    fn test_negative_experience_is_level_one() {
        assert_eq!(level_from_experience(-50), 1);
        assert_eq!(level_progress_percentage(-50), 0.0);
        assert_eq!(experience_remaining_to_next_level(-50), 100);
    }

    #[test]
    fn test_progress_resets_at_boundary() {
        for level in 1..20 {
            let xp = cumulative_experience_for_level(level);
            assert_eq!(level_from_experience(xp), level + 1);
            assert_eq!(level_progress_percentage(xp), 0.0);
        }
    }

    #[test]
    fn test_quest_reward_scenario() {
        let p = LevelCurve::default().progress(120);
        assert_eq!(p.level, 2);
        assert_eq!(p.experience, 120);
        assert_eq!(p.experience_to_next_level, 95);
        assert!((p.progress_percentage - 17.391).abs() < 0.01, "got {}", p.progress_percentage);
    }

    #[test]
    fn test_level_saturates_at_cap() {
        let curve = LevelCurve::with_max_level(5);
        assert_eq!(curve.level_from_experience(i64::MAX), 5);
        assert_eq!(curve.level_progress_percentage(i64::MAX), 100.0);
        assert_eq!(curve.experience_remaining_to_next_level(i64::MAX), 0);
    }

    #[test]
    fn test_top_level_of_default_curve() {
        let curve = LevelCurve::default();
        assert_eq!(curve.top_level(), 266);
        assert_eq!(LevelCurve::with_max_level(40).top_level(), 40);

        for level in 1..curve.top_level() {
            assert!(
                curve.experience_required_for_level(level + 1)
                    > curve.experience_required_for_level(level),
                "requirement flat at level {}",
                level
            );
            assert!(
                curve.cumulative_experience_for_level(level)
                    > curve.cumulative_experience_for_level(level - 1)
            );
        }
    }

    #[test]
    fn test_largest_experience_stays_on_curve() {
        let curve = LevelCurve::default();
        let top = curve.top_level();
        let threshold = curve.cumulative_experience_for_level(top - 1);

        assert_eq!(curve.level_from_experience(threshold - 1), top - 1);
        assert_eq!(curve.level_from_experience(threshold), top);
        assert_eq!(curve.level_from_experience(i64::MAX - 1), top);
        assert_eq!(curve.level_from_experience(i64::MAX), top);

        let p = curve.progress(i64::MAX);
        assert_eq!(p.level, top);
        assert!(p.progress_percentage > 0.0 && p.progress_percentage < 100.0);
        assert_eq!(
            p.experience_to_next_level,
            curve.experience_required_for_level(top) - (i64::MAX - threshold)
        );
    }

    #[test]
    fn test_levels_above_top_use_top_requirement() {
        let curve = LevelCurve::default();
        let top = curve.top_level();
        assert_eq!(
            curve.experience_required_for_level(MAX_LEVEL),
            curve.experience_required_for_level(top)
        );
        assert_eq!(curve.cumulative_experience_for_level(MAX_LEVEL), i64::MAX);
    }

    #[test]
    fn test_cumulative_clamped_to_cap() {
        let curve = LevelCurve::with_max_level(3);
        assert_eq!(curve.cumulative_experience_for_level(10), 347);
    }

    #[test]
    fn test_levels_gained() {
        let curve = LevelCurve::default();
        assert_eq!(curve.levels_gained(0, 99), 0);
        assert_eq!(curve.levels_gained(0, 100), 1);
        assert_eq!(curve.levels_gained(90, 400), 2);
        assert_eq!(curve.levels_gained(400, 0), 0);
    }

    #[test]
    fn test_progress_json_shape() {
        let json = serde_json::to_value(LevelCurve::default().progress(120)).unwrap();
        assert_eq!(json["level"], 2);
        assert_eq!(json["experience"], 120);
        assert_eq!(json["experienceToNextLevel"], 95);
        assert!(json["progressPercentage"].is_number());
    }
}
