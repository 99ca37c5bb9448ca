//! Single-Player Missions
//!
//! Each mission level maps to a reproducible map, seed and nation difficulty
//! spread. Bumping [`MISSION_SEED_VERSION`] invalidates every mission at once.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use super::config::Difficulty;
use super::map::GameMapType;
use crate::core::hash::fnv1a_32;
use crate::core::rng::DeterministicRng;

/// Version tag mixed into every mission seed.
pub const MISSION_SEED_VERSION: &str = "spm:v1";

/// Mission generation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MissionError {
    /// No candidate maps.
    #[error("mission map list is empty")]
    EmptyMapList,
}

/// Nations per difficulty tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionTierCounts {
    /// Easy nations.
    pub easy: usize,
    /// Medium nations.
    pub medium: usize,
    /// Hard nations.
    pub hard: usize,
    /// Impossible nations.
    pub impossible: usize,
}

impl MissionTierCounts {
    /// Total nations covered.
    pub fn total(&self) -> usize {
        self.easy + self.medium + self.hard + self.impossible
    }
}

/// Levels per extra nation in each tier. Zero disables the tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierDivisors {
    /// Medium tier divisor.
    pub medium: u32,
    /// Hard tier divisor.
    pub hard: u32,
    /// Impossible tier divisor.
    pub impossible: u32,
}

impl Default for TierDivisors {
    fn default() -> Self {
        Self {
            medium: 1,
            hard: 10,
            impossible: 50,
        }
    }
}

/// A fully derived mission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionPlan {
    /// Normalised level.
    pub level: u32,
    /// Selected map.
    pub map: GameMapType,
    /// Versioned mission seed.
    pub seed: u32,
    /// Nations per tier.
    pub counts: MissionTierCounts,
    /// Difficulty per nation index.
    pub difficulties: Vec<Difficulty>,
}

/// Clamp a client-supplied level; anything below 1 becomes 1.
pub fn normalize_mission_level(raw: i64) -> u32 {
    raw.clamp(1, u32::MAX as i64) as u32
}

/// Seed for `map` at `level`.
pub fn derive_mission_seed(map: GameMapType, level: u32) -> u32 {
    fnv1a_32(&format!("{MISSION_SEED_VERSION}:{}:{level}", map.as_str()))
}

/// Map for `level`, cycling through `maps` from smallest to largest.
///
/// Ties on player count are broken by map identifier.
pub fn select_mission_map(level: u32, maps: &[GameMapType]) -> Result<GameMapType, MissionError> {
    if maps.is_empty() {
        return Err(MissionError::EmptyMapList);
    }
    let mut sorted = maps.to_vec();
    sorted.sort_by(|a, b| {
        a.max_players()
            .cmp(&b.max_players())
            .then_with(|| a.as_str().cmp(b.as_str()))
    });
    let index = (level as i64 - 1).rem_euclid(sorted.len() as i64) as usize;
    Ok(sorted[index])
}

/// Split `nation_count` nations into tiers for `level`.
///
/// Tiers fill hardest first; whatever is left is easy.
pub fn compute_tier_counts(level: u32, nation_count: usize, divisors: TierDivisors) -> MissionTierCounts {
    let per_tier = |divisor: u32| -> usize {
        if divisor == 0 {
            0
        } else {
            (level / divisor) as usize
        }
    };

    let mut remaining = nation_count;
    let impossible = remaining.min(per_tier(divisors.impossible));
    remaining -= impossible;
    let hard = remaining.min(per_tier(divisors.hard));
    remaining -= hard;
    let medium = remaining.min(per_tier(divisors.medium));
    remaining -= medium;

    MissionTierCounts {
        easy: remaining,
        medium,
        hard,
        impossible,
    }
}

/// Difficulty per nation index, placing tiers over a shuffled order.
///
/// Counts beyond `nation_count` are ignored.
pub fn assign_nation_difficulties(
    nation_count: usize,
    counts: &MissionTierCounts,
    rng: &mut DeterministicRng,
) -> Vec<Difficulty> {
    let order = rng.shuffled((0..nation_count).collect::<Vec<_>>());
    let mut difficulties = vec![Difficulty::Easy; nation_count];
    let tiers = [
        (Difficulty::Impossible, counts.impossible),
        (Difficulty::Hard, counts.hard),
        (Difficulty::Medium, counts.medium),
    ];

    let mut slots = order.into_iter();
    for (difficulty, count) in tiers {
        for index in slots.by_ref().take(count) {
            difficulties[index] = difficulty;
        }
    }
    difficulties
}

/// Derive the whole mission for `level`.
pub fn generate_mission(
    level: u32,
    maps: &[GameMapType],
    nation_count: usize,
) -> Result<MissionPlan, MissionError> {
    let level = level.max(1);
    let map = select_mission_map(level, maps)?;
    let seed = derive_mission_seed(map, level);
    let counts = compute_tier_counts(level, nation_count, TierDivisors::default());
    let mut rng = DeterministicRng::new(seed);
    let difficulties = assign_nation_difficulties(nation_count, &counts, &mut rng);

    Ok(MissionPlan {
        level,
        map,
        seed,
        counts,
        difficulties,
    })
}

// =============================================================================
// TESTS
// =============================================================================
