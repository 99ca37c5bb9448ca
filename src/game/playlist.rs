//! Public Game Playlist
//!
//! Source of configurations for auto-created public lobbies. Maps are drawn
//! from a weighted bag that is reshuffled whenever it runs dry, so every map
//! comes up in proportion to its weight and the rotation is reproducible
//! from the seed. The same map is never drawn twice in a row.

use super::config::{Difficulty, GameConfig, GameMapSize, GameMode, GameType, MAX_BOTS};
use super::map::GameMapType;
use crate::core::rng::DeterministicRng;

/// Rotation weights. Maps not listed never appear in public rotation.
const MAP_WEIGHTS: &[(GameMapType, u32)] = &[
    (GameMapType::World, 4),
    (GameMapType::Europe, 3),
    (GameMapType::NorthAmerica, 2),
    (GameMapType::SouthAmerica, 1),
    (GameMapType::Asia, 2),
    (GameMapType::Africa, 2),
    (GameMapType::Australia, 1),
    (GameMapType::Oceania, 1),
    (GameMapType::Britannia, 1),
    (GameMapType::BlackSea, 1),
    (GameMapType::Mena, 1),
    (GameMapType::EastAsia, 1),
    (GameMapType::Japan, 1),
    (GameMapType::Iceland, 1),
    (GameMapType::Italia, 1),
    (GameMapType::Pangaea, 1),
    (GameMapType::Mars, 1),
    (GameMapType::BetweenTwoSeas, 1),
    (GameMapType::FaroeIslands, 1),
    (GameMapType::GatewayToTheAtlantic, 1),
    (GameMapType::FalklandIslands, 1),
    (GameMapType::Baikal, 1),
    (GameMapType::Halkidiki, 1),
    (GameMapType::StraitOfGibraltar, 1),
];

/// Endless rotation of public game configurations.
#[derive(Debug, Clone)]
pub struct MapPlaylist {
    rng: DeterministicRng,
    bag: Vec<GameMapType>,
    last: Option<GameMapType>,
    ffa_only: bool,
}

impl MapPlaylist {
    /// Create a playlist. `ffa_only` keeps every game free-for-all.
    pub fn new(seed: u32, ffa_only: bool) -> Self {
        Self {
            rng: DeterministicRng::new(seed),
            bag: Vec::new(),
            last: None,
            ffa_only,
        }
    }

    /// Seeded from a random v4 uuid.
    pub fn from_entropy(ffa_only: bool) -> Self {
        let seed = uuid::Uuid::new_v4().as_u128() as u32;
        Self::new(seed, ffa_only)
    }

    /// Next map in rotation.
    pub fn next_map(&mut self) -> GameMapType {
        let last = self.last;
        if !self.bag.iter().any(|&m| Some(m) != last) {
            self.refill();
        }
        // Nearest entry that differs from the previous draw
        let pick = self.bag.iter().rposition(|&m| Some(m) != last);
        let map = match pick {
            Some(pos) => self.bag.remove(pos),
            None => GameMapType::World,
        };
        self.last = Some(map);
        map
    }

    /// Next public game configuration.
    pub fn game_config(&mut self) -> GameConfig {
        let map = self.next_map();
        let counts = map.player_counts();
        let max_players = counts[self.rng.next_index(counts.len())];
        let game_mode = if self.ffa_only || self.rng.next_index(4) != 0 {
            GameMode::Ffa
        } else {
            GameMode::Team
        };

        GameConfig {
            game_map: map,
            game_type: GameType::Public,
            game_map_size: GameMapSize::Normal,
            difficulty: Difficulty::Medium,
            game_mode,
            player_teams: (game_mode == GameMode::Team).then_some(2),
            bots: MAX_BOTS,
            max_players: Some(max_players),
            ..GameConfig::default()
        }
    }

    /// Add a fresh shuffled set beneath whatever is left.
    fn refill(&mut self) {
        let mut bag: Vec<GameMapType> = MAP_WEIGHTS
            .iter()
            .flat_map(|&(map, weight)| std::iter::repeat(map).take(weight as usize))
            .collect();
        self.rng.shuffle(&mut bag);
        bag.append(&mut self.bag);
        self.bag = bag;
    }
}
