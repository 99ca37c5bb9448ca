//! Lobby AI Population
//!
//! Decides how many computer-controlled players a public lobby should hold
//! and hands out their names, client IDs and join times. Everything here is
//! derived from the game ID, so any process recomputes the same roster.
//!
//! The pure functions form the policy; [`AiRoster`] is the per-session
//! bookkeeping that applies it on each population check.

use std::collections::HashSet;

use crate::config::AiPlayersConfig;
use crate::core::hash::simple_hash;
use crate::core::id::{ClientId, GameId};
use crate::core::rng::DeterministicRng;

/// Seed offset separating client ID draws from join delay draws.
const CLIENT_ID_SEED_OFFSET: u32 = 1000;

/// Minimum digit count in generated names.
const MIN_NAME_WIDTH: usize = 4;

// =============================================================================
// POPULATION ARITHMETIC
// =============================================================================

/// Total players the lobby should hold after `elapsed_sec`.
///
/// Ramps linearly from zero to `min(capacity, target_total_by_timeout)` over
/// `timeout_sec`. Zero if capacity or timeout is non-positive.
pub fn compute_target_total(
    capacity: i64,
    elapsed_sec: f64,
    timeout_sec: f64,
    target_total_by_timeout: i64,
) -> i64 {
    if capacity <= 0 || timeout_sec <= 0.0 {
        return 0;
    }
    let coef = (elapsed_sec / timeout_sec).clamp(0.0, 1.0);
    let ceiling = capacity.min(target_total_by_timeout).max(0);
    (ceiling as f64 * coef).floor() as i64
}

/// Largest bot count allowed right now.
///
/// Keeps `min_human_slots - humans` seats free (never negative) and caps the
/// rest at `ai_players_max`.
pub fn compute_max_ai_allowed(
    capacity: i64,
    min_human_slots: i64,
    humans: i64,
    ai_players_max: i64,
) -> i64 {
    let reserved = (min_human_slots - humans).max(0);
    (capacity - reserved).min(ai_players_max).max(0)
}

/// Bots needed to bring the lobby up to `target_total`.
///
/// Only ever adds; a lobby already above target asks for zero.
pub fn compute_desired_ai(humans: i64, target_total: i64, max_ai_allowed_now: i64) -> i64 {
    let required_total = humans.max(target_total);
    (required_total - humans).min(max_ai_allowed_now).max(0)
}

// =============================================================================
// NAMES
// =============================================================================

/// Result of a name allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiNameAllocation {
    /// Freshly allocated names, in allocation order.
    pub names: Vec<String>,
    /// Cursor to resume from on the next allocation.
    pub next_index: usize,
}

/// Digit width of generated names.
pub fn ai_name_width(config: &AiPlayersConfig) -> usize {
    let max_value = config.name.start as i64 + config.name.reserve as i64 - 1;
    max_value.max(0).to_string().len().max(MIN_NAME_WIDTH)
}

/// Name for the bot at `index` (offset from `name.start`).
pub fn format_ai_name(index: u32, config: &AiPlayersConfig) -> String {
    let raw = config.name.start as u64 + index as u64;
    let width = ai_name_width(config);
    format!("{}{:0width$}", config.name.prefix, raw, width = width)
}

/// Allocate up to `count` names sequentially from `start_index`.
///
/// Names already in `existing` are skipped. Stops early when the reserve runs
/// out; the caller gets fewer names, never an error.
pub fn allocate_ai_names(
    count: usize,
    existing: &HashSet<String>,
    start_index: usize,
    config: &AiPlayersConfig,
) -> AiNameAllocation {
    let mut taken = existing.clone();
    let mut names = Vec::with_capacity(count);
    let mut index = start_index;
    let reserve = config.name.reserve as usize;

    while names.len() < count && index < reserve {
        let name = format_ai_name(index as u32, config);
        index += 1;
        if taken.insert(name.clone()) {
            names.push(name);
        }
    }

    AiNameAllocation { names, next_index: index }
}

/// Deterministic permutation of `0..reserve` for `seed`.
pub fn shuffled_ai_name_indices(seed: &str, config: &AiPlayersConfig) -> Vec<u32> {
    let mut rng = DeterministicRng::new(simple_hash(seed));
    rng.shuffled((0..config.name.reserve).collect())
}

/// Allocate up to `count` names by walking `name_order` from `start_index`.
pub fn allocate_ai_names_from_order(
    count: usize,
    existing: &HashSet<String>,
    name_order: &[u32],
    start_index: usize,
    config: &AiPlayersConfig,
) -> AiNameAllocation {
    let mut taken = existing.clone();
    let mut names = Vec::with_capacity(count);
    let mut index = start_index;

    while names.len() < count && index < name_order.len() {
        let name = format_ai_name(name_order[index], config);
        index += 1;
        if taken.insert(name.clone()) {
            names.push(name);
        }
    }

    AiNameAllocation { names, next_index: index }
}

/// Deterministic permutation of `0..count` for `seed`.
pub fn deterministic_shuffle_indices(seed: &str, count: usize) -> Vec<usize> {
    let mut rng = DeterministicRng::new(simple_hash(seed));
    rng.shuffled((0..count).collect())
}

/// Whether `name` has the shape of a generated bot name.
pub fn is_ai_player_name(name: &str, config: &AiPlayersConfig) -> bool {
    match name.strip_prefix(config.name.prefix.as_str()) {
        Some(digits) => {
            digits.len() == ai_name_width(config) && digits.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

// =============================================================================
// JOIN TIMING / IDENTITY
// =============================================================================

/// Join delay for the `join_index`-th bot, within the jitter bounds.
///
/// Bounds are normalised first: negative `min` becomes 0 and `max` is raised
/// to `min`.
pub fn ai_join_delay_ms(seed: &str, join_index: u32, config: &AiPlayersConfig) -> u64 {
    let mut rng = DeterministicRng::new(simple_hash(seed).wrapping_add(join_index));
    let min = config.join_jitter_ms.min.max(0);
    let max = config.join_jitter_ms.max.max(min);
    rng.next_int(min, max + 1) as u64
}

/// Client ID for the `join_index`-th bot.
pub fn deterministic_ai_client_id(seed: &str, join_index: u32) -> ClientId {
    let seed = simple_hash(seed)
        .wrapping_add(join_index)
        .wrapping_add(CLIENT_ID_SEED_OFFSET);
    ClientId::from_rng(&mut DeterministicRng::new(seed))
}

// =============================================================================
// ROSTER
// =============================================================================

/// A bot seated in the lobby.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiPlayer {
    /// Deterministic client ID.
    pub client_id: ClientId,
    /// Display name.
    pub name: String,
    /// Epoch ms of the join.
    pub joined_at: u64,
}

/// A bot waiting for its jittered join time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAiPlayer {
    /// Deterministic client ID.
    pub client_id: ClientId,
    /// Display name.
    pub name: String,
    /// Epoch ms at which the bot may join.
    pub join_at: u64,
}

/// Lobby state a population check works from.
#[derive(Debug, Clone, Copy)]
pub struct LobbySnapshot {
    /// Current time, epoch ms.
    pub now_ms: u64,
    /// Lobby creation time, epoch ms.
    pub created_at: u64,
    /// Connected humans.
    pub humans: i64,
    /// Lobby size.
    pub capacity: i64,
    /// Ramp timeout in seconds.
    pub timeout_sec: f64,
}

/// Per-session bot bookkeeping.
#[derive(Debug, Clone)]
pub struct AiRoster {
    seed: String,
    name_order: Vec<u32>,
    next_order_index: usize,
    join_counter: u32,
    pending: Vec<PendingAiPlayer>,
    joined: Vec<AiPlayer>,
}

impl AiRoster {
    /// Empty roster whose names and timings derive from `game_id`.
    pub fn new(game_id: &GameId, config: &AiPlayersConfig) -> Self {
        let seed = game_id.as_str().to_owned();
        let name_order = shuffled_ai_name_indices(&seed, config);
        Self {
            seed,
            name_order,
            next_order_index: 0,
            join_counter: 0,
            pending: Vec::new(),
            joined: Vec::new(),
        }
    }

    /// Bots seated in the lobby, in join order.
    pub fn joined(&self) -> &[AiPlayer] {
        &self.joined
    }

    /// Bots queued but not yet seated.
    pub fn pending(&self) -> &[PendingAiPlayer] {
        &self.pending
    }

    /// Seated bot count.
    pub fn len(&self) -> usize {
        self.joined.len()
    }

    /// No bots seated.
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty()
    }

    /// Names of seated and queued bots.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.joined
            .iter()
            .map(|b| b.name.as_str())
            .chain(self.pending.iter().map(|b| b.name.as_str()))
    }

    /// Run one population check.
    ///
    /// Queues bots missing from the desired count, drops queued bots no
    /// longer wanted, and seats queued bots whose join time has come while
    /// seats remain. Returns the bots seated by this call. `reserved_names`
    /// holds names bots must not take (connected humans).
    pub fn update(
        &mut self,
        lobby: LobbySnapshot,
        reserved_names: &HashSet<String>,
        config: &AiPlayersConfig,
    ) -> Vec<AiPlayer> {
        let elapsed_sec = lobby.now_ms.saturating_sub(lobby.created_at) as f64 / 1000.0;
        let target = compute_target_total(
            lobby.capacity,
            elapsed_sec,
            lobby.timeout_sec,
            config.target_total_by_timeout,
        );
        let max_ai = compute_max_ai_allowed(
            lobby.capacity - lobby.humans,
            config.min_human_slots,
            lobby.humans,
            config.ai_players_max,
        );
        let desired = compute_desired_ai(lobby.humans, target, max_ai) as usize;

        let present = self.joined.len() + self.pending.len();
        if present > desired {
            // Seated bots stay; only queued ones are withdrawn
            let keep = desired.saturating_sub(self.joined.len());
            self.pending.truncate(keep);
        } else if present < desired {
            self.enqueue(desired - present, lobby.now_ms, reserved_names, config);
        }

        self.seat_due(lobby)
    }

    /// Remove the most recently seated bot to free a seat for a human.
    pub fn displace_latest(&mut self) -> Option<AiPlayer> {
        self.joined.pop()
    }

    /// Drop every queued bot. Used once the lobby locks.
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    fn enqueue(
        &mut self,
        missing: usize,
        now_ms: u64,
        reserved_names: &HashSet<String>,
        config: &AiPlayersConfig,
    ) {
        let mut existing: HashSet<String> = reserved_names.clone();
        existing.extend(self.names().map(str::to_owned));

        let allocation = allocate_ai_names_from_order(
            missing,
            &existing,
            &self.name_order,
            self.next_order_index,
            config,
        );
        self.next_order_index = allocation.next_index;

        for name in allocation.names {
            let index = self.join_counter;
            self.join_counter = self.join_counter.wrapping_add(1);
            self.pending.push(PendingAiPlayer {
                client_id: deterministic_ai_client_id(&self.seed, index),
                name,
                join_at: now_ms + ai_join_delay_ms(&self.seed, index, config),
            });
        }
    }

    fn seat_due(&mut self, lobby: LobbySnapshot) -> Vec<AiPlayer> {
        let mut seated = Vec::new();
        let mut i = 0;
        while i < self.pending.len() {
            let free = lobby.capacity - lobby.humans - self.joined.len() as i64;
            if free <= 0 {
                break;
            }
            if self.pending[i].join_at <= lobby.now_ms {
                let bot = self.pending.remove(i);
                let player = AiPlayer {
                    client_id: bot.client_id,
                    name: bot.name,
                    joined_at: lobby.now_ms,
                };
                self.joined.push(player.clone());
                seated.push(player);
            } else {
                i += 1;
            }
        }
        seated
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AiNameConfig, JitterConfig};
    use proptest::prelude::*;

    fn config_with_reserve(reserve: u32) -> AiPlayersConfig {
        AiPlayersConfig {
            enabled: true,
            name: AiNameConfig {
                prefix: "Anon".to_string(),
                start: 0,
                reserve,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_target_total_ramp() {
        assert_eq!(compute_target_total(50, 0.0, 60.0, 12), 0);
        assert_eq!(compute_target_total(50, 30.0, 60.0, 12), 6);
        assert_eq!(compute_target_total(50, 60.0, 60.0, 12), 12);
        assert_eq!(compute_target_total(50, 600.0, 60.0, 12), 12);
        // Capacity below target caps the ramp
        assert_eq!(compute_target_total(8, 60.0, 60.0, 12), 8);
    }

    #[test]
    fn test_target_total_degenerate_inputs() {
        assert_eq!(compute_target_total(0, 30.0, 60.0, 12), 0);
        assert_eq!(compute_target_total(-5, 30.0, 60.0, 12), 0);
        assert_eq!(compute_target_total(50, 30.0, 0.0, 12), 0);
        assert_eq!(compute_target_total(50, -10.0, 60.0, 12), 0);
    }

    #[test]
    fn test_max_ai_allowed_reserves_human_slots() {
        assert_eq!(compute_max_ai_allowed(10, 1, 0, 20), 9);
        assert_eq!(compute_max_ai_allowed(10, 1, 3, 20), 10);
        assert_eq!(compute_max_ai_allowed(10, 0, 0, 4), 4);
        assert_eq!(compute_max_ai_allowed(0, 2, 0, 20), 0);
    }

    #[test]
    fn test_desired_ai_never_evicts() {
        assert_eq!(compute_desired_ai(2, 10, 20), 8);
        assert_eq!(compute_desired_ai(12, 10, 20), 0);
        assert_eq!(compute_desired_ai(0, 10, 3), 3);
    }

    #[test]
    fn test_name_format_and_width() {
        let config = config_with_reserve(1000);
        assert_eq!(ai_name_width(&config), 4);
        assert_eq!(format_ai_name(7, &config), "Anon0007");

        let wide = AiPlayersConfig {
            name: AiNameConfig {
                prefix: "Bot".to_string(),
                start: 99_990,
                reserve: 20,
            },
            ..Default::default()
        };
        assert_eq!(ai_name_width(&wide), 6);
        assert_eq!(format_ai_name(0, &wide), "Bot099990");
    }

    #[test]
    fn test_allocate_exhausts_reserve() {
        let config = config_with_reserve(3);
        let result = allocate_ai_names(5, &HashSet::new(), 0, &config);
        assert_eq!(result.names.len(), 3);
        assert_eq!(result.next_index, 3);
    }

    #[test]
    fn test_allocate_skips_existing() {
        let config = config_with_reserve(1000);
        let existing: HashSet<String> = ["Anon0000".to_string(), "Anon0002".to_string()].into();
        let result = allocate_ai_names(2, &existing, 0, &config);
        assert_eq!(result.names, vec!["Anon0001", "Anon0003"]);
        assert_eq!(result.next_index, 4);
    }

    #[test]
    fn test_allocate_from_order() {
        let config = config_with_reserve(1000);
        let order = [5, 1, 9];
        let existing: HashSet<String> = ["Anon0001".to_string()].into();
        let result = allocate_ai_names_from_order(3, &existing, &order, 0, &config);
        assert_eq!(result.names, vec!["Anon0005", "Anon0009"]);
        assert_eq!(result.next_index, 3);
    }

    #[test]
    fn test_shuffled_indices_is_permutation() {
        let config = config_with_reserve(100);
        let mut order = shuffled_ai_name_indices("AbCd1234", &config);
        assert_eq!(order, shuffled_ai_name_indices("AbCd1234", &config));
        assert_ne!(order, shuffled_ai_name_indices("ZzZz9876", &config));
        order.sort_unstable();
        assert_eq!(order, (0..100).collect::<Vec<_>>());

        let mut plain = deterministic_shuffle_indices("AbCd1234", 10);
        plain.sort_unstable();
        assert_eq!(plain, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_is_ai_player_name() {
        let config = config_with_reserve(1000);
        assert!(is_ai_player_name("Anon0042", &config));
        assert!(!is_ai_player_name("Anon042", &config));
        assert!(!is_ai_player_name("Anon00420", &config));
        assert!(!is_ai_player_name("Anon00a2", &config));
        assert!(!is_ai_player_name("Player0042", &config));
    }

    #[test]
    fn test_join_delay_normalises_bounds() {
        let mut config = config_with_reserve(10);
        config.join_jitter_ms = JitterConfig { min: -50, max: -100 };
        assert_eq!(ai_join_delay_ms("AbCd1234", 0, &config), 0);

        config.join_jitter_ms = JitterConfig { min: 400, max: 100 };
        assert_eq!(ai_join_delay_ms("AbCd1234", 3, &config), 400);
    }

    #[test]
    fn test_client_ids_are_deterministic_and_distinct() {
        let a = deterministic_ai_client_id("AbCd1234", 0);
        assert_eq!(a, deterministic_ai_client_id("AbCd1234", 0));
        assert_ne!(a, deterministic_ai_client_id("AbCd1234", 1));
    }

    fn lobby(now_ms: u64, humans: i64, capacity: i64) -> LobbySnapshot {
        LobbySnapshot {
            now_ms,
            created_at: 0,
            humans,
            capacity,
            timeout_sec: 60.0,
        }
    }

    #[test]
    fn test_roster_ramps_and_seats_after_jitter() {
        let config = config_with_reserve(1000);
        let id = GameId::parse("AbCd1234").unwrap();
        let mut roster = AiRoster::new(&id, &config);

        // Nothing wanted at t=0
        assert!(roster.update(lobby(0, 0, 50), &HashSet::new(), &config).is_empty());
        assert!(roster.pending().is_empty());

        // Full ramp: 12 queued, none due yet (min jitter 300ms)
        let seated = roster.update(lobby(60_000, 0, 50), &HashSet::new(), &config);
        assert!(seated.is_empty());
        assert_eq!(roster.pending().len(), 12);

        // After max jitter everything is seated
        let seated = roster.update(lobby(61_600, 0, 50), &HashSet::new(), &config);
        assert_eq!(seated.len(), 12);
        assert_eq!(roster.len(), 12);

        let names: HashSet<&str> = roster.names().collect();
        assert_eq!(names.len(), 12);
    }

    #[test]
    fn test_roster_is_reproducible() {
        let config = config_with_reserve(1000);
        let id = GameId::parse("Repeat01").unwrap();
        let mut a = AiRoster::new(&id, &config);
        let mut b = AiRoster::new(&id, &config);
        for now in [30_000, 62_000] {
            a.update(lobby(now, 1, 20), &HashSet::new(), &config);
            b.update(lobby(now, 1, 20), &HashSet::new(), &config);
        }
        assert_eq!(a.joined(), b.joined());
    }

    #[test]
    fn test_roster_respects_capacity_and_human_slot() {
        let config = config_with_reserve(1000);
        let id = GameId::parse("Tiny0001").unwrap();
        let mut roster = AiRoster::new(&id, &config);

        roster.update(lobby(60_000, 0, 4), &HashSet::new(), &config);
        roster.update(lobby(70_000, 0, 4), &HashSet::new(), &config);
        // One seat held back for a human
        assert_eq!(roster.len(), 3);

        roster.update(lobby(80_000, 1, 4), &HashSet::new(), &config);
        assert_eq!(roster.len(), 3);
    }

    #[test]
    fn test_roster_skips_human_names() {
        let config = config_with_reserve(1000);
        let id = GameId::parse("Names001").unwrap();
        let first = AiRoster::new(&id, &config).name_order[0];
        let taken: HashSet<String> = [format_ai_name(first, &config)].into();

        let mut roster = AiRoster::new(&id, &config);
        roster.update(lobby(60_000, 0, 50), &taken, &config);
        assert!(roster.names().all(|n| !taken.contains(n)));
    }

    #[test]
    fn test_displace_latest() {
        let config = config_with_reserve(1000);
        let id = GameId::parse("Displace").unwrap();
        let mut roster = AiRoster::new(&id, &config);
        roster.update(lobby(60_000, 0, 50), &HashSet::new(), &config);
        roster.update(lobby(70_000, 0, 50), &HashSet::new(), &config);

        let last = roster.joined().last().cloned();
        assert_eq!(roster.displace_latest(), last);
        assert_eq!(roster.len(), 11);
    }

    proptest! {
        #[test]
        fn prop_target_total_monotone_and_bounded(
            capacity in -10i64..200,
            target in 0i64..100,
            timeout in 1.0f64..600.0,
            a in 0.0f64..1200.0,
            b in 0.0f64..1200.0,
        ) {
            let (early, late) = if a <= b { (a, b) } else { (b, a) };
            let t_early = compute_target_total(capacity, early, timeout, target);
            let t_late = compute_target_total(capacity, late, timeout, target);
            prop_assert!(t_early <= t_late);
            prop_assert!(t_late <= capacity.max(0).min(target));
            prop_assert!(t_early >= 0);
        }

        #[test]
        fn prop_desired_ai_within_bounds(
            humans in 0i64..100,
            target in 0i64..100,
            max_ai in 0i64..50,
        ) {
            let desired = compute_desired_ai(humans, target, max_ai);
            prop_assert!(desired >= 0);
            prop_assert!(desired <= max_ai);
            prop_assert!(humans + desired <= humans.max(target));
        }

        #[test]
        fn prop_allocated_names_unique(count in 0usize..50, reserve in 0u32..40) {
            let config = config_with_reserve(reserve);
            let result = allocate_ai_names(count, &HashSet::new(), 0, &config);
            let unique: HashSet<_> = result.names.iter().collect();
            prop_assert_eq!(unique.len(), result.names.len());
            prop_assert!(result.names.len() <= count.min(reserve as usize));
        }
    }
}
