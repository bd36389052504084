//! Fresh Match Creation
//!
//! Seeds a new grid with food and mines, then drops every admitted player
//! on a distinct free cell at level 1.

use std::collections::HashSet;
use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};

use crate::bus::MessageBus;
use crate::core::city::Cities;
use crate::core::crypto::MatchCipher;
use crate::core::position::Position;
use crate::game::engine::{Match, MatchError, MatchSettings};
use crate::game::entity::Entity;
use crate::network::TokenMap;
use crate::players::PlayerDirectory;

/// Chance that a cell gets food.
pub const FOOD_PROBABILITY: f64 = 0.2;
/// Chance that a cell without food gets a mine.
pub const MINE_PROBABILITY: f64 = 0.15;

/// Build a match for the players behind `tokens`.
///
/// Tokens whose player has since left the directory are skipped.
pub fn create_fresh_match<R: Rng>(
    tokens: &TokenMap,
    directory: &PlayerDirectory,
    cities: Cities,
    cipher: MatchCipher,
    bus: Arc<dyn MessageBus>,
    settings: MatchSettings,
    rng: &mut R,
) -> Result<Arc<Match>, MatchError> {
    let game = Match::new(cities, cipher, bus, settings);
    let mut used = HashSet::new();

    for position in Position::all() {
        if rng.gen_bool(FOOD_PROBABILITY) {
            game.world().add_entity(Arc::new(Entity::food(position)));
            used.insert(position);
        } else if rng.gen_bool(MINE_PROBABILITY) {
            game.world().add_entity(Arc::new(Entity::mine(position)));
            used.insert(position);
        }
    }

    let mut admitted: Vec<(&String, &uuid::Uuid)> = tokens.iter().collect();
    admitted.sort();
    for (token, id) in admitted {
        let Some(record) = directory.by_id(id) else {
            warn!("Token {} was issued to unknown player {}", token, id);
            continue;
        };
        let mut free: Vec<Position> = Position::all().filter(|p| !used.contains(p)).collect();
        if free.is_empty() {
            return Err(MatchError::NoFreeCell(record.alias.clone()));
        }
        let position = free.swap_remove(rng.gen_range(0..free.len()));
        used.insert(position);
        game.world().add_entity(Arc::new(Entity::player(position, 1, token.clone(), record)));
    }

    info!(
        "Created match with {} elements and {} players",
        game.world().entities().len(),
        game.world().remaining_players().len()
    );
    Ok(game)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalBus;
    use crate::game::entity::EntityKind;
    use crate::players::PlayerRecord;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use uuid::Uuid;

    fn setup(players: usize) -> (PlayerDirectory, TokenMap) {
        let directory = PlayerDirectory::in_memory();
        let mut tokens = TokenMap::new();
        for i in 0..players {
            let id = Uuid::new_v4();
            directory.insert(PlayerRecord {
                id,
                alias: format!("p{i}"),
                password: "pw".into(),
                hot_effect: 0,
                cold_effect: 0,
            });
            tokens.insert(format!("tok-{i}"), id);
        }
        (directory, tokens)
    }

    fn create(tokens: &TokenMap, directory: &PlayerDirectory, seed: u64) -> Result<Arc<Match>, MatchError> {
        create_fresh_match(
            tokens,
            directory,
            Cities::default(),
            MatchCipher::from_secret("s").unwrap(),
            Arc::new(LocalBus::new()),
            MatchSettings::default(),
            &mut StdRng::seed_from_u64(seed),
        )
    }

    #[test]
    fn test_players_on_distinct_free_cells() {
        let (directory, tokens) = setup(3);
        let game = create(&tokens, &directory, 7).unwrap();

        let players = game.world().remaining_players();
        assert_eq!(players.len(), 3);
        for p in &players {
            assert_eq!(p.level(), Some(1));
            assert_eq!(game.world().entities_at(p.position()).len(), 1);
        }
        let cells: HashSet<Position> = players.iter().map(|p| p.position()).collect();
        assert_eq!(cells.len(), 3);
    }

    #[test]
    fn test_grid_density() {
        let (directory, tokens) = setup(0);
        let game = create(&tokens, &directory, 42).unwrap();
        let entities = game.world().entities();
        let food = entities.iter().filter(|e| matches!(e.kind(), EntityKind::Food)).count();
        let mines = entities.iter().filter(|e| matches!(e.kind(), EntityKind::Mine)).count();
        // 400 cells: expect about 80 food and 48 mines.
        assert!((40..130).contains(&food), "food = {food}");
        assert!((15..90).contains(&mines), "mines = {mines}");
        for p in Position::all() {
            assert!(game.world().entities_at(p).len() <= 1);
        }
    }

    #[test]
    fn test_same_seed_same_grid() {
        let (directory, tokens) = setup(2);
        let a = create(&tokens, &directory, 3).unwrap();
        let b = create(&tokens, &directory, 3).unwrap();
        assert_eq!(a.snapshot().map, b.snapshot().map);
    }

    #[test]
    fn test_unknown_player_skipped() {
        let (directory, mut tokens) = setup(1);
        tokens.insert("tok-ghost".into(), Uuid::new_v4());
        let game = create(&tokens, &directory, 1).unwrap();
        assert_eq!(game.world().remaining_players().len(), 1);
        assert!(game.world().movable("tok-ghost").is_none());
    }
}
