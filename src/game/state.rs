//! World State
//!
//! Two concurrent indices over the entities of one match: occupants per
//! cell, in insertion order, and movables per session token.
//!
//! Invariant: an entity is listed in at most one cell and, if movable,
//! holds exactly one token slot while alive and attached.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;

use crate::core::position::Position;
use crate::game::entity::{Entity, MatchId};

/// Grid and token indices of a match.
pub struct WorldState {
    match_id: MatchId,
    cells: DashMap<Position, Vec<Arc<Entity>>>,
    movables: DashMap<String, Arc<Entity>>,
}

impl WorldState {
    /// Empty world owned by `match_id`.
    pub fn new(match_id: MatchId) -> Self {
        Self {
            match_id,
            cells: DashMap::new(),
            movables: DashMap::new(),
        }
    }

    /// Owning match.
    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    /// Attach an entity and index it.
    ///
    /// Movables without a token are placed on the grid but not indexed.
    /// Entities already bound to another match are refused.
    pub fn add_entity(&self, entity: Arc<Entity>) -> bool {
        if !entity.attach(self.match_id) {
            warn!("Refusing entity owned by another match");
            return false;
        }
        match entity.token() {
            Some("") => warn!("Movable at {} has no token, not indexing it", entity.position()),
            Some(token) => {
                self.movables.insert(token.to_string(), entity.clone());
            }
            None => {}
        }
        self.cells.entry(entity.position()).or_default().push(entity);
        true
    }

    /// Detach an entity. Returns `true` if it was alive, meaning a removal
    /// notification is due.
    ///
    /// No-op for entities that do not belong to this match.
    pub fn remove_entity(&self, entity: &Arc<Entity>) -> bool {
        if entity.owner() != Some(self.match_id) {
            return false;
        }
        self.detach_from_cell(entity, entity.position());
        let was_alive = entity.mark_dead();
        if let Some(token) = entity.token() {
            self.movables.remove_if(token, |_, e| Arc::ptr_eq(e, entity));
        }
        was_alive
    }

    /// Move an entity from its current cell to `to`.
    pub fn relocate(&self, entity: &Arc<Entity>, to: Position) {
        self.detach_from_cell(entity, entity.position());
        self.cells.entry(to).or_default().push(entity.clone());
        entity.set_position(to);
    }

    fn detach_from_cell(&self, entity: &Arc<Entity>, at: Position) {
        if let Some(mut list) = self.cells.get_mut(&at) {
            list.retain(|e| !Arc::ptr_eq(e, entity));
        }
        self.cells.remove_if(&at, |_, list| list.is_empty());
    }

    /// Copy of the occupants of `at`, in insertion order.
    pub fn entities_at(&self, at: Position) -> Vec<Arc<Entity>> {
        self.cells.get(&at).map(|list| list.clone()).unwrap_or_default()
    }

    /// First occupant of `at`.
    pub fn first_at(&self, at: Position) -> Option<Arc<Entity>> {
        self.cells.get(&at).and_then(|list| list.first().cloned())
    }

    /// Whether any entity occupies `at`.
    pub fn is_occupied(&self, at: Position) -> bool {
        self.cells.contains_key(&at)
    }

    /// Movable registered under `token`.
    pub fn movable(&self, token: &str) -> Option<Arc<Entity>> {
        self.movables.get(token).map(|e| e.value().clone())
    }

    /// All indexed movables, sorted by token.
    pub fn movables(&self) -> Vec<Arc<Entity>> {
        let mut all: Vec<Arc<Entity>> = self.movables.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.token().cmp(&b.token()));
        all
    }

    /// Every entity on the grid, row-major by cell.
    pub fn entities(&self) -> Vec<Arc<Entity>> {
        let mut cells: Vec<(Position, Vec<Arc<Entity>>)> =
            self.cells.iter().map(|c| (*c.key(), c.value().clone())).collect();
        cells.sort_by_key(|(p, _)| (p.y, p.x));
        cells.into_iter().flat_map(|(_, list)| list).collect()
    }

    /// One entry per entity for persistence: inert occupants row-major from
    /// the cells, then indexed movables by token.
    ///
    /// Movables are read from the token index rather than the cells, so one
    /// caught between cells by a concurrent `relocate` is still listed once.
    pub fn capture_entities(&self) -> Vec<Arc<Entity>> {
        let mut all: Vec<Arc<Entity>> = self
            .entities()
            .into_iter()
            .filter(|e| matches!(e.token(), None | Some("")))
            .collect();
        all.extend(self.movables().into_iter().filter(|e| e.is_alive()));
        all
    }

    /// Alive players still indexed.
    pub fn remaining_players(&self) -> Vec<Arc<Entity>> {
        self.movables()
            .into_iter()
            .filter(|e| e.is_player() && e.is_alive())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::tests::record;
    use uuid::Uuid;

    fn world() -> WorldState {
        WorldState::new(Uuid::new_v4())
    }

    #[test]
    fn test_add_and_query() {
        let w = world();
        let at = Position::new(3, 4);
        let food = Arc::new(Entity::food(at));
        let npc = Arc::new(Entity::npc(at, 1, "npc-1"));
        assert!(w.add_entity(food.clone()));
        assert!(w.add_entity(npc.clone()));

        let here = w.entities_at(at);
        assert_eq!(here.len(), 2);
        assert!(Arc::ptr_eq(&here[0], &food));
        assert!(Arc::ptr_eq(&w.first_at(at).unwrap(), &food));
        assert!(Arc::ptr_eq(&w.movable("npc-1").unwrap(), &npc));
        assert!(w.entities_at(Position::new(0, 0)).is_empty());
    }

    #[test]
    fn test_entities_at_is_a_copy() {
        let w = world();
        let at = Position::new(1, 1);
        w.add_entity(Arc::new(Entity::food(at)));
        let mut copy = w.entities_at(at);
        copy.clear();
        assert_eq!(w.entities_at(at).len(), 1);
    }

    #[test]
    fn test_remove() {
        let w = world();
        let at = Position::new(5, 5);
        let p = Arc::new(Entity::player(at, 1, "tok", record("ann", 0, 0)));
        w.add_entity(p.clone());

        assert!(w.remove_entity(&p));
        assert!(!p.is_alive());
        assert!(!w.is_occupied(at));
        assert!(w.movable("tok").is_none());
        assert!(!w.remove_entity(&p));
    }

    #[test]
    fn test_foreign_entity_ignored() {
        let (a, b) = (world(), world());
        let e = Arc::new(Entity::food(Position::new(2, 2)));
        a.add_entity(e.clone());
        assert!(!b.add_entity(e.clone()));
        assert!(!b.remove_entity(&e));
        assert!(e.is_alive());
        assert_eq!(a.entities_at(Position::new(2, 2)).len(), 1);
    }

    #[test]
    fn test_tokenless_movable_not_indexed() {
        let w = world();
        w.add_entity(Arc::new(Entity::npc(Position::new(0, 0), 1, "")));
        assert!(w.movables().is_empty());
        assert!(w.is_occupied(Position::new(0, 0)));
    }

    #[test]
    fn test_relocate() {
        let w = world();
        let from = Position::new(5, 5);
        let to = Position::new(5, 4);
        let p = Arc::new(Entity::player(from, 1, "tok", record("ann", 0, 0)));
        w.add_entity(p.clone());
        w.relocate(&p, to);
        assert!(!w.is_occupied(from));
        assert!(Arc::ptr_eq(&w.entities_at(to)[0], &p));
        assert_eq!(p.position(), to);
    }

    #[test]
    fn test_capture_lists_movables_once() {
        let w = world();
        let at = Position::new(5, 5);
        let p = Arc::new(Entity::player(at, 1, "tok", record("ann", 0, 0)));
        w.add_entity(Arc::new(Entity::food(Position::new(9, 9))));
        w.add_entity(p.clone());

        // A relocate interrupted after the push but before the detach.
        w.cells.entry(Position::new(5, 6)).or_default().push(p.clone());
        assert_eq!(w.entities().len(), 3);

        let captured = w.capture_entities();
        assert_eq!(captured.len(), 2);
        assert!(captured[0].token().is_none());
        assert!(Arc::ptr_eq(&captured[1], &p));
    }

    #[test]
    fn test_capture_during_relocation() {
        let w = Arc::new(world());
        let npc = Arc::new(Entity::npc(Position::new(0, 0), 1, "npc-1"));
        w.add_entity(npc.clone());
        std::thread::scope(|s| {
            let mover = w.clone();
            let npc = npc.clone();
            s.spawn(move || {
                for i in 0..500 {
                    mover.relocate(&npc, Position::new(i % 20, (i / 20) % 20));
                }
            });
            for _ in 0..500 {
                let movables = w.capture_entities().iter().filter(|e| e.token().is_some()).count();
                assert_eq!(movables, 1);
            }
        });
    }

    #[test]
    fn test_concurrent_adds() {
        let w = Arc::new(world());
        std::thread::scope(|s| {
            for t in 0..4 {
                let w = w.clone();
                s.spawn(move || {
                    for i in 0..50 {
                        let token = format!("npc-{t}-{i}");
                        w.add_entity(Arc::new(Entity::npc(Position::new(i % 20, t), 1, token)));
                    }
                });
            }
        });
        assert_eq!(w.movables().len(), 200);
        assert_eq!(w.entities().len(), 200);
    }
}
