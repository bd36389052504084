//! Match Engine
//!
//! Owns the world of one match and drives it from bus traffic:
//!
//! 1. A dedicated consumer thread polls movement, keep-alive and NPC
//!    join records and applies them.
//! 2. Periodic tasks on the runtime broadcast the map, ping, persist and
//!    watch for disconnects.
//! 3. NPC admissions run as delayed runtime tasks.
//!
//! All three touch the world concurrently; the world's indices and the
//! entity atomics are the only shared mutable state.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use rand::Rng;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bus::{topics, BusConsumer, BusRecord, MessageBus};
use crate::core::city::Cities;
use crate::core::crypto::MatchCipher;
use crate::core::position::Position;
use crate::game::collision::{interact, Interaction};
use crate::game::entity::Entity;
use crate::game::events::{notify, split_token_message, Direction, JoinRequest};
use crate::game::map::render_map;
use crate::game::snapshot::{ElementSnapshot, MatchSnapshot, SecretSnapshot, SnapshotError};
use crate::game::state::WorldState;
use crate::game::tasks;
use crate::players::PlayerDirectory;
use crate::GRID_SIZE;

/// Bus poll timeout of the consumer loop.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// Delay before a requested NPC is admitted.
pub const NPC_ADMISSION_DELAY: Duration = Duration::from_millis(500);

/// Per-match settings.
#[derive(Debug, Clone)]
pub struct MatchSettings {
    /// Recovery snapshot location.
    pub snapshot_path: PathBuf,
    /// Snapshot persistence period.
    pub save_period: Duration,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("latestGame.json"),
            save_period: Duration::from_millis(17),
        }
    }
}

/// Engine errors.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// `start` was called outside a Tokio runtime.
    #[error("no Tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    /// The match was already started.
    #[error("match already started")]
    AlreadyStarted,

    /// No free cell is left for an admitted player.
    #[error("no free cell left for player {0}")]
    NoFreeCell(String),

    /// The consumer thread could not be spawned.
    #[error("could not spawn consumer thread: {0}")]
    Thread(#[from] std::io::Error),
}

/// One running match.
pub struct Match {
    world: WorldState,
    cities: Cities,
    cipher: MatchCipher,
    bus: Arc<dyn MessageBus>,
    settings: MatchSettings,
    runtime: OnceLock<Handle>,
    running: AtomicBool,
    finished: AtomicBool,
    done_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    snapshot_lock: Mutex<()>,
}

impl Match {
    /// Create an empty match.
    pub fn new(
        cities: Cities,
        cipher: MatchCipher,
        bus: Arc<dyn MessageBus>,
        settings: MatchSettings,
    ) -> Arc<Self> {
        let (done_tx, _) = watch::channel(false);
        let id = Uuid::new_v4();
        info!("Match {} created (cipher {})", id, cipher.fingerprint());
        Arc::new(Self {
            world: WorldState::new(id),
            cities,
            cipher,
            bus,
            settings,
            runtime: OnceLock::new(),
            running: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            done_tx,
            tasks: Mutex::new(Vec::new()),
            snapshot_lock: Mutex::new(()),
        })
    }

    /// Rebuild a match from a recovery snapshot.
    pub fn restore(
        snapshot: &MatchSnapshot,
        directory: &PlayerDirectory,
        bus: Arc<dyn MessageBus>,
        settings: MatchSettings,
    ) -> Result<Arc<Self>, SnapshotError> {
        let parts = snapshot.restore(directory)?;
        let game = Self::new(parts.cities, parts.cipher, bus, settings);
        for entity in parts.entities {
            game.world.add_entity(entity);
        }
        info!("Restored {} elements from snapshot", game.world.entities().len());
        Ok(game)
    }

    /// World indices.
    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// The four cities.
    pub fn cities(&self) -> &Cities {
        &self.cities
    }

    /// Broadcast cipher.
    pub fn cipher(&self) -> &MatchCipher {
        &self.cipher
    }

    /// Settings.
    pub fn settings(&self) -> &MatchSettings {
        &self.settings
    }

    /// Whether the match accepts moves.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether the match has ended.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Resolves once the match has finished.
    pub async fn finished(&self) {
        let mut rx = self.done_tx.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    pub(crate) fn publish(&self, topic: &str, value: &str) {
        if let Err(e) = self.bus.publish(topic, value) {
            warn!("Could not publish on {}: {}", topic, e);
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start the periodic tasks and the consumer thread.
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn start(self: &Arc<Self>) -> Result<std::thread::JoinHandle<()>, MatchError> {
        let runtime = Handle::try_current()?;
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(MatchError::AlreadyStarted);
        }
        let _ = self.runtime.set(runtime);

        let now = now_ms();
        for movable in self.world.movables() {
            if let Some(state) = movable.movable() {
                state.touch(now);
            }
        }

        let handles = tasks::spawn_periodic_tasks(self);
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).extend(handles);

        let consumer = self
            .bus
            .subscribe(&[topics::MOVEMENT, topics::MOVABLE_KEEP_ALIVE, topics::NPC_JOIN_LEAVE]);
        let game = self.clone();
        let thread = std::thread::Builder::new()
            .name("match-consumer".into())
            .spawn(move || game.run_consumer(consumer))?;

        info!("Match started with {} players", self.world.remaining_players().len());
        Ok(thread)
    }

    fn run_consumer(self: Arc<Self>, mut consumer: Box<dyn BusConsumer>) {
        while !self.is_finished() {
            match consumer.poll(POLL_TIMEOUT) {
                Ok(batch) => {
                    for record in batch {
                        self.handle_record(&record);
                    }
                }
                Err(e) => {
                    error!("Bus consumer failed: {}", e);
                    break;
                }
            }
        }
        debug!("Consumer loop exited");
    }

    /// Dispatch one bus record.
    ///
    /// A movement record also counts as a keep-alive for its sender.
    pub fn handle_record(self: &Arc<Self>, record: &BusRecord) {
        match record.topic.as_str() {
            topics::NPC_JOIN_LEAVE => {
                if record.value.starts_with("join") {
                    self.schedule_npc(record.value.clone());
                }
            }
            topics::MOVEMENT | topics::MOVABLE_KEEP_ALIVE => {
                let Some((token, arg)) = split_token_message(&record.value) else {
                    warn!("Malformed message on {}: {}", record.topic, record.value);
                    return;
                };
                let Some(entity) = self.world.movable(token) else {
                    debug!("Message for unknown token {}", token);
                    return;
                };
                if record.topic == topics::MOVEMENT {
                    match Direction::from_code(arg) {
                        Some(direction) => self.handle_move(&entity, direction),
                        None => info!("{} sent an invalid movement code: {}", token, arg),
                    }
                }
                if let Some(state) = entity.movable() {
                    state.touch(now_ms());
                }
            }
            other => debug!("Ignoring record on {}", other),
        }
    }

    // =========================================================================
    // Movement
    // =========================================================================

    /// Move `mover` one step and resolve interactions at the destination.
    pub fn handle_move(&self, mover: &Arc<Entity>, direction: Direction) {
        if !mover.is_alive() || self.is_finished() {
            return;
        }
        let (dx, dy) = direction.delta();
        let destination = mover.position().plus(dx, dy).normalized();
        let mut removed_player = false;

        for other in self.world.entities_at(destination) {
            if Arc::ptr_eq(&other, mover) || !other.is_alive() {
                continue;
            }
            match interact(mover, &other, &self.cities) {
                Interaction::Nothing => {}
                Interaction::RemoveOther => {
                    removed_player |= other.is_player();
                    self.remove_entity(&other);
                }
                Interaction::RemoveSelf => {
                    self.remove_entity(mover);
                }
                Interaction::RemoveBoth => {
                    removed_player |= other.is_player();
                    self.remove_entity(mover);
                    self.remove_entity(&other);
                }
            }
            if !mover.is_alive() {
                self.check_winner();
                return;
            }
        }

        self.world.relocate(mover, destination);
        if removed_player {
            self.check_winner();
        }
    }

    /// Detach an entity and publish its death notice.
    pub fn remove_entity(&self, entity: &Arc<Entity>) {
        if !self.world.remove_entity(entity) {
            return;
        }
        let Some(token) = entity.token() else {
            return;
        };
        if entity.is_player() {
            info!("Player {} died", token);
            self.publish(topics::PLAYER_GAME_UPDATES, &notify::player_died(token));
        } else {
            info!("NPC {} died", token);
            self.publish(topics::NPC_JOIN_LEAVE, &notify::npc_died(token));
        }
    }

    /// End the match if at most one player remains.
    pub fn check_winner(&self) {
        let remaining = self.world.remaining_players();
        match remaining.as_slice() {
            [] => {
                self.finish(None);
            }
            [last] => {
                let alias = last.player_record().map(|r| r.alias.clone());
                self.finish(alias.as_deref());
            }
            _ => {}
        }
    }

    /// Finish the match. Only the first call has any effect; returns
    /// whether this call finished it.
    pub fn finish(&self, winner: Option<&str>) -> bool {
        if self.finished.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.running.store(false, Ordering::SeqCst);
        for handle in self.tasks.lock().unwrap_or_else(|e| e.into_inner()).drain(..) {
            handle.abort();
        }

        {
            let _guard = self.snapshot_lock.lock().unwrap_or_else(|e| e.into_inner());
            match std::fs::remove_file(&self.settings.snapshot_path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Could not delete snapshot: {}", e),
            }
        }

        self.publish(topics::NPC_JOIN_LEAVE, notify::GAME_ENDED);
        self.publish(topics::PLAYER_GAME_UPDATES, &notify::winner(winner));
        info!("Match finished, winner: {}", winner.unwrap_or(notify::NO_WINNER));
        self.done_tx.send_replace(true);
        true
    }

    // =========================================================================
    // NPC admission
    // =========================================================================

    fn schedule_npc(self: &Arc<Self>, value: String) {
        let Some(runtime) = self.runtime.get().cloned().or_else(|| Handle::try_current().ok()) else {
            warn!("No runtime to schedule NPC admission on");
            return;
        };
        let game = self.clone();
        runtime.spawn(async move {
            tokio::time::sleep(NPC_ADMISSION_DELAY).await;
            game.accept_npc(&value);
        });
    }

    /// Admit an NPC from a `join:level:requesterId` message. Returns the
    /// minted token.
    ///
    /// The NPC lands on a random cell, possibly sharing it with others.
    pub fn accept_npc(&self, value: &str) -> Option<String> {
        if self.is_finished() {
            return None;
        }
        let request = match JoinRequest::parse(value) {
            Ok(request) => request,
            Err(e) => {
                info!("Rejected NPC join {:?}: {}", e, value);
                return None;
            }
        };
        let mut rng = rand::thread_rng();
        let token = format!("npc-{}", Uuid::new_v4().simple());
        let position = Position::new(rng.gen_range(0..GRID_SIZE), rng.gen_range(0..GRID_SIZE));

        let npc = Arc::new(Entity::npc(position, request.level, token.clone()));
        if let Some(state) = npc.movable() {
            state.touch(now_ms());
        }
        self.world.add_entity(npc);
        info!("NPC {} joined at {} with level {}", token, position, request.level);
        self.publish(topics::NPC_JOIN_LEAVE, &notify::npc_accepted(&request.requester, &token));
        Some(token)
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Plain-text map.
    pub fn render_map(&self) -> String {
        render_map(&self.world, &self.cities)
    }

    /// Current recovery document.
    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot {
            cities: self.cities.clone(),
            map: self.world.capture_entities().iter().map(|e| ElementSnapshot::capture(e)).collect(),
            password: SecretSnapshot { secret: self.cipher.secret().to_string() },
        }
    }

    /// Persist the snapshot unless the match has finished.
    pub fn persist_snapshot(&self) -> Result<(), SnapshotError> {
        let _guard = self.snapshot_lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_finished() {
            return Ok(());
        }
        self.snapshot().save(&self.settings.snapshot_path)
    }
}

/// Wall clock in epoch millis.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalBus;
    use crate::game::entity::tests::record;

    struct Fixture {
        game: Arc<Match>,
        updates: Box<dyn BusConsumer>,
        npc_topic: Box<dyn BusConsumer>,
        _tmp: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let bus = Arc::new(LocalBus::new());
        let updates = bus.subscribe(&[topics::PLAYER_GAME_UPDATES]);
        let npc_topic = bus.subscribe(&[topics::NPC_JOIN_LEAVE]);
        let settings = MatchSettings {
            snapshot_path: tmp.path().join("latestGame.json"),
            save_period: Duration::from_millis(17),
        };
        let game = Match::new(
            Cities::default(),
            MatchCipher::from_secret("s3cret").unwrap(),
            bus,
            settings,
        );
        Fixture { game, updates, npc_topic, _tmp: tmp }
    }

    fn add_player(game: &Match, alias: &str, at: Position, level: i32) -> Arc<Entity> {
        // Mild-city modifiers are zero; keep fights about raw levels.
        let p = Arc::new(Entity::player(at, level, format!("tok-{alias}"), record(alias, 0, 0)));
        game.world().add_entity(p.clone());
        p
    }

    fn drain(consumer: &mut Box<dyn BusConsumer>) -> Vec<String> {
        consumer.poll(Duration::from_millis(20)).unwrap().into_iter().map(|r| r.value).collect()
    }

    #[test]
    fn test_move_to_empty_cell() {
        let f = fixture();
        let p = add_player(&f.game, "ann", Position::new(5, 5), 1);
        add_player(&f.game, "bob", Position::new(15, 15), 1);

        f.game.handle_move(&p, Direction::N);
        assert_eq!(p.position(), Position::new(5, 4));
        assert!(f.game.world().entities_at(Position::new(5, 5)).is_empty());
        assert!(Arc::ptr_eq(&f.game.world().entities_at(Position::new(5, 4))[0], &p));
    }

    #[test]
    fn test_move_wraps_edges() {
        let f = fixture();
        let p = add_player(&f.game, "ann", Position::new(0, 0), 1);
        add_player(&f.game, "bob", Position::new(15, 15), 1);
        f.game.handle_move(&p, Direction::NW);
        assert_eq!(p.position(), Position::new(19, 19));
    }

    #[test]
    fn test_mine_kills_both() {
        let mut f = fixture();
        let p = add_player(&f.game, "ann", Position::new(5, 5), 3);
        add_player(&f.game, "bob", Position::new(15, 15), 1);
        add_player(&f.game, "cyd", Position::new(16, 16), 1);
        let mine = Arc::new(Entity::mine(Position::new(5, 4)));
        f.game.world().add_entity(mine.clone());

        f.game.handle_move(&p, Direction::N);
        assert!(!p.is_alive());
        assert!(!mine.is_alive());
        assert!(f.game.world().entities_at(Position::new(5, 4)).is_empty());
        assert!(f.game.world().entities_at(Position::new(5, 5)).is_empty());
        assert_eq!(drain(&mut f.updates), vec!["death:tok-ann".to_string()]);
        assert!(!f.game.is_finished());
    }

    #[test]
    fn test_food_levels_up() {
        let f = fixture();
        let p = add_player(&f.game, "ann", Position::new(15, 5), 3);
        add_player(&f.game, "bob", Position::new(15, 15), 1);
        let food = Arc::new(Entity::food(Position::new(15, 4)));
        f.game.world().add_entity(food.clone());

        f.game.handle_move(&p, Direction::N);
        assert_eq!(p.level(), Some(4));
        assert!(!food.is_alive());
        assert_eq!(f.game.world().entities_at(Position::new(15, 4)).len(), 1);
    }

    #[test]
    fn test_standoff_keeps_both() {
        let f = fixture();
        let a = add_player(&f.game, "ann", Position::new(15, 5), 3);
        let b = add_player(&f.game, "bob", Position::new(15, 4), 3);

        f.game.handle_move(&a, Direction::N);
        assert!(a.is_alive() && b.is_alive());
        assert_eq!(f.game.world().entities_at(Position::new(15, 4)).len(), 2);
        assert!(!f.game.is_finished());
    }

    #[test]
    fn test_higher_level_wins_and_ends_match() {
        let mut f = fixture();
        let a = add_player(&f.game, "ann", Position::new(15, 5), 5);
        let b = add_player(&f.game, "bob", Position::new(15, 4), 2);

        f.game.handle_move(&a, Direction::N);
        assert!(a.is_alive());
        assert!(!b.is_alive());
        assert_eq!(a.position(), Position::new(15, 4));
        assert_eq!(f.game.world().entities_at(Position::new(15, 4)).len(), 1);
        assert!(f.game.is_finished());
        assert_eq!(
            drain(&mut f.updates),
            vec!["death:tok-bob".to_string(), "winner:ann".to_string()]
        );
        assert_eq!(drain(&mut f.npc_topic), vec!["game_ended".to_string()]);
    }

    #[test]
    fn test_last_player_dying_means_no_winner() {
        let mut f = fixture();
        let p = add_player(&f.game, "ann", Position::new(5, 5), 1);
        f.game.world().add_entity(Arc::new(Entity::mine(Position::new(6, 5))));

        f.game.handle_move(&p, Direction::E);
        assert!(f.game.is_finished());
        assert_eq!(
            drain(&mut f.updates),
            vec!["death:tok-ann".to_string(), "winner:NO WINNER".to_string()]
        );
    }

    #[test]
    fn test_finish_is_idempotent() {
        let mut f = fixture();
        std::fs::write(&f.game.settings().snapshot_path, "{}").unwrap();
        assert!(f.game.finish(Some("ann")));
        assert!(!f.game.finish(None));
        f.game.check_winner();
        assert!(!f.game.settings().snapshot_path.exists());
        assert_eq!(drain(&mut f.updates), vec!["winner:ann".to_string()]);
    }

    #[test]
    fn test_movement_record_refreshes_keep_alive() {
        let f = fixture();
        let p = add_player(&f.game, "ann", Position::new(5, 5), 1);
        add_player(&f.game, "bob", Position::new(15, 15), 1);
        assert_eq!(p.movable().unwrap().last_movement(), 0);

        f.game.handle_record(&BusRecord { topic: topics::MOVEMENT.into(), value: "tok-ann:S".into() });
        assert_eq!(p.position(), Position::new(5, 6));
        assert!(p.movable().unwrap().last_movement() > 0);
    }

    #[test]
    fn test_keep_alive_record_only_refreshes() {
        let f = fixture();
        let p = add_player(&f.game, "ann", Position::new(5, 5), 1);
        f.game.handle_record(&BusRecord {
            topic: topics::MOVABLE_KEEP_ALIVE.into(),
            value: "tok-ann:1700000000000".into(),
        });
        assert_eq!(p.position(), Position::new(5, 5));
        assert!(p.movable().unwrap().last_movement() > 0);
    }

    #[test]
    fn test_invalid_records_ignored() {
        let f = fixture();
        let p = add_player(&f.game, "ann", Position::new(5, 5), 1);
        for value in ["tok-ann", "tok-ann:UP", "nobody:N", "a:b:c"] {
            f.game.handle_record(&BusRecord { topic: topics::MOVEMENT.into(), value: value.into() });
        }
        assert_eq!(p.position(), Position::new(5, 5));
    }

    #[test]
    fn test_npc_admission() {
        let mut f = fixture();
        let token = f.game.accept_npc("join:2:proc-1").unwrap();
        let npc = f.game.world().movable(&token).unwrap();
        assert_eq!(npc.level(), Some(2));
        assert!(npc.position().in_bounds());
        assert_eq!(drain(&mut f.npc_topic), vec![format!("accept:proc-1:{token}")]);

        assert!(f.game.accept_npc("join:0:proc-2").is_none());
        assert!(f.game.accept_npc("join:2").is_none());
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_npc_join_record_admitted_after_delay() {
        let mut f = fixture();
        let join = BusRecord { topic: topics::NPC_JOIN_LEAVE.into(), value: "join:2:proc-1".into() };

        f.game.handle_record(&join);
        settle().await;
        tokio::time::advance(NPC_ADMISSION_DELAY - Duration::from_millis(1)).await;
        settle().await;
        assert!(f.game.world().movables().is_empty());

        tokio::time::advance(Duration::from_millis(2)).await;
        settle().await;
        let npcs = f.game.world().movables();
        assert_eq!(npcs.len(), 1);
        assert_eq!(npcs[0].level(), Some(2));
        let token = npcs[0].token().unwrap().to_string();
        assert_eq!(drain(&mut f.npc_topic), vec![format!("accept:proc-1:{token}")]);

        // Joins that land after the match ends are dropped.
        f.game.handle_record(&join);
        settle().await;
        f.game.finish(None);
        tokio::time::advance(NPC_ADMISSION_DELAY * 2).await;
        settle().await;
        assert_eq!(f.game.world().movables().len(), 1);
        assert_eq!(drain(&mut f.npc_topic), vec![notify::GAME_ENDED.to_string()]);
    }

    #[test]
    fn test_npc_death_notice() {
        let mut f = fixture();
        add_player(&f.game, "bob", Position::new(15, 15), 1);
        add_player(&f.game, "cyd", Position::new(16, 16), 1);
        let npc = Arc::new(Entity::npc(Position::new(5, 5), 1, "npc-1"));
        f.game.world().add_entity(npc.clone());
        add_player(&f.game, "ann", Position::new(5, 4), 4);

        f.game.handle_move(&npc, Direction::N);
        assert!(!npc.is_alive());
        assert_eq!(drain(&mut f.npc_topic), vec!["die:npc-1".to_string()]);
        assert!(!f.game.is_finished());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let f = fixture();
        add_player(&f.game, "ann", Position::new(2, 3), 2);
        f.game.world().add_entity(Arc::new(Entity::food(Position::new(7, 7))));
        f.game.world().add_entity(Arc::new(Entity::npc(Position::new(9, 1), 3, "npc-5")));

        let directory = PlayerDirectory::in_memory();
        for e in f.game.world().remaining_players() {
            directory.insert((**e.player_record().unwrap()).clone());
        }

        let broadcast = f.game.cipher().encrypt(f.game.render_map().as_bytes());
        f.game.persist_snapshot().unwrap();
        let snapshot = MatchSnapshot::load(&f.game.settings().snapshot_path).unwrap();
        let restored = Match::restore(
            &snapshot,
            &directory,
            Arc::new(LocalBus::new()),
            f.game.settings().clone(),
        )
        .unwrap();

        assert_eq!(restored.snapshot(), f.game.snapshot());
        assert_eq!(restored.render_map(), f.game.render_map());
        let plain = restored.cipher().decrypt(&broadcast).unwrap();
        assert_eq!(plain, f.game.render_map().into_bytes());
    }

    #[test]
    fn test_persist_skipped_after_finish() {
        let f = fixture();
        f.game.finish(None);
        f.game.persist_snapshot().unwrap();
        assert!(!f.game.settings().snapshot_path.exists());
    }
}
