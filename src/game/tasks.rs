//! Periodic Tasks
//!
//! Independent timers sharing one [`Match`]. Each runs on the Tokio runtime
//! and is aborted when the match finishes.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::bus::topics;
use crate::game::engine::{now_ms, Match};
use crate::game::events::notify;

/// Map broadcast period.
pub const MAP_PERIOD: Duration = Duration::from_millis(17);
/// Engine keep-alive period.
pub const KEEP_ALIVE_PERIOD: Duration = Duration::from_millis(1000);
/// Delay before the first snapshot.
pub const SNAPSHOT_WARMUP: Duration = Duration::from_millis(250);
/// Delay before the first disconnect sweep.
pub const DISCONNECT_WARMUP: Duration = Duration::from_millis(3750);
/// Disconnect sweep period.
pub const DISCONNECT_PERIOD: Duration = Duration::from_millis(1000);
/// Silence after which a movable counts as disconnected, in millis.
pub const STALENESS_MS: i64 = 1000;
/// Delay of the one-shot start notification.
pub const START_NOTIFICATION_DELAY: Duration = Duration::from_secs(3);

/// Spawn every timer of a started match.
pub fn spawn_periodic_tasks(game: &Arc<Match>) -> Vec<JoinHandle<()>> {
    let save_period = game.settings().save_period;
    vec![
        every(game, Duration::ZERO, MAP_PERIOD, broadcast_map),
        every(game, Duration::ZERO, KEEP_ALIVE_PERIOD, ping_keep_alive),
        every(game, SNAPSHOT_WARMUP, save_period, persist_snapshot),
        every(game, DISCONNECT_WARMUP, DISCONNECT_PERIOD, |g| detect_disconnects(g, now_ms())),
        {
            let game = game.clone();
            tokio::spawn(async move {
                time::sleep(START_NOTIFICATION_DELAY).await;
                notify_started(&game);
            })
        },
    ]
}

fn every<F>(game: &Arc<Match>, warmup: Duration, period: Duration, tick: F) -> JoinHandle<()>
where
    F: Fn(&Match) + Send + 'static,
{
    let game = game.clone();
    tokio::spawn(async move {
        let mut interval = time::interval_at(Instant::now() + warmup, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if game.is_finished() {
                break;
            }
            tick(&game);
        }
    })
}

/// Publish the encrypted, base64-encoded map.
pub fn broadcast_map(game: &Match) {
    let encrypted = game.cipher().encrypt(game.render_map().as_bytes());
    game.publish(topics::MAP, &STANDARD.encode(encrypted));
}

/// Publish the engine's clock.
pub fn ping_keep_alive(game: &Match) {
    game.publish(topics::ENGINE_KEEP_ALIVE, &now_ms().to_string());
}

/// Save the recovery snapshot.
pub fn persist_snapshot(game: &Match) {
    if let Err(e) = game.persist_snapshot() {
        warn!("Could not persist snapshot: {}", e);
    }
}

/// Flag movables silent for longer than the staleness window and unflag
/// those that reported again.
pub fn detect_disconnects(game: &Match, now: i64) {
    for entity in game.world().movables() {
        let Some(state) = entity.movable() else {
            continue;
        };
        let stale = now - state.last_movement() > STALENESS_MS;
        if stale && !state.is_disconnected() {
            state.set_disconnected(true);
            info!("{} disconnected", state.token());
        } else if !stale && state.is_disconnected() {
            state.set_disconnected(false);
            info!("{} reconnected", state.token());
        }
    }
}

/// Tell players the match accepts moves.
pub fn notify_started(game: &Match) {
    if game.is_finished() {
        return;
    }
    info!("Announcing match start");
    game.publish(topics::PLAYER_GAME_UPDATES, notify::GAME_STARTED);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusConsumer, LocalBus, MessageBus};
    use crate::core::city::Cities;
    use crate::core::crypto::MatchCipher;
    use crate::core::position::Position;
    use crate::game::engine::MatchSettings;
    use crate::game::entity::Entity;

    fn game(bus: Arc<LocalBus>, tmp: &tempfile::TempDir) -> Arc<Match> {
        let settings = MatchSettings {
            snapshot_path: tmp.path().join("latestGame.json"),
            save_period: Duration::from_millis(17),
        };
        Match::new(Cities::default(), MatchCipher::from_secret("k3y").unwrap(), bus, settings)
    }

    fn values(consumer: &mut Box<dyn BusConsumer>) -> Vec<String> {
        consumer.poll(Duration::from_millis(20)).unwrap().into_iter().map(|r| r.value).collect()
    }

    #[test]
    fn test_broadcast_decrypts_to_map() {
        let tmp = tempfile::tempdir().unwrap();
        let bus = Arc::new(LocalBus::new());
        let mut maps = bus.subscribe(&[topics::MAP]);
        let g = game(bus, &tmp);
        g.world().add_entity(Arc::new(Entity::food(Position::new(1, 1))));

        broadcast_map(&g);
        let published = values(&mut maps).pop().unwrap();
        let plain = g.cipher().decrypt(&STANDARD.decode(published).unwrap()).unwrap();
        assert_eq!(String::from_utf8(plain).unwrap(), g.render_map());
    }

    #[test]
    fn test_keep_alive_publishes_millis() {
        let tmp = tempfile::tempdir().unwrap();
        let bus = Arc::new(LocalBus::new());
        let mut pings = bus.subscribe(&[topics::ENGINE_KEEP_ALIVE]);
        let g = game(bus, &tmp);

        ping_keep_alive(&g);
        let value = values(&mut pings).pop().unwrap();
        assert!(value.parse::<i64>().unwrap() > 0);
    }

    #[test]
    fn test_disconnect_flag_and_unflag() {
        let tmp = tempfile::tempdir().unwrap();
        let g = game(Arc::new(LocalBus::new()), &tmp);
        let npc = Arc::new(Entity::npc(Position::new(3, 3), 1, "npc-1"));
        g.world().add_entity(npc.clone());
        let state = npc.movable().unwrap();

        state.touch(10_000);
        detect_disconnects(&g, 10_500);
        assert!(!state.is_disconnected());

        detect_disconnects(&g, 12_000);
        assert!(state.is_disconnected());

        state.touch(12_500);
        detect_disconnects(&g, 12_600);
        assert!(!state.is_disconnected());
    }

    #[test]
    fn test_persist_writes_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let g = game(Arc::new(LocalBus::new()), &tmp);
        persist_snapshot(&g);
        assert!(g.settings().snapshot_path.exists());
    }

    #[test]
    fn test_start_notification_skipped_after_finish() {
        let tmp = tempfile::tempdir().unwrap();
        let bus = Arc::new(LocalBus::new());
        let mut updates = bus.subscribe(&[topics::PLAYER_GAME_UPDATES]);
        let g = game(bus, &tmp);

        notify_started(&g);
        assert_eq!(values(&mut updates), vec!["game_stared".to_string()]);
        g.finish(None);
        notify_started(&g);
        assert_eq!(values(&mut updates), vec!["winner:NO WINNER".to_string()]);
    }

    #[tokio::test]
    async fn test_started_match_runs_timers_until_finish() {
        let tmp = tempfile::tempdir().unwrap();
        let bus = Arc::new(LocalBus::new());
        let mut maps = bus.subscribe(&[topics::MAP]);
        let g = game(bus.clone(), &tmp);
        g.world().add_entity(Arc::new(Entity::npc(Position::new(0, 0), 1, "npc-1")));

        let consumer = g.start().unwrap();
        time::sleep(Duration::from_millis(400)).await;
        assert!(!maps.poll(Duration::from_millis(20)).unwrap().is_empty());
        assert!(g.settings().snapshot_path.exists());

        bus.publish(topics::MOVEMENT, "npc-1:E").unwrap();
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(g.world().movable("npc-1").unwrap().position(), Position::new(1, 0));

        assert!(g.finish(None));
        g.finished().await;
        assert!(!g.settings().snapshot_path.exists());
        tokio::task::spawn_blocking(move || consumer.join()).await.unwrap().unwrap();
    }
}
