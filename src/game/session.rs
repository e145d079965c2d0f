//! Authoritative race session and room registry
//!
//! One session task owns one controller. Intents and the one second tick are
//! applied in the order they arrive, and a fresh snapshot is broadcast after
//! every change.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::util::time::unix_millis;
use crate::ws::protocol::{Intent, ServerMsg};

use super::controller::{RaceController, RaceSettings};
use super::rng::SeededRandom;
use super::snapshot::{RaceState, SnapshotBuilder};
use super::types::{Phase, ShiftDirection};
use super::PlayerIntent;

const INTENT_QUEUE: usize = 256;
const SNAPSHOT_QUEUE: usize = 64;

/// Handle to a running race
#[derive(Clone)]
pub struct RaceHandle {
    pub room: String,
    pub race_id: Uuid,
    pub intent_tx: mpsc::Sender<PlayerIntent>,
    pub snapshot_tx: broadcast::Sender<ServerMsg>,
    latest: Arc<RwLock<Option<ServerMsg>>>,
    connections: Arc<AtomicUsize>,
}

impl RaceHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.snapshot_tx.subscribe()
    }

    /// Most recent snapshot, for late subscribers
    pub fn latest_snapshot(&self) -> Option<ServerMsg> {
        self.latest.read().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn connect(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn disconnect(&self) {
        let _ = self
            .connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Queue an intent for the session. False if the session is gone.
    pub async fn send(&self, intent: PlayerIntent) -> bool {
        self.intent_tx.send(intent).await.is_ok()
    }
}

/// The authoritative race task
pub struct RaceSession {
    room: String,
    seed: u64,
    controller: RaceController<SeededRandom>,
    intent_rx: mpsc::Receiver<PlayerIntent>,
    snapshot_tx: broadcast::Sender<ServerMsg>,
    snapshots: SnapshotBuilder,
    latest: Arc<RwLock<Option<ServerMsg>>>,
    connections: Arc<AtomicUsize>,
    tick_period: Duration,
}

impl RaceSession {
    /// Create a session and the handle used to reach it
    pub fn new(
        room: impl Into<String>,
        settings: RaceSettings,
        seed: u64,
        tick_period: Duration,
    ) -> (Self, RaceHandle) {
        let room = room.into();
        let race_id = Uuid::new_v4();
        let (intent_tx, intent_rx) = mpsc::channel(INTENT_QUEUE);
        let (snapshot_tx, _) = broadcast::channel(SNAPSHOT_QUEUE);
        let latest = Arc::new(RwLock::new(None));
        let connections = Arc::new(AtomicUsize::new(0));

        let handle = RaceHandle {
            room: room.clone(),
            race_id,
            intent_tx,
            snapshot_tx: snapshot_tx.clone(),
            latest: latest.clone(),
            connections: connections.clone(),
        };

        let session = Self {
            room,
            seed,
            controller: RaceController::new(settings, SeededRandom::new(seed)),
            intent_rx,
            snapshot_tx,
            snapshots: SnapshotBuilder::new(race_id),
            latest,
            connections,
            tick_period,
        };

        (session, handle)
    }

    pub fn controller(&self) -> &RaceController<SeededRandom> {
        &self.controller
    }

    /// Apply one intent to the controller
    pub fn apply_intent(&mut self, input: PlayerIntent) {
        debug!(
            room = %self.room,
            sender = %input.sender_id,
            queued_ms = unix_millis().saturating_sub(input.received_at),
            "Applying intent"
        );
        if let Some(id) = input.intent.player_id() {
            if id != input.sender_id {
                debug!(
                    room = %self.room,
                    sender = %input.sender_id,
                    player_id = %id,
                    "Intent names a different participant"
                );
            }
        }

        match input.intent {
            Intent::Join { id, name } => self.controller.add_participant(&id, &name),
            Intent::Ready { id, ready } => self.controller.set_ready(&id, ready),
            Intent::Roll { id } => self.controller.roll(&id),
            Intent::Hold { id } => self.controller.hold(&id),
            Intent::Shift { id, d } => match ShiftDirection::try_from(d) {
                Ok(dir) => self.controller.shift(&id, dir),
                Err(d) => debug!(room = %self.room, player_id = %id, d, "Invalid shift direction"),
            },
            Intent::Repair { id } => {
                let repaired = self.controller.repair(&id);
                debug!(room = %self.room, player_id = %id, repaired, "Repair requested");
            }
            Intent::HostStart => match self.controller.phase() {
                Phase::Lobby => self.controller.start_if_all_ready(),
                Phase::Checkpoint => {
                    info!(
                        room = %self.room,
                        sender = %input.sender_id,
                        time_remaining = self.controller.time_remaining_secs(),
                        "Checkpoint skipped by host-start"
                    );
                    self.controller.next_leg();
                }
                Phase::Leg | Phase::End => {}
            },
        }
    }

    /// Advance the race clock by one second
    pub fn tick(&mut self) {
        self.controller.tick_one_second();
    }

    /// Broadcast a snapshot if anything changed. Returns it when sent.
    pub fn publish(&mut self) -> Option<ServerMsg> {
        let state = RaceState::capture(&self.controller);
        let snapshot = self.snapshots.build_if_changed(state)?;
        *self.latest.write() = Some(snapshot.clone());
        // No receivers is fine; followers pick up the latest on connect
        let _ = self.snapshot_tx.send(snapshot.clone());
        Some(snapshot)
    }

    /// Run until the race ends or every participant disconnects
    pub async fn run(mut self) {
        info!(
            room = %self.room,
            race_id = %self.snapshots.race_id(),
            seed = self.seed,
            "Race session started"
        );

        let mut ticker = interval(self.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick completes immediately
        ticker.tick().await;

        self.publish();
        let mut had_connections = false;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(),
                received = self.intent_rx.recv() => match received {
                    Some(input) => self.apply_intent(input),
                    None => {
                        warn!(room = %self.room, "Intent channel closed");
                        break;
                    }
                },
            }

            self.publish();

            if self.controller.phase() == Phase::End {
                info!(room = %self.room, version = self.snapshots.version(), "Race ended");
                break;
            }

            if self.connections.load(Ordering::Relaxed) > 0 {
                had_connections = true;
            } else if had_connections {
                info!(room = %self.room, "All participants left, closing race");
                break;
            }
        }
    }
}

/// Registry of races keyed by room
pub struct RaceRegistry {
    races: Arc<DashMap<String, RaceHandle>>,
    settings: RaceSettings,
    seed: Option<u64>,
    tick_period: Duration,
}

impl RaceRegistry {
    /// `seed` fixes the random source of every new race; random otherwise
    pub fn new(settings: RaceSettings, seed: Option<u64>, tick_period: Duration) -> Self {
        Self {
            races: Arc::new(DashMap::new()),
            settings,
            seed,
            tick_period,
        }
    }

    pub fn get(&self, room: &str) -> Option<RaceHandle> {
        self.races.get(room).map(|r| r.value().clone())
    }

    /// Existing race for `room`, or a newly spawned one
    pub fn get_or_create(&self, room: &str) -> RaceHandle {
        if let Some(handle) = self.get(room) {
            return handle;
        }
        self.races
            .entry(room.to_string())
            .or_insert_with(|| self.spawn(room))
            .value()
            .clone()
    }

    fn spawn(&self, room: &str) -> RaceHandle {
        let seed = self.seed.unwrap_or_else(rand::random);
        let (session, handle) = RaceSession::new(room, self.settings, seed, self.tick_period);

        let races = self.races.clone();
        let room = room.to_string();
        let race_id = handle.race_id;
        tokio::spawn(async move {
            session.run().await;
            races.remove_if(&room, |_, h| h.race_id == race_id);
            info!(room = %room, race_id = %race_id, "Race removed from registry");
        });

        info!(room = %handle.room, race_id = %race_id, "Created new race");
        handle
    }

    pub fn active_races(&self) -> usize {
        self.races.len()
    }

    pub fn total_connections(&self) -> usize {
        self.races
            .iter()
            .map(|r| r.value().connection_count())
            .sum()
    }
}
