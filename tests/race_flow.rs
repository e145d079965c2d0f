//! End-to-end race flows through the public API

use std::time::Duration;

use rally_race_server::game::rng::{RandomSource, SeededRandom, SequenceRandom};
use rally_race_server::game::snapshot::{RaceState, SnapshotBuilder, SnapshotFollower};
use rally_race_server::game::types::{Gear, Phase, ShiftDirection, Weather};
use rally_race_server::game::{PlayerIntent, RaceController, RaceSession, RaceSettings};
use rally_race_server::ws::protocol::{Intent, ServerMsg};
use uuid::Uuid;

fn lobby<R: RandomSource>(rng: R, ids: &[&str], settings: RaceSettings) -> RaceController<R> {
    let mut race = RaceController::new(settings, rng);
    for id in ids {
        race.add_participant(id, &id.to_uppercase());
        race.set_ready(id, true);
    }
    race.start_if_all_ready();
    race
}

fn assert_cars_valid<R: RandomSource>(race: &RaceController<R>) {
    for p in race.players() {
        assert!((1..=5).contains(&p.current_gear.value()), "gear out of range for {}", p.id);
        assert!(p.max_rolls_allowed >= 1);
        assert!(p.rolls_remaining <= p.max_rolls_allowed);
    }
}

#[test]
fn exact_hit_beats_five_short() {
    // name, name, target 20, raid draw 20 (heat 0, no raid)
    let mut draws = vec![0.0, 0.0, 0.0, 0.99];
    // a: five 4s on the d4
    draws.extend([0.99; 5]);
    // b: 4, 4, 4, 3
    draws.extend([0.99, 0.99, 0.99, 0.6]);

    let mut race = lobby(SequenceRandom::new(draws), &["a", "b"], RaceSettings::default());
    let leg = race.leg().unwrap().clone();
    assert_eq!(leg.target_distance, 20);
    assert_eq!(leg.weather, Weather::Clear);
    assert!(!leg.is_police_raid);

    for _ in 0..5 {
        race.roll("a");
    }
    for _ in 0..4 {
        race.roll("b");
    }
    assert_eq!(race.player("a").unwrap().total_distance, 20);
    assert_eq!(race.player("b").unwrap().total_distance, 15);

    race.hold("a");
    race.hold("b");
    race.end_leg();

    assert_eq!(race.phase(), Phase::Checkpoint);
    assert_eq!(race.player("a").unwrap().points, 15);
    assert_eq!(race.player("b").unwrap().points, 8);
    assert_eq!(race.leg_results()[0].id, "a");
    assert_eq!(race.leg_results()[0].rank, Some(0));
}

#[test]
fn solo_race_ends_on_the_clock() {
    let settings = RaceSettings {
        max_legs: 3,
        leg_time_secs: 4,
        checkpoint_secs: 2,
        starting_rolls: 7,
    };
    let mut race = lobby(SeededRandom::new(7), &["solo"], settings);

    let mut seen_legs = 0;
    for _ in 0..100 {
        if race.phase() == Phase::End {
            break;
        }
        if race.phase() == Phase::Leg && race.time_remaining_secs() == settings.leg_time_secs {
            seen_legs += 1;
        }
        race.tick_one_second();
    }

    assert_eq!(seen_legs, 3);
    assert_eq!(race.phase(), Phase::End);
    assert_eq!(race.leg_index(), Some(3));
    assert!(race.leg().is_none());
    assert_eq!(race.time_remaining_secs(), 0);
}

#[test]
fn end_is_terminal() {
    let settings = RaceSettings {
        max_legs: 1,
        ..RaceSettings::default()
    };
    let mut race = lobby(SeededRandom::new(3), &["a", "b"], settings);
    race.hold("a");
    race.hold("b");
    race.end_leg();
    race.next_leg();
    assert_eq!(race.phase(), Phase::End);

    let before = RaceState::capture(&race);
    race.roll("a");
    race.hold("b");
    race.shift("a", ShiftDirection::Up);
    race.tick_one_second();
    race.next_leg();
    race.end_leg();
    assert!(!race.repair("a"));
    race.start_if_all_ready();

    let after = RaceState::capture(&race);
    assert_eq!(after.phase, Phase::End);
    assert_eq!(after.leg_index, before.leg_index);
    assert_eq!(after.scoreboard, before.scoreboard);
}

/// Plays whole races with a simple driver and checks invariants after every step
#[test]
fn seeded_races_hold_invariants() {
    let ids = ["a", "b", "c", "d"];
    for seed in 0..40u64 {
        let mut driver = SeededRandom::new(seed ^ 0x5eed);
        let mut race = lobby(SeededRandom::new(seed), &ids, RaceSettings::default());
        let mut builder = SnapshotBuilder::new(Uuid::new_v4());
        let mut follower = SnapshotFollower::new();
        let mut last_points = vec![0u32; ids.len()];
        let mut legs_played = 0;
        let mut current_leg = None;

        for _ in 0..5_000 {
            match race.phase() {
                Phase::Leg => {
                    let leg = race.leg().unwrap().clone();
                    if race.leg_index() != current_leg {
                        current_leg = race.leg_index();
                        legs_played += 1;
                        assert!((20..=40).contains(&leg.target_distance));
                        if race.leg_index() == Some(0) {
                            assert_eq!(leg.weather, Weather::Clear);
                        }
                    }

                    let id = ids[driver.pick_index(ids.len())];
                    let p = race.player(id).unwrap().clone();
                    if p.must_shift && !p.is_held && !p.has_overshot {
                        let dir = if p.current_gear == Gear::TOP {
                            ShiftDirection::Down
                        } else {
                            ShiftDirection::Up
                        };
                        race.shift(id, dir);
                        assert!(!race.player(id).unwrap().must_shift);
                    } else if p.total_distance + 6 < leg.target_distance {
                        race.roll(id);
                    } else if driver.next_unit() < 0.3 {
                        race.roll(id);
                    } else {
                        race.hold(id);
                    }
                    if race.players().all(|p| p.is_resolved()) {
                        race.end_leg();
                    } else if driver.next_unit() < 0.1 {
                        race.tick_one_second();
                    }
                }
                Phase::Checkpoint => {
                    for id in ids {
                        if !race.player(id).unwrap().damage.is_empty() && driver.next_unit() < 0.5 {
                            let before = race.player(id).unwrap().max_rolls_allowed;
                            if race.repair(id) {
                                let after = race.player(id).unwrap();
                                assert!(after.damage.is_empty());
                                assert_eq!(after.max_rolls_allowed, (before - 1).max(1));
                            }
                        }
                    }
                    race.next_leg();
                }
                Phase::End => break,
                Phase::Lobby => unreachable!("race started"),
            }

            assert_cars_valid(&race);
            for (i, id) in ids.iter().enumerate() {
                let points = race.player(id).unwrap().points;
                assert!(points >= last_points[i], "points went down for {}", id);
                last_points[i] = points;
            }

            let state = RaceState::capture(&race);
            let sorted = state
                .scoreboard
                .windows(2)
                .all(|w| w[0].points >= w[1].points);
            assert!(sorted);
            if let Some(msg) = builder.build_if_changed(state) {
                let before = follower.version();
                assert!(follower.apply(msg));
                assert!(follower.version() > before);
            }
        }

        assert_eq!(race.phase(), Phase::End, "seed {} never finished", seed);
        assert_eq!(legs_played, 3);
        assert_eq!(follower.state().map(|s| s.phase), Some(Phase::End));
    }
}

#[test]
fn same_seed_same_race() {
    let play = |seed: u64| {
        let mut race = lobby(SeededRandom::new(seed), &["a", "b"], RaceSettings::default());
        for _ in 0..4 {
            race.roll("a");
            race.roll("b");
        }
        RaceState::capture(&race)
    };
    assert_eq!(play(99), play(99));
}

#[test]
fn session_runs_to_end_without_a_runtime_macro() {
    let settings = RaceSettings {
        max_legs: 1,
        leg_time_secs: 1,
        checkpoint_secs: 1,
        starting_rolls: 7,
    };

    let last = tokio_test::block_on(async move {
        let (session, handle) = RaceSession::new("room", settings, 21, Duration::from_millis(2));
        let mut rx = handle.subscribe();
        handle.connect();

        for intent in [
            Intent::Join {
                id: "a".to_string(),
                name: "Ana".to_string(),
            },
            Intent::Ready {
                id: "a".to_string(),
                ready: true,
            },
            Intent::HostStart,
        ] {
            let sent = handle
                .send(PlayerIntent {
                    sender_id: "a".to_string(),
                    intent,
                    received_at: 0,
                })
                .await;
            assert!(sent);
        }

        session.run().await;

        let mut follower = SnapshotFollower::new();
        while let Ok(msg) = rx.try_recv() {
            follower.apply(msg);
        }
        assert!(handle.latest_snapshot().is_some());
        follower.state().cloned()
    });

    let state = last.expect("snapshots were published");
    assert_eq!(state.phase, Phase::End);
    assert_eq!(state.leg_index, Some(1));
    assert!(state.players.contains_key("a"));
}

#[test]
fn intents_parse_from_wire_json() {
    let intent: Intent = serde_json::from_str(r#"{"type":"repair","id":"a"}"#).unwrap();
    assert_eq!(intent.player_id(), Some("a"));

    let settings = RaceSettings::default();
    let (mut session, _handle) = RaceSession::new("room", settings, 1, Duration::from_secs(1));
    let first = session.publish().unwrap();
    let json = serde_json::to_value(&first).unwrap();
    assert_eq!(json["type"], "snapshot");
    assert_eq!(json["version"], 1);
    assert!(json["raceId"].is_string());
    assert_eq!(json["state"]["phase"], "lobby");

    let back: ServerMsg = serde_json::from_value(json).unwrap();
    assert_eq!(back, first);
}
