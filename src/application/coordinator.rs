//! Room coordination: a fixed table of rooms multiplexed over persistent
//! client channels. All mutation happens under one lock so every action
//! handler observes consistent state; the only suspension points live in
//! the socket tasks that own the channel receivers.

use std::collections::HashMap;
use std::sync::Mutex;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;

use crate::application::messages::{
    ClientMessage, DrawSource, LeaderboardEntry, RoomSummary, ServerMessage,
};
use crate::domain::entities::{LobbyPlayer, RoomState, RoomStatus, NUM_ROOMS};
use crate::domain::services::engine;
use crate::domain::value_objects::{GamePhase, GameStateView};

/// Outbound half of a client connection. A failed send means the socket
/// task is gone and is treated as a disconnect.
pub type ClientChannel = mpsc::UnboundedSender<ServerMessage>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JoinRoomError {
    #[error("Room not found.")]
    UnknownRoom,
    #[error("Game already in progress.")]
    GameInProgress,
    #[error("Room is full.")]
    RoomFull,
}

struct CoordinatorState {
    rooms: Vec<RoomState>,
    /// room_id -> (player_id -> channel) for participants with live sockets
    room_connections: HashMap<String, HashMap<String, ClientChannel>>,
    /// connections on the room-list screen
    lobby_watchers: HashMap<String, ClientChannel>,
    /// reverse lookup for cleanup
    player_room_map: HashMap<String, String>,
    rng: ChaCha8Rng,
}

/// Owns the fixed room population and every connection index.
pub struct RoomCoordinator {
    state: Mutex<CoordinatorState>,
}

impl RoomCoordinator {
    /// All non-determinism (deck shuffles, seating order) flows through a
    /// single generator, seeded for deterministic play when requested.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        let rooms = (1..=NUM_ROOMS).map(RoomState::new).collect();
        Self {
            state: Mutex::new(CoordinatorState {
                rooms,
                room_connections: HashMap::new(),
                lobby_watchers: HashMap::new(),
                player_room_map: HashMap::new(),
                rng,
            }),
        }
    }

    /// Attach a room-list watcher and push the current snapshot at once.
    pub fn register_watcher(&self, watcher_id: &str, channel: ClientChannel) {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let snapshot = ServerMessage::RoomsUpdate {
            rooms: summaries(state),
        };
        let delivered = channel.send(snapshot).is_ok();
        if delivered {
            state.lobby_watchers.insert(watcher_id.to_string(), channel);
        }
        tracing::debug!(watcher_id, delivered, "lobby watcher registered");
    }

    /// Unknown ids are accepted silently.
    pub fn unregister_watcher(&self, watcher_id: &str) {
        let mut guard = self.state.lock().unwrap();
        guard.lobby_watchers.remove(watcher_id);
        tracing::debug!(watcher_id, "lobby watcher unregistered");
    }

    pub fn join_room(
        &self,
        room_id: &str,
        player_id: &str,
        channel: ClientChannel,
    ) -> Result<(), JoinRoomError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let idx = room_index(state, room_id).ok_or(JoinRoomError::UnknownRoom)?;

        if state.rooms[idx].status == RoomStatus::InGame {
            let room = &state.rooms[idx];
            let known = room.player_ids.iter().any(|p| p == player_id)
                || room.lobby_players.iter().any(|p| p.id == player_id);
            if !known {
                return Err(JoinRoomError::GameInProgress);
            }
            // Reconnect: swap the socket, replay state, leave the room alone
            attach_channel(state, room_id, player_id, channel);
            tracing::info!(room_id, player_id, "participant reconnected mid-game");
            let lobby = lobby_update_message(&state.rooms[idx]);
            send_to_participant(state, room_id, player_id, lobby);
            if let Some(gs) = &state.rooms[idx].game_state {
                let replay = ServerMessage::GameState {
                    state: GameStateView::for_viewer(gs, player_id),
                };
                send_to_participant(state, room_id, player_id, replay);
            }
            return Ok(());
        }

        if state.rooms[idx].player_ids.iter().any(|p| p == player_id) {
            // Duplicate connect: replace the channel only
            attach_channel(state, room_id, player_id, channel);
            let lobby = lobby_update_message(&state.rooms[idx]);
            send_to_participant(state, room_id, player_id, lobby);
            return Ok(());
        }

        if state.rooms[idx].is_full() {
            return Err(JoinRoomError::RoomFull);
        }

        {
            let room = &mut state.rooms[idx];
            room.player_ids.push(player_id.to_string());
            room.player_count = room.player_ids.len();
            room.status = RoomStatus::Gathering;
        }
        attach_channel(state, room_id, player_id, channel);
        tracing::info!(room_id, player_id, "participant joined");

        let lobby = lobby_update_message(&state.rooms[idx]);
        send_to_participant(state, room_id, player_id, lobby);
        let snapshot = ServerMessage::RoomState {
            room: summary(state, idx),
        };
        broadcast_to_room(state, room_id, snapshot);
        broadcast_to_watchers(state);
        Ok(())
    }

    pub fn leave_room(&self, room_id: &str, player_id: &str) -> bool {
        let mut guard = self.state.lock().unwrap();
        leave_room_inner(&mut guard, room_id, player_id)
    }

    /// Socket-teardown cleanup: resolve the room through the reverse map
    /// and run the leave routine. The leave only applies while `channel`
    /// is still the registered socket for the player; a connection that
    /// was replaced by a newer one must not tear the newer one down.
    pub fn disconnect(&self, player_id: &str, channel: &ClientChannel) -> bool {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let Some(room_id) = state.player_room_map.get(player_id).cloned() else {
            return false;
        };
        let is_current = state
            .room_connections
            .get(&room_id)
            .and_then(|conns| conns.get(player_id))
            .map(|current| current.same_channel(channel))
            .unwrap_or(false);
        if !is_current {
            return false;
        }
        leave_room_inner(state, &room_id, player_id)
    }

    /// Route one inbound message from a room participant.
    pub fn handle_message(&self, room_id: &str, player_id: &str, message: ClientMessage) {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let Some(idx) = room_index(state, room_id) else {
            tracing::warn!(room_id, player_id, "message for unknown room dropped");
            return;
        };

        match message {
            ClientMessage::JoinLobby { player_name } => {
                handle_join_lobby(state, idx, player_id, &player_name)
            }
            ClientMessage::LeaveLobby => handle_leave_lobby(state, idx, player_id),
            ClientMessage::StartGame => handle_start_game(state, idx, player_id),
            ClientMessage::EndGame => handle_end_game(state, idx),
            ClientMessage::DrawCard { source } => handle_draw(state, idx, player_id, source),
            ClientMessage::DiscardCard { card_id } => {
                handle_discard(state, idx, player_id, &card_id)
            }
            ClientMessage::GoOut { card_id } => handle_go_out(state, idx, player_id, &card_id),
            ClientMessage::NextRound => handle_next_round(state, idx, player_id),
        }
    }

    /// Snapshot for the HTTP room list.
    pub fn room_summaries(&self) -> Vec<RoomSummary> {
        let guard = self.state.lock().unwrap();
        summaries(&guard)
    }
}

fn room_index(state: &CoordinatorState, room_id: &str) -> Option<usize> {
    state.rooms.iter().position(|r| r.room_id == room_id)
}

fn connected_count(state: &CoordinatorState, room_id: &str) -> usize {
    state
        .room_connections
        .get(room_id)
        .map(|conns| conns.len())
        .unwrap_or(0)
}

fn summary(state: &CoordinatorState, idx: usize) -> RoomSummary {
    let room = &state.rooms[idx];
    RoomSummary::new(room, connected_count(state, &room.room_id))
}

fn summaries(state: &CoordinatorState) -> Vec<RoomSummary> {
    (0..state.rooms.len()).map(|idx| summary(state, idx)).collect()
}

fn attach_channel(state: &mut CoordinatorState, room_id: &str, player_id: &str, channel: ClientChannel) {
    state
        .room_connections
        .entry(room_id.to_string())
        .or_default()
        .insert(player_id.to_string(), channel);
    state
        .player_room_map
        .insert(player_id.to_string(), room_id.to_string());
}

fn lobby_update_message(room: &RoomState) -> ServerMessage {
    ServerMessage::LobbyUpdate {
        room_id: room.room_id.clone(),
        players: room.lobby_players.clone(),
        status: room.status.as_str().to_string(),
    }
}

/// Drop the connection and, outside a live game, the seat as well. A
/// mid-game disconnect must leave the game intact for reconnection.
fn leave_room_inner(state: &mut CoordinatorState, room_id: &str, player_id: &str) -> bool {
    let Some(idx) = room_index(state, room_id) else {
        return false;
    };

    if let Some(conns) = state.room_connections.get_mut(room_id) {
        conns.remove(player_id);
    }
    state.player_room_map.remove(player_id);

    if state.rooms[idx].status == RoomStatus::InGame {
        tracing::info!(room_id, player_id, "participant disconnected mid-game");
        broadcast_to_watchers(state);
        return true;
    }

    {
        let room = &mut state.rooms[idx];
        room.player_ids.retain(|p| p != player_id);
        room.lobby_players.retain(|p| p.id != player_id);
        room.player_count = room.player_ids.len();
        room.status = if room.player_ids.is_empty() {
            RoomStatus::Empty
        } else {
            RoomStatus::Gathering
        };
    }
    tracing::info!(room_id, player_id, "participant left");

    let lobby = lobby_update_message(&state.rooms[idx]);
    broadcast_to_watchers(state);
    broadcast_to_room(state, room_id, lobby);
    true
}

/// Send to one participant; a transport failure counts as a disconnect.
fn send_to_participant(
    state: &mut CoordinatorState,
    room_id: &str,
    player_id: &str,
    message: ServerMessage,
) {
    let delivered = state
        .room_connections
        .get(room_id)
        .and_then(|conns| conns.get(player_id))
        .map(|channel| channel.send(message).is_ok());
    if delivered == Some(false) {
        leave_room_inner(state, room_id, player_id);
    }
}

fn send_error(state: &mut CoordinatorState, room_id: &str, player_id: &str, message: String) {
    tracing::debug!(%room_id, player_id, error = %message, "action rejected");
    send_to_participant(state, room_id, player_id, ServerMessage::Error { message });
}

/// Deliver one message to every live socket in a room. Channels that fail
/// are detached through the regular leave routine after the loop; one dead
/// peer never blocks its siblings. Returns the delivered count.
fn broadcast_to_room(state: &mut CoordinatorState, room_id: &str, message: ServerMessage) -> usize {
    let targets: Vec<(String, ClientChannel)> = state
        .room_connections
        .get(room_id)
        .map(|conns| conns.iter().map(|(id, ch)| (id.clone(), ch.clone())).collect())
        .unwrap_or_default();

    let mut delivered = 0;
    let mut failed = Vec::new();
    for (player_id, channel) in targets {
        if channel.send(message.clone()).is_ok() {
            delivered += 1;
        } else {
            failed.push(player_id);
        }
    }
    for player_id in failed {
        leave_room_inner(state, room_id, &player_id);
    }
    delivered
}

/// Push each participant its own projection of the room's game.
fn broadcast_projections(state: &mut CoordinatorState, idx: usize) {
    let room_id = state.rooms[idx].room_id.clone();
    let Some(gs) = &state.rooms[idx].game_state else {
        return;
    };
    let targets: Vec<(String, ClientChannel, ServerMessage)> = state
        .room_connections
        .get(&room_id)
        .map(|conns| {
            conns
                .iter()
                .map(|(id, ch)| {
                    let view = GameStateView::for_viewer(gs, id);
                    (id.clone(), ch.clone(), ServerMessage::GameState { state: view })
                })
                .collect()
        })
        .unwrap_or_default();

    let mut failed = Vec::new();
    for (player_id, channel, message) in targets {
        if channel.send(message).is_err() {
            failed.push(player_id);
        }
    }
    for player_id in failed {
        leave_room_inner(state, &room_id, &player_id);
    }
}

fn broadcast_to_watchers(state: &mut CoordinatorState) {
    let message = ServerMessage::RoomsUpdate {
        rooms: summaries(state),
    };
    let targets: Vec<(String, ClientChannel)> = state
        .lobby_watchers
        .iter()
        .map(|(id, ch)| (id.clone(), ch.clone()))
        .collect();

    for (watcher_id, channel) in targets {
        if channel.send(message.clone()).is_err() {
            state.lobby_watchers.remove(&watcher_id);
        }
    }
}

fn handle_join_lobby(state: &mut CoordinatorState, idx: usize, player_id: &str, name: &str) {
    let room_id = state.rooms[idx].room_id.clone();
    if state.rooms[idx].status == RoomStatus::InGame {
        send_error(state, &room_id, player_id, "Game already in progress.".into());
        return;
    }
    let trimmed = name.trim();
    if trimmed.is_empty() {
        send_error(state, &room_id, player_id, "Name cannot be empty.".into());
        return;
    }

    {
        let room = &mut state.rooms[idx];
        match room.lobby_players.iter().position(|p| p.id == player_id) {
            Some(pos) => room.lobby_players[pos].name = trimmed.to_string(),
            None => room.lobby_players.push(LobbyPlayer::new(player_id, trimmed)),
        }
    }
    tracing::info!(%room_id, player_id, name = trimmed, "lobby entry updated");

    let lobby = lobby_update_message(&state.rooms[idx]);
    broadcast_to_room(state, &room_id, lobby);
}

fn handle_leave_lobby(state: &mut CoordinatorState, idx: usize, player_id: &str) {
    let room_id = state.rooms[idx].room_id.clone();
    state.rooms[idx].lobby_players.retain(|p| p.id != player_id);
    let lobby = lobby_update_message(&state.rooms[idx]);
    broadcast_to_room(state, &room_id, lobby);
}

fn handle_start_game(state: &mut CoordinatorState, idx: usize, player_id: &str) {
    let room_id = state.rooms[idx].room_id.clone();
    if state.rooms[idx].status == RoomStatus::InGame {
        send_error(state, &room_id, player_id, "Game already in progress.".into());
        return;
    }
    if !state.rooms[idx].can_start() {
        let needed = state.rooms[idx].min_players;
        send_error(
            state,
            &room_id,
            player_id,
            format!("Need at least {needed} named players to start."),
        );
        return;
    }

    let seating = {
        let CoordinatorState { rooms, rng, .. } = state;
        let room = &mut rooms[idx];
        room.status = RoomStatus::InGame;
        let gs = engine::init_game(&room.room_id, &room.lobby_players, rng);
        let seating: Vec<LobbyPlayer> = gs
            .players
            .iter()
            .map(|p| LobbyPlayer::new(p.id.clone(), p.name.clone()))
            .collect();
        room.game_state = Some(gs);
        seating
    };
    tracing::info!(%room_id, players = seating.len(), "game started");

    let starting = ServerMessage::GameStarting {
        room_id: room_id.clone(),
        players: seating,
    };
    broadcast_to_room(state, &room_id, starting);
    broadcast_projections(state, idx);
    broadcast_to_watchers(state);
}

/// Tear the room down to EMPTY. The reset notification goes to a snapshot
/// of the channels directly rather than through the cleanup broadcast: a
/// dead socket here must not re-enter the leave path against a
/// half-cleared room.
fn handle_end_game(state: &mut CoordinatorState, idx: usize) {
    let room_id = state.rooms[idx].room_id.clone();
    let snapshot: Vec<ClientChannel> = state
        .room_connections
        .get(&room_id)
        .map(|conns| conns.values().cloned().collect())
        .unwrap_or_default();
    for channel in snapshot {
        let _ = channel.send(ServerMessage::LobbyReset {
            room_id: room_id.clone(),
        });
    }

    {
        let room = &mut state.rooms[idx];
        room.status = RoomStatus::Empty;
        room.player_ids.clear();
        room.lobby_players.clear();
        room.player_count = 0;
        room.game_state = None;
    }
    if let Some(conns) = state.room_connections.get_mut(&room_id) {
        conns.clear();
    }
    state.player_room_map.retain(|_, rid| *rid != room_id);
    tracing::info!(%room_id, "game ended, room reset");

    broadcast_to_watchers(state);
}

fn handle_draw(state: &mut CoordinatorState, idx: usize, player_id: &str, source: DrawSource) {
    let room_id = state.rooms[idx].room_id.clone();
    let result: Result<(), String> = match state.rooms[idx].game_state.as_mut() {
        None => Err("No active game in this room.".to_string()),
        Some(gs) => match source {
            DrawSource::Pile => engine::draw_from_pile(gs, player_id),
            DrawSource::Discard => engine::draw_from_discard(gs, player_id),
        }
        .map_err(|err| err.to_string()),
    };

    match result {
        Ok(()) => broadcast_projections(state, idx),
        Err(message) => send_error(state, &room_id, player_id, message),
    }
}

fn handle_discard(state: &mut CoordinatorState, idx: usize, player_id: &str, card_id: &str) {
    let room_id = state.rooms[idx].room_id.clone();
    let result: Result<(), String> = match state.rooms[idx].game_state.as_mut() {
        None => Err("No active game in this room.".to_string()),
        Some(gs) => engine::discard_card(gs, player_id, card_id).map_err(|err| err.to_string()),
    };

    match result {
        Ok(()) => {
            broadcast_projections(state, idx);
            broadcast_round_over_if_scoring(state, idx);
        }
        Err(message) => send_error(state, &room_id, player_id, message),
    }
}

fn handle_go_out(state: &mut CoordinatorState, idx: usize, player_id: &str, card_id: &str) {
    let room_id = state.rooms[idx].room_id.clone();
    let outcome = match state.rooms[idx].game_state.as_mut() {
        None => Err("No active game in this room.".to_string()),
        Some(gs) => match engine::go_out(gs, player_id, card_id) {
            Err(err) => Err(err.to_string()),
            Ok(()) => {
                let player_name = gs
                    .players
                    .iter()
                    .find(|p| p.id == player_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_default();
                Ok((player_name, gs.final_turns_remaining))
            }
        },
    };

    match outcome {
        Err(message) => send_error(state, &room_id, player_id, message),
        Ok((player_name, final_turns_remaining)) => {
            tracing::info!(%room_id, player_id, "player went out");
            let went_out = ServerMessage::PlayerWentOut {
                player_id: player_id.to_string(),
                player_name,
                final_turns_remaining,
            };
            broadcast_to_room(state, &room_id, went_out);
            broadcast_projections(state, idx);
            broadcast_round_over_if_scoring(state, idx);
        }
    }
}

fn broadcast_round_over_if_scoring(state: &mut CoordinatorState, idx: usize) {
    let room_id = state.rooms[idx].room_id.clone();
    let round_over = match &state.rooms[idx].game_state {
        Some(gs) if gs.phase == GamePhase::Scoring => ServerMessage::RoundOver {
            round_number: gs.round_number,
            results: gs.last_round_results.clone(),
        },
        _ => return,
    };
    broadcast_to_room(state, &room_id, round_over);
}

fn handle_next_round(state: &mut CoordinatorState, idx: usize, player_id: &str) {
    let room_id = state.rooms[idx].room_id.clone();

    enum Outcome {
        Rejected(String),
        AlreadyConfirmed,
        Waiting,
        Advanced,
        Finished(Vec<LeaderboardEntry>),
    }

    let outcome = {
        let CoordinatorState { rooms, rng, .. } = state;
        match rooms[idx].game_state.as_mut() {
            None => Outcome::Rejected("No active game in this room.".into()),
            Some(gs) => {
                if !matches!(gs.phase, GamePhase::Scoring | GamePhase::Finished) {
                    Outcome::Rejected("The round is not over.".into())
                } else if !gs.players.iter().any(|p| p.id == player_id) {
                    Outcome::Rejected("You are not in this game.".into())
                } else if gs.next_round_confirmed_by.iter().any(|c| c == player_id) {
                    Outcome::AlreadyConfirmed
                } else {
                    gs.next_round_confirmed_by.push(player_id.to_string());
                    let all_confirmed = gs
                        .players
                        .iter()
                        .all(|p| gs.next_round_confirmed_by.contains(&p.id));
                    if !all_confirmed {
                        Outcome::Waiting
                    } else {
                        engine::advance_to_next_round(gs, rng);
                        if gs.phase == GamePhase::Finished {
                            let mut standings: Vec<LeaderboardEntry> = gs
                                .players
                                .iter()
                                .map(|p| LeaderboardEntry {
                                    player_id: p.id.clone(),
                                    player_name: p.name.clone(),
                                    cumulative_score: p.cumulative_score,
                                })
                                .collect();
                            standings.sort_by_key(|entry| entry.cumulative_score);
                            Outcome::Finished(standings)
                        } else {
                            Outcome::Advanced
                        }
                    }
                }
            }
        }
    };

    match outcome {
        Outcome::Rejected(message) => send_error(state, &room_id, player_id, message),
        Outcome::AlreadyConfirmed => {}
        Outcome::Waiting | Outcome::Advanced => broadcast_projections(state, idx),
        Outcome::Finished(leaderboard) => {
            tracing::info!(%room_id, "game finished");
            let message = ServerMessage::GameFinished { leaderboard };
            broadcast_to_room(state, &room_id, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Card, Rank, Suit};
    use crate::domain::value_objects::{GameState, TurnPhase};

    fn coordinator() -> RoomCoordinator {
        RoomCoordinator::new(Some(42))
    }

    fn channel() -> (ClientChannel, mpsc::UnboundedReceiver<ServerMessage>) {
        mpsc::unbounded_channel()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            messages.push(msg);
        }
        messages
    }

    fn card(rank: Rank, suit: Suit) -> Card {
        Card::new(rank, suit, 0, false)
    }

    fn room_status(coord: &RoomCoordinator, room_id: &str) -> RoomStatus {
        let state = coord.state.lock().unwrap();
        let idx = room_index(&state, room_id).unwrap();
        state.rooms[idx].status
    }

    fn with_game<T>(
        coord: &RoomCoordinator,
        room_id: &str,
        f: impl FnOnce(&mut GameState) -> T,
    ) -> T {
        let mut state = coord.state.lock().unwrap();
        let idx = room_index(&state, room_id).unwrap();
        f(state.rooms[idx].game_state.as_mut().unwrap())
    }

    /// Two participants join room-1, submit names, and the game starts.
    fn start_two_player_game(
        coord: &RoomCoordinator,
    ) -> (
        mpsc::UnboundedReceiver<ServerMessage>,
        mpsc::UnboundedReceiver<ServerMessage>,
    ) {
        let (tx1, rx1) = channel();
        let (tx2, rx2) = channel();
        coord.join_room("room-1", "p1", tx1).unwrap();
        coord.join_room("room-1", "p2", tx2).unwrap();
        coord.handle_message(
            "room-1",
            "p1",
            ClientMessage::JoinLobby { player_name: "Ada".into() },
        );
        coord.handle_message(
            "room-1",
            "p2",
            ClientMessage::JoinLobby { player_name: "Bo".into() },
        );
        coord.handle_message("room-1", "p1", ClientMessage::StartGame);
        (rx1, rx2)
    }

    #[test]
    fn watcher_receives_snapshot_on_register() {
        let coord = coordinator();
        let (tx, mut rx) = channel();
        coord.register_watcher("w1", tx);

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            ServerMessage::RoomsUpdate { rooms } => {
                assert_eq!(rooms.len(), NUM_ROOMS);
                assert_eq!(rooms[0].room_id, "room-1");
                assert_eq!(rooms[0].room_name, "Room 1");
                assert!(rooms.iter().all(|r| r.status == RoomStatus::Empty));
            }
            other => panic!("expected rooms_update, got {other:?}"),
        }
    }

    #[test]
    fn unregister_unknown_watcher_is_silent() {
        let coord = coordinator();
        coord.unregister_watcher("never-registered");
    }

    #[test]
    fn join_unknown_room_is_rejected() {
        let coord = coordinator();
        let (tx, _rx) = channel();
        assert_eq!(
            coord.join_room("room-99", "p1", tx),
            Err(JoinRoomError::UnknownRoom)
        );
    }

    #[test]
    fn first_join_moves_room_to_gathering() {
        let coord = coordinator();
        let (wtx, mut wrx) = channel();
        coord.register_watcher("w1", wtx);
        drain(&mut wrx);

        let (tx, mut rx) = channel();
        coord.join_room("room-1", "p1", tx).unwrap();

        assert_eq!(room_status(&coord, "room-1"), RoomStatus::Gathering);

        let messages = drain(&mut rx);
        assert!(matches!(messages[0], ServerMessage::LobbyUpdate { .. }));
        assert!(matches!(messages[1], ServerMessage::RoomState { .. }));

        let watcher_messages = drain(&mut wrx);
        match watcher_messages.last().unwrap() {
            ServerMessage::RoomsUpdate { rooms } => {
                assert_eq!(rooms[0].status, RoomStatus::Gathering);
                assert_eq!(rooms[0].player_count, 1);
                assert_eq!(rooms[0].connected_players, 1);
            }
            other => panic!("expected rooms_update, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_join_replaces_channel_without_a_second_seat() {
        let coord = coordinator();
        let (tx_old, mut rx_old) = channel();
        let (tx_new, mut rx_new) = channel();
        coord.join_room("room-1", "p1", tx_old).unwrap();
        drain(&mut rx_old);

        coord.join_room("room-1", "p1", tx_new).unwrap();

        let state = coord.state.lock().unwrap();
        let idx = room_index(&state, "room-1").unwrap();
        assert_eq!(state.rooms[idx].player_ids, vec!["p1".to_string()]);
        assert_eq!(state.rooms[idx].player_count, 1);
        drop(state);

        // lobby snapshot lands on the new socket, the old one stays quiet
        assert!(!drain(&mut rx_new).is_empty());
        assert!(drain(&mut rx_old).is_empty());
    }

    #[test]
    fn ninth_join_is_rejected_as_full() {
        let coord = coordinator();
        for i in 1..=8 {
            let (tx, _rx) = channel();
            coord.join_room("room-1", &format!("p{i}"), tx).unwrap();
        }
        let (tx, _rx) = channel();
        assert_eq!(
            coord.join_room("room-1", "p9", tx),
            Err(JoinRoomError::RoomFull)
        );
    }

    #[test]
    fn stranger_is_rejected_while_game_runs() {
        let coord = coordinator();
        let _game = start_two_player_game(&coord);
        let (tx, _rx) = channel();
        assert_eq!(
            coord.join_room("room-1", "intruder", tx),
            Err(JoinRoomError::GameInProgress)
        );
    }

    #[test]
    fn reconnect_mid_game_replays_projection() {
        let coord = coordinator();
        let _game = start_two_player_game(&coord);
        let round_before = with_game(&coord, "room-1", |gs| gs.round_number);

        let (tx_new, mut rx_new) = channel();
        coord.join_room("room-1", "p1", tx_new).unwrap();

        assert_eq!(room_status(&coord, "room-1"), RoomStatus::InGame);
        assert_eq!(with_game(&coord, "room-1", |gs| gs.round_number), round_before);

        let messages = drain(&mut rx_new);
        let replay = messages
            .iter()
            .find_map(|m| match m {
                ServerMessage::GameState { state } => Some(state),
                _ => None,
            })
            .expect("reconnect must replay the current projection");
        let own = replay.players.iter().find(|p| p.id == "p1").unwrap();
        let other = replay.players.iter().find(|p| p.id == "p2").unwrap();
        assert_eq!(own.hand.len(), own.hand_count);
        assert!(!own.hand.is_empty());
        assert!(other.hand.is_empty());
        assert_eq!(other.hand_count, 3);
    }

    #[test]
    fn mid_game_disconnects_leave_the_room_in_game() {
        let coord = coordinator();
        let (_rx1, mut rx2) = start_two_player_game(&coord);
        drain(&mut rx2);

        assert!(coord.leave_room("room-1", "p1"));

        // the seat and the game survive; nothing lobby-related is broadcast
        assert_eq!(room_status(&coord, "room-1"), RoomStatus::InGame);
        let remaining = drain(&mut rx2);
        assert!(remaining
            .iter()
            .all(|m| !matches!(m, ServerMessage::LobbyUpdate { .. })));

        assert!(coord.leave_room("room-1", "p2"));
        assert_eq!(room_status(&coord, "room-1"), RoomStatus::InGame);
        let state = coord.state.lock().unwrap();
        let idx = room_index(&state, "room-1").unwrap();
        assert_eq!(state.rooms[idx].player_ids.len(), 2);
        assert!(state.rooms[idx].game_state.is_some());
    }

    #[test]
    fn leaving_before_the_game_frees_the_seat() {
        let coord = coordinator();
        let (tx1, _rx1) = channel();
        let (tx2, mut rx2) = channel();
        coord.join_room("room-1", "p1", tx1).unwrap();
        coord.join_room("room-1", "p2", tx2).unwrap();
        coord.handle_message(
            "room-1",
            "p1",
            ClientMessage::JoinLobby { player_name: "Ada".into() },
        );
        drain(&mut rx2);

        assert!(coord.leave_room("room-1", "p1"));
        assert_eq!(room_status(&coord, "room-1"), RoomStatus::Gathering);
        let messages = drain(&mut rx2);
        match messages.last().unwrap() {
            ServerMessage::LobbyUpdate { players, status, .. } => {
                assert!(players.is_empty());
                assert_eq!(status, "gathering");
            }
            other => panic!("expected lobby_update, got {other:?}"),
        }

        assert!(coord.leave_room("room-1", "p2"));
        assert_eq!(room_status(&coord, "room-1"), RoomStatus::Empty);
        assert!(!coord.leave_room("room-99", "p2"));
    }

    #[test]
    fn blank_lobby_name_is_rejected() {
        let coord = coordinator();
        let (tx, mut rx) = channel();
        coord.join_room("room-1", "p1", tx).unwrap();
        drain(&mut rx);

        coord.handle_message(
            "room-1",
            "p1",
            ClientMessage::JoinLobby { player_name: "   ".into() },
        );

        let messages = drain(&mut rx);
        assert!(matches!(
            messages.last().unwrap(),
            ServerMessage::Error { message } if message.contains("empty")
        ));
    }

    #[test]
    fn rejoining_the_lobby_renames_in_place() {
        let coord = coordinator();
        let (tx, mut rx) = channel();
        coord.join_room("room-1", "p1", tx).unwrap();
        coord.handle_message(
            "room-1",
            "p1",
            ClientMessage::JoinLobby { player_name: "Ada".into() },
        );
        coord.handle_message(
            "room-1",
            "p1",
            ClientMessage::JoinLobby { player_name: "  Ada Lovelace  ".into() },
        );

        let messages = drain(&mut rx);
        match messages.last().unwrap() {
            ServerMessage::LobbyUpdate { players, .. } => {
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].name, "Ada Lovelace");
            }
            other => panic!("expected lobby_update, got {other:?}"),
        }
    }

    #[test]
    fn leaving_the_lobby_removes_the_entry() {
        let coord = coordinator();
        let (tx, mut rx) = channel();
        coord.join_room("room-1", "p1", tx).unwrap();
        coord.handle_message(
            "room-1",
            "p1",
            ClientMessage::JoinLobby { player_name: "Ada".into() },
        );
        coord.handle_message("room-1", "p1", ClientMessage::LeaveLobby);

        let messages = drain(&mut rx);
        match messages.last().unwrap() {
            ServerMessage::LobbyUpdate { players, .. } => assert!(players.is_empty()),
            other => panic!("expected lobby_update, got {other:?}"),
        }
    }

    #[test]
    fn start_game_requires_enough_named_players() {
        let coord = coordinator();
        let (tx, mut rx) = channel();
        coord.join_room("room-1", "p1", tx).unwrap();
        coord.handle_message(
            "room-1",
            "p1",
            ClientMessage::JoinLobby { player_name: "Ada".into() },
        );
        drain(&mut rx);

        coord.handle_message("room-1", "p1", ClientMessage::StartGame);

        let messages = drain(&mut rx);
        assert!(matches!(messages.last().unwrap(), ServerMessage::Error { .. }));
        assert_eq!(room_status(&coord, "room-1"), RoomStatus::Gathering);
    }

    #[test]
    fn starting_the_game_deals_and_announces() {
        let coord = coordinator();
        let (mut rx1, _rx2) = start_two_player_game(&coord);

        assert_eq!(room_status(&coord, "room-1"), RoomStatus::InGame);

        let messages = drain(&mut rx1);
        let starting_at = messages
            .iter()
            .position(|m| matches!(m, ServerMessage::GameStarting { .. }))
            .expect("game_starting must be sent");
        let state_at = messages
            .iter()
            .position(|m| matches!(m, ServerMessage::GameState { .. }))
            .expect("game_state must follow");
        assert!(starting_at < state_at, "game_starting precedes game_state");

        match &messages[starting_at] {
            ServerMessage::GameStarting { room_id, players } => {
                assert_eq!(room_id, "room-1");
                let mut ids: Vec<&str> = players.iter().map(|p| p.id.as_str()).collect();
                ids.sort_unstable();
                assert_eq!(ids, vec!["p1", "p2"]);
            }
            other => panic!("expected game_starting, got {other:?}"),
        }
    }

    #[test]
    fn starting_twice_is_rejected() {
        let coord = coordinator();
        let (mut rx1, _rx2) = start_two_player_game(&coord);
        drain(&mut rx1);

        coord.handle_message("room-1", "p1", ClientMessage::StartGame);

        let messages = drain(&mut rx1);
        assert!(matches!(
            messages.last().unwrap(),
            ServerMessage::Error { message } if message.contains("in progress")
        ));
    }

    #[test]
    fn engine_refusal_reaches_only_the_offender() {
        let coord = coordinator();
        let (mut rx1, mut rx2) = start_two_player_game(&coord);
        drain(&mut rx1);
        drain(&mut rx2);

        let current = with_game(&coord, "room-1", |gs| gs.current_player().id.clone());
        let (offender, mut offender_rx, mut other_rx) = if current == "p1" {
            ("p2", rx2, rx1)
        } else {
            ("p1", rx1, rx2)
        };

        coord.handle_message(
            "room-1",
            offender,
            ClientMessage::DrawCard { source: DrawSource::Pile },
        );

        let messages = drain(&mut offender_rx);
        assert!(matches!(
            messages.last().unwrap(),
            ServerMessage::Error { message } if message.contains("not your turn")
        ));
        assert!(drain(&mut other_rx).is_empty());
    }

    #[test]
    fn draw_and_discard_broadcast_fresh_projections() {
        let coord = coordinator();
        let (mut rx1, mut rx2) = start_two_player_game(&coord);
        drain(&mut rx1);
        drain(&mut rx2);

        let current = with_game(&coord, "room-1", |gs| gs.current_player().id.clone());
        coord.handle_message(
            "room-1",
            &current,
            ClientMessage::DrawCard { source: DrawSource::Pile },
        );

        for rx in [&mut rx1, &mut rx2] {
            let messages = drain(rx);
            assert!(
                matches!(messages.last().unwrap(), ServerMessage::GameState { state }
                    if state.turn_phase == TurnPhase::Discard)
            );
        }

        let card_id = with_game(&coord, "room-1", |gs| gs.current_player().hand[0].id.clone());
        coord.handle_message("room-1", &current, ClientMessage::DiscardCard { card_id });
        for rx in [&mut rx1, &mut rx2] {
            let messages = drain(rx);
            assert!(
                matches!(messages.last().unwrap(), ServerMessage::GameState { state }
                    if state.turn_phase == TurnPhase::Draw)
            );
        }
    }

    #[test]
    fn going_out_announces_before_the_projection() {
        let coord = coordinator();
        let (mut rx1, mut rx2) = start_two_player_game(&coord);
        drain(&mut rx1);
        drain(&mut rx2);

        let current = with_game(&coord, "room-1", |gs| {
            let idx = gs.current_player_index;
            gs.players[idx].hand = vec![
                card(Rank::King, Suit::Hearts),
                card(Rank::King, Suit::Diamonds),
                card(Rank::King, Suit::Clubs),
                card(Rank::Ace, Suit::Spades),
            ];
            gs.turn_phase = TurnPhase::Discard;
            gs.players[idx].id.clone()
        });

        coord.handle_message(
            "room-1",
            &current,
            ClientMessage::GoOut { card_id: "ace_spades_0".into() },
        );

        for rx in [&mut rx1, &mut rx2] {
            let messages = drain(rx);
            let went_out_at = messages
                .iter()
                .position(|m| matches!(m, ServerMessage::PlayerWentOut { .. }))
                .expect("player_went_out must be broadcast");
            let state_at = messages
                .iter()
                .position(|m| matches!(m, ServerMessage::GameState { .. }))
                .expect("projection must follow");
            assert!(went_out_at < state_at);
            match &messages[went_out_at] {
                ServerMessage::PlayerWentOut { player_id, final_turns_remaining, .. } => {
                    assert_eq!(player_id, &current);
                    assert_eq!(*final_turns_remaining, 1);
                }
                other => panic!("expected player_went_out, got {other:?}"),
            }
        }
    }

    #[test]
    fn final_discard_broadcasts_round_over() {
        let coord = coordinator();
        let (mut rx1, mut rx2) = start_two_player_game(&coord);

        let current = with_game(&coord, "room-1", |gs| {
            let idx = gs.current_player_index;
            gs.players[idx].hand = vec![
                card(Rank::King, Suit::Hearts),
                card(Rank::King, Suit::Diamonds),
                card(Rank::King, Suit::Clubs),
                card(Rank::Ace, Suit::Spades),
            ];
            gs.turn_phase = TurnPhase::Discard;
            gs.players[idx].id.clone()
        });
        coord.handle_message(
            "room-1",
            &current,
            ClientMessage::GoOut { card_id: "ace_spades_0".into() },
        );

        // the other player takes the single final turn
        let other = with_game(&coord, "room-1", |gs| gs.current_player().id.clone());
        assert_ne!(other, current);
        coord.handle_message(
            "room-1",
            &other,
            ClientMessage::DrawCard { source: DrawSource::Pile },
        );
        let card_id = with_game(&coord, "room-1", |gs| gs.current_player().hand[0].id.clone());
        coord.handle_message("room-1", &other, ClientMessage::DiscardCard { card_id });

        assert_eq!(
            with_game(&coord, "room-1", |gs| gs.phase),
            GamePhase::Scoring
        );
        for rx in [&mut rx1, &mut rx2] {
            let messages = drain(rx);
            match messages.last().unwrap() {
                ServerMessage::RoundOver { round_number, results } => {
                    assert_eq!(*round_number, 1);
                    assert_eq!(results.len(), 2);
                    let gone_out = results.iter().find(|r| r.player_id == current).unwrap();
                    assert_eq!(gone_out.round_points, 0);
                }
                other => panic!("expected round_over, got {other:?}"),
            }
        }
    }

    #[test]
    fn next_round_confirmation_is_idempotent() {
        let coord = coordinator();
        let (mut rx1, mut rx2) = start_two_player_game(&coord);
        with_game(&coord, "room-1", |gs| gs.phase = GamePhase::Scoring);
        drain(&mut rx1);
        drain(&mut rx2);

        coord.handle_message("room-1", "p1", ClientMessage::NextRound);
        assert!(!drain(&mut rx2).is_empty(), "first confirm broadcasts progress");

        coord.handle_message("room-1", "p1", ClientMessage::NextRound);
        assert!(drain(&mut rx2).is_empty(), "repeat confirm is a silent no-op");
        assert_eq!(
            with_game(&coord, "room-1", |gs| gs.next_round_confirmed_by.len()),
            1
        );

        coord.handle_message("room-1", "p2", ClientMessage::NextRound);
        assert_eq!(with_game(&coord, "room-1", |gs| gs.round_number), 2);
        assert!(with_game(&coord, "room-1", |gs| gs.next_round_confirmed_by.is_empty()));
        let messages = drain(&mut rx1);
        assert!(matches!(
            messages.last().unwrap(),
            ServerMessage::GameState { state } if state.round_number == 2
        ));
    }

    #[test]
    fn next_round_outside_scoring_is_rejected() {
        let coord = coordinator();
        let (mut rx1, _rx2) = start_two_player_game(&coord);
        drain(&mut rx1);

        coord.handle_message("room-1", "p1", ClientMessage::NextRound);

        let messages = drain(&mut rx1);
        assert!(matches!(messages.last().unwrap(), ServerMessage::Error { .. }));
    }

    #[test]
    fn final_round_confirmation_finishes_with_ascending_leaderboard() {
        let coord = coordinator();
        let (mut rx1, _rx2) = start_two_player_game(&coord);
        with_game(&coord, "room-1", |gs| {
            gs.round_number = 11;
            gs.phase = GamePhase::Scoring;
            for p in &mut gs.players {
                p.cumulative_score = if p.id == "p1" { 55 } else { 30 };
            }
        });
        drain(&mut rx1);

        coord.handle_message("room-1", "p1", ClientMessage::NextRound);
        coord.handle_message("room-1", "p2", ClientMessage::NextRound);

        assert_eq!(
            with_game(&coord, "room-1", |gs| gs.phase),
            GamePhase::Finished
        );
        let messages = drain(&mut rx1);
        match messages.last().unwrap() {
            ServerMessage::GameFinished { leaderboard } => {
                assert_eq!(leaderboard.len(), 2);
                assert_eq!(leaderboard[0].player_id, "p2");
                assert_eq!(leaderboard[0].cumulative_score, 30);
                assert_eq!(leaderboard[1].player_id, "p1");
            }
            other => panic!("expected game_finished, got {other:?}"),
        }
    }

    #[test]
    fn end_game_resets_everything_and_tells_everyone() {
        let coord = coordinator();
        let (wtx, mut wrx) = channel();
        coord.register_watcher("w1", wtx);
        let (mut rx1, mut rx2) = start_two_player_game(&coord);
        drain(&mut rx1);
        drain(&mut rx2);
        drain(&mut wrx);

        coord.handle_message("room-1", "p1", ClientMessage::EndGame);

        for rx in [&mut rx1, &mut rx2] {
            let messages = drain(rx);
            assert!(matches!(
                messages.last().unwrap(),
                ServerMessage::LobbyReset { room_id } if room_id == "room-1"
            ));
        }

        let state = coord.state.lock().unwrap();
        let idx = room_index(&state, "room-1").unwrap();
        assert_eq!(state.rooms[idx].status, RoomStatus::Empty);
        assert!(state.rooms[idx].player_ids.is_empty());
        assert!(state.rooms[idx].lobby_players.is_empty());
        assert_eq!(state.rooms[idx].player_count, 0);
        assert!(state.rooms[idx].game_state.is_none());
        assert!(state
            .room_connections
            .get("room-1")
            .map(|conns| conns.is_empty())
            .unwrap_or(true));
        assert!(state.player_room_map.is_empty());
        drop(state);

        let watcher_messages = drain(&mut wrx);
        match watcher_messages.last().unwrap() {
            ServerMessage::RoomsUpdate { rooms } => {
                assert_eq!(rooms[0].status, RoomStatus::Empty);
                assert_eq!(rooms[0].connected_players, 0);
            }
            other => panic!("expected rooms_update, got {other:?}"),
        }
    }

    #[test]
    fn disconnect_resolves_the_room_through_the_reverse_map() {
        let coord = coordinator();
        let (tx, _rx) = channel();
        let handle = tx.clone();
        coord.join_room("room-2", "p1", tx).unwrap();

        assert!(coord.disconnect("p1", &handle));
        assert_eq!(room_status(&coord, "room-2"), RoomStatus::Empty);

        let (unknown_tx, _unknown_rx) = channel();
        assert!(!coord.disconnect("nobody", &unknown_tx));
    }

    #[test]
    fn stale_socket_teardown_spares_the_replacement() {
        let coord = coordinator();
        let (tx_old, _rx_old) = channel();
        let stale_handle = tx_old.clone();
        coord.join_room("room-1", "p1", tx_old).unwrap();

        let (tx_new, mut rx_new) = channel();
        coord.join_room("room-1", "p1", tx_new).unwrap();
        drain(&mut rx_new);

        // the replaced socket unwinds and runs its cleanup
        assert!(!coord.disconnect("p1", &stale_handle));
        assert_eq!(room_status(&coord, "room-1"), RoomStatus::Gathering);

        // the live connection still receives broadcasts
        let (tx2, _rx2) = channel();
        coord.join_room("room-1", "p2", tx2).unwrap();
        assert!(drain(&mut rx_new)
            .iter()
            .any(|m| matches!(m, ServerMessage::RoomState { .. })));
    }

    #[test]
    fn room_status_follows_the_lifecycle_automaton() {
        let coord = coordinator();
        assert_eq!(room_status(&coord, "room-1"), RoomStatus::Empty);

        let _game = start_two_player_game(&coord);
        assert_eq!(room_status(&coord, "room-1"), RoomStatus::InGame);

        coord.handle_message("room-1", "p1", ClientMessage::EndGame);
        assert_eq!(room_status(&coord, "room-1"), RoomStatus::Empty);

        // a fresh join restarts the cycle at GATHERING
        let (tx, _rx) = channel();
        coord.join_room("room-1", "p3", tx).unwrap();
        assert_eq!(room_status(&coord, "room-1"), RoomStatus::Gathering);
    }
}
