use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use meridian_protocol::{
    Action, BorderSourceKind, BorderSourceSnapshot, CityId, CitySnapshot, Event, EventScope,
    PathStep, PlayerId, PlayerSnapshot, Pos, SessionConfig, SessionId, SessionSnapshot,
    SessionStatus, TileDiff, TurnPhase, UnitId, UnitOrders, UnitSnapshot,
};

use crate::borders::BorderEngine;
use crate::city::City;
use crate::entities::EntityStore;
use crate::founding::{CityFoundingValidator, FoundingContext, FoundingError};
use crate::map::TileGrid;
use crate::path::{PathfindingEngine, RulesetCosts};
use crate::player::PlayerState;
use crate::rules::{load_named_ruleset, CompiledRules, RulesError};
use crate::unit::Unit;
use crate::visibility::VisibilityEngine;

/// Turns between city growth ticks during the production pass.
const GROWTH_INTERVAL: u32 = 5;
const MAX_CITY_POPULATION: u8 = 20;
/// Seat ceiling. Snapshot tile diffs pack exploration into a u16 bitmask
/// indexed by player id, so seats beyond 16 cannot be represented.
const MAX_SEATS: u8 = 16;

/// Why an action was discarded. The session itself is untouched whenever one
/// of these is returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("session is not active")]
    SessionNotActive,
    #[error("cannot change status from {0:?}")]
    InvalidTransition(SessionStatus),
    #[error("session already has the maximum number of players")]
    SessionFull,
    #[error("player {0:?} is not in this session")]
    UnknownPlayer(PlayerId),
    #[error("unit does not exist")]
    UnknownUnit,
    #[error("city does not exist")]
    UnknownCity,
    #[error("unit type {0:?} is not in the ruleset")]
    UnknownUnitType(String),
    #[error("unit belongs to another player")]
    NotYourUnit,
    #[error("action is not allowed during the {0:?} phase")]
    WrongPhase(TurnPhase),
    #[error("position {0:?} is outside the map")]
    OutOfBounds(Pos),
    #[error("no route to the target")]
    NoPath,
    #[error("unit has no movement left")]
    NoMovesLeft,
    #[error(transparent)]
    Founding(#[from] FoundingError),
}

/// Why a snapshot could not be rebuilt into a live session.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error(transparent)]
    Rules(#[from] RulesError),
    #[error("tile diff at {0:?} is outside the snapshot's map")]
    TileOutOfBounds(Pos),
    #[error("snapshot lists {players} players but the session allows {max}")]
    TooManyPlayers { players: usize, max: u8 },
}

/// Authoritative state machine for one match. Owns the map, the entity
/// stores, and the engines; every mutation flows through it and yields the
/// events clients should see.
///
/// Lifecycle: `Waiting → Active → (Paused ⇄ Active) → Ended`. Within Active,
/// each turn cycles `Movement → Production → Cleanup`; movement lasts until
/// every connected player has ended their turn or the caller forces an
/// advance (the turn timer lives in the server layer).
pub struct GameSession {
    session: SessionId,
    config: SessionConfig,
    rules: Arc<CompiledRules>,
    grid: TileGrid,
    units: EntityStore<Unit>,
    cities: EntityStore<City>,
    players: Vec<PlayerState>,
    borders: BorderEngine,
    visibility: VisibilityEngine,
    status: SessionStatus,
    turn: u32,
    phase: TurnPhase,
}

impl GameSession {
    /// Build a fresh session around an already-generated map. The map's
    /// dimensions win over whatever the config says.
    pub fn new(
        session: SessionId,
        mut config: SessionConfig,
        grid: TileGrid,
    ) -> Result<Self, RulesError> {
        let rules = Arc::new(load_named_ruleset(&config.ruleset)?);
        config.map_width = grid.width();
        config.map_height = grid.height();
        if config.max_players > MAX_SEATS {
            warn!(
                session = %session,
                requested = config.max_players,
                "max_players exceeds the seat ceiling, clamping"
            );
            config.max_players = MAX_SEATS;
        }

        let borders = BorderEngine::new(grid.len(), rules.settings.borders.clone());
        let visibility = VisibilityEngine::new(grid.len(), config.max_players as usize);

        Ok(Self {
            session,
            config,
            rules,
            grid,
            units: EntityStore::default(),
            cities: EntityStore::default(),
            players: Vec::new(),
            borders,
            visibility,
            status: SessionStatus::Waiting,
            turn: 0,
            phase: TurnPhase::Movement,
        })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn rules(&self) -> &CompiledRules {
        &self.rules
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn units(&self) -> &EntityStore<Unit> {
        &self.units
    }

    pub fn cities(&self) -> &EntityStore<City> {
        &self.cities
    }

    pub fn borders(&self) -> &BorderEngine {
        &self.borders
    }

    pub fn visibility(&self) -> &VisibilityEngine {
        &self.visibility
    }

    pub fn players(&self) -> &[PlayerState] {
        &self.players
    }

    // ---- roster -----------------------------------------------------------

    pub fn add_player(&mut self, name: &str) -> Result<PlayerId, ActionError> {
        if self.players.len() >= self.config.max_players as usize {
            return Err(ActionError::SessionFull);
        }
        let id = PlayerId(self.players.len() as u8);
        self.players.push(PlayerState::new(id, name.to_string()));
        debug!(session = %self.session, player = id.0, name, "player joined");
        Ok(id)
    }

    pub fn set_connected(
        &mut self,
        player: PlayerId,
        connected: bool,
    ) -> Result<Vec<(EventScope, Event)>, ActionError> {
        let state = self
            .players
            .get_mut(player.0 as usize)
            .ok_or(ActionError::UnknownPlayer(player))?;
        if state.connected == connected {
            return Ok(Vec::new());
        }
        state.connected = connected;
        state.touch();
        let event = if connected {
            Event::PlayerConnected { player }
        } else {
            Event::PlayerDisconnected { player }
        };
        Ok(vec![(EventScope::Session, event)])
    }

    // ---- lifecycle --------------------------------------------------------

    /// Waiting → Active: begin turn 1.
    pub fn start(&mut self) -> Result<Vec<(EventScope, Event)>, ActionError> {
        if self.status != SessionStatus::Waiting {
            return Err(ActionError::InvalidTransition(self.status));
        }
        self.status = SessionStatus::Active;
        self.turn = 1;
        self.phase = TurnPhase::Movement;

        let rules = &self.rules;
        for (_, unit) in self.units.iter_ordered_mut() {
            unit.begin_turn(rules);
        }

        let mut events = vec![
            (
                EventScope::Session,
                Event::SessionStatusChanged {
                    status: self.status,
                },
            ),
            (EventScope::Session, Event::TurnStarted { turn: self.turn }),
        ];
        self.refresh_all_visibility(&mut events);
        info!(session = %self.session, players = self.players.len(), "session started");
        Ok(events)
    }

    pub fn pause(&mut self) -> Result<Vec<(EventScope, Event)>, ActionError> {
        if self.status != SessionStatus::Active {
            return Err(ActionError::InvalidTransition(self.status));
        }
        self.status = SessionStatus::Paused;
        Ok(self.status_event())
    }

    pub fn resume(&mut self) -> Result<Vec<(EventScope, Event)>, ActionError> {
        if self.status != SessionStatus::Paused {
            return Err(ActionError::InvalidTransition(self.status));
        }
        self.status = SessionStatus::Active;
        Ok(self.status_event())
    }

    pub fn end(&mut self) -> Result<Vec<(EventScope, Event)>, ActionError> {
        if self.status == SessionStatus::Ended {
            return Err(ActionError::InvalidTransition(self.status));
        }
        self.status = SessionStatus::Ended;
        info!(session = %self.session, turn = self.turn, "session ended");
        Ok(self.status_event())
    }

    fn status_event(&self) -> Vec<(EventScope, Event)> {
        vec![(
            EventScope::Session,
            Event::SessionStatusChanged {
                status: self.status,
            },
        )]
    }

    // ---- setup ------------------------------------------------------------

    /// Place a unit directly; used at match setup, before the session starts
    /// handing out turns.
    pub fn spawn_unit(
        &mut self,
        owner: PlayerId,
        type_key: &str,
        pos: Pos,
    ) -> Result<(UnitId, Vec<(EventScope, Event)>), ActionError> {
        if (owner.0 as usize) >= self.players.len() {
            return Err(ActionError::UnknownPlayer(owner));
        }
        let type_id = self
            .rules
            .unit_type_id(type_key)
            .ok_or_else(|| ActionError::UnknownUnitType(type_key.to_string()))?;
        if !self.grid.in_bounds(pos) {
            return Err(ActionError::OutOfBounds(pos));
        }

        let unit = Unit::new(type_id, owner, pos, &self.rules);
        let id = self.units.insert(unit);

        let mut events = Vec::new();
        self.emit_to_observers(
            owner,
            pos,
            Event::UnitCreated {
                unit: id,
                type_id,
                pos,
                owner,
            },
            &mut events,
        );
        let revealed = self.visibility.refresh(&self.grid, &self.rules, &self.units, owner);
        events.extend(revealed.into_iter().map(|e| (EventScope::Player(owner), e)));
        Ok((id, events))
    }

    // ---- actions ----------------------------------------------------------

    /// Validate and apply one player action. Any `Err` leaves the session
    /// exactly as it was.
    pub fn apply_action(
        &mut self,
        player: PlayerId,
        action: Action,
    ) -> Result<Vec<(EventScope, Event)>, ActionError> {
        if self.status != SessionStatus::Active {
            return Err(ActionError::SessionNotActive);
        }
        if (player.0 as usize) >= self.players.len() {
            return Err(ActionError::UnknownPlayer(player));
        }

        match action {
            Action::Move { unit, target } => self.move_unit(player, unit, target),
            Action::FoundCity { unit, name } => self.found_city(player, unit, name),
            Action::Fortify { unit } => self.fortify(player, unit),
            Action::ClearOrders { unit } => self.clear_orders(player, unit),
            Action::EndTurn => self.end_turn(player),
        }
    }

    fn owned_unit(&self, player: PlayerId, unit: UnitId) -> Result<&Unit, ActionError> {
        let found = self.units.get(unit).ok_or(ActionError::UnknownUnit)?;
        if found.owner != player {
            return Err(ActionError::NotYourUnit);
        }
        Ok(found)
    }

    fn move_unit(
        &mut self,
        player: PlayerId,
        unit_id: UnitId,
        target: Pos,
    ) -> Result<Vec<(EventScope, Event)>, ActionError> {
        if self.phase != TurnPhase::Movement {
            return Err(ActionError::WrongPhase(self.phase));
        }
        let unit = self.owned_unit(player, unit_id)?;
        if unit.moves_left <= 0 {
            return Err(ActionError::NoMovesLeft);
        }
        let class = self
            .rules
            .unit_type(unit.type_id)
            .map(|t| t.class)
            .ok_or(ActionError::NoPath)?;
        let start = unit.position;

        let costs = RulesetCosts::new(&self.grid, &self.rules);
        let path = PathfindingEngine::find_path(&self.grid, &costs, class, start, target);
        if !path.valid {
            return Err(ActionError::NoPath);
        }

        let mut events = Vec::new();
        let arrived = self.walk_steps(unit_id, &path.steps, &mut events);
        if let Some(unit) = self.units.get_mut(unit_id) {
            unit.orders = if arrived {
                None
            } else {
                Some(UnitOrders::Goto { target })
            };
        }

        let revealed = self.visibility.refresh(&self.grid, &self.rules, &self.units, player);
        events.extend(revealed.into_iter().map(|e| (EventScope::Player(player), e)));
        Ok(events)
    }

    /// Move a unit along `steps` (the first step is its current tile) until
    /// its movement runs out. Returns whether it reached the final step.
    fn walk_steps(
        &mut self,
        unit_id: UnitId,
        steps: &[PathStep],
        events: &mut Vec<(EventScope, Event)>,
    ) -> bool {
        let Some(unit) = self.units.get_mut(unit_id) else {
            return false;
        };
        let mut traversed = vec![unit.position];
        for step in steps.iter().skip(1) {
            if unit.moves_left <= 0 {
                break;
            }
            unit.position = step.pos;
            unit.fortified = false;
            unit.spend_moves(step.cost);
            traversed.push(step.pos);
        }
        let arrived = traversed.len() == steps.len();
        let owner = unit.owner;
        let moves_left = unit.moves_left;

        if traversed.len() > 1 {
            self.emit_unit_moved(unit_id, owner, &traversed, moves_left, events);
        }
        arrived
    }

    fn found_city(
        &mut self,
        player: PlayerId,
        unit_id: UnitId,
        name: String,
    ) -> Result<Vec<(EventScope, Event)>, ActionError> {
        if self.phase != TurnPhase::Movement {
            return Err(ActionError::WrongPhase(self.phase));
        }
        let unit = self.owned_unit(player, unit_id)?;
        let pos = unit.position;
        CityFoundingValidator::validate(
            &self.grid,
            &self.rules,
            &self.cities,
            &self.borders,
            &self.visibility,
            player,
            pos,
            FoundingContext::Normal { unit },
        )?;
        CityFoundingValidator::check_enemy_occupancy(&self.rules, &self.units, player, pos)?;

        let mut events = Vec::new();

        // The founder is consumed by the new city.
        self.units.remove(unit_id);
        self.emit_to_observers(player, pos, Event::UnitDied { unit: unit_id }, &mut events);

        let city = City::new(name.clone(), pos, player);
        let population = city.population;
        let city_id = self.cities.insert(city);
        self.emit_to_observers(
            player,
            pos,
            Event::CityFounded {
                city: city_id,
                name: name.clone(),
                pos,
                owner: player,
            },
            &mut events,
        );

        let (_, changed) =
            self.borders
                .add_source(&self.grid, pos, player, BorderSourceKind::City, population);

        let revealed = self.visibility.refresh(&self.grid, &self.rules, &self.units, player);
        events.extend(revealed.into_iter().map(|e| (EventScope::Player(player), e)));
        self.emit_border_changes(&changed, &mut events);

        info!(session = %self.session, player = player.0, city = %name, ?pos, "city founded");
        Ok(events)
    }

    /// Remove a city and rebuild border ownership from the surviving sources.
    pub fn destroy_city(
        &mut self,
        city_id: CityId,
    ) -> Result<Vec<(EventScope, Event)>, ActionError> {
        let city = self.cities.remove(city_id).ok_or(ActionError::UnknownCity)?;
        let mut events = Vec::new();
        self.emit_to_observers(
            city.owner,
            city.position,
            Event::CityDestroyed { city: city_id },
            &mut events,
        );
        let changed = self.borders.remove_source_at(&self.grid, city.position);
        self.emit_border_changes(&changed, &mut events);
        Ok(events)
    }

    fn fortify(
        &mut self,
        player: PlayerId,
        unit_id: UnitId,
    ) -> Result<Vec<(EventScope, Event)>, ActionError> {
        if self.phase != TurnPhase::Movement {
            return Err(ActionError::WrongPhase(self.phase));
        }
        self.owned_unit(player, unit_id)?;
        let (owner, pos) = {
            let unit = self.units.get_mut(unit_id).ok_or(ActionError::UnknownUnit)?;
            unit.fortified = true;
            unit.orders = Some(UnitOrders::Fortify);
            (unit.owner, unit.position)
        };
        let mut events = Vec::new();
        self.emit_to_observers(owner, pos, Event::UnitFortified { unit: unit_id }, &mut events);
        Ok(events)
    }

    fn clear_orders(
        &mut self,
        player: PlayerId,
        unit_id: UnitId,
    ) -> Result<Vec<(EventScope, Event)>, ActionError> {
        self.owned_unit(player, unit_id)?;
        if let Some(unit) = self.units.get_mut(unit_id) {
            unit.orders = None;
            unit.fortified = false;
        }
        Ok(Vec::new())
    }

    fn end_turn(&mut self, player: PlayerId) -> Result<Vec<(EventScope, Event)>, ActionError> {
        let state = self
            .players
            .get_mut(player.0 as usize)
            .ok_or(ActionError::UnknownPlayer(player))?;
        state.turn_ended = true;
        state.touch();

        let mut events = vec![(EventScope::Session, Event::TurnEnded { player })];

        let connected: Vec<_> = self.players.iter().filter(|p| p.connected).collect();
        let all_done = !connected.is_empty() && connected.iter().all(|p| p.turn_ended);
        if all_done {
            events.extend(self.advance_turn());
        }
        Ok(events)
    }

    // ---- turn advance -----------------------------------------------------

    /// Run the production and cleanup passes and open the next turn. The
    /// server layer also calls this when the turn timer elapses.
    pub fn advance_turn(&mut self) -> Vec<(EventScope, Event)> {
        if self.status != SessionStatus::Active {
            return Vec::new();
        }
        let mut events = Vec::new();

        self.phase = TurnPhase::Production;
        events.push((
            EventScope::Session,
            Event::PhaseChanged {
                turn: self.turn,
                phase: self.phase,
            },
        ));
        self.run_production(&mut events);

        self.phase = TurnPhase::Cleanup;
        events.push((
            EventScope::Session,
            Event::PhaseChanged {
                turn: self.turn,
                phase: self.phase,
            },
        ));
        for player in &mut self.players {
            player.turn_ended = false;
        }

        self.turn += 1;
        self.phase = TurnPhase::Movement;
        let rules = &self.rules;
        for (_, unit) in self.units.iter_ordered_mut() {
            unit.begin_turn(rules);
        }
        events.push((EventScope::Session, Event::TurnStarted { turn: self.turn }));

        self.resolve_goto_orders(&mut events);
        self.refresh_all_visibility(&mut events);

        debug!(session = %self.session, turn = self.turn, "turn advanced");
        events
    }

    /// Cities grow on a fixed cadence; border strength follows population.
    fn run_production(&mut self, events: &mut Vec<(EventScope, Event)>) {
        if self.turn == 0 || self.turn % GROWTH_INTERVAL != 0 {
            return;
        }
        let mut grown: Vec<(Pos, u8)> = Vec::new();
        for (_, city) in self.cities.iter_ordered_mut() {
            if city.population < MAX_CITY_POPULATION {
                city.population += 1;
                grown.push((city.position, city.population));
            }
        }
        let mut changed = Vec::new();
        for (position, population) in grown {
            changed.extend(self.borders.sync_city_population(&self.grid, position, population));
        }
        changed.sort_unstable();
        changed.dedup();
        self.emit_border_changes(&changed, events);
    }

    /// Replay stored goto orders with the refilled movement, re-pathing from
    /// each unit's current tile. Orders that can no longer be satisfied are
    /// dropped.
    fn resolve_goto_orders(&mut self, events: &mut Vec<(EventScope, Event)>) {
        let pending: Vec<_> = self
            .units
            .iter_ordered()
            .filter_map(|(id, unit)| match unit.orders {
                Some(UnitOrders::Goto { target }) => {
                    Some((id, unit.owner, unit.type_id, unit.position, target))
                }
                _ => None,
            })
            .collect();

        for (unit_id, owner, type_id, start, target) in pending {
            let Some(class) = self.rules.unit_type(type_id).map(|t| t.class) else {
                continue;
            };
            let costs = RulesetCosts::new(&self.grid, &self.rules);
            let path = PathfindingEngine::find_path(&self.grid, &costs, class, start, target);
            if !path.valid {
                if let Some(unit) = self.units.get_mut(unit_id) {
                    unit.orders = None;
                }
                continue;
            }
            let arrived = self.walk_steps(unit_id, &path.steps, events);
            if arrived {
                if let Some(unit) = self.units.get_mut(unit_id) {
                    unit.orders = None;
                }
            }
            let revealed = self.visibility.refresh(&self.grid, &self.rules, &self.units, owner);
            events.extend(revealed.into_iter().map(|e| (EventScope::Player(owner), e)));
        }
    }

    // ---- event scoping ----------------------------------------------------

    /// Deliver a world event to the owner and to every other player who can
    /// currently see the tile it happened on.
    fn emit_to_observers(
        &self,
        owner: PlayerId,
        pos: Pos,
        event: Event,
        out: &mut Vec<(EventScope, Event)>,
    ) {
        let Some(index) = self.grid.index_of(pos) else {
            return;
        };
        for player in &self.players {
            if player.id == owner || self.visibility.is_visible(player.id, index) {
                out.push((EventScope::Player(player.id), event.clone()));
            }
        }
        if self.players.is_empty() {
            out.push((EventScope::Player(owner), event));
        }
    }

    /// Movement is fogged per recipient. The owner hears the full traversal;
    /// every other player gets the event only if some traversed tile is in
    /// their sight, with the path cut down to exactly those tiles.
    fn emit_unit_moved(
        &self,
        unit_id: UnitId,
        owner: PlayerId,
        traversed: &[Pos],
        moves_left: i32,
        out: &mut Vec<(EventScope, Event)>,
    ) {
        for player in &self.players {
            let path: Vec<Pos> = if player.id == owner {
                traversed.to_vec()
            } else {
                traversed
                    .iter()
                    .copied()
                    .filter(|&pos| {
                        self.grid
                            .index_of(pos)
                            .is_some_and(|index| self.visibility.is_visible(player.id, index))
                    })
                    .collect()
            };
            if path.is_empty() {
                continue;
            }
            out.push((
                EventScope::Player(player.id),
                Event::UnitMoved {
                    unit: unit_id,
                    path,
                    moves_left,
                },
            ));
        }
    }

    /// Border deltas are fogged: each player only hears about tiles they
    /// have explored.
    fn emit_border_changes(&self, changed: &[usize], out: &mut Vec<(EventScope, Event)>) {
        if changed.is_empty() {
            return;
        }
        let ownership = self.borders.ownership();
        for player in &self.players {
            let tiles: Vec<(Pos, Option<PlayerId>)> = changed
                .iter()
                .filter(|&&index| self.visibility.is_explored(player.id, index))
                .filter_map(|&index| {
                    self.grid
                        .pos_at_index(index)
                        .map(|pos| (pos, ownership[index]))
                })
                .collect();
            if !tiles.is_empty() {
                out.push((
                    EventScope::Player(player.id),
                    Event::BordersChanged { tiles },
                ));
            }
        }
    }

    fn refresh_all_visibility(&mut self, events: &mut Vec<(EventScope, Event)>) {
        for id in 0..self.players.len() {
            let player = PlayerId(id as u8);
            let revealed = self.visibility.refresh(&self.grid, &self.rules, &self.units, player);
            events.extend(revealed.into_iter().map(|e| (EventScope::Player(player), e)));
        }
    }

    // ---- persistence ------------------------------------------------------

    /// Capture the session as sparse diffs against the all-ocean, unexplored
    /// baseline.
    pub fn snapshot(&self) -> SessionSnapshot {
        let baseline = self.rules.baseline_terrain();
        let mut tile_diffs = Vec::new();
        for (index, tile) in self.grid.tiles().iter().enumerate() {
            let Some(pos) = self.grid.pos_at_index(index) else {
                continue;
            };
            let mut explored_by = 0u16;
            for player in &self.players {
                if self.visibility.is_explored(player.id, index) {
                    explored_by |= 1 << player.id.0;
                }
            }
            let terrain = (tile.terrain != baseline).then_some(tile.terrain);
            let elevation = (tile.elevation != 0).then_some(tile.elevation);
            let river = tile.river.then_some(true);
            if terrain.is_some() || elevation.is_some() || river.is_some() || explored_by != 0 {
                tile_diffs.push(TileDiff {
                    pos,
                    terrain,
                    elevation,
                    river,
                    explored_by,
                });
            }
        }

        SessionSnapshot {
            session: self.session.clone(),
            config: self.config.clone(),
            status: self.status,
            turn: self.turn,
            phase: self.phase,
            players: self
                .players
                .iter()
                .map(|p| PlayerSnapshot {
                    id: p.id,
                    name: p.name.clone(),
                    connected: p.connected,
                    ready: p.ready,
                    turn_ended: p.turn_ended,
                })
                .collect(),
            tile_diffs,
            units: self
                .units
                .iter_ordered()
                .map(|(id, u)| UnitSnapshot {
                    id,
                    type_id: u.type_id,
                    owner: u.owner,
                    pos: u.position,
                    moves_left: u.moves_left,
                    fortified: u.fortified,
                    orders: u.orders.clone(),
                })
                .collect(),
            cities: self
                .cities
                .iter_ordered()
                .map(|(id, c)| CitySnapshot {
                    id,
                    name: c.name.clone(),
                    owner: c.owner,
                    pos: c.position,
                    population: c.population,
                })
                .collect(),
            border_sources: self
                .borders
                .sources()
                .map(|s| BorderSourceSnapshot {
                    id: s.id,
                    pos: s.position,
                    owner: s.owner,
                    kind: s.kind,
                })
                .collect(),
        }
    }

    /// Rebuild an equivalent live session from a snapshot. Border ownership
    /// is replayed from the persisted sources; visibility is recomputed from
    /// the restored units and explored masks.
    pub fn from_snapshot(mut snapshot: SessionSnapshot) -> Result<Self, RecoveryError> {
        let rules = Arc::new(load_named_ruleset(&snapshot.config.ruleset)?);
        snapshot.config.max_players = snapshot.config.max_players.min(MAX_SEATS);
        if snapshot.players.len() > snapshot.config.max_players as usize {
            return Err(RecoveryError::TooManyPlayers {
                players: snapshot.players.len(),
                max: snapshot.config.max_players,
            });
        }

        let baseline = rules.baseline_terrain();
        let mut grid = TileGrid::new(
            snapshot.config.map_width,
            snapshot.config.map_height,
            baseline,
        );
        let mut explored_masks = vec![0u16; grid.len()];
        for diff in &snapshot.tile_diffs {
            let Some(index) = grid.index_of(diff.pos) else {
                return Err(RecoveryError::TileOutOfBounds(diff.pos));
            };
            if let Some(tile) = grid.get_mut(diff.pos) {
                if let Some(terrain) = diff.terrain {
                    tile.terrain = terrain;
                }
                if let Some(elevation) = diff.elevation {
                    tile.elevation = elevation;
                }
                if let Some(river) = diff.river {
                    tile.river = river;
                }
            }
            explored_masks[index] = diff.explored_by;
        }

        let mut players = Vec::with_capacity(snapshot.players.len());
        for p in &snapshot.players {
            let mut state = PlayerState::new(p.id, p.name.clone());
            state.connected = p.connected;
            state.ready = p.ready;
            state.turn_ended = p.turn_ended;
            players.push(state);
        }

        let mut units = EntityStore::default();
        for u in &snapshot.units {
            units.insert_at(
                u.id,
                Unit {
                    type_id: u.type_id,
                    owner: u.owner,
                    position: u.pos,
                    moves_left: u.moves_left,
                    fortified: u.fortified,
                    orders: u.orders.clone(),
                },
            );
        }

        let mut cities = EntityStore::default();
        for c in &snapshot.cities {
            cities.insert_at(
                c.id,
                City {
                    name: c.name.clone(),
                    owner: c.owner,
                    position: c.pos,
                    population: c.population,
                },
            );
        }

        let mut borders = BorderEngine::new(grid.len(), rules.settings.borders.clone());
        for source in &snapshot.border_sources {
            // Strength and radius are derived, not persisted: a city source
            // re-reads its city's population.
            let population = cities
                .iter_ordered()
                .find(|(_, c)| c.position == source.pos && c.owner == source.owner)
                .map_or(1, |(_, c)| c.population);
            borders.add_source_with_id(source.id, source.pos, source.owner, source.kind, population);
        }
        borders.recompute_all(&grid);

        let mut visibility = VisibilityEngine::new(grid.len(), snapshot.config.max_players as usize);
        for p in &snapshot.players {
            if let Some(vis) = visibility.player_mut(p.id) {
                for (index, mask) in explored_masks.iter().enumerate() {
                    if mask & (1 << p.id.0) != 0 {
                        vis.mark_explored(index);
                    }
                }
            }
            visibility.refresh(&grid, &rules, &units, p.id);
        }

        info!(session = %snapshot.session, turn = snapshot.turn, "session recovered from snapshot");
        Ok(Self {
            session: snapshot.session,
            config: snapshot.config,
            rules,
            grid,
            units,
            cities,
            players,
            borders,
            visibility,
            status: snapshot.status,
            turn: snapshot.turn,
            phase: snapshot.phase,
        })
    }
}
