//! Encounters: initiative, turn order, and round processing.
//!
//! An [`Encounter`] owns its combatants. Hosts keep encounters in an
//! [`EncounterStore`] and serialize calls per encounter; nothing here locks.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::combatant::{
    Combatant, CombatantId, CombatantKind, Damage, DamageOutcome, DeathSaveReport, EscapeAttempt,
    HealOutcome, LifeState,
};
use crate::conditions::{ActiveCondition, ConditionKind};
use crate::config::RulesConfig;
use crate::dice::{roll_d20, Advantage, D20Roll, Roller};
use crate::error::{EngineError, EngineResult, EntityKind, Rejection};
use crate::spellcasting::{CastOutcome, Spellcaster};

/// Unique identifier for an encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncounterId(pub Uuid);

impl EncounterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EncounterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EncounterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EncounterState {
    #[default]
    Inactive,
    Active,
    Ended,
}

/// Initiative rolled for one combatant at the start of an encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiativeEntry {
    pub combatant: CombatantId,
    pub name: String,
    pub roll: D20Roll,
}

/// A condition that ran out during end-of-round processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiredCondition {
    pub combatant: CombatantId,
    pub condition: ActiveCondition,
}

/// Result of [`Encounter::advance_turn`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnAdvance {
    pub round: u32,
    pub turn_index: usize,
    pub current: Option<CombatantId>,
    /// The turn wrapped and a new round began.
    pub new_round: bool,
    pub expired: Vec<ExpiredCondition>,
}

/// Result of [`Encounter::remove_combatant`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Removal {
    pub combatant: Combatant,
    /// Set when the removed combatant was acting and the turn passed on.
    pub turn_passed: Option<TurnAdvance>,
}

/// One line of an [`EncounterStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub id: CombatantId,
    pub name: String,
    pub kind: String,
    pub initiative: Option<i32>,
    pub current_hp: u32,
    pub max_hp: u32,
    pub temp_hp: u32,
    pub armor_class: u8,
    pub life: LifeState,
    pub conditions: Vec<String>,
    pub concentration: Option<String>,
    pub is_current: bool,
}

/// Plain-data snapshot of an encounter for narration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterStatus {
    pub id: EncounterId,
    pub name: String,
    pub state: EncounterState,
    pub round: u32,
    pub current: Option<CombatantId>,
    /// Combatants in turn order (insertion order before the start).
    pub entries: Vec<StatusEntry>,
}

/// A combat encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encounter {
    pub id: EncounterId,
    pub name: String,
    combatants: Vec<Combatant>,
    /// Turn order, built when the encounter starts.
    order: Vec<CombatantId>,
    round: u32,
    turn_index: usize,
    state: EncounterState,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl Encounter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EncounterId::new(),
            name: name.into(),
            combatants: Vec::new(),
            order: Vec::new(),
            round: 0,
            turn_index: 0,
            state: EncounterState::Inactive,
            started_at: None,
            ended_at: None,
        }
    }

    /// Add combatants before the encounter starts.
    pub fn with_combatants(mut self, combatants: impl IntoIterator<Item = Combatant>) -> Self {
        for combatant in combatants {
            if self.index_of(combatant.id).is_none() {
                self.combatants.push(combatant);
            }
        }
        self
    }

    pub fn state(&self) -> EncounterState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == EncounterState::Active
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn turn_index(&self) -> usize {
        self.turn_index
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn combatants(&self) -> &[Combatant] {
        &self.combatants
    }

    pub fn turn_order(&self) -> &[CombatantId] {
        &self.order
    }

    pub fn combatant(&self, id: CombatantId) -> EngineResult<&Combatant> {
        self.combatants
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Combatant, id))
    }

    pub fn combatant_mut(&mut self, id: CombatantId) -> EngineResult<&mut Combatant> {
        self.combatants
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Combatant, id))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Combatant> {
        self.combatants
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Whose turn it is.
    pub fn current_combatant(&self) -> Option<&Combatant> {
        if !self.is_active() {
            return None;
        }
        let id = *self.order.get(self.turn_index)?;
        self.combatants.iter().find(|c| c.id == id)
    }

    fn index_of(&self, id: CombatantId) -> Option<usize> {
        self.combatants.iter().position(|c| c.id == id)
    }

    /// Reject mutation of a finished encounter.
    fn ensure_open(&self) -> EngineResult<()> {
        if self.state == EncounterState::Ended {
            return Err(Rejection::EncounterEnded.into());
        }
        Ok(())
    }

    fn ensure_active(&self) -> EngineResult<()> {
        match self.state {
            EncounterState::Active => Ok(()),
            EncounterState::Ended => Err(Rejection::EncounterEnded.into()),
            EncounterState::Inactive => Err(Rejection::EncounterNotActive.into()),
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Roll initiative for everyone and begin round 1.
    ///
    /// Order is by total, then initiative modifier, then the order the
    /// combatants were added.
    pub fn start<R: Roller + ?Sized>(&mut self, roller: &mut R) -> EngineResult<Vec<InitiativeEntry>> {
        match self.state {
            EncounterState::Inactive => {}
            EncounterState::Active => return Err(Rejection::EncounterAlreadyStarted.into()),
            EncounterState::Ended => return Err(Rejection::EncounterEnded.into()),
        }
        if self.combatants.is_empty() {
            return Err(Rejection::EmptyEncounter.into());
        }

        let mut entries = Vec::with_capacity(self.combatants.len());
        for combatant in &mut self.combatants {
            let roll = roll_d20(roller, combatant.initiative_modifier, Advantage::Normal);
            combatant.initiative = Some(roll.total);
            entries.push(InitiativeEntry {
                combatant: combatant.id,
                name: combatant.name.clone(),
                roll,
            });
        }

        let mut ranked: Vec<(CombatantId, i32, i32)> = self
            .combatants
            .iter()
            .map(|c| (c.id, c.initiative.unwrap_or(i32::MIN), c.initiative_modifier))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)));
        self.order = ranked.into_iter().map(|(id, _, _)| id).collect();

        self.round = 1;
        self.turn_index = 0;
        self.state = EncounterState::Active;
        self.started_at = Some(Utc::now());

        info!(
            encounter = %self.name,
            combatants = self.combatants.len(),
            "Encounter started"
        );
        Ok(entries)
    }

    /// Move to the next turn. Wrapping past the last combatant starts a new
    /// round and counts down every timed condition once.
    pub fn advance_turn(&mut self) -> EngineResult<TurnAdvance> {
        if let Err(err) = self.ensure_active() {
            warn!(encounter = %self.name, state = ?self.state, "Turn advance on inactive encounter");
            return Err(err);
        }
        if self.order.is_empty() {
            return Err(Rejection::EmptyEncounter.into());
        }

        self.turn_index += 1;
        let mut new_round = false;
        let mut expired = Vec::new();
        if self.turn_index >= self.order.len() {
            self.turn_index = 0;
            expired = self.next_round();
            new_round = true;
        }

        let current = self.order.get(self.turn_index).copied();
        debug!(
            encounter = %self.name,
            round = self.round,
            turn = self.turn_index,
            "Turn advanced"
        );
        Ok(TurnAdvance {
            round: self.round,
            turn_index: self.turn_index,
            current,
            new_round,
            expired,
        })
    }

    fn next_round(&mut self) -> Vec<ExpiredCondition> {
        self.round += 1;
        let mut expired = Vec::new();
        for combatant in &mut self.combatants {
            for condition in combatant.tick_conditions() {
                expired.push(ExpiredCondition {
                    combatant: combatant.id,
                    condition,
                });
            }
        }
        debug!(encounter = %self.name, round = self.round, expired = expired.len(), "New round");
        expired
    }

    /// Finish the encounter. State is kept for inspection.
    pub fn end(&mut self) -> EngineResult<EncounterStatus> {
        self.ensure_active()?;
        self.state = EncounterState::Ended;
        self.ended_at = Some(Utc::now());
        info!(encounter = %self.name, rounds = self.round, "Encounter ended");
        Ok(self.status())
    }

    /// Add a combatant. In an active encounter they roll initiative and
    /// join the order without disturbing the current turn.
    pub fn add_combatant<R: Roller + ?Sized>(
        &mut self,
        mut combatant: Combatant,
        roller: &mut R,
    ) -> EngineResult<Option<D20Roll>> {
        self.ensure_open()?;
        if self.index_of(combatant.id).is_some() {
            return Err(Rejection::DuplicateCombatant.into());
        }

        let roll = if self.is_active() {
            let roll = roll_d20(roller, combatant.initiative_modifier, Advantage::Normal);
            combatant.initiative = Some(roll.total);
            let key = (roll.total, combatant.initiative_modifier);
            let position = self
                .order
                .iter()
                .position(|id| self.initiative_key(*id) < key)
                .unwrap_or(self.order.len());
            self.order.insert(position, combatant.id);
            if position <= self.turn_index && self.order.len() > 1 {
                self.turn_index += 1;
            }
            Some(roll)
        } else {
            None
        };

        debug!(encounter = %self.name, combatant = %combatant.name, initiative = ?combatant.initiative, "Combatant added");
        self.combatants.push(combatant);
        Ok(roll)
    }

    fn initiative_key(&self, id: CombatantId) -> (i32, i32) {
        self.combatant(id)
            .map(|c| (c.initiative.unwrap_or(i32::MIN), c.initiative_modifier))
            .unwrap_or((i32::MIN, i32::MIN))
    }

    /// Remove a combatant. If it was their turn, the next combatant acts
    /// immediately; removing the last in order ends the round.
    pub fn remove_combatant(&mut self, id: CombatantId) -> EngineResult<Removal> {
        self.ensure_open()?;
        let index = self
            .index_of(id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Combatant, id))?;
        let combatant = self.combatants.remove(index);

        let mut turn_passed = None;
        if let Some(position) = self.order.iter().position(|o| *o == id) {
            self.order.remove(position);
            if self.is_active() {
                if position < self.turn_index {
                    self.turn_index -= 1;
                } else if position == self.turn_index {
                    let mut new_round = false;
                    let mut expired = Vec::new();
                    if self.turn_index >= self.order.len() {
                        self.turn_index = 0;
                        if !self.order.is_empty() {
                            expired = self.next_round();
                            new_round = true;
                        }
                    }
                    turn_passed = Some(TurnAdvance {
                        round: self.round,
                        turn_index: self.turn_index,
                        current: self.order.get(self.turn_index).copied(),
                        new_round,
                        expired,
                    });
                }
            }
        }

        debug!(encounter = %self.name, combatant = %combatant.name, "Combatant removed");
        Ok(Removal {
            combatant,
            turn_passed,
        })
    }

    // ------------------------------------------------------------------------
    // Combatant operations
    // ------------------------------------------------------------------------

    pub fn apply_damage<R: Roller + ?Sized>(
        &mut self,
        id: CombatantId,
        damage: &Damage,
        roller: &mut R,
    ) -> EngineResult<DamageOutcome> {
        self.ensure_open()?;
        self.combatant_mut(id)?.take_damage(damage, roller)
    }

    pub fn apply_healing(&mut self, id: CombatantId, amount: u32) -> EngineResult<HealOutcome> {
        self.ensure_open()?;
        self.combatant_mut(id)?.heal(amount)
    }

    pub fn set_temp_hp(&mut self, id: CombatantId, amount: u32) -> EngineResult<()> {
        self.ensure_open()?;
        self.combatant_mut(id)?.set_temp_hp(amount)
    }

    pub fn apply_condition(
        &mut self,
        id: CombatantId,
        condition: ActiveCondition,
    ) -> EngineResult<Option<ActiveCondition>> {
        self.ensure_open()?;
        self.combatant_mut(id)?.add_condition(condition)
    }

    pub fn remove_condition(
        &mut self,
        id: CombatantId,
        kind: ConditionKind,
    ) -> EngineResult<Option<ActiveCondition>> {
        self.ensure_open()?;
        Ok(self.combatant_mut(id)?.remove_condition(kind))
    }

    pub fn roll_death_save<R: Roller + ?Sized>(
        &mut self,
        id: CombatantId,
        roller: &mut R,
    ) -> EngineResult<DeathSaveReport> {
        self.ensure_open()?;
        self.combatant_mut(id)?.roll_death_save(roller)
    }

    /// Roll escape saves for the combatant whose turn just ended.
    pub fn resolve_end_of_turn_saves<R: Roller + ?Sized>(
        &mut self,
        id: CombatantId,
        roller: &mut R,
    ) -> EngineResult<Vec<EscapeAttempt>> {
        self.ensure_active()?;
        let combatant = self.combatant_mut(id)?;
        let attempts = combatant.roll_escape_saves(roller);
        for attempt in attempts.iter().filter(|a| a.escaped) {
            debug!(combatant = %combatant.name, condition = %attempt.condition, "Escaped condition");
        }
        Ok(attempts)
    }

    /// Cast a spell for a combatant and keep their concentration in step
    /// with the caster's.
    pub fn cast_spell<R: Roller + ?Sized>(
        &mut self,
        caster_id: CombatantId,
        caster: &mut Spellcaster,
        rules: &RulesConfig,
        spell: &str,
        slot_level: Option<u8>,
        roller: &mut R,
    ) -> EngineResult<CastOutcome> {
        self.ensure_open()?;
        let combatant = self.combatant_mut(caster_id)?;
        if !combatant.is_alive() {
            return Err(Rejection::TargetDead.into());
        }

        // Concentration broken by damage has to be reflected on the caster,
        // but only once the cast goes through.
        let mut attempt = caster.clone();
        if combatant.concentration.is_none() {
            attempt.end_concentration();
        }
        let outcome = attempt.cast_spell(rules, spell, slot_level, roller)?;
        *caster = attempt;
        combatant.concentration = caster.concentration().map(str::to_string);
        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    pub fn status(&self) -> EncounterStatus {
        let current = self.current_combatant().map(|c| c.id);
        let ordered: Vec<&Combatant> = if self.order.is_empty() {
            self.combatants.iter().collect()
        } else {
            self.order
                .iter()
                .filter_map(|id| self.combatants.iter().find(|c| c.id == *id))
                .collect()
        };

        let entries = ordered
            .into_iter()
            .map(|c| StatusEntry {
                id: c.id,
                name: c.name.clone(),
                kind: c.kind.name().to_string(),
                initiative: c.initiative,
                current_hp: c.current_hp(),
                max_hp: c.max_hp(),
                temp_hp: c.temp_hp(),
                armor_class: c.armor_class,
                life: c.life(),
                conditions: c.conditions().iter().map(|a| a.to_string()).collect(),
                concentration: c.concentration.clone(),
                is_current: Some(c.id) == current,
            })
            .collect();

        EncounterStatus {
            id: self.id,
            name: self.name.clone(),
            state: self.state,
            round: self.round,
            current,
            entries,
        }
    }

    /// Combatants that are still alive.
    pub fn living(&self) -> impl Iterator<Item = &Combatant> {
        self.combatants.iter().filter(|c| c.is_alive())
    }

    /// Every player combatant is dead or down.
    pub fn players_defeated(&self) -> bool {
        self.combatants
            .iter()
            .filter(|c| matches!(c.kind, CombatantKind::Player { .. }))
            .all(|c| !c.is_alive() || c.is_unconscious())
    }

    /// Verify the encounter and every combatant in it.
    pub fn check_invariants(&self) -> EngineResult<()> {
        for combatant in &self.combatants {
            combatant.check_invariants()?;
        }

        let violation = if self.state != EncounterState::Inactive {
            let mut sorted_order = self.order.clone();
            sorted_order.sort();
            let mut ids: Vec<CombatantId> = self.combatants.iter().map(|c| c.id).collect();
            ids.sort();
            if sorted_order != ids {
                Some("turn order does not match combatants".to_string())
            } else if !self.order.is_empty() && self.turn_index >= self.order.len() {
                Some(format!(
                    "turn index {} out of range for {} combatants",
                    self.turn_index,
                    self.order.len()
                ))
            } else if self.round == 0 {
                Some("started encounter in round 0".to_string())
            } else {
                None
            }
        } else {
            None
        };

        match violation {
            Some(message) => {
                error!(encounter = %self.name, %message, "Invariant violation");
                Err(EngineError::InvariantViolation(format!("{}: {message}", self.name)))
            }
            None => Ok(()),
        }
    }
}

// ============================================================================
// Store
// ============================================================================

/// Encounters by id, owned by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterStore {
    encounters: HashMap<EncounterId, Encounter>,
}

impl EncounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an encounter from combatants and start it.
    pub fn start_encounter<R: Roller + ?Sized>(
        &mut self,
        name: impl Into<String>,
        combatants: impl IntoIterator<Item = Combatant>,
        roller: &mut R,
    ) -> EngineResult<(EncounterId, Vec<InitiativeEntry>)> {
        let mut encounter = Encounter::new(name).with_combatants(combatants);
        let initiative = encounter.start(roller)?;
        let id = encounter.id;
        self.encounters.insert(id, encounter);
        Ok((id, initiative))
    }

    pub fn insert(&mut self, encounter: Encounter) -> EncounterId {
        let id = encounter.id;
        self.encounters.insert(id, encounter);
        id
    }

    pub fn get(&self, id: EncounterId) -> EngineResult<&Encounter> {
        self.encounters
            .get(&id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Encounter, id))
    }

    pub fn get_mut(&mut self, id: EncounterId) -> EngineResult<&mut Encounter> {
        self.encounters
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Encounter, id))
    }

    pub fn remove(&mut self, id: EncounterId) -> EngineResult<Encounter> {
        self.encounters
            .remove(&id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Encounter, id))
    }

    pub fn advance_turn(&mut self, id: EncounterId) -> EngineResult<TurnAdvance> {
        self.get_mut(id)?.advance_turn()
    }

    pub fn end_encounter(&mut self, id: EncounterId) -> EngineResult<EncounterStatus> {
        self.get_mut(id)?.end()
    }

    pub fn active(&self) -> impl Iterator<Item = &Encounter> {
        self.encounters.values().filter(|e| e.is_active())
    }

    pub fn len(&self) -> usize {
        self.encounters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encounters.is_empty()
    }
}
