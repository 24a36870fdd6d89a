//! Combatants: hit points, conditions, concentration, and death saves.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::conditions::{ActiveCondition, Condition, ConditionKind};
use crate::dice::{roll_d20, Advantage, D20Roll, Roller};
use crate::error::{EngineError, EngineResult, Rejection};
use crate::progression::Ability;

/// Source tag used for the condition applied at 0 hit points.
pub const ZERO_HP_SOURCE: &str = "0 hit points";

/// Unique identifier for a combatant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CombatantId(pub Uuid);

impl CombatantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CombatantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CombatantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageType {
    Acid,
    Bludgeoning,
    Cold,
    Fire,
    Force,
    Lightning,
    Necrotic,
    Piercing,
    Poison,
    Psychic,
    Radiant,
    Slashing,
    Thunder,
}

impl DamageType {
    pub fn name(&self) -> &'static str {
        match self {
            DamageType::Acid => "acid",
            DamageType::Bludgeoning => "bludgeoning",
            DamageType::Cold => "cold",
            DamageType::Fire => "fire",
            DamageType::Force => "force",
            DamageType::Lightning => "lightning",
            DamageType::Necrotic => "necrotic",
            DamageType::Piercing => "piercing",
            DamageType::Poison => "poison",
            DamageType::Psychic => "psychic",
            DamageType::Radiant => "radiant",
            DamageType::Slashing => "slashing",
            DamageType::Thunder => "thunder",
        }
    }
}

impl fmt::Display for DamageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single instance of incoming damage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Damage {
    pub amount: u32,
    pub damage_type: DamageType,
    pub source: String,
    /// Critical hits inflict two death save failures on a dying target.
    pub critical: bool,
}

impl Damage {
    pub fn new(amount: u32, damage_type: DamageType, source: impl Into<String>) -> Self {
        Self {
            amount,
            damage_type,
            source: source.into(),
            critical: false,
        }
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }
}

// ============================================================================
// Death saves
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeathSaveResult {
    /// Natural 20: back on their feet with 1 hit point.
    Revived,
    Success,
    Failure,
    /// Natural 1: two failures.
    CriticalFailure,
}

impl DeathSaveResult {
    pub fn from_roll(natural: u32) -> Self {
        match natural {
            20 => DeathSaveResult::Revived,
            1 => DeathSaveResult::CriticalFailure,
            n if n >= 10 => DeathSaveResult::Success,
            _ => DeathSaveResult::Failure,
        }
    }
}

/// One death saving throw, kept for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathSaveRecord {
    pub roll: u32,
    pub result: DeathSaveResult,
    pub successes: u8,
    pub failures: u8,
    pub rolled_at: DateTime<Utc>,
}

/// Death saving throw counters and history.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeathSaves {
    pub successes: u8,
    pub failures: u8,
    pub history: Vec<DeathSaveRecord>,
}

impl DeathSaves {
    pub fn add_success(&mut self) {
        self.successes = (self.successes + 1).min(3);
    }

    pub fn add_failures(&mut self, count: u8) {
        self.failures = (self.failures + count).min(3);
    }

    pub fn is_stable(&self) -> bool {
        self.successes >= 3
    }

    pub fn is_dead(&self) -> bool {
        self.failures >= 3
    }

    /// Clear the counters. History is kept.
    pub fn reset(&mut self) {
        self.successes = 0;
        self.failures = 0;
    }
}

/// The combatant category, with category-specific state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatantKind {
    Player { death_saves: DeathSaves },
    /// NPCs make death saves only when the table tracks them.
    Npc { death_saves: Option<DeathSaves> },
    Monster,
}

impl CombatantKind {
    pub fn player() -> Self {
        CombatantKind::Player {
            death_saves: DeathSaves::default(),
        }
    }

    pub fn npc(tracks_death_saves: bool) -> Self {
        CombatantKind::Npc {
            death_saves: tracks_death_saves.then(DeathSaves::default),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CombatantKind::Player { .. } => "player",
            CombatantKind::Npc { .. } => "npc",
            CombatantKind::Monster => "monster",
        }
    }

    pub fn death_saves(&self) -> Option<&DeathSaves> {
        match self {
            CombatantKind::Player { death_saves } => Some(death_saves),
            CombatantKind::Npc { death_saves } => death_saves.as_ref(),
            CombatantKind::Monster => None,
        }
    }

    fn death_saves_mut(&mut self) -> Option<&mut DeathSaves> {
        match self {
            CombatantKind::Player { death_saves } => Some(death_saves),
            CombatantKind::Npc { death_saves } => death_saves.as_mut(),
            CombatantKind::Monster => None,
        }
    }
}

/// Where a combatant sits between fighting fit and dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LifeState {
    #[default]
    Conscious,
    /// At 0 hit points and making death saves.
    Dying,
    /// At 0 hit points, three successes, no longer rolling.
    Stable,
    Dead,
}

// ============================================================================
// Operation results
// ============================================================================

/// Concentration check triggered by damage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcentrationCheck {
    pub effect: String,
    pub dc: i32,
    pub roll: D20Roll,
    pub maintained: bool,
}

/// Result of [`Combatant::take_damage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageOutcome {
    pub amount: u32,
    pub damage_type: DamageType,
    pub absorbed_by_temp_hp: u32,
    pub hp_lost: u32,
    pub new_hp: u32,
    pub temp_hp: u32,
    pub became_unconscious: bool,
    pub killed: bool,
    /// Death save failures inflicted on a combatant already at 0 hit points.
    pub death_save_failures: u8,
    pub concentration_check: Option<ConcentrationCheck>,
    /// The concentration effect that ended, if any.
    pub concentration_lost: Option<String>,
}

/// Result of [`Combatant::heal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealOutcome {
    pub healed: u32,
    pub new_hp: u32,
    pub revived: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeathSaveOutcome {
    Success,
    Failure,
    Stabilized,
    Died,
    Revived,
}

/// Result of [`Combatant::roll_death_save`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathSaveReport {
    pub roll: u32,
    pub outcome: DeathSaveOutcome,
    pub successes: u8,
    pub failures: u8,
}

/// Result of an end-of-turn escape save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscapeAttempt {
    pub condition: Condition,
    pub ability: Ability,
    pub dc: i32,
    pub roll: D20Roll,
    pub escaped: bool,
}

// ============================================================================
// Combatant
// ============================================================================

/// A participant in an encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    pub id: CombatantId,
    pub name: String,
    pub kind: CombatantKind,
    max_hp: u32,
    current_hp: u32,
    temp_hp: u32,
    pub armor_class: u8,
    pub initiative_modifier: i32,
    /// Rolled initiative total, set when an encounter starts.
    pub initiative: Option<i32>,
    conditions: Vec<ActiveCondition>,
    /// The effect this combatant is concentrating on.
    pub concentration: Option<String>,
    pub save_modifiers: BTreeMap<Ability, i32>,
    life: LifeState,
}

impl Combatant {
    pub fn new(name: impl Into<String>, kind: CombatantKind, max_hp: u32) -> EngineResult<Self> {
        if max_hp == 0 {
            return Err(Rejection::InvalidMaxHp.into());
        }
        Ok(Self {
            id: CombatantId::new(),
            name: name.into(),
            kind,
            max_hp,
            current_hp: max_hp,
            temp_hp: 0,
            armor_class: 10,
            initiative_modifier: 0,
            initiative: None,
            conditions: Vec::new(),
            concentration: None,
            save_modifiers: BTreeMap::new(),
            life: LifeState::Conscious,
        })
    }

    pub fn with_armor_class(mut self, ac: u8) -> Self {
        self.armor_class = ac;
        self
    }

    pub fn with_initiative_modifier(mut self, modifier: i32) -> Self {
        self.initiative_modifier = modifier;
        self
    }

    pub fn with_save(mut self, ability: Ability, modifier: i32) -> Self {
        self.save_modifiers.insert(ability, modifier);
        self
    }

    /// Start below maximum hit points (e.g. a wounded character joining a fight).
    pub fn with_current_hp(mut self, hp: u32) -> Self {
        self.current_hp = hp.min(self.max_hp);
        if self.current_hp == 0 {
            if self.uses_death_saves() {
                self.drop_to_zero();
            } else {
                self.die();
            }
        }
        self
    }

    pub fn max_hp(&self) -> u32 {
        self.max_hp
    }

    pub fn current_hp(&self) -> u32 {
        self.current_hp
    }

    pub fn temp_hp(&self) -> u32 {
        self.temp_hp
    }

    pub fn life(&self) -> LifeState {
        self.life
    }

    pub fn is_alive(&self) -> bool {
        self.life != LifeState::Dead
    }

    pub fn is_unconscious(&self) -> bool {
        matches!(self.life, LifeState::Dying | LifeState::Stable)
    }

    pub fn is_stable(&self) -> bool {
        self.life == LifeState::Stable
    }

    pub fn uses_death_saves(&self) -> bool {
        self.kind.death_saves().is_some()
    }

    pub fn death_saves(&self) -> Option<&DeathSaves> {
        self.kind.death_saves()
    }

    pub fn conditions(&self) -> &[ActiveCondition] {
        &self.conditions
    }

    pub fn has_condition(&self, kind: ConditionKind) -> bool {
        self.conditions.iter().any(|c| c.kind() == kind)
    }

    pub fn condition(&self, kind: ConditionKind) -> Option<&ActiveCondition> {
        self.conditions.iter().find(|c| c.kind() == kind)
    }

    pub fn save_modifier(&self, ability: Ability) -> i32 {
        self.save_modifiers.get(&ability).copied().unwrap_or(0)
    }

    // ------------------------------------------------------------------------
    // Hit points
    // ------------------------------------------------------------------------

    /// Apply damage. Temporary hit points absorb it first.
    pub fn take_damage<R: Roller + ?Sized>(
        &mut self,
        damage: &Damage,
        roller: &mut R,
    ) -> EngineResult<DamageOutcome> {
        if self.life == LifeState::Dead {
            return Err(Rejection::TargetDead.into());
        }

        let absorbed = damage.amount.min(self.temp_hp);
        self.temp_hp -= absorbed;
        let remaining = damage.amount - absorbed;
        let hp_lost = remaining.min(self.current_hp);
        let overflow = remaining - hp_lost;
        let was_up = self.current_hp > 0;
        let held_concentration = self.concentration.clone();
        self.current_hp -= hp_lost;

        let mut outcome = DamageOutcome {
            amount: damage.amount,
            damage_type: damage.damage_type,
            absorbed_by_temp_hp: absorbed,
            hp_lost,
            new_hp: self.current_hp,
            temp_hp: self.temp_hp,
            became_unconscious: false,
            killed: false,
            death_save_failures: 0,
            concentration_check: None,
            concentration_lost: None,
        };

        if was_up && self.current_hp == 0 {
            // Damage left over after reaching 0 that matches max HP kills outright.
            if overflow >= self.max_hp || !self.uses_death_saves() {
                self.die();
                outcome.killed = true;
            } else {
                self.drop_to_zero();
                outcome.became_unconscious = true;
            }
        } else if !was_up && remaining > 0 {
            outcome.death_save_failures = if damage.critical { 2 } else { 1 };
            if remaining >= self.max_hp {
                self.die();
                outcome.killed = true;
            } else {
                self.life = LifeState::Dying;
                let failures = outcome.death_save_failures;
                if let Some(saves) = self.kind.death_saves_mut() {
                    if saves.is_stable() {
                        saves.reset();
                    }
                    saves.add_failures(failures);
                    if saves.is_dead() {
                        self.die();
                        outcome.killed = true;
                    }
                }
            }
        }

        // Taken before any death so a kill still reports the lost effect.
        if let Some(effect) = held_concentration {
            if self.current_hp == 0 {
                self.concentration = None;
                outcome.concentration_lost = Some(effect);
            } else if damage.amount > 0 {
                let dc = i32::try_from(damage.amount / 2).unwrap_or(i32::MAX).max(10);
                let roll = roll_d20(
                    roller,
                    self.save_modifier(Ability::Constitution),
                    Advantage::Normal,
                );
                let maintained = roll.meets_dc(dc);
                if !maintained {
                    self.concentration = None;
                    outcome.concentration_lost = Some(effect.clone());
                }
                debug!(
                    combatant = %self.name,
                    %effect,
                    dc,
                    total = roll.total,
                    maintained,
                    "Concentration check"
                );
                outcome.concentration_check = Some(ConcentrationCheck {
                    effect,
                    dc,
                    roll,
                    maintained,
                });
            }
        }

        debug!(
            combatant = %self.name,
            amount = damage.amount,
            damage_type = %damage.damage_type,
            source = %damage.source,
            hp = self.current_hp,
            temp_hp = self.temp_hp,
            "Damage applied"
        );
        Ok(outcome)
    }

    /// Restore hit points, up to the maximum. Healing a combatant at 0
    /// hit points brings them back.
    pub fn heal(&mut self, amount: u32) -> EngineResult<HealOutcome> {
        if self.life == LifeState::Dead {
            return Err(Rejection::TargetDead.into());
        }

        let before = self.current_hp;
        self.current_hp = (self.current_hp.saturating_add(amount)).min(self.max_hp);
        let revived = before == 0 && self.current_hp > 0;
        if revived {
            self.revive();
            info!(combatant = %self.name, hp = self.current_hp, "Revived by healing");
        }

        Ok(HealOutcome {
            healed: self.current_hp - before,
            new_hp: self.current_hp,
            revived,
        })
    }

    /// Set temporary hit points. The new value replaces any previous one.
    pub fn set_temp_hp(&mut self, amount: u32) -> EngineResult<()> {
        if self.life == LifeState::Dead {
            return Err(Rejection::TargetDead.into());
        }
        self.temp_hp = amount;
        Ok(())
    }

    /// Restore hit points and clear death save state after a long rest.
    /// Exhaustion drops by one level.
    pub fn long_rest(&mut self) -> EngineResult<()> {
        if self.life == LifeState::Dead {
            return Err(Rejection::TargetDead.into());
        }
        let was_down = self.current_hp == 0;
        self.current_hp = self.max_hp;
        self.temp_hp = 0;
        if was_down {
            self.revive();
        }

        if let Some(index) = self
            .conditions
            .iter()
            .position(|c| c.kind() == ConditionKind::Exhaustion)
        {
            match self.conditions[index].condition {
                Condition::Exhaustion(level) if level > 1 => {
                    self.conditions[index].condition = Condition::Exhaustion(level - 1);
                }
                _ => {
                    self.conditions.remove(index);
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Conditions
    // ------------------------------------------------------------------------

    /// Apply a condition, replacing any existing condition of the same kind.
    /// Returns the replaced instance.
    pub fn add_condition(
        &mut self,
        condition: ActiveCondition,
    ) -> EngineResult<Option<ActiveCondition>> {
        if self.life == LifeState::Dead {
            return Err(Rejection::TargetDead.into());
        }
        if let Condition::Exhaustion(level) = condition.condition {
            if !(1..=6).contains(&level) {
                return Err(Rejection::InvalidExhaustionLevel { level }.into());
            }
        }

        let replaced = self.remove_condition(condition.kind());
        debug!(combatant = %self.name, condition = %condition, source = %condition.source, "Condition applied");
        let lethal = condition.condition == Condition::Exhaustion(6);
        self.conditions.push(condition);
        if lethal {
            self.die();
        }
        Ok(replaced)
    }

    pub fn remove_condition(&mut self, kind: ConditionKind) -> Option<ActiveCondition> {
        let index = self.conditions.iter().position(|c| c.kind() == kind)?;
        Some(self.conditions.remove(index))
    }

    /// Count down timed conditions by one round and remove expired ones.
    pub fn tick_conditions(&mut self) -> Vec<ActiveCondition> {
        let mut expired = Vec::new();
        let mut kept = Vec::with_capacity(self.conditions.len());
        for mut condition in self.conditions.drain(..) {
            if condition.tick() {
                expired.push(condition);
            } else {
                kept.push(condition);
            }
        }
        self.conditions = kept;
        for condition in &expired {
            debug!(combatant = %self.name, condition = %condition.condition, "Condition expired");
        }
        expired
    }

    /// Roll escape saves for every condition that allows one, removing the
    /// conditions that are shaken off.
    pub fn roll_escape_saves<R: Roller + ?Sized>(&mut self, roller: &mut R) -> Vec<EscapeAttempt> {
        if self.life == LifeState::Dead {
            return Vec::new();
        }

        let mut attempts = Vec::new();
        let mut index = 0;
        while index < self.conditions.len() {
            let active = &self.conditions[index];
            let Some(save) = active.escape_save else {
                index += 1;
                continue;
            };
            let condition = active.condition;
            let roll = roll_d20(roller, self.save_modifier(save.ability), Advantage::Normal);
            let escaped = roll.meets_dc(save.dc);
            attempts.push(EscapeAttempt {
                condition,
                ability: save.ability,
                dc: save.dc,
                roll,
                escaped,
            });
            if escaped {
                self.conditions.remove(index);
            } else {
                index += 1;
            }
        }
        attempts
    }

    // ------------------------------------------------------------------------
    // Death saves
    // ------------------------------------------------------------------------

    /// Roll a death saving throw (plain d20, no modifiers).
    pub fn roll_death_save<R: Roller + ?Sized>(
        &mut self,
        roller: &mut R,
    ) -> EngineResult<DeathSaveReport> {
        if !self.uses_death_saves() {
            return Err(Rejection::NoDeathSaves.into());
        }
        match self.life {
            LifeState::Dying => {}
            LifeState::Dead => return Err(Rejection::TargetDead.into()),
            LifeState::Conscious | LifeState::Stable => return Err(Rejection::NotDying.into()),
        }

        let natural = roll_d20(roller, 0, Advantage::Normal).natural;
        let result = DeathSaveResult::from_roll(natural);

        let Some(saves) = self.kind.death_saves_mut() else {
            return Err(Rejection::NoDeathSaves.into());
        };
        match result {
            DeathSaveResult::Revived => saves.reset(),
            DeathSaveResult::Success => saves.add_success(),
            DeathSaveResult::Failure => saves.add_failures(1),
            DeathSaveResult::CriticalFailure => saves.add_failures(2),
        }
        let (successes, failures) = (saves.successes, saves.failures);
        saves.history.push(DeathSaveRecord {
            roll: natural,
            result,
            successes,
            failures,
            rolled_at: Utc::now(),
        });
        let dead = saves.is_dead();
        let stable = saves.is_stable();

        let outcome = if result == DeathSaveResult::Revived {
            self.current_hp = 1;
            self.revive();
            info!(combatant = %self.name, "Natural 20 on a death save");
            DeathSaveOutcome::Revived
        } else if dead {
            self.die();
            DeathSaveOutcome::Died
        } else if stable {
            self.life = LifeState::Stable;
            info!(combatant = %self.name, "Stabilized");
            DeathSaveOutcome::Stabilized
        } else if result == DeathSaveResult::Success {
            DeathSaveOutcome::Success
        } else {
            DeathSaveOutcome::Failure
        };

        debug!(combatant = %self.name, roll = natural, successes, failures, "Death save");
        Ok(DeathSaveReport {
            roll: natural,
            outcome,
            successes,
            failures,
        })
    }

    /// Stabilize a dying combatant without a roll (e.g. a Medicine check).
    pub fn stabilize(&mut self) -> EngineResult<()> {
        if self.life != LifeState::Dying {
            return Err(Rejection::NotDying.into());
        }
        self.life = LifeState::Stable;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Internal transitions
    // ------------------------------------------------------------------------

    fn drop_to_zero(&mut self) {
        self.current_hp = 0;
        self.life = LifeState::Dying;
        if let Some(saves) = self.kind.death_saves_mut() {
            saves.reset();
        }
        self.conditions.retain(|c| c.kind() != ConditionKind::Unconscious);
        self.conditions
            .push(ActiveCondition::new(Condition::Unconscious, ZERO_HP_SOURCE));
        info!(combatant = %self.name, "Dropped to 0 hit points");
    }

    fn revive(&mut self) {
        self.life = LifeState::Conscious;
        if let Some(saves) = self.kind.death_saves_mut() {
            saves.reset();
        }
        self.conditions.retain(|c| c.kind() != ConditionKind::Unconscious);
    }

    fn die(&mut self) {
        self.current_hp = 0;
        self.temp_hp = 0;
        self.life = LifeState::Dead;
        self.concentration = None;
        info!(combatant = %self.name, kind = self.kind.name(), "Died");
    }

    /// Verify the internal consistency of this combatant.
    pub fn check_invariants(&self) -> EngineResult<()> {
        let violation = if self.max_hp == 0 {
            Some("max_hp is 0".to_string())
        } else if self.current_hp > self.max_hp {
            Some(format!("current_hp {} exceeds max_hp {}", self.current_hp, self.max_hp))
        } else if (self.current_hp == 0) == (self.life == LifeState::Conscious) {
            Some(format!(
                "current_hp {} inconsistent with {:?}",
                self.current_hp, self.life
            ))
        } else if !self.uses_death_saves() && self.is_unconscious() {
            Some("combatant without death saves is dying".to_string())
        } else if self
            .death_saves()
            .is_some_and(|s| s.successes > 3 || s.failures > 3)
        {
            Some("death save counter above 3".to_string())
        } else if ConditionKind::all()
            .iter()
            .any(|kind| self.conditions.iter().filter(|c| c.kind() == *kind).count() > 1)
        {
            Some("duplicate condition kind".to_string())
        } else {
            None
        };

        match violation {
            Some(message) => {
                error!(combatant = %self.name, %message, "Invariant violation");
                Err(EngineError::InvariantViolation(format!("{}: {message}", self.name)))
            }
            None => Ok(()),
        }
    }
}
