//! Error taxonomy for the rules engine.
//!
//! Three families of failure are distinguished:
//!
//! - [`EngineError::NotFound`] for references to combatants, encounters,
//!   spells, or features that do not exist.
//! - [`EngineError::Rejected`] for operations that are valid requests but
//!   not allowed in the current state. These carry a [`Rejection`] reason
//!   code and never mutate the target.
//! - [`EngineError::InvariantViolation`] for internal bugs. These are only
//!   produced by the `check_invariants` helpers.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dice::DiceError;

/// The kind of entity a lookup failed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Combatant,
    Encounter,
    Spell,
    CharacterSpell,
    Feature,
    Class,
    Milestone,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Combatant => "combatant",
            EntityKind::Encounter => "encounter",
            EntityKind::Spell => "spell",
            EntityKind::CharacterSpell => "character spell",
            EntityKind::Feature => "feature",
            EntityKind::Class => "class",
            EntityKind::Milestone => "milestone",
        };
        write!(f, "{name}")
    }
}

/// Reason an operation was refused.
///
/// Every variant maps to a stable [`code`](Rejection::code) so hosts can
/// pick a message without inspecting the display text.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Rejection {
    // Encounter
    #[error("encounter is not active")]
    EncounterNotActive,
    #[error("encounter has already started")]
    EncounterAlreadyStarted,
    #[error("encounter has ended")]
    EncounterEnded,
    #[error("encounter has no combatants")]
    EmptyEncounter,
    #[error("combatant is already in this encounter")]
    DuplicateCombatant,

    // Combatant
    #[error("combatant is dead")]
    TargetDead,
    #[error("combatant is not dying")]
    NotDying,
    #[error("combatant does not make death saving throws")]
    NoDeathSaves,
    #[error("maximum hit points must be at least 1")]
    InvalidMaxHp,
    #[error("exhaustion level must be between 1 and 6, got {level}")]
    InvalidExhaustionLevel { level: u8 },

    // Spellcasting
    #[error("this character cannot cast spells")]
    NotASpellcaster,
    #[error("spell is not known")]
    SpellNotKnown,
    #[error("spell is already known")]
    SpellAlreadyKnown,
    #[error("spell is not on this class's spell list")]
    NotOnClassList,
    #[error("spell is not prepared")]
    SpellNotPrepared,
    #[error("spells of level {spell_level} are beyond this caster's reach")]
    SpellLevelTooHigh { spell_level: u8 },
    #[error("slot level {slot_level} is below the spell's level {spell_level}")]
    SlotBelowSpellLevel { slot_level: u8, spell_level: u8 },
    #[error("slot level {slot_level} is outside 1..=9")]
    InvalidSlotLevel { slot_level: u8 },
    #[error("no level {level} spell slots remaining")]
    SlotExhausted { level: u8 },
    #[error("preparation limit of {capacity} spells reached")]
    PreparationCapacity { capacity: u32 },
    #[error("spell is always prepared")]
    AlwaysPrepared,

    // Progression
    #[error("character is already at the maximum level")]
    AtMaxLevel,
    #[error("pending choices must be resolved first: {0:?}")]
    PendingChoices(Vec<String>),
    #[error("{needed} experience is needed for the next level, have {have}")]
    InsufficientExperience { have: u32, needed: u32 },
    #[error("hit die roll {roll} is outside 1..={hit_die}")]
    InvalidHitDieRoll { roll: u32, hit_die: u32 },
    #[error("invalid choice for {feature}: {choice}")]
    InvalidChoice { feature: String, choice: String },
    #[error("no ability score improvement is available")]
    NoImprovementAvailable,
    #[error("ability score improvement must total exactly 2 points")]
    InvalidImprovement,
    #[error("milestone already exists")]
    DuplicateMilestone,
    #[error("milestone is already completed")]
    MilestoneCompleted,
    #[error("milestone target level {level} is outside 2..=20")]
    InvalidMilestoneLevel { level: u8 },
}

impl Rejection {
    /// Stable machine-readable code for this rejection.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::EncounterNotActive => "encounter_not_active",
            Rejection::EncounterAlreadyStarted => "encounter_already_started",
            Rejection::EncounterEnded => "encounter_ended",
            Rejection::EmptyEncounter => "empty_encounter",
            Rejection::DuplicateCombatant => "duplicate_combatant",
            Rejection::TargetDead => "target_dead",
            Rejection::NotDying => "not_dying",
            Rejection::NoDeathSaves => "no_death_saves",
            Rejection::InvalidMaxHp => "invalid_max_hp",
            Rejection::InvalidExhaustionLevel { .. } => "invalid_exhaustion_level",
            Rejection::NotASpellcaster => "not_a_spellcaster",
            Rejection::SpellNotKnown => "spell_not_known",
            Rejection::SpellAlreadyKnown => "spell_already_known",
            Rejection::NotOnClassList => "not_on_class_list",
            Rejection::SpellNotPrepared => "spell_not_prepared",
            Rejection::SpellLevelTooHigh { .. } => "spell_level_too_high",
            Rejection::SlotBelowSpellLevel { .. } => "slot_below_spell_level",
            Rejection::InvalidSlotLevel { .. } => "invalid_slot_level",
            Rejection::SlotExhausted { .. } => "slot_exhausted",
            Rejection::PreparationCapacity { .. } => "preparation_capacity",
            Rejection::AlwaysPrepared => "always_prepared",
            Rejection::AtMaxLevel => "at_max_level",
            Rejection::PendingChoices(_) => "pending_choices",
            Rejection::InsufficientExperience { .. } => "insufficient_experience",
            Rejection::InvalidHitDieRoll { .. } => "invalid_hit_die_roll",
            Rejection::InvalidChoice { .. } => "invalid_choice",
            Rejection::NoImprovementAvailable => "no_improvement_available",
            Rejection::InvalidImprovement => "invalid_improvement",
            Rejection::DuplicateMilestone => "duplicate_milestone",
            Rejection::MilestoneCompleted => "milestone_completed",
            Rejection::InvalidMilestoneLevel { .. } => "invalid_milestone_level",
        }
    }
}

/// Error type returned by engine operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("dice error: {0}")]
    Dice(#[from] DiceError),
}

impl EngineError {
    pub fn not_found(kind: EntityKind, id: impl ToString) -> Self {
        EngineError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// The rejection reason, if this error is a rejection.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            EngineError::Rejected(r) => Some(r),
            _ => None,
        }
    }

    /// Stable code for the error, suitable for host-side message lookup.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "not_found",
            EngineError::Rejected(r) => r.code(),
            EngineError::InvariantViolation(_) => "invariant_violation",
            EngineError::Dice(_) => "invalid_dice",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
