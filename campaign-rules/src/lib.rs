//! Combat and character-resource rules engine for 5e-style campaigns.
//!
//! This crate provides:
//! - Encounters with initiative, turn order, and round processing
//! - Combatants with hit points, conditions, concentration, and death saves
//! - The spell-slot economy: caster archetypes, preparation, upcasting
//! - Experience and level progression with pending feature choices
//!
//! Every operation is a synchronous state transition. Rejected operations
//! return a reason-coded [`Rejection`] and leave state untouched. Static
//! tables live in [`RulesConfig`], and all randomness goes through the
//! [`Roller`] trait.
//!
//! # Quick Start
//!
//! ```no_run
//! use campaign_rules::{
//!     Combatant, CombatantKind, Damage, DamageType, EncounterStore, RngRoller,
//! };
//!
//! fn main() -> Result<(), campaign_rules::EngineError> {
//!     let mut roller = RngRoller::thread();
//!     let hero = Combatant::new("Thorin", CombatantKind::player(), 24)?;
//!     let goblin = Combatant::new("Goblin", CombatantKind::Monster, 7)?;
//!     let goblin_id = goblin.id;
//!
//!     let mut store = EncounterStore::new();
//!     let (id, _initiative) = store.start_encounter("Ambush", [hero, goblin], &mut roller)?;
//!
//!     let encounter = store.get_mut(id)?;
//!     let hit = Damage::new(5, DamageType::Slashing, "Thorin");
//!     let outcome = encounter.apply_damage(goblin_id, &hit, &mut roller)?;
//!     println!("Goblin has {} HP left", outcome.new_hp);
//!     encounter.advance_turn()?;
//!     Ok(())
//! }
//! ```

pub mod character;
pub mod combatant;
pub mod conditions;
pub mod config;
pub mod dice;
pub mod encounter;
pub mod error;
pub mod persist;
pub mod progression;
pub mod slots;
pub mod spellcasting;
pub mod spells;
pub mod testing;

// Primary public API
pub use character::{Character, CharacterId};
pub use combatant::{
    Combatant, CombatantId, CombatantKind, Damage, DamageOutcome, DamageType, DeathSaveOutcome,
    DeathSaveReport, HealOutcome, LifeState,
};
pub use conditions::{ActiveCondition, Condition, ConditionEffect, ConditionKind};
pub use config::{ConfigError, RulesConfig};
pub use dice::{roll, roll_d20, Advantage, D20Roll, DiceExpression, RngRoller, RollResult, Roller};
pub use encounter::{Encounter, EncounterId, EncounterState, EncounterStatus, EncounterStore, TurnAdvance};
pub use error::{EngineError, EngineResult, EntityKind, Rejection};
pub use persist::{PersistError, Snapshot};
pub use progression::{
    Ability, AbilityScores, CharacterClass, Improvement, LevelUpOutcome, Milestone,
    MilestoneAward, Progression, ProgressionMode, XpAward,
};
pub use slots::{CasterArchetype, SpellSlots};
pub use spellcasting::{CastOutcome, PrepareOutcome, PreparationStyle, Spellcaster};
pub use spells::{SpellCatalog, SpellDefinition};
