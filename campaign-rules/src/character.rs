//! Characters: a progression record plus an optional spellcaster.
//!
//! Keeps the spellcaster's level and ability modifier in step with the
//! progression record so level-ups report slot changes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::combatant::{Combatant, CombatantKind};
use crate::config::RulesConfig;
use crate::dice::Roller;
use crate::error::{EngineResult, Rejection};
use crate::progression::{
    Ability, AbilityScores, CharacterClass, Improvement, ImprovementOutcome, LevelUpOutcome,
    MilestoneAward, Progression, XpAward,
};
use crate::spellcasting::{CastOutcome, CharacterSpell, PrepareOutcome, Spellcaster};

/// Unique identifier for a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    pub progression: Progression,
    pub spellcaster: Option<Spellcaster>,
}

impl Character {
    /// A new level 1 character. Classes with a caster archetype get a
    /// spellcaster.
    pub fn new(
        name: impl Into<String>,
        class: CharacterClass,
        abilities: AbilityScores,
        rules: &RulesConfig,
    ) -> EngineResult<Self> {
        let progression = Progression::new(class, abilities, rules)?;
        let spellcaster = match rules.class(class)?.spellcasting_ability {
            Some(ability) => Some(Spellcaster::for_class(
                class,
                1,
                progression.abilities.modifier(ability),
                rules,
            )?),
            None => None,
        };
        Ok(Self {
            id: CharacterId::new(),
            name: name.into(),
            progression,
            spellcaster,
        })
    }

    pub fn class(&self) -> CharacterClass {
        self.progression.class
    }

    pub fn level(&self) -> u8 {
        self.progression.level
    }

    pub fn spellcaster(&self) -> EngineResult<&Spellcaster> {
        self.spellcaster
            .as_ref()
            .ok_or_else(|| Rejection::NotASpellcaster.into())
    }

    pub fn spellcaster_mut(&mut self) -> EngineResult<&mut Spellcaster> {
        self.spellcaster
            .as_mut()
            .ok_or_else(|| Rejection::NotASpellcaster.into())
    }

    pub fn spell_save_dc(&self) -> EngineResult<i32> {
        Ok(self.spellcaster()?.spell_save_dc())
    }

    pub fn spell_attack_bonus(&self) -> EngineResult<i32> {
        Ok(self.spellcaster()?.spell_attack_bonus())
    }

    pub fn award_xp(&mut self, amount: u32, rules: &RulesConfig) -> XpAward {
        self.progression.award_xp(amount, rules)
    }

    pub fn complete_milestone(&mut self, name: &str) -> EngineResult<MilestoneAward> {
        self.progression.complete_milestone(name)
    }

    /// Level up and recompute spell slots for the new level.
    pub fn level_up(
        &mut self,
        rules: &RulesConfig,
        hp_roll: Option<u32>,
        choices: &BTreeMap<String, String>,
    ) -> EngineResult<LevelUpOutcome> {
        let mut outcome = self.progression.level_up(rules, hp_roll, choices)?;
        if let Some(caster) = self.spellcaster.as_mut() {
            outcome.slot_changes = caster.set_level(rules, outcome.new_level);
        }
        Ok(outcome)
    }

    pub fn resolve_choice(&mut self, feature: &str, choice: &str) -> EngineResult<()> {
        self.progression.resolve_choice(feature, choice)
    }

    /// Spend an ability score improvement. A higher spellcasting ability
    /// raises the spellcasting modifier.
    pub fn apply_improvement(
        &mut self,
        improvement: Improvement,
        rules: &RulesConfig,
    ) -> EngineResult<ImprovementOutcome> {
        let outcome = self.progression.apply_improvement(improvement)?;
        if let (Some(caster), Some(ability)) = (
            self.spellcaster.as_mut(),
            rules.class(self.progression.class)?.spellcasting_ability,
        ) {
            caster.ability_modifier = self.progression.abilities.modifier(ability);
            debug!(character = %self.name, modifier = caster.ability_modifier, "Spellcasting modifier updated");
        }
        Ok(outcome)
    }

    pub fn learn_spell(&mut self, rules: &RulesConfig, spell: &str) -> EngineResult<&CharacterSpell> {
        self.spellcaster_mut()?.learn_spell(rules, spell)
    }

    pub fn prepare_spell(&mut self, spell: &str, prepare: bool) -> EngineResult<PrepareOutcome> {
        self.spellcaster_mut()?.prepare_spell(spell, prepare)
    }

    pub fn cast_spell<R: Roller + ?Sized>(
        &mut self,
        rules: &RulesConfig,
        spell: &str,
        slot_level: Option<u8>,
        roller: &mut R,
    ) -> EngineResult<CastOutcome> {
        self.spellcaster_mut()?
            .cast_spell(rules, spell, slot_level, roller)
    }

    /// Regain all spell slots.
    pub fn long_rest(&mut self) -> u32 {
        self.spellcaster.as_mut().map_or(0, Spellcaster::long_rest)
    }

    /// Regain pact magic slots.
    pub fn short_rest(&mut self) -> u32 {
        self.spellcaster.as_mut().map_or(0, Spellcaster::short_rest)
    }

    /// A player combatant at full health for this character.
    pub fn to_combatant(&self, armor_class: u8) -> EngineResult<Combatant> {
        let abilities = &self.progression.abilities;
        let mut combatant = Combatant::new(
            self.name.clone(),
            CombatantKind::player(),
            self.progression.max_hp,
        )?
        .with_armor_class(armor_class)
        .with_initiative_modifier(abilities.modifier(Ability::Dexterity));
        for ability in Ability::all() {
            combatant = combatant.with_save(ability, abilities.modifier(ability));
        }
        Ok(combatant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::SlotChange;
    use crate::testing::ScriptedRoller;

    fn rules() -> &'static RulesConfig {
        RulesConfig::standard().unwrap()
    }

    fn wizard() -> Character {
        Character::new(
            "Elara",
            CharacterClass::Wizard,
            AbilityScores::new(8, 14, 12, 16, 12, 10),
            rules(),
        )
        .unwrap()
    }

    #[test]
    fn test_caster_classes_get_spellcaster() {
        let elara = wizard();
        let caster = elara.spellcaster().unwrap();
        assert_eq!(caster.ability_modifier, 3);
        assert_eq!(caster.slots(rules()).available(1), 2);

        let mut brute = Character::new(
            "Grog",
            CharacterClass::Barbarian,
            AbilityScores::new(18, 12, 16, 8, 10, 8),
            rules(),
        )
        .unwrap();
        assert!(brute.spellcaster.is_none());
        assert_eq!(
            brute
                .cast_spell(rules(), "Fire Bolt", None, &mut ScriptedRoller::empty())
                .unwrap_err()
                .code(),
            "not_a_spellcaster"
        );
        assert_eq!(brute.prepare_spell("Bless", true).unwrap_err().code(), "not_a_spellcaster");
    }

    #[test]
    fn test_level_up_reports_slot_changes() {
        let mut elara = wizard();
        elara.award_xp(300, rules());
        let mut choices = BTreeMap::new();
        choices.insert("Arcane Tradition".to_string(), "School of Evocation".to_string());
        let outcome = elara.level_up(rules(), None, &choices).unwrap();
        assert_eq!(outcome.new_level, 2);
        assert_eq!(
            outcome.slot_changes,
            vec![SlotChange {
                level: 1,
                before: 2,
                after: 3
            }]
        );
        assert_eq!(elara.spellcaster().unwrap().level(), 2);
    }

    #[test]
    fn test_rejected_level_up_leaves_slots() {
        let mut elara = wizard();
        let before = elara.clone();
        assert_eq!(
            elara
                .level_up(rules(), None, &BTreeMap::new())
                .unwrap_err()
                .code(),
            "insufficient_experience"
        );
        assert_eq!(elara, before);
    }

    #[test]
    fn test_spell_save_dc_follows_level_and_ability() {
        let mut elara = wizard();
        assert_eq!(elara.spell_save_dc().unwrap(), 13);
        assert_eq!(elara.spell_attack_bonus().unwrap(), 5);

        // Level 5 raises proficiency to +3.
        elara.progression.mode = crate::progression::ProgressionMode::Milestone;
        let mut choices = BTreeMap::new();
        choices.insert("Arcane Tradition".to_string(), "School of Evocation".to_string());
        elara.level_up(rules(), None, &choices).unwrap();
        elara.level_up(rules(), None, &BTreeMap::new()).unwrap();
        elara.level_up(rules(), None, &BTreeMap::new()).unwrap();
        elara
            .apply_improvement(Improvement::Abilities(vec![(Ability::Intelligence, 2)]), rules())
            .unwrap();
        assert_eq!(elara.spell_save_dc().unwrap(), 14);
        elara.level_up(rules(), None, &BTreeMap::new()).unwrap();
        assert_eq!(elara.level(), 5);
        assert_eq!(elara.spell_save_dc().unwrap(), 15);
        assert_eq!(elara.spell_attack_bonus().unwrap(), 7);

        let brute = Character::new(
            "Grog",
            CharacterClass::Barbarian,
            AbilityScores::new(18, 12, 16, 8, 10, 8),
            rules(),
        )
        .unwrap();
        assert_eq!(brute.spell_save_dc().unwrap_err().code(), "not_a_spellcaster");
    }

    #[test]
    fn test_to_combatant() {
        let elara = wizard();
        let combatant = elara.to_combatant(12).unwrap();
        assert_eq!(combatant.max_hp(), 7);
        assert_eq!(combatant.initiative_modifier, 2);
        assert_eq!(combatant.save_modifier(Ability::Intelligence), 3);
        assert!(combatant.uses_death_saves());
    }
}
