//! Spell preparation and casting.
//!
//! A [`Spellcaster`] tracks the spells a character knows, which of them are
//! prepared, and how many slots have been expended. Slot totals are derived
//! from the rules tables each time they are needed.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::combatant::DamageType;
use crate::config::RulesConfig;
use crate::dice::{DiceExpression, RollResult, Roller};
use crate::error::{EngineError, EngineResult, EntityKind, Rejection};
use crate::progression::{proficiency_bonus, CharacterClass, MAX_LEVEL};
use crate::slots::{diff_totals, CasterArchetype, SlotChange, SpellSlots, SPELL_LEVELS};
use crate::spells::{ScalingDice, SpellDefinition};

/// Token in effect dice replaced by the spellcasting ability modifier.
const MODIFIER_TOKEN: &str = "MOD";

/// How a class readies its spells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreparationStyle {
    /// Every known spell is always ready (bard, sorcerer, warlock).
    Known,
    /// Spells are prepared from the known list up to a capacity.
    Prepared,
}

/// A spell in a character's repertoire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSpell {
    pub name: String,
    pub level: u8,
    pub prepared: bool,
}

impl CharacterSpell {
    pub fn is_cantrip(&self) -> bool {
        self.level == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectKind {
    Damage(DamageType),
    Healing,
}

/// A rolled spell effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpellEffect {
    pub kind: EffectKind,
    /// Notation after modifier substitution.
    pub dice: String,
    pub roll: RollResult,
}

impl SpellEffect {
    pub fn amount(&self) -> u32 {
        self.roll.total.max(0) as u32
    }
}

/// Result of [`Spellcaster::cast_spell`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastOutcome {
    pub spell: String,
    pub spell_level: u8,
    /// The slot level spent, `None` for cantrips.
    pub slot_consumed: Option<u8>,
    pub effects: Vec<SpellEffect>,
    pub concentration: bool,
    /// A previous concentration spell ended by this cast.
    pub concentration_dropped: Option<String>,
    pub slots_remaining: u32,
}

/// Result of [`Spellcaster::prepare_spell`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareOutcome {
    pub spell: String,
    pub prepared: bool,
    pub prepared_count: u32,
    pub capacity: u32,
}

/// A character's spell repertoire and slot usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spellcaster {
    pub class: CharacterClass,
    pub archetype: CasterArchetype,
    pub preparation: PreparationStyle,
    /// Class level used for slot tables, capacity, and cantrip scaling.
    level: u8,
    pub ability_modifier: i32,
    /// Learn from any class list (e.g. magical secrets).
    #[serde(default)]
    pub any_spell_list: bool,
    spells: Vec<CharacterSpell>,
    expended: [u32; SPELL_LEVELS],
    concentration: Option<String>,
}

impl Spellcaster {
    pub fn new(
        class: CharacterClass,
        archetype: CasterArchetype,
        preparation: PreparationStyle,
        level: u8,
        ability_modifier: i32,
    ) -> Self {
        Self {
            class,
            archetype,
            preparation,
            level: level.clamp(1, MAX_LEVEL),
            ability_modifier,
            any_spell_list: false,
            spells: Vec::new(),
            expended: [0; SPELL_LEVELS],
            concentration: None,
        }
    }

    /// A spellcaster configured from the class rules.
    pub fn for_class(
        class: CharacterClass,
        level: u8,
        ability_modifier: i32,
        rules: &RulesConfig,
    ) -> EngineResult<Self> {
        let class_rules = rules.class(class)?;
        if class_rules.caster == CasterArchetype::None {
            return Err(Rejection::NotASpellcaster.into());
        }
        let preparation = class_rules
            .preparation
            .unwrap_or(PreparationStyle::Prepared);
        Ok(Self::new(
            class,
            class_rules.caster,
            preparation,
            level,
            ability_modifier,
        ))
    }

    pub fn with_any_spell_list(mut self) -> Self {
        self.any_spell_list = true;
        self
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn spells(&self) -> &[CharacterSpell] {
        &self.spells
    }

    pub fn spell(&self, name: &str) -> Option<&CharacterSpell> {
        self.spells.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn concentration(&self) -> Option<&str> {
        self.concentration.as_deref()
    }

    /// Current slot pool.
    pub fn slots(&self, rules: &RulesConfig) -> SpellSlots {
        SpellSlots::from_parts(
            rules.slot_tables.totals(self.archetype, self.level),
            self.expended,
        )
    }

    /// DC for saving throws against this caster's spells:
    /// `8 + proficiency + modifier`.
    pub fn spell_save_dc(&self) -> i32 {
        8 + self.spell_attack_bonus()
    }

    pub fn spell_attack_bonus(&self) -> i32 {
        proficiency_bonus(self.level) + self.ability_modifier
    }

    /// Maximum number of prepared non-cantrip spells.
    pub fn preparation_capacity(&self) -> u32 {
        let base = match self.archetype {
            CasterArchetype::Half => self.level as i32 / 2,
            _ => self.level as i32,
        };
        (base + self.ability_modifier).max(1) as u32
    }

    pub fn prepared_count(&self) -> u32 {
        self.spells
            .iter()
            .filter(|s| !s.is_cantrip() && s.prepared)
            .count() as u32
    }

    /// Add a spell to the repertoire. Cantrips and spells of known casters
    /// are ready immediately.
    pub fn learn_spell(&mut self, rules: &RulesConfig, name: &str) -> EngineResult<&CharacterSpell> {
        let definition = rules
            .spells
            .get(name)
            .ok_or_else(|| EngineError::not_found(EntityKind::Spell, name))?;

        if self.spell(&definition.name).is_some() {
            return Err(Rejection::SpellAlreadyKnown.into());
        }
        if !self.any_spell_list && !definition.on_class_list(self.class) {
            return Err(Rejection::NotOnClassList.into());
        }
        if !definition.is_cantrip() {
            let highest = self.slots(rules).highest_level().unwrap_or(0);
            if definition.level > highest {
                return Err(Rejection::SpellLevelTooHigh {
                    spell_level: definition.level,
                }
                .into());
            }
        }

        let prepared = definition.is_cantrip() || self.preparation == PreparationStyle::Known;
        debug!(class = %self.class, spell = %definition.name, prepared, "Spell learned");
        self.spells.push(CharacterSpell {
            name: definition.name.clone(),
            level: definition.level,
            prepared,
        });
        let index = self.spells.len() - 1;
        Ok(&self.spells[index])
    }

    /// Remove a spell from the repertoire.
    pub fn forget_spell(&mut self, name: &str) -> EngineResult<CharacterSpell> {
        let index = self
            .spells
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| EngineError::not_found(EntityKind::CharacterSpell, name))?;
        let spell = self.spells.remove(index);
        if self
            .concentration
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(&spell.name))
        {
            self.concentration = None;
        }
        Ok(spell)
    }

    /// Prepare or unprepare a known spell.
    pub fn prepare_spell(&mut self, name: &str, prepare: bool) -> EngineResult<PrepareOutcome> {
        let capacity = self.preparation_capacity();
        let prepared_count = self.prepared_count();
        let preparation = self.preparation;

        let spell = self
            .spells
            .iter_mut()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| EngineError::not_found(EntityKind::CharacterSpell, name))?;

        if spell.is_cantrip() || preparation == PreparationStyle::Known {
            return Err(Rejection::AlwaysPrepared.into());
        }

        let mut new_count = prepared_count;
        if prepare && !spell.prepared {
            if prepared_count >= capacity {
                return Err(Rejection::PreparationCapacity { capacity }.into());
            }
            new_count += 1;
        } else if !prepare && spell.prepared {
            new_count -= 1;
        }
        spell.prepared = prepare;

        debug!(spell = %spell.name, prepare, prepared = new_count, capacity, "Preparation changed");
        Ok(PrepareOutcome {
            spell: spell.name.clone(),
            prepared: prepare,
            prepared_count: new_count,
            capacity,
        })
    }

    /// Cast a spell, spending one slot of `slot_level` (defaulting to the
    /// spell's level, or the pact slot level for pact casters).
    ///
    /// Nothing changes unless the cast succeeds.
    pub fn cast_spell<R: Roller + ?Sized>(
        &mut self,
        rules: &RulesConfig,
        name: &str,
        slot_level: Option<u8>,
        roller: &mut R,
    ) -> EngineResult<CastOutcome> {
        let definition = rules
            .spells
            .get(name)
            .ok_or_else(|| EngineError::not_found(EntityKind::Spell, name))?;
        let known = self
            .spell(&definition.name)
            .ok_or(Rejection::SpellNotKnown)?;
        if !known.prepared {
            return Err(Rejection::SpellNotPrepared.into());
        }

        let slots = self.slots(rules);
        let slot = if definition.is_cantrip() {
            None
        } else {
            let slot = match (slot_level, self.archetype) {
                (Some(level), _) => level,
                (None, CasterArchetype::Pact) => slots.highest_level().unwrap_or(definition.level),
                (None, _) => definition.level,
            };
            if slot < definition.level {
                return Err(Rejection::SlotBelowSpellLevel {
                    slot_level: slot,
                    spell_level: definition.level,
                }
                .into());
            }
            slots.check_available(slot)?;
            Some(slot)
        };

        let effect_level = slot.unwrap_or(0);
        let planned = self.plan_effects(definition, effect_level)?;

        // Validation done; apply.
        if let Some(slot) = slot {
            self.expended[slot as usize - 1] += 1;
        }
        let concentration_dropped = if definition.concentration {
            self.concentration.replace(definition.name.clone())
        } else {
            None
        };
        if let Some(dropped) = &concentration_dropped {
            debug!(dropped = %dropped, spell = %definition.name, "Concentration replaced");
        }

        let effects = planned
            .into_iter()
            .map(|(kind, dice, expression)| SpellEffect {
                kind,
                dice,
                roll: expression.roll_with(roller),
            })
            .collect();

        let slots_remaining = slot.map_or(0, |s| self.slots(rules).available(s));
        info!(
            class = %self.class,
            spell = %definition.name,
            slot = ?slot,
            slots_remaining,
            "Spell cast"
        );

        Ok(CastOutcome {
            spell: definition.name.clone(),
            spell_level: definition.level,
            slot_consumed: slot,
            effects,
            concentration: definition.concentration,
            concentration_dropped,
            slots_remaining,
        })
    }

    fn plan_effects(
        &self,
        definition: &SpellDefinition,
        slot_level: u8,
    ) -> EngineResult<Vec<(EffectKind, String, DiceExpression)>> {
        let mut planned = Vec::new();
        let mut add = |kind: EffectKind, scaling: &ScalingDice| -> EngineResult<()> {
            if let Some(dice) = scaling.dice_for(definition.level, slot_level, self.level) {
                let dice = self.substitute_modifier(dice);
                let expression = DiceExpression::parse(&dice)?;
                planned.push((kind, dice, expression));
            }
            Ok(())
        };
        if let Some(damage) = &definition.damage {
            add(EffectKind::Damage(damage.damage_type), &damage.dice)?;
        }
        if let Some(healing) = &definition.healing {
            add(EffectKind::Healing, healing)?;
        }
        Ok(planned)
    }

    fn substitute_modifier(&self, dice: &str) -> String {
        dice.replace(MODIFIER_TOKEN, &self.ability_modifier.to_string())
    }

    /// End the current concentration spell, returning it.
    pub fn end_concentration(&mut self) -> Option<String> {
        self.concentration.take()
    }

    /// Change class level. Returns the slot totals that changed.
    pub fn set_level(&mut self, rules: &RulesConfig, level: u8) -> Vec<SlotChange> {
        let before = rules.slot_tables.totals(self.archetype, self.level);
        self.level = level.clamp(1, MAX_LEVEL);
        let after = rules.slot_tables.totals(self.archetype, self.level);
        for (used, total) in self.expended.iter_mut().zip(after) {
            *used = (*used).min(total);
        }
        diff_totals(&before, &after)
    }

    /// Regain every expended slot. Returns the number restored.
    pub fn long_rest(&mut self) -> u32 {
        let restored: u32 = self.expended.iter().sum();
        self.expended = [0; SPELL_LEVELS];
        self.concentration = None;
        debug!(class = %self.class, restored, "Long rest");
        restored
    }

    /// Regain pact magic slots. Other archetypes regain nothing.
    pub fn short_rest(&mut self) -> u32 {
        if self.archetype != CasterArchetype::Pact {
            return 0;
        }
        let restored: u32 = self.expended.iter().sum();
        self.expended = [0; SPELL_LEVELS];
        debug!(class = %self.class, restored, "Pact slots restored");
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRoller;

    fn rules() -> &'static RulesConfig {
        RulesConfig::standard().unwrap()
    }

    fn wizard(level: u8) -> Spellcaster {
        Spellcaster::for_class(CharacterClass::Wizard, level, 3, rules()).unwrap()
    }

    #[test]
    fn test_non_caster_rejected() {
        let err = Spellcaster::for_class(CharacterClass::Fighter, 5, 0, rules()).unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::NotASpellcaster));
    }

    #[test]
    fn test_learn_spell_rules() {
        let mut caster = wizard(1);
        assert!(caster.learn_spell(rules(), "Fire Bolt").unwrap().prepared);
        assert!(!caster.learn_spell(rules(), "magic missile").unwrap().prepared);
        assert_eq!(caster.spell("Magic Missile").unwrap().name, "Magic Missile");

        assert_eq!(
            caster.learn_spell(rules(), "Magic Missile").unwrap_err().code(),
            "spell_already_known"
        );
        assert_eq!(
            caster.learn_spell(rules(), "Cure Wounds").unwrap_err().code(),
            "not_on_class_list"
        );
        assert_eq!(
            caster.learn_spell(rules(), "Fireball").unwrap_err(),
            EngineError::Rejected(Rejection::SpellLevelTooHigh { spell_level: 3 })
        );
        assert!(matches!(
            caster.learn_spell(rules(), "Wish"),
            Err(EngineError::NotFound { kind: EntityKind::Spell, .. })
        ));
    }

    #[test]
    fn test_known_casters_are_always_prepared() {
        let mut sorcerer = Spellcaster::for_class(CharacterClass::Sorcerer, 3, 3, rules()).unwrap();
        assert!(sorcerer.learn_spell(rules(), "Shield").unwrap().prepared);
        assert_eq!(
            sorcerer.prepare_spell("Shield", false).unwrap_err().code(),
            "always_prepared"
        );
    }

    #[test]
    fn test_preparation_capacity() {
        let mut caster = Spellcaster::for_class(CharacterClass::Wizard, 1, 1, rules()).unwrap();
        assert_eq!(caster.preparation_capacity(), 2);
        for spell in ["Magic Missile", "Shield", "Sleep"] {
            caster.learn_spell(rules(), spell).unwrap();
        }
        caster.prepare_spell("Magic Missile", true).unwrap();
        let outcome = caster.prepare_spell("Shield", true).unwrap();
        assert_eq!(outcome.prepared_count, 2);

        let before = caster.clone();
        assert_eq!(
            caster.prepare_spell("Sleep", true).unwrap_err(),
            EngineError::Rejected(Rejection::PreparationCapacity { capacity: 2 })
        );
        assert_eq!(caster, before);

        caster.prepare_spell("Shield", false).unwrap();
        assert!(caster.prepare_spell("Sleep", true).unwrap().prepared);
    }

    #[test]
    fn test_spell_save_dc_and_attack_bonus() {
        let novice = Spellcaster::for_class(CharacterClass::Wizard, 1, 3, rules()).unwrap();
        assert_eq!(novice.spell_attack_bonus(), 5);
        assert_eq!(novice.spell_save_dc(), 13);

        let archmage = Spellcaster::for_class(CharacterClass::Wizard, 17, 5, rules()).unwrap();
        assert_eq!(archmage.spell_attack_bonus(), 11);
        assert_eq!(archmage.spell_save_dc(), 19);
    }

    #[test]
    fn test_half_caster_capacity() {
        let paladin = Spellcaster::for_class(CharacterClass::Paladin, 7, 3, rules()).unwrap();
        assert_eq!(paladin.preparation_capacity(), 6);
        let weak = Spellcaster::for_class(CharacterClass::Paladin, 2, -1, rules()).unwrap();
        assert_eq!(weak.preparation_capacity(), 1);
    }

    #[test]
    fn test_cast_consumes_slot() {
        let mut caster = wizard(5);
        caster.learn_spell(rules(), "Magic Missile").unwrap();
        caster.prepare_spell("Magic Missile", true).unwrap();

        let mut roller = ScriptedRoller::new([1, 2, 3]);
        let outcome = caster
            .cast_spell(rules(), "Magic Missile", None, &mut roller)
            .unwrap();
        assert_eq!(outcome.slot_consumed, Some(1));
        assert_eq!(outcome.effects.len(), 1);
        assert_eq!(outcome.effects[0].dice, "3d4+3");
        assert_eq!(outcome.effects[0].amount(), 9);
        assert_eq!(outcome.slots_remaining, 3);
        assert_eq!(caster.slots(rules()).get(1).unwrap().used, 1);
    }

    #[test]
    fn test_upcast_uses_slot_level_effects() {
        let mut caster = wizard(5);
        caster.learn_spell(rules(), "Magic Missile").unwrap();
        caster.prepare_spell("Magic Missile", true).unwrap();
        let mut roller = ScriptedRoller::new([1; 5]);

        let outcome = caster
            .cast_spell(rules(), "Magic Missile", Some(3), &mut roller)
            .unwrap();
        assert_eq!(outcome.slot_consumed, Some(3));
        assert_eq!(outcome.effects[0].dice, "5d4+5");
        let slots = caster.slots(rules());
        assert_eq!(slots.get(1).unwrap().used, 0);
        assert_eq!(slots.get(3).unwrap().used, 1);
    }

    #[test]
    fn test_upcast_without_entry_uses_base_effect() {
        let mut caster = wizard(5);
        caster.learn_spell(rules(), "Thunderwave").unwrap();
        caster.prepare_spell("Thunderwave", true).unwrap();
        let outcome = caster
            .cast_spell(rules(), "Thunderwave", Some(3), &mut ScriptedRoller::new([4, 4]))
            .unwrap();
        assert_eq!(outcome.effects[0].dice, "2d8");
        assert_eq!(outcome.effects[0].amount(), 8);
    }

    #[test]
    fn test_healing_substitutes_modifier() {
        let mut cleric = Spellcaster::for_class(CharacterClass::Cleric, 3, 3, rules()).unwrap();
        cleric.learn_spell(rules(), "Cure Wounds").unwrap();
        cleric.prepare_spell("Cure Wounds", true).unwrap();
        let outcome = cleric
            .cast_spell(rules(), "Cure Wounds", Some(2), &mut ScriptedRoller::new([5, 6]))
            .unwrap();
        let effect = &outcome.effects[0];
        assert_eq!(effect.kind, EffectKind::Healing);
        assert_eq!(effect.dice, "2d8+3");
        assert_eq!(effect.amount(), 14);
    }

    #[test]
    fn test_rejected_casts_change_nothing() {
        let mut caster = wizard(1);
        caster.learn_spell(rules(), "Magic Missile").unwrap();
        caster.learn_spell(rules(), "Shield").unwrap();
        caster.prepare_spell("Magic Missile", true).unwrap();
        let mut roller = ScriptedRoller::new([1; 6]);
        caster.cast_spell(rules(), "Magic Missile", None, &mut roller).unwrap();
        caster.cast_spell(rules(), "Magic Missile", None, &mut roller).unwrap();

        let before = caster.clone();
        let err = caster
            .cast_spell(rules(), "Magic Missile", None, &mut roller)
            .unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::SlotExhausted { level: 1 }));
        assert_eq!(
            caster.cast_spell(rules(), "Shield", None, &mut roller).unwrap_err().code(),
            "spell_not_prepared"
        );
        assert_eq!(
            caster.cast_spell(rules(), "Fireball", Some(3), &mut roller).unwrap_err().code(),
            "spell_not_known"
        );
        assert_eq!(caster, before);
    }

    #[test]
    fn test_slot_below_spell_level() {
        let mut caster = wizard(5);
        caster.learn_spell(rules(), "Fireball").unwrap();
        caster.prepare_spell("Fireball", true).unwrap();
        let err = caster
            .cast_spell(rules(), "Fireball", Some(2), &mut ScriptedRoller::empty())
            .unwrap_err();
        assert_eq!(
            err.rejection(),
            Some(&Rejection::SlotBelowSpellLevel {
                slot_level: 2,
                spell_level: 3
            })
        );
    }

    #[test]
    fn test_cantrips_scale_and_cost_nothing() {
        let mut caster = wizard(5);
        caster.learn_spell(rules(), "Fire Bolt").unwrap();
        let outcome = caster
            .cast_spell(rules(), "Fire Bolt", Some(3), &mut ScriptedRoller::new([7, 2]))
            .unwrap();
        assert_eq!(outcome.slot_consumed, None);
        assert_eq!(outcome.effects[0].dice, "2d10");
        assert_eq!(outcome.effects[0].amount(), 9);
        assert_eq!(caster.slots(rules()).get(3).unwrap().used, 0);
    }

    #[test]
    fn test_new_concentration_replaces_old() {
        let mut cleric = Spellcaster::for_class(CharacterClass::Cleric, 3, 2, rules()).unwrap();
        for spell in ["Bless", "Hold Person"] {
            cleric.learn_spell(rules(), spell).unwrap();
            cleric.prepare_spell(spell, true).unwrap();
        }
        let mut roller = ScriptedRoller::empty();
        let first = cleric.cast_spell(rules(), "Bless", None, &mut roller).unwrap();
        assert!(first.concentration);
        assert_eq!(first.concentration_dropped, None);

        let second = cleric.cast_spell(rules(), "Hold Person", None, &mut roller).unwrap();
        assert_eq!(second.concentration_dropped.as_deref(), Some("Bless"));
        assert_eq!(cleric.concentration(), Some("Hold Person"));
    }

    #[test]
    fn test_pact_magic_and_short_rest() {
        let mut warlock = Spellcaster::for_class(CharacterClass::Warlock, 5, 3, rules()).unwrap();
        warlock.learn_spell(rules(), "Hex").unwrap();
        let mut roller = ScriptedRoller::new([6, 6]);
        let outcome = warlock.cast_spell(rules(), "Hex", None, &mut roller).unwrap();
        assert_eq!(outcome.slot_consumed, Some(3));
        assert_eq!(outcome.slots_remaining, 1);
        warlock.cast_spell(rules(), "Hex", None, &mut roller).unwrap();
        assert_eq!(warlock.slots(rules()).available(3), 0);

        assert_eq!(warlock.short_rest(), 2);
        assert_eq!(warlock.slots(rules()).available(3), 2);
    }

    #[test]
    fn test_rests() {
        let mut caster = wizard(3);
        caster.learn_spell(rules(), "Magic Missile").unwrap();
        caster.prepare_spell("Magic Missile", true).unwrap();
        caster
            .cast_spell(rules(), "Magic Missile", None, &mut ScriptedRoller::new([1; 3]))
            .unwrap();
        assert_eq!(caster.short_rest(), 0);
        assert_eq!(caster.long_rest(), 1);
        assert_eq!(caster.slots(rules()).available(1), 4);
    }

    #[test]
    fn test_set_level_reports_slot_changes() {
        let mut caster = wizard(4);
        let changes = caster.set_level(rules(), 5);
        assert_eq!(
            changes,
            vec![SlotChange {
                level: 3,
                before: 0,
                after: 2
            }]
        );
        assert_eq!(caster.level(), 5);
    }
}
