//! Scenario tests for spell slots, preparation, and casting.

mod common;

use campaign_rules::slots::SPELL_LEVELS;
use campaign_rules::spellcasting::EffectKind;
use campaign_rules::testing::{sample_wizard, ScriptedRoller};
use campaign_rules::{
    AbilityScores, CasterArchetype, Character, CharacterClass, DamageType, EngineError,
    Rejection, RulesConfig, Spellcaster,
};

fn rules() -> &'static RulesConfig {
    RulesConfig::standard().unwrap()
}

#[test]
fn test_level_five_full_caster_slots() {
    let wizard = Spellcaster::for_class(CharacterClass::Wizard, 5, 3, rules()).unwrap();
    assert_eq!(wizard.slots(rules()).totals(), [4, 3, 2, 0, 0, 0, 0, 0, 0]);
}

#[test]
fn test_level_seven_half_caster_slots() {
    assert_eq!(CasterArchetype::Half.effective_level(7), Some(4));
    for class in [CharacterClass::Paladin, CharacterClass::Ranger] {
        let caster = Spellcaster::for_class(class, 7, 2, rules()).unwrap();
        let totals = caster.slots(rules()).totals();
        assert_eq!(&totals[..5], &[4, 3, 0, 0, 0], "{class}");
    }
}

#[test]
fn test_upcast_consumes_chosen_slot() {
    common::init_tracing();
    let mut wizard = Spellcaster::for_class(CharacterClass::Wizard, 5, 3, rules()).unwrap();
    wizard.learn_spell(rules(), "Burning Hands").unwrap();
    wizard.learn_spell(rules(), "Thunderwave").unwrap();
    wizard.prepare_spell("Burning Hands", true).unwrap();
    wizard.prepare_spell("Thunderwave", true).unwrap();

    // Level 3 entry exists: 5d6.
    let outcome = wizard
        .cast_spell(rules(), "Burning Hands", Some(3), &mut ScriptedRoller::new([6, 6, 6, 6, 6]))
        .unwrap();
    assert_eq!(outcome.slot_consumed, Some(3));
    assert_eq!(outcome.effects[0].dice, "5d6");
    assert_eq!(outcome.effects[0].kind, EffectKind::Damage(DamageType::Fire));
    assert_eq!(outcome.effects[0].amount(), 30);

    // No level 3 entry: falls back to the level 1 effect.
    let outcome = wizard
        .cast_spell(rules(), "Thunderwave", Some(3), &mut ScriptedRoller::new([1, 2]))
        .unwrap();
    assert_eq!(outcome.effects[0].dice, "2d8");

    let slots = wizard.slots(rules());
    assert_eq!(slots.get(1).unwrap().used, 0);
    assert_eq!(slots.get(3).unwrap().used, 2);
    assert_eq!(slots.available(3), 0);
}

#[test]
fn test_exhausted_slot_rejection_is_side_effect_free() {
    let mut wizard = Spellcaster::for_class(CharacterClass::Wizard, 3, 3, rules()).unwrap();
    wizard.learn_spell(rules(), "Scorching Ray").unwrap();
    wizard.prepare_spell("Scorching Ray", true).unwrap();
    let mut roller = ScriptedRoller::new([1; 12]);
    wizard.cast_spell(rules(), "Scorching Ray", None, &mut roller).unwrap();
    wizard.cast_spell(rules(), "Scorching Ray", None, &mut roller).unwrap();

    let before = wizard.clone();
    let err = wizard
        .cast_spell(rules(), "Scorching Ray", None, &mut roller)
        .unwrap_err();
    assert_eq!(err, EngineError::Rejected(Rejection::SlotExhausted { level: 2 }));
    assert_eq!(wizard, before);
    assert_eq!(roller.remaining(), 0);

    // Invalid slot levels are rejected the same way.
    let err = wizard
        .cast_spell(rules(), "Scorching Ray", Some(10), &mut roller)
        .unwrap_err();
    assert_eq!(err.code(), "invalid_slot_level");
    assert_eq!(wizard, before);
}

#[test]
fn test_preparation_capacity_through_character() {
    let mut cleric = Character::new(
        "Tomas",
        CharacterClass::Cleric,
        AbilityScores::new(12, 10, 14, 10, 14, 12),
        rules(),
    )
    .unwrap();
    // Level 1 + WIS 2 = 3 prepared spells.
    for spell in ["Bless", "Cure Wounds", "Guiding Bolt", "Healing Word"] {
        cleric.learn_spell(rules(), spell).unwrap();
    }
    for spell in ["Bless", "Cure Wounds", "Guiding Bolt"] {
        cleric.prepare_spell(spell, true).unwrap();
    }
    let err = cleric.prepare_spell("Healing Word", true).unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::PreparationCapacity { capacity: 3 }));

    // Re-preparing an already prepared spell is not a new preparation.
    let outcome = cleric.prepare_spell("Bless", true).unwrap();
    assert_eq!(outcome.prepared_count, 3);
}

#[test]
fn test_slots_recomputed_on_level_up() {
    let mut wizard = sample_wizard(rules()).unwrap();
    wizard.progression.mode = campaign_rules::ProgressionMode::Milestone;
    wizard.learn_spell(rules(), "Magic Missile").unwrap();
    wizard.prepare_spell("Magic Missile", true).unwrap();
    wizard
        .cast_spell(rules(), "Magic Missile", None, &mut ScriptedRoller::new([1, 1, 1]))
        .unwrap();

    let mut choices = std::collections::BTreeMap::new();
    choices.insert("Arcane Tradition".to_string(), "School of Divination".to_string());
    let outcome = wizard.level_up(rules(), None, &choices).unwrap();
    assert_eq!(outcome.slot_changes.len(), 1);

    // Expended slots carry over; totals grow.
    let slots = wizard.spellcaster().unwrap().slots(rules());
    assert_eq!(slots.get(1).unwrap().total, 3);
    assert_eq!(slots.get(1).unwrap().used, 1);

    assert_eq!(wizard.long_rest(), 1);
    let slots = wizard.spellcaster().unwrap().slots(rules());
    assert!(slots.slots.iter().all(|s| s.used == 0));
    assert_eq!(slots.slots.len(), SPELL_LEVELS);
}

#[test]
fn test_every_class_slot_table_is_monotonic() {
    for class in CharacterClass::all() {
        let Ok(caster) = Spellcaster::for_class(class, 1, 0, rules()) else {
            continue;
        };
        let mut previous = 0;
        for level in 1..=20 {
            let total: u32 = rules()
                .slot_tables
                .totals(caster.archetype, level)
                .iter()
                .sum();
            assert!(total >= previous, "{class} loses slots at level {level}");
            previous = total;
        }
    }
}
