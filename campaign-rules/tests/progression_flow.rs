//! Scenario tests for experience, level-ups, and improvements.

mod common;

use std::collections::BTreeMap;

use campaign_rules::progression::{campaign_milestones, proficiency_bonus, ChoiceKind, MAX_LEVEL};
use campaign_rules::testing::sample_fighter;
use campaign_rules::{Ability, Improvement, ProgressionMode, Rejection, RulesConfig};

fn rules() -> &'static RulesConfig {
    RulesConfig::standard().unwrap()
}

#[test]
fn test_proficiency_bonus_examples() {
    assert_eq!(proficiency_bonus(1), 2);
    assert_eq!(proficiency_bonus(5), 3);
    assert_eq!(proficiency_bonus(9), 4);
    assert_eq!(proficiency_bonus(17), 6);
}

#[test]
fn test_award_xp_reports_qualifying_level() {
    let mut fighter = sample_fighter(rules()).unwrap();
    let award = fighter.award_xp(6500, rules());
    assert!(award.leveled_up);
    assert_eq!(award.new_level, Some(5));
    assert_eq!(fighter.level(), 1);

    // Milestone characters never qualify through experience.
    fighter.progression.mode = ProgressionMode::Milestone;
    let award = fighter.award_xp(100, rules());
    assert!(!award.leveled_up);
    assert_eq!(award.new_total, 6600);
}

#[test]
fn test_fighter_to_twenty() {
    common::init_tracing();
    let mut fighter = sample_fighter(rules()).unwrap();
    fighter.award_xp(355_000, rules());
    let mut asi_levels = Vec::new();

    while fighter.level() < MAX_LEVEL {
        let mut choices = BTreeMap::new();
        if fighter.level() + 1 == 3 {
            choices.insert("Martial Archetype".to_string(), "Champion".to_string());
        }
        let outcome = fighter.level_up(rules(), None, &choices).unwrap();

        for pending in &outcome.pending_choices {
            assert_eq!(pending.kind, ChoiceKind::AbilityScoreImprovement);
        }
        if outcome.asi_eligible {
            asi_levels.push(outcome.new_level);
            fighter
                .apply_improvement(Improvement::Feat(format!("Feat {}", outcome.new_level)), rules())
                .unwrap();
        }
        assert!(!fighter.progression.has_pending_choices());
    }

    assert_eq!(asi_levels, vec![4, 6, 8, 12, 14, 16, 19]);
    assert_eq!(fighter.progression.feats.len(), 7);
    // 12 at level 1, then 8 (6 + CON 2) per level.
    assert_eq!(fighter.progression.max_hp, 12 + 19 * 8);
    assert_eq!(fighter.progression.proficiency_bonus(), 6);

    let before = fighter.clone();
    let err = fighter.level_up(rules(), None, &BTreeMap::new()).unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::AtMaxLevel));
    assert_eq!(fighter, before);
}

#[test]
fn test_pending_choice_is_never_auto_resolved() {
    let mut fighter = sample_fighter(rules()).unwrap();
    fighter.progression.mode = ProgressionMode::Milestone;
    fighter.level_up(rules(), None, &BTreeMap::new()).unwrap();
    let outcome = fighter.level_up(rules(), Some(10), &BTreeMap::new()).unwrap();
    assert!(!outcome.is_complete());
    assert_eq!(outcome.pending_choices[0].feature, "Martial Archetype");
    assert_eq!(outcome.hp_gained, 12);

    let before = fighter.clone();
    let err = fighter.level_up(rules(), None, &BTreeMap::new()).unwrap_err();
    assert_eq!(err.code(), "pending_choices");
    assert_eq!(fighter, before);

    fighter.resolve_choice("Martial Archetype", "Eldritch Knight").unwrap();
    assert!(fighter.level_up(rules(), None, &BTreeMap::new()).is_ok());
}

#[test]
fn test_asi_raises_spellcasting_modifier() {
    let mut wizard = campaign_rules::testing::sample_wizard(rules()).unwrap();
    wizard.progression.mode = ProgressionMode::Milestone;
    let mut choices = BTreeMap::new();
    choices.insert("Arcane Tradition".to_string(), "School of Evocation".to_string());
    // Unknown options are rejected outright.
    let mut bad = BTreeMap::new();
    bad.insert("Arcane Tradition".to_string(), "School of Cooking".to_string());
    let err = wizard.level_up(rules(), None, &bad).unwrap_err();
    assert_eq!(err.code(), "invalid_choice");
    assert_eq!(wizard.level(), 1);

    wizard.level_up(rules(), None, &choices).unwrap();
    wizard.level_up(rules(), None, &BTreeMap::new()).unwrap();
    let outcome = wizard.level_up(rules(), None, &BTreeMap::new()).unwrap();
    assert!(outcome.asi_eligible);

    let improvement = wizard
        .apply_improvement(
            Improvement::Abilities(vec![(Ability::Intelligence, 1), (Ability::Dexterity, 1)]),
            rules(),
        )
        .unwrap();
    assert_eq!(improvement.changes.len(), 2);
    // INT 16 -> 17 keeps +3.
    assert_eq!(wizard.spellcaster().unwrap().ability_modifier, 3);
}

#[test]
fn test_milestone_campaign_levels_wizard() {
    let mut wizard = campaign_rules::testing::sample_wizard(rules()).unwrap();
    wizard.progression.mode = ProgressionMode::Milestone;
    for milestone in campaign_milestones(&["Goblin Arrow", "Phandalin"]) {
        wizard.progression.add_milestone(milestone).unwrap();
    }

    let award = wizard.complete_milestone("Complete Goblin Arrow").unwrap();
    assert_eq!(award.new_level, Some(4));
    let mut choices = BTreeMap::new();
    choices.insert("Arcane Tradition".to_string(), "School of Illusion".to_string());
    while wizard.level() < award.new_level.unwrap() {
        wizard.level_up(rules(), None, &choices).unwrap();
        choices.clear();
    }
    assert_eq!(wizard.level(), 4);
    assert_eq!(wizard.spellcaster().unwrap().slots(rules()).available(2), 3);
    assert_eq!(
        wizard.progression.next_milestone().unwrap().name,
        "Complete Phandalin"
    );
}
