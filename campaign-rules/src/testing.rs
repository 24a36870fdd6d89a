//! Testing utilities for the rules engine.
//!
//! This module provides:
//! - `ScriptedRoller` for deterministic dice without seeding games
//! - Sample combatant and character builders
//! - Assertion helpers for verifying engine invariants

use std::collections::VecDeque;

use crate::combatant::{Combatant, CombatantKind};
use crate::config::RulesConfig;
use crate::dice::Roller;
use crate::encounter::Encounter;
use crate::error::EngineResult;
use crate::progression::{AbilityScores, CharacterClass};
use crate::Character;

/// A roller that returns scripted die faces in order.
///
/// Panics when the script runs out or a face does not fit the die, so a
/// test that rolls more than it expects fails loudly.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRoller {
    faces: VecDeque<u32>,
    rolled: usize,
}

impl ScriptedRoller {
    pub fn new(faces: impl IntoIterator<Item = u32>) -> Self {
        Self {
            faces: faces.into_iter().collect(),
            rolled: 0,
        }
    }

    /// A roller for operations that must not roll at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Queue more faces.
    pub fn push(&mut self, faces: impl IntoIterator<Item = u32>) -> &mut Self {
        self.faces.extend(faces);
        self
    }

    /// Faces not yet used.
    pub fn remaining(&self) -> usize {
        self.faces.len()
    }

    /// Faces used so far.
    pub fn rolled(&self) -> usize {
        self.rolled
    }
}

impl Roller for ScriptedRoller {
    fn roll_die(&mut self, sides: u32) -> u32 {
        let face = self
            .faces
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedRoller exhausted after {} rolls (d{sides})", self.rolled));
        assert!(
            (1..=sides).contains(&face),
            "Scripted face {face} does not fit a d{sides}"
        );
        self.rolled += 1;
        face
    }
}

/// A player combatant with the given maximum hit points.
pub fn sample_hero(name: &str, max_hp: u32) -> Combatant {
    Combatant::new(name, CombatantKind::player(), max_hp)
        .unwrap_or_else(|e| panic!("sample hero {name}: {e}"))
        .with_armor_class(16)
}

/// A 7 hit point goblin that dies at 0.
pub fn sample_goblin(name: &str) -> Combatant {
    Combatant::new(name, CombatantKind::Monster, 7)
        .unwrap_or_else(|e| panic!("sample goblin {name}: {e}"))
        .with_armor_class(15)
        .with_initiative_modifier(2)
}

/// A named NPC that makes death saves.
pub fn sample_npc(name: &str, max_hp: u32) -> Combatant {
    Combatant::new(name, CombatantKind::npc(true), max_hp)
        .unwrap_or_else(|e| panic!("sample npc {name}: {e}"))
        .with_armor_class(12)
}

/// A level 1 wizard with INT 16 and CON 14.
pub fn sample_wizard(rules: &RulesConfig) -> EngineResult<Character> {
    Character::new(
        "Elara",
        CharacterClass::Wizard,
        AbilityScores::new(8, 14, 14, 16, 12, 10),
        rules,
    )
}

/// A level 1 fighter with the Defense fighting style chosen.
pub fn sample_fighter(rules: &RulesConfig) -> EngineResult<Character> {
    let mut fighter = Character::new(
        "Roland",
        CharacterClass::Fighter,
        AbilityScores::new(16, 14, 14, 10, 12, 8),
        rules,
    )?;
    fighter.resolve_choice("Fighting Style", "Defense")?;
    Ok(fighter)
}

/// Assert that every combatant and the encounter itself are consistent.
pub fn assert_invariants(encounter: &Encounter) {
    if let Err(e) = encounter.check_invariants() {
        panic!("Invariant violated in {}: {e}", encounter.name);
    }
}

/// Assert a combatant's hit points as (current, max).
pub fn assert_hp(combatant: &Combatant, current: u32, max: u32) {
    assert_eq!(
        (combatant.current_hp(), combatant.max_hp()),
        (current, max),
        "HP mismatch for {}",
        combatant.name
    );
}
