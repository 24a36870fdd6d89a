//! Spell catalog.
//!
//! Spell definitions are plain data loaded with the rules configuration.
//! Each damaging or healing spell carries a table of dice keyed by slot
//! level (or by character level for cantrips).

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::combatant::DamageType;
use crate::progression::CharacterClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpellSchool {
    Abjuration,
    Conjuration,
    Divination,
    Enchantment,
    Evocation,
    Illusion,
    Necromancy,
    Transmutation,
}

impl SpellSchool {
    pub fn name(&self) -> &'static str {
        match self {
            SpellSchool::Abjuration => "Abjuration",
            SpellSchool::Conjuration => "Conjuration",
            SpellSchool::Divination => "Divination",
            SpellSchool::Enchantment => "Enchantment",
            SpellSchool::Evocation => "Evocation",
            SpellSchool::Illusion => "Illusion",
            SpellSchool::Necromancy => "Necromancy",
            SpellSchool::Transmutation => "Transmutation",
        }
    }
}

/// Dice notation that grows with slot level or character level.
///
/// Notation may contain the token `MOD`, replaced by the caster's
/// spellcasting ability modifier when cast.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScalingDice {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub by_slot_level: BTreeMap<u8, String>,
    /// Cantrip dice keyed by the character level where they take effect.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub by_character_level: BTreeMap<u8, String>,
}

impl ScalingDice {
    /// Dice for a cast. Leveled spells use the entry for the slot level,
    /// falling back to the base level entry. Cantrips use the highest
    /// character level threshold reached.
    pub fn dice_for(&self, spell_level: u8, slot_level: u8, character_level: u8) -> Option<&str> {
        if spell_level == 0 && !self.by_character_level.is_empty() {
            return self
                .by_character_level
                .range(..=character_level)
                .next_back()
                .map(|(_, dice)| dice.as_str());
        }
        self.by_slot_level
            .get(&slot_level)
            .or_else(|| self.by_slot_level.get(&spell_level))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageEffect {
    pub damage_type: DamageType,
    pub dice: ScalingDice,
}

/// A spell as described by the rules configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellDefinition {
    pub name: String,
    /// Base level, 0 for cantrips.
    pub level: u8,
    pub school: SpellSchool,
    #[serde(default)]
    pub concentration: bool,
    #[serde(default)]
    pub classes: Vec<CharacterClass>,
    #[serde(default)]
    pub damage: Option<DamageEffect>,
    #[serde(default)]
    pub healing: Option<ScalingDice>,
}

impl SpellDefinition {
    pub fn is_cantrip(&self) -> bool {
        self.level == 0
    }

    pub fn on_class_list(&self, class: CharacterClass) -> bool {
        self.classes.contains(&class)
    }
}

/// Spells indexed by lowercase name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<SpellDefinition>", into = "Vec<SpellDefinition>")]
pub struct SpellCatalog {
    spells: HashMap<String, SpellDefinition>,
}

impl SpellCatalog {
    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&SpellDefinition> {
        self.spells.get(&name.trim().to_lowercase())
    }

    pub fn insert(&mut self, spell: SpellDefinition) -> Option<SpellDefinition> {
        self.spells.insert(spell.name.to_lowercase(), spell)
    }

    pub fn len(&self) -> usize {
        self.spells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpellDefinition> {
        self.spells.values()
    }

    /// All spells of a given level, sorted by name.
    pub fn by_level(&self, level: u8) -> Vec<&SpellDefinition> {
        let mut spells: Vec<_> = self.iter().filter(|s| s.level == level).collect();
        spells.sort_by(|a, b| a.name.cmp(&b.name));
        spells
    }

    /// All spells on a class list, sorted by level then name.
    pub fn for_class(&self, class: CharacterClass) -> Vec<&SpellDefinition> {
        let mut spells: Vec<_> = self.iter().filter(|s| s.on_class_list(class)).collect();
        spells.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.name.cmp(&b.name)));
        spells
    }
}

impl From<Vec<SpellDefinition>> for SpellCatalog {
    fn from(spells: Vec<SpellDefinition>) -> Self {
        let mut catalog = SpellCatalog::default();
        for spell in spells {
            catalog.insert(spell);
        }
        catalog
    }
}

impl From<SpellCatalog> for Vec<SpellDefinition> {
    fn from(catalog: SpellCatalog) -> Self {
        let mut spells: Vec<_> = catalog.spells.into_values().collect();
        spells.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.name.cmp(&b.name)));
        spells
    }
}
