//! Spell slot tables and slot pools.
//!
//! Totals are always derived from the caster archetype and level. Only the
//! number of expended slots is stored on a character.

use serde::{Deserialize, Serialize};

use crate::error::Rejection;

/// Spell levels with slots.
pub const SPELL_LEVELS: usize = 9;

/// How a class gains spell slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CasterArchetype {
    #[default]
    None,
    Full,
    Half,
    Third,
    Pact,
}

impl CasterArchetype {
    /// Level used to index the full caster table, or `None` before the
    /// archetype has any slots.
    pub fn effective_level(&self, level: u8) -> Option<u8> {
        match self {
            CasterArchetype::None | CasterArchetype::Pact => None,
            CasterArchetype::Full => (level >= 1).then_some(level),
            CasterArchetype::Half => (level >= 2).then(|| level.div_ceil(2)),
            CasterArchetype::Third => (level >= 3).then(|| level.div_ceil(3)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CasterArchetype::None => "none",
            CasterArchetype::Full => "full",
            CasterArchetype::Half => "half",
            CasterArchetype::Third => "third",
            CasterArchetype::Pact => "pact",
        }
    }
}

/// Pact magic slots at one character level: all slots share a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PactRow {
    pub slots: u32,
    pub slot_level: u8,
}

/// Slot tables indexed by character level (row 0 = level 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotTables {
    /// Slot counts per spell level for full casters. Rows may be shorter
    /// than nine entries; missing levels have no slots.
    pub full: Vec<Vec<u32>>,
    pub pact: Vec<PactRow>,
}

impl SlotTables {
    /// Slot totals for an archetype at a character level.
    pub fn totals(&self, archetype: CasterArchetype, level: u8) -> [u32; SPELL_LEVELS] {
        let mut totals = [0; SPELL_LEVELS];
        if level == 0 {
            return totals;
        }

        if archetype == CasterArchetype::Pact {
            if let Some(row) = self.pact.get(level as usize - 1) {
                if (1..=SPELL_LEVELS as u8).contains(&row.slot_level) {
                    totals[row.slot_level as usize - 1] = row.slots;
                }
            }
            return totals;
        }

        let Some(effective) = archetype.effective_level(level) else {
            return totals;
        };
        if let Some(row) = self.full.get(effective as usize - 1) {
            for (total, count) in totals.iter_mut().zip(row) {
                *total = *count;
            }
        }
        totals
    }
}

/// Slots at one spell level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlotInfo {
    pub total: u32,
    pub used: u32,
}

impl SlotInfo {
    pub fn available(&self) -> u32 {
        self.total.saturating_sub(self.used)
    }
}

/// A character's slot pool for spell levels 1-9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpellSlots {
    pub slots: [SlotInfo; SPELL_LEVELS],
}

impl SpellSlots {
    pub fn from_parts(totals: [u32; SPELL_LEVELS], used: [u32; SPELL_LEVELS]) -> Self {
        let mut slots = [SlotInfo::default(); SPELL_LEVELS];
        for (i, slot) in slots.iter_mut().enumerate() {
            slot.total = totals[i];
            slot.used = used[i].min(totals[i]);
        }
        Self { slots }
    }

    /// Slot info for spell level `level` (1-9).
    pub fn get(&self, level: u8) -> Option<&SlotInfo> {
        let index = (level as usize).checked_sub(1)?;
        self.slots.get(index)
    }

    pub fn available(&self, level: u8) -> u32 {
        self.get(level).map_or(0, SlotInfo::available)
    }

    pub fn totals(&self) -> [u32; SPELL_LEVELS] {
        self.slots.map(|s| s.total)
    }

    /// Highest spell level with any slots.
    pub fn highest_level(&self) -> Option<u8> {
        self.slots
            .iter()
            .rposition(|s| s.total > 0)
            .map(|i| i as u8 + 1)
    }

    /// Check that a slot of `level` can be spent.
    pub fn check_available(&self, level: u8) -> Result<(), Rejection> {
        if !(1..=SPELL_LEVELS as u8).contains(&level) {
            return Err(Rejection::InvalidSlotLevel { slot_level: level });
        }
        if self.available(level) == 0 {
            return Err(Rejection::SlotExhausted { level });
        }
        Ok(())
    }
}

/// Change to the slot total at one spell level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotChange {
    pub level: u8,
    pub before: u32,
    pub after: u32,
}

/// Per-level differences between two sets of totals.
pub fn diff_totals(before: &[u32; SPELL_LEVELS], after: &[u32; SPELL_LEVELS]) -> Vec<SlotChange> {
    before
        .iter()
        .zip(after)
        .enumerate()
        .filter(|(_, (b, a))| b != a)
        .map(|(i, (b, a))| SlotChange {
            level: i as u8 + 1,
            before: *b,
            after: *a,
        })
        .collect()
}
