//! Conditions and the condition registry.
//!
//! The registry is a static description of what each condition means.
//! The engine only tracks which conditions a combatant has and for how
//! long; attack and check resolvers read the effect flags from here.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::progression::Ability;

/// A condition that can be applied to a combatant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    Blinded,
    Charmed,
    Deafened,
    Frightened,
    Grappled,
    Incapacitated,
    Invisible,
    Paralyzed,
    Petrified,
    Poisoned,
    Prone,
    Restrained,
    Stunned,
    Unconscious,
    /// Exhaustion has levels 1-6.
    Exhaustion(u8),
}

impl Condition {
    pub fn kind(&self) -> ConditionKind {
        match self {
            Condition::Blinded => ConditionKind::Blinded,
            Condition::Charmed => ConditionKind::Charmed,
            Condition::Deafened => ConditionKind::Deafened,
            Condition::Frightened => ConditionKind::Frightened,
            Condition::Grappled => ConditionKind::Grappled,
            Condition::Incapacitated => ConditionKind::Incapacitated,
            Condition::Invisible => ConditionKind::Invisible,
            Condition::Paralyzed => ConditionKind::Paralyzed,
            Condition::Petrified => ConditionKind::Petrified,
            Condition::Poisoned => ConditionKind::Poisoned,
            Condition::Prone => ConditionKind::Prone,
            Condition::Restrained => ConditionKind::Restrained,
            Condition::Stunned => ConditionKind::Stunned,
            Condition::Unconscious => ConditionKind::Unconscious,
            Condition::Exhaustion(_) => ConditionKind::Exhaustion,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Registry entry for this condition.
    pub fn info(&self) -> &'static ConditionInfo {
        condition_info(self.kind())
    }

    /// Effect flags in force for this condition. Exhaustion accumulates
    /// penalties with each level.
    pub fn effects(&self) -> Vec<ConditionEffect> {
        match self {
            Condition::Exhaustion(level) => EXHAUSTION_EFFECTS
                .iter()
                .take((*level).min(6) as usize)
                .copied()
                .collect(),
            other => other.info().effects.to_vec(),
        }
    }

    pub fn has_effect(&self, effect: ConditionEffect) -> bool {
        self.effects().contains(&effect)
    }

    pub fn is_incapacitating(&self) -> bool {
        self.has_effect(ConditionEffect::Incapacitated)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Exhaustion(level) => write!(f, "Exhaustion ({level})"),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Condition identity without payload. Used for the one-per-kind rule
/// and as the registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionKind {
    Blinded,
    Charmed,
    Deafened,
    Frightened,
    Grappled,
    Incapacitated,
    Invisible,
    Paralyzed,
    Petrified,
    Poisoned,
    Prone,
    Restrained,
    Stunned,
    Unconscious,
    Exhaustion,
}

impl ConditionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ConditionKind::Blinded => "Blinded",
            ConditionKind::Charmed => "Charmed",
            ConditionKind::Deafened => "Deafened",
            ConditionKind::Frightened => "Frightened",
            ConditionKind::Grappled => "Grappled",
            ConditionKind::Incapacitated => "Incapacitated",
            ConditionKind::Invisible => "Invisible",
            ConditionKind::Paralyzed => "Paralyzed",
            ConditionKind::Petrified => "Petrified",
            ConditionKind::Poisoned => "Poisoned",
            ConditionKind::Prone => "Prone",
            ConditionKind::Restrained => "Restrained",
            ConditionKind::Stunned => "Stunned",
            ConditionKind::Unconscious => "Unconscious",
            ConditionKind::Exhaustion => "Exhaustion",
        }
    }

    pub fn all() -> [ConditionKind; 15] {
        [
            ConditionKind::Blinded,
            ConditionKind::Charmed,
            ConditionKind::Deafened,
            ConditionKind::Frightened,
            ConditionKind::Grappled,
            ConditionKind::Incapacitated,
            ConditionKind::Invisible,
            ConditionKind::Paralyzed,
            ConditionKind::Petrified,
            ConditionKind::Poisoned,
            ConditionKind::Prone,
            ConditionKind::Restrained,
            ConditionKind::Stunned,
            ConditionKind::Unconscious,
            ConditionKind::Exhaustion,
        ]
    }
}

/// A descriptive flag consumed by attack and check resolvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionEffect {
    AttackDisadvantage,
    AttackedWithAdvantage,
    AutoFailStrDexSaves,
    AutoFailSightChecks,
    AutoFailHearingChecks,
    AbilityCheckDisadvantage,
    SaveDisadvantage,
    DexSaveDisadvantage,
    SpeedZero,
    SpeedHalved,
    NoSpeedBonus,
    CanOnlyCrawl,
    CannotMove,
    CannotSpeak,
    SpeechImpaired,
    Incapacitated,
    Unaware,
    DropsItems,
    FallsProne,
    MeleeAttacksCrit,
    MeleeAttacksAdvantage,
    RangedAttacksDisadvantage,
    CannotAttackCharmer,
    CharmerHasSocialAdvantage,
    CannotApproachSource,
    AttackAdvantage,
    AttackedWithDisadvantage,
    ResistAllDamage,
    ImmuneToPoison,
    HpMaximumHalved,
    Death,
}

/// Registry entry describing a condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionInfo {
    pub kind: ConditionKind,
    pub description: &'static str,
    pub effects: &'static [ConditionEffect],
}

/// Exhaustion penalties, one per level, cumulative.
pub const EXHAUSTION_EFFECTS: [ConditionEffect; 6] = [
    ConditionEffect::AbilityCheckDisadvantage,
    ConditionEffect::SpeedHalved,
    ConditionEffect::AttackDisadvantage,
    ConditionEffect::HpMaximumHalved,
    ConditionEffect::SpeedZero,
    ConditionEffect::Death,
];

lazy_static::lazy_static! {
    static ref CONDITION_REGISTRY: HashMap<ConditionKind, ConditionInfo> = {
        use ConditionEffect::*;

        let entries = [
            ConditionInfo {
                kind: ConditionKind::Blinded,
                description: "Can't see and automatically fails any ability check that requires sight. Attack rolls against the creature have advantage, and its attack rolls have disadvantage.",
                effects: &[AttackDisadvantage, AttackedWithAdvantage, AutoFailSightChecks],
            },
            ConditionInfo {
                kind: ConditionKind::Charmed,
                description: "Can't attack the charmer or target it with harmful effects. The charmer has advantage on social checks against the creature.",
                effects: &[CannotAttackCharmer, CharmerHasSocialAdvantage],
            },
            ConditionInfo {
                kind: ConditionKind::Deafened,
                description: "Can't hear and automatically fails any ability check that requires hearing.",
                effects: &[AutoFailHearingChecks],
            },
            ConditionInfo {
                kind: ConditionKind::Frightened,
                description: "Disadvantage on ability checks and attack rolls while the source of fear is in sight. Can't willingly move closer to the source.",
                effects: &[AttackDisadvantage, AbilityCheckDisadvantage, CannotApproachSource],
            },
            ConditionInfo {
                kind: ConditionKind::Grappled,
                description: "Speed becomes 0 and can't benefit from any bonus to speed.",
                effects: &[SpeedZero, NoSpeedBonus],
            },
            ConditionInfo {
                kind: ConditionKind::Incapacitated,
                description: "Can't take actions or reactions.",
                effects: &[Incapacitated],
            },
            ConditionInfo {
                kind: ConditionKind::Invisible,
                description: "Impossible to see without special senses. Attack rolls against the creature have disadvantage, and its attack rolls have advantage.",
                effects: &[AttackAdvantage, AttackedWithDisadvantage],
            },
            ConditionInfo {
                kind: ConditionKind::Paralyzed,
                description: "Incapacitated and can't move or speak. Automatically fails Strength and Dexterity saves. Attacks against it have advantage, and hits from within 5 feet are critical.",
                effects: &[
                    Incapacitated,
                    CannotMove,
                    CannotSpeak,
                    AutoFailStrDexSaves,
                    AttackedWithAdvantage,
                    MeleeAttacksCrit,
                ],
            },
            ConditionInfo {
                kind: ConditionKind::Petrified,
                description: "Transformed into solid inanimate substance. Incapacitated, unaware, resistant to all damage, and immune to poison.",
                effects: &[
                    Incapacitated,
                    CannotMove,
                    CannotSpeak,
                    Unaware,
                    AutoFailStrDexSaves,
                    AttackedWithAdvantage,
                    ResistAllDamage,
                    ImmuneToPoison,
                ],
            },
            ConditionInfo {
                kind: ConditionKind::Poisoned,
                description: "Disadvantage on attack rolls and ability checks.",
                effects: &[AttackDisadvantage, AbilityCheckDisadvantage],
            },
            ConditionInfo {
                kind: ConditionKind::Prone,
                description: "Can only crawl unless it stands up. Disadvantage on attack rolls. Attacks from within 5 feet have advantage, other attacks have disadvantage.",
                effects: &[
                    CanOnlyCrawl,
                    AttackDisadvantage,
                    MeleeAttacksAdvantage,
                    RangedAttacksDisadvantage,
                ],
            },
            ConditionInfo {
                kind: ConditionKind::Restrained,
                description: "Speed becomes 0. Attack rolls against it have advantage, its attack rolls have disadvantage, and it has disadvantage on Dexterity saves.",
                effects: &[
                    SpeedZero,
                    NoSpeedBonus,
                    AttackDisadvantage,
                    AttackedWithAdvantage,
                    DexSaveDisadvantage,
                ],
            },
            ConditionInfo {
                kind: ConditionKind::Stunned,
                description: "Incapacitated, can't move, and can speak only falteringly. Automatically fails Strength and Dexterity saves. Attacks against it have advantage.",
                effects: &[
                    Incapacitated,
                    CannotMove,
                    SpeechImpaired,
                    AutoFailStrDexSaves,
                    AttackedWithAdvantage,
                ],
            },
            ConditionInfo {
                kind: ConditionKind::Unconscious,
                description: "Incapacitated, can't move or speak, and is unaware of its surroundings. Drops what it holds and falls prone. Attacks against it have advantage, and hits from within 5 feet are critical.",
                effects: &[
                    Incapacitated,
                    CannotMove,
                    CannotSpeak,
                    Unaware,
                    DropsItems,
                    FallsProne,
                    AutoFailStrDexSaves,
                    AttackedWithAdvantage,
                    MeleeAttacksCrit,
                ],
            },
            ConditionInfo {
                kind: ConditionKind::Exhaustion,
                description: "Cumulative penalties by level: ability check disadvantage, halved speed, attack and save disadvantage, halved hit point maximum, speed 0, death.",
                effects: &EXHAUSTION_EFFECTS,
            },
        ];

        entries.into_iter().map(|info| (info.kind, info)).collect()
    };
}

/// Look up the registry entry for a condition kind.
pub fn condition_info(kind: ConditionKind) -> &'static ConditionInfo {
    // Every kind is registered above; the registry test enforces it.
    &CONDITION_REGISTRY[&kind]
}

/// Escape check made at the end of the affected creature's turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscapeSave {
    pub dc: i32,
    pub ability: Ability,
}

/// A condition instance on a combatant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCondition {
    pub condition: Condition,
    /// Tag describing what applied the condition (spell, creature, trap).
    pub source: String,
    /// Remaining whole rounds. `None` lasts until removed.
    pub duration_rounds: Option<u32>,
    pub escape_save: Option<EscapeSave>,
}

impl ActiveCondition {
    pub fn new(condition: Condition, source: impl Into<String>) -> Self {
        Self {
            condition,
            source: source.into(),
            duration_rounds: None,
            escape_save: None,
        }
    }

    pub fn with_duration(mut self, rounds: u32) -> Self {
        self.duration_rounds = Some(rounds);
        self
    }

    pub fn with_escape_save(mut self, dc: i32, ability: Ability) -> Self {
        self.escape_save = Some(EscapeSave { dc, ability });
        self
    }

    pub fn kind(&self) -> ConditionKind {
        self.condition.kind()
    }

    /// Count down one round. Returns true when the condition has run out.
    pub fn tick(&mut self) -> bool {
        match self.duration_rounds.as_mut() {
            Some(rounds) => {
                *rounds = rounds.saturating_sub(1);
                *rounds == 0
            }
            None => false,
        }
    }
}

impl fmt::Display for ActiveCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.duration_rounds {
            Some(rounds) => write!(f, "{} ({rounds} rounds)", self.condition),
            None => write!(f, "{}", self.condition),
        }
    }
}
