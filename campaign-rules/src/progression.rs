//! Experience, levels, and class feature progression.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RulesConfig;
use crate::error::{EngineError, EngineResult, EntityKind, Rejection};
use crate::slots::SlotChange;

/// Highest character level.
pub const MAX_LEVEL: u8 = 20;

/// Highest value an ability score can reach through improvements.
pub const MAX_ABILITY_SCORE: u8 = 20;

// ============================================================================
// Abilities
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Ability::Strength => "Strength",
            Ability::Dexterity => "Dexterity",
            Ability::Constitution => "Constitution",
            Ability::Intelligence => "Intelligence",
            Ability::Wisdom => "Wisdom",
            Ability::Charisma => "Charisma",
        }
    }

    pub fn all() -> [Ability; 6] {
        [
            Ability::Strength,
            Ability::Dexterity,
            Ability::Constitution,
            Ability::Intelligence,
            Ability::Wisdom,
            Ability::Charisma,
        ]
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Modifier for an ability score: `(score - 10) / 2`, rounded down.
pub fn ability_modifier(score: u8) -> i32 {
    (score as i32 - 10).div_euclid(2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

impl AbilityScores {
    pub fn new(str: u8, dex: u8, con: u8, int: u8, wis: u8, cha: u8) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }

    pub fn get(&self, ability: Ability) -> u8 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    fn get_mut(&mut self, ability: Ability) -> &mut u8 {
        match ability {
            Ability::Strength => &mut self.strength,
            Ability::Dexterity => &mut self.dexterity,
            Ability::Constitution => &mut self.constitution,
            Ability::Intelligence => &mut self.intelligence,
            Ability::Wisdom => &mut self.wisdom,
            Ability::Charisma => &mut self.charisma,
        }
    }

    pub fn modifier(&self, ability: Ability) -> i32 {
        ability_modifier(self.get(ability))
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(10, 10, 10, 10, 10, 10)
    }
}

// ============================================================================
// Classes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CharacterClass {
    Barbarian,
    Bard,
    Cleric,
    Druid,
    Fighter,
    Monk,
    Paladin,
    Ranger,
    Rogue,
    Sorcerer,
    Warlock,
    Wizard,
}

impl CharacterClass {
    pub fn name(&self) -> &'static str {
        match self {
            CharacterClass::Barbarian => "Barbarian",
            CharacterClass::Bard => "Bard",
            CharacterClass::Cleric => "Cleric",
            CharacterClass::Druid => "Druid",
            CharacterClass::Fighter => "Fighter",
            CharacterClass::Monk => "Monk",
            CharacterClass::Paladin => "Paladin",
            CharacterClass::Ranger => "Ranger",
            CharacterClass::Rogue => "Rogue",
            CharacterClass::Sorcerer => "Sorcerer",
            CharacterClass::Warlock => "Warlock",
            CharacterClass::Wizard => "Wizard",
        }
    }

    pub fn all() -> [CharacterClass; 12] {
        [
            CharacterClass::Barbarian,
            CharacterClass::Bard,
            CharacterClass::Cleric,
            CharacterClass::Druid,
            CharacterClass::Fighter,
            CharacterClass::Monk,
            CharacterClass::Paladin,
            CharacterClass::Ranger,
            CharacterClass::Rogue,
            CharacterClass::Sorcerer,
            CharacterClass::Warlock,
            CharacterClass::Wizard,
        ]
    }
}

impl fmt::Display for CharacterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// Static progression tables
// ============================================================================

/// Cumulative experience needed for each level, index 0 = level 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperienceTable(pub Vec<u32>);

impl ExperienceTable {
    /// Greatest level whose threshold is at or below `xp`.
    pub fn level_for_xp(&self, xp: u32) -> u8 {
        let reached = self.0.iter().take_while(|&&threshold| threshold <= xp).count();
        (reached.max(1) as u8).min(MAX_LEVEL)
    }

    /// Experience needed to reach `level`, if the level exists.
    pub fn xp_for_level(&self, level: u8) -> Option<u32> {
        if level == 0 {
            return None;
        }
        self.0.get(level as usize - 1).copied()
    }

    /// Experience still needed to reach the level after `level`.
    pub fn xp_to_next_level(&self, level: u8, xp: u32) -> Option<u32> {
        self.xp_for_level(level.checked_add(1)?)
            .map(|next| next.saturating_sub(xp))
    }
}

/// Proficiency bonus for a character level.
pub fn proficiency_bonus(level: u8) -> i32 {
    2 + (level.clamp(1, MAX_LEVEL) as i32 - 1) / 4
}

/// Kind of decision a feature asks the player to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceKind {
    Subclass,
    FightingStyle,
    FavoredEnemy,
    FavoredTerrain,
    Metamagic,
    PactBoon,
    AbilityScoreImprovement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceDef {
    pub kind: ChoiceKind,
    /// Allowed answers. Empty accepts any non-empty answer.
    #[serde(default)]
    pub options: Vec<String>,
}

impl ChoiceDef {
    pub fn accepts(&self, choice: &str) -> bool {
        if self.options.is_empty() {
            !choice.trim().is_empty()
        } else {
            self.options.iter().any(|o| o.eq_ignore_ascii_case(choice))
        }
    }
}

/// A class feature as described by the rules configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub choice: Option<ChoiceDef>,
}

// ============================================================================
// Progression record
// ============================================================================

/// How a character earns levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProgressionMode {
    /// Level-ups require the experience threshold.
    #[default]
    Experience,
    /// Level-ups are granted by the table; experience is informational.
    Milestone,
}

/// A feature the character has gained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GainedFeature {
    pub name: String,
    pub level: u8,
    pub choice: Option<String>,
}

/// A decision the caller still has to make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChoice {
    pub feature: String,
    pub level: u8,
    pub kind: ChoiceKind,
    pub options: Vec<String>,
}

/// Ability score improvement or feat taken at an ASI level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Improvement {
    /// Either +2 to one ability or +1 to two.
    Abilities(Vec<(Ability, u8)>),
    Feat(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpAward {
    pub previous_total: u32,
    pub new_total: u32,
    /// The new total qualifies for a higher level than the current one.
    pub leveled_up: bool,
    pub new_level: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUpOutcome {
    pub previous_level: u8,
    pub new_level: u8,
    pub hp_gained: u32,
    pub new_max_hp: u32,
    pub features: Vec<GainedFeature>,
    pub pending_choices: Vec<PendingChoice>,
    pub asi_eligible: bool,
    pub proficiency_bonus: i32,
    pub proficiency_increased: bool,
    /// Spell slot totals that changed, filled in when the character casts spells.
    pub slot_changes: Vec<SlotChange>,
}

impl LevelUpOutcome {
    /// No choices remain outstanding.
    pub fn is_complete(&self) -> bool {
        self.pending_choices.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImprovementOutcome {
    /// `(ability, before, after)` for every score that was raised.
    pub changes: Vec<(Ability, u8, u8)>,
    pub feat: Option<String>,
    pub hp_gained: u32,
}

/// A story beat that carries the party to a target level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub target_level: u8,
    #[serde(default)]
    pub completed: bool,
}

impl Milestone {
    pub fn new(name: impl Into<String>, description: impl Into<String>, target_level: u8) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            target_level,
            completed: false,
        }
    }
}

/// Milestones for a campaign split into acts.
///
/// Each act ends with a major milestone at `4 * act` (capped at 20). Every
/// act but the last also has a discovery milestone two levels earlier.
pub fn campaign_milestones<S: AsRef<str>>(acts: &[S]) -> Vec<Milestone> {
    let mut milestones = Vec::new();
    for (i, act) in acts.iter().enumerate() {
        let number = (i + 1).min(MAX_LEVEL as usize) as u8;
        let title = act.as_ref();
        milestones.push(Milestone::new(
            format!("Complete {title}"),
            format!("Finish the main storyline of {title}"),
            number.saturating_mul(4).min(MAX_LEVEL),
        ));
        if i + 1 < acts.len() {
            milestones.push(Milestone::new(
                format!("Major Discovery in {title}"),
                format!("Make significant progress in {title}"),
                (number.saturating_mul(4) - 2).min(MAX_LEVEL - 2),
            ));
        }
    }
    milestones
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneAward {
    pub milestone: String,
    pub target_level: u8,
    /// Completed milestones now entitle the character to a higher level.
    pub leveled_up: bool,
    pub new_level: Option<u8>,
}

/// A character's level, experience, and feature ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progression {
    pub class: CharacterClass,
    pub level: u8,
    pub experience: u32,
    pub mode: ProgressionMode,
    pub abilities: AbilityScores,
    pub max_hp: u32,
    pub features: Vec<GainedFeature>,
    pub pending_choices: Vec<PendingChoice>,
    pub feats: Vec<String>,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
}

impl Progression {
    /// A level 1 character with maximum hit points at first level.
    pub fn new(
        class: CharacterClass,
        abilities: AbilityScores,
        rules: &RulesConfig,
    ) -> EngineResult<Self> {
        let class_rules = rules.class(class)?;
        let con = abilities.modifier(Ability::Constitution);
        let max_hp = (class_rules.hit_die as i32 + con).max(1) as u32;

        let mut progression = Self {
            class,
            level: 1,
            experience: 0,
            mode: ProgressionMode::Experience,
            abilities,
            max_hp,
            features: Vec::new(),
            pending_choices: Vec::new(),
            feats: Vec::new(),
            milestones: Vec::new(),
        };

        for def in class_rules.features_at(1) {
            progression.grant_feature(def, 1, None);
        }
        Ok(progression)
    }

    pub fn with_mode(mut self, mode: ProgressionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn proficiency_bonus(&self) -> i32 {
        proficiency_bonus(self.level)
    }

    pub fn has_pending_choices(&self) -> bool {
        !self.pending_choices.is_empty()
    }

    /// Add experience. Reports whether the total now qualifies for a higher
    /// level but never changes the level itself.
    pub fn award_xp(&mut self, amount: u32, rules: &RulesConfig) -> XpAward {
        let previous_total = self.experience;
        self.experience = self.experience.saturating_add(amount);

        let qualified = rules.experience.level_for_xp(self.experience);
        let leveled_up = self.mode == ProgressionMode::Experience && qualified > self.level;

        debug!(
            class = %self.class,
            amount,
            total = self.experience,
            leveled_up,
            "Experience awarded"
        );

        XpAward {
            previous_total,
            new_total: self.experience,
            leveled_up,
            new_level: leveled_up.then_some(qualified),
        }
    }

    /// Track a new milestone.
    pub fn add_milestone(&mut self, milestone: Milestone) -> EngineResult<()> {
        if !(2..=MAX_LEVEL).contains(&milestone.target_level) {
            return Err(Rejection::InvalidMilestoneLevel {
                level: milestone.target_level,
            }
            .into());
        }
        if self.milestones.iter().any(|m| m.name == milestone.name) {
            return Err(Rejection::DuplicateMilestone.into());
        }
        self.milestones.push(milestone);
        Ok(())
    }

    /// The first open milestone that lies above the current level.
    pub fn next_milestone(&self) -> Option<&Milestone> {
        self.milestones
            .iter()
            .find(|m| !m.completed && m.target_level > self.level)
    }

    /// Highest level granted by completed milestones.
    pub fn milestone_level(&self) -> u8 {
        self.milestones
            .iter()
            .filter(|m| m.completed)
            .map(|m| m.target_level)
            .max()
            .unwrap_or(1)
    }

    /// Mark a milestone complete. Like [`award_xp`](Self::award_xp) this only
    /// reports eligibility; the level changes through `level_up`.
    pub fn complete_milestone(&mut self, name: &str) -> EngineResult<MilestoneAward> {
        let milestone = self
            .milestones
            .iter_mut()
            .find(|m| m.name == name)
            .ok_or_else(|| EngineError::not_found(EntityKind::Milestone, name))?;
        if milestone.completed {
            return Err(Rejection::MilestoneCompleted.into());
        }
        milestone.completed = true;
        let target_level = milestone.target_level;

        let qualified = self.milestone_level();
        let leveled_up = self.mode == ProgressionMode::Milestone && qualified > self.level;
        info!(class = %self.class, milestone = name, target_level, leveled_up, "Milestone completed");

        Ok(MilestoneAward {
            milestone: name.to_string(),
            target_level,
            leveled_up,
            new_level: leveled_up.then_some(qualified),
        })
    }

    /// Advance one level.
    ///
    /// `hp_roll` is the hit die result; `None` takes the average. `choices`
    /// maps feature names gained at the new level to the selected option.
    /// Choices left out become pending and block the next level-up.
    pub fn level_up(
        &mut self,
        rules: &RulesConfig,
        hp_roll: Option<u32>,
        choices: &BTreeMap<String, String>,
    ) -> EngineResult<LevelUpOutcome> {
        let class_rules = rules.class(self.class)?;

        if self.level >= MAX_LEVEL {
            return Err(Rejection::AtMaxLevel.into());
        }
        if self.has_pending_choices() {
            let names = self
                .pending_choices
                .iter()
                .map(|p| p.feature.clone())
                .collect();
            warn!(class = %self.class, level = self.level, "Level up blocked by pending choices");
            return Err(Rejection::PendingChoices(names).into());
        }

        let new_level = self.level + 1;
        if self.mode == ProgressionMode::Experience {
            let needed = rules.experience.xp_for_level(new_level).unwrap_or(u32::MAX);
            if self.experience < needed {
                return Err(Rejection::InsufficientExperience {
                    have: self.experience,
                    needed,
                }
                .into());
            }
        }

        let hit_die = class_rules.hit_die;
        let die_result = match hp_roll {
            Some(roll) if roll == 0 || roll > hit_die => {
                return Err(Rejection::InvalidHitDieRoll { roll, hit_die }.into());
            }
            Some(roll) => roll,
            None => hit_die / 2 + 1,
        };

        let new_features = class_rules.features_at(new_level);
        for (feature, choice) in choices {
            let def = new_features
                .iter()
                .find(|d| d.name.eq_ignore_ascii_case(feature) && d.choice.is_some())
                .ok_or_else(|| Rejection::InvalidChoice {
                    feature: feature.clone(),
                    choice: choice.clone(),
                })?;
            let accepted = def.choice.as_ref().is_some_and(|c| c.accepts(choice));
            if !accepted {
                return Err(Rejection::InvalidChoice {
                    feature: feature.clone(),
                    choice: choice.clone(),
                }
                .into());
            }
        }

        // Validation done; apply.
        let con = self.abilities.modifier(Ability::Constitution);
        let hp_gained = (die_result as i32 + con).max(1) as u32;
        let previous_level = self.level;
        self.level = new_level;
        self.max_hp += hp_gained;

        let ledger_start = self.features.len();
        let pending_start = self.pending_choices.len();
        for def in new_features {
            let choice = choices
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(&def.name))
                .map(|(_, choice)| choice.clone());
            self.grant_feature(def, new_level, choice);
        }

        let asi_eligible = class_rules.asi_levels.contains(&new_level);
        if asi_eligible {
            self.pending_choices.push(PendingChoice {
                feature: "Ability Score Improvement".to_string(),
                level: new_level,
                kind: ChoiceKind::AbilityScoreImprovement,
                options: Vec::new(),
            });
        }

        let outcome = LevelUpOutcome {
            previous_level,
            new_level,
            hp_gained,
            new_max_hp: self.max_hp,
            features: self.features[ledger_start..].to_vec(),
            pending_choices: self.pending_choices[pending_start..].to_vec(),
            asi_eligible,
            proficiency_bonus: proficiency_bonus(new_level),
            proficiency_increased: proficiency_bonus(new_level) > proficiency_bonus(previous_level),
            slot_changes: Vec::new(),
        };

        info!(
            class = %self.class,
            level = new_level,
            hp_gained,
            pending = outcome.pending_choices.len(),
            "Level up"
        );
        Ok(outcome)
    }

    /// Answer a pending feature choice.
    pub fn resolve_choice(&mut self, feature: &str, choice: &str) -> EngineResult<()> {
        let index = self
            .pending_choices
            .iter()
            .position(|p| {
                p.feature.eq_ignore_ascii_case(feature)
                    && p.kind != ChoiceKind::AbilityScoreImprovement
            })
            .ok_or_else(|| EngineError::not_found(EntityKind::Feature, feature))?;

        let pending = &self.pending_choices[index];
        let def = ChoiceDef {
            kind: pending.kind,
            options: pending.options.clone(),
        };
        if !def.accepts(choice) {
            return Err(Rejection::InvalidChoice {
                feature: feature.to_string(),
                choice: choice.to_string(),
            }
            .into());
        }

        let pending = self.pending_choices.remove(index);
        if let Some(gained) = self
            .features
            .iter_mut()
            .rev()
            .find(|f| f.level == pending.level && f.name == pending.feature && f.choice.is_none())
        {
            gained.choice = Some(choice.to_string());
        }
        debug!(feature = %pending.feature, choice, "Choice resolved");
        Ok(())
    }

    /// Spend a pending ability score improvement.
    pub fn apply_improvement(&mut self, improvement: Improvement) -> EngineResult<ImprovementOutcome> {
        let index = self
            .pending_choices
            .iter()
            .position(|p| p.kind == ChoiceKind::AbilityScoreImprovement)
            .ok_or(Rejection::NoImprovementAvailable)?;

        let outcome = match improvement {
            Improvement::Abilities(increases) => {
                if let Some((ability, _)) = increases.iter().find(|(_, n)| *n == 0) {
                    return Err(Rejection::InvalidChoice {
                        feature: self.pending_choices[index].feature.clone(),
                        choice: format!("{ability} +0"),
                    }
                    .into());
                }
                let total: u32 = increases.iter().map(|(_, n)| *n as u32).sum();
                let distinct = increases
                    .iter()
                    .all(|(a, _)| increases.iter().filter(|(b, _)| a == b).count() == 1);
                if total != 2 || increases.is_empty() || increases.len() > 2 || !distinct {
                    return Err(Rejection::InvalidImprovement.into());
                }

                let con_before = self.abilities.modifier(Ability::Constitution);
                let mut changes = Vec::new();
                for (ability, amount) in increases {
                    let score = self.abilities.get_mut(ability);
                    let before = *score;
                    *score = score.saturating_add(amount).min(MAX_ABILITY_SCORE);
                    changes.push((ability, before, *score));
                }

                // A higher CON modifier applies retroactively to every level.
                let con_after = self.abilities.modifier(Ability::Constitution);
                let hp_gained = ((con_after - con_before).max(0) * self.level as i32) as u32;
                self.max_hp += hp_gained;

                ImprovementOutcome {
                    changes,
                    feat: None,
                    hp_gained,
                }
            }
            Improvement::Feat(name) => {
                if name.trim().is_empty() {
                    return Err(Rejection::InvalidImprovement.into());
                }
                self.feats.push(name.clone());
                ImprovementOutcome {
                    changes: Vec::new(),
                    feat: Some(name),
                    hp_gained: 0,
                }
            }
        };

        let pending = self.pending_choices.remove(index);
        debug!(
            level = pending.level,
            changes = ?outcome.changes,
            feat = ?outcome.feat,
            "Improvement applied"
        );
        Ok(outcome)
    }

    fn grant_feature(&mut self, def: &FeatureDef, level: u8, choice: Option<String>) {
        if let (Some(choice_def), None) = (&def.choice, &choice) {
            self.pending_choices.push(PendingChoice {
                feature: def.name.clone(),
                level,
                kind: choice_def.kind,
                options: choice_def.options.clone(),
            });
        }
        self.features.push(GainedFeature {
            name: def.name.clone(),
            level,
            choice,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> &'static RulesConfig {
        RulesConfig::standard().unwrap()
    }

    fn fighter() -> Progression {
        let mut p = Progression::new(
            CharacterClass::Fighter,
            AbilityScores::new(16, 14, 14, 10, 12, 8),
            rules(),
        )
        .unwrap();
        p.resolve_choice("Fighting Style", "Defense").unwrap();
        p
    }

    #[test]
    fn test_ability_modifier() {
        assert_eq!(ability_modifier(10), 0);
        assert_eq!(ability_modifier(11), 0);
        assert_eq!(ability_modifier(9), -1);
        assert_eq!(ability_modifier(8), -1);
        assert_eq!(ability_modifier(20), 5);
        assert_eq!(ability_modifier(1), -5);
    }

    #[test]
    fn test_proficiency_bonus_steps() {
        assert_eq!(proficiency_bonus(1), 2);
        assert_eq!(proficiency_bonus(4), 2);
        assert_eq!(proficiency_bonus(5), 3);
        assert_eq!(proficiency_bonus(9), 4);
        assert_eq!(proficiency_bonus(13), 5);
        assert_eq!(proficiency_bonus(17), 6);
        assert_eq!(proficiency_bonus(20), 6);
        for level in 1..MAX_LEVEL {
            assert!(proficiency_bonus(level + 1) >= proficiency_bonus(level));
        }
    }

    #[test]
    fn test_level_for_xp() {
        let table = &rules().experience;
        assert_eq!(table.level_for_xp(0), 1);
        assert_eq!(table.level_for_xp(299), 1);
        assert_eq!(table.level_for_xp(300), 2);
        assert_eq!(table.level_for_xp(6500), 5);
        assert_eq!(table.level_for_xp(354_999), 19);
        assert_eq!(table.level_for_xp(1_000_000), 20);
        assert_eq!(table.xp_to_next_level(1, 100), Some(200));
        assert_eq!(table.xp_to_next_level(20, 400_000), None);
    }

    #[test]
    fn test_new_character_has_level_one_features() {
        let p = Progression::new(
            CharacterClass::Fighter,
            AbilityScores::new(16, 14, 14, 10, 12, 8),
            rules(),
        )
        .unwrap();
        assert_eq!(p.max_hp, 12);
        assert!(p.features.iter().any(|f| f.name == "Second Wind"));
        assert_eq!(p.pending_choices.len(), 1);
        assert_eq!(p.pending_choices[0].kind, ChoiceKind::FightingStyle);
    }

    #[test]
    fn test_award_xp_signals_without_leveling() {
        let mut p = fighter();
        let award = p.award_xp(250, rules());
        assert!(!award.leveled_up);
        let award = p.award_xp(700, rules());
        assert_eq!(award.new_total, 950);
        assert!(award.leveled_up);
        assert_eq!(award.new_level, Some(3));
        assert_eq!(p.level, 1);
    }

    #[test]
    fn test_level_up_average_hp() {
        let mut p = fighter();
        p.award_xp(300, rules());
        let outcome = p.level_up(rules(), None, &BTreeMap::new()).unwrap();
        // d10 average 6 + CON 2
        assert_eq!(outcome.hp_gained, 8);
        assert_eq!(outcome.new_max_hp, 20);
        assert_eq!(outcome.new_level, 2);
        assert!(outcome.features.iter().any(|f| f.name == "Action Surge"));
        assert!(outcome.is_complete());
    }

    #[test]
    fn test_level_up_minimum_one_hp() {
        let mut p = Progression::new(
            CharacterClass::Wizard,
            AbilityScores::new(8, 14, 3, 16, 12, 10),
            rules(),
        )
        .unwrap()
        .with_mode(ProgressionMode::Milestone);
        assert_eq!(p.max_hp, 2);
        let outcome = p.level_up(rules(), Some(1), &BTreeMap::new()).unwrap();
        assert_eq!(outcome.hp_gained, 1);
    }

    #[test]
    fn test_level_up_rejections_leave_record_untouched() {
        let mut p = fighter();
        let before = p.clone();

        let err = p.level_up(rules(), None, &BTreeMap::new()).unwrap_err();
        assert_eq!(err.code(), "insufficient_experience");
        assert_eq!(p, before);

        p.award_xp(300, rules());
        let before = p.clone();
        let err = p.level_up(rules(), Some(11), &BTreeMap::new()).unwrap_err();
        assert_eq!(
            err.rejection(),
            Some(&Rejection::InvalidHitDieRoll {
                roll: 11,
                hit_die: 10
            })
        );
        assert_eq!(p, before);

        let mut bogus = BTreeMap::new();
        bogus.insert("Martial Archetype".to_string(), "Champion".to_string());
        let err = p.level_up(rules(), None, &bogus).unwrap_err();
        assert_eq!(err.code(), "invalid_choice");
        assert_eq!(p, before);
    }

    #[test]
    fn test_subclass_choice_blocks_until_resolved() {
        let mut p = fighter().with_mode(ProgressionMode::Milestone);
        p.level_up(rules(), None, &BTreeMap::new()).unwrap();
        let outcome = p.level_up(rules(), None, &BTreeMap::new()).unwrap();
        assert_eq!(outcome.new_level, 3);
        assert!(!outcome.is_complete());
        assert_eq!(outcome.pending_choices[0].kind, ChoiceKind::Subclass);

        let err = p.level_up(rules(), None, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err.rejection(), Some(Rejection::PendingChoices(_))));
        assert_eq!(p.level, 3);

        assert_eq!(
            p.resolve_choice("Martial Archetype", "Gunslinger")
                .unwrap_err()
                .code(),
            "invalid_choice"
        );
        p.resolve_choice("martial archetype", "Champion").unwrap();
        assert!(p
            .features
            .iter()
            .any(|f| f.name == "Martial Archetype" && f.choice.as_deref() == Some("Champion")));
        assert!(p.level_up(rules(), None, &BTreeMap::new()).is_ok());
    }

    #[test]
    fn test_choice_supplied_with_level_up() {
        let mut p = fighter().with_mode(ProgressionMode::Milestone);
        p.level_up(rules(), None, &BTreeMap::new()).unwrap();
        let mut choices = BTreeMap::new();
        choices.insert("Martial Archetype".to_string(), "Battle Master".to_string());
        let outcome = p.level_up(rules(), Some(7), &choices).unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.hp_gained, 9);
    }

    #[test]
    fn test_asi_levels_and_improvement() {
        let mut p = fighter().with_mode(ProgressionMode::Milestone);
        let mut choices = BTreeMap::new();
        choices.insert("Martial Archetype".to_string(), "Champion".to_string());
        p.level_up(rules(), None, &BTreeMap::new()).unwrap();
        p.level_up(rules(), None, &choices).unwrap();
        let outcome = p.level_up(rules(), None, &BTreeMap::new()).unwrap();
        assert_eq!(outcome.new_level, 4);
        assert!(outcome.asi_eligible);
        assert_eq!(
            outcome.pending_choices[0].kind,
            ChoiceKind::AbilityScoreImprovement
        );

        // CON 14 -> 16 raises the modifier by one, applied to all four levels.
        let hp_before = p.max_hp;
        let result = p
            .apply_improvement(Improvement::Abilities(vec![(Ability::Constitution, 2)]))
            .unwrap();
        assert_eq!(result.changes, vec![(Ability::Constitution, 14, 16)]);
        assert_eq!(result.hp_gained, 4);
        assert_eq!(p.max_hp, hp_before + 4);
        assert!(!p.has_pending_choices());

        assert_eq!(
            p.apply_improvement(Improvement::Feat("Alert".into()))
                .unwrap_err()
                .code(),
            "no_improvement_available"
        );
    }

    #[test]
    fn test_improvement_clamps_and_validates() {
        let mut p = fighter().with_mode(ProgressionMode::Milestone);
        p.abilities.strength = 19;
        p.pending_choices.push(PendingChoice {
            feature: "Ability Score Improvement".into(),
            level: 4,
            kind: ChoiceKind::AbilityScoreImprovement,
            options: Vec::new(),
        });

        let err = p
            .apply_improvement(Improvement::Abilities(vec![(Ability::Strength, 3)]))
            .unwrap_err();
        assert_eq!(err.code(), "invalid_improvement");

        let result = p
            .apply_improvement(Improvement::Abilities(vec![(Ability::Strength, 2)]))
            .unwrap();
        assert_eq!(result.changes, vec![(Ability::Strength, 19, 20)]);
    }

    #[test]
    fn test_zero_point_increase_rejected() {
        let mut p = fighter();
        p.pending_choices.push(PendingChoice {
            feature: "Ability Score Improvement".into(),
            level: 4,
            kind: ChoiceKind::AbilityScoreImprovement,
            options: Vec::new(),
        });
        let before = p.clone();
        let err = p
            .apply_improvement(Improvement::Abilities(vec![
                (Ability::Strength, 2),
                (Ability::Dexterity, 0),
            ]))
            .unwrap_err();
        assert_eq!(
            err.rejection(),
            Some(&Rejection::InvalidChoice {
                feature: "Ability Score Improvement".into(),
                choice: "Dexterity +0".into(),
            })
        );
        assert_eq!(p, before);
    }

    #[test]
    fn test_campaign_milestones_by_act() {
        let milestones = campaign_milestones(&["The Lost Mine", "The Spider's Web", "Wave Echo Cave"]);
        let plan: Vec<_> = milestones
            .iter()
            .map(|m| (m.name.as_str(), m.target_level))
            .collect();
        assert_eq!(
            plan,
            vec![
                ("Complete The Lost Mine", 4),
                ("Major Discovery in The Lost Mine", 2),
                ("Complete The Spider's Web", 8),
                ("Major Discovery in The Spider's Web", 6),
                ("Complete Wave Echo Cave", 12),
            ]
        );
        assert!(milestones.iter().all(|m| !m.completed));
    }

    #[test]
    fn test_milestone_completion_signals_level_up() {
        let mut p = fighter().with_mode(ProgressionMode::Milestone);
        for milestone in campaign_milestones(&["Act One", "Act Two"]) {
            p.add_milestone(milestone).unwrap();
        }
        assert_eq!(
            p.add_milestone(Milestone::new("Complete Act One", "", 4))
                .unwrap_err()
                .code(),
            "duplicate_milestone"
        );
        assert_eq!(
            p.add_milestone(Milestone::new("Prologue", "", 1))
                .unwrap_err()
                .code(),
            "invalid_milestone_level"
        );
        assert_eq!(p.next_milestone().unwrap().name, "Complete Act One");

        let award = p.complete_milestone("Major Discovery in Act One").unwrap();
        assert!(award.leveled_up);
        assert_eq!(award.new_level, Some(2));
        assert_eq!(p.level, 1);
        assert_eq!(p.milestone_level(), 2);

        p.level_up(rules(), None, &BTreeMap::new()).unwrap();
        let award = p.complete_milestone("Complete Act One").unwrap();
        assert_eq!(award.new_level, Some(4));
        assert_eq!(p.next_milestone().unwrap().name, "Complete Act Two");

        assert_eq!(
            p.complete_milestone("Complete Act One").unwrap_err().code(),
            "milestone_completed"
        );
        assert!(matches!(
            p.complete_milestone("Slay the Dragon"),
            Err(EngineError::NotFound { kind: EntityKind::Milestone, .. })
        ));
    }

    #[test]
    fn test_experience_mode_ignores_milestones() {
        let mut p = fighter();
        p.add_milestone(Milestone::new("Rescue Sildar", "", 3)).unwrap();
        let award = p.complete_milestone("Rescue Sildar").unwrap();
        assert!(!award.leveled_up);
        assert_eq!(award.new_level, None);
    }

    #[test]
    fn test_fighter_extra_asi_levels() {
        let fighter_asi = &rules().class(CharacterClass::Fighter).unwrap().asi_levels;
        assert!(fighter_asi.contains(&6) && fighter_asi.contains(&14));
        let rogue_asi = &rules().class(CharacterClass::Rogue).unwrap().asi_levels;
        assert!(rogue_asi.contains(&10) && !rogue_asi.contains(&6));
    }

    #[test]
    fn test_cannot_pass_max_level() {
        let mut p = fighter().with_mode(ProgressionMode::Milestone);
        p.level = MAX_LEVEL;
        let err = p.level_up(rules(), None, &BTreeMap::new()).unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::AtMaxLevel));
    }
}
