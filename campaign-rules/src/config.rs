//! Rules configuration.
//!
//! Every static table the engine consults lives here as plain data: hit
//! dice, ASI levels, class features, slot tables, experience thresholds,
//! and the spell catalog. The standard tables ship embedded in the crate;
//! hosts can load their own document to extend or replace content.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{EngineError, EntityKind};
use crate::progression::{Ability, CharacterClass, ExperienceTable, FeatureDef, MAX_LEVEL};
use crate::slots::{CasterArchetype, SlotTables};
use crate::spellcasting::PreparationStyle;
use crate::spells::SpellCatalog;

const STANDARD_RULES: &str = include_str!("../data/rules.json");

static STANDARD: LazyLock<Result<RulesConfig, String>> =
    LazyLock::new(|| RulesConfig::from_json_str(STANDARD_RULES).map_err(|e| e.to_string()));

/// Errors from loading a rules document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid rules configuration: {0}")]
    Invalid(String),
}

/// Per-class rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRules {
    pub hit_die: u32,
    pub asi_levels: Vec<u8>,
    #[serde(default)]
    pub caster: CasterArchetype,
    #[serde(default)]
    pub preparation: Option<PreparationStyle>,
    #[serde(default)]
    pub spellcasting_ability: Option<Ability>,
    /// Features gained at each level.
    #[serde(default)]
    pub features: BTreeMap<u8, Vec<FeatureDef>>,
}

impl ClassRules {
    pub fn features_at(&self, level: u8) -> &[FeatureDef] {
        self.features
            .get(&level)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// The complete set of static rules tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesConfig {
    pub experience: ExperienceTable,
    pub slot_tables: SlotTables,
    pub classes: HashMap<CharacterClass, ClassRules>,
    #[serde(default)]
    pub spells: SpellCatalog,
}

impl RulesConfig {
    /// The standard tables embedded in the crate, parsed once.
    pub fn standard() -> Result<&'static RulesConfig, ConfigError> {
        STANDARD.as_ref().map_err(|e| ConfigError::Invalid(e.clone()))
    }

    /// Parse and validate a rules document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: RulesConfig = serde_json::from_str(json)?;
        config.validate()?;
        debug!(
            classes = config.classes.len(),
            spells = config.spells.len(),
            "Rules configuration parsed"
        );
        Ok(config)
    }

    /// Load a rules document from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await?;
        let config = Self::from_json_str(&content)?;
        info!(path = %path.display(), "Loaded rules configuration");
        Ok(config)
    }

    /// Rules for a class.
    pub fn class(&self, class: CharacterClass) -> Result<&ClassRules, EngineError> {
        self.classes
            .get(&class)
            .ok_or_else(|| EngineError::not_found(EntityKind::Class, class))
    }

    /// Check the structural rules every table must satisfy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let levels = MAX_LEVEL as usize;
        let xp = &self.experience.0;
        if xp.len() != levels {
            return Err(ConfigError::Invalid(format!(
                "expected {levels} experience thresholds, found {}",
                xp.len()
            )));
        }
        if xp.first() != Some(&0) || xp.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::Invalid(
                "experience thresholds must start at 0 and strictly increase".into(),
            ));
        }

        if self.slot_tables.full.len() != levels || self.slot_tables.pact.len() != levels {
            return Err(ConfigError::Invalid(format!(
                "slot tables must have {levels} rows"
            )));
        }
        if self.slot_tables.full.iter().any(|row| row.len() > 9) {
            return Err(ConfigError::Invalid(
                "full caster rows cannot exceed 9 spell levels".into(),
            ));
        }
        if self
            .slot_tables
            .pact
            .iter()
            .any(|row| !(1..=9).contains(&row.slot_level))
        {
            return Err(ConfigError::Invalid(
                "pact slot levels must be between 1 and 9".into(),
            ));
        }

        for (class, rules) in &self.classes {
            if ![6, 8, 10, 12].contains(&rules.hit_die) {
                return Err(ConfigError::Invalid(format!(
                    "{class} has unsupported hit die d{}",
                    rules.hit_die
                )));
            }
            if rules
                .asi_levels
                .iter()
                .chain(rules.features.keys())
                .any(|&level| level == 0 || level > MAX_LEVEL)
            {
                return Err(ConfigError::Invalid(format!(
                    "{class} references a level outside 1..={MAX_LEVEL}"
                )));
            }
            if rules.caster != CasterArchetype::None
                && (rules.preparation.is_none() || rules.spellcasting_ability.is_none())
            {
                return Err(ConfigError::Invalid(format!(
                    "{class} casts spells but has no preparation style or ability"
                )));
            }
        }

        for spell in self.spells.iter() {
            if spell.level > 9 {
                return Err(ConfigError::Invalid(format!(
                    "{} has level {}",
                    spell.name, spell.level
                )));
            }
        }

        Ok(())
    }
}
