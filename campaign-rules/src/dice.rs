//! Dice rolling primitives.
//!
//! Every random draw in the engine goes through the [`Roller`] trait so
//! that hosts can plug in their own entropy source and tests can script
//! exact die faces. Standard notation (`XdY+Z`, `4d6kh3`, `2d20kl1`) is
//! parsed into a [`DiceExpression`].

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for dice parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(u32),
    #[error("No dice specified")]
    NoDice,
    #[error("Cannot keep {keep} dice when only rolling {count} (in {notation})")]
    InvalidKeepCount {
        keep: u32,
        count: u32,
        notation: String,
    },
}

/// Source of die faces.
pub trait Roller {
    /// Roll a single die with the given number of sides, returning `1..=sides`.
    fn roll_die(&mut self, sides: u32) -> u32;
}

impl<T: Roller + ?Sized> Roller for &mut T {
    fn roll_die(&mut self, sides: u32) -> u32 {
        (**self).roll_die(sides)
    }
}

/// Adapts any [`rand::Rng`] into a [`Roller`].
#[derive(Debug, Clone)]
pub struct RngRoller<R>(pub R);

impl<R: Rng> RngRoller<R> {
    pub fn new(rng: R) -> Self {
        Self(rng)
    }
}

impl RngRoller<rand::rngs::ThreadRng> {
    /// A roller backed by the thread-local generator.
    pub fn thread() -> Self {
        Self(rand::thread_rng())
    }
}

impl<R: Rng> Roller for RngRoller<R> {
    fn roll_die(&mut self, sides: u32) -> u32 {
        self.0.gen_range(1..=sides.max(1))
    }
}

/// Advantage state for d20 rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Advantage {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl Advantage {
    /// Combine two advantage states. Advantage and disadvantage cancel out.
    pub fn combine(self, other: Advantage) -> Advantage {
        match (self, other) {
            (Advantage::Normal, x) | (x, Advantage::Normal) => x,
            (a, b) if a == b => a,
            _ => Advantage::Normal,
        }
    }
}

/// Die sizes that appear in the rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DieType {
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    D100,
}

impl DieType {
    pub fn sides(&self) -> u32 {
        match self {
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
            DieType::D100 => 100,
        }
    }

    pub fn from_sides(sides: u32) -> Option<DieType> {
        match sides {
            4 => Some(DieType::D4),
            6 => Some(DieType::D6),
            8 => Some(DieType::D8),
            10 => Some(DieType::D10),
            12 => Some(DieType::D12),
            20 => Some(DieType::D20),
            100 => Some(DieType::D100),
            _ => None,
        }
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.sides())
    }
}

/// One `NdS` term of an expression, optionally keeping the highest or
/// lowest subset of the dice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiceTerm {
    pub count: u32,
    pub die: DieType,
    pub keep: Keep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Keep {
    #[default]
    All,
    Highest(u32),
    Lowest(u32),
}

/// A parsed dice expression such as `2d6+1d4+3`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiceExpression {
    pub terms: Vec<DiceTerm>,
    pub modifier: i32,
    pub notation: String,
}

impl DiceExpression {
    /// Parse a dice notation string.
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let normalized: String = notation
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if normalized.is_empty() {
            return Err(DiceError::NoDice);
        }

        let mut expr = DiceExpression {
            terms: Vec::new(),
            modifier: 0,
            notation: normalized.clone(),
        };

        let mut token = String::new();
        let mut sign = 1;
        for ch in normalized.chars() {
            if ch == '+' || ch == '-' {
                if !token.is_empty() {
                    expr.push_token(&token, sign)?;
                    token.clear();
                    sign = 1;
                }
                if ch == '-' {
                    sign = -sign;
                }
            } else {
                token.push(ch);
            }
        }
        if token.is_empty() {
            return Err(DiceError::InvalidNotation(normalized));
        }
        expr.push_token(&token, sign)?;

        Ok(expr)
    }

    fn push_token(&mut self, token: &str, sign: i32) -> Result<(), DiceError> {
        let invalid = || DiceError::InvalidNotation(token.to_string());

        let Some((count, rest)) = token.split_once('d') else {
            let value: i32 = token.parse().map_err(|_| invalid())?;
            self.modifier += sign * value;
            return Ok(());
        };

        // Negative dice terms are not meaningful.
        if sign < 0 {
            return Err(invalid());
        }

        let count: u32 = if count.is_empty() {
            1
        } else {
            count.parse().map_err(|_| invalid())?
        };
        if count == 0 {
            return Err(DiceError::NoDice);
        }

        let (sides, keep) = if let Some((sides, n)) = rest.split_once("kh") {
            (sides, Keep::Highest(n.parse().map_err(|_| invalid())?))
        } else if let Some((sides, n)) = rest.split_once("kl") {
            (sides, Keep::Lowest(n.parse().map_err(|_| invalid())?))
        } else {
            (rest, Keep::All)
        };

        let sides: u32 = sides.parse().map_err(|_| invalid())?;
        let die = DieType::from_sides(sides).ok_or(DiceError::InvalidDieSize(sides))?;

        if let Keep::Highest(n) | Keep::Lowest(n) = keep {
            if n > count {
                return Err(DiceError::InvalidKeepCount {
                    keep: n,
                    count,
                    notation: token.to_string(),
                });
            }
        }

        self.terms.push(DiceTerm { count, die, keep });
        Ok(())
    }

    /// Roll the expression with the thread-local generator.
    pub fn roll(&self) -> RollResult {
        self.roll_with(&mut RngRoller::thread())
    }

    /// Roll the expression with the given roller.
    pub fn roll_with<R: Roller + ?Sized>(&self, roller: &mut R) -> RollResult {
        let terms: Vec<TermResult> = self
            .terms
            .iter()
            .map(|term| {
                let rolls: Vec<u32> = (0..term.count)
                    .map(|_| roller.roll_die(term.die.sides()))
                    .collect();
                let mut kept = rolls.clone();
                match term.keep {
                    Keep::All => {}
                    Keep::Highest(n) => {
                        kept.sort_unstable_by(|a, b| b.cmp(a));
                        kept.truncate(n as usize);
                    }
                    Keep::Lowest(n) => {
                        kept.sort_unstable();
                        kept.truncate(n as usize);
                    }
                }
                TermResult {
                    die: term.die,
                    subtotal: kept.iter().sum(),
                    rolls,
                    kept,
                }
            })
            .collect();

        let dice_total: i32 = terms.iter().map(|t| t.subtotal as i32).sum();
        RollResult {
            notation: self.notation.clone(),
            total: dice_total + self.modifier,
            modifier: self.modifier,
            terms,
        }
    }

    /// Largest total this expression can produce.
    pub fn max_total(&self) -> i32 {
        self.terms
            .iter()
            .map(|t| {
                let kept = match t.keep {
                    Keep::All => t.count,
                    Keep::Highest(n) | Keep::Lowest(n) => n,
                };
                (kept * t.die.sides()) as i32
            })
            .sum::<i32>()
            + self.modifier
    }
}

impl FromStr for DiceExpression {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceExpression::parse(s)
    }
}

impl fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.notation)
    }
}

/// Dice rolled for one term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermResult {
    pub die: DieType,
    pub rolls: Vec<u32>,
    pub kept: Vec<u32>,
    pub subtotal: u32,
}

/// Result of rolling a [`DiceExpression`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollResult {
    pub notation: String,
    pub terms: Vec<TermResult>,
    pub modifier: i32,
    pub total: i32,
}

impl RollResult {
    /// Render the dice as `[4, (2), 6] + 3`, with dropped dice in parentheses.
    pub fn dice_display(&self) -> String {
        let mut parts = Vec::with_capacity(self.terms.len());
        for term in &self.terms {
            let mut remaining = term.kept.clone();
            let shown: Vec<String> = term
                .rolls
                .iter()
                .map(|roll| match remaining.iter().position(|k| k == roll) {
                    Some(i) => {
                        remaining.swap_remove(i);
                        roll.to_string()
                    }
                    None => format!("({roll})"),
                })
                .collect();
            parts.push(format!("[{}]", shown.join(", ")));
        }

        let dice = parts.join(" + ");
        match self.modifier {
            0 => dice,
            m if m > 0 => format!("{dice} + {m}"),
            m => format!("{dice} - {}", m.abs()),
        }
    }

    pub fn meets_dc(&self, dc: i32) -> bool {
        self.total >= dc
    }
}

impl fmt::Display for RollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.dice_display(), self.total)
    }
}

/// A single d20 test: initiative, saving throw, or death save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct D20Roll {
    /// Every d20 that was rolled (two under advantage or disadvantage).
    pub rolls: Vec<u32>,
    /// The face that counts.
    pub natural: u32,
    pub modifier: i32,
    pub total: i32,
    pub advantage: Advantage,
}

impl D20Roll {
    pub fn meets_dc(&self, dc: i32) -> bool {
        self.total >= dc
    }

    pub fn is_natural_20(&self) -> bool {
        self.natural == 20
    }

    pub fn is_natural_1(&self) -> bool {
        self.natural == 1
    }
}

impl fmt::Display for D20Roll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.modifier {
            0 => write!(f, "d20 ({}) = {}", self.natural, self.total),
            m if m > 0 => write!(f, "d20 ({}) + {m} = {}", self.natural, self.total),
            m => write!(f, "d20 ({}) - {} = {}", self.natural, m.abs(), self.total),
        }
    }
}

/// Roll `d20 + modifier`, taking the better or worse of two dice under
/// advantage or disadvantage.
pub fn roll_d20<R: Roller + ?Sized>(roller: &mut R, modifier: i32, advantage: Advantage) -> D20Roll {
    let first = roller.roll_die(20);
    let (rolls, natural) = match advantage {
        Advantage::Normal => (vec![first], first),
        Advantage::Advantage => {
            let second = roller.roll_die(20);
            (vec![first, second], first.max(second))
        }
        Advantage::Disadvantage => {
            let second = roller.roll_die(20);
            (vec![first, second], first.min(second))
        }
    };
    D20Roll {
        rolls,
        natural,
        modifier,
        total: natural as i32 + modifier,
        advantage,
    }
}

/// Parse and roll a notation string with the given roller.
pub fn roll<R: Roller + ?Sized>(notation: &str, roller: &mut R) -> Result<RollResult, DiceError> {
    Ok(DiceExpression::parse(notation)?.roll_with(roller))
}
