//! Data-driven reward qualification rules
//!
//! One rule row per membership level, interpreted uniformly by the reward
//! engine: which ancestor receives the reward (`recipient_depth` hops up
//! the matrix chain), which owned level qualifies them, and how much flows.
//! Level 1 carries an admin fee, so its rewardable amount differs from the
//! catalog price; level 1 qualification is additionally governed by the
//! sequence rule.

use crate::error::{MatrixError, MatrixResult};
use crate::layer::MAX_LAYER_DEPTH;
use crate::reward::Amount;
use serde::{Deserialize, Serialize};

/// Qualification and routing rule for one membership level
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRule {
    /// Membership level, 1..=19
    pub level: u8,
    /// Catalog name
    pub name: String,
    /// Purchase price, admin fee included
    pub price: Amount,
    /// Rewardable portion routed to the ancestor
    pub reward_amount: Amount,
    /// Minimum owned level for the reward to be immediately claimable
    pub required_level: u8,
    /// Matrix-chain hops from the purchaser to the recipient
    pub recipient_depth: u8,
}

/// The full per-level rule table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSchedule {
    rules: Vec<LevelRule>,
}

/// Catalog names for the 19 levels
const LEVEL_NAMES: [&str; 19] = [
    "Warrior",
    "Bronze",
    "Silver",
    "Gold",
    "Elite",
    "Platinum",
    "Master",
    "Diamond",
    "Grandmaster",
    "Star Shine",
    "Epic",
    "Hall",
    "The Strongest King",
    "The King of Kings",
    "Glory King",
    "Legendary Overlord",
    "Supreme Lord",
    "Supreme Myth",
    "Mythical Peak",
];

impl LevelSchedule {
    /// The production catalog: level 1 at 130 USDT (100 rewardable, 30
    /// admin fee) paid one hop up; level 2 at 150 USDT paid two hops up;
    /// levels 3..=19 at +50 USDT per level paid at matrix depth = level.
    pub fn standard() -> Self {
        let mut rules = Vec::with_capacity(MAX_LAYER_DEPTH as usize);
        for level in 1..=MAX_LAYER_DEPTH {
            let name = LEVEL_NAMES[level as usize - 1].to_string();
            let rule = match level {
                1 => LevelRule {
                    level,
                    name,
                    price: Amount::from_usdt(130),
                    reward_amount: Amount::from_usdt(100),
                    required_level: 1,
                    recipient_depth: 1,
                },
                2 => LevelRule {
                    level,
                    name,
                    price: Amount::from_usdt(150),
                    reward_amount: Amount::from_usdt(150),
                    required_level: 2,
                    recipient_depth: 2,
                },
                _ => {
                    let price = Amount::from_usdt(150 + 50 * (level as u64 - 2));
                    LevelRule {
                        level,
                        name,
                        price,
                        reward_amount: price,
                        required_level: level,
                        recipient_depth: level,
                    }
                }
            };
            rules.push(rule);
        }
        Self { rules }
    }

    /// Build from caller-supplied rules, validating shape
    pub fn from_rules(rules: Vec<LevelRule>) -> MatrixResult<Self> {
        if rules.is_empty() {
            return Err(MatrixError::InvalidSchedule("empty schedule".into()));
        }
        for (idx, rule) in rules.iter().enumerate() {
            let expected = idx as u8 + 1;
            if rule.level != expected {
                return Err(MatrixError::InvalidSchedule(format!(
                    "rule at index {} has level {}, expected {}",
                    idx, rule.level, expected
                )));
            }
            if rule.reward_amount.is_zero() {
                return Err(MatrixError::InvalidSchedule(format!(
                    "level {} has zero reward amount",
                    rule.level
                )));
            }
            if rule.recipient_depth == 0 || rule.recipient_depth > MAX_LAYER_DEPTH {
                return Err(MatrixError::InvalidSchedule(format!(
                    "level {} has recipient depth {} outside 1..={}",
                    rule.level, rule.recipient_depth, MAX_LAYER_DEPTH
                )));
            }
        }
        Ok(Self { rules })
    }

    pub fn rule(&self, level: u8) -> MatrixResult<&LevelRule> {
        self.rules
            .iter()
            .find(|rule| rule.level == level)
            .ok_or(MatrixError::InvalidLevel(level))
    }

    pub fn max_level(&self) -> u8 {
        self.rules.last().map(|rule| rule.level).unwrap_or(0)
    }

    pub fn rules(&self) -> &[LevelRule] {
        &self.rules
    }
}

impl Default for LevelSchedule {
    fn default() -> Self {
        Self::standard()
    }
}

/// Escalation rule for level-1-triggered rewards
///
/// The first `relaxed_rewards` level-1 rewards an ancestor receives need
/// only `relaxed_required_level`; every later one needs
/// `escalated_required_level`. The count is global per ancestor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRule {
    pub relaxed_rewards: u32,
    pub relaxed_required_level: u8,
    pub escalated_required_level: u8,
}

impl SequenceRule {
    /// Required owned level for the (zero-based) `prior_rewards`+1-th reward
    pub fn required_level(&self, prior_rewards: u32) -> u8 {
        if prior_rewards < self.relaxed_rewards {
            self.relaxed_required_level
        } else {
            self.escalated_required_level
        }
    }
}

impl Default for SequenceRule {
    fn default() -> Self {
        Self {
            relaxed_rewards: 2,
            relaxed_required_level: 1,
            escalated_required_level: 2,
        }
    }
}
