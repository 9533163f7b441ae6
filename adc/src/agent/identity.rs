//! Agent identities and model tiers

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// The six agent roles in the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentId {
    ContractWriter,
    Auditor,
    CodeGenerator,
    Evaluator,
    Refiner,
    PrOrchestrator,
}

impl AgentId {
    /// All roles, in workflow order
    pub fn all() -> &'static [AgentId] {
        &[
            AgentId::ContractWriter,
            AgentId::Auditor,
            AgentId::CodeGenerator,
            AgentId::Evaluator,
            AgentId::Refiner,
            AgentId::PrOrchestrator,
        ]
    }

    /// Identity string used in phase records
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentId::ContractWriter => "contract_writer",
            AgentId::Auditor => "auditor",
            AgentId::CodeGenerator => "code_generator",
            AgentId::Evaluator => "evaluator",
            AgentId::Refiner => "refiner",
            AgentId::PrOrchestrator => "pr_orchestrator",
        }
    }

    /// File stem of the role prompt on disk
    pub fn role_file_stem(&self) -> &'static str {
        match self {
            AgentId::Evaluator => "system_evaluator",
            other => other.as_str(),
        }
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Model tier an agent runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Reasoning-heavy model, ~16k output tokens
    Strong,
    /// Cost-effective model, ~8k output tokens
    Light,
}

impl Tier {
    /// Output-token cap for this tier
    pub fn max_output_tokens(&self) -> u32 {
        match self {
            Tier::Strong => 16_000,
            Tier::Light => 8_000,
        }
    }
}

/// Agent identity -> model tier mapping
#[derive(Debug, Clone)]
pub struct TierTable {
    tiers: HashMap<AgentId, Tier>,
}

impl TierTable {
    /// Uniform preset: every agent on the strong tier
    pub fn strong() -> Self {
        debug!("TierTable::strong: called");
        Self {
            tiers: AgentId::all().iter().map(|a| (*a, Tier::Strong)).collect(),
        }
    }

    /// Cost-mixed preset: weaker tier for lightweight agents (refiner,
    /// PR orchestrator), stronger tier for reasoning-heavy agents
    /// (auditor, code generator, evaluator, writer).
    pub fn mixed() -> Self {
        debug!("TierTable::mixed: called");
        let mut tiers: HashMap<AgentId, Tier> = AgentId::all().iter().map(|a| (*a, Tier::Strong)).collect();
        tiers.insert(AgentId::Refiner, Tier::Light);
        tiers.insert(AgentId::PrOrchestrator, Tier::Light);
        Self { tiers }
    }

    /// Resolve a preset by config name; unknown names get the strong preset
    pub fn from_preset(name: &str) -> Self {
        match name {
            "mixed" => Self::mixed(),
            "strong" => Self::strong(),
            other => {
                tracing::warn!(%other, "Unknown tier preset, using strong");
                Self::strong()
            }
        }
    }

    /// Override a single agent's tier
    pub fn with_override(mut self, agent: AgentId, tier: Tier) -> Self {
        self.tiers.insert(agent, tier);
        self
    }

    /// Tier for an agent (strong when unmapped)
    pub fn tier(&self, agent: AgentId) -> Tier {
        self.tiers.get(&agent).copied().unwrap_or(Tier::Strong)
    }
}
