//! Routing commands emitted by the supervisor.

use crate::state::StatePatch;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The five agent workers, in the order they usually run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentName {
    Research,
    Architect,
    Codesmith,
    Reviewfix,
    Responder,
}

impl AgentName {
    pub const ALL: [AgentName; 5] = [
        AgentName::Research,
        AgentName::Architect,
        AgentName::Codesmith,
        AgentName::Reviewfix,
        AgentName::Responder,
    ];

    /// Worker (server) name as configured in the orchestrator.
    pub fn server(&self) -> &'static str {
        match self {
            AgentName::Research => "research",
            AgentName::Architect => "architect",
            AgentName::Codesmith => "codesmith",
            AgentName::Reviewfix => "reviewfix",
            AgentName::Responder => "responder",
        }
    }

    /// The single tool each worker exposes.
    pub fn tool(&self) -> &'static str {
        match self {
            AgentName::Research => "research",
            AgentName::Architect => "design",
            AgentName::Codesmith => "generate",
            AgentName::Reviewfix => "review_and_fix",
            AgentName::Responder => "format_response",
        }
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.server())
    }
}

impl FromStr for AgentName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "research" => Ok(AgentName::Research),
            "architect" => Ok(AgentName::Architect),
            "codesmith" => Ok(AgentName::Codesmith),
            "reviewfix" => Ok(AgentName::Reviewfix),
            "responder" => Ok(AgentName::Responder),
            other => Err(format!("unknown agent: {other}")),
        }
    }
}

/// Where the graph goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Goto {
    Agent(AgentName),
    Hitl,
    End,
}

impl fmt::Display for Goto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Goto::Agent(agent) => f.write_str(agent.server()),
            Goto::Hitl => f.write_str("hitl"),
            Goto::End => f.write_str("end"),
        }
    }
}

impl FromStr for Goto {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hitl" => Ok(Goto::Hitl),
            "end" => Ok(Goto::End),
            other => AgentName::from_str(other)
                .map(Goto::Agent)
                .map_err(|_| format!("unknown goto target: {other}")),
        }
    }
}

impl TryFrom<String> for Goto {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Goto> for String {
    fn from(goto: Goto) -> Self {
        goto.to_string()
    }
}

/// One supervisor decision: the next node plus a state patch applied before
/// the node runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingCommand {
    pub goto: Goto,
    #[serde(default)]
    pub update: StatePatch,
}

impl RoutingCommand {
    pub fn new(goto: Goto) -> Self {
        Self {
            goto,
            update: StatePatch::default(),
        }
    }

    pub fn with_update(mut self, update: StatePatch) -> Self {
        self.update = update;
        self
    }
}
