//! Knowledge Graph Domain Models
//!
//! Entity and relationship structures as they are read from the graph store.
//! The graph is owned by the extraction pipeline; everything here is read-only.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Relationship Types
// =============================================================================

/// Types of directed relationships stored in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    /// A visa or route requires a requirement/document
    Requires,
    /// A requirement is satisfied by a document or evidence
    SatisfiedBy,
    /// A requirement depends on another requirement
    DependsOn,
    /// A rule applies if a condition holds
    AppliesIf,
    /// A visa can transition to another visa
    CanTransitionTo,
    /// A source passage contains an entity
    ContainsEntity,
}

impl RelationType {
    /// Relationship types that traversal strategies are allowed to follow.
    pub const TRAVERSABLE: [RelationType; 5] = [
        RelationType::Requires,
        RelationType::SatisfiedBy,
        RelationType::DependsOn,
        RelationType::AppliesIf,
        RelationType::CanTransitionTo,
    ];

    /// Canonical upper-case label (`REQUIRES`, `SATISFIED_BY`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requires => "REQUIRES",
            Self::SatisfiedBy => "SATISFIED_BY",
            Self::DependsOn => "DEPENDS_ON",
            Self::AppliesIf => "APPLIES_IF",
            Self::CanTransitionTo => "CAN_TRANSITION_TO",
            Self::ContainsEntity => "CONTAINS_ENTITY",
        }
    }

    /// Name of the edge table used by stores that keep one table per type.
    pub fn table_name(self) -> &'static str {
        match self {
            Self::Requires => "requires",
            Self::SatisfiedBy => "satisfied_by",
            Self::DependsOn => "depends_on",
            Self::AppliesIf => "applies_if",
            Self::CanTransitionTo => "can_transition_to",
            Self::ContainsEntity => "contains_entity",
        }
    }

    /// Inverse of [`RelationType::table_name`].
    pub fn from_table_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.table_name() == name)
    }

    const ALL: [RelationType; 6] = [
        RelationType::Requires,
        RelationType::SatisfiedBy,
        RelationType::DependsOn,
        RelationType::AppliesIf,
        RelationType::CanTransitionTo,
        RelationType::ContainsEntity,
    ];
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == normalized)
            .ok_or_else(|| format!("unknown relationship type: {s}"))
    }
}

// =============================================================================
// Entity
// =============================================================================

/// A node of the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable identifier
    pub id: String,
    /// Display surface form
    #[serde(alias = "name")]
    pub text: String,
    /// Category tags (e.g. `VisaType`, `Document`)
    #[serde(default, alias = "type")]
    pub labels: Vec<String>,
    /// Source passages mentioning this entity, in extraction order
    #[serde(default)]
    pub chunk_ids: Vec<String>,
}

impl Entity {
    /// Whether any source passage is linked to this entity.
    pub fn has_documents(&self) -> bool {
        !self.chunk_ids.is_empty()
    }
}

/// An entity returned by a full-text lookup, with its match score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMatch {
    pub entity: Entity,
    /// Store-specific relevance, higher is better
    pub score: f32,
}

// =============================================================================
// Relationship
// =============================================================================

/// A directed, typed edge between two entities, as written by the extraction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Source entity ID
    pub source_id: String,
    /// Target entity ID
    pub target_id: String,
    /// Relationship type
    #[serde(rename = "type", alias = "relation_type")]
    pub relation_type: RelationType,
}

/// An outgoing edge as seen during traversal: the target is materialised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source_id: String,
    pub relation: RelationType,
    pub target: Entity,
}
