// Control-well roles used by threshold calibration

use serde::{Deserialize, Serialize};

/// Role a control well plays in calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlRole {
    /// All partitions expected positive
    Positive,
    /// Known mixture of positive and negative partitions
    MixPositive,
    /// All partitions expected negative
    Negative,
}

impl ControlRole {
    /// Roles in calibration order
    pub const ALL: [ControlRole; 3] = [
        ControlRole::Positive,
        ControlRole::MixPositive,
        ControlRole::Negative,
    ];

    /// Get human-readable name for display
    pub fn display_name(&self) -> &'static str {
        match self {
            ControlRole::Positive => "Positive",
            ControlRole::MixPositive => "Mixed positive",
            ControlRole::Negative => "Negative",
        }
    }
}

/// Operator-supplied display names of the three control wells
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRoles {
    pub positive: String,
    pub mix_positive: String,
    pub negative: String,
}

impl ControlRoles {
    /// Create a role assignment, trimming surrounding whitespace from each name
    pub fn new(
        positive: impl AsRef<str>,
        mix_positive: impl AsRef<str>,
        negative: impl AsRef<str>,
    ) -> Self {
        Self {
            positive: positive.as_ref().trim().to_string(),
            mix_positive: mix_positive.as_ref().trim().to_string(),
            negative: negative.as_ref().trim().to_string(),
        }
    }

    pub fn name(&self, role: ControlRole) -> &str {
        match role {
            ControlRole::Positive => &self.positive,
            ControlRole::MixPositive => &self.mix_positive,
            ControlRole::Negative => &self.negative,
        }
    }

    /// (role, name) pairs in calibration order
    pub fn iter(&self) -> impl Iterator<Item = (ControlRole, &str)> {
        ControlRole::ALL.into_iter().map(move |role| (role, self.name(role)))
    }
}
