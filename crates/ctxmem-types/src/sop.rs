use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSopEntry {
    pub tool_name: String,
    pub action: String,
}

/// Standard Operating Procedure value type. Invariant: at least one of
/// `preferences` (non-blank) or `tool_sops` (non-empty) must be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SopData {
    #[serde(default)]
    pub use_when: String,
    #[serde(default)]
    pub preferences: String,
    #[serde(default)]
    pub tool_sops: Vec<ToolSopEntry>,
}

impl SopData {
    pub fn validate(&self) -> Result<()> {
        let has_preferences = !self.preferences.trim().is_empty();
        let has_tool_sops = !self.tool_sops.is_empty();
        if !has_preferences && !has_tool_sops {
            return Err(Error::validation(
                "SOPData must have non-blank preferences or non-empty tool_sops",
            ));
        }
        for entry in &self.tool_sops {
            if entry.tool_name.trim().is_empty() {
                return Err(Error::validation("tool_sops entry has an empty tool_name"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_fully_empty_sop() {
        let sop = SopData::default();
        assert!(sop.validate().is_err());
    }

    #[test]
    fn accepts_preferences_only() {
        let sop = SopData {
            preferences: "always confirm before deleting".to_string(),
            ..Default::default()
        };
        assert!(sop.validate().is_ok());
    }

    #[test]
    fn accepts_tool_sops_only() {
        let sop = SopData {
            tool_sops: vec![ToolSopEntry {
                tool_name: "click".to_string(),
                action: "Star".to_string(),
            }],
            ..Default::default()
        };
        assert!(sop.validate().is_ok());
    }

    #[test]
    fn rejects_blank_tool_name() {
        let sop = SopData {
            tool_sops: vec![ToolSopEntry {
                tool_name: "   ".to_string(),
                action: "Star".to_string(),
            }],
            ..Default::default()
        };
        assert!(sop.validate().is_err());
    }
}
