//! Schema rule table
//!
//! The heuristics that recognise chat tables and their columns live in a YAML
//! rule table rather than in code. A built-in copy is compiled into the
//! binary; a replacement can be loaded from disk.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, Result};

/// Rule table shipped with the crate.
pub const BUILTIN_RULES: &str = include_str!("../rules/schema_rules.yaml");

/// Canonical semantic role a column can play
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Who sent the message
    Sender,
    /// When the message was created
    Time,
    /// Message body
    Content,
    /// Message identifier
    Msgid,
    /// Message type code
    Type,
    /// Delivery status
    Status,
    /// Message source metadata
    Source,
}

impl Role {
    /// Roles that populate a dedicated record field.
    pub const RECORD_ROLES: [Self; 5] = [Self::Sender, Self::Time, Self::Content, Self::Msgid, Self::Type];

    /// Whether the role maps to a dedicated record field.
    #[must_use]
    pub fn is_record_role(self) -> bool {
        Self::RECORD_ROLES.contains(&self)
    }

    /// Lowercase role name as used in the rule table.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sender => "sender",
            Self::Time => "time",
            Self::Content => "content",
            Self::Msgid => "msgid",
            Self::Type => "type",
            Self::Status => "status",
            Self::Source => "source",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered name fragments for one role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRule {
    /// Role being resolved
    pub role: Role,
    /// Fragments in priority order
    pub fragments: Vec<String>,
}

/// Column signals that qualify a non-empty table as a chat table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSignals {
    /// Fragments of message identifier columns
    pub message_id: Vec<String>,
    /// Fragments of time columns
    pub time: Vec<String>,
    /// Fragments of content columns
    pub content: Vec<String>,
}

/// Complete rule table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRules {
    /// Role candidates in resolution order
    pub roles: Vec<RoleRule>,
    /// Structural validation signals
    pub signals: ValidationSignals,
    /// Synthetic row identifier columns
    #[serde(default)]
    pub ignored_columns: Vec<String>,
}

impl SchemaRules {
    /// Rules compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_RULES)
    }

    /// Load rules from a YAML file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ExtractError::Rules(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml(&text)
    }

    /// Parse, lowercase and check a YAML rule table.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let mut rules: Self = serde_yaml::from_str(text)?;
        rules.normalize();
        rules.check()?;
        Ok(rules)
    }

    /// Fragments configured for `role`, empty when the role has no rule.
    #[must_use]
    pub fn fragments(&self, role: Role) -> &[String] {
        self.roles
            .iter()
            .find(|rule| rule.role == role)
            .map(|rule| rule.fragments.as_slice())
            .unwrap_or_default()
    }

    /// Whether `column` is a synthetic row identifier.
    #[must_use]
    pub fn is_ignored(&self, column: &str) -> bool {
        self.ignored_columns.iter().any(|ignored| ignored.eq_ignore_ascii_case(column))
    }

    fn normalize(&mut self) {
        let lower = |items: &mut Vec<String>| {
            for item in items.iter_mut() {
                *item = item.trim().to_lowercase();
            }
        };
        for rule in &mut self.roles {
            lower(&mut rule.fragments);
        }
        lower(&mut self.signals.message_id);
        lower(&mut self.signals.time);
        lower(&mut self.signals.content);
        lower(&mut self.ignored_columns);
    }

    fn check(&self) -> Result<()> {
        for (index, rule) in self.roles.iter().enumerate() {
            if self.roles[..index].iter().any(|earlier| earlier.role == rule.role) {
                return Err(ExtractError::Rules(format!("role '{}' is listed more than once", rule.role)));
            }
            if rule.fragments.is_empty() || rule.fragments.iter().any(String::is_empty) {
                return Err(ExtractError::Rules(format!("role '{}' needs non-empty fragments", rule.role)));
            }
        }

        let signals = [&self.signals.message_id, &self.signals.time, &self.signals.content];
        if signals.iter().all(|list| list.is_empty()) {
            return Err(ExtractError::Rules("at least one validation signal is required".to_string()));
        }
        if signals.iter().any(|list| list.iter().any(String::is_empty)) {
            return Err(ExtractError::Rules("validation signals must not be empty strings".to_string()));
        }

        Ok(())
    }
}
