//! Column role resolution
//!
//! Maps each canonical role to a physical column by substring matching the
//! fragments from the rule table, and derives the list of columns to fetch.

use std::collections::BTreeMap;

use crate::schema::{Role, SchemaRules};

/// Chosen column for each resolved role
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnRoleMap {
    roles: BTreeMap<Role, String>,
}

impl ColumnRoleMap {
    /// Column resolved for `role`.
    #[must_use]
    pub fn get(&self, role: Role) -> Option<&str> {
        self.roles.get(&role).map(String::as_str)
    }

    /// Record roles served by `column`, in role order.
    pub fn record_roles_for<'a>(&'a self, column: &'a str) -> impl Iterator<Item = Role> + 'a {
        self.roles
            .iter()
            .filter(move |(role, resolved)| role.is_record_role() && resolved.as_str() == column)
            .map(|(role, _)| *role)
    }

    /// Whether `column` feeds a dedicated record field.
    #[must_use]
    pub fn claims(&self, column: &str) -> bool {
        self.record_roles_for(column).next().is_some()
    }

    /// Resolved roles in role order.
    pub fn iter(&self) -> impl Iterator<Item = (Role, &str)> {
        self.roles.iter().map(|(role, column)| (*role, column.as_str()))
    }

    /// Number of resolved roles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// True when no role was resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// First column containing any of `fragments`, trying fragments in order.
#[must_use]
pub fn find_column<'a>(columns: &'a [String], fragments: &[String]) -> Option<&'a str> {
    fragments.iter().find_map(|fragment| {
        let fragment = fragment.to_lowercase();
        columns
            .iter()
            .find(|column| column.to_lowercase().contains(&fragment))
            .map(String::as_str)
    })
}

/// Resolve every role in the rule table against `columns`.
#[must_use]
pub fn resolve(columns: &[String], rules: &SchemaRules) -> ColumnRoleMap {
    let roles = rules
        .roles
        .iter()
        .filter_map(|rule| find_column(columns, &rule.fragments).map(|column| (rule.role, column.to_string())))
        .collect();
    ColumnRoleMap { roles }
}

/// Columns to fetch for one table and the roles they serve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectPlan {
    /// Columns in fetch order
    pub columns: Vec<String>,
    /// Role assignments
    pub roles: ColumnRoleMap,
}

impl SelectPlan {
    /// Build the fetch list: record role columns first, then every other
    /// non-synthetic column.
    #[must_use]
    pub fn new(columns: &[String], rules: &SchemaRules) -> Self {
        let roles = resolve(columns, rules);
        let mut selected: Vec<String> = Vec::with_capacity(columns.len());

        for role in Role::RECORD_ROLES {
            if let Some(column) = roles.get(role) {
                if !selected.iter().any(|c| c == column) {
                    selected.push(column.to_string());
                }
            }
        }

        for column in columns {
            if !rules.is_ignored(column) && !selected.contains(column) {
                selected.push(column.clone());
            }
        }

        Self {
            columns: selected,
            roles,
        }
    }

    /// True when there is nothing to fetch.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
