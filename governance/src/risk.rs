//! Action risk policy: config-driven table of per-action routing ceilings.
//!
//! Unknown action types fall back to the conservative default (APPROVAL).
//! Action names are matched case-insensitively after trimming.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::types::{RiskCeiling, Route};

fn default_true() -> bool {
    true
}

fn default_ceiling() -> Route {
    Route::Approval
}

/// Rule for one action type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRule {
    /// Most permissive route this action may ever take
    pub ceiling: RiskCeiling,
    /// Whether a human approval can unlock this action for lower tiers.
    /// Without one, an APPROVAL outcome becomes BLOCKED.
    #[serde(default = "default_true")]
    pub approval_path: bool,
}

impl ActionRule {
    pub fn new(ceiling: RiskCeiling) -> Self {
        Self {
            ceiling,
            approval_path: true,
        }
    }

    pub fn without_approval_path(mut self) -> Self {
        self.approval_path = false;
        self
    }
}

/// `[risk]` section of the governance config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskPolicyConfig {
    /// Ceiling for action types with no rule
    #[serde(default = "default_ceiling")]
    pub default_ceiling: RiskCeiling,
    /// Seed the table with the built-in rules before applying `actions`
    #[serde(default = "default_true")]
    pub include_builtin: bool,
    /// Per-action overrides
    pub actions: BTreeMap<String, ActionRule>,
}

impl Default for RiskPolicyConfig {
    fn default() -> Self {
        Self {
            default_ceiling: default_ceiling(),
            include_builtin: true,
            actions: BTreeMap::new(),
        }
    }
}

/// Result of classifying an action type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskClassification {
    /// Normalized action type
    pub action_type: String,
    pub ceiling: RiskCeiling,
    pub approval_path: bool,
    /// False when the default ceiling was applied
    pub known: bool,
}

/// Static table mapping action type → minimum required routing ceiling
#[derive(Debug, Clone)]
pub struct ActionRiskPolicy {
    default_ceiling: RiskCeiling,
    rules: HashMap<String, ActionRule>,
}

impl Default for ActionRiskPolicy {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ActionRiskPolicy {
    /// Empty policy: every action gets `default_ceiling`
    pub fn new(default_ceiling: RiskCeiling) -> Self {
        Self {
            default_ceiling,
            rules: HashMap::new(),
        }
    }

    /// Built-in rules for well-known destructive and read-only actions
    pub fn builtin() -> Self {
        Self::new(default_ceiling())
            // Destructive: never direct
            .with_rule("delete_all_data", ActionRule::new(Route::Approval))
            .with_rule("drop_database", ActionRule::new(Route::Approval))
            .with_rule("bulk_delete", ActionRule::new(Route::Supervised))
            .with_rule("send_mass_email", ActionRule::new(Route::Supervised))
            .with_rule(
                "transfer_funds",
                ActionRule::new(Route::Supervised).without_approval_path(),
            )
            .with_rule(
                "purge_audit_log",
                ActionRule::new(Route::Blocked).without_approval_path(),
            )
            // Read-only: tier decides
            .with_rule("read_data", ActionRule::new(Route::Direct))
            .with_rule("search", ActionRule::new(Route::Direct))
            .with_rule("summarize", ActionRule::new(Route::Direct))
    }

    /// Build from config, layering overrides on the built-ins when requested
    pub fn from_config(config: &RiskPolicyConfig) -> Self {
        let mut policy = if config.include_builtin {
            Self::builtin()
        } else {
            Self::new(config.default_ceiling)
        };
        policy.default_ceiling = config.default_ceiling;
        for (action, rule) in &config.actions {
            policy = policy.with_rule(action, *rule);
        }
        policy
    }

    /// Add or replace a rule
    pub fn with_rule(mut self, action_type: &str, rule: ActionRule) -> Self {
        self.rules.insert(normalize(action_type), rule);
        self
    }

    pub fn default_ceiling(&self) -> RiskCeiling {
        self.default_ceiling
    }

    /// Number of explicit rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Ceiling for an action type
    pub fn classify(&self, action_type: &str) -> RiskCeiling {
        self.rule_for(action_type).ceiling
    }

    /// Full classification, including the approval path flag
    pub fn rule_for(&self, action_type: &str) -> RiskClassification {
        let key = normalize(action_type);
        match self.rules.get(&key) {
            Some(rule) => RiskClassification {
                action_type: key,
                ceiling: rule.ceiling,
                approval_path: rule.approval_path,
                known: true,
            },
            None => RiskClassification {
                action_type: key,
                ceiling: self.default_ceiling,
                approval_path: true,
                known: false,
            },
        }
    }
}

fn normalize(action_type: &str) -> String {
    action_type.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_action_defaults_to_approval() {
        let policy = ActionRiskPolicy::builtin();
        let c = policy.rule_for("reticulate_splines");
        assert_eq!(c.ceiling, Route::Approval);
        assert!(!c.known);
        assert!(c.approval_path);
    }

    #[test]
    fn test_destructive_actions_never_direct() {
        let policy = ActionRiskPolicy::builtin();
        for action in ["delete_all_data", "drop_database", "bulk_delete", "transfer_funds"] {
            assert!(policy.classify(action) < Route::Direct, "{action}");
        }
        assert_eq!(policy.classify("DELETE_ALL_DATA "), Route::Approval);
    }

    #[test]
    fn test_read_actions_are_direct() {
        let policy = ActionRiskPolicy::builtin();
        assert_eq!(policy.classify("read_data"), Route::Direct);
        assert!(policy.rule_for("search").known);
    }

    #[test]
    fn test_config_overrides_builtin() {
        let mut actions = BTreeMap::new();
        actions.insert("read_data".to_string(), ActionRule::new(Route::Supervised));
        actions.insert(
            "export_pii".to_string(),
            ActionRule::new(Route::Approval).without_approval_path(),
        );
        let config = RiskPolicyConfig {
            default_ceiling: Route::Blocked,
            include_builtin: true,
            actions,
        };

        let policy = ActionRiskPolicy::from_config(&config);
        assert_eq!(policy.classify("read_data"), Route::Supervised);
        assert_eq!(policy.classify("delete_all_data"), Route::Approval);
        assert!(!policy.rule_for("export_pii").approval_path);
        assert_eq!(policy.classify("unknown_action"), Route::Blocked);
    }

    #[test]
    fn test_config_without_builtin() {
        let config = RiskPolicyConfig {
            include_builtin: false,
            ..Default::default()
        };
        let policy = ActionRiskPolicy::from_config(&config);
        assert!(policy.is_empty());
        assert_eq!(policy.classify("read_data"), Route::Approval);
    }
}
