use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::error::ConfigError;

/// Insurance policies that can require endorsement review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Policy {
    #[serde(rename = "General Liability")]
    GeneralLiability,
    #[serde(rename = "Automobile Liability")]
    AutomobileLiability,
    #[serde(rename = "Umbrella Liability")]
    UmbrellaLiability,
    #[serde(rename = "Worker's Compensation")]
    WorkersCompensation,
}

impl Policy {
    pub const ALL: [Policy; 4] = [
        Policy::GeneralLiability,
        Policy::AutomobileLiability,
        Policy::UmbrellaLiability,
        Policy::WorkersCompensation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::GeneralLiability => "General Liability",
            Policy::AutomobileLiability => "Automobile Liability",
            Policy::UmbrellaLiability => "Umbrella Liability",
            Policy::WorkersCompensation => "Worker's Compensation",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An endorsement name. Only meaningful together with the policy it was selected under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endorsement(String);

impl Endorsement {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Endorsement {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Endorsement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the endorsement choices for each policy come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndorsementCatalog {
    /// `Endorsement 1` .. `Endorsement N`, identical for every policy.
    Generic { count: usize },
    /// Explicit names per policy. Policies without an entry offer nothing.
    Named { policies: BTreeMap<Policy, Vec<String>> },
}

impl Default for EndorsementCatalog {
    fn default() -> Self {
        EndorsementCatalog::Generic { count: 13 }
    }
}

impl EndorsementCatalog {
    pub fn endorsements_for(&self, policy: Policy) -> Vec<Endorsement> {
        match self {
            EndorsementCatalog::Generic { count } => (1..=*count)
                .map(|i| Endorsement::new(format!("Endorsement {i}")))
                .collect(),
            EndorsementCatalog::Named { policies } => policies
                .get(&policy)
                .map(|names| names.iter().map(|n| Endorsement::new(n.as_str())).collect())
                .unwrap_or_default(),
        }
    }

    pub fn contains(&self, policy: Policy, endorsement: &Endorsement) -> bool {
        match self {
            EndorsementCatalog::Generic { count } => endorsement
                .as_str()
                .strip_prefix("Endorsement ")
                .and_then(|n| n.parse::<usize>().ok())
                .is_some_and(|n| n >= 1 && n <= *count && endorsement.as_str() == format!("Endorsement {n}")),
            EndorsementCatalog::Named { policies } => policies
                .get(&policy)
                .is_some_and(|names| names.iter().any(|n| n == endorsement.as_str())),
        }
    }
}

/// How many endorsements may be picked per policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    #[default]
    Multi,
    Single,
}

/// Injected form configuration: catalogs plus the two behavior flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormCatalog {
    /// When set, a pair without an explanation is incomplete and never expands.
    #[serde(default)]
    pub explanation_required: bool,
    #[serde(default)]
    pub endorsement_selection_mode: SelectionMode,
    #[serde(default)]
    pub endorsements: EndorsementCatalog,
    /// Empty means free text.
    #[serde(default)]
    pub explanation_options: Vec<String>,
}

impl FormCatalog {
    pub fn accepts_explanation(&self, explanation: &str) -> bool {
        explanation.is_empty()
            || self.explanation_options.is_empty()
            || self.explanation_options.iter().any(|o| o == explanation)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.endorsements {
            EndorsementCatalog::Generic { count } if *count == 0 => {
                return Err(ConfigError::Invalid(
                    "generic endorsement count must be at least 1".to_string(),
                ));
            }
            EndorsementCatalog::Named { policies } => {
                for (policy, names) in policies {
                    if names.is_empty() {
                        return Err(ConfigError::Invalid(format!(
                            "no endorsements listed for {policy}"
                        )));
                    }
                    let mut seen = HashSet::new();
                    for name in names {
                        if name.trim().is_empty() {
                            return Err(ConfigError::Invalid(format!(
                                "blank endorsement name under {policy}"
                            )));
                        }
                        if !seen.insert(name.as_str()) {
                            return Err(ConfigError::Invalid(format!(
                                "duplicate endorsement {name:?} under {policy}"
                            )));
                        }
                    }
                }
            }
            _ => {}
        }

        let mut seen = HashSet::new();
        for option in &self.explanation_options {
            if !seen.insert(option.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate explanation option {option:?}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_catalog_matches_numbered_names_only() {
        let catalog = EndorsementCatalog::Generic { count: 13 };
        let offered = catalog.endorsements_for(Policy::UmbrellaLiability);
        assert_eq!(offered.len(), 13);
        assert_eq!(offered[0].as_str(), "Endorsement 1");
        assert_eq!(offered[12].as_str(), "Endorsement 13");

        assert!(catalog.contains(Policy::GeneralLiability, &"Endorsement 7".into()));
        assert!(!catalog.contains(Policy::GeneralLiability, &"Endorsement 14".into()));
        assert!(!catalog.contains(Policy::GeneralLiability, &"Endorsement 0".into()));
        assert!(!catalog.contains(Policy::GeneralLiability, &"Endorsement 07".into()));
    }

    #[test]
    fn named_catalog_is_scoped_per_policy() {
        let mut policies = BTreeMap::new();
        policies.insert(
            Policy::GeneralLiability,
            vec!["Additional Insured".to_string(), "Waiver of Subrogation".to_string()],
        );
        let catalog = EndorsementCatalog::Named { policies };

        assert!(catalog.contains(Policy::GeneralLiability, &"Waiver of Subrogation".into()));
        assert!(!catalog.contains(Policy::AutomobileLiability, &"Waiver of Subrogation".into()));
        assert!(catalog.endorsements_for(Policy::WorkersCompensation).is_empty());
    }

    #[test]
    fn policy_serializes_by_display_name() {
        let json = serde_json::to_string(&Policy::WorkersCompensation).unwrap();
        assert_eq!(json, "\"Worker's Compensation\"");
        let back: Policy = serde_json::from_str("\"Automobile Liability\"").unwrap();
        assert_eq!(back, Policy::AutomobileLiability);
    }

    #[test]
    fn catalog_loads_from_yaml() {
        let yaml = r#"
explanation_required: true
endorsement_selection_mode: single
endorsements:
  kind: named
  policies:
    "General Liability": ["Primary and Non-Contributory"]
explanation_options: ["Option 1", "Option 2"]
"#;
        let catalog: FormCatalog = serde_yaml::from_str(yaml).unwrap();
        assert!(catalog.explanation_required);
        assert_eq!(catalog.endorsement_selection_mode, SelectionMode::Single);
        assert!(catalog.accepts_explanation("Option 2"));
        assert!(!catalog.accepts_explanation("Option 3"));
        assert!(catalog.validate().is_ok());
    }

    #[test]
    fn validate_rejects_degenerate_catalogs() {
        let zero = FormCatalog {
            endorsements: EndorsementCatalog::Generic { count: 0 },
            ..FormCatalog::default()
        };
        assert!(zero.validate().is_err());

        let duplicated = FormCatalog {
            explanation_options: vec!["Option 1".to_string(), "Option 1".to_string()],
            ..FormCatalog::default()
        };
        assert!(duplicated.validate().is_err());
    }

    #[test]
    fn validate_rejects_repeated_endorsement_within_a_policy() {
        let mut policies = BTreeMap::new();
        policies.insert(
            Policy::UmbrellaLiability,
            vec!["Follow Form".to_string(), "Follow Form".to_string()],
        );
        let catalog = FormCatalog {
            endorsements: EndorsementCatalog::Named { policies },
            ..FormCatalog::default()
        };
        let err = catalog.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate endorsement"));

        let mut policies = BTreeMap::new();
        policies.insert(Policy::GeneralLiability, vec!["Follow Form".to_string()]);
        policies.insert(Policy::UmbrellaLiability, vec!["Follow Form".to_string()]);
        let shared = FormCatalog {
            endorsements: EndorsementCatalog::Named { policies },
            ..FormCatalog::default()
        };
        assert!(shared.validate().is_ok());
    }
}
