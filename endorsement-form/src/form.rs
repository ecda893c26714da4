use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::catalog::{Endorsement, FormCatalog, Policy, SelectionMode};
use crate::error::FormError;
use crate::record::YesNo;

/// The four free-text fields every submission must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredField {
    AccountName,
    CompanyName,
    ProjectName,
    IcsLink,
}

impl RequiredField {
    pub const ALL: [RequiredField; 4] = [
        RequiredField::AccountName,
        RequiredField::CompanyName,
        RequiredField::ProjectName,
        RequiredField::IcsLink,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            RequiredField::AccountName => "Account Name",
            RequiredField::CompanyName => "Company Name",
            RequiredField::ProjectName => "Project Name",
            RequiredField::IcsLink => "ICS Link",
        }
    }
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Answers to the per-endorsement questions. `None` means unanswered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndorsementAnswers {
    pub audit_resolution: Option<YesNo>,
    pub agree_with_ai: Option<YesNo>,
    #[serde(default)]
    pub explanation: String,
}

impl EndorsementAnswers {
    pub fn is_complete(&self, explanation_required: bool) -> bool {
        self.audit_resolution.is_some()
            && self.agree_with_ai.is_some()
            && (!explanation_required || !self.explanation.trim().is_empty())
    }
}

/// A partial answer edit; absent values leave the stored answer untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerUpdate {
    #[serde(default)]
    pub audit_resolution: Option<YesNo>,
    #[serde(default)]
    pub agree_with_ai: Option<YesNo>,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSlot {
    AuditResolution,
    AgreeWithAi,
    Explanation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PolicySelection {
    pub(crate) policy: Policy,
    pub(crate) endorsements: Vec<Endorsement>,
}

/// Selection state of one form session.
///
/// Policies and endorsements keep the order in which they were selected.
/// Answers are keyed by (policy, endorsement) and outlive deselection, so
/// reselecting a pair brings its earlier answers back.
#[derive(Debug, Clone)]
pub struct FormState {
    catalog: Arc<FormCatalog>,
    pub(crate) account_name: String,
    pub(crate) company_name: String,
    pub(crate) project_name: String,
    pub(crate) ics_link: String,
    pub(crate) selections: Vec<PolicySelection>,
    pub(crate) answers: HashMap<(Policy, Endorsement), EndorsementAnswers>,
}

impl FormState {
    pub fn new(catalog: Arc<FormCatalog>) -> Self {
        Self {
            catalog,
            account_name: String::new(),
            company_name: String::new(),
            project_name: String::new(),
            ics_link: String::new(),
            selections: Vec::new(),
            answers: HashMap::new(),
        }
    }

    pub fn catalog(&self) -> &FormCatalog {
        &self.catalog
    }

    pub fn field(&self, field: RequiredField) -> &str {
        match field {
            RequiredField::AccountName => &self.account_name,
            RequiredField::CompanyName => &self.company_name,
            RequiredField::ProjectName => &self.project_name,
            RequiredField::IcsLink => &self.ics_link,
        }
    }

    pub fn set_field(&mut self, field: RequiredField, value: impl Into<String>) {
        let slot = match field {
            RequiredField::AccountName => &mut self.account_name,
            RequiredField::CompanyName => &mut self.company_name,
            RequiredField::ProjectName => &mut self.project_name,
            RequiredField::IcsLink => &mut self.ics_link,
        };
        *slot = value.into();
    }

    pub fn selected_policies(&self) -> impl Iterator<Item = Policy> + '_ {
        self.selections.iter().map(|s| s.policy)
    }

    pub fn selected_endorsements(&self, policy: Policy) -> &[Endorsement] {
        self.selection(policy)
            .map(|s| s.endorsements.as_slice())
            .unwrap_or_default()
    }

    pub fn answers(&self, policy: Policy, endorsement: &Endorsement) -> Option<&EndorsementAnswers> {
        self.answers.get(&(policy, endorsement.clone()))
    }

    /// Replace the policy selection. Duplicates collapse onto their first
    /// occurrence; policies that stay selected keep their endorsements.
    pub fn select_policies(&mut self, policies: impl IntoIterator<Item = Policy>) {
        let mut previous = std::mem::take(&mut self.selections);
        for policy in policies {
            if self.selection(policy).is_some() {
                continue;
            }
            let endorsements = previous
                .iter_mut()
                .find(|s| s.policy == policy)
                .map(|s| std::mem::take(&mut s.endorsements))
                .unwrap_or_default();
            self.selections.push(PolicySelection {
                policy,
                endorsements,
            });
        }
    }

    pub fn select_endorsements(
        &mut self,
        policy: Policy,
        endorsements: impl IntoIterator<Item = Endorsement>,
    ) -> Result<(), FormError> {
        let mut chosen: Vec<Endorsement> = Vec::new();
        for endorsement in endorsements {
            if !self.catalog.endorsements.contains(policy, &endorsement) {
                return Err(FormError::UnknownEndorsement {
                    policy,
                    endorsement,
                });
            }
            if !chosen.contains(&endorsement) {
                chosen.push(endorsement);
            }
        }

        if self.catalog.endorsement_selection_mode == SelectionMode::Single && chosen.len() > 1 {
            return Err(FormError::TooManyEndorsements {
                policy,
                selected: chosen.len(),
            });
        }

        let selection = self
            .selections
            .iter_mut()
            .find(|s| s.policy == policy)
            .ok_or(FormError::PolicyNotSelected(policy))?;
        selection.endorsements = chosen;
        Ok(())
    }

    pub fn answer(
        &mut self,
        policy: Policy,
        endorsement: &Endorsement,
        update: AnswerUpdate,
    ) -> Result<(), FormError> {
        self.ensure_selected(policy, endorsement)?;
        if let Some(explanation) = &update.explanation {
            if !self.catalog.accepts_explanation(explanation) {
                return Err(FormError::UnknownExplanation(explanation.clone()));
            }
        }

        let answers = self
            .answers
            .entry((policy, endorsement.clone()))
            .or_default();
        if let Some(value) = update.audit_resolution {
            answers.audit_resolution = Some(value);
        }
        if let Some(value) = update.agree_with_ai {
            answers.agree_with_ai = Some(value);
        }
        if let Some(explanation) = update.explanation {
            answers.explanation = explanation;
        }
        Ok(())
    }

    pub fn clear_answer(
        &mut self,
        policy: Policy,
        endorsement: &Endorsement,
        slot: AnswerSlot,
    ) -> Result<(), FormError> {
        self.ensure_selected(policy, endorsement)?;
        if let Some(answers) = self.answers.get_mut(&(policy, endorsement.clone())) {
            match slot {
                AnswerSlot::AuditResolution => answers.audit_resolution = None,
                AnswerSlot::AgreeWithAi => answers.agree_with_ai = None,
                AnswerSlot::Explanation => answers.explanation.clear(),
            }
        }
        Ok(())
    }

    pub fn view(&self) -> FormView {
        FormView {
            account_name: self.account_name.clone(),
            company_name: self.company_name.clone(),
            project_name: self.project_name.clone(),
            ics_link: self.ics_link.clone(),
            policies: self
                .selections
                .iter()
                .map(|s| PolicyView {
                    policy: s.policy,
                    endorsements: s
                        .endorsements
                        .iter()
                        .map(|e| EndorsementView {
                            endorsement: e.clone(),
                            answers: self.answers(s.policy, e).cloned().unwrap_or_default(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    fn selection(&self, policy: Policy) -> Option<&PolicySelection> {
        self.selections.iter().find(|s| s.policy == policy)
    }

    fn ensure_selected(&self, policy: Policy, endorsement: &Endorsement) -> Result<(), FormError> {
        let selection = self
            .selection(policy)
            .ok_or(FormError::PolicyNotSelected(policy))?;
        if selection.endorsements.contains(endorsement) {
            Ok(())
        } else {
            Err(FormError::EndorsementNotSelected {
                policy,
                endorsement: endorsement.clone(),
            })
        }
    }
}

/// Serializable snapshot of a [`FormState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormView {
    pub account_name: String,
    pub company_name: String,
    pub project_name: String,
    pub ics_link: String,
    pub policies: Vec<PolicyView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyView {
    pub policy: Policy,
    pub endorsements: Vec<EndorsementView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndorsementView {
    pub endorsement: Endorsement,
    pub answers: EndorsementAnswers,
}
