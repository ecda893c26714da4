//! Expansion of form state into output records, and the submit-time checks
//! that guard it.

use crate::error::ValidationError;
use crate::form::{FormState, RequiredField};
use crate::record::{NO_EXPLANATION, Record};

pub type ValidationResult = Result<Vec<Record>, ValidationError>;

impl FormState {
    /// Expand the selection state into one record per fully answered
    /// (policy, endorsement) pair, in selection order.
    ///
    /// Incomplete pairs are skipped without error so they never block the
    /// complete ones. Pure: no sink is touched and no timestamp is assigned.
    pub fn expand(&self) -> Vec<Record> {
        let explanation_required = self.catalog().explanation_required;
        let mut records = Vec::new();

        for selection in &self.selections {
            for endorsement in &selection.endorsements {
                let Some(answers) = self.answers(selection.policy, endorsement) else {
                    continue;
                };
                if !answers.is_complete(explanation_required) {
                    continue;
                }
                let (Some(audit_resolution), Some(agree_with_ai)) =
                    (answers.audit_resolution, answers.agree_with_ai)
                else {
                    continue;
                };

                let explanation = if answers.explanation.trim().is_empty() {
                    NO_EXPLANATION.to_string()
                } else {
                    answers.explanation.clone()
                };

                records.push(Record {
                    account_name: self.account_name.clone(),
                    company_name: self.company_name.clone(),
                    project_name: self.project_name.clone(),
                    ics_link: self.ics_link.clone(),
                    policy: selection.policy,
                    endorsement: endorsement.clone(),
                    audit_resolution,
                    agree_with_ai,
                    explanation,
                    timestamp: None,
                });
            }
        }

        records
    }

    /// Blank required fields first, then completeness. On success carries the
    /// expanded records.
    pub fn validate(&self) -> ValidationResult {
        let missing: Vec<RequiredField> = RequiredField::ALL
            .into_iter()
            .filter(|f| self.field(*f).trim().is_empty())
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingRequiredField { fields: missing });
        }

        let records = self.expand();
        if records.is_empty() {
            return Err(ValidationError::NoCompleteResponses);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Endorsement, FormCatalog, Policy};
    use crate::form::AnswerUpdate;
    use crate::record::YesNo;
    use std::sync::Arc;

    fn filled(catalog: FormCatalog) -> FormState {
        let mut form = FormState::new(Arc::new(catalog));
        form.set_field(RequiredField::AccountName, "Acme");
        form.set_field(RequiredField::CompanyName, "Acme Inc");
        form.set_field(RequiredField::ProjectName, "P1");
        form.set_field(RequiredField::IcsLink, "http://x");
        form
    }

    fn answer(
        form: &mut FormState,
        policy: Policy,
        endorsement: &str,
        audit: Option<YesNo>,
        agree: Option<YesNo>,
        explanation: &str,
    ) {
        form.answer(
            policy,
            &Endorsement::from(endorsement),
            AnswerUpdate {
                audit_resolution: audit,
                agree_with_ai: agree,
                explanation: Some(explanation.to_string()),
            },
        )
        .unwrap();
    }

    #[test]
    fn empty_explanation_becomes_sentinel() {
        let mut form = filled(FormCatalog::default());
        form.select_policies([Policy::GeneralLiability]);
        form.select_endorsements(Policy::GeneralLiability, ["Endorsement 1".into()])
            .unwrap();
        answer(
            &mut form,
            Policy::GeneralLiability,
            "Endorsement 1",
            Some(YesNo::Yes),
            Some(YesNo::No),
            "",
        );

        let records = form.expand();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.account_name, "Acme");
        assert_eq!(record.company_name, "Acme Inc");
        assert_eq!(record.project_name, "P1");
        assert_eq!(record.ics_link, "http://x");
        assert_eq!(record.policy, Policy::GeneralLiability);
        assert_eq!(record.endorsement.as_str(), "Endorsement 1");
        assert_eq!(record.audit_resolution, YesNo::Yes);
        assert_eq!(record.agree_with_ai, YesNo::No);
        assert_eq!(record.explanation, NO_EXPLANATION);
        assert_eq!(record.timestamp, None);
    }

    #[test]
    fn incomplete_pairs_are_skipped() {
        let mut form = filled(FormCatalog::default());
        form.select_policies([Policy::GeneralLiability, Policy::AutomobileLiability]);
        form.select_endorsements(Policy::GeneralLiability, ["Endorsement 1".into()])
            .unwrap();
        form.select_endorsements(
            Policy::AutomobileLiability,
            ["Endorsement 2".into(), "Endorsement 3".into()],
        )
        .unwrap();
        answer(&mut form, Policy::GeneralLiability, "Endorsement 1", Some(YesNo::Yes), Some(YesNo::Yes), "ok");
        answer(&mut form, Policy::AutomobileLiability, "Endorsement 2", Some(YesNo::No), Some(YesNo::Yes), "");
        answer(&mut form, Policy::AutomobileLiability, "Endorsement 3", Some(YesNo::No), None, "");

        let records = form.expand();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].policy, Policy::GeneralLiability);
        assert_eq!(records[1].policy, Policy::AutomobileLiability);
        assert_eq!(records[1].endorsement.as_str(), "Endorsement 2");
    }

    #[test]
    fn output_follows_selection_order() {
        let mut form = filled(FormCatalog::default());
        form.select_policies([Policy::WorkersCompensation, Policy::GeneralLiability]);
        form.select_endorsements(
            Policy::WorkersCompensation,
            ["Endorsement 9".into(), "Endorsement 2".into()],
        )
        .unwrap();
        form.select_endorsements(Policy::GeneralLiability, ["Endorsement 1".into()])
            .unwrap();
        for (policy, endorsement) in [
            (Policy::GeneralLiability, "Endorsement 1"),
            (Policy::WorkersCompensation, "Endorsement 2"),
            (Policy::WorkersCompensation, "Endorsement 9"),
        ] {
            answer(&mut form, policy, endorsement, Some(YesNo::Yes), Some(YesNo::Yes), "");
        }

        let order: Vec<_> = form
            .expand()
            .into_iter()
            .map(|r| (r.policy, r.endorsement.to_string()))
            .collect();
        assert_eq!(
            order,
            vec![
                (Policy::WorkersCompensation, "Endorsement 9".to_string()),
                (Policy::WorkersCompensation, "Endorsement 2".to_string()),
                (Policy::GeneralLiability, "Endorsement 1".to_string()),
            ]
        );
    }

    #[test]
    fn expand_is_deterministic() {
        let mut form = filled(FormCatalog::default());
        form.select_policies([Policy::UmbrellaLiability]);
        form.select_endorsements(
            Policy::UmbrellaLiability,
            ["Endorsement 3".into(), "Endorsement 4".into()],
        )
        .unwrap();
        answer(&mut form, Policy::UmbrellaLiability, "Endorsement 3", Some(YesNo::Yes), Some(YesNo::No), "x");
        answer(&mut form, Policy::UmbrellaLiability, "Endorsement 4", Some(YesNo::No), Some(YesNo::No), "");

        assert_eq!(form.expand(), form.expand());
    }

    #[test]
    fn deselected_pairs_do_not_expand() {
        let mut form = filled(FormCatalog::default());
        form.select_policies([Policy::GeneralLiability]);
        form.select_endorsements(Policy::GeneralLiability, ["Endorsement 1".into()])
            .unwrap();
        answer(&mut form, Policy::GeneralLiability, "Endorsement 1", Some(YesNo::Yes), Some(YesNo::Yes), "");

        form.select_policies(std::iter::empty());
        assert!(form.expand().is_empty());
    }

    #[test]
    fn required_explanation_makes_blank_pairs_incomplete() {
        let catalog = FormCatalog {
            explanation_required: true,
            ..FormCatalog::default()
        };
        let mut form = filled(catalog);
        form.select_policies([Policy::GeneralLiability]);
        form.select_endorsements(
            Policy::GeneralLiability,
            ["Endorsement 1".into(), "Endorsement 2".into()],
        )
        .unwrap();
        answer(&mut form, Policy::GeneralLiability, "Endorsement 1", Some(YesNo::Yes), Some(YesNo::Yes), "");
        answer(&mut form, Policy::GeneralLiability, "Endorsement 2", Some(YesNo::Yes), Some(YesNo::Yes), "Matches schedule");

        let records = form.expand();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].explanation, "Matches schedule");
    }

    #[test]
    fn blank_fields_fail_before_completeness() {
        let mut form = filled(FormCatalog::default());
        form.set_field(RequiredField::ProjectName, "   ");
        form.set_field(RequiredField::IcsLink, "");

        assert_eq!(
            form.validate(),
            Err(ValidationError::MissingRequiredField {
                fields: vec![RequiredField::ProjectName, RequiredField::IcsLink]
            })
        );
    }

    #[test]
    fn blank_field_wins_even_with_complete_answers() {
        let mut form = filled(FormCatalog::default());
        form.select_policies([Policy::GeneralLiability]);
        form.select_endorsements(Policy::GeneralLiability, ["Endorsement 1".into()])
            .unwrap();
        answer(&mut form, Policy::GeneralLiability, "Endorsement 1", Some(YesNo::Yes), Some(YesNo::Yes), "");
        form.set_field(RequiredField::AccountName, "");

        assert!(matches!(
            form.validate(),
            Err(ValidationError::MissingRequiredField { .. })
        ));
    }

    #[test]
    fn filled_fields_without_answers_have_no_complete_responses() {
        let mut form = filled(FormCatalog::default());
        assert_eq!(form.validate(), Err(ValidationError::NoCompleteResponses));

        form.select_policies([Policy::GeneralLiability]);
        form.select_endorsements(Policy::GeneralLiability, ["Endorsement 1".into()])
            .unwrap();
        answer(&mut form, Policy::GeneralLiability, "Endorsement 1", Some(YesNo::Yes), None, "");
        assert_eq!(form.validate(), Err(ValidationError::NoCompleteResponses));
    }

    #[test]
    fn validate_carries_expanded_records() {
        let mut form = filled(FormCatalog::default());
        form.select_policies([Policy::GeneralLiability]);
        form.select_endorsements(Policy::GeneralLiability, ["Endorsement 1".into()])
            .unwrap();
        answer(&mut form, Policy::GeneralLiability, "Endorsement 1", Some(YesNo::No), Some(YesNo::No), "");

        assert_eq!(form.validate().unwrap(), form.expand());
    }
}
