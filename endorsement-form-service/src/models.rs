use endorsement_form::{
    AnswerSlot, AnswerUpdate, Endorsement, FormView, Policy, Record, SelectionMode,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateFormResponse {
    pub session_id: String,
}

/// Absent fields are left unchanged.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FieldsRequest {
    pub account_name: Option<String>,
    pub company_name: Option<String>,
    pub project_name: Option<String>,
    pub ics_link: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PoliciesRequest {
    pub policies: Vec<Policy>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EndorsementsRequest {
    pub policy: Policy,
    pub endorsements: Vec<Endorsement>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub policy: Policy,
    pub endorsement: Endorsement,
    #[serde(flatten)]
    pub update: AnswerUpdate,
    /// Answers to unset before `update` is applied.
    #[serde(default)]
    pub clear: Vec<AnswerSlot>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FormResponse {
    pub session_id: String,
    pub submitted: bool,
    pub status_message: Option<String>,
    pub form: FormView,
    /// Records a submit would write right now.
    pub preview: Vec<Record>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PolicyCatalog {
    pub policy: Policy,
    pub endorsements: Vec<Endorsement>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CatalogResponse {
    pub policies: Vec<PolicyCatalog>,
    pub explanation_options: Vec<String>,
    pub explanation_required: bool,
    pub endorsement_selection_mode: SelectionMode,
}
