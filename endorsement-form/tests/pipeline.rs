use chrono::NaiveDateTime;
use endorsement_form::{
    AnswerUpdate, COLUMNS, CsvFileSink, Endorsement, FormCatalog, FormState, MemorySink, Policy,
    RecordSink, RequiredField, SubmitError, TIMESTAMP_FORMAT, ValidationError, YesNo, submit_form,
};
use std::sync::Arc;

fn acme_form() -> FormState {
    let mut form = FormState::new(Arc::new(FormCatalog::default()));
    form.set_field(RequiredField::AccountName, "Acme");
    form.set_field(RequiredField::CompanyName, "Acme Inc");
    form.set_field(RequiredField::ProjectName, "P1");
    form.set_field(RequiredField::IcsLink, "http://x");
    form
}

fn answer(form: &mut FormState, policy: Policy, endorsement: &str, agree: Option<YesNo>) {
    form.answer(
        policy,
        &Endorsement::from(endorsement),
        AnswerUpdate {
            audit_resolution: Some(YesNo::Yes),
            agree_with_ai: agree,
            explanation: None,
        },
    )
    .unwrap();
}

#[tokio::test]
async fn two_policies_with_one_incomplete_pair_write_two_rows() {
    let mut form = acme_form();
    form.select_policies([Policy::GeneralLiability, Policy::UmbrellaLiability]);
    form.select_endorsements(Policy::GeneralLiability, ["Endorsement 1".into()])
        .unwrap();
    form.select_endorsements(
        Policy::UmbrellaLiability,
        ["Endorsement 4".into(), "Endorsement 5".into()],
    )
    .unwrap();
    answer(&mut form, Policy::GeneralLiability, "Endorsement 1", Some(YesNo::No));
    answer(&mut form, Policy::UmbrellaLiability, "Endorsement 4", Some(YesNo::Yes));
    answer(&mut form, Policy::UmbrellaLiability, "Endorsement 5", None);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("responses.csv");
    let sink = CsvFileSink::new(&path);

    let records = submit_form(&form, &sink).await.unwrap();
    assert_eq!(records.len(), 2);

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
    assert_eq!(headers, COLUMNS.to_vec());

    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(&rows[0][4], "General Liability");
    assert_eq!(&rows[0][8], "No explanation provided");
    assert_eq!(&rows[1][4], "Umbrella Liability");
    assert_eq!(&rows[1][5], "Endorsement 4");
    for row in &rows {
        assert!(NaiveDateTime::parse_from_str(&row[9], TIMESTAMP_FORMAT).is_ok());
    }
}

#[tokio::test]
async fn appending_n_records_to_an_empty_file_yields_header_plus_n_rows() {
    let mut form = acme_form();
    form.select_policies([Policy::WorkersCompensation]);
    let chosen: Vec<Endorsement> = (1..=5)
        .map(|i| Endorsement::new(format!("Endorsement {i}")))
        .collect();
    form.select_endorsements(Policy::WorkersCompensation, chosen.clone())
        .unwrap();
    for endorsement in &chosen {
        answer(
            &mut form,
            Policy::WorkersCompensation,
            endorsement.as_str(),
            Some(YesNo::Yes),
        );
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("responses.csv");
    CsvFileSink::new(&path)
        .append(&form.expand())
        .await
        .unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0], COLUMNS.join(","));
    assert_eq!(lines.iter().filter(|l| l.starts_with("account_name")).count(), 1);
}

#[tokio::test]
async fn all_blank_fields_fail_before_any_sink_call() {
    let mut form = FormState::new(Arc::new(FormCatalog::default()));
    form.select_policies([Policy::GeneralLiability]);
    form.select_endorsements(Policy::GeneralLiability, ["Endorsement 1".into()])
        .unwrap();
    answer(&mut form, Policy::GeneralLiability, "Endorsement 1", Some(YesNo::Yes));

    let sink = MemorySink::new();
    let err = submit_form(&form, &sink).await.unwrap_err();

    match err {
        SubmitError::Validation(ValidationError::MissingRequiredField { fields }) => {
            assert_eq!(fields, RequiredField::ALL.to_vec());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(sink.calls(), 0);
}

#[tokio::test]
async fn nothing_answered_is_no_complete_responses() {
    let mut form = acme_form();
    form.select_policies([Policy::AutomobileLiability]);

    let sink = MemorySink::new();
    let err = submit_form(&form, &sink).await.unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Validation(ValidationError::NoCompleteResponses)
    ));
    assert_eq!(sink.calls(), 0);
}
