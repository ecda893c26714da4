pub mod catalog;
pub mod config;
#[cfg(feature = "sheets")]
pub mod credentials;
pub mod error;
pub mod form;
pub mod record;
pub mod runner;
pub mod session;
pub mod sink;
pub mod validation;

// Re-export commonly used types
pub use catalog::{Endorsement, EndorsementCatalog, FormCatalog, Policy, SelectionMode};
pub use config::{AcquisitionMode, CredentialsConfig, FormConfig, SheetsWriteMode, SinkConfig};
pub use error::{ConfigError, FormError, SinkError, StorageError, SubmitError, ValidationError};
pub use form::{
    AnswerSlot, AnswerUpdate, EndorsementAnswers, EndorsementView, FormState, FormView,
    PolicyView, RequiredField,
};
pub use record::{COLUMNS, NO_EXPLANATION, Record, TIMESTAMP_FORMAT, YesNo};
pub use runner::{SubmissionReceipt, SubmissionRunner, submit_form};
pub use session::{FormSession, InMemorySessionStorage, SessionLocks, SessionStorage};
pub use sink::{CsvFileSink, MemorySink, RecordSink};
pub use validation::ValidationResult;
