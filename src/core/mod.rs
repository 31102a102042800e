mod kind;
mod outcome;
mod summary;
mod verdict;

pub use kind::FailureKind;
pub use outcome::{
    CHECK_BUILD, CHECK_REFERENCE, CHECK_SETUP, CHECK_STAGING, CHECK_TEMPLATE, CheckOutcome,
};
pub use summary::{DISCOVERY_ERROR_KEY, ValidationSummary};
pub use verdict::TemplateVerdict;
