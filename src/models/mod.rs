pub mod grading;
pub mod loaders;
pub mod privacy;

pub use grading::{Breakdown, GradingContext, GradingRecord, ParsingMethod, TokenUsage};
pub use loaders::{load_config, load_grading_context};
pub use privacy::{
    AnonymizationMethod, PiiCategory, PiiKind, PiiSpan, PrivacyPolicy, PrivacyReport,
    RedactionRules, SafetyReport,
};
