pub mod anonymizer;
pub mod pii_detector;
pub mod privacy_report;
pub mod response_normalizer;

pub use anonymizer::anonymize;
pub use pii_detector::detect;
pub use privacy_report::{privacy_report, validate_api_safety};
pub use response_normalizer::{normalize, ParsedReply};
