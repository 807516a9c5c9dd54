pub mod bypass;
pub mod document_locator;
pub mod form_filler;
pub mod selector_resolver;
pub mod server_time;
pub mod submission_trigger;

pub use bypass::{BypassReport, BypassRules, BypassStrategy};
pub use document_locator::DocumentLocator;
pub use form_filler::FormFiller;
pub use selector_resolver::SelectorResolver;
pub use server_time::{fetch_server_clock, ServerClock};
pub use submission_trigger::SubmissionTrigger;
