pub mod credential;
pub mod loaders;
pub mod macro_config;
pub mod schedule;
pub mod target;

pub use credential::Credential;
pub use loaders::load_subjects_file;
pub use macro_config::{CourseQuery, MacroConfig};
pub use schedule::{Alignment, ScheduleRule};
pub use target::{AutomationTarget, Predicate};
