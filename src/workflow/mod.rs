pub mod login_flow;
pub mod macro_ctx;
pub mod register_pass;

pub use login_flow::{LoginFlow, LoginFlowOptions, LoginMode, LoginOutcome, LoginState};
pub use macro_ctx::MacroCtx;
pub use register_pass::{PassReport, RegisterPass};
