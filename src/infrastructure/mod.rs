//! 基础设施层
//!
//! 持有稀缺资源（Page、设置文件），只暴露能力

pub mod chromium_port;
pub mod js_executor;
#[cfg(any(test, feature = "testing"))]
pub mod memory_port;
pub mod port;
pub mod settings_store;

pub use chromium_port::ChromiumPort;
pub use js_executor::JsExecutor;
#[cfg(any(test, feature = "testing"))]
pub use memory_port::{MemoryElement, MemoryPort};
pub use port::{AutomationPort, DocumentRef, DomEvent, ElementHandle};
pub use settings_store::{keys, SettingsStore};
