pub mod identity;
pub mod logging;

pub use identity::{BrowserIdentity, STEALTH_SCRIPT};
