//! API route modules.

pub mod calls;
pub mod system;
pub mod webhooks;
