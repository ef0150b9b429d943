pub mod lifecycle;
pub mod locks;
pub mod scheduler;
pub mod validation;

pub use lifecycle::{LifecycleSettings, TokenLifecycle};
