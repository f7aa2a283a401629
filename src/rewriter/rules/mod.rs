//! Catalog rules, one module per migration

pub mod assertion;
pub mod mocks;
pub mod registration;

pub use assertion::AssertionView;
pub use mocks::scan_bindings;
pub use registration::{RegistrationPass, RegistrationUsage};
