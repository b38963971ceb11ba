//! Template validation
//!
//! Rules inspect a synthesized [`Template`](crate::template::Template) only,
//! so they apply equally to a freshly built stack and to a template read back
//! from a cloud assembly.

pub mod rules;
pub mod validator;

pub use validator::{RuleOutcome, Validator};
