//! Constructs: typed declarations that render into template resources
//!
//! Each construct computes everything it needs (logical ids, CIDR blocks,
//! cross-references) when it is created, and writes its resources into a
//! [`Template`] through [`Construct::synthesize`]. Creation can fail on bad
//! properties; rendering only fails on template-level conflicts.

pub mod cidr;
pub mod database;
pub mod engine;
pub mod network;
pub mod security;

use crate::error::SynthError;
use crate::template::Template;

pub trait Construct {
    /// Construct id within its parent scope
    fn node_id(&self) -> &str;

    fn synthesize(&self, template: &mut Template) -> Result<(), SynthError>;
}
