//! Stable logical ids derived from construct paths.
//!
//! A construct path such as `TestVPC/PublicSubnet1/Subnet` maps to a logical
//! id made of the path's alphanumeric characters followed by an 8-character
//! hash of the full path, e.g. `TestVPCPublicSubnet1Subnet5C2D37C4`. The
//! hash keeps ids unique even when sanitizing collapses two paths into the
//! same human-readable prefix.

use crate::error::SynthError;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::OnceLock;

const PATH_SEP: &str = "/";
const HASH_LEN: usize = 8;
const MAX_HUMAN_LEN: usize = 240;

/// Components hidden from the human-readable part of an id
const HIDDEN_FROM_HUMAN: &str = "Resource";
/// Components hidden from both the human part and the hash
const HIDDEN_FROM_ALL: &str = "Default";

fn construct_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^/]*[A-Za-z0-9][^/]*$").expect("valid regex"))
}

/// Path of a construct below its stack
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstructPath {
    stack: String,
    components: Vec<String>,
}

impl ConstructPath {
    pub fn root(stack_name: impl Into<String>) -> Self {
        Self {
            stack: stack_name.into(),
            components: Vec::new(),
        }
    }

    /// Descends into a child scope.
    ///
    /// Ids are trimmed; `/` is reserved as the path separator.
    pub fn child(&self, id: &str) -> Result<Self, SynthError> {
        let id = id.trim();
        if !construct_id_pattern().is_match(id) {
            return Err(SynthError::InvalidConstructId(id.to_string()));
        }
        let mut components = self.components.clone();
        components.push(id.to_string());
        Ok(Self {
            stack: self.stack.clone(),
            components,
        })
    }

    pub fn stack_name(&self) -> &str {
        &self.stack
    }

    /// Last path component (the construct's own id)
    pub fn id(&self) -> &str {
        self.components
            .last()
            .map(String::as_str)
            .unwrap_or(&self.stack)
    }

    pub fn logical_id(&self) -> String {
        let hashed: Vec<&str> = self
            .components
            .iter()
            .map(String::as_str)
            .filter(|c| *c != HIDDEN_FROM_ALL)
            .collect();

        let mut human: String = hashed
            .iter()
            .filter(|c| **c != HIDDEN_FROM_HUMAN)
            .flat_map(|c| c.chars())
            .filter(char::is_ascii_alphanumeric)
            .collect();
        human.truncate(MAX_HUMAN_LEN);

        // Single-component paths read better without a suffix, as long as
        // nothing was stripped while sanitizing.
        if hashed.len() == 1 && human == hashed[0] {
            return human;
        }

        let digest = Sha256::digest(hashed.join(PATH_SEP).as_bytes());
        let suffix = hex::encode_upper(&digest[..HASH_LEN / 2]);
        format!("{}{}", human, suffix)
    }
}

impl fmt::Display for ConstructPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stack)?;
        for component in &self.components {
            write!(f, "{}{}", PATH_SEP, component)?;
        }
        Ok(())
    }
}
