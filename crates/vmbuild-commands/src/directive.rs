//! Directive keywords and the decoder registry
//!
//! Provides [`DirectiveRegistry`], a lookup table from directive keyword to
//! the function that maps a generic record onto a typed instruction.

use crate::instruction::{self, BuildInstruction};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

/// Decoder from a generic record to a typed instruction
pub type DecodeFn = fn(Value) -> Result<BuildInstruction, serde_json::Error>;

/// Known directive kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    /// Fetch-and-place, source may be remote
    Add,
    /// Fetch-and-place from the local build context
    Copy,
    /// Execute a command
    Run,
}

impl Directive {
    /// All built-in directives
    pub const ALL: [Directive; 3] = [Directive::Add, Directive::Copy, Directive::Run];

    /// Keyword as written in instruction text
    #[inline]
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Directive::Add => "ADD",
            Directive::Copy => "COPY",
            Directive::Run => "RUN",
        }
    }

    /// Parse a keyword (case-insensitive)
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|d| d.keyword().eq_ignore_ascii_case(keyword))
    }

    fn decoder(self) -> DecodeFn {
        match self {
            Directive::Add => |v| serde_json::from_value::<instruction::Add>(v).map(Into::into),
            Directive::Copy => |v| serde_json::from_value::<instruction::Copy>(v).map(Into::into),
            Directive::Run => |v| serde_json::from_value::<instruction::Run>(v).map(Into::into),
        }
    }
}

impl Display for Directive {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Leading directive token of an instruction text
#[inline]
#[must_use]
pub fn directive_token(original_command: &str) -> Option<&str> {
    original_command.split_whitespace().next()
}

/// Registry of decodable directives
///
/// Keywords are stored upper-case; lookups are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct DirectiveRegistry {
    decoders: HashMap<String, DecodeFn>,
}

impl DirectiveRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Create registry with `ADD`, `COPY` and `RUN`
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for directive in Directive::ALL {
            registry.register(directive.keyword(), directive.decoder());
        }
        registry
    }

    /// Register (or replace) a keyword decoder
    pub fn register(&mut self, keyword: &str, decoder: DecodeFn) {
        self.decoders.insert(keyword.to_ascii_uppercase(), decoder);
    }

    /// Remove a keyword
    #[inline]
    pub fn remove(&mut self, keyword: &str) -> bool {
        self.decoders.remove(&keyword.to_ascii_uppercase()).is_some()
    }

    /// Look up the decoder for a directive token
    #[inline]
    #[must_use]
    pub fn lookup(&self, token: &str) -> Option<DecodeFn> {
        self.decoders.get(&token.to_ascii_uppercase()).copied()
    }

    /// Check if keyword is registered
    #[inline]
    #[must_use]
    pub fn contains(&self, keyword: &str) -> bool {
        self.lookup(keyword).is_some()
    }

    /// Registered keywords
    #[must_use]
    pub fn keywords(&self) -> Vec<&str> {
        let mut keywords: Vec<&str> = self.decoders.keys().map(String::as_str).collect();
        keywords.sort_unstable();
        keywords
    }

    /// Number of registered keywords
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}
