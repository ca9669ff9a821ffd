use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::{MemdumpError, Result};

/// Canonical space names, ordered by their trace code (1..=6).
pub const SPACE_NAMES: [&str; 6] = [
    "object",
    "humongous",
    "nonmovable",
    "internal",
    "code",
    "compiler",
];

/// Memory region category tagged on every allocation event.
///
/// The discriminants are the codes written by the instrumented runtime and
/// must stay in sync with its space enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Space {
    Object = 1,
    Humongous = 2,
    NonMovable = 3,
    Internal = 4,
    Code = 5,
    Compiler = 6,
}

impl Space {
    pub const ALL: [Space; 6] = [
        Space::Object,
        Space::Humongous,
        Space::NonMovable,
        Space::Internal,
        Space::Code,
        Space::Compiler,
    ];

    /// Maps a trace code to its space, failing with [`MemdumpError::UnknownSpaceCode`].
    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            1 => Ok(Space::Object),
            2 => Ok(Space::Humongous),
            3 => Ok(Space::NonMovable),
            4 => Ok(Space::Internal),
            5 => Ok(Space::Code),
            6 => Ok(Space::Compiler),
            other => Err(MemdumpError::UnknownSpaceCode(other)),
        }
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Space::Object => "object",
            Space::Humongous => "humongous",
            Space::NonMovable => "nonmovable",
            Space::Internal => "internal",
            Space::Code => "code",
            Space::Compiler => "compiler",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|space| space.name() == name)
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Space {
    type Err = MemdumpError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| MemdumpError::UnknownSpaceName(s.to_string()))
    }
}

/// Name of the space registered under `code`.
pub fn name_of(code: u32) -> Result<&'static str> {
    Space::from_code(code).map(Space::name)
}

/// True iff `name` is one of the six canonical space names.
pub fn validate(name: &str) -> bool {
    Space::from_name(name).is_some()
}

/// Space selection for a report: every space, or exactly one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpaceFilter {
    #[default]
    All,
    Only(Space),
}

impl SpaceFilter {
    /// Parses `"all"` or a canonical space name.
    ///
    /// Any other value is a usage error and must be reported before a trace is
    /// opened.
    pub fn parse(name: &str) -> Result<Self> {
        if name == "all" {
            return Ok(SpaceFilter::All);
        }
        name.parse().map(SpaceFilter::Only)
    }

    pub fn matches(self, space: Space) -> bool {
        match self {
            SpaceFilter::All => true,
            SpaceFilter::Only(expected) => expected == space,
        }
    }
}

impl fmt::Display for SpaceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpaceFilter::All => write!(f, "all"),
            SpaceFilter::Only(space) => write!(f, "{space}"),
        }
    }
}
