//! Packet addressing: `(group, cmd)` route keys, directions and group patterns.
//!
//! A destination is written as `"<group>.<cmd>"` (for example `"11.11"`). Route
//! descriptors may replace the group segment with a wildcard (`"*.7"`) or a
//! named capture (`"{zone}.7"`); the cmd segment is always a literal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Separator between the group and cmd segments of a destination.
pub const SEPARATOR: char = '.';

/// Fully resolved packet address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteKey {
    /// Coarse protocol namespace (login, role, payment, ...). `0` means unset.
    pub group: i32,
    /// Operation identifier within the group.
    pub cmd: i32,
}

impl RouteKey {
    /// Creates a route key from its two components.
    #[must_use]
    pub const fn new(group: i32, cmd: i32) -> Self {
        Self { group, cmd }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.group, self.cmd)
    }
}

impl FromStr for RouteKey {
    type Err = RouteParseError;

    /// Parses `"group.cmd"`, or a bare `"cmd"` which leaves the group unset.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (group, cmd) = split_segments(input)?;
        let cmd = parse_cmd(input, cmd)?;
        let group = match group {
            Some(segment) => segment
                .trim()
                .parse::<i32>()
                .map_err(|_| RouteParseError::InvalidGroup {
                    input: input.to_string(),
                })?,
            None => 0,
        };
        Ok(Self { group, cmd })
    }
}

/// Which way a packet travels relative to this node.
///
/// `Inbound` packets are requests sent by the peer. `Outbound` routes handle
/// packets that answer requests this node originated itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => f.write_str("inbound"),
            Self::Outbound => f.write_str("outbound"),
        }
    }
}

/// The group part of a route descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum GroupMatch {
    /// No group declared. Inherits an enclosing group when combined, and
    /// accepts any group when left unset on the effective condition.
    #[default]
    Unset,
    /// A literal group number.
    Exact(i32),
    /// `*`: any group, never inherited over.
    Wildcard,
    /// `{name}`: any group, captured as a destination variable.
    Variable(String),
}

impl GroupMatch {
    /// Maps an integer group to a matcher; `0` is the "unset" sentinel.
    #[must_use]
    pub fn from_group(group: i32) -> Self {
        if group == 0 {
            Self::Unset
        } else {
            Self::Exact(group)
        }
    }

    /// Returns `true` for anything that needs pattern evaluation.
    #[must_use]
    pub fn is_pattern(&self) -> bool {
        !matches!(self, Self::Exact(_))
    }

    /// Returns the literal group, if any.
    #[must_use]
    pub fn exact(&self) -> Option<i32> {
        match self {
            Self::Exact(group) => Some(*group),
            _ => None,
        }
    }

    /// Whether a concrete group value satisfies this matcher.
    #[must_use]
    pub fn accepts(&self, group: i32) -> bool {
        match self {
            Self::Exact(expected) => *expected == group,
            Self::Unset | Self::Wildcard | Self::Variable(_) => true,
        }
    }

    /// Specificity rank, lower is more specific.
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            Self::Exact(_) => 0,
            Self::Variable(_) => 1,
            Self::Wildcard | Self::Unset => 2,
        }
    }
}

impl fmt::Display for GroupMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(group) => write!(f, "{group}"),
            Self::Unset | Self::Wildcard => f.write_str("*"),
            Self::Variable(name) => write!(f, "{{{name}}}"),
        }
    }
}

/// Errors from parsing destinations and route patterns.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteParseError {
    #[error("empty destination")]
    Empty,
    #[error("destination '{input}' has more than two segments")]
    TooManySegments { input: String },
    #[error("destination '{input}' has an invalid group segment")]
    InvalidGroup { input: String },
    #[error("destination '{input}' has an invalid cmd segment")]
    InvalidCmd { input: String },
}

/// Parses a route pattern into its group matcher and literal cmd.
///
/// Accepted forms: `"7"`, `"3.7"`, `"*.7"`, `"{zone}.7"`.
///
/// # Errors
///
/// Returns [`RouteParseError`] when a segment is malformed.
pub fn parse_pattern(input: &str) -> Result<(GroupMatch, i32), RouteParseError> {
    let (group, cmd) = split_segments(input)?;
    let cmd = parse_cmd(input, cmd)?;
    let Some(group) = group.map(str::trim) else {
        return Ok((GroupMatch::Unset, cmd));
    };

    let matcher = if group == "*" {
        GroupMatch::Wildcard
    } else if let Some(name) = group.strip_prefix('{').and_then(|g| g.strip_suffix('}')) {
        if name.is_empty() || name.contains(['{', '}']) {
            return Err(RouteParseError::InvalidGroup {
                input: input.to_string(),
            });
        }
        GroupMatch::Variable(name.to_string())
    } else {
        let value = group
            .parse::<i32>()
            .map_err(|_| RouteParseError::InvalidGroup {
                input: input.to_string(),
            })?;
        GroupMatch::from_group(value)
    };
    Ok((matcher, cmd))
}

fn split_segments(input: &str) -> Result<(Option<&str>, &str), RouteParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(RouteParseError::Empty);
    }
    let mut parts = trimmed.split(SEPARATOR);
    let first = parts.next().unwrap_or_default();
    match (parts.next(), parts.next()) {
        (None, _) => Ok((None, first)),
        (Some(second), None) => Ok((Some(first), second)),
        (Some(_), Some(_)) => Err(RouteParseError::TooManySegments {
            input: input.to_string(),
        }),
    }
}

fn parse_cmd(input: &str, segment: &str) -> Result<i32, RouteParseError> {
    segment
        .trim()
        .parse::<i32>()
        .map_err(|_| RouteParseError::InvalidCmd {
            input: input.to_string(),
        })
}
