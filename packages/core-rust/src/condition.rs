//! Effective routing conditions and their matching rules.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::mapping::RouteDescriptor;
use crate::route::{Direction, GroupMatch, RouteKey};

/// Values captured from `{name}` group segments during matching.
pub type DestinationVars = BTreeMap<String, i32>;

/// The condition a handler method is registered under, after combining its
/// class-level and method-level descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteCondition {
    pub group: GroupMatch,
    pub cmd: i32,
    pub direction: Direction,
}

impl RouteCondition {
    #[must_use]
    pub fn new(group: GroupMatch, cmd: i32, direction: Direction) -> Self {
        Self {
            group,
            cmd,
            direction,
        }
    }

    #[must_use]
    pub fn from_descriptor(descriptor: &RouteDescriptor) -> Self {
        Self::new(descriptor.group.clone(), descriptor.cmd, descriptor.direction)
    }

    /// Merges a class-level condition with a method-level one.
    ///
    /// The method's group applies unless it is unset, in which case the
    /// class group is inherited. Cmd and direction always come from the
    /// method; a class-level cmd is never inherited.
    #[must_use]
    pub fn combine(outer: &Self, inner: &Self) -> Self {
        let group = match inner.group {
            GroupMatch::Unset => outer.group.clone(),
            ref group => group.clone(),
        };
        Self::new(group, inner.cmd, inner.direction)
    }

    /// A condition is registrable only with a positive cmd and a
    /// non-negative literal group.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.cmd > 0 && !matches!(self.group.exact(), Some(g) if g < 0)
    }

    /// A direct condition can be looked up by exact key without scanning.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        !self.group.is_pattern()
    }

    #[must_use]
    pub fn direct_key(&self) -> Option<RouteKey> {
        self.group.exact().map(|group| RouteKey::new(group, self.cmd))
    }

    #[must_use]
    pub fn matches(&self, direction: Direction, key: RouteKey) -> bool {
        self.direction == direction && self.cmd == key.cmd && self.group.accepts(key.group)
    }

    /// Matches and extracts destination variables in one pass.
    #[must_use]
    pub fn match_destination(
        &self,
        direction: Direction,
        key: RouteKey,
    ) -> Option<DestinationVars> {
        if !self.matches(direction, key) {
            return None;
        }
        let mut vars = DestinationVars::new();
        if let GroupMatch::Variable(name) = &self.group {
            vars.insert(name.clone(), key.group);
        }
        Some(vars)
    }

    /// Orders two conditions that both match `key`, most specific first.
    #[must_use]
    pub fn compare(a: &Self, b: &Self, key: RouteKey) -> Ordering {
        let misses_exact = |c: &Self| c.group.exact() != Some(key.group);
        misses_exact(a)
            .cmp(&misses_exact(b))
            .then_with(|| a.group.rank().cmp(&b.group.rank()))
    }

    /// Whether two conditions would always match the same destinations.
    ///
    /// Unset and wildcard groups accept the same set, and variable names do
    /// not change what a pattern accepts.
    #[must_use]
    pub fn is_equivalent(&self, other: &Self) -> bool {
        if self.direction != other.direction || self.cmd != other.cmd {
            return false;
        }
        match (&self.group, &other.group) {
            (GroupMatch::Exact(a), GroupMatch::Exact(b)) => a == b,
            (GroupMatch::Variable(_), GroupMatch::Variable(_)) => true,
            (
                GroupMatch::Unset | GroupMatch::Wildcard,
                GroupMatch::Unset | GroupMatch::Wildcard,
            ) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RouteCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}", self.direction, self.group, self.cmd)
    }
}
