//! Declarative route descriptors attached to controllers and handler methods.
//!
//! A controller may carry a class-level [`PacketMapping`] and each of its
//! handler methods a method-level one. The inbound half feeds route
//! registration; the outbound half tells the reply path where to send
//! whatever the handler returns.

use serde::{Deserialize, Serialize};

use crate::route::{parse_pattern, Direction, GroupMatch, RouteParseError};
use crate::types::TypeKey;

/// Combined inbound and outbound descriptor for one declaration site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketMapping {
    pub inbound: Option<RouteDescriptor>,
    pub outbound: Option<OutboundMapping>,
}

impl PacketMapping {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Class-level shorthand: declares only the inbound group.
    #[must_use]
    pub fn inbound_group(group: i32) -> Self {
        Self::new().with_inbound(RouteDescriptor::group(group))
    }

    /// Method-level shorthand: declares only the inbound cmd.
    #[must_use]
    pub fn inbound_cmd(cmd: i32) -> Self {
        Self::new().with_inbound(RouteDescriptor::cmd(cmd))
    }

    /// Parses an inbound pattern such as `"11.11"`, `"*.7"` or `"{zone}.7"`.
    ///
    /// # Errors
    ///
    /// Returns [`RouteParseError`] when the pattern is malformed.
    pub fn inbound_pattern(pattern: &str) -> Result<Self, RouteParseError> {
        Ok(Self::new().with_inbound(RouteDescriptor::parse(pattern)?))
    }

    #[must_use]
    pub fn with_inbound(mut self, inbound: RouteDescriptor) -> Self {
        self.inbound = Some(inbound);
        self
    }

    #[must_use]
    pub fn with_outbound(mut self, outbound: OutboundMapping) -> Self {
        self.outbound = Some(outbound);
        self
    }
}

/// Inbound half of a mapping: `(group, cmd)` plus the direction it listens on.
///
/// A `cmd` of `0` means "not declared here" and is only meaningful on a
/// class-level descriptor, where the method supplies it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub group: GroupMatch,
    pub cmd: i32,
    pub direction: Direction,
}

impl RouteDescriptor {
    #[must_use]
    pub fn new(group: GroupMatch, cmd: i32) -> Self {
        Self {
            group,
            cmd,
            direction: Direction::Inbound,
        }
    }

    /// A descriptor declaring only a literal group.
    #[must_use]
    pub fn group(group: i32) -> Self {
        Self::new(GroupMatch::from_group(group), 0)
    }

    /// A descriptor declaring only a cmd.
    #[must_use]
    pub fn cmd(cmd: i32) -> Self {
        Self::new(GroupMatch::Unset, cmd)
    }

    /// Parses a route pattern.
    ///
    /// # Errors
    ///
    /// Returns [`RouteParseError`] when the pattern is malformed.
    pub fn parse(pattern: &str) -> Result<Self, RouteParseError> {
        let (group, cmd) = parse_pattern(pattern)?;
        Ok(Self::new(group, cmd))
    }

    #[must_use]
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }
}

/// Outbound half of a mapping: a default reply group plus per-type targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMapping {
    /// Reply group used when no target matches. `0` means unset.
    pub group: i32,
    pub targets: Vec<TargetMapping>,
}

impl OutboundMapping {
    #[must_use]
    pub fn group(group: i32) -> Self {
        Self {
            group,
            targets: Vec::new(),
        }
    }

    /// Appends a target consulted when the reply value is a `T`.
    #[must_use]
    pub fn target<T: 'static>(mut self, group: i32, cmd: i32) -> Self {
        self.targets.push(TargetMapping::new::<T>(group, cmd));
        self
    }
}

/// Sends replies of one concrete type to a specific `(group, cmd)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetMapping {
    pub group: i32,
    pub cmd: i32,
    pub for_type: TypeKey,
}

impl TargetMapping {
    #[must_use]
    pub fn new<T: 'static>(group: i32, cmd: i32) -> Self {
        Self {
            group,
            cmd,
            for_type: TypeKey::of::<T>(),
        }
    }
}

/// Where an outgoing reply is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutboundTarget {
    pub group: i32,
    pub cmd: i32,
}

impl OutboundTarget {
    #[must_use]
    pub const fn new(group: i32, cmd: i32) -> Self {
        Self { group, cmd }
    }
}

/// Computes the outbound target for a reply value of runtime type `runtime`.
///
/// Method-level targets are consulted first; class-level targets only apply
/// to types the method declares no usable target for. Within a level the
/// first target whose type equals `runtime` with a positive cmd wins. Its group is
/// the target's own group when non-zero, then the method's outbound group,
/// then the class's. A resolved group of `0` yields no target.
#[must_use]
pub fn resolve_outbound(
    class: Option<&OutboundMapping>,
    method: Option<&OutboundMapping>,
    runtime: &TypeKey,
) -> Option<OutboundTarget> {
    let class_group = class.map_or(0, |m| m.group);
    let method_group = method.map_or(0, |m| m.group);

    method
        .into_iter()
        .chain(class)
        .flat_map(|mapping| mapping.targets.iter())
        .find(|target| target.for_type == *runtime && target.cmd > 0)
        .and_then(|target| {
            let group = [target.group, method_group, class_group]
                .into_iter()
                .find(|g| *g != 0)?;
            Some(OutboundTarget::new(group, target.cmd))
        })
}
