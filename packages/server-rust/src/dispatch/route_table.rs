//! Immutable route tables built from registered controllers.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use packetmap_core::{
    resolve_outbound, DestinationVars, Direction, OutboundTarget, PacketMapping, RouteCondition,
    RouteKey, TypeKey,
};
use tracing::debug;

use super::error::RegistrationError;
use super::handler::{HandlerMethod, PacketController};

// ---------------------------------------------------------------------------
// HandlerRegistration
// ---------------------------------------------------------------------------

/// One routable method, bound to its controller and effective condition.
pub struct HandlerRegistration {
    /// Position in registration order; lower wins ties.
    pub seq: usize,
    pub condition: RouteCondition,
    pub controller: Arc<dyn PacketController>,
    pub controller_mapping: Option<PacketMapping>,
    pub method: HandlerMethod,
    pub argument_types: Vec<TypeKey>,
}

impl HandlerRegistration {
    /// `controller::method`, used in logs and errors.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        qualified_name(self.controller.as_ref(), &self.method)
    }

    /// Outbound target for a reply value of runtime type `runtime`.
    #[must_use]
    pub fn outbound_target(&self, runtime: &TypeKey) -> Option<OutboundTarget> {
        resolve_outbound(
            self.controller_mapping
                .as_ref()
                .and_then(|m| m.outbound.as_ref()),
            self.method.mapping().and_then(|m| m.outbound.as_ref()),
            runtime,
        )
    }
}

impl fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("seq", &self.seq)
            .field("condition", &self.condition)
            .field("method", &self.qualified_name())
            .field("argument_types", &self.argument_types)
            .finish_non_exhaustive()
    }
}

fn qualified_name(controller: &dyn PacketController, method: &HandlerMethod) -> String {
    format!("{}::{}", controller.name(), method.name())
}

/// The best registration for a destination plus the variables it captured.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub registration: Arc<HandlerRegistration>,
    pub variables: DestinationVars,
}

// ---------------------------------------------------------------------------
// RouteTable
// ---------------------------------------------------------------------------

/// Lookup structure over every registration.
///
/// Exact-group conditions are indexed by `(direction, key)`; pattern
/// conditions are scanned. Tables are built completely and never mutated
/// after publication.
#[derive(Debug, Default)]
pub struct RouteTable {
    direct: HashMap<(Direction, RouteKey), Vec<Arc<HandlerRegistration>>>,
    patterns: Vec<Arc<HandlerRegistration>>,
    all: Vec<Arc<HandlerRegistration>>,
}

impl RouteTable {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a table from controllers in order.
    ///
    /// Methods without an inbound mapping, or whose combined condition is
    /// invalid, are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::AmbiguousRoute`] when two methods would
    /// always match the same destinations.
    pub fn build(controllers: &[Arc<dyn PacketController>]) -> Result<Self, RegistrationError> {
        let mut table = Self::default();
        for controller in controllers {
            let class_mapping = controller.mapping();
            let class_condition = class_mapping
                .as_ref()
                .and_then(|m| m.inbound.as_ref())
                .map(RouteCondition::from_descriptor);

            for method in Arc::clone(controller).handler_methods() {
                let Some(inbound) = method.mapping().and_then(|m| m.inbound.as_ref()) else {
                    debug!(
                        controller = controller.name(),
                        method = method.name(),
                        "skipping method without inbound mapping"
                    );
                    continue;
                };
                let method_condition = RouteCondition::from_descriptor(inbound);
                if method_condition.cmd <= 0 {
                    debug!(
                        controller = controller.name(),
                        method = method.name(),
                        cmd = method_condition.cmd,
                        "skipping method without a positive cmd"
                    );
                    continue;
                }
                let condition = match &class_condition {
                    Some(outer) => RouteCondition::combine(outer, &method_condition),
                    None => method_condition,
                };
                if !condition.is_valid() {
                    debug!(
                        controller = controller.name(),
                        method = method.name(),
                        %condition,
                        "skipping invalid route condition"
                    );
                    continue;
                }

                if let Some(existing) = table
                    .all
                    .iter()
                    .find(|r| r.condition.is_equivalent(&condition))
                {
                    return Err(RegistrationError::AmbiguousRoute {
                        condition,
                        existing: existing.qualified_name(),
                        conflicting: qualified_name(controller.as_ref(), &method),
                    });
                }

                let registration = HandlerRegistration {
                    seq: table.all.len(),
                    argument_types: method.params().iter().map(|p| p.ty).collect(),
                    condition,
                    controller: Arc::clone(controller),
                    controller_mapping: class_mapping.clone(),
                    method,
                };
                table.insert(Arc::new(registration));
            }
        }
        Ok(table)
    }

    fn insert(&mut self, registration: Arc<HandlerRegistration>) {
        match registration.condition.direct_key() {
            Some(key) => self
                .direct
                .entry((registration.condition.direction, key))
                .or_default()
                .push(Arc::clone(&registration)),
            None => self.patterns.push(Arc::clone(&registration)),
        }
        self.all.push(registration);
    }

    /// Registrations whose exact condition is `(direction, key)`.
    #[must_use]
    pub fn lookup_direct(
        &self,
        direction: Direction,
        key: RouteKey,
    ) -> &[Arc<HandlerRegistration>] {
        self.direct
            .get(&(direction, key))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every registration in registration order.
    #[must_use]
    pub fn lookup_all(&self) -> &[Arc<HandlerRegistration>] {
        &self.all
    }

    /// Finds the most specific registration for a destination.
    ///
    /// Candidates are ranked by [`RouteCondition::compare`]; equal ranks go
    /// to the earliest registration.
    #[must_use]
    pub fn find(&self, direction: Direction, key: RouteKey) -> Option<RouteMatch> {
        let mut best: Option<(&Arc<HandlerRegistration>, DestinationVars)> = None;
        let candidates = self
            .lookup_direct(direction, key)
            .iter()
            .chain(self.patterns.iter());

        for candidate in candidates {
            let Some(vars) = candidate.condition.match_destination(direction, key) else {
                continue;
            };
            let better = match &best {
                None => true,
                Some((current, _)) => {
                    RouteCondition::compare(&candidate.condition, &current.condition, key)
                        .then(candidate.seq.cmp(&current.seq))
                        == Ordering::Less
                }
            };
            if better {
                best = Some((candidate, vars));
            }
        }

        best.map(|(registration, variables)| RouteMatch {
            registration: Arc::clone(registration),
            variables,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.all.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use packetmap_core::{GroupMatch, OutboundMapping, RouteDescriptor};
    use proptest::prelude::*;

    use super::*;
    use crate::dispatch::handler::HandlerReturn;

    /// Controller whose methods are `(name, mapping)` pairs with empty bodies.
    struct Fixture {
        name: &'static str,
        class: Option<PacketMapping>,
        methods: Vec<(&'static str, Option<PacketMapping>)>,
    }

    impl PacketController for Fixture {
        fn name(&self) -> &'static str {
            self.name
        }

        fn mapping(&self) -> Option<PacketMapping> {
            self.class.clone()
        }

        fn handler_methods(self: Arc<Self>) -> Vec<HandlerMethod> {
            self.methods
                .iter()
                .map(|(name, mapping)| {
                    let method = HandlerMethod::new(*name, |_| async { Ok(HandlerReturn::Empty) });
                    match mapping {
                        Some(m) => method.with_mapping(m.clone()),
                        None => method,
                    }
                })
                .collect()
        }
    }

    fn controller(
        name: &'static str,
        class: Option<PacketMapping>,
        methods: Vec<(&'static str, Option<PacketMapping>)>,
    ) -> Arc<dyn PacketController> {
        Arc::new(Fixture {
            name,
            class,
            methods,
        })
    }

    fn pattern(p: &str) -> Option<PacketMapping> {
        Some(PacketMapping::inbound_pattern(p).unwrap())
    }

    #[test]
    fn class_group_combines_with_method_cmd() {
        let c = controller(
            "echo",
            Some(PacketMapping::inbound_group(11)),
            vec![("echo", Some(PacketMapping::inbound_cmd(11)))],
        );
        let table = RouteTable::build(&[c]).unwrap();
        assert_eq!(table.lookup_direct(Direction::Inbound, RouteKey::new(11, 11)).len(), 1);
        let found = table.find(Direction::Inbound, RouteKey::new(11, 11)).unwrap();
        assert_eq!(found.registration.qualified_name(), "echo::echo");
    }

    #[test]
    fn unmapped_and_invalid_methods_are_skipped() {
        let c = controller(
            "mixed",
            None,
            vec![
                ("helper", None),
                ("zero", Some(PacketMapping::inbound_cmd(0))),
                ("negative", Some(PacketMapping::inbound_cmd(-4))),
                ("ok", Some(PacketMapping::inbound_cmd(2))),
            ],
        );
        let table = RouteTable::build(&[c]).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup_all()[0].method.name(), "ok");
        assert!(table.lookup_all().iter().all(|r| r.condition.cmd > 0));
    }

    #[test]
    fn class_cmd_is_never_inherited() {
        let c = controller(
            "class_cmd",
            pattern("1.5"),
            vec![
                ("zero", Some(PacketMapping::inbound_cmd(0))),
                ("neg", Some(PacketMapping::inbound_cmd(-1))),
            ],
        );
        let table = RouteTable::build(&[c]).unwrap();
        assert!(table.is_empty());
        assert!(table.find(Direction::Inbound, RouteKey::new(1, 5)).is_none());
    }

    #[test]
    fn exact_beats_pattern_regardless_of_order() {
        let c = controller(
            "c",
            None,
            vec![("any", pattern("*.7")), ("zone", pattern("{zone}.7")), ("exact", pattern("3.7"))],
        );
        let table = RouteTable::build(&[c]).unwrap();

        let hit = table.find(Direction::Inbound, RouteKey::new(3, 7)).unwrap();
        assert_eq!(hit.registration.method.name(), "exact");

        let hit = table.find(Direction::Inbound, RouteKey::new(4, 7)).unwrap();
        assert_eq!(hit.registration.method.name(), "zone");
        assert_eq!(hit.variables.get("zone"), Some(&4));
    }

    #[test]
    fn direction_separates_routes() {
        let c = controller(
            "c",
            None,
            vec![
                ("in", pattern("1.1")),
                (
                    "out",
                    Some(PacketMapping::new().with_inbound(
                        RouteDescriptor::parse("1.1")
                            .unwrap()
                            .with_direction(Direction::Outbound),
                    )),
                ),
            ],
        );
        let table = RouteTable::build(&[c]).unwrap();
        let key = RouteKey::new(1, 1);
        assert_eq!(table.find(Direction::Inbound, key).unwrap().registration.method.name(), "in");
        assert_eq!(table.find(Direction::Outbound, key).unwrap().registration.method.name(), "out");
    }

    #[test]
    fn duplicate_exact_conditions_are_ambiguous() {
        let a = controller("a", None, vec![("m", pattern("2.2"))]);
        let b = controller("b", None, vec![("n", pattern("2.2"))]);
        let err = RouteTable::build(&[a, b]).unwrap_err();
        let RegistrationError::AmbiguousRoute {
            existing,
            conflicting,
            ..
        } = err;
        assert_eq!(existing, "a::m");
        assert_eq!(conflicting, "b::n");
    }

    #[test]
    fn unset_and_wildcard_groups_are_equivalent() {
        let c = controller(
            "c",
            None,
            vec![("unset", Some(PacketMapping::inbound_cmd(5))), ("wild", pattern("*.5"))],
        );
        assert!(RouteTable::build(&[c]).is_err());
    }

    #[test]
    fn outbound_target_uses_runtime_type() {
        let c = controller(
            "c",
            Some(PacketMapping::new().with_outbound(OutboundMapping::group(5))),
            vec![(
                "m",
                Some(
                    PacketMapping::inbound_pattern("1.1")
                        .unwrap()
                        .with_outbound(OutboundMapping::default().target::<String>(0, 1)),
                ),
            )],
        );
        let table = RouteTable::build(&[c]).unwrap();
        let reg = &table.lookup_all()[0];
        assert_eq!(
            reg.outbound_target(&TypeKey::of::<String>()),
            Some(OutboundTarget::new(5, 1))
        );
        assert_eq!(reg.outbound_target(&TypeKey::of::<u32>()), None);
    }

    #[test]
    fn no_match_returns_none() {
        let c = controller("c", None, vec![("m", pattern("1.1"))]);
        let table = RouteTable::build(&[c]).unwrap();
        assert!(table.find(Direction::Inbound, RouteKey::new(1, 2)).is_none());
        assert!(RouteTable::empty().find(Direction::Inbound, RouteKey::new(1, 1)).is_none());
    }

    proptest! {
        #[test]
        fn variable_always_outranks_wildcard(group in 0_i32..10_000, cmd in 1_i32..10_000) {
            let wild = RouteDescriptor::new(GroupMatch::Wildcard, cmd);
            let var = RouteDescriptor::new(GroupMatch::Variable("g".into()), cmd);
            let c = controller(
                "c",
                None,
                vec![
                    ("wild", Some(PacketMapping::new().with_inbound(wild))),
                    ("var", Some(PacketMapping::new().with_inbound(var))),
                ],
            );
            let table = RouteTable::build(&[c]).unwrap();
            let hit = table.find(Direction::Inbound, RouteKey::new(group, cmd)).unwrap();
            prop_assert_eq!(hit.registration.method.name(), "var");
            prop_assert_eq!(hit.variables.get("g").copied(), Some(group));
        }
    }
}
