//! Controller registry: the in-process source of packet controllers, looked
//! up by name or concrete type and scanned by marker for route table builds.

use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use super::handler::PacketController;

// ---------------------------------------------------------------------------
// ComponentRegistry trait
// ---------------------------------------------------------------------------

/// Source of controller instances, queried when the route table is refreshed.
///
/// Application bootstrap code implements this over whatever container it
/// uses; [`ControllerRegistry`] is the in-process default.
pub trait ComponentRegistry: Send + Sync {
    /// Controllers carrying `marker`, in registration order.
    fn components_annotated_as(&self, marker: &str) -> Vec<Arc<dyn PacketController>>;
}

// ---------------------------------------------------------------------------
// ControllerRegistry
// ---------------------------------------------------------------------------

/// Registry for packet controllers.
///
/// Provides two lookup mechanisms:
/// - **By name** (`get_by_name`): uses the controller's `name()` string
/// - **By type** (`get::<T>`): uses `TypeId`
///
/// Registering a second controller under an existing name replaces it and
/// keeps its original position.
pub struct ControllerRegistry {
    by_name: DashMap<&'static str, Arc<dyn PacketController>>,
    by_type: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    order: RwLock<Vec<&'static str>>,
}

impl ControllerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            by_type: DashMap::new(),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Registers a controller, returning the shared handle.
    pub fn register<T: PacketController>(&self, controller: T) -> Arc<T> {
        let name = controller.name();
        let arc = Arc::new(controller);
        let previous = self.by_name.insert(name, arc.clone());
        match previous {
            Some(replaced) => {
                let stale = Arc::as_ptr(&replaced).cast::<()>();
                self.by_type
                    .retain(|_, held| Arc::as_ptr(held).cast::<()>() != stale);
            }
            None => self.order.write().push(name),
        }
        self.by_type.insert(TypeId::of::<T>(), arc.clone());
        arc
    }

    /// Retrieves a controller by its concrete type.
    pub fn get<T: PacketController>(&self) -> Option<Arc<T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value().clone().downcast::<T>().ok())
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn PacketController>> {
        self.by_name.get(name).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.read().is_empty()
    }
}

impl Default for ControllerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentRegistry for ControllerRegistry {
    fn components_annotated_as(&self, marker: &str) -> Vec<Arc<dyn PacketController>> {
        let order = self.order.read().clone();
        order
            .iter()
            .filter_map(|name| self.get_by_name(name))
            .filter(|controller| controller.markers().iter().any(|m| *m == marker))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::handler::{HandlerMethod, PACKET_HANDLER_MARKER};

    struct LoginController;

    impl PacketController for LoginController {
        fn name(&self) -> &'static str {
            "login"
        }

        fn handler_methods(self: Arc<Self>) -> Vec<HandlerMethod> {
            Vec::new()
        }
    }

    struct AuditController;

    impl PacketController for AuditController {
        fn name(&self) -> &'static str {
            "audit"
        }

        fn markers(&self) -> &'static [&'static str] {
            &[]
        }

        fn handler_methods(self: Arc<Self>) -> Vec<HandlerMethod> {
            Vec::new()
        }
    }

    struct LegacyLoginController;

    impl PacketController for LegacyLoginController {
        fn name(&self) -> &'static str {
            "login"
        }

        fn handler_methods(self: Arc<Self>) -> Vec<HandlerMethod> {
            Vec::new()
        }
    }

    #[test]
    fn lookup_by_type_and_name() {
        let registry = ControllerRegistry::new();
        registry.register(LoginController);
        assert!(registry.get::<LoginController>().is_some());
        assert!(registry.get::<AuditController>().is_none());
        assert_eq!(registry.get_by_name("login").unwrap().name(), "login");
    }

    #[test]
    fn scan_filters_by_marker_in_order() {
        let registry = ControllerRegistry::new();
        registry.register(AuditController);
        registry.register(LoginController);
        let scanned = registry.components_annotated_as(PACKET_HANDLER_MARKER);
        let names: Vec<_> = scanned.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["login"]);
    }

    #[test]
    fn reregistering_replaces_in_place() {
        let registry = ControllerRegistry::new();
        registry.register(LoginController);
        registry.register(AuditController);
        registry.register(LoginController);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn replacing_a_name_drops_the_old_type() {
        let registry = ControllerRegistry::new();
        registry.register(LoginController);
        registry.register(LegacyLoginController);
        assert!(registry.get::<LoginController>().is_none());
        assert!(registry.get::<LegacyLoginController>().is_some());
        assert_eq!(registry.len(), 1);
    }
}
