//! Handler registry: owns the registered controllers and publishes route
//! tables.
//!
//! Uses `ArcSwap` so dispatches read the current table without locking. A
//! rebuild happens entirely off to the side and becomes visible with a single
//! store; in-flight dispatches keep the table they loaded.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::info;

use super::components::ComponentRegistry;
use super::error::RegistrationError;
use super::handler::{PacketController, PACKET_HANDLER_MARKER};
use super::route_table::RouteTable;

/// Registered controllers plus the route table built from them.
pub struct HandlerRegistry {
    table: ArcSwap<RouteTable>,
    /// Serialises writers; also the source of truth for rebuilds.
    controllers: Mutex<Vec<Arc<dyn PacketController>>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: ArcSwap::from_pointee(RouteTable::empty()),
            controllers: Mutex::new(Vec::new()),
        }
    }

    /// Adds a controller and publishes a rebuilt table.
    ///
    /// A controller whose `name()` is already registered replaces the earlier
    /// one in place, so registering the same controller twice is a no-op for
    /// routing.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError`] when the rebuilt table would be
    /// ambiguous. Neither the controller list nor the published table change.
    pub fn register(&self, controller: Arc<dyn PacketController>) -> Result<(), RegistrationError> {
        let mut controllers = self.controllers.lock();
        let mut next = controllers.clone();
        match next.iter().position(|c| c.name() == controller.name()) {
            Some(index) => next[index] = controller,
            None => next.push(controller),
        }
        self.publish(&next)?;
        *controllers = next;
        Ok(())
    }

    /// Replaces every controller with the ones `components` marks as packet
    /// handlers.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError`] when the new table would be ambiguous.
    /// The previous table stays active.
    pub fn refresh(&self, components: &dyn ComponentRegistry) -> Result<(), RegistrationError> {
        let mut controllers = self.controllers.lock();
        let mut next: Vec<Arc<dyn PacketController>> = Vec::new();
        for controller in components.components_annotated_as(PACKET_HANDLER_MARKER) {
            match next.iter().position(|c| c.name() == controller.name()) {
                Some(index) => next[index] = controller,
                None => next.push(controller),
            }
        }
        self.publish(&next)?;
        *controllers = next;
        Ok(())
    }

    fn publish(&self, controllers: &[Arc<dyn PacketController>]) -> Result<(), RegistrationError> {
        let table = RouteTable::build(controllers)?;
        info!(
            controllers = controllers.len(),
            routes = table.len(),
            "route table published"
        );
        self.table.store(Arc::new(table));
        Ok(())
    }

    /// The currently published table.
    #[must_use]
    pub fn table(&self) -> Arc<RouteTable> {
        self.table.load_full()
    }

    #[must_use]
    pub fn controller_count(&self) -> usize {
        self.controllers.lock().len()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
