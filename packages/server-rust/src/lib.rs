//! packetmap server: packet route table, argument resolution and the tower
//! dispatch pipeline.

pub mod dispatch;

pub use dispatch::{
    build_dispatch_pipeline, DispatchError, DispatcherConfig, HandlerRegistry, PacketClassifier,
    PacketController, PacketDispatcher,
};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
