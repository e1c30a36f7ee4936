//! Thin glue between a host's viewport/frame events and the loader.
//!
//! This owns nothing beyond a handle to the [`TileLoader`] it was built
//! around; it exists so a host only has two wires to connect ("viewport
//! changed" and "frame ticked"), rather than needing to know the loader's
//! internal call sequence.

use std::sync::Arc;

use crate::geo::ViewportBounds;
use crate::loader::TileLoader;

/// Binds a `TileLoader` to a host's event loop.
pub struct TileOrchestrator<T> {
    loader: Arc<TileLoader<T>>,
}

impl<T> TileOrchestrator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(loader: Arc<TileLoader<T>>) -> Self {
        Self { loader }
    }

    pub fn loader(&self) -> &Arc<TileLoader<T>> {
        &self.loader
    }

    /// Wire this to the host's pan/zoom event.
    pub fn on_viewport_changed(&self, bounds: ViewportBounds, zoom: u8) {
        self.loader.update_viewport(bounds, zoom);
    }

    /// Wire this to the host's per-frame tick.
    pub fn on_frame(&self) {
        self.loader.process_queue();
    }
}
