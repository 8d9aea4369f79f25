use std::sync::Arc;

use tracing::debug;

use crate::host::{MapHost, SurfaceId, Surfaces};
use crate::orchestrator::{BeginOptions, Orchestrator};

/// Host adapter: owns the wrapper container placed in the map's overlay
/// pane and forwards the map's add/remove lifecycle to an [`Orchestrator`].
pub struct CanvasOverlay {
    orchestrator: Orchestrator,
    wrapper: Option<SurfaceId>,
}

impl CanvasOverlay {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            wrapper: None,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn orchestrator_mut(&mut self) -> &mut Orchestrator {
        &mut self.orchestrator
    }

    pub fn wrapper(&self) -> Option<SurfaceId> {
        self.wrapper
    }

    /// The overlay was added to `map`; `pane` is where overlays are drawn.
    pub fn on_add(&mut self, map: Arc<dyn MapHost>, mut surfaces: Box<dyn Surfaces>, pane: SurfaceId) {
        if self.wrapper.is_some() {
            self.on_remove();
        }
        let wrapper = surfaces.create_container();
        surfaces.attach(wrapper, pane);
        self.wrapper = Some(wrapper);
        debug!(wrapper = wrapper.0, "overlay added");

        self.orchestrator.begin(BeginOptions {
            map,
            surfaces,
            container: wrapper,
        });
    }

    /// The overlay was removed from its map.
    pub fn on_remove(&mut self) {
        let surfaces = self.orchestrator.reset();
        if let (Some(mut surfaces), Some(wrapper)) = (surfaces, self.wrapper.take()) {
            surfaces.detach(wrapper);
            debug!(wrapper = wrapper.0, "overlay removed");
        }
    }
}
