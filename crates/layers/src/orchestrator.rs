//! Keeps the heatmap's tile surfaces in step with a moving map.
//!
//! The orchestrator is single-writer: every mutation of its layers and
//! canvases happens inside one [`Orchestrator::step`] call, driven from one
//! task. Renders run on spawned tasks and report back over a channel; their
//! results are only painted if the tile is still visible when they land.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use compute::{HeatmapConfig, RenderError, Renderer, TileImage};
use foundation::{MAX_COVERING_SHIFT, Tile, calculate_visible_tiles, tile_bounds};
use runtime::{Coalescer, DEFAULT_COALESCE_WINDOW, Distinct};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::host::{Bounds, MapEvent, MapHost, Subscription, SurfaceId, Surfaces};
use crate::layer::{Canvas, Layer, canvas_position, layer_offset, layer_position};

/// What the host adapter hands over when the overlay is added to a map.
pub struct BeginOptions {
    pub map: Arc<dyn MapHost>,
    pub surfaces: Box<dyn Surfaces>,
    /// Parent for every layer container.
    pub container: SurfaceId,
}

/// Running totals, for tests and debug output.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct OrchestratorStats {
    pub renders_requested: u64,
    pub painted: u64,
    pub discarded: u64,
    pub failed: u64,
    pub removed_out_of_view: u64,
    pub removed_covered: u64,
    pub layers_created: u64,
    pub layers_repositioned: u64,
}

#[derive(Debug, Copy, Clone, PartialEq)]
struct View {
    zoom: u8,
    bounds: Bounds,
}

struct Binding {
    map: Arc<dyn MapHost>,
    surfaces: Box<dyn Surfaces>,
    container: SurfaceId,
    events: UnboundedReceiver<MapEvent>,
    _subscription: Subscription,
}

struct RenderCompletion {
    generation: u64,
    tile: Tile,
    result: Result<TileImage, RenderError>,
}

enum Turn {
    Map(Option<MapEvent>),
    Rendered(RenderCompletion),
    ViewDue,
}

pub struct Orchestrator {
    tile_size: u32,
    renderer: Arc<dyn Renderer>,
    binding: Option<Binding>,
    /// Bumped on every reset; completions from older generations are dropped.
    generation: u64,
    layers: Vec<Layer>,
    canvases: Vec<Canvas>,
    view: Option<View>,
    visible: Vec<Tile>,
    in_flight: HashSet<Tile>,
    view_changes: Coalescer<()>,
    distinct_view: Distinct<View>,
    completions_tx: UnboundedSender<RenderCompletion>,
    completions_rx: UnboundedReceiver<RenderCompletion>,
    stats: OrchestratorStats,
}

impl Orchestrator {
    pub fn new(tile_size: u32, renderer: Arc<dyn Renderer>) -> Self {
        Self::with_window(tile_size, renderer, DEFAULT_COALESCE_WINDOW)
    }

    pub fn from_config(config: &HeatmapConfig, renderer: Arc<dyn Renderer>) -> Self {
        Self::with_window(config.tile_size, renderer, config.coalesce_window())
    }

    pub fn with_window(tile_size: u32, renderer: Arc<dyn Renderer>, window: Duration) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            tile_size,
            renderer,
            binding: None,
            generation: 0,
            layers: Vec::new(),
            canvases: Vec::new(),
            view: None,
            visible: Vec::new(),
            in_flight: HashSet::new(),
            view_changes: Coalescer::new(window),
            distinct_view: Distinct::new(),
            completions_tx,
            completions_rx,
            stats: OrchestratorStats::default(),
        }
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn canvases(&self) -> &[Canvas] {
        &self.canvases
    }

    /// Tiles visible at the current zoom, center first.
    pub fn visible_tiles(&self) -> &[Tile] {
        &self.visible
    }

    pub fn stats(&self) -> OrchestratorStats {
        self.stats
    }

    /// Binds to a map. Any previous binding is reset first.
    ///
    /// The initial view is evaluated one coalescing window later, like any
    /// other view change.
    pub fn begin(&mut self, options: BeginOptions) {
        if self.binding.is_some() {
            self.reset();
        }
        let (events_tx, events) = mpsc::unbounded_channel();
        let subscription = options.map.subscribe(events_tx);
        self.binding = Some(Binding {
            map: options.map,
            surfaces: options.surfaces,
            container: options.container,
            events,
            _subscription: subscription,
        });
        self.view_changes.push((), Instant::now());
        info!(generation = self.generation, "orchestrator bound to map");
    }

    /// Detaches every layer and canvas and unsubscribes from the map.
    ///
    /// Returns the surface factory handed to [`Orchestrator::begin`], so the
    /// host adapter can tear down its own container.
    pub fn reset(&mut self) -> Option<Box<dyn Surfaces>> {
        self.generation += 1;
        self.view = None;
        self.visible.clear();
        self.in_flight.clear();
        self.view_changes.clear();
        self.distinct_view.reset();

        let canvases = std::mem::take(&mut self.canvases);
        let layers = std::mem::take(&mut self.layers);
        let binding = self.binding.take()?;
        let mut surfaces = binding.surfaces;
        for canvas in canvases {
            surfaces.detach(canvas.element);
        }
        for layer in layers {
            surfaces.detach(layer.element);
        }
        info!(generation = self.generation, "orchestrator reset");
        Some(surfaces)
    }

    /// Runs until the map unsubscribes or the orchestrator is reset.
    pub async fn run(&mut self) {
        while self.step().await {}
    }

    /// Waits for and applies one event: a map notification, a finished
    /// render or the end of a coalescing window.
    ///
    /// Returns `false` when there is no bound map.
    pub async fn step(&mut self) -> bool {
        let turn = {
            let Some(binding) = self.binding.as_mut() else {
                return false;
            };
            tokio::select! {
                event = binding.events.recv() => Turn::Map(event),
                Some(done) = self.completions_rx.recv() => Turn::Rendered(done),
                () = self.view_changes.wait() => Turn::ViewDue,
            }
        };

        match turn {
            Turn::Map(Some(event)) => self.handle_map_event(event),
            Turn::Map(None) => {
                debug!("map event stream closed");
                self.reset();
                return false;
            }
            Turn::Rendered(done) => self.handle_render_complete(done),
            Turn::ViewDue => {
                if self.view_changes.poll_due(Instant::now()).is_some() {
                    self.refresh_view();
                }
            }
        }
        true
    }

    fn handle_map_event(&mut self, event: MapEvent) {
        match event {
            MapEvent::BoundsChanged | MapEvent::ZoomChanged => {
                self.view_changes.push((), Instant::now());
            }
            MapEvent::Idle => self.handle_idle(),
        }
    }

    fn current_view(&self) -> Option<View> {
        let binding = self.binding.as_ref()?;
        let Some(bounds) = binding.map.bounds() else {
            debug!("map has no bounds yet, skipping update");
            return None;
        };
        Some(View {
            zoom: binding.map.zoom(),
            bounds,
        })
    }

    /// Recomputes the visible set, drops canvases that left it and requests
    /// renders for tiles that have none.
    fn refresh_view(&mut self) {
        let Some(view) = self.current_view() else {
            return;
        };
        if !self.distinct_view.changed(view) {
            return;
        }

        self.view = Some(view);
        self.visible = calculate_visible_tiles(self.tile_size, view.zoom, &view.bounds.to_area());
        debug!(zoom = view.zoom, visible = self.visible.len(), "view changed");

        self.remove_out_of_view(view);
        self.request_renders();
    }

    /// A canvas stays while its tile is visible at its own zoom.
    fn remove_out_of_view(&mut self, view: View) {
        let tile_size = self.tile_size;
        let area = view.bounds.to_area();
        let (kept, removed): (Vec<Canvas>, Vec<Canvas>) =
            std::mem::take(&mut self.canvases)
                .into_iter()
                .partition(|canvas| {
                    let bounds = tile_bounds(tile_size, canvas.tile.zoom, &area);
                    bounds.contains_x(canvas.tile.point.x) && bounds.contains_y(canvas.tile.point.y)
                });
        self.canvases = kept;

        for canvas in removed {
            debug!(tile = %canvas.tile, "removing canvas out of view");
            self.stats.removed_out_of_view += 1;
            if let Some(binding) = self.binding.as_mut() {
                binding.surfaces.detach(canvas.element);
            }
        }
    }

    fn request_renders(&mut self) {
        let unrendered: Vec<Tile> = self
            .visible
            .iter()
            .copied()
            .filter(|tile| !self.in_flight.contains(tile))
            .filter(|tile| self.canvases.iter().all(|canvas| canvas.tile != *tile))
            .collect();

        for tile in unrendered {
            self.in_flight.insert(tile);
            self.stats.renders_requested += 1;

            let render = self.renderer.render_tile(tile);
            let completions = self.completions_tx.clone();
            let generation = self.generation;
            tokio::spawn(async move {
                let result = render.await;
                let _ = completions.send(RenderCompletion {
                    generation,
                    tile,
                    result,
                });
            });
        }
    }

    fn handle_render_complete(&mut self, done: RenderCompletion) {
        if done.generation != self.generation {
            return;
        }
        self.in_flight.remove(&done.tile);

        let image = match done.result {
            Ok(image) => image,
            Err(err) => {
                warn!(tile = %done.tile, error = %err, "tile render failed");
                self.stats.failed += 1;
                return;
            }
        };

        let still_visible = self
            .view
            .is_some_and(|view| view.zoom == done.tile.zoom && self.visible.contains(&done.tile));
        if !still_visible {
            debug!(tile = %done.tile, "discarding render for tile no longer visible");
            self.stats.discarded += 1;
            return;
        }

        let Some(layer) = self.find_or_create_layer(done.tile.zoom) else {
            return;
        };
        let Some(element) = self.find_or_create_canvas(done.tile, &layer) else {
            return;
        };
        if let Some(binding) = self.binding.as_mut() {
            binding.surfaces.paint_pixels(element, &image);
        }
        self.stats.painted += 1;

        self.remove_covered();
    }

    fn find_or_create_layer(&mut self, zoom: u8) -> Option<Layer> {
        if let Some(layer) = self.layers.iter().find(|layer| layer.zoom == zoom) {
            return Some(layer.clone());
        }

        let center = self.view?.bounds.center();
        let binding = self.binding.as_mut()?;
        let element = binding.surfaces.create_container();
        binding.surfaces.attach(element, binding.container);

        let position = layer_position(self.tile_size, zoom, center);
        let offset = layer_offset(self.tile_size, zoom, position, center);
        binding.surfaces.set_position(element, offset);

        let layer = Layer {
            zoom,
            position,
            offset,
            element,
        };
        debug!(zoom, x = position.x, y = position.y, "created layer");
        self.stats.layers_created += 1;
        self.layers.push(layer.clone());
        Some(layer)
    }

    fn find_or_create_canvas(&mut self, tile: Tile, layer: &Layer) -> Option<SurfaceId> {
        if let Some(canvas) = self.canvases.iter().find(|canvas| canvas.tile == tile) {
            return Some(canvas.element);
        }

        let binding = self.binding.as_mut()?;
        let element = binding.surfaces.create_surface(self.tile_size, self.tile_size);
        binding
            .surfaces
            .set_position(element, canvas_position(self.tile_size, tile, layer.position));
        binding.surfaces.attach(element, layer.element);
        self.canvases.push(Canvas { tile, element });
        Some(element)
    }

    /// Drops canvases at other zooms whose footprint is fully painted at the
    /// current zoom.
    fn remove_covered(&mut self) {
        let Some(view) = self.view else {
            return;
        };
        let painted: HashSet<Tile> = self
            .canvases
            .iter()
            .filter(|canvas| canvas.tile.zoom == view.zoom)
            .map(|canvas| canvas.tile)
            .collect();

        let (kept, removed): (Vec<Canvas>, Vec<Canvas>) = std::mem::take(&mut self.canvases)
            .into_iter()
            .partition(|canvas| {
                canvas.tile.zoom == view.zoom || !is_covered(canvas.tile, view.zoom, &painted)
            });
        self.canvases = kept;

        for canvas in removed {
            debug!(tile = %canvas.tile, zoom = view.zoom, "removing covered canvas");
            self.stats.removed_covered += 1;
            if let Some(binding) = self.binding.as_mut() {
                binding.surfaces.detach(canvas.element);
            }
        }
    }

    /// Re-anchors each layer on the tile now under the map center. Only the
    /// canvases of a layer that moved are repositioned.
    fn handle_idle(&mut self) {
        let Some(binding) = self.binding.as_mut() else {
            return;
        };
        let Some(bounds) = binding.map.bounds() else {
            debug!("map has no bounds yet, skipping reposition");
            return;
        };
        let center = bounds.center();

        for layer in &mut self.layers {
            let position = layer_position(self.tile_size, layer.zoom, center);
            let offset = layer_offset(self.tile_size, layer.zoom, position, center);
            if position == layer.position && offset == layer.offset {
                continue;
            }

            binding.surfaces.set_position(layer.element, offset);
            layer.position = position;
            layer.offset = offset;
            self.stats.layers_repositioned += 1;
            debug!(zoom = layer.zoom, x = position.x, y = position.y, "repositioned layer");

            for canvas in self.canvases.iter().filter(|c| c.tile.zoom == layer.zoom) {
                binding.surfaces.set_position(
                    canvas.element,
                    canvas_position(self.tile_size, canvas.tile, position),
                );
            }
        }
    }
}

/// Whether the tiles at `zoom` covering `tile` are all in `painted`.
fn is_covered(tile: Tile, zoom: u8, painted: &HashSet<Tile>) -> bool {
    if zoom > tile.zoom {
        // 4^shift descendants.
        let shift = u32::from(zoom - tile.zoom);
        if shift > MAX_COVERING_SHIFT || (1usize << (2 * shift)) > painted.len() {
            return false;
        }
    }
    tile.covering_tiles(zoom)
        .iter()
        .all(|covering| painted.contains(covering))
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use std::time::Duration;

    use compute::{RenderError, RenderFuture, Renderer};
    use foundation::{Point, Tile, tile_to_area};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use tokio::sync::Notify;

    use super::{BeginOptions, Orchestrator, is_covered};
    use crate::headless::{HeadlessMap, RecordingSurfaces};
    use crate::host::{Bounds, Surfaces};

    #[derive(Clone, Default)]
    struct TestRenderer {
        calls: Arc<Mutex<Vec<Tile>>>,
        gates: Arc<Mutex<HashMap<Tile, Arc<Notify>>>>,
        failing: Arc<Mutex<HashSet<Tile>>>,
    }

    impl TestRenderer {
        fn hold(&self, tile: Tile) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            self.gates.lock().insert(tile, gate.clone());
            gate
        }

        fn calls(&self) -> Vec<Tile> {
            self.calls.lock().clone()
        }
    }

    impl Renderer for TestRenderer {
        fn render_tile(&self, tile: Tile) -> RenderFuture {
            self.calls.lock().push(tile);
            let gate = self.gates.lock().get(&tile).cloned();
            let fail = self.failing.lock().contains(&tile);
            Box::pin(async move {
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                if fail {
                    return Err(RenderError::Remote("unavailable".into()));
                }
                Ok(vec![tile.zoom; 4].into())
            })
        }
    }

    /// Viewport well inside `tile`: only `tile` is visible at its zoom, and
    /// its four children one zoom in.
    fn bounds_inside(tile: Tile) -> Bounds {
        let area = tile_to_area(256, tile);
        let dx = (area.east() - area.west()) / 4.0;
        let dy = (area.north() - area.south()) / 4.0;
        Bounds::new(
            area.north() - dy,
            area.south() + dy,
            area.east() - dx,
            area.west() + dx,
        )
    }

    struct Harness {
        orchestrator: Orchestrator,
        map: HeadlessMap,
        surfaces: RecordingSurfaces,
        renderer: TestRenderer,
    }

    impl Harness {
        fn new(zoom: u8, bounds: Option<Bounds>) -> Self {
            let renderer = TestRenderer::default();
            Self {
                orchestrator: Orchestrator::new(256, Arc::new(renderer.clone())),
                map: HeadlessMap::new(zoom, bounds),
                surfaces: RecordingSurfaces::new(),
                renderer,
            }
        }

        fn begin(&mut self) {
            let mut surfaces = self.surfaces.clone();
            let container = surfaces.create_container();
            self.orchestrator.begin(BeginOptions {
                map: Arc::new(self.map.clone()),
                surfaces: Box::new(surfaces),
                container,
            });
        }

        /// Steps until nothing happens for a while.
        async fn settle(&mut self) {
            while let Ok(true) =
                tokio::time::timeout(Duration::from_secs(1), self.orchestrator.step()).await
            {}
        }

        fn canvas_tiles(&self) -> Vec<Tile> {
            let mut tiles: Vec<Tile> =
                self.orchestrator.canvases().iter().map(|c| c.tile).collect();
            tiles.sort();
            tiles
        }
    }

    /// Viewport over the 3x3 block of tiles centred on `tile`.
    fn bounds_around(tile: Tile) -> Bounds {
        let Tile { zoom, point } = tile;
        let north_west = bounds_inside(Tile::new(zoom, point.x - 1, point.y - 1));
        let south_east = bounds_inside(Tile::new(zoom, point.x + 1, point.y + 1));
        Bounds::new(
            north_west.north,
            south_east.south,
            south_east.east,
            north_west.west,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn paints_the_visible_tile_once() {
        let tile = Tile::new(13, 7395, 5026);
        let mut h = Harness::new(13, Some(bounds_inside(tile)));
        h.begin();
        h.settle().await;

        assert_eq!(h.canvas_tiles(), vec![tile]);
        assert_eq!(h.renderer.calls(), vec![tile]);
        let canvas = h.orchestrator.canvases()[0].element;
        assert_eq!(h.surfaces.pixels(canvas), Some(vec![13; 4]));
        assert_eq!(h.orchestrator.layers().len(), 1);
        assert_eq!(h.orchestrator.stats().painted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zooming_far_out_drops_fine_canvases_without_enumerating_them() {
        let fine = Tile::new(16, 59160, 40208);
        let mut h = Harness::new(16, Some(bounds_inside(fine)));
        h.begin();
        h.settle().await;
        assert_eq!(h.canvas_tiles(), vec![fine]);
        let fine_surface = h.orchestrator.canvases()[0].element;

        // Ancestor of `fine` at zoom 4 is (14, 9); this view stops at x = 11.
        let center = Tile::new(4, 10, 9);
        let started = std::time::Instant::now();
        h.map.set_view(4, Some(bounds_around(center)));
        h.settle().await;
        assert!(started.elapsed() < Duration::from_secs(1), "{:?}", started.elapsed());

        let mut expected: Vec<Tile> = (8..=10)
            .flat_map(|y| (9..=11).map(move |x| Tile::new(4, x, y)))
            .collect();
        expected.sort();
        assert_eq!(h.canvas_tiles(), expected);
        assert!(!h.surfaces.is_attached(fine_surface));
        assert_eq!(h.orchestrator.stats().removed_out_of_view, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_of_view_events_are_coalesced() {
        let tile = Tile::new(13, 7395, 5026);
        let mut h = Harness::new(13, Some(bounds_inside(tile)));
        h.begin();
        for _ in 0..10 {
            h.map.set_view(13, Some(bounds_inside(tile)));
        }
        h.settle().await;

        assert_eq!(h.renderer.calls(), vec![tile]);
        assert_eq!(h.orchestrator.stats().renders_requested, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn parent_is_removed_once_all_four_children_are_painted() {
        let parent = Tile::new(13, 7395, 5026);
        let bounds = bounds_inside(parent);
        let mut h = Harness::new(13, Some(bounds));
        h.begin();
        h.settle().await;
        assert_eq!(h.canvas_tiles(), vec![parent]);
        let parent_surface = h.orchestrator.canvases()[0].element;

        let children = parent.covering_tiles(14);
        let last = h.renderer.hold(children[3]);
        h.map.set_view(14, Some(bounds));
        h.settle().await;

        // Three children painted; the parent still fills the gap.
        let mut expected = vec![parent, children[0], children[1], children[2]];
        expected.sort();
        assert_eq!(h.canvas_tiles(), expected);
        assert!(h.surfaces.is_attached(parent_surface));

        last.notify_one();
        h.settle().await;

        let mut expected = children.clone();
        expected.sort();
        assert_eq!(h.canvas_tiles(), expected);
        assert!(!h.surfaces.is_attached(parent_surface));
        assert_eq!(h.orchestrator.stats().removed_covered, 1);
        assert_eq!(h.orchestrator.stats().removed_out_of_view, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zooming_out_removes_children_once_the_parent_is_painted() {
        let parent = Tile::new(13, 7395, 5026);
        let bounds = bounds_inside(parent);
        let mut h = Harness::new(14, Some(bounds));
        h.begin();
        h.settle().await;
        assert_eq!(h.canvas_tiles().len(), 4);

        h.map.set_view(13, Some(bounds));
        h.settle().await;
        assert_eq!(h.canvas_tiles(), vec![parent]);
        assert_eq!(h.orchestrator.stats().removed_covered, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn panning_away_removes_out_of_view_canvases() {
        let first = Tile::new(13, 7395, 5026);
        let second = Tile::new(13, 7400, 5026);
        let mut h = Harness::new(13, Some(bounds_inside(first)));
        h.begin();
        h.settle().await;
        let first_surface = h.orchestrator.canvases()[0].element;

        h.map.set_view(13, Some(bounds_inside(second)));
        h.settle().await;

        assert_eq!(h.canvas_tiles(), vec![second]);
        assert!(!h.surfaces.is_attached(first_surface));
        assert_eq!(h.orchestrator.stats().removed_out_of_view, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn late_render_for_a_tile_that_left_the_view_is_discarded() {
        let first = Tile::new(13, 7395, 5026);
        let second = Tile::new(13, 7400, 5026);
        let mut h = Harness::new(13, Some(bounds_inside(first)));
        let gate = h.renderer.hold(first);
        h.begin();
        h.settle().await;
        assert!(h.orchestrator.canvases().is_empty());

        h.map.set_view(13, Some(bounds_inside(second)));
        h.settle().await;
        gate.notify_one();
        h.settle().await;

        assert_eq!(h.canvas_tiles(), vec![second]);
        assert_eq!(h.orchestrator.stats().discarded, 1);
        assert_eq!(h.orchestrator.stats().painted, 1);
        assert_eq!(h.surfaces.canvas_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_render_is_not_painted_and_does_not_stop_the_loop() {
        let first = Tile::new(13, 7395, 5026);
        let second = Tile::new(13, 7400, 5026);
        let mut h = Harness::new(13, Some(bounds_inside(first)));
        h.renderer.failing.lock().insert(first);
        h.begin();
        h.settle().await;
        assert!(h.orchestrator.canvases().is_empty());
        assert_eq!(h.orchestrator.stats().failed, 1);

        h.map.set_view(13, Some(bounds_inside(second)));
        h.settle().await;
        assert_eq!(h.canvas_tiles(), vec![second]);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_bounds_skip_the_update() {
        let tile = Tile::new(13, 7395, 5026);
        let mut h = Harness::new(13, None);
        h.begin();
        h.settle().await;
        assert!(h.renderer.calls().is_empty());
        assert!(h.orchestrator.visible_tiles().is_empty());

        h.map.idle();
        h.settle().await;
        assert!(h.orchestrator.is_bound());

        h.map.set_view(13, Some(bounds_inside(tile)));
        h.settle().await;
        assert_eq!(h.canvas_tiles(), vec![tile]);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_reanchors_the_layer_and_its_canvases() {
        let first = Tile::new(13, 7395, 5026);
        let second = Tile::new(13, 7396, 5026);
        let mut h = Harness::new(13, Some(bounds_inside(first)));
        h.begin();
        h.settle().await;
        let layer = h.orchestrator.layers()[0].clone();
        assert_eq!(layer.position, first.point);

        h.map.set_view(13, Some(bounds_inside(second)));
        h.settle().await;
        let canvas = h.orchestrator.canvases()[0].clone();
        assert_eq!(canvas.tile, second);
        assert_eq!(h.surfaces.position(canvas.element), Some(Point::new(256.0, 0.0)));

        h.map.idle();
        h.settle().await;

        let moved = &h.orchestrator.layers()[0];
        assert_eq!(moved.element, layer.element);
        assert_eq!(moved.position, second.point);
        assert_eq!(h.surfaces.position(moved.element), Some(moved.offset));
        assert_eq!(h.surfaces.position(canvas.element), Some(Point::new(0.0, 0.0)));
        assert_eq!(h.orchestrator.stats().layers_repositioned, 1);
        assert_eq!(h.orchestrator.stats().layers_created, 1);

        // Settled and unchanged: nothing moves.
        h.map.idle();
        h.settle().await;
        assert_eq!(h.orchestrator.stats().layers_repositioned, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_detaches_everything_and_allows_a_fresh_begin() {
        let tile = Tile::new(13, 7395, 5026);
        let mut h = Harness::new(13, Some(bounds_inside(tile)));
        h.begin();
        h.settle().await;
        assert_eq!(h.map.listener_count(), 1);
        assert_eq!(h.surfaces.canvas_count(), 1);

        assert!(h.orchestrator.reset().is_some());
        assert!(h.orchestrator.canvases().is_empty());
        assert!(h.orchestrator.layers().is_empty());
        assert_eq!(h.surfaces.canvas_count(), 0);
        assert_eq!(h.surfaces.container_count(), 1);
        assert_eq!(h.map.listener_count(), 0);
        assert!(!h.orchestrator.step().await);

        h.begin();
        h.settle().await;
        assert_eq!(h.canvas_tiles(), vec![tile]);
        assert_eq!(h.renderer.calls(), vec![tile, tile]);
    }

    #[tokio::test(start_paused = true)]
    async fn renders_from_before_a_reset_are_ignored() {
        let tile = Tile::new(13, 7395, 5026);
        let mut h = Harness::new(13, Some(bounds_inside(tile)));
        let gate = h.renderer.hold(tile);
        h.begin();
        h.settle().await;
        h.orchestrator.reset();

        h.renderer.gates.lock().clear();
        h.begin();
        h.settle().await;
        gate.notify_one();
        h.settle().await;

        assert_eq!(h.canvas_tiles(), vec![tile]);
        assert_eq!(h.orchestrator.stats().painted, 1);
        assert_eq!(h.orchestrator.stats().discarded, 0);
    }

    #[test]
    fn coverage_needs_every_descendant() {
        let parent = Tile::new(5, 3, 4);
        let mut painted: HashSet<Tile> = parent.covering_tiles(6).into_iter().take(3).collect();
        assert!(!is_covered(parent, 6, &painted));
        painted.extend(parent.covering_tiles(6));
        assert!(is_covered(parent, 6, &painted));
        assert!(!is_covered(parent, 7, &painted));
        assert!(!is_covered(parent, 30, &painted));

        let child = Tile::new(6, 7, 9);
        assert!(!is_covered(child, 5, &HashSet::new()));
        assert!(is_covered(child, 5, &HashSet::from([parent])));
    }
}
