//! In-process map host and surface recorder, for tests and demos without a
//! real map widget.

use std::collections::BTreeMap;
use std::sync::Arc;

use foundation::Point;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use crate::host::{Bounds, MapEvent, MapHost, Subscription, SurfaceId, Surfaces};

#[derive(Default)]
struct MapState {
    zoom: u8,
    bounds: Option<Bounds>,
    listeners: BTreeMap<u64, UnboundedSender<MapEvent>>,
    next_listener: u64,
}

/// A map whose view is moved by hand. Clones share state.
#[derive(Clone, Default)]
pub struct HeadlessMap {
    state: Arc<Mutex<MapState>>,
}

impl HeadlessMap {
    pub fn new(zoom: u8, bounds: Option<Bounds>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MapState {
                zoom,
                bounds,
                ..MapState::default()
            })),
        }
    }

    /// Moves the view and notifies listeners like a pan or zoom would.
    pub fn set_view(&self, zoom: u8, bounds: Option<Bounds>) {
        let zoom_changed = {
            let mut state = self.state.lock();
            let changed = state.zoom != zoom;
            state.zoom = zoom;
            state.bounds = bounds;
            changed
        };
        if zoom_changed {
            self.emit(MapEvent::ZoomChanged);
        }
        self.emit(MapEvent::BoundsChanged);
    }

    /// Signals that the viewport settled.
    pub fn idle(&self) {
        self.emit(MapEvent::Idle);
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    fn emit(&self, event: MapEvent) {
        let state = self.state.lock();
        for listener in state.listeners.values() {
            let _ = listener.send(event);
        }
    }
}

impl MapHost for HeadlessMap {
    fn zoom(&self) -> u8 {
        self.state.lock().zoom
    }

    fn bounds(&self) -> Option<Bounds> {
        self.state.lock().bounds
    }

    fn subscribe(&self, events: UnboundedSender<MapEvent>) -> Subscription {
        let id = {
            let mut state = self.state.lock();
            let id = state.next_listener;
            state.next_listener += 1;
            state.listeners.insert(id, events);
            id
        };
        let state = self.state.clone();
        Subscription::new(move || {
            state.lock().listeners.remove(&id);
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SurfaceKind {
    Container,
    Canvas { width: u32, height: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceRecord {
    pub kind: SurfaceKind,
    pub parent: Option<SurfaceId>,
    pub position: Point,
    pub pixels: Option<Vec<u8>>,
}

#[derive(Default)]
struct SurfaceLog {
    surfaces: BTreeMap<SurfaceId, SurfaceRecord>,
    next_id: u64,
}

/// Keeps every live surface in memory. Clones share the same log, so a test
/// can hand one to the orchestrator and inspect the other.
#[derive(Clone, Default)]
pub struct RecordingSurfaces {
    log: Arc<Mutex<SurfaceLog>>,
}

impl RecordingSurfaces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, surface: SurfaceId) -> Option<SurfaceRecord> {
        self.log.lock().surfaces.get(&surface).cloned()
    }

    pub fn is_attached(&self, surface: SurfaceId) -> bool {
        self.log
            .lock()
            .surfaces
            .get(&surface)
            .is_some_and(|record| record.parent.is_some())
    }

    pub fn position(&self, surface: SurfaceId) -> Option<Point> {
        self.record(surface).map(|record| record.position)
    }

    pub fn pixels(&self, surface: SurfaceId) -> Option<Vec<u8>> {
        self.record(surface).and_then(|record| record.pixels)
    }

    pub fn children(&self, parent: SurfaceId) -> Vec<SurfaceId> {
        self.log
            .lock()
            .surfaces
            .iter()
            .filter(|(_, record)| record.parent == Some(parent))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Live canvases.
    pub fn canvas_count(&self) -> usize {
        self.count(|kind| matches!(kind, SurfaceKind::Canvas { .. }))
    }

    /// Live containers.
    pub fn container_count(&self) -> usize {
        self.count(|kind| matches!(kind, SurfaceKind::Container))
    }

    fn count(&self, matches: impl Fn(&SurfaceKind) -> bool) -> usize {
        self.log
            .lock()
            .surfaces
            .values()
            .filter(|record| matches(&record.kind))
            .count()
    }

    fn create(&mut self, kind: SurfaceKind) -> SurfaceId {
        let mut log = self.log.lock();
        let id = SurfaceId(log.next_id);
        log.next_id += 1;
        log.surfaces.insert(
            id,
            SurfaceRecord {
                kind,
                parent: None,
                position: Point::default(),
                pixels: None,
            },
        );
        id
    }

    fn update(&mut self, surface: SurfaceId, apply: impl FnOnce(&mut SurfaceRecord)) {
        if let Some(record) = self.log.lock().surfaces.get_mut(&surface) {
            apply(record);
        }
    }
}

impl Surfaces for RecordingSurfaces {
    fn create_container(&mut self) -> SurfaceId {
        self.create(SurfaceKind::Container)
    }

    fn create_surface(&mut self, width: u32, height: u32) -> SurfaceId {
        self.create(SurfaceKind::Canvas { width, height })
    }

    fn paint_pixels(&mut self, surface: SurfaceId, rgba: &[u8]) {
        self.update(surface, |record| record.pixels = Some(rgba.to_vec()));
    }

    fn attach(&mut self, child: SurfaceId, parent: SurfaceId) {
        self.update(child, |record| record.parent = Some(parent));
    }

    fn detach(&mut self, surface: SurfaceId) {
        self.log.lock().surfaces.remove(&surface);
    }

    fn set_position(&mut self, surface: SurfaceId, position: Point) {
        self.update(surface, |record| record.position = position);
    }
}
