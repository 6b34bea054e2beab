//! Recording surface and observer.

use std::sync::{Arc, Mutex, PoisonError};

use sketchbox::host::{DiagnosticPanel, HostEvent, HostObserver, Surface};
use sketchbox::model::RunState;

#[derive(Debug, Default)]
struct SurfaceLog {
    placeholders: usize,
    clears: usize,
    diagnostics: Vec<DiagnosticPanel>,
    /// `None` while cleared or showing the placeholder.
    showing: Option<DiagnosticPanel>,
}

/// Surface that remembers what the host asked it to show. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct RecordingSurface {
    log: Arc<Mutex<SurfaceLog>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut SurfaceLog) -> T) -> T {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut log)
    }

    pub fn placeholders(&self) -> usize {
        self.with(|log| log.placeholders)
    }

    pub fn clears(&self) -> usize {
        self.with(|log| log.clears)
    }

    /// Every panel shown, oldest first.
    pub fn diagnostics(&self) -> Vec<DiagnosticPanel> {
        self.with(|log| log.diagnostics.clone())
    }

    /// The panel currently on screen.
    pub fn showing(&self) -> Option<DiagnosticPanel> {
        self.with(|log| log.showing.clone())
    }
}

impl Surface for RecordingSurface {
    fn show_placeholder(&mut self) {
        self.with(|log| {
            log.placeholders += 1;
            log.showing = None;
        });
    }

    fn show_diagnostic(&mut self, panel: &DiagnosticPanel) {
        self.with(|log| {
            log.diagnostics.push(panel.clone());
            log.showing = Some(panel.clone());
        });
    }

    fn clear(&mut self) {
        self.with(|log| {
            log.clears += 1;
            log.showing = None;
        });
    }
}

/// Observer that keeps every [`HostEvent`]. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct CollectingObserver {
    events: Arc<Mutex<Vec<HostEvent>>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// States entered, in order.
    pub fn states(&self) -> Vec<RunState> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HostEvent::StateChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&HostEvent) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }
}

impl HostObserver for CollectingObserver {
    fn on_event(&self, event: &HostEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
