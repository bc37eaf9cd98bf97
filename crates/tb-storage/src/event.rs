//! Event categories accepted by the writer and their per-category mappers.

use std::sync::Arc;

use tb_common::Telemetry;
use tracing::trace;

/// An encoded event tagged with its category.
///
/// Payloads are opaque; the pipeline never looks inside them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Log(Vec<u8>),
    Span(Vec<u8>),
    Rum(Vec<u8>),
    /// Session replay record. All records of one view go to the same file.
    SessionReplay { view_id: String, payload: Vec<u8> },
    WebView(Vec<u8>),
    /// A category this build does not know how to handle.
    Unknown { kind: String, payload: Vec<u8> },
}

impl Event {
    pub fn kind(&self) -> &str {
        match self {
            Event::Log(_) => "log",
            Event::Span(_) => "span",
            Event::Rum(_) => "rum",
            Event::SessionReplay { .. } => "session_replay",
            Event::WebView(_) => "web_view",
            Event::Unknown { kind, .. } => kind,
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            Event::Log(p) | Event::Span(p) | Event::Rum(p) | Event::WebView(p) => p,
            Event::SessionReplay { payload, .. } | Event::Unknown { payload, .. } => payload,
        }
    }

    /// Key forcing a new batch file whenever it changes.
    pub fn group_key(&self) -> Option<&str> {
        match self {
            Event::SessionReplay { view_id, .. } => Some(view_id),
            _ => None,
        }
    }
}

/// Payload transformation; `None` drops the event.
pub type MapFn = Arc<dyn Fn(Vec<u8>) -> Option<Vec<u8>> + Send + Sync>;

/// Event ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedEvent {
    pub payload: Vec<u8>,
    pub group_key: Option<String>,
}

/// One optional mapper per known category, applied before writing.
#[derive(Clone, Default)]
pub struct EventMapper {
    log: Option<MapFn>,
    span: Option<MapFn>,
    rum: Option<MapFn>,
    session_replay: Option<MapFn>,
    web_view: Option<MapFn>,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_mapper(mut self, f: impl Fn(Vec<u8>) -> Option<Vec<u8>> + Send + Sync + 'static) -> Self {
        self.log = Some(Arc::new(f));
        self
    }

    pub fn with_span_mapper(mut self, f: impl Fn(Vec<u8>) -> Option<Vec<u8>> + Send + Sync + 'static) -> Self {
        self.span = Some(Arc::new(f));
        self
    }

    pub fn with_rum_mapper(mut self, f: impl Fn(Vec<u8>) -> Option<Vec<u8>> + Send + Sync + 'static) -> Self {
        self.rum = Some(Arc::new(f));
        self
    }

    pub fn with_session_replay_mapper(
        mut self,
        f: impl Fn(Vec<u8>) -> Option<Vec<u8>> + Send + Sync + 'static,
    ) -> Self {
        self.session_replay = Some(Arc::new(f));
        self
    }

    pub fn with_web_view_mapper(
        mut self,
        f: impl Fn(Vec<u8>) -> Option<Vec<u8>> + Send + Sync + 'static,
    ) -> Self {
        self.web_view = Some(Arc::new(f));
        self
    }

    /// Apply the mapper of the event's category.
    ///
    /// Returns `None` when the mapper dropped the event or the category is
    /// unknown; the latter is reported to `telemetry`.
    pub fn map(&self, event: Event, telemetry: &dyn Telemetry) -> Option<MappedEvent> {
        let (mapper, payload, group_key) = match event {
            Event::Log(p) => (&self.log, p, None),
            Event::Span(p) => (&self.span, p, None),
            Event::Rum(p) => (&self.rum, p, None),
            Event::SessionReplay { view_id, payload } => {
                (&self.session_replay, payload, Some(view_id))
            }
            Event::WebView(p) => (&self.web_view, p, None),
            Event::Unknown { kind, .. } => {
                telemetry.error(
                    &format!("Dropping event of unsupported kind '{}'", kind),
                    None,
                );
                return None;
            }
        };

        let payload = match mapper {
            Some(f) => match f(payload) {
                Some(mapped) => mapped,
                None => {
                    trace!(target: "tb_storage", "event dropped by mapper");
                    return None;
                }
            },
            None => payload,
        };
        Some(MappedEvent { payload, group_key })
    }
}

impl std::fmt::Debug for EventMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventMapper")
            .field("log", &self.log.is_some())
            .field("span", &self.span.is_some())
            .field("rum", &self.rum.is_some())
            .field("session_replay", &self.session_replay.is_some())
            .field("web_view", &self.web_view.is_some())
            .finish()
    }
}
