// src/stream/session.rs
//
// Session controller: owns the one frame channel, the displayed frame and
// the detection state that the overlay is drawn from.
//
// Lifecycle:
//
//   Idle ──start──▶ Streaming ──stop / Closed / Errored──▶ Stopped
//                      ▲                                      │
//                      └────────────────start─────────────────┘
//
// Every start retires the previous session id before opening a new channel.
// Channel events carry the id they were opened with; events for a retired id
// are counted and dropped.

use image::ImageReader;
use std::io::Cursor;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::channel::{ChannelEvent, ChannelHandle, EventSink, FrameTransport, SessionId, TaggedEvent};
use super::metrics::StreamMetrics;
use super::notices::{Notice, NoticeBoard, NoticeKind};
use super::protocol::{decode_text, ServerMessage, StreamSource};
use crate::error::{describe, SessionError};
use crate::overlay::{compose, FrameGeometry, Overlay, OverlayRenderer};
use crate::snapshot::{DetectionSnapshot, RecordingHandle, VehicleLedger};
use crate::types::Size;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Streaming,
    Stopped,
}

impl SessionStatus {
    /// Transition on a channel event. Starting and stopping are driven by the
    /// controller's own operations, not by events.
    pub fn on_event(self, event: &ChannelEvent) -> Self {
        match (self, event) {
            (SessionStatus::Streaming, ChannelEvent::Closed | ChannelEvent::Errored(_)) => {
                SessionStatus::Stopped
            }
            (status, _) => status,
        }
    }
}

pub struct SessionState {
    pub source: Option<StreamSource>,
    pub status: SessionStatus,
    pub channel: Option<Box<dyn ChannelHandle>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            source: None,
            status: SessionStatus::Idle,
            channel: None,
        }
    }
}

/// The frame currently on screen. Replaced wholesale by the next one.
#[derive(Debug, Clone)]
pub struct DisplayedFrame {
    pub bytes: Vec<u8>,
    pub natural: Size,
    pub displayed: Size,
    pub sequence: u64,
    pub received_at: Instant,
}

#[derive(Default)]
struct ViewState {
    snapshot: Option<DetectionSnapshot>,
    frame: Option<DisplayedFrame>,
    recording: Option<RecordingHandle>,
    ledger: VehicleLedger,
    frames_seen: u64,
}

pub struct SessionController<T: FrameTransport> {
    transport: T,
    sink: EventSink,
    state: SessionState,
    active: Option<SessionId>,
    next_session: u64,
    viewport: Option<Size>,
    view: ViewState,
    renderer: OverlayRenderer,
    metrics: StreamMetrics,
    notices: NoticeBoard,
}

impl<T: FrameTransport> SessionController<T> {
    pub fn new(transport: T, sink: EventSink, renderer: OverlayRenderer) -> Self {
        Self {
            transport,
            sink,
            state: SessionState::default(),
            active: None,
            next_session: 0,
            viewport: None,
            view: ViewState::default(),
            renderer,
            metrics: StreamMetrics::new(),
            notices: NoticeBoard::new(64),
        }
    }

    pub fn with_notice_capacity(mut self, capacity: usize) -> Self {
        self.notices = NoticeBoard::new(capacity);
        self
    }

    // ========================================================================
    // OPERATIONS
    // ========================================================================

    pub fn start_from_source(&mut self, path: &str) -> Result<SessionId, SessionError> {
        if path.trim().is_empty() {
            return Err(SessionError::EmptySource);
        }
        Ok(self.start(StreamSource::File(path.to_string())))
    }

    pub fn start_from_live_camera(&mut self) -> SessionId {
        self.start(StreamSource::LiveCamera)
    }

    pub fn start(&mut self, source: StreamSource) -> SessionId {
        // old channel is closed before the new transport exists
        self.retire_session();
        self.view.snapshot = None;
        self.view.recording = None;
        self.view.ledger.clear();
        self.view.frames_seen = 0;

        self.next_session += 1;
        let session = SessionId(self.next_session);
        info!("▶️  Starting session {} from {}", session, source);

        let channel = self.transport.open(&source, session, self.sink.clone());
        self.state = SessionState {
            source: Some(source),
            status: SessionStatus::Streaming,
            channel: Some(channel),
        };
        self.active = Some(session);
        self.metrics.inc(&self.metrics.sessions_started);
        session
    }

    /// Safe to call at any time. A controller that never started stays Idle.
    pub fn stop(&mut self) {
        if let Some(session) = self.active {
            info!("⏹️  Stopping session {}", session);
        }
        self.retire_session();
        if self.state.status == SessionStatus::Streaming {
            self.state.status = SessionStatus::Stopped;
        }
    }

    pub fn handle_event(&mut self, tagged: TaggedEvent) {
        if self.active != Some(tagged.session) {
            self.metrics.inc(&self.metrics.stale_events_dropped);
            debug!(
                "Dropping {} from retired session {}",
                event_name(&tagged.event),
                tagged.session
            );
            return;
        }

        let next = self.state.status.on_event(&tagged.event);
        match tagged.event {
            ChannelEvent::Opened => debug!("Session {} streaming", tagged.session),
            ChannelEvent::TextMessage(text) => self.on_text(&text),
            ChannelEvent::BinaryMessage(bytes) => self.on_frame_image(bytes),
            ChannelEvent::Closed => {
                info!("Session {} channel closed", tagged.session);
                self.retire_session();
            }
            ChannelEvent::Errored(reason) => {
                warn!("⚠️  Session {} channel error: {}", tagged.session, reason);
                self.notices
                    .publish(NoticeKind::Transport, format!("Connection error: {}", reason));
                self.retire_session();
            }
        }
        self.state.status = next;
    }

    pub fn on_frame_image(&mut self, bytes: Vec<u8>) {
        if self.active.is_none() {
            self.metrics.inc(&self.metrics.stale_events_dropped);
            return;
        }

        let natural = match probe_dimensions(&bytes) {
            Ok(size) => size,
            Err(e) => {
                self.metrics.inc(&self.metrics.frame_decode_failures);
                warn!("Dropping undecodable frame ({} bytes): {}", bytes.len(), e);
                self.notices
                    .publish(NoticeKind::FrameDecode, format!("Undecodable frame: {}", e));
                return;
            }
        };
        let displayed = self.viewport.unwrap_or(natural);
        let geometry_changed = self
            .view
            .frame
            .as_ref()
            .map_or(true, |f| f.natural != natural || f.displayed != displayed);

        self.view.frames_seen += 1;
        // previous buffer is dropped here
        self.view.frame = Some(DisplayedFrame {
            bytes,
            natural,
            displayed,
            sequence: self.view.frames_seen,
            received_at: Instant::now(),
        });
        self.metrics.inc(&self.metrics.frames_received);

        if geometry_changed {
            debug!("Display geometry now {} (natural {})", displayed, natural);
            self.render();
        }
    }

    pub fn on_metadata_update(&mut self, snapshot: DetectionSnapshot) {
        if self.active.is_none() {
            self.metrics.inc(&self.metrics.stale_events_dropped);
            return;
        }

        self.check_counters(&snapshot);
        if let Some(handle) = snapshot.recording_handle() {
            if self.view.recording.as_ref() != Some(&handle) {
                info!("💾 Recording available as {}", handle);
            }
            self.view.recording = Some(handle);
        }
        if let Some(states) = &snapshot.vehicle_states {
            self.view.ledger.merge(states);
        }

        self.view.snapshot = Some(snapshot);
        self.metrics.inc(&self.metrics.metadata_updates);
        self.render();
    }

    /// Changes the display size and redraws the overlay to match. `None`
    /// shows frames at their natural size.
    pub fn set_viewport(&mut self, viewport: Option<Size>) {
        self.viewport = viewport;
        if let Some(frame) = self.view.frame.as_mut() {
            let displayed = viewport.unwrap_or(frame.natural);
            if displayed != frame.displayed {
                frame.displayed = displayed;
                self.render();
            }
        }
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn status(&self) -> SessionStatus {
        self.state.status
    }

    pub fn source(&self) -> Option<&StreamSource> {
        self.state.source.as_ref()
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.active
    }

    pub fn has_open_channel(&self) -> bool {
        self.state.channel.as_ref().is_some_and(|c| c.is_open())
    }

    pub fn snapshot(&self) -> Option<&DetectionSnapshot> {
        self.view.snapshot.as_ref()
    }

    pub fn displayed_frame(&self) -> Option<&DisplayedFrame> {
        self.view.frame.as_ref()
    }

    /// Survives the end of the session so the recording can still be fetched.
    pub fn recording_handle(&self) -> Option<&RecordingHandle> {
        self.view.recording.as_ref()
    }

    pub fn ledger(&self) -> &VehicleLedger {
        &self.view.ledger
    }

    pub fn red_light_violators(&self) -> Vec<String> {
        self.view.ledger.red_light_violators()
    }

    pub fn overlay(&self) -> &Overlay {
        self.renderer.overlay()
    }

    pub fn metrics(&self) -> &StreamMetrics {
        &self.metrics
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain()
    }

    /// Current frame with the overlay blended on top.
    pub fn compose_preview(&self) -> Option<anyhow::Result<image::RgbaImage>> {
        self.view
            .frame
            .as_ref()
            .map(|frame| compose(&frame.bytes, self.renderer.overlay()))
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn on_text(&mut self, text: &str) {
        match decode_text(text) {
            Ok(ServerMessage::FrameData(snapshot)) => self.on_metadata_update(snapshot),
            Ok(ServerMessage::ServerError(message)) => {
                self.metrics.inc(&self.metrics.server_errors);
                warn!("Backend rejected the stream: {}", message);
                self.notices.publish(NoticeKind::ServerError, message);
            }
            Ok(ServerMessage::Unrecognized(kind)) => {
                self.metrics.inc(&self.metrics.ignored_messages);
                debug!("Ignoring text message with type {:?}", kind);
            }
            Err(e) => {
                self.metrics.inc(&self.metrics.malformed_messages);
                let reason = describe(e);
                warn!("Dropping malformed metadata: {}", reason);
                self.notices.publish(NoticeKind::MalformedMetadata, reason);
            }
        }
    }

    fn check_counters(&self, incoming: &DetectionSnapshot) {
        let Some(previous) = &self.view.snapshot else {
            return;
        };
        let counters = [
            ("total_crossings", previous.total_crossings, incoming.total_crossings),
            (
                "red_light_violations",
                previous.red_light_violations,
                incoming.red_light_violations,
            ),
        ];
        for (name, before, after) in counters {
            if let (Some(before), Some(after)) = (before, after) {
                if after < before {
                    self.metrics.inc(&self.metrics.counter_regressions);
                    warn!("{} went backwards: {} -> {}", name, before, after);
                }
            }
        }
    }

    fn render(&mut self) {
        let Some(frame) = &self.view.frame else {
            return;
        };
        let empty = DetectionSnapshot::default();
        let snapshot = self.view.snapshot.as_ref().unwrap_or(&empty);
        self.renderer.render(
            snapshot,
            FrameGeometry {
                displayed: frame.displayed,
                natural: frame.natural,
            },
        );
        self.metrics.inc(&self.metrics.overlay_renders);
    }

    /// Closes the channel, forgets the session id and releases the frame
    /// together with the overlay drawn for it.
    fn retire_session(&mut self) {
        if let Some(mut channel) = self.state.channel.take() {
            channel.close();
        }
        self.active = None;
        self.view.frame = None;
        self.renderer.release();
    }
}

fn probe_dimensions(bytes: &[u8]) -> image::ImageResult<Size> {
    let (width, height) = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()?;
    Ok(Size::new(width, height))
}

fn event_name(event: &ChannelEvent) -> &'static str {
    match event {
        ChannelEvent::Opened => "Opened",
        ChannelEvent::TextMessage(_) => "TextMessage",
        ChannelEvent::BinaryMessage(_) => "BinaryMessage",
        ChannelEvent::Closed => "Closed",
        ChannelEvent::Errored(_) => "Errored",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::coords::ScreenRect;
    use crate::stream::channel::event_queue;
    use image::{ImageFormat, RgbaImage};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct OpenedChannel {
        source: StreamSource,
        session: SessionId,
        open: Arc<AtomicBool>,
    }

    #[derive(Clone, Default)]
    struct MockTransport {
        opened: Arc<Mutex<Vec<OpenedChannel>>>,
    }

    impl MockTransport {
        fn channels(&self) -> Vec<OpenedChannel> {
            self.opened.lock().unwrap().clone()
        }

        fn open_count(&self) -> usize {
            self.channels()
                .iter()
                .filter(|c| c.open.load(Ordering::SeqCst))
                .count()
        }
    }

    struct MockHandle(Arc<AtomicBool>);

    impl ChannelHandle for MockHandle {
        fn close(&mut self) {
            self.0.store(false, Ordering::SeqCst);
        }

        fn is_open(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl FrameTransport for MockTransport {
        fn open(
            &self,
            source: &StreamSource,
            session: SessionId,
            _sink: EventSink,
        ) -> Box<dyn ChannelHandle> {
            let open = Arc::new(AtomicBool::new(true));
            self.opened.lock().unwrap().push(OpenedChannel {
                source: source.clone(),
                session,
                open: open.clone(),
            });
            Box::new(MockHandle(open))
        }
    }

    fn controller() -> (SessionController<MockTransport>, MockTransport) {
        let transport = MockTransport::default();
        let (sink, _events) = event_queue();
        let controller = SessionController::new(transport.clone(), sink, OverlayRenderer::new());
        (controller, transport)
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        RgbaImage::new(width, height)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn tagged(session: SessionId, event: ChannelEvent) -> TaggedEvent {
        TaggedEvent { session, event }
    }

    fn frame_data(data: &str) -> ChannelEvent {
        ChannelEvent::TextMessage(format!(r#"{{"type":"frame_data","data":{}}}"#, data))
    }

    #[test]
    fn test_stop_before_start_stays_idle() {
        let (mut session, transport) = controller();
        session.stop();
        session.stop();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(transport.channels().is_empty());
    }

    #[test]
    fn test_empty_source_rejected_without_side_effects() {
        let (mut session, transport) = controller();
        assert_eq!(session.start_from_source(""), Err(SessionError::EmptySource));
        assert_eq!(session.start_from_source("   "), Err(SessionError::EmptySource));
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(transport.channels().is_empty());
    }

    #[test]
    fn test_restart_keeps_single_channel() {
        let (mut session, transport) = controller();
        let first = session.start_from_source("videos/p1.mp4").unwrap();
        let second = session.start_from_source("videos/p2.mp4").unwrap();
        assert_ne!(first, second);

        let channels = transport.channels();
        assert_eq!(channels.len(), 2);
        assert!(!channels[0].open.load(Ordering::SeqCst));
        assert!(channels[1].open.load(Ordering::SeqCst));
        assert_eq!(channels[1].source, StreamSource::File("videos/p2.mp4".to_string()));
        assert_eq!(channels[1].session, second);
        assert_eq!(transport.open_count(), 1);
        assert_eq!(session.status(), SessionStatus::Streaming);
        assert!(session.has_open_channel());
    }

    #[test]
    fn test_live_camera_uses_sentinel() {
        let (mut session, transport) = controller();
        session.start_from_live_camera();
        let channels = transport.channels();
        assert_eq!(channels[0].source, StreamSource::LiveCamera);
        assert_eq!(channels[0].source.control_value(), "0");
    }

    #[test]
    fn test_source_path_sent_as_given() {
        let (mut session, transport) = controller();
        session.start_from_source(" uploaded_videos/clip one.mp4 ").unwrap();
        assert_eq!(
            transport.channels()[0].source,
            StreamSource::File(" uploaded_videos/clip one.mp4 ".to_string())
        );
    }

    #[test]
    fn test_state_machine_transitions() {
        use SessionStatus::*;
        assert_eq!(Streaming.on_event(&ChannelEvent::Opened), Streaming);
        assert_eq!(Streaming.on_event(&ChannelEvent::BinaryMessage(vec![])), Streaming);
        assert_eq!(Streaming.on_event(&ChannelEvent::Closed), Stopped);
        assert_eq!(Streaming.on_event(&ChannelEvent::Errored("reset".into())), Stopped);
        assert_eq!(Idle.on_event(&ChannelEvent::Closed), Idle);
        assert_eq!(Stopped.on_event(&ChannelEvent::TextMessage("{}".into())), Stopped);
    }

    #[test]
    fn test_error_stops_session_and_publishes_notice() {
        let (mut session, transport) = controller();
        let id = session.start_from_live_camera();
        session.handle_event(tagged(id, ChannelEvent::Opened));
        session.handle_event(tagged(id, ChannelEvent::Errored("connection reset".into())));

        assert_eq!(session.status(), SessionStatus::Stopped);
        assert_eq!(transport.open_count(), 0);
        let notices = session.drain_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::Transport);

        // restart from Stopped
        session.start_from_source("videos/again.mp4").unwrap();
        assert_eq!(session.status(), SessionStatus::Streaming);
    }

    #[test]
    fn test_clean_close_stops_session() {
        let (mut session, _) = controller();
        let id = session.start_from_source("videos/a.mp4").unwrap();
        session.handle_event(tagged(id, ChannelEvent::Closed));
        assert_eq!(session.status(), SessionStatus::Stopped);
        assert!(!session.has_open_channel());
    }

    #[test]
    fn test_frame_then_metadata_renders_scaled_overlay() {
        let (mut session, _) = controller();
        session.set_viewport(Some(Size::new(200, 200)));
        let id = session.start_from_source("videos/a.mp4").unwrap();

        session.handle_event(tagged(id, ChannelEvent::BinaryMessage(png(100, 100))));
        session.handle_event(tagged(
            id,
            frame_data(
                r#"{"vehicles":[{"bbox":[0,0,10,10],"label":"car","id":"1"}],"frame_width":100,"frame_height":100}"#,
            ),
        ));

        let overlay = session.overlay();
        assert_eq!(overlay.size(), Size::new(200, 200));
        let rects: Vec<_> = overlay.rects().map(|(r, _)| r).collect();
        assert_eq!(rects, vec![ScreenRect::new(0.0, 0.0, 20.0, 20.0)]);
        assert_eq!(overlay.labels().collect::<Vec<_>>(), vec!["car (1)"]);

        let frame = session.displayed_frame().unwrap();
        assert_eq!(frame.natural, Size::new(100, 100));
        assert_eq!(frame.displayed, Size::new(200, 200));
    }

    #[test]
    fn test_session_end_releases_overlay() {
        let (mut session, _) = controller();
        let id = session.start_from_live_camera();
        session.handle_event(tagged(id, ChannelEvent::BinaryMessage(png(40, 30))));
        session.handle_event(tagged(id, frame_data(r#"{"crosswalk_bbox":[0,0,20,5]}"#)));
        assert_eq!(session.overlay().primitives().len(), 2);

        session.handle_event(tagged(id, ChannelEvent::Closed));
        assert!(session.overlay().primitives().is_empty());
        assert!(session.overlay().size().is_empty());
        assert_eq!(session.overlay().surface().dimensions(), (0, 0));
        // snapshot outlives the session, the drawing does not
        assert!(session.snapshot().is_some());

        let id = session.start_from_live_camera();
        session.handle_event(tagged(id, ChannelEvent::BinaryMessage(png(40, 30))));
        session.handle_event(tagged(id, frame_data(r#"{"crosswalk_bbox":[0,0,20,5]}"#)));
        session.stop();
        assert!(session.overlay().primitives().is_empty());
    }

    #[test]
    fn test_metadata_before_first_frame_is_drawn_when_frame_arrives() {
        let (mut session, _) = controller();
        let id = session.start_from_live_camera();
        session.handle_event(tagged(
            id,
            frame_data(r#"{"crosswalk_bbox":[0,0,32,8]}"#),
        ));
        assert!(session.overlay().primitives().is_empty());

        session.handle_event(tagged(id, ChannelEvent::BinaryMessage(png(64, 48))));
        assert_eq!(session.overlay().size(), Size::new(64, 48));
        assert_eq!(
            session.overlay().labels().collect::<Vec<_>>(),
            vec!["Crosswalk"]
        );
    }

    #[test]
    fn test_missing_type_ignored() {
        let (mut session, _) = controller();
        let id = session.start_from_source("videos/a.mp4").unwrap();
        session.handle_event(tagged(id, frame_data(r#"{"total_crossings":3}"#)));
        session.handle_event(tagged(
            id,
            ChannelEvent::TextMessage(r#"{"data":{"total_crossings":99}}"#.to_string()),
        ));

        assert_eq!(session.snapshot().unwrap().total_crossings, Some(3));
        assert_eq!(session.metrics().summary().ignored_messages, 1);
        assert!(session.drain_notices().is_empty());
    }

    #[test]
    fn test_malformed_metadata_keeps_prior_snapshot() {
        let (mut session, _) = controller();
        let id = session.start_from_source("videos/a.mp4").unwrap();
        session.handle_event(tagged(id, frame_data(r#"{"red_light_violations":1}"#)));
        session.handle_event(tagged(id, ChannelEvent::TextMessage("{oops".to_string())));
        session.handle_event(tagged(
            id,
            frame_data(r#"{"vehicles":[{"bbox":"wide","label":"car","id":1}]}"#),
        ));

        assert_eq!(session.snapshot().unwrap().red_light_violations, Some(1));
        assert_eq!(session.metrics().summary().malformed_messages, 2);
        let notices = session.drain_notices();
        let kinds: Vec<_> = notices.iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NoticeKind::MalformedMetadata; 2]);
        // the serde position survives into the notice
        assert!(notices[0]
            .message
            .starts_with("Metadata message is not valid JSON: "));
        assert_eq!(session.status(), SessionStatus::Streaming);
    }

    #[test]
    fn test_server_error_message_becomes_notice() {
        let (mut session, _) = controller();
        let id = session.start_from_source("missing.mp4").unwrap();
        session.handle_event(tagged(
            id,
            ChannelEvent::TextMessage(r#"{"error":"Invalid file path"}"#.to_string()),
        ));
        let notices = session.drain_notices();
        assert_eq!(notices[0].kind, NoticeKind::ServerError);
        assert_eq!(notices[0].message, "Invalid file path");
        assert!(session.snapshot().is_none());
    }

    #[test]
    fn test_binary_after_stop_ignored() {
        let (mut session, _) = controller();
        let id = session.start_from_source("videos/a.mp4").unwrap();
        session.handle_event(tagged(id, ChannelEvent::BinaryMessage(png(32, 32))));
        assert!(session.displayed_frame().is_some());

        session.stop();
        assert_eq!(session.status(), SessionStatus::Stopped);
        assert!(session.displayed_frame().is_none());

        session.handle_event(tagged(id, ChannelEvent::BinaryMessage(png(64, 64))));
        session.on_frame_image(png(64, 64));
        assert!(session.displayed_frame().is_none());
        assert_eq!(session.metrics().summary().stale_events_dropped, 2);
    }

    #[test]
    fn test_events_from_replaced_session_discarded() {
        let (mut session, _) = controller();
        let old = session.start_from_source("videos/p1.mp4").unwrap();
        let new = session.start_from_source("videos/p2.mp4").unwrap();

        session.handle_event(tagged(old, frame_data(r#"{"total_crossings":5}"#)));
        session.handle_event(tagged(old, ChannelEvent::Closed));
        assert!(session.snapshot().is_none());
        assert_eq!(session.status(), SessionStatus::Streaming);
        assert_eq!(session.active_session(), Some(new));
    }

    #[test]
    fn test_frames_replace_each_other() {
        let (mut session, _) = controller();
        let id = session.start_from_live_camera();
        session.handle_event(tagged(id, ChannelEvent::BinaryMessage(png(16, 16))));
        session.handle_event(tagged(id, ChannelEvent::BinaryMessage(png(32, 24))));

        let frame = session.displayed_frame().unwrap();
        assert_eq!(frame.sequence, 2);
        assert_eq!(frame.natural, Size::new(32, 24));
        assert_eq!(frame.displayed, Size::new(32, 24));
        assert_eq!(session.overlay().size(), Size::new(32, 24));
    }

    #[test]
    fn test_undecodable_frame_keeps_previous() {
        let (mut session, _) = controller();
        let id = session.start_from_live_camera();
        session.handle_event(tagged(id, ChannelEvent::BinaryMessage(png(16, 16))));
        session.handle_event(tagged(id, ChannelEvent::BinaryMessage(vec![0, 1, 2, 3])));

        assert_eq!(session.displayed_frame().unwrap().natural, Size::new(16, 16));
        assert_eq!(session.metrics().summary().frame_decode_failures, 1);
        assert_eq!(session.drain_notices()[0].kind, NoticeKind::FrameDecode);
    }

    #[test]
    fn test_recording_handle_and_ledger() {
        let (mut session, _) = controller();
        let id = session.start_from_source("videos/a.mp4").unwrap();
        session.handle_event(tagged(
            id,
            frame_data(
                r#"{"output_path":"output/processed_a.avi","vehicle_states":{"1":{"crossed":true,"crossed_on_red":true},"2":{"crossed":true,"crossed_on_red":false}}}"#,
            ),
        ));
        session.handle_event(tagged(
            id,
            frame_data(r#"{"vehicle_states":{"2":{"crossed":true,"crossed_on_red":false}}}"#),
        ));

        assert_eq!(session.red_light_violators(), vec!["1".to_string()]);
        assert_eq!(session.ledger().len(), 2);
        // latest snapshot dropped output_path, handle is kept
        assert_eq!(session.recording_handle().unwrap().as_str(), "processed_a.avi");

        session.stop();
        assert_eq!(session.recording_handle().unwrap().as_str(), "processed_a.avi");

        session.start_from_live_camera();
        assert!(session.recording_handle().is_none());
        assert!(session.ledger().is_empty());
        assert!(session.snapshot().is_none());
    }

    #[test]
    fn test_counter_regression_counted_but_applied() {
        let (mut session, _) = controller();
        let id = session.start_from_live_camera();
        session.handle_event(tagged(id, frame_data(r#"{"total_crossings":4}"#)));
        session.handle_event(tagged(id, frame_data(r#"{"total_crossings":2}"#)));
        assert_eq!(session.snapshot().unwrap().total_crossings, Some(2));
        assert_eq!(session.metrics().summary().counter_regressions, 1);
    }

    #[test]
    fn test_viewport_change_rerenders() {
        let (mut session, _) = controller();
        let id = session.start_from_live_camera();
        session.handle_event(tagged(id, ChannelEvent::BinaryMessage(png(50, 50))));
        session.handle_event(tagged(
            id,
            frame_data(r#"{"vehicles":[{"bbox":[0,0,10,10],"label":"car","id":2}]}"#),
        ));
        let (rect, _) = session.overlay().rects().next().unwrap();
        assert_eq!(rect, ScreenRect::new(0.0, 0.0, 10.0, 10.0));

        session.set_viewport(Some(Size::new(100, 150)));
        assert_eq!(session.overlay().size(), Size::new(100, 150));
        let (rect, _) = session.overlay().rects().next().unwrap();
        assert_eq!(rect, ScreenRect::new(0.0, 0.0, 20.0, 30.0));
    }

    #[test]
    fn test_compose_preview() {
        let (mut session, _) = controller();
        assert!(session.compose_preview().is_none());
        let id = session.start_from_live_camera();
        session.handle_event(tagged(id, ChannelEvent::BinaryMessage(png(8, 8))));
        let preview = session.compose_preview().unwrap().unwrap();
        assert_eq!(preview.dimensions(), (8, 8));
    }
}
