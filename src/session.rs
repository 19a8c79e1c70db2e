// The session controller: owns the surface, the pen, the snapshot history
// and the result area, and turns input events into raster commands.

use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{Error, SolveError};
use crate::export;
use crate::history::{History, Snapshot};
use crate::solver::InferenceClient;
use crate::surface::{EMPTY_TOLERANCE, Surface};
use crate::types::{PALETTE, Point, ToolState, Viewport};
use crate::view::ResultView;

/// Pointer and touch input in page coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    PointerDown(Point),
    PointerMove(Point),
    PointerUp,
    PointerLeave,
    /// All active contacts. Only single-finger input draws.
    TouchStart(Vec<Point>),
    TouchMove(Vec<Point>),
    TouchEnd,
    TouchCancel,
}

/// Keyboard and button actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Undo,
    Redo,
    ToggleEraser,
    Clear,
    Reset,
    Solve,
    Save,
    SelectColor(usize),
    WidenStroke,
    NarrowStroke,
    Quit,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub width: u32,
    pub height: u32,
    pub device_pixel_ratio: f32,
    pub max_history: usize,
    pub api_key: Option<String>,
    pub export_dir: PathBuf,
}

/// Everything a solve request needs, detached from the session so it can run
/// while the user keeps drawing.
#[derive(Debug, Clone)]
pub struct SolveJob {
    pub image_png: Vec<u8>,
    api_key: Option<String>,
}

impl SolveJob {
    /// Send the request. A missing key fails here, before any network I/O.
    pub async fn run(self, client: &dyn InferenceClient) -> Result<String, SolveError> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(SolveError::MissingApiKey)?;
        client.generate(&api_key, &self.image_png).await
    }
}

pub struct Session {
    surface: Surface,
    viewport: Viewport,
    tools: ToolState,
    history: History,
    last_point: Option<Point>, // Some while a stroke is active
    view: ResultView,
    solving: bool,
    api_key: Option<String>,
    export_dir: PathBuf,
}

impl Session {
    /// Build a session with a blank surface and one baseline snapshot.
    pub fn new(settings: SessionSettings) -> Result<Self, Error> {
        let surface = Surface::new(settings.width, settings.height, settings.device_pixel_ratio);
        let viewport = Viewport {
            left: 0.0,
            top: 0.0,
            width: settings.width as f32,
            height: settings.height as f32,
        };
        let mut session = Self {
            surface,
            viewport,
            tools: ToolState::default(),
            history: History::new(settings.max_history),
            last_point: None,
            view: ResultView::Placeholder,
            solving: false,
            api_key: settings.api_key,
            export_dir: settings.export_dir,
        };
        session.capture_snapshot()?;
        Ok(session)
    }

    /* ---------- accessors ---------- */

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn tools(&self) -> &ToolState {
        &self.tools
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn view(&self) -> &ResultView {
        &self.view
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn is_drawing(&self) -> bool {
        self.last_point.is_some()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// The solve trigger is disabled while a request is in flight.
    pub fn solve_enabled(&self) -> bool {
        !self.solving
    }

    /* ---------- input ---------- */

    pub fn handle(&mut self, event: InputEvent) -> Result<(), Error> {
        match event {
            InputEvent::PointerDown(p) => self.begin_stroke(self.to_surface(p)),
            InputEvent::PointerMove(p) => self.extend_stroke(self.to_surface(p)),
            InputEvent::PointerUp
            | InputEvent::PointerLeave
            | InputEvent::TouchEnd
            | InputEvent::TouchCancel => self.end_stroke()?,
            InputEvent::TouchStart(touches) => {
                if let [only] = touches.as_slice() {
                    self.begin_stroke(self.to_surface(*only));
                }
            }
            InputEvent::TouchMove(touches) => {
                if let [only] = touches.as_slice() {
                    self.extend_stroke(self.to_surface(*only));
                }
            }
        }
        Ok(())
    }

    /// Apply a command that stays inside the session. `Solve` and `Quit`
    /// are driven by the host loop and ignored here.
    pub fn command(&mut self, command: Command) -> Result<(), Error> {
        match command {
            Command::Undo => self.undo()?,
            Command::Redo => self.redo()?,
            Command::ToggleEraser => self.tools.toggle_eraser(),
            Command::Clear => self.clear(true)?,
            Command::Reset => self.reset()?,
            Command::Save => {
                self.save()?;
            }
            Command::SelectColor(i) => {
                if let Some(&color) = PALETTE.get(i) {
                    self.tools.select_color(color);
                }
            }
            Command::WidenStroke => self.tools.set_stroke_width(self.tools.stroke_width + 1),
            Command::NarrowStroke => {
                self.tools.set_stroke_width(self.tools.stroke_width.saturating_sub(1))
            }
            Command::Solve | Command::Quit => {}
        }
        Ok(())
    }

    fn to_surface(&self, page: Point) -> Point {
        self.surface.map_from_page(page, &self.viewport)
    }

    /* ---------- strokes ---------- */

    pub fn begin_stroke(&mut self, p: Point) {
        self.last_point = Some(p);
        self.surface.begin_path();
        self.surface.move_to(p);
    }

    pub fn extend_stroke(&mut self, p: Point) {
        if self.last_point.is_none() {
            return;
        }
        let style = self.tools.stroke_style();
        self.surface.line_to(p, &style);
        self.last_point = Some(p);
    }

    pub fn end_stroke(&mut self) -> Result<(), Error> {
        if self.last_point.take().is_some() {
            self.surface.close_path();
            self.capture_snapshot()?;
        }
        Ok(())
    }

    /* ---------- history ---------- */

    /// Encode the surface and append it unless it matches the current entry.
    pub fn capture_snapshot(&mut self) -> Result<bool, Error> {
        let snapshot = Snapshot::new(self.surface.encode_png()?);
        let pushed = self.history.push(snapshot);
        if pushed {
            debug!(
                len = self.history.len(),
                step = ?self.history.step(),
                can_undo = self.history.can_undo(),
                can_redo = self.history.can_redo(),
                "captured snapshot"
            );
        }
        Ok(pushed)
    }

    /// The cursor only moves once the target snapshot is on the surface.
    pub fn undo(&mut self) -> Result<(), Error> {
        if let Some(snapshot) = self.history.peek_undo() {
            self.surface.draw_png(snapshot.as_bytes())?;
            self.history.undo();
            debug!(step = ?self.history.step(), "undo");
        }
        Ok(())
    }

    pub fn redo(&mut self) -> Result<(), Error> {
        if let Some(snapshot) = self.history.peek_redo() {
            self.surface.draw_png(snapshot.as_bytes())?;
            self.history.redo();
            debug!(step = ?self.history.step(), "redo");
        }
        Ok(())
    }

    /// Wipe to background. An unrecorded clear leaves history alone.
    pub fn clear(&mut self, record: bool) -> Result<(), Error> {
        self.surface.clear();
        self.set_view(ResultView::Placeholder);
        if record {
            self.capture_snapshot()?;
        }
        Ok(())
    }

    /// Blank surface, default pen, and a history holding only the new baseline.
    pub fn reset(&mut self) -> Result<(), Error> {
        self.clear(false)?;
        self.tools = ToolState::default();
        self.history.clear();
        self.capture_snapshot()?;
        info!("session reset");
        Ok(())
    }

    pub fn is_surface_empty(&self) -> bool {
        self.surface.is_blank(EMPTY_TOLERANCE)
    }

    /* ---------- resize ---------- */

    /// Replace the surface with one of the new size and redraw the current
    /// snapshot onto it. With no history the new surface is simply blank.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), Error> {
        self.surface = Surface::new(width, height, self.surface.dpr());
        self.viewport.width = width as f32;
        self.viewport.height = height as f32;
        match self.history.current() {
            Some(snapshot) => self.surface.draw_png(snapshot.as_bytes())?,
            None => self.surface.clear(),
        }
        info!(width, height, "surface resized");
        Ok(())
    }

    /// Place the surface somewhere other than the page origin.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /* ---------- export ---------- */

    pub fn save(&self) -> Result<PathBuf, Error> {
        let path = export::save_png(&self.surface, &self.export_dir, Utc::now())?;
        info!(path = %path.display(), "saved drawing");
        Ok(path)
    }

    /* ---------- solve ---------- */

    /// Check the preconditions and package the drawing for a request.
    ///
    /// Returns `None` when a request is already in flight, or when the
    /// surface is empty (the empty-canvas message is shown instead).
    pub fn request_solve(&mut self) -> Option<SolveJob> {
        if self.solving {
            debug!("solve already in flight");
            return None;
        }
        if self.is_surface_empty() {
            self.set_view(ResultView::Error(SolveError::EmptyCanvas.to_string()));
            return None;
        }
        let image_png = match self.surface.encode_png() {
            Ok(png) => png,
            Err(e) => {
                self.set_view(ResultView::Error(SolveError::Encode(e.to_string()).to_string()));
                return None;
            }
        };

        self.solving = true;
        self.set_view(ResultView::Loading);
        info!(image_bytes = image_png.len(), "solve requested");
        Some(SolveJob {
            image_png,
            api_key: self.api_key.clone(),
        })
    }

    /// Show the outcome of a request and re-enable the trigger.
    pub fn settle_solve(&mut self, outcome: Result<String, SolveError>) {
        self.solving = false;
        match outcome {
            Ok(text) => {
                info!(chars = text.len(), "solution received");
                self.set_view(ResultView::Solution(text));
            }
            Err(e) => {
                warn!(error = %e, "solve failed");
                self.set_view(ResultView::Error(e.to_string()));
            }
        }
    }

    /// Request, await and settle in one go.
    pub async fn solve(&mut self, client: &dyn InferenceClient) {
        if let Some(job) = self.request_solve() {
            let outcome = job.run(client).await;
            self.settle_solve(outcome);
        }
    }

    fn set_view(&mut self, view: ResultView) {
        self.view = view;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::types::{BACKGROUND, DEFAULT_INK, Rgb};

    struct CountingClient {
        calls: AtomicUsize,
        reply: Result<String, SolveError>,
    }

    impl CountingClient {
        fn replying(reply: Result<String, SolveError>) -> Self {
            Self { calls: AtomicUsize::new(0), reply }
        }
    }

    #[async_trait]
    impl InferenceClient for CountingClient {
        async fn generate(&self, _api_key: &str, _image_png: &[u8]) -> Result<String, SolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    fn session_with(max_history: usize, api_key: Option<&str>) -> Session {
        Session::new(SessionSettings {
            width: 64,
            height: 48,
            device_pixel_ratio: 1.0,
            max_history,
            api_key: api_key.map(str::to_string),
            export_dir: std::env::temp_dir(),
        })
        .unwrap()
    }

    fn session() -> Session {
        session_with(50, Some("test-key"))
    }

    /// A horizontal stroke at row `y`.
    fn stroke(s: &mut Session, y: f32) {
        s.handle(InputEvent::PointerDown(Point::new(4.0, y))).unwrap();
        s.handle(InputEvent::PointerMove(Point::new(30.0, y))).unwrap();
        s.handle(InputEvent::PointerMove(Point::new(50.0, y))).unwrap();
        s.handle(InputEvent::PointerUp).unwrap();
    }

    fn current(s: &Session) -> Snapshot {
        s.history().current().unwrap().clone()
    }

    fn pixel(s: &Session, x: usize, y: usize) -> Rgb {
        let frame = s.surface().frame();
        Rgb::from_u32(frame.pixels[y * frame.width + x])
    }

    #[test]
    fn new_session_has_one_baseline() {
        let s = session();
        assert_eq!(s.history().len(), 1);
        assert!(!s.can_undo());
        assert!(!s.can_redo());
        assert!(s.is_surface_empty());
    }

    #[test]
    fn each_stroke_is_one_snapshot() {
        let mut s = session();
        stroke(&mut s, 10.5);
        stroke(&mut s, 20.5);
        assert_eq!(s.history().len(), 3);
        assert!(s.can_undo());
    }

    #[test]
    fn move_without_stroke_is_ignored() {
        let mut s = session();
        s.handle(InputEvent::PointerMove(Point::new(10.0, 10.0))).unwrap();
        s.handle(InputEvent::PointerUp).unwrap();
        assert!(s.is_surface_empty());
        assert_eq!(s.history().len(), 1);
    }

    #[test]
    fn click_without_movement_adds_nothing() {
        let mut s = session();
        s.handle(InputEvent::PointerDown(Point::new(10.0, 10.0))).unwrap();
        s.handle(InputEvent::PointerUp).unwrap();
        assert_eq!(s.history().len(), 1);
    }

    #[test]
    fn undo_then_redo_is_byte_identical() {
        let mut s = session();
        stroke(&mut s, 10.5);
        stroke(&mut s, 20.5);
        let before = current(&s);
        let pixels = s.surface().frame().clone();

        s.undo().unwrap();
        assert_ne!(s.surface().frame(), &pixels);
        s.redo().unwrap();

        assert_eq!(current(&s), before);
        assert_eq!(s.surface().frame(), &pixels);
        assert_eq!(s.surface().encode_png().unwrap(), before.as_bytes());
    }

    #[test]
    fn undo_restores_previous_drawing() {
        let mut s = session();
        stroke(&mut s, 10.5);
        stroke(&mut s, 30.5);
        assert_eq!(pixel(&s, 20, 30), DEFAULT_INK);
        s.undo().unwrap();
        assert_eq!(pixel(&s, 20, 30), BACKGROUND);
        assert_eq!(pixel(&s, 20, 10), DEFAULT_INK);
    }

    #[test]
    fn drawing_after_undo_discards_redo_branch() {
        let mut s = session();
        stroke(&mut s, 10.5); // A
        stroke(&mut s, 20.5); // B
        let b = current(&s);
        s.undo().unwrap();
        stroke(&mut s, 30.5); // C
        assert!(!s.history().contains(&b));
        assert!(!s.can_redo());
    }

    #[test]
    fn history_respects_cap() {
        let mut s = session_with(5, None);
        for i in 0..12 {
            stroke(&mut s, 2.5 + i as f32 * 3.0);
            assert!(s.history().len() <= 5);
            assert_eq!(s.history().step(), Some(s.history().len() - 1));
        }
        for _ in 0..10 {
            s.undo().unwrap();
        }
        assert_eq!(s.history().step(), Some(0));
    }

    #[test]
    fn empty_check_tracks_clear_and_strokes() {
        let mut s = session();
        stroke(&mut s, 10.5);
        assert!(!s.is_surface_empty());
        s.clear(true).unwrap();
        assert!(s.is_surface_empty());
    }

    #[test]
    fn recorded_clear_is_undoable() {
        let mut s = session();
        stroke(&mut s, 10.5);
        s.command(Command::Clear).unwrap();
        assert_eq!(s.history().len(), 3);
        s.undo().unwrap();
        assert!(!s.is_surface_empty());
    }

    #[test]
    fn unrecorded_clear_leaves_history() {
        let mut s = session();
        stroke(&mut s, 10.5);
        let before = current(&s);
        s.clear(false).unwrap();
        assert_eq!(s.history().len(), 2);
        assert_eq!(current(&s), before);
    }

    #[test]
    fn reset_restores_defaults_and_single_baseline() {
        let mut s = session();
        s.command(Command::SelectColor(2)).unwrap();
        s.command(Command::WidenStroke).unwrap();
        stroke(&mut s, 10.5);
        s.command(Command::ToggleEraser).unwrap();

        s.command(Command::Reset).unwrap();
        assert_eq!(*s.tools(), ToolState::default());
        assert_eq!(s.history().len(), 1);
        assert!(s.is_surface_empty());
        assert!(!s.can_undo());
    }

    #[test]
    fn eraser_stroke_removes_ink() {
        let mut s = session();
        stroke(&mut s, 20.5);
        s.command(Command::ToggleEraser).unwrap();
        s.handle(InputEvent::PointerDown(Point::new(0.0, 20.5))).unwrap();
        s.handle(InputEvent::PointerMove(Point::new(64.0, 20.5))).unwrap();
        s.handle(InputEvent::PointerUp).unwrap();
        assert!(s.is_surface_empty());
        assert_eq!(s.history().len(), 3);
    }

    #[test]
    fn multi_touch_does_not_draw() {
        let mut s = session();
        let two = vec![Point::new(5.0, 5.0), Point::new(40.0, 40.0)];
        s.handle(InputEvent::TouchStart(two.clone())).unwrap();
        s.handle(InputEvent::TouchMove(two)).unwrap();
        s.handle(InputEvent::TouchEnd).unwrap();
        assert!(s.is_surface_empty());
        assert!(!s.is_drawing());
    }

    #[test]
    fn single_touch_draws() {
        let mut s = session();
        s.handle(InputEvent::TouchStart(vec![Point::new(5.0, 20.5)])).unwrap();
        s.handle(InputEvent::TouchMove(vec![Point::new(40.0, 20.5)])).unwrap();
        s.handle(InputEvent::TouchCancel).unwrap();
        assert!(!s.is_surface_empty());
        assert_eq!(s.history().len(), 2);
    }

    #[test]
    fn pointer_leave_commits_stroke() {
        let mut s = session();
        s.handle(InputEvent::PointerDown(Point::new(5.0, 20.5))).unwrap();
        s.handle(InputEvent::PointerMove(Point::new(40.0, 20.5))).unwrap();
        s.handle(InputEvent::PointerLeave).unwrap();
        assert!(!s.is_drawing());
        assert_eq!(s.history().len(), 2);
    }

    #[test]
    fn page_points_are_mapped_through_viewport() {
        let mut s = session();
        // Displayed at twice the surface size, offset on the page.
        s.set_viewport(Viewport { left: 100.0, top: 50.0, width: 128.0, height: 96.0 });
        s.handle(InputEvent::PointerDown(Point::new(110.0, 91.0))).unwrap();
        s.handle(InputEvent::PointerMove(Point::new(190.0, 91.0))).unwrap();
        s.handle(InputEvent::PointerUp).unwrap();
        // y: (91 - 50) * 48/96 = 20.5
        assert_eq!(pixel(&s, 20, 20), DEFAULT_INK);
    }

    #[test]
    fn resize_keeps_latest_drawing() {
        let mut s = session();
        stroke(&mut s, 20.5);
        s.resize(80, 60).unwrap();
        assert_eq!(s.surface().width(), 80);
        assert_eq!(pixel(&s, 20, 20), DEFAULT_INK);
        assert_eq!(s.history().len(), 2);
    }

    #[test]
    fn resize_after_undo_shows_current_step() {
        let mut s = session();
        stroke(&mut s, 10.5);
        stroke(&mut s, 30.5);
        s.undo().unwrap();
        s.resize(70, 50).unwrap();
        assert_eq!(pixel(&s, 20, 10), DEFAULT_INK);
        assert_eq!(pixel(&s, 20, 30), BACKGROUND);
    }

    #[test]
    fn palette_commands_select_ink() {
        let mut s = session();
        s.command(Command::SelectColor(1)).unwrap();
        assert_eq!(s.tools().color, PALETTE[1]);
        s.command(Command::SelectColor(99)).unwrap();
        assert_eq!(s.tools().color, PALETTE[1]);
    }

    #[tokio::test]
    async fn solve_on_empty_surface_sends_nothing() {
        let mut s = session();
        let client = CountingClient::replying(Ok("4".into()));
        s.solve(&client).await;
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            s.view(),
            &ResultView::Error("Please draw a mathematical expression on the canvas first!".into())
        );
        assert!(s.solve_enabled());
    }

    #[tokio::test]
    async fn solve_shows_solution() {
        let mut s = session();
        stroke(&mut s, 20.5);
        let client = CountingClient::replying(Ok("Final Answer: 4".into()));
        s.solve(&client).await;
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(s.view(), &ResultView::Solution("Final Answer: 4".into()));
        assert!(s.solve_enabled());
    }

    #[tokio::test]
    async fn missing_key_is_reported_without_request() {
        let mut s = session_with(50, None);
        stroke(&mut s, 20.5);
        let client = CountingClient::replying(Ok("4".into()));
        s.solve(&client).await;
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert_eq!(s.view(), &ResultView::Error(SolveError::MissingApiKey.to_string()));
    }

    #[tokio::test]
    async fn malformed_response_message_is_shown() {
        let mut s = session();
        stroke(&mut s, 20.5);
        let history_len = s.history().len();
        let client = CountingClient::replying(Err(SolveError::NoSolution));
        s.solve(&client).await;
        match s.view() {
            ResultView::Error(msg) => assert!(msg.starts_with("No solution received from AI.")),
            other => panic!("unexpected view {other:?}"),
        }
        assert_eq!(s.history().len(), history_len);
        assert!(!s.is_surface_empty());
    }

    #[test]
    fn trigger_is_disabled_while_in_flight() {
        let mut s = session();
        stroke(&mut s, 20.5);
        let job = s.request_solve();
        assert!(job.is_some());
        assert_eq!(s.view(), &ResultView::Loading);
        assert!(!s.solve_enabled());
        assert!(s.request_solve().is_none());

        s.settle_solve(Err(SolveError::Http { status: 500, message: None }));
        assert!(s.solve_enabled());
        assert!(s.request_solve().is_some());
    }

    #[test]
    fn clearing_restores_placeholder() {
        let mut s = session();
        s.settle_solve(Ok("x".into()));
        s.clear(true).unwrap();
        assert_eq!(s.view(), &ResultView::Placeholder);
    }

    #[test]
    fn undo_into_unreadable_snapshot_keeps_cursor() {
        let mut s = session();
        s.history.push(Snapshot::new(vec![1, 2, 3]));
        stroke(&mut s, 20.5);
        let before = s.history().step();
        let shown = s.surface().frame().clone();

        assert!(s.undo().is_err());
        assert_eq!(s.history().step(), before);
        assert_eq!(s.surface().frame(), &shown);
    }

    #[test]
    fn redo_into_unreadable_snapshot_keeps_cursor() {
        let mut s = session();
        stroke(&mut s, 20.5);
        s.history.push(Snapshot::new(vec![1, 2, 3]));
        s.undo().unwrap();
        let before = s.history().step();

        assert!(s.redo().is_err());
        assert_eq!(s.history().step(), before);
        assert!(s.can_redo());
    }

    #[tokio::test]
    async fn network_failure_keeps_api_key_out_of_result_area() {
        let addr = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        let client = crate::solver::GeminiClient::new(Some(&format!("http://{addr}")), None);
        let mut s = session_with(50, Some("SUPERSECRET123"));
        stroke(&mut s, 20.5);

        s.solve(&client).await;

        assert_eq!(s.view().status_label(), "ERROR");
        assert!(!s.view().to_terminal().contains("SUPERSECRET123"));
        assert!(!s.view().to_html().contains("SUPERSECRET123"));
    }
}
