// What you SEE:
// • A blank sheet. Hold Left Mouse to write a math expression.
// • E toggles the eraser, 1-6 pick an ink, [ and ] change the stroke width.
// • Ctrl+Z undo, Ctrl+Y / Ctrl+Shift+Z redo, Delete/Backspace clears.
// • Enter sends the drawing to Gemini; the answer shows up in the terminal.
// • S saves a PNG, R resets everything, ESC quits.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};

use sketch_solver::config::Config;
use sketch_solver::debounce::{RESIZE_QUIET_PERIOD, ResizeDebouncer};
use sketch_solver::draw::{draw_crosshair, draw_ring, draw_text_5x7, fill_rect, stack_below_band, Drawer};
use sketch_solver::session::{Command, InputEvent, Session, SessionSettings};
use sketch_solver::solver::{GeminiClient, InferenceClient};
use sketch_solver::types::{BACKGROUND, FrameBuffer, Point, Viewport};
use sketch_solver::view::ResultView;

const HUD_HEIGHT: u32 = 13; // window pixels above the surface

#[derive(Parser, Debug)]
#[command(name = "sketch-solver", about = "Draw a math expression and let Gemini solve it")]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/sketch-solver/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Gemini API key (overrides GEMINI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Device pixel ratio of the drawing surface
    #[arg(long)]
    dpr: Option<f32>,

    /// Where S saves PNGs
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Also write the result panel as HTML to this file
    #[arg(long)]
    result_html: Option<PathBuf>,

    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if self.api_key.is_some() {
            config.api_key = self.api_key;
        }
        if let Some(v) = self.width {
            config.width = v;
        }
        if let Some(v) = self.height {
            config.height = v;
        }
        if let Some(v) = self.dpr {
            config.device_pixel_ratio = v;
        }
        if let Some(v) = self.export_dir {
            config.export_dir = v;
        }
        if self.result_html.is_some() {
            config.result_html = self.result_html;
        }
        if let Some(v) = self.log_level {
            config.log_level = v;
        }
    }
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("sketch_solver={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Show the result area: terminal always, HTML file when configured.
fn publish(view: &ResultView, html: Option<&Path>) {
    println!("{}", view.to_terminal());
    if let Some(path) = html {
        if let Err(e) = std::fs::write(path, view.to_html()) {
            warn!(path = %path.display(), error = %e, "could not write result html");
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref()).context("load configuration")?;
    args.apply(&mut config);
    config.validate()?;
    init_logging(&config.log_level);

    /* --- Inference client + runtime ---
       The request runs on the runtime; the window loop never waits for it. */
    let runtime = tokio::runtime::Runtime::new().context("start async runtime")?;
    let client: Arc<dyn InferenceClient> =
        Arc::new(GeminiClient::new(Some(&config.base_url), Some(&config.model)));
    let (settled_tx, mut settled_rx) = mpsc::unbounded_channel();

    /* --- Session + window --- */
    let mut session = Session::new(SessionSettings {
        width: config.width,
        height: config.height,
        device_pixel_ratio: config.device_pixel_ratio,
        max_history: config.max_history,
        api_key: config.api_key.clone(),
        export_dir: config.export_dir.clone(),
    })?;
    // The HUD gets its own band, so the surface starts HUD_HEIGHT down the window.
    session.set_viewport(Viewport {
        left: 0.0,
        top: HUD_HEIGHT as f32,
        width: config.width as f32,
        height: config.height as f32,
    });
    let mut drawer = Drawer::new(
        "Smart Calculator - draw, then press Enter",
        config.width as usize,
        (config.height + HUD_HEIGHT) as usize,
    )?;
    info!(model = %config.model, width = config.width, height = config.height, "ready");

    let mut debouncer = ResizeDebouncer::new(drawer.size(), RESIZE_QUIET_PERIOD);
    let mut screen = FrameBuffer::filled(1, 1, BACKGROUND); // HUD band + surface, what you actually see
    let mut was_down = false;
    let mut last_pos: Option<Point> = None;
    let mut shown = session.view().clone();
    publish(&shown, config.result_html.as_deref());

    /* ------------------------------ Main loop ------------------------------ */
    'frame: while drawer.is_open() {
        let now = Instant::now();

        /* 1) Keyboard */
        for command in drawer.commands() {
            match command {
                Command::Quit => break 'frame,
                Command::Solve => {
                    if let Some(job) = session.request_solve() {
                        let client = Arc::clone(&client);
                        let tx = settled_tx.clone();
                        runtime.spawn(async move {
                            let outcome = job.run(&*client).await;
                            let _ = tx.send(outcome);
                        });
                    }
                }
                other => {
                    if let Err(e) = session.command(other) {
                        warn!(?other, error = %e, "command failed");
                    }
                }
            }
        }

        /* 2) Mouse -> pointer events (button edges + motion) */
        let pos = drawer.mouse_pos();
        let down = drawer.left_mouse_down();
        let event = match (pos, down, was_down) {
            (Some(p), true, false) => Some(InputEvent::PointerDown(p)),
            (Some(p), true, true) if Some(p) != last_pos => Some(InputEvent::PointerMove(p)),
            (None, _, true) if session.is_drawing() => Some(InputEvent::PointerLeave),
            (_, false, true) => Some(InputEvent::PointerUp),
            _ => None,
        };
        if let Some(event) = event {
            if let Err(e) = session.handle(event) {
                warn!(error = %e, "input event failed");
            }
        }
        was_down = down;
        last_pos = pos;

        /* 3) Resize once the window has settled */
        debouncer.observe(drawer.size(), now);
        if let Some((w, h)) = debouncer.poll(now) {
            let surface_h = (h as u32).saturating_sub(HUD_HEIGHT).max(1);
            session.resize(w as u32, surface_h)?;
        }

        /* 4) Finished solve requests */
        while let Ok(outcome) = settled_rx.try_recv() {
            session.settle_solve(outcome);
        }
        if session.view() != &shown {
            shown = session.view().clone();
            publish(&shown, config.result_html.as_deref());
        }

        /* 5) Compose: HUD band, surface below it, cursor */
        let dpr = session.surface().dpr();
        let band = (HUD_HEIGHT as f32 * dpr).round() as usize;
        stack_below_band(&mut screen, session.surface().frame(), band);

        if let Some(p) = pos {
            let sp = session.surface().map_from_page(p, session.viewport());
            let (cx, cy) = ((sp.x * dpr) as i32, (sp.y * dpr) as i32 + band as i32);
            let tools = session.tools();
            if tools.eraser {
                draw_ring(&mut screen, cx, cy, (tools.stroke_width as f32 * dpr) as i32, 0x0074_b9ff);
            } else {
                draw_crosshair(&mut screen, cx, cy, 8, tools.color.to_u32());
            }
        }

        let tools = session.tools();
        let hud = format!(
            "{} | {} {}PX | UNDO {} REDO {} | ENTER SOLVE  S SAVE  R RESET",
            if session.solve_enabled() { session.view().status_label() } else { "SOLVING" },
            if tools.eraser { "ERASER" } else { "PEN" },
            tools.stroke_width,
            if session.can_undo() { "ON" } else { "OFF" },
            if session.can_redo() { "ON" } else { "OFF" },
        );
        let hud_width = screen.width as i32;
        fill_rect(&mut screen, 0, 0, hud_width, band as i32, 0x002d_3436);
        draw_text_5x7(&mut screen, 4, 3, &hud, 0x00ff_ffff, 0x0000_0000);

        /* 6) Present */
        drawer.present(&screen)?;
    }

    Ok(())
}
