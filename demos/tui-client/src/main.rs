//! Terminal client for remote code execution.
//!
//! Run with: cargo run -p tui-client-example -- <source file> <executor>
//!
//! Creates the process through the content API, joins and starts it over the
//! socket and renders its output in a vt100 screen. Ctrl+] quits.
//!
//! Endpoints come from the config file; `REMOTE_EXEC_HOST=my.example.com`
//! points the client at `https://api.example.com`.

use std::{
    fs::File,
    io,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use remote_exec_core::{KeystrokeHandler, ProcessSpec, TerminalWidget, ViewportGeometry};
use remote_exec_session::{
    ClientConfig, ExecutionSession, HttpContentApi, ProcessStatus, SessionError, SessionPhase,
    ViewportPolicy,
};
use remote_exec_transport::{
    Channel, ConnectionState, WsChannel,
    tui::{TerminalIntent, event_intent},
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const SCROLLBACK_LINES: usize = 1000;

type Session = ExecutionSession<HttpContentApi, WsChannel, Vt100Widget>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Terminal widget backed by a vt100 screen, drawn with ratatui.
///
/// The container is the bordered area the screen is drawn in.
struct Vt100Widget {
    parser: Mutex<vt100::Parser>,
    geometry: Mutex<ViewportGeometry>,
    handler: Mutex<Option<KeystrokeHandler>>,
}

impl Vt100Widget {
    fn new(geometry: ViewportGeometry) -> Self {
        Self {
            parser: Mutex::new(vt100::Parser::new(geometry.rows, geometry.cols, SCROLLBACK_LINES)),
            geometry: Mutex::new(geometry),
            handler: Mutex::new(None),
        }
    }

    fn resize(&self, geometry: ViewportGeometry) {
        *lock(&self.geometry) = geometry;
        lock(&self.parser).set_size(geometry.rows, geometry.cols);
    }

    fn keystroke(&self, data: Vec<u8>) {
        if let Some(handler) = lock(&self.handler).as_ref() {
            handler(data);
        }
    }

    /// Visible rows and the cursor position, if shown.
    fn snapshot(&self) -> (Vec<Line<'static>>, Option<(u16, u16)>) {
        let parser = lock(&self.parser);
        let screen = parser.screen();
        let (_, cols) = screen.size();
        let lines = screen.rows(0, cols).map(Line::from).collect();
        let cursor = (!screen.hide_cursor()).then(|| screen.cursor_position());
        (lines, cursor)
    }
}

#[async_trait]
impl TerminalWidget for Vt100Widget {
    type Container = Rect;

    fn open(&self, area: Rect) {
        self.resize(inner_geometry(area));
    }

    async fn clear(&self) {
        let geometry = *lock(&self.geometry);
        *lock(&self.parser) = vt100::Parser::new(geometry.rows, geometry.cols, SCROLLBACK_LINES);
    }

    async fn write(&self, data: &[u8]) {
        lock(&self.parser).process(data);
    }

    fn on_keystroke(&self, handler: KeystrokeHandler) {
        *lock(&self.handler) = Some(handler);
    }

    fn geometry(&self) -> ViewportGeometry {
        *lock(&self.geometry)
    }
}

/// Bordered screen area for a host terminal of `width` x `height`.
fn screen_area(width: u16, height: u16) -> Rect {
    // Last row is the status line
    Rect::new(0, 0, width, height.saturating_sub(1))
}

fn inner_geometry(area: Rect) -> ViewportGeometry {
    ViewportGeometry::new(
        area.height.saturating_sub(2).max(1),
        area.width.saturating_sub(2).max(1),
    )
}

fn init_logging() -> Result<PathBuf> {
    let dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("remote-exec");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let path = dir.join("tui-client.log");
    let file = File::create(&path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;

    // Logs go to a file so they do not draw over the screen
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    Ok(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let (Some(source_path), Some(executor)) = (args.next(), args.next()) else {
        bail!("usage: tui-client-example <source file> <executor>");
    };
    let source = std::fs::read_to_string(&source_path)
        .with_context(|| format!("Failed to read {source_path}"))?;

    let config = ClientConfig::load_default().context("Failed to load config")?;
    let log_path = init_logging()?;
    tracing::info!(api_base = %config.api_base, socket_url = %config.socket_url, "Starting");

    let api = HttpContentApi::new(config.api_root())?;
    let channel = WsChannel::connect(&config.socket_url, config.namespace.clone())
        .await
        .with_context(|| format!("Failed to connect to {}", config.socket_url))?;
    let widget = Arc::new(Vt100Widget::new(config.geometry()));
    let session = Arc::new(ExecutionSession::new(
        ProcessSpec::new(source, executor),
        api,
        Arc::new(channel),
        Arc::clone(&widget),
    ));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = run_app(&mut terminal, &session, &widget).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(e) = &result {
        eprintln!("Error: {e:#}");
        eprintln!("Log: {}", log_path.display());
    }
    result
}

async fn run_process(session: &Session) -> Result<(), SessionError> {
    session.create().await?;
    session.join().await?;
    session.start().await
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    session: &Arc<Session>,
    widget: &Vt100Widget,
) -> Result<()> {
    let size = terminal.size()?;
    let _attached = session.attach(Some(screen_area(size.width, size.height)))?;
    let status = session.process_status();

    let runner = Arc::clone(session);
    tokio::spawn(async move {
        if let Err(e) = run_process(&runner).await {
            tracing::error!("Session setup failed: {e}");
        }
    });

    loop {
        let status_text = status_line(session, *status.borrow());
        terminal.draw(|f| ui(f, widget, &status_text))?;

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let event = event::read()?;
        if is_quit(&event) {
            break;
        }

        match event_intent(&event) {
            Some(TerminalIntent::Input(data)) => widget.keystroke(data),
            Some(TerminalIntent::Resize(host)) => {
                widget.resize(inner_geometry(screen_area(host.cols, host.rows)));
                if session.ready_state() {
                    if let Err(e) = ViewportPolicy::apply(session.as_ref()).await {
                        tracing::warn!("Resize not sent: {e}");
                    }
                }
            }
            None => {}
        }
    }

    if matches!(session.phase(), SessionPhase::Joined | SessionPhase::Started) {
        if let Err(e) = session.stop().await {
            tracing::warn!("Stop not sent: {e}");
        }
    }
    Ok(())
}

fn is_quit(event: &Event) -> bool {
    matches!(
        event,
        Event::Key(key)
            if key.kind == KeyEventKind::Press
                && key.code == KeyCode::Char(']')
                && key.modifiers.contains(KeyModifiers::CONTROL)
    )
}

fn status_line(session: &Session, process: ProcessStatus) -> String {
    let phase = match (session.phase(), process) {
        (SessionPhase::Pending | SessionPhase::Creating, _) => "Creating process",
        (SessionPhase::Created, _) => "Process created",
        (SessionPhase::Joined, _) | (SessionPhase::Started, ProcessStatus::NotStarted) => "Starting",
        (SessionPhase::Started, _) => "Running",
        (SessionPhase::Ended, _) => "Process ended",
        (SessionPhase::Failed, _) => "Failed to create process",
    };
    match session.channel().state() {
        ConnectionState::Connected => phase.to_string(),
        state => format!("{phase} ({state:?})"),
    }
}

fn ui(f: &mut Frame, widget: &Vt100Widget, status: &str) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(f.area());

    let block = Block::default().borders(Borders::ALL).title("Output");
    let inner = block.inner(chunks[0]);
    let (lines, cursor) = widget.snapshot();
    f.render_widget(Paragraph::new(lines).block(block), chunks[0]);
    if let Some((row, col)) = cursor {
        f.set_cursor_position((inner.x + col, inner.y + row));
    }

    let status_style = match status {
        "Running" => Style::default().fg(Color::Green),
        s if s.starts_with("Failed") || s.contains('(') => Style::default().fg(Color::Red),
        _ => Style::default().fg(Color::Yellow),
    };
    let status = Paragraph::new(Line::from(vec![
        Span::raw(" "),
        Span::styled(status.to_string(), status_style),
        Span::raw(" | "),
        Span::styled("Ctrl+]", Style::default().fg(Color::Yellow)),
        Span::raw(" quit "),
    ]));
    f.render_widget(status, chunks[1]);
}
