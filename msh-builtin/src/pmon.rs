use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use msh_types::{Context, ExitStatus};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table},
};
use std::{
    io,
    time::{Duration, Instant},
};
use sysinfo::{
    CpuRefreshKind, MemoryRefreshKind, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System,
};
use tracing::debug;

use crate::ShellProxy;

const MIN_INTERVAL: Duration = Duration::from_millis(250);
const MAX_INTERVAL: Duration = Duration::from_secs(10);
const INTERVAL_STEP: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub max_rows: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        MonitorSettings {
            interval: Duration::from_millis(1500),
            max_rows: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ProcessRow {
    pid: u32,
    user: String,
    cpu: f32,
    mem: f64,
    name: String,
}

/// Highest CPU first, at most `max` rows.
fn top_by_cpu(mut rows: Vec<ProcessRow>, max: usize) -> Vec<ProcessRow> {
    rows.sort_by(|a, b| b.cpu.partial_cmp(&a.cpu).unwrap_or(std::cmp::Ordering::Equal));
    rows.truncate(max);
    rows
}

fn faster(interval: Duration) -> Duration {
    interval.saturating_sub(INTERVAL_STEP).max(MIN_INTERVAL)
}

fn slower(interval: Duration) -> Duration {
    (interval + INTERVAL_STEP).min(MAX_INTERVAL)
}

fn ratio(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        0.0
    } else {
        (part / whole).clamp(0.0, 1.0)
    }
}

struct App {
    system: System,
    settings: MonitorSettings,
    cpu: f64,
    mem: f64,
    processes: Vec<ProcessRow>,
    last_refresh: Instant,
}

impl App {
    fn new(settings: MonitorSettings) -> Self {
        let mut app = Self {
            system: System::new_with_specifics(
                RefreshKind::nothing()
                    .with_cpu(CpuRefreshKind::everything())
                    .with_memory(MemoryRefreshKind::everything())
                    .with_processes(ProcessRefreshKind::everything()),
            ),
            settings,
            cpu: 0.0,
            mem: 0.0,
            processes: Vec::new(),
            last_refresh: Instant::now(),
        };
        app.refresh();
        app
    }

    fn refresh(&mut self) {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.system.refresh_processes(ProcessesToUpdate::All, true);

        let total = self.system.total_memory() as f64;
        self.cpu = ratio(self.system.global_cpu_usage() as f64, 100.0);
        self.mem = ratio(self.system.used_memory() as f64, total);

        let rows = self
            .system
            .processes()
            .iter()
            .map(|(pid, proc)| ProcessRow {
                pid: pid.as_u32(),
                user: proc
                    .user_id()
                    .map(|uid| (**uid).to_string())
                    .unwrap_or_else(|| "-".to_string()),
                cpu: proc.cpu_usage(),
                mem: ratio(proc.memory() as f64, total) * 100.0,
                name: proc.name().to_string_lossy().into_owned(),
            })
            .collect();
        self.processes = top_by_cpu(rows, self.settings.max_rows);
        self.last_refresh = Instant::now();
    }

    fn on_tick(&mut self) {
        if self.last_refresh.elapsed() >= self.settings.interval {
            self.refresh();
        }
    }
}

/// Puts the terminal back however the view ends.
struct ScreenGuard;

impl ScreenGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode()?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            disable_raw_mode().ok();
            return Err(e.into());
        }
        Ok(ScreenGuard)
    }
}

impl Drop for ScreenGuard {
    fn drop(&mut self) {
        execute!(io::stdout(), LeaveAlternateScreen).ok();
        disable_raw_mode().ok();
    }
}

pub fn command(ctx: &Context, _argv: Vec<String>, proxy: &mut dyn ShellProxy) -> ExitStatus {
    if !ctx.interactive {
        ctx.write_stderr("pmon: needs an interactive terminal").ok();
        return ExitStatus::ExitedWith(1);
    }

    let settings = proxy.monitor_settings();
    debug!("pmon: {:?}", settings);
    match run(settings) {
        Ok(()) => ExitStatus::ExitedWith(0),
        Err(err) => {
            ctx.write_stderr(&format!("pmon: {err}")).ok();
            ExitStatus::ExitedWith(1)
        }
    }
}

fn run(settings: MonitorSettings) -> Result<()> {
    let _screen = ScreenGuard::enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
    let mut app = App::new(settings);
    let res = run_app(&mut terminal, &mut app);
    terminal.show_cursor()?;
    res
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if event::poll(Duration::from_millis(100))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('+') => app.settings.interval = slower(app.settings.interval),
                KeyCode::Char('-') => app.settings.interval = faster(app.settings.interval),
                _ => {}
            }
        }

        app.on_tick();
    }
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(f.area());

    let cpu = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("CPU"))
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(app.cpu)
        .label(format!("{:.1}%", app.cpu * 100.0));
    f.render_widget(cpu, chunks[0]);

    let mem = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("MEM"))
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(app.mem)
        .label(format!("{:.1}%", app.mem * 100.0));
    f.render_widget(mem, chunks[1]);

    let rows: Vec<Row> = app
        .processes
        .iter()
        .map(|p| {
            Row::new(vec![
                Cell::from(p.pid.to_string()),
                Cell::from(p.user.as_str()),
                Cell::from(format!("{:.1}", p.cpu)),
                Cell::from(format!("{:.1}", p.mem)),
                Cell::from(p.name.as_str()),
            ])
            .style(Style::default().fg(Color::Gray))
        })
        .collect();

    let widths = [
        Constraint::Length(8),
        Constraint::Length(8),
        Constraint::Length(7),
        Constraint::Length(7),
        Constraint::Min(20),
    ];

    let table = Table::new(rows, widths)
        .header(
            Row::new(vec!["PID", "USER", "%CPU", "%MEM", "COMMAND"])
                .style(
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                )
                .bottom_margin(1),
        )
        .block(Block::default().borders(Borders::ALL).title("Processes"));
    f.render_widget(table, chunks[2]);

    let help = format!(
        "q: Quit | +/-: interval ({} ms)",
        app.settings.interval.as_millis()
    );
    f.render_widget(
        Paragraph::new(help).style(Style::default().fg(Color::Gray)),
        chunks[3],
    );
}
