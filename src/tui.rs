use std::net::SocketAddr;
use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::Receiver;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Terminal,
};

use crate::analysis::Phase;
use crate::metrics::{Counters, RateAverager};
use crate::state::{SessionStats, SharedState};

const MAX_EVENTS: usize = 200;

pub fn session_line(addr: &SocketAddr, stats: &SessionStats) -> String {
    let phase = match stats.phase {
        Phase::Accumulating => "warming up",
        Phase::Estimating => "estimating",
    };
    let bpm = stats
        .last_bpm
        .map(|b| format!("{b:.1} bpm"))
        .unwrap_or_else(|| "--".to_string());
    format!("{addr:<22} {phase:<11} {:>7} samples  {bpm}", stats.samples)
}

pub fn run_tui(
    shared: Arc<SharedState>,
    counters: Arc<Counters>,
    events: Receiver<String>,
    stop: Arc<AtomicBool>,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut logs: Vec<String> = Vec::new();
    let mut log_scroll: usize = 0;
    let mut last_samples = 0u64;
    let mut last_estimates = 0u64;
    let mut avg_samples = RateAverager::new(5.0);
    let mut avg_estimates = RateAverager::new(5.0);
    let mut last_time = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        while let Ok(ev) = events.try_recv() {
            logs.push(ev);
            if logs.len() > MAX_EVENTS {
                logs.remove(0);
            }
        }

        let now = Instant::now();
        let dt = now.duration_since(last_time).as_secs_f64();
        let s = counters.samples_in.load(Ordering::Relaxed);
        let e = counters.estimates_out.load(Ordering::Relaxed);
        let sps = avg_samples.update(s - last_samples, dt);
        let eps = avg_estimates.update(e - last_estimates, dt);
        last_samples = s;
        last_estimates = e;
        last_time = now;
        let opened = counters.sessions_opened.load(Ordering::Relaxed);

        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(8), // Sessions
                    Constraint::Length(4), // Throughput
                    Constraint::Min(0),    // Events
                    Constraint::Length(1), // Footer
                ].as_ref())
                .split(f.size());

            let items: Vec<ListItem> = shared
                .snapshot()
                .iter()
                .map(|(addr, stats)| ListItem::new(session_line(addr, stats)))
                .collect();
            let title = format!("Sessions ({} live, {opened} total)", shared.len());
            let list = List::new(items).block(Block::default().title(title).borders(Borders::ALL));
            f.render_widget(list, chunks[0]);

            let throughput = Paragraph::new(format!("Samples: {sps:.1}/s\nEstimates: {eps:.1}/s"))
                .block(Block::default().title("Throughput").borders(Borders::ALL));
            f.render_widget(throughput, chunks[1]);

            let viewport = chunks[2].height.saturating_sub(2) as usize;
            let start = logs.len().saturating_sub(viewport + log_scroll);
            let log_items: Vec<ListItem> = logs.iter().skip(start).map(|l| ListItem::new(l.clone())).collect();
            let log_list = List::new(log_items).block(Block::default().title("Events").borders(Borders::ALL));
            f.render_widget(log_list, chunks[2]);

            f.render_widget(Paragraph::new("q: quit | ↑/↓/Home: scroll events | c: clear events"), chunks[3]);
        })?;

        if event::poll(Duration::from_millis(200))? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') => stop.store(true, Ordering::Relaxed),
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        stop.store(true, Ordering::Relaxed)
                    }
                    KeyCode::Char('c') => {
                        logs.clear();
                        log_scroll = 0;
                    }
                    KeyCode::Up => log_scroll = log_scroll.saturating_add(1),
                    KeyCode::Down => log_scroll = log_scroll.saturating_sub(1),
                    KeyCode::Home => log_scroll = 0,
                    _ => {}
                }
            }
        }
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
