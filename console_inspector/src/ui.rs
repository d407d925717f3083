use std::collections::VecDeque;

use console_core::{BrokerTransport, Console, HeadlessSurface, LayerSummary, Phase};
use console_proto::SubSystemState;
use ratatui::layout::{Constraint, Direction, Layout, Margin};
use ratatui::prelude::Rect;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Connected,
    Disconnected,
    Replaying { delivered: usize, total: usize },
}

pub struct ChainRow {
    pub id: String,
    pub label: String,
    pub selected: bool,
    pub running: bool,
    pub state: SubSystemState,
}

pub struct SubSystemRow {
    pub id: String,
    pub label: String,
    pub state: SubSystemState,
    pub rate_mask: String,
}

pub struct UiState {
    pub status: FeedStatus,
    pub phase: Phase,
    pub reloads: usize,
    pub timers: usize,
    pub chains: Vec<ChainRow>,
    pub subsystems: Vec<SubSystemRow>,
    pub layers: Vec<LayerSummary>,
    pub logs: VecDeque<String>,
    pub max_logs: usize,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            status: FeedStatus::Disconnected,
            phase: Phase::Discovering,
            reloads: 0,
            timers: 0,
            chains: Vec::new(),
            subsystems: Vec::new(),
            layers: Vec::new(),
            logs: VecDeque::new(),
            max_logs: 8,
        }
    }
}

impl UiState {
    /// Snapshot what the console currently knows.
    pub fn capture<B: BrokerTransport>(
        &mut self,
        console: &mut Console<B, HeadlessSurface>,
        status: FeedStatus,
    ) {
        self.status = status;
        self.phase = console.phase();
        self.reloads = console.reload_count();
        self.timers = console.timer_count();
        self.layers = console.layer_summaries();

        let model = console.model();
        self.chains = model
            .chains()
            .map(|chain| ChainRow {
                id: chain.id.to_string(),
                label: chain.label.clone(),
                selected: model.is_selected(&chain.id),
                running: chain.is_running,
                state: chain.state,
            })
            .collect();
        self.subsystems = model
            .selected()
            .map(|chain| {
                model
                    .bound(chain)
                    .iter()
                    .map(|bound| {
                        let available = model.available_subsystem(&bound.id);
                        SubSystemRow {
                            id: bound.id.to_string(),
                            label: available.map(|a| a.label.clone()).unwrap_or_default(),
                            state: available.map_or(SubSystemState::Unknown, |a| a.state),
                            rate_mask: available.map(|a| a.rate_mask.clone()).unwrap_or_default(),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
    }

    pub fn push_log<S: Into<String>>(&mut self, line: S) {
        let mut text: String = line.into();
        while text.ends_with('\n') || text.ends_with('\r') {
            text.pop();
        }
        if text.is_empty() {
            return;
        }
        self.logs.push_front(text);
        while self.logs.len() > self.max_logs {
            self.logs.pop_back();
        }
    }
}

fn state_color(state: SubSystemState) -> Color {
    match state {
        SubSystemState::Operational => Color::Green,
        SubSystemState::Caution => Color::Yellow,
        SubSystemState::Failure => Color::Red,
        SubSystemState::Unknown => Color::DarkGray,
    }
}

pub fn draw_ui(frame: &mut Frame, state: &UiState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(10),
            Constraint::Length(3),
        ])
        .split(frame.size());
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(rows[1]);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(columns[0]);

    draw_header(frame, rows[0], state);
    draw_chains(frame, left[0], state);
    draw_subsystems(frame, left[1], state);
    draw_layers(frame, columns[1], state);
    draw_logs(frame, rows[2], state);
    draw_commands(frame, rows[3]);
}

fn render_boxed(frame: &mut Frame, area: Rect, title: &str, lines: Vec<Line>) {
    let block = Block::default().borders(Borders::ALL).title(title.to_string());
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    frame.render_widget(block, area);
    frame.render_widget(
        paragraph,
        area.inner(&Margin {
            vertical: 1,
            horizontal: 1,
        }),
    );
}

fn draw_header(frame: &mut Frame, area: Rect, state: &UiState) {
    let status = match state.status {
        FeedStatus::Connected => Span::styled("Connected", Style::default().fg(Color::Green)),
        FeedStatus::Disconnected => Span::styled("Disconnected", Style::default().fg(Color::Red)),
        FeedStatus::Replaying { delivered, total } => Span::styled(
            format!("Replay {delivered}/{total}"),
            Style::default().fg(Color::Cyan),
        ),
    };
    let line = Line::from(vec![
        status,
        Span::raw(" | phase "),
        Span::styled(
            format!("{:?}", state.phase),
            Style::default().fg(Color::Yellow),
        ),
        Span::raw(format!(
            " | reloads {} | timers {}",
            state.reloads, state.timers
        )),
    ]);
    render_boxed(frame, area, "Sensor Console Inspector", vec![line]);
}

fn draw_chains(frame: &mut Frame, area: Rect, state: &UiState) {
    let lines = state
        .chains
        .iter()
        .map(|chain| {
            let marker = if chain.selected { "*" } else { " " };
            let running = if chain.running { "running" } else { "stopped" };
            Line::from(vec![
                Span::raw(format!("{marker} {} ", chain.id)),
                Span::styled(chain.label.clone(), Style::default().fg(Color::Cyan)),
                Span::raw(format!(" | {running} | ")),
                Span::styled(
                    chain.state.to_string(),
                    Style::default().fg(state_color(chain.state)),
                ),
            ])
        })
        .collect();
    render_boxed(frame, area, "Chains", lines);
}

fn draw_subsystems(frame: &mut Frame, area: Rect, state: &UiState) {
    let lines = state
        .subsystems
        .iter()
        .enumerate()
        .map(|(index, sub)| {
            Line::from(vec![
                Span::raw(format!("{:>2}. {} ", index + 1, sub.id)),
                Span::styled(sub.label.clone(), Style::default().fg(Color::Cyan)),
                Span::raw(" | "),
                Span::styled(
                    sub.state.to_string(),
                    Style::default().fg(state_color(sub.state)),
                ),
                Span::raw(" | rate "),
                Span::styled(sub.rate_mask.clone(), Style::default().fg(Color::Magenta)),
            ])
        })
        .collect();
    render_boxed(frame, area, "Bound Subsystems", lines);
}

fn draw_layers(frame: &mut Frame, area: Rect, state: &UiState) {
    let lines = state
        .layers
        .iter()
        .map(|layer| {
            let visible = if layer.visible { "on " } else { "off" };
            Line::from(vec![
                Span::styled(
                    format!("{:<8}", layer.kind),
                    Style::default().fg(Color::Yellow),
                ),
                Span::raw(format!(" {visible} ")),
                Span::raw(format!("op {} ", layer.opacity.level())),
                Span::styled(
                    format!("{:>5}", layer.activity),
                    Style::default().fg(Color::Cyan),
                ),
                Span::raw(format!("  {}", layer.layer)),
            ])
        })
        .collect();
    render_boxed(frame, area, "Layers", lines);
}

fn draw_logs(frame: &mut Frame, area: Rect, state: &UiState) {
    let lines = state
        .logs
        .iter()
        .map(|entry| Line::from(Span::raw(entry.clone())))
        .collect();
    render_boxed(frame, area, "Logs", lines);
}

fn draw_commands(frame: &mut Frame, area: Rect) {
    let key = Style::default().fg(Color::Yellow);
    let line = Line::from(vec![
        Span::styled("s", key),
        Span::raw(" save  "),
        Span::styled("u", key),
        Span::raw(" undo  "),
        Span::styled("r", key),
        Span::raw(" start/stop chain  "),
        Span::styled("q", key),
        Span::raw(" exit"),
    ]);
    render_boxed(frame, area, "Commands", vec![line]);
}
