use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use color_eyre::Result;
use console_core::{BrokerTransport, Console, HeadlessSurface};
use crossterm::event::{self, Event, KeyCode};
use ratatui::backend::CrosstermBackend;
use ratatui::prelude::*;
use tracing::{error, info, warn};

use crate::ui::{draw_ui, FeedStatus, UiState};

/// Source of broker traffic driven from the UI loop.
pub trait Feed<B: BrokerTransport> {
    /// Called before every console tick.
    fn advance(&mut self, console: &mut Console<B, HeadlessSurface>);
    fn status(&self) -> FeedStatus;
}

/// Connection changes reported by the bridge task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Disconnected,
}

pub struct LiveFeed {
    events: Receiver<LinkEvent>,
    connected: bool,
    connections: usize,
}

impl LiveFeed {
    pub fn new(events: Receiver<LinkEvent>) -> Self {
        Self {
            events,
            connected: false,
            connections: 0,
        }
    }
}

impl<B: BrokerTransport> Feed<B> for LiveFeed {
    fn advance(&mut self, console: &mut Console<B, HeadlessSurface>) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                LinkEvent::Connected => {
                    self.connected = true;
                    self.connections += 1;
                    // the first connection carries the subscriptions queued at start
                    if self.connections > 1 {
                        console.resubscribe();
                    }
                }
                LinkEvent::Disconnected => self.connected = false,
            }
        }
    }

    fn status(&self) -> FeedStatus {
        if self.connected {
            FeedStatus::Connected
        } else {
            FeedStatus::Disconnected
        }
    }
}

pub struct InspectorApp<B: BrokerTransport, F> {
    terminal: Terminal<CrosstermBackend<std::io::Stdout>>,
    ui_state: UiState,
    console: Console<B, HeadlessSurface>,
    feed: F,
    log_receiver: Receiver<String>,
}

impl<B: BrokerTransport, F: Feed<B>> InspectorApp<B, F> {
    pub fn new(
        console: Console<B, HeadlessSurface>,
        feed: F,
        log_receiver: Receiver<String>,
    ) -> Result<Self> {
        let stdout = std::io::stdout();
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        crossterm::terminal::enable_raw_mode()?;
        terminal.clear()?;
        terminal.hide_cursor()?;
        Ok(Self {
            terminal,
            ui_state: UiState::default(),
            console,
            feed,
            log_receiver,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let mut last_draw = Instant::now();

        loop {
            self.feed.advance(&mut self.console);
            self.console.tick();

            while let Ok(line) = self.log_receiver.try_recv() {
                self.ui_state.push_log(line);
            }

            if last_draw.elapsed() >= Duration::from_millis(100) {
                self.ui_state.capture(&mut self.console, self.feed.status());
                self.terminal.draw(|frame| draw_ui(frame, &self.ui_state))?;
                last_draw = Instant::now();
            }

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => break,
                        KeyCode::Char('s') => self.save(),
                        KeyCode::Char('u') => {
                            self.console.undo_changes();
                            info!(target: "sensor_console::inspector", "Local edits discarded");
                        }
                        KeyCode::Char('r') => self.toggle_running(),
                        _ => {}
                    }
                }
            }
        }

        self.terminal.show_cursor()?;
        crossterm::terminal::disable_raw_mode()?;
        Ok(())
    }

    fn save(&mut self) {
        match self.console.save_settings() {
            Ok(published) => info!(
                target: "sensor_console::inspector",
                published,
                "Settings saved"
            ),
            Err(err) => error!(
                target: "sensor_console::inspector",
                "Failed to save settings: {}", err
            ),
        }
    }

    fn toggle_running(&mut self) {
        match self.console.toggle_running() {
            Ok(running) => info!(
                target: "sensor_console::inspector",
                running,
                "Chain running state toggled"
            ),
            Err(err) => warn!(
                target: "sensor_console::inspector",
                "Cannot toggle running: {}", err
            ),
        }
    }
}
