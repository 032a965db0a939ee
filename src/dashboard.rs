use crate::config::{clamp_iterations, MAX_ITERATIONS, MIN_ITERATIONS};
use crate::events::{IterationOutcome, OrchestratorEvent, RunState};
use crate::orchestrator::{OrchestratorCommand, RunReport};
use crate::report::{
    format_delta_ms, format_ms, format_percent, INTERPRETATION, RECOMMENDATION,
};
use crate::stats::Metric;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame, Terminal,
};
use std::collections::VecDeque;
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;

const MAX_LOG_LINES: usize = 50;

/// Interactive front end for the test orchestrator
pub struct Dashboard {
    measurer_url: String,
    target_url: String,
    iterations: u32,
    state: RunState,
    /// URL being typed, while in edit mode
    editing: Option<String>,
    iteration_log: VecDeque<String>,
    report: Option<RunReport>,
    should_quit: bool,
}

impl Dashboard {
    pub fn new(measurer_url: String, target_url: String, iterations: u32) -> Self {
        Self {
            measurer_url,
            target_url,
            iterations: clamp_iterations(iterations),
            state: RunState::Idle,
            editing: None,
            iteration_log: VecDeque::new(),
            report: None,
            should_quit: false,
        }
    }

    /// Run the main dashboard loop
    pub async fn run(
        &mut self,
        mut event_receiver: mpsc::UnboundedReceiver<OrchestratorEvent>,
        command_sender: mpsc::UnboundedSender<OrchestratorCommand>,
    ) -> anyhow::Result<()> {
        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        loop {
            tokio::select! {
                event = event_receiver.recv() => {
                    if let Some(event) = event {
                        self.handle_event(event);
                    }
                }

                _ = tokio::time::sleep(Duration::from_millis(16)) => {
                    if event::poll(Duration::from_millis(0))? {
                        if let Event::Key(key) = event::read()? {
                            self.handle_key(key.code, &command_sender);
                        }
                    }
                }
            }

            terminal.draw(|f| self.render(f))?;

            if self.should_quit {
                break;
            }
        }

        // Cleanup terminal
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        Ok(())
    }

    fn handle_event(&mut self, event: OrchestratorEvent) {
        match event {
            OrchestratorEvent::ServerStarted { measurer_url } => {
                self.measurer_url = measurer_url;
            }
            OrchestratorEvent::RunStarted {
                target_url,
                iterations,
            } => {
                self.state = RunState::Running {
                    iteration: 0,
                    total: iterations,
                };
                self.report = None;
                self.iteration_log.clear();
                self.push_log(format!("▶ {iterations} iterations against {target_url}"));
            }
            OrchestratorEvent::SubCallFailed {
                path,
                iteration,
                error,
            } => {
                self.push_log(format!("  #{iteration} {path} failed: {error}"));
            }
            OrchestratorEvent::IterationCompleted(outcome) => {
                self.state = RunState::Running {
                    iteration: outcome.iteration,
                    total: outcome.total,
                };
                self.push_log(describe_iteration(&outcome));
            }
            OrchestratorEvent::RunCompleted(report) => {
                self.state = RunState::Complete;
                self.push_log("■ Run complete".to_string());
                self.report = Some(*report);
            }
        }
    }

    fn handle_key(
        &mut self,
        code: KeyCode,
        commands: &mpsc::UnboundedSender<OrchestratorCommand>,
    ) {
        if let Some(buffer) = self.editing.as_mut() {
            match code {
                KeyCode::Char(c) => buffer.push(c),
                KeyCode::Backspace => {
                    buffer.pop();
                }
                KeyCode::Enter => {
                    let value = buffer.trim().to_string();
                    if !value.is_empty() {
                        self.target_url = value;
                    }
                    self.editing = None;
                }
                KeyCode::Esc => self.editing = None,
                _ => {}
            }
            return;
        }

        match code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('r') => {
                self.trigger_run(commands);
            }
            KeyCode::Char('u') if !self.state.is_running() => {
                self.editing = Some(self.target_url.clone());
            }
            KeyCode::Char('+') | KeyCode::Char('=') | KeyCode::Up => {
                self.iterations = (self.iterations + 1).min(MAX_ITERATIONS);
            }
            KeyCode::Char('-') | KeyCode::Down => {
                self.iterations = self.iterations.saturating_sub(1).max(MIN_ITERATIONS);
            }
            _ => {}
        }
    }

    /// Ask the orchestrator for a run. Ignored while one is in progress.
    fn trigger_run(&mut self, commands: &mpsc::UnboundedSender<OrchestratorCommand>) -> bool {
        if self.state.is_running() || self.target_url.trim().is_empty() {
            return false;
        }

        self.state = RunState::Running {
            iteration: 0,
            total: self.iterations,
        };
        self.report = None;
        commands
            .send(OrchestratorCommand::Run {
                target_url: self.target_url.clone(),
                iterations: self.iterations,
            })
            .is_ok()
    }

    fn push_log(&mut self, line: String) {
        self.iteration_log.push_back(line);
        while self.iteration_log.len() > MAX_LOG_LINES {
            self.iteration_log.pop_front();
        }
    }

    fn render(&self, f: &mut Frame) {
        let main_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(5), // Title and inputs
                Constraint::Length(9), // Path cards
                Constraint::Length(9), // Analysis
                Constraint::Min(0),    // Iteration log
                Constraint::Length(1), // Status bar
            ])
            .split(f.size());

        self.render_header(f, main_chunks[0]);
        self.render_cards(f, main_chunks[1]);
        self.render_analysis(f, main_chunks[2]);
        self.render_log(f, main_chunks[3]);
        self.render_status_bar(f, main_chunks[4]);
    }

    fn render_header(&self, f: &mut Frame, area: Rect) {
        let target = match &self.editing {
            Some(buffer) => format!("{buffer}▏ (Enter to confirm, Esc to cancel)"),
            None => self.target_url.clone(),
        };
        let region = self
            .report
            .as_ref()
            .and_then(|r| r.region.as_deref())
            .unwrap_or("unknown");
        let text = format!(
            "🧪 Edge Latency Probe   [{}]\n🎯 Target: {}\n🔁 Iterations: {}   🔗 Measurers: {}   🌍 Region: {}",
            self.state, target, self.iterations, self.measurer_url, region
        );

        let header = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL))
            .style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )
            .wrap(Wrap { trim: true });
        f.render_widget(header, area);
    }

    fn render_cards(&self, f: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(33),
                Constraint::Percentage(34),
                Constraint::Percentage(33),
            ])
            .split(area);

        let report = self.report.as_ref();
        let derived = report.map(|r| &r.derived);

        let client_text = format!(
            "Browser → Backend\n\n{}\nTotal round trip",
            format_ms(derived.and_then(|d| d.client_only_ms))
        );

        let proxy_text = match report {
            Some(r) => format!(
                "Browser → Edge → Backend\n\n{}\nreceipt→fetch {}\nedge→backend {}\nbackend→send {}",
                format_ms(r.derived.proxied_ms),
                format_ms(r.proxy.mean(Metric::ReceiptToDispatch)),
                format_ms(r.proxy.mean(Metric::BackendTime)),
                format_ms(r.proxy.mean(Metric::ResponseToSend)),
            ),
            None => "Browser → Edge → Backend\n\nn/a".to_string(),
        };

        let direct_text = format!(
            "Edge server → Backend\n\n{}\nServer-side call time",
            format_ms(derived.and_then(|d| d.edge_to_backend_ms))
        );

        let cards = [
            ("Current setup", client_text, Color::Green),
            ("With edge proxy", proxy_text, Color::Yellow),
            ("Edge → backend", direct_text, Color::Blue),
        ];

        for (chunk, (title, text, color)) in chunks.iter().zip(cards) {
            let card = Paragraph::new(text)
                .block(Block::default().borders(Borders::ALL).title(title))
                .style(Style::default().fg(color))
                .wrap(Wrap { trim: true });
            f.render_widget(card, *chunk);
        }
    }

    fn analysis_text(&self) -> String {
        match &self.report {
            Some(report) => {
                let d = &report.derived;
                format!(
                    "Current latency:   {} per call\n\
                     With edge proxy:   {} per call\n\
                     Added overhead:    {} ({})\n\
                     ⚠️  Impact: {} proxied calls per page ≈ {} extra\n\
                     💡 {}",
                    format_ms(d.client_only_ms),
                    format_ms(d.proxied_ms),
                    format_delta_ms(d.added_overhead_ms),
                    format_percent(d.overhead_percent),
                    d.assumed_calls,
                    format_delta_ms(d.projected_impact_ms),
                    RECOMMENDATION,
                )
            }
            None => format!("Press [R] to run the latency tests\n\n{INTERPRETATION}"),
        }
    }

    fn render_analysis(&self, f: &mut Frame, area: Rect) {
        let analysis = Paragraph::new(self.analysis_text())
            .block(Block::default().borders(Borders::ALL).title("Analysis"))
            .style(Style::default().fg(Color::White))
            .wrap(Wrap { trim: true });
        f.render_widget(analysis, area);
    }

    fn render_log(&self, f: &mut Frame, area: Rect) {
        let visible = area.height.saturating_sub(2) as usize;
        let skip = self.iteration_log.len().saturating_sub(visible);
        let items: Vec<ListItem> = self
            .iteration_log
            .iter()
            .skip(skip)
            .map(|line| ListItem::new(line.as_str()).style(Style::default().fg(Color::Gray)))
            .collect();

        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title("Iterations"));
        f.render_widget(list, area);
    }

    fn render_status_bar(&self, f: &mut Frame, area: Rect) {
        let status_text = if self.editing.is_some() {
            "✏️  Editing target URL │ [Enter] confirm │ [Esc] cancel".to_string()
        } else if self.state.is_running() {
            format!("⏳ {} │ [Q] quit", self.state)
        } else {
            "🟢 Ready │ [R] run │ [U] edit URL │ [+/-] iterations │ [Q] quit".to_string()
        };

        let status =
            Paragraph::new(status_text).style(Style::default().bg(Color::Blue).fg(Color::White));
        f.render_widget(status, area);
    }
}

fn describe_iteration(outcome: &IterationOutcome) -> String {
    let client = if outcome.client_only_rejected {
        format!("{} (rejected)", format_ms(Some(outcome.client_only_ms)))
    } else {
        format_ms(Some(outcome.client_only_ms))
    };
    format!(
        "#{}/{}  proxy {}  direct {}  client {}",
        outcome.iteration,
        outcome.total,
        format_ms(outcome.proxy_ms),
        format_ms(outcome.direct_ms),
        client
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{derive_metrics, AggregateStats, TestPath};
    use chrono::Utc;

    fn dashboard() -> Dashboard {
        Dashboard::new(
            "http://127.0.0.1:3000/".to_string(),
            "https://api.example.test/".to_string(),
            5,
        )
    }

    fn empty_report() -> RunReport {
        let stats = AggregateStats::new();
        let proxy = stats.summary(TestPath::Proxy);
        let direct = stats.summary(TestPath::Direct);
        let client_only = stats.summary(TestPath::ClientOnly);
        let derived = derive_metrics(&proxy, &direct, &client_only, 10);
        RunReport {
            target_url: "https://api.example.test/".to_string(),
            measurer_url: "http://127.0.0.1:3000/".to_string(),
            iterations: 1,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            proxy,
            direct,
            client_only,
            derived,
            region: None,
            stats,
        }
    }

    #[test]
    fn test_run_key_sends_command_once_while_running() {
        let mut dash = dashboard();
        let (commands, mut rx) = mpsc::unbounded_channel();

        dash.handle_key(KeyCode::Char('r'), &commands);
        dash.handle_key(KeyCode::Char('r'), &commands);

        assert!(dash.state.is_running());
        assert!(matches!(
            rx.try_recv(),
            Ok(OrchestratorCommand::Run { iterations: 5, .. })
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_events_drive_state_machine() {
        let mut dash = dashboard();
        dash.handle_event(OrchestratorEvent::RunStarted {
            target_url: "https://api.example.test/".to_string(),
            iterations: 2,
        });
        assert_eq!(
            dash.state,
            RunState::Running {
                iteration: 0,
                total: 2
            }
        );

        dash.handle_event(OrchestratorEvent::IterationCompleted(IterationOutcome {
            iteration: 1,
            total: 2,
            proxy_ms: None,
            direct_ms: Some(40.0),
            client_only_ms: 95.0,
            client_only_rejected: true,
        }));
        assert_eq!(
            dash.state,
            RunState::Running {
                iteration: 1,
                total: 2
            }
        );
        assert!(dash
            .iteration_log
            .back()
            .unwrap()
            .contains("proxy n/a  direct ~40ms  client ~95ms (rejected)"));

        dash.handle_event(OrchestratorEvent::RunCompleted(Box::new(empty_report())));
        assert_eq!(dash.state, RunState::Complete);
        assert!(dash.report.is_some());

        // A new run clears the previous results before it starts
        dash.handle_event(OrchestratorEvent::RunStarted {
            target_url: "https://api.example.test/".to_string(),
            iterations: 1,
        });
        assert!(dash.report.is_none());
        assert_eq!(dash.iteration_log.len(), 1);
    }

    #[test]
    fn test_analysis_panel_carries_guidance() {
        let mut dash = dashboard();
        assert!(dash.analysis_text().contains(INTERPRETATION));

        dash.handle_event(OrchestratorEvent::RunCompleted(Box::new(empty_report())));
        let text = dash.analysis_text();
        assert!(text.contains("Added overhead:    n/a (n/a)"));
        assert!(text.contains(RECOMMENDATION));
    }

    #[test]
    fn test_edit_target_url() {
        let mut dash = dashboard();
        let (commands, _rx) = mpsc::unbounded_channel();

        dash.handle_key(KeyCode::Char('u'), &commands);
        for _ in 0..dash.target_url.len() {
            dash.handle_key(KeyCode::Backspace, &commands);
        }
        for c in "http://other.test".chars() {
            dash.handle_key(KeyCode::Char(c), &commands);
        }
        // 'q' while editing is text, not quit
        dash.handle_key(KeyCode::Char('q'), &commands);
        dash.handle_key(KeyCode::Enter, &commands);

        assert_eq!(dash.target_url, "http://other.testq");
        assert!(!dash.should_quit);
        assert!(dash.editing.is_none());
    }

    #[test]
    fn test_iterations_stay_in_range() {
        let mut dash = dashboard();
        let (commands, _rx) = mpsc::unbounded_channel();
        for _ in 0..30 {
            dash.handle_key(KeyCode::Char('+'), &commands);
        }
        assert_eq!(dash.iterations, MAX_ITERATIONS);
        for _ in 0..30 {
            dash.handle_key(KeyCode::Char('-'), &commands);
        }
        assert_eq!(dash.iterations, MIN_ITERATIONS);
    }
}
