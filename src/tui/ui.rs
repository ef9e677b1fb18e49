//! TUI rendering with ratatui

use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Wrap},
};

use super::app::{App, Screen};
use crate::{MonitorMode, WorkflowState};

/// Main render function
pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),    // Screen body
            Constraint::Length(3), // Help bar
        ])
        .split(frame.area());

    match app.screen() {
        Screen::Loading => render_loading(frame, app, chunks[0]),
        Screen::Welcome => render_welcome(frame, chunks[0]),
        Screen::Workflow => render_workflow(frame, app, chunks[0]),
        Screen::Results => render_results(frame, app, chunks[0]),
    }
    render_help_bar(frame, app, chunks[1]);
}

fn titled(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .title(title)
        .title_alignment(Alignment::Center)
        .border_style(Style::default().fg(Color::Blue))
}

fn render_loading(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(3), Constraint::Min(1)])
        .split(area);

    let gauge = Gauge::default()
        .block(titled(" Which USB? "))
        .gauge_style(Style::default().fg(Color::Blue))
        .percent(u16::from(app.progress().min(100)))
        .label(app.status().to_string());
    frame.render_widget(gauge, chunks[1]);
}

fn render_welcome(frame: &mut Frame, area: Rect) {
    let text = vec![
        Line::from(""),
        Line::from(Span::styled(
            "Hi there! I'm here to help you identify your USB device!",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("Is the device you're trying to identify already connected to your computer by USB?"),
        Line::from(""),
        Line::from(vec![
            Span::styled("[y] ", Style::default().fg(Color::Yellow)),
            Span::raw("Yes, it's connected    "),
            Span::styled("[n] ", Style::default().fg(Color::Yellow)),
            Span::raw("No, it's not connected"),
        ]),
    ];

    let welcome = Paragraph::new(text)
        .block(titled(" Which USB? "))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    frame.render_widget(welcome, area);
}

fn render_workflow(frame: &mut Frame, app: &App, area: Rect) {
    let mut text = vec![
        Line::from(""),
        Line::from(Span::styled(
            state_label(app.state()),
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(""),
        Line::from(app.status().to_string()),
        Line::from(""),
    ];

    if let Some(seconds) = app.countdown() {
        text.push(Line::from(Span::styled(
            seconds.to_string(),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )));
    }

    if let Some(message) = app.outcome_message() {
        text.push(Line::from(Span::styled(
            format!("✓ {}", message),
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )));
        text.push(Line::from(""));
        text.push(Line::from("Press Enter to view the results"));
    }

    let body = Paragraph::new(text)
        .block(titled(" Identifying "))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    frame.render_widget(body, area);
}

fn render_results(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(9), Constraint::Min(3)])
        .split(area);

    let label = Style::default().fg(Color::DarkGray);
    let value = Style::default().fg(Color::Cyan);
    let fields = match app.identified() {
        Some(dev) => vec![
            Line::from(vec![
                Span::styled("Device:      ", label),
                Span::styled(dev.description.clone(), value),
            ]),
            Line::from(vec![
                Span::styled("Vendor ID:   ", label),
                Span::styled(dev.vendor_id.clone(), value),
            ]),
            Line::from(vec![
                Span::styled("Product ID:  ", label),
                Span::styled(dev.product_id.clone(), value),
            ]),
            Line::from(vec![
                Span::styled("Bus:         ", label),
                Span::styled(dev.bus.clone(), value),
            ]),
            Line::from(vec![
                Span::styled("Device No.:  ", label),
                Span::styled(dev.device_number.clone(), value),
            ]),
            Line::from(vec![
                Span::styled("Plain text:  ", label),
                Span::styled(dev.to_string(), value),
            ]),
        ],
        None => vec![Line::from("No device changes detected")],
    };
    frame.render_widget(
        Paragraph::new(fields).block(titled(" Identified Device ")),
        chunks[0],
    );

    let report = app
        .report()
        .map(|r| r.text().to_string())
        .unwrap_or_else(|| "No detailed inspection available".to_string());
    frame.render_widget(
        Paragraph::new(report)
            .block(titled(" Detailed Inspection "))
            .wrap(Wrap { trim: false })
            .scroll((app.scroll(), 0)),
        chunks[1],
    );
}

fn render_help_bar(frame: &mut Frame, app: &App, area: Rect) {
    let help = match app.screen() {
        Screen::Loading => "Enter: skip  q: quit",
        Screen::Welcome => "y: connected  n: not connected  q: quit",
        Screen::Workflow => "r: start over  q: quit",
        Screen::Results => "↑/↓ PgUp/PgDn: scroll  r: start over  q: quit",
    };
    let bar = Paragraph::new(help)
        .style(Style::default().fg(Color::DarkGray))
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center);
    frame.render_widget(bar, area);
}

fn state_label(state: WorkflowState) -> String {
    match state {
        WorkflowState::Idle => "Idle".to_string(),
        WorkflowState::CapturingBaseline => "Capturing baseline".to_string(),
        WorkflowState::AwaitingUserAction(MonitorMode::Disconnect) => {
            "Get ready to disconnect".to_string()
        }
        WorkflowState::AwaitingUserAction(MonitorMode::Connect) => {
            "Get ready to connect".to_string()
        }
        WorkflowState::Monitoring(mode) => format!("Watching for {}", mode),
        WorkflowState::Differencing => "Comparing captures".to_string(),
        WorkflowState::Inspecting => "Inspecting device".to_string(),
        WorkflowState::Succeeded(_) => "Done".to_string(),
    }
}
