use crate::app::{App, AppMode};
use cadence_core::{Clock, Hms, NotificationSink, SnapshotStore, Status};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Gauge, Paragraph},
    Frame,
};

pub fn draw<C: Clock, S: SnapshotStore, N: NotificationSink>(f: &mut Frame, app: &App<C, S, N>) {
    let area = f.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(area);

    draw_header(f, chunks[0], app);
    draw_countdown(f, chunks[1], app);
    draw_intervals(f, chunks[2], app);
    draw_status_bar(f, chunks[3], app);

    if app.mode == AppMode::ShowHelp {
        draw_help_overlay(f, app);
    }
}

fn draw_header<C: Clock, S: SnapshotStore, N: NotificationSink>(f: &mut Frame, area: Rect, app: &App<C, S, N>) {
    let theme = &app.config.theme;
    let icons = &app.config.icons;
    let text = Line::from(vec![
        Span::raw(icons.header_left.clone()),
        Span::styled(
            app.runner.definition().name.to_uppercase(),
            Style::default().fg(theme.blue).add_modifier(Modifier::BOLD),
        ),
        Span::raw(icons.header_right.clone()),
    ]);
    f.render_widget(
        Paragraph::new(text).alignment(Alignment::Center).block(
            Block::default()
                .borders(Borders::BOTTOM)
                .border_style(Style::default().fg(theme.black)),
        ),
        area,
    );
}

fn draw_countdown<C: Clock, S: SnapshotStore, N: NotificationSink>(f: &mut Frame, area: Rect, app: &App<C, S, N>) {
    let theme = &app.config.theme;
    let icons = &app.config.icons;
    let status = app.runner.status();
    let (state_icon, accent) = match status.status {
        Status::Running if status.is_rest => (&icons.play, theme.cyan),
        Status::Running => (&icons.play, theme.green),
        Status::Paused => (&icons.pause, theme.yellow),
        Status::Idle => (&icons.stop, theme.gray),
    };
    let cycle = match status.status {
        Status::Idle => format!("cycles {}", app.cycle_limit),
        _ => format!("cycle {}/{}", status.cycle_index + 1, status.cycle_limit),
    };
    let block = Block::default()
        .title(Span::styled(
            format!(" {} {} {} ", icons.timer, state_icon, cycle),
            Style::default().fg(theme.gray),
        ))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(accent));
    let inner_area = block.inner(area);
    f.render_widget(block, area);
    let v_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(inner_area);
    f.render_widget(
        Paragraph::new(app.remaining().to_string())
            .style(Style::default().fg(theme.foreground).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center),
        v_chunks[0],
    );
    f.render_widget(
        Gauge::default()
            .gauge_style(Style::default().fg(accent).bg(theme.black))
            .percent((app.progress() * 100.0) as u16),
        v_chunks[1],
    );
}

fn draw_intervals<C: Clock, S: SnapshotStore, N: NotificationSink>(f: &mut Frame, area: Rect, app: &App<C, S, N>) {
    let theme = &app.config.theme;
    let icons = &app.config.icons;
    let block = Block::default()
        .title(Span::styled(
            format!(" {} Intervals ", icons.interval_list),
            Style::default().fg(theme.gray),
        ))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.green));
    let inner_area = block.inner(area);
    f.render_widget(block, area);

    let status = app.runner.status();
    let active = (status.status != Status::Idle).then_some(status.interval_index);
    let intervals = &app.runner.definition().intervals;
    let constraints: Vec<Constraint> = intervals.iter().map(|_| Constraint::Length(1)).collect();
    let rows = Layout::default().constraints(constraints).split(inner_area);
    for (i, interval) in intervals.iter().enumerate() {
        let Some(row) = rows.get(i) else {
            break;
        };
        let is_active = active == Some(i);
        let marker = if is_active {
            Span::styled(icons.select.clone(), Style::default().fg(theme.selection))
        } else {
            Span::raw(" ")
        };
        let (kind_icon, label, color) = if interval.is_rest {
            (&icons.rest, "Rest", theme.cyan)
        } else {
            (&icons.work, "Work", theme.green)
        };
        let left = Line::from(vec![
            marker,
            Span::styled(format!(" {} ", kind_icon), Style::default().fg(color)),
            Span::styled(label, Style::default().fg(theme.foreground)),
        ]);
        let right = Span::styled(
            format!(" {} ", Hms::from_seconds(interval.duration.max(0) as u64)),
            Style::default().fg(theme.gray),
        );
        if is_active {
            f.render_widget(Block::default().style(Style::default().bg(theme.black)), *row);
        }
        f.render_widget(Paragraph::new(left), *row);
        f.render_widget(
            Paragraph::new(Line::from(right)).alignment(Alignment::Right),
            *row,
        );
    }
}

fn draw_status_bar<C: Clock, S: SnapshotStore, N: NotificationSink>(f: &mut Frame, area: Rect, app: &App<C, S, N>) {
    let theme = &app.config.theme;
    let (mode_text, mode_color) = match app.runner.engine().status() {
        Status::Running => ("RUNNING", theme.green),
        Status::Paused => ("PAUSED", theme.yellow),
        Status::Idle => ("IDLE", theme.magenta),
    };
    let detail = match (&app.last_error, &app.message) {
        (Some(error), _) => Span::styled(error.clone(), Style::default().fg(theme.red)),
        (None, Some(message)) => Span::raw(message.clone()),
        (None, None) => Span::raw("space:start/pause │ r:reset │ +/-:cycles │ u:unlimited │ ?:help │ q:quit"),
    };
    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(
                format!(" {} ", mode_text),
                Style::default()
                    .bg(mode_color)
                    .fg(theme.background)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" "),
            detail,
        ]))
        .block(Block::default().style(Style::default().bg(theme.black).fg(theme.gray))),
        area,
    );
}

fn draw_help_overlay<C: Clock, S: SnapshotStore, N: NotificationSink>(f: &mut Frame, app: &App<C, S, N>) {
    let area = centered_rect(60, 60, f.area());
    f.render_widget(Clear, area);

    let shortcuts = [
        ("Space", "Start / pause / resume"),
        ("r", "Reset"),
        ("+ / -", "More / fewer cycles"),
        ("u", "Toggle unlimited cycles"),
        ("?", "Toggle help"),
        ("q", "Quit"),
    ];
    let lines: Vec<Line> = shortcuts
        .iter()
        .map(|(key, action)| {
            Line::from(vec![
                Span::styled(format!("{:>8}  ", key), Style::default().fg(app.config.theme.blue)),
                Span::raw(*action),
            ])
        })
        .collect();
    f.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .title(" Help ")
                .borders(Borders::ALL)
                .border_type(BorderType::Double)
                .border_style(Style::default().fg(app.config.theme.magenta))
                .style(Style::default().bg(app.config.theme.background)),
        ),
        area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
