use itertools::Itertools;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Widget, Wrap},
};
use unicode_width::UnicodeWidthStr;
use webbrowser::Browser;

use quizdeck::app::{App, Overlay};
use quizdeck::choice::ChoiceMark;
use quizdeck::navigation::ControlState;
use quizdeck::question::{ConfidenceRating, Question};
use quizdeck::session::{DeliveryMode, PauseReason, RenderState, SessionState};
use quizdeck::util::format_clock;

const HORIZONTAL_MARGIN: u16 = 3;

/// Whole-screen view of the app
pub struct QuizView<'a> {
    app: &'a App,
}

impl<'a> QuizView<'a> {
    pub fn new(app: &'a App) -> Self {
        Self { app }
    }
}

/// Cut `text` to at most `max` columns, marking the cut with an ellipsis
fn fit_width(text: &str, max: usize) -> String {
    if text.width() <= max {
        return text.to_string();
    }
    let mut out = String::new();
    for c in text.chars() {
        let next = format!("{out}{c}");
        if next.width() + 1 > max {
            break;
        }
        out = next;
    }
    out.push('…');
    out
}

impl Widget for QuizView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let state = self.app.session.render_state();

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(3),
                Constraint::Length(3),
            ])
            .split(area);

        render_header(self.app, &state, chunks[0], buf);
        render_body(self.app, &state, chunks[1], buf);
        render_footer(&state, chunks[2], buf);

        if let Overlay::List { cursor } = self.app.overlay {
            render_list(&state, cursor, area, buf);
        }
    }
}

fn render_header(app: &App, state: &RenderState<'_>, area: Rect, buf: &mut Buffer) {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let dim = Style::default().add_modifier(Modifier::DIM);

    let position = match state.question.map(Question::position) {
        Some(p) => format!("Q {}/{}", p, state.total_screens - 1),
        None => format!("{} questions", state.total_screens - 1),
    };
    let mut right = vec![Span::styled(position, dim)];
    if matches!(state.state, SessionState::InProgress | SessionState::Paused(_)) {
        right.push(Span::raw("  "));
        right.push(Span::styled(format!("{} left", state.remaining), dim));
    }
    if state.mode != DeliveryMode::Individual {
        right.push(Span::raw("  "));
        right.push(Span::styled(format_clock(state.elapsed), bold));
    }
    let right_width: usize = right.iter().map(|s| s.content.width()).sum();

    let inner_width = area.width.saturating_sub(2) as usize;
    let title = fit_width(
        &format!("quizdeck · {} · {}", app.bank.name(), state.mode),
        inner_width.saturating_sub(right_width + 2),
    );
    let gap = inner_width.saturating_sub(title.width() + right_width);

    let mut spans = vec![Span::styled(title, bold.fg(Color::Cyan)), Span::raw(" ".repeat(gap))];
    spans.extend(right);

    Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL))
        .render(area, buf);
}

fn render_body(app: &App, state: &RenderState<'_>, area: Rect, buf: &mut Buffer) {
    let italic = Style::default().add_modifier(Modifier::ITALIC);
    let yellow = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);

    let lines: Vec<Line> = match state.state {
        SessionState::Loading if !app.session.is_loaded() => {
            vec![Line::styled("Loading questions…", italic)]
        }
        SessionState::Loading => intro_lines(state),
        SessionState::Paused(PauseReason::User) => {
            vec![Line::styled("Paused. Press p to continue.", yellow)]
        }
        SessionState::Paused(PauseReason::Confirming) => vec![
            Line::styled(
                format!(
                    "{} question{} still unanswered.",
                    state.remaining,
                    if state.remaining == 1 { " is" } else { "s are" }
                ),
                yellow,
            ),
            Line::raw(""),
            Line::raw("Finish anyway? (y)es / (n)o"),
        ],
        SessionState::Paused(PauseReason::Error) => vec![
            Line::styled("Something went wrong.", Style::default().fg(Color::Red)),
            Line::raw(state.error.unwrap_or_default().to_string()),
            Line::raw(""),
            Line::styled("Press Enter to try again.", italic),
        ],
        SessionState::Finishing => vec![Line::styled("Submitting answers…", italic)],
        SessionState::Finished => finished_lines(app, state),
        SessionState::InProgress => match state.question {
            Some(question) => question_lines(question, state),
            None if state.screen == 1 => intro_lines(state),
            None => vec![Line::styled("Loading question…", italic)],
        },
    };

    let mut lines = lines;
    if let Some(notice) = &app.notice {
        lines.push(Line::raw(""));
        lines.push(Line::styled(notice.clone(), italic.fg(Color::Gray)));
    }

    Paragraph::new(lines)
        .block(Block::default().borders(Borders::LEFT | Borders::RIGHT))
        .wrap(Wrap { trim: false })
        .render(area, buf);
}

fn intro_lines(state: &RenderState<'_>) -> Vec<Line<'static>> {
    let how = match state.mode {
        DeliveryMode::Classic => "Answers are scored when you finish.",
        DeliveryMode::Preset => "Check each answer as you go.",
        DeliveryMode::Individual => "Questions arrive one at a time; check each answer to continue.",
    };
    vec![
        Line::styled(
            format!("{} questions", state.total_screens - 1),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Line::raw(how),
        Line::raw(""),
        Line::raw("Press Enter to start."),
    ]
}

fn question_lines<'a>(question: &'a Question, state: &RenderState<'_>) -> Vec<Line<'a>> {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let dim = Style::default().add_modifier(Modifier::DIM);

    let mut lines = vec![Line::styled(question.body(), bold), Line::raw("")];

    let keys = ('a'..='z').take(question.options().len());
    for (key, label) in keys.zip(question.options().labels.iter()) {
        let (marker, style) = match question.choice().mark_of(label) {
            ChoiceMark::Correct => ("✓", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
            ChoiceMark::Wrong => ("✗", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
            ChoiceMark::Checked => ("●", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            ChoiceMark::Default => ("○", Style::default()),
        };
        lines.push(Line::from(vec![
            Span::styled(format!(" {marker} ({key}) "), style),
            Span::styled(question.options().text_for(label), style),
        ]));
        if question.is_revealed() {
            if let Some(explanation) = question.explanation() {
                let text = explanation.text_for(label);
                if !text.is_empty() {
                    lines.push(Line::styled(format!("       {text}"), dim));
                }
            }
        }
    }

    lines.push(Line::raw(""));
    let confidence_spans = ConfidenceRating::ALL
        .iter()
        .map(|rating| {
            let text = format!("{} {}", rating.value(), rating);
            if question.confidence_rating() == Some(*rating) {
                Span::styled(text, Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD))
            } else {
                Span::styled(text, dim)
            }
        })
        .collect::<Vec<_>>();
    lines.push(Line::from(Itertools::intersperse(confidence_spans.into_iter(), Span::raw("  ")).collect::<Vec<_>>()));

    if let Some(elapsed) = state.question_elapsed {
        lines.push(Line::raw(""));
        lines.push(Line::styled(format!("time on this question {}", format_clock(elapsed)), dim));
    }
    lines
}

fn finished_lines(app: &App, state: &RenderState<'_>) -> Vec<Line<'static>> {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let italic = Style::default().add_modifier(Modifier::ITALIC);

    let (correct, total) = match state.report {
        Some(report) => (report.correct, report.total),
        None => {
            let (correct, _) = app.session.manager().score();
            (correct, app.session.manager().len())
        }
    };
    let percent = if total == 0 { 0.0 } else { correct as f64 * 100.0 / total as f64 };

    let mut lines = vec![
        Line::styled("Quiz finished", bold.fg(Color::Green)),
        Line::raw(""),
        Line::styled(format!("{correct} / {total} correct ({percent:.0}%)"), bold),
        Line::raw(format!("total time {}", format_clock(state.elapsed))),
    ];
    if let Some(url) = state.report_url {
        lines.push(Line::raw(""));
        lines.push(Line::raw(format!("report: {url}")));
    }
    lines.push(Line::raw(""));
    lines.push(Line::styled(
        if Browser::is_available() && state.report_url.is_some() {
            "(o)pen report / (enter) quit"
        } else {
            "(enter) quit"
        },
        italic,
    ));
    lines
}

fn control_span(label: String, enabled: bool, highlighted: bool) -> Span<'static> {
    let style = if !enabled {
        Style::default().add_modifier(Modifier::DIM | Modifier::CROSSED_OUT)
    } else if highlighted {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default().add_modifier(Modifier::BOLD)
    };
    Span::styled(label, style)
}

fn control_spans(controls: &ControlState) -> Vec<Span<'static>> {
    let spans = if controls.start_enabled {
        vec![control_span("⏎ Start".into(), true, true)]
    } else {
        vec![
            control_span("← Previous".into(), controls.previous_enabled, false),
            control_span(format!("→ {}", controls.next_action), controls.next_enabled, false),
            control_span(
                "f Finish".into(),
                controls.finish_enabled,
                controls.finish_highlighted,
            ),
            control_span("p Pause".into(), true, false),
            control_span("l List".into(), true, false),
        ]
    };
    Itertools::intersperse(spans.into_iter(), Span::raw("   ")).collect()
}

fn render_footer(state: &RenderState<'_>, area: Rect, buf: &mut Buffer) {
    let spans = match state.state {
        SessionState::InProgress | SessionState::Loading => control_spans(&state.controls),
        _ => vec![Span::styled(
            "esc quit",
            Style::default().add_modifier(Modifier::ITALIC),
        )],
    };
    Paragraph::new(Line::from(spans))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL))
        .render(area, buf);
}

fn render_list(state: &RenderState<'_>, cursor: usize, area: Rect, buf: &mut Buffer) {
    let height = (state.list.len() as u16 + 2).min(area.height);
    let width = 30.min(area.width);
    let popup = Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    };

    let items: Vec<ListItem> = state
        .list
        .iter()
        .map(|entry| {
            let status = match (entry.loaded, entry.done) {
                (_, true) => "done",
                (true, false) => "open",
                (false, false) => "not seen",
            };
            let text = format!(
                "{} Question {:>2}  {}",
                if entry.active { "▸" } else { " " },
                entry.position,
                status
            );
            let style = if entry.position == cursor {
                Style::default().bg(Color::Blue).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(text).style(style)
        })
        .collect();

    Clear.render(popup, buf);
    Widget::render(
        List::new(items).block(Block::default().borders(Borders::ALL).title("Jump to")),
        popup,
        buf,
    );
}
