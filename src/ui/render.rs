use crate::alerts::{Alert, AlertLevel};
use crate::flows::{AttendanceSheet, QuizAttempt};
use crate::models::{
    AttendanceStatus, CoverageStatus, Course, Lecture, Restriction, RestrictionStatus,
    StudentAttendance, Topic,
};
use crate::reconciler::{BinaryStatus, ToggleBackend, Toggleable};
use crate::ui::state::{clamp_index, AppState, AttendanceMode, ToggleScreen, COURSE_MENU};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

const TITLE: &str = "LMS Desk";

pub fn render_ui(frame: &mut Frame, state: &AppState, alert: Option<&Alert>) {
    match state {
        AppState::Loading { message } => render_loading(frame, message),
        AppState::CourseSelection {
            courses,
            selected_index,
        } => {
            let rows: Vec<String> = courses
                .iter()
                .map(|c| {
                    if c.code.is_empty() {
                        c.name.clone()
                    } else {
                        format!("{} ({})", c.name, c.code)
                    }
                })
                .collect();
            render_selection(
                frame,
                "Select Course",
                &rows,
                *selected_index,
                &format!(
                    "Found: {} course(s) | [↑↓: Navigate | Enter: Select | q: Quit]",
                    courses.len()
                ),
            );
        }
        AppState::CourseMenu {
            course,
            selected_index,
        } => {
            let rows: Vec<String> = COURSE_MENU.iter().map(|s| s.to_string()).collect();
            render_selection(
                frame,
                &format!("Course: {}", course.name),
                &rows,
                *selected_index,
                "[↑↓: Navigate | Enter: Select | Esc: Back | q: Quit]",
            );
        }
        AppState::LectureSelection {
            course,
            lectures,
            selected_index,
            mode,
        } => {
            let action = match mode {
                AttendanceMode::Take => "Take Attendance",
                AttendanceMode::Edit => "Edit Attendance",
            };
            let rows: Vec<String> = lectures.iter().map(lecture_line).collect();
            render_selection(
                frame,
                &format!("{} - {} - Select Lecture", course.name, action),
                &rows,
                *selected_index,
                "[↑↓: Navigate | Enter: Select | Esc: Back | q: Quit]",
            );
        }
        AppState::AttendanceSheet {
            course,
            lecture,
            sheet,
            selected_index,
        } => render_attendance_sheet(frame, course, lecture, sheet, *selected_index),
        AppState::AttendanceRoster {
            course,
            lecture,
            screen,
        } => render_toggle_screen(
            frame,
            &format!("{} - {} - Attendance", course.name, lecture.title),
            screen,
            student_line,
            "[↑↓: Navigate | Space: Toggle | /: Search | r: Reload | e: Export CSV | Esc: Back]",
        ),
        AppState::ContentSelection {
            course,
            contents,
            selected_index,
        } => {
            let rows: Vec<String> = contents.iter().map(|c| c.title.clone()).collect();
            render_selection(
                frame,
                &format!("{} - Select Content", course.name),
                &rows,
                *selected_index,
                "[↑↓: Navigate | Enter: Select | Esc: Back | q: Quit]",
            );
        }
        AppState::TopicCoverage {
            course,
            content,
            screen,
        } => render_toggle_screen(
            frame,
            &format!("{} - {} - Topic Coverage", course.name, content.title),
            screen,
            topic_line,
            "[↑↓: Navigate | Space: Toggle | /: Search | r: Reload | Esc: Back]",
        ),
        AppState::Restrictions { screen } => render_toggle_screen(
            frame,
            "Restrictions",
            screen,
            restriction_line,
            "[↑↓: Navigate | Space: Toggle | /: Search | r: Reload | q: Quit]",
        ),
        AppState::QuizSelection {
            course,
            quizzes,
            selected_index,
        } => {
            let rows: Vec<String> = quizzes
                .iter()
                .map(|q| {
                    let deadline = q
                        .deadline
                        .map(|d| format!(" (Due: {})", d.format("%Y-%m-%d %H:%M")))
                        .unwrap_or_default();
                    format!("{}{}", q.title, deadline)
                })
                .collect();
            render_selection(
                frame,
                &format!("{} - Select Quiz", course.name),
                &rows,
                *selected_index,
                "[↑↓: Navigate | Enter: Start | Esc: Back | q: Quit]",
            );
        }
        AppState::QuizAttempt {
            attempt,
            selected_index,
            input,
            confirm_unanswered,
            ..
        } => render_quiz_attempt(
            frame,
            attempt,
            *selected_index,
            input.as_deref(),
            *confirm_unanswered,
        ),
        AppState::Error { message } => render_error(frame, message),
    }

    if let Some(alert) = alert {
        render_alert(frame, alert);
    }
}

fn render_loading(frame: &mut Frame, message: &str) {
    let area = frame.area();
    let block = Block::default()
        .title(TITLE)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let paragraph = Paragraph::new(message)
        .block(block)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    frame.render_widget(paragraph, area);
}

fn highlighted(selected: bool) -> (Style, &'static str) {
    if selected {
        (
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            "> ",
        )
    } else {
        (Style::default(), "  ")
    }
}

fn render_selection(
    frame: &mut Frame,
    title: &str,
    rows: &[String],
    selected_index: usize,
    help: &str,
) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(area);

    let items: Vec<ListItem> = if rows.is_empty() {
        vec![ListItem::new("  (nothing here yet)").style(Style::default().fg(Color::DarkGray))]
    } else {
        rows.iter()
            .enumerate()
            .map(|(i, row)| {
                let (style, prefix) = highlighted(i == selected_index);
                ListItem::new(format!("{}{}", prefix, row)).style(style)
            })
            .collect()
    };

    let list = List::new(items).block(
        Block::default()
            .title(title.to_string())
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(list, chunks[0]);

    let help = Paragraph::new(help.to_string())
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center);
    frame.render_widget(help, chunks[1]);
}

fn lecture_line(lecture: &Lecture) -> String {
    match lecture.starts_at {
        Some(at) => format!("{} ({})", lecture.title, at.format("%Y-%m-%d %H:%M")),
        None => lecture.title.clone(),
    }
}

fn status_style<S: BinaryStatus>(status: S) -> Style {
    if status.is_negative() {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(Color::Green)
    }
}

fn student_line(student: &StudentAttendance) -> Line<'static> {
    let marker = match student.status {
        AttendanceStatus::Present => "[P]",
        AttendanceStatus::Absent => "[A]",
    };
    Line::from(vec![
        Span::styled(marker, status_style(student.status)),
        Span::raw(format!(" {:<10} {}", student.roll_number, student.name)),
    ])
}

fn topic_line(topic: &Topic) -> Line<'static> {
    let (marker, style) = match topic.status {
        CoverageStatus::Covered => ("[x]", Style::default().fg(Color::Green)),
        CoverageStatus::NotCovered => ("[ ]", Style::default().fg(Color::DarkGray)),
    };
    Line::from(vec![
        Span::styled(marker, style),
        Span::raw(format!(" {}", topic.title)),
    ])
}

fn restriction_line(restriction: &Restriction) -> Line<'static> {
    let style = match restriction.status {
        RestrictionStatus::Allowed => Style::default().fg(Color::Green),
        RestrictionStatus::NotAllowed => Style::default().fg(Color::Red),
    };
    Line::from(vec![
        Span::styled(format!("{:<12}", restriction.status.label()), style),
        Span::raw(format!(
            " {} - {}",
            restriction.course_name, restriction.restriction_type
        )),
    ])
}

fn render_toggle_screen<T, B>(
    frame: &mut Frame,
    title: &str,
    screen: &ToggleScreen<T, B>,
    line: fn(&T) -> Line<'static>,
    help: &str,
) where
    T: Toggleable,
    B: ToggleBackend<T>,
{
    let area = frame.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(3),
        ])
        .split(area);

    let (items, query, loading, total) = screen.reconciler.with_state(|c| {
        let selected = clamp_index(screen.selected_index, c.visible().len());
        let items: Vec<ListItem> = c
            .visible()
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let (style, prefix) = highlighted(i == selected);
                let mut spans = vec![Span::styled(prefix, style)];
                spans.extend(line(item).spans);
                ListItem::new(Line::from(spans))
            })
            .collect();
        (items, c.query().to_string(), c.is_loading(), c.items().len())
    });

    let search_text = match &screen.search {
        Some(input) => format!("Search: {}_", input),
        None if query.is_empty() => "Search: (press / to filter)".to_string(),
        None => format!("Search: {}", query),
    };
    let search = Paragraph::new(search_text).block(Block::default().borders(Borders::ALL));
    frame.render_widget(search, chunks[0]);

    if loading && total == 0 {
        let paragraph = Paragraph::new("Loading...")
            .block(Block::default().title(title.to_string()).borders(Borders::ALL))
            .alignment(Alignment::Center);
        frame.render_widget(paragraph, chunks[1]);
    } else {
        let shown = items.len();
        let list = List::new(items).block(
            Block::default()
                .title(format!("{} ({}/{})", title, shown, total))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        );
        frame.render_widget(list, chunks[1]);
    }

    let help = Paragraph::new(help.to_string())
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center);
    frame.render_widget(help, chunks[2]);
}

fn render_attendance_sheet(
    frame: &mut Frame,
    course: &Course,
    lecture: &Lecture,
    sheet: &AttendanceSheet,
    selected_index: usize,
) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(3),
            Constraint::Length(3),
        ])
        .split(area);

    let (present, absent) = sheet.counts();
    let info = Paragraph::new(vec![
        Line::from(vec![
            Span::styled("Lecture: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(lecture_line(lecture)),
        ]),
        Line::from(vec![
            Span::styled("Present: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::styled(present.to_string(), Style::default().fg(Color::Green)),
            Span::styled("  Absent: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::styled(absent.to_string(), Style::default().fg(Color::Red)),
            Span::raw("  (not saved until submitted)"),
        ]),
    ])
    .block(
        Block::default()
            .title(format!("{} - Take Attendance", course.name))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(info, chunks[0]);

    let items: Vec<ListItem> = sheet
        .students
        .iter()
        .enumerate()
        .map(|(i, student)| {
            let (style, prefix) = highlighted(i == selected_index);
            let mut spans = vec![Span::styled(prefix, style)];
            spans.extend(student_line(student).spans);
            ListItem::new(Line::from(spans))
        })
        .collect();
    let list = List::new(items).block(Block::default().title("Students").borders(Borders::ALL));
    frame.render_widget(list, chunks[1]);

    let help = Paragraph::new(
        "[↑↓: Navigate | Space: Toggle | p/a: All present/absent | s: Submit | e: Export CSV | Esc: Back]",
    )
    .block(Block::default().borders(Borders::ALL))
    .alignment(Alignment::Center);
    frame.render_widget(help, chunks[2]);
}

fn render_quiz_attempt(
    frame: &mut Frame,
    attempt: &QuizAttempt,
    selected_index: usize,
    input: Option<&str>,
    confirm_unanswered: Option<usize>,
) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(3),
        ])
        .split(area);

    let header = Paragraph::new(format!(
        "Answered {}/{}",
        attempt.answered_count(),
        attempt.questions.len()
    ))
    .block(
        Block::default()
            .title(format!("Quiz: {}", attempt.quiz.title))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(header, chunks[0]);

    let mut lines = Vec::new();
    for (i, question) in attempt.questions.iter().enumerate() {
        let (style, prefix) = highlighted(i == selected_index);
        lines.push(Line::from(Span::styled(
            format!("{}{}. {}", prefix, i + 1, question.text),
            style,
        )));
        let answer = attempt.answer_for(question.question_id);
        if question.options.is_empty() {
            let shown = match input {
                Some(typed) if i == selected_index => format!("{}_", typed),
                _ => answer.unwrap_or("-").to_string(),
            };
            lines.push(Line::from(format!("     Answer: {}", shown)));
        } else {
            let spans: Vec<Span> = question
                .options
                .iter()
                .map(|option| {
                    if Some(option.as_str()) == answer {
                        Span::styled(
                            format!(" ({}) ", option),
                            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                        )
                    } else {
                        Span::raw(format!("  {}  ", option))
                    }
                })
                .collect();
            let mut row = vec![Span::raw("    ")];
            row.extend(spans);
            lines.push(Line::from(row));
        }
    }
    let body = Paragraph::new(lines)
        .block(Block::default().title("Questions").borders(Borders::ALL))
        .wrap(Wrap { trim: false });
    frame.render_widget(body, chunks[1]);

    let help = Paragraph::new(
        "[↑↓: Question | ←→: Choose option | Enter: Type answer | Backspace: Clear | s: Submit | Esc: Back]",
    )
    .block(Block::default().borders(Borders::ALL))
    .alignment(Alignment::Center);
    frame.render_widget(help, chunks[2]);

    if let Some(unanswered) = confirm_unanswered {
        let check = crate::flows::SubmitCheck::NeedsConfirmation { unanswered };
        let prompt = check.prompt().unwrap_or_default();
        render_popup(
            frame,
            "Confirm Submission",
            &format!("{}\n\n[y: Submit | n: Keep answering]", prompt),
            Color::Yellow,
        );
    }
}

fn render_error(frame: &mut Frame, message: &str) {
    let area = frame.area();

    let paragraph = Paragraph::new(format!("{}\n\n[Enter: Home | q: Quit]", message))
        .block(
            Block::default()
                .title("Error")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red)),
        )
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    frame.render_widget(paragraph, area);
}

fn render_alert(frame: &mut Frame, alert: &Alert) {
    let color = match alert.level {
        AlertLevel::Info => Color::Cyan,
        AlertLevel::Warning => Color::Yellow,
        AlertLevel::Error => Color::Red,
    };
    render_popup(
        frame,
        &alert.title,
        &format!("{}\n\n[Enter: OK]", alert.message),
        color,
    );
}

fn render_popup(frame: &mut Frame, title: &str, body: &str, color: Color) {
    let area = centered_rect(60, 30, frame.area());
    frame.render_widget(Clear, area);

    let paragraph = Paragraph::new(body.to_string())
        .block(
            Block::default()
                .title(title.to_string())
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color)),
        )
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
