use crate::alerts::{Alert, AlertSink};
use crate::api::{self, Transport};
use crate::config::Config;
use crate::export;
use crate::flows::{
    self, absence_notification, AttendanceSheet, QuizAttempt, RestrictionBackend, RosterBackend,
    SubmitCheck, TopicBackend,
};
use crate::models::{AttendanceStatus, Course, Lecture, Quiz, Role, StudentAttendance};
use crate::notify::Notifier;
use crate::reconciler::{Reconciler, Rollback, ToggleBackend, Toggleable};
use crate::session::Session;
use crate::ui::render::render_ui;
use crate::ui::state::{clamp_index, AppState, AttendanceMode, ToggleScreen, COURSE_MENU};
use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};

/// What a list screen wants the app to do after a key press.
enum ScreenAction {
    Stay,
    Back,
    Quit,
}

pub struct App {
    transport: Arc<dyn Transport>,
    session: Session,
    rollback: Rollback,
    serialize_writes: bool,
    export_dir: PathBuf,
    alerts: AlertSink,
    alerts_rx: UnboundedReceiver<Alert>,
    notifier: Notifier,
    state: AppState,
    alert: Option<Alert>,
}

impl App {
    pub fn new(transport: Arc<dyn Transport>, session: Session, config: &Config) -> Self {
        let (alerts, alerts_rx) = AlertSink::channel();
        let notifier = Notifier::new(Arc::clone(&transport), alerts.clone());
        Self {
            transport,
            session,
            rollback: config.rollback,
            serialize_writes: config.serialize_writes,
            export_dir: PathBuf::from("."),
            alerts,
            alerts_rx,
            notifier,
            state: AppState::Loading {
                message: "Loading...".to_string(),
            },
            alert: None,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        self.go_home().await;

        // Main event loop
        let result = self.event_loop(&mut terminal).await;

        // Restore terminal
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        self.close_screen();
        result
    }

    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> Result<()> {
        loop {
            if self.alert.is_none() {
                self.alert = self.alerts_rx.try_recv().ok();
            }

            terminal.draw(|f| render_ui(f, &self.state, self.alert.as_ref()))?;

            if event::poll(std::time::Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press && self.handle_key_event(key).await? {
                        break; // User quit
                    }
                }
            }

            // Let spawned toggles and notifications make progress
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        Ok(())
    }

    fn close_screen(&self) {
        match &self.state {
            AppState::AttendanceRoster { screen, .. } => screen.reconciler.scope().close(),
            AppState::TopicCoverage { screen, .. } => screen.reconciler.scope().close(),
            AppState::Restrictions { screen } => screen.reconciler.scope().close(),
            _ => {}
        }
    }

    fn reconciler<T, B>(&self, name: &'static str, backend: B) -> Reconciler<T, B>
    where
        T: Toggleable,
        B: ToggleBackend<T> + 'static,
    {
        Reconciler::new(name, backend, self.alerts.clone())
            .with_rollback(self.rollback)
            .serialize_writes(self.serialize_writes)
    }

    fn open_toggle_screen<T, B>(&self, reconciler: Reconciler<T, B>) -> ToggleScreen<T, B>
    where
        T: Toggleable,
        B: ToggleBackend<T> + 'static,
    {
        let loader = reconciler.clone();
        tokio::spawn(async move {
            // Failures are already alerted and logged by the reconciler
            let _ = loader.refresh().await;
        });
        ToggleScreen::new(reconciler)
    }

    async fn go_home(&mut self) {
        match self.session.role {
            Role::Parent => {
                let backend = RestrictionBackend::new(
                    Arc::clone(&self.transport),
                    self.session.restriction_target(),
                );
                let reconciler = self.reconciler("restrictions", backend);
                self.state = AppState::Restrictions {
                    screen: self.open_toggle_screen(reconciler),
                };
            }
            Role::Teacher | Role::Student => self.load_courses().await,
        }
    }

    async fn load_courses(&mut self) {
        match api::courses(self.transport.as_ref(), self.session.user_id).await {
            Ok(courses) => {
                info!(count = courses.len(), "courses loaded");
                self.state = AppState::CourseSelection {
                    courses,
                    selected_index: 0,
                };
            }
            Err(e) => {
                error!(error = %e, "failed to load courses");
                self.state = AppState::Error {
                    message: format!("Failed to load courses: {}", e),
                };
            }
        }
    }

    async fn load_lectures(&mut self, course: Course, mode: AttendanceMode) {
        match api::lectures(self.transport.as_ref(), course.course_id).await {
            Ok(lectures) => {
                self.state = AppState::LectureSelection {
                    course,
                    lectures,
                    selected_index: 0,
                    mode,
                };
            }
            Err(e) => {
                self.state = AppState::Error {
                    message: format!("Failed to load lectures: {}", e),
                };
            }
        }
    }

    async fn load_contents(&mut self, course: Course) {
        match api::contents(self.transport.as_ref(), course.course_id).await {
            Ok(contents) => {
                self.state = AppState::ContentSelection {
                    course,
                    contents,
                    selected_index: 0,
                };
            }
            Err(e) => {
                self.state = AppState::Error {
                    message: format!("Failed to load course content: {}", e),
                };
            }
        }
    }

    async fn load_quizzes(&mut self, course: Course) {
        match api::quizzes(self.transport.as_ref(), course.course_id).await {
            Ok(quizzes) => {
                self.state = AppState::QuizSelection {
                    course,
                    quizzes,
                    selected_index: 0,
                };
            }
            Err(e) => {
                self.state = AppState::Error {
                    message: format!("Failed to load quizzes: {}", e),
                };
            }
        }
    }

    async fn open_lecture(&mut self, course: Course, lecture: Lecture, mode: AttendanceMode) {
        match mode {
            AttendanceMode::Take => {
                match AttendanceSheet::load(
                    self.transport.as_ref(),
                    course.course_id,
                    lecture.lecture_id,
                )
                .await
                {
                    Ok(sheet) => {
                        self.state = AppState::AttendanceSheet {
                            course,
                            lecture,
                            sheet,
                            selected_index: 0,
                        };
                    }
                    Err(e) => {
                        self.state = AppState::Error {
                            message: format!("Failed to load attendance: {}", e),
                        };
                    }
                }
            }
            AttendanceMode::Edit => {
                let backend = RosterBackend::new(
                    Arc::clone(&self.transport),
                    course.course_id,
                    lecture.lecture_id,
                );
                let notifier = self.notifier.clone();
                let course_name = course.name.clone();
                let reconciler = self
                    .reconciler("attendance", backend)
                    .on_negative(move |student: &StudentAttendance| {
                        notifier.notify(absence_notification(&course_name, student));
                    });
                self.state = AppState::AttendanceRoster {
                    course,
                    lecture,
                    screen: self.open_toggle_screen(reconciler),
                };
            }
        }
    }

    async fn open_quiz(&mut self, course: Course, quiz: Quiz) {
        match QuizAttempt::load(self.transport.as_ref(), quiz).await {
            Ok(attempt) => {
                self.state = AppState::QuizAttempt {
                    course,
                    attempt,
                    selected_index: 0,
                    input: None,
                    confirm_unanswered: None,
                };
            }
            Err(e) => {
                self.state = AppState::Error {
                    message: format!("Failed to load quiz: {}", e),
                };
            }
        }
    }

    fn export(&self, course: &Course, lecture: &Lecture, students: &[StudentAttendance]) {
        match export::export_roster(&self.export_dir, &course.name, &lecture.title, students) {
            Ok(path) => {
                info!(path = %path.display(), "attendance exported");
                self.alerts.raise(Alert::info(
                    "Export complete",
                    format!("Saved to {}", path.display()),
                ));
            }
            Err(e) => {
                warn!(error = %e, "export failed");
                self.alerts
                    .raise(Alert::error("Export failed", format!("{:#}", e)));
            }
        }
    }

    async fn handle_key_event(&mut self, key: KeyEvent) -> Result<bool> {
        // A pending alert swallows input until acknowledged
        if self.alert.is_some() {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
                self.alert = None;
            }
            return Ok(false);
        }

        let current_state = std::mem::replace(
            &mut self.state,
            AppState::Loading {
                message: "Loading...".to_string(),
            },
        );

        match current_state {
            AppState::CourseSelection {
                courses,
                mut selected_index,
            } => match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Up => {
                    selected_index = selected_index.saturating_sub(1);
                    self.state = AppState::CourseSelection {
                        courses,
                        selected_index,
                    };
                }
                KeyCode::Down => {
                    selected_index = clamp_index(selected_index + 1, courses.len());
                    self.state = AppState::CourseSelection {
                        courses,
                        selected_index,
                    };
                }
                KeyCode::Enter if !courses.is_empty() => {
                    let course = courses[selected_index].clone();
                    match self.session.role {
                        Role::Student => self.load_quizzes(course).await,
                        _ => {
                            self.state = AppState::CourseMenu {
                                course,
                                selected_index: 0,
                            }
                        }
                    }
                }
                _ => {
                    self.state = AppState::CourseSelection {
                        courses,
                        selected_index,
                    };
                }
            },
            AppState::CourseMenu {
                course,
                mut selected_index,
            } => match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Esc => self.load_courses().await,
                KeyCode::Up => {
                    selected_index = selected_index.saturating_sub(1);
                    self.state = AppState::CourseMenu {
                        course,
                        selected_index,
                    };
                }
                KeyCode::Down => {
                    selected_index = clamp_index(selected_index + 1, COURSE_MENU.len());
                    self.state = AppState::CourseMenu {
                        course,
                        selected_index,
                    };
                }
                KeyCode::Enter => match selected_index {
                    0 => self.load_lectures(course, AttendanceMode::Take).await,
                    1 => self.load_lectures(course, AttendanceMode::Edit).await,
                    _ => self.load_contents(course).await,
                },
                _ => {
                    self.state = AppState::CourseMenu {
                        course,
                        selected_index,
                    };
                }
            },
            AppState::LectureSelection {
                course,
                lectures,
                mut selected_index,
                mode,
            } => match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Esc => {
                    let selected_index = match mode {
                        AttendanceMode::Take => 0,
                        AttendanceMode::Edit => 1,
                    };
                    self.state = AppState::CourseMenu {
                        course,
                        selected_index,
                    };
                }
                KeyCode::Up => {
                    selected_index = selected_index.saturating_sub(1);
                    self.state = AppState::LectureSelection {
                        course,
                        lectures,
                        selected_index,
                        mode,
                    };
                }
                KeyCode::Down => {
                    selected_index = clamp_index(selected_index + 1, lectures.len());
                    self.state = AppState::LectureSelection {
                        course,
                        lectures,
                        selected_index,
                        mode,
                    };
                }
                KeyCode::Enter if !lectures.is_empty() => {
                    let lecture = lectures[selected_index].clone();
                    self.open_lecture(course, lecture, mode).await;
                }
                _ => {
                    self.state = AppState::LectureSelection {
                        course,
                        lectures,
                        selected_index,
                        mode,
                    };
                }
            },
            AppState::AttendanceSheet {
                course,
                lecture,
                mut sheet,
                mut selected_index,
            } => {
                match key.code {
                    KeyCode::Char('q') => return Ok(true),
                    KeyCode::Esc => {
                        self.load_lectures(course, AttendanceMode::Take).await;
                        return Ok(false);
                    }
                    KeyCode::Up => selected_index = selected_index.saturating_sub(1),
                    KeyCode::Down => {
                        selected_index = clamp_index(selected_index + 1, sheet.students.len())
                    }
                    KeyCode::Char(' ') | KeyCode::Enter => {
                        if let Some(student_id) =
                            sheet.students.get(selected_index).map(|s| s.student_id)
                        {
                            sheet.toggle(student_id);
                        }
                    }
                    KeyCode::Char('p') => sheet.mark_all(AttendanceStatus::Present),
                    KeyCode::Char('a') => sheet.mark_all(AttendanceStatus::Absent),
                    KeyCode::Char('e') => self.export(&course, &lecture, &sheet.students),
                    KeyCode::Char('s') => {
                        match flows::submit_sheet(self.transport.as_ref(), &sheet).await {
                            Ok(()) => {
                                let notified =
                                    flows::notify_absentees(&self.notifier, &sheet, &course.name);
                                let (present, absent) = sheet.counts();
                                self.alerts.raise(Alert::info(
                                    "Attendance saved",
                                    format!(
                                        "{} present, {} absent. {} absence notice(s) queued.",
                                        present, absent, notified
                                    ),
                                ));
                                self.state = AppState::CourseMenu {
                                    course,
                                    selected_index: 0,
                                };
                                return Ok(false);
                            }
                            Err(e) => {
                                warn!(error = %e, "attendance submit failed");
                                self.alerts
                                    .raise(Alert::error("Attendance not saved", e.to_string()));
                            }
                        }
                    }
                    _ => {}
                }
                self.state = AppState::AttendanceSheet {
                    course,
                    lecture,
                    sheet,
                    selected_index,
                };
            }
            AppState::AttendanceRoster {
                course,
                lecture,
                mut screen,
            } => {
                if screen.search.is_none() && key.code == KeyCode::Char('e') {
                    let students = screen.reconciler.with_state(|c| c.items().to_vec());
                    self.export(&course, &lecture, &students);
                }
                match handle_toggle_screen(&mut screen, key) {
                    ScreenAction::Quit => {
                        screen.reconciler.scope().close();
                        return Ok(true);
                    }
                    ScreenAction::Back => {
                        screen.reconciler.scope().close();
                        self.load_lectures(course, AttendanceMode::Edit).await;
                    }
                    ScreenAction::Stay => {
                        self.state = AppState::AttendanceRoster {
                            course,
                            lecture,
                            screen,
                        };
                    }
                }
            }
            AppState::ContentSelection {
                course,
                contents,
                mut selected_index,
            } => match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Esc => {
                    self.state = AppState::CourseMenu {
                        course,
                        selected_index: 2,
                    };
                }
                KeyCode::Up => {
                    selected_index = selected_index.saturating_sub(1);
                    self.state = AppState::ContentSelection {
                        course,
                        contents,
                        selected_index,
                    };
                }
                KeyCode::Down => {
                    selected_index = clamp_index(selected_index + 1, contents.len());
                    self.state = AppState::ContentSelection {
                        course,
                        contents,
                        selected_index,
                    };
                }
                KeyCode::Enter if !contents.is_empty() => {
                    let content = contents[selected_index].clone();
                    let backend =
                        TopicBackend::new(Arc::clone(&self.transport), content.content_id);
                    let reconciler = self.reconciler("topics", backend);
                    self.state = AppState::TopicCoverage {
                        course,
                        content,
                        screen: self.open_toggle_screen(reconciler),
                    };
                }
                _ => {
                    self.state = AppState::ContentSelection {
                        course,
                        contents,
                        selected_index,
                    };
                }
            },
            AppState::TopicCoverage {
                course,
                content,
                mut screen,
            } => match handle_toggle_screen(&mut screen, key) {
                ScreenAction::Quit => {
                    screen.reconciler.scope().close();
                    return Ok(true);
                }
                ScreenAction::Back => {
                    screen.reconciler.scope().close();
                    self.load_contents(course).await;
                }
                ScreenAction::Stay => {
                    self.state = AppState::TopicCoverage {
                        course,
                        content,
                        screen,
                    };
                }
            },
            AppState::Restrictions { mut screen } => match handle_toggle_screen(&mut screen, key) {
                ScreenAction::Quit => {
                    screen.reconciler.scope().close();
                    return Ok(true);
                }
                // Home screen, nothing to go back to
                ScreenAction::Back | ScreenAction::Stay => {
                    self.state = AppState::Restrictions { screen };
                }
            },
            AppState::QuizSelection {
                course,
                quizzes,
                mut selected_index,
            } => match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Esc => self.load_courses().await,
                KeyCode::Up => {
                    selected_index = selected_index.saturating_sub(1);
                    self.state = AppState::QuizSelection {
                        course,
                        quizzes,
                        selected_index,
                    };
                }
                KeyCode::Down => {
                    selected_index = clamp_index(selected_index + 1, quizzes.len());
                    self.state = AppState::QuizSelection {
                        course,
                        quizzes,
                        selected_index,
                    };
                }
                KeyCode::Enter if !quizzes.is_empty() => {
                    let quiz = quizzes[selected_index].clone();
                    self.open_quiz(course, quiz).await;
                }
                _ => {
                    self.state = AppState::QuizSelection {
                        course,
                        quizzes,
                        selected_index,
                    };
                }
            },
            AppState::QuizAttempt {
                course,
                mut attempt,
                mut selected_index,
                mut input,
                mut confirm_unanswered,
            } => {
                let question = attempt
                    .questions
                    .get(selected_index)
                    .map(|q| (q.question_id, q.options.is_empty()));
                let question_id = question.map(|(id, _)| id);

                if let Some(buffer) = input.as_mut() {
                    match key.code {
                        KeyCode::Enter => {
                            if let Some(id) = question_id {
                                attempt.answer(id, buffer.as_str());
                            }
                            input = None;
                        }
                        KeyCode::Esc => input = None,
                        KeyCode::Backspace => {
                            buffer.pop();
                        }
                        KeyCode::Char(c) => buffer.push(c),
                        _ => {}
                    }
                } else if confirm_unanswered.is_some() {
                    match key.code {
                        KeyCode::Char('y') | KeyCode::Char('Y') => {
                            if self.submit_quiz(&course, &attempt).await {
                                return Ok(false);
                            }
                            confirm_unanswered = None;
                        }
                        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                            confirm_unanswered = None;
                        }
                        _ => {}
                    }
                } else {
                    match key.code {
                        KeyCode::Esc => {
                            self.load_quizzes(course).await;
                            return Ok(false);
                        }
                        KeyCode::Up => selected_index = selected_index.saturating_sub(1),
                        KeyCode::Down => {
                            selected_index =
                                clamp_index(selected_index + 1, attempt.questions.len())
                        }
                        KeyCode::Enter => {
                            if let Some((id, true)) = question {
                                input =
                                    Some(attempt.answer_for(id).unwrap_or_default().to_string());
                            }
                        }
                        KeyCode::Right | KeyCode::Char(' ') => {
                            if let Some(id) = question_id {
                                attempt.cycle_option(id, true);
                            }
                        }
                        KeyCode::Left => {
                            if let Some(id) = question_id {
                                attempt.cycle_option(id, false);
                            }
                        }
                        KeyCode::Backspace | KeyCode::Delete => {
                            if let Some(id) = question_id {
                                attempt.clear(id);
                            }
                        }
                        KeyCode::Char('s') => match attempt.check() {
                            SubmitCheck::Ready => {
                                if self.submit_quiz(&course, &attempt).await {
                                    return Ok(false);
                                }
                            }
                            SubmitCheck::NeedsConfirmation { unanswered } => {
                                confirm_unanswered = Some(unanswered);
                            }
                        },
                        _ => {}
                    }
                }

                self.state = AppState::QuizAttempt {
                    course,
                    attempt,
                    selected_index,
                    input,
                    confirm_unanswered,
                };
            }
            AppState::Error { message } => match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Enter | KeyCode::Esc => self.go_home().await,
                _ => self.state = AppState::Error { message },
            },
            AppState::Loading { message } => {
                if key.code == KeyCode::Char('q') {
                    return Ok(true);
                }
                self.state = AppState::Loading { message };
            }
        }

        Ok(false)
    }

    /// Returns true when the quiz was accepted and the app moved on.
    async fn submit_quiz(&mut self, course: &Course, attempt: &QuizAttempt) -> bool {
        match flows::submit_quiz(self.transport.as_ref(), attempt, self.session.user_id).await {
            Ok(()) => {
                self.alerts.raise(Alert::info(
                    "Quiz submitted",
                    format!(
                        "{}: {} of {} question(s) answered.",
                        attempt.quiz.title,
                        attempt.answered_count(),
                        attempt.questions.len()
                    ),
                ));
                self.load_quizzes(course.clone()).await;
                true
            }
            Err(e) => {
                warn!(error = %e, quiz_id = attempt.quiz.quiz_id, "quiz submit failed");
                self.alerts
                    .raise(Alert::error("Quiz not submitted", e.to_string()));
                false
            }
        }
    }
}

/// Keys shared by every reconciled list: navigation, search, reload and the
/// toggle itself. Toggles run as background tasks so the list stays live.
fn handle_toggle_screen<T, B>(screen: &mut ToggleScreen<T, B>, key: KeyEvent) -> ScreenAction
where
    T: Toggleable,
    B: ToggleBackend<T> + 'static,
{
    if let Some(input) = screen.search.as_mut() {
        match key.code {
            KeyCode::Enter | KeyCode::Esc => screen.search = None,
            KeyCode::Backspace => {
                input.pop();
                screen.reconciler.set_query(input.clone());
            }
            KeyCode::Char(c) => {
                input.push(c);
                screen.reconciler.set_query(input.clone());
            }
            _ => {}
        }
        screen.selected_index = 0;
        return ScreenAction::Stay;
    }

    let visible_len = screen.reconciler.with_state(|c| c.visible().len());
    match key.code {
        KeyCode::Char('q') => return ScreenAction::Quit,
        KeyCode::Esc => return ScreenAction::Back,
        KeyCode::Up => screen.selected_index = screen.selected_index.saturating_sub(1),
        KeyCode::Down => {
            screen.selected_index = clamp_index(screen.selected_index + 1, visible_len)
        }
        KeyCode::Char('/') => {
            let query = screen.reconciler.with_state(|c| c.query().to_string());
            screen.search = Some(query);
        }
        KeyCode::Char('r') => {
            let reconciler = screen.reconciler.clone();
            tokio::spawn(async move {
                let _ = reconciler.refresh().await;
            });
        }
        KeyCode::Char(' ') | KeyCode::Enter => {
            let index = clamp_index(screen.selected_index, visible_len);
            let item_key = screen
                .reconciler
                .with_state(|c| c.visible().get(index).map(|item| item.key()));
            if let Some(item_key) = item_key {
                let reconciler = screen.reconciler.clone();
                tokio::spawn(async move {
                    if let Err(e) = reconciler.toggle(&item_key).await {
                        warn!(error = %e, "toggle ignored");
                    }
                });
            }
        }
        _ => {}
    }
    ScreenAction::Stay
}
