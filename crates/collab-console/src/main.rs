use chrono::{DateTime, Utc};
use clap::Parser;
use collab_client::{spawn_poller, ApiClient, Config, PollEvent};
use collab_core::{Agent, AgentStatus, Task, TaskStatus, TaskSelection};
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Terminal,
};
use std::{error::Error, io, sync::Arc, time::Duration};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod markdown;

const UI_TICK_MS: u64 = 1000;
const POLL_QUEUE_CAPACITY: usize = 64;
const COMPACT_WIDTH: u16 = 100;
const DETAIL_SCROLL_STEP: u16 = 4;

#[derive(Parser, Debug)]
#[command(name = "collab-console")]
struct Args {
    #[arg(long, default_value = "")]
    api_url: String,
    #[arg(long, default_value_t = 0)]
    poll_ms: u64,
    #[arg(long, default_value_t = false)]
    debug: bool,
}

struct App {
    base_url: String,
    agents: Vec<Agent>,
    tasks: Vec<Task>,
    selection: TaskSelection,
    agents_cycle: u64,
    tasks_cycle: u64,
    agents_refreshed_at: Option<DateTime<Utc>>,
    tasks_refreshed_at: Option<DateTime<Utc>>,
    detail_scroll: u16,
    command_input: String,
    input_active: bool,
    help_open: bool,
    status_note: Option<String>,
    refresh_requested: bool,
}

impl App {
    fn new(base_url: String) -> Self {
        Self {
            base_url,
            agents: Vec::new(),
            tasks: Vec::new(),
            selection: TaskSelection::new(),
            agents_cycle: 0,
            tasks_cycle: 0,
            agents_refreshed_at: None,
            tasks_refreshed_at: None,
            detail_scroll: 0,
            command_input: String::new(),
            input_active: false,
            help_open: false,
            status_note: None,
            refresh_requested: false,
        }
    }

    /// Apply one feed refresh. Each feed owns its own slice of state, so the
    /// two per-cycle responses may land in either order. A response from an
    /// older cycle than the last applied one is discarded: a slow request
    /// must never overwrite a newer snapshot.
    fn apply_poll_event(&mut self, event: PollEvent) {
        match event {
            PollEvent::Agents { cycle, agents } => {
                if cycle <= self.agents_cycle {
                    debug!(
                        event = "poll_event_stale",
                        feed = "agents",
                        cycle,
                        applied = self.agents_cycle
                    );
                    return;
                }
                self.agents_cycle = cycle;
                self.agents = agents;
                self.agents_refreshed_at = Some(Utc::now());
            }
            PollEvent::Tasks { cycle, tasks } => {
                if cycle <= self.tasks_cycle {
                    debug!(
                        event = "poll_event_stale",
                        feed = "tasks",
                        cycle,
                        applied = self.tasks_cycle
                    );
                    return;
                }
                self.tasks_cycle = cycle;
                let before = self.selection.selected().map(String::from);
                self.selection.apply_fetch(&tasks);
                if self.selection.selected() != before.as_deref() {
                    self.detail_scroll = 0;
                }
                self.tasks = tasks;
                self.tasks_refreshed_at = Some(Utc::now());
            }
        }
    }

    fn selected_task(&self) -> Option<&Task> {
        let id = self.selection.selected()?;
        self.tasks.iter().find(|task| task.id == id)
    }

    fn selected_task_index(&self) -> Option<usize> {
        let id = self.selection.selected()?;
        self.tasks.iter().position(|task| task.id == id)
    }

    fn move_task_selection(&mut self, delta: i64) {
        if self.tasks.is_empty() {
            return;
        }
        let current = self.selected_task_index().unwrap_or(0) as i64;
        let last = (self.tasks.len() - 1) as i64;
        let next = (current + delta).clamp(0, last) as usize;
        let id = self.tasks[next].id.clone();
        self.selection.select(id);
        self.detail_scroll = 0;
    }

    fn select_newest(&mut self) {
        if let Some(first) = self.tasks.first() {
            self.selection.select(first.id.clone());
            self.detail_scroll = 0;
        }
    }

    fn submit_command(&mut self) {
        let intent = self.command_input.trim().to_string();
        self.command_input.clear();
        self.input_active = false;
        if intent.is_empty() {
            self.status_note = Some("nothing to dispatch".to_string());
            return;
        }
        // TODO: POST the intent once the backend grows a dispatch endpoint;
        // the API is read-only today, so composed commands stay local.
        self.status_note = Some(format!(
            "dispatch \"{}\" held: no command endpoint",
            ellipsize(&intent, 48)
        ));
    }

    fn agent_name(&self, id: &str) -> Option<&str> {
        self.agents
            .iter()
            .find(|agent| agent.id == id)
            .map(|agent| agent.name.as_str())
    }

    fn agents_online(&self) -> usize {
        self.agents
            .iter()
            .filter(|agent| agent.status.is_online())
            .count()
    }

    fn active_task_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|task| matches!(task.status, TaskStatus::Pending | TaskStatus::Running))
            .count()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.debug);
    let config = Config::resolve(
        (!args.api_url.trim().is_empty()).then_some(args.api_url.as_str()),
        (args.poll_ms > 0).then_some(args.poll_ms),
    );
    info!(event = "console_start", base_url = %config.base_url, poll_ms = config.poll_interval.as_millis() as u64);

    let client = ApiClient::new(&config.base_url);
    let (poll_tx, mut poll_rx) = mpsc::channel(POLL_QUEUE_CAPACITY);
    let refresh = Arc::new(Notify::new());
    let poller = spawn_poller(client, config.poll_interval, refresh.clone(), poll_tx);
    let mut app = App::new(config.base_url.clone());

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let mut events = EventStream::new();
    let mut ui_ticker = tokio::time::interval(Duration::from_millis(UI_TICK_MS));

    loop {
        if app.refresh_requested {
            refresh.notify_one();
            app.refresh_requested = false;
        }

        terminal.draw(|frame| render_ui(frame, &app))?;
        tokio::select! {
            _ = ui_ticker.tick() => {}
            Some(event) = poll_rx.recv() => {
                app.apply_poll_event(event);
            }
            maybe_event = events.next() => {
                if let Some(Ok(event)) = maybe_event {
                    if handle_input(event, &mut app) {
                        break;
                    }
                }
            }
        }
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    drop(poll_rx);
    poller.abort();
    Ok(())
}

fn init_logging(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let stdout_enabled = matches!(
        std::env::var("COLLAB_LOG_STDOUT").ok().as_deref(),
        Some("1") | Some("true") | Some("TRUE") | Some("yes") | Some("YES")
    );
    if stdout_enabled {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    } else {
        // The console owns the terminal; log output goes nowhere unless
        // explicitly redirected.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::sink)
            .try_init();
    }
}

#[derive(Clone, Copy)]
struct ConsoleTheme {
    bg: Color,
    surface: Color,
    border: Color,
    title: Color,
    text: Color,
    muted: Color,
    accent: Color,
    ok: Color,
    warn: Color,
    critical: Color,
    info: Color,
}

fn console_theme() -> ConsoleTheme {
    ConsoleTheme {
        bg: Color::Rgb(11, 18, 32),
        surface: Color::Rgb(17, 26, 46),
        border: Color::Rgb(71, 85, 105),
        title: Color::Rgb(191, 219, 254),
        text: Color::Rgb(226, 232, 240),
        muted: Color::Rgb(148, 163, 184),
        accent: Color::Rgb(56, 189, 248),
        ok: Color::Rgb(34, 197, 94),
        warn: Color::Rgb(245, 158, 11),
        critical: Color::Rgb(239, 68, 68),
        info: Color::Rgb(59, 130, 246),
    }
}

fn render_ui(frame: &mut ratatui::Frame, app: &App) {
    let area = frame.area();
    let theme = console_theme();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(area);
    frame.render_widget(render_header(app, theme, area.width), layout[0]);
    render_body(frame, app, theme, layout[1]);
    frame.render_widget(render_command_bar(app, theme), layout[2]);
    if app.help_open {
        render_help_overlay(frame, theme);
    }
}

fn render_header(app: &App, theme: ConsoleTheme, width: u16) -> Paragraph<'static> {
    let compact = is_compact(width);
    let inner_width = width.saturating_sub(4) as usize;
    let status_fields = vec![
        format!(
            "Agents: {}/{} Online",
            app.agents_online(),
            app.agents.len()
        ),
        format!("Tasks: {} Active", app.active_task_count()),
        format!(
            "Feeds: agents {} / tasks {}",
            format_age(app.agents_refreshed_at),
            format_age(app.tasks_refreshed_at)
        ),
        format!("Backend: {}", app.base_url),
    ];
    let status_line = fit_fields(&status_fields, inner_width.max(12));

    let action_text = if let Some(note) = app.status_note.as_deref() {
        format!("Last Action: {}", ellipsize(note, inner_width.max(12)))
    } else if compact {
        "Last Action: ready".to_string()
    } else {
        "Last Action: ready (j/k select, r refresh, c compose, ? help)".to_string()
    };

    Paragraph::new(Text::from(vec![
        Line::from(Span::styled(status_line, Style::default().fg(theme.text))),
        Line::from(Span::styled(
            ellipsize(&action_text, inner_width.max(12)),
            Style::default().fg(if app.status_note.is_some() {
                theme.accent
            } else {
                theme.muted
            }),
        )),
    ]))
    .style(Style::default().fg(theme.text).bg(theme.bg))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.border))
            .style(Style::default().bg(theme.bg))
            .title(Span::styled(
                "Collaboration Lab",
                Style::default()
                    .fg(theme.title)
                    .add_modifier(Modifier::BOLD),
            )),
    )
}

fn render_body(frame: &mut ratatui::Frame, app: &App, theme: ConsoleTheme, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(42), Constraint::Percentage(58)])
        .split(area);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(columns[0]);
    render_agents_panel(frame, app, theme, left[0]);
    render_tasks_panel(frame, app, theme, left[1]);
    render_detail_panel(frame, app, theme, columns[1]);
}

fn panel_block(title: String, theme: ConsoleTheme) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border))
        .style(Style::default().bg(theme.surface))
        .title(Span::styled(
            title,
            Style::default()
                .fg(theme.title)
                .add_modifier(Modifier::BOLD),
        ))
}

fn render_agents_panel(frame: &mut ratatui::Frame, app: &App, theme: ConsoleTheme, area: Rect) {
    let block = panel_block(format!("Agents ({})", app.agents.len()), theme);
    if app.agents.is_empty() {
        let paragraph = Paragraph::new(Line::from(Span::styled(
            "No agents reporting.",
            Style::default().fg(theme.muted),
        )))
        .style(Style::default().fg(theme.text).bg(theme.surface))
        .block(block);
        frame.render_widget(paragraph, area);
        return;
    }

    let compact = is_compact(frame.area().width);
    let items: Vec<ListItem> = app
        .agents
        .iter()
        .map(|agent| ListItem::new(Line::from(agent_row_spans(agent, theme, compact))))
        .collect();
    let list = List::new(items).block(block);
    frame.render_widget(list, area);
}

fn agent_row_spans(agent: &Agent, theme: ConsoleTheme, compact: bool) -> Vec<Span<'static>> {
    let color = agent_status_color(&agent.status, theme);
    let mut spans = vec![
        Span::styled(
            ellipsize(&agent.name, if compact { 16 } else { 24 }),
            Style::default().fg(theme.text),
        ),
        Span::styled(
            format!("  {}", agent.status),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
    ];
    if !compact {
        spans.push(Span::styled(
            format!("  ({})", agent.id),
            Style::default().fg(theme.muted),
        ));
    }
    spans
}

fn render_tasks_panel(frame: &mut ratatui::Frame, app: &App, theme: ConsoleTheme, area: Rect) {
    let block = panel_block(format!("Tasks ({})", app.tasks.len()), theme);
    if app.tasks.is_empty() {
        let paragraph = Paragraph::new(Line::from(Span::styled(
            "No tasks yet.",
            Style::default().fg(theme.muted),
        )))
        .style(Style::default().fg(theme.text).bg(theme.surface))
        .block(block);
        frame.render_widget(paragraph, area);
        return;
    }

    let compact = is_compact(frame.area().width);
    let items: Vec<ListItem> = app
        .tasks
        .iter()
        .map(|task| ListItem::new(Line::from(task_row_spans(task, theme, compact))))
        .collect();
    let mut state = ListState::default();
    state.select(app.selected_task_index());
    let list = List::new(items)
        .highlight_symbol(">> ")
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .block(block);
    frame.render_stateful_widget(list, area, &mut state);
}

fn task_row_spans(task: &Task, theme: ConsoleTheme, compact: bool) -> Vec<Span<'static>> {
    let mut spans = vec![
        Span::styled(
            task_status_chip(&task.status).to_string(),
            Style::default().fg(task_status_color(&task.status, theme)),
        ),
        Span::styled(
            format!(" {}", ellipsize(&task.title, if compact { 24 } else { 40 })),
            Style::default().fg(theme.text),
        ),
        Span::styled(
            format!("  {}", format_created_at(task.created_at)),
            Style::default().fg(theme.muted),
        ),
    ];
    if !compact {
        if let Some(assignee) = task.assigned_to.as_deref() {
            spans.push(Span::styled(
                format!("  -> {}", ellipsize(assignee, 14)),
                Style::default().fg(theme.accent),
            ));
        }
    }
    spans
}

fn render_detail_panel(frame: &mut ratatui::Frame, app: &App, theme: ConsoleTheme, area: Rect) {
    let inner_width = area.width.saturating_sub(2);
    let paragraph = Paragraph::new(detail_text(app, theme, inner_width))
        .style(Style::default().fg(theme.text).bg(theme.surface))
        .wrap(Wrap { trim: false })
        .scroll((app.detail_scroll, 0))
        .block(panel_block("Task Detail".to_string(), theme));
    frame.render_widget(paragraph, area);
}

fn detail_text(app: &App, theme: ConsoleTheme, width: u16) -> Text<'static> {
    let Some(task) = app.selected_task() else {
        return Text::from(Line::from(Span::styled(
            "No task selected.",
            Style::default().fg(theme.muted),
        )));
    };

    let mut meta = vec![
        Span::styled(
            task_status_chip(&task.status).to_string(),
            Style::default().fg(task_status_color(&task.status, theme)),
        ),
        Span::styled(
            format!("  created {}", format_created_at(task.created_at)),
            Style::default().fg(theme.muted),
        ),
    ];
    if let Some(assignee) = task.assigned_to.as_deref() {
        let label = app.agent_name(assignee).unwrap_or(assignee);
        meta.push(Span::styled(
            format!("  -> {label}"),
            Style::default().fg(theme.accent),
        ));
    }
    if let Some(author) = task.created_by.as_deref() {
        meta.push(Span::styled(
            format!("  by {author}"),
            Style::default().fg(theme.muted),
        ));
    }

    let mut lines = vec![
        Line::from(Span::styled(
            task.title.clone(),
            Style::default()
                .fg(theme.title)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(meta),
        Line::from(""),
    ];
    if task.has_result() {
        let result = task.result.as_deref().unwrap_or_default();
        lines.extend(markdown::render_markdown(result, width).lines);
    } else {
        lines.push(Line::from(Span::styled(
            "Processing... no result yet.",
            Style::default()
                .fg(theme.muted)
                .add_modifier(Modifier::ITALIC),
        )));
    }
    Text::from(lines)
}

fn render_command_bar(app: &App, theme: ConsoleTheme) -> Paragraph<'static> {
    let content = if app.input_active {
        Line::from(vec![
            Span::styled("> ".to_string(), Style::default().fg(theme.accent)),
            Span::styled(
                app.command_input.clone(),
                Style::default().fg(theme.text),
            ),
            Span::styled("_".to_string(), Style::default().fg(theme.accent)),
        ])
    } else {
        Line::from(Span::styled(
            "c to compose an intent, Enter to dispatch".to_string(),
            Style::default().fg(theme.muted),
        ))
    };
    Paragraph::new(content)
        .style(Style::default().fg(theme.text).bg(theme.bg))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border))
                .style(Style::default().bg(theme.bg))
                .title(Span::styled(
                    "Command",
                    Style::default()
                        .fg(theme.title)
                        .add_modifier(Modifier::BOLD),
                )),
        )
}

fn render_help_overlay(frame: &mut ratatui::Frame, theme: ConsoleTheme) {
    let area = overlay_rect(frame.area(), 46, 12);
    let lines = vec![
        Line::from(Span::styled(
            "Keys",
            Style::default()
                .fg(theme.title)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("  j / k     select task"),
        Line::from("  g         jump to newest task"),
        Line::from("  PgUp/PgDn scroll task detail"),
        Line::from("  r         refresh now"),
        Line::from("  c         compose command"),
        Line::from("  ?         toggle this help"),
        Line::from("  q         quit"),
    ];
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .style(Style::default().fg(theme.text).bg(theme.surface))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(theme.accent))
                    .style(Style::default().bg(theme.surface)),
            ),
        area,
    );
}

fn overlay_rect(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect {
        x: area.x + (area.width - w) / 2,
        y: area.y + (area.height - h) / 2,
        width: w,
        height: h,
    }
}

fn agent_status_color(status: &AgentStatus, theme: ConsoleTheme) -> Color {
    if status.is_online() {
        theme.ok
    } else {
        theme.critical
    }
}

fn task_status_chip(status: &TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "[PEND]",
        TaskStatus::Running => "[RUN]",
        TaskStatus::Completed => "[DONE]",
        TaskStatus::Unknown => "[????]",
    }
}

fn task_status_color(status: &TaskStatus, theme: ConsoleTheme) -> Color {
    match status {
        TaskStatus::Pending => theme.warn,
        TaskStatus::Running => theme.info,
        TaskStatus::Completed => theme.ok,
        TaskStatus::Unknown => theme.muted,
    }
}

fn format_created_at(created_at: DateTime<Utc>) -> String {
    created_at.format("%m-%d %H:%M").to_string()
}

fn format_age(at: Option<DateTime<Utc>>) -> String {
    at.map(|value| {
        format!(
            "{}s",
            Utc::now().signed_duration_since(value).num_seconds().max(0)
        )
    })
    .unwrap_or_else(|| "n/a".to_string())
}

fn ellipsize(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    if max <= 3 {
        return "...".chars().take(max).collect();
    }
    let prefix: String = input.chars().take(max - 3).collect();
    format!("{prefix}...")
}

fn fit_fields(fields: &[String], max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let mut output = String::new();
    for field in fields {
        if field.trim().is_empty() {
            continue;
        }
        let candidate = if output.is_empty() {
            field.clone()
        } else {
            format!("{output} | {field}")
        };
        if candidate.chars().count() <= max {
            output = candidate;
            continue;
        }
        if output.is_empty() {
            return ellipsize(field, max);
        }
        break;
    }
    output
}

fn is_compact(width: u16) -> bool {
    width < COMPACT_WIDTH
}

fn handle_input(event: Event, app: &mut App) -> bool {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(key, app),
        _ => false,
    }
}

fn handle_key(key: KeyEvent, app: &mut App) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }
    if app.input_active {
        match key.code {
            KeyCode::Esc => {
                app.input_active = false;
                app.command_input.clear();
            }
            KeyCode::Enter => app.submit_command(),
            KeyCode::Backspace => {
                app.command_input.pop();
            }
            KeyCode::Char(ch) => app.command_input.push(ch),
            _ => {}
        }
        return false;
    }
    if matches!(key.code, KeyCode::Char('?') | KeyCode::F(1)) {
        app.help_open = !app.help_open;
        return false;
    }
    if key.code == KeyCode::Esc && app.help_open {
        app.help_open = false;
        return false;
    }
    if app.help_open {
        return false;
    }

    match key.code {
        KeyCode::Char('q') => true,
        KeyCode::Down | KeyCode::Char('j') => {
            app.move_task_selection(1);
            false
        }
        KeyCode::Up | KeyCode::Char('k') => {
            app.move_task_selection(-1);
            false
        }
        KeyCode::Char('g') => {
            app.select_newest();
            false
        }
        KeyCode::Char('r') => {
            app.refresh_requested = true;
            false
        }
        KeyCode::Char('c') => {
            app.input_active = true;
            false
        }
        KeyCode::PageDown => {
            app.detail_scroll = app.detail_scroll.saturating_add(DETAIL_SCROLL_STEP);
            false
        }
        KeyCode::PageUp => {
            app.detail_scroll = app.detail_scroll.saturating_sub(DETAIL_SCROLL_STEP);
            false
        }
        _ => false,
    }
}
