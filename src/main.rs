//! Terminal console for the support desk services.
//!
//! Tabs: Health (per-service status and subsystem detail), Tasks (submitted work,
//! newest first) and Payments (recent payment events from the backend).

use std::{
  fs::File,
  io,
  sync::{Arc, Mutex, mpsc},
  time::{Duration, Instant},
};

use anyhow::{Context, Result};
use crossterm::{
  event::{self, DisableMouseCapture, EnableMouseCapture, Event as CEvent, KeyCode},
  execute,
  terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use serde_json::{Value, json};
use tokio::runtime::Runtime;
use tracing::{error, info};
use tui::{
  backend::{Backend, CrosstermBackend},
  layout::{Constraint, Direction, Layout, Rect},
  style::{Color, Modifier, Style},
  text::{Span, Spans},
  widgets::{Block, Borders, List, ListItem, Paragraph, Tabs},
  Terminal,
};
use desk_orchestrator::config::Config;
use desk_orchestrator::services::{DEFAULT_EVENT_LIMIT, PaymentEvent};
use desk_orchestrator::{AggregateHealth, ChangeEvent, ConsoleContext, HealthStatus, TaskRecord, TaskState};

struct SampleTask {
  label: &'static str,
  task_type: &'static str,
  payload: fn() -> Value,
}

fn conversation_payload() -> Value {
  json!({
    "user_id": "demo_user",
    "conversation_data": {"messages": ["I need help with my payment", "Can you process my refund?"]}
  })
}

fn payment_payload() -> Value {
  json!({"user_id": "demo_user", "amount": 99.99, "currency": "usd"})
}

fn webhook_payload() -> Value {
  json!({
    "source": "stripe",
    "event_type": "payment_intent.succeeded",
    "data": {"id": "pi_demo123", "amount": 2000}
  })
}

const SAMPLE_TASKS: [SampleTask; 3] = [
  SampleTask { label: "Conversation Analysis", task_type: "conversation_analysis", payload: conversation_payload },
  SampleTask { label: "Payment Processing", task_type: "payment_processing", payload: payment_payload },
  SampleTask { label: "Webhook Processing", task_type: "webhook_processing", payload: webhook_payload },
];

enum UiMessage {
  Changed(ChangeEvent),
  Payments(Vec<PaymentEvent>),
  Notice(String),
  SubmissionFailed(String),
}

#[derive(Clone, Copy)]
enum DashboardTab {
  Health,
  Tasks,
  Payments,
}

struct App {
  current_tab: DashboardTab,
  health: AggregateHealth,
  tasks: Vec<TaskRecord>,
  payments: Vec<PaymentEvent>,
  notices: Vec<String>,
  failure: Option<String>,
}

impl App {
  fn new(health: AggregateHealth, tasks: Vec<TaskRecord>) -> Self {
    Self {
      current_tab: DashboardTab::Health,
      health,
      tasks,
      payments: vec![],
      notices: vec![],
      failure: None,
    }
  }

  fn next_tab(&mut self) {
    self.current_tab = match self.current_tab {
      DashboardTab::Health => DashboardTab::Tasks,
      DashboardTab::Tasks => DashboardTab::Payments,
      DashboardTab::Payments => DashboardTab::Health,
    }
  }

  fn previous_tab(&mut self) {
    self.current_tab = match self.current_tab {
      DashboardTab::Health => DashboardTab::Payments,
      DashboardTab::Tasks => DashboardTab::Health,
      DashboardTab::Payments => DashboardTab::Tasks,
    }
  }

  fn handle(&mut self, message: UiMessage) {
    match message {
      UiMessage::Changed(ChangeEvent::Health(health)) => self.health = health,
      UiMessage::Changed(ChangeEvent::Tasks(tasks)) => self.tasks = tasks,
      UiMessage::Payments(events) => self.payments = events,
      UiMessage::Notice(text) => {
        self.notices.insert(0, text);
        self.notices.truncate(5);
      }
      UiMessage::SubmissionFailed(text) => self.failure = Some(text),
    }
  }
}

fn init_logging(path: &str) -> Result<()> {
  let file = File::create(path).with_context(|| format!("Failed to open log file {path}"))?;
  tracing_subscriber::fmt()
    .with_writer(Mutex::new(file))
    .with_ansi(false)
    .init();
  Ok(())
}

fn submit_sample(rt: &Runtime, ctx: &Arc<ConsoleContext>, sample: &SampleTask, tx: &mpsc::Sender<UiMessage>) {
  let ctx = ctx.clone();
  let tx = tx.clone();
  let task_type = sample.task_type;
  let label = sample.label;
  let payload = (sample.payload)();
  rt.spawn(async move {
    match ctx.submitter.submit_default(task_type, payload).await {
      Ok(record) => {
        let _ = tx.send(UiMessage::Notice(format!("Queued {} ({})", label, record.id)));
      }
      Err(e) => {
        error!("Submission of {} failed: {}", task_type, e);
        let _ = tx.send(UiMessage::SubmissionFailed(format!("Could not queue {label}: {e}")));
      }
    }
  });
}

fn refresh(rt: &Runtime, ctx: &Arc<ConsoleContext>, tx: &mpsc::Sender<UiMessage>) {
  let ctx = ctx.clone();
  let tx = tx.clone();
  rt.spawn(async move {
    ctx.monitor.poll_now().await;
    match ctx.services.payment_events(DEFAULT_EVENT_LIMIT).await {
      Ok(events) => {
        let _ = tx.send(UiMessage::Payments(events));
      }
      Err(e) => {
        let _ = tx.send(UiMessage::Notice(format!("Payment events unavailable: {e}")));
      }
    }
  });
}

fn main() -> Result<()> {
  let config = Config::from_env()?;
  init_logging(&config.log_file)?;

  let rt = Runtime::new()?;
  let ctx = Arc::new(ConsoleContext::new(config)?);
  let (tx, rx) = mpsc::channel::<UiMessage>();

  let listener_tx = tx.clone();
  let guard = rt.enter();
  ctx.monitor.start();
  let subscription = ctx.notifier.on_change(move |change| {
    let _ = listener_tx.send(UiMessage::Changed(change));
  });
  drop(guard);
  refresh(&rt, &ctx, &tx);
  info!("Console started for {}", ctx.config.user);

  enable_raw_mode()?;
  let mut stdout = io::stdout();
  execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
  let backend = CrosstermBackend::new(stdout);
  let mut terminal = Terminal::new(backend)?;

  let mut app = App::new(ctx.notifier.health(), ctx.notifier.tasks());
  let tick_rate = Duration::from_millis(250);
  let mut last_tick = Instant::now();

  loop {
    while let Ok(message) = rx.try_recv() {
      app.handle(message);
    }
    terminal.draw(|f| ui(f, &app))?;

    let timeout = tick_rate
      .checked_sub(last_tick.elapsed())
      .unwrap_or_else(|| Duration::from_secs(0));
    if event::poll(timeout)? {
      if let CEvent::Key(key) = event::read()? {
        match key.code {
          KeyCode::Char('q') => break,
          KeyCode::Right => app.next_tab(),
          KeyCode::Left => app.previous_tab(),
          KeyCode::Char('r') => refresh(&rt, &ctx, &tx),
          KeyCode::Char('d') => app.failure = None,
          KeyCode::Char(c @ '1'..='3') => {
            let index = (c as usize) - ('1' as usize);
            submit_sample(&rt, &ctx, &SAMPLE_TASKS[index], &tx);
          }
          _ => {}
        }
      }
    }
    if last_tick.elapsed() >= tick_rate {
      last_tick = Instant::now();
    }
  }

  subscription.unsubscribe();
  ctx.monitor.stop();

  disable_raw_mode()?;
  execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
  terminal.show_cursor()?;
  Ok(())
}

fn status_color(status: Option<HealthStatus>) -> Color {
  match status {
    Some(HealthStatus::Healthy) => Color::Green,
    Some(HealthStatus::Degraded) => Color::Yellow,
    Some(HealthStatus::Unreachable) => Color::Red,
    None => Color::Gray,
  }
}

fn state_color(state: TaskState) -> Color {
  match state {
    TaskState::Queued => Color::Yellow,
    TaskState::Processing => Color::Blue,
    TaskState::Completed => Color::Green,
    TaskState::Failed => Color::Red,
  }
}

fn ui<B: Backend>(f: &mut tui::Frame<B>, app: &App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .margin(1)
    .constraints([
      Constraint::Length(3),
      Constraint::Min(0),
      Constraint::Length(3),
    ].as_ref())
    .split(f.size());

  let overall = app.health.overall.map(|s| s.as_str()).unwrap_or("checking...");
  let tab_titles = vec!["Health", "Tasks", "Payments"];
  let tabs = Tabs::new(
    tab_titles
      .iter()
      .map(|t| Spans::from(Span::styled(*t, Style::default().fg(Color::Yellow))))
      .collect(),
  )
    .block(Block::default().borders(Borders::ALL).title(Span::styled(
      format!("Support Desk | overall: {overall}"),
      Style::default().fg(status_color(app.health.overall)),
    )))
    .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
    .select(match app.current_tab {
      DashboardTab::Health => 0,
      DashboardTab::Tasks => 1,
      DashboardTab::Payments => 2,
    });
  f.render_widget(tabs, chunks[0]);

  match app.current_tab {
    DashboardTab::Health => render_health(f, app, chunks[1]),
    DashboardTab::Tasks => render_tasks(f, app, chunks[1]),
    DashboardTab::Payments => render_payments(f, app, chunks[1]),
  }

  let footer = match &app.failure {
    Some(text) => Paragraph::new(format!("{text}  (d: dismiss)"))
      .style(Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
    None => Paragraph::new("←/→: Switch Tabs | 1-3: Queue Sample Task | r: Refresh | q: Quit")
      .style(Style::default().fg(Color::White)),
  };
  f.render_widget(footer.block(Block::default().borders(Borders::ALL)), chunks[2]);
}

fn render_health<B: Backend>(f: &mut tui::Frame<B>, app: &App, area: Rect) {
  let chunks = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Percentage(60), Constraint::Percentage(40)].as_ref())
    .split(area);

  let service_items: Vec<ListItem> = app.health.per_service.values().map(|snap| {
    let mut lines = vec![
      Spans::from(vec![
        Span::styled(format!("{} ", snap.service_name), Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(snap.status.as_str(), Style::default().fg(status_color(Some(snap.status)))),
      ]),
      Spans::from(Span::raw(format!("Checked: {}", snap.observed_at.format("%Y-%m-%d %H:%M:%S")))),
    ];
    if let Some(detail) = &snap.detail {
      for (subsystem, status) in detail {
        lines.push(Spans::from(Span::raw(format!("  {subsystem}: {status}"))));
      }
    }
    ListItem::new(lines)
  }).collect();
  let services_list = List::new(if service_items.is_empty() {
    vec![ListItem::new(Spans::from(Span::raw("Checking...")))]
  } else {
    service_items
  })
    .block(Block::default().borders(Borders::ALL).title("Services"));
  f.render_widget(services_list, chunks[0]);

  let sample_lines: Vec<ListItem> = SAMPLE_TASKS.iter().enumerate().map(|(i, s)| {
    ListItem::new(Spans::from(Span::raw(format!("{}: {} ({})", i + 1, s.label, s.task_type))))
  }).chain(app.notices.iter().map(|n| {
    ListItem::new(Spans::from(Span::styled(n.as_str(), Style::default().fg(Color::Green))))
  })).collect();
  let samples = List::new(sample_lines)
    .block(Block::default().borders(Borders::ALL).title("Queue Tasks"));
  f.render_widget(samples, chunks[1]);
}

fn render_tasks<B: Backend>(f: &mut tui::Frame<B>, app: &App, area: Rect) {
  let task_items: Vec<ListItem> = app.tasks.iter().map(|t| {
    let mut spans = vec![
      Span::styled(format!("{:<10} ", t.state), Style::default().fg(state_color(t.state)).add_modifier(Modifier::BOLD)),
      Span::raw(format!("{} | priority {} | {}", t.task_type, t.priority, t.submitted_at.format("%H:%M:%S"))),
    ];
    if let Some(err) = &t.error {
      spans.push(Span::styled(format!(" | {err}"), Style::default().fg(Color::Red)));
    }
    ListItem::new(Spans::from(spans))
  }).collect();
  let header = format!("Task History ({})", app.tasks.len());
  let tasks_list = List::new(if task_items.is_empty() {
    vec![ListItem::new(Spans::from(Span::raw("No tasks queued yet. Press 1-3 to queue one.")))]
  } else {
    task_items
  })
    .block(Block::default().borders(Borders::ALL).title(header));
  f.render_widget(tasks_list, area);
}

fn render_payments<B: Backend>(f: &mut tui::Frame<B>, app: &App, area: Rect) {
  let items: Vec<ListItem> = app.payments.iter().map(|e| {
    let when = e
      .created
      .and_then(|ts| chrono::DateTime::<chrono::Utc>::from_timestamp(ts, 0))
      .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
      .unwrap_or_else(|| "N/A".into());
    ListItem::new(Spans::from(vec![
      Span::styled(when, Style::default().fg(Color::Green)),
      Span::raw(" - "),
      Span::raw(e.event_type.as_str()),
    ]))
  }).collect();
  let list = List::new(items)
    .block(Block::default().borders(Borders::ALL).title("Recent Payments"));
  f.render_widget(list, area);
}
