use crate::config::ClientConfig;
use crate::format::{format_age, format_file_size};
use crate::model::{CommandType, EnvInfo};
use crate::notify::{ConsoleNotifier, Notification, Notifier};
use crate::operator::{ConsolePrompter, Prompter, ReconnectWatcher};
use crate::session::{
    CommandSession, Direction, EnvironmentPanel, ExecuteOutcome, RestartNegotiator, RestartState,
    UploadOutcome, UploadPipeline,
};
use crate::transport::{HttpTransport, LocalFile, RpcTransport, UploadTransport};
use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::style::Print;
use crossterm::terminal::{self, disable_raw_mode, enable_raw_mode, ClearType};
use crossterm::{cursor, execute};
use serde_json::json;
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "devterm",
    version,
    about = "Run commands, restart the service and upload addons on a developer terminal backend"
)]
pub struct Cli {
    /// Backend base URL, e.g. http://localhost:8069
    #[arg(long, env = "DEVTERM_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Value of the backend's session_id cookie
    #[arg(long, env = "DEVTERM_SESSION_ID", hide_env_values = true, global = true)]
    pub session_id: Option<String>,

    /// Config file (defaults to <config dir>/devterm/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Request timeout for backend calls
    #[arg(long, global = true)]
    pub timeout: Option<humantime::Duration>,

    /// Answer yes to every confirmation
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Disable coloured output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Execute one command and print its output
    Exec {
        #[arg(long = "type", value_enum, default_value_t = CommandType::Shell)]
        command_type: CommandType,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Interactive session with history recall
    Shell {
        #[arg(long = "type", value_enum, default_value_t = CommandType::Shell)]
        command_type: CommandType,
    },
    /// List recently executed commands
    History {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List recent addon uploads
    Uploads {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Restart the backend service
    Restart {
        /// System user for the credentialed restart
        #[arg(long)]
        username: Option<String>,
        /// Read the sudo password from the first line of stdin
        #[arg(long)]
        password_stdin: bool,
    },
    /// Upload an addon archive (.zip)
    Upload { file: PathBuf },
    /// Show the backend's environment details
    Env,
    /// Clear terminal logs past the retention window
    ClearLogs,
}

/// Build a `ClientConfig` from the config file and CLI arguments.
pub fn build_config(args: &Cli) -> Result<ClientConfig> {
    let mut cfg = match args.config.clone().or_else(ClientConfig::default_path) {
        Some(path) => ClientConfig::load(&path)?,
        None => ClientConfig::default(),
    };
    if let Some(url) = &args.base_url {
        cfg.base_url = url.clone();
    }
    if let Some(session) = &args.session_id {
        cfg.session_id = Some(session.clone());
    }
    if let Some(timeout) = &args.timeout {
        cfg.request_timeout = **timeout;
    }
    Ok(cfg)
}

/// Shared collaborators handed to each controller.
struct Clients {
    cfg: ClientConfig,
    http: Arc<HttpTransport>,
    notifier: Arc<dyn Notifier>,
    prompter: Arc<dyn Prompter>,
    json: bool,
}

impl Clients {
    fn rpc(&self) -> Arc<dyn RpcTransport> {
        self.http.clone()
    }

    fn uploader(&self) -> Arc<dyn UploadTransport> {
        self.http.clone()
    }
}

/// Reject flag combinations that cannot work together.
fn validate(args: &Cli) -> Result<()> {
    if let Command::Restart {
        password_stdin: true,
        ..
    } = args.command
    {
        if !args.yes {
            anyhow::bail!(
                "--password-stdin takes stdin, so the restart cannot be confirmed there. Add --yes."
            );
        }
    }
    Ok(())
}

pub async fn run(args: Cli) -> Result<ExitCode> {
    validate(&args)?;
    let cfg = build_config(&args)?;
    let http = Arc::new(HttpTransport::new(&cfg)?);
    let color = !args.no_color && std::io::stderr().is_terminal();
    let ctx = Clients {
        cfg,
        http,
        notifier: Arc::new(ConsoleNotifier { color }),
        prompter: Arc::new(ConsolePrompter {
            assume_yes: args.yes,
        }),
        json: args.json,
    };
    tracing::debug!(base_url = %ctx.cfg.base_url, "client configured");

    match args.command {
        Command::Exec {
            command_type,
            command,
        } => run_exec(&ctx, command_type, command.join(" ")).await,
        Command::Shell { command_type } => run_shell(&ctx, command_type).await,
        Command::History { limit } => run_history(&ctx, limit).await,
        Command::Uploads { limit } => run_uploads(&ctx, limit).await,
        Command::Restart {
            username,
            password_stdin,
        } => run_restart(&ctx, username, password_stdin).await,
        Command::Upload { file } => run_upload(&ctx, file).await,
        Command::Env => run_env(&ctx).await,
        Command::ClearLogs => {
            let panel = EnvironmentPanel::new(ctx.rpc(), ctx.notifier.clone(), ctx.prompter.clone());
            Ok(exit_code(panel.clear_old_logs().await))
        }
    }
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn run_exec(ctx: &Clients, command_type: CommandType, command: String) -> Result<ExitCode> {
    let mut session = CommandSession::new(ctx.rpc(), ctx.notifier.clone(), ctx.cfg.history_limit);
    session.state_mut().command_text = command;
    session.state_mut().command_type = command_type;
    let outcome = session.execute().await;

    let state = session.state();
    if ctx.json {
        let out = json!({
            "succeeded": outcome == ExecuteOutcome::Succeeded,
            "command_type": command_type,
            "output": state.output,
            "error": state.error_output,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if outcome != ExecuteOutcome::Rejected {
        print_session_output(&state.output, &state.error_output);
    }
    Ok(exit_code(outcome == ExecuteOutcome::Succeeded))
}

fn print_session_output(output: &str, error_output: &str) {
    if !output.is_empty() {
        print!("{output}");
        if !output.ends_with('\n') {
            println!();
        }
    }
    if !error_output.is_empty() {
        eprintln!("{}", error_output.trim_end());
    }
    let _ = std::io::stdout().flush();
}

async fn run_history(ctx: &Clients, limit: Option<usize>) -> Result<ExitCode> {
    let limit = limit.unwrap_or(ctx.cfg.history_limit);
    let mut session = CommandSession::new(ctx.rpc(), ctx.notifier.clone(), limit);
    if !session.load_history(limit).await {
        ctx.notifier.danger("Failed to load command history");
        return Ok(ExitCode::FAILURE);
    }
    let history = session.state().history();

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(history)?);
        return Ok(ExitCode::SUCCESS);
    }
    if history.is_empty() {
        eprintln!("No command history");
        return Ok(ExitCode::SUCCESS);
    }
    let now = OffsetDateTime::now_utc();
    for (i, record) in history.iter().enumerate() {
        let age = record
            .executed_at()
            .map(|at| format_age(at, now))
            .unwrap_or_else(|| record.timestamp.clone());
        println!(
            "{:>4}  {:<12} {:<8} {:<8} {}",
            i + 1,
            age,
            record.command_type.as_str(),
            record.state.as_deref().unwrap_or("-"),
            record.command
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_uploads(ctx: &Clients, limit: Option<usize>) -> Result<ExitCode> {
    let limit = limit.unwrap_or(ctx.cfg.upload_history_limit);
    let mut pipeline = UploadPipeline::new(ctx.rpc(), ctx.uploader(), ctx.notifier.clone(), limit);
    if !pipeline.load_upload_history(limit).await {
        ctx.notifier.danger("Failed to load upload history");
        return Ok(ExitCode::FAILURE);
    }
    let uploads = pipeline.state().history();

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(uploads)?);
        return Ok(ExitCode::SUCCESS);
    }
    if uploads.is_empty() {
        eprintln!("No uploads yet");
        return Ok(ExitCode::SUCCESS);
    }
    let now = OffsetDateTime::now_utc();
    for upload in uploads {
        let age = upload
            .uploaded_at()
            .map(|at| format_age(at, now))
            .unwrap_or_else(|| upload.timestamp.clone());
        println!(
            "{:<12} {:<10} {:>11}  {}",
            age,
            upload.status,
            format_file_size(upload.size_bytes),
            upload.filename
        );
        if let Some(err) = &upload.error_message {
            println!("{:<12} {err}", "");
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_restart(
    ctx: &Clients,
    username: Option<String>,
    password_stdin: bool,
) -> Result<ExitCode> {
    let watcher = Arc::new(ReconnectWatcher::new(ctx.rpc(), ctx.notifier.clone()));
    let mut negotiator = RestartNegotiator::new(
        ctx.rpc(),
        ctx.notifier.clone(),
        ctx.prompter.clone(),
        watcher.clone(),
    );

    let form = negotiator.form_mut();
    form.username = username;
    if password_stdin {
        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .context("read password from stdin")?;
        form.password = Some(line.trim_end_matches(['\r', '\n']).to_string());
    }

    if negotiator.form().is_empty() {
        negotiator.restart().await;
    } else {
        negotiator.restart_with_credentials().await;
    }

    let end = negotiator.state();
    if !end.is_terminal() && !negotiator.backend_unreachable() {
        ctx.notifier.info("Restart not confirmed");
    }
    watcher.wait().await;
    Ok(exit_code(restart_succeeded(end)))
}

/// Only a restart that was carried out, or handed over as manual instructions, succeeds.
fn restart_succeeded(end: &RestartState) -> bool {
    matches!(
        end,
        RestartState::Completed { .. } | RestartState::ManualInstructions { .. }
    )
}

/// Ends an open `\r` progress readout before a notification is printed under it.
struct ProgressLine {
    open: Arc<AtomicBool>,
    inner: Arc<dyn Notifier>,
}

impl Notifier for ProgressLine {
    fn notify(&self, notification: Notification) {
        if self.open.swap(false, Ordering::Relaxed) {
            eprintln!();
        }
        self.inner.notify(notification);
    }
}

async fn run_upload(ctx: &Clients, path: PathBuf) -> Result<ExitCode> {
    let file = LocalFile::from_path(&path).with_context(|| format!("open {}", path.display()))?;
    let line_open = Arc::new(AtomicBool::new(false));
    let notifier = Arc::new(ProgressLine {
        open: line_open.clone(),
        inner: ctx.notifier.clone(),
    });
    let mut pipeline = UploadPipeline::new(
        ctx.rpc(),
        ctx.uploader(),
        notifier,
        ctx.cfg.upload_history_limit,
    );
    if !pipeline.select_file(file) {
        return Ok(ExitCode::FAILURE);
    }

    let name = pipeline
        .state()
        .selected_file()
        .map(|f| f.name.clone())
        .unwrap_or_default();
    let show_progress = !ctx.json && std::io::stderr().is_terminal();
    let mut pipeline = pipeline.with_progress_observer(Arc::new(move |pct: u8| {
        if !show_progress {
            return;
        }
        eprint!("\rUploading {name}: {pct:>3}%");
        if pct == 100 {
            eprintln!();
            line_open.store(false, Ordering::Relaxed);
        } else {
            line_open.store(true, Ordering::Relaxed);
        }
        let _ = std::io::stderr().flush();
    }));

    let abort = pipeline.abort_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.store(true, Ordering::Relaxed);
        }
    });
    let outcome = pipeline.upload().await;
    interrupt.abort();

    if ctx.json {
        let out = json!({
            "uploaded": outcome == UploadOutcome::Uploaded,
            "uploads": pipeline.state().history(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    }
    Ok(exit_code(outcome == UploadOutcome::Uploaded))
}

async fn run_env(ctx: &Clients) -> Result<ExitCode> {
    let mut panel = EnvironmentPanel::new(ctx.rpc(), ctx.notifier.clone(), ctx.prompter.clone());
    if !panel.load().await {
        return Ok(ExitCode::FAILURE);
    }
    let Some(info) = panel.info() else {
        return Ok(ExitCode::FAILURE);
    };
    if ctx.json {
        println!("{}", serde_json::to_string_pretty(info)?);
    } else {
        print_env(info);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_env(info: &EnvInfo) {
    let os = &info.os_info;
    println!("Odoo       {}", info.odoo_version);
    println!("Python     {} ({})", info.python_version, info.python_executable);
    println!("System     {} {} {}", os.system, os.release, os.machine);
    if !os.processor.is_empty() {
        println!("Processor  {}", os.processor);
    }
    println!();
    println!("Packages ({})", info.total_packages);
    for pkg in &info.packages {
        println!("  {:<32} {}", pkg.name, pkg.version);
    }
    if !info.environment_vars.is_empty() {
        println!();
        println!("Environment");
        for (k, v) in &info.environment_vars {
            println!("  {k}={v}");
        }
    }
}

/// Restores cooked mode when dropped.
struct RawMode;

impl RawMode {
    fn enter() -> Result<Self> {
        enable_raw_mode().context("enable raw mode")?;
        Ok(RawMode)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

fn draw_input(session: &CommandSession) -> Result<()> {
    let state = session.state();
    let kind = match state.history_cursor() {
        Some(i) => format!("{} #{}", state.command_type.as_str(), i + 1),
        None => state.command_type.as_str().to_string(),
    };
    let mut out = std::io::stdout();
    execute!(
        out,
        cursor::MoveToColumn(0),
        terminal::Clear(ClearType::CurrentLine),
        Print(format!("[{kind}]> {}", state.command_text)),
    )?;
    Ok(())
}

async fn run_shell(ctx: &Clients, command_type: CommandType) -> Result<ExitCode> {
    if !std::io::stdin().is_terminal() {
        anyhow::bail!("the interactive shell needs a terminal; use `devterm exec` instead");
    }
    let mut session = CommandSession::new(ctx.rpc(), ctx.notifier.clone(), ctx.cfg.history_limit);
    session.state_mut().command_type = command_type;
    session.load_history(ctx.cfg.history_limit).await;

    eprintln!(
        "Connected to {}. Enter runs, Up/Down browse history, Tab switches kind, Ctrl+L clears, :recall N, Esc quits.",
        ctx.cfg.base_url
    );

    loop {
        let raw = RawMode::enter()?;
        draw_input(&session)?;
        let submit = loop {
            let Event::Key(k) = event::read()? else {
                continue;
            };
            if k.kind != KeyEventKind::Press {
                continue;
            }
            match (k.modifiers, k.code) {
                (_, KeyCode::Esc)
                | (KeyModifiers::CONTROL, KeyCode::Char('d'))
                | (KeyModifiers::CONTROL, KeyCode::Char('c')) => break false,
                (_, KeyCode::Enter) => break true,
                (KeyModifiers::CONTROL, KeyCode::Char('l')) => {
                    session.clear();
                    execute!(
                        std::io::stdout(),
                        terminal::Clear(ClearType::All),
                        cursor::MoveTo(0, 0)
                    )?;
                }
                (_, KeyCode::Up) => session.navigate_history(Direction::Older),
                (_, KeyCode::Down) => session.navigate_history(Direction::Newer),
                (_, KeyCode::Tab) => {
                    let next = session.state().command_type.cycle();
                    session.state_mut().command_type = next;
                }
                (_, KeyCode::Backspace) => {
                    session.state_mut().command_text.pop();
                }
                (_, KeyCode::Char(c)) => session.state_mut().command_text.push(c),
                _ => {}
            }
            draw_input(&session)?;
        };
        drop(raw);
        println!();

        if !submit {
            return Ok(ExitCode::SUCCESS);
        }

        let text = session.state().command_text.trim().to_string();
        if let Some(arg) = text.strip_prefix(":recall") {
            recall_entry(&mut session, arg.trim());
            continue;
        }

        session.execute().await;
        if session.state_mut().take_scroll_request() {
            let state = session.state();
            print_session_output(&state.output, &state.error_output);
        }
    }
}

/// `:recall N` loads the N-th most recent history entry (1-based, as `history` lists them).
fn recall_entry(session: &mut CommandSession, arg: &str) {
    let record = arg
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| session.state().history().get(i).cloned());
    match record {
        Some(record) => session.recall(&record),
        None => {
            session.state_mut().command_text.clear();
            eprintln!("No history entry {arg:?}");
        }
    }
}
