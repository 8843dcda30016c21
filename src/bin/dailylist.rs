// Binary entry point: reminder daemon and one-shot task commands.
use anyhow::{Result, anyhow, bail};
use dailylist::agent::{
    AgentHandle, BackgroundAgent, DesktopSurface, LauncherClients, agent_channel, spawn_agent,
};
use dailylist::alert::{AlertBackend, AlertPlayer, BellBackend};
use dailylist::cli::{self, Command, TaskEdit, short_id};
use dailylist::config::Config;
use dailylist::context::{AppContext, SharedContext, StandardContext};
use dailylist::controller::TaskController;
use dailylist::daemon::StoreWatcher;
use dailylist::model::{Settings, Task, TaskDraft};
use dailylist::permission::{ConsoleNotice, DesktopPermissionHost, PermissionGate, UserNotice};
use dailylist::scheduler::{ReminderScheduler, ReminderStyle};
use dailylist::storage::LocalStore;
use dailylist::timer::TokioTimers;
use simplelog::{
    ColorChoice, CombinedLogger, LevelFilter, SharedLogger, TermLogger, TerminalMode, WriteLogger,
};
use std::env;
use std::fs::OpenOptions;
use std::sync::Arc;
use std::time::Duration;

const APP_NAME: &str = "DailyList";

type Controller = TaskController<DesktopPermissionHost>;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let invocation = match cli::parse_args(&args) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            eprintln!("Try 'dailylist --help'.");
            std::process::exit(2);
        }
    };

    if invocation.command == Command::Help {
        cli::print_help("dailylist");
        return Ok(());
    }

    let ctx: SharedContext = Arc::new(StandardContext::new(invocation.root.clone()));
    let config = Config::load_or_default(ctx.as_ref())?;
    let is_daemon = invocation.command == Command::Run;
    init_logging(ctx.as_ref(), &config, is_daemon);

    // Only the daemon delivers notifications. Other commands still reschedule
    // after a change, but their process exits long before any timer fires.
    let (dispatch, inbox) = agent_channel();
    if is_daemon {
        let surface = DesktopSurface::new(APP_NAME, dispatch.clone());
        let clients = LauncherClients::new(config.open_command.clone());
        spawn_agent(BackgroundAgent::new(surface, clients), inbox);
    } else {
        drop(inbox);
    }

    let controller = Arc::new(build_controller(ctx, &config, dispatch));
    controller.load().await?;

    match invocation.command {
        Command::Run => run_daemon(controller, &config).await,
        Command::Add(draft) => {
            let id = controller.save_task(draft).await?;
            println!("Added {}", short_id(&id));
            Ok(())
        }
        Command::Edit { id, edit } => edit_task(&controller, &id, &edit).await,
        Command::List => {
            print_tasks(&controller).await;
            Ok(())
        }
        Command::Done(id) => {
            let id = resolve_id(&controller, &id).await?;
            let task = controller.toggle_complete(&id).await?;
            println!("{} {}", task.checkbox_symbol(), task.title);
            Ok(())
        }
        Command::Delete(id) => {
            let id = resolve_id(&controller, &id).await?;
            let task = controller.delete_task(&id).await?;
            println!("Deleted '{}'", task.title);
            Ok(())
        }
        Command::Notifications(enabled) => {
            controller
                .set_settings(Settings {
                    notifications_enabled: enabled,
                })
                .await?;
            println!(
                "Notifications {}",
                if enabled { "enabled" } else { "disabled" }
            );
            Ok(())
        }
        Command::Help => Ok(()),
    }
}

fn init_logging(ctx: &dyn AppContext, config: &Config, is_daemon: bool) {
    let level = config.log_level_filter();
    // One-shot commands keep the terminal quiet unless something goes wrong.
    let term_level = if is_daemon {
        level
    } else {
        level.min(LevelFilter::Warn)
    };

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        term_level,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    if let Some(path) = ctx.get_log_path() {
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => loggers.push(WriteLogger::new(level, simplelog::Config::default(), file)),
            Err(e) => eprintln!("Could not open log file {:?}: {}", path, e),
        }
    }
    if CombinedLogger::init(loggers).is_err() {
        eprintln!("Logger already initialised");
    }
}

#[cfg(feature = "sound")]
fn sound_backend(config: &Config) -> Option<Arc<dyn AlertBackend>> {
    let path = config.sound_file.as_ref()?;
    match dailylist::alert::WavBackend::open(path) {
        Ok(backend) => Some(Arc::new(backend)),
        Err(e) => {
            log::warn!("{:#}; falling back to the terminal bell", e);
            None
        }
    }
}

#[cfg(not(feature = "sound"))]
fn sound_backend(config: &Config) -> Option<Arc<dyn AlertBackend>> {
    if config.sound_file.is_some() {
        log::warn!("sound_file is set but this build has no audio support; using the terminal bell");
    }
    None
}

fn build_controller(ctx: SharedContext, config: &Config, dispatch: AgentHandle) -> Controller {
    let backend: Arc<dyn AlertBackend> = match sound_backend(config) {
        Some(backend) => backend,
        None => Arc::new(BellBackend),
    };
    let scheduler = ReminderScheduler::new(
        Arc::new(TokioTimers::new()),
        Arc::new(dispatch),
        AlertPlayer::new(backend),
        ReminderStyle::from(config),
    );
    let notice: Arc<dyn UserNotice> = Arc::new(ConsoleNotice);
    let gate = PermissionGate::new(DesktopPermissionHost, Arc::clone(&notice));
    TaskController::new(Arc::new(LocalStore::new(ctx)), scheduler, gate, notice)
}

async fn run_daemon(controller: Arc<Controller>, config: &Config) -> Result<()> {
    let watcher = StoreWatcher::new(controller, Duration::from_secs(config.poll_interval_secs));
    watcher
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(())
}

/// Accepts a full id or any unique prefix of one.
async fn resolve_id(controller: &Controller, prefix: &str) -> Result<String> {
    let tasks = controller.tasks().await;
    if tasks.iter().any(|t| t.id == prefix) {
        return Ok(prefix.to_string());
    }
    let matches: Vec<&Task> = tasks.iter().filter(|t| t.id.starts_with(prefix)).collect();
    match matches.as_slice() {
        [task] => Ok(task.id.clone()),
        [] => Err(anyhow!("No task matches '{}'", prefix)),
        _ => bail!("'{}' matches {} tasks; use a longer prefix", prefix, matches.len()),
    }
}

async fn edit_task(controller: &Controller, prefix: &str, edit: &TaskEdit) -> Result<()> {
    let id = resolve_id(controller, prefix).await?;
    let task = controller
        .find(&id)
        .await
        .ok_or_else(|| anyhow!("Task {} not found", id))?;
    let mut draft = TaskDraft::from_task(&task);
    edit.apply(&mut draft);
    controller.save_task(draft).await?;
    println!("Updated {}", short_id(&id));
    Ok(())
}

async fn print_tasks(controller: &Controller) {
    let pending = controller.incomplete_tasks().await;
    let done = controller.completed_tasks().await;
    if pending.is_empty() && done.is_empty() {
        println!("No tasks yet. Add one with 'dailylist add <title>'.");
        return;
    }

    println!("Pending ({}):", pending.len());
    let now = chrono::Local::now();
    for task in &pending {
        println!("{}", cli::format_task_line(task, now));
    }
    if !done.is_empty() {
        println!();
        println!("Completed ({}):", done.len());
        for task in &done {
            println!("{}", cli::format_task_line(task, now));
        }
    }
    if !controller.settings().await.notifications_enabled {
        println!();
        println!("Notifications are off. Turn them on with 'dailylist notifications on'.");
    }
}
