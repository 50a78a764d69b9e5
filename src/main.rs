use anyhow::{anyhow, Result};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::LevelFilter;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use tui_logger::{init_logger, set_default_level};

use s3q::cli::{self, Command, USAGE};
use s3q::models::config::{ConfigManager, ServerProfile};
use s3q::storage::{self, prefix_of};
use s3q::{operations, run_app, App};

#[tokio::main]
async fn main() -> Result<()> {
    let invocation = match cli::parse_args(std::env::args().skip(1)) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("! {e}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    let config_manager = match &invocation.config_path {
        Some(path) => ConfigManager::load_from(path)?,
        None => ConfigManager::new()?,
    };
    let profile = config_manager
        .resolve_profile(invocation.profile.as_deref())?
        .clone();

    if invocation.command.is_transfer() {
        run_transfers(&config_manager, &profile, invocation.command).await
    } else {
        let store = storage::connect(&profile).await?;
        for line in operations::execute(store.as_ref(), &invocation.command).await? {
            println!("{line}");
        }
        Ok(())
    }
}

async fn run_transfers(
    config_manager: &ConfigManager,
    profile: &ServerProfile,
    command: Command,
) -> Result<()> {
    init_logger(LevelFilter::Trace).map_err(|e| anyhow!("Failed to set up logging: {e:?}"))?;
    set_default_level(LevelFilter::Debug);

    let store = storage::connect(profile).await?;
    let mut app = App::new(
        store,
        &profile.name,
        config_manager.app_config.download_dir.clone(),
    );

    match command {
        Command::Upload { prefix, files } => {
            app.uploads.add_to_queue(files, &prefix);
            app.prefix = prefix;
        }
        Command::Download { keys } => {
            if let Some(first) = keys.first() {
                app.prefix = prefix_of(first).to_string();
            }
            for key in &keys {
                app.downloads.add_to_queue(key, None);
            }
        }
        _ => {}
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {err:?}");
    }
    // The log pane is gone; the drain tasks die with the runtime
    if let Some(warning) = app.unfinished_warning() {
        eprintln!("! {warning}");
    }

    Ok(())
}
