use anyhow::Result;
use crossterm::event::{self, Event, KeyEventKind};
use ratatui::Terminal;
use tokio::sync::watch;

use crate::app::{self, App};
use crate::handlers::key_to_message;
use crate::message::Message;
use crate::ui;

/// Change counters of both engines.
pub struct QueueWatch {
    uploads: watch::Receiver<u64>,
    downloads: watch::Receiver<u64>,
}

impl QueueWatch {
    pub fn new(app: &App) -> Self {
        Self {
            uploads: app.uploads.subscribe(),
            downloads: app.downloads.subscribe(),
        }
    }

    /// True if either queue changed since the last call.
    fn take_changed(&mut self) -> bool {
        let uploads = changed(&mut self.uploads);
        let downloads = changed(&mut self.downloads);
        uploads || downloads
    }
}

fn changed(rx: &mut watch::Receiver<u64>) -> bool {
    if rx.has_changed().unwrap_or(false) {
        rx.borrow_and_update();
        true
    } else {
        false
    }
}

/// Main application loop following The Elm Architecture (TEA)
pub async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> Result<()> {
    let mut last_render = std::time::Instant::now();
    let render_interval = std::time::Duration::from_millis(100); // Limit to 10 FPS for smooth rendering
    let mut needs_render = true;
    let mut queue_watch = QueueWatch::new(app);
    app.refresh_queue();

    loop {
        // Queue changes and listing reloads
        if process_background_tasks(app, &mut queue_watch).await? {
            needs_render = true;
        }

        // Render only when needed and throttled
        let now = std::time::Instant::now();
        if needs_render && now.duration_since(last_render) >= render_interval {
            terminal.draw(|f| ui::draw(f, app))?;
            // Explicit flush for Windows terminal responsiveness
            #[cfg(target_os = "windows")]
            {
                use std::io::Write;
                let _ = std::io::stdout().flush();
            }
            last_render = now;
            needs_render = false;
        }

        if app.should_quit {
            break;
        }

        if event::poll(std::time::Duration::from_millis(25))? {
            match event::read()? {
                Event::Key(key) => {
                    // Ignore key release events (Windows sends both press and release)
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }

                    if let Some(msg) = key_to_message(app, key.code, key.modifiers) {
                        dispatch(app, msg).await?;
                        needs_render = true;
                    }
                }
                Event::Resize(_, _) => {
                    needs_render = true;
                }
                _ => {}
            }
        } else {
            // The log pane changes without any queue change
            needs_render = true;
        }
    }

    Ok(())
}

/// Process a message and the messages it cascades into.
pub async fn dispatch(app: &mut App, msg: Message) -> Result<()> {
    let mut current_msg = Some(msg);
    while let Some(message) = current_msg {
        current_msg = app::update(app, message).await?;
    }
    Ok(())
}

/// Pick up engine changes and listing results, and start reloading an
/// invalidated listing. Never waits on the store.
/// Returns true if anything visible changed.
pub async fn process_background_tasks(
    app: &mut App,
    queue_watch: &mut QueueWatch,
) -> Result<bool> {
    let mut needs_render = false;

    if queue_watch.take_changed() {
        dispatch(app, Message::QueueChanged).await?;
        needs_render = true;
    }

    if app.check_listing_complete() {
        needs_render = true;
    }

    if app.needs_listing() {
        app.start_listing();
        needs_render = true;
    }

    Ok(needs_render)
}
