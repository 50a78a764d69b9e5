use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};
use tui_logger::TuiLoggerWidget;

use super::helpers::centered_rect;
use super::widgets::{draw_listing, draw_transfer_queue};
use crate::app::App;

const MENU: [(&str, &str); 7] = [
    ("↑↓", "Select"),
    ("r", "Retry"),
    ("R", "RetryAll"),
    ("d", "Remove"),
    ("c", "Clear done"),
    ("C", "Clear all"),
    ("q", "Quit"),
];

pub fn draw(f: &mut Frame, app: &App) {
    // 2 lines per transfer + 2 for border, up to 8 transfers
    let queue_height = (app.queue_rows.len().clamp(1, 8) * 2 + 2) as u16;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(queue_height),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(f.area());

    let header = format!(
        "{}  │  downloads → {}",
        app.app_title,
        app.download_dir.display()
    );
    let title = Paragraph::new(header)
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(title, chunks[0]);

    draw_transfer_queue(f, app, chunks[1]);

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(chunks[2]);

    draw_listing(f, app, bottom[0]);

    let log_output = TuiLoggerWidget::default()
        .block(Block::default().title("Log").borders(Borders::ALL))
        .output_timestamp(Some("%H:%M:%S".to_string()))
        .output_separator(' ')
        .output_file(false)
        .state(&app.log_state)
        .style_error(Style::default().red())
        .style_warn(Style::default().yellow())
        .style_info(Style::default().cyan());
    f.render_widget(log_output, bottom[1]);

    draw_menu(f, chunks[3]);

    if !app.error_message.is_empty() {
        draw_error_overlay(f, app);
    }
}

/// MC-style key menu footer
fn draw_menu(f: &mut Frame, area: ratatui::layout::Rect) {
    let item_width = area.width as usize / MENU.len();
    let mut spans = Vec::new();

    for (key, label) in MENU {
        spans.push(Span::styled(
            key,
            Style::default().fg(Color::White).bg(Color::Black),
        ));
        spans.push(Span::styled(
            label,
            Style::default().fg(Color::Black).bg(Color::Cyan),
        ));

        let used_chars = key.chars().count() + label.chars().count();
        let remaining = item_width.saturating_sub(used_chars);
        if remaining > 0 {
            spans.push(Span::styled(
                " ".repeat(remaining),
                Style::default().bg(Color::Cyan),
            ));
        }
    }

    let help = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    f.render_widget(help, area);
}

fn draw_error_overlay(f: &mut Frame, app: &App) {
    let area = centered_rect(60, 20, f.area());
    f.render_widget(Clear, area);

    let error = Paragraph::new(app.error_message.as_str())
        .style(Style::default().fg(Color::White).bg(Color::Red))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .title(" Error (any key to close) ")
                .borders(Borders::ALL),
        );
    f.render_widget(error, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use ratatui::{backend::TestBackend, Terminal};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn rendered(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| draw(f, app)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[tokio::test]
    async fn shows_queue_and_listing() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.insert("reports/q1.pdf", vec![0u8; 100]);
        let mut app = App::new(store, "media", Some(dir.path().to_path_buf()));
        app.prefix = "reports/".to_string();

        app.downloads.add_to_queue("reports/q1.pdf", None);
        app.downloads.wait_idle().await;
        app.refresh_queue();
        app.wait_for_listing().await;

        let screen = rendered(&app);
        assert!(screen.contains("s3q - media"));
        assert!(screen.contains("reports/q1.pdf"));
        assert!(screen.contains("100%"));
        assert!(screen.contains("q1.pdf"));
    }

    #[tokio::test]
    async fn error_overlay_is_drawn() {
        let dir = TempDir::new().unwrap();
        let mut app = App::new(
            Arc::new(MemoryStore::new()),
            "media",
            Some(dir.path().to_path_buf()),
        );
        app.show_error("Cannot clear");
        assert!(rendered(&app).contains("Cannot clear"));
    }
}
