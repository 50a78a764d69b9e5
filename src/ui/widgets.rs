use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

use super::helpers::{format_size, truncate_string};
use crate::app::App;
use crate::transfer::{TransferItem, TransferKind, TransferStatus};

pub fn draw_transfer_queue(f: &mut Frame, app: &App, area: Rect) {
    let uploads = app.uploads.summary();
    let downloads = app.downloads.summary();
    let running_count = uploads.active + downloads.active;
    let queued_count = uploads.pending + downloads.pending;
    let failed_count = uploads.failed + downloads.failed;

    let total_ops = app.queue_rows.len();
    let scroll_info = if total_ops > 0 {
        format!(
            " [{}/{}]",
            app.selected_queue_index.saturating_add(1).min(total_ops),
            total_ops
        )
    } else {
        String::new()
    };

    let title = format!(
        "Transfers ({running_count} running, {queued_count} queued, {failed_count} failed){scroll_info}"
    );

    let border_color = if failed_count > 0 {
        Color::Red
    } else {
        Color::Yellow
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(border_color));

    let inner = block.inner(area);
    f.render_widget(block, area);

    if app.queue_rows.is_empty() {
        let empty = Paragraph::new("Nothing queued").style(Style::default().fg(Color::DarkGray));
        f.render_widget(empty, inner);
        return;
    }

    // 2 lines per transfer: info line and progress bar
    let capacity = (inner.height as usize / 2).max(1);
    let selected = app.selected_queue_index.min(total_ops - 1);

    // Keep the selected item roughly centered
    let window_start = if total_ops <= capacity {
        0
    } else {
        selected
            .saturating_sub(capacity / 2)
            .min(total_ops - capacity)
    };
    let window_end = (window_start + capacity).min(total_ops);

    let mut constraints = vec![];
    for _ in window_start..window_end {
        constraints.push(Constraint::Length(1)); // Info line
        constraints.push(Constraint::Length(1)); // Progress bar
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(0)
        .constraints(constraints)
        .split(inner);

    for (i, item) in app.queue_rows[window_start..window_end].iter().enumerate() {
        let chunk_idx = i * 2;
        let is_selected = window_start + i == selected;

        let info_text = transfer_info_line(item, is_selected, chunks[chunk_idx].width as usize);
        let info_style = if is_selected {
            // High contrast: Black background + bright White text + BOLD
            Style::default()
                .fg(Color::White)
                .bg(Color::Black)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(status_color(item.status))
        };
        f.render_widget(Paragraph::new(info_text).style(info_style), chunks[chunk_idx]);

        let width = chunks[chunk_idx + 1].width as usize;
        let detail_line = match (&item.status, &item.error_message) {
            (TransferStatus::Failed, Some(error)) => Line::from(Span::styled(
                truncate_string(&format!("  {error}"), width),
                Style::default().fg(Color::Red),
            )),
            _ => Line::from(Span::styled(
                draw_progress_bar(item.progress_percentage().unwrap_or(0), width),
                Style::default().fg(Color::Cyan).bg(Color::Black),
            )),
        };
        f.render_widget(Paragraph::new(detail_line), chunks[chunk_idx + 1]);
    }
}

fn transfer_info_line(item: &TransferItem, is_selected: bool, width: usize) -> String {
    let op_type = match item.kind {
        TransferKind::Upload => "↑ Upload",
        TransferKind::Download => "↓ Download",
    };

    let status_icon = match item.status {
        TransferStatus::Pending => "⏸",
        TransferStatus::Active => "⟳",
        TransferStatus::Success => "✓",
        TransferStatus::Failed => "✗",
    };

    let bytes = match item.size {
        Some(size) => format!("{} / {}", format_size(item.transferred), format_size(size)),
        None => format_size(item.transferred),
    };
    let percentage = item
        .progress_percentage()
        .map(|p| format!("{p:3}%"))
        .unwrap_or_else(|| "  ?%".to_string());

    let destination = match (&item.result_url, &item.save_path) {
        (Some(url), _) => format!(" → {url}"),
        (None, Some(path)) => format!(" → {}", path.display()),
        _ => String::new(),
    };

    let selection_mark = if is_selected { "►" } else { " " };

    // Fixed parts: mark, icon, type, separators, bytes, percentage
    let fixed = 2 + 2 + 11 + 6 + bytes.chars().count() + 7;
    let name_width = width.saturating_sub(fixed).max(15);

    format!(
        "{selection_mark} {status_icon} {op_type:<10} │ {} │ {bytes} ({percentage})",
        truncate_string(&format!("{}{destination}", item.key), name_width),
    )
}

fn status_color(status: TransferStatus) -> Color {
    match status {
        TransferStatus::Pending => Color::Yellow,
        TransferStatus::Active => Color::Cyan,
        TransferStatus::Success => Color::Green,
        TransferStatus::Failed => Color::Red,
    }
}

fn draw_progress_bar(percentage: u16, width: usize) -> String {
    let filled_width = ((width as f64 * percentage as f64) / 100.0) as usize;
    let empty_width = width.saturating_sub(filled_width);

    let filled = "█".repeat(filled_width);
    let empty = "░".repeat(empty_width);

    format!("{filled}{empty}")
}

pub fn draw_listing(f: &mut Frame, app: &App, area: Rect) {
    let prefix = if app.prefix.is_empty() { "/" } else { app.prefix.as_str() };
    let title = if app.listing_loading() {
        format!("{prefix} (loading...)")
    } else {
        format!("{prefix} (F5 refresh)")
    };
    let block = Block::default().borders(Borders::ALL).title(title);

    if let Some(error) = &app.listing_error {
        let message = Paragraph::new(error.as_str())
            .style(Style::default().fg(Color::Red))
            .block(block);
        f.render_widget(message, area);
        return;
    }

    let name_width = (area.width as usize).saturating_sub(16).max(10);
    let items: Vec<ListItem> = app
        .listing
        .iter()
        .map(|entry| {
            let name = entry.name();
            if entry.is_prefix {
                ListItem::new(Line::from(Span::styled(
                    format!("{}/", truncate_string(name, name_width)),
                    Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
                )))
            } else {
                ListItem::new(format!(
                    "{:<name_width$} {:>10}",
                    truncate_string(name, name_width),
                    format_size(entry.size)
                ))
            }
        })
        .collect();

    f.render_widget(List::new(items).block(block), area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_bar_fills_proportionally() {
        assert_eq!(draw_progress_bar(50, 4), "██░░");
        assert_eq!(draw_progress_bar(0, 3), "░░░");
        assert_eq!(draw_progress_bar(100, 2), "██");
    }
}
