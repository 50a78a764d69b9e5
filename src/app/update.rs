use super::App;
use crate::message::Message;
use crate::transfer::TransferStatus;
use anyhow::Result;

/// Central update function following The Elm Architecture (TEA)
/// Takes current app state and a message, applies the change, and optionally returns another message
pub async fn update(app: &mut App, msg: Message) -> Result<Option<Message>> {
    match msg {
        // ===== Application Control =====
        Message::Quit => {
            if let Some(warning) = app.unfinished_warning() {
                log::warn!("{warning}");
            }
            app.should_quit = true;
            Ok(None)
        }
        Message::NoOp => Ok(None),

        // ===== Queue Navigation =====
        Message::QueueNavigateUp => {
            app.selected_queue_index = app.selected_queue_index.saturating_sub(1);
            Ok(None)
        }
        Message::QueueNavigateDown => {
            if app.selected_queue_index + 1 < app.queue_rows.len() {
                app.selected_queue_index += 1;
            }
            Ok(None)
        }
        Message::QueueNavigateHome => {
            app.selected_queue_index = 0;
            Ok(None)
        }
        Message::QueueNavigateEnd => {
            app.selected_queue_index = app.queue_rows.len().saturating_sub(1);
            Ok(None)
        }

        // ===== Queue Management =====
        Message::RetrySelected => {
            let Some(item) = app.selected_item() else {
                return Ok(None);
            };
            if item.status != TransferStatus::Failed {
                return Ok(Some(Message::ShowError {
                    message: "Only failed transfers can be retried".to_string(),
                }));
            }
            let (kind, id) = (item.kind, item.id.clone());
            if !app.retry(kind, &id) {
                app.refresh_queue();
                return Ok(Some(Message::ShowError {
                    message: "Transfer is no longer failed or was removed".to_string(),
                }));
            }
            Ok(Some(Message::QueueChanged))
        }
        Message::RetryAllFailed => {
            let count = app.uploads.retry_all_failed() + app.downloads.retry_all_failed();
            if count > 0 {
                log::info!("Retrying {count} failed transfer(s)");
            }
            Ok(Some(Message::QueueChanged))
        }
        Message::RemoveSelected => {
            if let Some(item) = app.selected_item() {
                let (kind, id) = (item.kind, item.id.clone());
                app.remove(kind, &id);
            }
            Ok(Some(Message::QueueChanged))
        }
        Message::ClearCompleted => {
            app.uploads.clear_completed();
            app.downloads.clear_completed();
            Ok(Some(Message::QueueChanged))
        }
        Message::ClearAll => {
            // Each queue refuses on its own while it has work in flight
            let uploads_cleared = app.uploads.clear_all();
            let downloads_cleared = app.downloads.clear_all();
            if uploads_cleared && downloads_cleared {
                Ok(Some(Message::QueueChanged))
            } else {
                app.refresh_queue();
                Ok(Some(Message::ShowError {
                    message: "Cannot clear while transfers are pending or active".to_string(),
                }))
            }
        }

        // ===== Background Results =====
        Message::QueueChanged => {
            app.refresh_queue();
            Ok(None)
        }
        Message::RefreshListing => {
            app.cache.invalidate(&app.prefix);
            app.listing_error = None;
            app.start_listing();
            Ok(None)
        }

        // ===== Error Messages =====
        Message::ShowError { message } => {
            app.show_error(&message);
            Ok(None)
        }
        Message::Clear => {
            app.error_message.clear();
            Ok(None)
        }
    }
}
