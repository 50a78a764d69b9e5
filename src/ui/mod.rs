mod draw;
mod helpers;
mod widgets;

pub use draw::draw;
pub use helpers::{centered_rect, format_size, truncate_string};
pub use widgets::{draw_listing, draw_transfer_queue};
