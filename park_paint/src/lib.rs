pub mod arrange;
pub mod dispatch;
pub mod draw;
pub mod session;
pub mod target;

pub use draw::{draw_sorted, draw_strings, render_frame, FrameReport};
pub use session::{
    InteractionItem, PaintError, PaintSession, MAX_PAINT_QUADRANTS, MAX_PAINT_STRUCTS,
};
pub use target::{ImageEntry, ImageTable, RenderTarget};

/// Viewport view flags consumed by the draw pass.
pub const VIEW_FLAG_SEETHROUGH_RIDES: u32 = 1 << 0;
pub const VIEW_FLAG_SEETHROUGH_SCENERY: u32 = 1 << 1;
pub const VIEW_FLAG_SEETHROUGH_PATHS: u32 = 1 << 2;
pub const VIEW_FLAG_UNDERGROUND_INSIDE: u32 = 1 << 3;
