//! Terminal User Interface
//!
//! A single full-screen picker over the snapshot, drawn with ratatui on a
//! crossterm backend.
//!
//! - [`Picker`] holds the query, the ranked matches and the cursor
//! - [`render`] draws it: query line, match list, preview pane
//! - [`pick`] owns the terminal for the duration of one selection

mod picker;

pub use picker::{handle_key, pick, render, Picker, PickerAction};
