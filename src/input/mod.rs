pub mod confirm;
pub mod formatting;
pub mod selection;

pub use confirm::{ConfirmAction, ConfirmRequest};
pub use formatting::{FormatCommand, FormatError, apply_format, strip_html};
pub use selection::{EditMode, Highlight, SelectionIntent, SelectionMachine, SelectionState};
