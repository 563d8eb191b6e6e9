pub mod display;
pub mod icons;
pub mod terminal;

pub use display::{LogLevel, ProgressDisplay, UiMode, display_subscriber};
pub use terminal::TerminalDisplay;
