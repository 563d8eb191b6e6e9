//! Shared UI icons.
//!
//! Each icon falls back to a plain ASCII marker on terminals without emoji support.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static PAUSE: Emoji<'_, '_> = Emoji("⏸️  ", "[||]");
pub static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");

// Progress indicators
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
pub static SAVE: Emoji<'_, '_> = Emoji("💾 ", "[S]");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");
