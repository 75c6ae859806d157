//! Shared icons for terminal output.

use console::Emoji;

// Status
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");
pub static RETRY: Emoji<'_, '_> = Emoji("🔄 ", "[RETRY]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");

// Itinerary
pub static BOOK: Emoji<'_, '_> = Emoji("📚 ", "");
pub static CITY: Emoji<'_, '_> = Emoji("📍 ", "-");
pub static MAP: Emoji<'_, '_> = Emoji("🗺️  ", "");
pub static STATS: Emoji<'_, '_> = Emoji("📊 ", "");
