pub mod display;
pub mod icons;
pub mod progress;

pub use display::{header, render_context_stats, render_itinerary, render_result};
pub use progress::{RunProgress, SuspendedInput};
