pub mod context;
pub mod error;
pub mod greek;
pub mod version;

pub use context::Context;
pub use error::Error;
pub use version::Version;

/// The platform's human-facing timestamp format,
/// `YYYY.MM.DD-HH:MM:SS.mmm±HH:MM`, used for `called_at` and
/// `last_updated` fields.
pub const TIME_FORMAT: &str = "%Y.%m.%d-%H:%M:%S%.3f%:z";
