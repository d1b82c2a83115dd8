mod error;
mod params;
mod tz;

pub use error::{err, fail, Error, Result};
pub use params::SystemParams;
pub use tz::SessionTz;
