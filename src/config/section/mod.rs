//! Configuration section definitions.
//!
//! | Module       | TOML Section     | Purpose                             |
//! |--------------|------------------|-------------------------------------|
//! | `supervisor` | `[supervisor]`   | Paths, timings, restart policy, git |
//! | `unit`       | `[[unit]]`       | One managed worker each             |

mod supervisor;
mod unit;

pub use supervisor::SupervisorConfig;
pub use unit::UnitConfig;
