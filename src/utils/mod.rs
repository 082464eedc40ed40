//! Shared helpers.
//!
//! | Module | Purpose                                      |
//! |--------|----------------------------------------------|
//! | `exec` | External command builder and `exec!` macro   |
//! | `path` | Path normalization                           |

pub mod exec;
pub mod path;
