//! Pure domain logic for generation-session tracking.
//!
//! Session states, normalized events, progress policy, error kinds, and
//! the observer contract. No I/O or async runtime dependencies; everything
//! here is unit-testable in isolation. The transports that feed these types
//! live in `cityforge-session`.

pub mod error;
pub mod events;
pub mod observer;
pub mod progress;
pub mod state;
pub mod tracker;
pub mod types;
