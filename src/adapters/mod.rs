//! Implementations of the port traits.
//!
//! - `live`: real HTTP, filesystem and in-process workflow adapters.
//! - `recording`: wrap a live adapter and write its traffic to a cassette.
//! - `replaying`: serve recorded traffic back from a cassette.
//! - `memory`: in-memory project store for dry runs and tests.

pub mod live;
pub mod memory;
pub mod recording;
pub mod replaying;
