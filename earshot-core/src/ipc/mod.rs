//! Serialisable types the capture writer publishes to its listeners.
//!
//! Everything derives `serde::Serialize` + `serde::Deserialize` so a serving
//! layer can forward events verbatim.

pub mod events;
