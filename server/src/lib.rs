//! Authoritative game server.
//!
//! The simulation loop in [`network`] owns the [`game::World`] and runs
//! it at a fixed tick rate; connection tasks feed it decoded client
//! messages over channels and receive broadcast lines back through
//! bounded per-session queues.

pub mod fire;
pub mod game;
pub mod network;
pub mod physics;
pub mod round;
pub mod sessions;
pub mod terrain;
