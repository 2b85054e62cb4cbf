//! Headless client: spawns an agent and drives it over stdio.

pub mod session;
pub mod spawner;

pub use session::ClientSession;
pub use spawner::{spawn_agent, wait_for_exit, AgentProcess, SpawnConfig};
