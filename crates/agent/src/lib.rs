//! AgentLoop Agents
//!
//! Capacity-bounded specialist agents backed by a language model endpoint,
//! plus the reply parser and the task store interface they read from.

pub mod agent;
pub mod analysis;
pub mod model;
pub mod store;

pub use agent::{Agent, Reservation, DEFAULT_CAPACITY};
pub use analysis::{matches_specialization, parse_analysis};
pub use model::{
    build_model, GeminiModel, LanguageModel, StaticModel, TimeoutModel, UnavailableModel,
};
pub use store::{MemoryTaskStore, TaskStore};
