//! thoughtmap: AI-generated, lazily expandable mind maps
//!
//! A map starts as a topic and grows one batch of subtopics at a time, each
//! batch produced by a language model and persisted atomically. Layout and
//! edges are recomputed from the stored tree on every change.
//!
//! ```text
//! api ──▶ orchestrator ──▶ ai (GenerationService)
//!              │
//!              ├──▶ store (TreeStore: PostgreSQL or in-memory)
//!              └──▶ layout
//! ```

pub mod ai;
pub mod billing;
pub mod config;
pub mod error;
pub mod layout;
pub mod models;
pub mod orchestrator;
pub mod session;
pub mod store;
pub mod tree;

#[cfg(feature = "server")]
pub mod api;

pub use ai::{AiConfig, AiError, GenerationService, OpenAiCompatClient};
pub use error::{MindMapError, MindMapResult};
pub use layout::{Edge, LayoutConfig, LayoutEngine, MapSnapshot, Position, PositionedNode};
pub use models::{MindMap, MindMapWithNodes, Node};
pub use orchestrator::{ExpansionOrchestrator, GeneratedMap, GenerationPolicy};
pub use session::MapSession;
pub use store::{InMemoryTreeStore, TreeStore};
