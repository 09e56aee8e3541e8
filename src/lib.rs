//! # Graph-of-Thoughts Reasoning Engine
//!
//! Models multi-step LLM reasoning as a directed acyclic graph of
//! operations. Each operation turns the thoughts produced by its
//! predecessors into new thoughts, calling a pluggable text-generation
//! backend where needed.
//!
//! ## Features
//!
//! - **Generate**: Branch each thought into `k` candidate continuations
//! - **Score**: Evaluate candidates one by one or side by side
//! - **KeepBestN**: Deterministic pruning to the top `n` candidates
//! - **Aggregate**: Merge surviving candidates into one synthesized thought
//! - **Improve / Validate / KeepValid**: Self-critique and filtering
//! - **Langbase backend**: Pipe-based completions with retry, backoff and
//!   usage accounting
//!
//! ## Architecture
//!
//! ```text
//! Payload → Controller → GraphOfOperations (topological walk)
//!                ↓                ↓
//!            Strategies      Backend (Langbase Pipes over HTTP)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use got_reasoning::{Controller, GraphOfOperations, JsonStrategy, Payload, Strategies};
//! use got_reasoning::operations::{Generate, KeepBestN, Score};
//! use got_reasoning::langbase::LangbaseClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = got_reasoning::Config::from_env()?;
//!     let backend = LangbaseClient::new(&config.langbase, config.request.clone(), config.pricing.clone())?;
//!
//!     let mut graph = GraphOfOperations::new();
//!     let generate = graph.add_operation(Generate::new(3));
//!     let score = graph.add_successor(generate, Score::independent())?;
//!     graph.add_successor(score, KeepBestN::new(1))?;
//!
//!     let strategies = Strategies::uniform(Arc::new(JsonStrategy::new("Sort the list.")));
//!     let controller = Controller::new(Arc::new(backend), strategies);
//!     let best = controller.run(&mut graph, Payload::new().with("list", "[3, 1, 2]")).await?;
//!     println!("{:?}", best);
//!     Ok(())
//! }
//! ```

/// Backend contract, retry state machine and usage accounting.
pub mod backend;
/// Configuration loaded from the environment.
pub mod config;
/// Graph execution.
pub mod controller;
/// Error types and result aliases for the application.
pub mod error;
/// The operation graph and its snapshots.
pub mod graph;
/// Langbase API client and types for pipe communication.
pub mod langbase;
/// Operation kinds.
pub mod operations;
/// Prompt templates and the Langbase pipe system prompt.
pub mod prompts;
/// Prompter and parser capabilities.
pub mod strategy;
/// Thoughts and payloads.
pub mod thought;

pub use backend::{Backend, UsageSnapshot};
pub use config::Config;
pub use controller::Controller;
pub use error::{AppError, AppResult};
pub use graph::{GraphOfOperations, OperationId};
pub use operations::{Operation, OperationKind};
pub use strategy::{JsonStrategy, Strategies};
pub use thought::{Payload, Thought, ThoughtId, Value};
