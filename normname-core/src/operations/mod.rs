//! High-level operations that correspond to CLI commands
//!
//! These modules contain the business logic for each normname command,
//! separated from CLI concerns like argument parsing and prompting.

pub mod apply;
pub mod history;
pub mod plan;
pub mod status;
pub mod undo;

pub use apply::apply_operation;
pub use history::history_operation;
pub use plan::plan_operation;
pub use status::status_operation;
pub use undo::undo_operation;

use crate::config::{resolve_state_dir, Config};
use crate::engine::Engine;
use crate::history::HistoryStore;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Inputs every operation needs: where state lives and the loaded config
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub state_dir: PathBuf,
    pub config: Config,
    pub use_color: bool,
}

impl OperationContext {
    /// Resolve the state directory and load its config file, if any
    pub fn load(state_dir: Option<&Path>, use_color: bool) -> Result<Self> {
        let state_dir = resolve_state_dir(state_dir)?;
        let config = Config::load(&state_dir)?;
        Ok(Self {
            state_dir,
            config,
            use_color,
        })
    }

    pub fn history(&self) -> HistoryStore {
        HistoryStore::open(&self.state_dir)
    }

    pub fn engine(&self) -> Engine {
        Engine::new(self.config.rules.clone(), self.history())
            .with_max_records(self.config.history.max_records)
    }
}
