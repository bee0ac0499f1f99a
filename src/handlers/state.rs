//! Shared server state
//!
//! One [`ServiceState`] per process, shared by every handler behind an `Arc`.

use anyhow::{Context, Result};
use std::time::Instant;
use tracing::{info, warn};

use crate::auth;
use crate::config::{FounderConfig, ServerConfig};
use crate::graph::{open_store, EntityId, Graph};
use crate::validation::{self, Rule};

pub struct ServiceState {
    pub graph: Graph,
    pub config: ServerConfig,
    started_at: Instant,
}

impl ServiceState {
    /// Open the configured backend and seed the founder account
    pub fn new(config: ServerConfig) -> Result<Self> {
        let store = open_store(&config).context("failed to open graph store")?;
        let graph = Graph::new(store, config.flavor);
        Self::with_graph(graph, config)
    }

    /// Wrap an existing graph (tests use an in-memory one)
    pub fn with_graph(graph: Graph, config: ServerConfig) -> Result<Self> {
        let state = Self {
            graph,
            config,
            started_at: Instant::now(),
        };
        if let Some(founder) = state.config.founder.clone() {
            state.seed_founder(&founder)?;
        }
        Ok(state)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Create the founder user unless one with that username exists
    ///
    /// Invalid founder credentials are logged and skipped rather than
    /// aborting startup.
    fn seed_founder(&self, founder: &FounderConfig) -> Result<Option<EntityId>> {
        if let Some(existing) = self.graph.find_user_by_username(&founder.username)? {
            info!(founder = %existing.id, "Founder account already present");
            return Ok(None);
        }

        let checks = [
            validation::check(
                "username",
                &founder.username,
                &[Rule::Required, Rule::Pattern(&validation::USERNAME_PATTERN)],
            ),
            validation::check(
                "password",
                &founder.password,
                &[Rule::Required, Rule::Pattern(&validation::PASSWORD_PATTERN)],
            ),
            validation::check("email", &founder.email, &[Rule::Required, Rule::Email]),
        ];
        if let Some(Err(violation)) = checks.into_iter().find(|c| c.is_err()) {
            warn!("Founder account not created: {violation}");
            return Ok(None);
        }

        let hash = auth::hash_password(&founder.password)?;
        let Some(user) = self
            .graph
            .create_user(&founder.username, &founder.email, &hash)?
        else {
            info!(username = %founder.username, "Founder account already present");
            return Ok(None);
        };
        self.graph.flush()?;
        info!(founder = %user.id, username = %founder.username, "Founder account created");
        Ok(Some(user.id))
    }
}
