//! Rewrite Service
//!
//! Single owning actor over the store and the engine. Every read-modify-write
//! of the aggregate goes through one async mutex, so rule edits and header
//! captures that both travel through the service cannot silently overwrite
//! each other. The reactive loop recompiles once per observed store revision;
//! the watch channel collapses edit bursts into one pass.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::compiler;
use crate::engine::RuleEngine;
use crate::error::ServiceError;
use crate::sniffer;
use crate::state::{AppState, Rule, RuleUpdate};
use crate::store::RuleStore;

pub struct RewriteService<S, E> {
    store: Arc<S>,
    engine: Arc<E>,
    write_lock: tokio::sync::Mutex<()>,
}

impl<S: RuleStore, E: RuleEngine> RewriteService<S, E> {
    pub fn new(store: Arc<S>, engine: Arc<E>) -> Self {
        Self {
            store,
            engine,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Current persisted state.
    pub async fn state(&self) -> Result<AppState, ServiceError> {
        Ok(self.store.load().await?)
    }

    /// Recompile from the latest persisted state and atomically swap the
    /// installed set: every currently installed id is removed, whatever
    /// installed it, and the freshly compiled rules land in the same call.
    pub async fn recompile(&self) -> Result<usize, ServiceError> {
        let state = self.store.load().await?;
        let compiled = compiler::compile(&state)?;
        let installed = self.engine.installed_ids().await;
        let count = compiled.len();

        self.engine.replace(&installed, compiled).await?;

        if state.master_switch {
            info!(rules = count, "installed compiled rule set");
        } else {
            info!("master switch off: all rules removed");
        }
        Ok(count)
    }

    /// Observation entry point for the outbound-request path. Advisory and
    /// isolated: failures are logged here and never reach the caller, so the
    /// sniffed request is unaffected.
    pub async fn observe_request(&self, url: &str, headers: &[(String, String)]) {
        if let Err(err) = self.try_observe(url, headers).await {
            warn!(url, error = %err, "header capture pass abandoned");
        }
    }

    async fn try_observe(&self, url: &str, headers: &[(String, String)]) -> Result<(), ServiceError> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.store.load().await?;
        if sniffer::capture(&mut state, url, headers) {
            // This save is what flips a gated rule to "redirect active":
            // the store notification triggers the recompile loop.
            self.store.save(&state).await?;
        }
        Ok(())
    }

    /// Create a rule with UI defaults (active, auth preservation on).
    pub async fn add_rule(&self, search: String, replace: String) -> Result<Rule, ServiceError> {
        if search.is_empty() {
            return Err(ServiceError::EmptySearch);
        }

        let rule = Rule::new(search, replace);
        let _guard = self.write_lock.lock().await;
        let mut state = self.store.load().await?;
        state.rules.push(rule.clone());
        self.store.save(&state).await?;
        Ok(rule)
    }

    /// Apply a partial update to an existing rule.
    pub async fn update_rule(&self, id: &str, update: RuleUpdate) -> Result<Rule, ServiceError> {
        if let Some(search) = &update.search {
            if search.is_empty() {
                return Err(ServiceError::EmptySearch);
            }
        }

        let _guard = self.write_lock.lock().await;
        let mut state = self.store.load().await?;
        let rule = state
            .rule_mut(id)
            .ok_or_else(|| ServiceError::UnknownRule(id.to_string()))?;
        update.apply(rule);
        let updated = rule.clone();
        self.store.save(&state).await?;
        Ok(updated)
    }

    pub async fn delete_rule(&self, id: &str) -> Result<(), ServiceError> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.store.load().await?;
        if !state.remove_rule(id) {
            return Err(ServiceError::UnknownRule(id.to_string()));
        }
        self.store.save(&state).await?;
        Ok(())
    }

    pub async fn set_master_switch(&self, on: bool) -> Result<(), ServiceError> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.store.load().await?;
        state.master_switch = on;
        self.store.save(&state).await?;
        Ok(())
    }

    /// Reactive loop: one initial compilation pass, then one recompilation
    /// per observed store revision, until the store is dropped. A failed
    /// pass leaves the previously installed set in place; the next event
    /// retries in full.
    pub async fn run(&self) {
        let mut revisions = self.store.subscribe();

        if let Err(err) = self.recompile().await {
            error!(error = %err, "initial compilation failed");
        }

        while revisions.changed().await.is_ok() {
            if let Err(err) = self.recompile().await {
                error!(error = %err, "recompilation failed, previous rule set left in place");
            }
        }
        debug!("store closed, stopping rewrite loop");
    }
}
