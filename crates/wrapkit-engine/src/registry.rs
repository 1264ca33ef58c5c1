use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use wrapkit_core::call::{Args, Value};
use wrapkit_core::error::{Error, Result};

use crate::callable::Callable;
use crate::compose::{compose, Composed, Wrapper};
use crate::config::{FrameworkConfig, FunctionConfig, LayerConfig, MemoDefaults, MemoLayerConfig};
use crate::layers::{log_calls, time_calls, timeout, TimingSink};
use crate::memo::{memoize, MemoOptions};
use crate::obs::CallMetrics;
use crate::policy::require_role;

/// Named registry of base callables and their composed chains.
///
/// Bases are registered by code; `build` composes them according to a
/// `FrameworkConfig`. Bases the config does not mention are exposed with an
/// identity composition.
#[derive(Default)]
pub struct Registry {
    bases: DashMap<String, Arc<dyn Callable>>,
    composed: DashMap<String, Arc<Composed>>,
    metrics: Arc<CallMetrics>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metrics fed by every `time` layer built from config.
    pub fn metrics(&self) -> Arc<CallMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Register a base callable under its signature name.
    pub fn register_base(&self, base: Arc<dyn Callable>) {
        self.bases.insert(base.name().to_string(), base);
    }

    /// Registered base names, sorted.
    pub fn registered_bases(&self) -> Vec<String> {
        let mut out: Vec<String> = self.bases.iter().map(|e| e.key().clone()).collect();
        out.sort();
        out
    }

    /// Compose a registered base with explicit wrappers and publish it.
    pub fn compose_named(&self, name: &str, wrappers: &[Arc<dyn Wrapper>]) -> Result<Arc<Composed>> {
        let base = self.base(name)?;
        let composed = Arc::new(compose(base, wrappers)?);
        self.composed.insert(name.to_string(), Arc::clone(&composed));
        Ok(composed)
    }

    /// Compose every configured function, then expose the rest unwrapped.
    ///
    /// Nothing is published unless every function builds.
    pub fn build(&self, cfg: &FrameworkConfig) -> Result<()> {
        let mut built: Vec<(String, Arc<Composed>)> = Vec::with_capacity(cfg.functions.len());
        for f in &cfg.functions {
            let composed = self
                .compose_configured(&cfg.memoize, f)
                .map_err(|e| e.context(format!("building function `{}`", f.name)))?;
            built.push((f.name.clone(), composed));
        }

        for name in self.registered_bases() {
            if cfg.function(&name).is_none() && !self.composed.contains_key(&name) {
                let composed = Arc::new(compose(self.base(&name)?, &[])?);
                built.push((name, composed));
            }
        }

        for (name, composed) in built {
            self.composed.insert(name, composed);
        }

        tracing::info!(functions = self.composed.len(), "registry built");
        Ok(())
    }

    fn compose_configured(&self, defaults: &MemoDefaults, f: &FunctionConfig) -> Result<Arc<Composed>> {
        let wrappers = wrappers_for(defaults, f, self.metrics())?;
        Ok(Arc::new(compose(self.base(&f.name)?, &wrappers)?))
    }

    /// Composed callable published under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<Composed>> {
        self.composed.get(name).map(|e| Arc::clone(e.value()))
    }

    /// Published function names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut out: Vec<String> = self.composed.iter().map(|e| e.key().clone()).collect();
        out.sort();
        out
    }

    /// Invoke a published function; unknown names are an `ArgumentError`.
    pub async fn invoke(&self, name: &str, args: Args) -> Result<Value> {
        let composed = self
            .get(name)
            .ok_or_else(|| Error::argument(format!("unknown function: {name}")))?;
        composed.invoke(args).await
    }

    fn base(&self, name: &str) -> Result<Arc<dyn Callable>> {
        self.bases
            .get(name)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| {
                Error::configuration(format!("no base function registered as `{name}`"))
                    .with_field("function", name)
            })
    }

    /// Render metrics for all composed functions.
    pub fn render_metrics(&self) -> String {
        let registered = self.composed.len() as u64;
        self.metrics
            .render(&[("wrapkit_registered_functions", registered)])
    }
}

/// Translate one function's configured layers into wrapper factories.
///
/// `time` layers report to `timings`.
pub fn wrappers_for(
    defaults: &MemoDefaults,
    f: &FunctionConfig,
    timings: Arc<dyn TimingSink>,
) -> Result<Vec<Arc<dyn Wrapper>>> {
    f.layers
        .iter()
        .map(|layer| -> Result<Arc<dyn Wrapper>> {
            let w: Arc<dyn Wrapper> = match layer {
                LayerConfig::Log => Arc::new(log_calls()),
                LayerConfig::Time => Arc::new(time_calls().with_sink(Arc::clone(&timings))),
                LayerConfig::Memoize(m) => Arc::new(memoize(memo_options(defaults, m))?),
                LayerConfig::RequireRole(r) => Arc::new(require_role(r.role.clone())?),
                LayerConfig::Timeout(t) => Arc::new(timeout(Duration::from_millis(t.ms))?),
            };
            Ok(w)
        })
        .collect()
}

fn memo_options(defaults: &MemoDefaults, m: &MemoLayerConfig) -> MemoOptions {
    let mut opts = MemoOptions::new()
        .cache_failures(m.cache_failures.unwrap_or(defaults.cache_failures))
        .on_not_cacheable(m.on_not_cacheable.unwrap_or(defaults.on_not_cacheable));
    if let Some(max) = m.max_entries.or(defaults.max_entries) {
        opts = opts.max_entries(max);
    }
    opts
}
