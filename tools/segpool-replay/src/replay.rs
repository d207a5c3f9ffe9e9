//! Executes a parsed script against a [`PoolRegistry`].

use std::collections::HashMap;
use std::io::Write;

use anyhow::{Context, Result};
use segpool::{AllocHandle, PoolConfig, PoolError, PoolHandle, PoolRegistry};

use crate::script::{Expect, PoolDecl, Script, Step};

/// Totals reported after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    /// Steps executed.
    pub steps: usize,
    /// Steps whose outcome differed from `expect`.
    pub mismatches: usize,
}

/// Registry plus the name tables a script refers to.
pub struct Replayer {
    registry: PoolRegistry,
    pools: HashMap<String, PoolHandle>,
    labels: HashMap<(String, String), AllocHandle>,
    trace_layout: bool,
}

impl Replayer {
    /// Creates and initializes a registry with `config`.
    pub fn new(config: PoolConfig, trace_layout: bool) -> Result<Self> {
        let mut registry = PoolRegistry::new(config);
        registry.init().context("Failed to initialize pool registry")?;
        Ok(Self {
            registry,
            pools: HashMap::new(),
            labels: HashMap::new(),
            trace_layout,
        })
    }

    /// Opens every declared pool, in order.
    pub fn open_pools(&mut self, decls: &[PoolDecl]) -> Result<()> {
        for decl in decls {
            let handle = self
                .registry
                .open(decl.size, decl.policy)
                .with_context(|| format!("Failed to open pool `{}`", decl.name))?;
            tracing::info!(pool = %decl.name, size = decl.size, policy = %decl.policy, "opened");
            self.pools.insert(decl.name.clone(), handle);
        }
        Ok(())
    }

    /// Opens the script's pools and executes its steps, writing one line per
    /// step to `out`.
    pub fn run(&mut self, script: &Script, out: &mut impl Write) -> Result<Summary> {
        self.open_pools(&script.pools)?;

        let mut summary = Summary {
            steps: 0,
            mismatches: 0,
        };
        for (i, step) in script.steps.iter().enumerate() {
            let number = i + 1;
            let pool = self.handle(step.pool())?;
            let (outcome, expect) = self.execute(step, pool);

            let matched = outcome.is_ok() == (expect == Expect::Ok);
            let detail = match &outcome {
                Ok(detail) => detail.clone(),
                Err(err) => format!("error: {err}"),
            };
            writeln!(
                out,
                "{number:>4}  {:<7} {:<12} {detail}{}",
                op_name(step),
                step.pool(),
                if matched { "" } else { "  [MISMATCH]" },
            )?;

            if !matched {
                summary.mismatches += 1;
                tracing::warn!(step = number, expected = ?expect, "{detail}");
            }
            if self.trace_layout && !matches!(step, Step::Inspect { .. }) {
                if let Ok(snapshot) = self.registry.inspect(pool) {
                    write!(out, "{snapshot}")?;
                }
            }
            summary.steps += 1;
        }
        Ok(summary)
    }

    /// Tears the registry down if every pool was closed.
    ///
    /// Returns the number of pools left open.
    pub fn finish(mut self) -> usize {
        let open = self.registry.open_pools();
        if open == 0 {
            if let Err(err) = self.registry.teardown() {
                tracing::warn!("teardown failed: {err}");
            }
        } else {
            tracing::warn!("{open} pool(s) left open at end of script");
        }
        open
    }

    fn handle(&self, name: &str) -> Result<PoolHandle> {
        self.pools
            .get(name)
            .copied()
            .with_context(|| format!("pool `{name}` was never opened"))
    }

    fn execute(
        &mut self,
        step: &Step,
        pool: PoolHandle,
    ) -> (std::result::Result<String, PoolError>, Expect) {
        match step {
            Step::Alloc {
                pool: name,
                size,
                label,
                expect,
            } => {
                let outcome = self.registry.allocate(pool, *size).and_then(|handle| {
                    let (offset, size) = self.registry.pool(pool)?.extent(handle)?;
                    if let Some(label) = label {
                        self.labels.insert((name.clone(), label.clone()), handle);
                    }
                    Ok(format!("{size} byte(s) at offset {offset}"))
                });
                (outcome, *expect)
            }
            Step::Free {
                pool: name,
                label,
                expect,
            } => {
                // Labels stay bound after a free so a repeated free reaches
                // the pool and is rejected there.
                let outcome = match self.labels.get(&(name.clone(), label.clone())) {
                    Some(&handle) => self
                        .registry
                        .deallocate(pool, handle)
                        .map(|()| format!("freed `{label}`")),
                    None => Err(PoolError::NotFound),
                };
                (outcome, *expect)
            }
            Step::Inspect { .. } => {
                let outcome = self.registry.inspect(pool).map(|snapshot| {
                    format!("{} segment(s)\n{}", snapshot.len(), snapshot.to_string().trim_end())
                });
                (outcome, Expect::Ok)
            }
            Step::Close { expect, .. } => {
                let size = self.registry.pool(pool).map(segpool::Pool::total_size);
                let outcome = self
                    .registry
                    .close(pool)
                    .and_then(|()| Ok(format!("released {} byte(s)", size?)));
                (outcome, *expect)
            }
        }
    }
}

fn op_name(step: &Step) -> &'static str {
    match step {
        Step::Alloc { .. } => "alloc",
        Step::Free { .. } => "free",
        Step::Inspect { .. } => "inspect",
        Step::Close { .. } => "close",
    }
}
