//! Workload script format.
//!
//! ```toml
//! [config.node-heap]
//! initial-capacity = 8
//!
//! [[pool]]
//! name = "main"
//! size = 1000
//! policy = "best-fit"
//!
//! [[step]]
//! op = "alloc"
//! pool = "main"
//! size = 100
//! label = "a"
//!
//! [[step]]
//! op = "alloc"
//! pool = "main"
//! size = 5000
//! expect = "fail"
//!
//! [[step]]
//! op = "free"
//! pool = "main"
//! label = "a"
//!
//! [[step]]
//! op = "inspect"
//! pool = "main"
//!
//! [[step]]
//! op = "close"
//! pool = "main"
//! ```

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use segpool::{AllocPolicy, PoolConfig};
use serde::Deserialize;

/// A parsed workload script.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    /// Growth configuration; defaults apply when absent.
    #[serde(default)]
    pub config: Option<PoolConfig>,
    /// Pools opened, in order, before the first step.
    #[serde(default, rename = "pool")]
    pub pools: Vec<PoolDecl>,
    /// Steps executed in order.
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

/// A pool to open at startup.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolDecl {
    /// Name steps refer to the pool by.
    pub name: String,
    /// Buffer size in bytes.
    pub size: usize,
    /// Gap selection policy.
    pub policy: AllocPolicy,
}

/// Whether a step is expected to succeed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Expect {
    /// The step must succeed.
    #[default]
    Ok,
    /// The step must fail.
    Fail,
}

/// One scripted operation.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Step {
    /// Allocate `size` bytes, optionally remembering the handle as `label`.
    Alloc {
        /// Target pool.
        pool: String,
        /// Requested bytes.
        size: usize,
        /// Name for a later `free`.
        label: Option<String>,
        /// Expected outcome.
        #[serde(default)]
        expect: Expect,
    },
    /// Free the allocation remembered as `label`.
    Free {
        /// Target pool.
        pool: String,
        /// Label given at allocation.
        label: String,
        /// Expected outcome.
        #[serde(default)]
        expect: Expect,
    },
    /// Print the pool's layout.
    Inspect {
        /// Target pool.
        pool: String,
    },
    /// Close the pool.
    Close {
        /// Target pool.
        pool: String,
        /// Expected outcome.
        #[serde(default)]
        expect: Expect,
    },
}

impl Step {
    /// Name of the pool the step targets.
    pub fn pool(&self) -> &str {
        match self {
            Self::Alloc { pool, .. }
            | Self::Free { pool, .. }
            | Self::Inspect { pool }
            | Self::Close { pool, .. } => pool,
        }
    }
}

impl Script {
    /// Reads and parses a script file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid script {}", path.display()))
    }

    /// Parses script text and checks that every step names a declared pool.
    pub fn parse(content: &str) -> Result<Self> {
        let script: Self = toml::from_str(content).context("Failed to parse script")?;

        let mut names = HashSet::new();
        for decl in &script.pools {
            if !names.insert(decl.name.as_str()) {
                bail!("pool `{}` declared twice", decl.name);
            }
        }
        for (i, step) in script.steps.iter().enumerate() {
            if !names.contains(step.pool()) {
                bail!("step {} refers to undeclared pool `{}`", i + 1, step.pool());
            }
        }
        if let Some(config) = &script.config {
            config.validate().context("Invalid [config] table")?;
        }
        Ok(script)
    }
}

/// Reads a standalone growth configuration file.
pub fn load_config(path: &Path) -> Result<PoolConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: PoolConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"
[config.node-heap]
initial-capacity = 8

[[pool]]
name = "main"
size = 1000
policy = "best-fit"

[[step]]
op = "alloc"
pool = "main"
size = 100
label = "a"

[[step]]
op = "alloc"
pool = "main"
size = 5000
expect = "fail"

[[step]]
op = "free"
pool = "main"
label = "a"

[[step]]
op = "inspect"
pool = "main"
"#;

    #[test]
    fn parses_pools_steps_and_config() {
        let script = Script::parse(SCRIPT).unwrap();
        assert_eq!(script.pools.len(), 1);
        assert_eq!(script.pools[0].policy, AllocPolicy::BestFit);
        assert_eq!(script.steps.len(), 4);
        assert!(matches!(
            script.steps[1],
            Step::Alloc {
                size: 5000,
                expect: Expect::Fail,
                ..
            }
        ));
        assert_eq!(script.config.unwrap().node_heap.initial_capacity, 8);
    }

    #[test]
    fn rejects_undeclared_pool() {
        let err = Script::parse("[[step]]\nop = \"inspect\"\npool = \"ghost\"\n").unwrap_err();
        assert!(err.to_string().contains("undeclared pool `ghost`"));
    }

    #[test]
    fn rejects_duplicate_pool() {
        let text = "[[pool]]\nname = \"p\"\nsize = 1\npolicy = \"first-fit\"\n\n\
                    [[pool]]\nname = \"p\"\nsize = 2\npolicy = \"best-fit\"\n";
        assert!(Script::parse(text).is_err());
    }

    #[test]
    fn rejects_invalid_config() {
        let text = "[config.gap-index]\nfill-factor = 0.0\n";
        assert!(Script::parse(text).is_err());
    }
}
