//! Query optimizer module
//!
//! Rule-based optimization of logical plans

mod rules;

pub use rules::*;

use crate::error::Result;
use crate::planner::LogicalPlan;
use std::sync::Arc;

/// Optimizer rule for plan transformations
pub trait OptimizerRule: Send + Sync {
    /// Name of this rule
    fn name(&self) -> &str;

    /// Apply this rule to the plan
    fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan>;
}

/// Main optimizer that applies rules to logical plans
pub struct Optimizer {
    rules: Vec<Arc<dyn OptimizerRule>>,
    max_iterations: usize,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Arc::new(rules::ConstantFolding),
                Arc::new(rules::PredicatePushdown),
                Arc::new(rules::ProjectionPushdown),
            ],
            max_iterations: 10,
        }
    }

    /// Create optimizer with custom rules
    pub fn with_rules(rules: Vec<Arc<dyn OptimizerRule>>) -> Self {
        Self {
            rules,
            max_iterations: 10,
        }
    }

    /// Optimize a logical plan until a fixed point (or the iteration cap)
    pub fn optimize(&self, plan: LogicalPlan) -> Result<LogicalPlan> {
        let mut current = plan;

        for _ in 0..self.max_iterations {
            let mut changed = false;

            for rule in &self.rules {
                let new_plan = rule.optimize(&current)?;
                if new_plan != current {
                    changed = true;
                    current = new_plan;
                }
            }

            if !changed {
                break;
            }
        }

        Ok(current)
    }
}
