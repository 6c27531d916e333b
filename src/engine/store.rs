// src/engine/store.rs

//! The ordered plan collection owned by the scheduler.

use crate::errors::{HabitatError, Result};
use crate::plan::validate::validate_plan;
use crate::plan::{Head, HeadUpdate, Plan};

/// What [`PlanStore::advance_head`] did with an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadAdvance {
    Applied,
    /// No plan has that name any more.
    PlanGone,
    /// The plan now tracks a different remote or branch than the pipeline
    /// that produced the update.
    RepositoryChanged,
}

/// Ordered, name-unique collection of plans.
///
/// Only the scheduler task holds one of these; every mutation arrives over
/// its request channel, so no locking happens here.
#[derive(Debug, Clone, Default)]
pub struct PlanStore {
    plans: Vec<Plan>,
}

impl PlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Plan> {
        self.plans.get(index)
    }

    pub fn find(&self, name: &str) -> Option<(usize, &Plan)> {
        self.plans.iter().enumerate().find(|(_, p)| p.name == name)
    }

    /// Clone of every plan, in order.
    pub fn snapshot(&self) -> Vec<Plan> {
        self.plans.clone()
    }

    /// Validate and append `plan` with its head reset to `NotYetCheckedOut`.
    pub fn insert(&mut self, mut plan: Plan) -> Result<usize> {
        validate_plan(&plan)?;
        if self.find(&plan.name).is_some() {
            return Err(HabitatError::DuplicatePlan(plan.name));
        }
        plan.head = Head::NotYetCheckedOut;
        self.plans.push(plan);
        Ok(self.plans.len() - 1)
    }

    /// Replace the plan at `index`.
    ///
    /// The stored head survives only when the name and repository are
    /// unchanged; a different remote or branch means the working copy no
    /// longer matches.
    pub fn replace(&mut self, index: usize, mut plan: Plan) -> Result<()> {
        validate_plan(&plan)?;
        let Some(current) = self.plans.get(index) else {
            return Err(HabitatError::PlanNotFound(format!("index {index}")));
        };

        if plan.name != current.name && self.find(&plan.name).is_some() {
            return Err(HabitatError::DuplicatePlan(plan.name));
        }

        plan.head = if plan.name == current.name && plan.repository == current.repository {
            current.head.clone()
        } else {
            Head::NotYetCheckedOut
        };
        self.plans[index] = plan;
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<Plan> {
        if index >= self.plans.len() {
            return Err(HabitatError::PlanNotFound(format!("index {index}")));
        }
        Ok(self.plans.remove(index))
    }

    pub fn remove_named(&mut self, name: &str) -> Result<Plan> {
        match self.find(name) {
            Some((index, _)) => Ok(self.plans.remove(index)),
            None => Err(HabitatError::PlanNotFound(name.to_string())),
        }
    }

    /// Record a successful checkout.
    ///
    /// Applies only while the named plan still tracks the update's
    /// repository; a plan replaced mid-batch keeps its reset head.
    pub fn advance_head(&mut self, update: &HeadUpdate) -> HeadAdvance {
        match self.plans.iter_mut().find(|p| p.name == update.plan) {
            Some(plan) if plan.repository == update.repository => {
                plan.head = Head::Commit(update.commit.clone());
                HeadAdvance::Applied
            }
            Some(_) => HeadAdvance::RepositoryChanged,
            None => HeadAdvance::PlanGone,
        }
    }
}
