/// Graph mutation
///
/// The editor treats graph mutation as a pure function: given the current
/// version and an operation it returns a brand new version, with no I/O and no
/// side effects. [`GraphMutator`] is that seam; [`FlowOperationApplier`] is the
/// implementation used by the editor and mirrors what the backend does when it
/// receives the same operation.

use crate::flow::operations::{
    AddActionRequest, FlowOperationRequest, MoveActionRequest, PasteActionsRequest, StepLocation,
    UpdateActionRequest, UpdateTriggerRequest,
};
use crate::flow::types::{
    find_in_slot_mut, find_unused_name, Action, ActionKind, FlowVersion, FlowVersionState, Trigger,
};
use std::collections::HashSet;

/// Errors raised for operations that do not fit the version they target
///
/// These indicate a malformed operation (a programming error in the caller),
/// not a runtime failure: a well-formed operation built from the current
/// version never produces one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    #[error("step '{name}' not found in flow version")]
    StepNotFound { name: String },

    #[error("step name '{name}' is already used in flow version")]
    DuplicateStepName { name: String },

    #[error("cannot place a step {location:?} '{parent}': {reason}")]
    InvalidLocation {
        parent: String,
        location: StepLocation,
        reason: String,
    },

    #[error("branch {index} out of range for router '{router}' ({branches} branches)")]
    BranchOutOfRange {
        router: String,
        index: usize,
        branches: usize,
    },

    #[error("step '{name}' is a {actual:?} action, not {requested:?}")]
    KindMismatch {
        name: String,
        actual: ActionKind,
        requested: ActionKind,
    },

    #[error("flow version '{version_id}' is locked")]
    VersionLocked { version_id: String },
}

/// Pure function computing the next version from an operation
pub trait GraphMutator: Send + Sync {
    fn apply(
        &self,
        version: &FlowVersion,
        operation: &FlowOperationRequest,
    ) -> Result<FlowVersion, MutationError>;
}

/// Step-tree implementation of [`GraphMutator`]
#[derive(Debug, Clone, Default)]
pub struct FlowOperationApplier;

impl FlowOperationApplier {
    pub fn new() -> Self {
        Self
    }
}

impl GraphMutator for FlowOperationApplier {
    fn apply(
        &self,
        version: &FlowVersion,
        operation: &FlowOperationRequest,
    ) -> Result<FlowVersion, MutationError> {
        if version.is_locked() && !matches!(operation, FlowOperationRequest::LockFlow) {
            return Err(MutationError::VersionLocked {
                version_id: version.id.clone(),
            });
        }

        let mut next = version.clone();
        match operation {
            FlowOperationRequest::ChangeName(request) => {
                next.display_name = request.display_name.clone();
            }
            FlowOperationRequest::UpdateTrigger(request) => update_trigger(&mut next, request)?,
            FlowOperationRequest::AddAction(request) => add_action(&mut next, request)?,
            FlowOperationRequest::UpdateAction(request) => update_action(&mut next, request)?,
            FlowOperationRequest::DeleteAction(request) => {
                let mut removed = HashSet::new();
                for name in &request.names {
                    // went away with an earlier-deleted loop or router
                    if removed.contains(name) {
                        continue;
                    }
                    let action = remove_action(&mut next.trigger, name)?;
                    removed.extend(action.subtree_names());
                }
            }
            FlowOperationRequest::DuplicateAction(request) => {
                duplicate_action(&mut next, &request.step_name)?
            }
            FlowOperationRequest::MoveAction(request) => move_action(&mut next, request)?,
            FlowOperationRequest::PasteActions(request) => paste_actions(&mut next, request)?,
            FlowOperationRequest::SetSkipAction(request) => {
                for name in &request.names {
                    let action = next
                        .get_action_mut(name)
                        .ok_or_else(|| MutationError::StepNotFound { name: name.clone() })?;
                    action.skip = request.skip;
                }
            }
            FlowOperationRequest::LockFlow => {
                next.state = FlowVersionState::Locked;
            }
        }

        next.valid = next.steps().iter().all(|step| step.valid());
        Ok(next)
    }
}

fn update_trigger(version: &mut FlowVersion, request: &UpdateTriggerRequest) -> Result<(), MutationError> {
    if version.get_action(&request.name).is_some() {
        return Err(MutationError::DuplicateStepName {
            name: request.name.clone(),
        });
    }
    let trigger = &mut version.trigger;
    trigger.name = request.name.clone();
    trigger.display_name = request.display_name.clone();
    trigger.kind = request.kind;
    trigger.settings = request.settings.clone();
    trigger.valid = request.valid;
    Ok(())
}

fn add_action(version: &mut FlowVersion, request: &AddActionRequest) -> Result<(), MutationError> {
    let taken = version.step_names();
    let mut action = request.action.clone();
    action.next_action = None;

    let mut incoming = Vec::new();
    action.visit(&mut |step| incoming.push(step.name.clone()));
    let mut seen = HashSet::new();
    for name in incoming {
        if taken.contains(&name) || !seen.insert(name.clone()) {
            return Err(MutationError::DuplicateStepName { name });
        }
    }

    let slot = resolve_slot(
        &mut version.trigger,
        &request.parent_step,
        request.step_location_relative_to_parent,
        request.branch_index,
    )?;
    splice_into_slot(slot, Box::new(action));
    Ok(())
}

fn update_action(
    version: &mut FlowVersion,
    request: &UpdateActionRequest,
) -> Result<(), MutationError> {
    let action = version
        .get_action_mut(&request.name)
        .ok_or_else(|| MutationError::StepNotFound {
            name: request.name.clone(),
        })?;

    if action.kind != request.kind {
        return Err(MutationError::KindMismatch {
            name: request.name.clone(),
            actual: action.kind,
            requested: request.kind,
        });
    }

    action.display_name = request.display_name.clone();
    action.settings = request.settings.clone();
    action.valid = request.valid;
    if let Some(skip) = request.skip {
        action.skip = skip;
    }
    Ok(())
}

fn duplicate_action(version: &mut FlowVersion, step_name: &str) -> Result<(), MutationError> {
    let original = version
        .get_action(step_name)
        .ok_or_else(|| MutationError::StepNotFound {
            name: step_name.to_string(),
        })?;

    let mut copy = original.clone();
    copy.next_action = None;
    let mut taken = version.step_names();
    rename_chain(&mut copy, &mut taken);

    let slot = resolve_slot(&mut version.trigger, step_name, StepLocation::After, None)?;
    splice_into_slot(slot, Box::new(copy));
    Ok(())
}

fn move_action(version: &mut FlowVersion, request: &MoveActionRequest) -> Result<(), MutationError> {
    if request.name == request.new_parent_step {
        return Err(MutationError::InvalidLocation {
            parent: request.new_parent_step.clone(),
            location: request.step_location_relative_to_new_parent,
            reason: "a step cannot be moved relative to itself".to_string(),
        });
    }

    let mut moved = remove_action(&mut version.trigger, &request.name)?;
    moved.next_action = None;

    // The new parent vanished with the detached subtree when it was nested inside it.
    if version.get_step(&request.new_parent_step).is_none() {
        return Err(MutationError::InvalidLocation {
            parent: request.new_parent_step.clone(),
            location: request.step_location_relative_to_new_parent,
            reason: format!("'{}' is not outside the moved step", request.new_parent_step),
        });
    }

    let slot = resolve_slot(
        &mut version.trigger,
        &request.new_parent_step,
        request.step_location_relative_to_new_parent,
        request.branch_index,
    )?;
    splice_into_slot(slot, moved);
    Ok(())
}

fn paste_actions(
    version: &mut FlowVersion,
    request: &PasteActionsRequest,
) -> Result<(), MutationError> {
    let mut pasted = request.action.clone();
    let mut taken = version.step_names();
    rename_chain(&mut pasted, &mut taken);

    let slot = resolve_slot(
        &mut version.trigger,
        &request.parent_step,
        request.step_location_relative_to_parent,
        request.branch_index,
    )?;
    splice_into_slot(slot, Box::new(pasted));
    Ok(())
}

/// Give every step in the chain a fresh `step_N` name
fn rename_chain(action: &mut Action, taken: &mut HashSet<String>) {
    action.name = find_unused_name(taken);
    taken.insert(action.name.clone());
    if let Some(body) = action.first_loop_action.as_deref_mut() {
        rename_chain(body, taken);
    }
    for branch in action.children.iter_mut().flatten() {
        rename_chain(branch, taken);
    }
    if let Some(next) = action.next_action.as_deref_mut() {
        rename_chain(next, taken);
    }
}

/// Detach an action from the tree, splicing its `next_action` chain into the
/// slot it occupied
///
/// The returned action still owns its loop body and branches.
fn remove_action(trigger: &mut Trigger, name: &str) -> Result<Box<Action>, MutationError> {
    remove_from_slot(&mut trigger.next_action, name).ok_or_else(|| MutationError::StepNotFound {
        name: name.to_string(),
    })
}

fn remove_from_slot(slot: &mut Option<Box<Action>>, name: &str) -> Option<Box<Action>> {
    if slot.as_deref().is_some_and(|action| action.name == name) {
        let mut removed = slot.take()?;
        *slot = removed.next_action.take();
        return Some(removed);
    }

    let action = slot.as_deref_mut()?;
    if let Some(removed) = remove_from_slot(&mut action.first_loop_action, name) {
        return Some(removed);
    }
    for branch in action.children.iter_mut() {
        if let Some(removed) = remove_from_slot(branch, name) {
            return Some(removed);
        }
    }
    remove_from_slot(&mut action.next_action, name)
}

/// Find the child slot a step should be inserted into
fn resolve_slot<'a>(
    trigger: &'a mut Trigger,
    parent: &str,
    location: StepLocation,
    branch_index: Option<usize>,
) -> Result<&'a mut Option<Box<Action>>, MutationError> {
    let invalid = |reason: &str| MutationError::InvalidLocation {
        parent: parent.to_string(),
        location,
        reason: reason.to_string(),
    };

    if trigger.name == parent {
        return match location {
            StepLocation::After => Ok(&mut trigger.next_action),
            _ => Err(invalid("the trigger has no nested steps")),
        };
    }

    let parent_action = find_in_slot_mut(&mut trigger.next_action, parent).ok_or_else(|| {
        MutationError::StepNotFound {
            name: parent.to_string(),
        }
    })?;

    match location {
        StepLocation::After => Ok(&mut parent_action.next_action),
        StepLocation::InsideLoop => {
            if parent_action.kind != ActionKind::LoopOnItems {
                return Err(invalid("parent is not a loop"));
            }
            Ok(&mut parent_action.first_loop_action)
        }
        StepLocation::InsideBranch => {
            if parent_action.kind != ActionKind::Router {
                return Err(invalid("parent is not a router"));
            }
            let index = branch_index.ok_or_else(|| invalid("branch index is required"))?;
            let branches = parent_action.children.len();
            parent_action
                .children
                .get_mut(index)
                .ok_or_else(|| MutationError::BranchOutOfRange {
                    router: parent.to_string(),
                    index,
                    branches,
                })
        }
    }
}

/// Insert a chain at the head of a slot; whatever occupied the slot continues
/// after the chain's tail
fn splice_into_slot(slot: &mut Option<Box<Action>>, chain: Box<Action>) {
    let rest = slot.take();
    let mut head = Some(chain);
    append_to_chain(&mut head, rest);
    *slot = head;
}

fn append_to_chain(slot: &mut Option<Box<Action>>, rest: Option<Box<Action>>) {
    match slot {
        Some(action) => append_to_chain(&mut action.next_action, rest),
        None => *slot = rest,
    }
}
