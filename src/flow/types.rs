/// Core flow type definitions
///
/// A flow is the long-lived container the editor opens; a flow version is one
/// immutable snapshot of its step graph. Versions are replaced wholesale by the
/// graph mutator and never patched field by field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// The flow being edited (parent container of its versions)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    /// Unique flow identifier
    pub id: String,
    /// Owning project identifier
    pub project_id: String,
    /// Optional folder the flow is filed under
    #[serde(default)]
    pub folder_id: Option<String>,
    /// Whether the published version is live
    pub status: FlowStatus,
    /// Version currently published, if any
    #[serde(default)]
    pub published_version_id: Option<String>,
}

/// Publication status of a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowStatus {
    Enabled,
    Disabled,
}

/// Lifecycle state of a flow version
///
/// Draft versions accept structural edits; locked versions are frozen snapshots
/// (published or historical) and reject them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowVersionState {
    Draft,
    Locked,
}

/// Immutable snapshot of a flow's step graph
///
/// `id`, `state` and `updated` are authoritative only once the backend has
/// confirmed them; until then they carry the last confirmed values while the
/// graph itself already reflects local edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowVersion {
    /// Version identifier assigned by the backend
    pub id: String,
    /// Owning flow identifier
    pub flow_id: String,
    /// Human-readable flow name
    pub display_name: String,
    /// Entry step; every action hangs off the trigger's chain
    pub trigger: Trigger,
    /// True when every step in the graph is valid
    pub valid: bool,
    /// Draft or locked
    pub state: FlowVersionState,
    /// Last server-side modification timestamp
    pub updated: DateTime<Utc>,
}

/// Entry step of a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub name: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub kind: TriggerKind,
    #[serde(default)]
    pub settings: Value,
    #[serde(default)]
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<Box<Action>>,
}

/// Trigger flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerKind {
    /// Placeholder trigger of a freshly created flow
    Empty,
    /// Connector-provided trigger (polling or app webhook)
    Piece,
    /// Plain HTTP webhook trigger
    Webhook,
}

/// A single action step
///
/// Actions form a tree: `next_action` continues the current chain, loops own a
/// nested chain in `first_loop_action`, and routers own one optional chain per
/// branch in `children`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub name: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub settings: Value,
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub skip: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<Box<Action>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_loop_action: Option<Box<Action>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Option<Box<Action>>>,
}

/// Action flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    /// Inline code step
    Code,
    /// Connector action
    Piece,
    /// Loop over items; body lives in `first_loop_action`
    LoopOnItems,
    /// Conditional router; one chain per branch in `children`
    Router,
}

/// Borrowed view of any step in a version
#[derive(Debug, Clone, Copy)]
pub enum Step<'a> {
    Trigger(&'a Trigger),
    Action(&'a Action),
}

impl<'a> Step<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            Step::Trigger(trigger) => &trigger.name,
            Step::Action(action) => &action.name,
        }
    }

    pub fn valid(&self) -> bool {
        match self {
            Step::Trigger(trigger) => trigger.valid,
            Step::Action(action) => action.valid,
        }
    }
}

impl Action {
    /// Create a bare action with no children and empty settings
    pub fn new(name: impl Into<String>, display_name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            kind,
            settings: Value::Null,
            valid: true,
            skip: false,
            next_action: None,
            first_loop_action: None,
            children: Vec::new(),
        }
    }

    /// Visit this action, its nested chains and its `next_action` chain in
    /// depth-first order
    pub fn visit<'a>(&'a self, visitor: &mut impl FnMut(&'a Action)) {
        visitor(self);
        self.visit_nested(visitor);
        if let Some(next) = &self.next_action {
            next.visit(visitor);
        }
    }

    /// Visit only the steps nested inside this action (loop body and router
    /// branches), excluding the action itself and its `next_action` chain
    pub fn visit_nested<'a>(&'a self, visitor: &mut impl FnMut(&'a Action)) {
        if let Some(body) = &self.first_loop_action {
            body.visit(visitor);
        }
        for branch in self.children.iter().flatten() {
            branch.visit(visitor);
        }
    }

    /// Names of this action and every step nested inside it
    ///
    /// This is exactly the set of steps that disappears when the action is
    /// deleted; the `next_action` chain is spliced back into the parent.
    pub fn subtree_names(&self) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        self.visit_nested(&mut |action| names.push(action.name.clone()));
        names
    }

    /// Locate a step strictly below this action
    pub fn find(&self, name: &str) -> Option<&Action> {
        let mut found = None;
        self.visit_nested(&mut |action| {
            if found.is_none() && action.name == name {
                found = Some(action);
            }
        });
        if found.is_some() {
            return found;
        }
        self.next_action.as_deref().and_then(|next| {
            if next.name == name {
                Some(next)
            } else {
                next.find(name)
            }
        })
    }

    /// Locate a step strictly below this action, mutably
    pub fn find_mut(&mut self, name: &str) -> Option<&mut Action> {
        if let Some(found) = find_in_slot_mut(&mut self.first_loop_action, name) {
            return Some(found);
        }
        for branch in self.children.iter_mut() {
            if let Some(found) = find_in_slot_mut(branch, name) {
                return Some(found);
            }
        }
        find_in_slot_mut(&mut self.next_action, name)
    }
}

/// Search a child slot (including the action occupying it) for `name`
pub(crate) fn find_in_slot_mut<'a>(
    slot: &'a mut Option<Box<Action>>,
    name: &str,
) -> Option<&'a mut Action> {
    let action = slot.as_deref_mut()?;
    if action.name == name {
        return Some(action);
    }
    action.find_mut(name)
}

impl FlowVersion {
    /// Every step in the version, trigger first, depth-first
    pub fn steps(&self) -> Vec<Step<'_>> {
        let mut steps = vec![Step::Trigger(&self.trigger)];
        if let Some(first) = &self.trigger.next_action {
            first.visit(&mut |action| steps.push(Step::Action(action)));
        }
        steps
    }

    /// Names of every step in the version
    pub fn step_names(&self) -> HashSet<String> {
        self.steps().iter().map(|step| step.name().to_string()).collect()
    }

    /// Look up any step (trigger or action) by name
    pub fn get_step(&self, name: &str) -> Option<Step<'_>> {
        if self.trigger.name == name {
            return Some(Step::Trigger(&self.trigger));
        }
        self.get_action(name).map(Step::Action)
    }

    /// Look up an action by name
    pub fn get_action(&self, name: &str) -> Option<&Action> {
        let first = self.trigger.next_action.as_deref()?;
        if first.name == name {
            return Some(first);
        }
        first.find(name)
    }

    /// Look up an action by name, mutably
    pub fn get_action_mut(&mut self, name: &str) -> Option<&mut Action> {
        find_in_slot_mut(&mut self.trigger.next_action, name)
    }

    pub fn contains_step(&self, name: &str) -> bool {
        self.get_step(name).is_some()
    }

    pub fn is_locked(&self) -> bool {
        self.state == FlowVersionState::Locked
    }
}

/// Pick the first `step_N` name not already taken
pub fn find_unused_name(taken: &HashSet<String>) -> String {
    let mut index = 1usize;
    loop {
        let candidate = format!("step_{index}");
        if !taken.contains(&candidate) {
            return candidate;
        }
        index += 1;
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn trigger() -> Trigger {
        Trigger {
            name: "trigger".to_string(),
            display_name: "Catch Webhook".to_string(),
            kind: TriggerKind::Webhook,
            settings: serde_json::json!({}),
            valid: true,
            next_action: None,
        }
    }

    pub fn chain(actions: Vec<Action>) -> Option<Box<Action>> {
        actions.into_iter().rev().fold(None, |next, mut action| {
            action.next_action = next;
            Some(Box::new(action))
        })
    }

    pub fn version(actions: Vec<Action>) -> FlowVersion {
        let mut trigger = trigger();
        trigger.next_action = chain(actions);
        FlowVersion {
            id: "version-1".to_string(),
            flow_id: "flow-1".to_string(),
            display_name: "Untitled".to_string(),
            trigger,
            valid: true,
            state: FlowVersionState::Draft,
            updated: Utc::now(),
        }
    }

    pub fn code(name: &str) -> Action {
        Action::new(name, format!("Code {name}"), ActionKind::Code)
    }

    pub fn looping(name: &str, body: Vec<Action>) -> Action {
        let mut action = Action::new(name, "Loop on Items", ActionKind::LoopOnItems);
        action.first_loop_action = chain(body);
        action
    }

    pub fn router(name: &str, branches: Vec<Vec<Action>>) -> Action {
        let mut action = Action::new(name, "Router", ActionKind::Router);
        action.children = branches.into_iter().map(chain).collect();
        action
    }
}
