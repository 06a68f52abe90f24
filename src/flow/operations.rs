/// Flow operation requests
///
/// Every structural edit the editor can make is one variant of
/// [`FlowOperationRequest`]. The same value is applied locally by the graph
/// mutator and sent verbatim to the backend, so the wire format is the
/// adjacently tagged `{ "type": "...", "request": { ... } }` shape the flows
/// endpoint expects.

use crate::flow::types::{Action, ActionKind, TriggerKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One structural edit to a flow version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "request", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowOperationRequest {
    /// Rename the flow
    ChangeName(ChangeNameRequest),
    /// Replace the trigger's configuration (its action chain is kept)
    UpdateTrigger(UpdateTriggerRequest),
    /// Insert a new action relative to an existing step
    AddAction(AddActionRequest),
    /// Replace an action's configuration
    UpdateAction(UpdateActionRequest),
    /// Delete one or more actions together with their nested steps
    DeleteAction(DeleteActionRequest),
    /// Copy an action (and its nested steps) right after itself
    DuplicateAction(DuplicateActionRequest),
    /// Detach an action and re-insert it elsewhere
    MoveAction(MoveActionRequest),
    /// Insert a clipboard action chain relative to an existing step
    PasteActions(PasteActionsRequest),
    /// Toggle the skip flag on one or more actions
    SetSkipAction(SetSkipActionRequest),
    /// Freeze the version
    LockFlow,
}

impl FlowOperationRequest {
    /// Wire name of the operation kind, used in logs and test spies
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ChangeName(_) => "CHANGE_NAME",
            Self::UpdateTrigger(_) => "UPDATE_TRIGGER",
            Self::AddAction(_) => "ADD_ACTION",
            Self::UpdateAction(_) => "UPDATE_ACTION",
            Self::DeleteAction(_) => "DELETE_ACTION",
            Self::DuplicateAction(_) => "DUPLICATE_ACTION",
            Self::MoveAction(_) => "MOVE_ACTION",
            Self::PasteActions(_) => "PASTE_ACTIONS",
            Self::SetSkipAction(_) => "SET_SKIP_ACTION",
            Self::LockFlow => "LOCK_FLOW",
        }
    }

    pub fn delete(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::DeleteAction(DeleteActionRequest {
            names: names.into_iter().map(Into::into).collect(),
        })
    }

    pub fn duplicate(step_name: impl Into<String>) -> Self {
        Self::DuplicateAction(DuplicateActionRequest {
            step_name: step_name.into(),
        })
    }
}

/// Where a new or moved step goes relative to its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepLocation {
    /// Directly after the parent in its chain
    After,
    /// First step of the parent loop's body
    InsideLoop,
    /// First step of one of the parent router's branches
    InsideBranch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNameRequest {
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTriggerRequest {
    pub name: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub kind: TriggerKind,
    #[serde(default)]
    pub settings: Value,
    #[serde(default)]
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddActionRequest {
    /// Step the new action is placed relative to
    pub parent_step: String,
    pub step_location_relative_to_parent: StepLocation,
    /// Router branch index, required for `InsideBranch`
    #[serde(default)]
    pub branch_index: Option<usize>,
    /// The action to insert; any `next_action` it carries is ignored
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateActionRequest {
    pub name: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub settings: Value,
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub skip: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteActionRequest {
    pub names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateActionRequest {
    pub step_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveActionRequest {
    pub name: String,
    pub new_parent_step: String,
    pub step_location_relative_to_new_parent: StepLocation,
    #[serde(default)]
    pub branch_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasteActionsRequest {
    /// Head of the copied chain, including its `next_action` links
    pub action: Action,
    pub parent_step: String,
    pub step_location_relative_to_parent: StepLocation,
    #[serde(default)]
    pub branch_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSkipActionRequest {
    pub names: Vec<String>,
    pub skip: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operations_use_adjacent_tagging() {
        let op = FlowOperationRequest::delete(["step_1"]);
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json, json!({ "type": "DELETE_ACTION", "request": { "names": ["step_1"] } }));

        let lock = serde_json::to_value(FlowOperationRequest::LockFlow).unwrap();
        assert_eq!(lock, json!({ "type": "LOCK_FLOW" }));
    }

    #[test]
    fn operations_parse_from_editor_payloads() {
        let op: FlowOperationRequest = serde_json::from_value(json!({
            "type": "MOVE_ACTION",
            "request": {
                "name": "step_3",
                "newParentStep": "step_1",
                "stepLocationRelativeToNewParent": "INSIDE_LOOP"
            }
        }))
        .unwrap();

        match op {
            FlowOperationRequest::MoveAction(request) => {
                assert_eq!(request.step_location_relative_to_new_parent, StepLocation::InsideLoop);
                assert_eq!(request.branch_index, None);
            }
            other => panic!("unexpected operation: {}", other.type_name()),
        }
    }
}
