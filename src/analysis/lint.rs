use super::error::Diagnostic;
use crate::engine::api_call::check_domain;
use crate::parser::ast::*;
use std::collections::{HashMap, HashSet};

const OPERATIONS: [&str; 5] = ["set", "increment", "decrement", "push", "remove_by_index"];

pub fn run_lints(project: &Project) -> Vec<Diagnostic> {
    let mut diags = Vec::new();

    check_duplicates(project, &mut diags);
    check_state_variables(project, &mut diags);
    check_widgets(project, &mut diags);

    // イベントとアクションの検査
    let widget_ids: HashSet<&str> = project.widgets.iter().map(|w| w.id.as_str()).collect();
    for event in &project.events {
        let location = format!("event '{}'", event.id);

        if event.trigger.on == TriggerKind::Custom && event.trigger.name.is_none() {
            diags.push(
                Diagnostic::warning("Custom trigger has no name; it can only be fired by its id")
                    .at(&location),
            );
        }
        if let Some(element_id) = &event.trigger.element_id {
            if !widget_ids.is_empty() && !widget_ids.contains(element_id.as_str()) {
                diags.push(
                    Diagnostic::warning(format!("Trigger element '{}' does not exist", element_id))
                        .at(&location),
                );
            }
        }

        for action in &event.actions {
            visit_action(action, project, Some(event), &location, &mut diags);
        }
    }

    for widget in &project.widgets {
        let location = format!("widget '{}'", widget.id);
        for action in &widget.actions {
            visit_action(action, project, None, &location, &mut diags);
        }
    }

    diags
}

fn check_duplicates(project: &Project, diags: &mut Vec<Diagnostic>) {
    let groups: [(&str, Vec<&str>); 3] = [
        ("event", project.events.iter().map(|e| e.id.as_str()).collect()),
        ("widget", project.widgets.iter().map(|w| w.id.as_str()).collect()),
        ("state variable", project.state_variables.iter().map(|v| v.id.as_str()).collect()),
    ];
    for (kind, ids) in groups {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for id in ids {
            *counts.entry(id).or_insert(0) += 1;
        }
        let mut duplicated: Vec<_> = counts.into_iter().filter(|(_, c)| *c > 1).collect();
        duplicated.sort();
        for (id, count) in duplicated {
            diags.push(Diagnostic::error(format!(
                "Duplicate {} id '{}' ({} times)",
                kind, id, count
            )));
        }
    }

    let mut seen_keys = HashSet::new();
    for var in &project.state_variables {
        if !seen_keys.insert((var.scope, var.key.as_str())) {
            diags.push(Diagnostic::error(format!(
                "State key '{}.{}' is declared more than once",
                var.scope, var.key
            )));
        }
    }
}

fn check_state_variables(project: &Project, diags: &mut Vec<Diagnostic>) {
    for var in &project.state_variables {
        if !var.matches_type() {
            diags.push(
                Diagnostic::warning(format!(
                    "Default value {} does not match declared type {:?}",
                    var.value, var.var_type
                ))
                .at(format!("state '{}.{}'", var.scope, var.key)),
            );
        }
    }
}

fn check_widgets(project: &Project, diags: &mut Vec<Diagnostic>) {
    let by_id: HashMap<&str, &Widget> = project.widgets.iter().map(|w| (w.id.as_str(), w)).collect();

    for widget in &project.widgets {
        let location = format!("widget '{}'", widget.id);

        for child_id in widget.child_ids() {
            match by_id.get(child_id.as_str()) {
                None => diags.push(
                    Diagnostic::error(format!("Child '{}' does not exist", child_id)).at(&location),
                ),
                Some(child) if child.parent_id.as_deref() != Some(widget.id.as_str()) => diags.push(
                    Diagnostic::error(format!(
                        "Child '{}' has parentId {:?}",
                        child_id, child.parent_id
                    ))
                    .at(&location),
                ),
                Some(_) => {}
            }
        }

        if let Some(parent_id) = &widget.parent_id {
            match by_id.get(parent_id.as_str()) {
                None => diags.push(
                    Diagnostic::error(format!("Parent '{}' does not exist", parent_id)).at(&location),
                ),
                Some(parent) if !parent.child_ids().contains(&widget.id) => diags.push(
                    Diagnostic::warning(format!(
                        "Parent '{}' does not list this widget in its children",
                        parent_id
                    ))
                    .at(&location),
                ),
                Some(_) => {}
            }
        }
    }
}

fn visit_action(
    action: &Action,
    project: &Project,
    owner: Option<&EventDefinition>,
    parent_location: &str,
    diags: &mut Vec<Diagnostic>,
) {
    let location = format!("{} > action '{}'", parent_location, action.id);

    match &action.kind {
        ActionKind::Unsupported { type_name, .. } => {
            diags.push(Diagnostic::error(format!("Unknown action type '{}'", type_name)).at(&location));
        }
        ActionKind::StateUpdate(params) => {
            check_target(&params.target, &location, diags);
            if !OPERATIONS.contains(&params.operation.as_str()) {
                diags.push(
                    Diagnostic::error(format!("Unknown state_update operation '{}'", params.operation))
                        .at(&location),
                );
            }
        }
        ActionKind::Recalculate(params) => check_target(&params.target, &location, diags),
        ActionKind::EmitEvent(params) => {
            let listeners = project.events.iter().filter(|e| e.listens_to(&params.event_name)).count();
            if listeners == 0 {
                diags.push(
                    Diagnostic::warning(format!("No custom event listens to '{}'", params.event_name))
                        .at(&location),
                );
            }
            if owner.is_some_and(|event| event.listens_to(&params.event_name)) {
                diags.push(
                    Diagnostic::warning(format!(
                        "Event emits '{}' which fires itself; it will stop at maxEventDepth ({})",
                        params.event_name, project.runtime.max_event_depth
                    ))
                    .at(&location),
                );
            }
        }
        ActionKind::ApiCall(params) if !params.url.contains('{') => {
            let allowed = params
                .allowed_domains
                .as_deref()
                .unwrap_or(&project.runtime.allowed_domains);
            if let Err(e) = check_domain(&params.url, allowed) {
                diags.push(Diagnostic::warning(format!("api_call will be rejected: {}", e)).at(&location));
            }
        }
        ActionKind::Batch(params) if params.atomic => {
            diags.push(
                Diagnostic::info("Atomic batch stops at the first failure but does not roll back")
                    .at(&location),
            );
        }
        _ => {}
    }

    for nested in action.kind.nested_actions() {
        visit_action(nested, project, owner, &location, diags);
    }
}

fn check_target(target: &str, location: &str, diags: &mut Vec<Diagnostic>) {
    let valid = match target.split_once('.') {
        Some((scope, path)) => !path.is_empty() && scope.parse::<StateScope>().is_ok(),
        None => false,
    };
    if !valid {
        diags.push(
            Diagnostic::error(format!("Target '{}' must be app.*, screen.* or local.*", target))
                .at(location),
        );
    }
}
