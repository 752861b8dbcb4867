//! Build phase (spec §4.1.1): walks the flattened operation stream once,
//! minting nodes and recording routes whose targets are resolved later.

use std::collections::HashMap;

use dataflow_store::new_id;
use uuid::Uuid;

use super::{NodeDraft, RouteDest, RouteSource, RouteSpec, StaticSource, TerminalKind};
use crate::error::CompileError;
use crate::node_config::NodeBody;
use crate::ops::Operation;

/// Everything the build phase accumulates, consumed by `resolve`.
pub(crate) struct BuildState {
    pub nodes: Vec<NodeDraft>,
    pub node_order: Vec<Uuid>,
    pub references: HashMap<String, RouteSource>,
    pub input_data: Option<serde_json::Value>,
    pub static_sources: Vec<StaticSource>,
    pub pending_routes: Vec<RouteSpec>,
}

impl BuildState {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            node_order: Vec::new(),
            references: HashMap::new(),
            input_data: None,
            static_sources: Vec::new(),
            pending_routes: Vec::new(),
        }
    }
}

/// Cursor over "the most recently introduced construct" used to resolve
/// `as`/`to`/`error_to`/`when` when they don't name an explicit target
/// (§4.1.1).
#[derive(Default)]
struct Cursor {
    last_static: Option<usize>,
    last_node: Option<Uuid>,
    last_node_name: Option<String>,
}

impl Cursor {
    /// Static data, else the last node, else the workflow input — the input
    /// is the terminal fallback, only reached before any node/static source
    /// has been introduced (§4.1.1 `as`).
    fn current(&self) -> RouteSource {
        if let Some(idx) = self.last_static {
            RouteSource::Static(idx)
        } else if let Some(id) = self.last_node {
            RouteSource::Node(id)
        } else {
            RouteSource::Input
        }
    }
}

pub(crate) fn build(ops: &[Operation]) -> Result<BuildState, CompileError> {
    let mut state = BuildState::new();
    build_into(&mut state, ops, None)?;
    Ok(state)
}

/// `parent_for_templates`: when set, every node minted in `ops` becomes a
/// `status = template` child of that parent (§4.1.1, `cycle`/`parallel`
/// nested templates).
fn build_into(
    state: &mut BuildState,
    ops: &[Operation],
    parent_for_templates: Option<Uuid>,
) -> Result<(), CompileError> {
    let mut cursor = Cursor::default();
    let mut last_route_idx: Option<usize> = None;

    for op in ops {
        match op {
            Operation::WithInput(data) => {
                if state.input_data.is_some() {
                    return Err(CompileError::InvalidConfig(
                        "with_input may only be called once".to_string(),
                    ));
                }
                state.input_data = Some(data.clone());
            }

            Operation::WithData(data) => {
                let idx = state.static_sources.len();
                state.static_sources.push(StaticSource { data: data.clone() });
                cursor.last_static = Some(idx);
                cursor.last_node = None;
            }

            Operation::Func { func_id, cfg } => {
                let node_id = mint(
                    state,
                    func_id.clone(),
                    NodeBody::Func(cfg.clone()),
                    parent_for_templates,
                );
                register_name(state, func_id.clone(), RouteSource::Node(node_id))?;
                cursor.last_node = Some(node_id);
                cursor.last_node_name = Some(func_id.clone());
                cursor.last_static = None;
            }

            Operation::Agent { agent, cfg } => {
                let node_id = mint(
                    state,
                    agent.clone(),
                    NodeBody::Agent(cfg.clone()),
                    parent_for_templates,
                );
                register_name(state, agent.clone(), RouteSource::Node(node_id))?;
                cursor.last_node = Some(node_id);
                cursor.last_node_name = Some(agent.clone());
                cursor.last_static = None;
            }

            Operation::Cycle(cfg) => {
                let node_id = mint(
                    state,
                    "cycle".to_string(),
                    NodeBody::Cycle(cfg.clone()),
                    parent_for_templates,
                );
                if let Some(template) = &cfg.template {
                    mint_template_children(state, template, node_id)?;
                }
                cursor.last_node = Some(node_id);
                cursor.last_node_name = Some("cycle".to_string());
                cursor.last_static = None;
            }

            Operation::Parallel(cfg) => {
                let node_id = mint(
                    state,
                    "parallel".to_string(),
                    NodeBody::Parallel(cfg.clone()),
                    parent_for_templates,
                );
                if let Some(template) = &cfg.template {
                    mint_template_children(state, template, node_id)?;
                }
                cursor.last_node = Some(node_id);
                cursor.last_node_name = Some("parallel".to_string());
                cursor.last_static = None;
            }

            Operation::State(cfg) => {
                let node_id = mint(
                    state,
                    "state".to_string(),
                    NodeBody::State(cfg.clone()),
                    parent_for_templates,
                );
                cursor.last_node = Some(node_id);
                cursor.last_node_name = Some("state".to_string());
                cursor.last_static = None;
            }

            Operation::Use { .. } => unreachable!("operations must be flattened before build()"),

            Operation::As { name } => {
                register_name(state, name.clone(), cursor.current())?;
            }

            Operation::To { target, input_key, transform } => {
                push_route(state, &cursor, target, input_key.clone(), transform.clone(), false);
                last_route_idx = Some(state.pending_routes.len() - 1);
            }

            Operation::ErrorTo { target, input_key, transform } => {
                push_route(state, &cursor, target, input_key.clone(), transform.clone(), true);
                last_route_idx = Some(state.pending_routes.len() - 1);
            }

            Operation::When { condition } => {
                let idx = last_route_idx.ok_or(CompileError::NoSourceNode)?;
                let route = &mut state.pending_routes[idx];
                if matches!(route.source, RouteSource::Static(_)) {
                    return Err(CompileError::StaticWhen);
                }
                route.condition = Some(condition.clone());
            }
        }
    }

    Ok(())
}

fn mint(
    state: &mut BuildState,
    name: String,
    body: NodeBody,
    parent_for_templates: Option<Uuid>,
) -> Uuid {
    let node_id = new_id();
    let inputs = body.inputs_spec();
    let context = body.context_value();
    let input_transform = body.input_transform_spec();
    state.nodes.push(NodeDraft {
        node_id,
        name,
        body,
        inputs,
        context,
        input_transform,
        metadata: serde_json::json!({}),
        parent_node_id: parent_for_templates,
        is_template: parent_for_templates.is_some(),
    });
    state.node_order.push(node_id);
    node_id
}

fn register_name(state: &mut BuildState, name: String, target: RouteSource) -> Result<(), CompileError> {
    if state.references.contains_key(&name) {
        return Err(CompileError::DuplicateName(name));
    }
    state.references.insert(name, target);
    Ok(())
}

fn terminal_kind(target: &str, is_error_to: bool) -> Option<TerminalKind> {
    match target {
        "@success" => Some(TerminalKind::Success),
        "@fail" => Some(TerminalKind::Fail),
        // @end is an alias for @success on `to`; on `error_to` it means
        // "fail" unless the literal target is explicitly @success (§9 open
        // questions: asymmetric @end precedence).
        "@end" => Some(if is_error_to { TerminalKind::Fail } else { TerminalKind::Success }),
        _ => None,
    }
}

fn push_route(
    state: &mut BuildState,
    cursor: &Cursor,
    target: &str,
    input_key: Option<String>,
    transform: Option<String>,
    is_error: bool,
) {
    let dest = match terminal_kind(target, is_error) {
        Some(kind) => RouteDest::Terminal(kind),
        None => RouteDest::Named(target.to_string()),
    };
    let key = input_key.unwrap_or_else(|| {
        cursor
            .last_node_name
            .clone()
            .unwrap_or_else(|| "default".to_string())
    });
    state.pending_routes.push(RouteSpec {
        source: cursor.current(),
        dest,
        input_key: key,
        transform,
        condition: None,
        is_error,
    });
}

/// Recursively mint `status = template` children under `parent_id` for a
/// `cycle`/`parallel` node's nested template (§4.1.1).
fn mint_template_children(
    state: &mut BuildState,
    template: &[Operation],
    parent_id: Uuid,
) -> Result<(), CompileError> {
    let flattened = crate::ops::flatten_ops(template);
    build_into(state, &flattened, Some(parent_id))
}
