//! Routing & transform layer (spec §4.5–§4.6): applies conditions and
//! transforms when a node completes, and merges observed inputs into a
//! node's effective argument value at entry.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::RoutingError;
use crate::expr::ExpressionEvaluator;
use crate::node_config::{DataTarget, InputTransform, NodeConfig};
use dataflow_store::{DataRecordType, DEFAULT_DISCRIMINATOR};

/// One outbound record produced by walking a node's targets at completion.
#[derive(Debug, Clone)]
pub struct RoutedRecord {
    pub data_type: DataRecordType,
    pub node_id: Option<Uuid>,
    pub discriminator: String,
    pub content: Value,
}

/// Walk `targets` (a node's `data_targets` on success, `error_targets` on
/// failure) and produce the records to persist (§4.5 points 1-3).
///
/// A condition-evaluation error is fatal when walking `data_targets`
/// (`is_error_path = false`) but tolerated (the target is simply skipped)
/// when walking `error_targets`, so a broken condition never masks the
/// node's real failure.
pub fn route_completion(
    evaluator: &dyn ExpressionEvaluator,
    targets: &[DataTarget],
    output: &Value,
    error: Option<&Value>,
    node_id: Uuid,
    input_envelope: &Value,
    is_error_path: bool,
) -> Result<Vec<RoutedRecord>, RoutingError> {
    let mut out = Vec::with_capacity(targets.len());

    for target in targets {
        let env = serde_json::json!({
            "output": output,
            "error": error,
            "node": {"node_id": node_id.to_string()},
            "input": input_envelope,
        });

        if let Some(cond) = &target.condition {
            match evaluator.eval(cond, &env) {
                Ok(v) => {
                    if !truthy(&v) {
                        continue;
                    }
                }
                Err(e) => {
                    if is_error_path {
                        continue;
                    }
                    return Err(RoutingError::ConditionEval(e.to_string()));
                }
            }
        }

        let mut content = if is_error_path { error.cloned().unwrap_or(Value::Null) } else { output.clone() };
        if let Some(transform) = &target.transform {
            content = evaluator
                .eval(transform, &env)
                .map_err(|e| RoutingError::TransformEval(e.to_string()))?;
        }

        out.push(RoutedRecord {
            data_type: target.data_type,
            node_id: target.node_id,
            discriminator: target.discriminator.clone(),
            content,
        });
    }

    Ok(out)
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Merge the `node_input` records observed at entry into a node's effective
/// argument value (spec §4.5 "Input merging at node entry" / "Args merging").
pub fn merge_inputs(
    evaluator: &dyn ExpressionEvaluator,
    config: &NodeConfig,
    raw_inputs: &BTreeMap<String, Value>,
    input_envelope: &Value,
) -> Result<Value, RoutingError> {
    let effective = apply_input_transform(evaluator, config, raw_inputs, input_envelope)?;
    Ok(merge_args(config, &effective))
}

fn apply_input_transform(
    evaluator: &dyn ExpressionEvaluator,
    config: &NodeConfig,
    raw_inputs: &BTreeMap<String, Value>,
    input_envelope: &Value,
) -> Result<BTreeMap<String, Value>, RoutingError> {
    let Some(transform) = &config.input_transform else {
        return Ok(raw_inputs.clone());
    };

    let env = serde_json::json!({
        "input": input_envelope,
        "inputs": raw_inputs,
    });

    match transform {
        InputTransform::Expr(expr) => {
            let value = evaluator
                .eval(expr, &env)
                .map_err(|_| RoutingError::TransformEval("Input transformation failed".to_string()))?;
            let mut out = BTreeMap::new();
            out.insert(DEFAULT_DISCRIMINATOR.to_string(), value);
            Ok(out)
        }
        InputTransform::Table(fields) => {
            let mut out = BTreeMap::new();
            for (field, expr) in fields {
                let value = evaluator
                    .eval(expr, &env)
                    .map_err(|_| RoutingError::TransformEval(format!("Transform failed for {field}")))?;
                out.insert(field.clone(), value);
            }
            Ok(out)
        }
    }
}

/// If the node declares `args`, merge inputs into a shallow copy (inputs
/// shadow args fields). Otherwise: a single `default` input passes through
/// raw; a single named input is wrapped `{name: value}`; multiple named
/// inputs are presented as the map itself.
fn merge_args(config: &NodeConfig, inputs: &BTreeMap<String, Value>) -> Value {
    if let Some(args) = config.body.args() {
        let mut base = match args {
            Value::Object(m) => m.clone(),
            _ => Map::new(),
        };
        for (k, v) in inputs {
            base.insert(k.clone(), v.clone());
        }
        return Value::Object(base);
    }

    match inputs.len() {
        0 => Value::Null,
        1 => {
            let (key, value) = inputs.iter().next().expect("len checked above");
            if key == DEFAULT_DISCRIMINATOR {
                value.clone()
            } else {
                let mut m = Map::new();
                m.insert(key.clone(), value.clone());
                Value::Object(m)
            }
        }
        _ => {
            let mut m = Map::new();
            for (k, v) in inputs {
                m.insert(k.clone(), v.clone());
            }
            Value::Object(m)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BuiltinEvaluator;
    use crate::node_config::{FuncConfig, NodeBody};

    fn func_config(args: Option<Value>) -> NodeConfig {
        NodeConfig::new(NodeBody::Func(FuncConfig {
            func_id: "f".to_string(),
            args,
            inputs: None,
            context: None,
            input_transform: None,
        }))
    }

    #[test]
    fn single_default_input_passes_through_raw() {
        let config = func_config(None);
        let mut inputs = BTreeMap::new();
        inputs.insert("default".to_string(), serde_json::json!(42));
        let merged = merge_inputs(&BuiltinEvaluator, &config, &inputs, &Value::Null).unwrap();
        assert_eq!(merged, serde_json::json!(42));
    }

    #[test]
    fn named_inputs_shadow_args_fields() {
        let config = func_config(Some(serde_json::json!({"a": 1, "b": 2})));
        let mut inputs = BTreeMap::new();
        inputs.insert("b".to_string(), serde_json::json!(99));
        let merged = merge_inputs(&BuiltinEvaluator, &config, &inputs, &Value::Null).unwrap();
        assert_eq!(merged, serde_json::json!({"a": 1, "b": 99}));
    }

    #[test]
    fn multiple_named_inputs_become_a_map() {
        let config = func_config(None);
        let mut inputs = BTreeMap::new();
        inputs.insert("a".to_string(), serde_json::json!(1));
        inputs.insert("b".to_string(), serde_json::json!(2));
        let merged = merge_inputs(&BuiltinEvaluator, &config, &inputs, &Value::Null).unwrap();
        assert_eq!(merged, serde_json::json!({"a": 1, "b": 2}));
    }

    #[test]
    fn condition_false_skips_target() {
        let target = DataTarget {
            data_type: DataRecordType::NodeInput,
            node_id: Some(dataflow_store::new_id()),
            discriminator: "default".to_string(),
            condition: Some("output.ok == false".to_string()),
            transform: None,
            source_node_id: dataflow_store::new_id(),
        };
        let out = route_completion(
            &BuiltinEvaluator,
            &[target],
            &serde_json::json!({"ok": true}),
            None,
            dataflow_store::new_id(),
            &Value::Null,
            false,
        )
        .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn condition_eval_error_is_fatal_on_data_targets_but_tolerated_on_error_targets() {
        let target = DataTarget {
            data_type: DataRecordType::NodeInput,
            node_id: Some(dataflow_store::new_id()),
            discriminator: "default".to_string(),
            condition: Some("not a valid $$$ expr".to_string()),
            transform: None,
            source_node_id: dataflow_store::new_id(),
        };
        let node_id = dataflow_store::new_id();
        assert!(route_completion(&BuiltinEvaluator, &[target.clone()], &Value::Null, None, node_id, &Value::Null, false).is_err());
        assert!(route_completion(&BuiltinEvaluator, &[target], &Value::Null, None, node_id, &Value::Null, true)
            .unwrap()
            .is_empty());
    }
}
