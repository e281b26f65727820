//! JSON-Schema dialect reader and writer

use super::{
    ArraySchema, Bound, Distribution, ObjectSchema, ScalarKind, ScalarSchema, Schema, SchemaPath,
};
use crate::error::{ComposeError, Result};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

const COMBINATORS: [&str; 3] = ["anyOf", "allOf", "oneOf"];

pub(super) fn from_json(value: &Value) -> Result<Schema> {
    let definitions = value
        .get("definitions")
        .or_else(|| value.get("$defs"))
        .and_then(Value::as_object);
    let mut reader = Reader {
        definitions,
        resolving: Vec::new(),
    };
    let schema = reader.read(value, &SchemaPath::root())?;
    schema.check_well_formed()?;
    Ok(schema)
}

struct Reader<'a> {
    definitions: Option<&'a Map<String, Value>>,
    /// Names of definitions currently being expanded
    resolving: Vec<String>,
}

impl<'a> Reader<'a> {
    fn read(&mut self, value: &Value, path: &SchemaPath) -> Result<Schema> {
        let map = match value {
            Value::Bool(true) => return Ok(Schema::Any),
            Value::Bool(false) => {
                return Err(ComposeError::malformed(path, "the 'false' schema is not supported"))
            }
            Value::Object(map) => map,
            other => {
                return Err(ComposeError::malformed(
                    path,
                    format!("expected a schema object, got {}", other),
                ))
            }
        };

        if let Some(reference) = map.get("$ref") {
            return self.resolve(reference, path);
        }
        if map.contains_key("not") {
            return Err(ComposeError::malformed(path, "the 'not' keyword is not supported"));
        }

        let mut parts = Vec::new();
        if let Some(typed) = self.read_typed(map, path)? {
            parts.push(typed);
        }
        for keyword in COMBINATORS {
            let Some(branches) = map.get(keyword) else {
                continue;
            };
            let Some(branches) = branches.as_array() else {
                return Err(ComposeError::malformed(path, format!("{} must be an array", keyword)));
            };
            let branches = branches
                .iter()
                .map(|b| self.read(b, path))
                .collect::<Result<Vec<_>>>()?;
            parts.push(match keyword {
                "anyOf" => Schema::AnyOf(branches),
                "allOf" => Schema::AllOf(branches),
                _ => Schema::OneOf(branches),
            });
        }

        Ok(match parts.len() {
            0 => Schema::Any,
            1 => parts.remove(0),
            _ => Schema::AllOf(parts),
        })
    }

    fn resolve(&mut self, reference: &Value, path: &SchemaPath) -> Result<Schema> {
        let Some(reference) = reference.as_str() else {
            return Err(ComposeError::malformed(path, "$ref must be a string"));
        };
        let name = reference
            .strip_prefix("#/definitions/")
            .or_else(|| reference.strip_prefix("#/$defs/"))
            .ok_or_else(|| ComposeError::malformed(path, format!("unsupported $ref '{}'", reference)))?;
        if self.resolving.iter().any(|n| n == name) {
            return Err(ComposeError::malformed(
                path,
                format!("cyclic $ref through definition '{}'", name),
            ));
        }
        let target = self
            .definitions
            .and_then(|defs| defs.get(name))
            .ok_or_else(|| ComposeError::malformed(path, format!("undefined $ref '{}'", reference)))?;
        self.resolving.push(name.to_string());
        let schema = self.read(target, path);
        self.resolving.pop();
        schema
    }

    fn read_typed(&mut self, map: &Map<String, Value>, path: &SchemaPath) -> Result<Option<Schema>> {
        let kinds: Vec<String> = match map.get("type") {
            Some(Value::String(kind)) => vec![kind.clone()],
            Some(Value::Array(kinds)) => kinds
                .iter()
                .map(|k| {
                    k.as_str()
                        .map(String::from)
                        .ok_or_else(|| ComposeError::malformed(path, "type names must be strings"))
                })
                .collect::<Result<_>>()?,
            Some(other) => {
                return Err(ComposeError::malformed(path, format!("invalid type {}", other)))
            }
            None => {
                if let Some(values) = map.get("enum") {
                    return self.read_enum(values, map, path).map(Some);
                }
                match infer_kind(map) {
                    Some(kind) => vec![kind.to_string()],
                    None => return Ok(None),
                }
            }
        };

        let mut branches = Vec::with_capacity(kinds.len());
        for kind in &kinds {
            branches.push(match kind.as_str() {
                "object" => Schema::Object(self.read_object(map, path)?),
                "array" => Schema::Array(self.read_array(map, path)?),
                name => {
                    let kind = ScalarKind::parse(name)
                        .ok_or_else(|| ComposeError::malformed(path, format!("unknown type '{}'", name)))?;
                    let mut scalar = read_scalar(kind, map, path)?;
                    if let Some(values) = map.get("enum") {
                        let values = values
                            .as_array()
                            .ok_or_else(|| ComposeError::malformed(path, "enum must be an array"))?;
                        // with several types each branch keeps its own members
                        let members: Vec<Value> = if kinds.len() > 1 {
                            values
                                .iter()
                                .filter(|v| kind_accepts(kind, v))
                                .cloned()
                                .collect()
                        } else {
                            values.clone()
                        };
                        if members.is_empty() && kinds.len() > 1 {
                            continue;
                        }
                        scalar.enumeration = Some(members);
                    }
                    Schema::Scalar(scalar)
                }
            });
        }
        Ok(Some(match branches.len() {
            0 => return Err(ComposeError::malformed(path, "no type admits the enum members")),
            1 => branches.remove(0),
            _ => Schema::AnyOf(branches),
        }))
    }

    fn read_enum(&mut self, values: &Value, map: &Map<String, Value>, path: &SchemaPath) -> Result<Schema> {
        let values = values
            .as_array()
            .ok_or_else(|| ComposeError::malformed(path, "enum must be an array"))?;
        if values.is_empty() {
            return Err(ComposeError::malformed(path, "enum must not be empty"));
        }
        let mut schema = Schema::enumeration(values.clone());
        // numeric keywords next to an untyped enum still apply to its numeric members
        let apply = |scalar: &mut ScalarSchema| -> Result<()> {
            if scalar.kind.is_numeric() {
                let bounded = read_scalar(scalar.kind, map, path)?;
                scalar.minimum = bounded.minimum;
                scalar.maximum = bounded.maximum;
            }
            Ok(())
        };
        match &mut schema {
            Schema::Scalar(scalar) => apply(scalar)?,
            Schema::AnyOf(branches) => {
                for branch in branches.iter_mut() {
                    if let Schema::Scalar(scalar) = branch {
                        apply(scalar)?;
                    }
                }
            }
            _ => {}
        }
        Ok(schema)
    }

    fn read_object(&mut self, map: &Map<String, Value>, path: &SchemaPath) -> Result<ObjectSchema> {
        let mut object = ObjectSchema::new();
        if let Some(properties) = map.get("properties") {
            let properties = properties
                .as_object()
                .ok_or_else(|| ComposeError::malformed(path, "properties must be an object"))?;
            for (name, property) in properties {
                let property_path = path.property(name);
                let schema = self.read(property, &property_path)?;
                if let Some(default) = property.get("default") {
                    object.defaults.insert(name.clone(), default.clone());
                }
                object.properties.insert(name.clone(), schema);
            }
        }
        if let Some(required) = map.get("required") {
            object.required = string_set(required, path, "required")?;
        }
        if let Some(relevant) = map.get("relevantToOptimizer") {
            object.relevant_to_optimizer = Some(string_set(relevant, path, "relevantToOptimizer")?);
        }
        object.additional_properties = match map.get("additionalProperties") {
            None => true,
            Some(Value::Bool(flag)) => *flag,
            // a schema for extra properties still admits extras
            Some(Value::Object(_)) => true,
            Some(other) => {
                return Err(ComposeError::malformed(
                    path,
                    format!("invalid additionalProperties {}", other),
                ))
            }
        };
        Ok(object)
    }

    fn read_array(&mut self, map: &Map<String, Value>, path: &SchemaPath) -> Result<ArraySchema> {
        let items_path = path.items();
        let mut min_items = read_count(map, "minItems", path)?;
        let mut max_items = read_count(map, "maxItems", path)?;
        let items = match map.get("items") {
            None => Schema::Any,
            Some(Value::Array(tuple)) => {
                // positional items are approximated by their union with a fixed length
                let branches = tuple
                    .iter()
                    .map(|item| self.read(item, &items_path))
                    .collect::<Result<Vec<_>>>()?;
                min_items = Some(min_items.unwrap_or(0).max(branches.len()));
                max_items = Some(max_items.map_or(branches.len(), |m| m.min(branches.len())));
                Schema::union_of(branches)
            }
            Some(item) => self.read(item, &items_path)?,
        };
        Ok(ArraySchema {
            items: Box::new(items),
            min_items,
            max_items,
        })
    }
}

fn infer_kind(map: &Map<String, Value>) -> Option<&'static str> {
    const OBJECT_KEYS: [&str; 4] = ["properties", "required", "additionalProperties", "relevantToOptimizer"];
    const ARRAY_KEYS: [&str; 3] = ["items", "minItems", "maxItems"];
    const NUMBER_KEYS: [&str; 5] = ["minimum", "maximum", "exclusiveMinimum", "exclusiveMaximum", "distribution"];
    if OBJECT_KEYS.iter().any(|k| map.contains_key(*k)) {
        Some("object")
    } else if ARRAY_KEYS.iter().any(|k| map.contains_key(*k)) {
        Some("array")
    } else if NUMBER_KEYS.iter().any(|k| map.contains_key(*k)) {
        Some("number")
    } else {
        None
    }
}

fn kind_accepts(kind: ScalarKind, value: &Value) -> bool {
    match (kind, ScalarKind::of_value(value)) {
        (ScalarKind::Number, Some(ScalarKind::Integer | ScalarKind::Number)) => true,
        (kind, Some(found)) => kind == found,
        _ => false,
    }
}

fn read_scalar(kind: ScalarKind, map: &Map<String, Value>, path: &SchemaPath) -> Result<ScalarSchema> {
    let mut scalar = ScalarSchema::new(kind);
    let number = |key: &str| -> Result<Option<f64>> {
        match map.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| ComposeError::malformed(path, format!("{} must be a number", key))),
        }
    };
    scalar.minimum = number("minimum")?.map(Bound::inclusive);
    scalar.maximum = number("maximum")?.map(Bound::inclusive);
    // draft-4 boolean flags and draft-6 numeric bounds are both accepted
    match map.get("exclusiveMinimum") {
        Some(Value::Bool(true)) => {
            if let Some(bound) = scalar.minimum.as_mut() {
                bound.exclusive = true;
            }
        }
        Some(Value::Bool(false)) | None => {}
        Some(value) => {
            let v = value
                .as_f64()
                .ok_or_else(|| ComposeError::malformed(path, "exclusiveMinimum must be a number or boolean"))?;
            scalar.minimum = Some(Bound::exclusive(v));
        }
    }
    match map.get("exclusiveMaximum") {
        Some(Value::Bool(true)) => {
            if let Some(bound) = scalar.maximum.as_mut() {
                bound.exclusive = true;
            }
        }
        Some(Value::Bool(false)) | None => {}
        Some(value) => {
            let v = value
                .as_f64()
                .ok_or_else(|| ComposeError::malformed(path, "exclusiveMaximum must be a number or boolean"))?;
            scalar.maximum = Some(Bound::exclusive(v));
        }
    }
    scalar.distribution = match map.get("distribution").and_then(Value::as_str) {
        None | Some("uniform") => Distribution::Uniform,
        Some("loguniform") => Distribution::LogUniform,
        Some(other) => {
            return Err(ComposeError::malformed(
                path,
                format!("unknown distribution '{}'", other),
            ))
        }
    };
    scalar.minimum_for_optimizer = number("minimumForOptimizer")?;
    scalar.maximum_for_optimizer = number("maximumForOptimizer")?;
    Ok(scalar)
}

fn read_count(map: &Map<String, Value>, key: &str, path: &SchemaPath) -> Result<Option<usize>> {
    match map.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| ComposeError::malformed(path, format!("{} must be a non-negative integer", key))),
    }
}

fn string_set(value: &Value, path: &SchemaPath, keyword: &str) -> Result<BTreeSet<String>> {
    value
        .as_array()
        .ok_or_else(|| ComposeError::malformed(path, format!("{} must be an array", keyword)))?
        .iter()
        .map(|v| {
            v.as_str()
                .map(String::from)
                .ok_or_else(|| ComposeError::malformed(path, format!("{} entries must be strings", keyword)))
        })
        .collect()
}

pub(super) fn to_json(schema: &Schema) -> Value {
    match schema {
        Schema::Any => json!({}),
        Schema::Scalar(scalar) => {
            let mut map = Map::new();
            map.insert("type".into(), json!(scalar.kind.as_str()));
            if let Some(values) = &scalar.enumeration {
                map.insert("enum".into(), Value::Array(values.clone()));
            }
            if let Some(bound) = scalar.minimum {
                let key = if bound.exclusive { "exclusiveMinimum" } else { "minimum" };
                map.insert(key.into(), json!(bound.value));
            }
            if let Some(bound) = scalar.maximum {
                let key = if bound.exclusive { "exclusiveMaximum" } else { "maximum" };
                map.insert(key.into(), json!(bound.value));
            }
            if scalar.distribution == Distribution::LogUniform {
                map.insert("distribution".into(), json!("loguniform"));
            }
            if let Some(low) = scalar.minimum_for_optimizer {
                map.insert("minimumForOptimizer".into(), json!(low));
            }
            if let Some(high) = scalar.maximum_for_optimizer {
                map.insert("maximumForOptimizer".into(), json!(high));
            }
            Value::Object(map)
        }
        Schema::Object(object) => {
            let mut properties = Map::new();
            for (name, property) in &object.properties {
                let mut rendered = to_json(property);
                if let (Some(default), Value::Object(map)) = (object.defaults.get(name), &mut rendered) {
                    map.insert("default".into(), default.clone());
                }
                properties.insert(name.clone(), rendered);
            }
            let mut map = Map::new();
            map.insert("type".into(), json!("object"));
            map.insert("properties".into(), Value::Object(properties));
            if !object.required.is_empty() {
                map.insert("required".into(), json!(object.required));
            }
            map.insert("additionalProperties".into(), json!(object.additional_properties));
            if let Some(relevant) = &object.relevant_to_optimizer {
                map.insert("relevantToOptimizer".into(), json!(relevant));
            }
            Value::Object(map)
        }
        Schema::Array(array) => {
            let mut map = Map::new();
            map.insert("type".into(), json!("array"));
            map.insert("items".into(), to_json(&array.items));
            if let Some(min) = array.min_items {
                map.insert("minItems".into(), json!(min));
            }
            if let Some(max) = array.max_items {
                map.insert("maxItems".into(), json!(max));
            }
            Value::Object(map)
        }
        Schema::AnyOf(branches) => json!({ "anyOf": branches.iter().map(to_json).collect::<Vec<_>>() }),
        Schema::AllOf(branches) => json!({ "allOf": branches.iter().map(to_json).collect::<Vec<_>>() }),
        Schema::OneOf(branches) => json!({ "oneOf": branches.iter().map(to_json).collect::<Vec<_>>() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hyperparameter_schema() {
        let doc = json!({
            "allOf": [{
                "type": "object",
                "required": ["C", "solver"],
                "relevantToOptimizer": ["C", "solver"],
                "additionalProperties": false,
                "properties": {
                    "C": {
                        "type": "number",
                        "minimum": 0.0,
                        "exclusiveMinimum": true,
                        "maximumForOptimizer": 1000.0,
                        "minimumForOptimizer": 0.03125,
                        "distribution": "loguniform",
                        "default": 1.0
                    },
                    "solver": {"enum": ["liblinear", "lbfgs"], "default": "lbfgs"},
                    "max_iter": {"type": "integer", "minimum": 1, "default": 100}
                }
            }]
        });
        let schema = Schema::from_json(&doc).unwrap();
        let Schema::AllOf(branches) = &schema else {
            panic!("Expected allOf, got {:?}", schema);
        };
        let object = branches[0].as_object().unwrap();
        assert!(!object.additional_properties);
        assert_eq!(object.defaults.len(), 3);
        match &object.properties["C"] {
            Schema::Scalar(c) => {
                assert_eq!(c.minimum, Some(Bound::exclusive(0.0)));
                assert_eq!(c.distribution, Distribution::LogUniform);
                assert_eq!(c.maximum_for_optimizer, Some(1000.0));
            }
            other => panic!("Expected scalar, got {:?}", other),
        }
    }

    #[test]
    fn test_type_list_becomes_union() {
        let schema = Schema::from_json(&json!({"type": ["number", "string"]})).unwrap();
        assert_eq!(schema, Schema::AnyOf(vec![Schema::number(), Schema::string()]));
    }

    #[test]
    fn test_refs_resolved_and_cycles_rejected() {
        let doc = json!({
            "definitions": {"vector": {"type": "array", "items": {"type": "number"}}},
            "type": "object",
            "properties": {"X": {"$ref": "#/definitions/vector"}}
        });
        let schema = Schema::from_json(&doc).unwrap();
        assert_eq!(
            schema.as_object().unwrap().properties["X"],
            Schema::array_of(Schema::number())
        );

        let cyclic = json!({
            "definitions": {"node": {"type": "array", "items": {"$ref": "#/definitions/node"}}},
            "$ref": "#/definitions/node"
        });
        let err = Schema::from_json(&cyclic).unwrap_err();
        assert!(err.to_string().contains("cyclic"));
    }

    #[test]
    fn test_malformed_documents() {
        assert!(Schema::from_json(&json!({"type": "matrix"})).is_err());
        assert!(Schema::from_json(&json!({"type": "object", "required": ["x"]})).is_err());
        assert!(Schema::from_json(&json!({"not": {"type": "string"}})).is_err());
        assert!(Schema::from_json(&json!({"type": "integer", "minimum": "one"})).is_err());
        assert!(Schema::from_json(&json!(42)).is_err());
    }

    #[test]
    fn test_roundtrip_through_serde() {
        let doc = json!({
            "type": "object",
            "required": ["k"],
            "properties": {
                "k": {"type": "integer", "minimum": 1, "maximum": 50, "default": 5},
                "weights": {"enum": ["uniform", "distance"]}
            }
        });
        let schema: Schema = serde_json::from_value(doc).unwrap();
        let back: Schema = serde_json::from_value(serde_json::to_value(&schema).unwrap()).unwrap();
        assert_eq!(schema, back);
    }
}
