//! Builders and readers for CloudFormation intrinsic functions.
//!
//! Values that only exist after deployment (subnet ids, endpoints, secret
//! ARNs) are never known at synthesis time. Constructs hand them around as
//! these JSON fragments and the engine resolves them.

use serde_json::{json, Value};

pub fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

pub fn join(delimiter: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [delimiter, parts] })
}

pub fn select(index: usize, list: Value) -> Value {
    json!({ "Fn::Select": [index, list] })
}

pub fn split(delimiter: &str, source: Value) -> Value {
    json!({ "Fn::Split": [delimiter, source] })
}

/// AZs of the deploying region; an empty region means "the stack's region"
pub fn get_azs(region: &str) -> Value {
    json!({ "Fn::GetAZs": region })
}

/// `{{resolve:secretsmanager:<secret>:SecretString:<field>::}}`
///
/// The engine substitutes the secret value at deploy time; the declaration
/// only ever carries the reference.
pub fn secrets_manager_field(secret: Value, field: &str) -> Value {
    join(
        "",
        vec![
            Value::from("{{resolve:secretsmanager:"),
            secret,
            Value::from(format!(":SecretString:{}::}}}}", field)),
        ],
    )
}

/// Builds a CloudFormation `Tags` list, sorted by key
pub fn tags(pairs: &[(&str, &str)]) -> Value {
    let mut pairs = pairs.to_vec();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    Value::Array(
        pairs
            .into_iter()
            .map(|(key, value)| json!({ "Key": key, "Value": value }))
            .collect(),
    )
}

/// Target of a `{"Ref": ...}` value
pub fn as_reference(value: &Value) -> Option<&str> {
    value.as_object()?.get("Ref")?.as_str()
}

/// Target logical id and attribute of a `{"Fn::GetAtt": [...]}` value
pub fn as_get_att(value: &Value) -> Option<(&str, &str)> {
    let args = value.as_object()?.get("Fn::GetAtt")?.as_array()?;
    match args.as_slice() {
        [id, attr] => Some((id.as_str()?, attr.as_str()?)),
        _ => None,
    }
}

/// Collects every logical id referenced through `Ref` or `Fn::GetAtt`
/// anywhere inside `value`, pseudo parameters (`AWS::*`) excluded.
pub fn referenced_ids(value: &Value) -> Vec<String> {
    let mut ids = Vec::new();
    collect_ids(value, &mut ids);
    ids.sort();
    ids.dedup();
    ids
}

fn collect_ids(value: &Value, ids: &mut Vec<String>) {
    if let Some(id) = as_reference(value) {
        if !id.starts_with("AWS::") {
            ids.push(id.to_string());
        }
        return;
    }
    if let Some((id, _)) = as_get_att(value) {
        ids.push(id.to_string());
        return;
    }
    match value {
        Value::Array(items) => items.iter().for_each(|v| collect_ids(v, ids)),
        Value::Object(map) => map.values().for_each(|v| collect_ids(v, ids)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_round_trip() {
        let value = reference("TestVPC");
        assert_eq!(as_reference(&value), Some("TestVPC"));
        assert_eq!(as_get_att(&value), None);
    }

    #[test]
    fn test_get_att_round_trip() {
        let value = get_att("Cluster", "Endpoint.Address");
        assert_eq!(as_get_att(&value), Some(("Cluster", "Endpoint.Address")));
        assert_eq!(as_reference(&value), None);
    }

    #[test]
    fn test_secrets_manager_field() {
        let value = secrets_manager_field(reference("Secret"), "password");
        assert_eq!(
            value,
            json!({
                "Fn::Join": ["", [
                    "{{resolve:secretsmanager:",
                    { "Ref": "Secret" },
                    ":SecretString:password::}}"
                ]]
            })
        );
    }

    #[test]
    fn test_tags_sorted_by_key() {
        let value = tags(&[("Name", "vpc"), ("aws-cdk:subnet-name", "Public")]);
        assert_eq!(value[0]["Key"], "Name");
        assert_eq!(value[1]["Key"], "aws-cdk:subnet-name");

        let value = tags(&[("b", "2"), ("a", "1")]);
        assert_eq!(value[0]["Key"], "a");
    }

    #[test]
    fn test_referenced_ids_walks_nested_values() {
        let value = json!({
            "SubnetIds": [reference("B"), reference("A")],
            "Group": get_att("Sg", "GroupId"),
            "Region": reference("AWS::Region"),
            "Nested": join(",", vec![reference("A")]),
        });
        assert_eq!(referenced_ids(&value), vec!["A", "B", "Sg"]);
    }
}
