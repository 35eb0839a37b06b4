// pair.rs
//
// Registros de datos que circulan por los datasets:
//   - `PairRecord` `{"p": [k, v]}`: argumentos y resultados reducidos.
//   - `Group` `{"k": k, "vl": [...]}`: salida del combinador.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;

/// Par clave/valor sin tipo.
pub type Pair = (JsonValue, JsonValue);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairRecord {
  pub p: Pair,
}

impl PairRecord {
  pub fn new(key: JsonValue, value: JsonValue) -> Self {
    Self { p: (key, value) }
  }

  pub fn into_pair(self) -> Pair {
    self.p
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
  #[serde(rename = "k")]
  pub key: JsonValue,
  #[serde(rename = "vl")]
  pub values: Vec<JsonValue>,
}

impl Group {
  pub fn new(key: JsonValue, values: Vec<JsonValue>) -> Self {
    Self { key, values }
  }
}

fn type_rank(v: &JsonValue) -> u8 {
  match v {
    JsonValue::Null => 0,
    JsonValue::Bool(_) => 1,
    JsonValue::Number(_) => 2,
    JsonValue::String(_) => 3,
    JsonValue::Array(_) => 4,
    JsonValue::Object(_) => 5,
  }
}

/// Orden total sobre claves JSON: primero por tipo
/// (null < bool < número < cadena < lista < objeto), luego natural.
pub fn cmp_keys(a: &JsonValue, b: &JsonValue) -> Ordering {
  match (a, b) {
    (JsonValue::Bool(x), JsonValue::Bool(y)) => x.cmp(y),
    (JsonValue::Number(x), JsonValue::Number(y)) => {
      match (x.as_i64(), y.as_i64()) {
        (Some(i), Some(j)) => i.cmp(&j),
        _ => {
          let fx = x.as_f64().unwrap_or(f64::NAN);
          let fy = y.as_f64().unwrap_or(f64::NAN);
          fx.partial_cmp(&fy).unwrap_or(Ordering::Equal)
        }
      }
    }
    (JsonValue::String(x), JsonValue::String(y)) => x.cmp(y),
    (JsonValue::Array(x), JsonValue::Array(y)) => {
      for (ex, ey) in x.iter().zip(y.iter()) {
        let ord = cmp_keys(ex, ey);
        if ord != Ordering::Equal {
          return ord;
        }
      }
      x.len().cmp(&y.len())
    }
    (JsonValue::Object(_), JsonValue::Object(_)) => a.to_string().cmp(&b.to_string()),
    _ => type_rank(a).cmp(&type_rank(b)),
  }
}

/// Combinador por defecto: ordena (estable) por clave y agrupa, sin colapsar
/// la lista de valores.
pub fn group_by_key(mut pairs: Vec<Pair>) -> Vec<Group> {
  pairs.sort_by(|a, b| cmp_keys(&a.0, &b.0));
  let mut groups: Vec<Group> = Vec::new();
  for (k, v) in pairs {
    match groups.last_mut() {
      Some(last) if cmp_keys(&last.key, &k) == Ordering::Equal => last.values.push(v),
      _ => groups.push(Group::new(k, vec![v])),
    }
  }
  groups
}

/// Fusiona pares por clave en orden de primera aparición, concatenando los
/// valores.
pub fn merge_by_key<I>(pairs: I) -> Vec<Group>
  where I: IntoIterator<Item = Pair>
{
  let mut merged: IndexMap<String, Group> = IndexMap::new();
  for (k, v) in pairs {
    merged.entry(k.to_string()).or_insert_with(|| Group::new(k, Vec::new())).values.push(v);
  }
  merged.into_values().collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn default_combiner_groups_without_reducing() {
    let pairs = vec![(json!("a"), json!(1)), (json!("b"), json!(2)), (json!("a"), json!(3))];
    let groups = group_by_key(pairs);
    assert_eq!(groups,
               vec![Group::new(json!("a"), vec![json!(1), json!(3)]), Group::new(json!("b"), vec![json!(2)])]);
  }

  #[test]
  fn keys_order_by_type_then_value() {
    let mut keys = vec![json!("b"), json!(2), json!(null), json!(true), json!(1.5), json!([1]), json!("a")];
    keys.sort_by(cmp_keys);
    assert_eq!(keys, vec![json!(null), json!(true), json!(1.5), json!(2), json!("a"), json!("b"), json!([1])]);
  }

  #[test]
  fn merge_keeps_first_seen_order() {
    let merged = merge_by_key(vec![(json!("z"), json!(1)), (json!("a"), json!(2)), (json!("z"), json!(3))]);
    assert_eq!(merged[0].key, json!("z"));
    assert_eq!(merged[0].values, vec![json!(1), json!(3)]);
    assert_eq!(merged[1].key, json!("a"));
  }

  #[test]
  fn records_use_compact_field_names() {
    let raw = serde_json::to_string(&PairRecord::new(json!("k"), json!(1))).unwrap();
    assert_eq!(raw, r#"{"p":["k",1]}"#);
    let raw = serde_json::to_string(&Group::new(json!("k"), vec![json!(1)])).unwrap();
    assert_eq!(raw, r#"{"k":"k","vl":[1]}"#);
  }
}
