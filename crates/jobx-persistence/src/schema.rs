// Esquema Diesel del almacén KV.
// Tablas: kv_nodes, kv_revision
diesel::table! {
  kv_nodes (node_key) {
    node_key -> Text,
    parent_key -> Text,
    node_name -> Text,
    node_value -> Text,
    version -> BigInt,
  }
}
diesel::table! {
  kv_revision (id) {
    id -> Integer,
    revision -> BigInt,
  }
}
