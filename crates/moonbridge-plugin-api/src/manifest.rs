//! The per-script manifest and its guest-side fill protocol.
//!
//! The host's object system treats an uninitialized manifest field as a
//! fatal condition, so every field is pre-initialized to its empty value
//! before `script_init` is dispatched. On success the guest's returned
//! table is copied into the pre-allocated manifest; descriptor tables are
//! copied into host-owned JSON values so nothing in the manifest keeps a
//! live reference into the guest heap except the explicitly pinned script
//! data.

use std::collections::BTreeMap;
use std::fmt;

use mlua::{Lua, RegistryKey, Table, Value};
use serde::{Deserialize, Serialize};

/// An opaque back-reference to guest-side script-level state, pinned in
/// the Lua registry for the manifest's lifetime.
pub struct ScriptData {
    key: RegistryKey,
}

impl ScriptData {
    pub(crate) fn pin(lua: &Lua, value: Value) -> mlua::Result<Self> {
        Ok(Self {
            key: lua.create_registry_value(value)?,
        })
    }

    pub(crate) fn value(&self, lua: &Lua) -> mlua::Result<Value> {
        lua.registry_value(&self.key)
    }

    pub(crate) fn release(self, lua: &Lua) {
        let _ = lua.remove_registry_value(self.key);
    }
}

impl fmt::Debug for ScriptData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptData").finish_non_exhaustive()
    }
}

/// Descriptor produced per loaded script source unit.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ScriptManifest {
    /// Script class name.
    pub name: String,
    /// Base type the script extends.
    pub base: String,
    /// Whether the script runs inside the editor.
    pub is_tool: bool,
    /// Member name to source line, for editor navigation.
    pub member_lines: BTreeMap<String, u32>,
    /// Ordered method descriptors, copied out of the guest verbatim.
    pub methods: Vec<serde_json::Value>,
    /// Ordered signal descriptors.
    pub signals: Vec<serde_json::Value>,
    /// Ordered property descriptors.
    pub properties: Vec<serde_json::Value>,
    /// Guest-side script state, if the guest attached any.
    #[serde(skip)]
    pub data: Option<ScriptData>,
}

impl ScriptManifest {
    /// Copy the guest's manifest table into the pre-allocated fields.
    pub(crate) fn fill_from_guest(&mut self, lua: &Lua, table: &Table) -> mlua::Result<()> {
        if let Some(name) = table.get::<Option<String>>("name")? {
            self.name = name;
        }
        if let Some(base) = table.get::<Option<String>>("base")? {
            self.base = base;
        }
        if let Some(is_tool) = table.get::<Option<bool>>("is_tool")? {
            self.is_tool = is_tool;
        }
        if let Some(lines) = table.get::<Option<Table>>("member_lines")? {
            for pair in lines.pairs::<String, u32>() {
                let (member, line) = pair?;
                self.member_lines.insert(member, line);
            }
        }
        self.methods = descriptor_list(table, "methods")?;
        self.signals = descriptor_list(table, "signals")?;
        self.properties = descriptor_list(table, "properties")?;

        let data = table.get::<Value>("data")?;
        if !data.is_nil() {
            self.data = Some(ScriptData::pin(lua, data)?);
        }
        Ok(())
    }
}

// Guest tables can reference themselves; the copy must stay bounded so a
// malformed manifest becomes a contained fault, not a stack overflow.
const MAX_DESCRIPTOR_DEPTH: usize = 32;

fn descriptor_list(table: &Table, field: &str) -> mlua::Result<Vec<serde_json::Value>> {
    let Some(list) = table.get::<Option<Table>>(field)? else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for item in list.sequence_values::<Value>() {
        out.push(json_copy(&item?, MAX_DESCRIPTOR_DEPTH)?);
    }
    Ok(out)
}

/// Copy a plain-data Lua value into host-owned storage. Values that are
/// not plain data (functions, userdata, threads) have no host-side
/// representation and make the manifest malformed, as do tables mixing
/// array and map parts or nesting past [`MAX_DESCRIPTOR_DEPTH`].
fn json_copy(value: &Value, depth: usize) -> mlua::Result<serde_json::Value> {
    if depth == 0 {
        return Err(mlua::Error::RuntimeError(format!(
            "manifest descriptor nests deeper than {MAX_DESCRIPTOR_DEPTH} levels (cyclic table?)"
        )));
    }
    Ok(match value {
        Value::Nil => serde_json::Value::Null,
        Value::Boolean(b) => (*b).into(),
        Value::Integer(i) => (*i).into(),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.to_str()?.to_string()),
        Value::Table(t) => {
            let len = t.raw_len();
            if len > 0 {
                for pair in t.clone().pairs::<Value, Value>() {
                    let (key, _) = pair?;
                    match key {
                        Value::Integer(i) if i >= 1 && i <= len as i64 => {}
                        _ => {
                            return Err(mlua::Error::RuntimeError(
                                "manifest descriptor table mixes array and map parts".to_string(),
                            ))
                        }
                    }
                }
                let mut items = Vec::with_capacity(len);
                for item in t.clone().sequence_values::<Value>() {
                    items.push(json_copy(&item?, depth - 1)?);
                }
                serde_json::Value::Array(items)
            } else {
                let mut map = serde_json::Map::new();
                for pair in t.clone().pairs::<String, Value>() {
                    let (key, item) = pair?;
                    map.insert(key, json_copy(&item, depth - 1)?);
                }
                if map.is_empty() {
                    // descriptor sub-tables are list-shaped; an empty one
                    // is an empty list, not an empty map
                    serde_json::Value::Array(Vec::new())
                } else {
                    serde_json::Value::Object(map)
                }
            }
        }
        other => {
            return Err(mlua::Error::RuntimeError(format!(
                "manifest descriptor of type {} cannot cross the boundary",
                other.type_name()
            )))
        }
    })
}
