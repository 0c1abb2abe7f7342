//! Language registration: static metadata and the bridge entry points.

use serde::{Deserialize, Serialize};
use tracing::info;

use moonbridge_runtime::{BridgeOp, BridgeResult, GuestRuntime, RuntimeConfig};

use crate::host::{StringHandle, VariantHandle};

/// Static language metadata handed to the host at plugin registration.
///
/// Pure configuration: the host uses it for file association, syntax
/// highlighting and editor affordances. Nothing here is consulted during
/// dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageDescriptor {
    /// Display name.
    pub name: String,
    /// Type name used by the host's resource system.
    pub type_name: String,
    /// Primary file extension.
    pub extension: String,
    /// All extensions the host should route to this language.
    pub recognized_extensions: Vec<String>,
    /// Reserved words for the editor.
    pub reserved_words: Vec<String>,
    /// Comment delimiters, "open close" pairs or single prefixes.
    pub comment_delimiters: Vec<String>,
    /// String delimiters, "open close" pairs.
    pub string_delimiters: Vec<String>,
    /// Whether scripts declare named classes.
    pub has_named_classes: bool,
    /// Whether the host may embed script bodies inline in its own files.
    pub supports_builtin_mode: bool,
}

impl LanguageDescriptor {
    /// The stock descriptor for Lua.
    pub fn lua() -> Self {
        let words = [
            // Lua keywords
            "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto",
            "if", "in", "local", "nil", "not", "or", "repeat", "return", "then", "true", "until",
            "while",
            // Other remarkable identifiers
            "self", "_G", "_ENV", "_VERSION", "bool", "int", "float",
        ];
        Self {
            name: "Lua".to_string(),
            type_name: "Lua".to_string(),
            extension: "lua".to_string(),
            recognized_extensions: vec!["lua".to_string()],
            reserved_words: words.iter().map(|w| w.to_string()).collect(),
            comment_delimiters: vec!["--".to_string(), "--[[ ]]".to_string()],
            string_delimiters: vec![
                "' '".to_string(),
                "\" \"".to_string(),
                "[[ ]]".to_string(),
                "[=[ ]=]".to_string(),
            ],
            has_named_classes: false,
            supports_builtin_mode: false,
        }
    }
}

/// The language side of the host plugin contract.
///
/// Owns the guest runtime; the script, instance and editor operations are
/// implemented in their own modules as further `impl` blocks.
pub struct LanguageBridge {
    runtime: GuestRuntime,
    descriptor: LanguageDescriptor,
}

impl LanguageBridge {
    /// `language_init`: create the guest runtime and run its bootstrap.
    pub fn initialize(
        descriptor: LanguageDescriptor,
        config: RuntimeConfig,
    ) -> BridgeResult<Self> {
        let runtime = GuestRuntime::initialize(config)?;
        info!(language = %descriptor.name, "script language bridge ready");
        Ok(Self {
            runtime,
            descriptor,
        })
    }

    pub fn descriptor(&self) -> &LanguageDescriptor {
        &self.descriptor
    }

    pub fn runtime(&self) -> &GuestRuntime {
        &self.runtime
    }

    /// `language_finish`: tear the guest runtime down. Idempotent.
    pub fn finalize(&mut self) {
        self.runtime.finalize();
    }

    /// Forward a host global constant to the guest. No-op when the guest
    /// does not handle globals.
    pub fn add_global_constant(&self, name: StringHandle, value: VariantHandle) {
        let _ = self
            .runtime
            .protected_call::<_, ()>(BridgeOp::AddGlobalConstant, (name, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lua_descriptor_matches_the_language() {
        let desc = LanguageDescriptor::lua();
        assert_eq!(desc.extension, "lua");
        assert!(desc.reserved_words.iter().any(|w| w == "elseif"));
        assert!(!desc.has_named_classes);
    }

    #[test]
    fn descriptor_serializes() {
        let desc = LanguageDescriptor::lua();
        let json = serde_json::to_string(&desc).unwrap();
        let back: LanguageDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "Lua");
        assert_eq!(back.recognized_extensions, vec!["lua"]);
    }
}
