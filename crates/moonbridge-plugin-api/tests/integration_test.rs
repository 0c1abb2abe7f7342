//! End-to-end tests for the plugin contract over a fake host: opaque
//! handles into host-owned values, a Lua bootstrap implementing the
//! callbacks, and the out-parameter discipline the host relies on.

use std::cell::Cell;
use std::ffi::c_void;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use mlua::{LightUserData, Lua};

use moonbridge_plugin_api::{
    BootstrapChunk, Diagnostic, DiagnosticSink, ForeignHandle, LanguageBridge, LanguageDescriptor,
    MethodCallError, MethodCallStatus, ObjectHandle, RuntimeConfig, ScriptStatus,
    StringArrayHandle, StringHandle, StringNameHandle, ValidationReport, VariantHandle,
};

// One runtime per process; serialize the tests in this binary.
fn exclusive() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
struct RecordingSink {
    seen: Mutex<Vec<Diagnostic>>,
}

impl RecordingSink {
    fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        self.seen.lock().unwrap().push(diagnostic.clone());
    }
}

// The fake host's variant type: a single writable integer slot.
struct HostVariantCell {
    value: Cell<i64>,
}

impl HostVariantCell {
    fn new(value: i64) -> Self {
        Self {
            value: Cell::new(value),
        }
    }
}

fn str_handle(s: &String) -> StringHandle {
    ForeignHandle::from_addr(s as *const String as *mut c_void)
}

fn name_handle(s: &String) -> StringNameHandle {
    ForeignHandle::from_addr(s as *const String as *mut c_void)
}

fn variant_handle(cell: &HostVariantCell) -> VariantHandle {
    ForeignHandle::from_addr(cell as *const HostVariantCell as *mut c_void)
}

fn object_handle(slot: &i64) -> ObjectHandle {
    ForeignHandle::from_addr(slot as *const i64 as *mut c_void)
}

// The fake host's capability surface: the guest reads host strings and
// reads/writes host variants only through these.
fn install_host(lua: &Lua) -> mlua::Result<()> {
    let host = lua.create_table()?;
    host.set(
        "read_string",
        lua.create_function(|_, ud: LightUserData| {
            let s = unsafe { &*(ud.0 as *const String) };
            Ok(s.clone())
        })?,
    )?;
    host.set(
        "variant_get",
        lua.create_function(|_, ud: LightUserData| {
            let cell = unsafe { &*(ud.0 as *const HostVariantCell) };
            Ok(cell.value.get())
        })?,
    )?;
    host.set(
        "variant_set",
        lua.create_function(|_, (ud, value): (LightUserData, i64)| {
            let cell = unsafe { &*(ud.0 as *const HostVariantCell) };
            cell.value.set(value);
            Ok(())
        })?,
    )?;
    lua.globals().set("host", host)
}

fn bridge(bootstrap: &str, editor: bool, sink: Arc<RecordingSink>) -> LanguageBridge {
    let config = RuntimeConfig::new("libmoon.so")
        .editor_mode(editor)
        .host_bindings(install_host)
        .bootstrap(BootstrapChunk::new("boot", bootstrap))
        .diagnostic_sink(sink);
    LanguageBridge::initialize(LanguageDescriptor::lua(), config).unwrap()
}

const FULL_BOOTSTRAP: &str = r#"
    local instances = {}

    hostbridge.register('script_init', function(path, source)
        local text = host.read_string(source)
        local name = text:match('class%s+(%w+)')
        local base = text:match('extends%s+(%w+)')
        if not name then
            return 2, nil
        end
        return 0, {
            name = name,
            base = base or 'Object',
            member_lines = { [name] = 1 },
            methods = { { name = 'greet', args = {} } },
            signals = {},
            properties = { { name = 'health', default = 100 } },
            data = { class_name = name },
        }
    end)

    hostbridge.register('script_finish', function(data) end)

    hostbridge.register('instance_init', function(script, owner)
        instances[owner] = { script = script, props = {} }
        return owner
    end)

    hostbridge.register('instance_finish', function(owner)
        instances[owner] = nil
    end)

    hostbridge.register('instance_set_prop', function(owner, name, value)
        local inst = instances[owner]
        if not inst then return false end
        inst.props[host.read_string(name)] = host.variant_get(value)
        return true
    end)

    hostbridge.register('instance_get_prop', function(owner, name, ret)
        local key = host.read_string(name)
        if key == 'explode' then
            error('property backend exploded')
        end
        local inst = instances[owner]
        if not inst or inst.props[key] == nil then return false end
        host.variant_set(ret, inst.props[key])
        return true
    end)

    hostbridge.register('instance_call_method', function(owner, method, args, ret)
        local inst = instances[owner]
        if not inst then return 5 end
        if host.read_string(method) ~= 'greet' then return 1 end
        if #args > 1 then return 3, #args, 1 end
        host.variant_set(ret, 7)
        return 0
    end)

    hostbridge.register('instance_notification', function(owner, what)
        last_notification = what
    end)
"#;

#[test]
fn script_and_instance_lifecycle() {
    let _serial = exclusive();
    let sink = Arc::new(RecordingSink::default());
    let bridge = bridge(FULL_BOOTSTRAP, false, sink.clone());

    let path = String::from("res://foo.lua");
    let source = String::from("class Foo extends Bar\nfunction greet() end");
    let mut result = bridge.script_init(str_handle(&path), str_handle(&source));
    assert_eq!(result.status, ScriptStatus::Ok);
    assert_eq!(result.manifest.name, "Foo");
    assert_eq!(result.manifest.base, "Bar");
    assert_eq!(result.manifest.member_lines.get("Foo"), Some(&1));
    assert_eq!(result.manifest.methods.len(), 1);
    assert_eq!(result.manifest.properties.len(), 1);
    assert!(result.manifest.data.is_some());

    let owner_slot = 1i64;
    let owner = object_handle(&owner_slot);
    let identity = bridge.instance_init(result.manifest.data.as_ref(), owner);
    assert_eq!(identity, Some(owner));

    // property round trip through host-owned variants
    let health = String::from("health");
    let written = HostVariantCell::new(42);
    assert!(bridge.instance_set_prop(owner, name_handle(&health), variant_handle(&written)));
    let read = HostVariantCell::new(0);
    assert!(bridge.instance_get_prop(owner, name_handle(&health), variant_handle(&read)));
    assert_eq!(read.value.get(), 42);

    // method dispatch writes through the return handle and fills the error
    let greet = String::from("greet");
    let ret = HostVariantCell::new(0);
    let mut error = MethodCallError::default();
    bridge.instance_call_method(owner, name_handle(&greet), &[], variant_handle(&ret), &mut error);
    assert_eq!(error.status, MethodCallStatus::Ok);
    assert_eq!(ret.value.get(), 7);
    assert_eq!(sink.count(), 0);

    // a faulting accessor reports once and answers unrecognized
    let explode = String::from("explode");
    let scratch = HostVariantCell::new(0);
    assert!(!bridge.instance_get_prop(owner, name_handle(&explode), variant_handle(&scratch)));
    assert_eq!(sink.count(), 1);

    // an unknown method is a domain outcome, not a diagnostic
    let missing = String::from("missing");
    let mut error = MethodCallError::default();
    bridge.instance_call_method(owner, name_handle(&missing), &[], variant_handle(&ret), &mut error);
    assert_eq!(error.status, MethodCallStatus::InvalidMethod);
    assert_eq!(sink.count(), 1);

    bridge.instance_finish(owner);
    bridge.script_finish(result.manifest.data.take());
    assert_eq!(sink.count(), 1);
}

#[test]
fn parse_failure_is_status_only() {
    let _serial = exclusive();
    let sink = Arc::new(RecordingSink::default());
    let bridge = bridge(FULL_BOOTSTRAP, false, sink.clone());

    let path = String::from("res://broken.lua");
    let source = String::from("this is not a script");
    let result = bridge.script_init(str_handle(&path), str_handle(&source));
    assert_eq!(result.status, ScriptStatus::ParseError);
    assert_eq!(result.manifest.name, "");
    assert!(result.manifest.data.is_none());
    assert_eq!(sink.count(), 0);
}

#[test]
fn unregistered_callbacks_degrade_to_defaults() {
    let _serial = exclusive();
    let sink = Arc::new(RecordingSink::default());
    let config = RuntimeConfig::new("libmoon.so")
        .host_bindings(install_host)
        .diagnostic_sink(sink.clone());
    let bridge = LanguageBridge::initialize(LanguageDescriptor::lua(), config).unwrap();

    let path = String::from("res://foo.lua");
    let source = String::from("class Foo");
    let result = bridge.script_init(str_handle(&path), str_handle(&source));
    assert_eq!(result.status, ScriptStatus::Ok);
    assert_eq!(result.manifest.name, "");

    let owner_slot = 2i64;
    let owner = object_handle(&owner_slot);
    assert_eq!(bridge.instance_init(None, owner), None);

    let health = String::from("health");
    let cell = HostVariantCell::new(0);
    assert!(!bridge.instance_set_prop(owner, name_handle(&health), variant_handle(&cell)));
    assert!(!bridge.instance_get_prop(owner, name_handle(&health), variant_handle(&cell)));

    // missing call_method entry: error stays at the pre-set default, the
    // return variant is untouched, nothing is reported
    let greet = String::from("greet");
    let ret = HostVariantCell::new(11);
    let mut error = MethodCallError {
        status: MethodCallStatus::Ok,
        argument: 0,
        expected: 0,
    };
    bridge.instance_call_method(owner, name_handle(&greet), &[], variant_handle(&ret), &mut error);
    assert_eq!(error.status, MethodCallStatus::InvalidMethod);
    assert_eq!(error.argument, -1);
    assert_eq!(error.expected, -1);
    assert_eq!(ret.value.get(), 11);

    let mut report = ValidationReport::default();
    assert!(bridge.validate(str_handle(&source), str_handle(&path), &mut report));
    assert_eq!(sink.count(), 0);
}

#[test]
fn cyclic_manifest_descriptor_is_contained() {
    let _serial = exclusive();
    let sink = Arc::new(RecordingSink::default());
    let bridge = bridge(
        r#"
        hostbridge.register('script_init', function(path, source)
            local text = host.read_string(source)
            if text:find('extends') then
                return 0, { name = 'Loop' }
            end
            local t = {}
            t.me = t
            return 0, { name = 'Loop', methods = { t } }
        end)
        "#,
        false,
        sink.clone(),
    );

    let path = String::from("res://loop.lua");
    let source = String::from("class Loop");
    let result = bridge.script_init(str_handle(&path), str_handle(&source));

    // the copy fault degrades to the defaulted manifest with one diagnostic
    assert_eq!(result.manifest.name, "");
    assert!(result.manifest.methods.is_empty());
    assert_eq!(sink.count(), 1);

    // the runtime stays usable afterwards
    let ok_source = String::from("class Loop extends Node");
    let again = bridge.script_init(str_handle(&path), str_handle(&ok_source));
    assert_eq!(again.status, ScriptStatus::Ok);
    assert_eq!(again.manifest.name, "Loop");
    assert_eq!(sink.count(), 1);
}

#[test]
fn out_of_range_call_error_fields_become_sentinels() {
    let _serial = exclusive();
    let sink = Arc::new(RecordingSink::default());
    let bridge = bridge(
        r#"
        hostbridge.register('instance_call_method', function(owner, method, args, ret)
            return 2, 9999999999, 2
        end)
        "#,
        false,
        sink.clone(),
    );

    let owner_slot = 5i64;
    let owner = object_handle(&owner_slot);
    let method = String::from("greet");
    let ret = HostVariantCell::new(0);
    let mut error = MethodCallError::default();
    bridge.instance_call_method(owner, name_handle(&method), &[], variant_handle(&ret), &mut error);
    assert_eq!(error.status, MethodCallStatus::InvalidArgument);
    assert_eq!(error.argument, -1);
    assert_eq!(error.expected, 2);
}

#[test]
fn instance_init_fault_is_contained() {
    let _serial = exclusive();
    let sink = Arc::new(RecordingSink::default());
    let bridge = bridge(
        r#"
        hostbridge.register('instance_init', function(script, owner)
            error('attach refused')
        end)
        "#,
        false,
        sink.clone(),
    );

    let owner_slot = 3i64;
    let owner = object_handle(&owner_slot);
    assert_eq!(bridge.instance_init(None, owner), None);
    assert_eq!(sink.count(), 1);
}

const EDITOR_BOOTSTRAP: &str = r#"
    hostbridge.register('get_template_source_code', function(class, base)
        return 'class ' .. host.read_string(class)
            .. ' extends ' .. host.read_string(base)
    end)

    hostbridge.register('validate', function(script, path)
        local text = host.read_string(script)
        if text:find('class') then return true end
        return false, {
            line_error = 1,
            col_error = 1,
            message = 'missing class declaration',
            functions = { 'ready' },
        }
    end)

    hostbridge.register('make_function', function(class, name, args)
        return 'function ' .. host.read_string(name) .. '()\nend'
    end)
"#;

#[test]
fn editor_hooks_run_in_editor_context() {
    let _serial = exclusive();
    let sink = Arc::new(RecordingSink::default());
    let bridge = bridge(EDITOR_BOOTSTRAP, true, sink.clone());

    let class = String::from("Foo");
    let base = String::from("Bar");
    let mut template = String::new();
    bridge.get_template_source_code(str_handle(&class), str_handle(&base), &mut template);
    assert_eq!(template, "class Foo extends Bar");

    let good = String::from("class Foo");
    let bad = String::from("print('hi')");
    let path = String::from("res://foo.lua");
    let mut report = ValidationReport::default();
    assert!(bridge.validate(str_handle(&good), str_handle(&path), &mut report));
    assert_eq!(report.line_error, 0);
    assert!(!bridge.validate(str_handle(&bad), str_handle(&path), &mut report));
    assert_eq!(report.line_error, 1);
    assert_eq!(report.message, "missing class declaration");
    assert_eq!(report.functions, vec!["ready"]);

    let name = String::from("greet");
    let args = String::new();
    let args_handle: StringArrayHandle =
        ForeignHandle::from_addr(&args as *const String as *mut c_void);
    let mut stub = String::new();
    bridge.make_function(str_handle(&class), str_handle(&name), args_handle, &mut stub);
    assert_eq!(stub, "function greet()\nend");
    assert_eq!(sink.count(), 0);
}

#[test]
fn editor_hooks_are_absent_outside_editor_context() {
    let _serial = exclusive();
    let sink = Arc::new(RecordingSink::default());
    let bridge = bridge(EDITOR_BOOTSTRAP, false, sink.clone());

    let class = String::from("Foo");
    let base = String::from("Bar");
    let mut template = String::from("untouched");
    bridge.get_template_source_code(str_handle(&class), str_handle(&base), &mut template);
    assert_eq!(template, "untouched");

    let bad = String::from("print('hi')");
    let path = String::from("res://foo.lua");
    let mut report = ValidationReport::default();
    // scripts pass by default when no validator exists
    assert!(bridge.validate(str_handle(&bad), str_handle(&path), &mut report));
    assert_eq!(sink.count(), 0);
}

#[test]
fn notifications_reach_the_guest() {
    let _serial = exclusive();
    let sink = Arc::new(RecordingSink::default());
    let bridge = bridge(FULL_BOOTSTRAP, false, sink.clone());

    let owner_slot = 4i64;
    let owner = object_handle(&owner_slot);
    bridge.instance_notification(owner, 13);

    let lua = bridge.runtime().lua().unwrap();
    let seen: i64 = lua.globals().get("last_notification").unwrap();
    assert_eq!(seen, 13);
}

#[test]
fn script_source_loaded_from_disk() {
    let _serial = exclusive();
    let sink = Arc::new(RecordingSink::default());
    let bridge = bridge(FULL_BOOTSTRAP, false, sink.clone());

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "class Saved extends Node").unwrap();
    let path = file.path().display().to_string();
    let source = std::fs::read_to_string(file.path()).unwrap();

    let result = bridge.script_init(str_handle(&path), str_handle(&source));
    assert_eq!(result.status, ScriptStatus::Ok);
    assert_eq!(result.manifest.name, "Saved");
    assert_eq!(result.manifest.base, "Node");
}
