// End-to-end: declaration input through the driver to rendered source.

use pybridge_codegen::config::{
    GenConfig, ModuleConfig, PathsConfig, ScanConfig, SettingsConfig, SmartPointerConfig,
};
use pybridge_codegen::generate_source;
use pybridge_codegen::schema::DeclarationsFile;

fn config(name: &str) -> GenConfig {
    GenConfig {
        module: ModuleConfig {
            name: name.into(),
            cpp_namespace: None,
            name_prefix: String::new(),
            strip_prefix: None,
            docstring: None,
        },
        paths: PathsConfig { declarations: "decls.json".into(), output: "module.cc".into() },
        settings: SettingsConfig::default(),
        scan: ScanConfig::default(),
        smart_pointers: Vec::new(),
    }
}

fn decls(json: &str) -> DeclarationsFile {
    serde_json::from_str(json).expect("test declaration JSON")
}

#[test]
fn refcounted_class_end_to_end() {
    let decls = decls(
        r#"{
            "classes": [{
                "name": "Node",
                "annotations": {"incref_method": "Ref", "decref_method": "Unref"},
                "constructors": [{"params": []}],
                "methods": [{"name": "detach"}]
            }]
        }"#,
    );
    let (source, summary) = generate_source(&config("graph"), &decls).unwrap();
    assert_eq!(summary.classes, 1);
    assert_eq!(summary.skipped, 0);
    assert!(summary.warnings.is_empty());

    // init wrapper allocates the native object and reports success
    assert!(source
        .contains("_wrap_PyNode__tp_init(PyNode *self, PyObject *args, PyObject *kwargs)"));
    assert!(source.contains("self->obj = new Node();"));
    // method wrapper invokes the method and returns a none-value
    assert!(source.contains("_wrap_PyNode_detach(PyNode *self)"));
    assert!(source.contains("self->obj->detach();"));
    assert!(source.contains("py_retval = Py_BuildValue(\"\");"));

    // method table: exactly one entry plus the sentinel terminator
    let table_start = source.find("static PyMethodDef PyNode_methods[] = {").unwrap();
    let table = &source[table_start..table_start + source[table_start..].find("};").unwrap()];
    assert_eq!(table.matches("(PyCFunction)").count(), 1);
    assert!(table.contains("{\"detach\", (PyCFunction) _wrap_PyNode_detach, METH_NOARGS, NULL },"));
    assert!(table.contains("{NULL, NULL, 0, NULL}"));

    // the destructor hook releases the native object before the wrapper
    let dealloc = source.find("_wrap_PyNode__tp_dealloc(PyNode *self)").unwrap();
    let unref = dealloc + source[dealloc..].find("self->obj->Unref();").unwrap();
    let del = dealloc + source[dealloc..].find("PyObject_DEL(self);").unwrap();
    assert!(unref < del);

    // type descriptor wired up and registered
    assert!(source.contains("PyTypeObject PyNode_Type = {"));
    assert!(source.contains("(initproc)_wrap_PyNode__tp_init,"));
    assert!(source.contains("PyType_Ready(&PyNode_Type)"));
    assert!(source.contains("PyModule_AddObject(m, \"Node\", (PyObject *) &PyNode_Type);"));
}

#[test]
fn overloads_dispatch_in_registration_order() {
    let decls = decls(
        r#"{
            "functions": [
                {"name": "zoo_visit", "params": [{"name": "index", "type": "int"}]},
                {"name": "zoo_visit", "params": [{"name": "label", "type": "std::string"}]}
            ]
        }"#,
    );
    let (source, summary) = generate_source(&config("zoo"), &decls).unwrap();
    assert_eq!(summary.functions, 1);

    // both candidates exist and are tried in registration order
    let first = source
        .find("retval = _wrap_zoo_visit__0(self, args, kwargs, &exceptions[0]);")
        .unwrap();
    let second = source
        .find("retval = _wrap_zoo_visit__1(self, args, kwargs, &exceptions[1]);")
        .unwrap();
    assert!(first < second);
    let int_delegate = source.find("_wrap_zoo_visit__0(").unwrap();
    let str_delegate = source.find("_wrap_zoo_visit__1(").unwrap();
    assert!(int_delegate < str_delegate);

    // no candidate matched: a "no matching overload" TypeError is raised
    assert!(source.contains("PyErr_SetObject(PyExc_TypeError, error_list);"));
    // the function table points at the dispatcher
    assert!(source.contains(
        "{\"visit\", (PyCFunction) _wrap_zoo_visit, METH_VARARGS|METH_KEYWORDS, NULL },"
    ));
}

#[test]
fn subclassable_class_generates_helper_and_virtual_proxy() {
    let decls = decls(
        r#"{
            "classes": [{
                "name": "Animal",
                "annotations": {"allow_subclassing": "true"},
                "constructors": [{"params": []}],
                "methods": [{"name": "speak", "is_virtual": true}]
            }]
        }"#,
    );
    let (source, _) = generate_source(&config("farm"), &decls).unwrap();

    assert!(source.contains("class PyAnimalHelper : public Animal"));
    assert!(source.contains("virtual void speak();"));
    assert!(source.contains("void\nPyAnimalHelper::speak()"));
    assert!(source.contains("if (!PyObject_HasAttrString(m_pyself, \"_speak\")) {"));
    // python overrides can chain to the native implementation
    assert!(source.contains("self->obj->Animal::speak();"));
    assert!(source.contains("{\"_speak\", (PyCFunction) _wrap_PyAnimal__parent_speak, METH_NOARGS, NULL },"));
    // subclassable instances carry an instance dict and GC allocation
    assert!(source.contains("PyObject *inst_dict;"));
}

#[test]
fn exceptions_register_and_throw_lists_translate() {
    let decls = decls(
        r#"{
            "exceptions": [{"name": "DomainError"}],
            "functions": [{
                "name": "zoo_risky",
                "return": "int",
                "throws": ["DomainError"]
            }]
        }"#,
    );
    let (source, summary) = generate_source(&config("zoo"), &decls).unwrap();
    assert_eq!(summary.exceptions, 1);

    assert!(source.contains("} catch (DomainError const &exc) {"));
    assert!(source.contains("PyErr_SetString((PyObject *) PyDomainError_Type, exc.what());"));
    assert!(source.contains(
        "(PyDomainError_Type = (PyTypeObject*) PyErr_NewException((char*)\"zoo.DomainError\", NULL, NULL)) == NULL"
    ));
}

#[test]
fn smart_pointer_returns_reduce_to_pointer_handling() {
    let mut config = config("net");
    config.smart_pointers.push(SmartPointerConfig { template: "boost::shared_ptr".into() });
    let decls = decls(
        r#"{
            "classes": [{
                "name": "Packet",
                "constructors": [{"params": []}]
            }],
            "functions": [{
                "name": "net_last_packet",
                "return": "boost::shared_ptr<Packet>",
                "return_annotations": {"caller_owns_return": "true"}
            }]
        }"#,
    );
    let (source, summary) = generate_source(&config, &decls).unwrap();
    assert_eq!(summary.skipped, 0);

    // the result slot keeps the smart-pointer type; the wrapper holds the
    // raw pointer recovered through the transformation's inverse glue
    assert!(source.contains("boost::shared_ptr<Packet> retval;"));
    assert!(source.contains("if (!(retval.get())) {"));
    assert!(source.contains("py_Packet->obj = retval.get();"));
}

#[test]
fn failed_callables_are_skipped_with_attributed_warnings() {
    let decls = decls(
        r#"{
            "functions": [
                {"name": "zoo_good", "return": "int"},
                {"name": "zoo_bad", "return": "int",
                 "params": [{"name": "blob", "type": "struct mystery*"}],
                 "location": {"file": "zoo.h", "line": 77}},
                {"name": "zoo_odd", "return": "int",
                 "annotations": {"frobnicate": "1"},
                 "location": {"file": "zoo.h", "line": 90}}
            ]
        }"#,
    );
    let (source, summary) = generate_source(&config("zoo"), &decls).unwrap();

    // the bad declaration is dropped, the rest of the run continues
    assert_eq!(summary.skipped, 1);
    assert!(source.contains("_wrap_zoo_good"));
    assert!(source.contains("_wrap_zoo_odd"));
    assert!(!source.contains("_wrap_zoo_bad"));

    let unknown_type = summary
        .warnings
        .iter()
        .find(|w| w.message.contains("zoo_bad"))
        .expect("warning for the failed function");
    assert_eq!(unknown_type.file.as_deref(), Some("zoo.h"));
    assert_eq!(unknown_type.line, Some(77));
    assert!(unknown_type.message.contains("struct mystery*"));

    let unknown_key = summary
        .warnings
        .iter()
        .find(|w| w.message.contains("frobnicate"))
        .expect("warning for the unknown annotation key");
    assert_eq!(unknown_key.line, Some(90));
}

#[test]
fn class_whose_constructor_fails_is_marked_unconstructable() {
    let decls = decls(
        r#"{
            "classes": [{
                "name": "Vault",
                "constructors": [{"params": [{"name": "key", "type": "struct opaque*"}]}],
                "methods": [{"name": "seal"}]
            }]
        }"#,
    );
    let (source, summary) = generate_source(&config("bank"), &decls).unwrap();
    assert_eq!(summary.skipped, 1);

    // the class survives with a TypeError-raising __init__ stub
    assert!(source.contains("PyErr_SetString(PyExc_TypeError, \"class 'Vault' cannot be constructed\");"));
    assert!(source.contains("_wrap_PyVault_seal"));
}

#[test]
fn run_generate_writes_the_output_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("decls.json"),
        r#"{"functions": [{"name": "zoo_close"}]}"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("pybridge.toml"),
        r#"
        [module]
        name = "zoo"

        [paths]
        declarations = "decls.json"
        output = "zoo-module.cc"
        "#,
    )
    .unwrap();

    let summary = pybridge_codegen::run_generate(&dir.path().join("pybridge.toml")).unwrap();
    assert_eq!(summary.functions, 1);
    let source = std::fs::read_to_string(dir.path().join("zoo-module.cc")).unwrap();
    assert!(source.contains("PyMODINIT_FUNC\ninitzoo(void)"));
    assert!(source.contains("{\"close\", (PyCFunction) _wrap_zoo_close, METH_NOARGS, NULL },"));
}
