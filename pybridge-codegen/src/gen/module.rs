// Module assembly: wrappers, tables, registrations, init function.

use std::rc::Rc;

use crate::block::CodeBlock;
use crate::error::GenResult;
use crate::scope::DeclarationsScope;
use crate::sink::CodeSink;

use super::class::ClassGen;
use super::function::FunctionWrapper;
use super::overload::OverloadSet;
use super::{escape_c_string, ExceptionMeta};

/// A wrapped C/C++ enum: its values become module-level int constants and
/// its type names parse/build as ints.
pub struct EnumGen {
    pub name: String,
    pub values: Vec<String>,
    pub values_prefix: String,
    pub cpp_namespace: Option<String>,
}

impl EnumGen {
    fn qualified_value(&self, module_namespace: Option<&str>, value: &str) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(ns) = module_namespace {
            if ns != "::" {
                parts.push(ns);
            }
        }
        if let Some(ns) = &self.cpp_namespace {
            parts.push(ns);
        }
        let prefixed = format!("{}{value}", self.values_prefix);
        if parts.is_empty() {
            prefixed
        } else {
            format!("{}::{prefixed}", parts.join("::"))
        }
    }
}

/// A wrapped exception type with an optional parent exception.
pub struct ExceptionGen {
    pub meta: Rc<ExceptionMeta>,
    pub parent: Option<Rc<ExceptionMeta>>,
    pub docstring: Option<String>,
}

/// Assembles one deployable extension-module source unit.
pub struct ModuleGen {
    pub name: String,
    pub cpp_namespace: Option<String>,
    pub docstring: Option<String>,
    /// `#include` lines for the wrapped declarations' headers.
    pub includes: Vec<String>,
    pub functions: Vec<(String, OverloadSet<FunctionWrapper>)>,
    pub classes: Vec<ClassGen>,
    pub enums: Vec<EnumGen>,
    pub exceptions: Vec<ExceptionGen>,
    declarations: DeclarationsScope,
    before_init: CodeBlock,
    after_init: CodeBlock,
}

impl ModuleGen {
    pub fn new(name: &str) -> Self {
        let before_init = CodeBlock::new("PyErr_Print();\nreturn;");
        let after_init = CodeBlock::with_predecessor("PyErr_Print();\nreturn;", &before_init);
        ModuleGen {
            name: name.to_string(),
            cpp_namespace: None,
            docstring: None,
            includes: Vec::new(),
            functions: Vec::new(),
            classes: Vec::new(),
            enums: Vec::new(),
            exceptions: Vec::new(),
            declarations: DeclarationsScope::new(),
            before_init,
            after_init,
        }
    }

    /// Add a function wrapper under its python-visible name; same-named
    /// functions form one overload set in insertion order.
    pub fn add_function(&mut self, py_name: &str, wrapper: FunctionWrapper) {
        if let Some((_, set)) = self.functions.iter_mut().find(|(name, _)| name == py_name) {
            set.add(wrapper);
        } else {
            let mut set = OverloadSet::new("PyObject *", "return NULL;");
            set.add(wrapper);
            self.functions.push((py_name.to_string(), set));
        }
    }

    pub fn add_class(&mut self, class: ClassGen) {
        self.classes.push(class);
    }

    pub fn add_enum(&mut self, decl: EnumGen) {
        self.enums.push(decl);
    }

    pub fn add_exception(&mut self, decl: ExceptionGen) {
        self.exceptions.push(decl);
    }

    /// Generate the complete source unit.
    pub fn generate(&mut self, sink: &mut CodeSink) -> GenResult<()> {
        self.generate_prologue(sink);

        let m = self.declarations.declare_variable("PyObject*", "m", None, None)?;
        let functions_table = format!("{}_functions", self.name);
        let docstring = match &self.docstring {
            Some(doc) => format!("\"{}\"", escape_c_string(doc)),
            None => "NULL".to_string(),
        };
        self.before_init.write_code(&format!(
            "{m} = Py_InitModule3(\"{}\", {functions_table}, {docstring});",
            self.name
        ));
        self.before_init.write_error_check(&format!("{m} == NULL"), None);

        // forward declarations: every wrapper may reference any wrapped
        // class or exception, regardless of emission order
        for class in &self.classes {
            class.generate_forward_declarations(sink);
        }
        for exception in &self.exceptions {
            sink.writeln(&format!("extern PyTypeObject *{};", exception.meta.pytypestruct));
        }
        if !self.exceptions.is_empty() {
            sink.blank();
        }

        // function wrappers and the module function table
        for (_, set) in &mut self.functions {
            sink.blank();
            set.generate(sink)?;
            sink.blank();
        }
        sink.writeln(&format!("static PyMethodDef {functions_table}[] = {{"));
        sink.indent();
        for (py_name, set) in &self.functions {
            sink.writeln(&set.method_def(py_name)?);
        }
        sink.writeln("{NULL, NULL, 0, NULL}");
        sink.unindent();
        sink.writeln("};");

        // classes
        for class in &mut self.classes {
            sink.blank();
            class.generate(sink)?;
            sink.blank();
            let pytypestruct = &class.meta.pytypestruct;
            self.after_init
                .write_error_check(&format!("PyType_Ready(&{pytypestruct})"), None);
            self.after_init.write_code(&format!(
                "PyModule_AddObject({m}, \"{}\", (PyObject *) &{pytypestruct});",
                class.meta.name
            ));
            if class.meta.automatic_type_narrowing {
                self.after_init.write_code(&format!(
                    "{}.register_wrapper(typeid({}), &{pytypestruct});",
                    class.meta.typeid_map_name(),
                    class.meta.full_name
                ));
            }
        }

        // exceptions
        for exception in &self.exceptions {
            let pytypestruct = &exception.meta.pytypestruct;
            sink.writeln(&format!("PyTypeObject *{pytypestruct};"));
            let parent = match &exception.parent {
                Some(parent) => format!("(PyObject*) {}", parent.pytypestruct),
                None => "NULL".to_string(),
            };
            self.after_init
                .write_code(&format!("/* Register the '{}' exception */", exception.meta.full_name));
            self.after_init.write_error_check(
                &format!(
                    "({pytypestruct} = (PyTypeObject*) PyErr_NewException((char*)\"{}.{}\", {parent}, NULL)) == NULL",
                    self.name, exception.meta.python_name
                ),
                None,
            );
            if let Some(doc) = &exception.docstring {
                self.after_init.write_code(&format!(
                    "{pytypestruct}->tp_doc = (char*)\"{}\";",
                    escape_c_string(doc)
                ));
            }
            self.after_init.write_code(&format!(
                "Py_INCREF((PyObject *) {pytypestruct});\n\
                 PyModule_AddObject({m}, (char *) \"{}\", (PyObject *) {pytypestruct});",
                exception.meta.python_name
            ));
        }

        // enum values become int constants
        for decl in &self.enums {
            for value in &decl.values {
                self.after_init.write_code(&format!(
                    "PyModule_AddIntConstant({m}, \"{value}\", {});",
                    decl.qualified_value(self.cpp_namespace.as_deref(), value)
                ));
            }
        }

        // module init function
        sink.blank();
        sink.writeln("PyMODINIT_FUNC");
        sink.writeln(&format!("init{}(void)", self.name));
        sink.writeln("{");
        sink.indent();
        self.declarations.flush_to(sink);
        self.before_init.sink.flush_to(sink);
        self.after_init.write_cleanup();
        self.after_init.sink.flush_to(sink);
        sink.unindent();
        sink.writeln("}");
        Ok(())
    }

    fn generate_prologue(&self, sink: &mut CodeSink) {
        sink.writeln("#include <Python.h>");
        sink.writeln("#include <string>");
        for include in &self.includes {
            sink.writeln(&format!("#include {include}"));
        }
        sink.blank();
        sink.writeln(
            "#if defined(__GNUC__)\n\
             # define PYBRIDGE_UNUSED(param) param __attribute__((unused))\n\
             #else\n\
             # define PYBRIDGE_UNUSED(param) param\n\
             #endif",
        );
        sink.blank();
        if self.classes.iter().any(|c| c.meta.automatic_type_narrowing) {
            sink.writeln(
                "#include <map>\n\
                 #include <typeinfo>\n\
                 \n\
                 namespace pybridge {\n\
                 \n\
                 class TypeMap\n\
                 {\n\
                 \x20   std::map<const char *, PyTypeObject *> m_map;\n\
                 \n\
                 public:\n\
                 \n\
                 \x20   void register_wrapper(const std::type_info &cpp_type_info, PyTypeObject *python_wrapper)\n\
                 \x20   {\n\
                 \x20       m_map[cpp_type_info.name()] = python_wrapper;\n\
                 \x20   }\n\
                 \n\
                 \x20   PyTypeObject *lookup_wrapper(const std::type_info &cpp_type_info, PyTypeObject *fallback_wrapper)\n\
                 \x20   {\n\
                 \x20       PyTypeObject *type = m_map[cpp_type_info.name()];\n\
                 \x20       return type ? type : fallback_wrapper;\n\
                 \x20   }\n\
                 };\n\
                 \n\
                 }",
            );
            sink.blank();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, Parameter, ReturnValue, TypeRegistry};

    #[test]
    fn module_renders_table_and_init_function() {
        let registry = TypeRegistry::with_default_codecs();
        let rv = ReturnValue::new(&registry, "int").unwrap();
        let params =
            vec![Parameter::new(&registry, "int", "x", Direction::In, false).unwrap()];
        let func = FunctionWrapper::new(rv, "zoo_count", params, "zoo_").unwrap();

        let mut module = ModuleGen::new("zoo");
        module.add_function("count", func);
        module.add_enum(EnumGen {
            name: "Mood".into(),
            values: vec!["HAPPY".into(), "SLEEPY".into()],
            values_prefix: String::new(),
            cpp_namespace: None,
        });

        let mut sink = CodeSink::new();
        module.generate(&mut sink).unwrap();
        let code = sink.flush();

        assert!(code.starts_with("#include <Python.h>"));
        assert!(code.contains("static PyMethodDef zoo_functions[] = {"));
        assert!(code.contains("{\"count\", (PyCFunction) _wrap_zoo_zoo_count, METH_VARARGS|METH_KEYWORDS, NULL },"));
        assert!(code.contains("PyMODINIT_FUNC\ninitzoo(void)\n{"));
        assert!(code.contains("m = Py_InitModule3(\"zoo\", zoo_functions, NULL);"));
        assert!(code.contains("if (m == NULL) {"));
        assert!(code.contains("PyModule_AddIntConstant(m, \"HAPPY\", HAPPY);"));
    }

    #[test]
    fn exceptions_register_with_parent_links() {
        let mut module = ModuleGen::new("zoo");
        let base = Rc::new(ExceptionMeta::new("ZooError", None, ""));
        let derived = Rc::new(ExceptionMeta::new("FeedingError", None, ""));
        module.add_exception(ExceptionGen { meta: Rc::clone(&base), parent: None, docstring: None });
        module.add_exception(ExceptionGen {
            meta: derived,
            parent: Some(base),
            docstring: None,
        });

        let mut sink = CodeSink::new();
        module.generate(&mut sink).unwrap();
        let code = sink.flush();

        assert!(code.contains("PyTypeObject *PyZooError_Type;"));
        assert!(code.contains(
            "(PyZooError_Type = (PyTypeObject*) PyErr_NewException((char*)\"zoo.ZooError\", NULL, NULL)) == NULL"
        ));
        assert!(code.contains(
            "(PyFeedingError_Type = (PyTypeObject*) PyErr_NewException((char*)\"zoo.FeedingError\", (PyObject*) PyZooError_Type, NULL)) == NULL"
        ));
        assert!(code.contains("PyModule_AddObject(m, (char *) \"FeedingError\", (PyObject *) PyFeedingError_Type);"));
    }
}
