// Class assembly: instance struct, helper class, tables, type object.

use std::rc::Rc;

use crate::error::GenResult;
use crate::sink::CodeSink;
use crate::types::ClassMeta;

use super::method::{generate_no_constructor, ConstructorWrapper, MethodWrapper};
use super::overload::OverloadSet;
use super::reverse::VirtualProxyWrapper;
use super::escape_c_string;

/// Aggregates every generated artifact of one wrapped class.
pub struct ClassGen {
    pub meta: Rc<ClassMeta>,
    pub constructors: Option<OverloadSet<ConstructorWrapper>>,
    pub methods: Vec<(String, OverloadSet<MethodWrapper>)>,
    pub virtual_proxies: Vec<VirtualProxyWrapper>,
    /// Set when constructor generation failed; the class then gets an
    /// `__init__` stub raising `TypeError` instead of aborting the run.
    pub cannot_construct: bool,
    tp_init_name: Option<String>,
}

impl ClassGen {
    pub fn new(meta: Rc<ClassMeta>) -> Self {
        ClassGen {
            meta,
            constructors: None,
            methods: Vec::new(),
            virtual_proxies: Vec::new(),
            cannot_construct: false,
            tp_init_name: None,
        }
    }

    /// Add a method wrapper, grouping same-named methods into one
    /// overload set in insertion order.
    pub fn add_method(&mut self, wrapper: MethodWrapper) {
        let py_name = wrapper.python_name();
        if let Some((_, set)) = self.methods.iter_mut().find(|(name, _)| *name == py_name) {
            set.add(wrapper);
        } else {
            let mut set = OverloadSet::new("PyObject *", "return NULL;");
            set.add(wrapper);
            self.methods.push((py_name, set));
        }
    }

    pub fn add_constructor(&mut self, wrapper: ConstructorWrapper) {
        self.constructors
            .get_or_insert_with(|| OverloadSet::new("int", "return -1;"))
            .add(wrapper);
    }

    pub fn add_virtual_proxy(&mut self, proxy: VirtualProxyWrapper) {
        self.virtual_proxies.push(proxy);
    }

    pub fn methods_table_name(&self) -> String {
        format!("{}_methods", self.meta.pystruct)
    }

    fn dealloc_name(&self) -> String {
        format!("_wrap_{}__tp_dealloc", self.meta.pystruct)
    }

    /// Emit the declarations every other wrapper may reference: the
    /// instance struct, the type object, and the narrowing map. Rendered
    /// ahead of all wrapper code in the source unit.
    pub fn generate_forward_declarations(&self, sink: &mut CodeSink) {
        self.generate_instance_struct(sink);
        sink.writeln(&format!("extern PyTypeObject {};", self.meta.pytypestruct));
        if self.meta.automatic_type_narrowing {
            sink.writeln(&format!("extern pybridge::TypeMap {};", self.meta.typeid_map_name()));
        }
        sink.blank();
    }

    /// Generate everything for the class into `sink`.
    pub fn generate(&mut self, sink: &mut CodeSink) -> GenResult<()> {
        if self.meta.automatic_type_narrowing {
            sink.writeln(&format!("pybridge::TypeMap {};", self.meta.typeid_map_name()));
            sink.blank();
        }
        if self.meta.allow_subclassing {
            self.generate_helper_class(sink)?;
        }

        // constructor
        if self.cannot_construct || self.constructors.as_ref().map_or(true, |c| c.is_empty()) {
            sink.blank();
            self.tp_init_name = Some(generate_no_constructor(&self.meta, sink));
            sink.blank();
        } else if let Some(constructors) = &mut self.constructors {
            sink.blank();
            constructors.generate(sink)?;
            sink.blank();
            self.tp_init_name = constructors.wrapper_function_name().map(|n| n.to_string());
        }

        // methods
        for (_, set) in &mut self.methods {
            sink.blank();
            set.generate(sink)?;
            sink.blank();
        }

        // method table
        sink.writeln(&format!("static PyMethodDef {}[] = {{", self.methods_table_name()));
        sink.indent();
        for (py_name, set) in &self.methods {
            sink.writeln(&set.method_def(py_name)?);
        }
        sink.writeln("{NULL, NULL, 0, NULL}");
        sink.unindent();
        sink.writeln("};");

        self.generate_dealloc(sink);
        self.generate_type_object(sink);
        Ok(())
    }

    fn generate_instance_struct(&self, sink: &mut CodeSink) {
        sink.blank();
        sink.writeln("typedef struct {");
        sink.indent();
        sink.writeln("PyObject_HEAD");
        sink.writeln(&format!("{} *obj;", self.meta.full_name));
        if self.meta.allow_subclassing {
            sink.writeln("PyObject *inst_dict;");
        }
        sink.unindent();
        sink.writeln(&format!("}} {};", self.meta.pystruct));
        sink.blank();
    }

    fn generate_helper_class(&mut self, sink: &mut CodeSink) -> GenResult<()> {
        let helper = self.meta.helper_class_name().expect("subclassable class");
        let full = &self.meta.full_name;
        sink.writeln(&format!("class {helper} : public {full}"));
        sink.writeln("{");
        sink.writeln("public:");
        sink.indent();
        sink.writeln("PyObject *m_pyself = NULL;");
        sink.blank();
        sink.writeln(&format!("using {full}::{};", self.meta.name));
        sink.blank();
        sink.writeln(
            "void set_pyobj(PyObject *pyobj)\n\
             {\n\
             \x20   Py_XDECREF(m_pyself);\n\
             \x20   Py_INCREF(pyobj);\n\
             \x20   m_pyself = pyobj;\n\
             }",
        );
        sink.blank();
        sink.writeln(&format!(
            "virtual ~{helper}()\n\
             {{\n\
             \x20   Py_CLEAR(m_pyself);\n\
             }}"
        ));
        if !self.virtual_proxies.is_empty() {
            sink.blank();
            for proxy in &self.virtual_proxies {
                proxy.generate_declaration(sink);
            }
        }
        sink.unindent();
        sink.writeln("};");
        sink.blank();
        for proxy in &mut self.virtual_proxies {
            proxy.generate(sink)?;
            sink.blank();
        }
        Ok(())
    }

    fn generate_dealloc(&self, sink: &mut CodeSink) {
        sink.blank();
        sink.writeln("static void");
        sink.writeln(&format!("{}({} *self)", self.dealloc_name(), self.meta.pystruct));
        sink.writeln("{");
        sink.indent();
        if !self.meta.is_singleton {
            if let Some(destroy) = self.meta.memory_policy.destroy_statement("self->obj") {
                sink.writeln(&destroy);
            }
        }
        sink.writeln("self->obj = NULL;");
        sink.writeln("PyObject_DEL(self);");
        sink.unindent();
        sink.writeln("}");
        sink.blank();
    }

    fn generate_type_object(&self, sink: &mut CodeSink) {
        let meta = &self.meta;
        let tp_doc = match &meta.docstring {
            Some(doc) => format!("\"{}\"", escape_c_string(doc)),
            None => "NULL".to_string(),
        };
        let tp_flags = if meta.allow_subclassing {
            "Py_TPFLAGS_DEFAULT|Py_TPFLAGS_BASETYPE"
        } else {
            "Py_TPFLAGS_DEFAULT"
        };
        let tp_init = self.tp_init_name.as_deref().unwrap_or("NULL");
        sink.blank();
        sink.writeln(&format!("PyTypeObject {} = {{", meta.pytypestruct));
        sink.indent();
        sink.writeln("PyObject_HEAD_INIT(NULL)");
        sink.writeln("0,                                 /* ob_size */");
        sink.writeln(&format!("\"{}\",{:<20} /* tp_name */", meta.name, ""));
        sink.writeln(&format!("sizeof({}),{:<12} /* tp_basicsize */", meta.pystruct, ""));
        sink.writeln("0,                                 /* tp_itemsize */");
        sink.writeln("/* methods */");
        sink.writeln(&format!("(destructor){},        /* tp_dealloc */", self.dealloc_name()));
        sink.writeln("(printfunc)0,                      /* tp_print */");
        sink.writeln("(getattrfunc)NULL,                 /* tp_getattr */");
        sink.writeln("(setattrfunc)NULL,                 /* tp_setattr */");
        sink.writeln("(cmpfunc)NULL,                     /* tp_compare */");
        sink.writeln("(reprfunc)NULL,                    /* tp_repr */");
        sink.writeln("(PyNumberMethods*)NULL,            /* tp_as_number */");
        sink.writeln("(PySequenceMethods*)NULL,          /* tp_as_sequence */");
        sink.writeln("(PyMappingMethods*)NULL,           /* tp_as_mapping */");
        sink.writeln("(hashfunc)NULL,                    /* tp_hash */");
        sink.writeln("(ternaryfunc)NULL,                 /* tp_call */");
        sink.writeln("(reprfunc)NULL,                    /* tp_str */");
        sink.writeln("(getattrofunc)NULL,                /* tp_getattro */");
        sink.writeln("(setattrofunc)NULL,                /* tp_setattro */");
        sink.writeln("(PyBufferProcs*)NULL,              /* tp_as_buffer */");
        sink.writeln(&format!("{tp_flags},            /* tp_flags */"));
        sink.writeln(&format!("{tp_doc},                        /* Documentation string */"));
        sink.writeln("(traverseproc)NULL,                /* tp_traverse */");
        sink.writeln("(inquiry)NULL,                     /* tp_clear */");
        sink.writeln("(richcmpfunc)NULL,                 /* tp_richcompare */");
        sink.writeln("0,                                 /* tp_weaklistoffset */");
        sink.writeln("(getiterfunc)NULL,                 /* tp_iter */");
        sink.writeln("(iternextfunc)NULL,                /* tp_iternext */");
        sink.writeln(&format!(
            "(struct PyMethodDef*){}, /* tp_methods */",
            self.methods_table_name()
        ));
        sink.writeln("(struct PyMemberDef*)0,              /* tp_members */");
        sink.writeln("(struct PyGetSetDef*)NULL,         /* tp_getset */");
        sink.writeln("NULL,                              /* tp_base */");
        sink.writeln("NULL,                              /* tp_dict */");
        sink.writeln("(descrgetfunc)NULL,                /* tp_descr_get */");
        sink.writeln("(descrsetfunc)NULL,                /* tp_descr_set */");
        sink.writeln("0,                                 /* tp_dictoffset */");
        sink.writeln(&format!("(initproc){tp_init},             /* tp_init */"));
        sink.writeln("(allocfunc)NULL,                   /* tp_alloc */");
        sink.writeln("(newfunc)NULL,                     /* tp_new */");
        sink.writeln("(freefunc)NULL,                    /* tp_free */");
        sink.writeln("(inquiry)NULL                      /* tp_is_gc */");
        sink.unindent();
        sink.writeln("};");
        sink.blank();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tests_support::refcounted_class;
    use crate::types::{ReturnValue, TypeRegistry};

    #[test]
    fn refcounted_class_generates_table_dealloc_and_type_object() {
        let class = refcounted_class("Node", "Ref", "Unref");
        let registry = TypeRegistry::with_default_codecs();
        let mut r#gen = ClassGen::new(Rc::clone(&class));
        r#gen.add_constructor(ConstructorWrapper::new(&class, vec![]).unwrap());
        let rv = ReturnValue::new(&registry, "void").unwrap();
        r#gen.add_method(MethodWrapper::new(&class, rv, "detach", vec![]).unwrap());

        let mut sink = CodeSink::new();
        r#gen.generate_forward_declarations(&mut sink);
        r#gen.generate(&mut sink).unwrap();
        let code = sink.flush();

        assert!(code.contains("typedef struct {\n    PyObject_HEAD\n    Node *obj;\n} PyNode;"));
        assert!(code.contains("extern PyTypeObject PyNode_Type;"));
        // exactly one method entry plus the sentinel
        let table_pos = code.find("static PyMethodDef PyNode_methods[] = {").unwrap();
        let table = &code[table_pos..code[table_pos..].find("};").unwrap() + table_pos];
        assert!(table.contains("{\"detach\", (PyCFunction) _wrap_PyNode_detach, METH_NOARGS, NULL },"));
        assert!(table.contains("{NULL, NULL, 0, NULL}"));
        // the destructor releases the native object before the wrapper
        let dealloc_pos = code.find("_wrap_PyNode__tp_dealloc(PyNode *self)").unwrap();
        let unref_pos = code[dealloc_pos..].find("self->obj->Unref();").unwrap();
        let del_pos = code[dealloc_pos..].find("PyObject_DEL(self);").unwrap();
        assert!(unref_pos < del_pos);
        assert!(code.contains("(initproc)_wrap_PyNode__tp_init,"));
        assert!(code.contains("PyTypeObject PyNode_Type = {"));
    }

    #[test]
    fn class_without_constructor_gets_the_type_error_stub() {
        let class = refcounted_class("Node", "Ref", "Unref");
        let mut r#gen = ClassGen::new(Rc::clone(&class));
        r#gen.cannot_construct = true;
        let mut sink = CodeSink::new();
        r#gen.generate(&mut sink).unwrap();
        let code = sink.flush();
        assert!(code.contains("PyErr_SetString(PyExc_TypeError, \"class 'Node' cannot be constructed\");"));
    }
}
