// Method and constructor wrappers for wrapped C++ classes.

use std::rc::Rc;

use crate::error::{GenError, GenResult};
use crate::naming::mangle_name;
use crate::sink::CodeSink;
use crate::types::{ClassMeta, Parameter, ReturnValue};

use super::forward::{ForceParse, ForwardWrapper, NativeCall};
use super::{method_def_entry, ExceptionMeta, MethFlag};

/// Generates the wrapper for one class method. With `is_parent_caller`
/// set, the wrapper bypasses virtual dispatch and calls the class's own
/// implementation; it is exposed under a `_`-prefixed name so python
/// overrides can chain to the native behavior.
pub struct MethodWrapper {
    pub wrapper: ForwardWrapper,
    pub method_name: String,
    pub class: Rc<ClassMeta>,
    pub is_static: bool,
    pub is_virtual: bool,
    pub is_const: bool,
    pub is_parent_caller: bool,
    /// Set when a free function is folded in as a method: the wrapper
    /// calls this (possibly qualified) function with the owned instance
    /// pointer as its leading argument.
    pub call_target_function: Option<String>,
    /// Overrides the python-visible name.
    pub custom_python_name: Option<String>,
    pub docstring: Option<String>,
    pub throws: Vec<Rc<ExceptionMeta>>,
    pub wrapper_base_name: String,
    wrapper_actual_name: Option<String>,
}

impl MethodWrapper {
    pub fn new(
        class: &Rc<ClassMeta>,
        return_value: ReturnValue,
        method_name: &str,
        parameters: Vec<Parameter>,
    ) -> GenResult<MethodWrapper> {
        let wrapper =
            ForwardWrapper::new(Some(return_value), parameters, "return NULL;", "return NULL;")?;
        Ok(MethodWrapper {
            wrapper,
            method_name: method_name.to_string(),
            class: Rc::clone(class),
            is_static: false,
            is_virtual: false,
            is_const: false,
            is_parent_caller: false,
            call_target_function: None,
            custom_python_name: None,
            docstring: None,
            throws: Vec::new(),
            wrapper_base_name: format!(
                "_wrap_{}_{}",
                class.pystruct,
                mangle_name(method_name)
            ),
            wrapper_actual_name: None,
        })
    }

    /// Variant calling `Class::method` explicitly, for the `_name` entries
    /// of subclassable classes.
    pub fn new_parent_caller(
        class: &Rc<ClassMeta>,
        return_value: ReturnValue,
        method_name: &str,
        parameters: Vec<Parameter>,
    ) -> GenResult<MethodWrapper> {
        let mut method = MethodWrapper::new(class, return_value, method_name, parameters)?;
        method.is_parent_caller = true;
        method.wrapper_base_name =
            format!("_wrap_{}__parent_{}", class.pystruct, mangle_name(method_name));
        Ok(method)
    }

    pub fn wrapper_actual_name(&self) -> Option<&str> {
        self.wrapper_actual_name.as_deref()
    }

    /// The name this method gets in the python class namespace.
    pub fn python_name(&self) -> String {
        let base = self.custom_python_name.as_deref().unwrap_or(&self.method_name);
        if self.is_parent_caller {
            format!("_{base}")
        } else {
            base.to_string()
        }
    }

    fn all_flags(&self) -> Vec<MethFlag> {
        let mut flags = self.wrapper.meth_flags.clone();
        if self.is_static {
            flags.push(MethFlag::Static);
        }
        flags
    }

    pub fn generate(
        &mut self,
        sink: &mut CodeSink,
        wrapper_name: Option<&str>,
        extra_wrapper_params: &[&str],
    ) -> GenResult<()> {
        let mut body = CodeSink::new();
        let call = if let Some(function) = &self.call_target_function {
            self.wrapper.call_params.push("self->obj".to_string());
            NativeCall::Function { name: function.clone(), namespace: None }
        } else if self.is_parent_caller {
            NativeCall::ParentCall {
                class: Rc::clone(&self.class),
                method: self.method_name.clone(),
            }
        } else {
            NativeCall::Method {
                class: Rc::clone(&self.class),
                method: self.method_name.clone(),
                is_static: self.is_static,
            }
        };
        self.wrapper.generate_body(&mut body, &call, &self.throws)?;

        let actual = wrapper_name.unwrap_or(&self.wrapper_base_name).to_string();
        sink.writeln("static PyObject *");

        let self_arg = if self.is_static {
            format!("{} * PYBRIDGE_UNUSED(dummy)", self.class.pystruct)
        } else {
            format!("{} *self", self.class.pystruct)
        };
        let mut args = vec![self_arg];
        if self.wrapper.meth_flags.contains(&MethFlag::Varargs) {
            args.push("PyObject *args".to_string());
            if self.wrapper.meth_flags.contains(&MethFlag::Keywords) {
                args.push("PyObject *kwargs".to_string());
            }
        }
        args.extend(extra_wrapper_params.iter().map(|p| p.to_string()));
        sink.writeln(&format!("{actual}({})", args.join(", ")));
        sink.writeln("{");
        sink.indent();
        body.flush_to(sink);
        sink.unindent();
        sink.writeln("}");
        self.wrapper_actual_name = Some(actual);
        Ok(())
    }

    pub fn method_def(&self, py_name: &str) -> GenResult<String> {
        let wrapper_name = self.wrapper_actual_name.as_deref().ok_or_else(|| {
            GenError::TypeConfiguration(format!(
                "method def of {:?} requested before generation",
                self.method_name
            ))
        })?;
        Ok(method_def_entry(py_name, wrapper_name, &self.all_flags(), self.docstring.as_deref()))
    }
}

impl super::overload::OverloadCandidate for MethodWrapper {
    fn force_keyword_parsing(&mut self) {
        self.wrapper.force_parse = Some(ForceParse::TupleAndKeywords);
    }

    fn set_parse_error_return(&mut self, code: &str) {
        self.wrapper.set_parse_error_return(code);
    }

    fn generate(
        &mut self,
        sink: &mut CodeSink,
        wrapper_name: Option<&str>,
        extra_wrapper_params: &[&str],
    ) -> GenResult<()> {
        MethodWrapper::generate(self, sink, wrapper_name, extra_wrapper_params)
    }

    fn wrapper_base_name(&self) -> &str {
        &self.wrapper_base_name
    }

    fn wrapper_actual_name(&self) -> Option<&str> {
        self.wrapper_actual_name.as_deref()
    }

    fn meth_flags(&self) -> &[MethFlag] {
        &self.wrapper.meth_flags
    }

    fn method_def(&self, py_name: &str) -> GenResult<String> {
        MethodWrapper::method_def(self, py_name)
    }

    fn self_struct(&self) -> &str {
        &self.class.pystruct
    }
}

/// Generates the `__init__` wrapper allocating the native instance.
pub struct ConstructorWrapper {
    pub wrapper: ForwardWrapper,
    pub class: Rc<ClassMeta>,
    pub throws: Vec<Rc<ExceptionMeta>>,
    pub wrapper_base_name: String,
    wrapper_actual_name: Option<String>,
}

impl ConstructorWrapper {
    pub fn new(class: &Rc<ClassMeta>, parameters: Vec<Parameter>) -> GenResult<ConstructorWrapper> {
        let mut wrapper = ForwardWrapper::new(None, parameters, "return -1;", "return -1;")?;
        wrapper.force_parse = Some(ForceParse::TupleAndKeywords);
        Ok(ConstructorWrapper {
            wrapper,
            class: Rc::clone(class),
            throws: Vec::new(),
            wrapper_base_name: format!("_wrap_{}__tp_init", class.pystruct),
            wrapper_actual_name: None,
        })
    }

    pub fn wrapper_actual_name(&self) -> Option<&str> {
        self.wrapper_actual_name.as_deref()
    }

    pub fn generate(
        &mut self,
        sink: &mut CodeSink,
        wrapper_name: Option<&str>,
        extra_wrapper_params: &[&str],
    ) -> GenResult<()> {
        let mut body = CodeSink::new();
        let call = NativeCall::Constructor { class: Rc::clone(&self.class) };
        self.wrapper.generate_body(&mut body, &call, &self.throws)?;

        let actual = wrapper_name.unwrap_or(&self.wrapper_base_name).to_string();
        sink.writeln("static int");
        let mut args = vec![
            format!("{} *self", self.class.pystruct),
            "PyObject *args".to_string(),
            "PyObject *kwargs".to_string(),
        ];
        args.extend(extra_wrapper_params.iter().map(|p| p.to_string()));
        sink.writeln(&format!("{actual}({})", args.join(", ")));
        sink.writeln("{");
        sink.indent();
        body.flush_to(sink);
        sink.writeln("return 0;");
        sink.unindent();
        sink.writeln("}");
        self.wrapper_actual_name = Some(actual);
        Ok(())
    }
}

impl super::overload::OverloadCandidate for ConstructorWrapper {
    fn force_keyword_parsing(&mut self) {
        self.wrapper.force_parse = Some(ForceParse::TupleAndKeywords);
    }

    fn set_parse_error_return(&mut self, code: &str) {
        self.wrapper.set_parse_error_return(code);
    }

    fn generate(
        &mut self,
        sink: &mut CodeSink,
        wrapper_name: Option<&str>,
        extra_wrapper_params: &[&str],
    ) -> GenResult<()> {
        ConstructorWrapper::generate(self, sink, wrapper_name, extra_wrapper_params)
    }

    fn wrapper_base_name(&self) -> &str {
        &self.wrapper_base_name
    }

    fn wrapper_actual_name(&self) -> Option<&str> {
        self.wrapper_actual_name.as_deref()
    }

    fn meth_flags(&self) -> &[MethFlag] {
        &self.wrapper.meth_flags
    }

    fn method_def(&self, _py_name: &str) -> GenResult<String> {
        Err(GenError::TypeConfiguration(
            "constructors have no method-table entry".into(),
        ))
    }

    fn self_struct(&self) -> &str {
        &self.class.pystruct
    }
}

/// Emit the `__init__` stub used when a class has no usable constructor:
/// it raises `TypeError` unconditionally. Returns the wrapper name.
pub fn generate_no_constructor(class: &ClassMeta, sink: &mut CodeSink) -> String {
    let wrapper_name = format!("_wrap_{}__tp_init", class.pystruct);
    sink.writeln("static int");
    sink.writeln(&format!("{wrapper_name}(void)"));
    sink.writeln("{");
    sink.indent();
    sink.writeln(&format!(
        "PyErr_SetString(PyExc_TypeError, \"class '{}' cannot be constructed\");",
        class.name
    ));
    sink.writeln("return -1;");
    sink.unindent();
    sink.writeln("}");
    wrapper_name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tests_support::{plain_class, refcounted_class};
    use crate::types::TypeRegistry;

    #[test]
    fn method_wrapper_calls_through_the_owned_instance() {
        let class = plain_class("Zoo");
        let registry = TypeRegistry::with_default_codecs();
        let rv = ReturnValue::new(&registry, "void").unwrap();
        let mut method = MethodWrapper::new(&class, rv, "close", vec![]).unwrap();
        let mut sink = CodeSink::new();
        method.generate(&mut sink, None, &[]).unwrap();
        let code = sink.flush();

        assert!(code.contains("_wrap_PyZoo_close(PyZoo *self)"));
        assert!(code.contains("self->obj->close();"));
        assert_eq!(
            method.method_def("close").unwrap(),
            "{\"close\", (PyCFunction) _wrap_PyZoo_close, METH_NOARGS, NULL },"
        );
    }

    #[test]
    fn static_method_calls_the_class_and_flags_static() {
        let class = plain_class("Zoo");
        let registry = TypeRegistry::with_default_codecs();
        let rv = ReturnValue::new(&registry, "int").unwrap();
        let mut method = MethodWrapper::new(&class, rv, "instances", vec![]).unwrap();
        method.is_static = true;
        let mut sink = CodeSink::new();
        method.generate(&mut sink, None, &[]).unwrap();
        let code = sink.flush();

        assert!(code.contains("retval = Zoo::instances();"));
        assert!(method.method_def("instances").unwrap().contains("METH_STATIC"));
    }

    #[test]
    fn constructor_wrapper_allocates_and_returns_zero() {
        let class = refcounted_class("Node", "Ref", "Unref");
        let mut ctor = ConstructorWrapper::new(&class, vec![]).unwrap();
        let mut sink = CodeSink::new();
        ctor.generate(&mut sink, None, &[]).unwrap();
        let code = sink.flush();

        assert!(code.contains("static int"));
        assert!(code.contains("_wrap_PyNode__tp_init(PyNode *self, PyObject *args, PyObject *kwargs)"));
        assert!(code.contains("self->obj = new Node();"));
        assert!(code.trim_end().ends_with('}'));
        assert!(code.contains("return 0;"));
        // Constructors always parse with keyword support.
        assert!(code.contains("PyArg_ParseTupleAndKeywords(args, kwargs, \"\", (char **) keywords)"));
    }

    #[test]
    fn parent_caller_bypasses_virtual_dispatch() {
        let mut meta = crate::types::ClassMeta::new("Zoo", None, "");
        meta.allow_subclassing = true;
        let class = Rc::new(meta);
        let registry = TypeRegistry::with_default_codecs();
        let rv = ReturnValue::new(&registry, "void").unwrap();
        let mut method = MethodWrapper::new_parent_caller(&class, rv, "close", vec![]).unwrap();
        let mut sink = CodeSink::new();
        method.generate(&mut sink, None, &[]).unwrap();
        let code = sink.flush();

        assert!(code.contains("self->obj->Zoo::close();"));
        assert_eq!(method.python_name(), "_close");
    }
}
