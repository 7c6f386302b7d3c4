// Module-level function wrappers.

use std::rc::Rc;

use crate::error::{GenError, GenResult};
use crate::sink::CodeSink;
use crate::types::{Parameter, ReturnValue};

use super::forward::{ForceParse, ForwardWrapper, NativeCall};
use super::{method_def_entry, ExceptionMeta, MethFlag};

/// Generates the wrapper for one C/C++ free function.
pub struct FunctionWrapper {
    pub wrapper: ForwardWrapper,
    pub function_name: String,
    pub cpp_namespace: Option<String>,
    pub docstring: Option<String>,
    pub throws: Vec<Rc<ExceptionMeta>>,
    pub wrapper_base_name: String,
    wrapper_actual_name: Option<String>,
}

impl FunctionWrapper {
    pub fn new(
        return_value: ReturnValue,
        function_name: &str,
        parameters: Vec<Parameter>,
        name_prefix: &str,
    ) -> GenResult<FunctionWrapper> {
        let wrapper =
            ForwardWrapper::new(Some(return_value), parameters, "return NULL;", "return NULL;")?;
        Ok(FunctionWrapper {
            wrapper,
            function_name: function_name.to_string(),
            cpp_namespace: None,
            docstring: None,
            throws: Vec::new(),
            wrapper_base_name: format!("_wrap_{name_prefix}{function_name}"),
            wrapper_actual_name: None,
        })
    }

    pub fn wrapper_actual_name(&self) -> Option<&str> {
        self.wrapper_actual_name.as_deref()
    }

    /// Generate the complete wrapper function.
    pub fn generate(
        &mut self,
        sink: &mut CodeSink,
        wrapper_name: Option<&str>,
        extra_wrapper_params: &[&str],
    ) -> GenResult<()> {
        let mut body = CodeSink::new();
        let call = NativeCall::Function {
            name: self.function_name.clone(),
            namespace: self.cpp_namespace.clone(),
        };
        self.wrapper.generate_body(&mut body, &call, &self.throws)?;

        let actual = wrapper_name.unwrap_or(&self.wrapper_base_name).to_string();
        sink.writeln("static PyObject *");

        let mut args: Vec<String> = Vec::new();
        if self.wrapper.meth_flags.contains(&MethFlag::Varargs) {
            args.push("PyObject * PYBRIDGE_UNUSED(dummy)".to_string());
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

    /// The method-table entry; valid only after generation.
    pub fn method_def(&self, py_name: &str) -> GenResult<String> {
        let wrapper_name = self.wrapper_actual_name.as_deref().ok_or_else(|| {
            GenError::TypeConfiguration(format!(
                "method def of {:?} requested before generation",
                self.function_name
            ))
        })?;
        Ok(method_def_entry(
            py_name,
            wrapper_name,
            &self.wrapper.meth_flags,
            self.docstring.as_deref(),
        ))
    }
}

impl super::overload::OverloadCandidate for FunctionWrapper {
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
        FunctionWrapper::generate(self, sink, wrapper_name, extra_wrapper_params)
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
        FunctionWrapper::method_def(self, py_name)
    }

    fn self_struct(&self) -> &str {
        "PyObject"
    }
}
