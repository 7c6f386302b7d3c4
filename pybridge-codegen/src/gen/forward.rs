// Forward wrappers: the dynamic side calling into native code.

use std::rc::Rc;

use crate::block::CodeBlock;
use crate::error::{GenError, GenResult};
use crate::marshal::{BuildValueParams, ParseTupleParams};
use crate::scope::DeclarationsScope;
use crate::sink::CodeSink;
use crate::types::{ClassMeta, ForwardCtx, ParamCodec, Parameter, ReturnValue};

use super::{ExceptionMeta, MethFlag};

/// Forces argument parsing even when the wrapper takes no arguments, or
/// forces the keyword-capable convention regardless of parameter names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceParse {
    TupleAndKeywords,
}

/// The native call a forward wrapper dispatches to.
pub enum NativeCall {
    /// A free function, optionally namespace-qualified.
    Function { name: String, namespace: Option<String> },
    /// A member call through the wrapper's owned instance, or a static
    /// member call on the class.
    Method { class: Rc<ClassMeta>, method: String, is_static: bool },
    /// An explicit call to the parent-class implementation of a virtual
    /// method, bypassing the override dispatch.
    ParentCall { class: Rc<ClassMeta>, method: String },
    /// Instance construction into the wrapper's owned slot.
    Constructor { class: Rc<ClassMeta> },
}

impl NativeCall {
    fn name(&self) -> String {
        match self {
            NativeCall::Function { name, .. } => name.clone(),
            NativeCall::Method { class, method, .. }
            | NativeCall::ParentCall { class, method } => {
                format!("{}::{method}", class.full_name)
            }
            NativeCall::Constructor { class } => class.full_name.clone(),
        }
    }
}

/// Generator for one wrapper called by the dynamic runtime.
///
/// The body is produced in a fixed order: pre-declared result slots,
/// per-parameter unpacking, optional thread-lock release, the native call,
/// calling-convention derivation, result packing, cleanup and return.
/// Statement blocks buffer their code, so the rendered function always
/// reads declarations → parse → call → pack regardless of hook order.
pub struct ForwardWrapper {
    pub return_value: Option<ReturnValue>,
    pub parameters: Vec<Parameter>,
    pub declarations: DeclarationsScope,
    pub before_parse: CodeBlock,
    pub before_call: CodeBlock,
    pub after_call: CodeBlock,
    pub parse_params: ParseTupleParams,
    pub build_params: BuildValueParams,
    pub call_params: Vec<String>,
    pub meth_flags: Vec<MethFlag>,
    pub force_parse: Option<ForceParse>,
    pub no_c_retval: bool,
    pub unblock_threads: bool,
    parse_error_return: String,
    error_return: String,
}

impl ForwardWrapper {
    pub fn new(
        return_value: Option<ReturnValue>,
        parameters: Vec<Parameter>,
        parse_error_return: &str,
        error_return: &str,
    ) -> GenResult<ForwardWrapper> {
        let before_parse = CodeBlock::new(parse_error_return);
        let before_call = CodeBlock::with_predecessor(parse_error_return, &before_parse);
        let after_call = CodeBlock::with_predecessor(error_return, &before_call);
        let mut wrapper = ForwardWrapper {
            return_value,
            parameters,
            declarations: DeclarationsScope::new(),
            before_parse,
            before_call,
            after_call,
            parse_params: ParseTupleParams::new(),
            build_params: BuildValueParams::new(),
            call_params: Vec::new(),
            meth_flags: Vec::new(),
            force_parse: None,
            no_c_retval: false,
            unblock_threads: false,
            parse_error_return: parse_error_return.to_string(),
            error_return: error_return.to_string(),
        };
        wrapper.declare_result_slots()?;
        Ok(wrapper)
    }

    fn declare_result_slots(&mut self) -> GenResult<()> {
        if let Some(rv) = &self.return_value {
            self.declarations.declare_variable("PyObject*", "py_retval", None, None)?;
            if !rv.is_void() && !self.no_c_retval && !rv.requires_assignment_constructor() {
                self.declarations.declare_variable(&rv.ctype, "retval", None, None)?;
            }
        }
        Ok(())
    }

    /// Replace the statement used when argument parsing fails. The overload
    /// dispatcher uses this to capture parse errors instead of raising them.
    pub fn set_parse_error_return(&mut self, code: &str) {
        self.parse_error_return = code.to_string();
        self.before_parse.set_error_return(code);
        self.before_call.set_error_return(code);
    }

    /// Reset all buffered state so the body can be generated again.
    pub fn reset_code_generation_state(&mut self) -> GenResult<()> {
        self.declarations.clear();
        self.before_parse.clear();
        self.before_call.clear();
        self.after_call.clear();
        self.parse_params.clear();
        self.build_params.clear();
        self.call_params.clear();
        self.meth_flags.clear();
        self.declare_result_slots()
    }

    /// A fresh wrapper over clones of this one's descriptors, for building
    /// signature variants without disturbing generated state.
    pub fn clone_fresh(&self) -> GenResult<ForwardWrapper> {
        let mut wrapper = ForwardWrapper::new(
            self.return_value.clone(),
            self.parameters.clone(),
            &self.parse_error_return,
            &self.error_return,
        )?;
        wrapper.force_parse = self.force_parse;
        wrapper.unblock_threads = self.unblock_threads;
        Ok(wrapper)
    }

    fn ctx(&mut self) -> ForwardCtx<'_> {
        ForwardCtx {
            declarations: &mut self.declarations,
            before_parse: &mut self.before_parse,
            before_call: &mut self.before_call,
            after_call: &mut self.after_call,
            parse_params: &mut self.parse_params,
            build_params: &mut self.build_params,
            call_params: &mut self.call_params,
        }
    }

    /// Generate the wrapper body into `sink`.
    pub fn generate_body(
        &mut self,
        sink: &mut CodeSink,
        call: &NativeCall,
        throws: &[Rc<ExceptionMeta>],
    ) -> GenResult<()> {
        // The lock-release pair brackets the native call. The restore is
        // the first statement of the after-call block, so every error
        // exit emitted later in that block reacquires the lock first.
        let mut thread_state = None;
        if self.unblock_threads {
            let var = self.declarations.declare_variable(
                "PyThreadState*",
                "py_thread_state",
                Some("NULL"),
                None,
            )?;
            self.after_call
                .write_code(&format!("if ({var})\n    PyEval_RestoreThread({var});"));
            thread_state = Some(var);
        }

        let mut parameters = std::mem::take(&mut self.parameters);
        let mut converted = Ok(());
        for param in &mut parameters {
            if let Err(err) = param.convert_script_to_native(&mut self.ctx()) {
                converted = Err(err);
                break;
            }
        }
        self.parameters = parameters;
        converted?;

        if let Some(var) = &thread_state {
            self.before_call.write_code(&format!(
                "if (PyEval_ThreadsInitialized())\n    {var} = PyEval_SaveThread();"
            ));
        }

        self.emit_call(call, throws);
        self.emit_parse_arguments()?;

        match self.return_value.take() {
            None => {
                if !self.build_params.is_empty() {
                    return Err(GenError::UnexpectedReturnValues(call.name()));
                }
                self.implement_custodians(call)?;
                self.after_call.write_cleanup();
            }
            Some(mut rv) => {
                rv.convert_native_to_script(&mut self.ctx())?;
                self.return_value = Some(rv);
                self.implement_custodians(call)?;
                let params = self.build_params.get_parameters();
                self.after_call
                    .write_code(&format!("py_retval = Py_BuildValue({});", params.join(", ")));
                // Entries now own what they carried; suppress the releases.
                for handle in self.build_params.take_cleanup_cancels() {
                    handle.cancel();
                }
                self.after_call.write_cleanup();
                self.after_call.write_code("return py_retval;");
            }
        }

        self.declarations.flush_to(sink);
        sink.blank();
        self.before_parse.sink.flush_to(sink);
        self.before_call.sink.flush_to(sink);
        self.after_call.sink.flush_to(sink);
        Ok(())
    }

    fn emit_call(&mut self, call: &NativeCall, throws: &[Rc<ExceptionMeta>]) {
        let args = self.call_params.join(", ");
        let (statement, epilogue) = match call {
            NativeCall::Function { name, namespace } => {
                let namespace = match namespace {
                    Some(ns) => format!("{ns}::"),
                    None => String::new(),
                };
                (self.call_statement(&format!("{namespace}{name}"), &args), None)
            }
            NativeCall::Method { class, method, is_static } => {
                let target = if *is_static {
                    format!("{}::{method}", class.full_name)
                } else {
                    format!("self->obj->{method}")
                };
                (self.call_statement(&target, &args), None)
            }
            NativeCall::ParentCall { class, method } => {
                (self.call_statement(&format!("self->obj->{}::{method}", class.full_name), &args), None)
            }
            NativeCall::Constructor { class } => {
                let (target, epilogue) = match class.helper_class_name() {
                    Some(helper) => {
                        let set = format!("(({helper} *) self->obj)->set_pyobj((PyObject *) self);");
                        (helper, Some(set))
                    }
                    None => (class.full_name.clone(), None),
                };
                (format!("self->obj = new {target}({args});"), epilogue)
            }
        };

        if throws.is_empty() {
            self.before_call.write_code(&statement);
        } else {
            self.before_call.write_code("try {");
            self.before_call.indent();
            self.before_call.write_code(&statement);
            self.before_call.unindent();
            for exc in throws {
                self.before_call
                    .write_code(&format!("}} catch ({} const &exc) {{", exc.full_name));
                self.before_call.indent();
                self.before_call.write_code(&format!(
                    "PyErr_SetString((PyObject *) {}, exc.what());",
                    exc.pytypestruct
                ));
                self.before_call.write_error_exit(None);
                self.before_call.unindent();
            }
            self.before_call.write_code("}");
        }
        if let Some(epilogue) = epilogue {
            self.before_call.write_code(&epilogue);
        }
    }

    fn call_statement(&self, target: &str, args: &str) -> String {
        match &self.return_value {
            None => format!("{target}({args});"),
            Some(rv) if rv.is_void() || self.no_c_retval => format!("{target}({args});"),
            Some(rv) if rv.requires_assignment_constructor() => {
                format!("{} retval = {target}({args});", rv.ctype)
            }
            Some(_) => format!("retval = {target}({args});"),
        }
    }

    /// Derive the calling convention from the accumulated inbound entries
    /// and emit the argument-unpacking statement.
    fn emit_parse_arguments(&mut self) -> GenResult<()> {
        let params = self.parse_params.get_parameters()?;
        let keywords = self.parse_params.get_keywords()?;

        if params[0] == "\"\"" && self.force_parse.is_none() {
            self.meth_flags.push(MethFlag::Noargs);
            return Ok(());
        }
        self.meth_flags.push(MethFlag::Varargs);
        let force_keywords = matches!(self.force_parse, Some(ForceParse::TupleAndKeywords));
        if keywords.is_none() && !force_keywords {
            let mut call_args = vec!["args".to_string()];
            call_args.extend(params);
            self.before_parse
                .write_error_check(&format!("!PyArg_ParseTuple({})", call_args.join(", ")), None);
        } else {
            let keywords = keywords.unwrap_or_default();
            let initializer = {
                let mut items: Vec<String> =
                    keywords.iter().map(|kw| format!("\"{kw}\"")).collect();
                items.push("NULL".to_string());
                format!("{{{}}}", items.join(", "))
            };
            let keywords_var = self.declarations.declare_variable(
                "const char *",
                "keywords",
                Some(&initializer),
                Some("[]"),
            )?;
            let mut call_args = vec![
                "args".to_string(),
                "kwargs".to_string(),
                params[0].clone(),
                format!("(char **) {keywords_var}"),
            ];
            call_args.extend(params[1..].iter().cloned());
            self.before_parse.write_error_check(
                &format!("!PyArg_ParseTupleAndKeywords({})", call_args.join(", ")),
                None,
            );
            self.meth_flags.push(MethFlag::Keywords);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Custodian bookkeeping
    // -----------------------------------------------------------------------

    /// Attach each ward's wrapper to its custodian's `__wards__` list, so
    /// the custodian keeps the ward alive for its own lifetime.
    fn implement_custodians(&mut self, call: &NativeCall) -> GenResult<()> {
        let mut pairs: Vec<(String, String)> = Vec::new();
        for index in 0..self.parameters.len() {
            let param = &self.parameters[index];
            if !matches!(param.codec, ParamCodec::ClassPtr { .. }) {
                continue;
            }
            let Some(custodian) = param.custodian else { continue };
            let ward = wrapper_object_expr(param.py_name.as_deref(), &param.name)?;
            let custodian = self.custodian_expr(custodian, call)?;
            pairs.push((custodian, ward));
        }
        if let Some(rv) = &self.return_value {
            if let Some(custodian) = rv.custodian {
                let ward = wrapper_object_expr(rv.py_name.as_deref(), "return value")?;
                let custodian = self.custodian_expr(custodian, call)?;
                pairs.push((custodian, ward));
            }
        }
        for (custodian, ward) in pairs {
            self.add_ward(&custodian, &ward)?;
        }
        Ok(())
    }

    fn custodian_expr(&self, custodian: i32, call: &NativeCall) -> GenResult<String> {
        match custodian {
            -1 => {
                let rv = self.return_value.as_ref().ok_or_else(|| {
                    GenError::TypeConfiguration(
                        "custodian -1 given but the callable returns nothing".into(),
                    )
                })?;
                wrapper_object_expr(rv.py_name.as_deref(), "return value")
            }
            0 => match call {
                NativeCall::Function { .. } => Err(GenError::TypeConfiguration(
                    "custodian 0 (self) is only valid on methods".into(),
                )),
                _ => Ok("((PyObject *) self)".to_string()),
            },
            n if n > 0 => {
                let param = self.parameters.get(n as usize - 1).ok_or_else(|| {
                    GenError::TypeConfiguration(format!("custodian index {n} out of range"))
                })?;
                wrapper_object_expr(param.py_name.as_deref(), &param.name)
            }
            n => Err(GenError::TypeConfiguration(format!("bad custodian index {n}"))),
        }
    }

    fn add_ward(&mut self, custodian: &str, ward: &str) -> GenResult<()> {
        let wards = self.declarations.declare_variable("PyObject*", "wards", None, None)?;
        self.after_call.write_code(&format!(
            "{wards} = PyObject_GetAttrString({custodian}, (char *) \"__wards__\");"
        ));
        self.after_call.write_code(&format!(
            "if ({wards} == NULL) {{\n\
             \x20   PyErr_Clear();\n\
             \x20   {wards} = PyList_New(0);\n\
             \x20   PyObject_SetAttrString({custodian}, (char *) \"__wards__\", {wards});\n\
             }}"
        ));
        self.after_call.write_code(&format!("PyList_Append({wards}, {ward});"));
        self.after_call.add_cleanup_code(&format!("Py_DECREF({wards});"));
        Ok(())
    }
}

fn wrapper_object_expr(py_name: Option<&str>, what: &str) -> GenResult<String> {
    match py_name {
        Some(name) => Ok(format!("((PyObject *) {name})")),
        None => Err(GenError::TypeConfiguration(format!(
            "{what} has no python wrapper to use in custodian bookkeeping"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, TypeRegistry};

    fn wrapper_for(
        registry: &TypeRegistry,
        return_type: &str,
        params: &[(&str, &str)],
    ) -> ForwardWrapper {
        let rv = ReturnValue::new(registry, return_type).unwrap();
        let parameters = params
            .iter()
            .map(|(ctype, name)| {
                Parameter::new(registry, ctype, name, Direction::In, false).unwrap()
            })
            .collect();
        ForwardWrapper::new(Some(rv), parameters, "return NULL;", "return NULL;").unwrap()
    }

    #[test]
    fn body_orders_declarations_parse_call_pack() {
        let registry = TypeRegistry::with_default_codecs();
        let mut wrapper = wrapper_for(&registry, "int", &[("int", "x"), ("double", "y")]);
        let mut sink = CodeSink::new();
        let call = NativeCall::Function { name: "compute".into(), namespace: None };
        wrapper.generate_body(&mut sink, &call, &[]).unwrap();
        let body = sink.flush();

        let decl_pos = body.find("PyObject *py_retval;").unwrap();
        let parse_pos = body
            .find("if (!PyArg_ParseTupleAndKeywords(args, kwargs, \"id\", (char **) keywords, &x, &y)) {")
            .unwrap();
        let call_pos = body.find("retval = compute(x, y);").unwrap();
        let build_pos = body.find("py_retval = Py_BuildValue(\"i\", retval);").unwrap();
        let return_pos = body.find("return py_retval;").unwrap();
        assert!(decl_pos < parse_pos && parse_pos < call_pos);
        assert!(call_pos < build_pos && build_pos < return_pos);
        assert!(body.contains("const char *keywords[] = {\"x\", \"y\", NULL};"));
        assert_eq!(
            wrapper.meth_flags,
            vec![MethFlag::Varargs, MethFlag::Keywords]
        );
    }

    #[test]
    fn no_arguments_derives_noargs() {
        let registry = TypeRegistry::with_default_codecs();
        let mut wrapper = wrapper_for(&registry, "void", &[]);
        let mut sink = CodeSink::new();
        let call = NativeCall::Function { name: "tick".into(), namespace: Some("core".into()) };
        wrapper.generate_body(&mut sink, &call, &[]).unwrap();
        let body = sink.flush();
        assert!(body.contains("core::tick();"));
        assert!(!body.contains("PyArg_ParseTuple"));
        assert_eq!(wrapper.meth_flags, vec![MethFlag::Noargs]);
        assert!(body.contains("py_retval = Py_BuildValue(\"\");"));
    }

    #[test]
    fn unblock_threads_brackets_the_call_and_error_paths() {
        let registry = TypeRegistry::with_default_codecs();
        let mut wrapper = wrapper_for(&registry, "int", &[("int", "x")]);
        wrapper.unblock_threads = true;
        let mut sink = CodeSink::new();
        let call = NativeCall::Function { name: "work".into(), namespace: None };
        wrapper.generate_body(&mut sink, &call, &[]).unwrap();
        let body = sink.flush();

        let save = body.find("py_thread_state = PyEval_SaveThread();").unwrap();
        let call_pos = body.find("retval = work(x);").unwrap();
        let restore = body.find("PyEval_RestoreThread(py_thread_state);").unwrap();
        assert!(save < call_pos && call_pos < restore);
        assert!(body.contains("PyThreadState *py_thread_state = NULL;"));
    }

    #[test]
    fn declared_exceptions_catch_convert_and_unwind() {
        let registry = TypeRegistry::with_default_codecs();
        let mut wrapper = wrapper_for(&registry, "int", &[]);
        let exc = Rc::new(ExceptionMeta::new("DomainError", None, ""));
        let mut sink = CodeSink::new();
        let call = NativeCall::Function { name: "risky".into(), namespace: None };
        wrapper.generate_body(&mut sink, &call, &[exc]).unwrap();
        let body = sink.flush();

        assert!(body.contains("try {"));
        assert!(body.contains("} catch (DomainError const &exc) {"));
        assert!(body.contains(
            "PyErr_SetString((PyObject *) PyDomainError_Type, exc.what());"
        ));
        assert!(body.contains("return NULL;"));
    }

    #[test]
    fn value_routed_into_a_valueless_wrapper_fails() {
        let registry = TypeRegistry::with_default_codecs();
        let param = Parameter::new(&registry, "int*", "out", Direction::Out, false).unwrap();
        let mut wrapper =
            ForwardWrapper::new(None, vec![param], "return -1;", "return -1;").unwrap();
        let mut sink = CodeSink::new();
        let call = NativeCall::Function { name: "fetch".into(), namespace: None };
        assert!(matches!(
            wrapper.generate_body(&mut sink, &call, &[]),
            Err(GenError::UnexpectedReturnValues(_))
        ));
    }
}
