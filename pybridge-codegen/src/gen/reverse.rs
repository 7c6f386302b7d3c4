// Reverse wrappers: native code calling back into the dynamic side.

use std::rc::Rc;

use crate::block::CodeBlock;
use crate::error::GenResult;
use crate::marshal::{BuildValueParams, ParseTupleParams};
use crate::naming::join_ctype_and_name;
use crate::scope::DeclarationsScope;
use crate::sink::CodeSink;
use crate::types::{ClassMeta, Parameter, ReturnValue, ReverseCtx};

/// The dynamic-side call a reverse wrapper dispatches to.
pub enum PythonCall {
    /// `PyObject_CallMethod(<object>, "<method>", ...)`.
    Method { object: String, method: String },
}

/// Generator for one native function that calls into python.
///
/// Parameters are packed before the call, the single dynamic result is
/// re-wrapped into a one-element tuple, and return plus out-parameters are
/// unpacked from it, so multi-value results unpack uniformly.
pub struct ReverseWrapper {
    pub return_value: ReturnValue,
    pub parameters: Vec<Parameter>,
    pub declarations: DeclarationsScope,
    pub before_call: CodeBlock,
    pub after_call: CodeBlock,
    pub parse_params: ParseTupleParams,
    pub build_params: BuildValueParams,
}

impl ReverseWrapper {
    /// `error_return` defaults to the return type's own error statement.
    pub fn new(
        return_value: ReturnValue,
        parameters: Vec<Parameter>,
        error_return: Option<&str>,
    ) -> GenResult<ReverseWrapper> {
        let error_return = match error_return {
            Some(code) => code.to_string(),
            None => return_value.error_return(),
        };
        let before_call = CodeBlock::new(&error_return);
        let after_call = CodeBlock::with_predecessor(&error_return, &before_call);
        Ok(ReverseWrapper {
            return_value,
            parameters,
            declarations: DeclarationsScope::new(),
            before_call,
            after_call,
            parse_params: ParseTupleParams::new(),
            build_params: BuildValueParams::new(),
        })
    }

    fn ctx(&mut self) -> ReverseCtx<'_> {
        ReverseCtx {
            declarations: &mut self.declarations,
            before_call: &mut self.before_call,
            after_call: &mut self.after_call,
            parse_params: &mut self.parse_params,
            build_params: &mut self.build_params,
        }
    }

    /// Generate the complete wrapper function.
    pub fn generate(
        &mut self,
        sink: &mut CodeSink,
        wrapper_name: &str,
        decl_modifiers: &[&str],
        decl_post_modifiers: &[&str],
        python_call: &PythonCall,
    ) -> GenResult<()> {
        self.declarations.declare_variable("PyObject*", "py_retval", None, None)?;
        if !self.return_value.is_void() {
            self.declarations.declare_variable(&self.return_value.ctype, "retval", None, None)?;
        }

        // pack the parameters
        let mut parameters = std::mem::take(&mut self.parameters);
        let mut converted = Ok(());
        for param in &mut parameters {
            if let Err(err) = param.convert_native_to_script(&mut self.ctx()) {
                converted = Err(err);
                break;
            }
        }
        self.parameters = parameters;
        converted?;

        self.emit_python_call(python_call);

        // always a tuple, even for a single bare result
        self.before_call
            .write_code("py_retval = Py_BuildValue(\"(N)\", py_retval);");

        // unpack the result
        let mut rv = self.return_value.clone();
        let unpacked = rv.convert_script_to_native(&mut self.ctx());
        self.return_value = rv;
        unpacked?;

        let mut parse_args = vec!["py_retval".to_string()];
        parse_args.extend(self.parse_params.get_parameters()?);
        self.before_call
            .write_error_check(&format!("!PyArg_ParseTuple({})", parse_args.join(", ")), None);

        self.after_call.write_cleanup();
        if self.return_value.is_void() {
            self.after_call.write_code("return;");
        } else {
            self.after_call.write_code("return retval;");
        }

        // signature and body
        let mut retline: Vec<&str> = decl_modifiers.to_vec();
        retline.push(&self.return_value.ctype);
        sink.writeln(&retline.join(" "));
        let params_list = self
            .parameters
            .iter()
            .map(|p| join_ctype_and_name(&p.ctype, &p.name))
            .collect::<Vec<_>>()
            .join(", ");
        let post = if decl_post_modifiers.is_empty() {
            String::new()
        } else {
            format!(" {}", decl_post_modifiers.join(" "))
        };
        sink.writeln(&format!("{wrapper_name}({params_list}){post}"));
        sink.writeln("{");
        sink.indent();
        self.declarations.flush_to(sink);
        sink.blank();
        self.before_call.sink.flush_to(sink);
        self.after_call.sink.flush_to(sink);
        sink.unindent();
        sink.writeln("}");
        Ok(())
    }

    fn emit_python_call(&mut self, python_call: &PythonCall) {
        let PythonCall::Method { object, method } = python_call;
        let build = self.build_params.get_parameters();
        let mut call_args = vec![object.clone(), format!("(char *) \"{method}\"")];
        for (i, arg) in build.iter().enumerate() {
            if i == 0 && arg.starts_with('"') {
                call_args.push(format!("(char *) {arg}"));
            } else {
                call_args.push(arg.clone());
            }
        }
        self.before_call
            .write_code(&format!("py_retval = PyObject_CallMethod({});", call_args.join(", ")));
        self.before_call.write_error_check("py_retval == NULL", None);
        self.before_call.add_cleanup_code("Py_DECREF(py_retval);");
        // References carried by committed entries now belong to the call.
        for handle in self.build_params.take_cleanup_cancels() {
            handle.cancel();
        }
    }
}

/// Proxy for one virtual method of a subclassable class: the C++ override
/// dispatches to a same-named python method when the instance's python
/// object defines one, and otherwise chains to the native implementation.
pub struct VirtualProxyWrapper {
    pub wrapper: ReverseWrapper,
    pub class: Rc<ClassMeta>,
    pub method_name: String,
    pub is_const: bool,
}

impl VirtualProxyWrapper {
    pub fn new(
        class: &Rc<ClassMeta>,
        return_value: ReturnValue,
        method_name: &str,
        parameters: Vec<Parameter>,
        is_const: bool,
    ) -> GenResult<VirtualProxyWrapper> {
        Ok(VirtualProxyWrapper {
            wrapper: ReverseWrapper::new(return_value, parameters, None)?,
            class: Rc::clone(class),
            method_name: method_name.to_string(),
            is_const,
        })
    }

    /// The declaration line for the helper class body.
    pub fn generate_declaration(&self, sink: &mut CodeSink) {
        let params_list = self
            .wrapper
            .parameters
            .iter()
            .map(|p| join_ctype_and_name(&p.ctype, &p.name))
            .collect::<Vec<_>>()
            .join(", ");
        let post = if self.is_const { " const" } else { "" };
        sink.writeln(&format!(
            "virtual {} {}({params_list}){post};",
            self.wrapper.return_value.ctype, self.method_name
        ));
    }

    /// Generate the out-of-line proxy definition.
    pub fn generate(&mut self, sink: &mut CodeSink) -> GenResult<()> {
        let helper = self
            .class
            .helper_class_name()
            .expect("virtual proxies require a subclassable class");
        let method = &self.method_name;
        let full = &self.class.full_name;
        let pystruct = &self.class.pystruct;

        // no python override: chain straight to the native implementation
        let call_args = self
            .wrapper
            .parameters
            .iter()
            .map(|p| p.name.clone())
            .collect::<Vec<_>>()
            .join(", ");
        self.wrapper
            .before_call
            .write_code(&format!("if (!PyObject_HasAttrString(m_pyself, \"_{method}\")) {{"));
        if self.wrapper.return_value.is_void() {
            self.wrapper.before_call.write_code(&format!("    {full}::{method}({call_args});"));
            self.wrapper.before_call.write_code("    return;");
        } else {
            self.wrapper
                .before_call
                .write_code(&format!("    return {full}::{method}({call_args});"));
        }
        self.wrapper.before_call.write_code("}");

        // point the python wrapper at this instance around the call
        let self_obj_before = self.wrapper.declarations.declare_variable(
            &format!("{full}*"),
            "self_obj_before",
            None,
            None,
        )?;
        self.wrapper.before_call.write_code(&format!(
            "{self_obj_before} = reinterpret_cast< {pystruct}* >(m_pyself)->obj;"
        ));
        let this_expr = if self.is_const {
            format!("const_cast< {full}* >((const {full}*) this)")
        } else {
            format!("({full}*) this")
        };
        self.wrapper.before_call.write_code(&format!(
            "reinterpret_cast< {pystruct}* >(m_pyself)->obj = {this_expr};"
        ));
        self.wrapper.before_call.add_cleanup_code(&format!(
            "reinterpret_cast< {pystruct}* >(m_pyself)->obj = {self_obj_before};"
        ));

        let post: &[&str] = if self.is_const { &["const"] } else { &[] };
        let python_call = PythonCall::Method {
            object: "m_pyself".to_string(),
            method: format!("_{method}"),
        };
        self.wrapper
            .generate(sink, &format!("{helper}::{method}"), &[], post, &python_call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, TypeRegistry};

    #[test]
    fn reverse_wrapper_packs_calls_and_unpacks() {
        let registry = TypeRegistry::with_default_codecs();
        let rv = ReturnValue::new(&registry, "int").unwrap();
        let params =
            vec![Parameter::new(&registry, "int", "x", Direction::In, false).unwrap()];
        let mut wrapper = ReverseWrapper::new(rv, params, None).unwrap();
        let mut sink = CodeSink::new();
        let call = PythonCall::Method { object: "m_pyself".into(), method: "_on_event".into() };
        wrapper.generate(&mut sink, "handler", &["static"], &[], &call).unwrap();
        let code = sink.flush();

        assert!(code.starts_with("static int\nhandler(int x)\n{"));
        assert!(code.contains(
            "py_retval = PyObject_CallMethod(m_pyself, (char *) \"_on_event\", (char *) \"i\", x);"
        ));
        let call_pos = code.find("PyObject_CallMethod").unwrap();
        let wrap_pos = code.find("py_retval = Py_BuildValue(\"(N)\", py_retval);").unwrap();
        let parse_pos = code.find("if (!PyArg_ParseTuple(py_retval, \"i\", &retval)) {").unwrap();
        assert!(call_pos < wrap_pos && wrap_pos < parse_pos);
        // parse failure still releases the result tuple
        let after_parse = &code[parse_pos..];
        assert!(after_parse.contains("Py_DECREF(py_retval);"));
        assert!(after_parse.contains("return INT_MIN;"));
        assert!(code.trim_end().ends_with("return retval;\n}"));
    }

    #[test]
    fn void_reverse_wrapper_returns_bare() {
        let registry = TypeRegistry::with_default_codecs();
        let rv = ReturnValue::new(&registry, "void").unwrap();
        let mut wrapper = ReverseWrapper::new(rv, vec![], None).unwrap();
        let mut sink = CodeSink::new();
        let call = PythonCall::Method { object: "m_pyself".into(), method: "_tick".into() };
        wrapper.generate(&mut sink, "on_tick", &[], &[], &call).unwrap();
        let code = sink.flush();

        assert!(code.starts_with("void\non_tick()\n{"));
        assert!(code.contains("py_retval = PyObject_CallMethod(m_pyself, (char *) \"_tick\", (char *) \"\");"));
        let release = code.rfind("Py_DECREF(py_retval);").unwrap();
        let ret = code.rfind("return;").unwrap();
        assert!(release < ret);
    }

    #[test]
    fn virtual_proxy_chains_to_parent_without_override() {
        let mut meta = crate::types::ClassMeta::new("Animal", None, "");
        meta.allow_subclassing = true;
        let class = Rc::new(meta);
        let registry = TypeRegistry::with_default_codecs();
        let rv = ReturnValue::new(&registry, "void").unwrap();
        let mut proxy = VirtualProxyWrapper::new(&class, rv, "speak", vec![], false).unwrap();
        let mut sink = CodeSink::new();
        proxy.generate(&mut sink).unwrap();
        let code = sink.flush();

        assert!(code.contains("void\nPyAnimalHelper::speak()"));
        assert!(code.contains("if (!PyObject_HasAttrString(m_pyself, \"_speak\")) {"));
        assert!(code.contains("Animal::speak();"));
        assert!(code.contains("reinterpret_cast< PyAnimal* >(m_pyself)->obj = (Animal*) this;"));
        // the swap is restored on error paths too
        let parse_pos = code.find("PyArg_ParseTuple").unwrap();
        let restore_in_error = &code[parse_pos..];
        assert!(restore_in_error
            .contains("reinterpret_cast< PyAnimal* >(m_pyself)->obj = self_obj_before;"));
    }

    #[test]
    fn proxy_declaration_lists_native_parameter_types() {
        let mut meta = crate::types::ClassMeta::new("Animal", None, "");
        meta.allow_subclassing = true;
        let class = Rc::new(meta);
        let registry = TypeRegistry::with_default_codecs();
        let rv = ReturnValue::new(&registry, "int").unwrap();
        let params =
            vec![Parameter::new(&registry, "double", "dt", Direction::In, false).unwrap()];
        let proxy = VirtualProxyWrapper::new(&class, rv, "step", params, true).unwrap();
        let mut sink = CodeSink::new();
        proxy.generate_declaration(&mut sink);
        assert_eq!(sink.flush(), "virtual int step(double dt) const;\n");
    }
}
