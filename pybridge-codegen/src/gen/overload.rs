// Runtime overload resolution over a set of generated wrappers.

use crate::error::{GenError, GenResult};
use crate::sink::CodeSink;

use super::{flags_expr, MethFlag};

/// Interface the dispatcher needs from each member wrapper.
pub trait OverloadCandidate {
    fn force_keyword_parsing(&mut self);
    fn set_parse_error_return(&mut self, code: &str);
    fn generate(
        &mut self,
        sink: &mut CodeSink,
        wrapper_name: Option<&str>,
        extra_wrapper_params: &[&str],
    ) -> GenResult<()>;
    fn wrapper_base_name(&self) -> &str;
    fn wrapper_actual_name(&self) -> Option<&str>;
    fn meth_flags(&self) -> &[MethFlag];
    fn method_def(&self, py_name: &str) -> GenResult<String>;
    fn self_struct(&self) -> &str;
}

/// An ordered set of wrappers sharing one exposed name.
///
/// The generated dispatcher tries each candidate in registration order and
/// resolves to the first whose argument parsing succeeds. Registration
/// order is authoritative: no arity or specificity reordering happens, so
/// a call matching two overloads always picks the earlier one. Callers
/// avoid ambiguity by registering the more specific overloads first.
pub struct OverloadSet<W: OverloadCandidate> {
    pub wrappers: Vec<W>,
    return_ctype: &'static str,
    error_return: &'static str,
    wrapper_function_name: Option<String>,
}

impl<W: OverloadCandidate> OverloadSet<W> {
    /// `return_ctype`/`error_return` describe the dispatcher's own
    /// signature: `"PyObject *"`/`"return NULL;"` for functions and
    /// methods, `"int"`/`"return -1;"` for constructors.
    pub fn new(return_ctype: &'static str, error_return: &'static str) -> Self {
        OverloadSet { wrappers: Vec::new(), return_ctype, error_return, wrapper_function_name: None }
    }

    pub fn add(&mut self, wrapper: W) {
        self.wrappers.push(wrapper);
    }

    pub fn len(&self) -> usize {
        self.wrappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wrappers.is_empty()
    }

    /// The symbol the method table should reference; set by generation.
    pub fn wrapper_function_name(&self) -> Option<&str> {
        self.wrapper_function_name.as_deref()
    }

    /// Generate all member wrappers, plus the dispatcher when there is
    /// more than one.
    pub fn generate(&mut self, sink: &mut CodeSink) -> GenResult<()> {
        if self.wrappers.len() == 1 {
            self.wrappers[0].generate(sink, None, &[])?;
            self.wrapper_function_name =
                self.wrappers[0].wrapper_actual_name().map(|n| n.to_string());
            return Ok(());
        }

        let base = self.wrappers[0].wrapper_base_name().to_string();
        let error_return = self.error_return;
        let mut delegates = Vec::with_capacity(self.wrappers.len());
        for (index, wrapper) in self.wrappers.iter_mut().enumerate() {
            // Uniform conventions across delegates; parse errors are
            // stashed in *return_exception instead of raised.
            wrapper.force_keyword_parsing();
            wrapper.set_parse_error_return(&format!(
                "{{\n\
                 \x20   PyObject *exc_type, *traceback;\n\
                 \x20   PyErr_Fetch(&exc_type, return_exception, &traceback);\n\
                 \x20   Py_XDECREF(exc_type);\n\
                 \x20   Py_XDECREF(traceback);\n\
                 }}\n\
                 {error_return}"
            ));
            let delegate_name = format!("{base}__{index}");
            sink.blank();
            wrapper.generate(sink, Some(&delegate_name), &["PyObject **return_exception"])?;
            delegates.push(delegate_name);
        }

        sink.blank();
        sink.writeln(&format!("static {}", self.return_ctype));
        sink.writeln(&format!(
            "{base}({} *self, PyObject *args, PyObject *kwargs)",
            self.wrappers[0].self_struct()
        ));
        sink.writeln("{");
        sink.indent();
        sink.writeln(&format!("{} retval;", self.return_ctype));
        sink.writeln("PyObject *error_list;");
        sink.writeln(&format!("PyObject *exceptions[{}] = {{0,}};", delegates.len()));
        for (index, delegate) in delegates.iter().enumerate() {
            sink.writeln(&format!(
                "retval = {delegate}(self, args, kwargs, &exceptions[{index}]);"
            ));
            sink.writeln(&format!("if (!exceptions[{index}]) {{"));
            sink.indent();
            for previous in 0..index {
                sink.writeln(&format!("Py_DECREF(exceptions[{previous}]);"));
            }
            sink.writeln("return retval;");
            sink.unindent();
            sink.writeln("}");
        }
        // every candidate failed to parse: no matching overload
        sink.writeln(&format!("error_list = PyList_New({});", delegates.len()));
        for index in 0..delegates.len() {
            sink.writeln(&format!(
                "PyList_SET_ITEM(error_list, {index}, PyObject_Str(exceptions[{index}]));"
            ));
            sink.writeln(&format!("Py_DECREF(exceptions[{index}]);"));
        }
        sink.writeln("PyErr_SetObject(PyExc_TypeError, error_list);");
        sink.writeln("Py_DECREF(error_list);");
        sink.writeln(self.error_return);
        sink.unindent();
        sink.writeln("}");

        self.wrapper_function_name = Some(base);
        Ok(())
    }

    /// The method-table entry for the whole set; valid after generation.
    pub fn method_def(&self, py_name: &str) -> GenResult<String> {
        if self.wrappers.len() == 1 {
            return self.wrappers[0].method_def(py_name);
        }
        let flags = self.wrappers[0].meth_flags();
        for wrapper in &self.wrappers[1..] {
            if wrapper.meth_flags() != flags {
                return Err(GenError::InconsistentOverloadFlags(py_name.to_string()));
            }
        }
        let name = self.wrapper_function_name.as_deref().ok_or_else(|| {
            GenError::TypeConfiguration(format!(
                "method def of {py_name:?} requested before generation"
            ))
        })?;
        Ok(format!(
            "{{\"{py_name}\", (PyCFunction) {name}, {}, NULL }},",
            flags_expr(flags)
        ))
    }
}
