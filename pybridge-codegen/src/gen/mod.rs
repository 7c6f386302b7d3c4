// Wrapper orchestration: forward/reverse protocols, overloads, assembly.

pub mod class;
pub mod forward;
pub mod function;
pub mod method;
pub mod module;
pub mod overload;
pub mod reverse;

use crate::naming::mangle_name;

/// Calling-convention flags of a generated wrapper's method-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethFlag {
    Varargs,
    Keywords,
    Noargs,
    Static,
}

impl MethFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            MethFlag::Varargs => "METH_VARARGS",
            MethFlag::Keywords => "METH_KEYWORDS",
            MethFlag::Noargs => "METH_NOARGS",
            MethFlag::Static => "METH_STATIC",
        }
    }
}

/// Render a flag set as the `A|B` expression used in `PyMethodDef`.
pub fn flags_expr(flags: &[MethFlag]) -> String {
    flags.iter().map(|f| f.as_str()).collect::<Vec<_>>().join("|")
}

/// One `PyMethodDef` table element.
pub fn method_def_entry(
    py_name: &str,
    wrapper_name: &str,
    flags: &[MethFlag],
    docstring: Option<&str>,
) -> String {
    let doc = match docstring {
        Some(doc) => format!("\"{}\"", escape_c_string(doc)),
        None => "NULL".to_string(),
    };
    format!(
        "{{\"{py_name}\", (PyCFunction) {wrapper_name}, {}, {doc} }},",
        flags_expr(flags)
    )
}

/// Escape a docstring for embedding in a C string literal.
pub fn escape_c_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(ch),
        }
    }
    out
}

/// Description of a wrapped C++ exception type: a python exception object
/// is registered for it, and callables declaring it in their throw list
/// translate a caught instance into that python error.
pub struct ExceptionMeta {
    pub name: String,
    pub full_name: String,
    pub python_name: String,
    pub pytypestruct: String,
}

impl ExceptionMeta {
    pub fn new(name: &str, cpp_namespace: Option<&str>, name_prefix: &str) -> Self {
        let full_name = match cpp_namespace {
            Some("::") => format!("::{name}"),
            Some(ns) => format!("{ns}::{name}"),
            None => name.to_string(),
        };
        let mangled = mangle_name(&full_name);
        ExceptionMeta {
            name: name.to_string(),
            full_name,
            python_name: mangle_name(name),
            pytypestruct: format!("Py{name_prefix}{mangled}_Type"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_def_entry_renders_flags_and_doc() {
        let entry = method_def_entry(
            "feed",
            "_wrap_zoo_feed",
            &[MethFlag::Varargs, MethFlag::Keywords],
            Some("feed the \"animals\""),
        );
        assert_eq!(
            entry,
            "{\"feed\", (PyCFunction) _wrap_zoo_feed, METH_VARARGS|METH_KEYWORDS, \
             \"feed the \\\"animals\\\"\" },"
        );
    }
}
