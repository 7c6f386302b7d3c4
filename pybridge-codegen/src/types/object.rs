// Wrapped-class codecs: instance parameters and returns, ownership rules.

use std::rc::Rc;

use crate::block::CodeBlock;
use crate::error::{GenError, GenResult};
use crate::naming::mangle_name;

use super::{ForwardCtx, Parameter, ReturnValue, ReverseCtx};

/// How a wrapper releases the native object it holds.
#[derive(Clone)]
pub enum MemoryPolicy {
    /// Plain `delete` in the destructor hook.
    Delete,
    /// Intrusive reference counting through the named methods; handing a
    /// pointer to the other side increments, the destructor decrements.
    RefCounted { incref_method: String, decref_method: String },
}

impl MemoryPolicy {
    pub fn is_ref_counted(&self) -> bool {
        matches!(self, MemoryPolicy::RefCounted { .. })
    }

    /// Write an increment of `expr`'s reference count, if counting applies.
    pub fn write_incref(&self, block: &mut CodeBlock, expr: &str) {
        if let MemoryPolicy::RefCounted { incref_method, .. } = self {
            block.write_code(&format!("{expr}->{incref_method}();"));
        }
    }

    /// The statement releasing `expr`, or `None` when nothing is owed.
    pub fn destroy_statement(&self, expr: &str) -> Option<String> {
        match self {
            MemoryPolicy::Delete => Some(format!("delete {expr};")),
            MemoryPolicy::RefCounted { decref_method, .. } => {
                Some(format!("if ({expr})\n    {expr}->{decref_method}();"))
            }
        }
    }
}

/// Shared description of a wrapped C++ class, referenced by the registry
/// codecs and by the class assembly generator.
pub struct ClassMeta {
    /// Bare class name (`Foo`).
    pub name: String,
    /// Namespace-qualified name used in generated C++ (`ns::Foo`).
    pub full_name: String,
    /// Name of the generated instance struct (`PyFoo`).
    pub pystruct: String,
    /// Name of the generated type object (`PyFoo_Type`).
    pub pytypestruct: String,
    pub memory_policy: MemoryPolicy,
    pub allow_subclassing: bool,
    pub is_singleton: bool,
    pub automatic_type_narrowing: bool,
    pub docstring: Option<String>,
}

impl ClassMeta {
    pub fn new(name: &str, cpp_namespace: Option<&str>, name_prefix: &str) -> Self {
        let full_name = match cpp_namespace {
            Some("::") => format!("::{name}"),
            Some(ns) => format!("{ns}::{name}"),
            None => name.to_string(),
        };
        let mangled = mangle_name(&full_name);
        ClassMeta {
            name: name.to_string(),
            full_name,
            pystruct: format!("Py{name_prefix}{mangled}"),
            pytypestruct: format!("Py{name_prefix}{mangled}_Type"),
            memory_policy: MemoryPolicy::Delete,
            allow_subclassing: false,
            is_singleton: false,
            automatic_type_narrowing: false,
            docstring: None,
        }
    }

    /// Type-string spellings this class claims in the registry.
    pub fn type_names(&self) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        if self.full_name != self.name {
            names.push(self.full_name.clone());
        }
        names
    }

    /// Name of the C++ helper subclass used for python-side subclassing.
    pub fn helper_class_name(&self) -> Option<String> {
        self.allow_subclassing.then(|| format!("{}Helper", self.pystruct))
    }

    /// Name of the `typeid` → wrapper-type map for narrowing roots.
    pub fn typeid_map_name(&self) -> String {
        format!("{}__typeid_map", self.pystruct)
    }
}

fn pystruct_ptr(class: &ClassMeta) -> String {
    format!("{}*", class.pystruct)
}

/// Resolve whether a pointer parameter hands its object over. Class
/// pointers must say so explicitly unless the target is const or a
/// custodian keeps the object alive.
fn resolve_transfer(param: &Parameter) -> GenResult<bool> {
    match param.transfer_ownership {
        Some(transfer) => Ok(transfer),
        None if param.custodian.is_some() => Ok(false),
        None if param.is_const || param.ctype.starts_with("const ") => Ok(false),
        None => Err(GenError::TypeConfiguration(format!(
            "transfer_ownership missing for parameter {:?} of type {:?}",
            param.name, param.ctype
        ))),
    }
}

// ---------------------------------------------------------------------------
// By-value and by-reference parameters
// ---------------------------------------------------------------------------

pub(crate) fn class_value_param(
    param: &mut Parameter,
    class: &Rc<ClassMeta>,
    ctx: &mut ForwardCtx,
) -> GenResult<()> {
    let py_name = ctx.declarations.declare_variable(&pystruct_ptr(class), &param.name, None, None)?;
    ctx.parse_params.add(
        "O!",
        &[&format!("&{}", class.pytypestruct), &format!("&{py_name}")],
        Some(&param.name),
    );
    ctx.call_params.push(format!("*(({} *) {py_name})->obj", class.pystruct));
    param.py_name = Some(py_name);
    Ok(())
}

pub(crate) fn class_ref_param(
    param: &mut Parameter,
    class: &Rc<ClassMeta>,
    ctx: &mut ForwardCtx,
) -> GenResult<()> {
    // A reference binds to the wrapped instance directly; same unpacking
    // as the by-value case.
    class_value_param(param, class, ctx)
}

/// Pack a native instance into a fresh wrapper holding a copy. The
/// wrapper's reference is consumed by the `N` entry, so the registered
/// release is cancelled exactly when the entry is committed.
fn pack_copy(
    param: &mut Parameter,
    class: &Rc<ClassMeta>,
    ctx: &mut ReverseCtx,
) -> GenResult<()> {
    let py_name = ctx.declarations.declare_variable(
        &pystruct_ptr(class),
        &format!("py_{}", param.name),
        None,
        None,
    )?;
    ctx.before_call
        .write_code(&format!("{py_name} = PyObject_New({}, &{});", class.pystruct, class.pytypestruct));
    ctx.before_call
        .write_code(&format!("{py_name}->obj = new {}({});", class.full_name, param.value));
    let release = ctx.before_call.add_cleanup_code(&format!("Py_DECREF({py_name});"));
    ctx.build_params.add_full("N", &[&py_name], false, Some(release));
    param.py_name = Some(py_name);
    Ok(())
}

pub(crate) fn class_value_param_reverse(
    param: &mut Parameter,
    class: &Rc<ClassMeta>,
    ctx: &mut ReverseCtx,
) -> GenResult<()> {
    pack_copy(param, class, ctx)
}

pub(crate) fn class_ref_param_reverse(
    param: &mut Parameter,
    class: &Rc<ClassMeta>,
    ctx: &mut ReverseCtx,
) -> GenResult<()> {
    pack_copy(param, class, ctx)
}

// ---------------------------------------------------------------------------
// Pointer parameters
// ---------------------------------------------------------------------------

pub(crate) fn class_ptr_param(
    param: &mut Parameter,
    class: &Rc<ClassMeta>,
    ctx: &mut ForwardCtx,
) -> GenResult<()> {
    let transfer = resolve_transfer(param)?;
    let optional = param.default_value.is_some();
    let init = optional.then_some("NULL");
    let py_name = ctx.declarations.declare_variable(&pystruct_ptr(class), &param.name, init, None)?;
    let value_ptr = ctx.declarations.declare_variable(
        &format!("{}*", class.full_name),
        &format!("{}_ptr", param.name),
        None,
        None,
    )?;

    if param.null_ok {
        // Loose `O` parsing; the instance check has to be explicit so that
        // None can pass through as NULL.
        let position = ctx.parse_params.add_full(
            "O",
            &[&format!("&{py_name}")],
            Some(&param.name),
            false,
            optional,
        );
        ctx.before_call.write_error_check(
            &format!(
                "{py_name} && ((PyObject *) {py_name} != Py_None) && \
                 !PyObject_IsInstance((PyObject *) {py_name}, (PyObject *) &{})",
                class.pytypestruct
            ),
            Some(&format!(
                "PyErr_SetString(PyExc_TypeError, \"Parameter {position} must be {}\");",
                class.name
            )),
        );
        ctx.before_call.write_code(&format!(
            "if ({py_name}) {{\n\
             \x20   if ((PyObject *) {py_name} == Py_None)\n\
             \x20       {value_ptr} = NULL;\n\
             \x20   else\n\
             \x20       {value_ptr} = {py_name}->obj;\n\
             }} else {{\n\
             \x20   {value_ptr} = NULL;\n\
             }}"
        ));
    } else {
        ctx.parse_params.add_full(
            "O!",
            &[&format!("&{}", class.pytypestruct), &format!("&{py_name}")],
            Some(&param.name),
            false,
            optional,
        );
        ctx.before_call
            .write_code(&format!("{value_ptr} = ({py_name} ? {py_name}->obj : NULL);"));
    }

    let value = match &param.transformation {
        Some(t) => t.transform(ctx.declarations, ctx.before_call, &param.untransformed_ctype, &value_ptr),
        None => value_ptr.clone(),
    };
    ctx.call_params.push(value);

    if transfer {
        if class.memory_policy.is_ref_counted() {
            ctx.before_call.write_code(&format!("if ({py_name}) {{"));
            ctx.before_call.indent();
            class.memory_policy.write_incref(ctx.before_call, &format!("{py_name}->obj"));
            ctx.before_call.unindent();
            ctx.before_call.write_code("}");
        } else {
            // Ownership has moved into the callee; drop our pointer so the
            // destructor hook does not release it a second time.
            ctx.after_call
                .write_code(&format!("if ({py_name})\n    {py_name}->obj = NULL;"));
        }
    }
    param.py_name = Some(py_name);
    Ok(())
}

pub(crate) fn class_ptr_param_reverse(
    param: &mut Parameter,
    class: &Rc<ClassMeta>,
    ctx: &mut ReverseCtx,
) -> GenResult<()> {
    let value = match &param.transformation {
        Some(t) => t.untransform(ctx.declarations, ctx.before_call, &param.untransformed_ctype, &param.value),
        None => param.value.clone(),
    };
    let transfer = param.transfer_ownership.unwrap_or(false);
    let py_name = ctx.declarations.declare_variable(
        &pystruct_ptr(class),
        &format!("py_{}", class.name),
        None,
        None,
    )?;

    let wrapper_type = if class.automatic_type_narrowing
        && (transfer || class.memory_policy.is_ref_counted())
    {
        let wt = ctx.declarations.declare_variable("PyTypeObject*", "wrapper_type", Some("0"), None)?;
        ctx.before_call.write_code(&format!(
            "{wt} = {}.lookup_wrapper(typeid(*{value}), &{});",
            class.typeid_map_name(),
            class.pytypestruct
        ));
        wt
    } else {
        format!("&{}", class.pytypestruct)
    };

    let new_func = if class.allow_subclassing { "PyObject_GC_New" } else { "PyObject_New" };
    ctx.before_call
        .write_code(&format!("{py_name} = {new_func}({}, {wrapper_type});", class.pystruct));
    if class.allow_subclassing {
        ctx.before_call.write_code(&format!("{py_name}->inst_dict = NULL;"));
    }

    if transfer {
        ctx.before_call.write_code(&format!("{py_name}->obj = {value};"));
    } else if class.memory_policy.is_ref_counted() {
        class.memory_policy.write_incref(ctx.before_call, &value);
        ctx.before_call.write_code(&format!("{py_name}->obj = {value};"));
    } else {
        // The callee may retain a reference after the call, so it gets a
        // wrapper around its own copy.
        ctx.before_call
            .write_code(&format!("{py_name}->obj = new {}(*{value});", class.full_name));
    }

    let release = ctx.before_call.add_cleanup_code(&format!("Py_DECREF({py_name});"));
    ctx.build_params.add_full("N", &[&py_name], false, Some(release));
    param.py_name = Some(py_name);
    Ok(())
}

// ---------------------------------------------------------------------------
// Returns
// ---------------------------------------------------------------------------

pub(crate) fn class_value_return(
    rv: &mut ReturnValue,
    class: &Rc<ClassMeta>,
    ctx: &mut ForwardCtx,
) -> GenResult<()> {
    let py_name = ctx.declarations.declare_variable(
        &pystruct_ptr(class),
        &format!("py_{}", class.name),
        None,
        None,
    )?;
    ctx.after_call
        .write_code(&format!("{py_name} = PyObject_New({}, &{});", class.pystruct, class.pytypestruct));
    ctx.after_call
        .write_code(&format!("{py_name}->obj = new {}({});", class.full_name, rv.value));
    ctx.build_params.add_full("N", &[&py_name], true, None);
    rv.py_name = Some(py_name);
    Ok(())
}

fn resolve_caller_owns(rv: &ReturnValue) -> GenResult<bool> {
    match rv.caller_owns_return {
        Some(owns) => Ok(owns),
        // A custodian implies the caller side holds the object.
        None if rv.custodian.is_some() => Ok(true),
        None if rv.ctype.contains("const") => Ok(false),
        None => Err(GenError::TypeConfiguration(format!(
            "caller_owns_return not given for return type {:?}",
            rv.ctype
        ))),
    }
}

pub(crate) fn class_ptr_return(
    rv: &mut ReturnValue,
    class: &Rc<ClassMeta>,
    ctx: &mut ForwardCtx,
) -> GenResult<()> {
    let caller_owns = resolve_caller_owns(rv)?;
    let value = match &rv.transformation {
        Some(t) => t.untransform(ctx.declarations, ctx.after_call, &rv.untransformed_ctype, &rv.value),
        None => rv.value.clone(),
    };

    // NULL maps to None; pending cleanups are still owed on this exit.
    ctx.after_call.write_code(&format!("if (!({value})) {{"));
    ctx.after_call.indent();
    ctx.after_call.write_code("Py_INCREF(Py_None);");
    ctx.after_call.write_cleanup();
    ctx.after_call.write_code("return Py_None;");
    ctx.after_call.unindent();
    ctx.after_call.write_code("}");

    let py_name = ctx.declarations.declare_variable(
        &pystruct_ptr(class),
        &format!("py_{}", class.name),
        None,
        None,
    )?;
    let wrapper_type = if class.automatic_type_narrowing
        && (caller_owns || class.memory_policy.is_ref_counted())
    {
        let wt = ctx.declarations.declare_variable("PyTypeObject*", "wrapper_type", Some("0"), None)?;
        ctx.after_call.write_code(&format!(
            "{wt} = {}.lookup_wrapper(typeid(*{value}), &{});",
            class.typeid_map_name(),
            class.pytypestruct
        ));
        wt
    } else {
        format!("&{}", class.pytypestruct)
    };
    let new_func = if class.allow_subclassing { "PyObject_GC_New" } else { "PyObject_New" };
    ctx.after_call
        .write_code(&format!("{py_name} = {new_func}({}, {wrapper_type});", class.pystruct));
    if class.allow_subclassing {
        ctx.after_call.write_code(&format!("{py_name}->inst_dict = NULL;"));
    }

    if caller_owns {
        ctx.after_call.write_code(&format!("{py_name}->obj = {value};"));
    } else if class.memory_policy.is_ref_counted() {
        class.memory_policy.write_incref(ctx.after_call, &value);
        ctx.after_call.write_code(&format!("{py_name}->obj = {value};"));
    } else {
        ctx.after_call
            .write_code(&format!("{py_name}->obj = new {}(*{value});", class.full_name));
    }

    ctx.build_params.add_full("N", &[&py_name], true, None);
    rv.py_name = Some(py_name);
    Ok(())
}

pub(crate) fn class_value_return_reverse(
    rv: &mut ReturnValue,
    class: &Rc<ClassMeta>,
    ctx: &mut ReverseCtx,
) -> GenResult<()> {
    let py_name = ctx.declarations.declare_variable(&pystruct_ptr(class), "tmp_retval", None, None)?;
    ctx.parse_params.add_full(
        "O!",
        &[&format!("&{}", class.pytypestruct), &format!("&{py_name}")],
        None,
        true,
        false,
    );
    ctx.after_call.write_code(&format!("{} = *{py_name}->obj;", rv.value));
    rv.py_name = Some(py_name);
    Ok(())
}

pub(crate) fn class_ptr_return_reverse(
    rv: &mut ReturnValue,
    class: &Rc<ClassMeta>,
    ctx: &mut ReverseCtx,
) -> GenResult<()> {
    let py_name = ctx.declarations.declare_variable(&pystruct_ptr(class), "tmp_retval", None, None)?;
    ctx.parse_params.add_full(
        "O!",
        &[&format!("&{}", class.pytypestruct), &format!("&{py_name}")],
        None,
        true,
        false,
    );
    ctx.after_call.write_code(&format!("{} = {py_name}->obj;", rv.value));
    // The native caller gets its own reference when counting applies.
    class.memory_policy.write_incref(ctx.after_call, &rv.value);
    rv.py_name = Some(py_name);
    Ok(())
}
