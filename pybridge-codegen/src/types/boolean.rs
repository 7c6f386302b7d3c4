// Boolean codec: truth-tested objects inbound, PyBool outbound.

use crate::error::GenResult;

use super::{ForwardCtx, ParamCodec, Parameter, ReturnCodec, ReturnValue, ReverseCtx, TypeRegistry};

pub fn register(registry: &mut TypeRegistry) {
    registry.register_param("bool", ParamCodec::Bool).expect("duplicate builtin parameter type");
    registry.register_return("bool", ReturnCodec::Bool).expect("duplicate builtin return type");
}

/// Accept any object and truth-test it, matching python's own semantics
/// for boolean arguments.
pub(crate) fn bool_param(param: &mut Parameter, ctx: &mut ForwardCtx) -> GenResult<()> {
    let py_name = ctx.declarations.declare_variable(
        "PyObject*",
        &format!("py_{}", param.name),
        param.default_value.as_ref().map(|_| "NULL"),
        None,
    )?;
    let name = ctx.declarations.declare_variable("bool", &param.name, None, None)?;
    let optional = param.default_value.is_some();
    ctx.parse_params.add_full("O", &[&format!("&{py_name}")], Some(&param.name), false, optional);
    match &param.default_value {
        Some(default) => ctx.before_call.write_code(&format!(
            "{name} = {py_name} ? (bool) PyObject_IsTrue({py_name}) : {default};"
        )),
        None => ctx
            .before_call
            .write_code(&format!("{name} = (bool) PyObject_IsTrue({py_name});")),
    }
    ctx.call_params.push(name);
    Ok(())
}

pub(crate) fn bool_param_reverse(param: &mut Parameter, ctx: &mut ReverseCtx) -> GenResult<()> {
    ctx.build_params.add("N", &[&format!("PyBool_FromLong({})", param.value)]);
    Ok(())
}

pub(crate) fn bool_return(rv: &mut ReturnValue, ctx: &mut ForwardCtx) -> GenResult<()> {
    ctx.build_params.add_full("N", &[&format!("PyBool_FromLong({})", rv.value)], true, None);
    Ok(())
}

pub(crate) fn bool_return_reverse(rv: &mut ReturnValue, ctx: &mut ReverseCtx) -> GenResult<()> {
    let py_name = ctx.declarations.declare_variable("PyObject*", "py_boolretval", None, None)?;
    ctx.parse_params.add_full("O", &[&format!("&{py_name}")], None, true, false);
    ctx.after_call
        .write_code(&format!("{} = (bool) PyObject_IsTrue({py_name});", rv.value));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests_support::Forward;
    use super::super::{Direction, Parameter, TypeRegistry};

    #[test]
    fn bool_param_truth_tests_the_object() {
        let registry = TypeRegistry::with_default_codecs();
        let mut param = Parameter::new(&registry, "bool", "flag", Direction::In, false).unwrap();
        let mut f = Forward::new();
        param.convert_script_to_native(&mut f.ctx()).unwrap();

        assert_eq!(f.parse_params.get_parameters().unwrap(), vec!["\"O\"", "&py_flag"]);
        assert_eq!(f.before_call.sink.flush(), "flag = (bool) PyObject_IsTrue(py_flag);\n");
        assert_eq!(f.call_params, vec!["flag"]);
    }
}
