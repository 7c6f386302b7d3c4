// String codecs: C strings and std::string, length-paired where possible.

use crate::error::GenResult;

use super::{ForwardCtx, ParamCodec, Parameter, ReturnCodec, ReturnValue, ReverseCtx, TypeRegistry};

pub fn register(registry: &mut TypeRegistry) {
    for name in ["char*", "const char*", "char const*"] {
        registry
            .register_param(name, ParamCodec::CString)
            .expect("duplicate builtin parameter type");
    }
    registry
        .register_param("std::string", ParamCodec::StdString)
        .expect("duplicate builtin parameter type");
    registry
        .register_param("std::string&", ParamCodec::StdStringRef)
        .expect("duplicate builtin parameter type");
    registry
        .register_return("std::string", ReturnCodec::StdString)
        .expect("duplicate builtin return type");
}

pub(crate) fn cstring_param(param: &mut Parameter, ctx: &mut ForwardCtx) -> GenResult<()> {
    let name = ctx.declarations.declare_variable(
        &param.ctype,
        &param.name,
        param.default_value.as_deref(),
        None,
    )?;
    let optional = param.default_value.is_some();
    ctx.parse_params.add_full("s", &[&format!("&{name}")], Some(&param.name), false, optional);
    ctx.call_params.push(name);
    Ok(())
}

pub(crate) fn cstring_param_reverse(param: &mut Parameter, ctx: &mut ReverseCtx) -> GenResult<()> {
    ctx.build_params.add("s", &[&param.value]);
    Ok(())
}

pub(crate) fn std_string_param(param: &mut Parameter, ctx: &mut ForwardCtx) -> GenResult<()> {
    let name = ctx.declarations.declare_variable("const char *", &param.name, None, None)?;
    let name_len =
        ctx.declarations.declare_variable("Py_ssize_t", &format!("{}_len", param.name), None, None)?;
    ctx.parse_params.add("s#", &[&format!("&{name}"), &format!("&{name_len}")], Some(&param.name));
    ctx.call_params.push(format!("std::string({name}, {name_len})"));
    Ok(())
}

pub(crate) fn std_string_param_reverse(
    param: &mut Parameter,
    ctx: &mut ReverseCtx,
) -> GenResult<()> {
    let ptr = ctx.declarations.declare_variable(
        "const char *",
        &format!("{}_ptr", param.name),
        None,
        None,
    )?;
    let len =
        ctx.declarations.declare_variable("Py_ssize_t", &format!("{}_len", param.name), None, None)?;
    ctx.before_call.write_code(&format!("{ptr} = {}.c_str();", param.value));
    ctx.before_call.write_code(&format!("{len} = {}.size();", param.value));
    ctx.build_params.add("s#", &[&ptr, &len]);
    Ok(())
}

/// `std::string&`: the wrapper owns a `std::string` temporary that the
/// reference binds to; IN fills it before the call, OUT returns it after.
pub(crate) fn std_string_ref_param(param: &mut Parameter, ctx: &mut ForwardCtx) -> GenResult<()> {
    let name = ctx.declarations.declare_variable("const char *", &param.name, None, None)?;
    let name_len =
        ctx.declarations.declare_variable("Py_ssize_t", &format!("{}_len", param.name), None, None)?;
    let name_std = ctx.declarations.declare_variable(
        "std::string",
        &format!("{}_std", param.name),
        None,
        None,
    )?;
    ctx.call_params.push(name_std.clone());

    if param.direction.is_in() {
        ctx.parse_params.add("s#", &[&format!("&{name}"), &format!("&{name_len}")], Some(&param.name));
        ctx.before_call
            .write_code(&format!("{name_std} = std::string({name}, {name_len});"));
    }
    if param.direction.is_out() {
        ctx.build_params
            .add("s#", &[&format!("{name_std}.c_str()"), &format!("{name_std}.size()")]);
    }
    Ok(())
}

pub(crate) fn std_string_ref_param_reverse(
    param: &mut Parameter,
    ctx: &mut ReverseCtx,
) -> GenResult<()> {
    let ptr = ctx.declarations.declare_variable(
        "const char *",
        &format!("{}_ptr", param.name),
        None,
        None,
    )?;
    let len =
        ctx.declarations.declare_variable("Py_ssize_t", &format!("{}_len", param.name), None, None)?;
    if param.direction.is_in() {
        ctx.before_call.write_code(&format!("{ptr} = {}.c_str();", param.value));
        ctx.before_call.write_code(&format!("{len} = {}.size();", param.value));
        ctx.build_params.add("s#", &[&ptr, &len]);
    }
    if param.direction.is_out() {
        ctx.parse_params.add("s#", &[&format!("&{ptr}"), &format!("&{len}")], Some(&param.name));
        ctx.after_call
            .write_code(&format!("{} = std::string({ptr}, {len});", param.value));
    }
    Ok(())
}

pub(crate) fn std_string_return(rv: &mut ReturnValue, ctx: &mut ForwardCtx) -> GenResult<()> {
    ctx.build_params.add_full(
        "s#",
        &[&format!("{}.c_str()", rv.value), &format!("{}.size()", rv.value)],
        true,
        None,
    );
    Ok(())
}

pub(crate) fn std_string_return_reverse(
    rv: &mut ReturnValue,
    ctx: &mut ReverseCtx,
) -> GenResult<()> {
    let ptr = ctx.declarations.declare_variable("const char *", "retval_ptr", None, None)?;
    let len = ctx.declarations.declare_variable("Py_ssize_t", "retval_len", None, None)?;
    ctx.parse_params.add_full("s#", &[&format!("&{ptr}"), &format!("&{len}")], None, true, false);
    ctx.after_call
        .write_code(&format!("{} = std::string({ptr}, {len});", rv.value));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests_support::Forward;
    use super::super::{Direction, Parameter, TypeRegistry};

    #[test]
    fn std_string_param_passes_a_length_paired_copy() {
        let registry = TypeRegistry::with_default_codecs();
        let mut param =
            Parameter::new(&registry, "std::string", "label", Direction::In, false).unwrap();
        let mut f = Forward::new();
        param.convert_script_to_native(&mut f.ctx()).unwrap();

        assert_eq!(
            f.parse_params.get_parameters().unwrap(),
            vec!["\"s#\"", "&label", "&label_len"]
        );
        assert_eq!(f.call_params, vec!["std::string(label, label_len)"]);
    }

    #[test]
    fn string_ref_out_param_round_trips_through_the_temporary() {
        let registry = TypeRegistry::with_default_codecs();
        let mut param =
            Parameter::new(&registry, "std::string&", "msg", Direction::InOut, false).unwrap();
        let mut f = Forward::new();
        param.convert_script_to_native(&mut f.ctx()).unwrap();

        assert_eq!(f.call_params, vec!["msg_std"]);
        assert_eq!(
            f.parse_params.get_parameters().unwrap(),
            vec!["\"s#\"", "&msg", "&msg_len"]
        );
        assert_eq!(
            f.build_params.get_parameters(),
            vec!["\"s#\"", "msg_std.c_str()", "msg_std.size()"]
        );
        assert_eq!(f.before_call.sink.flush(), "msg_std = std::string(msg, msg_len);\n");
    }
}
