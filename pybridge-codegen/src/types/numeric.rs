// Integer and floating-point codecs.

use crate::error::GenResult;

use super::{ForwardCtx, Parameter, ParamCodec, ReturnCodec, ReturnValue, ReverseCtx, TypeRegistry};

/// Register every numeric type category.
pub fn register(registry: &mut TypeRegistry) {
    // These registrations cannot conflict: the registry starts empty and
    // each name appears once.
    let entries: &[(&str, ParamCodec)] = &[
        ("int", ParamCodec::Int),
        ("unsigned int", ParamCodec::UnsignedInt),
        ("uint32_t", ParamCodec::UnsignedInt),
        ("float", ParamCodec::Float),
        ("double", ParamCodec::Double),
        ("int*", ParamCodec::IntPtr),
        ("int&", ParamCodec::IntRef),
    ];
    for (name, codec) in entries {
        registry.register_param(name, codec.clone()).expect("duplicate builtin parameter type");
    }
    let returns: &[(&str, ReturnCodec)] = &[
        ("void", ReturnCodec::Void),
        ("int", ReturnCodec::Int),
        ("unsigned int", ReturnCodec::UnsignedInt),
        ("uint32_t", ReturnCodec::UnsignedInt),
        ("uint8_t", ReturnCodec::UInt8),
        ("uint16_t", ReturnCodec::UInt16),
        ("float", ReturnCodec::Float),
        ("double", ReturnCodec::Double),
    ];
    for (name, codec) in returns {
        registry.register_return(name, codec.clone()).expect("duplicate builtin return type");
    }
}

fn scalar_param(param: &mut Parameter, marker: &str, ctx: &mut ForwardCtx) -> GenResult<()> {
    let name = ctx.declarations.declare_variable(
        &param.ctype,
        &param.name,
        param.default_value.as_deref(),
        None,
    )?;
    let optional = param.default_value.is_some();
    ctx.parse_params.add_full(marker, &[&format!("&{name}")], Some(&param.name), false, optional);
    ctx.call_params.push(name);
    Ok(())
}

pub(crate) fn int_param(param: &mut Parameter, ctx: &mut ForwardCtx) -> GenResult<()> {
    scalar_param(param, "i", ctx)
}

pub(crate) fn unsigned_param(param: &mut Parameter, ctx: &mut ForwardCtx) -> GenResult<()> {
    scalar_param(param, "I", ctx)
}

pub(crate) fn float_param(param: &mut Parameter, ctx: &mut ForwardCtx) -> GenResult<()> {
    scalar_param(param, "f", ctx)
}

pub(crate) fn double_param(param: &mut Parameter, ctx: &mut ForwardCtx) -> GenResult<()> {
    scalar_param(param, "d", ctx)
}

/// Enums ride the `int` marker; the native temporary keeps the enum type.
pub(crate) fn enum_param(
    param: &mut Parameter,
    full_name: &str,
    ctx: &mut ForwardCtx,
) -> GenResult<()> {
    let name = ctx.declarations.declare_variable(full_name, &param.name, None, None)?;
    ctx.parse_params.add("i", &[&format!("&{name}")], Some(&param.name));
    ctx.call_params.push(name);
    Ok(())
}

pub(crate) fn int_param_reverse(param: &mut Parameter, ctx: &mut ReverseCtx) -> GenResult<()> {
    ctx.build_params.add("i", &[&param.value]);
    Ok(())
}

pub(crate) fn unsigned_param_reverse(param: &mut Parameter, ctx: &mut ReverseCtx) -> GenResult<()> {
    ctx.build_params.add("I", &[&param.value]);
    Ok(())
}

pub(crate) fn float_param_reverse(param: &mut Parameter, ctx: &mut ReverseCtx) -> GenResult<()> {
    ctx.build_params.add("f", &[&param.value]);
    Ok(())
}

pub(crate) fn double_param_reverse(param: &mut Parameter, ctx: &mut ReverseCtx) -> GenResult<()> {
    ctx.build_params.add("d", &[&param.value]);
    Ok(())
}

pub(crate) fn enum_param_reverse(param: &mut Parameter, ctx: &mut ReverseCtx) -> GenResult<()> {
    ctx.build_params.add("i", &[&param.value]);
    Ok(())
}

/// `int*` parameter: the wrapper owns the storage and passes its address;
/// IN reads it from the arguments, OUT appends it to the result tuple.
pub(crate) fn int_ptr_param(param: &mut Parameter, ctx: &mut ForwardCtx) -> GenResult<()> {
    let base = param.ctype.trim_end_matches('*').trim_end();
    let name = ctx.declarations.declare_variable(base, &param.name, None, None)?;
    ctx.call_params.push(format!("&{name}"));
    if param.direction.is_in() {
        ctx.parse_params.add("i", &[&format!("&{name}")], Some(&param.name));
    }
    if param.direction.is_out() {
        ctx.build_params.add("i", &[&name]);
    }
    Ok(())
}

pub(crate) fn int_ptr_param_reverse(param: &mut Parameter, ctx: &mut ReverseCtx) -> GenResult<()> {
    if param.direction.is_in() {
        ctx.build_params.add("i", &[&format!("*{}", param.value)]);
    }
    if param.direction.is_out() {
        ctx.parse_params.add("i", &[&param.value], Some(&param.name));
    }
    Ok(())
}

pub(crate) fn int_ref_param(param: &mut Parameter, ctx: &mut ForwardCtx) -> GenResult<()> {
    let base = param.ctype.trim_end_matches('&').trim_end();
    let name = ctx.declarations.declare_variable(base, &param.name, None, None)?;
    ctx.call_params.push(name.clone());
    if param.direction.is_in() {
        ctx.parse_params.add("i", &[&format!("&{name}")], Some(&param.name));
    }
    if param.direction.is_out() {
        ctx.build_params.add("i", &[&name]);
    }
    Ok(())
}

pub(crate) fn int_ref_param_reverse(param: &mut Parameter, ctx: &mut ReverseCtx) -> GenResult<()> {
    if param.direction.is_in() {
        ctx.build_params.add("i", &[&param.value]);
    }
    if param.direction.is_out() {
        ctx.parse_params.add("i", &[&format!("&{}", param.value)], Some(&param.name));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Returns
// ---------------------------------------------------------------------------

pub(crate) fn int_return(rv: &mut ReturnValue, ctx: &mut ForwardCtx) -> GenResult<()> {
    ctx.build_params.add_full("i", &[&rv.value], true, None);
    Ok(())
}

pub(crate) fn unsigned_return(rv: &mut ReturnValue, ctx: &mut ForwardCtx) -> GenResult<()> {
    ctx.build_params.add_full("I", &[&rv.value], true, None);
    Ok(())
}

pub(crate) fn float_return(rv: &mut ReturnValue, ctx: &mut ForwardCtx) -> GenResult<()> {
    ctx.build_params.add_full("f", &[&rv.value], true, None);
    Ok(())
}

pub(crate) fn double_return(rv: &mut ReturnValue, ctx: &mut ForwardCtx) -> GenResult<()> {
    ctx.build_params.add_full("d", &[&rv.value], true, None);
    Ok(())
}

pub(crate) fn enum_return(rv: &mut ReturnValue, ctx: &mut ForwardCtx) -> GenResult<()> {
    ctx.build_params.add_full("i", &[&rv.value], true, None);
    Ok(())
}

pub(crate) fn int_return_reverse(rv: &mut ReturnValue, ctx: &mut ReverseCtx) -> GenResult<()> {
    ctx.parse_params.add_full("i", &[&format!("&{}", rv.value)], None, true, false);
    Ok(())
}

pub(crate) fn unsigned_return_reverse(rv: &mut ReturnValue, ctx: &mut ReverseCtx) -> GenResult<()> {
    ctx.parse_params.add_full("I", &[&format!("&{}", rv.value)], None, true, false);
    Ok(())
}

/// Narrow unsigned returns parse into an `int` and range-check before
/// assignment, raising `ValueError` past `max_literal`.
pub(crate) fn small_uint_return_reverse(
    rv: &mut ReturnValue,
    max_literal: &str,
    ctx: &mut ReverseCtx,
) -> GenResult<()> {
    let tmp = ctx.declarations.declare_variable("int", "tmp", None, None)?;
    ctx.parse_params.add_full("i", &[&format!("&{tmp}")], None, true, false);
    ctx.after_call.write_error_check(
        &format!("{tmp} > {max_literal}"),
        Some("PyErr_SetString(PyExc_ValueError, \"Out of range\");"),
    );
    ctx.after_call.write_code(&format!("{} = {tmp};", rv.value));
    Ok(())
}

pub(crate) fn float_return_reverse(rv: &mut ReturnValue, ctx: &mut ReverseCtx) -> GenResult<()> {
    ctx.parse_params.add_full("f", &[&format!("&{}", rv.value)], None, true, false);
    Ok(())
}

pub(crate) fn double_return_reverse(rv: &mut ReturnValue, ctx: &mut ReverseCtx) -> GenResult<()> {
    ctx.parse_params.add_full("d", &[&format!("&{}", rv.value)], None, true, false);
    Ok(())
}

pub(crate) fn enum_return_reverse(rv: &mut ReturnValue, ctx: &mut ReverseCtx) -> GenResult<()> {
    let tmp = ctx.declarations.declare_variable("int", "retval_as_int", None, None)?;
    ctx.parse_params.add_full("i", &[&format!("&{tmp}")], None, true, false);
    ctx.after_call.write_code(&format!("{} = ({}) {tmp};", rv.value, rv.ctype));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests_support::{Forward, Reverse};
    use super::super::{Direction, Parameter, TypeRegistry};

    #[test]
    fn int_param_declares_parses_and_passes() {
        let registry = TypeRegistry::with_default_codecs();
        let mut param = Parameter::new(&registry, "int", "count", Direction::In, false).unwrap();
        let mut f = Forward::new();
        param.convert_script_to_native(&mut f.ctx()).unwrap();

        assert_eq!(f.call_params, vec!["count"]);
        assert_eq!(
            f.parse_params.get_parameters().unwrap(),
            vec!["\"i\"", "&count"]
        );
        assert_eq!(
            f.parse_params.get_keywords().unwrap(),
            Some(vec!["count".to_string()])
        );
    }

    #[test]
    fn default_value_makes_the_entry_optional() {
        let registry = TypeRegistry::with_default_codecs();
        let mut param = Parameter::new(&registry, "int", "count", Direction::In, false).unwrap();
        param.apply_annotation("default_value", "5").unwrap();
        let mut f = Forward::new();
        param.convert_script_to_native(&mut f.ctx()).unwrap();

        assert_eq!(f.parse_params.get_parameters().unwrap(), vec!["\"|i\"", "&count"]);
        let mut sink = crate::sink::CodeSink::new();
        f.declarations.flush_to(&mut sink);
        assert_eq!(sink.flush(), "int count = 5;\n");
    }

    #[test]
    fn int_ptr_inout_contributes_to_both_sides() {
        let registry = TypeRegistry::with_default_codecs();
        let mut param = Parameter::new(&registry, "int*", "size", Direction::InOut, false).unwrap();
        let mut f = Forward::new();
        param.convert_script_to_native(&mut f.ctx()).unwrap();

        assert_eq!(f.call_params, vec!["&size"]);
        assert_eq!(f.parse_params.get_parameters().unwrap(), vec!["\"i\"", "&size"]);
        assert_eq!(f.build_params.get_parameters(), vec!["\"i\"", "size"]);
    }

    #[test]
    fn int_ptr_out_only_skips_the_parse_side() {
        let registry = TypeRegistry::with_default_codecs();
        let mut param = Parameter::new(&registry, "int*", "size", Direction::Out, false).unwrap();
        let mut f = Forward::new();
        param.convert_script_to_native(&mut f.ctx()).unwrap();

        assert_eq!(f.parse_params.get_parameters().unwrap(), vec!["\"\""]);
        assert_eq!(f.build_params.get_parameters(), vec!["\"i\"", "size"]);
    }

    #[test]
    fn reverse_int_param_packs_its_value() {
        let registry = TypeRegistry::with_default_codecs();
        let mut param = Parameter::new(&registry, "int", "count", Direction::In, false).unwrap();
        let mut r = Reverse::new();
        param.convert_native_to_script(&mut r.ctx()).unwrap();
        assert_eq!(r.build_params.get_parameters(), vec!["\"i\"", "count"]);
    }
}
