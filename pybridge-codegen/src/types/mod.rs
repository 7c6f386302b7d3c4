// Type descriptors, the handler registry, and type transformations.

pub mod boolean;
pub mod numeric;
pub mod object;
pub mod string;

#[cfg(test)]
pub(crate) mod tests_support;

use std::collections::HashMap;
use std::rc::Rc;

use crate::block::CodeBlock;
use crate::error::{GenError, GenResult};
use crate::marshal::{BuildValueParams, ParseTupleParams};
use crate::scope::DeclarationsScope;

pub use self::object::{ClassMeta, MemoryPolicy};

/// Data-transfer direction of a parameter. In/out parameters behave as
/// both: unpacked before the call and packed into the result tuple after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    InOut,
}

impl Direction {
    pub fn is_in(self) -> bool {
        matches!(self, Direction::In | Direction::InOut)
    }

    pub fn is_out(self) -> bool {
        matches!(self, Direction::Out | Direction::InOut)
    }

    pub fn parse(s: &str) -> Option<Direction> {
        match s {
            "in" => Some(Direction::In),
            "out" => Some(Direction::Out),
            "inout" => Some(Direction::InOut),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
            Direction::InOut => "inout",
        }
    }
}

/// A structural rewrite mapping a family of type strings onto an already
/// registered base type, plus the glue to move value expressions between
/// the two shapes. Typically used for smart-pointer templated types.
pub trait TypeTransformation {
    /// Given a transformed name, recover the base type name it reduces to
    /// (`SmartPtr<Foo>` → `Foo*`), or `None` if the name is not ours.
    fn untransformed_name(&self, name: &str) -> Option<String>;

    /// Rewrite a value expression of the base type into an equivalent
    /// expression of the transformed type.
    fn transform(
        &self,
        declarations: &mut DeclarationsScope,
        block: &mut CodeBlock,
        untransformed_ctype: &str,
        value: &str,
    ) -> String;

    /// Rewrite a value expression of the transformed type into an
    /// equivalent expression of the base type.
    fn untransform(
        &self,
        declarations: &mut DeclarationsScope,
        block: &mut CodeBlock,
        untransformed_ctype: &str,
        value: &str,
    ) -> String;
}

/// Reduces `Tpl<T>` to `T*` handling, for smart-pointer templates whose
/// raw pointer is reachable through a `get()` method.
pub struct SmartPointerTransformation {
    template: String,
}

impl SmartPointerTransformation {
    pub fn new(template: impl Into<String>) -> Self {
        SmartPointerTransformation { template: template.into() }
    }

    fn inner_type(untransformed_ctype: &str) -> &str {
        untransformed_ctype.trim_end_matches('*').trim_end()
    }
}

impl TypeTransformation for SmartPointerTransformation {
    fn untransformed_name(&self, name: &str) -> Option<String> {
        let rest = name.strip_prefix(&self.template)?.trim_start();
        let inner = rest.strip_prefix('<')?.strip_suffix('>')?.trim();
        if inner.is_empty() {
            return None;
        }
        Some(format!("{inner}*"))
    }

    fn transform(
        &self,
        _declarations: &mut DeclarationsScope,
        _block: &mut CodeBlock,
        untransformed_ctype: &str,
        value: &str,
    ) -> String {
        let inner = Self::inner_type(untransformed_ctype);
        format!("{}<{inner}>({value})", self.template)
    }

    fn untransform(
        &self,
        _declarations: &mut DeclarationsScope,
        _block: &mut CodeBlock,
        _untransformed_ctype: &str,
        value: &str,
    ) -> String {
        format!("{value}.get()")
    }
}

/// One variant per native type category a parameter handler exists for.
#[derive(Clone)]
pub enum ParamCodec {
    Int,
    UnsignedInt,
    Float,
    Double,
    Bool,
    Enum { full_name: String },
    IntPtr,
    IntRef,
    CString,
    StdString,
    StdStringRef,
    ClassValue { class: Rc<ClassMeta> },
    ClassPtr { class: Rc<ClassMeta> },
    ClassRef { class: Rc<ClassMeta> },
}

impl ParamCodec {
    /// Directions this category can legally be declared with.
    pub fn supported_directions(&self) -> &'static [Direction] {
        match self {
            ParamCodec::IntPtr | ParamCodec::IntRef | ParamCodec::StdStringRef => {
                &[Direction::In, Direction::Out, Direction::InOut]
            }
            _ => &[Direction::In],
        }
    }
}

/// One variant per native type category a return handler exists for.
#[derive(Clone)]
pub enum ReturnCodec {
    Void,
    Int,
    UnsignedInt,
    UInt8,
    UInt16,
    Float,
    Double,
    Bool,
    Enum { full_name: String },
    StdString,
    ClassValue { class: Rc<ClassMeta> },
    ClassPtr { class: Rc<ClassMeta> },
}

/// Mutable generation context handed to parameter/return hooks while a
/// forward wrapper body is being built.
pub struct ForwardCtx<'a> {
    pub declarations: &'a mut DeclarationsScope,
    pub before_parse: &'a mut CodeBlock,
    pub before_call: &'a mut CodeBlock,
    pub after_call: &'a mut CodeBlock,
    pub parse_params: &'a mut ParseTupleParams,
    pub build_params: &'a mut BuildValueParams,
    pub call_params: &'a mut Vec<String>,
}

/// Mutable generation context handed to parameter/return hooks while a
/// reverse wrapper body is being built.
pub struct ReverseCtx<'a> {
    pub declarations: &'a mut DeclarationsScope,
    pub before_call: &'a mut CodeBlock,
    pub after_call: &'a mut CodeBlock,
    pub parse_params: &'a mut ParseTupleParams,
    pub build_params: &'a mut BuildValueParams,
}

/// A callable parameter: canonical type, name, direction, and the codec
/// that generates its conversions. The `value` expression defaults to the
/// parameter's own name and may be rewritten during generation.
#[derive(Clone)]
pub struct Parameter {
    pub ctype: String,
    pub untransformed_ctype: String,
    pub name: String,
    pub direction: Direction,
    pub is_const: bool,
    pub value: String,
    pub codec: ParamCodec,
    pub transformation: Option<Rc<dyn TypeTransformation>>,
    /// Ownership of the pointed-to object passes to the callee. `None`
    /// means the declaration did not say; class-pointer codecs require an
    /// explicit answer unless the pointer target is const.
    pub transfer_ownership: Option<bool>,
    /// Index of the argument keeping this one alive: -1 the return value,
    /// 0 self, N>0 the N-th parameter.
    pub custodian: Option<i32>,
    pub null_ok: bool,
    pub default_value: Option<String>,
    /// Name of the python-side variable holding this parameter's wrapper,
    /// filled in during conversion; used for custodian bookkeeping.
    pub py_name: Option<String>,
}

impl std::fmt::Debug for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parameter")
            .field("ctype", &self.ctype)
            .field("untransformed_ctype", &self.untransformed_ctype)
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("is_const", &self.is_const)
            .field("value", &self.value)
            .field("transfer_ownership", &self.transfer_ownership)
            .field("custodian", &self.custodian)
            .field("null_ok", &self.null_ok)
            .field("default_value", &self.default_value)
            .field("py_name", &self.py_name)
            .finish_non_exhaustive()
    }
}

impl Parameter {
    pub fn new(
        registry: &TypeRegistry,
        ctype: &str,
        name: &str,
        direction: Direction,
        is_const: bool,
    ) -> GenResult<Parameter> {
        let ctype = if is_const && !ctype.contains("const") {
            format!("const {ctype}")
        } else {
            ctype.to_string()
        };
        let (codec, transformation) = registry.lookup_param(&ctype)?;
        if !codec.supported_directions().contains(&direction) {
            return Err(GenError::UnsupportedDirection {
                ctype,
                direction: direction.label().to_string(),
            });
        }
        let untransformed_ctype = match &transformation {
            Some(t) => t.untransformed_name(&ctype).unwrap_or_else(|| ctype.clone()),
            None => ctype.clone(),
        };
        Ok(Parameter {
            ctype,
            untransformed_ctype,
            value: name.to_string(),
            name: name.to_string(),
            direction,
            is_const,
            codec,
            transformation,
            transfer_ownership: None,
            custodian: None,
            null_ok: false,
            default_value: None,
            py_name: None,
        })
    }

    /// Apply one recognized annotation. Returns `Ok(false)` for keys this
    /// handler does not know, so the caller can warn about them.
    pub fn apply_annotation(&mut self, key: &str, value: &str) -> GenResult<bool> {
        match key {
            "transfer_ownership" => {
                if self.custodian.is_some() {
                    return Err(GenError::TypeConfiguration(
                        "transfer_ownership should not be given together with custodian".into(),
                    ));
                }
                self.transfer_ownership = Some(parse_annotation_bool(value)?);
                Ok(true)
            }
            "custodian" => {
                if self.transfer_ownership.is_some() {
                    return Err(GenError::TypeConfiguration(
                        "custodian should not be given together with transfer_ownership".into(),
                    ));
                }
                let index = value.parse::<i32>().map_err(|_| {
                    GenError::TypeConfiguration(format!("bad custodian index {value:?}"))
                })?;
                self.custodian = if index == 0 { Some(0) } else { Some(index) };
                Ok(true)
            }
            "null_ok" => {
                self.null_ok = parse_annotation_bool(value)?;
                Ok(true)
            }
            "default_value" => {
                self.default_value = Some(value.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Generate the python→native conversion for a forward wrapper.
    pub fn convert_script_to_native(&mut self, ctx: &mut ForwardCtx) -> GenResult<()> {
        let codec = self.codec.clone();
        match &codec {
            ParamCodec::Int => numeric::int_param(self, ctx),
            ParamCodec::UnsignedInt => numeric::unsigned_param(self, ctx),
            ParamCodec::Float => numeric::float_param(self, ctx),
            ParamCodec::Double => numeric::double_param(self, ctx),
            ParamCodec::Enum { full_name } => numeric::enum_param(self, full_name, ctx),
            ParamCodec::IntPtr => numeric::int_ptr_param(self, ctx),
            ParamCodec::IntRef => numeric::int_ref_param(self, ctx),
            ParamCodec::Bool => boolean::bool_param(self, ctx),
            ParamCodec::CString => string::cstring_param(self, ctx),
            ParamCodec::StdString => string::std_string_param(self, ctx),
            ParamCodec::StdStringRef => string::std_string_ref_param(self, ctx),
            ParamCodec::ClassValue { class } => object::class_value_param(self, class, ctx),
            ParamCodec::ClassPtr { class } => object::class_ptr_param(self, class, ctx),
            ParamCodec::ClassRef { class } => object::class_ref_param(self, class, ctx),
        }
    }

    /// Generate the native→python conversion for a reverse wrapper.
    pub fn convert_native_to_script(&mut self, ctx: &mut ReverseCtx) -> GenResult<()> {
        let codec = self.codec.clone();
        match &codec {
            ParamCodec::Int => numeric::int_param_reverse(self, ctx),
            ParamCodec::UnsignedInt => numeric::unsigned_param_reverse(self, ctx),
            ParamCodec::Float => numeric::float_param_reverse(self, ctx),
            ParamCodec::Double => numeric::double_param_reverse(self, ctx),
            ParamCodec::Enum { .. } => numeric::enum_param_reverse(self, ctx),
            ParamCodec::IntPtr => numeric::int_ptr_param_reverse(self, ctx),
            ParamCodec::IntRef => numeric::int_ref_param_reverse(self, ctx),
            ParamCodec::Bool => boolean::bool_param_reverse(self, ctx),
            ParamCodec::CString => string::cstring_param_reverse(self, ctx),
            ParamCodec::StdString => string::std_string_param_reverse(self, ctx),
            ParamCodec::StdStringRef => string::std_string_ref_param_reverse(self, ctx),
            ParamCodec::ClassValue { class } => object::class_value_param_reverse(self, class, ctx),
            ParamCodec::ClassPtr { class } => object::class_ptr_param_reverse(self, class, ctx),
            ParamCodec::ClassRef { class } => object::class_ref_param_reverse(self, class, ctx),
        }
    }
}

/// The return value of a callable. The `value` expression names the slot
/// holding the just-computed native result (`retval`).
#[derive(Clone)]
pub struct ReturnValue {
    pub ctype: String,
    pub untransformed_ctype: String,
    pub value: String,
    pub codec: ReturnCodec,
    pub transformation: Option<Rc<dyn TypeTransformation>>,
    pub caller_owns_return: Option<bool>,
    pub custodian: Option<i32>,
    /// Python-side wrapper variable, filled in during conversion.
    pub py_name: Option<String>,
}

impl ReturnValue {
    pub fn new(registry: &TypeRegistry, ctype: &str) -> GenResult<ReturnValue> {
        let (codec, transformation) = registry.lookup_return(ctype)?;
        let untransformed_ctype = match &transformation {
            Some(t) => t.untransformed_name(ctype).unwrap_or_else(|| ctype.to_string()),
            None => ctype.to_string(),
        };
        Ok(ReturnValue {
            ctype: ctype.to_string(),
            untransformed_ctype,
            value: "retval".to_string(),
            codec,
            transformation,
            caller_owns_return: None,
            custodian: None,
            py_name: None,
        })
    }

    /// Apply one recognized annotation; `Ok(false)` for unknown keys.
    pub fn apply_annotation(&mut self, key: &str, value: &str) -> GenResult<bool> {
        match key {
            "caller_owns_return" => {
                if self.custodian.is_some() {
                    return Err(GenError::TypeConfiguration(
                        "caller_owns_return should not be given together with custodian".into(),
                    ));
                }
                self.caller_owns_return = Some(parse_annotation_bool(value)?);
                Ok(true)
            }
            "custodian" => {
                if self.caller_owns_return.is_some() {
                    return Err(GenError::TypeConfiguration(
                        "custodian should not be given together with caller_owns_return".into(),
                    ));
                }
                let index = value.parse::<i32>().map_err(|_| {
                    GenError::TypeConfiguration(format!("bad custodian index {value:?}"))
                })?;
                self.custodian = Some(index);
                // A kept-alive return is always owned by the caller side.
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self.codec, ReturnCodec::Void)
    }

    /// Whether the native result slot cannot be default-constructed and
    /// must be declared at the call site instead of pre-declared.
    pub fn requires_assignment_constructor(&self) -> bool {
        matches!(self.codec, ReturnCodec::ClassValue { .. })
    }

    /// The `return <value>;` statement a reverse wrapper uses on error.
    pub fn error_return(&self) -> String {
        match &self.codec {
            ReturnCodec::Void => "return;".into(),
            ReturnCodec::Int | ReturnCodec::Enum { .. } => "return INT_MIN;".into(),
            ReturnCodec::UnsignedInt | ReturnCodec::UInt8 | ReturnCodec::UInt16 => {
                "return 0;".into()
            }
            ReturnCodec::Float | ReturnCodec::Double => "return 0;".into(),
            ReturnCodec::Bool => "return false;".into(),
            ReturnCodec::StdString => "return std::string();".into(),
            ReturnCodec::ClassValue { class } => format!("return {}();", class.full_name),
            ReturnCodec::ClassPtr { .. } => "return NULL;".into(),
        }
    }

    /// Generate the native→python conversion for a forward wrapper.
    pub fn convert_native_to_script(&mut self, ctx: &mut ForwardCtx) -> GenResult<()> {
        let codec = self.codec.clone();
        match &codec {
            ReturnCodec::Void => Ok(()),
            ReturnCodec::Int | ReturnCodec::UInt8 | ReturnCodec::UInt16 => {
                numeric::int_return(self, ctx)
            }
            ReturnCodec::UnsignedInt => numeric::unsigned_return(self, ctx),
            ReturnCodec::Float => numeric::float_return(self, ctx),
            ReturnCodec::Double => numeric::double_return(self, ctx),
            ReturnCodec::Enum { .. } => numeric::enum_return(self, ctx),
            ReturnCodec::Bool => boolean::bool_return(self, ctx),
            ReturnCodec::StdString => string::std_string_return(self, ctx),
            ReturnCodec::ClassValue { class } => object::class_value_return(self, class, ctx),
            ReturnCodec::ClassPtr { class } => object::class_ptr_return(self, class, ctx),
        }
    }

    /// Generate the python→native conversion for a reverse wrapper.
    pub fn convert_script_to_native(&mut self, ctx: &mut ReverseCtx) -> GenResult<()> {
        let codec = self.codec.clone();
        match &codec {
            ReturnCodec::Void => Ok(()),
            ReturnCodec::Int => numeric::int_return_reverse(self, ctx),
            ReturnCodec::UnsignedInt => numeric::unsigned_return_reverse(self, ctx),
            ReturnCodec::UInt8 => numeric::small_uint_return_reverse(self, "0xff", ctx),
            ReturnCodec::UInt16 => numeric::small_uint_return_reverse(self, "0xffff", ctx),
            ReturnCodec::Float => numeric::float_return_reverse(self, ctx),
            ReturnCodec::Double => numeric::double_return_reverse(self, ctx),
            ReturnCodec::Enum { .. } => numeric::enum_return_reverse(self, ctx),
            ReturnCodec::Bool => boolean::bool_return_reverse(self, ctx),
            ReturnCodec::StdString => string::std_string_return_reverse(self, ctx),
            ReturnCodec::ClassValue { class } => {
                object::class_value_return_reverse(self, class, ctx)
            }
            ReturnCodec::ClassPtr { class } => object::class_ptr_return_reverse(self, class, ctx),
        }
    }
}

pub(crate) fn parse_annotation_bool(value: &str) -> GenResult<bool> {
    match value {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(GenError::TypeConfiguration(format!("bad boolean annotation value {value:?}"))),
    }
}

/// Maps canonical type strings to handler codecs, one table for each
/// conversion role. Built once by an explicit initialization call and then
/// passed by reference through the generation pipeline.
pub struct TypeRegistry {
    params: HashMap<String, ParamCodec>,
    returns: HashMap<String, ReturnCodec>,
    transformations: Vec<Rc<dyn TypeTransformation>>,
}

impl TypeRegistry {
    /// An empty registry with no handlers at all.
    pub fn new() -> Self {
        TypeRegistry {
            params: HashMap::new(),
            returns: HashMap::new(),
            transformations: Vec::new(),
        }
    }

    /// A registry preloaded with every built-in type category.
    pub fn with_default_codecs() -> Self {
        let mut registry = TypeRegistry::new();
        numeric::register(&mut registry);
        boolean::register(&mut registry);
        string::register(&mut registry);
        registry
    }

    pub fn register_param(&mut self, ctype: &str, codec: ParamCodec) -> GenResult<()> {
        if self.params.contains_key(ctype) {
            return Err(GenError::TypeConflict { table: "parameter", ctype: ctype.to_string() });
        }
        self.params.insert(ctype.to_string(), codec);
        Ok(())
    }

    pub fn register_return(&mut self, ctype: &str, codec: ReturnCodec) -> GenResult<()> {
        if self.returns.contains_key(ctype) {
            return Err(GenError::TypeConflict { table: "return", ctype: ctype.to_string() });
        }
        self.returns.insert(ctype.to_string(), codec);
        Ok(())
    }

    /// Register a structural type transformation, tried in registration
    /// order when a direct lookup misses.
    pub fn register_transformation(&mut self, transformation: Rc<dyn TypeTransformation>) {
        self.transformations.push(transformation);
    }

    /// Register handlers for a wrapped class: by-value, pointer, and
    /// reference parameters; by-value and pointer returns. Both the short
    /// name and the namespace-qualified name are claimed.
    pub fn register_class(&mut self, class: &Rc<ClassMeta>) -> GenResult<()> {
        for name in class.type_names() {
            self.register_param(&name, ParamCodec::ClassValue { class: Rc::clone(class) })?;
            self.register_param(
                &format!("{name}*"),
                ParamCodec::ClassPtr { class: Rc::clone(class) },
            )?;
            self.register_param(
                &format!("{name}&"),
                ParamCodec::ClassRef { class: Rc::clone(class) },
            )?;
            self.register_return(&name, ReturnCodec::ClassValue { class: Rc::clone(class) })?;
            self.register_return(
                &format!("{name}*"),
                ReturnCodec::ClassPtr { class: Rc::clone(class) },
            )?;
        }
        Ok(())
    }

    /// Register int-backed handlers for an enum under both its short and
    /// qualified names.
    pub fn register_enum(&mut self, name: &str, full_name: &str) -> GenResult<()> {
        let mut names = vec![name.to_string()];
        if full_name != name {
            names.push(full_name.to_string());
        }
        for n in &names {
            self.register_param(n, ParamCodec::Enum { full_name: full_name.to_string() })?;
            self.register_return(n, ReturnCodec::Enum { full_name: full_name.to_string() })?;
        }
        Ok(())
    }

    /// Look up the parameter handler for a type string: a direct hit
    /// first, then each registered transformation in registration order.
    pub fn lookup_param(
        &self,
        ctype: &str,
    ) -> GenResult<(ParamCodec, Option<Rc<dyn TypeTransformation>>)> {
        if let Some(codec) = self.params.get(ctype) {
            return Ok((codec.clone(), None));
        }
        for transformation in &self.transformations {
            if let Some(base) = transformation.untransformed_name(ctype) {
                if let Some(codec) = self.params.get(&base) {
                    return Ok((codec.clone(), Some(Rc::clone(transformation))));
                }
            }
        }
        Err(GenError::UnknownType { table: "parameter", ctype: ctype.to_string() })
    }

    /// Same as [`lookup_param`], for the return table.
    ///
    /// [`lookup_param`]: TypeRegistry::lookup_param
    pub fn lookup_return(
        &self,
        ctype: &str,
    ) -> GenResult<(ReturnCodec, Option<Rc<dyn TypeTransformation>>)> {
        if let Some(codec) = self.returns.get(ctype) {
            return Ok((codec.clone(), None));
        }
        for transformation in &self.transformations {
            if let Some(base) = transformation.untransformed_name(ctype) {
                if let Some(codec) = self.returns.get(&base) {
                    return Ok((codec.clone(), Some(Rc::clone(transformation))));
                }
            }
        }
        Err(GenError::UnknownType { table: "return", ctype: ctype.to_string() })
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_default_codecs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_lookup_returns_no_transformation() {
        let registry = TypeRegistry::with_default_codecs();
        let (codec, transformation) = registry.lookup_param("int").unwrap();
        assert!(matches!(codec, ParamCodec::Int));
        assert!(transformation.is_none());
    }

    #[test]
    fn transformed_lookup_returns_the_transformation() {
        let mut registry = TypeRegistry::with_default_codecs();
        let class = tests_support::plain_class("Zipper");
        registry.register_class(&class).unwrap();
        registry.register_transformation(Rc::new(SmartPointerTransformation::new("SmartPtr")));

        let (codec, transformation) = registry.lookup_param("SmartPtr<Zipper>").unwrap();
        assert!(matches!(codec, ParamCodec::ClassPtr { .. }));
        let transformation = transformation.expect("transformation attached");
        assert_eq!(transformation.untransformed_name("SmartPtr<Zipper>").unwrap(), "Zipper*");
    }

    #[test]
    fn unknown_type_fails_lookup() {
        let registry = TypeRegistry::with_default_codecs();
        assert!(matches!(
            registry.lookup_param("struct mystery"),
            Err(GenError::UnknownType { .. })
        ));
    }

    #[test]
    fn duplicate_registration_conflicts() {
        let mut registry = TypeRegistry::with_default_codecs();
        assert!(matches!(
            registry.register_param("int", ParamCodec::Int),
            Err(GenError::TypeConflict { .. })
        ));
    }

    #[test]
    fn in_only_types_reject_out_direction() {
        let registry = TypeRegistry::with_default_codecs();
        let err = Parameter::new(&registry, "int", "x", Direction::Out, false).unwrap_err();
        assert!(matches!(err, GenError::UnsupportedDirection { .. }));
        assert!(Parameter::new(&registry, "int*", "x", Direction::Out, false).is_ok());
    }

    #[test]
    fn const_qualification_prefixes_the_type() {
        let registry = TypeRegistry::with_default_codecs();
        let param = Parameter::new(&registry, "char*", "s", Direction::In, true).unwrap();
        assert_eq!(param.ctype, "const char*");
    }

    #[test]
    fn ownership_and_custodian_are_mutually_exclusive() {
        let registry = TypeRegistry::with_default_codecs();
        let mut param = Parameter::new(&registry, "int", "x", Direction::In, false).unwrap();
        param.apply_annotation("custodian", "1").unwrap();
        assert!(param.apply_annotation("transfer_ownership", "true").is_err());
        assert!(!param.apply_annotation("made_up_key", "1").unwrap());
    }
}
