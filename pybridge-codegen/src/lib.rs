// pybridge-codegen: turns declarative C/C++ API descriptions into the C++
// source of a Python extension module.

pub mod block;
pub mod config;
pub mod error;
pub mod r#gen;
pub mod marshal;
pub mod naming;
pub mod schema;
pub mod scope;
pub mod sink;
pub mod types;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{info, warn};

use crate::config::GenConfig;
use crate::error::{GenError, GenResult, ScanWarning};
use crate::r#gen::class::ClassGen;
use crate::r#gen::function::FunctionWrapper;
use crate::r#gen::method::{ConstructorWrapper, MethodWrapper};
use crate::r#gen::module::{EnumGen, ExceptionGen, ModuleGen};
use crate::r#gen::reverse::VirtualProxyWrapper;
use crate::r#gen::ExceptionMeta;
use crate::schema::{
    Annotations, DeclarationsFile, FunctionDecl, MethodDecl, ParamDecl, SourceLocation,
};
use crate::sink::CodeSink;
use crate::types::{
    parse_annotation_bool, ClassMeta, Direction, MemoryPolicy, Parameter, ReturnValue,
    SmartPointerTransformation, TypeRegistry,
};

/// Result of one generation run.
pub struct GenerateSummary {
    pub output: PathBuf,
    pub functions: usize,
    pub classes: usize,
    pub enums: usize,
    pub exceptions: usize,
    /// Callables dropped because their generation failed.
    pub skipped: usize,
    pub warnings: Vec<ScanWarning>,
}

/// Run the generate command. Main entry point.
pub fn run_generate(config_path: &Path) -> GenResult<GenerateSummary> {
    let config = GenConfig::load(config_path)?;
    run_with_config(&config, config_path.parent().unwrap_or(Path::new(".")))
}

/// Like [`run_generate`], with an already loaded (possibly overridden)
/// configuration. Paths are resolved relative to `config_dir`.
pub fn run_with_config(config: &GenConfig, config_dir: &Path) -> GenResult<GenerateSummary> {
    let decl_path = config_dir.join(&config.paths.declarations);
    let data = std::fs::read_to_string(&decl_path)
        .map_err(|e| GenError::Io { path: decl_path.clone(), message: e.to_string() })?;
    let decls: DeclarationsFile = serde_json::from_str(&data)
        .map_err(|e| GenError::Parse { path: decl_path.clone(), message: e.to_string() })?;
    info!(
        declarations = %decl_path.display(),
        functions = decls.functions.len(),
        classes = decls.classes.len(),
        "loaded declaration input"
    );

    let (source, mut summary) = generate_source(config, &decls)?;
    for warning in &summary.warnings {
        match (&warning.file, warning.line) {
            (Some(file), Some(line)) => warn!(file = %file, line, "{}", warning.message),
            _ => warn!("{}", warning.message),
        }
    }

    let output_path = config_dir.join(&config.paths.output);
    std::fs::write(&output_path, source)
        .map_err(|e| GenError::Io { path: output_path.clone(), message: e.to_string() })?;
    summary.output = output_path;
    info!(
        output = %summary.output.display(),
        functions = summary.functions,
        classes = summary.classes,
        skipped = summary.skipped,
        "generation complete"
    );
    Ok(summary)
}

/// Build and render the module without touching the filesystem.
pub fn generate_source(
    config: &GenConfig,
    decls: &DeclarationsFile,
) -> GenResult<(String, GenerateSummary)> {
    let mut warnings = Vec::new();
    let (mut module, skipped) = build_module(config, decls, &mut warnings)?;
    let summary = GenerateSummary {
        output: PathBuf::new(),
        functions: module.functions.len(),
        classes: module.classes.len(),
        enums: module.enums.len(),
        exceptions: module.exceptions.len(),
        skipped,
        warnings,
    };
    let mut sink = CodeSink::new();
    module.generate(&mut sink)?;
    Ok((sink.flush(), summary))
}

/// Translate the declaration input into a fully populated module
/// generator. Failures are isolated per callable: the offending one is
/// skipped with a warning, and a class whose constructors all fail is
/// marked unconstructable instead of aborting.
fn build_module(
    config: &GenConfig,
    decls: &DeclarationsFile,
    warnings: &mut Vec<ScanWarning>,
) -> GenResult<(ModuleGen, usize)> {
    let mut registry = TypeRegistry::with_default_codecs();
    for sp in &config.smart_pointers {
        registry.register_transformation(Rc::new(SmartPointerTransformation::new(&*sp.template)));
    }

    let mut module = ModuleGen::new(&config.module.name);
    module.cpp_namespace = config.module.cpp_namespace.clone();
    module.docstring = config.module.docstring.clone();
    module.includes = config.scan.headers.iter().map(|h| format!("\"{h}\"")).collect();

    let ns = config.module.cpp_namespace.as_deref();
    let prefix = &config.module.name_prefix;
    let strip = config.module.effective_strip_prefix();
    let mut skipped = 0usize;

    let in_whitelist = |location: Option<&SourceLocation>| -> bool {
        if config.scan.whitelist_paths.is_empty() {
            return true;
        }
        match location {
            Some(loc) => {
                config.scan.whitelist_paths.iter().any(|w| loc.file.starts_with(w.as_str()))
            }
            None => true,
        }
    };

    // Exceptions come first so throw lists can reference them.
    let mut exception_metas: HashMap<String, Rc<ExceptionMeta>> = HashMap::new();
    for decl in &decls.exceptions {
        if !in_whitelist(decl.location.as_ref()) {
            continue;
        }
        let meta = Rc::new(ExceptionMeta::new(&decl.name, ns, prefix));
        let parent = match &decl.parent {
            Some(parent_name) => match exception_metas.get(parent_name) {
                Some(parent) => Some(Rc::clone(parent)),
                None => {
                    warn_at(
                        warnings,
                        decl.location.as_ref(),
                        format!(
                            "unknown parent exception {parent_name:?}; registering {:?} without one",
                            decl.name
                        ),
                    );
                    None
                }
            },
            None => None,
        };
        exception_metas.insert(decl.name.clone(), Rc::clone(&meta));
        module.add_exception(ExceptionGen { meta, parent, docstring: decl.docstring.clone() });
    }

    // Enums register int-backed handlers and module constants.
    for decl in &decls.enums {
        if !in_whitelist(decl.location.as_ref()) {
            continue;
        }
        let full_name = qualified_name(ns, decl.cpp_namespace.as_deref(), &decl.name);
        if let Err(err) = registry.register_enum(&decl.name, &full_name) {
            warn_at(
                warnings,
                decl.location.as_ref(),
                format!("skipping enum {:?}: {err}", decl.name),
            );
            skipped += 1;
            continue;
        }
        module.add_enum(EnumGen {
            name: decl.name.clone(),
            values: decl.values.clone(),
            values_prefix: decl.values_prefix.clone(),
            cpp_namespace: decl.cpp_namespace.clone(),
        });
    }

    // Classes register their type handlers before any callable is built,
    // so methods and functions can pass instances of any wrapped class.
    let mut class_metas: HashMap<String, Rc<ClassMeta>> = HashMap::new();
    for decl in &decls.classes {
        if !in_whitelist(decl.location.as_ref()) {
            continue;
        }
        let mut meta = ClassMeta::new(&decl.name, ns, prefix);
        meta.allow_subclassing = config.settings.allow_subclassing;
        meta.automatic_type_narrowing = config.settings.automatic_type_narrowing;
        meta.docstring = decl.docstring.clone();
        let ignored =
            match apply_class_annotations(&mut meta, &decl.annotations, decl.location.as_ref(), warnings) {
                Ok(ignored) => ignored,
                Err(err) => {
                    warn_at(
                        warnings,
                        decl.location.as_ref(),
                        format!("skipping class {:?}: {err}", decl.name),
                    );
                    skipped += 1;
                    continue;
                }
            };
        if ignored {
            continue;
        }
        let meta = Rc::new(meta);
        if let Err(err) = registry.register_class(&meta) {
            warn_at(
                warnings,
                decl.location.as_ref(),
                format!("skipping class {:?}: {err}", decl.name),
            );
            skipped += 1;
            continue;
        }
        class_metas.insert(decl.name.clone(), meta);
    }

    // Free functions, possibly folded into classes as methods.
    let mut folded: Vec<(String, MethodWrapper)> = Vec::new();
    for decl in &decls.functions {
        if !in_whitelist(decl.location.as_ref()) {
            continue;
        }
        let location = decl.location.as_ref();

        let mut ignore = false;
        let mut custom_name = None;
        let mut as_method = None;
        let mut of_class = None;
        for (key, value) in &decl.annotations {
            match key.as_str() {
                "ignore" => ignore = annotation_bool_or_warn(value, location, warnings),
                "name" => custom_name = Some(value.clone()),
                "as_method" => as_method = Some(value.clone()),
                "of_class" => of_class = Some(value.clone()),
                _ => warn_at(
                    warnings,
                    location,
                    format!("unknown annotation key `{key}` on function {:?}", decl.name),
                ),
            }
        }
        if ignore {
            continue;
        }

        let (rv, params, throws) =
            match build_function_parts(&registry, &exception_metas, decl, warnings) {
                Ok(parts) => parts,
                Err(err) => {
                    warn_at(
                        warnings,
                        location,
                        format!("skipping function {:?}: {err}", decl.name),
                    );
                    skipped += 1;
                    continue;
                }
            };

        match (as_method, of_class) {
            (Some(method_name), Some(class_name)) => {
                let Some(class) = class_metas.get(&class_name) else {
                    warn_at(
                        warnings,
                        location,
                        format!(
                            "function {:?} names unknown class {class_name:?} in of_class",
                            decl.name
                        ),
                    );
                    skipped += 1;
                    continue;
                };
                match MethodWrapper::new(class, rv, &method_name, params) {
                    Ok(mut method) => {
                        method.call_target_function = Some(qualified_name(ns, None, &decl.name));
                        method.throws = throws;
                        method.docstring = decl.docstring.clone();
                        method.wrapper.unblock_threads = config.settings.unblock_threads;
                        folded.push((class_name, method));
                    }
                    Err(err) => {
                        warn_at(
                            warnings,
                            location,
                            format!("skipping function {:?}: {err}", decl.name),
                        );
                        skipped += 1;
                    }
                }
            }
            (None, None) => {
                let python_name = custom_name
                    .unwrap_or_else(|| naming::strip_prefix(&strip, &decl.name).to_string());
                match FunctionWrapper::new(rv, &decl.name, params, prefix) {
                    Ok(mut func) => {
                        func.cpp_namespace = ns.filter(|n| *n != "::").map(|n| n.to_string());
                        func.throws = throws;
                        func.docstring = decl.docstring.clone();
                        func.wrapper.unblock_threads = config.settings.unblock_threads;
                        module.add_function(&python_name, func);
                    }
                    Err(err) => {
                        warn_at(
                            warnings,
                            location,
                            format!("skipping function {:?}: {err}", decl.name),
                        );
                        skipped += 1;
                    }
                }
            }
            _ => {
                warn_at(
                    warnings,
                    location,
                    format!(
                        "function {:?}: as_method and of_class must be given together",
                        decl.name
                    ),
                );
                skipped += 1;
            }
        }
    }

    // Class bodies: constructors, methods, virtual proxies.
    for decl in &decls.classes {
        let Some(meta) = class_metas.get(&decl.name) else { continue };
        let mut class_gen = ClassGen::new(Rc::clone(meta));

        let mut any_constructor = false;
        let mut failed_constructor = false;
        for ctor in &decl.constructors {
            let parts = build_parameters(&registry, &ctor.params, ctor.location.as_ref(), warnings)
                .and_then(|params| {
                    resolve_throws(&exception_metas, &ctor.throws).map(|throws| (params, throws))
                })
                .and_then(|(params, throws)| {
                    ConstructorWrapper::new(meta, params).map(|c| (c, throws))
                });
            match parts {
                Ok((mut constructor, throws)) => {
                    constructor.throws = throws;
                    constructor.wrapper.unblock_threads = config.settings.unblock_threads;
                    class_gen.add_constructor(constructor);
                    any_constructor = true;
                }
                Err(err) => {
                    warn_at(
                        warnings,
                        ctor.location.as_ref(),
                        format!("cannot generate a constructor for class {:?}: {err}", decl.name),
                    );
                    failed_constructor = true;
                    skipped += 1;
                }
            }
        }
        if failed_constructor && !any_constructor {
            class_gen.cannot_construct = true;
        }

        for method_decl in &decl.methods {
            match build_class_method(
                &registry,
                &exception_metas,
                meta,
                method_decl,
                config.settings.unblock_threads,
                warnings,
            ) {
                Ok(Some((method, virtuals))) => {
                    if let Some((proxy, parent_caller)) = virtuals {
                        class_gen.add_method(parent_caller);
                        class_gen.add_virtual_proxy(proxy);
                    }
                    class_gen.add_method(method);
                }
                Ok(None) => {}
                Err(err) => {
                    warn_at(
                        warnings,
                        method_decl.location.as_ref(),
                        format!(
                            "skipping method {:?} of class {:?}: {err}",
                            method_decl.name, decl.name
                        ),
                    );
                    skipped += 1;
                }
            }
        }

        let mut remaining = Vec::with_capacity(folded.len());
        for (class_name, method) in folded {
            if class_name == decl.name {
                class_gen.add_method(method);
            } else {
                remaining.push((class_name, method));
            }
        }
        folded = remaining;

        module.add_class(class_gen);
    }

    for (class_name, method) in folded {
        warn_at(
            warnings,
            None,
            format!(
                "folded function {:?} targets class {class_name:?}, which was not generated",
                method.method_name
            ),
        );
        skipped += 1;
    }

    Ok((module, skipped))
}

type BuiltMethod = (MethodWrapper, Option<(VirtualProxyWrapper, MethodWrapper)>);

fn build_class_method(
    registry: &TypeRegistry,
    exceptions: &HashMap<String, Rc<ExceptionMeta>>,
    meta: &Rc<ClassMeta>,
    decl: &MethodDecl,
    unblock_threads: bool,
    warnings: &mut Vec<ScanWarning>,
) -> GenResult<Option<BuiltMethod>> {
    let location = decl.location.as_ref();
    let mut ignore = false;
    let mut custom_name = None;
    for (key, value) in &decl.annotations {
        match key.as_str() {
            "ignore" => ignore = annotation_bool_or_warn(value, location, warnings),
            "name" => custom_name = Some(value.clone()),
            _ => warn_at(
                warnings,
                location,
                format!("unknown annotation key `{key}` on method {:?}", decl.name),
            ),
        }
    }
    if ignore {
        return Ok(None);
    }

    let mut rv = ReturnValue::new(registry, &decl.return_type)?;
    for (key, value) in &decl.return_annotations {
        if !rv.apply_annotation(key, value)? {
            warn_at(
                warnings,
                location,
                format!("unknown annotation key `{key}` on return of {:?}", decl.name),
            );
        }
    }
    let params = build_parameters(registry, &decl.params, location, warnings)?;
    let throws = resolve_throws(exceptions, &decl.throws)?;

    // Virtual methods of subclassable classes additionally get a C++
    // proxy dispatching to python overrides, and a `_name` wrapper that
    // lets those overrides chain to the native implementation.
    let virtuals = if decl.is_virtual && meta.allow_subclassing {
        let proxy =
            VirtualProxyWrapper::new(meta, rv.clone(), &decl.name, params.clone(), decl.is_const)?;
        let mut parent_caller =
            MethodWrapper::new_parent_caller(meta, rv.clone(), &decl.name, params.clone())?;
        parent_caller.wrapper.unblock_threads = unblock_threads;
        Some((proxy, parent_caller))
    } else {
        None
    };

    let mut method = MethodWrapper::new(meta, rv, &decl.name, params)?;
    method.is_static = decl.is_static;
    method.is_virtual = decl.is_virtual;
    method.is_const = decl.is_const;
    method.custom_python_name = custom_name;
    method.docstring = decl.docstring.clone();
    method.throws = throws;
    method.wrapper.unblock_threads = unblock_threads;
    Ok(Some((method, virtuals)))
}

fn build_function_parts(
    registry: &TypeRegistry,
    exceptions: &HashMap<String, Rc<ExceptionMeta>>,
    decl: &FunctionDecl,
    warnings: &mut Vec<ScanWarning>,
) -> GenResult<(ReturnValue, Vec<Parameter>, Vec<Rc<ExceptionMeta>>)> {
    let location = decl.location.as_ref();
    let mut rv = ReturnValue::new(registry, &decl.return_type)?;
    for (key, value) in &decl.return_annotations {
        if !rv.apply_annotation(key, value)? {
            warn_at(
                warnings,
                location,
                format!("unknown annotation key `{key}` on return of {:?}", decl.name),
            );
        }
    }
    let params = build_parameters(registry, &decl.params, location, warnings)?;
    let throws = resolve_throws(exceptions, &decl.throws)?;
    Ok((rv, params, throws))
}

fn build_parameters(
    registry: &TypeRegistry,
    decls: &[ParamDecl],
    location: Option<&SourceLocation>,
    warnings: &mut Vec<ScanWarning>,
) -> GenResult<Vec<Parameter>> {
    let mut params = Vec::with_capacity(decls.len());
    for decl in decls {
        let direction = match decl.annotations.get("direction") {
            Some(value) => match Direction::parse(value) {
                Some(direction) => direction,
                None => {
                    warn_at(
                        warnings,
                        location,
                        format!("invalid direction {value:?} on parameter {:?}", decl.name),
                    );
                    Direction::In
                }
            },
            None => Direction::In,
        };
        let mut param =
            Parameter::new(registry, &decl.ctype, &decl.name, direction, decl.is_const)?;
        for (key, value) in &decl.annotations {
            if key == "direction" {
                continue;
            }
            if !param.apply_annotation(key, value)? {
                warn_at(
                    warnings,
                    location,
                    format!("unknown annotation key `{key}` on parameter {:?}", decl.name),
                );
            }
        }
        params.push(param);
    }
    Ok(params)
}

fn resolve_throws(
    exceptions: &HashMap<String, Rc<ExceptionMeta>>,
    names: &[String],
) -> GenResult<Vec<Rc<ExceptionMeta>>> {
    names
        .iter()
        .map(|name| {
            exceptions.get(name).map(Rc::clone).ok_or_else(|| GenError::UnknownType {
                table: "exception",
                ctype: name.clone(),
            })
        })
        .collect()
}

fn apply_class_annotations(
    meta: &mut ClassMeta,
    annotations: &Annotations,
    location: Option<&SourceLocation>,
    warnings: &mut Vec<ScanWarning>,
) -> GenResult<bool> {
    let mut incref = None;
    let mut decref = None;
    for (key, value) in annotations {
        match key.as_str() {
            "ignore" => {
                if parse_annotation_bool(value)? {
                    return Ok(true);
                }
            }
            "allow_subclassing" => meta.allow_subclassing = parse_annotation_bool(value)?,
            "is_singleton" => meta.is_singleton = parse_annotation_bool(value)?,
            "automatic_type_narrowing" => {
                meta.automatic_type_narrowing = parse_annotation_bool(value)?
            }
            "incref_method" => incref = Some(value.clone()),
            "decref_method" => decref = Some(value.clone()),
            _ => warn_at(
                warnings,
                location,
                format!("unknown annotation key `{key}` on class {:?}", meta.name),
            ),
        }
    }
    match (incref, decref) {
        (Some(incref_method), Some(decref_method)) => {
            meta.memory_policy = MemoryPolicy::RefCounted { incref_method, decref_method };
        }
        (None, None) => {}
        _ => {
            return Err(GenError::TypeConfiguration(format!(
                "class {:?} must name both incref_method and decref_method",
                meta.name
            )));
        }
    }
    Ok(false)
}

fn qualified_name(
    module_namespace: Option<&str>,
    inner_namespace: Option<&str>,
    name: &str,
) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(ns) = module_namespace {
        if ns != "::" {
            parts.push(ns);
        }
    }
    if let Some(ns) = inner_namespace {
        parts.push(ns);
    }
    parts.push(name);
    parts.join("::")
}

fn warn_at(
    warnings: &mut Vec<ScanWarning>,
    location: Option<&SourceLocation>,
    message: String,
) {
    let warning = match location {
        Some(loc) => ScanWarning::at(message, &loc.file, loc.line),
        None => ScanWarning::new(message),
    };
    warnings.push(warning);
}

fn annotation_bool_or_warn(
    value: &str,
    location: Option<&SourceLocation>,
    warnings: &mut Vec<ScanWarning>,
) -> bool {
    match parse_annotation_bool(value) {
        Ok(flag) => flag,
        Err(err) => {
            warn_at(warnings, location, err.to_string());
            false
        }
    }
}
