// Serde model of the declaration JSON supplied by the parser front-end.
//
// The scanner that walks C/C++ headers is a separate tool; this file is
// the contract for what it must hand over: canonical type strings, names,
// directions, const-ness, and free-form annotation maps, each entry
// attributed to a source location for warning messages.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Annotation key/value map. Ordered so warnings about unknown keys come
/// out deterministically.
pub type Annotations = BTreeMap<String, String>;

#[derive(Deserialize, Clone)]
pub struct DeclarationsFile {
    /// Module name recorded by the scanner; informational, the generator
    /// configuration is authoritative.
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub functions: Vec<FunctionDecl>,
    #[serde(default)]
    pub classes: Vec<ClassDecl>,
    #[serde(default)]
    pub enums: Vec<EnumDecl>,
    #[serde(default)]
    pub exceptions: Vec<ExceptionDecl>,
}

#[derive(Deserialize, Clone)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

#[derive(Deserialize, Clone)]
pub struct FunctionDecl {
    pub name: String,
    #[serde(rename = "return", default = "default_return_type")]
    pub return_type: String,
    #[serde(default)]
    pub return_annotations: Annotations,
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    #[serde(default)]
    pub annotations: Annotations,
    /// Exception type names this callable may throw.
    #[serde(default)]
    pub throws: Vec<String>,
    #[serde(default)]
    pub docstring: Option<String>,
    #[serde(default)]
    pub location: Option<SourceLocation>,
}

#[derive(Deserialize, Clone)]
pub struct ParamDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ctype: String,
    #[serde(default)]
    pub is_const: bool,
    #[serde(default)]
    pub annotations: Annotations,
}

#[derive(Deserialize, Clone)]
pub struct ClassDecl {
    pub name: String,
    #[serde(default)]
    pub annotations: Annotations,
    #[serde(default)]
    pub docstring: Option<String>,
    #[serde(default)]
    pub constructors: Vec<ConstructorDecl>,
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
    #[serde(default)]
    pub location: Option<SourceLocation>,
}

#[derive(Deserialize, Clone)]
pub struct ConstructorDecl {
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    #[serde(default)]
    pub throws: Vec<String>,
    #[serde(default)]
    pub location: Option<SourceLocation>,
}

#[derive(Deserialize, Clone)]
pub struct MethodDecl {
    pub name: String,
    #[serde(rename = "return", default = "default_return_type")]
    pub return_type: String,
    #[serde(default)]
    pub return_annotations: Annotations,
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub is_const: bool,
    #[serde(default)]
    pub annotations: Annotations,
    #[serde(default)]
    pub throws: Vec<String>,
    #[serde(default)]
    pub docstring: Option<String>,
    #[serde(default)]
    pub location: Option<SourceLocation>,
}

#[derive(Deserialize, Clone)]
pub struct EnumDecl {
    pub name: String,
    pub values: Vec<String>,
    #[serde(default)]
    pub values_prefix: String,
    /// Extra namespace for values declared inside a class or nested
    /// namespace, in addition to the module-wide one.
    #[serde(default)]
    pub cpp_namespace: Option<String>,
    #[serde(default)]
    pub location: Option<SourceLocation>,
}

#[derive(Deserialize, Clone)]
pub struct ExceptionDecl {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub docstring: Option<String>,
    #[serde(default)]
    pub location: Option<SourceLocation>,
}

fn default_return_type() -> String {
    "void".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_function_fills_defaults() {
        let json = r#"{"functions": [{"name": "zoo_close"}]}"#;
        let decls: DeclarationsFile = serde_json::from_str(json).unwrap();
        let func = &decls.functions[0];
        assert_eq!(func.name, "zoo_close");
        assert_eq!(func.return_type, "void");
        assert!(func.params.is_empty());
        assert!(func.annotations.is_empty());
    }

    #[test]
    fn annotations_and_locations_deserialize() {
        let json = r#"{
            "classes": [{
                "name": "Zoo",
                "annotations": {"allow_subclassing": "true"},
                "methods": [{
                    "name": "feed",
                    "return": "bool",
                    "params": [
                        {"name": "animal", "type": "Animal*",
                         "annotations": {"transfer_ownership": "false"}}
                    ],
                    "location": {"file": "zoo.h", "line": 12}
                }]
            }]
        }"#;
        let decls: DeclarationsFile = serde_json::from_str(json).unwrap();
        let class = &decls.classes[0];
        assert_eq!(class.annotations.get("allow_subclassing").unwrap(), "true");
        let method = &class.methods[0];
        assert_eq!(method.return_type, "bool");
        assert_eq!(method.location.as_ref().unwrap().line, 12);
        assert_eq!(
            method.params[0].annotations.get("transfer_ownership").unwrap(),
            "false"
        );
    }
}
