// Variable declarations for one generated function body.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{GenError, GenResult};
use crate::naming::{is_valid_c_identifier, join_ctype_and_name};
use crate::sink::CodeSink;

/// Manages variable declarations in a generated scope.
///
/// All declarations are buffered and rendered ahead of any statement code
/// when the owning function body is flushed. Base names are deduplicated:
/// the first use of `foo` stays `foo`, later uses become `foo2`, `foo3`, …
/// A child scope created with [`DeclarationsScope::with_parent`] shares the
/// parent's counters, so names never collide across the two scopes.
pub struct DeclarationsScope {
    declarations: CodeSink,
    declared: Rc<RefCell<HashMap<String, u32>>>,
}

impl DeclarationsScope {
    pub fn new() -> Self {
        DeclarationsScope {
            declarations: CodeSink::new(),
            declared: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Create a scope whose name counters are shared with `parent`.
    pub fn with_parent(parent: &DeclarationsScope) -> Self {
        DeclarationsScope {
            declarations: CodeSink::new(),
            declared: Rc::clone(&parent.declared),
        }
    }

    /// Add a variable declaration and return the actual (deduplicated) name.
    ///
    /// `initializer` renders as ` = <expr>`, `array` as a size suffix such
    /// as `[]` or `[8]`, both directly after the name.
    pub fn declare_variable(
        &mut self,
        ctype: &str,
        name: &str,
        initializer: Option<&str>,
        array: Option<&str>,
    ) -> GenResult<String> {
        if !is_valid_c_identifier(name) {
            return Err(GenError::InvalidVariableName(name.to_string()));
        }
        let varname = {
            let mut declared = self.declared.borrow_mut();
            let count = declared.entry(name.to_string()).or_insert(0);
            *count += 1;
            if *count == 1 { name.to_string() } else { format!("{name}{count}") }
        };
        let mut decl = join_ctype_and_name(ctype, &varname);
        if let Some(array) = array {
            decl.push_str(array);
        }
        if let Some(init) = initializer {
            decl.push_str(" = ");
            decl.push_str(init);
        }
        decl.push(';');
        self.declarations.writeln(&decl);
        Ok(varname)
    }

    /// Flush the rendered declaration block into `sink`.
    pub fn flush_to(&mut self, sink: &mut CodeSink) {
        self.declarations.flush_to(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Reset for reuse between generation passes.
    pub fn clear(&mut self) {
        self.declarations.clear();
        self.declared.borrow_mut().clear();
    }
}

impl Default for DeclarationsScope {
    fn default() -> Self {
        Self::new()
    }
}
