// Shared scaffolding for codec unit tests.

use std::rc::Rc;

use crate::block::CodeBlock;
use crate::marshal::{BuildValueParams, ParseTupleParams};
use crate::scope::DeclarationsScope;

use super::object::{ClassMeta, MemoryPolicy};
use super::{ForwardCtx, ReverseCtx};

/// Owned pieces of a forward-wrapper generation context.
pub struct Forward {
    pub declarations: DeclarationsScope,
    pub before_parse: CodeBlock,
    pub before_call: CodeBlock,
    pub after_call: CodeBlock,
    pub parse_params: ParseTupleParams,
    pub build_params: BuildValueParams,
    pub call_params: Vec<String>,
}

impl Forward {
    pub fn new() -> Self {
        let before_parse = CodeBlock::new("return NULL;");
        let before_call = CodeBlock::with_predecessor("return NULL;", &before_parse);
        let after_call = CodeBlock::with_predecessor("return NULL;", &before_call);
        Forward {
            declarations: DeclarationsScope::new(),
            before_parse,
            before_call,
            after_call,
            parse_params: ParseTupleParams::new(),
            build_params: BuildValueParams::new(),
            call_params: Vec::new(),
        }
    }

    pub fn ctx(&mut self) -> ForwardCtx<'_> {
        ForwardCtx {
            declarations: &mut self.declarations,
            before_parse: &mut self.before_parse,
            before_call: &mut self.before_call,
            after_call: &mut self.after_call,
            parse_params: &mut self.parse_params,
            build_params: &mut self.build_params,
            call_params: &mut self.call_params,
        }
    }
}

/// Owned pieces of a reverse-wrapper generation context.
pub struct Reverse {
    pub declarations: DeclarationsScope,
    pub before_call: CodeBlock,
    pub after_call: CodeBlock,
    pub parse_params: ParseTupleParams,
    pub build_params: BuildValueParams,
}

impl Reverse {
    pub fn new() -> Self {
        let before_call = CodeBlock::new("return INT_MIN;");
        let after_call = CodeBlock::with_predecessor("return INT_MIN;", &before_call);
        Reverse {
            declarations: DeclarationsScope::new(),
            before_call,
            after_call,
            parse_params: ParseTupleParams::new(),
            build_params: BuildValueParams::new(),
        }
    }

    pub fn ctx(&mut self) -> ReverseCtx<'_> {
        ReverseCtx {
            declarations: &mut self.declarations,
            before_call: &mut self.before_call,
            after_call: &mut self.after_call,
            parse_params: &mut self.parse_params,
            build_params: &mut self.build_params,
        }
    }
}

pub fn plain_class(name: &str) -> Rc<ClassMeta> {
    Rc::new(ClassMeta::new(name, None, ""))
}

pub fn refcounted_class(name: &str, incref: &str, decref: &str) -> Rc<ClassMeta> {
    let mut meta = ClassMeta::new(name, None, "");
    meta.memory_policy = MemoryPolicy::RefCounted {
        incref_method: incref.to_string(),
        decref_method: decref.to_string(),
    };
    Rc::new(meta)
}
