// Statement block with an attached LIFO cleanup stack.

use std::cell::RefCell;
use std::rc::Rc;

use crate::sink::CodeSink;

/// Ordered store of pending cleanup statements.
///
/// Slots are never removed, only vacated, so a [`CleanupHandle`]'s index
/// stays valid for the lifetime of the block.
struct CleanupStack {
    slots: Vec<Option<String>>,
}

impl CleanupStack {
    fn new() -> Self {
        CleanupStack { slots: Vec::new() }
    }

    fn push(&mut self, code: String) -> usize {
        self.slots.push(Some(code));
        self.slots.len() - 1
    }

    fn cancel(&mut self, slot: usize) {
        let entry = &mut self.slots[slot];
        assert!(entry.is_some(), "cleanup action cancelled twice");
        *entry = None;
    }

    /// Pending statements, most recently added first.
    fn pending(&self) -> Vec<String> {
        self.slots.iter().rev().filter_map(|s| s.clone()).collect()
    }

    fn clear(&mut self) {
        self.slots.clear();
    }
}

/// Token returned by [`CodeBlock::add_cleanup_code`]. Cancelling consumes
/// the handle, so a cleanup action can be suppressed at most once.
pub struct CleanupHandle {
    stack: Rc<RefCell<CleanupStack>>,
    slot: usize,
}

impl CleanupHandle {
    /// Remove the cleanup action this handle refers to. Used when the
    /// resource it would release has been handed off to the other side.
    pub fn cancel(self) {
        self.stack.borrow_mut().cancel(self.slot);
    }
}

/// A code block that keeps track of cleanup actions owed on exit.
///
/// Every error check emitted through [`write_error_check`] unwinds all
/// still-pending cleanups in reverse registration order (this block's
/// first, then each predecessor block's) before the error return. The
/// block is the sole record of what has been acquired; callers never track
/// acquisitions themselves.
///
/// [`write_error_check`]: CodeBlock::write_error_check
pub struct CodeBlock {
    pub sink: CodeSink,
    error_return: String,
    cleanups: Rc<RefCell<CleanupStack>>,
    /// Cleanup stacks of predecessor blocks, nearest first.
    inherited: Vec<Rc<RefCell<CleanupStack>>>,
}

impl CodeBlock {
    /// `error_return` is the statement emitted on error exits, e.g.
    /// `return NULL;`.
    pub fn new(error_return: &str) -> Self {
        CodeBlock {
            sink: CodeSink::new(),
            error_return: error_return.to_string(),
            cleanups: Rc::new(RefCell::new(CleanupStack::new())),
            inherited: Vec::new(),
        }
    }

    /// Create a block whose error exits also unwind everything still
    /// pending in `predecessor` (and its own predecessors).
    pub fn with_predecessor(error_return: &str, predecessor: &CodeBlock) -> Self {
        let mut inherited = Vec::with_capacity(predecessor.inherited.len() + 1);
        inherited.push(Rc::clone(&predecessor.cleanups));
        inherited.extend(predecessor.inherited.iter().map(Rc::clone));
        CodeBlock {
            sink: CodeSink::new(),
            error_return: error_return.to_string(),
            cleanups: Rc::new(RefCell::new(CleanupStack::new())),
            inherited,
        }
    }

    pub fn set_error_return(&mut self, error_return: &str) {
        self.error_return = error_return.to_string();
    }

    /// Append one statement; no validation.
    pub fn write_code(&mut self, code: &str) {
        self.sink.writeln(code);
    }

    pub fn indent(&mut self) {
        self.sink.indent();
    }

    pub fn unindent(&mut self) {
        self.sink.unindent();
    }

    /// Register a cleanup statement owed on every exit from now on.
    pub fn add_cleanup_code(&mut self, code: &str) -> CleanupHandle {
        let slot = self.cleanups.borrow_mut().push(code.to_string());
        CleanupHandle { stack: Rc::clone(&self.cleanups), slot }
    }

    /// All pending cleanups: this block's (most recent first), then each
    /// predecessor's.
    fn pending_cleanups(&self) -> Vec<String> {
        let mut out = self.cleanups.borrow().pending();
        for stack in &self.inherited {
            out.extend(stack.borrow().pending());
        }
        out
    }

    /// Emit `if (<condition>) { [failure_cleanup] <unwind> <error return> }`.
    ///
    /// `failure_cleanup` is extra cleanup written only for this failure
    /// path, ahead of the registered cleanup actions.
    pub fn write_error_check(&mut self, condition: &str, failure_cleanup: Option<&str>) {
        self.sink.writeln(&format!("if ({condition}) {{"));
        self.sink.indent();
        if let Some(extra) = failure_cleanup {
            self.sink.writeln(extra);
        }
        self.write_cleanup();
        self.sink.writeln(&self.error_return.clone());
        self.sink.unindent();
        self.sink.writeln("}");
    }

    /// Emit the unwind list followed by the error return, without a guard.
    /// Used inside `catch` clauses, where the condition is the clause itself.
    pub fn write_error_exit(&mut self, failure_cleanup: Option<&str>) {
        if let Some(extra) = failure_cleanup {
            self.sink.writeln(extra);
        }
        self.write_cleanup();
        self.sink.writeln(&self.error_return.clone());
    }

    /// Emit every pending cleanup unconditionally (the normal exit path).
    pub fn write_cleanup(&mut self) {
        for action in self.pending_cleanups() {
            self.sink.writeln(&action);
        }
    }

    /// Reset statements and cleanups for a fresh generation pass. The
    /// predecessor links are kept.
    pub fn clear(&mut self) {
        self.sink.clear();
        self.cleanups.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_check_unwinds_in_reverse_order_and_honors_cancel() {
        let mut block = CodeBlock::new("return NULL;");
        block.write_code("foo();");
        let _c1 = block.add_cleanup_code("clean1();");
        let c2 = block.add_cleanup_code("clean2();");
        let _c3 = block.add_cleanup_code("clean3();");
        c2.cancel();
        block.write_error_check("error()", Some("error_clean()"));
        block.write_code("bar();");
        block.write_cleanup();
        assert_eq!(
            block.sink.flush(),
            "foo();\n\
             if (error()) {\n    \
                 error_clean()\n    \
                 clean3();\n    \
                 clean1();\n    \
                 return NULL;\n\
             }\n\
             bar();\n\
             clean3();\n\
             clean1();\n"
        );
    }

    #[test]
    fn predecessor_cleanups_follow_own_cleanups() {
        let mut first = CodeBlock::new("return NULL;");
        let _a = first.add_cleanup_code("release_a();");
        let _b = first.add_cleanup_code("release_b();");

        let mut second = CodeBlock::with_predecessor("return NULL;", &first);
        let _c = second.add_cleanup_code("release_c();");
        second.write_error_check("failed()", None);
        assert_eq!(
            second.sink.flush(),
            "if (failed()) {\n    \
                 release_c();\n    \
                 release_b();\n    \
                 release_a();\n    \
                 return NULL;\n\
             }\n"
        );
    }

    #[test]
    fn predecessor_chain_spans_three_blocks() {
        let mut first = CodeBlock::new("return -1;");
        let _a = first.add_cleanup_code("a();");
        let mut second = CodeBlock::with_predecessor("return -1;", &first);
        let _b = second.add_cleanup_code("b();");
        let mut third = CodeBlock::with_predecessor("return -1;", &second);
        let _c = third.add_cleanup_code("c();");
        third.write_cleanup();
        assert_eq!(third.sink.flush(), "c();\nb();\na();\n");
    }

    #[test]
    fn late_registration_in_predecessor_is_seen_by_successor() {
        let mut first = CodeBlock::new("return NULL;");
        let mut second = CodeBlock::with_predecessor("return NULL;", &first);
        let _a = first.add_cleanup_code("late();");
        second.write_cleanup();
        assert_eq!(second.sink.flush(), "late();\n");
    }

    #[test]
    fn cancelling_one_action_leaves_the_rest_in_order() {
        let mut block = CodeBlock::new("return NULL;");
        let handles: Vec<_> = (1..=4)
            .map(|i| block.add_cleanup_code(&format!("c{i}();")))
            .collect();
        let mut it = handles.into_iter();
        let _c1 = it.next();
        let _c2 = it.next();
        it.next().unwrap().cancel(); // c3
        block.write_cleanup();
        assert_eq!(block.sink.flush(), "c4();\nc2();\nc1();\n");
    }
}
