// Line-oriented buffer the generators emit C code into.

/// An in-memory code sink with indentation tracking.
///
/// Generated statements are accumulated line by line; nested structures
/// (wrapper bodies, `if` blocks) are produced by writing into a scratch
/// sink and flushing it into the parent at the parent's current indent.
pub struct CodeSink {
    lines: Vec<String>,
    indent_level: usize,
    indent_stack: Vec<usize>,
}

impl CodeSink {
    pub fn new() -> Self {
        CodeSink { lines: Vec::new(), indent_level: 0, indent_stack: Vec::new() }
    }

    /// Write one or more lines of code. Embedded newlines split into
    /// separate lines, each indented at the current level.
    pub fn writeln(&mut self, code: &str) {
        for line in code.split('\n') {
            if line.is_empty() {
                self.lines.push(String::new());
            } else {
                self.lines.push(format!("{}{}", " ".repeat(self.indent_level), line));
            }
        }
    }

    /// Write an empty line.
    pub fn blank(&mut self) {
        self.lines.push(String::new());
    }

    /// Increase indentation for all lines written until `unindent()`.
    pub fn indent(&mut self) {
        self.indent_stack.push(self.indent_level);
        self.indent_level += 4;
    }

    /// Revert indentation to the level before the last `indent()` call.
    pub fn unindent(&mut self) {
        self.indent_level = self.indent_stack.pop().unwrap_or(0);
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Move all buffered lines into another sink, re-indented at the
    /// target's current level.
    pub fn flush_to(&mut self, sink: &mut CodeSink) {
        for line in self.lines.drain(..) {
            sink.writeln(line.trim_end());
        }
    }

    /// Drain the buffer and return it as a single string.
    pub fn flush(&mut self) -> String {
        let mut out = String::new();
        for line in self.lines.drain(..) {
            out.push_str(line.trim_end());
            out.push('\n');
        }
        out
    }

    /// Drop everything buffered so far.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.indent_level = 0;
        self.indent_stack.clear();
    }
}

impl Default for CodeSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indentation_applies_between_indent_and_unindent() {
        let mut sink = CodeSink::new();
        sink.writeln("foo();");
        sink.writeln("if (true) {");
        sink.indent();
        sink.writeln("bar();");
        sink.unindent();
        sink.writeln("}");
        assert_eq!(sink.flush(), "foo();\nif (true) {\n    bar();\n}\n");
    }

    #[test]
    fn flush_to_reindents_under_target() {
        let mut inner = CodeSink::new();
        inner.writeln("a();");
        inner.indent();
        inner.writeln("b();");

        let mut outer = CodeSink::new();
        outer.writeln("{");
        outer.indent();
        inner.flush_to(&mut outer);
        outer.unindent();
        outer.writeln("}");
        assert_eq!(outer.flush(), "{\n    a();\n        b();\n}\n");
        assert!(inner.is_empty());
    }

    #[test]
    fn multiline_writes_split_and_indent_each_line() {
        let mut sink = CodeSink::new();
        sink.indent();
        sink.writeln("x = 1;\ny = 2;");
        assert_eq!(sink.flush(), "    x = 1;\n    y = 2;\n");
    }
}
