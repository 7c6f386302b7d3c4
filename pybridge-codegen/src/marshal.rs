// Accumulators for the argument-unpacking and value-building primitives.

use crate::block::CleanupHandle;
use crate::error::{GenError, GenResult};

struct ParseItem {
    template: String,
    values: Vec<String>,
    name: Option<String>,
    optional: bool,
}

/// Tracks the entries of a `PyArg_ParseTuple(AndKeywords)` call.
///
/// Each parameter contributes a format-marker fragment plus one or more
/// address expressions. Once a parameter is optional, every parameter
/// after it must be optional too; parameter names must be given for all
/// entries or for none.
pub struct ParseTupleParams {
    items: Vec<ParseItem>,
}

impl ParseTupleParams {
    pub fn new() -> Self {
        ParseTupleParams { items: Vec::new() }
    }

    /// Append a mandatory entry. Returns the 1-based position of the entry.
    pub fn add(&mut self, template: &str, values: &[&str], name: Option<&str>) -> usize {
        self.add_full(template, values, name, false, false)
    }

    /// Full form: `prepend` parses the entry first (used for implicit
    /// leading arguments), `optional` puts it in the optional tail.
    pub fn add_full(
        &mut self,
        template: &str,
        values: &[&str],
        name: Option<&str>,
        prepend: bool,
        optional: bool,
    ) -> usize {
        let item = ParseItem {
            template: template.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
            name: name.map(|n| n.to_string()),
            optional,
        };
        if prepend {
            self.items.insert(0, item);
            1
        } else {
            self.items.push(item);
            self.items.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The parameters to pass into a `PyArg_ParseTuple`-style call: the
    /// quoted format string first, then the flat value list.
    pub fn get_parameters(&self) -> GenResult<Vec<String>> {
        let mut template = String::from("\"");
        let mut last_was_optional = false;
        for item in &self.items {
            if last_was_optional && !item.optional {
                return Err(GenError::OptionalOrder(
                    item.name.clone().unwrap_or_else(|| item.template.clone()),
                ));
            }
            if item.optional && !last_was_optional {
                template.push('|');
            }
            last_was_optional = item.optional;
            template.push_str(&item.template);
        }
        template.push('"');
        let mut params = vec![template];
        for item in &self.items {
            params.extend(item.values.iter().cloned());
        }
        Ok(params)
    }

    /// The ordered keyword list, or `None` when no entry carried a name.
    pub fn get_keywords(&self) -> GenResult<Option<Vec<String>>> {
        let mut keywords = Vec::new();
        for item in &self.items {
            match &item.name {
                Some(name) => keywords.push(name.clone()),
                None if !keywords.is_empty() => return Err(GenError::MixedKeywords),
                None => {}
            }
        }
        if keywords.is_empty() {
            Ok(None)
        } else if keywords.len() != self.items.len() {
            // A named entry preceded by unnamed ones.
            Err(GenError::MixedKeywords)
        } else {
            Ok(Some(keywords))
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl Default for ParseTupleParams {
    fn default() -> Self {
        Self::new()
    }
}

struct BuildItem {
    template: String,
    values: Vec<String>,
    cancels_cleanup: Option<CleanupHandle>,
}

/// Tracks the entries of a `Py_BuildValue` call.
///
/// An entry may carry a cleanup handle to cancel once the built value is
/// actually emitted: the classic case is an `N` entry, which hands the
/// object reference to the caller, so the release that was registered for
/// it must be suppressed exactly when the entry is committed.
pub struct BuildValueParams {
    items: Vec<BuildItem>,
}

impl BuildValueParams {
    pub fn new() -> Self {
        BuildValueParams { items: Vec::new() }
    }

    pub fn add(&mut self, template: &str, values: &[&str]) {
        self.add_full(template, values, false, None);
    }

    pub fn add_full(
        &mut self,
        template: &str,
        values: &[&str],
        prepend: bool,
        cancels_cleanup: Option<CleanupHandle>,
    ) {
        let item = BuildItem {
            template: template.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
            cancels_cleanup,
        };
        if prepend {
            self.items.insert(0, item);
        } else {
            self.items.push(item);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The parameters to pass into a `Py_BuildValue`-style call: the quoted
    /// format string first, then the flat value list.
    pub fn get_parameters(&self) -> Vec<String> {
        let mut template = String::from("\"");
        for item in &self.items {
            template.push_str(&item.template);
        }
        template.push('"');
        let mut params = vec![template];
        for item in &self.items {
            params.extend(item.values.iter().cloned());
        }
        params
    }

    /// Take the cleanup handles whose entries are being committed to the
    /// outbound value. Called once, right after the build call is emitted.
    pub fn take_cleanup_cancels(&mut self) -> Vec<CleanupHandle> {
        self.items.iter_mut().filter_map(|item| item.cancels_cleanup.take()).collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl Default for BuildValueParams {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::CodeBlock;

    #[test]
    fn format_string_marks_the_optional_tail() {
        let mut params = ParseTupleParams::new();
        params.add("i", &["&foo"], Some("foo"));
        params.add_full("s", &["&bar"], Some("bar"), false, true);
        assert_eq!(params.get_parameters().unwrap(), vec!["\"i|s\"", "&foo", "&bar"]);
        assert_eq!(
            params.get_keywords().unwrap(),
            Some(vec!["foo".to_string(), "bar".to_string()])
        );
    }

    #[test]
    fn prepend_parses_first() {
        let mut params = ParseTupleParams::new();
        params.add("i", &["&foo"], Some("foo"));
        params.add_full("s", &["&bar"], Some("bar"), true, false);
        assert_eq!(params.get_parameters().unwrap(), vec!["\"si\"", "&bar", "&foo"]);
        assert_eq!(
            params.get_keywords().unwrap(),
            Some(vec!["bar".to_string(), "foo".to_string()])
        );
    }

    #[test]
    fn unnamed_entries_yield_no_keywords() {
        let mut params = ParseTupleParams::new();
        params.add("i", &["&foo"], None);
        assert_eq!(params.get_keywords().unwrap(), None);
    }

    #[test]
    fn mixing_named_and_unnamed_entries_fails() {
        let mut params = ParseTupleParams::new();
        params.add("i", &["&foo"], Some("foo"));
        params.add("s", &["&bar"], None);
        assert!(matches!(params.get_keywords(), Err(GenError::MixedKeywords)));

        let mut params = ParseTupleParams::new();
        params.add("i", &["&foo"], None);
        params.add("s", &["&bar"], Some("bar"));
        assert!(matches!(params.get_keywords(), Err(GenError::MixedKeywords)));
    }

    #[test]
    fn mandatory_after_optional_fails() {
        let mut params = ParseTupleParams::new();
        params.add_full("i", &["&foo"], Some("foo"), false, true);
        params.add("s", &["&bar"], Some("bar"));
        assert!(matches!(params.get_parameters(), Err(GenError::OptionalOrder(_))));
    }

    #[test]
    fn build_value_concatenates_templates() {
        let mut params = BuildValueParams::new();
        params.add("i", &["123", "456"]);
        params.add("s", &["\"hello\""]);
        assert_eq!(params.get_parameters(), vec!["\"is\"", "123", "456", "\"hello\""]);

        let mut params = BuildValueParams::new();
        params.add("i", &["123"]);
        params.add_full("s", &["\"hello\""], true, None);
        assert_eq!(params.get_parameters(), vec!["\"si\"", "\"hello\"", "123"]);
    }

    #[test]
    fn committing_an_entry_cancels_its_cleanup() {
        let mut block = CodeBlock::new("return NULL;");
        let handle = block.add_cleanup_code("Py_DECREF(py_obj);");
        let mut params = BuildValueParams::new();
        params.add_full("N", &["py_obj"], false, Some(handle));
        for handle in params.take_cleanup_cancels() {
            handle.cancel();
        }
        block.write_cleanup();
        assert_eq!(block.sink.flush(), "");
    }
}
