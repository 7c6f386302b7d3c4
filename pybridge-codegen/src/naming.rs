// Name utilities: C declaration rendering, mangling, python-name derivation.

/// Join a C type and a variable name into a single declaration string,
/// keeping pointer stars attached to the name (`void*` + `foo` → `void *foo`).
pub fn join_ctype_and_name(ctype: &str, name: &str) -> String {
    if !ctype.ends_with('*') {
        return format!("{ctype} {name}");
    }
    // Split off the trailing run of stars so "void**" renders as "void **foo".
    let stars_start = ctype.trim_end_matches('*').len();
    let base = ctype[..stars_start].trim_end();
    let stars = &ctype[stars_start..];
    format!("{base} {stars}{name}")
}

/// Whether a name is usable as a declared-variable base name.
/// Accepts C identifier characters only.
pub fn is_valid_c_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.as_bytes()[0].is_ascii_digit()
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Flatten a qualified C++ name into a C identifier fragment usable in
/// wrapper symbol names (`ns::Foo<Bar*>` → `ns__Foo__lt__Bar_ptr__gt_`).
pub fn mangle_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 8);
    let mut rest = name;
    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix("::") {
            out.push_str("__");
            rest = tail;
            continue;
        }
        let ch = rest.chars().next().unwrap();
        match ch {
            '<' => out.push_str("__lt_"),
            '>' => out.push_str("__gt_"),
            '*' => out.push_str("_ptr"),
            '&' => out.push_str("_ref"),
            ',' => out.push('_'),
            ' ' => {}
            c if c.is_ascii_alphanumeric() || c == '_' => out.push(c),
            _ => out.push('_'),
        }
        rest = &rest[ch.len_utf8()..];
    }
    out
}

/// Derive the python-visible name of a C function by stripping a common
/// prefix (typically `<module>_`). Names that do not carry the prefix are
/// passed through unchanged.
pub fn strip_prefix<'a>(prefix: &str, c_name: &'a str) -> &'a str {
    c_name.strip_prefix(prefix).unwrap_or(c_name)
}
