use rustc_hash::FxHashMap;

use super::frame::Frame;

/// Supplies replacement display names for frames.
pub trait SymbolRemapper {
    /// New display name for `frame`, or `None` to keep the current one.
    fn remap(&self, frame: &Frame) -> Option<String>;
}

impl<F> SymbolRemapper for F
where
    F: Fn(&Frame) -> Option<String>,
{
    fn remap(&self, frame: &Frame) -> Option<String> {
        self(frame)
    }
}

/// Minified name to full name, as written by emscripten's `--emit-symbol-map`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolMap {
    entries: FxHashMap<String, String>,
}

impl SymbolMap {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, minified: &str) -> Option<&str> {
        self.entries.get(minified).map(String::as_str)
    }
}

impl SymbolRemapper for SymbolMap {
    fn remap(&self, frame: &Frame) -> Option<String> {
        let key = frame
            .name
            .strip_prefix("wasm-function[")
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(&frame.name);
        self.get(key).map(str::to_owned)
    }
}

fn is_symbol_char(c: char, allow_dash: bool) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$' || (allow_dash && c == '-')
}

/// Parse an emscripten symbol map (`key:name` per line).
///
/// Numeric keys name `wasm-function[N]` frames. Returns `None` if any
/// non-blank line is malformed or the file holds no entries, so arbitrary
/// text is never mistaken for a symbol map.
pub fn parse_emscripten_symbol_map(text: &str) -> Option<SymbolMap> {
    let mut entries = FxHashMap::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, name) = line.split_once(':')?;
        if key.is_empty()
            || name.is_empty()
            || !key.chars().all(|c| is_symbol_char(c, false))
            || !name.chars().all(|c| is_symbol_char(c, true))
        {
            return None;
        }
        entries.insert(key.to_owned(), name.to_owned());
    }
    if entries.is_empty() {
        None
    } else {
        Some(SymbolMap { entries })
    }
}

/// Demangle a Rust (legacy or v0) or Itanium C++ symbol. Returns `None`
/// when the name is not mangled or demangling would not change it.
pub fn demangle_name(name: &str) -> Option<String> {
    if let Ok(symbol) = rustc_demangle::try_demangle(name) {
        let demangled = format!("{symbol:#}");
        if demangled != name {
            return Some(demangled);
        }
    }

    // Mach-O prefixes C++ symbols with an extra underscore.
    let itanium = if name.starts_with("__Z") {
        &name[1..]
    } else {
        name
    };
    if itanium.starts_with("_Z") {
        let options = cpp_demangle::DemangleOptions::default().no_return_type();
        if let Ok(symbol) = cpp_demangle::Symbol::new(itanium) {
            if let Ok(demangled) = symbol.demangle_with_options(&options) {
                return Some(demangled);
            }
        }
    }
    None
}
