//! Placeholder substitution for user-supplied command strings.
//!
//! Commands such as `repair-command = "auditwheel repair -w {dest_dir} {wheel}"` name a
//! small set of variables in braces. Substitution is forgiving: any
//! placeholder without a binding is passed through verbatim (including forms like
//! `{b[4]:3f}`), so shell snippets containing braces survive untouched.
//!
//! # Escaping
//!
//! A `#` directly before a bound placeholder suppresses it: `#{wheel}` renders as the
//! literal `{wheel}` and the `#` is dropped. Escapes only apply to bound names; `#{other}`
//! stays as written.
//!
//! # Example
//!
//! ```
//! use wheelwright_lib::template::{Bindings, format_safe};
//!
//! let bindings = Bindings::new().bind("a", "123");
//! assert_eq!(format_safe("{a} {b}", &bindings), "123 {b}");
//! assert_eq!(format_safe("#{a} {b}", &bindings), "{a} {b}");
//! ```

/// Ordered placeholder bindings. Binding a name twice replaces the earlier value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
  entries: Vec<(String, String)>,
}

impl Bindings {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn bind(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.insert(name, value);
    self
  }

  pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
    let name = name.into();
    let value = value.into();
    match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
      Some(entry) => entry.1 = value,
      None => self.entries.push((name, value)),
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }
}

/// Substitute every bound `{name}` in `template`, leaving unknown placeholders alone.
///
/// Names are processed in binding order, one pass per name.
pub fn format_safe(template: &str, bindings: &Bindings) -> String {
  bindings
    .iter()
    .fold(template.to_string(), |text, (name, value)| substitute_one(&text, name, value))
}

/// Expand a user command with the default `python` and `pip` bindings plus `extra`.
///
/// Entries in `extra` override the defaults.
pub fn prepare_command(command: &str, extra: &Bindings) -> String {
  let mut bindings = Bindings::new().bind("python", "python").bind("pip", "pip");
  for (name, value) in extra.iter() {
    bindings.insert(name, value);
  }
  format_safe(command, &bindings)
}

fn substitute_one(input: &str, name: &str, value: &str) -> String {
  let needle = format!("{{{name}}}");
  let mut out = String::with_capacity(input.len());
  let mut rest = input;

  while let Some(pos) = rest.find(&needle) {
    let (before, after) = rest.split_at(pos);
    match before.strip_suffix('#') {
      Some(escaped) => {
        out.push_str(escaped);
        out.push_str(&needle);
      }
      None => {
        out.push_str(before);
        out.push_str(value);
      }
    }
    rest = &after[needle.len()..];
  }

  out.push_str(rest);
  out
}
