//! fnmatch-style wildcard matching.
//!
//! `*` matches any run of characters, `?` a single character, `[seq]` any character in
//! `seq` and `[!seq]` any character not in it. Matching is case-sensitive and anchored
//! to the whole identifier.

use regex::Regex;

/// A compiled wildcard pattern.
#[derive(Debug, Clone)]
pub struct Glob {
  regex: Regex,
}

impl Glob {
  pub fn new(pattern: &str) -> Result<Self, regex::Error> {
    let regex = Regex::new(&translate(pattern))?;
    Ok(Self { regex })
  }

  pub fn is_match(&self, candidate: &str) -> bool {
    self.regex.is_match(candidate)
  }
}

/// Translate a wildcard pattern into an anchored regular expression.
pub fn translate(pattern: &str) -> String {
  let chars: Vec<char> = pattern.chars().collect();
  let mut out = String::from("(?s)^");
  let mut i = 0;

  while i < chars.len() {
    let c = chars[i];
    i += 1;
    match c {
      '*' => {
        // collapse runs of stars
        while i < chars.len() && chars[i] == '*' {
          i += 1;
        }
        out.push_str(".*");
      }
      '?' => out.push('.'),
      '[' => match class_end(&chars, i) {
        Some(end) => {
          out.push('[');
          let mut j = i;
          if chars[j] == '!' {
            out.push('^');
            j += 1;
          }
          for &member in &chars[j..end] {
            if member == '-' {
              out.push('-');
            } else {
              out.push_str(&regex::escape(&member.to_string()));
            }
          }
          out.push(']');
          i = end + 1;
        }
        None => out.push_str(r"\["),
      },
      other => out.push_str(&regex::escape(&other.to_string())),
    }
  }

  out.push('$');
  out
}

/// Find the `]` closing a class opened just before `start`. A `]` directly after the
/// opening `[` or `[!` is a member, not the terminator.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
  let mut j = start;
  if j < chars.len() && chars[j] == '!' {
    j += 1;
  }
  if j < chars.len() && chars[j] == ']' {
    j += 1;
  }
  while j < chars.len() && chars[j] != ']' {
    j += 1;
  }
  (j < chars.len()).then_some(j)
}
