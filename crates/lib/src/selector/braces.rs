//! Shell-style brace expansion.
//!
//! `cp{36,37}-*` expands to `cp36-*` and `cp37-*`. Groups nest, and a group may also be
//! a numeric or single-letter sequence: `{6..9}`, `{a..c}`, `{01..10..3}`. A group that
//! is neither a list nor a sequence (such as `{a}` or an unclosed `{`) is kept verbatim.
//! A backslash escapes the next character, which is emitted literally.

/// Expand every brace group in `pattern`, returning the alternatives in order.
pub fn expand(pattern: &str) -> Vec<String> {
  let chars: Vec<char> = pattern.chars().collect();
  expand_chars(&chars)
}

fn expand_chars(chars: &[char]) -> Vec<String> {
  let mut i = 0;
  while i < chars.len() {
    match chars[i] {
      '\\' => i += 2,
      '{' => {
        if let Some((close, alternatives)) = parse_group(chars, i) {
          let prefix = unescape(&chars[..i]);
          let suffixes = expand_chars(&chars[close + 1..]);
          let mut out = Vec::new();
          for alternative in alternatives {
            let alt_chars: Vec<char> = alternative.chars().collect();
            for middle in expand_chars(&alt_chars) {
              for suffix in &suffixes {
                out.push(format!("{prefix}{middle}{suffix}"));
              }
            }
          }
          return out;
        }
        i += 1;
      }
      _ => i += 1,
    }
  }
  vec![unescape(chars)]
}

/// Parse the group opened at `open`. Returns the index of the closing brace and the raw
/// (still escaped) alternatives, or `None` if this brace does not start a valid group.
fn parse_group(chars: &[char], open: usize) -> Option<(usize, Vec<String>)> {
  let mut depth = 0usize;
  let mut commas = Vec::new();
  let mut i = open + 1;
  while i < chars.len() {
    match chars[i] {
      '\\' => {
        i += 2;
        continue;
      }
      '{' => depth += 1,
      '}' if depth == 0 => {
        let body = &chars[open + 1..i];
        if commas.is_empty() {
          let body: String = body.iter().collect();
          return sequence(&body).map(|items| (i, items));
        }
        let mut alternatives = Vec::with_capacity(commas.len() + 1);
        let mut start = open + 1;
        for &comma in &commas {
          alternatives.push(chars[start..comma].iter().collect());
          start = comma + 1;
        }
        alternatives.push(chars[start..i].iter().collect());
        return Some((i, alternatives));
      }
      '}' => depth -= 1,
      ',' if depth == 0 => commas.push(i),
      _ => {}
    }
    i += 1;
  }
  None
}

/// Expand `start..end[..step]` sequences.
fn sequence(body: &str) -> Option<Vec<String>> {
  let parts: Vec<&str> = body.split("..").collect();
  if parts.len() != 2 && parts.len() != 3 {
    return None;
  }
  let step = match parts.get(2) {
    Some(step) => step.parse::<i64>().ok()?.unsigned_abs().max(1),
    None => 1,
  };

  if let (Ok(start), Ok(end)) = (parts[0].parse::<i64>(), parts[1].parse::<i64>()) {
    let width = if has_leading_zero(parts[0]) || has_leading_zero(parts[1]) {
      parts[0].len().max(parts[1].len())
    } else {
      0
    };
    return Some(
      stepped(start, end, step)
        .into_iter()
        .map(|n| format!("{n:0width$}"))
        .collect(),
    );
  }

  let (start, end) = (single_letter(parts[0])?, single_letter(parts[1])?);
  Some(
    stepped(start as i64, end as i64, step)
      .into_iter()
      .filter_map(|n| char::from_u32(n as u32))
      .map(String::from)
      .collect(),
  )
}

fn stepped(start: i64, end: i64, step: u64) -> Vec<i64> {
  let step = step as i64;
  let mut out = Vec::new();
  let mut n = start;
  if start <= end {
    while n <= end {
      out.push(n);
      n += step;
    }
  } else {
    while n >= end {
      out.push(n);
      n -= step;
    }
  }
  out
}

fn has_leading_zero(number: &str) -> bool {
  let digits = number.trim_start_matches('-');
  digits.len() > 1 && digits.starts_with('0')
}

fn single_letter(s: &str) -> Option<char> {
  let mut chars = s.chars();
  match (chars.next(), chars.next()) {
    (Some(c), None) if c.is_ascii_alphabetic() => Some(c),
    _ => None,
  }
}

fn unescape(chars: &[char]) -> String {
  let mut out = String::with_capacity(chars.len());
  let mut iter = chars.iter();
  while let Some(&c) = iter.next() {
    if c == '\\' {
      if let Some(&next) = iter.next() {
        out.push(next);
      }
    } else {
      out.push(c);
    }
  }
  out
}
