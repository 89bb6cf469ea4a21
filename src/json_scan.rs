//! Allocation-free JSON structure scanner.
//!
//! Used on every argument fragment to decide cheaply whether a tool-call
//! buffer could already hold one complete JSON value. Each function returns
//! the offset one past the scanned construct, or `None` if the input ends
//! early, is malformed, or nests deeper than [`MAX_DEPTH`].

/// Deepest array/object nesting accepted; `serde_json` refuses anything deeper.
pub(crate) const MAX_DEPTH: usize = 128;

#[inline]
fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while let Some(b' ' | b'\n' | b'\r' | b'\t') = bytes.get(i) {
        i += 1;
    }
    i
}

/// Whether `text` is exactly one JSON value surrounded by optional whitespace.
#[must_use]
pub(crate) fn is_complete_json(text: &str) -> bool {
    let bytes = text.as_bytes();
    let start = skip_ws(bytes, 0);
    if start == bytes.len() {
        return false;
    }
    match scan_value(bytes, start, 0) {
        Some(end) => skip_ws(bytes, end) == bytes.len(),
        None => false,
    }
}

#[inline]
fn scan_value(bytes: &[u8], start: usize, depth: usize) -> Option<usize> {
    let i = skip_ws(bytes, start);
    match *bytes.get(i)? {
        b'"' => scan_string(bytes, i),
        b'{' if depth < MAX_DEPTH => scan_object(bytes, i, depth + 1),
        b'[' if depth < MAX_DEPTH => scan_array(bytes, i, depth + 1),
        b't' => scan_literal(bytes, i, b"true"),
        b'f' => scan_literal(bytes, i, b"false"),
        b'n' => scan_literal(bytes, i, b"null"),
        b'-' | b'0'..=b'9' => scan_number(bytes, i),
        _ => None,
    }
}

#[inline]
fn scan_string(bytes: &[u8], start: usize) -> Option<usize> {
    if bytes.get(start) != Some(&b'"') {
        return None;
    }
    let mut i = start + 1;
    loop {
        match *bytes.get(i)? {
            b'"' => return Some(i + 1),
            b'\\' => {
                match *bytes.get(i + 1)? {
                    b'"' | b'\\' | b'/' | b'b' | b'f' | b'n' | b'r' | b't' => i += 2,
                    b'u' => {
                        let hex = bytes.get(i + 2..i + 6)?;
                        if !hex.iter().all(u8::is_ascii_hexdigit) {
                            return None;
                        }
                        i += 6;
                    }
                    _ => return None,
                }
            }
            0x00..=0x1F => return None,
            _ => i += 1,
        }
    }
}

fn scan_object(bytes: &[u8], start: usize, depth: usize) -> Option<usize> {
    let mut i = skip_ws(bytes, start + 1);
    if *bytes.get(i)? == b'}' {
        return Some(i + 1);
    }
    loop {
        i = scan_string(bytes, skip_ws(bytes, i))?;
        i = skip_ws(bytes, i);
        if *bytes.get(i)? != b':' {
            return None;
        }
        i = skip_ws(bytes, scan_value(bytes, i + 1, depth)?);
        match *bytes.get(i)? {
            b',' => i += 1,
            b'}' => return Some(i + 1),
            _ => return None,
        }
    }
}

fn scan_array(bytes: &[u8], start: usize, depth: usize) -> Option<usize> {
    let mut i = skip_ws(bytes, start + 1);
    if *bytes.get(i)? == b']' {
        return Some(i + 1);
    }
    loop {
        i = skip_ws(bytes, scan_value(bytes, i, depth)?);
        match *bytes.get(i)? {
            b',' => i += 1,
            b']' => return Some(i + 1),
            _ => return None,
        }
    }
}

#[inline]
fn scan_literal(bytes: &[u8], start: usize, lit: &[u8]) -> Option<usize> {
    let end = start.checked_add(lit.len())?;
    (bytes.get(start..end)? == lit).then_some(end)
}

fn scan_number(bytes: &[u8], start: usize) -> Option<usize> {
    let digits_from = |mut i: usize| {
        while bytes.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        i
    };

    let mut i = start;
    if bytes.get(i) == Some(&b'-') {
        i += 1;
    }
    match *bytes.get(i)? {
        b'0' => i += 1,
        b'1'..=b'9' => i = digits_from(i + 1),
        _ => return None,
    }

    if bytes.get(i) == Some(&b'.') {
        if !bytes.get(i + 1)?.is_ascii_digit() {
            return None;
        }
        i = digits_from(i + 1);
    }

    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        i += 1;
        if matches!(bytes.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        if !bytes.get(i)?.is_ascii_digit() {
            return None;
        }
        i = digits_from(i);
    }

    Some(i)
}
