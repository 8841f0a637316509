use std::fmt;

/// Separator between the segments of a key.
pub const SEPARATOR: char = '/';

/// A hierarchical, slash-delimited datastore key.
///
/// Keys are always held in canonical form: they start with `/`, have no
/// trailing `/` (except the root key itself), no empty segments, and `.`/`..`
/// segments are resolved lexically. Ordering is plain byte order, which is
/// the order backends enumerate keys in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(String);

impl Key {
    /// Creates a key from any string, cleaning it into canonical form.
    pub fn new(raw: &str) -> Self {
        Key(clean(raw))
    }

    /// The root key `/`.
    pub fn root() -> Self {
        Key(SEPARATOR.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// Returns true if `raw` is already in canonical key form.
    pub fn is_canonical(raw: &str) -> bool {
        clean(raw) == raw
    }

    /// The parent key. The root key is its own parent.
    pub fn parent(&self) -> Key {
        match self.0.rfind(SEPARATOR) {
            Some(0) | None => Key::root(),
            Some(idx) => Key(self.0[..idx].to_string()),
        }
    }
}

fn clean(raw: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split(SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    let mut out = String::with_capacity(raw.len() + 1);
    for segment in &segments {
        out.push(SEPARATOR);
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push(SEPARATOR);
    }
    out
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(raw: &str) -> Self {
        Key::new(raw)
    }
}

impl From<String> for Key {
    fn from(raw: String) -> Self {
        Key::new(&raw)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
