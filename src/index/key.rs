//! Canonical lookup keys.
//!
//! A [`Key`] is the ordered tuple of field values an [`Index`](super::Index)
//! projects out of a cached value. Keys compare and hash structurally, and
//! render to an unambiguous string via [`Key::encode_into`] for use as a
//! per-key lock name.

use std::fmt;

/// One field value inside a [`Key`].
///
/// Integers compare by value regardless of the Rust type they came from:
/// every non-negative integer is held as `Uint`, so `Int` only ever holds
/// negative values once it has passed through a [`Key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Str(String),
    Int(i64),
    Uint(u64),
    Bool(bool),
}

impl KeyPart {
    /// Folds non-negative `Int`s into `Uint`.
    fn canonical(self) -> Self {
        match self {
            KeyPart::Int(n) if n >= 0 => KeyPart::Uint(n.unsigned_abs()),
            part => part,
        }
    }

    /// Returns `true` for the type's zero value: `""`, `0` or `false`.
    pub fn is_zero(&self) -> bool {
        match self {
            KeyPart::Str(s) => s.is_empty(),
            KeyPart::Int(n) => *n == 0,
            KeyPart::Uint(n) => *n == 0,
            KeyPart::Bool(b) => !*b,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            KeyPart::Str(s) => Some(s),
            _ => None,
        }
    }

    // Strings are length-prefixed so that no two keys share an encoding.
    fn encode_into(&self, out: &mut String) {
        match self {
            KeyPart::Str(s) => {
                out.push('s');
                out.push_str(&s.len().to_string());
                out.push(':');
                out.push_str(s);
            },
            KeyPart::Int(n) => {
                out.push('i');
                out.push_str(&n.to_string());
            },
            KeyPart::Uint(n) => {
                out.push('u');
                out.push_str(&n.to_string());
            },
            KeyPart::Bool(b) => out.push_str(if *b { "b1" } else { "b0" }),
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Str(s) => f.write_str(s),
            KeyPart::Int(n) => write!(f, "{n}"),
            KeyPart::Uint(n) => write!(f, "{n}"),
            KeyPart::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart::Str(value.to_owned())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        KeyPart::Str(value)
    }
}

impl From<&String> for KeyPart {
    fn from(value: &String) -> Self {
        KeyPart::Str(value.clone())
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        KeyPart::Bool(value)
    }
}

macro_rules! key_part_from_int {
    ($variant:ident => $($ty:ty),+) => {
        $(
            impl From<$ty> for KeyPart {
                fn from(value: $ty) -> Self {
                    KeyPart::$variant(value.into()).canonical()
                }
            }
        )+
    };
}

key_part_from_int!(Int => i64, i32, i16, i8);
key_part_from_int!(Uint => u64, u32, u16, u8);

impl From<usize> for KeyPart {
    fn from(value: usize) -> Self {
        KeyPart::Uint(value as u64)
    }
}

/// Ordered tuple of [`KeyPart`]s.
///
/// Single values and tuples convert directly:
///
/// ```
/// use entitycache::index::{Key, KeyPart};
///
/// let by_id: Key = "01F8MH".into();
/// let pair: Key = ("account-1", "account-2").into();
///
/// assert_eq!(by_id.parts(), &[KeyPart::from("01F8MH")]);
/// assert_eq!(pair.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Vec<KeyPart>);

impl Key {
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts.into_iter().map(KeyPart::canonical).collect())
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if any part holds its zero value.
    pub fn is_zero(&self) -> bool {
        self.0.iter().any(KeyPart::is_zero)
    }

    /// Appends the canonical encoding of this key to `out`.
    pub fn encode_into(&self, out: &mut String) {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                out.push('|');
            }
            part.encode_into(out);
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

impl From<Vec<KeyPart>> for Key {
    fn from(parts: Vec<KeyPart>) -> Self {
        Self::new(parts)
    }
}

impl From<KeyPart> for Key {
    fn from(part: KeyPart) -> Self {
        Self(vec![part.canonical()])
    }
}

macro_rules! key_from_single {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for Key {
                fn from(value: $ty) -> Self {
                    Self(vec![KeyPart::from(value)])
                }
            }
        )+
    };
}

key_from_single!(&str, String, &String, bool, i64, i32, i16, i8, u64, u32, u16, u8, usize);

impl<A, B> From<(A, B)> for Key
where
    A: Into<KeyPart>,
    B: Into<KeyPart>,
{
    fn from((a, b): (A, B)) -> Self {
        Self::new(vec![a.into(), b.into()])
    }
}

impl<A, B, C> From<(A, B, C)> for Key
where
    A: Into<KeyPart>,
    B: Into<KeyPart>,
    C: Into<KeyPart>,
{
    fn from((a, b, c): (A, B, C)) -> Self {
        Self::new(vec![a.into(), b.into(), c.into()])
    }
}
