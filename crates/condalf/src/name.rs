use std::fmt;
use std::ops::Deref;

/// A short owned display name, capped at `N` bytes.
///
/// Stream and buffer-instance names end up in log lines and staging file
/// names, so they are held to a fixed byte budget. The cap counts bytes,
/// not characters.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Name<const N: usize> {
    inner: String,
}

impl<const N: usize> Name<N> {
    /// Wrap `s`, refusing anything over the `N`-byte cap.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        if s.len() > N {
            return None;
        }
        Some(Self { inner: s.into() })
    }

    /// Wrap `s`, cutting it at the cap if necessary.
    ///
    /// The cut lands on the closest character boundary at or below `N`, so
    /// a truncated name can come out a byte or two short of the cap when a
    /// multi-byte character straddles it.
    pub fn from_str_truncate(s: &str) -> Self {
        let mut end = s.len().min(N);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        Self {
            inner: s[..end].into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl<const N: usize> Deref for Name<N> {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<const N: usize> fmt::Display for Name<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}
