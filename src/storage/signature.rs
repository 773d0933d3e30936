use parking_lot::Mutex;
use std::fmt;
use uuid::Uuid;

/// Mutation-version token of a table.
///
/// A fresh token is minted on every mutation. Tokens compare equal only when
/// one was copied from the other, so two identical mutations still produce two
/// different signatures.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(Uuid);

impl Signature {
    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", &self.0.simple().to_string()[..8])
    }
}

/// A derived value remembered together with the signature it was computed at.
pub struct SignatureCache<T> {
    slot: Mutex<Option<(Signature, T)>>,
}

impl<T: Clone> SignatureCache<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Returns the cached value if it was computed at `current`, otherwise
    /// recomputes it and remembers the result.
    pub fn get_or_refresh(&self, current: Signature, compute: impl FnOnce() -> T) -> T {
        let mut slot = self.slot.lock();
        if let Some((token, value)) = slot.as_ref()
            && *token == current
        {
            return value.clone();
        }

        let value = compute();
        *slot = Some((current, value.clone()));
        value
    }

    pub fn is_fresh(&self, current: Signature) -> bool {
        matches!(self.slot.lock().as_ref(), Some((token, _)) if *token == current)
    }

    pub fn invalidate(&self) {
        *self.slot.lock() = None;
    }
}

impl<T: Clone> Default for SignatureCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
