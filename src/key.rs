use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

/// Account class of the current key; decides the quota capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tier {
    #[default]
    Anonymous,
    Premium,
}

impl Tier {
    pub fn from_premium(is_premium: bool) -> Self {
        if is_premium {
            Tier::Premium
        } else {
            Tier::Anonymous
        }
    }
}

#[derive(Debug, Default)]
struct KeyState {
    key: Option<String>,
    tier: Tier,
}

/// Current API key and the tier it was last validated as.
#[derive(Debug, Default)]
pub struct KeyManager {
    state: RwLock<KeyState>,
}

impl KeyManager {
    pub fn new(key: Option<String>) -> Self {
        Self {
            state: RwLock::new(KeyState {
                key,
                tier: Tier::Anonymous,
            }),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, KeyState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn key(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .key
            .clone()
    }

    /// Store a new key. The tier is left alone until the key is validated.
    pub fn set_key(&self, key: Option<String>) {
        self.write().key = key;
    }

    pub fn tier(&self) -> Tier {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tier
    }

    /// Record `tier` as the tier of `key`, provided `key` is still current.
    /// `apply` runs under the same lock so a concurrent key change cannot
    /// interleave. Returns the previous tier, or `None` if `key` is stale.
    pub fn set_tier_for<F: FnOnce(Tier)>(
        &self,
        key: Option<&str>,
        tier: Tier,
        apply: F,
    ) -> Option<Tier> {
        let mut state = self.write();
        if state.key.as_deref() != key {
            return None;
        }
        let previous = std::mem::replace(&mut state.tier, tier);
        apply(tier);
        Some(previous)
    }
}
