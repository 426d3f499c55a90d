//! Case-insensitive map keys
//!
//! Attribute names, domain keys and partition roots compare ignoring ASCII
//! case. [`NameKey`] keeps the name as first given; maps keyed by it are
//! queried with a plain `&str` through [`Named`] without lowercasing a copy.

use std::borrow::Borrow;
use std::hash::{Hash, Hasher};

/// A name compared ignoring ASCII case.
pub(crate) trait Named {
    fn name(&self) -> &str;
}

impl Named for &str {
    fn name(&self) -> &str {
        self
    }
}

impl Hash for dyn Named + '_ {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.name().bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
        state.write_u8(0xff);
    }
}

impl PartialEq for dyn Named + '_ {
    fn eq(&self, other: &Self) -> bool {
        self.name().eq_ignore_ascii_case(other.name())
    }
}

impl Eq for dyn Named + '_ {}

/// Owned map key.
#[derive(Debug, Clone)]
pub(crate) struct NameKey(String);

impl NameKey {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl Named for NameKey {
    fn name(&self) -> &str {
        &self.0
    }
}

impl Hash for NameKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self as &dyn Named).hash(state);
    }
}

impl PartialEq for NameKey {
    fn eq(&self, other: &Self) -> bool {
        (self as &dyn Named) == (other as &dyn Named)
    }
}

impl Eq for NameKey {}

impl<'a> Borrow<dyn Named + 'a> for NameKey {
    fn borrow(&self) -> &(dyn Named + 'a) {
        self
    }
}

/// Query form of a borrowed name.
pub(crate) fn query<'a>(name: &'a &'a str) -> &'a (dyn Named + 'a) {
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_lookup_ignores_case() {
        let mut map = HashMap::new();
        map.insert(NameKey::new("sAMAccountName"), 1);
        map.insert(NameKey::new("SAMACCOUNTNAME"), 2);
        assert_eq!(map.len(), 1);

        assert_eq!(map.get(query(&"samaccountname")), Some(&2));
        assert_eq!(map.get(query(&"sAMAccountName")), Some(&2));
        assert_eq!(map.get(query(&"sAMAccountNam")), None);
        assert_eq!(map.keys().next().map(NameKey::as_str), Some("sAMAccountName"));
    }
}
