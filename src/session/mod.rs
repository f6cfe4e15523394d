use std::fmt;

/// Opaque identity of the signed-in user, as assigned by whatever identity
/// provider sits in front of the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The current authenticated identity, passed explicitly to every layer that
/// issues mutations. `user = None` means signed out: reads still work, writes
/// are refused by the store.
#[derive(Debug, Clone, Default)]
pub struct Session {
    user: Option<UserId>,
}

impl Session {
    pub fn signed_in(user: UserId) -> Self {
        Self { user: Some(user) }
    }

    pub fn anonymous() -> Self {
        Self { user: None }
    }

    /// Builds a session from an optional raw identity string; blank input is
    /// treated as signed out.
    pub fn from_raw(raw: Option<&str>) -> Self {
        Self {
            user: raw.and_then(UserId::new),
        }
    }

    pub fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_identity_means_signed_out() {
        assert!(!Session::from_raw(None).is_signed_in());
        assert!(!Session::from_raw(Some("   ")).is_signed_in());
        assert!(Session::from_raw(Some("mika")).is_signed_in());
    }

    #[test]
    fn user_id_trims_surrounding_whitespace() {
        let id = UserId::new("  mika ").expect("non-empty id");
        assert_eq!(id.as_str(), "mika");
    }
}
