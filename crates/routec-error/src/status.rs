use std::fmt;

/// Whether retrying the failed operation could help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorStatus {
    /// Fixing the controller source or the configuration is the only way out.
    #[default]
    Permanent,
    /// Transient filesystem trouble, such as a cache rename racing another writer.
    Temporary,
    /// Still failing after a retry.
    Persistent,
}

impl ErrorStatus {
    pub fn is_retryable(&self) -> bool {
        *self == ErrorStatus::Temporary
    }

    /// Status after a retry that failed again.
    pub fn persist(self) -> Self {
        if self == ErrorStatus::Temporary {
            ErrorStatus::Persistent
        } else {
            self
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStatus::Permanent => "permanent",
            ErrorStatus::Temporary => "temporary",
            ErrorStatus::Persistent => "persistent",
        }
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_temporary_is_retryable() {
        assert!(ErrorStatus::Temporary.is_retryable());
        assert!(!ErrorStatus::Permanent.is_retryable());
        assert!(!ErrorStatus::Persistent.is_retryable());
    }

    #[test]
    fn persist_only_escalates_temporary() {
        assert_eq!(ErrorStatus::Temporary.persist(), ErrorStatus::Persistent);
        assert_eq!(ErrorStatus::Permanent.persist(), ErrorStatus::Permanent);
    }
}
