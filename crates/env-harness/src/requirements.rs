//! Test requirements and the shared/dedicated routing rule.
//!
//! [`select`] is the single place the routing decision is made. Everything
//! else (the selector, the live suite, the tests) asks it.

use std::fmt;

/// Which kind of environment a test receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvironmentKind {
    /// The long-lived, process-wide environment.
    Shared,
    /// A freshly provisioned environment owned by one test.
    Dedicated,
}

impl fmt::Display for EnvironmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvironmentKind::Shared => f.write_str("shared"),
            EnvironmentKind::Dedicated => f.write_str("dedicated"),
        }
    }
}

/// Category label used for logging and grouping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TestCategory {
    ReadOnly,
    Api,
    Dns,
    Configuration,
    Destructive,
    Performance,
    Other(String),
}

impl fmt::Display for TestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestCategory::ReadOnly => f.write_str("readonly"),
            TestCategory::Api => f.write_str("api"),
            TestCategory::Dns => f.write_str("dns"),
            TestCategory::Configuration => f.write_str("configuration"),
            TestCategory::Destructive => f.write_str("destructive"),
            TestCategory::Performance => f.write_str("performance"),
            TestCategory::Other(label) => f.write_str(label),
        }
    }
}

/// What a test needs from its environment.
///
/// A destructive test never asks for the shared environment: the constructor
/// clears `use_shared` whenever `destructive` is set, so the invariant holds
/// for every value of this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentRequirements {
    use_shared: bool,
    destructive: bool,
    category: TestCategory,
}

impl EnvironmentRequirements {
    #[must_use]
    pub fn new(use_shared: bool, destructive: bool, category: TestCategory) -> Self {
        Self {
            use_shared: use_shared && !destructive,
            destructive,
            category,
        }
    }

    /// Non-destructive test that may reuse the shared environment.
    #[must_use]
    pub fn shared(category: TestCategory) -> Self {
        Self::new(true, false, category)
    }

    /// Non-destructive test that still wants its own environment.
    #[must_use]
    pub fn isolated(category: TestCategory) -> Self {
        Self::new(false, false, category)
    }

    /// Test that mutates or tears down infrastructure.
    #[must_use]
    pub fn destructive(category: TestCategory) -> Self {
        Self::new(false, true, category)
    }

    #[must_use]
    pub fn use_shared(&self) -> bool {
        self.use_shared
    }

    #[must_use]
    pub fn is_destructive(&self) -> bool {
        self.destructive
    }

    #[must_use]
    pub fn category(&self) -> &TestCategory {
        &self.category
    }
}

/// Route a test to the shared or a dedicated environment.
///
/// Shared iff the test asked for it and is not destructive.
#[must_use]
pub fn select(requirements: &EnvironmentRequirements) -> EnvironmentKind {
    if requirements.use_shared && !requirements.destructive {
        EnvironmentKind::Shared
    } else {
        EnvironmentKind::Dedicated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_request_routes_shared() {
        let reqs = EnvironmentRequirements::shared(TestCategory::ReadOnly);
        assert_eq!(select(&reqs), EnvironmentKind::Shared);
    }

    #[test]
    fn test_isolated_request_routes_dedicated() {
        let reqs = EnvironmentRequirements::isolated(TestCategory::Api);
        assert_eq!(select(&reqs), EnvironmentKind::Dedicated);
    }

    #[test]
    fn test_destructive_never_routes_shared() {
        for use_shared in [true, false] {
            for category in [
                TestCategory::Destructive,
                TestCategory::ReadOnly,
                TestCategory::Other("cleanup_demo".into()),
            ] {
                let reqs = EnvironmentRequirements::new(use_shared, true, category);
                assert!(!reqs.use_shared());
                assert_eq!(select(&reqs), EnvironmentKind::Dedicated);
            }
        }
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(TestCategory::ReadOnly.to_string(), "readonly");
        assert_eq!(TestCategory::Other("cleanup_demo".into()).to_string(), "cleanup_demo");
        assert_eq!(EnvironmentKind::Shared.to_string(), "shared");
    }
}
