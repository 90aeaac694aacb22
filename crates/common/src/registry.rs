//! Static registry of logical tests
//!
//! Each logical test pairs a small integer id with the grep expression the
//! external runner understands. The grep patterns are space-free regexes so
//! they survive being passed through a shell; "." is the regex wildcard.

use serde::{Deserialize, Serialize};

/// Kind of input the dashboard renders for a run variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Text,
    Email,
    Password,
}

/// A named parameter supplied to the runner as process environment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestVariable {
    pub key: String,
    pub label: String,
    pub input_kind: InputKind,
    pub default_value: String,
    pub description: String,
}

impl TestVariable {
    fn new(key: &str, label: &str, input_kind: InputKind, default_value: &str, description: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            input_kind,
            default_value: default_value.to_string(),
            description: description.to_string(),
        }
    }
}

/// A pre-registered logical test scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDescriptor {
    /// Small positive integer, unique within the registry
    pub id: u32,

    /// Human-readable label
    pub label: String,

    /// Spec file the scenario lives in (informational, shown in the UI)
    pub spec_file: String,

    /// Filter expression understood by the runner; also reused by the
    /// result parser to attribute output lines back to this test
    pub grep: String,

    /// Run-time variables, in render order
    pub variables: Vec<TestVariable>,
}

/// Ordered, immutable collection of test descriptors
#[derive(Debug, Clone)]
pub struct TestRegistry {
    tests: Vec<TestDescriptor>,
}

impl TestRegistry {
    /// Registry seeded with the built-in scenarios
    pub fn builtin() -> Self {
        let tests = vec![
            TestDescriptor {
                id: 1,
                label: "Search by book title".to_string(),
                spec_file: "tests/search.spec.ts".to_string(),
                grep: "searching.by.title".to_string(),
                variables: vec![TestVariable::new(
                    "SEARCH_QUERY",
                    "Search Query",
                    InputKind::Text,
                    "El Quijote",
                    "Book title or keyword to search for",
                )],
            },
            TestDescriptor {
                id: 2,
                label: "Invalid credentials error".to_string(),
                spec_file: "tests/login.spec.ts".to_string(),
                grep: "invalid.credentials".to_string(),
                variables: vec![
                    TestVariable::new(
                        "INVALID_USER_EMAIL",
                        "Email",
                        InputKind::Email,
                        "sample@sample.com",
                        "Email address expected to fail login",
                    ),
                    TestVariable::new(
                        "INVALID_USER_PASSWORD",
                        "Password",
                        InputKind::Password,
                        "12345678",
                        "Password expected to fail login",
                    ),
                ],
            },
            TestDescriptor {
                id: 3,
                label: "Login with valid credentials".to_string(),
                spec_file: "tests/login.spec.ts".to_string(),
                grep: "access.account.page".to_string(),
                variables: vec![
                    TestVariable::new(
                        "VALID_USER_EMAIL",
                        "Email",
                        InputKind::Email,
                        "",
                        "Valid account email address",
                    ),
                    TestVariable::new(
                        "VALID_USER_PASSWORD",
                        "Password",
                        InputKind::Password,
                        "",
                        "Valid account password",
                    ),
                ],
            },
        ];

        Self { tests }
    }

    /// All descriptors, in registry order
    pub fn all(&self) -> &[TestDescriptor] {
        &self.tests
    }

    /// Look up a descriptor by id
    pub fn get(&self, id: u32) -> Option<&TestDescriptor> {
        self.tests.iter().find(|t| t.id == id)
    }

    /// Label for an id, falling back to a generic placeholder
    pub fn label_for(&self, id: u32) -> String {
        self.get(id)
            .map(|t| t.label.clone())
            .unwrap_or_else(|| format!("Test #{}", id))
    }

    /// Split requested ids into resolvable descriptors and unknown ids,
    /// preserving request order on both sides
    pub fn resolve<'a>(&'a self, ids: &[u32]) -> (Vec<&'a TestDescriptor>, Vec<u32>) {
        let mut known = Vec::new();
        let mut unknown = Vec::new();
        for &id in ids {
            match self.get(id) {
                Some(desc) => known.push(desc),
                None => unknown.push(id),
            }
        }
        (known, unknown)
    }
}

impl Default for TestRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
