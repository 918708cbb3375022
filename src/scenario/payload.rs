//! Randomized registration credentials.

use rand::distributions::{Alphanumeric, DistString};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_PASSWORD: &str = "Password@123";
pub const EMAIL_DOMAIN: &str = "example.com";

const LOCAL_PART_LEN: usize = 10;
const NAME_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPayload {
    pub email: String,
    pub name: String,
    pub password: String,
}

/// Builds per-iteration credentials.
///
/// Emails have the shape `{random}.{namespace}{iteration:x}@example.com`.
/// The namespace is fixed per generator (8 hex chars of a v4 UUID) and the
/// iteration number is unique within a run, so emails never collide inside
/// one run. Across runs two emails only collide if both the 32-bit
/// namespace and the 10-character random part (~51 bits) match, which
/// bounds any pair below 2^-80.
#[derive(Debug, Clone)]
pub struct CredentialGenerator {
    namespace: String,
    password: String,
}

impl Default for CredentialGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialGenerator {
    pub fn new() -> Self {
        let namespace = Uuid::new_v4().simple().to_string()[..8].to_string();
        Self::with_namespace(namespace)
    }

    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            password: DEFAULT_PASSWORD.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn payload(&self, iteration: u64) -> RegisterPayload {
        let mut rng = rand::thread_rng();
        RegisterPayload {
            email: format!(
                "{}.{}{:x}@{}",
                random_string(&mut rng, LOCAL_PART_LEN),
                self.namespace,
                iteration,
                EMAIL_DOMAIN
            ),
            name: random_string(&mut rng, NAME_LEN),
            password: self.password.clone(),
        }
    }
}

/// Lowercase ASCII letters and digits.
pub fn random_string<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    Alphanumeric
        .sample_string(rng, len)
        .to_ascii_lowercase()
}
