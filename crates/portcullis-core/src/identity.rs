//! Caller identity from bearer tokens.
//!
//! The token's middle segment is decoded and read as a JSON claim set. By
//! default the signature is **not** checked: the gateway in front is expected
//! to have validated the token already. Set [`Verification::Hs256`] to have
//! the extractor verify HMAC-signed tokens itself.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use http::header::AUTHORIZATION;
use http::HeaderMap;
use indexmap::IndexSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::IdentityError;

/// Claim set of a decoded token.
pub type Claims = Map<String, Value>;

/// The authenticated actor of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Subject id, used as the relationship subject in permission checks.
    pub id: String,
    /// Role claims; may be empty.
    pub roles: IndexSet<String>,
}

impl Subject {
    /// Creates a subject without roles.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: IndexSet::new(),
        }
    }

    /// Adds roles, builder style.
    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Returns true if the subject holds `role`.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Returns true if the subject holds at least one of `required`.
    ///
    /// An empty requirement is always satisfied.
    pub fn has_any_role<'a, I>(&self, required: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut required = required.into_iter().peekable();
        required.peek().is_none() || required.any(|r| self.roles.contains(r))
    }

    /// Returns a string identifier suitable for logging.
    pub fn log_id(&self) -> String {
        format!("user:{}", self.id)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// How token signatures are treated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    /// Claims are read without checking the signature.
    #[default]
    None,
    /// HMAC-SHA256 signature is verified with a shared secret; `exp` is
    /// enforced when present.
    Hs256 {
        /// Shared secret.
        secret: String,
    },
}

/// Extractor settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityOptions {
    /// Authorization scheme, compared exactly (`Bearer`).
    pub scheme: String,
    /// Claim holding the subject id.
    pub subject_claim: String,
    /// Claim holding the role list.
    pub roles_claim: String,
    /// Signature handling.
    pub verification: Verification,
}

impl Default for IdentityOptions {
    fn default() -> Self {
        Self {
            scheme: "Bearer".to_string(),
            subject_claim: "userId".to_string(),
            roles_claim: "roles".to_string(),
            verification: Verification::None,
        }
    }
}

impl IdentityOptions {
    /// Sets the subject claim.
    #[must_use]
    pub fn with_subject_claim(mut self, claim: impl Into<String>) -> Self {
        self.subject_claim = claim.into();
        self
    }

    /// Sets the roles claim.
    #[must_use]
    pub fn with_roles_claim(mut self, claim: impl Into<String>) -> Self {
        self.roles_claim = claim.into();
        self
    }

    /// Sets the verification mode.
    #[must_use]
    pub fn with_verification(mut self, verification: Verification) -> Self {
        self.verification = verification;
        self
    }
}

struct Verifier {
    key: DecodingKey,
    validation: Validation,
}

/// Turns an `Authorization` header into a [`Subject`].
///
/// # Example
///
/// ```rust
/// use http::{header::AUTHORIZATION, HeaderMap, HeaderValue};
/// use portcullis_core::{IdentityOptions, SubjectExtractor};
///
/// // {"userId":"576985","roles":["PROVIDER"]}
/// let token = "eyJhbGciOiJIUzI1NiJ9.eyJ1c2VySWQiOiI1NzY5ODUiLCJyb2xlcyI6WyJQUk9WSURFUiJdfQ.sig";
/// let mut headers = HeaderMap::new();
/// headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}")).unwrap());
///
/// let subject = SubjectExtractor::new(IdentityOptions::default()).extract(&headers).unwrap();
/// assert_eq!(subject.id, "576985");
/// assert!(subject.has_role("PROVIDER"));
/// ```
pub struct SubjectExtractor {
    options: IdentityOptions,
    prefix: String,
    verifier: Option<Verifier>,
}

impl fmt::Debug for SubjectExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubjectExtractor")
            .field("scheme", &self.options.scheme)
            .field("subject_claim", &self.options.subject_claim)
            .field("roles_claim", &self.options.roles_claim)
            .field("verifies_signature", &self.verifier.is_some())
            .finish()
    }
}

impl Default for SubjectExtractor {
    fn default() -> Self {
        Self::new(IdentityOptions::default())
    }
}

impl SubjectExtractor {
    /// Creates an extractor.
    pub fn new(options: IdentityOptions) -> Self {
        let verifier = match &options.verification {
            Verification::None => {
                warn!("bearer token signatures are not verified; tokens must be validated upstream");
                None
            }
            Verification::Hs256 { secret } => {
                let mut validation = Validation::new(Algorithm::HS256);
                validation.required_spec_claims.clear();
                validation.validate_aud = false;
                Some(Verifier {
                    key: DecodingKey::from_secret(secret.as_bytes()),
                    validation,
                })
            }
        };
        let prefix = format!("{} ", options.scheme);
        Self {
            options,
            prefix,
            verifier,
        }
    }

    /// The extractor settings.
    pub fn options(&self) -> &IdentityOptions {
        &self.options
    }

    /// Returns true if signatures are verified.
    pub fn verifies_signature(&self) -> bool {
        self.verifier.is_some()
    }

    /// Extracts the subject from request headers.
    pub fn extract(&self, headers: &HeaderMap) -> Result<Subject, IdentityError> {
        let value = headers
            .get(AUTHORIZATION)
            .ok_or(IdentityError::MissingHeader)?
            .to_str()
            .map_err(|_| IdentityError::InvalidHeader)?;
        let token = value
            .strip_prefix(self.prefix.as_str())
            .ok_or_else(|| IdentityError::WrongScheme {
                expected: self.options.scheme.clone(),
            })?;
        self.extract_token(token.trim())
    }

    /// Extracts the subject from a raw token (without the scheme).
    pub fn extract_token(&self, token: &str) -> Result<Subject, IdentityError> {
        let claims = match &self.verifier {
            Some(verifier) => verified_claims(token, verifier)?,
            None => decode_claims(token)?,
        };
        self.subject_from_claims(&claims)
    }

    /// Builds a subject from an already decoded claim set.
    pub fn subject_from_claims(&self, claims: &Claims) -> Result<Subject, IdentityError> {
        let claim = &self.options.subject_claim;
        let id = match claims.get(claim) {
            None | Some(Value::Null) => {
                return Err(IdentityError::MissingSubject {
                    claim: claim.clone(),
                })
            }
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(_) => {
                return Err(IdentityError::InvalidSubject {
                    claim: claim.clone(),
                })
            }
        };

        let roles_claim = &self.options.roles_claim;
        let roles = match claims.get(roles_claim) {
            None | Some(Value::Null) => IndexSet::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(ToString::to_string))
                .collect::<Option<IndexSet<_>>>()
                .ok_or_else(|| IdentityError::InvalidRoles {
                    claim: roles_claim.clone(),
                })?,
            Some(_) => {
                return Err(IdentityError::InvalidRoles {
                    claim: roles_claim.clone(),
                })
            }
        };

        Ok(Subject { id, roles })
    }
}

/// Decodes the payload of a three-part token without verifying it.
pub fn decode_claims(token: &str) -> Result<Claims, IdentityError> {
    let parts: Vec<&str> = token.split('.').collect();
    let [_, payload, _] = parts.as_slice() else {
        return Err(IdentityError::malformed(format!(
            "expected 3 segments, found {}",
            parts.len()
        )));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| IdentityError::malformed(e.to_string()))?;
    serde_json::from_slice::<Claims>(&bytes).map_err(|e| IdentityError::InvalidPayload(e.to_string()))
}

fn verified_claims(token: &str, verifier: &Verifier) -> Result<Claims, IdentityError> {
    jsonwebtoken::decode::<Claims>(token, &verifier.key, &verifier.validation)
        .map(|data| data.claims)
        .map_err(|e| IdentityError::Verification(e.to_string()))
}
