//! Account records as seen by the verifier.

use serde::{Deserialize, Deserializer, Serialize};
use sigil_core::Pattern;
use typed_builder::TypedBuilder;

/// The credential and ACL material of one account.
///
/// Records are owned by an [`AccountStore`](crate::store::AccountStore) and
/// shared read-only between requests.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    /// Login name, the lookup key.
    #[builder(setter(into))]
    pub login: String,

    /// Stable account id.
    #[builder(default, setter(into))]
    #[serde(default)]
    pub id: String,

    /// Signing secret.
    #[builder(setter(into))]
    pub secret: String,

    /// Extra secret mixed into bearer-token (version 3) signatures.
    #[builder(default, setter(strip_option, into))]
    #[serde(default)]
    pub token_secret: Option<String>,

    /// Extra secret mixed into version 4 signatures.
    #[builder(default, setter(strip_option, into))]
    #[serde(default)]
    pub auth_secret: Option<String>,

    /// Salt for the stored password hash.
    #[builder(default, setter(into))]
    #[serde(default)]
    pub salt: String,

    /// Stored password hash, `sign(salt, password)`.
    #[builder(default, setter(into))]
    #[serde(default)]
    pub password: String,

    /// Account expiry in epoch milliseconds; `None` or `0` means never.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub expires: Option<i64>,

    /// Request lines this account may access.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub acl_allow: Option<Pattern>,

    /// Request lines this account may never access.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub acl_deny: Option<Pattern>,

    /// Query/body parameter names stripped from this account's requests.
    /// Compiled case-insensitive when deserialized.
    #[builder(default, setter(strip_option))]
    #[serde(default, deserialize_with = "case_insensitive_pattern")]
    pub query_deny: Option<Pattern>,

    /// Comma-separated account types, e.g. `"admin,manager"`.
    #[builder(default, setter(into))]
    #[serde(default, rename = "type")]
    pub account_type: String,
}

impl AccountRecord {
    /// Whether the account carries the given type.
    ///
    /// # Examples
    ///
    /// ```
    /// use sigil_auth::AccountRecord;
    ///
    /// let account = AccountRecord::builder()
    ///     .login("alice")
    ///     .secret("s3cr3t")
    ///     .account_type("manager, admin")
    ///     .build();
    /// assert!(account.has_type("admin"));
    /// assert!(!account.has_type("guest"));
    /// ```
    #[must_use]
    pub fn has_type(&self, wanted: &str) -> bool {
        self.account_type
            .split(',')
            .map(str::trim)
            .any(|t| !t.is_empty() && t == wanted)
    }

    /// Whether the account expiry has passed at `now_ms`.
    #[must_use]
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires.is_some_and(|e| e > 0 && e < now_ms)
    }
}

fn case_insensitive_pattern<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Pattern>, D::Error> {
    Option::<String>::deserialize(deserializer)?
        .map(|source| Pattern::new_case_insensitive(&source).map_err(serde::de::Error::custom))
        .transpose()
}

impl std::fmt::Debug for AccountRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountRecord")
            .field("login", &self.login)
            .field("id", &self.id)
            .field("expires", &self.expires)
            .field("acl_allow", &self.acl_allow)
            .field("acl_deny", &self.acl_deny)
            .field("query_deny", &self.query_deny)
            .field("account_type", &self.account_type)
            .finish_non_exhaustive()
    }
}
