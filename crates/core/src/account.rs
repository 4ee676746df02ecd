//! Caller accounts and authorization.
//!
//! An account binds an API credential to the backend identity (guild,
//! channel, user token) used on its behalf, plus a monthly usage quota.

use std::fmt;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

/// Account role. Admins are privileged and never quota-limited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountRole {
    #[default]
    User,
    Admin,
}

/// A caller account as returned by the account store.
#[derive(Clone, Serialize, Deserialize)]
pub struct Account {
    /// API credential presented by the caller.
    pub credential: String,
    /// Human-readable label (email or username) for logs.
    pub label: String,
    pub server_id: String,
    pub channel_id: String,
    /// Backend user token. Never logged.
    pub token: String,
    /// Generations allowed per calendar month; negative means unlimited.
    pub monthly_limit: i32,
    pub usage_count: i32,
    pub role: AccountRole,
    pub blocked: bool,
    /// When `usage_count` was last reset.
    pub usage_reset_at: Timestamp,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("label", &self.label)
            .field("server_id", &self.server_id)
            .field("channel_id", &self.channel_id)
            .field("token", &"***")
            .field("monthly_limit", &self.monthly_limit)
            .field("usage_count", &self.usage_count)
            .field("role", &self.role)
            .field("blocked", &self.blocked)
            .finish()
    }
}

/// Identity used to scope task and record access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub credential: String,
    pub privileged: bool,
}

impl Caller {
    /// Whether this caller may see a resource owned by `owner`.
    pub fn can_access(&self, owner: &str) -> bool {
        self.privileged || self.credential == owner
    }
}

impl Account {
    pub fn is_privileged(&self) -> bool {
        self.role == AccountRole::Admin
    }

    pub fn is_unlimited(&self) -> bool {
        self.is_privileged() || self.monthly_limit < 0
    }

    pub fn caller(&self) -> Caller {
        Caller {
            credential: self.credential.clone(),
            privileged: self.is_privileged(),
        }
    }

    /// Usage counted against the current calendar month.
    ///
    /// A counter last reset in an earlier month counts as zero.
    pub fn effective_usage(&self, now: Timestamp) -> i32 {
        if same_month(self.usage_reset_at, now) {
            self.usage_count
        } else {
            0
        }
    }

    /// Check that the account may start new work.
    pub fn authorize(&self, now: Timestamp) -> Result<(), CoreError> {
        if self.blocked {
            return Err(CoreError::Forbidden("Account is blocked".into()));
        }
        if self.is_unlimited() {
            return Ok(());
        }
        let used = self.effective_usage(now);
        if used >= self.monthly_limit {
            return Err(CoreError::QuotaExceeded {
                limit: self.monthly_limit,
                used,
            });
        }
        Ok(())
    }
}

/// Whether two instants fall in the same calendar month (UTC).
pub fn same_month(a: Timestamp, b: Timestamp) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};

    fn account(limit: i32, used: i32) -> Account {
        Account {
            credential: "mj_key".into(),
            label: "user@example.com".into(),
            server_id: "1".into(),
            channel_id: "2".into(),
            token: "secret-token".into(),
            monthly_limit: limit,
            usage_count: used,
            role: AccountRole::User,
            blocked: false,
            usage_reset_at: Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap(),
        }
    }

    fn october() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
    }

    #[test]
    fn under_quota_is_authorized() {
        assert!(account(10, 9).authorize(october()).is_ok());
    }

    #[test]
    fn at_quota_is_rejected() {
        assert_matches!(
            account(10, 10).authorize(october()),
            Err(CoreError::QuotaExceeded { limit: 10, used: 10 })
        );
    }

    #[test]
    fn usage_rolls_over_in_a_new_month() {
        let november = Utc.with_ymd_and_hms(2026, 11, 2, 0, 0, 0).unwrap();
        let acc = account(10, 10);
        assert_eq!(acc.effective_usage(november), 0);
        assert!(acc.authorize(november).is_ok());
    }

    #[test]
    fn blocked_is_forbidden_even_for_admins() {
        let mut acc = account(10, 0);
        acc.role = AccountRole::Admin;
        acc.blocked = true;
        assert_matches!(acc.authorize(october()), Err(CoreError::Forbidden(_)));
    }

    #[test]
    fn admin_and_negative_limit_are_unlimited() {
        let mut admin = account(1, 50);
        admin.role = AccountRole::Admin;
        assert!(admin.authorize(october()).is_ok());
        assert!(account(-1, 50).authorize(october()).is_ok());
    }

    #[test]
    fn debug_redacts_token() {
        let rendered = format!("{:?}", account(1, 0));
        assert!(!rendered.contains("secret-token"));
    }

    #[test]
    fn caller_scoping() {
        let caller = account(1, 0).caller();
        assert!(caller.can_access("mj_key"));
        assert!(!caller.can_access("someone_else"));
    }
}
