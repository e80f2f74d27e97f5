//! Investments-specific claims
//!
//! The identity provider knows who the user is. This API decides what the
//! user may see: a role and the regions whose investments they can access.

use std::collections::HashMap;

use async_trait::async_trait;
use oauth_claims::{CustomClaimsProvider, TokenClaims, UserInfoClaims};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Claims held in this API's own data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestorClaims {
    /// Business user id, distinct from the token subject
    pub user_id: String,
    /// `admin` or `user`
    pub user_role: String,
    /// Regions the user may view
    pub user_regions: Vec<String>,
}

/// A user record in the API's data
#[derive(Debug, Clone)]
struct UserRecord {
    user_id: &'static str,
    role: &'static str,
    regions: &'static [&'static str],
}

/// Looks up investor claims by token subject or email
#[derive(Debug, Clone)]
pub struct InvestorClaimsProvider {
    by_subject: HashMap<String, UserRecord>,
    by_email: HashMap<String, UserRecord>,
}

impl Default for InvestorClaimsProvider {
    fn default() -> Self {
        let admin = UserRecord {
            user_id: "20116",
            role: "admin",
            regions: &["Europe", "USA", "Asia"],
        };
        let user = UserRecord {
            user_id: "10345",
            role: "user",
            regions: &["USA"],
        };

        Self {
            by_subject: HashMap::new(),
            by_email: HashMap::from([
                ("guestadmin@mycompany.com".to_string(), admin),
                ("guestuser@mycompany.com".to_string(), user),
            ]),
        }
    }
}

impl InvestorClaimsProvider {
    /// Map a token subject directly to a user
    #[must_use]
    pub fn with_subject(mut self, subject: &str, user_id: &'static str, role: &'static str) -> Self {
        self.by_subject.insert(
            subject.to_string(),
            UserRecord {
                user_id,
                role,
                regions: &[],
            },
        );
        self
    }

    fn find(&self, token: &TokenClaims, user_info: Option<&UserInfoClaims>) -> Option<&UserRecord> {
        self.by_subject.get(&token.subject).or_else(|| {
            let email = user_info?.email.as_ref()?;
            self.by_email.get(&email.to_lowercase())
        })
    }
}

#[async_trait]
impl CustomClaimsProvider for InvestorClaimsProvider {
    type Claims = InvestorClaims;

    async fn lookup(
        &self,
        token: &TokenClaims,
        user_info: Option<&UserInfoClaims>,
    ) -> anyhow::Result<InvestorClaims> {
        let Some(record) = self.find(token, user_info) else {
            // Unknown users get no regions rather than an error
            debug!(subject = %token.subject, "No investor record for user");
            return Ok(InvestorClaims::default());
        };

        Ok(InvestorClaims {
            user_id: record.user_id.to_string(),
            user_role: record.role.to_string(),
            user_regions: record.regions.iter().map(ToString::to_string).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn token(subject: &str) -> TokenClaims {
        TokenClaims {
            subject: subject.to_string(),
            client_id: "web-client".to_string(),
            scopes: vec!["openid".to_string()],
            expiry: 0,
        }
    }

    fn user_info(email: &str) -> UserInfoClaims {
        UserInfoClaims {
            email: Some(email.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_lookup_by_email() {
        let provider = InvestorClaimsProvider::default();
        let claims = provider
            .lookup(&token("abc"), Some(&user_info("GuestAdmin@mycompany.com")))
            .await
            .unwrap();

        assert_eq!(claims.user_id, "20116");
        assert_eq!(claims.user_role, "admin");
        assert_eq!(claims.user_regions, vec!["Europe", "USA", "Asia"]);
    }

    #[tokio::test]
    async fn test_lookup_by_subject_wins() {
        let provider = InvestorClaimsProvider::default().with_subject("abc", "777", "user");
        let claims = provider
            .lookup(&token("abc"), Some(&user_info("guestadmin@mycompany.com")))
            .await
            .unwrap();
        assert_eq!(claims.user_id, "777");
    }

    #[tokio::test]
    async fn test_unknown_user_gets_empty_claims() {
        let provider = InvestorClaimsProvider::default();
        let claims = provider.lookup(&token("stranger"), None).await.unwrap();
        assert_eq!(claims, InvestorClaims::default());
    }
}
