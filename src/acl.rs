use crate::error::{RadulaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const ALL_USERS_URI: &str = "http://acs.amazonaws.com/groups/global/AllUsers";
pub const AUTHENTICATED_USERS_URI: &str =
    "http://acs.amazonaws.com/groups/global/AuthenticatedUsers";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl Owner {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            email: None,
        }
    }

    pub fn as_grantee(&self) -> Grantee {
        Grantee::CanonicalUser {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            email: self.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupUri {
    AllUsers,
    AuthenticatedUsers,
}

impl GroupUri {
    pub fn uri(&self) -> &'static str {
        match self {
            GroupUri::AllUsers => ALL_USERS_URI,
            GroupUri::AuthenticatedUsers => AUTHENTICATED_USERS_URI,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grantee {
    CanonicalUser {
        id: String,
        display_name: Option<String>,
        email: Option<String>,
    },
    User { name: String },
    Group(GroupUri),
}

impl Grantee {
    pub fn user(name: impl Into<String>) -> Self {
        Grantee::User { name: name.into() }
    }

    fn same_identity(&self, other: &Grantee) -> bool {
        match (self, other) {
            (Grantee::CanonicalUser { id: a, .. }, Grantee::CanonicalUser { id: b, .. }) => a == b,
            (a, b) => a == b,
        }
    }

    pub fn is_owner(&self, owner: &Owner) -> bool {
        matches!(self, Grantee::CanonicalUser { id, .. } if *id == owner.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    Read,
    Write,
    ReadAcp,
    WriteAcp,
    FullControl,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "READ",
            Permission::Write => "WRITE",
            Permission::ReadAcp => "READ_ACP",
            Permission::WriteAcp => "WRITE_ACP",
            Permission::FullControl => "FULL_CONTROL",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grant {
    pub grantee: Grantee,
    pub permission: Permission,
}

impl Grant {
    pub fn new(grantee: Grantee, permission: Permission) -> Self {
        Self {
            grantee,
            permission,
        }
    }

    fn matches(&self, other: &Grant) -> bool {
        self.permission == other.permission && self.grantee.same_identity(&other.grantee)
    }
}

/// Ordered set of grants for one bucket or key.
///
/// Always carries exactly one `FULL_CONTROL` grant for its owner; the
/// constructors insert it and `revoke` refuses to take it away.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessControlList {
    owner: Owner,
    grants: Vec<Grant>,
}

impl AccessControlList {
    pub fn private(owner: &Owner) -> Self {
        Self {
            owner: owner.clone(),
            grants: vec![Grant::new(owner.as_grantee(), Permission::FullControl)],
        }
    }

    pub fn from_grants(owner: &Owner, grants: impl IntoIterator<Item = Grant>) -> Self {
        let mut acl = Self::private(owner);
        for grant in grants {
            acl.add(grant);
        }
        acl
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn grants(&self) -> &[Grant] {
        &self.grants
    }

    pub fn contains(&self, grant: &Grant) -> bool {
        self.grants.iter().any(|g| g.matches(grant))
    }

    pub fn add(&mut self, grant: Grant) -> bool {
        if self.contains(&grant) {
            return false;
        }
        self.grants.push(grant);
        true
    }

    /// Removes a grant, returning false when it was absent. The owner's
    /// `FULL_CONTROL` grant is never removed.
    pub fn revoke(&mut self, grant: &Grant) -> bool {
        if grant.permission == Permission::FullControl && grant.grantee.is_owner(&self.owner) {
            return false;
        }
        let before = self.grants.len();
        self.grants.retain(|g| !g.matches(grant));
        before != self.grants.len()
    }

    pub fn same_grants(&self, other: &AccessControlList) -> bool {
        self.grants.len() == other.grants.len()
            && self.grants.iter().all(|g| other.contains(g))
            && other.grants.iter().all(|g| self.contains(g))
    }

    pub fn missing_from<'a>(&'a self, other: &AccessControlList) -> Vec<&'a Grant> {
        self.grants.iter().filter(|g| !other.contains(g)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CannedAcl {
    Private,
    PublicRead,
    PublicReadWrite,
    AuthenticatedRead,
}

impl CannedAcl {
    pub const ALL: [CannedAcl; 4] = [
        CannedAcl::Private,
        CannedAcl::PublicRead,
        CannedAcl::PublicReadWrite,
        CannedAcl::AuthenticatedRead,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CannedAcl::Private => "private",
            CannedAcl::PublicRead => "public-read",
            CannedAcl::PublicReadWrite => "public-read-write",
            CannedAcl::AuthenticatedRead => "authenticated-read",
        }
    }

    fn extra_grant(&self) -> Option<Grant> {
        match self {
            CannedAcl::Private => None,
            CannedAcl::PublicRead => Some(Grant::new(
                Grantee::Group(GroupUri::AllUsers),
                Permission::Read,
            )),
            CannedAcl::PublicReadWrite => Some(Grant::new(
                Grantee::Group(GroupUri::AllUsers),
                Permission::Write,
            )),
            CannedAcl::AuthenticatedRead => Some(Grant::new(
                Grantee::Group(GroupUri::AuthenticatedUsers),
                Permission::Read,
            )),
        }
    }

    pub fn to_acl(&self, owner: &Owner) -> AccessControlList {
        AccessControlList::from_grants(owner, self.extra_grant())
    }
}

impl fmt::Display for CannedAcl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CannedAcl {
    type Err = RadulaError;

    fn from_str(s: &str) -> Result<Self> {
        CannedAcl::ALL
            .iter()
            .copied()
            .find(|canned| canned.name() == s)
            .ok_or_else(|| RadulaError::InvalidAcl(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Owner {
        Owner::new("owner-id")
    }

    fn owner_full_control_count(acl: &AccessControlList) -> usize {
        acl.grants()
            .iter()
            .filter(|g| g.permission == Permission::FullControl && g.grantee.is_owner(acl.owner()))
            .count()
    }

    #[test]
    fn test_every_canned_acl_has_one_owner_full_control() {
        for canned in CannedAcl::ALL {
            let acl = canned.to_acl(&owner());
            assert_eq!(owner_full_control_count(&acl), 1, "{}", canned);
        }
    }

    #[test]
    fn test_canned_templates() {
        let o = owner();
        assert_eq!(CannedAcl::Private.to_acl(&o).grants().len(), 1);

        let public_read = CannedAcl::PublicRead.to_acl(&o);
        assert!(public_read.contains(&Grant::new(
            Grantee::Group(GroupUri::AllUsers),
            Permission::Read
        )));

        let public_read_write = CannedAcl::PublicReadWrite.to_acl(&o);
        assert_eq!(public_read_write.grants().len(), 2);
        assert!(public_read_write.contains(&Grant::new(
            Grantee::Group(GroupUri::AllUsers),
            Permission::Write
        )));

        let authenticated = CannedAcl::AuthenticatedRead.to_acl(&o);
        assert!(authenticated.contains(&Grant::new(
            Grantee::Group(GroupUri::AuthenticatedUsers),
            Permission::Read
        )));
    }

    #[test]
    fn test_canned_names_round_trip() {
        for canned in CannedAcl::ALL {
            assert_eq!(canned.name().parse::<CannedAcl>().unwrap(), canned);
        }
    }

    #[test]
    fn test_rejects_names_outside_vocabulary() {
        for bad in [
            "public",
            "",
            "made_up",
            "authenticated-read-write",
            "bucket-owner-read",
            "bucket-owner-full-control",
            "PRIVATE",
        ] {
            match bad.parse::<CannedAcl>() {
                Err(RadulaError::InvalidAcl(name)) => assert_eq!(name, bad),
                other => panic!("expected InvalidAcl for {:?}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_duplicate_grants_collapse() {
        let mut acl = AccessControlList::private(&owner());
        let grant = Grant::new(Grantee::user("alt-user"), Permission::Read);
        assert!(acl.add(grant.clone()));
        assert!(!acl.add(grant));
        assert_eq!(acl.grants().len(), 2);
    }

    #[test]
    fn test_owner_full_control_cannot_be_revoked_or_duplicated() {
        let o = owner();
        let mut acl = AccessControlList::from_grants(
            &o,
            vec![Grant::new(o.as_grantee(), Permission::FullControl)],
        );
        assert_eq!(owner_full_control_count(&acl), 1);
        assert!(!acl.revoke(&Grant::new(o.as_grantee(), Permission::FullControl)));
        assert_eq!(owner_full_control_count(&acl), 1);
    }

    #[test]
    fn test_canonical_user_matches_by_id() {
        let acl = AccessControlList::private(&owner());
        let with_email = Grantee::CanonicalUser {
            id: "owner-id".into(),
            display_name: Some("Owner".into()),
            email: Some("owner@example.com".into()),
        };
        assert!(acl.contains(&Grant::new(with_email, Permission::FullControl)));
    }

    #[test]
    fn test_same_grants_ignores_order() {
        let o = owner();
        let read = Grant::new(Grantee::user("a"), Permission::Read);
        let write = Grant::new(Grantee::user("a"), Permission::Write);
        let left = AccessControlList::from_grants(&o, vec![read.clone(), write.clone()]);
        let right = AccessControlList::from_grants(&o, vec![write, read]);
        assert!(left.same_grants(&right));
        assert!(!left.same_grants(&AccessControlList::private(&o)));
    }

    #[test]
    fn test_missing_from_is_directional() {
        let o = owner();
        let public = CannedAcl::PublicReadWrite.to_acl(&o);
        let private = CannedAcl::Private.to_acl(&o);
        let missing = public.missing_from(&private);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].permission, Permission::Write);
        assert!(private.missing_from(&public).is_empty());
    }
}
