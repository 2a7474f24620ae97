use crate::acl::{AccessControlList, Grant, Grantee, Owner};

pub fn grant_line(grant: &Grant, owner: &Owner) -> String {
    let (kind, identity) = match &grant.grantee {
        Grantee::CanonicalUser { email, .. } => {
            let kind = if grant.grantee.is_owner(owner) {
                "CanonicalUser:OWNER"
            } else {
                "CanonicalUser"
            };
            (kind, email.as_deref().unwrap_or("None").to_string())
        }
        Grantee::User { name } => ("User", name.clone()),
        Grantee::Group(group) => ("Group", group.uri().to_string()),
    };
    format!("[{}] {} = {}", kind, identity, grant.permission)
}

pub fn acl_lines(acl: &AccessControlList) -> Vec<String> {
    acl.grants()
        .iter()
        .map(|grant| grant_line(grant, acl.owner()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::{CannedAcl, GroupUri, Permission};

    #[test]
    fn owner_without_email_renders_none() {
        let owner = Owner::new("abc123");
        let lines = acl_lines(&CannedAcl::Private.to_acl(&owner));
        assert_eq!(lines, vec!["[CanonicalUser:OWNER] None = FULL_CONTROL".to_string()]);
    }

    #[test]
    fn owner_email_is_shown() {
        let mut owner = Owner::new("abc123");
        owner.email = Some("me@example.com".into());
        let lines = acl_lines(&CannedAcl::Private.to_acl(&owner));
        assert_eq!(lines[0], "[CanonicalUser:OWNER] me@example.com = FULL_CONTROL");
    }

    #[test]
    fn group_and_user_lines() {
        let owner = Owner::new("abc123");
        let group = Grant::new(Grantee::Group(GroupUri::AllUsers), Permission::Read);
        assert_eq!(
            grant_line(&group, &owner),
            "[Group] http://acs.amazonaws.com/groups/global/AllUsers = READ"
        );

        let user = Grant::new(Grantee::user("alt-user"), Permission::WriteAcp);
        assert_eq!(grant_line(&user, &owner), "[User] alt-user = WRITE_ACP");

        let other = Grant::new(
            Grantee::CanonicalUser {
                id: "other".into(),
                display_name: None,
                email: None,
            },
            Permission::Read,
        );
        assert_eq!(grant_line(&other, &owner), "[CanonicalUser] None = READ");
    }
}
