// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Organizations, users, auth methods, tags and invitations.

use chrono::{DateTime, Utc};
use redb::ReadableTable;

use super::{
    load_rows, read_json, scan_index, scoped_key, write_json, Database, StorageError,
    StorageResult, AUTH_METHODS, AUTH_METHODS_BY_USER, INVITATIONS, INVITATIONS_BY_ORG,
    INVITATIONS_BY_TOKEN, ORGANIZATIONS, TAGS, TAGS_BY_ORG, TAG_NAMES, USERS, USERS_BY_EMAIL,
    USERS_BY_ORG,
};
use crate::models::{normalize_email, AuthMethod, Invitation, Organization, Tag, User};

impl Database {
    // =========================================================================
    // Organizations
    // =========================================================================

    pub fn create_organization(&self, org: &Organization) -> StorageResult<()> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(ORGANIZATIONS)?;
            if table.get(org.organization_id.as_str())?.is_some() {
                return Err(StorageError::Conflict(format!(
                    "organization {} already exists",
                    org.organization_id
                )));
            }
            write_json(&mut table, &org.organization_id, org)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_organization(&self, organization_id: &str) -> StorageResult<Option<Organization>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(ORGANIZATIONS)?;
        read_json(&table, organization_id)
    }

    pub fn list_organizations(&self) -> StorageResult<Vec<Organization>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(ORGANIZATIONS)?;
        let mut orgs = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            orgs.push(serde_json::from_slice(value.value())?);
        }
        Ok(orgs)
    }

    /// Apply `f` to the stored organization and bump its version.
    pub fn update_organization(
        &self,
        organization_id: &str,
        f: impl FnOnce(&mut Organization),
    ) -> StorageResult<Organization> {
        let write_txn = self.begin_write()?;
        let org = {
            let mut table = write_txn.open_table(ORGANIZATIONS)?;
            let mut org: Organization = read_json(&table, organization_id)?.ok_or_else(|| {
                StorageError::NotFound(format!("Organization {organization_id}"))
            })?;
            f(&mut org);
            org.version += 1;
            write_json(&mut table, organization_id, &org)?;
            org
        };
        write_txn.commit()?;
        Ok(org)
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a user. Emails are unique within an organization.
    pub fn create_user(&self, user: &User) -> StorageResult<()> {
        let write_txn = self.begin_write()?;
        insert_user(&write_txn, user)?;
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_user(&self, user_id: &str) -> StorageResult<Option<User>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        read_json(&table, user_id)
    }

    pub fn find_user_by_email(
        &self,
        organization_id: &str,
        email: &str,
    ) -> StorageResult<Option<User>> {
        let read_txn = self.begin_read()?;
        let index = read_txn.open_table(USERS_BY_EMAIL)?;
        let key = scoped_key(organization_id, &normalize_email(email));
        let user_id = match index.get(key.as_str())? {
            Some(v) => v.value().to_string(),
            None => return Ok(None),
        };
        let table = read_txn.open_table(USERS)?;
        read_json(&table, &user_id)
    }

    pub fn list_users(&self, organization_id: &str) -> StorageResult<Vec<User>> {
        let read_txn = self.begin_read()?;
        let index = read_txn.open_table(USERS_BY_ORG)?;
        let table = read_txn.open_table(USERS)?;
        let ids = scan_index(&index, organization_id)?;
        load_rows(&table, &ids)
    }

    /// Replace a user's mutable fields (role, tags, active, display name).
    pub fn update_user(&self, user: &User) -> StorageResult<()> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(USERS)?;
            let existing: User = read_json(&table, &user.user_id)?
                .ok_or_else(|| StorageError::NotFound(format!("User {}", user.user_id)))?;
            if existing.organization_id != user.organization_id || existing.email != user.email {
                return Err(StorageError::Conflict(
                    "user organization and email are immutable".to_string(),
                ));
            }
            write_json(&mut table, &user.user_id, user)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    // =========================================================================
    // Auth Methods
    // =========================================================================

    pub fn add_auth_method(&self, method: &AuthMethod) -> StorageResult<()> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(AUTH_METHODS)?;
            write_json(&mut table, &method.auth_method_id, method)?;
            let mut index = write_txn.open_table(AUTH_METHODS_BY_USER)?;
            index.insert(
                scoped_key(&method.user_id, &method.auth_method_id).as_str(),
                method.auth_method_id.as_str(),
            )?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn list_auth_methods(&self, user_id: &str) -> StorageResult<Vec<AuthMethod>> {
        let read_txn = self.begin_read()?;
        let index = read_txn.open_table(AUTH_METHODS_BY_USER)?;
        let table = read_txn.open_table(AUTH_METHODS)?;
        let ids = scan_index(&index, user_id)?;
        load_rows(&table, &ids)
    }

    // =========================================================================
    // Tags
    // =========================================================================

    /// Insert a tag. Names are unique within an organization.
    pub fn create_tag(&self, tag: &Tag) -> StorageResult<()> {
        let write_txn = self.begin_write()?;
        {
            let mut names = write_txn.open_table(TAG_NAMES)?;
            let name_key = scoped_key(&tag.organization_id, &tag.name);
            if names.get(name_key.as_str())?.is_some() {
                return Err(StorageError::Conflict(format!("tag {} already exists", tag.name)));
            }
            names.insert(name_key.as_str(), tag.tag_id.as_str())?;

            let mut table = write_txn.open_table(TAGS)?;
            write_json(&mut table, &tag.tag_id, tag)?;
            let mut index = write_txn.open_table(TAGS_BY_ORG)?;
            index.insert(
                scoped_key(&tag.organization_id, &tag.tag_id).as_str(),
                tag.tag_id.as_str(),
            )?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_tag(&self, tag_id: &str) -> StorageResult<Option<Tag>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(TAGS)?;
        read_json(&table, tag_id)
    }

    pub fn list_tags(&self, organization_id: &str) -> StorageResult<Vec<Tag>> {
        let read_txn = self.begin_read()?;
        let index = read_txn.open_table(TAGS_BY_ORG)?;
        let table = read_txn.open_table(TAGS)?;
        let ids = scan_index(&index, organization_id)?;
        load_rows(&table, &ids)
    }

    // =========================================================================
    // Invitations
    // =========================================================================

    pub fn create_invitation(&self, invitation: &Invitation) -> StorageResult<()> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(INVITATIONS)?;
            write_json(&mut table, &invitation.invitation_id, invitation)?;
            let mut by_token = write_txn.open_table(INVITATIONS_BY_TOKEN)?;
            by_token.insert(invitation.token.as_str(), invitation.invitation_id.as_str())?;
            let mut by_org = write_txn.open_table(INVITATIONS_BY_ORG)?;
            by_org.insert(
                scoped_key(&invitation.organization_id, &invitation.invitation_id).as_str(),
                invitation.invitation_id.as_str(),
            )?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn list_invitations(&self, organization_id: &str) -> StorageResult<Vec<Invitation>> {
        let read_txn = self.begin_read()?;
        let index = read_txn.open_table(INVITATIONS_BY_ORG)?;
        let table = read_txn.open_table(INVITATIONS)?;
        let ids = scan_index(&index, organization_id)?;
        load_rows(&table, &ids)
    }

    /// Redeem an invitation token, creating the invited user atomically.
    ///
    /// `build_user` receives the invitation and returns the user to insert.
    pub fn redeem_invitation(
        &self,
        token: &str,
        now: DateTime<Utc>,
        build_user: impl FnOnce(&Invitation) -> User,
    ) -> StorageResult<User> {
        let write_txn = self.begin_write()?;
        let user = {
            let invitation_id = {
                let by_token = write_txn.open_table(INVITATIONS_BY_TOKEN)?;
                let id = by_token.get(token)?.map(|v| v.value().to_string());
                id.ok_or_else(|| StorageError::NotFound("Invitation".to_string()))?
            };

            let mut table = write_txn.open_table(INVITATIONS)?;
            let mut invitation: Invitation = read_json(&table, &invitation_id)?
                .ok_or_else(|| StorageError::NotFound(format!("Invitation {invitation_id}")))?;
            if !invitation.is_redeemable(now) {
                return Err(StorageError::Conflict(
                    "invitation is expired or already redeemed".to_string(),
                ));
            }

            let user = build_user(&invitation);
            invitation.redeemed_at = Some(now);
            write_json(&mut table, &invitation_id, &invitation)?;
            drop(table);

            insert_user(&write_txn, &user)?;
            user
        };
        write_txn.commit()?;
        Ok(user)
    }
}

fn insert_user(write_txn: &redb::WriteTransaction, user: &User) -> StorageResult<()> {
    let mut emails = write_txn.open_table(USERS_BY_EMAIL)?;
    let email_key = scoped_key(&user.organization_id, &normalize_email(&user.email));
    if emails.get(email_key.as_str())?.is_some() {
        return Err(StorageError::Conflict(format!(
            "a user with email {} already exists",
            user.email
        )));
    }
    emails.insert(email_key.as_str(), user.user_id.as_str())?;

    let mut table = write_txn.open_table(USERS)?;
    write_json(&mut table, &user.user_id, user)?;
    let mut index = write_txn.open_table(USERS_BY_ORG)?;
    index.insert(
        scoped_key(&user.organization_id, &user.user_id).as_str(),
        user.user_id.as_str(),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Database) {
        let temp = TempDir::new().unwrap();
        let db = Database::open(&temp.path().join("test.redb")).unwrap();
        (temp, db)
    }

    fn user(org: &str, id: &str, email: &str) -> User {
        User {
            user_id: id.into(),
            organization_id: org.into(),
            email: normalize_email(email),
            display_name: None,
            role: Role::Operator,
            tags: vec![],
            active: true,
            created_at: Utc::now(),
        }
    }

    fn org(id: &str) -> Organization {
        Organization {
            organization_id: id.into(),
            name: "Acme".into(),
            version: 1,
            default_quorum_threshold: 0,
            root_quorum: vec![],
            rejection_tolerance: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn organization_updates_bump_version() {
        let (_temp, db) = setup();
        db.create_organization(&org("org-1")).unwrap();
        assert!(matches!(
            db.create_organization(&org("org-1")),
            Err(StorageError::Conflict(_))
        ));
        let updated = db
            .update_organization("org-1", |o| o.default_quorum_threshold = 2)
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.default_quorum_threshold, 2);
    }

    #[test]
    fn emails_are_unique_per_org() {
        let (_temp, db) = setup();
        db.create_user(&user("org-1", "u1", "Alice@Example.com"))
            .unwrap();
        assert!(matches!(
            db.create_user(&user("org-1", "u2", "alice@example.com ")),
            Err(StorageError::Conflict(_))
        ));
        db.create_user(&user("org-2", "u3", "alice@example.com"))
            .unwrap();

        let found = db
            .find_user_by_email("org-1", "ALICE@example.com")
            .unwrap()
            .unwrap();
        assert_eq!(found.user_id, "u1");
        assert_eq!(db.list_users("org-1").unwrap().len(), 1);
    }

    #[test]
    fn tag_names_are_unique_per_org() {
        let (_temp, db) = setup();
        let tag = |id: &str, org: &str| Tag {
            tag_id: id.into(),
            organization_id: org.into(),
            name: "treasury".into(),
            created_at: Utc::now(),
        };
        db.create_tag(&tag("t1", "org-1")).unwrap();
        assert!(db.create_tag(&tag("t2", "org-1")).is_err());
        db.create_tag(&tag("t3", "org-2")).unwrap();
        assert_eq!(db.list_tags("org-1").unwrap().len(), 1);
    }

    #[test]
    fn invitations_redeem_once() {
        let (_temp, db) = setup();
        let invitation = Invitation {
            invitation_id: "inv-1".into(),
            organization_id: "org-1".into(),
            email: "bob@example.com".into(),
            role: Role::Approver,
            token: "tok".into(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            redeemed_at: None,
            created_by: "admin".into(),
        };
        db.create_invitation(&invitation).unwrap();

        let build = |inv: &Invitation| {
            let mut u = user(&inv.organization_id, "u-bob", &inv.email);
            u.role = inv.role;
            u
        };
        let created = db.redeem_invitation("tok", Utc::now(), build).unwrap();
        assert_eq!(created.role, Role::Approver);
        assert!(db.get_user("u-bob").unwrap().is_some());

        assert!(matches!(
            db.redeem_invitation("tok", Utc::now(), build),
            Err(StorageError::Conflict(_))
        ));
        assert!(matches!(
            db.redeem_invitation("bad", Utc::now(), build),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn expired_invitation_is_refused() {
        let (_temp, db) = setup();
        db.create_invitation(&Invitation {
            invitation_id: "inv-1".into(),
            organization_id: "org-1".into(),
            email: "c@example.com".into(),
            role: Role::Operator,
            token: "tok".into(),
            expires_at: Utc::now() - chrono::Duration::seconds(1),
            redeemed_at: None,
            created_by: "admin".into(),
        })
        .unwrap();
        let res = db.redeem_invitation("tok", Utc::now(), |inv| {
            user(&inv.organization_id, "u", &inv.email)
        });
        assert!(res.is_err());
        assert!(db.get_user("u").unwrap().is_none());
    }
}
