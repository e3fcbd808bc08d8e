//! Membership registry: borrowing groups

use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        group::{CreateGroup, GroupQuery, UpdateGroup},
        Actor, Group, GroupStatus, Page, Settings,
    },
    repository::SharedRepository,
};

#[derive(Clone)]
pub struct GroupsService {
    repository: SharedRepository,
    clock: Arc<dyn Clock>,
}

/// Drop repeated ids, keeping first occurrences in order
fn dedup_members(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut members = Vec::with_capacity(ids.len());
    for id in ids {
        if !members.contains(&id) {
            members.push(id);
        }
    }
    members
}

impl GroupsService {
    pub fn new(repository: SharedRepository, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Size bounds and existence of every listed member
    async fn check_members(&self, members: &[Uuid], settings: &Settings) -> AppResult<()> {
        let size = members.len() as i32;
        if size < settings.group_min_members || size > settings.group_max_members {
            return Err(AppError::BadRequest(format!(
                "Group must have between {} and {} members",
                settings.group_min_members, settings.group_max_members
            )));
        }
        if self.repository.count_existing_users(members).await? != members.len() as i64 {
            return Err(AppError::BadRequest("Invalid member IDs".to_string()));
        }
        Ok(())
    }

    async fn find_group(&self, id: Uuid) -> AppResult<Group> {
        self.repository
            .get_group(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Group not found".to_string()))
    }

    pub async fn create_group(&self, actor: Actor, data: CreateGroup) -> AppResult<Group> {
        data.validate()?;
        let settings = self.repository.current_settings().await?;
        let members = dedup_members(data.member_ids);
        self.check_members(&members, &settings).await?;

        if self.repository.find_group_by_name(&data.name).await?.is_some() {
            return Err(AppError::Conflict("Group name already exists".to_string()));
        }

        let now = self.clock.now();
        let group = Group {
            id: Uuid::new_v4(),
            name: data.name,
            leader_id: actor.user_id,
            members,
            status: GroupStatus::Pending,
            current_borrowing: None,
            created_at: now,
            updated_at: now,
        };
        self.repository.insert_group(&group).await?;

        tracing::info!("Group created: {} ({}) by {}", group.name, group.id, actor.user_id);
        Ok(group)
    }

    /// Groups visible to the actor: all for admins, otherwise those they lead or belong to
    pub async fn list_groups(&self, actor: Actor, query: &GroupQuery) -> AppResult<(Vec<Group>, i64)> {
        let member = (!actor.is_admin()).then_some(actor.user_id);
        let page = Page::new(query.page, query.per_page);
        self.repository.list_groups(member, query.status, page).await
    }

    pub async fn get_group(&self, actor: Actor, id: Uuid) -> AppResult<Group> {
        let group = self.find_group(id).await?;
        if !actor.is_admin() && !group.is_member(actor.user_id) {
            return Err(AppError::Authorization("Access denied".to_string()));
        }
        Ok(group)
    }

    pub async fn update_group(&self, actor: Actor, id: Uuid, data: UpdateGroup) -> AppResult<Group> {
        data.validate()?;
        let mut group = self.find_group(id).await?;
        if !actor.is_admin() && !group.is_leader(actor.user_id) {
            return Err(AppError::Authorization("Only leader or admin can update".to_string()));
        }

        if let Some(member_ids) = data.member_ids {
            let settings = self.repository.current_settings().await?;
            let members = dedup_members(member_ids);
            self.check_members(&members, &settings).await?;
            group.members = members;
        }
        if let Some(name) = data.name {
            if name != group.name && self.repository.find_group_by_name(&name).await?.is_some() {
                return Err(AppError::Conflict("Group name already exists".to_string()));
            }
            group.name = name;
        }
        group.updated_at = self.clock.now();

        self.repository.update_group_details(&group).await?;
        tracing::info!("Group updated: {} by {}", id, actor.user_id);
        self.find_group(id).await
    }

    pub async fn approve_group(&self, actor: Actor, id: Uuid) -> AppResult<Group> {
        self.decide(actor, id, GroupStatus::Approved).await
    }

    pub async fn reject_group(&self, actor: Actor, id: Uuid) -> AppResult<Group> {
        self.decide(actor, id, GroupStatus::Rejected).await
    }

    async fn decide(&self, actor: Actor, id: Uuid, to: GroupStatus) -> AppResult<Group> {
        actor.require_admin()?;
        self.find_group(id).await?;
        if !self.repository.set_group_status(id, GroupStatus::Pending, to).await? {
            return Err(AppError::BadRequest("Group is not pending".to_string()));
        }
        tracing::info!("Group {}: {}", to.as_str(), id);
        self.find_group(id).await
    }

    pub async fn dissolve_group(&self, actor: Actor, id: Uuid) -> AppResult<()> {
        actor.require_admin()?;
        let group = self.find_group(id).await?;
        if group.status == GroupStatus::Dissolved {
            return Err(AppError::BadRequest("Group is already dissolved".to_string()));
        }
        if !self.repository.dissolve_group(id).await? {
            return Err(AppError::BadRequest(
                "Cannot dissolve group with active borrowing".to_string(),
            ));
        }
        tracing::info!("Group dissolved: {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::SystemClock,
        models::{User, UserRole},
        repository::{MemoryRepository, UserRepository},
    };
    use chrono::Utc;

    async fn seed_users(repository: &MemoryRepository, count: usize) -> Vec<Uuid> {
        let mut ids = Vec::new();
        for i in 0..count {
            let user = User::new(
                &format!("member{}@example.com", i),
                "Member",
                "hash".to_string(),
                UserRole::User,
                Utc::now(),
            );
            repository.insert_user(&user).await.unwrap();
            ids.push(user.id);
        }
        ids
    }

    fn setup() -> (Arc<MemoryRepository>, GroupsService) {
        let repository = Arc::new(MemoryRepository::new());
        let service = GroupsService::new(repository.clone(), Arc::new(SystemClock));
        (repository, service)
    }

    #[tokio::test]
    async fn test_two_members_is_too_small() {
        let (repository, groups) = setup();
        let members = seed_users(&repository, 2).await;
        let leader = Actor::user(Uuid::new_v4());

        let err = groups
            .create_group(leader, CreateGroup { name: "Readers".to_string(), member_ids: members })
            .await
            .unwrap_err();

        match err {
            AppError::BadRequest(msg) => assert_eq!(msg, "Group must have between 3 and 6 members"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_member_rejected() {
        let (repository, groups) = setup();
        let mut members = seed_users(&repository, 2).await;
        members.push(Uuid::new_v4());

        let err = groups
            .create_group(Actor::user(Uuid::new_v4()), CreateGroup { name: "Readers".to_string(), member_ids: members })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg == "Invalid member IDs"));
    }

    #[tokio::test]
    async fn test_group_lifecycle() {
        let (repository, groups) = setup();
        let members = seed_users(&repository, 3).await;
        let leader = Actor::user(Uuid::new_v4());
        let admin = Actor::admin(Uuid::new_v4());

        let group = groups
            .create_group(leader, CreateGroup { name: "Readers".to_string(), member_ids: members.clone() })
            .await
            .unwrap();
        assert_eq!(group.status, GroupStatus::Pending);
        assert!(group.is_member(leader.user_id));

        let err = groups
            .create_group(leader, CreateGroup { name: "Readers".to_string(), member_ids: members })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        assert!(matches!(
            groups.approve_group(leader, group.id).await,
            Err(AppError::Authorization(_))
        ));
        let approved = groups.approve_group(admin, group.id).await.unwrap();
        assert_eq!(approved.status, GroupStatus::Approved);
        assert!(matches!(
            groups.reject_group(admin, group.id).await,
            Err(AppError::BadRequest(_))
        ));

        let outsider = Actor::user(Uuid::new_v4());
        assert!(matches!(
            groups.get_group(outsider, group.id).await,
            Err(AppError::Authorization(_))
        ));
        let (visible, _) = groups.list_groups(outsider, &GroupQuery::default()).await.unwrap();
        assert!(visible.is_empty());

        groups.dissolve_group(admin, group.id).await.unwrap();
        let dissolved = groups.get_group(admin, group.id).await.unwrap();
        assert_eq!(dissolved.status, GroupStatus::Dissolved);
    }
}
