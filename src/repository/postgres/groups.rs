use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{conflict_on_unique, parse_column, PgRepository};
use crate::{
    error::{AppError, AppResult},
    models::{Group, GroupStatus, Page},
    repository::GroupRepository,
};

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: Uuid,
    name: String,
    leader_id: Uuid,
    member_ids: Vec<Uuid>,
    status: String,
    current_borrowing_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<GroupRow> for Group {
    type Error = AppError;

    fn try_from(row: GroupRow) -> Result<Self, Self::Error> {
        Ok(Group {
            id: row.id,
            name: row.name,
            leader_id: row.leader_id,
            members: row.member_ids,
            status: parse_column(&row.status)?,
            current_borrowing: row.current_borrowing_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn push_group_filters(builder: &mut QueryBuilder<'_, Postgres>, member: Option<Uuid>, status: Option<GroupStatus>) {
    builder.push(" WHERE TRUE");
    if let Some(member) = member {
        builder
            .push(" AND (leader_id = ")
            .push_bind(member)
            .push(" OR ")
            .push_bind(member)
            .push(" = ANY(member_ids))");
    }
    if let Some(status) = status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
}

#[async_trait]
impl GroupRepository for PgRepository {
    async fn get_group(&self, id: Uuid) -> AppResult<Option<Group>> {
        sqlx::query_as::<_, GroupRow>("SELECT * FROM groups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Group::try_from)
            .transpose()
    }

    async fn find_group_by_name(&self, name: &str) -> AppResult<Option<Group>> {
        sqlx::query_as::<_, GroupRow>("SELECT * FROM groups WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .map(Group::try_from)
            .transpose()
    }

    async fn insert_group(&self, group: &Group) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO groups (id, name, leader_id, member_ids, status, current_borrowing_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(group.id)
        .bind(&group.name)
        .bind(group.leader_id)
        .bind(&group.members)
        .bind(group.status.as_str())
        .bind(group.current_borrowing)
        .bind(group.created_at)
        .bind(group.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Group name already exists"))?;
        Ok(())
    }

    async fn update_group_details(&self, group: &Group) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE groups SET name = $2, member_ids = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(group.id)
        .bind(&group.name)
        .bind(&group.members)
        .bind(group.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Group name already exists"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Group not found".to_string()));
        }
        Ok(())
    }

    async fn set_group_status(&self, id: Uuid, from: GroupStatus, to: GroupStatus) -> AppResult<bool> {
        let result = sqlx::query("UPDATE groups SET status = $3 WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn dissolve_group(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE groups SET status = 'dissolved'
            WHERE id = $1 AND current_borrowing_id IS NULL AND status <> 'dissolved'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_groups(&self, member: Option<Uuid>, status: Option<GroupStatus>, page: Page) -> AppResult<(Vec<Group>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM groups");
        push_group_filters(&mut count, member, status);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM groups");
        push_group_filters(&mut query, member, status);
        query
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows: Vec<GroupRow> = query.build_query_as().fetch_all(&self.pool).await?;

        let groups = rows
            .into_iter()
            .map(Group::try_from)
            .collect::<AppResult<Vec<_>>>()?;
        Ok((groups, total))
    }
}
