use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
};
use uuid::Uuid;

use crate::entities::{participants, prelude::*};
use crate::repositories::now_fixed;
use room_types::{ConnectionStatus, ParticipantInfo, ParticipantRole};

pub struct ParticipantRepository {
    db: DatabaseConnection,
}

impl ParticipantRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn model_to_info(model: &participants::Model) -> ParticipantInfo {
        ParticipantInfo {
            user_id: model.user_id,
            role: ParticipantRole::parse(&model.role).unwrap_or(ParticipantRole::Spectator),
            connection: ConnectionStatus::parse(&model.connection)
                .unwrap_or(ConnectionStatus::Disconnected),
            joined_at: model.joined_at.with_timezone(&Utc),
            last_active_at: model.last_active_at.with_timezone(&Utc),
        }
    }

    pub async fn add(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        role: ParticipantRole,
    ) -> Result<participants::Model> {
        let now = now_fixed();
        let model = participants::ActiveModel {
            id: Set(Uuid::new_v4()),
            room_id: Set(room_id),
            user_id: Set(user_id),
            role: Set(role.as_str().to_string()),
            connection: Set(ConnectionStatus::Connected.as_str().to_string()),
            joined_at: Set(now),
            last_active_at: Set(now),
        };
        let result = Participants::insert(model).exec(&self.db).await?;
        let created = Participants::find_by_id(result.last_insert_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("failed to retrieve created participant"))?;
        Ok(created)
    }

    pub async fn find(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<participants::Model>> {
        Ok(Participants::find()
            .filter(participants::Column::RoomId.eq(room_id))
            .filter(participants::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?)
    }

    pub async fn list(&self, room_id: Uuid) -> Result<Vec<participants::Model>> {
        Ok(Participants::find()
            .filter(participants::Column::RoomId.eq(room_id))
            .all(&self.db)
            .await?)
    }

    pub async fn count(&self, room_id: Uuid) -> Result<u64> {
        Ok(Participants::find()
            .filter(participants::Column::RoomId.eq(room_id))
            .count(&self.db)
            .await?)
    }

    pub async fn remove(&self, room_id: Uuid, user_id: Uuid) -> Result<()> {
        Participants::delete_many()
            .filter(participants::Column::RoomId.eq(room_id))
            .filter(participants::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn set_connection(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        status: ConnectionStatus,
    ) -> Result<()> {
        Participants::update_many()
            .col_expr(
                participants::Column::Connection,
                Expr::value(status.as_str()),
            )
            .col_expr(
                participants::Column::LastActiveAt,
                Expr::value(now_fixed()),
            )
            .filter(participants::Column::RoomId.eq(room_id))
            .filter(participants::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn set_role(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        role: ParticipantRole,
    ) -> Result<()> {
        Participants::update_many()
            .col_expr(participants::Column::Role, Expr::value(role.as_str()))
            .filter(participants::Column::RoomId.eq(room_id))
            .filter(participants::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Author-role lookup for the merge strategies.
    pub async fn roles_map(&self, room_id: Uuid) -> Result<HashMap<Uuid, ParticipantRole>> {
        let participants = self.list(room_id).await?;
        Ok(participants
            .iter()
            .filter_map(|p| ParticipantRole::parse(&p.role).map(|role| (p.user_id, role)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::connect_to_memory_database;
    use migration::{Migrator, MigratorTrait};

    async fn setup() -> ParticipantRepository {
        let db = connect_to_memory_database().await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        ParticipantRepository::new(db)
    }

    #[tokio::test]
    async fn test_add_find_remove() {
        let repo = setup().await;
        let room = Uuid::new_v4();
        let user = Uuid::new_v4();

        repo.add(room, user, ParticipantRole::Host).await.unwrap();
        assert_eq!(repo.count(room).await.unwrap(), 1);

        let found = repo.find(room, user).await.unwrap().unwrap();
        assert_eq!(found.role, "host");
        assert_eq!(found.connection, "connected");

        repo.remove(room, user).await.unwrap();
        assert_eq!(repo.count(room).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_connection_and_role() {
        let repo = setup().await;
        let room = Uuid::new_v4();
        let user = Uuid::new_v4();
        repo.add(room, user, ParticipantRole::Player).await.unwrap();

        repo.set_connection(room, user, ConnectionStatus::Disconnected)
            .await
            .unwrap();
        repo.set_role(room, user, ParticipantRole::Moderator)
            .await
            .unwrap();

        let found = repo.find(room, user).await.unwrap().unwrap();
        assert_eq!(found.connection, "disconnected");
        assert_eq!(found.role, "moderator");
    }

    #[tokio::test]
    async fn test_roles_map() {
        let repo = setup().await;
        let room = Uuid::new_v4();
        let host = Uuid::new_v4();
        let player = Uuid::new_v4();
        repo.add(room, host, ParticipantRole::Host).await.unwrap();
        repo.add(room, player, ParticipantRole::Player)
            .await
            .unwrap();

        let roles = repo.roles_map(room).await.unwrap();
        assert_eq!(roles.get(&host), Some(&ParticipantRole::Host));
        assert_eq!(roles.get(&player), Some(&ParticipantRole::Player));
    }
}
