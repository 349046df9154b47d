use async_trait::async_trait;
use lyla_core::KeyValueStore;
use lyla_entities::kv_records;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Schema, Set,
};
use tracing::{debug, info};

fn is_table_already_exists_error(err: &DbErr) -> bool {
    let message = err.to_string();
    message.contains("already exists")
}

/// Records kept in a single `kv_records` table (SQLite or Postgres).
pub struct DatabaseStore {
    db: DatabaseConnection,
}

impl DatabaseStore {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        info!("Connecting to database");
        let db = Database::connect(database_url).await?;

        let backend = db.get_database_backend();
        let schema = Schema::new(backend);
        let stmt = schema.create_table_from_entity(kv_records::Entity);
        match db
            .execute_unprepared(&backend.build(&stmt).to_string())
            .await
        {
            Ok(_) => {}
            Err(e) if is_table_already_exists_error(&e) => {
                debug!("Table kv_records already exists, skipping creation");
            }
            Err(e) => return Err(e.into()),
        }

        info!("DatabaseStore initialized");
        Ok(Self { db })
    }
}

#[async_trait]
impl KeyValueStore for DatabaseStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let record = kv_records::Entity::find_by_id(key.to_owned())
            .one(&self.db)
            .await?;
        Ok(record.map(|r| r.value))
    }

    async fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let record = kv_records::ActiveModel {
            key: Set(key.to_owned()),
            value: Set(value.to_owned()),
            updated_at: Set(chrono::Utc::now().naive_utc()),
        };

        // Single statement so concurrent writers to a new key cannot collide.
        kv_records::Entity::insert(record)
            .on_conflict(
                OnConflict::column(kv_records::Column::Key)
                    .update_columns([kv_records::Column::Value, kv_records::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;

        debug!("Stored record: {key}");
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<bool> {
        let result = kv_records::Entity::delete_by_id(key.to_owned())
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn list(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let records = kv_records::Entity::find()
            .filter(kv_records::Column::Key.starts_with(prefix))
            .order_by_asc(kv_records::Column::Key)
            .all(&self.db)
            .await?;
        Ok(records.into_iter().map(|r| r.key).collect())
    }
}
