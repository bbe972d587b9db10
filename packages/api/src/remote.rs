use serde_json::Value;
use store::models::Table;
use store::sync::RemoteStore;
use uuid::Uuid;

use crate::client::BackendClient;
use crate::error::ApiError;
use crate::tables::Query;

/// The JSON body for an upsert: the record's columns plus its stable `id` and
/// owner.
pub fn upsert_body(remote_id: Uuid, user_id: &str, data: &Value) -> Result<Value, ApiError> {
    let Value::Object(map) = data else {
        return Err(ApiError::InvalidInput(format!(
            "row data must be a JSON object, got {data}"
        )));
    };
    let mut map = map.clone();
    map.insert("id".into(), Value::String(remote_id.to_string()));
    map.insert("user_id".into(), Value::String(user_id.to_string()));
    Ok(Value::Object(map))
}

impl RemoteStore for BackendClient {
    type Error = ApiError;

    async fn upsert(
        &self,
        table: Table,
        remote_id: Uuid,
        user_id: &str,
        data: &Value,
    ) -> Result<(), ApiError> {
        self.active_session().await?;
        let body = upsert_body(remote_id, user_id, data)?;
        BackendClient::upsert(self, table.name(), &body).await
    }

    async fn delete(&self, table: Table, remote_id: Uuid) -> Result<(), ApiError> {
        self.active_session().await?;
        BackendClient::delete(self, &Query::table(table.name()).eq("id", remote_id)).await
    }
}
