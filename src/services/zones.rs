use crate::{
    entities::delivery_zone::{self, Entity as DeliveryZone, Model as ZoneModel},
    errors::ServiceError,
};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use uuid::Uuid;

/// Read-side access to delivery zones: id lookup for intake and
/// postcode-prefix matching for the public lookup endpoint.
#[derive(Clone)]
pub struct ZoneService {
    db: Arc<DatabaseConnection>,
}

impl ZoneService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get(&self, zone_id: Uuid) -> Result<Option<ZoneModel>, ServiceError> {
        Ok(DeliveryZone::find_by_id(zone_id).one(&*self.db).await?)
    }

    /// Loads an active zone or fails with `InvalidZone`.
    pub async fn get_active(&self, zone_id: Uuid) -> Result<ZoneModel, ServiceError> {
        let zone = self
            .get(zone_id)
            .await?
            .ok_or_else(|| ServiceError::InvalidZone(format!("zone {zone_id} not found")))?;
        if !zone.is_active {
            return Err(ServiceError::InvalidZone(format!(
                "zone {} is not currently served",
                zone.name
            )));
        }
        Ok(zone)
    }

    /// First active zone whose prefix list matches the postcode.
    pub async fn find_for_postcode(
        &self,
        postcode: &str,
    ) -> Result<Option<ZoneModel>, ServiceError> {
        let zones = DeliveryZone::find()
            .filter(delivery_zone::Column::IsActive.eq(true))
            .order_by_asc(delivery_zone::Column::Name)
            .all(&*self.db)
            .await?;
        Ok(zones.into_iter().find(|z| z.matches_postcode(postcode)))
    }
}
