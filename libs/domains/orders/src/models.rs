use chrono::{DateTime, Utc};
use database::{Document, DocumentId};
use mongodb::bson::{self, Document as BsonDocument};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Resource name used to derive event topics (`order_created`, `order_updated`).
pub const ORDER_RESOURCE: &str = "order";

/// Order entity as stored in the `orders` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id", alias = "id")]
    pub id: Uuid,
    pub name: String,
    pub price: f64,
    pub phone_number: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Order {
    fn id(&self) -> DocumentId {
        self.id
    }
}

/// Phone numbers are E.164: a `+`, then 8 to 15 digits without a leading zero.
fn validate_phone_number(value: &str) -> Result<(), ValidationError> {
    let valid = value.strip_prefix('+').is_some_and(|digits| {
        (8..=15).contains(&digits.len())
            && !digits.starts_with('0')
            && digits.bytes().all(|b| b.is_ascii_digit())
    });

    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("phone_number")
            .with_message("phone number must be in E.164 format".into()))
    }
}

/// DTO for creating a new order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrder {
    #[validate(length(min = 1, max = 200))]
    pub name: String,

    #[validate(range(exclusive_min = 0.0))]
    pub price: f64,

    #[validate(custom(function = "validate_phone_number"))]
    pub phone_number: String,
}

impl CreateOrder {
    /// Fields written for a new order, stamped with `now`.
    pub(crate) fn into_new_order(self, now: DateTime<Utc>) -> NewOrder {
        NewOrder {
            name: self.name,
            price: self.price,
            phone_number: self.phone_number,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Stored shape of an order before the store assigns its id
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewOrder {
    pub name: String,
    pub price: f64,
    pub phone_number: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// DTO for updating an existing order. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrder {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(exclusive_min = 0.0))]
    pub price: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_phone_number"))]
    pub phone_number: Option<String>,
}

impl UpdateOrder {
    /// `$set` patch for the provided fields plus `updatedAt`.
    pub fn to_patch(&self, now: DateTime<Utc>) -> Result<BsonDocument, bson::ser::Error> {
        let mut fields = bson::to_document(self)?;
        fields.insert("updatedAt", bson::to_bson(&now)?);

        let mut patch = BsonDocument::new();
        patch.insert("$set", fields);
        Ok(patch)
    }
}
