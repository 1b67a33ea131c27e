use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WarehouseError;

/// The five record sets moved through the warehouse.
///
/// Variants are declared in cascade order: users and captains have no
/// upstream dependency, rides reference both, payments and feedback
/// reference rides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Users,
    Captains,
    Rides,
    Payments,
    Feedback,
}

impl Entity {
    pub const ALL: [Entity; 5] = [
        Entity::Users,
        Entity::Captains,
        Entity::Rides,
        Entity::Payments,
        Entity::Feedback,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Entity::Users => "users",
            Entity::Captains => "captains",
            Entity::Rides => "rides",
            Entity::Payments => "payments",
            Entity::Feedback => "feedback",
        }
    }

    /// Columns of the spreadsheet export, all carried as text in bronze.
    pub fn raw_columns(self) -> &'static [&'static str] {
        match self {
            Entity::Users => &["user_id", "name", "gender", "age", "signup_date", "city"],
            Entity::Captains => &[
                "captain_id",
                "name",
                "age",
                "experience_years",
                "city",
                "rating",
            ],
            Entity::Rides => &[
                "ride_id",
                "user_id",
                "captain_id",
                "ride_date",
                "pickup_loc",
                "drop_loc",
                "distance_km",
                "duration_min",
                "ride_status",
            ],
            Entity::Payments => &[
                "payment_id",
                "ride_id",
                "payment_method",
                "fare",
                "discount_percent",
                "discount_amount",
                "final_amount",
                "payment_status",
            ],
            Entity::Feedback => &[
                "feedback_id",
                "ride_id",
                "user_rating",
                "captain_rating",
                "issue_category",
                "comments",
            ],
        }
    }

    /// File name of the entity's export in the source directory.
    pub fn source_file(self) -> String {
        format!("{}.csv", self.name())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Entity {
    type Err = WarehouseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Entity::ALL
            .into_iter()
            .find(|e| e.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| WarehouseError::UnknownEntity(s.to_string()))
    }
}
