use std::hash::Hash;

use time::Date;

/// A single address-book entry.
///
/// Two contacts are equal when their first name and address match, whatever
/// the remaining fields hold. `Hash` follows the same two fields.
#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: i32,
    pub phone_number: i64,
    pub email: String,
    pub address_book_name: String,
    #[serde(default)]
    pub address_book_type: Option<String>,
    #[serde(default)]
    pub start_date: Option<Date>,
}

impl Contact {
    pub fn with_start_date(mut self, start_date: Date) -> Self {
        self.start_date = Some(start_date);
        self
    }

    /// Value used when grouping contacts by location: the city, or the state
    /// when no city was recorded.
    pub fn location(&self) -> &str {
        if self.city.is_empty() {
            &self.state
        } else {
            &self.city
        }
    }
}

impl Hash for Contact {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.first_name.hash(state);
        self.address.hash(state);
    }
}

impl Eq for Contact {}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.first_name == other.first_name && self.address == other.address
    }
}
