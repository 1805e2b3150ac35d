//! Domain resources
//!
//! Typed shapes of the dashboard's resources. Each one names the registry
//! descriptor it is served from; the CRUD behavior itself comes from
//! [`ResourceModel`](super::ResourceModel).

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A typed resource bound to a registry descriptor
pub trait Resource: DeserializeOwned + Send + Sync + 'static {
    /// Registry name of the descriptor
    const MODEL_NAME: &'static str;

    /// Server-assigned identifier
    fn id(&self) -> i64;
}

/// Reference to another resource: either its id or the embedded object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Related<T> {
    Id(i64),
    Object(Box<T>),
}

impl<T: Resource> Related<T> {
    pub fn id(&self) -> i64 {
        match self {
            Self::Id(id) => *id,
            Self::Object(obj) => obj.id(),
        }
    }

    /// The embedded object, when the server nested it
    pub fn object(&self) -> Option<&T> {
        match self {
            Self::Id(_) => None,
            Self::Object(obj) => Some(obj),
        }
    }
}

macro_rules! impl_resource {
    ($ty:ty, $name:literal) => {
        impl Resource for $ty {
            const MODEL_NAME: &'static str = $name;

            fn id(&self) -> i64 {
                self.id
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameWorld {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub level: Option<u32>,
    /// Choice code, see the character choices listing
    #[serde(default)]
    pub class_type: Option<String>,
    #[serde(default)]
    pub game_world: Option<Related<GameWorld>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCategory {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    /// Hex color used by the calendar view
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Choice code (e.g. `RAID`, `SIEGE`), see the event choices listing
    pub event_type: String,
    #[serde(default)]
    pub category: Option<Related<EventCategory>>,
    #[serde(default)]
    pub game_world: Option<Related<GameWorld>>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLog {
    pub id: i64,
    pub character: Related<Character>,
    /// Choice code, see the activity-log choices listing
    pub action: String,
    #[serde(default)]
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Multimedia {
    pub id: i64,
    pub title: String,
    /// Download URL of the stored file
    #[serde(default)]
    pub file: Option<String>,
    pub content_type: String,
    #[serde(default)]
    pub uploaded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameWorldStory {
    pub id: i64,
    pub game_world: Related<GameWorld>,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct News {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// Choice code, see the news choices listing
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopItem {
    pub id: i64,
    pub name: String,
    /// Decimal string as sent by the server ("12.50")
    pub price: String,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub item_type: Option<String>,
    #[serde(default)]
    pub is_available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rank {
    pub id: i64,
    pub character: Related<Character>,
    pub score: i64,
    pub position: u32,
}

impl_resource!(GameWorld, "game-world");
impl_resource!(Character, "character");
impl_resource!(EventCategory, "event-category");
impl_resource!(Event, "event");
impl_resource!(ActivityLog, "activity-log");
impl_resource!(Multimedia, "multimedia");
impl_resource!(GameWorldStory, "game-world-story");
impl_resource!(News, "news");
impl_resource!(ShopItem, "shop-item");
impl_resource!(Rank, "rank");
