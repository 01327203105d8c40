use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListEntity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub order: i32,
}

/// What a list item points at. The integer codes are part of the item id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ListItemType {
    Show,
    Season,
    Episode,
}

impl ListItemType {
    pub fn code(self) -> i32 {
        match self {
            ListItemType::Show => 1,
            ListItemType::Season => 2,
            ListItemType::Episode => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(ListItemType::Show),
            2 => Some(ListItemType::Season),
            3 => Some(ListItemType::Episode),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ListItem {
    pub id: String,
    pub list_id: String,
    pub ref_id: u32,
    pub item_type: ListItemType,
}

impl ListItem {
    pub fn new(ref_id: u32, item_type: ListItemType, list_id: impl Into<String>) -> Self {
        let list_id = list_id.into();
        Self {
            id: list_item_id(ref_id, item_type, &list_id),
            list_id,
            ref_id,
            item_type,
        }
    }

    pub fn reference(&self) -> ListItemRef {
        ListItemRef {
            ref_id: self.ref_id,
            item_type: self.item_type,
        }
    }
}

/// Reference to a show, season or episode, without list membership.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ListItemRef {
    pub ref_id: u32,
    pub item_type: ListItemType,
}

/// Item ids are derived from their content so any party can rebuild them
/// without asking the server.
pub fn list_item_id(ref_id: u32, item_type: ListItemType, list_id: &str) -> String {
    format!("{}-{}-{}", ref_id, item_type.code(), list_id)
}
